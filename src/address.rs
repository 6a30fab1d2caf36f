//! Memory addresses: the pair identifying a single chunk.

use std::fmt;
use std::str::FromStr;

use crate::error::DriveError;
use crate::limits::CHAIN_END;

/// Identifies one chunk: a message in a specific channel.
///
/// Serializes as `"<channel_id>:<message_id>"`. The sentinel string
/// `"END"` (see [`CHAIN_END`]) denotes chain termination and is never a
/// valid `MemoryAddress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryAddress {
    pub channel_id: u64,
    pub message_id: u64,
}

impl MemoryAddress {
    pub fn new(channel_id: u64, message_id: u64) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.message_id)
    }
}

impl FromStr for MemoryAddress {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, message) = s.split_once(':').ok_or(DriveError::InvalidMemAddr)?;
        let channel_id: u64 = channel.parse().map_err(|_| DriveError::InvalidMemAddr)?;
        let message_id: u64 = message.parse().map_err(|_| DriveError::InvalidMemAddr)?;
        Ok(Self::new(channel_id, message_id))
    }
}

/// Either a concrete address, or the chain-terminating sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPointer {
    Addr(MemoryAddress),
    End,
}

impl NextPointer {
    pub fn addr(self) -> Option<MemoryAddress> {
        match self {
            NextPointer::Addr(a) => Some(a),
            NextPointer::End => None,
        }
    }
}

impl fmt::Display for NextPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextPointer::Addr(a) => write!(f, "{a}"),
            NextPointer::End => write!(f, "{CHAIN_END}"),
        }
    }
}

impl FromStr for NextPointer {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CHAIN_END {
            Ok(NextPointer::End)
        } else {
            Ok(NextPointer::Addr(s.parse()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let addr = MemoryAddress::new(42, 7);
        let text = addr.to_string();
        assert_eq!(text, "42:7");
        assert_eq!(text.parse::<MemoryAddress>().unwrap(), addr);
    }

    #[test]
    fn end_sentinel_is_distinct_from_any_address() {
        assert_eq!("END".parse::<NextPointer>().unwrap(), NextPointer::End);
        assert!("END".parse::<MemoryAddress>().is_err());
    }

    #[test]
    fn rejects_malformed_address() {
        assert!("abc".parse::<MemoryAddress>().is_err());
        assert!("1:2:3".parse::<MemoryAddress>().is_err());
        assert!("".parse::<MemoryAddress>().is_err());
    }
}
