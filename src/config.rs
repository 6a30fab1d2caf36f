//! Operator-tunable capacity limits, overridable per deployment via a
//! TOML config file without a recompile.

use serde::{Deserialize, Serialize};

use crate::limits;

/// Every capacity constant the allocator and buckets consult. Defaults
/// match the hardcoded [`limits`] constants exactly, so a deployment
/// that never supplies a config file behaves identically to before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveLimits {
    pub msg_size: usize,
    pub min_msg_per_channel: usize,
    pub max_channels_per_bucket: usize,
    pub max_buckets: usize,
    pub pull_cap_bytes: usize,
    pub recently_deleted_capacity: usize,
    pub max_name_len: usize,
    pub illegal_name_chars: String,
}

impl DriveLimits {
    /// Total content bytes a single data channel may hold under these
    /// limits.
    pub fn total_channel_content_size(&self) -> usize {
        self.msg_size * self.min_msg_per_channel
    }

    /// Parse a TOML document, falling back to [`Default`] for any
    /// field it omits.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

impl Default for DriveLimits {
    fn default() -> Self {
        Self {
            msg_size: limits::MSG_SIZE,
            min_msg_per_channel: limits::MIN_MSG_PER_CHANNEL,
            max_channels_per_bucket: limits::MAX_CHANNELS_PER_BUCKET,
            max_buckets: limits::MAX_BUCKETS,
            pull_cap_bytes: limits::PULL_CAP_BYTES,
            recently_deleted_capacity: limits::RECENTLY_DELETED_CAPACITY,
            max_name_len: limits::MAX_NAME_LEN,
            illegal_name_chars: limits::ILLEGAL_NAME_CHARS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_hardcoded_limits() {
        let limits = DriveLimits::default();
        assert_eq!(limits.total_channel_content_size(), limits::TOTAL_CHANNEL_CONTENT_SIZE);
    }

    #[test]
    fn toml_override_falls_back_to_default_for_omitted_fields() {
        let parsed = DriveLimits::from_toml("max_buckets = 5\n").unwrap();
        assert_eq!(parsed.max_buckets, 5);
        assert_eq!(parsed.msg_size, limits::MSG_SIZE);
        assert_eq!(parsed.illegal_name_chars, limits::ILLEGAL_NAME_CHARS);
    }

    #[test]
    fn toml_override_can_widen_the_illegal_name_charset() {
        let parsed = DriveLimits::from_toml("illegal_name_chars = \"#\"\n").unwrap();
        assert_eq!(parsed.illegal_name_chars, "#");
        assert_eq!(parsed.max_name_len, limits::MAX_NAME_LEN);
    }
}
