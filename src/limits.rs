//! Capacity and size constants shared by the allocator, buckets, and the
//! wire-stable limits a caller can observe.
//!
//! Current limits allow for roughly 1 GiB of storage per drive.

/// Maximum base64 body bytes a single chunk may carry (50 bytes reserved
/// for the `@<next>` tail within Discord's 2000-character message cap).
pub const MSG_SIZE: usize = 1950;

/// Messages scanned per data channel when rebuilding a bucket's cache.
pub const MIN_MSG_PER_CHANNEL: usize = 351;

/// Data channels (excluding `_cache`) allowed per bucket/category.
pub const MAX_CHANNELS_PER_BUCKET: usize = 48;

/// Buckets (categories named `data_<i>`) allowed per drive.
pub const MAX_BUCKETS: usize = 30;

/// Total content bytes a single data channel may hold.
pub const TOTAL_CHANNEL_CONTENT_SIZE: usize = MSG_SIZE * MIN_MSG_PER_CHANNEL;

/// Pre-decode byte cap enforced by `pull_object` on a single file.
pub const PULL_CAP_BYTES: usize = 10_000_000;

/// Bound on the allocator's recently-self-deleted message queue.
pub const RECENTLY_DELETED_CAPACITY: usize = 10;

/// Maximum length, in characters, of a file or directory name.
pub const MAX_NAME_LEN: usize = 256;

/// Characters forbidden in a file or directory name, plus the space
/// character.
pub const ILLEGAL_NAME_CHARS: &str = "\\/:*?<>|\"~` ";

/// Content written into the single chunk of a freshly created, empty file.
pub const BLANK_FILE_CONTENT: &str = "=";

/// Placeholder content an allocator writes into a just-reserved chunk,
/// before the caller has supplied real data.
pub const ALLOC_PLACEHOLDER_CONTENT: &str = "⏱️ `waiting for data...`";

/// Name of the root directory. Has no parent and cannot be renamed or
/// removed.
pub const ROOT_NAME: &str = "~";

/// Sentinel terminating a chunk chain.
pub const CHAIN_END: &str = "END";
