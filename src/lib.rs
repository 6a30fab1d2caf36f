//! Storage engine for a virtual block-addressable file system backed
//! by chat message history.
//!
//! A [`Drive`] is the entry point: one per connected server, built by
//! [`bootstrap::initialize_drive`] or [`bootstrap::discover_drive`] and
//! held behind a [`registry::DriveRegistry`] for reuse across callers.
//! Every operation is generic over a [`platform::ChatPlatform`]
//! implementation, so the engine itself never depends on a concrete
//! chat backend.

pub mod address;
pub mod allocator;
pub mod bootstrap;
pub mod bucket;
pub mod chunk;
pub mod config;
pub mod drive;
pub mod error;
pub mod limits;
pub mod memory_platform;
pub mod paths;
pub mod permissions;
pub mod platform;
pub mod registry;
pub mod tree;
pub mod tree_codec;

pub use address::{MemoryAddress, NextPointer};
pub use bootstrap::{
    discover_drive, discover_drive_with_limits, initialize_drive, initialize_drive_with_limits,
    DrivePointers,
};
pub use config::DriveLimits;
pub use drive::{Drive, PulledObject, WriteOptions};
pub use error::{DriveError, DriveResult};
pub use permissions::Permissions;
pub use platform::{ChatPlatform, ChatMessage, PlatformError, PlatformResult, RoleOverwrite};
pub use registry::{DriveRegistry, ServerId};
