//! One in-process drive session: a fresh [`drivecord::Drive`] bootstrapped
//! against an in-memory chat-platform double, operated by a single
//! console user.
//!
//! This binary runs locally against a mock backend instead of a live
//! chat gateway, exercising the library the same way its own test suite
//! does: in-memory buffers rather than files on disk
//! (`src/memory_platform.rs`).

use std::sync::Arc;

use drivecord::{bootstrap, memory_platform::MemoryPlatform, ChatPlatform, Drive};

/// The fixed user id this CLI operates as. A real deployment resolves
/// this per-request from the chat platform's own identity; a standalone
/// inspection console has exactly one operator.
pub const CONSOLE_USER: u64 = 1;
const BOT_USER: u64 = 0;

pub struct Session {
    pub drive: Drive,
}

impl Session {
    pub async fn fresh() -> anyhow::Result<Self> {
        let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(BOT_USER));
        let (_pointers, drive) = bootstrap::initialize_drive(platform).await?;
        Ok(Self { drive })
    }
}
