//! The chat-platform contract this engine consumes.
//!
//! The storage core never talks to a concrete chat API directly — it is
//! generic over this trait so the allocator, buckets, tree, and drive
//! can be exercised against an in-memory double in tests (and by the
//! `cli` inspection tool) without a live server.

use async_trait::async_trait;
use thiserror::Error;

pub type ChannelId = u64;
pub type CategoryId = u64;
pub type MessageId = u64;
pub type RoleId = u64;
pub type UserId = u64;

/// An unexpected failure reaching the chat platform (network error,
/// rate limit, permission revoked mid-call, ...). The platform client's
/// own retry policy is assumed to have already run its course before
/// this is returned.
#[derive(Debug, Error, Clone)]
#[error("chat platform error: {0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// One message as observed by the engine: just enough to decode a
/// chunk and to tell whether the drive itself authored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
}

/// Whether a role may see a category/channel at all, used when the
/// bootstrap and allocator create system categories with per-role
/// visibility overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleOverwrite {
    pub role: RoleId,
    pub can_view: bool,
}

/// The minimal message-CRUD + category/channel/role surface the
/// storage engine needs from the chat platform.
///
/// Implementors must guarantee:
/// - [`ChatPlatform::recent_messages`] returns messages newest-first.
/// - [`ChatPlatform::fetch_message`] returns `Ok(None)` (not an error)
///   when the message id does not exist — this is how the allocator
///   tells a broken trace apart from a genuine transport failure.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The id the drive's own bot/service account is authoring
    /// messages as, used to detect messages authored by someone else.
    fn bot_user_id(&self) -> UserId;

    async fn list_categories(&self) -> PlatformResult<Vec<(CategoryId, String)>>;
    async fn list_channels(&self, category: CategoryId) -> PlatformResult<Vec<(ChannelId, String)>>;

    async fn create_category(
        &self,
        name: &str,
        overwrites: Vec<RoleOverwrite>,
    ) -> PlatformResult<CategoryId>;
    async fn create_channel(&self, category: CategoryId, name: &str) -> PlatformResult<ChannelId>;
    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()>;

    async fn create_role(&self, name: &str) -> PlatformResult<RoleId>;

    async fn send_message(&self, channel: ChannelId, content: &str) -> PlatformResult<MessageId>;
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> PlatformResult<()>;
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()>;
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> PlatformResult<Option<ChatMessage>>;
    /// Newest-first, capped at `limit` messages.
    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<ChatMessage>>;
}
