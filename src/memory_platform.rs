//! An in-memory [`ChatPlatform`] double.
//!
//! Used by the crate's own test suite and by the `cli` inspection tool
//! to exercise the allocator, buckets, and tree against in-memory state
//! rather than a live chat gateway.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::platform::{
    CategoryId, ChannelId, ChatMessage, ChatPlatform, MessageId, PlatformError, PlatformResult,
    RoleId, RoleOverwrite, UserId,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    author_id: UserId,
    content: String,
}

#[derive(Debug, Default)]
struct Channel {
    name: String,
    category: CategoryId,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Default)]
struct Category {
    name: String,
}

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    channels: BTreeMap<ChannelId, Channel>,
}

/// An entirely in-process stand-in for a chat server. Ids are assigned
/// from monotonically increasing counters, mirroring how a real
/// platform hands out snowflake ids without the engine needing to know
/// their internal shape.
pub struct MemoryPlatform {
    bot_user_id: UserId,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new(bot_user_id: UserId) -> Self {
        Self {
            bot_user_id,
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    fn bot_user_id(&self) -> UserId {
        self.bot_user_id
    }

    async fn list_categories(&self) -> PlatformResult<Vec<(CategoryId, String)>> {
        let state = self.state.lock().await;
        Ok(state
            .categories
            .iter()
            .map(|(id, cat)| (*id, cat.name.clone()))
            .collect())
    }

    async fn list_channels(&self, category: CategoryId) -> PlatformResult<Vec<(ChannelId, String)>> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .iter()
            .filter(|(_, ch)| ch.category == category)
            .map(|(id, ch)| (*id, ch.name.clone()))
            .collect())
    }

    async fn create_category(
        &self,
        name: &str,
        _overwrites: Vec<RoleOverwrite>,
    ) -> PlatformResult<CategoryId> {
        let id = self.alloc_id();
        let mut state = self.state.lock().await;
        state.categories.insert(
            id,
            Category {
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_channel(&self, category: CategoryId, name: &str) -> PlatformResult<ChannelId> {
        let id = self.alloc_id();
        let mut state = self.state.lock().await;
        if !state.categories.contains_key(&category) {
            return Err(PlatformError::new(format!(
                "create_channel: no such category {category}"
            )));
        }
        state.channels.insert(
            id,
            Channel {
                name: name.to_string(),
                category,
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.channels.remove(&channel);
        Ok(())
    }

    async fn create_role(&self, _name: &str) -> PlatformResult<RoleId> {
        Ok(self.alloc_id())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> PlatformResult<MessageId> {
        let id = self.alloc_id();
        let mut state = self.state.lock().await;
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PlatformError::new(format!("send_message: no such channel {channel}")))?;
        ch.messages.push(StoredMessage {
            id,
            author_id: self.bot_user_id,
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        let ch = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PlatformError::new(format!("edit_message: no such channel {channel}")))?;
        let msg = ch
            .messages
            .iter_mut()
            .find(|m| m.id == message)
            .ok_or_else(|| PlatformError::new(format!("edit_message: no such message {message}")))?;
        msg.content = content.to_string();
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        if let Some(ch) = state.channels.get_mut(&channel) {
            ch.messages.retain(|m| m.id != message);
        }
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> PlatformResult<Option<ChatMessage>> {
        let state = self.state.lock().await;
        let Some(ch) = state.channels.get(&channel) else {
            return Ok(None);
        };
        Ok(ch.messages.iter().find(|m| m.id == message).map(|m| ChatMessage {
            id: m.id,
            channel_id: channel,
            author_id: m.author_id,
            content: m.content.clone(),
        }))
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<ChatMessage>> {
        let state = self.state.lock().await;
        let Some(ch) = state.channels.get(&channel) else {
            return Ok(Vec::new());
        };
        Ok(ch
            .messages
            .iter()
            .rev()
            .take(limit)
            .map(|m| ChatMessage {
                id: m.id,
                channel_id: channel,
                author_id: m.author_id,
                content: m.content.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_message() {
        let platform = MemoryPlatform::new(1);
        let category = platform.create_category("meta", vec![]).await.unwrap();
        let channel = platform.create_channel(category, "_struct").await.unwrap();
        let msg_id = platform.send_message(channel, "hello").await.unwrap();

        let fetched = platform.fetch_message(channel, msg_id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.author_id, platform.bot_user_id());
    }

    #[tokio::test]
    async fn fetch_of_missing_message_is_none_not_error() {
        let platform = MemoryPlatform::new(1);
        let category = platform.create_category("data_0", vec![]).await.unwrap();
        let channel = platform.create_channel(category, "0").await.unwrap();
        assert!(platform.fetch_message(channel, 999).await.unwrap().is_none());
    }
}
