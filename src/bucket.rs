//! Bucket: one category holding up to a configured number of data
//! channels plus a `_cache` meta channel tracking bytes used per data
//! channel.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::config::DriveLimits;
use crate::error::{DrivePanic, EngineResult};
use crate::limits::ALLOC_PLACEHOLDER_CONTENT;
use crate::platform::{CategoryId, ChannelId, ChatPlatform, MessageId};

const CACHE_CHANNEL_NAME: &str = "_cache";

/// One `data_<index>` category: a cache channel and its data channels.
pub struct Bucket {
    pub index: u32,
    pub category_id: CategoryId,
    cache_channel_id: ChannelId,
    cache_message_id: MessageId,
    /// Data channel ids, keyed by their numeric channel name — insertion
    /// order (the order `alloc` scans) is the numeric order.
    data_channels: BTreeMap<u32, ChannelId>,
    cache: BTreeMap<ChannelId, u64>,
    limits: DriveLimits,
}

impl Bucket {
    /// Load (or lazily repair) the bucket at `category_id`, reconciling
    /// the backing category against this component's invariants.
    pub async fn init(
        platform: &dyn ChatPlatform,
        category_id: CategoryId,
        index: u32,
        limits: DriveLimits,
    ) -> EngineResult<Self> {
        let channels = platform.list_channels(category_id).await?;

        let mut data_channels: BTreeMap<u32, ChannelId> = BTreeMap::new();
        let mut cache_channel_id: Option<ChannelId> = None;

        for (channel_id, name) in &channels {
            if name == CACHE_CHANNEL_NAME {
                cache_channel_id = Some(*channel_id);
                continue;
            }
            match name.parse::<u32>() {
                Ok(n) => {
                    data_channels.insert(n, *channel_id);
                }
                Err(_) => {
                    warn!(bucket = index, channel = %name, "invalid data channel name, ignoring");
                }
            }
        }

        if data_channels.is_empty() {
            info!(bucket = index, "no data channels found, creating channel 0");
            let channel_id = platform.create_channel(category_id, "0").await?;
            data_channels.insert(0, channel_id);
        }

        for (expected, actual) in data_channels.keys().enumerate() {
            if expected as u32 != *actual {
                return Err(DrivePanic::new(format!(
                    "bucket {index}: non-contiguous data channel numbering ({expected} -> {actual})"
                ))
                .into());
            }
        }

        let (cache_channel_id, cache) = Self::load_or_rebuild_cache(
            platform,
            category_id,
            index,
            cache_channel_id,
            &data_channels,
            limits.min_msg_per_channel,
        )
        .await?;

        let cache_message_id = Self::fetch_cache_message_id(platform, cache_channel_id, &cache).await?;

        Ok(Self {
            index,
            category_id,
            cache_channel_id,
            cache_message_id,
            data_channels,
            cache,
            limits,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn load_or_rebuild_cache(
        platform: &dyn ChatPlatform,
        category_id: CategoryId,
        index: u32,
        cache_channel_id: Option<ChannelId>,
        data_channels: &BTreeMap<u32, ChannelId>,
        min_msg_per_channel: usize,
    ) -> EngineResult<(ChannelId, BTreeMap<ChannelId, u64>)> {
        let cache_channel_id = match cache_channel_id {
            Some(id) => id,
            None => {
                warn!(bucket = index, "no _cache channel found, creating and rebuilding");
                platform.create_channel(category_id, CACHE_CHANNEL_NAME).await?
            }
        };

        let mut recent = platform.recent_messages(cache_channel_id, 1).await?;
        let latest = recent.pop();

        match latest {
            None => {
                let cache = Self::rebuild_cache(platform, index, data_channels, min_msg_per_channel).await?;
                Ok((cache_channel_id, cache))
            }
            Some(msg) if msg.author_id != platform.bot_user_id() => {
                warn!(bucket = index, "latest _cache message is not drive-authored, discarding");
                platform.delete_message(cache_channel_id, msg.id).await?;
                let cache = Self::rebuild_cache(platform, index, data_channels, min_msg_per_channel).await?;
                Ok((cache_channel_id, cache))
            }
            Some(msg) => {
                let cache = Self::decode_cache(&msg.content).ok_or_else(|| {
                    DrivePanic::new(format!("bucket {index}: unparseable _cache message"))
                })?;
                Ok((cache_channel_id, cache))
            }
        }
    }

    async fn fetch_cache_message_id(
        platform: &dyn ChatPlatform,
        cache_channel_id: ChannelId,
        cache: &BTreeMap<ChannelId, u64>,
    ) -> EngineResult<MessageId> {
        let recent = platform.recent_messages(cache_channel_id, 1).await?;
        if let Some(msg) = recent.into_iter().next() {
            return Ok(msg.id);
        }
        let content = Self::encode_cache(cache);
        Ok(platform.send_message(cache_channel_id, &content).await?)
    }

    fn encode_cache(cache: &BTreeMap<ChannelId, u64>) -> String {
        let json = serde_json::to_string(cache).expect("u64 map always serializes");
        BASE64.encode(json)
    }

    fn decode_cache(content: &str) -> Option<BTreeMap<ChannelId, u64>> {
        let raw = BASE64.decode(content).ok()?;
        let text = String::from_utf8(raw).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Scan each data channel's newest `min_msg_per_channel` messages,
    /// summing the body length of every drive-authored one.
    pub async fn rebuild_cache(
        platform: &dyn ChatPlatform,
        index: u32,
        data_channels: &BTreeMap<u32, ChannelId>,
        min_msg_per_channel: usize,
    ) -> EngineResult<BTreeMap<ChannelId, u64>> {
        let mut cache = BTreeMap::new();
        for channel_id in data_channels.values() {
            let messages = platform
                .recent_messages(*channel_id, min_msg_per_channel)
                .await?;
            let mut size = 0u64;
            for msg in messages {
                if msg.author_id != platform.bot_user_id() {
                    warn!(bucket = index, channel = channel_id, "found junk message, ignoring");
                    continue;
                }
                size += Chunk::content_len_of(&msg.content) as u64;
            }
            cache.insert(*channel_id, size);
        }
        info!(bucket = index, "rebuilt cache");
        Ok(cache)
    }

    async fn persist_cache(&mut self, platform: &dyn ChatPlatform) -> EngineResult<()> {
        let content = Self::encode_cache(&self.cache);
        match platform
            .edit_message(self.cache_channel_id, self.cache_message_id, &content)
            .await
        {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(bucket = self.index, "cache message edit failed, sending new message");
                let id = platform.send_message(self.cache_channel_id, &content).await?;
                self.cache_message_id = id;
                Ok(())
            }
        }
    }

    /// Reserve a new chunk of `size` body bytes in the first data
    /// channel with room, writing a placeholder body. The bucket's
    /// cache is deliberately *not* incremented here; it only advances
    /// once real content lands, so two concurrent allocations racing on
    /// the same channel can transiently exceed its nominal capacity.
    pub async fn alloc(
        &mut self,
        platform: &dyn ChatPlatform,
        size: usize,
    ) -> EngineResult<Option<(ChannelId, MessageId)>> {
        let candidate = self
            .data_channels
            .values()
            .find(|channel_id| {
                let used = *self.cache.get(*channel_id).unwrap_or(&0) as usize;
                size <= self.limits.total_channel_content_size().saturating_sub(used)
            })
            .copied();
        let Some(channel_id) = candidate else {
            return Ok(None);
        };
        let id = platform
            .send_message(channel_id, ALLOC_PLACEHOLDER_CONTENT)
            .await?;
        Ok(Some((channel_id, id)))
    }

    pub async fn increment(
        &mut self,
        platform: &dyn ChatPlatform,
        channel_id: ChannelId,
        delta: u64,
    ) -> EngineResult<()> {
        let entry = self.cache.entry(channel_id).or_insert(0);
        *entry += delta;
        info!(bucket = self.index, channel = channel_id, delta, "appended to cache");
        self.persist_cache(platform).await
    }

    pub async fn decrement(
        &mut self,
        platform: &dyn ChatPlatform,
        channel_id: ChannelId,
        delta: u64,
    ) -> EngineResult<()> {
        match self.cache.get_mut(&channel_id) {
            Some(value) => {
                *value = value.saturating_sub(delta);
            }
            None => {
                warn!(
                    bucket = self.index,
                    channel = channel_id,
                    delta,
                    "failed to subtract from cache for untracked channel"
                );
                return Ok(());
            }
        }
        info!(bucket = self.index, channel = channel_id, delta, "subtracted from cache");
        self.persist_cache(platform).await
    }

    /// Re-scan every data channel and replace the live cache wholesale,
    /// the bucket-level half of the debug "recache" admin operation.
    pub async fn recache(&mut self, platform: &dyn ChatPlatform) -> EngineResult<()> {
        self.cache = Self::rebuild_cache(
            platform,
            self.index,
            &self.data_channels,
            self.limits.min_msg_per_channel,
        )
        .await?;
        self.persist_cache(platform).await
    }

    pub fn memory_usage(&self) -> u64 {
        self.cache.values().sum()
    }

    pub fn channel_count(&self) -> usize {
        self.data_channels.len()
    }

    pub fn has_room_for_channel(&self) -> bool {
        self.data_channels.len() < self.limits.max_channels_per_bucket
    }

    pub fn contains_channel(&self, channel_id: ChannelId) -> bool {
        self.data_channels.values().any(|c| *c == channel_id) || channel_id == self.cache_channel_id
    }

    /// Register a freshly created data channel, e.g. from
    /// `Allocator::create_new_data_channel`.
    pub async fn register_data_channel(
        &mut self,
        platform: &dyn ChatPlatform,
        channel_id: ChannelId,
    ) -> EngineResult<()> {
        let next_index = self.data_channels.len() as u32;
        self.data_channels.insert(next_index, channel_id);
        self.cache.insert(channel_id, 0);
        self.persist_cache(platform).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_platform::MemoryPlatform;

    async fn fresh_bucket(platform: &MemoryPlatform, index: u32) -> (CategoryId, Bucket) {
        let category = platform.create_category("data_0", vec![]).await.unwrap();
        let bucket = Bucket::init(platform, category, index, DriveLimits::default()).await.unwrap();
        (category, bucket)
    }

    #[tokio::test]
    async fn init_creates_channel_zero_when_bucket_is_empty() {
        let platform = MemoryPlatform::new(1);
        let (_category, bucket) = fresh_bucket(&platform, 0).await;
        assert_eq!(bucket.channel_count(), 1);
        assert_eq!(bucket.memory_usage(), 0);
    }

    #[tokio::test]
    async fn alloc_does_not_bump_cache_until_increment_is_called() {
        let platform = MemoryPlatform::new(1);
        let (_category, mut bucket) = fresh_bucket(&platform, 0).await;

        let (channel_id, msg_id) = bucket.alloc(&platform, 4).await.unwrap().unwrap();
        assert_eq!(bucket.memory_usage(), 0);

        bucket.increment(&platform, channel_id, 4).await.unwrap();
        assert_eq!(bucket.memory_usage(), 4);

        // the allocated message exists and holds the placeholder body
        let msg = platform.fetch_message(channel_id, msg_id).await.unwrap().unwrap();
        assert_eq!(msg.content, ALLOC_PLACEHOLDER_CONTENT);
    }

    #[tokio::test]
    async fn decrement_clamps_at_zero() {
        let platform = MemoryPlatform::new(1);
        let (_category, mut bucket) = fresh_bucket(&platform, 0).await;
        let channel_id = *bucket.data_channels.values().next().unwrap();

        bucket.decrement(&platform, channel_id, 100).await.unwrap();
        assert_eq!(bucket.memory_usage(), 0);
    }

    #[tokio::test]
    async fn rebuild_cache_sums_drive_authored_messages_only() {
        let platform = MemoryPlatform::new(1);
        let category = platform.create_category("data_0", vec![]).await.unwrap();
        let channel = platform.create_channel(category, "0").await.unwrap();
        platform.send_message(channel, "aGk=@END").await.unwrap();

        let mut data_channels = BTreeMap::new();
        data_channels.insert(0, channel);
        let limits = DriveLimits::default();
        let cache = Bucket::rebuild_cache(&platform, 0, &data_channels, limits.min_msg_per_channel)
            .await
            .unwrap();
        assert_eq!(cache.get(&channel), Some(&4));
    }
}
