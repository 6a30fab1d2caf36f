//! Allocator / memory manager: owns every [`Bucket`] in a drive and
//! turns chunk-sized write requests into concrete `(channel, message)`
//! placements, plus chain walking for reads and deletes.

use std::collections::VecDeque;

use tracing::{info, warn};

use crate::address::{MemoryAddress, NextPointer};
use crate::bucket::Bucket;
use crate::chunk::Chunk;
use crate::config::DriveLimits;
use crate::error::{DriveError, EngineError, EngineResult};
use crate::platform::{CategoryId, ChannelId, ChatPlatform, MessageId, RoleId, RoleOverwrite};

/// Which category a fresh bucket belongs under, handed back so the
/// caller (bootstrap/drive) never has to guess a name.
fn bucket_category_name(index: u32) -> String {
    format!("data_{index}")
}

/// Owns every bucket in a drive and arbitrates chunk placement across
/// them.
pub struct Allocator {
    buckets: Vec<Bucket>,
    /// Role granted view (not send) access on freshly created bucket
    /// categories, mirroring bootstrap's admin-role overwrite.
    admin_role: RoleId,
    recently_deleted: VecDeque<(ChannelId, MessageId)>,
    limits: DriveLimits,
}

impl Allocator {
    pub fn new(buckets: Vec<Bucket>, admin_role: RoleId, limits: DriveLimits) -> Self {
        Self {
            buckets,
            admin_role,
            recently_deleted: VecDeque::with_capacity(limits.recently_deleted_capacity),
            limits,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn total_memory_usage(&self) -> u64 {
        self.buckets.iter().map(Bucket::memory_usage).sum()
    }

    pub fn find_bucket_by_channel(&self, channel_id: ChannelId) -> Option<usize> {
        self.buckets
            .iter()
            .position(|b| b.contains_channel(channel_id))
    }

    pub fn find_bucket_by_category(&self, category_id: CategoryId) -> Option<usize> {
        self.buckets.iter().position(|b| b.category_id == category_id)
    }

    /// Reserve space for a chunk of `size` body bytes, expanding
    /// capacity (new channel, then new bucket) as needed. Retries once
    /// after each expansion, mirroring the Python source's recursive
    /// `alloc_message`.
    pub async fn alloc_chunk(
        &mut self,
        platform: &dyn ChatPlatform,
        size: usize,
    ) -> EngineResult<(ChannelId, MessageId)> {
        if let Some(placement) = self.try_alloc_existing(platform, size).await? {
            return Ok(placement);
        }

        if self.expand_with_new_channel(platform).await? {
            if let Some(placement) = self.try_alloc_existing(platform, size).await? {
                return Ok(placement);
            }
        }

        if self.expand_with_new_bucket(platform).await? {
            if let Some(placement) = self.try_alloc_existing(platform, size).await? {
                return Ok(placement);
            }
        }

        warn!("allocator out of memory after expansion");
        Err(EngineError::Drive(DriveError::OutOfMemory))
    }

    async fn try_alloc_existing(
        &mut self,
        platform: &dyn ChatPlatform,
        size: usize,
    ) -> EngineResult<Option<(ChannelId, MessageId)>> {
        for bucket in self.buckets.iter_mut() {
            if let Some(placement) = bucket.alloc(platform, size).await? {
                return Ok(Some(placement));
            }
        }
        Ok(None)
    }

    /// Create a new data channel in the bucket with the fewest
    /// channels that still has room. Returns `false` if every existing
    /// bucket is already at its configured channel-per-bucket limit.
    async fn expand_with_new_channel(&mut self, platform: &dyn ChatPlatform) -> EngineResult<bool> {
        let target = self
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.has_room_for_channel())
            .min_by_key(|(_, b)| b.channel_count())
            .map(|(i, _)| i);

        let Some(index) = target else {
            return Ok(false);
        };

        let bucket = &mut self.buckets[index];
        let name = bucket.channel_count().to_string();
        let channel_id = platform.create_channel(bucket.category_id, &name).await?;
        info!(bucket = bucket.index, channel = %name, "created new data channel");
        bucket.register_data_channel(platform, channel_id).await?;
        Ok(true)
    }

    /// Create bucket `M` (`M = len(buckets)`), applying the same
    /// view-only role overwrite used at drive bootstrap. Returns
    /// `false` once the configured bucket limit has been reached.
    async fn expand_with_new_bucket(&mut self, platform: &dyn ChatPlatform) -> EngineResult<bool> {
        if self.buckets.len() >= self.limits.max_buckets {
            return Ok(false);
        }

        let index = self.buckets.len() as u32;
        let name = bucket_category_name(index);
        let overwrites = vec![RoleOverwrite {
            role: self.admin_role,
            can_view: true,
        }];
        let category_id = platform.create_category(&name, overwrites).await?;
        info!(bucket = index, category = %name, "created new bucket");
        let bucket = Bucket::init(platform, category_id, index, self.limits.clone()).await?;
        self.buckets.push(bucket);
        Ok(true)
    }

    /// Follow a chunk chain from `start` to its `END` sentinel,
    /// returning every hop's address paired with its decoded chunk, in
    /// chain order. A hop whose message cannot be fetched is reported
    /// as [`DriveError::InvalidMemAddr`] (`get_content_trace` in the
    /// original source); a hop whose content cannot be decoded is
    /// reported as [`DriveError::BrokenMemory`] via [`Chunk::decode`].
    pub async fn trace(
        &self,
        platform: &dyn ChatPlatform,
        start: MemoryAddress,
    ) -> EngineResult<Vec<(MemoryAddress, Chunk)>> {
        let mut out = Vec::new();
        let mut cursor = NextPointer::Addr(start);

        loop {
            let addr = match cursor {
                NextPointer::End => break,
                NextPointer::Addr(addr) => addr,
            };
            let message = platform
                .fetch_message(addr.channel_id, addr.message_id)
                .await?
                .ok_or(DriveError::InvalidMemAddr)?;
            let chunk = Chunk::decode(&message.content)?;
            cursor = chunk.next;
            out.push((addr, chunk));
        }

        Ok(out)
    }

    /// Subtract every chunk in a previously traced chain from its
    /// owning bucket's cache. Grounded on
    /// `MemoryManager.remove_from_cache`.
    pub async fn remove_from_cache(
        &mut self,
        platform: &dyn ChatPlatform,
        trace: &[(MemoryAddress, Chunk)],
    ) -> EngineResult<()> {
        for (addr, chunk) in trace {
            self.decrement_channel_cache(platform, addr.channel_id, chunk.content_len() as u64)
                .await?;
        }
        Ok(())
    }

    /// Re-add the post-write body length of every surviving chunk to
    /// its owning bucket's cache. Grounded on `MemoryManager.cache_sizes`.
    pub async fn cache_sizes(
        &mut self,
        platform: &dyn ChatPlatform,
        entries: &[(MemoryAddress, usize)],
    ) -> EngineResult<()> {
        for (addr, len) in entries {
            self.increment_channel_cache(platform, addr.channel_id, *len as u64)
                .await?;
        }
        Ok(())
    }

    async fn increment_channel_cache(
        &mut self,
        platform: &dyn ChatPlatform,
        channel_id: ChannelId,
        delta: u64,
    ) -> EngineResult<()> {
        if let Some(index) = self.find_bucket_by_channel(channel_id) {
            self.buckets[index].increment(platform, channel_id, delta).await?;
        }
        Ok(())
    }

    async fn decrement_channel_cache(
        &mut self,
        platform: &dyn ChatPlatform,
        channel_id: ChannelId,
        delta: u64,
    ) -> EngineResult<()> {
        if let Some(index) = self.find_bucket_by_channel(channel_id) {
            self.buckets[index].decrement(platform, channel_id, delta).await?;
        }
        Ok(())
    }

    /// Free one chunk: delete its message, subtract its body length
    /// from the owning bucket's cache, and record it in the bounded
    /// recently-deleted queue.
    pub async fn free_chunk(
        &mut self,
        platform: &dyn ChatPlatform,
        addr: MemoryAddress,
    ) -> EngineResult<()> {
        let message = platform
            .fetch_message(addr.channel_id, addr.message_id)
            .await?;
        let size = message
            .as_ref()
            .map(|m| Chunk::content_len_of(&m.content) as u64)
            .unwrap_or(0);

        platform.delete_message(addr.channel_id, addr.message_id).await?;

        if let Some(index) = self.find_bucket_by_channel(addr.channel_id) {
            self.buckets[index]
                .decrement(platform, addr.channel_id, size)
                .await?;
        }

        if self.recently_deleted.len() == self.limits.recently_deleted_capacity {
            self.recently_deleted.pop_front();
        }
        self.recently_deleted.push_back((addr.channel_id, addr.message_id));

        Ok(())
    }

    /// Free every chunk in a file's chain, starting from `start`.
    pub async fn wipe_file(
        &mut self,
        platform: &dyn ChatPlatform,
        start: MemoryAddress,
    ) -> EngineResult<()> {
        let chain = self.trace(platform, start).await?;
        for (addr, _chunk) in chain {
            self.free_chunk(platform, addr).await?;
        }
        Ok(())
    }

    /// Free every chunk belonging to every file under a directory. The
    /// tree walk that enumerates `starts` is the caller's
    /// responsibility (component E); this just fans out `wipe_file`.
    pub async fn wipe_dir(
        &mut self,
        platform: &dyn ChatPlatform,
        starts: impl IntoIterator<Item = MemoryAddress>,
    ) -> EngineResult<()> {
        for start in starts {
            self.wipe_file(platform, start).await?;
        }
        Ok(())
    }

    pub fn was_recently_deleted(&self, channel_id: ChannelId, message_id: MessageId) -> bool {
        self.recently_deleted.contains(&(channel_id, message_id))
    }

    /// Rebuild every bucket's cache from scratch, the debug "recache"
    /// admin operation.
    pub async fn rebuild_all_caches(&mut self, platform: &dyn ChatPlatform) -> EngineResult<()> {
        for bucket in self.buckets.iter_mut() {
            bucket.recache(platform).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_platform::MemoryPlatform;

    async fn fresh_allocator(platform: &MemoryPlatform) -> Allocator {
        let category = platform.create_category("data_0", vec![]).await.unwrap();
        let bucket = Bucket::init(platform, category, 0, DriveLimits::default()).await.unwrap();
        Allocator::new(vec![bucket], 1, DriveLimits::default())
    }

    #[tokio::test]
    async fn alloc_then_trace_round_trips_a_single_chunk_chain() {
        let platform = MemoryPlatform::new(1);
        let mut allocator = fresh_allocator(&platform).await;

        let (channel_id, message_id) = allocator.alloc_chunk(&platform, 4).await.unwrap();
        let chunk = Chunk::new("aGk=", NextPointer::End);
        platform
            .edit_message(channel_id, message_id, &chunk.encode())
            .await
            .unwrap();

        let addr = MemoryAddress::new(channel_id, message_id);
        let chain = allocator.trace(&platform, addr).await.unwrap();
        assert_eq!(chain, vec![(addr, chunk)]);
    }

    #[tokio::test]
    async fn alloc_chunk_expands_to_a_new_channel_once_the_first_is_full() {
        let platform = MemoryPlatform::new(1);
        let mut allocator = fresh_allocator(&platform).await;

        // fill channel 0 past its capacity with one oversized request
        let (first_channel, _) = allocator
            .alloc_chunk(&platform, crate::limits::TOTAL_CHANNEL_CONTENT_SIZE)
            .await
            .unwrap();
        allocator.buckets[0]
            .increment(&platform, first_channel, crate::limits::TOTAL_CHANNEL_CONTENT_SIZE as u64)
            .await
            .unwrap();

        let (second_channel, _) = allocator.alloc_chunk(&platform, 10).await.unwrap();
        assert_ne!(first_channel, second_channel);
        assert_eq!(allocator.buckets[0].channel_count(), 2);
    }

    #[tokio::test]
    async fn free_chunk_records_it_in_the_recently_deleted_queue() {
        let platform = MemoryPlatform::new(1);
        let mut allocator = fresh_allocator(&platform).await;

        let (channel_id, message_id) = allocator.alloc_chunk(&platform, 4).await.unwrap();
        let addr = MemoryAddress::new(channel_id, message_id);
        allocator.free_chunk(&platform, addr).await.unwrap();

        assert!(allocator.was_recently_deleted(channel_id, message_id));
        assert!(platform
            .fetch_message(channel_id, message_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cache_sizes_then_remove_from_cache_round_trips_bucket_usage() {
        let platform = MemoryPlatform::new(1);
        let mut allocator = fresh_allocator(&platform).await;

        let (channel_id, message_id) = allocator.alloc_chunk(&platform, 4).await.unwrap();
        let addr = MemoryAddress::new(channel_id, message_id);
        let chunk = Chunk::new("aGk=", NextPointer::End);
        platform.edit_message(channel_id, message_id, &chunk.encode()).await.unwrap();

        allocator.cache_sizes(&platform, &[(addr, 4)]).await.unwrap();
        assert_eq!(allocator.total_memory_usage(), 4);

        let trace = allocator.trace(&platform, addr).await.unwrap();
        allocator.remove_from_cache(&platform, &trace).await.unwrap();
        assert_eq!(allocator.total_memory_usage(), 0);
    }

    #[tokio::test]
    async fn trace_reports_invalid_mem_addr_for_a_dangling_pointer() {
        let platform = MemoryPlatform::new(1);
        let allocator = fresh_allocator(&platform).await;
        let dangling = MemoryAddress::new(999, 999);
        let err = allocator.trace(&platform, dangling).await.unwrap_err();
        assert!(matches!(err, EngineError::Drive(DriveError::InvalidMemAddr)));
    }
}
