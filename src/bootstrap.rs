//! Drive bootstrap: one-time creation of a fresh drive's
//! channels/roles/categories, and reassembly of an existing one from
//! previously recorded pointers.
//!
//! Registration modals, embeds, member role assignment, and leaving the
//! server on a permission error belong to a collaborator outside this
//! storage engine and have no counterpart here.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::info;

use crate::allocator::Allocator;
use crate::config::DriveLimits;
use crate::drive::Drive;
use crate::error::{DrivePanic, EngineResult};
use crate::platform::{CategoryId, ChannelId, ChatPlatform, RoleId, RoleOverwrite};
use crate::tree::Tree;
use crate::tree_codec;

const META_CATEGORY: &str = "meta";
const LOGS_CHANNEL: &str = "_logs";
const STRUCT_CHANNEL: &str = "_struct";
const CONSOLE_CHANNEL: &str = "console";
const DATA_BUCKET_PREFIX: &str = "data_";

/// Every id an operator must persist between process restarts to
/// reassemble a drive without re-running [`initialize_drive`].
/// Grounded on `pointers.py::_GuildPointers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrivePointers {
    pub console_channel: ChannelId,
    pub logs_channel: ChannelId,
    pub struct_channel: ChannelId,
    pub read_role: RoleId,
    pub write_role: RoleId,
    pub admin_role: RoleId,
    pub owner_role: RoleId,
}

/// Create every role, category, and channel a fresh drive needs, seed
/// an empty root directory, and return both the pointer set a caller
/// should persist and the ready-to-use [`Drive`], under the default
/// [`DriveLimits`].
pub async fn initialize_drive(
    platform: Arc<dyn ChatPlatform>,
) -> EngineResult<(DrivePointers, Drive)> {
    initialize_drive_with_limits(platform, DriveLimits::default()).await
}

/// As [`initialize_drive`], but validating against caller-supplied
/// capacity limits rather than the defaults.
pub async fn initialize_drive_with_limits(
    platform: Arc<dyn ChatPlatform>,
    limits: DriveLimits,
) -> EngineResult<(DrivePointers, Drive)> {
    // Which member holds the owner role is the platform's own
    // server-owner identification to assign (an external collaborator's
    // job); this engine only needs the role itself to exist so the
    // permission cascade has something to consult (spec.md §6).
    let owner_role = platform.create_role("DriveCord-owner").await?;
    let admin_role = platform.create_role("DriveCord-admin").await?;
    let write_role = platform.create_role("DriveCord-write").await?;
    let read_role = platform.create_role("DriveCord-read").await?;

    let system_overwrites = vec![RoleOverwrite {
        role: admin_role,
        can_view: true,
    }];

    let meta_category = platform
        .create_category(META_CATEGORY, system_overwrites.clone())
        .await?;
    let console_channel = platform.create_channel(meta_category, CONSOLE_CHANNEL).await?;
    let logs_channel = platform.create_channel(meta_category, LOGS_CHANNEL).await?;
    let struct_channel = platform.create_channel(meta_category, STRUCT_CHANNEL).await?;

    let data0_category = platform
        .create_category(&format!("{DATA_BUCKET_PREFIX}0"), system_overwrites)
        .await?;
    let bucket = crate::bucket::Bucket::init(&*platform, data0_category, 0, limits.clone()).await?;

    let empty_tree = Tree::with_limits(limits.clone());
    let exported = tree_codec::export(&empty_tree, empty_tree.root());
    platform
        .send_message(struct_channel, &BASE64.encode(exported))
        .await?;

    let pointers = DrivePointers {
        console_channel,
        logs_channel,
        struct_channel,
        read_role,
        write_role,
        admin_role,
        owner_role,
    };

    info!("initialized fresh drive");
    let allocator = Allocator::new(vec![bucket], admin_role, limits.clone());
    let drive = Drive::new(
        platform,
        logs_channel,
        struct_channel,
        console_channel,
        read_role,
        write_role,
        admin_role,
        owner_role,
        allocator,
        limits,
    );

    Ok((pointers, drive))
}

/// Reassemble a [`Drive`] from previously recorded [`DrivePointers`] by
/// scanning every `data_<index>` category back into its [`Bucket`],
/// under the default [`DriveLimits`].
pub async fn discover_drive(
    platform: Arc<dyn ChatPlatform>,
    pointers: DrivePointers,
) -> EngineResult<Drive> {
    discover_drive_with_limits(platform, pointers, DriveLimits::default()).await
}

/// As [`discover_drive`], but validating against caller-supplied
/// capacity limits rather than the defaults.
/// Grounded on `DriveGuild.init`'s category-scan reconciliation path.
pub async fn discover_drive_with_limits(
    platform: Arc<dyn ChatPlatform>,
    pointers: DrivePointers,
    limits: DriveLimits,
) -> EngineResult<Drive> {
    let categories = platform.list_categories().await?;

    let mut indexed: Vec<(u32, CategoryId)> = categories
        .into_iter()
        .filter_map(|(id, name)| {
            name.strip_prefix(DATA_BUCKET_PREFIX)
                .and_then(|suffix| suffix.parse::<u32>().ok())
                .map(|index| (index, id))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.is_empty() {
        return Err(DrivePanic::new("no data buckets found while discovering drive").into());
    }

    let mut buckets = Vec::with_capacity(indexed.len());
    for (expected, (index, category_id)) in indexed.iter().enumerate() {
        if expected as u32 != *index {
            return Err(DrivePanic::new(format!(
                "non-contiguous bucket numbering ({expected} -> {index})"
            ))
            .into());
        }
        buckets.push(crate::bucket::Bucket::init(&*platform, *category_id, *index, limits.clone()).await?);
    }

    info!(buckets = buckets.len(), "discovered existing drive");
    let allocator = Allocator::new(buckets, pointers.admin_role, limits.clone());
    Ok(Drive::new(
        platform,
        pointers.logs_channel,
        pointers.struct_channel,
        pointers.console_channel,
        pointers.read_role,
        pointers.write_role,
        pointers.admin_role,
        pointers.owner_role,
        allocator,
        limits,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_platform::MemoryPlatform;

    #[tokio::test]
    async fn initialize_then_discover_round_trips_pointer_set() {
        let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(1));
        let (pointers, drive) = initialize_drive(platform.clone()).await.unwrap();
        assert_eq!(drive.bucket_count().await, 1);

        let rediscovered = discover_drive(platform, pointers).await.unwrap();
        assert_eq!(rediscovered.bucket_count().await, 1);
        assert_eq!(rediscovered.read_role(), pointers.read_role);
        assert_eq!(rediscovered.write_role(), pointers.write_role);
        assert_eq!(rediscovered.admin_role(), pointers.admin_role);
        assert_eq!(rediscovered.owner_role(), pointers.owner_role);
    }

    #[tokio::test]
    async fn fresh_drive_has_an_empty_root() {
        let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(1));
        let (_pointers, drive) = initialize_drive(platform).await.unwrap();
        let listing = drive.render_tree().await.unwrap();
        assert_eq!(listing.trim(), "[~]");
    }
}
