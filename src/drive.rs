//! Drive instance: composes the allocator and the serialized tree
//! behind a single per-server file-operation API.
//!
//! A `Drive` holds no persistent in-memory tree of its own — every
//! operation re-fetches and re-parses the struct message
//! (`get_struct`) rather than caching it across calls. This means two
//! concurrent operations can observe different tree snapshots; only
//! the per-file write lock serializes against that.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::allocator::Allocator;
use crate::chunk::{split_body, Chunk};
use crate::config::DriveLimits;
use crate::error::{DriveError, DrivePanic, DriveResult, EngineError, EngineResult};
use crate::limits::{BLANK_FILE_CONTENT, ROOT_NAME};
use crate::paths::{basename, dirname, HOME_DIR};
use crate::permissions::Permissions;
use crate::platform::{ChannelId, ChatPlatform, RoleId, UserId};
use crate::address::{MemoryAddress, NextPointer};
use crate::tree::{validate_name, NodeId, Tree};
use crate::tree_codec;

/// Options accompanying a [`Drive::write`] call.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Treat `content` as already-encoded body text rather than raw
    /// bytes to base64-encode. Used internally by tooling that already
    /// holds an encoded payload (e.g. a cache-rebuild or migration
    /// tool) rather than by ordinary file writes.
    pub skip_encoding: bool,
    /// Override the persisted `size` rather than deriving it from
    /// `content.len()`.
    pub fixed_size: Option<u64>,
}

/// A `File`'s payload as returned to a caller pulling it, or a `Dir`'s
/// zipped descendants.
pub struct PulledObject {
    pub name: String,
    pub bytes: Vec<u8>,
    pub is_zip: bool,
}

/// All storage state associated with one chat server: buckets, struct
/// tree, locks, CWDs. One instance per drive, held behind the registry.
pub struct Drive {
    platform: std::sync::Arc<dyn ChatPlatform>,
    logs_channel: ChannelId,
    struct_channel: ChannelId,
    #[allow(dead_code)] // asserted to exist, not otherwise read by the core
    console_channel: ChannelId,
    read_role: RoleId,
    write_role: RoleId,
    admin_role: RoleId,
    #[allow(dead_code)] // asserted to exist (spec.md §6); assignment is an external collaborator's concern
    owner_role: RoleId,
    allocator: Mutex<Allocator>,
    locked_files: Mutex<HashSet<String>>,
    cwd_cache: Mutex<HashMap<UserId, String>>,
    poisoned: AtomicBool,
    poison_reason: Mutex<Option<String>>,
    limits: DriveLimits,
}

impl Drive {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: std::sync::Arc<dyn ChatPlatform>,
        logs_channel: ChannelId,
        struct_channel: ChannelId,
        console_channel: ChannelId,
        read_role: RoleId,
        write_role: RoleId,
        admin_role: RoleId,
        owner_role: RoleId,
        allocator: Allocator,
        limits: DriveLimits,
    ) -> Self {
        Self {
            platform,
            logs_channel,
            struct_channel,
            console_channel,
            read_role,
            write_role,
            admin_role,
            owner_role,
            allocator: Mutex::new(allocator),
            locked_files: Mutex::new(HashSet::new()),
            cwd_cache: Mutex::new(HashMap::new()),
            poisoned: AtomicBool::new(false),
            poison_reason: Mutex::new(None),
            limits,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub async fn poison_reason(&self) -> Option<String> {
        self.poison_reason.lock().await.clone()
    }

    /// Collapse an [`EngineResult`] to the wire-stable [`DriveResult`],
    /// poisoning the drive as a side effect of any [`DrivePanic`]. The
    /// "leave the server" step that follows a panic belongs to an
    /// external collaborator, not this engine.
    async fn collapse<T>(&self, result: EngineResult<T>) -> DriveResult<T> {
        match result {
            Ok(v) => Ok(v),
            Err(EngineError::Drive(e)) => Err(e),
            Err(EngineError::Panic(panic)) => {
                error!(reason = %panic.reason, "drive panic");
                let line = format!("PANIC ERROR! {}", panic.reason);
                let _ = self.platform.send_message(self.logs_channel, &line).await;
                self.poisoned.store(true, Ordering::SeqCst);
                *self.poison_reason.lock().await = Some(panic.reason.clone());
                Err(DriveError::Internal(format!("drive panic: {}", panic.reason)))
            }
        }
    }

    async fn log(&self, message: &str) {
        info!(target: "drive", "{message}");
        let content = format!("`{message}`");
        if let Err(err) = self.platform.send_message(self.logs_channel, &content).await {
            warn!(%err, "failed to write audit log entry");
        }
    }

    // ---- struct channel -------------------------------------------------

    async fn find_struct_message(&self) -> EngineResult<crate::platform::ChatMessage> {
        loop {
            let mut recent = self.platform.recent_messages(self.struct_channel, 1).await?;
            let Some(msg) = recent.pop() else {
                return Err(DrivePanic::new("missing structure message").into());
            };
            if msg.author_id != self.platform.bot_user_id() {
                warn!("latest struct message is not drive-authored, discarding");
                self.platform.delete_message(self.struct_channel, msg.id).await?;
                continue;
            }
            return Ok(msg);
        }
    }

    async fn get_struct(&self) -> EngineResult<Tree> {
        let msg = self.find_struct_message().await?;
        let raw = BASE64
            .decode(&msg.content)
            .map_err(|_| DrivePanic::new("unparseable structure message (base64)"))?;
        let text = String::from_utf8(raw)
            .map_err(|_| DrivePanic::new("unparseable structure message (utf8)"))?;
        tree_codec::parse(&text, self.limits.clone())
            .map_err(|_| DrivePanic::new("unparseable structure message (grammar)").into())
    }

    /// Persist `tree`. A tree too large to fit in one message is logged
    /// and silently dropped rather than surfaced as a caller-visible
    /// error — a known limitation, not fixed here (see `DESIGN.md`).
    async fn set_struct(&self, tree: &Tree) -> EngineResult<()> {
        let exported = tree_codec::export(tree, tree.root());
        let content = BASE64.encode(exported);
        if content.len() > self.limits.msg_size {
            warn!("structure too large to persist in a single message, dropping update");
            return Ok(());
        }
        let msg = self.find_struct_message().await?;
        self.platform.edit_message(self.struct_channel, msg.id, &content).await?;
        Ok(())
    }

    // ---- CWD --------------------------------------------------------

    async fn set_cwd(&self, uid: UserId, path: String) {
        self.cwd_cache.lock().await.insert(uid, path);
    }

    /// Resolve `uid`'s current working directory against a freshly
    /// fetched tree. Returns `(tree, cwd, changed)`; `changed == false`
    /// whenever the CWD had to be reset to [`HOME_DIR`].
    async fn get_cwd(&self, uid: UserId) -> EngineResult<(Tree, NodeId, bool)> {
        let tree = self.get_struct().await?;
        let cwd_path = {
            let cache = self.cwd_cache.lock().await;
            cache.get(&uid).cloned().unwrap_or_else(|| HOME_DIR.to_string())
        };

        let resolved = tree.move_to(tree.root(), &cwd_path);
        let root = tree.root();

        match resolved {
            None => {
                self.set_cwd(uid, HOME_DIR.to_string()).await;
                Ok((tree, root, false))
            }
            Some(id) if tree.is_file(id) => {
                self.set_cwd(uid, HOME_DIR.to_string()).await;
                Ok((tree, root, false))
            }
            Some(id) if !tree.is_linked(id) => {
                self.set_cwd(uid, HOME_DIR.to_string()).await;
                warn!(uid, "cwd was unlinked from the base tree by a concurrent removal");
                Ok((tree, root, false))
            }
            Some(id) => Ok((tree, id, true)),
        }
    }

    // ---- file operations ---------------------------------------------

    pub async fn create_directory(&self, uid: UserId, path: &str) -> DriveResult<()> {
        let result = self.create_directory_inner(uid, path).await;
        self.collapse(result).await
    }

    async fn create_directory_inner(&self, uid: UserId, path: &str) -> EngineResult<()> {
        let name = basename(path);
        if validate_name(name, &self.limits).is_err() {
            return Err(DriveError::InvalidName.into());
        }

        let (mut tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            self.log(&format!("{uid} failed to create dir {name} (cwd error)")).await;
            return Err(DriveError::InvalidPath.into());
        }

        let parent_path = parent_segment(path);
        let Some(parent) = tree.move_to(cwd, parent_path) else {
            self.log(&format!("{uid} failed to create dir {path} (target directory not found)")).await;
            return Err(DriveError::InvalidPath.into());
        };
        if tree.is_file(parent) {
            self.log(&format!("{uid} failed to create dir {path} (target directory is a file)")).await;
            return Err(DriveError::InvalidPath.into());
        }
        if tree.has_object(parent, name) {
            return Err(DriveError::NameInUse.into());
        }

        tree.insert_dir(parent, name.to_string())?;
        self.set_struct(&tree).await?;
        self.log(&format!("{uid} created dir {name} at: {}", tree.path_to(parent))).await;
        Ok(())
    }

    pub async fn create_file(&self, uid: UserId, path: &str) -> DriveResult<()> {
        let result = self.create_file_inner(uid, path).await;
        self.collapse(result).await
    }

    async fn create_file_inner(&self, uid: UserId, path: &str) -> EngineResult<()> {
        let name = basename(path);
        if validate_name(name, &self.limits).is_err() {
            return Err(DriveError::InvalidName.into());
        }

        let (mut tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            self.log(&format!("{uid} failed to create file {path} (cwd error)")).await;
            return Err(DriveError::InvalidPath.into());
        }

        let parent_path = parent_segment(path);
        let Some(parent) = tree.move_to(cwd, parent_path) else {
            self.log(&format!("{uid} failed to create file {path} (target directory not found)")).await;
            return Err(DriveError::InvalidPath.into());
        };
        if tree.is_file(parent) {
            self.log(&format!("{uid} failed to create file {path} (target directory is a file)")).await;
            return Err(DriveError::InvalidPath.into());
        }
        if tree.has_object(parent, name) {
            return Err(DriveError::NameInUse.into());
        }

        let (channel_id, message_id) = {
            let mut allocator = self.allocator.lock().await;
            allocator.alloc_chunk(&*self.platform, BLANK_FILE_CONTENT.len()).await?
        };
        let blank = Chunk::new(BLANK_FILE_CONTENT, NextPointer::End);
        self.platform.edit_message(channel_id, message_id, &blank.encode()).await?;
        let mem_addr = MemoryAddress::new(channel_id, message_id);

        tree.insert_file(parent, name.to_string(), mem_addr, 1)?;
        self.set_struct(&tree).await?;
        self.log(&format!("{uid} created file {name} at: {}", tree.path_to(parent))).await;
        Ok(())
    }

    pub async fn delete(&self, uid: UserId, path: &str) -> DriveResult<()> {
        let result = self.delete_inner(uid, path).await;
        self.collapse(result).await
    }

    async fn delete_inner(&self, uid: UserId, path: &str) -> EngineResult<()> {
        let (mut tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            return Err(DriveError::InvalidPath.into());
        }

        let Some(target) = tree.move_to(cwd, path) else {
            return Err(DriveError::InvalidPath.into());
        };
        let target_path = tree.path_to(target);

        if target == tree.root() {
            self.log(&format!("{uid} failed to remove object: {target_path} (cannot remove root)")).await;
            return Err(DriveError::PermissionError.into());
        }

        if tree.is_file(target) && self.locked_files.lock().await.contains(&target_path) {
            self.log(&format!("{uid} failed to remove object: {target_path} (File is locked)")).await;
            return Err(DriveError::FileLocked.into());
        }

        let is_file = tree.is_file(target);
        let file_addr = tree.mem_addr(target);
        let dir_file_addrs: Vec<MemoryAddress> = if is_file {
            Vec::new()
        } else {
            tree.walk(target, true).iter().filter_map(|id| tree.mem_addr(*id)).collect()
        };

        tree.remove(target);

        {
            let mut allocator = self.allocator.lock().await;
            if is_file {
                if let Some(addr) = file_addr {
                    allocator.wipe_file(&*self.platform, addr).await?;
                }
            } else {
                allocator.wipe_dir(&*self.platform, dir_file_addrs).await?;
            }
        }

        self.set_struct(&tree).await?;
        self.log(&format!("{uid} removed object: {target_path}")).await;
        Ok(())
    }

    pub async fn rename(&self, uid: UserId, path: &str, new_name: &str) -> DriveResult<()> {
        let result = self.rename_inner(uid, path, new_name).await;
        self.collapse(result).await
    }

    async fn rename_inner(&self, uid: UserId, path: &str, new_name: &str) -> EngineResult<()> {
        if validate_name(new_name, &self.limits).is_err() {
            return Err(DriveError::InvalidName.into());
        }

        let (mut tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            return Err(DriveError::InvalidPath.into());
        }

        let Some(target) = tree.move_to(cwd, path) else {
            return Err(DriveError::InvalidPath.into());
        };
        let Some(parent) = tree.parent(target) else {
            return Err(DriveError::CannotRename.into());
        };
        if tree.has_object(parent, new_name) {
            return Err(DriveError::NameInUse.into());
        }

        let old_path = tree.path_to(target);
        tree.rename(target, new_name.to_string());
        self.set_struct(&tree).await?;
        self.log(&format!("{uid} renamed object: {old_path} -> {new_name}")).await;
        Ok(())
    }

    pub async fn read(&self, uid: UserId, path: &str) -> DriveResult<Vec<u8>> {
        let result = self.read_inner(uid, path).await;
        self.collapse(result).await
    }

    async fn read_inner(&self, uid: UserId, path: &str) -> EngineResult<Vec<u8>> {
        let (tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            self.log(&format!("{uid} failed to read file {path} (cwd error)")).await;
            return Err(DriveError::InvalidPath.into());
        }
        let Some(target) = tree.move_to(cwd, path) else {
            return Err(DriveError::InvalidPath.into());
        };
        if tree.is_dir(target) {
            return Err(DriveError::PathToDir.into());
        }

        self.read_file(&tree, target).await
    }

    /// Shared by [`Drive::read`] and [`Drive::pull`]. Grounded on
    /// `DriveGuild._read_file`.
    async fn read_file(&self, tree: &Tree, file: NodeId) -> EngineResult<Vec<u8>> {
        let path = tree.path_to(file);
        if self.locked_files.lock().await.contains(&path) {
            self.log(&format!("failed to read file {} (file is locked due to ongoing operation)", tree.name(file))).await;
            return Err(DriveError::FileLocked.into());
        }

        let mem_addr = tree.mem_addr(file).expect("file node always carries a mem_addr");
        let chain = {
            let allocator = self.allocator.lock().await;
            allocator.trace(&*self.platform, mem_addr).await?
        };

        let mut encoded = String::new();
        for (_addr, chunk) in &chain {
            if chunk.body == BLANK_FILE_CONTENT {
                continue;
            }
            encoded.push_str(&chunk.body);
        }

        BASE64
            .decode(encoded)
            .map_err(|_| DriveError::BrokenMemory.into())
    }

    pub async fn pull(&self, uid: UserId, path: &str) -> DriveResult<PulledObject> {
        let result = self.pull_inner(uid, path).await;
        self.collapse(result).await
    }

    async fn pull_inner(&self, uid: UserId, path: &str) -> EngineResult<PulledObject> {
        let (tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            self.log(&format!("{uid} failed to pull object {path} (cwd error)")).await;
            return Err(DriveError::InvalidPath.into());
        }
        let Some(target) = tree.move_to(cwd, path) else {
            self.log(&format!("{uid} failed to pull object {path} (target not found)")).await;
            return Err(DriveError::InvalidPath.into());
        };

        if tree.is_file(target) {
            let encoded_len = self.encoded_len(&tree, target).await?;
            if encoded_len > self.limits.pull_cap_bytes {
                return Err(DriveError::FileTooBig.into());
            }
            let bytes = self.read_file(&tree, target).await?;
            return Ok(PulledObject {
                name: tree.name(target).to_string(),
                bytes,
                is_zip: false,
            });
        }

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for file in tree.walk(target, true) {
                let rel_path = tree.path_to(file);
                let rel_path = rel_path.strip_prefix("~/").unwrap_or(&rel_path);
                let content = self.read_file(&tree, file).await?;
                writer
                    .start_file(rel_path, options)
                    .map_err(|e| DriveError::Internal(e.to_string()))?;
                writer.write_all(&content).map_err(|e| DriveError::Internal(e.to_string()))?;
            }
            writer.finish().map_err(|e| DriveError::Internal(e.to_string()))?;
        }

        let zip_name = if tree.name(target) == ROOT_NAME {
            "home.zip".to_string()
        } else {
            format!("{}.zip", tree.name(target))
        };

        Ok(PulledObject {
            name: zip_name,
            bytes: buf.into_inner(),
            is_zip: true,
        })
    }

    async fn encoded_len(&self, tree: &Tree, file: NodeId) -> EngineResult<usize> {
        let mem_addr = tree.mem_addr(file).expect("file node always carries a mem_addr");
        let chain = {
            let allocator = self.allocator.lock().await;
            allocator.trace(&*self.platform, mem_addr).await?
        };
        Ok(chain
            .iter()
            .map(|(_, c)| if c.body == BLANK_FILE_CONTENT { 0 } else { c.content_len() })
            .sum())
    }

    pub async fn write(
        &self,
        uid: UserId,
        path: &str,
        content: &[u8],
        opts: WriteOptions,
    ) -> DriveResult<()> {
        let result = self.write_inner(uid, path, content, opts).await;
        self.collapse(result).await
    }

    async fn write_inner(
        &self,
        uid: UserId,
        path: &str,
        content: &[u8],
        opts: WriteOptions,
    ) -> EngineResult<()> {
        let (mut tree, cwd, ok) = self.get_cwd(uid).await?;
        if !ok {
            self.log(&format!("{uid} failed to write file {path} (cwd error)")).await;
            return Err(DriveError::InvalidPath.into());
        }
        let Some(file) = tree.move_to(cwd, path) else {
            return Err(DriveError::InvalidPath.into());
        };
        if tree.is_dir(file) {
            return Err(DriveError::PathToDir.into());
        }

        let file_path = tree.path_to(file);
        {
            let mut locked = self.locked_files.lock().await;
            if locked.contains(&file_path) {
                self.log(&format!("{uid} failed to write file {} (file is locked due to an ongoing operation)", tree.name(file))).await;
                return Err(DriveError::FileLocked.into());
            }
            locked.insert(file_path.clone());
        }

        // Every exit past this point must release the lock entry.
        let outcome = self.write_locked(uid, &mut tree, file, &file_path, content, opts).await;
        self.locked_files.lock().await.remove(&file_path);
        outcome
    }

    async fn write_locked(
        &self,
        uid: UserId,
        tree: &mut Tree,
        file: NodeId,
        file_path: &str,
        content: &[u8],
        opts: WriteOptions,
    ) -> EngineResult<()> {
        let mem_addr = tree.mem_addr(file).expect("file node always carries a mem_addr");
        let old_trace = {
            let allocator = self.allocator.lock().await;
            match allocator.trace(&*self.platform, mem_addr).await {
                Ok(t) => t,
                Err(EngineError::Panic(panic)) => return Err(EngineError::Panic(panic)),
                Err(EngineError::Drive(_)) => {
                    // A write that can't re-trace its own file is surfaced as
                    // broken memory regardless of the underlying trace
                    // failure, mirroring the original source's local
                    // translation at the write call site rather than inside
                    // the shared trace walk.
                    self.log(&format!("{uid} failed to edit {}: broken file trace", tree.name(file))).await;
                    return Err(DriveError::BrokenMemory.into());
                }
            }
        };

        let body = if opts.skip_encoding {
            String::from_utf8(content.to_vec()).map_err(|_| DriveError::Internal("content is not valid UTF-8".into()))?
        } else {
            BASE64.encode(content)
        };
        let mut new_chunks = split_body(&body, self.limits.msg_size);
        if new_chunks.is_empty() {
            new_chunks.push(BLANK_FILE_CONTENT.to_string());
        }

        let size = opts.fixed_size.unwrap_or(content.len() as u64);
        tree.set_size(file, size);
        self.set_struct(tree).await?;

        {
            let mut allocator = self.allocator.lock().await;
            allocator.remove_from_cache(&*self.platform, &old_trace).await?;
        }

        let n_old = old_trace.len();
        let n_new = new_chunks.len();

        let final_addrs: Vec<MemoryAddress> = if n_new <= n_old {
            old_trace[..n_new].iter().map(|(addr, _)| *addr).collect()
        } else {
            let missing = n_new - n_old;
            let mut addrs: Vec<MemoryAddress> = old_trace.iter().map(|(addr, _)| *addr).collect();
            for i in 0..missing {
                let size = new_chunks[n_old + i].len();
                let allocation = {
                    let mut allocator = self.allocator.lock().await;
                    allocator.alloc_chunk(&*self.platform, size).await
                };
                match allocation {
                    Ok((channel_id, message_id)) => addrs.push(MemoryAddress::new(channel_id, message_id)),
                    Err(err) => {
                        self.log(&format!("{uid} failed to edit {}: out of memory", tree.name(file))).await;
                        return Err(err);
                    }
                }
            }
            addrs
        };

        if n_new < n_old {
            let mut allocator = self.allocator.lock().await;
            for (addr, _) in &old_trace[n_new..] {
                allocator.free_chunk(&*self.platform, *addr).await?;
            }
        }

        for (i, addr) in final_addrs.iter().enumerate() {
            let next = if i + 1 == final_addrs.len() {
                NextPointer::End
            } else {
                NextPointer::Addr(final_addrs[i + 1])
            };
            let chunk = Chunk::new(new_chunks[i].clone(), next);
            self.platform.edit_message(addr.channel_id, addr.message_id, &chunk.encode()).await?;
        }

        if let Some(&head) = final_addrs.first() {
            tree.set_mem_addr(file, head);
        }

        let entries: Vec<(MemoryAddress, usize)> = final_addrs
            .iter()
            .zip(new_chunks.iter())
            .map(|(addr, body)| (*addr, body.len()))
            .collect();
        {
            let mut allocator = self.allocator.lock().await;
            allocator.cache_sizes(&*self.platform, &entries).await?;
        }

        self.log(&format!("{uid} edited file: {}", tree.name(file))).await;
        Ok(())
    }

    // ---- ambient surface -----------------------------------------------

    pub async fn list_structure(&self) -> DriveResult<String> {
        let result = self.get_struct().await.map(|tree| tree_codec::export(&tree, tree.root()));
        self.collapse(result).await
    }

    pub async fn render_tree(&self) -> DriveResult<String> {
        let result = self.get_struct().await.map(|tree| tree.render_tree(tree.root()));
        self.collapse(result).await
    }

    /// Applies the cascade over caller-supplied role membership. Which
    /// roles a user holds is resolved by an external collaborator; this
    /// only ever applies the pure boolean logic.
    pub fn permissions(&self, read: bool, write: bool, admin: bool, owner: bool) -> Permissions {
        Permissions::new(read, write, admin, owner)
    }

    pub fn read_role(&self) -> RoleId {
        self.read_role
    }

    pub fn write_role(&self) -> RoleId {
        self.write_role
    }

    pub fn admin_role(&self) -> RoleId {
        self.admin_role
    }

    pub fn owner_role(&self) -> RoleId {
        self.owner_role
    }

    pub async fn memory_usage(&self) -> u64 {
        self.allocator.lock().await.total_memory_usage()
    }

    pub async fn bucket_count(&self) -> usize {
        self.allocator.lock().await.bucket_count()
    }

    /// Force a full cache rebuild across every bucket, the debug
    /// "recache" admin operation.
    pub async fn recache(&self) -> DriveResult<()> {
        let result = self.recache_inner().await;
        self.collapse(result).await
    }

    async fn recache_inner(&self) -> EngineResult<()> {
        self.allocator.lock().await.rebuild_all_caches(&*self.platform).await
    }
}

/// `dirname(path)`, falling back to `"."` (resolve against the CWD
/// itself) for a bare child path with no parent segment.
fn parent_segment(path: &str) -> &str {
    match dirname(path) {
        "" => ".",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::memory_platform::MemoryPlatform;
    use std::sync::Arc;

    async fn fresh_drive() -> Drive {
        let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(1));
        let meta = platform.create_category("meta", vec![]).await.unwrap();
        let logs = platform.create_channel(meta, "_logs").await.unwrap();
        let struct_ch = platform.create_channel(meta, "_struct").await.unwrap();
        let console = platform.create_channel(meta, "console").await.unwrap();

        let empty_tree = Tree::new();
        let exported = tree_codec::export(&empty_tree, empty_tree.root());
        platform.send_message(struct_ch, &BASE64.encode(exported)).await.unwrap();

        let data_cat = platform.create_category("data_0", vec![]).await.unwrap();
        let bucket = Bucket::init(&*platform, data_cat, 0, DriveLimits::default()).await.unwrap();
        let allocator = Allocator::new(vec![bucket], 1, DriveLimits::default());

        Drive::new(platform, logs, struct_ch, console, 10, 11, 12, 13, allocator, DriveLimits::default())
    }

    #[tokio::test]
    async fn create_file_then_write_then_read_round_trips() {
        let drive = fresh_drive().await;
        drive.create_file(1, "hello.txt").await.unwrap();
        drive.write(1, "hello.txt", b"hi", WriteOptions::default()).await.unwrap();
        let content = drive.read(1, "hello.txt").await.unwrap();
        assert_eq!(content, b"hi");
    }

    #[tokio::test]
    async fn create_directory_then_nested_file() {
        let drive = fresh_drive().await;
        drive.create_directory(1, "docs").await.unwrap();
        drive.create_file(1, "docs/a.txt").await.unwrap();
        drive.write(1, "docs/a.txt", b"nested", WriteOptions::default()).await.unwrap();
        assert_eq!(drive.read(1, "docs/a.txt").await.unwrap(), b"nested");
    }

    #[tokio::test]
    async fn write_grows_across_multiple_chunks_then_shrinks() {
        let drive = fresh_drive().await;
        drive.create_file(1, "big").await.unwrap();

        let payload = vec![b'A'; 3000];
        drive.write(1, "big", &payload, WriteOptions::default()).await.unwrap();
        assert_eq!(drive.read(1, "big").await.unwrap(), payload);

        drive.write(1, "big", b"hi", WriteOptions::default()).await.unwrap();
        assert_eq!(drive.read(1, "big").await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn writing_empty_content_round_trips_via_blank_chunk() {
        let drive = fresh_drive().await;
        drive.create_file(1, "empty.txt").await.unwrap();
        drive.write(1, "empty.txt", b"", WriteOptions::default()).await.unwrap();
        assert_eq!(drive.read(1, "empty.txt").await.unwrap(), b"");
    }

    #[tokio::test]
    async fn create_file_rejects_name_collision() {
        let drive = fresh_drive().await;
        drive.create_directory(1, "a").await.unwrap();
        let err = drive.create_file(1, "a").await.unwrap_err();
        assert_eq!(err, DriveError::NameInUse);
    }

    #[tokio::test]
    async fn delete_root_is_rejected() {
        let drive = fresh_drive().await;
        let err = drive.delete(1, "~/").await.unwrap_err();
        assert_eq!(err, DriveError::PermissionError);
    }

    #[tokio::test]
    async fn delete_unlinks_cwd_and_resets_to_home() {
        let drive = fresh_drive().await;
        drive.create_directory(1, "docs").await.unwrap();
        drive.set_cwd(1, "~/docs".to_string()).await;
        drive.delete(1, "~/docs").await.unwrap();

        let (_tree, _cwd, changed) = drive.get_cwd(1).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn pull_directory_produces_a_zip() {
        let drive = fresh_drive().await;
        drive.create_directory(1, "docs").await.unwrap();
        drive.create_file(1, "docs/a.txt").await.unwrap();
        drive.write(1, "docs/a.txt", b"hi", WriteOptions::default()).await.unwrap();

        let pulled = drive.pull(1, "docs").await.unwrap();
        assert!(pulled.is_zip);
        assert_eq!(pulled.name, "docs.zip");
        assert!(!pulled.bytes.is_empty());
    }

    #[tokio::test]
    async fn rename_root_is_rejected() {
        let drive = fresh_drive().await;
        let err = drive.rename(1, "~/", "renamed").await.unwrap_err();
        assert_eq!(err, DriveError::CannotRename);
    }
}
