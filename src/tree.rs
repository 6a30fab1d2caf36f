//! FS tree: in-memory directories and files with path navigation.
//!
//! Modeling directories and files as objects holding a `parent_dir`
//! back-reference and lists of children forms a graph Rust cannot
//! express directly without reference counting and interior mutability
//! throughout. Instead this keeps every node in one arena (`Vec<Slot>`)
//! and refers to nodes by index (`NodeId`).

use std::fmt::Write as _;

use crate::address::MemoryAddress;
use crate::config::DriveLimits;
use crate::error::DriveError;
use crate::limits::ROOT_NAME;
use crate::paths::sizeof_fmt;

/// Index of a node within a [`Tree`]'s arena. Never reused once
/// allocated, even after the node is unlinked by [`Tree::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
struct DirNode {
    name: String,
    parent: Option<NodeId>,
    files: Vec<NodeId>,
    dirs: Vec<NodeId>,
}

#[derive(Debug)]
struct FileNode {
    name: String,
    parent: Option<NodeId>,
    mem_addr: MemoryAddress,
    size: u64,
}

#[derive(Debug)]
enum Slot {
    Dir(DirNode),
    File(FileNode),
}

/// Checks a file or directory name against `limits`: non-empty, at most
/// `max_name_len` characters, none of `illegal_name_chars`.
pub fn validate_name(name: &str, limits: &DriveLimits) -> Result<(), DriveError> {
    if name.is_empty() || name.chars().count() > limits.max_name_len {
        return Err(DriveError::InvalidName);
    }
    if name.chars().any(|c| limits.illegal_name_chars.contains(c)) {
        return Err(DriveError::InvalidName);
    }
    Ok(())
}

/// An arena of [`Slot`]s rooted at a single `~` directory.
pub struct Tree {
    arena: Vec<Slot>,
    root: NodeId,
    limits: DriveLimits,
}

impl Tree {
    /// A fresh tree holding just the empty root directory, under the
    /// default [`DriveLimits`].
    pub fn new() -> Self {
        Self::with_limits(DriveLimits::default())
    }

    /// A fresh tree holding just the empty root directory, validating
    /// future inserts against `limits` rather than the defaults.
    pub fn with_limits(limits: DriveLimits) -> Self {
        let root = DirNode {
            name: ROOT_NAME.to_string(),
            parent: None,
            files: Vec::new(),
            dirs: Vec::new(),
        };
        Self {
            arena: vec![Slot::Dir(root)],
            root: NodeId(0),
            limits,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn dir(&self, id: NodeId) -> Option<&DirNode> {
        match &self.arena[id.0] {
            Slot::Dir(d) => Some(d),
            Slot::File(_) => None,
        }
    }

    fn dir_mut(&mut self, id: NodeId) -> Option<&mut DirNode> {
        match &mut self.arena[id.0] {
            Slot::Dir(d) => Some(d),
            Slot::File(_) => None,
        }
    }

    fn file(&self, id: NodeId) -> Option<&FileNode> {
        match &self.arena[id.0] {
            Slot::File(f) => Some(f),
            Slot::Dir(_) => None,
        }
    }

    pub fn is_dir(&self, id: NodeId) -> bool {
        matches!(self.arena[id.0], Slot::Dir(_))
    }

    pub fn is_file(&self, id: NodeId) -> bool {
        matches!(self.arena[id.0], Slot::File(_))
    }

    pub fn name(&self, id: NodeId) -> &str {
        match &self.arena[id.0] {
            Slot::Dir(d) => &d.name,
            Slot::File(f) => &f.name,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match &self.arena[id.0] {
            Slot::Dir(d) => d.parent,
            Slot::File(f) => f.parent,
        }
    }

    pub fn mem_addr(&self, id: NodeId) -> Option<MemoryAddress> {
        self.file(id).map(|f| f.mem_addr)
    }

    pub fn size(&self, id: NodeId) -> Option<u64> {
        self.file(id).map(|f| f.size)
    }

    pub fn files(&self, dir: NodeId) -> &[NodeId] {
        self.dir(dir).map(|d| d.files.as_slice()).unwrap_or(&[])
    }

    pub fn dirs(&self, dir: NodeId) -> &[NodeId] {
        self.dir(dir).map(|d| d.dirs.as_slice()).unwrap_or(&[])
    }

    /// Whether `dir` already directly contains an object named `name`.
    pub fn has_object(&self, dir: NodeId, name: &str) -> bool {
        let Some(d) = self.dir(dir) else { return false };
        d.files.iter().any(|f| self.name(*f) == name) || d.dirs.iter().any(|sub| self.name(*sub) == name)
    }

    /// The tree's own root, reached by following `parent` links.
    pub fn base_dir(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.parent(id) {
            id = parent;
        }
        id
    }

    pub fn set_size(&mut self, id: NodeId, size: u64) {
        if let Slot::File(f) = &mut self.arena[id.0] {
            f.size = size;
        }
    }

    pub fn set_mem_addr(&mut self, id: NodeId, addr: MemoryAddress) {
        if let Slot::File(f) = &mut self.arena[id.0] {
            f.mem_addr = addr;
        }
    }

    pub fn rename(&mut self, id: NodeId, name: String) {
        match &mut self.arena[id.0] {
            Slot::Dir(d) => d.name = name,
            Slot::File(f) => f.name = name,
        }
    }

    /// `"~/a/b/c"`: the full path from the tree's root down to `id`.
    pub fn path_to(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            segments.push(self.name(node).to_string());
            cursor = self.parent(node);
        }
        segments.reverse();
        let joined = segments.join("/");
        if self.is_dir(id) {
            format!("{joined}/")
        } else {
            joined
        }
    }

    /// Create a file under `parent`, rejecting a duplicate name.
    pub fn insert_file(
        &mut self,
        parent: NodeId,
        name: String,
        mem_addr: MemoryAddress,
        size: u64,
    ) -> Result<NodeId, DriveError> {
        validate_name(&name, &self.limits)?;
        if self.has_object(parent, &name) {
            return Err(DriveError::NameInUse);
        }
        let id = NodeId(self.arena.len());
        self.arena.push(Slot::File(FileNode {
            name,
            parent: Some(parent),
            mem_addr,
            size,
        }));
        self.dir_mut(parent)
            .expect("parent must be a directory")
            .files
            .push(id);
        Ok(id)
    }

    /// Create a directory under `parent`, rejecting a duplicate name.
    pub fn insert_dir(&mut self, parent: NodeId, name: String) -> Result<NodeId, DriveError> {
        validate_name(&name, &self.limits)?;
        if self.has_object(parent, &name) {
            return Err(DriveError::NameInUse);
        }
        let id = NodeId(self.arena.len());
        self.arena.push(Slot::Dir(DirNode {
            name,
            parent: Some(parent),
            files: Vec::new(),
            dirs: Vec::new(),
        }));
        self.dir_mut(parent)
            .expect("parent must be a directory")
            .dirs
            .push(id);
        Ok(id)
    }

    /// Detach `id` from its parent's child lists. The root (`~`) can
    /// never be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root {
            return false;
        }
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if let Some(d) = self.dir_mut(parent) {
            d.files.retain(|f| *f != id);
            d.dirs.retain(|sub| *sub != id);
        }
        match &mut self.arena[id.0] {
            Slot::Dir(d) => d.parent = None,
            Slot::File(f) => f.parent = None,
        }
        true
    }

    /// Re-parent `id` under `new_parent`, appending to its child list.
    /// Caller is responsible for collision/name checks beforehand.
    pub fn move_to_parent(&mut self, id: NodeId, new_parent: NodeId) {
        if let Some(old_parent) = self.parent(id) {
            if let Some(d) = self.dir_mut(old_parent) {
                d.files.retain(|f| *f != id);
                d.dirs.retain(|sub| *sub != id);
            }
        }
        let is_file = self.is_file(id);
        match &mut self.arena[id.0] {
            Slot::Dir(d) => d.parent = Some(new_parent),
            Slot::File(f) => f.parent = Some(new_parent),
        }
        let parent = self.dir_mut(new_parent).expect("target must be a directory");
        if is_file {
            parent.files.push(id);
        } else {
            parent.dirs.push(id);
        }
    }

    /// Resolve a `/`-separated relative (or `~`-rooted) path from
    /// `from`. Backslashes are normalized to `/` first. Returns `None`
    /// on any unresolved segment.
    pub fn move_to(&self, from: NodeId, rel_path: &str) -> Option<NodeId> {
        let normalized = rel_path.replace('\\', "/");
        let mut cwd = from;

        for (i, part) in normalized.split('/').enumerate() {
            if part.is_empty() {
                continue;
            }
            if part == "~" {
                if i != 0 {
                    return None;
                }
                cwd = self.base_dir(from);
                continue;
            }
            if self.is_file(cwd) {
                return None;
            }
            if part == "." {
                continue;
            }
            if part == ".." {
                cwd = self.parent(cwd).unwrap_or(cwd);
                continue;
            }

            let dir = self.dir(cwd)?;
            if let Some(found) = dir.dirs.iter().find(|d| self.name(**d) == part) {
                cwd = *found;
                continue;
            }
            if let Some(found) = dir.files.iter().find(|f| self.name(**f) == part) {
                cwd = *found;
                continue;
            }
            return None;
        }

        Some(cwd)
    }

    /// Every descendant of `dir`, depth first. `file_only` skips
    /// intermediate directory entries but still recurses into them.
    pub fn walk(&self, dir: NodeId, file_only: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_into(dir, file_only, &mut out);
        out
    }

    fn walk_into(&self, dir: NodeId, file_only: bool, out: &mut Vec<NodeId>) {
        let Some(d) = self.dir(dir) else { return };
        out.extend(d.files.iter().copied());
        for sub in &d.dirs {
            if !file_only {
                out.push(*sub);
            }
            self.walk_into(*sub, file_only, out);
        }
    }

    /// The path trace to `id` must both name-match *and* literally be
    /// present in each ancestor's child list — a dangling arena entry
    /// with a coincidentally matching name does not count as linked.
    pub fn is_linked(&self, id: NodeId) -> bool {
        if id == self.root {
            return true;
        }

        let mut child = id;
        let mut parent = match self.parent(id) {
            Some(p) => p,
            None => return false,
        };

        loop {
            let Some(d) = self.dir(parent) else { return false };
            let contained = d.files.contains(&child) || d.dirs.contains(&child);
            if !contained {
                return false;
            }

            if parent == self.root {
                return true;
            }

            child = parent;
            parent = match self.parent(parent) {
                Some(p) => p,
                None => return false,
            };
        }
    }

    /// `fs.py::draw_tree`: a `| `-indented listing with human-readable
    /// file sizes.
    pub fn render_tree(&self, dir: NodeId) -> String {
        let mut buf = String::new();
        self.render_into(dir, 0, &mut buf);
        buf
    }

    fn render_into(&self, dir: NodeId, depth: usize, buf: &mut String) {
        let indent = "| ".repeat(depth);
        let _ = writeln!(buf, "{indent}[{}]", self.name(dir));

        let child_indent = "| ".repeat(depth + 1);
        let Some(d) = self.dir(dir) else { return };
        for file in &d.files {
            let size = self.size(*file).unwrap_or(0);
            let _ = writeln!(buf, "{child_indent}{} ({})", self.name(*file), sizeof_fmt(size));
        }
        for sub in &d.dirs {
            self.render_into(*sub, depth + 1, buf);
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> MemoryAddress {
        MemoryAddress::new(n, n)
    }

    #[test]
    fn root_path_and_linkage() {
        let tree = Tree::new();
        assert_eq!(tree.path_to(tree.root()), "~/");
        assert!(tree.is_linked(tree.root()));
    }

    #[test]
    fn insert_file_rejects_name_collision() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.insert_file(root, "a.txt".into(), addr(1), 3).unwrap();
        let err = tree.insert_dir(root, "a.txt".into()).unwrap_err();
        assert_eq!(err, DriveError::NameInUse);
    }

    #[test]
    fn move_to_resolves_nested_and_dotdot_paths() {
        let mut tree = Tree::new();
        let root = tree.root();
        let docs = tree.insert_dir(root, "docs".into()).unwrap();
        let file = tree.insert_file(docs, "a.txt".into(), addr(1), 3).unwrap();

        assert_eq!(tree.move_to(root, "docs/a.txt"), Some(file));
        assert_eq!(tree.move_to(file, ".."), Some(docs));
        assert_eq!(tree.move_to(docs, "~"), Some(root));
        assert_eq!(tree.move_to(root, "docs/missing"), None);
    }

    #[test]
    fn dotdot_at_root_stays_at_root() {
        let tree = Tree::new();
        let root = tree.root();
        assert_eq!(tree.move_to(root, ".."), Some(root));
        assert_eq!(tree.move_to(root, "../../.."), Some(root));
    }

    #[test]
    fn walk_visits_files_and_dirs_depth_first() {
        let mut tree = Tree::new();
        let root = tree.root();
        let docs = tree.insert_dir(root, "docs".into()).unwrap();
        let _a = tree.insert_file(docs, "a.txt".into(), addr(1), 1).unwrap();
        let _b = tree.insert_file(root, "b.txt".into(), addr(2), 2).unwrap();

        let names: Vec<&str> = tree.walk(root, false).iter().map(|id| tree.name(*id)).collect();
        assert_eq!(names, vec!["b.txt", "docs", "a.txt"]);
    }

    #[test]
    fn is_linked_fails_after_remove() {
        let mut tree = Tree::new();
        let root = tree.root();
        let docs = tree.insert_dir(root, "docs".into()).unwrap();
        let file = tree.insert_file(docs, "a.txt".into(), addr(1), 1).unwrap();
        assert!(tree.is_linked(file));

        tree.remove(docs);
        assert!(!tree.is_linked(file));
    }

    #[test]
    fn move_to_parent_updates_child_lists_on_both_sides() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.insert_dir(root, "a".into()).unwrap();
        let b = tree.insert_dir(root, "b".into()).unwrap();
        let file = tree.insert_file(a, "x.txt".into(), addr(1), 1).unwrap();

        tree.move_to_parent(file, b);
        assert!(!tree.has_object(a, "x.txt"));
        assert!(tree.has_object(b, "x.txt"));
        assert_eq!(tree.parent(file), Some(b));
    }
}
