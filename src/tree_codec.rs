//! Serialized tree grammar: a compact text encoding of the directory
//! tree, used both to persist structure in the bucket cache message and
//! to reconstruct it on bootstrap.
//!
//! `D:name|...?` for a directory (its own record, then every file
//! record, then every child directory's own export, then a `?` pop
//! marker) and `F:name:channel_id:message_id:size|` for a file.

use crate::address::MemoryAddress;
use crate::config::DriveLimits;
use crate::error::DriveError;
use crate::tree::{NodeId, Tree};

const TYPE_DIR: char = 'D';
const TYPE_FILE: char = 'F';
const END_OBJ: char = '|';
const OUT_DIR: char = '?';

/// Depth-first serialization of `dir` and everything beneath it.
pub fn export(tree: &Tree, dir: NodeId) -> String {
    let mut out = String::new();
    export_into(tree, dir, &mut out);
    out
}

fn export_into(tree: &Tree, dir: NodeId, out: &mut String) {
    out.push(TYPE_DIR);
    out.push(':');
    out.push_str(tree.name(dir));
    out.push(END_OBJ);

    for file in tree.files(dir) {
        let addr = tree.mem_addr(*file).expect("files always carry a mem_addr");
        let size = tree.size(*file).unwrap_or(0);
        out.push(TYPE_FILE);
        out.push(':');
        out.push_str(tree.name(*file));
        out.push(':');
        out.push_str(&addr.channel_id.to_string());
        out.push(':');
        out.push_str(&addr.message_id.to_string());
        out.push(':');
        out.push_str(&size.to_string());
        out.push(END_OBJ);
    }

    // Collect children up front: recursing below may (transiently,
    // within this function only) shadow `dir`'s borrow otherwise.
    let children: Vec<NodeId> = tree.dirs(dir).to_vec();
    for child in children {
        export_into(tree, child, out);
    }

    out.push(OUT_DIR);
}

/// Parse a previously exported string back into a standalone [`Tree`].
/// The first record parsed becomes the returned tree's root,
/// regardless of its name — callers serializing a drive's true root
/// always get `"~"` back out since that's what was fed in.
pub fn parse(raw: &str, limits: DriveLimits) -> Result<Tree, DriveError> {
    let total_objects = raw.matches(END_OBJ).count();
    let mut cursor = raw;

    let (root_name, rest) = parse_part(cursor)?;
    let RecordHeader::Dir { name } = root_name else {
        return Err(DriveError::BrokenMemory);
    };
    let mut tree = Tree::with_limits(limits);
    tree.rename(tree.root(), name);
    cursor = rest;

    let mut top = tree.root();
    let mut stack = vec![top];

    for _ in 0..total_objects.saturating_sub(1) {
        cursor = skip_pop_markers(cursor, &mut stack, &mut top);

        let (header, rest) = parse_part(cursor)?;
        cursor = rest;

        match header {
            RecordHeader::File {
                name,
                channel_id,
                message_id,
                size,
            } => {
                tree.insert_file(top, name, MemoryAddress::new(channel_id, message_id), size)
                    .map_err(|_| DriveError::BrokenMemory)?;
            }
            RecordHeader::Dir { name } => {
                let id = tree.insert_dir(top, name).map_err(|_| DriveError::BrokenMemory)?;
                top = id;
                stack.push(top);
            }
        }
    }

    Ok(tree)
}

fn skip_pop_markers<'a>(mut raw: &'a str, stack: &mut Vec<NodeId>, top: &mut NodeId) -> &'a str {
    while raw.starts_with(OUT_DIR) {
        raw = &raw[OUT_DIR.len_utf8()..];
        if stack.len() > 1 {
            stack.pop();
        }
        *top = *stack.last().unwrap();
    }
    raw
}

enum RecordHeader {
    Dir { name: String },
    File { name: String, channel_id: u64, message_id: u64, size: u64 },
}

fn parse_part(raw: &str) -> Result<(RecordHeader, &str), DriveError> {
    let type_char = raw.chars().next().ok_or(DriveError::BrokenMemory)?;
    let (record, rest) = raw.split_once(END_OBJ).ok_or(DriveError::BrokenMemory)?;

    match type_char {
        c if c == TYPE_DIR => {
            let (_, name) = record.split_once(':').ok_or(DriveError::BrokenMemory)?;
            Ok((RecordHeader::Dir { name: name.to_string() }, rest))
        }
        c if c == TYPE_FILE => {
            let mut fields = record.splitn(5, ':');
            let _tag = fields.next().ok_or(DriveError::BrokenMemory)?;
            let name = fields.next().ok_or(DriveError::BrokenMemory)?.to_string();
            let channel_id: u64 = fields
                .next()
                .ok_or(DriveError::BrokenMemory)?
                .parse()
                .map_err(|_| DriveError::BrokenMemory)?;
            let message_id: u64 = fields
                .next()
                .ok_or(DriveError::BrokenMemory)?
                .parse()
                .map_err(|_| DriveError::BrokenMemory)?;
            let size: u64 = fields
                .next()
                .ok_or(DriveError::BrokenMemory)?
                .parse()
                .map_err(|_| DriveError::BrokenMemory)?;
            Ok((
                RecordHeader::File {
                    name,
                    channel_id,
                    message_id,
                    size,
                },
                rest,
            ))
        }
        _ => Err(DriveError::BrokenMemory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_tree_with_nested_directories() {
        let mut tree = Tree::new();
        let root = tree.root();
        let docs = tree.insert_dir(root, "docs".into()).unwrap();
        tree.insert_file(root, "top.txt".into(), MemoryAddress::new(1, 1), 5)
            .unwrap();
        tree.insert_file(docs, "a.txt".into(), MemoryAddress::new(2, 2), 9)
            .unwrap();
        tree.insert_dir(docs, "nested".into()).unwrap();

        let exported = export(&tree, root);
        let parsed = parse(&exported, DriveLimits::default()).unwrap();

        assert_eq!(export(&parsed, parsed.root()), exported);
        assert_eq!(parsed.name(parsed.root()), "~");

        let docs2 = parsed.move_to(parsed.root(), "docs").unwrap();
        assert!(parsed.has_object(docs2, "a.txt"));
        assert!(parsed.has_object(docs2, "nested"));
    }

    #[test]
    fn export_of_an_empty_root_is_just_its_own_record() {
        let tree = Tree::new();
        assert_eq!(export(&tree, tree.root()), "D:~|?");
    }

    #[test]
    fn parse_rejects_truncated_input() {
        assert!(parse("D:~", DriveLimits::default()).is_err());
        assert!(parse("X:~|?", DriveLimits::default()).is_err());
    }
}
