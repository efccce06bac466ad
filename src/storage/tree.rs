//! Filesystem walk producing the ordered, nested node tree.

use std::{
    cmp::Ordering,
    collections::HashMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tracing::warn;
use walkdir::WalkDir;

use crate::models::nodes::{Node, NodeKind};

use super::paths;

/// Walks `dir` and returns its children as a nested tree. `prefix` is the
/// logical path of `dir` relative to the storage root ("" for the root
/// itself); node paths are built under it.
///
/// The walk is contents-first, so every directory's children are assembled
/// before the directory node itself; no recursion, bounded stack. Entries
/// that cannot be read are logged and skipped, which leaves the affected
/// subtree empty rather than failing the whole listing.
pub fn build_tree(dir: &Path, prefix: &str) -> Vec<Node> {
    let mut pending: HashMap<PathBuf, Vec<Node>> = HashMap::new();

    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry during tree walk");
                continue;
            }
        };
        if entry.path() == dir {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "failed to stat entry");
                continue;
            }
        };

        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let logical = paths::join_logical(prefix, &relative.to_string_lossy().replace('\\', "/"));
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);

        let node = if metadata.is_dir() {
            let mut children = pending.remove(entry.path()).unwrap_or_default();
            sort_siblings(&mut children);
            Node {
                name,
                kind: NodeKind::Folder,
                path: logical,
                size: 0,
                modified_at,
                children: Some(children),
                download_ref: None,
            }
        } else {
            Node {
                name,
                kind: NodeKind::File,
                path: logical.clone(),
                size: metadata.len(),
                modified_at,
                children: None,
                download_ref: Some(logical),
            }
        };

        let parent = entry.path().parent().unwrap_or(dir).to_path_buf();
        pending.entry(parent).or_default().push(node);
    }

    let mut top = pending.remove(dir).unwrap_or_default();
    sort_siblings(&mut top);
    top
}

/// Folders before files; within a kind, case-insensitive by name with a
/// case-sensitive tiebreak so ordering stays total.
pub fn sort_siblings(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| match (a.is_folder(), b.is_folder()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn folders_sort_before_files_then_lexicographic() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(root.path().join("A")).unwrap();
        fs::write(root.path().join("a.txt"), b"a").unwrap();

        let tree = build_tree(root.path(), "");
        let names: Vec<&str> = tree.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, ["A", "a.txt", "b.txt"]);
    }

    #[test]
    fn nested_tree_carries_paths_sizes_and_refs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("docs/sub")).unwrap();
        fs::write(root.path().join("docs/sub/note.txt"), b"hello").unwrap();

        let tree = build_tree(root.path(), "");
        assert_eq!(tree.len(), 1);
        let docs = &tree[0];
        assert!(docs.is_folder());
        assert_eq!(docs.path, "docs");
        assert_eq!(docs.size, 0);

        let sub = &docs.children.as_ref().unwrap()[0];
        assert_eq!(sub.path, "docs/sub");
        let note = &sub.children.as_ref().unwrap()[0];
        assert_eq!(note.path, "docs/sub/note.txt");
        assert_eq!(note.size, 5);
        assert_eq!(note.download_ref.as_deref(), Some("docs/sub/note.txt"));
    }

    #[test]
    fn prefix_is_prepended_to_paths() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("file.bin"), b"x").unwrap();

        let tree = build_tree(root.path(), "projects/demo");
        assert_eq!(tree[0].path, "projects/demo/file.bin");
    }

    #[test]
    fn empty_folder_lists_no_children() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();

        let tree = build_tree(root.path(), "");
        assert!(tree[0].is_folder());
        assert!(tree[0].children.as_ref().unwrap().is_empty());
    }
}
