//! Hierarchical view over the flat label space of a PAK directory.
//!
//! Nodes live in an arena owned by [`PathTree`] and are addressed by
//! [`NodeId`]. A node owns its child list and its entries; the parent link is
//! a plain handle. Deleting a subtree retires its slots, so a stale `NodeId`
//! resolves to nothing instead of to another node.

use tracing::debug;

use crate::error::{Error, Result};

use super::entry::ArchiveEntry;
use super::structures::{label_segment, tokenize};

/// Handle to a node of a [`PathTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A directory in the tree.
#[derive(Debug)]
pub struct TreeNode {
    label: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    entries: Vec<ArchiveEntry>,
}

impl TreeNode {
    fn new(label: &str, parent: Option<NodeId>) -> Self {
        Self {
            label: label.to_string(),
            parent,
            children: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Directory name of this node. Literal `..` components appear as
    /// [`DOTDOT_PLACEHOLDER`](super::structures::DOTDOT_PLACEHOLDER).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child directories in creation order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Entries stored directly in this directory, in insertion order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ArchiveEntry] {
        &mut self.entries
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Position of the entry with exactly this label.
    pub fn entry_index(&self, label: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.label().as_bytes() == label)
    }
}

#[derive(Debug)]
pub struct PathTree {
    nodes: Vec<Option<TreeNode>>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    /// Internal name of the root node; never written to an archive.
    pub const ROOT_LABEL: &'static str = "root";

    pub fn new() -> Self {
        Self {
            nodes: vec![Some(TreeNode::new(Self::ROOT_LABEL, None))],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn get(&self, id: NodeId) -> Result<&TreeNode> {
        self.node(id)
            .ok_or_else(|| Error::DirectoryNotFound(format!("node #{}", id.0)))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut TreeNode> {
        self.node_mut(id)
            .ok_or_else(|| Error::DirectoryNotFound(format!("node #{}", id.0)))
    }

    /// Drop every node and entry, leaving an empty root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Some(TreeNode::new(Self::ROOT_LABEL, None)));
    }

    pub fn is_empty(&self) -> bool {
        self.nodes
            .first()
            .and_then(Option::as_ref)
            .is_none_or(|root| root.children.is_empty() && root.entries.is_empty())
    }

    /// Total number of entries in the tree.
    pub fn entry_count(&self) -> usize {
        self.nodes.iter().flatten().map(TreeNode::size).sum()
    }

    /// Existing child of `parent` named `segment`.
    pub fn child_named(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        let node = self.node(parent)?;
        node.children
            .iter()
            .copied()
            .find(|&child| self.node(child).is_some_and(|c| c.label == segment))
    }

    /// Look up the child of `parent` named `segment`, appending a new one
    /// when it is missing and `create` is set.
    pub fn find_child(
        &mut self,
        parent: NodeId,
        segment: &str,
        create: bool,
    ) -> Result<Option<NodeId>> {
        self.get(parent)?;
        if let Some(found) = self.child_named(parent, segment) {
            return Ok(Some(found));
        }
        if !create {
            return Ok(None);
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(TreeNode::new(segment, Some(parent))));
        self.get_mut(parent)?.children.push(id);
        debug!(segment, "created directory node");
        Ok(Some(id))
    }

    /// Resolve a directory path below the root.
    ///
    /// Fails with [`Error::DirectoryNotFound`] on the first missing segment
    /// unless `create` is set.
    pub fn find_path(&mut self, path: &str, create: bool) -> Result<NodeId> {
        let mut current = self.root();
        for segment in tokenize(path) {
            current = self
                .find_child(current, &segment, create)?
                .ok_or_else(|| Error::DirectoryNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Resolve a directory path without creating anything.
    pub fn lookup(&self, path: &str) -> Result<NodeId> {
        self.descend(self.root(), &tokenize(path))
            .ok_or_else(|| Error::DirectoryNotFound(path.to_string()))
    }

    fn descend(&self, from: NodeId, segments: &[String]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(from, |node, segment| self.child_named(node, segment))
    }

    /// File `entry` under the directories named by its label, creating
    /// them as needed.
    ///
    /// A duplicate label is rejected before any node is created.
    pub fn insert(&mut self, entry: ArchiveEntry) -> Result<NodeId> {
        self.insert_below(self.root(), entry)
    }

    /// Like [`insert`](Self::insert), with the label's directories resolved
    /// relative to `base` instead of the root.
    pub fn insert_below(&mut self, base: NodeId, entry: ArchiveEntry) -> Result<NodeId> {
        let segments = entry.label().directory_segments();
        if let Some(existing) = self.descend(base, &segments) {
            self.check_duplicate(existing, &entry)?;
        }

        let mut current = base;
        for segment in &segments {
            current = self
                .find_child(current, segment, true)?
                .ok_or_else(|| Error::DirectoryNotFound(segment.clone()))?;
        }
        self.append_entry(current, entry)?;
        Ok(current)
    }

    /// Append `entry` to the entry list of `node`.
    pub fn append_entry(&mut self, node: NodeId, entry: ArchiveEntry) -> Result<()> {
        self.check_duplicate(node, &entry)?;
        self.get_mut(node)?.entries.push(entry);
        Ok(())
    }

    fn check_duplicate(&self, node: NodeId, entry: &ArchiveEntry) -> Result<()> {
        if self
            .get(node)?
            .entry_index(entry.label().as_bytes())
            .is_some()
        {
            return Err(Error::DuplicateEntry(entry.label().to_string()));
        }
        Ok(())
    }

    /// Find an entry by its full label.
    pub fn find_entry(&self, label: &str) -> Option<&ArchiveEntry> {
        let (node, index) = self.locate_entry(label)?;
        self.node(node)?.entries.get(index)
    }

    /// Directory node and row of the entry with this full label.
    pub fn locate_entry(&self, label: &str) -> Option<(NodeId, usize)> {
        let segments = match label.rfind('/') {
            Some(pos) => tokenize(&label[..pos]),
            None => Vec::new(),
        };
        let node = self.descend(self.root(), &segments)?;
        let index = self.node(node)?.entry_index(label.as_bytes())?;
        Some((node, index))
    }

    /// Remove the entry at `index` from `node`.
    pub fn delete_entry(&mut self, node: NodeId, index: usize) -> Result<ArchiveEntry> {
        let entries = &mut self.get_mut(node)?.entries;
        if index >= entries.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        Ok(entries.remove(index))
    }

    /// Remove the child at `index` of `node` together with its subtree.
    pub fn delete_subtree(&mut self, node: NodeId, index: usize) -> Result<()> {
        let children = &mut self.get_mut(node)?.children;
        if index >= children.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: children.len(),
            });
        }
        let removed = children.remove(index);

        let mut pending = vec![removed];
        while let Some(id) = pending.pop() {
            if let Some(retired) = self.nodes.get_mut(id.0).and_then(Option::take) {
                pending.extend(retired.children);
            }
        }
        Ok(())
    }

    /// Row of `child` within its parent's child list.
    pub fn row(&self, child: NodeId) -> Option<usize> {
        let parent = self.node(child)?.parent?;
        self.node(parent)?.children.iter().position(|&c| c == child)
    }

    /// Full directory path of `id` as stored in labels, with a trailing `/`.
    /// The root contributes nothing, so the root's path is empty.
    pub fn path_label(&self, id: NodeId) -> String {
        self.components(self.root(), id)
            .iter()
            .map(|name| format!("{}/", label_segment(name)))
            .collect()
    }

    /// Node names on the way from `ancestor` (exclusive) down to `id`.
    pub fn components(&self, ancestor: NodeId, id: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                break;
            }
            let Some(node) = self.node(node_id) else {
                break;
            };
            names.push(node.label.clone());
            current = node.parent;
        }
        names.reverse();
        names
    }

    /// Nodes of the subtree at `from` in canonical order: every child
    /// subtree (in creation order) before the node itself.
    pub fn canonical_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.post_order(from, &mut order);
        order
    }

    fn post_order(&self, id: NodeId, order: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else {
            return;
        };
        for &child in &node.children {
            self.post_order(child, order);
        }
        order.push(id);
    }

    /// Visit every entry in canonical order.
    pub fn for_each_entry<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&ArchiveEntry) -> Result<()>,
    {
        for id in self.canonical_order(self.root()) {
            for entry in self.get(id)?.entries() {
                visit(entry)?;
            }
        }
        Ok(())
    }

    /// Visit every entry in canonical order, mutably.
    pub fn for_each_entry_mut<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut ArchiveEntry) -> Result<()>,
    {
        for id in self.canonical_order(self.root()) {
            for entry in self.get_mut(id)?.entries_mut() {
                visit(entry)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pak::structures::{DOTDOT_PLACEHOLDER, Label};

    fn entry(label: &str, len: usize) -> ArchiveEntry {
        ArchiveEntry::from_bytes(Label::new(label).unwrap(), vec![0; len]).unwrap()
    }

    fn labels(tree: &PathTree) -> Vec<String> {
        let mut out = Vec::new();
        tree.for_each_entry(|e| {
            out.push(e.label().to_string());
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn find_child_creates_on_empty_root() {
        let mut tree = PathTree::new();
        let root = tree.root();
        assert_eq!(tree.find_child(root, "maps", false).unwrap(), None);

        let maps = tree.find_child(root, "maps", true).unwrap().unwrap();
        assert_eq!(tree.find_child(root, "maps", true).unwrap(), Some(maps));
        assert_eq!(tree.node(root).unwrap().child_count(), 1);
        assert_eq!(tree.node(maps).unwrap().parent(), Some(root));
    }

    #[test]
    fn insert_builds_directories() {
        let mut tree = PathTree::new();
        let node = tree.insert(entry("textures/wall.bmp", 10)).unwrap();

        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.size(), 0);
        assert_eq!(tree.node(node).unwrap().label(), "textures");
        assert_eq!(tree.path_label(node), "textures/");

        let stored = &tree.node(node).unwrap().entries()[0];
        assert_eq!(
            format!("{}{}", tree.path_label(node), stored.file_name()),
            "textures/wall.bmp"
        );
    }

    #[test]
    fn duplicate_insert_leaves_tree_unchanged() {
        let mut tree = PathTree::new();
        tree.insert(entry("sound/a.wav", 1)).unwrap();

        let err = tree.insert(entry("sound/a.wav", 2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry(_)));
        assert_eq!(tree.entry_count(), 1);
        assert_eq!(tree.node(tree.root()).unwrap().child_count(), 1);
    }

    #[test]
    fn find_path_without_create_misses() {
        let mut tree = PathTree::new();
        tree.insert(entry("maps/e1m1.bsp", 1)).unwrap();

        assert!(tree.find_path("maps", false).is_ok());
        assert!(matches!(
            tree.find_path("maps/extra", false),
            Err(Error::DirectoryNotFound(_))
        ));
        let created = tree.find_path("maps/extra/", true).unwrap();
        assert_eq!(tree.path_label(created), "maps/extra/");
    }

    #[test]
    fn dotdot_component_round_trips() {
        let mut tree = PathTree::new();
        let node = tree.insert(entry("models/../tank/skin.pcx", 4)).unwrap();

        assert_eq!(tree.components(tree.root(), node), vec![
            "models",
            DOTDOT_PLACEHOLDER,
            "tank"
        ]);
        assert_eq!(tree.path_label(node), "models/../tank/");
        assert!(tree.find_entry("models/../tank/skin.pcx").is_some());
    }

    #[test]
    fn literal_placeholder_label_rebuilds_as_dotdot() {
        let mut tree = PathTree::new();
        let node = tree
            .insert(entry(&format!("{DOTDOT_PLACEHOLDER}/x.txt"), 1))
            .unwrap();
        assert_eq!(tree.path_label(node), "../");

        let rebuilt = format!("{}y.txt", tree.path_label(node));
        assert_eq!(tree.insert(entry(&rebuilt, 1)).unwrap(), node);
        assert_eq!(labels(&tree), vec!["dotdot/x.txt", "../y.txt"]);
        assert!(tree.find_entry("dotdot/x.txt").is_some());
        assert!(tree.find_entry("../x.txt").is_none());
    }

    #[test]
    fn canonical_order_visits_children_first() {
        let mut tree = PathTree::new();
        tree.insert(entry("top.cfg", 1)).unwrap();
        tree.insert(entry("a/one.txt", 1)).unwrap();
        tree.insert(entry("b/two.txt", 1)).unwrap();
        tree.insert(entry("a/deep/three.txt", 1)).unwrap();
        tree.insert(entry("a/four.txt", 1)).unwrap();

        assert_eq!(labels(&tree), vec![
            "a/deep/three.txt",
            "a/one.txt",
            "a/four.txt",
            "b/two.txt",
            "top.cfg",
        ]);
    }

    #[test]
    fn delete_entry_by_index() {
        let mut tree = PathTree::new();
        let node = tree.insert(entry("a/x", 1)).unwrap();
        tree.insert(entry("a/y", 1)).unwrap();

        let removed = tree.delete_entry(node, 0).unwrap();
        assert_eq!(removed.label().to_string(), "a/x");
        assert_eq!(labels(&tree), vec!["a/y"]);
        assert!(matches!(
            tree.delete_entry(node, 1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn delete_subtree_retires_nodes() {
        let mut tree = PathTree::new();
        let deep = tree.insert(entry("a/b/c.txt", 1)).unwrap();
        tree.insert(entry("z.txt", 1)).unwrap();

        let a = tree.lookup("a").unwrap();
        let row = tree.row(a).unwrap();
        tree.delete_subtree(tree.root(), row).unwrap();

        assert!(tree.node(a).is_none());
        assert!(tree.node(deep).is_none());
        assert_eq!(labels(&tree), vec!["z.txt"]);
        assert!(matches!(
            tree.delete_subtree(tree.root(), 0),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn clear_resets_to_empty_root() {
        let mut tree = PathTree::new();
        tree.insert(entry("a/b.txt", 1)).unwrap();
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.entry_count(), 0);
    }
}
