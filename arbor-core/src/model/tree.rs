//! ``src/model/tree.rs``
//! ============================================================================
//! # Tree: id-keyed registry and ownership root
//!
//! Owns every [`Node`] in an id-keyed arena. All structural edges are ids;
//! lookups go through this registry, and removal is always by id. The tree
//! also owns the selection order, since node teardown must deselect before
//! it unregisters.

use ahash::RandomState;
use hashbrown::HashMap;
use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::model::node::{
    ARRANGE_STALE, FolderState, GENERATION_UNKNOWN, Node, NodeId,
};

/// Ancestor chains rarely exceed this depth; avoids heap traffic.
pub type AncestorChain = SmallVec<[NodeId; 16]>;

#[derive(Debug)]
pub struct Tree {
    nodes: HashMap<NodeId, Node, RandomState>,
    root: NodeId,

    /// Global selection order; insertion order is meaningful.
    pub(crate) selection: IndexSet<NodeId>,

    /// The "current" anchor. At most one exists.
    pub(crate) current: Option<NodeId>,

    pub(crate) multi_select: bool,

    /// Keyboard focus follows the last selection made with take-focus.
    pub(crate) keyboard_focus: bool,

    /// Stamp written into folders on a completed arrange pass.
    pub(crate) arrange_generation: i64,
}

impl Tree {
    /// Build a tree around a fresh root container. The root is always open.
    #[must_use]
    pub fn new(mut root: Node) -> Self {
        debug_assert!(root.is_container(), "tree root must be a container");
        let root_id = root.id;
        if let Some(folder) = root.folder_mut() {
            folder.open = true;
        }

        let mut nodes = HashMap::with_capacity_and_hasher(2048, RandomState::new());
        nodes.insert(root_id, root);

        Self {
            nodes,
            root: root_id,
            selection: IndexSet::new(),
            current: None,
            multi_select: true,
            keyboard_focus: false,
            arrange_generation: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_multi_select(&mut self, enabled: bool) {
        self.multi_select = enabled;
    }

    // ------------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------------

    /// Attach `node` under `parent`. Triggers needs-sort and needs-arrange
    /// bubbling and propagates the new aggregate creation date up the
    /// ancestor chain. Returns false when the parent is unknown, is not a
    /// container, or the id is already registered.
    pub fn add(&mut self, mut node: Node, parent: NodeId) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return false;
        };
        let Some(parent_folder) = parent_node.folder.as_mut() else {
            return false;
        };

        let id = node.id;
        let is_container = node.is_container();
        let child_date = node.effective_created_at();
        node.parent = Some(parent);

        if is_container {
            parent_folder.folders.push(id);
        } else {
            parent_folder.items.push(id);
        }
        parent_folder.needs_sort = true;

        self.nodes.insert(id, node);
        self.propagate_created_at(parent, child_date);
        self.dirty_filter(id);
        self.request_arrange(parent, false);
        true
    }

    /// Destroy `id` and its whole subtree. Descendants are torn down
    /// bottom-up; every node is deselected before it is unregistered, and
    /// only then is `id` detached from its parent's child list. The root
    /// cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }
        let parent = self.nodes[&id].parent;

        for child in self.child_ids(id) {
            self.despawn(child);
        }
        self.deselect_raw(id);
        self.nodes.remove(&id);

        if let Some(parent_id) = parent {
            if let Some(folder) = self.nodes.get_mut(&parent_id).and_then(Node::folder_mut) {
                folder.folders.retain(|&c| c != id);
                folder.items.retain(|&c| c != id);
            }
            // the row disappears regardless of filter state
            self.request_arrange(parent_id, false);
        }
        true
    }

    fn despawn(&mut self, id: NodeId) {
        for child in self.child_ids(id) {
            self.despawn(child);
        }
        self.deselect_raw(id);
        self.nodes.remove(&id);
    }

    pub(crate) fn deselect_raw(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.selected = false;
        }
        self.selection.shift_remove(&id);
        if self.current == Some(id) {
            self.current = self.selection.last().copied();
        }
    }

    fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .and_then(Node::folder)
            .map(|f| f.children().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------------

    /// Relabel a node. A changed searchable form re-dirties the filter; any
    /// label change invalidates the cached width and re-arranges the parent.
    pub fn set_label(&mut self, id: NodeId, label: &str) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let parent = node.parent;
        let search_changed = node.set_label(label);

        if search_changed {
            self.dirty_filter(id);
        }
        if let Some(parent_id) = parent {
            self.request_arrange(parent_id, false);
        }
        true
    }

    /// Restamp a node's creation date, re-dirtying the filter and refreshing
    /// ancestor aggregates.
    pub fn set_created_at(&mut self, id: NodeId, created_at: i64) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.created_at == created_at {
            return true;
        }
        node.created_at = created_at;
        let parent = node.parent;
        let date = node.effective_created_at();

        self.dirty_filter(id);
        if let Some(parent_id) = parent {
            self.propagate_created_at(parent_id, date);
        }
        true
    }

    fn propagate_created_at(&mut self, from: NodeId, date: i64) {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let Some(node) = self.nodes.get_mut(&id) else {
                break;
            };
            if let Some(folder) = node.folder.as_mut() {
                folder.subtree_created_at = folder.subtree_created_at.max(date);
            }
            cursor = node.parent;
        }
    }

    // ------------------------------------------------------------------------
    // Dirty propagation
    // ------------------------------------------------------------------------

    /// Forget a node's filter verdict and force re-evaluation of every
    /// ancestor's subtree on the next pass.
    pub fn dirty_filter(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.last_filter_generation = GENERATION_UNKNOWN;
        if let Some(folder) = node.folder.as_mut() {
            folder.completed_generation = GENERATION_UNKNOWN;
        }

        let mut cursor = node.parent;
        while let Some(ancestor_id) = cursor {
            let Some(ancestor) = self.nodes.get_mut(&ancestor_id) else {
                break;
            };
            if let Some(folder) = ancestor.folder.as_mut() {
                folder.completed_generation = GENERATION_UNKNOWN;
            }
            cursor = ancestor.parent;
        }
    }

    /// Mark a node's layout stale and bubble the request to the root so the
    /// ancestors re-measure. `include_descendants` additionally invalidates
    /// the whole subtree (indentation changes on reparent).
    pub fn request_arrange(&mut self, id: NodeId, include_descendants: bool) {
        // leaves delegate to their owning container
        let target = match self.nodes.get(&id) {
            Some(node) if node.is_container() => Some(id),
            Some(node) => node.parent,
            None => None,
        };
        let Some(target) = target else { return };

        let mut cursor = Some(target);
        while let Some(folder_id) = cursor {
            let Some(node) = self.nodes.get_mut(&folder_id) else {
                break;
            };
            if let Some(folder) = node.folder.as_mut() {
                folder.last_arrange_generation = ARRANGE_STALE;
            }
            cursor = node.parent;
        }

        if include_descendants {
            self.mark_subtree_arrange_stale(target);
        }
    }

    fn mark_subtree_arrange_stale(&mut self, id: NodeId) {
        for child in self.child_ids(id) {
            if let Some(folder) = self.nodes.get_mut(&child).and_then(Node::folder_mut) {
                folder.last_arrange_generation = ARRANGE_STALE;
            }
            self.mark_subtree_arrange_stale(child);
        }
    }

    /// Flag every container for re-sort (sort order changed).
    pub fn mark_all_needs_sort(&mut self) {
        for node in self.nodes.values_mut() {
            if let Some(folder) = node.folder.as_mut() {
                folder.needs_sort = true;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    /// Walk the parent chain looking for `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        false
    }

    #[must_use]
    pub fn is_descendant_or_self(&self, id: NodeId, ancestor: NodeId) -> bool {
        id == ancestor || self.is_descendant_of(id, ancestor)
    }

    /// Ancestors from the immediate parent up to the root.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> AncestorChain {
        let mut chain = AncestorChain::new();
        let mut cursor = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        chain
    }

    fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.visible)
    }

    fn sibling_after(&self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        let folder = self.nodes.get(&parent)?.folder()?;
        if let Some(pos) = folder.folders.iter().position(|&c| c == child) {
            return folder
                .folders
                .get(pos + 1)
                .or_else(|| folder.items.first())
                .copied();
        }
        let pos = folder.items.iter().position(|&c| c == child)?;
        folder.items.get(pos + 1).copied()
    }

    fn sibling_before(&self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        let folder = self.nodes.get(&parent)?.folder()?;
        if let Some(pos) = folder.items.iter().position(|&c| c == child) {
            return if pos > 0 {
                folder.items.get(pos - 1).copied()
            } else {
                folder.folders.last().copied()
            };
        }
        let pos = folder.folders.iter().position(|&c| c == child)?;
        if pos > 0 {
            folder.folders.get(pos - 1).copied()
        } else {
            None
        }
    }

    /// Successor in draw order. Descends into `id`'s children only when
    /// `enter` is set and the node is an open container.
    fn step_forward(&self, id: NodeId, enter: bool) -> Option<NodeId> {
        if enter
            && let Some(folder) = self.nodes.get(&id).and_then(Node::folder)
            && folder.open
            && let Some(first) = folder.children().next()
        {
            return Some(first);
        }

        let mut cursor = id;
        loop {
            let parent = self.nodes.get(&cursor)?.parent?;
            if let Some(sibling) = self.sibling_after(parent, cursor) {
                return Some(sibling);
            }
            cursor = parent;
        }
    }

    /// Deepest row of `id`'s subtree reachable through visible, open folders.
    fn last_reachable(&self, id: NodeId) -> NodeId {
        let mut cursor = id;
        loop {
            let Some(node) = self.nodes.get(&cursor) else {
                return cursor;
            };
            if !node.visible {
                return cursor;
            }
            let Some(folder) = node.folder() else {
                return cursor;
            };
            if !folder.open {
                return cursor;
            }
            match folder.items.last().or_else(|| folder.folders.last()) {
                Some(&last) => cursor = last,
                None => return cursor,
            }
        }
    }

    /// Next visible row after `id` in draw order, or `None` when `id` is the
    /// last one. Skipped invisible containers are never entered, and the
    /// walk terminates at the boundary instead of wrapping.
    #[must_use]
    pub fn next_visible(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = self.step_forward(id, self.is_visible(id))?;
        loop {
            if self.is_visible(cursor) {
                return Some(cursor);
            }
            cursor = self.step_forward(cursor, false)?;
        }
    }

    /// Previous visible row before `id` in draw order.
    #[must_use]
    pub fn previous_visible(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let parent = self.nodes.get(&cursor)?.parent?;
            let candidate = match self.sibling_before(parent, cursor) {
                Some(sibling) => self.last_reachable(sibling),
                None => parent,
            };
            if self.is_visible(candidate) {
                return Some(candidate);
            }
            cursor = candidate;
        }
    }

    /// Iterate all registered ids (test and snapshot support; order is
    /// unspecified).
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    #[must_use]
    pub(crate) fn folder_of(&self, id: NodeId) -> Option<&FolderState> {
        self.nodes.get(&id).and_then(Node::folder)
    }
}
