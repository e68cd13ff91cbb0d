//! ``src/select.rs``
//! ============================================================================
//! # Selection controller
//!
//! Single and multi selection over the tree, including shift-range
//! selection: the anchor's and target's ancestor chains are trimmed to
//! equal length, walked down in lockstep to the divergence point, and the
//! exclusive child ranges on both sides of the common ancestor are
//! gathered in draw order.

use crate::model::node::{Node, NodeId};
use crate::model::tree::Tree;

/// Aggregate answer for a question asked across a heterogeneous
/// multi-selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Yes,
    No,
    Tentative,
}

impl Tree {
    // ------------------------------------------------------------------------
    // Basic selection
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn current_selection(&self) -> Option<NodeId> {
        self.current
    }

    #[must_use]
    pub fn selected_ids(&self) -> Vec<NodeId> {
        self.selection.iter().copied().collect()
    }

    #[must_use]
    pub fn has_keyboard_focus(&self) -> bool {
        self.keyboard_focus
    }

    pub fn clear_selection(&mut self) {
        let ids: Vec<NodeId> = self.selection.drain(..).collect();
        for id in ids {
            if let Some(node) = self.get_mut(id) {
                node.selected = false;
            }
        }
        self.current = None;
    }

    /// Replace the selection with `id`. `open_ancestors` opens every
    /// container on the way so the node becomes reachable.
    pub fn set_selection(&mut self, id: NodeId, open_ancestors: bool, take_focus: bool) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.clear_selection();

        if let Some(node) = self.get_mut(id) {
            node.selected = true;
        }
        self.selection.insert(id);
        self.current = Some(id);

        if open_ancestors {
            let chain = self.ancestors(id);
            for ancestor in &chain {
                if let Some(folder) = self.get_mut(*ancestor).and_then(Node::folder_mut) {
                    folder.open = true;
                }
            }
            if let Some(parent) = chain.first() {
                self.request_arrange(*parent, false);
            }
        }
        if take_focus {
            self.keyboard_focus = true;
        }
        true
    }

    /// Toggle one node's membership without disturbing the rest.
    pub fn change_selection(&mut self, id: NodeId, selected: bool) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        node.selected = selected;
        if selected {
            self.selection.insert(id);
            self.current = Some(id);
        } else {
            self.selection.shift_remove(&id);
            if self.current == Some(id) {
                self.current = self.selection.last().copied();
            }
        }
        true
    }

    // ------------------------------------------------------------------------
    // Range selection
    // ------------------------------------------------------------------------

    /// Extend the selection from the current anchor to `target`. Gathered
    /// nodes that were not yet selected are toggled on and appended to the
    /// selection order; already-selected ones move to the end of the order.
    /// Returns the number of nodes touched; zero when multi-select is off
    /// or the two nodes share no common ancestor.
    pub fn extend_selection_to(&mut self, target: NodeId) -> usize {
        if !self.multi_select || !self.contains(target) {
            return 0;
        }
        let anchor = self.current.unwrap_or(target);

        let Some((common, reverse)) = self.common_ancestor(anchor, target) else {
            return 0;
        };

        // anchor side, deepest level first
        let mut gathered: Vec<NodeId> = Vec::new();
        let mut last_from_anchor = anchor;
        let mut cursor = self.get(anchor).and_then(|n| n.parent);
        while let Some(folder_id) = cursor {
            if folder_id == common {
                break;
            }
            self.gather_child_range_exclusive(
                folder_id,
                Some(last_from_anchor),
                None,
                reverse,
                &mut gathered,
            );
            last_from_anchor = folder_id;
            cursor = self.get(folder_id).and_then(|n| n.parent);
        }

        // target side, gathered away from the target then reversed
        let mut target_side: Vec<NodeId> = Vec::new();
        let mut last_from_target = target;
        cursor = self.get(target).and_then(|n| n.parent);
        while let Some(folder_id) = cursor {
            if folder_id == common {
                break;
            }
            self.gather_child_range_exclusive(
                folder_id,
                Some(last_from_target),
                None,
                !reverse,
                &mut target_side,
            );
            last_from_target = folder_id;
            cursor = self.get(folder_id).and_then(|n| n.parent);
        }

        // the stretch between the two divergent children
        self.gather_child_range_exclusive(
            common,
            Some(last_from_anchor),
            Some(last_from_target),
            reverse,
            &mut gathered,
        );
        gathered.extend(target_side.into_iter().rev());
        gathered.push(target);

        let mut touched = 0;
        for id in gathered {
            if self.get(id).is_some_and(|n| n.selected) {
                // refresh its position in the selection order
                self.selection.shift_remove(&id);
                self.selection.insert(id);
            } else {
                if let Some(node) = self.get_mut(id) {
                    node.selected = true;
                }
                self.selection.insert(id);
            }
            touched += 1;
        }
        self.current = Some(target);
        touched
    }

    /// Nearest container above both nodes, plus which side comes first in
    /// its iteration order (false: `a` first, true: `b` first).
    fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<(NodeId, bool)> {
        self.get(a)?.parent?;
        self.get(b)?.parent?;

        let chain_a = self.ancestors(a);
        let chain_b = self.ancestors(b);
        let mut node_a = a;
        let mut node_b = b;
        let mut ia = 0;
        let mut ib = 0;

        // trim the deeper chain until both are the same height
        while chain_a.len() - ia > chain_b.len() - ib {
            node_a = chain_a[ia];
            ia += 1;
        }
        while chain_b.len() - ib > chain_a.len() - ia {
            node_b = chain_b[ib];
            ib += 1;
        }

        while ia < chain_a.len() {
            let common = chain_a[ia];
            if common == chain_b[ib] {
                // which divergent child comes first in draw order?
                let folder = self.folder_of(common)?;
                for child in folder.children() {
                    if child == node_a {
                        return Some((common, false));
                    }
                    if child == node_b {
                        return Some((common, true));
                    }
                }
                return None;
            }
            node_a = chain_a[ia];
            ia += 1;
            node_b = chain_b[ib];
            ib += 1;
        }
        None
    }

    /// Gather visible children strictly between `start` and `end` in draw
    /// order (`reverse` flips to bottom-up). A `None` start selects from
    /// the first child; a `None` end runs to the last.
    fn gather_child_range_exclusive(
        &self,
        container: NodeId,
        start: Option<NodeId>,
        end: Option<NodeId>,
        reverse: bool,
        out: &mut Vec<NodeId>,
    ) {
        let Some(folder) = self.folder_of(container) else {
            return;
        };
        let forward: Vec<NodeId> = folder.children().collect();
        let ordered: Vec<NodeId> = if reverse {
            forward.into_iter().rev().collect()
        } else {
            forward
        };

        let mut selecting = start.is_none();
        for child in ordered {
            if Some(child) == end {
                return;
            }
            if selecting && self.get(child).is_some_and(|n| n.visible) {
                out.push(child);
            }
            if Some(child) == start {
                selecting = true;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Drop selected nodes that are no longer reachable through visible,
    /// open ancestors. When nothing survives, fall back to the nearest
    /// reachable ancestor of the old anchor.
    pub fn sanitize_selection(&mut self) {
        let original = self.current;

        let stale: Vec<NodeId> = self
            .selection
            .iter()
            .copied()
            .filter(|&id| !self.is_reachable(id))
            .collect();
        for id in stale {
            self.deselect_raw(id);
        }

        if self.selection.is_empty()
            && let Some(anchor) = original
        {
            let fallback = self
                .ancestors(anchor)
                .into_iter()
                .find(|&ancestor| self.is_reachable(ancestor));
            if let Some(id) = fallback {
                self.set_selection(id, false, false);
            }
        }
    }

    fn is_reachable(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if !node.visible {
            return false;
        }
        self.ancestors(id).into_iter().all(|ancestor| {
            self.get(ancestor).is_some_and(|n| {
                n.visible && n.folder().is_some_and(|f| f.open)
            })
        })
    }

    /// Does every selected node carry all bits of `mask`? Mixed answers
    /// across the selection come back tentative instead of forcing a side.
    #[must_use]
    pub fn selection_permission_state(&self, mask: u32) -> TriState {
        let mut any_yes = false;
        let mut any_no = false;
        for &id in &self.selection {
            let Some(node) = self.get(id) else { continue };
            let perms = node
                .link_target
                .and_then(|target| self.get(target))
                .map_or(node.permissions, |target| target.permissions);
            if perms & mask == mask {
                any_yes = true;
            } else {
                any_no = true;
            }
        }
        match (any_yes, any_no) {
            (true, false) => TriState::Yes,
            (false, true) => TriState::No,
            _ => TriState::Tentative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{NodeKind, SortGroup, perm};
    use uuid::Uuid;

    struct Fixture {
        tree: Tree,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: Tree::new(Node::container(Uuid::new_v4(), "Root", 0, SortGroup::System)),
            }
        }

        fn folder(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::container(Uuid::new_v4(), label, 10, SortGroup::Normal);
            let id = node.id;
            self.tree.add(node, parent);
            self.tree.get_mut(id).unwrap().folder_mut().unwrap().open = true;
            id
        }

        fn leaf(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::leaf(Uuid::new_v4(), label, 10, Some(NodeKind::Object));
            let id = node.id;
            self.tree.add(node, parent);
            id
        }

        fn selected(&self) -> Vec<NodeId> {
            self.tree.selected_ids()
        }
    }

    #[test]
    fn shift_select_three_siblings() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");
        let one = fx.leaf(folder, "one");
        let two = fx.leaf(folder, "two");
        let three = fx.leaf(folder, "three");

        fx.tree.set_selection(one, false, false);
        fx.tree.extend_selection_to(three);

        let mut got = fx.selected();
        got.sort();
        let mut want = vec![one, two, three];
        want.sort();
        assert_eq!(got, want);
        assert_eq!(fx.tree.current_selection(), Some(three));
    }

    #[test]
    fn extend_selection_is_idempotent() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");
        let one = fx.leaf(folder, "one");
        let _two = fx.leaf(folder, "two");
        let three = fx.leaf(folder, "three");

        fx.tree.set_selection(one, false, false);
        fx.tree.extend_selection_to(three);
        let first: Vec<NodeId> = {
            let mut v = fx.selected();
            v.sort();
            v
        };

        fx.tree.extend_selection_to(three);
        let second: Vec<NodeId> = {
            let mut v = fx.selected();
            v.sort();
            v
        };
        assert_eq!(first, second);
    }

    #[test]
    fn extend_selection_is_symmetric() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");
        let one = fx.leaf(folder, "one");
        let _two = fx.leaf(folder, "two");
        let three = fx.leaf(folder, "three");

        fx.tree.set_selection(one, false, false);
        fx.tree.extend_selection_to(three);
        let forward: Vec<NodeId> = {
            let mut v = fx.selected();
            v.sort();
            v
        };

        fx.tree.extend_selection_to(one);
        let back: Vec<NodeId> = {
            let mut v = fx.selected();
            v.sort();
            v
        };
        assert_eq!(forward, back);
        assert_eq!(fx.tree.current_selection(), Some(one));
    }

    #[test]
    fn range_crosses_container_boundaries_in_draw_order() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let outer = fx.folder(root, "Outer");
        let sub = fx.folder(outer, "Sub");
        let in_sub_a = fx.leaf(sub, "sub a");
        let in_sub_b = fx.leaf(sub, "sub b");
        let after = fx.leaf(outer, "after");

        // draw order inside Outer: Sub, sub a, sub b, after
        fx.tree.set_selection(in_sub_a, false, false);
        fx.tree.extend_selection_to(after);

        let mut got = fx.selected();
        got.sort();
        let mut want = vec![in_sub_a, in_sub_b, after];
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn no_common_ancestor_or_single_select_is_a_noop() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");
        let leaf = fx.leaf(folder, "x");

        fx.tree.set_selection(leaf, false, false);
        // the root has no parent, so no common ancestor exists
        assert_eq!(fx.tree.extend_selection_to(root), 0);

        fx.tree.set_multi_select(false);
        assert_eq!(fx.tree.extend_selection_to(folder), 0);
        assert_eq!(fx.selected(), vec![leaf]);
    }

    #[test]
    fn set_selection_opens_ancestors_on_request() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let outer = fx.folder(root, "Outer");
        let inner = fx.folder(outer, "Inner");
        let leaf = fx.leaf(inner, "deep");

        for id in [outer, inner] {
            fx.tree.get_mut(id).unwrap().folder_mut().unwrap().open = false;
        }

        fx.tree.set_selection(leaf, true, true);
        for id in [outer, inner] {
            assert!(fx.tree.get(id).unwrap().folder().unwrap().open);
        }
        assert!(fx.tree.has_keyboard_focus());
    }

    #[test]
    fn sanitize_falls_back_to_reachable_ancestor() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");
        let leaf = fx.leaf(folder, "x");

        fx.tree.set_selection(leaf, false, false);
        fx.tree.get_mut(folder).unwrap().folder_mut().unwrap().open = false;
        fx.tree.sanitize_selection();

        assert_eq!(fx.selected(), vec![folder]);
        assert!(!fx.tree.get(leaf).unwrap().selected);
    }

    #[test]
    fn permission_state_over_mixed_selection_is_tentative() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "F");

        let copyable = Node::leaf(Uuid::new_v4(), "a", 1, Some(NodeKind::Object))
            .with_permissions(perm::COPY | perm::MODIFY);
        let copyable_id = copyable.id;
        fx.tree.add(copyable, folder);

        let locked = Node::leaf(Uuid::new_v4(), "b", 1, Some(NodeKind::Object))
            .with_permissions(perm::NONE);
        let locked_id = locked.id;
        fx.tree.add(locked, folder);

        fx.tree.set_selection(copyable_id, false, false);
        assert_eq!(fx.tree.selection_permission_state(perm::COPY), TriState::Yes);

        fx.tree.change_selection(locked_id, true);
        assert_eq!(
            fx.tree.selection_permission_state(perm::COPY),
            TriState::Tentative
        );

        fx.tree.change_selection(copyable_id, false);
        assert_eq!(fx.tree.selection_permission_state(perm::COPY), TriState::No);
    }
}
