//! ``src/sort.rs``
//! ============================================================================
//! # NodeSorter: strict-weak comparator for child lists
//!
//! Sub-containers and items live in separate lists and are sorted
//! separately, so cross-group comparisons only ever go through the group
//! rules. The comparator is a strict weak ordering within either list.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::node::{Node, NodeId, SortGroup};
use crate::model::tree::Tree;

/// Active sort order flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortFlags {
    /// Sort by creation date instead of name.
    pub by_date: bool,

    /// Containers stay name-sorted even under date sort.
    pub folders_by_name: bool,

    /// System containers sort above everything else.
    pub system_to_top: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NodeSorter {
    flags: SortFlags,

    /// Container whose children honor explicit manual ranks (a curated
    /// ordering list); `None` disables rule one everywhere.
    pinned_container: Option<NodeId>,
}

impl NodeSorter {
    #[must_use]
    pub fn new(flags: SortFlags) -> Self {
        Self {
            flags,
            pinned_container: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> SortFlags {
        self.flags
    }

    pub fn set_pinned_container(&mut self, container: Option<NodeId>) {
        self.pinned_container = container;
    }

    /// Swap in a new sort order. Returns false (and changes nothing) when
    /// the flags are identical; the caller cascades the needs-sort and
    /// needs-arrange signals on true.
    pub fn update_sort(&mut self, flags: SortFlags) -> bool {
        if self.flags == flags {
            return false;
        }
        self.flags = flags;
        true
    }

    /// Compare two siblings inside `container`.
    #[must_use]
    pub fn compare(&self, container: NodeId, a: &Node, b: &Node) -> Ordering {
        // rule one: pinned manual ordering bypasses everything else
        if self.pinned_container == Some(container)
            && let (Some(rank_a), Some(rank_b)) = (a.manual_rank, b.manual_rank)
        {
            return rank_a.cmp(&rank_b);
        }

        let group_a = a.sort_group();
        let group_b = b.sort_group();
        if group_a != group_b {
            if self.flags.system_to_top {
                // group order: system, trash, normal containers, items
                return group_a.cmp(&group_b);
            }
            if self.flags.by_date
                && (group_a == SortGroup::Trash || group_b == SortGroup::Trash)
            {
                // trash sinks to the bottom under date sort
                return if group_a == SortGroup::Trash {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }
        }

        let by_name = !self.flags.by_date
            || (self.flags.folders_by_name && group_a != SortGroup::Item);

        if by_name {
            match compare_dict(&a.label, &b.label) {
                Ordering::Equal => b.effective_created_at().cmp(&a.effective_created_at()),
                ordering => ordering,
            }
        } else {
            // newest first
            match b.effective_created_at().cmp(&a.effective_created_at()) {
                Ordering::Equal => compare_dict(&a.label, &b.label),
                ordering => ordering,
            }
        }
    }

    /// Sort both child lists of `container` in place.
    pub fn sort_children(&self, tree: &mut Tree, container: NodeId) {
        let Some(folder) = tree.get(container).and_then(Node::folder) else {
            return;
        };
        let mut folders = folder.folders.clone();
        let mut items = folder.items.clone();

        folders.sort_by(|&x, &y| self.compare_ids(tree, container, x, y));
        items.sort_by(|&x, &y| self.compare_ids(tree, container, x, y));

        if let Some(folder) = tree.get_mut(container).and_then(Node::folder_mut) {
            folder.folders = folders;
            folder.items = items;
            folder.needs_sort = false;
        }
    }

    fn compare_ids(&self, tree: &Tree, container: NodeId, x: NodeId, y: NodeId) -> Ordering {
        match (tree.get(x), tree.get(y)) {
            (Some(a), Some(b)) => self.compare(container, a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Case-insensitive dictionary comparison.
#[must_use]
pub fn compare_dict(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
