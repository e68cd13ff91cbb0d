//! ``src/filter/engine.rs``
//! ============================================================================
//! # Filter evaluation pass
//!
//! One [`FilterPass`] snapshots the criteria, the clipboard, and the clock
//! for the duration of a single budgeted traversal; nothing is re-read
//! mid-recursion. The budget is threaded through the recursion functionally
//! and returned, so an exhausted pass aborts cleanly and resumes on a later
//! tick from the memoized state.

use cutbuf::Clipboard;
use tracing::trace;

use crate::fetch::FetchScheduler;
use crate::filter::criteria::FilterCriteria;
use crate::model::node::{GENERATION_UNKNOWN, LinkPolicy, Node, NodeId, NodeKind};
use crate::model::tree::Tree;

pub struct FilterPass<'a> {
    criteria: &'a FilterCriteria,
    clipboard: &'a Clipboard,
    scheduler: Option<&'a mut FetchScheduler>,

    /// Lower date bound, resolved once per pass.
    earliest: i64,
}

impl<'a> FilterPass<'a> {
    #[must_use]
    pub fn new(
        criteria: &'a FilterCriteria,
        clipboard: &'a Clipboard,
        scheduler: Option<&'a mut FetchScheduler>,
        now: i64,
    ) -> Self {
        let earliest = criteria.earliest_allowed(now);
        Self {
            criteria,
            clipboard,
            scheduler,
            earliest,
        }
    }

    /// Run one budgeted pass from the root. Returns the unspent budget;
    /// a negative result means the traversal was aborted mid-way.
    pub fn run(&mut self, tree: &mut Tree, budget: i32) -> i32 {
        trace!(
            marker = "FILTER_PASS",
            operation_type = "filter_pass_start",
            generation = self.criteria.current_generation(),
            budget,
            "starting filter pass"
        );
        let root = tree.root();
        self.filter_container(tree, root, budget)
    }

    // ------------------------------------------------------------------------
    // Per-node checks
    // ------------------------------------------------------------------------

    /// Full per-node check: type mask, exact/linked id, substring, date
    /// window, permissions (resolved through link indirection), link policy,
    /// clipboard-cut exclusion.
    #[must_use]
    pub fn check(&self, tree: &Tree, node: &Node) -> bool {
        let ops = self.criteria.ops();

        let type_ok = match node.kind {
            // untyped non-links always pass the kind mask
            None => !node.is_link() || ops.object_types.allows_links(),
            Some(kind) => {
                ops.object_types.contains(kind)
                    && (!node.is_link() || ops.object_types.allows_links())
            }
        };

        let wearable_ok = match (node.kind, node.wearable) {
            (Some(NodeKind::Wearable), Some(wearable)) => {
                ops.wearable_types & wearable.bit() != 0
            }
            _ => true,
        };

        let uuid_ok = ops
            .uuid_target
            .is_none_or(|target| node.id == target || node.link_target == Some(target));

        let substring_ok = ops.substring.is_empty()
            || node.searchable_label.contains(ops.substring.as_str());

        // permissions live on the link target, not the link row
        let effective_perms = node
            .link_target
            .and_then(|target| tree.get(target))
            .map_or(node.permissions, |target| target.permissions);
        let perm_ok = effective_perms & ops.permissions == ops.permissions;

        let created = node.effective_created_at();
        let date_ok = created >= self.earliest && created <= ops.max_date;

        let link_ok = match ops.link_policy {
            LinkPolicy::Include => true,
            LinkPolicy::ExcludeLinks => !node.is_link(),
            LinkPolicy::LinksOnly => node.is_link(),
        };

        type_ok
            && wearable_ok
            && uuid_ok
            && substring_ok
            && perm_ok
            && date_ok
            && link_ok
            && self.passes_clipboard(tree, node.id)
    }

    /// Folder-specific check: category mask plus cut exclusion.
    #[must_use]
    pub fn check_folder(&self, tree: &Tree, node: &Node) -> bool {
        let ops = self.criteria.ops();
        let category_ok = match node.folder().and_then(|f| f.category) {
            Some(category) => ops.category_types.contains(category),
            // plain user folders pass any category mask
            None => true,
        };
        category_ok && self.passes_clipboard(tree, node.id)
    }

    /// A node fails while any ancestor (or itself) sits on a cut clipboard.
    fn passes_clipboard(&self, tree: &Tree, id: NodeId) -> bool {
        if !self.criteria.ops().exclude_cut || !self.clipboard.is_cut_mode() {
            return true;
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.clipboard.is_on_clipboard(current) {
                return false;
            }
            cursor = tree.get(current).and_then(|n| n.parent);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Recursive traversal
    // ------------------------------------------------------------------------

    fn filter_container(&mut self, tree: &mut Tree, id: NodeId, mut budget: i32) -> i32 {
        let generation = self.criteria.current_generation();
        let fail_bound = self.criteria.first_fail_generation();
        let pass_bound = self.criteria.first_success_generation();

        let Some(node) = tree.get(id) else {
            debug_assert!(false, "filter over an unregistered node");
            return budget;
        };
        let Some(folder) = node.folder() else {
            debug_assert!(false, "filter_container over a leaf");
            return budget;
        };

        // subtree fully evaluated at this generation already
        if folder.completed_generation >= generation {
            return budget;
        }

        let last_generation = node.last_filter_generation;
        let previously_passed = node.passed_filter;
        let was_visible = node.visible;

        if last_generation < generation {
            if last_generation >= fail_bound && !previously_passed {
                // rejected by an earlier filter the current one narrows;
                // the failure is still authoritative
                if let Some(node) = tree.get_mut(id) {
                    node.last_filter_generation = generation;
                }
            } else {
                budget -= 1;
                let node_ref = tree.get(id).expect("checked above");
                let folder_passed = self.check_folder(tree, node_ref);
                let self_passed = folder_passed && self.check(tree, node_ref);

                let node = tree.get_mut(id).expect("checked above");
                if let Some(folder) = node.folder_mut() {
                    folder.passed_folder_filter = folder_passed;
                }
                node.set_filtered(self_passed, generation);
                if was_visible != self_passed {
                    tree.request_arrange(id, false);
                }
            }
        }

        // every descendant was filtered since the fail bound and none
        // passed: nothing below can become visible, skip the traversal
        let folder = tree.folder_of(id).expect("checked above");
        if folder.completed_generation >= fail_bound
            && !folder.has_filtered_descendants(fail_bound)
        {
            return budget;
        }

        if budget < 0 {
            return budget;
        }

        // matching folders get their unknown contents fetched first
        if self.criteria.is_not_default()
            && tree.get(id).is_some_and(|n| n.passed(pass_bound))
            && !tree.folder_of(id).is_some_and(|f| f.complete)
            && let Some(scheduler) = self.scheduler.as_deref_mut()
        {
            scheduler.start(tree, id, false);
        }

        // sub-containers first, then items, as snapshots of the child lists
        let child_folders = tree
            .folder_of(id)
            .map(|f| f.folders.clone())
            .unwrap_or_default();
        for child in child_folders {
            if budget < 0 {
                break;
            }
            let Some(child_node) = tree.get(child) else {
                continue;
            };
            let child_completed = child_node
                .folder()
                .map_or(GENERATION_UNKNOWN, |f| f.completed_generation);
            if child_completed >= generation {
                // already evaluated; the descendant marker may still have
                // been reset and needs refreshing
                if child_node.passed(pass_bound)
                    || child_node
                        .folder()
                        .is_some_and(|f| f.has_filtered_descendants(pass_bound))
                {
                    mark_descendant_passed(tree, id, generation);
                }
                continue;
            }

            budget = self.filter_container(tree, child, budget);

            if let Some(child_node) = tree.get(child)
                && (child_node.passed(pass_bound)
                    || child_node
                        .folder()
                        .is_some_and(|f| f.has_filtered_descendants(generation)))
            {
                mark_descendant_passed(tree, id, generation);
            }
        }

        let child_items = tree
            .folder_of(id)
            .map(|f| f.items.clone())
            .unwrap_or_default();
        for child in child_items {
            if budget < 0 {
                break;
            }
            let Some(item) = tree.get(child) else {
                continue;
            };
            if item.last_filter_generation >= generation {
                if item.passed_filter {
                    mark_descendant_passed(tree, id, generation);
                }
                continue;
            }
            if item.last_filter_generation >= fail_bound && !item.passed_filter {
                // failed an earlier subset of the current filter
                if let Some(item) = tree.get_mut(child) {
                    item.set_filtered(false, generation);
                }
                continue;
            }

            budget -= 1;
            let item_ref = tree.get(child).expect("checked above");
            let was_item_visible = item_ref.visible;
            let passed = self.check(tree, item_ref);

            if let Some(item) = tree.get_mut(child) {
                item.set_filtered(passed, generation);
            }
            if was_item_visible != passed {
                tree.request_arrange(child, false);
            }
            if tree.get(child).is_some_and(|n| n.passed(pass_bound)) {
                mark_descendant_passed(tree, id, generation);
            }
        }

        // leftover budget means the whole subtree got evaluated
        if budget > 0
            && let Some(folder) = tree.get_mut(id).and_then(Node::folder_mut)
        {
            folder.completed_generation = generation;
        }
        budget
    }
}

fn mark_descendant_passed(tree: &mut Tree, id: NodeId, generation: i32) {
    if let Some(folder) = tree.get_mut(id).and_then(Node::folder_mut) {
        folder.most_filtered_generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::SortGroup;
    use uuid::Uuid;

    const NOW: i64 = 2_000_000;

    struct Fixture {
        tree: Tree,
        criteria: FilterCriteria,
        clipboard: Clipboard,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: Tree::new(Node::container(Uuid::new_v4(), "Root", 0, SortGroup::System)),
                criteria: FilterCriteria::new(),
                clipboard: Clipboard::default(),
            }
        }

        fn add_folder(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::container(Uuid::new_v4(), label, 100, SortGroup::Normal);
            let id = node.id;
            assert!(self.tree.add(node, parent));
            id
        }

        fn add_leaf(&mut self, parent: NodeId, label: &str, kind: NodeKind) -> NodeId {
            let node = Node::leaf(Uuid::new_v4(), label, 100, Some(kind));
            let id = node.id;
            assert!(self.tree.add(node, parent));
            id
        }

        fn run(&mut self, budget: i32) -> i32 {
            self.criteria.take_modified();
            let mut pass = FilterPass::new(&self.criteria, &self.clipboard, None, NOW);
            pass.run(&mut self.tree, budget)
        }

        fn passed(&self, id: NodeId) -> bool {
            self.tree
                .get(id)
                .unwrap()
                .passed(self.criteria.first_success_generation())
        }
    }

    #[test]
    fn default_criteria_pass_every_node() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder_a = fx.add_folder(root, "Objects");
        let folder_b = fx.add_folder(root, "Textures");
        let leaves = [
            fx.add_leaf(folder_a, "chair", NodeKind::Object),
            fx.add_leaf(folder_a, "lamp", NodeKind::Object),
            fx.add_leaf(folder_b, "wood grain", NodeKind::Texture),
        ];

        let remaining = fx.run(100);
        assert!(remaining > 0);

        for id in [root, folder_a, folder_b, leaves[0], leaves[1], leaves[2]] {
            assert!(fx.passed(id), "node should pass the default filter");
        }
    }

    #[test]
    fn completed_subtree_is_not_reevaluated() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Things");
        fx.add_leaf(folder, "alpha", NodeKind::Notecard);
        fx.add_leaf(folder, "beta", NodeKind::Notecard);

        fx.run(100);
        let generation = fx.criteria.current_generation();
        let completed = fx.tree.folder_of(root).unwrap().completed_generation;
        assert!(completed >= generation);

        let snapshot: Vec<_> = fx
            .tree
            .ids()
            .map(|id| {
                let n = fx.tree.get(id).unwrap();
                (id, n.passed_filter, n.last_filter_generation)
            })
            .collect();

        // memoization idempotence: a repeat pass mutates nothing
        let remaining = fx.run(100);
        assert_eq!(remaining, 100);
        for (id, passed, last_gen) in snapshot {
            let n = fx.tree.get(id).unwrap();
            assert_eq!(n.passed_filter, passed);
            assert_eq!(n.last_filter_generation, last_gen);
        }
    }

    #[test]
    fn substring_filter_marks_matching_descendants() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Animals");
        let cat = fx.add_leaf(folder, "cat statue", NodeKind::Object);
        let dog = fx.add_leaf(folder, "dog statue", NodeKind::Object);

        fx.criteria.set_substring("cat");
        fx.run(100);

        assert!(fx.passed(cat));
        assert!(!fx.passed(dog));
        assert!(!fx.passed(folder));
        let generation = fx.criteria.current_generation();
        assert!(
            fx.tree
                .folder_of(folder)
                .unwrap()
                .has_filtered_descendants(generation)
        );
        assert!(
            fx.tree
                .folder_of(root)
                .unwrap()
                .has_filtered_descendants(generation)
        );
    }

    #[test]
    fn narrowing_reuses_authoritative_failures() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Animals");
        let cat = fx.add_leaf(folder, "cat", NodeKind::Object);
        let dog = fx.add_leaf(folder, "dog", NodeKind::Object);

        fx.criteria.set_substring("ca");
        fx.run(100);
        assert!(fx.passed(cat));
        assert!(!fx.passed(dog));

        // narrowing: only the old passes need re-proving, so exactly one
        // check is spent ("cat"); root, folder and "dog" short-circuit
        fx.criteria.set_substring("cat");
        let remaining = fx.run(100);
        assert_eq!(remaining, 99);
        assert!(fx.passed(cat));
        assert!(!fx.passed(dog));
    }

    #[test]
    fn budget_exhaustion_aborts_and_resumes() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Bulk");
        for i in 0..20 {
            fx.add_leaf(folder, &format!("item {i}"), NodeKind::Notecard);
        }

        fx.criteria.set_substring("item");
        let remaining = fx.run(5);
        assert!(remaining <= 0);
        let generation = fx.criteria.current_generation();
        assert!(fx.tree.folder_of(root).unwrap().completed_generation < generation);

        // a later pass finishes the job from where the first one stopped
        let remaining = fx.run(100);
        assert!(remaining > 0);
        assert!(fx.tree.folder_of(root).unwrap().completed_generation >= generation);
        let evaluated = fx
            .tree
            .ids()
            .filter(|&id| fx.tree.get(id).unwrap().last_filter_generation >= generation)
            .count();
        assert_eq!(evaluated, fx.tree.len());
    }

    #[test]
    fn filter_generations_never_decrease() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Watched");
        let leaf = fx.add_leaf(folder, "thing", NodeKind::Object);

        let mut last_seen = GENERATION_UNKNOWN;
        for needle in ["t", "th", "thing", "x", ""] {
            fx.criteria.set_substring(needle);
            fx.run(100);
            let generation = fx.tree.get(leaf).unwrap().last_filter_generation;
            assert!(generation >= last_seen);
            last_seen = generation;
        }
    }

    #[test]
    fn cut_clipboard_ancestors_fail_the_node() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Cut Me");
        let leaf = fx.add_leaf(folder, "inner", NodeKind::Object);

        fx.clipboard.cut(&[folder]).unwrap();
        // cut exclusion only matters under an active filter
        fx.criteria.set_substring("inner");
        fx.run(100);
        assert!(!fx.passed(leaf));

        fx.clipboard.copy(&[folder]).unwrap();
        fx.tree.dirty_filter(leaf);
        fx.run(100);
        assert!(fx.passed(leaf));
    }

    #[test]
    fn link_permissions_resolve_through_target() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Stuff");

        let target = Node::leaf(Uuid::new_v4(), "original", 100, Some(NodeKind::Object))
            .with_permissions(crate::model::node::perm::COPY);
        let target_id = target.id;
        fx.tree.add(target, folder);

        let link = Node::leaf(Uuid::new_v4(), "original link", 100, Some(NodeKind::Object))
            .with_permissions(0)
            .with_link_to(target_id);
        let link_id = link.id;
        fx.tree.add(link, folder);

        fx.criteria.set_permissions(crate::model::node::perm::COPY);
        fx.run(100);
        assert!(fx.passed(target_id));
        assert!(fx.passed(link_id), "link borrows its target's permissions");
    }

    #[test]
    fn link_policy_splits_links_from_originals() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "Stuff");
        let original = fx.add_leaf(folder, "thing", NodeKind::Object);
        let link = Node::leaf(Uuid::new_v4(), "thing link", 100, Some(NodeKind::Object))
            .with_link_to(original);
        let link_id = link.id;
        fx.tree.add(link, folder);

        fx.criteria.set_link_policy(LinkPolicy::LinksOnly);
        fx.run(100);
        assert!(!fx.passed(original));
        assert!(fx.passed(link_id));

        fx.criteria.set_link_policy(LinkPolicy::ExcludeLinks);
        fx.run(100);
        assert!(fx.passed(original));
        assert!(!fx.passed(link_id));
    }

    #[test]
    fn matching_incomplete_folder_requests_a_fetch() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_folder(root, "cat pictures");
        fx.tree
            .get_mut(root)
            .unwrap()
            .folder_mut()
            .unwrap()
            .complete = true;

        fx.criteria.set_substring("cat");
        fx.criteria.take_modified();

        let mut scheduler = FetchScheduler::default();
        let mut pass = FilterPass::new(
            &fx.criteria,
            &fx.clipboard,
            Some(&mut scheduler),
            NOW,
        );
        pass.run(&mut fx.tree, 100);

        assert!(scheduler.queued_for(folder), "matching incomplete folder should be queued");
    }
}
