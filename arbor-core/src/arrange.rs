//! ``src/arrange.rs``
//! ============================================================================
//! # Arrangement pass: layout, visibility cascade, height animation
//!
//! Containers animate their height toward the freshly measured target with
//! critically damped interpolation; any remaining delta re-marks the folder
//! stale so the next tick continues the animation. Children that fall
//! outside a still-shrinking height are hidden early, with a small overlap
//! tolerance so rows do not visibly pop at the boundary.

use tracing::trace;

use crate::model::node::{
    ARRANGE_STALE, FolderShow, Generation, Node, NodeId,
};
use crate::model::tree::Tree;
use crate::sort::NodeSorter;

pub const ITEM_HEIGHT: f32 = 20.0;
pub const INDENT_STEP: f32 = 8.0;

/// Crude glyph advance for label measurement; real text metrics are the
/// renderer's business.
pub const LABEL_GLYPH_WIDTH: f32 = 7.0;
pub const LABEL_PAD: f32 = 14.0;

/// Rows may overlap the animated boundary by this much before they hide.
pub const MAX_ROW_OVERLAP: f32 = 2.0;

pub const FOLDER_OPEN_TIME_CONSTANT: f32 = 0.03;
pub const FOLDER_CLOSE_TIME_CONSTANT: f32 = 0.02;

/// Interpolation fraction for a critically damped approach.
#[must_use]
pub fn critically_damped(dt: f32, time_constant: f32) -> f32 {
    if time_constant <= 0.0 {
        return 1.0;
    }
    (1.0 - 2.0_f32.powf(-dt / time_constant)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrangeOutcome {
    pub width: f32,
    pub height: f32,

    /// Some container is still chasing its target height; arrange again
    /// next tick.
    pub animating: bool,
}

pub struct ArrangePass<'a> {
    sorter: &'a NodeSorter,
    folder_show: FolderShow,

    /// Pass/fail reads are trusted at this generation (the criteria's
    /// first-success bound), snapshotted for the whole pass.
    generation: Generation,

    dt: f32,
}

impl<'a> ArrangePass<'a> {
    #[must_use]
    pub fn new(
        sorter: &'a NodeSorter,
        folder_show: FolderShow,
        generation: Generation,
        dt: f32,
    ) -> Self {
        Self {
            sorter,
            folder_show,
            generation,
            dt,
        }
    }

    /// Arrange the whole tree within `available_width`.
    pub fn run(&self, tree: &mut Tree, available_width: f32) -> ArrangeOutcome {
        tree.arrange_generation += 1;
        let root = tree.root();
        let (width, height, _target, animating) = self.arrange_container(tree, root);
        trace!(
            marker = "ARRANGE_PASS",
            operation_type = "arrange_pass_done",
            height,
            animating,
            "arrange pass finished"
        );
        ArrangeOutcome {
            width: width.max(available_width),
            height,
            animating,
        }
    }

    /// Returns (width, current height, target height, animating).
    fn arrange_container(&self, tree: &mut Tree, id: NodeId) -> (f32, f32, f32, bool) {
        // sort before laying out contents
        if tree.folder_of(id).is_some_and(|f| f.needs_sort) {
            self.sorter.sort_children(tree, id);
        }

        self.refresh_has_visible_children(tree, id);

        let Some(node) = tree.get(id) else {
            return (0.0, 0.0, 0.0, false);
        };
        let depth = node.depth;
        let self_width = f32::from(depth) * INDENT_STEP + label_width(tree, id);

        let Some(folder) = tree.folder_of(id) else {
            return (self_width, ITEM_HEIGHT, ITEM_HEIGHT, false);
        };
        let open = folder.open;
        let stale = folder.last_arrange_generation == ARRANGE_STALE;

        // never animate below a single row
        let mut cur_height = folder.cur_height.max(ITEM_HEIGHT);

        let mut width = self_width;
        let mut target_height = ITEM_HEIGHT;
        let mut animating = false;

        if stale {
            // stamp first, in case children are animating and need to mark
            // this folder stale again
            let stamp = tree.arrange_generation;
            if let Some(folder) = tree.get_mut(id).and_then(Node::folder_mut) {
                folder.last_arrange_generation = stamp;
            }

            if open {
                let mut running_height = ITEM_HEIGHT;

                let child_folders = tree
                    .folder_of(id)
                    .map(|f| f.folders.clone())
                    .unwrap_or_default();
                for child in child_folders {
                    let visible = self.container_child_visible(tree, child);
                    if let Some(child_node) = tree.get_mut(child) {
                        child_node.visible = visible;
                        if visible {
                            child_node.depth = depth + 1;
                            child_node.geom.x = f32::from(depth + 1) * INDENT_STEP;
                            child_node.geom.y = running_height;
                        }
                    }
                    if visible {
                        let (child_width, child_height, child_target, child_anim) =
                            self.arrange_container(tree, child);
                        target_height += child_target;
                        running_height += child_height;
                        width = width.max(child_width);
                        animating |= child_anim;
                    }
                }

                let child_items = tree
                    .folder_of(id)
                    .map(|f| f.items.clone())
                    .unwrap_or_default();
                for child in child_items {
                    let visible = tree
                        .get(child)
                        .is_some_and(|n| n.passed(self.generation));
                    if let Some(child_node) = tree.get_mut(child) {
                        child_node.visible = visible;
                        if visible {
                            child_node.depth = depth + 1;
                            child_node.geom.x = f32::from(depth + 1) * INDENT_STEP;
                            child_node.geom.y = running_height;
                        }
                    }
                    if visible {
                        let (child_width, child_height) = self.arrange_leaf(tree, child);
                        target_height += child_height;
                        running_height += child_height;
                        width = width.max(child_width);
                    }
                }
            }

            if let Some(folder) = tree.get_mut(id).and_then(Node::folder_mut) {
                folder.target_height = target_height;
                folder.cached_width = width;
            }
        } else {
            // nothing changed below; reuse the cached measurements
            let folder = tree.folder_of(id).expect("checked above");
            width = folder.cached_width.max(self_width);
            target_height = folder.target_height;
        }

        // animate the current height toward the target
        if (cur_height - target_height).abs() > 1.0 {
            let time_constant = if open {
                FOLDER_OPEN_TIME_CONSTANT
            } else {
                FOLDER_CLOSE_TIME_CONSTANT
            };
            let blend = critically_damped(self.dt, time_constant);
            cur_height += (target_height - cur_height) * blend;
            animating = true;

            // hide rows that fell outside the shrinking height
            let children: Vec<NodeId> = tree
                .folder_of(id)
                .map(|f| f.children().collect())
                .unwrap_or_default();
            for child in children {
                if let Some(child_node) = tree.get_mut(child)
                    && child_node.visible
                    && child_node.geom.y + ITEM_HEIGHT > cur_height + MAX_ROW_OVERLAP
                {
                    child_node.visible = false;
                }
            }
        } else {
            cur_height = target_height;
        }

        if let Some(node) = tree.get_mut(id) {
            node.geom.width = width;
            node.geom.height = cur_height;
            if let Some(folder) = node.folder_mut() {
                folder.cur_height = cur_height;
                if animating {
                    folder.last_arrange_generation = ARRANGE_STALE;
                }
            }
        }
        if animating {
            // keep the ancestors re-measuring while we move
            tree.request_arrange(id, false);
        }

        (width, cur_height, target_height, animating)
    }

    fn arrange_leaf(&self, tree: &mut Tree, id: NodeId) -> (f32, f32) {
        let width = tree.get(id).map_or(0.0, |node| {
            f32::from(node.depth) * INDENT_STEP
        }) + label_width(tree, id);

        if let Some(node) = tree.get_mut(id) {
            node.geom.width = width;
            node.geom.height = ITEM_HEIGHT;
        }
        (width, ITEM_HEIGHT)
    }

    /// Short-circuit scan for the first child that still shows: items
    /// first, then sub-containers.
    fn refresh_has_visible_children(&self, tree: &mut Tree, id: NodeId) {
        let Some(folder) = tree.folder_of(id) else {
            return;
        };

        let mut found = false;
        if folder.has_filtered_descendants(self.generation) {
            for &item in &folder.items {
                if tree.get(item).is_some_and(|n| n.passed(self.generation)) {
                    found = true;
                    break;
                }
            }
            if !found {
                for &child in &folder.folders {
                    if self.container_child_visible(tree, child) {
                        found = true;
                        break;
                    }
                }
            }
        }

        if let Some(folder) = tree.get_mut(id).and_then(Node::folder_mut) {
            folder.has_visible_children = found;
        }
    }

    /// A sub-container shows when it passed outright, or when its folder
    /// check passed and something below it did, or unconditionally under
    /// the show-all-folders policy.
    fn container_child_visible(&self, tree: &Tree, id: NodeId) -> bool {
        if self.folder_show == FolderShow::AllFolders {
            return true;
        }
        let Some(node) = tree.get(id) else {
            return false;
        };
        let Some(folder) = node.folder() else {
            return false;
        };
        node.passed(self.generation)
            || (folder.passed_folder_filter
                && node.last_filter_generation >= self.generation
                && folder.has_filtered_descendants(self.generation))
    }
}

fn label_width(tree: &mut Tree, id: NodeId) -> f32 {
    let Some(node) = tree.get_mut(id) else {
        return 0.0;
    };
    if let Some(cached) = node.label_width {
        return cached;
    }
    #[expect(clippy::cast_precision_loss, reason = "label lengths are tiny")]
    let width = LABEL_PAD + node.label.chars().count() as f32 * LABEL_GLYPH_WIDTH;
    node.label_width = Some(width);
    width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::criteria::FilterCriteria;
    use crate::filter::engine::FilterPass;
    use crate::model::node::{NodeKind, SortGroup};
    use cutbuf::Clipboard;
    use uuid::Uuid;

    const NOW: i64 = 1_000_000;

    struct Fixture {
        tree: Tree,
        criteria: FilterCriteria,
        clipboard: Clipboard,
        sorter: NodeSorter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: Tree::new(Node::container(Uuid::new_v4(), "Root", 0, SortGroup::System)),
                criteria: FilterCriteria::new(),
                clipboard: Clipboard::default(),
                sorter: NodeSorter::default(),
            }
        }

        fn add_open_folder(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::container(Uuid::new_v4(), label, 50, SortGroup::Normal);
            let id = node.id;
            self.tree.add(node, parent);
            self.tree.get_mut(id).unwrap().folder_mut().unwrap().open = true;
            id
        }

        fn add_leaf(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::leaf(Uuid::new_v4(), label, 50, Some(NodeKind::Object));
            let id = node.id;
            self.tree.add(node, parent);
            id
        }

        fn filter(&mut self) {
            self.criteria.take_modified();
            let mut pass = FilterPass::new(&self.criteria, &self.clipboard, None, NOW);
            pass.run(&mut self.tree, 10_000);
        }

        fn arrange_once(&mut self, dt: f32) -> ArrangeOutcome {
            let pass = ArrangePass::new(
                &self.sorter,
                self.criteria.ops().folder_show,
                self.criteria.first_success_generation(),
                dt,
            );
            pass.run(&mut self.tree, 200.0)
        }

        fn arrange_until_stable(&mut self) -> ArrangeOutcome {
            let mut outcome = self.arrange_once(0.016);
            for _ in 0..400 {
                if !outcome.animating {
                    break;
                }
                outcome = self.arrange_once(0.016);
            }
            assert!(!outcome.animating, "animation should settle");
            outcome
        }
    }

    #[test]
    fn target_height_is_own_row_plus_visible_children() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_open_folder(root, "Things");
        for label in ["a", "b", "c"] {
            fx.add_leaf(folder, label);
        }

        fx.filter();
        fx.arrange_until_stable();

        let folder_state = fx.tree.folder_of(folder).unwrap();
        assert!((folder_state.target_height - 4.0 * ITEM_HEIGHT).abs() < f32::EPSILON);

        let root_state = fx.tree.folder_of(root).unwrap();
        assert!(
            (root_state.target_height - (ITEM_HEIGHT + folder_state.target_height)).abs()
                < f32::EPSILON
        );
    }

    #[test]
    fn current_height_converges_to_target() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_open_folder(root, "Grow");
        for i in 0..5 {
            fx.add_leaf(folder, &format!("row {i}"));
        }

        fx.filter();
        let first = fx.arrange_once(0.016);
        assert!(first.animating, "opening folders animate toward the target");

        fx.arrange_until_stable();
        let folder_state = fx.tree.folder_of(folder).unwrap();
        assert!((folder_state.cur_height - folder_state.target_height).abs() < f32::EPSILON);
    }

    #[test]
    fn closing_folder_hides_rows_beyond_the_shrinking_height() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_open_folder(root, "Shut");
        let mut leaves = Vec::new();
        for i in 0..4 {
            leaves.push(fx.add_leaf(folder, &format!("row {i}")));
        }

        fx.filter();
        fx.arrange_until_stable();
        assert!(leaves.iter().all(|&l| fx.tree.get(l).unwrap().visible));

        // collapse and advance the animation one small step
        fx.tree.get_mut(folder).unwrap().folder_mut().unwrap().open = false;
        fx.tree.request_arrange(folder, false);
        let outcome = fx.arrange_once(0.004);
        assert!(outcome.animating);

        let cur = fx.tree.folder_of(folder).unwrap().cur_height;
        assert!(cur > ITEM_HEIGHT && cur < 5.0 * ITEM_HEIGHT);
        let last = *leaves.last().unwrap();
        assert!(!fx.tree.get(last).unwrap().visible, "deepest row hides first");

        // settle: only the folder row remains
        fx.arrange_until_stable();
        let folder_state = fx.tree.folder_of(folder).unwrap();
        assert!((folder_state.cur_height - ITEM_HEIGHT).abs() < f32::EPSILON);
        assert!(leaves.iter().all(|&l| !fx.tree.get(l).unwrap().visible));
    }

    #[test]
    fn folder_show_policy_reveals_empty_containers_without_touching_descendants() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_open_folder(root, "Misc");
        let loser = fx.add_leaf(folder, "nothing matches me");

        fx.criteria.set_substring("zzz");
        fx.criteria.set_folder_show(FolderShow::NonEmptyOnly);
        fx.filter();
        fx.arrange_until_stable();
        assert!(!fx.tree.get(folder).unwrap().visible);

        let loser_state = {
            let n = fx.tree.get(loser).unwrap();
            (n.passed_filter, n.last_filter_generation)
        };

        fx.criteria.set_folder_show(FolderShow::AllFolders);
        fx.filter();
        fx.arrange_until_stable();
        assert!(fx.tree.get(folder).unwrap().visible);

        let n = fx.tree.get(loser).unwrap();
        assert_eq!(loser_state.0, n.passed_filter);
    }

    #[test]
    fn label_change_remeasures_the_row() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.add_open_folder(root, "Names");
        let leaf = fx.add_leaf(folder, "ab");

        fx.filter();
        fx.arrange_until_stable();
        let narrow = fx.tree.get(leaf).unwrap().geom.width;

        fx.tree.set_label(leaf, "a considerably longer label");
        fx.filter();
        fx.arrange_until_stable();
        let wide = fx.tree.get(leaf).unwrap().geom.width;
        assert!(wide > narrow);
    }
}
