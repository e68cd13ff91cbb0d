//! ``src/browser.rs``
//! ============================================================================
//! # Browser: the per-tick pipeline
//!
//! Wires the components into one cooperative tick: budgeted filter pass,
//! arrangement with elapsed time, selection reconciliation, then the fetch
//! scheduler's rate-limited issue step. The Source's structural
//! notifications and the fetch completion hook enter through here as well.

use std::time::Duration;

use chrono::Utc;
use cutbuf::Clipboard;
use enum_map::EnumMap;
use tracing::debug;

use crate::arrange::{ArrangeOutcome, ArrangePass};
use crate::config::BrowserConfig;
use crate::fetch::{FetchKind, FetchScheduler};
use crate::filter::criteria::FilterCriteria;
use crate::filter::engine::FilterPass;
use crate::model::node::{Node, NodeCaps, NodeId, NodeKind, capability_table};
use crate::model::tree::Tree;
use crate::sort::{NodeSorter, SortFlags};
use crate::source::Source;
use crate::view::{Row, harvest_rows};

/// Caller-supplied clock and viewport for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    /// Monotonic time since the caller's epoch; drives fetch rate limiting.
    pub now: Duration,

    /// Seconds since the previous tick; drives height animation.
    pub dt: f32,

    pub available_width: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    /// Unspent filter budget; negative means the pass was cut short.
    pub filter_budget_left: i32,

    pub arrange: ArrangeOutcome,

    pub fetches_issued: usize,
}

pub struct Browser {
    tree: Tree,
    criteria: FilterCriteria,
    sorter: NodeSorter,
    scheduler: FetchScheduler,
    caps: EnumMap<NodeKind, NodeCaps>,
    config: BrowserConfig,
}

impl Browser {
    #[must_use]
    pub fn new(root: Node, config: BrowserConfig) -> Self {
        let mut tree = Tree::new(root);
        tree.set_multi_select(config.multi_select);
        Self {
            tree,
            criteria: FilterCriteria::new(),
            sorter: NodeSorter::new(config.sort),
            scheduler: FetchScheduler::new(config.fetch.clone()),
            caps: capability_table(),
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    #[inline]
    #[must_use]
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    #[inline]
    pub fn criteria_mut(&mut self) -> &mut FilterCriteria {
        &mut self.criteria
    }

    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    #[inline]
    #[must_use]
    pub fn sorter(&self) -> &NodeSorter {
        &self.sorter
    }

    #[inline]
    pub fn sorter_mut(&mut self) -> &mut NodeSorter {
        &mut self.sorter
    }

    // ------------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------------

    /// One cooperative tick: filter, arrange, reconcile selection, fetch.
    pub fn tick(
        &mut self,
        source: &mut dyn Source,
        clipboard: &Clipboard,
        input: TickInput,
    ) -> TickReport {
        self.criteria.take_modified();

        let filter_budget_left = {
            let mut pass = FilterPass::new(
                &self.criteria,
                clipboard,
                Some(&mut self.scheduler),
                Utc::now().timestamp(),
            );
            pass.run(&mut self.tree, self.config.filter_items_per_tick)
        };

        let arrange = ArrangePass::new(
            &self.sorter,
            self.criteria.ops().folder_show,
            self.criteria.first_success_generation(),
            input.dt,
        )
        .run(&mut self.tree, input.available_width);

        self.tree.sanitize_selection();

        let fetches_issued = self.scheduler.tick(&self.tree, source, input.now);

        TickReport {
            filter_budget_left,
            arrange,
            fetches_issued,
        }
    }

    /// Visible rows in draw order for the renderer.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        harvest_rows(&self.tree, &self.caps)
    }

    // ------------------------------------------------------------------------
    // Source notifications
    // ------------------------------------------------------------------------

    pub fn on_added(&mut self, node: Node, parent: NodeId) -> bool {
        self.tree.add(node, parent)
    }

    pub fn on_removed(&mut self, id: NodeId) -> bool {
        self.tree.remove(id)
    }

    /// Refresh display data for changed nodes.
    pub fn on_changed(&mut self, id: NodeId, label: Option<&str>, created_at: Option<i64>) -> bool {
        if !self.tree.contains(id) {
            return false;
        }
        if let Some(label) = label {
            self.tree.set_label(id, label);
        }
        if let Some(created_at) = created_at {
            self.tree.set_created_at(id, created_at);
        }
        true
    }

    /// The Source's completion hook for an earlier fetch.
    pub fn on_fetch_complete(
        &mut self,
        request_id: NodeId,
        response_id: Option<NodeId>,
        kind: FetchKind,
    ) {
        self.scheduler
            .on_fetch_complete(&mut self.tree, request_id, response_id, kind);
    }

    // ------------------------------------------------------------------------
    // Input-driven operations
    // ------------------------------------------------------------------------

    /// Flip a container open or closed. Opening a container whose contents
    /// are not yet known also schedules a shallow fetch.
    pub fn toggle_open(&mut self, id: NodeId) -> bool {
        let Some(folder) = self.tree.get_mut(id).and_then(Node::folder_mut) else {
            return false;
        };
        folder.open = !folder.open;
        let opened = folder.open;
        let complete = folder.complete;

        self.tree.request_arrange(id, false);
        if opened && !complete {
            self.scheduler.start(&self.tree, id, false);
        }
        debug!(
            marker = "BROWSER",
            operation_type = "toggle_open",
            target = %id,
            open = opened,
            "toggled container"
        );
        true
    }

    /// Change the sort order; cascades needs-sort through every container
    /// and re-arranges everything. Returns false when nothing changed.
    pub fn set_sort_flags(&mut self, flags: SortFlags) -> bool {
        if !self.sorter.update_sort(flags) {
            return false;
        }
        self.tree.mark_all_needs_sort();
        let root = self.tree.root();
        self.tree.request_arrange(root, true);
        true
    }

    /// Ask for a subtree or children fetch explicitly.
    pub fn start_fetch(&mut self, id: NodeId, recursive: bool) -> bool {
        self.scheduler.start(&self.tree, id, recursive)
    }
}
