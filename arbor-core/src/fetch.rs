//! ``src/fetch.rs``
//! ============================================================================
//! # FetchScheduler: queued, rate-limited, deduplicated data requests
//!
//! Two queues feed the Source: a shallow content queue and a recursive
//! queue. A request already covered by an enqueued or in-flight recursive
//! ancestor is suppressed at enqueue time; nothing is ever cancelled.
//! Failures are absorbed silently - the node simply stays incomplete until
//! a later explicit `start`.

use std::collections::VecDeque;
use std::time::Duration;

use ahash::RandomState;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::model::node::{Node, NodeId};
use crate::model::tree::Tree;
use crate::source::Source;

/// How much of the target's subtree a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// A single leaf's data.
    Item,
    /// A container's direct children only.
    Children,
    /// The container's entire subtree.
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub target: NodeId,
    pub kind: FetchKind,
    pub is_container: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Minimum spacing between issuing ticks.
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,

    /// Requests issued per tick at most.
    pub max_per_tick: usize,

    /// Outstanding requests allowed at once.
    pub max_in_flight: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(300),
            max_per_tick: 10,
            max_in_flight: 12,
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchScheduler {
    content_queue: VecDeque<FetchRequest>,
    recursive_queue: VecDeque<FetchRequest>,

    in_flight: HashMap<NodeId, FetchKind, RandomState>,

    last_issue: Option<Duration>,

    /// A recursive fetch of the whole tree was requested at some point.
    top_level_started: bool,

    config: FetchConfig,
}

impl FetchScheduler {
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------------
    // Enqueue
    // ------------------------------------------------------------------------

    /// Request data for `id`. Containers queue a children or subtree fetch,
    /// leaves queue an item fetch. Returns false when the node is unknown
    /// or the request is already covered.
    pub fn start(&mut self, tree: &Tree, id: NodeId, recursive: bool) -> bool {
        let Some(node) = tree.get(id) else {
            return false;
        };

        if node.is_container() {
            if self.covered_by_recursive(tree, id) {
                trace!(
                    marker = "FETCH_SCHED",
                    operation_type = "fetch_suppressed",
                    target = %id,
                    "request covered by an enqueued recursive fetch"
                );
                return false;
            }
            if id == tree.root() && recursive {
                self.top_level_started = true;
            }
            if recursive {
                self.recursive_queue.push_back(FetchRequest {
                    target: id,
                    kind: FetchKind::Subtree,
                    is_container: true,
                });
            } else if self.content_queue.front().map(|r| r.target) != Some(id) {
                // specific folder requests go to the front of the queue
                self.content_queue.push_front(FetchRequest {
                    target: id,
                    kind: FetchKind::Children,
                    is_container: true,
                });
            }
            true
        } else {
            if self.content_queue.front().map(|r| r.target) != Some(id) {
                self.content_queue.push_front(FetchRequest {
                    target: id,
                    kind: FetchKind::Item,
                    is_container: false,
                });
            }
            true
        }
    }

    pub fn add_request_at_front(
        &mut self,
        tree: &Tree,
        id: NodeId,
        recursive: bool,
        is_container: bool,
    ) {
        if let Some(request) = self.admit(tree, id, recursive, is_container) {
            self.queue_for(request.kind).push_front(request);
        }
    }

    pub fn add_request_at_back(
        &mut self,
        tree: &Tree,
        id: NodeId,
        recursive: bool,
        is_container: bool,
    ) {
        if let Some(request) = self.admit(tree, id, recursive, is_container) {
            self.queue_for(request.kind).push_back(request);
        }
    }

    fn admit(
        &self,
        tree: &Tree,
        id: NodeId,
        recursive: bool,
        is_container: bool,
    ) -> Option<FetchRequest> {
        if self.covered_by_recursive(tree, id) {
            return None;
        }
        let kind = match (is_container, recursive) {
            (true, true) => FetchKind::Subtree,
            (true, false) => FetchKind::Children,
            (false, _) => FetchKind::Item,
        };
        Some(FetchRequest {
            target: id,
            kind,
            is_container,
        })
    }

    fn queue_for(&mut self, kind: FetchKind) -> &mut VecDeque<FetchRequest> {
        match kind {
            FetchKind::Subtree => &mut self.recursive_queue,
            FetchKind::Children | FetchKind::Item => &mut self.content_queue,
        }
    }

    /// Is `id` already inside the subtree of an enqueued or in-flight
    /// recursive request?
    fn covered_by_recursive(&self, tree: &Tree, id: NodeId) -> bool {
        self.recursive_queue
            .iter()
            .any(|r| tree.is_descendant_or_self(id, r.target))
            || self
                .in_flight
                .iter()
                .any(|(&target, &kind)| {
                    kind == FetchKind::Subtree && tree.is_descendant_or_self(id, target)
                })
    }

    // ------------------------------------------------------------------------
    // Issue
    // ------------------------------------------------------------------------

    /// Rate-limited tick: pop a bounded number of requests and hand them to
    /// the source. Returns how many were issued.
    pub fn tick(&mut self, tree: &Tree, source: &mut dyn Source, now: Duration) -> usize {
        if let Some(last) = self.last_issue
            && now < last + self.config.min_interval
        {
            return 0;
        }

        let mut issued = 0;
        while issued < self.config.max_per_tick && self.in_flight.len() < self.config.max_in_flight
        {
            let Some(request) = self
                .recursive_queue
                .pop_front()
                .or_else(|| self.content_queue.pop_front())
            else {
                break;
            };

            // the node may have died while the request sat in the queue
            if !tree.contains(request.target) {
                continue;
            }
            if self.in_flight.contains_key(&request.target) {
                continue;
            }
            // an in-flight recursive ancestor already covers this target
            if self.in_flight.iter().any(|(&target, &kind)| {
                kind == FetchKind::Subtree
                    && target != request.target
                    && tree.is_descendant_of(request.target, target)
            }) {
                continue;
            }
            // shallow requests for already-known containers are pointless
            if request.is_container
                && request.kind != FetchKind::Subtree
                && (source.is_up_to_date(request.target)
                    || tree.folder_of(request.target).is_some_and(|f| f.complete))
            {
                continue;
            }

            debug!(
                marker = "FETCH_SCHED",
                operation_type = "fetch_issue",
                target = %request.target,
                kind = ?request.kind,
                "issuing fetch request"
            );
            self.in_flight.insert(request.target, request.kind);
            source.issue_fetch(request);
            issued += 1;
        }

        if issued > 0 {
            self.last_issue = Some(now);
        }
        issued
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Completion hook, keyed by (request id, response id, recursion kind).
    /// `response_id: None` is a failure: it is absorbed, and a failed
    /// subtree fetch degrades once into a shallow children request. A
    /// completion for an id no longer in the registry is ignored.
    pub fn on_fetch_complete(
        &mut self,
        tree: &mut Tree,
        request_id: NodeId,
        response_id: Option<NodeId>,
        kind: FetchKind,
    ) {
        if self.in_flight.remove(&request_id).is_none() {
            warn!(
                marker = "FETCH_SCHED",
                operation_type = "fetch_unexpected_completion",
                target = %request_id,
                "completion for a request that was not in flight"
            );
        }

        if response_id.is_none() {
            debug!(
                marker = "FETCH_SCHED",
                operation_type = "fetch_failed",
                target = %request_id,
                "fetch failed; node stays incomplete"
            );
            if kind == FetchKind::Subtree && tree.contains(request_id) {
                // one-shot degradation: try the direct children instead
                self.content_queue.push_back(FetchRequest {
                    target: request_id,
                    kind: FetchKind::Children,
                    is_container: true,
                });
            }
            return;
        }

        if !tree.contains(request_id) {
            debug!(
                marker = "FETCH_SCHED",
                operation_type = "fetch_stale_completion",
                target = %request_id,
                "completion for a node that no longer exists"
            );
            return;
        }

        if let Some(folder) = tree.get_mut(request_id).and_then(Node::folder_mut) {
            folder.complete = true;
        }
        tree.dirty_filter(request_id);

        if kind == FetchKind::Subtree {
            // freshly arrived listings may reveal child folders that still
            // need their own subtrees
            let children = tree
                .folder_of(request_id)
                .map(|f| f.folders.clone())
                .unwrap_or_default();
            for child in children {
                if !self.covered_by_recursive(tree, child) {
                    self.recursive_queue.push_back(FetchRequest {
                        target: child,
                        kind: FetchKind::Subtree,
                        is_container: true,
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Progress predicates
    // ------------------------------------------------------------------------

    /// True while no queued request targets a node inside `id`'s subtree.
    #[must_use]
    pub fn queue_contains_no_descendants_of(&self, tree: &Tree, id: NodeId) -> bool {
        !self
            .recursive_queue
            .iter()
            .chain(self.content_queue.iter())
            .any(|r| tree.is_descendant_or_self(r.target, id))
    }

    /// Anything queued or outstanding at all?
    #[must_use]
    pub fn fetch_active(&self) -> bool {
        !self.recursive_queue.is_empty()
            || !self.content_queue.is_empty()
            || !self.in_flight.is_empty()
    }

    /// Is the whole-tree fetch still working through the hierarchy?
    #[must_use]
    pub fn top_level_fetch_active(&self, tree: &Tree) -> bool {
        self.top_level_started
            && (!self.queue_contains_no_descendants_of(tree, tree.root())
                || self
                    .in_flight
                    .keys()
                    .any(|&target| tree.is_descendant_or_self(target, tree.root())))
    }

    /// Is a request for `id` sitting in either queue?
    #[must_use]
    pub fn queued_for(&self, id: NodeId) -> bool {
        self.recursive_queue
            .iter()
            .chain(self.content_queue.iter())
            .any(|r| r.target == id)
    }

    #[must_use]
    pub fn recursive_queue_len(&self) -> usize {
        self.recursive_queue.len()
    }

    #[must_use]
    pub fn content_queue_len(&self) -> usize {
        self.content_queue.len()
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{GENERATION_UNKNOWN, NodeKind, SortGroup};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSource {
        issued: Vec<FetchRequest>,
    }

    impl Source for RecordingSource {
        fn issue_fetch(&mut self, request: FetchRequest) {
            self.issued.push(request);
        }

        fn is_up_to_date(&self, _id: NodeId) -> bool {
            false
        }
    }

    struct Fixture {
        tree: Tree,
        scheduler: FetchScheduler,
        source: RecordingSource,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: Tree::new(Node::container(Uuid::new_v4(), "Root", 0, SortGroup::System)),
                scheduler: FetchScheduler::default(),
                source: RecordingSource::default(),
            }
        }

        fn folder(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::container(Uuid::new_v4(), label, 10, SortGroup::Normal);
            let id = node.id;
            self.tree.add(node, parent);
            id
        }

        fn leaf(&mut self, parent: NodeId, label: &str) -> NodeId {
            let node = Node::leaf(Uuid::new_v4(), label, 10, Some(NodeKind::Object));
            let id = node.id;
            self.tree.add(node, parent);
            id
        }

        fn tick_at(&mut self, millis: u64) -> usize {
            self.scheduler
                .tick(&self.tree, &mut self.source, Duration::from_millis(millis))
        }
    }

    #[test]
    fn descendant_request_is_suppressed_by_recursive_ancestor() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let parent = fx.folder(root, "parent");
        let child = fx.folder(parent, "child");

        assert!(fx.scheduler.start(&fx.tree, parent, true));
        assert!(!fx.scheduler.start(&fx.tree, child, false));

        assert_eq!(fx.scheduler.recursive_queue_len(), 1);
        assert_eq!(fx.scheduler.content_queue_len(), 0);
    }

    #[test]
    fn tick_respects_the_minimum_interval() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let a = fx.folder(root, "a");
        let b = fx.folder(root, "b");

        fx.scheduler.start(&fx.tree, a, false);
        assert_eq!(fx.tick_at(0), 1);

        fx.scheduler.start(&fx.tree, b, false);
        // too soon: the default spacing is 300ms
        assert_eq!(fx.tick_at(100), 0);
        assert_eq!(fx.tick_at(350), 1);
        assert_eq!(fx.source.issued.len(), 2);
    }

    #[test]
    fn tick_pops_a_bounded_batch() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        for i in 0..15 {
            let folder = fx.folder(root, &format!("f{i}"));
            fx.scheduler
                .add_request_at_back(&fx.tree, folder, false, true);
        }

        let issued = fx.tick_at(0);
        assert_eq!(issued, 10, "default cap is ten requests per tick");
        assert_eq!(fx.scheduler.in_flight_len(), 10);
    }

    #[test]
    fn completion_marks_complete_and_redirties_the_filter() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "f");
        fx.tree.get_mut(folder).unwrap().last_filter_generation = 5;
        fx.tree
            .get_mut(root)
            .unwrap()
            .folder_mut()
            .unwrap()
            .completed_generation = 5;

        fx.scheduler.start(&fx.tree, folder, false);
        fx.tick_at(0);

        fx.scheduler
            .on_fetch_complete(&mut fx.tree, folder, Some(folder), FetchKind::Children);

        assert!(fx.tree.folder_of(folder).unwrap().complete);
        assert_eq!(
            fx.tree.get(folder).unwrap().last_filter_generation,
            GENERATION_UNKNOWN
        );
        assert_eq!(
            fx.tree.folder_of(root).unwrap().completed_generation,
            GENERATION_UNKNOWN
        );
        assert_eq!(fx.scheduler.in_flight_len(), 0);
    }

    #[test]
    fn subtree_completion_chases_child_folders() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let parent = fx.folder(root, "parent");
        let child_a = fx.folder(parent, "a");
        let child_b = fx.folder(parent, "b");
        fx.leaf(parent, "item");

        fx.scheduler.start(&fx.tree, parent, true);
        fx.tick_at(0);
        fx.scheduler
            .on_fetch_complete(&mut fx.tree, parent, Some(parent), FetchKind::Subtree);

        assert!(fx.scheduler.queued_for(child_a));
        assert!(fx.scheduler.queued_for(child_b));
        assert_eq!(fx.scheduler.recursive_queue_len(), 2);
    }

    #[test]
    fn failed_subtree_fetch_degrades_to_children_once() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "flaky");

        fx.scheduler.start(&fx.tree, folder, true);
        fx.tick_at(0);
        fx.scheduler
            .on_fetch_complete(&mut fx.tree, folder, None, FetchKind::Subtree);

        assert!(!fx.tree.folder_of(folder).unwrap().complete);
        assert_eq!(fx.scheduler.content_queue_len(), 1);
        assert!(fx.scheduler.queued_for(folder));

        // the shallow retry failing again is simply absorbed
        fx.tick_at(500);
        fx.scheduler
            .on_fetch_complete(&mut fx.tree, folder, None, FetchKind::Children);
        assert!(!fx.scheduler.fetch_active());
    }

    #[test]
    fn stale_completion_for_a_dead_node_is_ignored() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "doomed");

        fx.scheduler.start(&fx.tree, folder, false);
        fx.tick_at(0);
        fx.tree.remove(folder);

        fx.scheduler
            .on_fetch_complete(&mut fx.tree, folder, Some(folder), FetchKind::Children);
        assert_eq!(fx.scheduler.in_flight_len(), 0);
        assert!(!fx.scheduler.fetch_active());
    }

    #[test]
    fn top_level_progress_tracks_queued_descendants() {
        let mut fx = Fixture::new();
        let root = fx.tree.root();
        let folder = fx.folder(root, "a");

        assert!(!fx.scheduler.top_level_fetch_active(&fx.tree));
        fx.scheduler.start(&fx.tree, root, true);
        assert!(fx.scheduler.top_level_fetch_active(&fx.tree));

        fx.tick_at(0);
        fx.scheduler
            .on_fetch_complete(&mut fx.tree, root, Some(root), FetchKind::Subtree);
        // the root completion queued the child folder; still active
        assert!(fx.scheduler.queued_for(folder));
        assert!(fx.scheduler.top_level_fetch_active(&fx.tree));

        fx.tick_at(500);
        fx.scheduler
            .on_fetch_complete(&mut fx.tree, folder, Some(folder), FetchKind::Subtree);
        assert!(!fx.scheduler.top_level_fetch_active(&fx.tree));
    }
}
