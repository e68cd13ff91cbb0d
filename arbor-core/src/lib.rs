//! Hierarchical filtered/sorted tree-view engine for large item browsers.
//!
//! Everything runs inside caller-driven ticks on one thread: the filter
//! engine re-evaluates lazily under a per-tick budget, the arrangement
//! engine animates layout toward its targets, and the fetch scheduler
//! trickles data requests to an asynchronous [`source::Source`]. Rendering
//! and input are external; the engine hands out [`view::Row`] snapshots and
//! accepts operations on the [`browser::Browser`] facade.

pub mod error;

pub mod config;

pub mod model {
    pub mod node;
    pub use node::{
        FolderShow, FolderState, Generation, LinkPolicy, Node, NodeCaps, NodeId, NodeKind,
        SortGroup, TypeMask, WearableKind, capability_table, perm,
    };

    pub mod tree;
    pub use tree::Tree;
}

pub mod filter {
    pub mod criteria;
    pub use criteria::{FilterBehavior, FilterCriteria, FilterOps};

    pub mod engine;
    pub use engine::FilterPass;
}

pub mod sort;
pub use sort::{NodeSorter, SortFlags};

pub mod arrange;
pub use arrange::{ArrangeOutcome, ArrangePass};

pub mod select;
pub use select::TriState;

pub mod fetch;
pub use fetch::{FetchConfig, FetchKind, FetchRequest, FetchScheduler};

pub mod source;
pub use source::{NullSource, Source};

pub mod view;
pub use view::Row;

pub mod browser;
pub use browser::{Browser, TickInput, TickReport};

pub mod logging;

pub use config::{BrowserConfig, FilterParams};
pub use error::{CoreError, CoreResult};
pub use model::node::{Node, NodeId, NodeKind};
pub use model::tree::Tree;
