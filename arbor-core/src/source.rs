//! ``src/source.rs``
//! ============================================================================
//! # Source: the asynchronous data provider
//!
//! The engine never talks to the network itself. A `Source` accepts fetch
//! requests on its own schedule and, at some later tick on the same thread,
//! reports back through [`FetchScheduler::on_fetch_complete`]. Structural
//! changes (adds, removals, renames) arrive through the browser facade's
//! notification entry points.
//!
//! [`FetchScheduler::on_fetch_complete`]: crate::fetch::FetchScheduler::on_fetch_complete

use crate::fetch::FetchRequest;
use crate::model::node::NodeId;

pub trait Source {
    /// Begin fetching. Asynchronous; the source eventually invokes the
    /// scheduler's completion hook.
    fn issue_fetch(&mut self, request: FetchRequest);

    /// Whether the container's direct contents are already fully known
    /// upstream; up-to-date containers are skipped at issue time.
    fn is_up_to_date(&self, id: NodeId) -> bool;
}

/// Source that never has data and drops every request. Useful for purely
/// local trees and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSource;

impl Source for NullSource {
    fn issue_fetch(&mut self, _request: FetchRequest) {}

    fn is_up_to_date(&self, _id: NodeId) -> bool {
        false
    }
}
