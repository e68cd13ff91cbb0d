//! ``src/view.rs``
//! ============================================================================
//! # Row snapshots for the renderer
//!
//! Immutable data-transfer rows harvested from the live tree after a tick,
//! in draw order with absolute coordinates. The engine draws nothing; a
//! renderer consumes these rows and feeds clicks and keys back through the
//! browser facade.

use compact_str::CompactString;
use enum_map::EnumMap;

use crate::arrange::{ITEM_HEIGHT, MAX_ROW_OVERLAP};
use crate::model::node::{Node, NodeCaps, NodeId, NodeKind};
use crate::model::tree::Tree;

/// One visible row of the tree.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: NodeId,
    pub label: CompactString,
    pub icon: &'static str,

    pub depth: u16,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub selected: bool,
    pub is_current: bool,

    /// `Some(open)` for containers, `None` for leaves.
    pub open: Option<bool>,

    /// Containers with at least one visible child get an expander arrow.
    pub has_visible_children: bool,
}

/// Harvest visible rows in draw order. The root container itself is the
/// panel and gets no row.
#[must_use]
pub fn harvest_rows(tree: &Tree, caps: &EnumMap<NodeKind, NodeCaps>) -> Vec<Row> {
    let mut rows = Vec::new();
    visit(tree, caps, tree.root(), 0.0, &mut rows);
    rows
}

fn visit(
    tree: &Tree,
    caps: &EnumMap<NodeKind, NodeCaps>,
    id: NodeId,
    parent_top: f32,
    out: &mut Vec<Row>,
) {
    let Some(folder) = tree.get(id).and_then(Node::folder) else {
        return;
    };
    // closed containers stop the walk once their collapse has settled;
    // mid-animation their remaining rows still slide away
    if !folder.open && folder.cur_height <= ITEM_HEIGHT + MAX_ROW_OVERLAP {
        return;
    }

    for child in folder.children() {
        let Some(node) = tree.get(child) else {
            continue;
        };
        if !node.visible {
            continue;
        }
        let top = parent_top + node.geom.y;
        out.push(row_for(tree, caps, node, top));
        if node.is_container() {
            visit(tree, caps, child, top, out);
        }
    }
}

fn row_for(
    tree: &Tree,
    caps: &EnumMap<NodeKind, NodeCaps>,
    node: &Node,
    top: f32,
) -> Row {
    let node_caps = node.kind.map(|kind| caps[kind]);
    let icon = node_caps.map_or("item", |c| c.icon);
    let label = match node_caps.map(|c| c.prefix) {
        Some(prefix) if !prefix.is_empty() => {
            CompactString::new(format!("{prefix}{}", node.label))
        }
        _ => node.label.clone(),
    };

    Row {
        id: node.id,
        label,
        icon,
        depth: node.depth,
        x: node.geom.x,
        y: top,
        width: node.geom.width,
        height: node.geom.height,
        selected: node.selected,
        is_current: tree.current_selection() == Some(node.id),
        open: node.folder().map(|f| f.open),
        has_visible_children: node.folder().is_some_and(|f| f.has_visible_children),
    }
}
