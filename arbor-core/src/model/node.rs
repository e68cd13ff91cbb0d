//! ``src/model/node.rs``
//! ============================================================================
//! # Node: entities of the browse tree
//!
//! Two node shapes share one struct: a `Node` with `folder: Some(..)` is a
//! container, anything else is a leaf. Per-kind behavior lives in a
//! capability table keyed by [`NodeKind`]; the engine never dispatches on a
//! concrete subtype.

use compact_str::CompactString;
use enum_map::{Enum, EnumMap, enum_map};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable node identity. All edges in the tree are ids, never references.
pub type NodeId = Uuid;

/// Filter generation stamp. `GENERATION_UNKNOWN` means "never evaluated".
pub type Generation = i32;

pub const GENERATION_UNKNOWN: Generation = -1;

/// Arrangement cache stamp; `ARRANGE_STALE` forces a re-layout.
pub const ARRANGE_STALE: i64 = -1;

// ----------------------------------------------------------------------------
// Permission bits
// ----------------------------------------------------------------------------

pub mod perm {
    pub const NONE: u32 = 0;
    pub const COPY: u32 = 1 << 0;
    pub const MODIFY: u32 = 1 << 1;
    pub const TRANSFER: u32 = 1 << 2;
    pub const MOVE: u32 = 1 << 3;
    pub const ALL: u32 = COPY | MODIFY | TRANSFER | MOVE;
}

// ----------------------------------------------------------------------------
// NodeKind and capability table
// ----------------------------------------------------------------------------

/// Closed set of item kinds the browser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Category,
    Texture,
    Sound,
    Landmark,
    Notecard,
    Gesture,
    Animation,
    Object,
    Wearable,
    CallingCard,
    Script,
}

impl NodeKind {
    /// Bit position of this kind inside a [`TypeMask`].
    #[inline]
    #[must_use]
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// What a kind of node is able to do. Consumers read this table instead of
/// matching on [`NodeKind`] directly.
#[derive(Debug, Clone, Copy)]
pub struct NodeCaps {
    pub icon: &'static str,
    pub prefix: &'static str,
    pub can_rename: bool,
    pub can_copy: bool,
    pub default_action: &'static str,
}

#[must_use]
pub fn capability_table() -> EnumMap<NodeKind, NodeCaps> {
    enum_map! {
        NodeKind::Category => NodeCaps { icon: "folder", prefix: "", can_rename: true, can_copy: false, default_action: "open" },
        NodeKind::Texture => NodeCaps { icon: "texture", prefix: "", can_rename: true, can_copy: true, default_action: "preview" },
        NodeKind::Sound => NodeCaps { icon: "sound", prefix: "", can_rename: true, can_copy: true, default_action: "play" },
        NodeKind::Landmark => NodeCaps { icon: "landmark", prefix: "", can_rename: true, can_copy: true, default_action: "teleport" },
        NodeKind::Notecard => NodeCaps { icon: "notecard", prefix: "", can_rename: true, can_copy: true, default_action: "edit" },
        NodeKind::Gesture => NodeCaps { icon: "gesture", prefix: "", can_rename: true, can_copy: true, default_action: "activate" },
        NodeKind::Animation => NodeCaps { icon: "animation", prefix: "", can_rename: true, can_copy: true, default_action: "play" },
        NodeKind::Object => NodeCaps { icon: "object", prefix: "", can_rename: true, can_copy: true, default_action: "attach" },
        NodeKind::Wearable => NodeCaps { icon: "wearable", prefix: "", can_rename: true, can_copy: true, default_action: "wear" },
        NodeKind::CallingCard => NodeCaps { icon: "callingcard", prefix: "card: ", can_rename: false, can_copy: false, default_action: "profile" },
        NodeKind::Script => NodeCaps { icon: "script", prefix: "", can_rename: true, can_copy: true, default_action: "edit" },
    }
}

// ----------------------------------------------------------------------------
// Type masks
// ----------------------------------------------------------------------------

/// Bitmask over [`NodeKind`] plus a dedicated link bit. Untyped non-links
/// pass any mask; links additionally require the link bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMask(pub u32);

impl TypeMask {
    pub const LINK_BIT: u32 = 1 << 31;

    pub const ALL: TypeMask = TypeMask(u32::MAX);
    pub const NONE: TypeMask = TypeMask(0);

    #[inline]
    #[must_use]
    pub fn of(kinds: &[NodeKind]) -> Self {
        Self(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    #[inline]
    #[must_use]
    pub fn contains(self, kind: NodeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    #[must_use]
    pub fn allows_links(self) -> bool {
        self.0 & Self::LINK_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn with_links(self) -> Self {
        Self(self.0 | Self::LINK_BIT)
    }
}

impl Default for TypeMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Wearable subtypes, masked independently of the kind mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WearableKind {
    Shape,
    Skin,
    Hair,
    Eyes,
    Shirt,
    Pants,
    Shoes,
    Socks,
    Jacket,
    Gloves,
    Undershirt,
    Underpants,
    Skirt,
}

impl WearableKind {
    #[inline]
    #[must_use]
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

pub const WEARABLE_MASK_ALL: u32 = u32::MAX;

// ----------------------------------------------------------------------------
// Sort groups
// ----------------------------------------------------------------------------

/// Coarse sort bucket. Variant order is the group order used when system
/// folders sort to the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortGroup {
    System,
    Trash,
    Normal,
    Item,
}

// ----------------------------------------------------------------------------
// Link policy / folder visibility
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    #[default]
    Include,
    ExcludeLinks,
    LinksOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderShow {
    #[default]
    AllFolders,
    NonEmptyOnly,
}

// ----------------------------------------------------------------------------
// Row geometry
// ----------------------------------------------------------------------------

/// Parent-relative layout rectangle. `y` grows downward from the parent's
/// own row; the snapshot pass converts to absolute coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowGeometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

// ----------------------------------------------------------------------------
// Folder state
// ----------------------------------------------------------------------------

/// Container-only state: child lists plus the filter/arrange memos.
#[derive(Debug, Clone)]
pub struct FolderState {
    /// Sub-container ids in sorted order. Folders render above items.
    pub folders: Vec<NodeId>,

    /// Leaf ids in sorted order.
    pub items: Vec<NodeId>,

    pub sort_group: SortGroup,

    /// Designated contents kind for typed (system) folders; plain user
    /// folders carry `None` and pass any category mask.
    pub category: Option<NodeKind>,

    pub open: bool,

    /// Animated height, chasing `target_height` each arrange pass.
    pub cur_height: f32,
    pub target_height: f32,

    /// Latest generation at which some descendant passed the filter or may
    /// still pass.
    pub most_filtered_generation: Generation,

    /// Generation at which every descendant was fully evaluated. Never
    /// propagated to ancestors.
    pub completed_generation: Generation,

    /// Arrange stamp; [`ARRANGE_STALE`] forces child re-layout.
    pub last_arrange_generation: i64,

    /// Width computed by the last full child layout, reused while fresh.
    pub cached_width: f32,

    pub needs_sort: bool,

    /// Outcome of the folder-specific filter (category mask + cut check).
    pub passed_folder_filter: bool,

    /// Newest creation date in the subtree.
    pub subtree_created_at: i64,

    /// Contents fully known to the model (no pending fetch required).
    pub complete: bool,

    /// True when at least one child is currently visible.
    pub has_visible_children: bool,
}

impl FolderState {
    #[must_use]
    pub fn new(sort_group: SortGroup) -> Self {
        Self {
            folders: Vec::new(),
            items: Vec::new(),
            sort_group,
            category: None,
            open: false,
            cur_height: 0.0,
            target_height: 0.0,
            most_filtered_generation: GENERATION_UNKNOWN,
            completed_generation: GENERATION_UNKNOWN,
            last_arrange_generation: ARRANGE_STALE,
            cached_width: 0.0,
            needs_sort: false,
            passed_folder_filter: false,
            subtree_created_at: 0,
            complete: false,
            has_visible_children: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn has_filtered_descendants(&self, generation: Generation) -> bool {
        self.most_filtered_generation >= generation
    }

    /// Child ids in draw order: folders first, then items.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.folders.iter().chain(self.items.iter()).copied()
    }
}

// ----------------------------------------------------------------------------
// Node
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,

    /// Weak (id) reference to the owning container; `None` only for the root.
    pub parent: Option<NodeId>,

    pub label: CompactString,

    /// Uppercased label used by the substring filter.
    pub searchable_label: CompactString,

    /// Creation timestamp, unix seconds.
    pub created_at: i64,

    /// Item kind; `None` marks an untyped item. Containers are `Category`.
    pub kind: Option<NodeKind>,

    /// Subtype for `Wearable` items.
    pub wearable: Option<WearableKind>,

    /// Permission bits, see [`perm`].
    pub permissions: u32,

    /// Target id when this node is a link.
    pub link_target: Option<NodeId>,

    /// Explicit sort key honored only inside the pinned container.
    pub manual_rank: Option<u32>,

    pub passed_filter: bool,
    pub last_filter_generation: Generation,

    pub visible: bool,
    pub selected: bool,

    /// Indentation depth, maintained by the arrange pass.
    pub depth: u16,

    /// Lazily computed label width; `None` after a label change.
    pub label_width: Option<f32>,

    pub geom: RowGeometry,

    /// Present iff this node is a container.
    pub folder: Option<FolderState>,
}

impl Node {
    #[must_use]
    pub fn container(id: NodeId, label: &str, created_at: i64, sort_group: SortGroup) -> Self {
        let mut node = Self::bare(id, label, created_at);
        node.kind = Some(NodeKind::Category);
        node.folder = Some(FolderState::new(sort_group));
        node
    }

    #[must_use]
    pub fn leaf(id: NodeId, label: &str, created_at: i64, kind: Option<NodeKind>) -> Self {
        let mut node = Self::bare(id, label, created_at);
        node.kind = kind;
        node
    }

    fn bare(id: NodeId, label: &str, created_at: i64) -> Self {
        Self {
            id,
            parent: None,
            label: CompactString::new(label),
            searchable_label: searchable(label),
            created_at,
            kind: None,
            wearable: None,
            permissions: perm::ALL,
            link_target: None,
            manual_rank: None,
            passed_filter: false,
            last_filter_generation: GENERATION_UNKNOWN,
            visible: true,
            selected: false,
            depth: 0,
            label_width: None,
            geom: RowGeometry::default(),
            folder: None,
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, mask: u32) -> Self {
        self.permissions = mask;
        self
    }

    #[must_use]
    pub fn with_link_to(mut self, target: NodeId) -> Self {
        self.link_target = Some(target);
        self
    }

    #[must_use]
    pub fn with_wearable(mut self, wearable: WearableKind) -> Self {
        self.wearable = Some(wearable);
        self
    }

    /// Designate what a typed (system) folder holds; only meaningful on
    /// containers.
    #[must_use]
    pub fn with_category(mut self, category: NodeKind) -> Self {
        if let Some(folder) = self.folder.as_mut() {
            folder.category = Some(category);
        }
        self
    }

    #[must_use]
    pub fn with_manual_rank(mut self, rank: u32) -> Self {
        self.manual_rank = Some(rank);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.folder.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }

    #[must_use]
    pub fn sort_group(&self) -> SortGroup {
        self.folder
            .as_ref()
            .map_or(SortGroup::Item, |f| f.sort_group)
    }

    /// Creation date used for sorting: containers report the newest date in
    /// their subtree.
    #[must_use]
    pub fn effective_created_at(&self) -> i64 {
        match &self.folder {
            Some(f) => self.created_at.max(f.subtree_created_at),
            None => self.created_at,
        }
    }

    /// Update the label, refreshing the searchable form and invalidating the
    /// cached width. Returns true when the searchable form changed.
    pub fn set_label(&mut self, label: &str) -> bool {
        self.label = CompactString::new(label);
        self.label_width = None;
        let next = searchable(label);
        if next != self.searchable_label {
            self.searchable_label = next;
            return true;
        }
        false
    }

    /// Cached pass state, trusted only at or after `generation`.
    #[inline]
    #[must_use]
    pub fn passed(&self, generation: Generation) -> bool {
        self.passed_filter && self.last_filter_generation >= generation
    }

    pub fn set_filtered(&mut self, passed: bool, generation: Generation) {
        // a folder that just started passing may have been drawn taller
        // before; restart its height animation from zero
        if passed && !self.passed_filter
            && let Some(folder) = self.folder.as_mut()
        {
            folder.cur_height = 0.0;
        }
        self.passed_filter = passed;
        self.last_filter_generation = generation;
    }

    #[inline]
    #[must_use]
    pub fn folder(&self) -> Option<&FolderState> {
        self.folder.as_ref()
    }

    #[inline]
    pub fn folder_mut(&mut self) -> Option<&mut FolderState> {
        self.folder.as_mut()
    }
}

#[must_use]
fn searchable(label: &str) -> CompactString {
    CompactString::new(label.to_uppercase())
}
