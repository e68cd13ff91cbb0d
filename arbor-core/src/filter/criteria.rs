//! ``src/filter/criteria.rs``
//! ============================================================================
//! # FilterCriteria: live filter state with generation bookkeeping
//!
//! Every mutation stamps a fresh generation and classifies itself as
//! restart / more-restrictive / less-restrictive, which bounds how much of
//! the per-node memoization survives. This is what lets a live substring
//! filter over tens of thousands of nodes skip the full re-scan on most
//! keystrokes.

use compact_str::CompactString;

use crate::model::node::{FolderShow, Generation, LinkPolicy, NodeId, TypeMask, WEARABLE_MASK_ALL, perm};

/// How a criteria mutation relates to the previous criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterBehavior {
    #[default]
    None,
    /// Everything that passed still passes; failures must be re-checked.
    LessRestrictive,
    /// Everything that failed still fails; passes must be re-checked.
    MoreRestrictive,
    /// No cached result is trustworthy.
    Restart,
}

/// The comparable filter operands. Substring is stored uppercased and
/// head-trimmed, matching the searchable label form.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOps {
    pub substring: CompactString,
    pub object_types: TypeMask,
    pub category_types: TypeMask,
    pub wearable_types: u32,
    pub permissions: u32,
    pub uuid_target: Option<NodeId>,
    pub min_date: i64,
    pub max_date: i64,
    pub hours_ago: u32,
    pub link_policy: LinkPolicy,
    pub folder_show: FolderShow,
    pub exclude_cut: bool,
}

impl Default for FilterOps {
    fn default() -> Self {
        Self {
            substring: CompactString::default(),
            object_types: TypeMask::ALL,
            category_types: TypeMask::ALL,
            wearable_types: WEARABLE_MASK_ALL,
            permissions: perm::NONE,
            uuid_target: None,
            min_date: 0,
            max_date: i64::MAX,
            hours_ago: 0,
            link_policy: LinkPolicy::Include,
            folder_show: FolderShow::AllFolders,
            exclude_cut: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterCriteria {
    ops: FilterOps,
    default_ops: FilterOps,

    current_generation: Generation,
    next_generation: Generation,

    /// Cached passes are trusted only at or after this generation.
    first_success_generation: Generation,

    /// Cached failures are trusted only at or after this generation.
    first_fail_generation: Generation,

    behavior: FilterBehavior,
    modified: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCriteria {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: FilterOps::default(),
            default_ops: FilterOps::default(),
            current_generation: 0,
            next_generation: 1,
            first_success_generation: 0,
            first_fail_generation: Generation::MAX,
            behavior: FilterBehavior::None,
            modified: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn ops(&self) -> &FilterOps {
        &self.ops
    }

    #[inline]
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        self.current_generation
    }

    #[inline]
    #[must_use]
    pub fn first_success_generation(&self) -> Generation {
        self.first_success_generation
    }

    #[inline]
    #[must_use]
    pub fn first_fail_generation(&self) -> Generation {
        self.first_fail_generation
    }

    #[inline]
    #[must_use]
    pub fn behavior(&self) -> FilterBehavior {
        self.behavior
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Consume the modified flag and the pending classification. Called once
    /// per evaluation pass.
    pub fn take_modified(&mut self) -> bool {
        let was = self.modified;
        self.modified = false;
        self.behavior = FilterBehavior::None;
        was
    }

    /// Has the user moved the criteria away from the recorded defaults?
    #[must_use]
    pub fn is_not_default(&self) -> bool {
        self.ops != self.default_ops
    }

    /// Does the filter currently reject anything at all?
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ops.object_types != TypeMask::ALL
            || self.ops.category_types != TypeMask::ALL
            || self.ops.wearable_types != WEARABLE_MASK_ALL
            || !self.ops.substring.is_empty()
            || self.ops.permissions != perm::NONE
            || self.ops.uuid_target.is_some()
            || self.ops.min_date != 0
            || self.ops.max_date != i64::MAX
            || self.ops.hours_ago != 0
            || self.ops.link_policy != LinkPolicy::Include
    }

    /// Record the current operands as the configured baseline.
    pub fn mark_default(&mut self) {
        self.default_ops = self.ops.clone();
    }

    pub fn reset_default(&mut self) {
        self.ops = self.default_ops.clone();
        self.set_modified(FilterBehavior::Restart);
    }

    // ------------------------------------------------------------------------
    // Mutators, each classifying its own restrictiveness
    // ------------------------------------------------------------------------

    pub fn set_substring(&mut self, substring: &str) {
        let normalized = CompactString::new(substring.to_uppercase().trim_start());
        if self.ops.substring == normalized {
            return;
        }
        // hitting backspace leaves a prefix of the old needle
        let less = self.ops.substring.len() >= normalized.len()
            && self.ops.substring.starts_with(normalized.as_str());
        // appending characters extends the old needle
        let more = self.ops.substring.len() < normalized.len()
            && normalized.starts_with(self.ops.substring.as_str());
        self.ops.substring = normalized;

        self.set_modified(if less {
            FilterBehavior::LessRestrictive
        } else if more {
            FilterBehavior::MoreRestrictive
        } else {
            FilterBehavior::Restart
        });
    }

    pub fn set_object_types(&mut self, types: TypeMask) {
        if self.ops.object_types == types {
            return;
        }
        let behavior = mask_behavior(self.ops.object_types.0, types.0);
        self.ops.object_types = types;
        self.set_modified(behavior);
    }

    pub fn set_category_types(&mut self, types: TypeMask) {
        if self.ops.category_types == types {
            return;
        }
        let behavior = mask_behavior(self.ops.category_types.0, types.0);
        self.ops.category_types = types;
        self.set_modified(behavior);
    }

    pub fn set_wearable_types(&mut self, mask: u32) {
        if self.ops.wearable_types == mask {
            return;
        }
        let behavior = mask_behavior(self.ops.wearable_types, mask);
        self.ops.wearable_types = mask;
        self.set_modified(behavior);
    }

    pub fn set_permissions(&mut self, mask: u32) {
        if self.ops.permissions == mask {
            return;
        }
        let fewer_bits = self.ops.permissions & !mask != 0;
        let more_bits = !self.ops.permissions & mask != 0;
        self.ops.permissions = mask;

        // a node must carry every requested bit, so more bits == tighter
        self.set_modified(match (more_bits, fewer_bits) {
            (true, true) => FilterBehavior::Restart,
            (true, false) => FilterBehavior::MoreRestrictive,
            _ => FilterBehavior::LessRestrictive,
        });
    }

    pub fn set_uuid_target(&mut self, target: Option<NodeId>) {
        if self.ops.uuid_target == target {
            return;
        }
        self.ops.uuid_target = target;
        self.set_modified(FilterBehavior::Restart);
    }

    /// Explicit date window. Clears any relative window and clamps
    /// `max_date` to stay at or above `min_date`.
    pub fn set_date_range(&mut self, min_date: i64, max_date: i64) {
        self.ops.hours_ago = 0;
        let mut changed = false;
        if self.ops.min_date != min_date {
            self.ops.min_date = min_date;
            changed = true;
        }
        let clamped_max = max_date.max(min_date);
        if self.ops.max_date != clamped_max {
            self.ops.max_date = clamped_max;
            changed = true;
        }
        if changed {
            self.set_modified(FilterBehavior::Restart);
        }
    }

    /// Relative date window. Clears any explicit window.
    pub fn set_hours_ago(&mut self, hours: u32) {
        if self.ops.hours_ago == hours {
            return;
        }
        let window_only = self.ops.min_date == 0 && self.ops.max_date == i64::MAX;
        let less = window_only && hours > self.ops.hours_ago;
        let more = window_only && hours <= self.ops.hours_ago;
        self.ops.hours_ago = hours;
        self.ops.min_date = 0;
        self.ops.max_date = i64::MAX;

        self.set_modified(if less {
            FilterBehavior::LessRestrictive
        } else if more {
            FilterBehavior::MoreRestrictive
        } else {
            FilterBehavior::Restart
        });
    }

    pub fn set_link_policy(&mut self, policy: LinkPolicy) {
        if self.ops.link_policy == policy {
            return;
        }
        self.ops.link_policy = policy;
        self.set_modified(FilterBehavior::Restart);
    }

    pub fn set_folder_show(&mut self, show: FolderShow) {
        if self.ops.folder_show == show {
            return;
        }
        self.ops.folder_show = show;
        self.set_modified(match show {
            // fewer folders shown than before
            FolderShow::NonEmptyOnly => FilterBehavior::MoreRestrictive,
            // same folders as before and then some
            FolderShow::AllFolders => FilterBehavior::LessRestrictive,
        });
    }

    pub fn set_exclude_cut(&mut self, exclude: bool) {
        if self.ops.exclude_cut == exclude {
            return;
        }
        self.ops.exclude_cut = exclude;
        self.set_modified(if exclude {
            FilterBehavior::MoreRestrictive
        } else {
            FilterBehavior::LessRestrictive
        });
    }

    // ------------------------------------------------------------------------
    // Generation bookkeeping
    // ------------------------------------------------------------------------

    fn set_modified(&mut self, behavior: FilterBehavior) {
        self.modified = true;
        self.current_generation = self.next_generation;
        self.next_generation += 1;

        if self.behavior == FilterBehavior::None {
            self.behavior = behavior;
        } else if self.behavior != behavior {
            // conflicting classifications before the next pass: start over
            self.behavior = FilterBehavior::Restart;
        }

        if self.is_not_default() {
            match self.behavior {
                FilterBehavior::Restart => {
                    self.first_fail_generation = self.current_generation;
                    self.first_success_generation = self.current_generation;
                }
                FilterBehavior::LessRestrictive => {
                    self.first_fail_generation = self.current_generation;
                }
                FilterBehavior::MoreRestrictive => {
                    self.first_success_generation = self.current_generation;
                    self.first_fail_generation =
                        self.first_fail_generation.min(self.current_generation);
                }
                FilterBehavior::None => {}
            }
        } else {
            // back at the defaults: show everything immediately
            self.first_success_generation = 0;
            self.first_fail_generation = Generation::MAX;
        }
    }

    /// Lower bound of the date window at `now`. The explicit minimum
    /// overrides the relative window only when it is earlier; no relative
    /// window and no explicit minimum means no bound at all.
    #[must_use]
    pub fn earliest_allowed(&self, now: i64) -> i64 {
        let mut earliest = now - i64::from(self.ops.hours_ago) * 3600;
        if self.ops.min_date != 0 && self.ops.min_date < earliest {
            earliest = self.ops.min_date;
        } else if self.ops.hours_ago == 0 {
            earliest = 0;
        }
        earliest
    }
}

fn mask_behavior(old: u32, new: u32) -> FilterBehavior {
    let fewer_bits = old & !new != 0;
    let more_bits = !old & new != 0;
    match (more_bits, fewer_bits) {
        (true, true) => FilterBehavior::Restart,
        // more kind bits allowed == less restrictive
        (true, false) => FilterBehavior::LessRestrictive,
        _ => FilterBehavior::MoreRestrictive,
    }
}
