//! ``src/config.rs``
//! ============================================================================
//! # Config: the recognized option surface
//!
//! [`FilterParams`] is the serializable form of the live filter criteria
//! plus the sort order; applying captured params to a fresh criteria
//! reproduces identical accept/reject decisions. [`BrowserConfig`] carries
//! the engine knobs (per-tick budgets, fetch pacing). Both load and save as
//! TOML from the platform config directory via the
//! [`directories`](https://docs.rs/directories) crate.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::fetch::FetchConfig;
use crate::filter::criteria::FilterCriteria;
use crate::model::node::{FolderShow, LinkPolicy, TypeMask};
use crate::sort::{NodeSorter, SortFlags};

/// Serializable filter + sort option set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub substring: String,
    pub object_type_mask: u32,
    pub category_type_mask: u32,
    pub wearable_type_mask: u32,
    pub uuid_target: Option<Uuid>,
    pub date_min: i64,
    pub date_max: i64,
    pub hours_ago: u32,
    pub permission_mask: u32,
    pub link_policy: LinkPolicy,
    pub folder_visibility: FolderShow,
    pub exclude_clipboard_cuts: bool,
    pub sort: SortFlags,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            substring: String::new(),
            object_type_mask: TypeMask::ALL.0,
            category_type_mask: TypeMask::ALL.0,
            wearable_type_mask: u32::MAX,
            uuid_target: None,
            date_min: 0,
            date_max: i64::MAX,
            hours_ago: 0,
            permission_mask: 0,
            link_policy: LinkPolicy::Include,
            folder_visibility: FolderShow::AllFolders,
            exclude_clipboard_cuts: true,
            sort: SortFlags::default(),
        }
    }
}

impl FilterParams {
    /// Snapshot the live criteria and sort order.
    #[must_use]
    pub fn capture(criteria: &FilterCriteria, sorter: &NodeSorter) -> Self {
        let ops = criteria.ops();
        Self {
            substring: ops.substring.to_string(),
            object_type_mask: ops.object_types.0,
            category_type_mask: ops.category_types.0,
            wearable_type_mask: ops.wearable_types,
            uuid_target: ops.uuid_target,
            date_min: ops.min_date,
            date_max: ops.max_date,
            hours_ago: ops.hours_ago,
            permission_mask: ops.permissions,
            link_policy: ops.link_policy,
            folder_visibility: ops.folder_show,
            exclude_clipboard_cuts: ops.exclude_cut,
            sort: sorter.flags(),
        }
    }

    /// Drive the live criteria to match these params. Each differing field
    /// classifies its own restrictiveness, so the usual memoization bounds
    /// apply. The sort flags are the caller's to hand to the sorter.
    pub fn apply(&self, criteria: &mut FilterCriteria) {
        criteria.set_object_types(TypeMask(self.object_type_mask));
        criteria.set_category_types(TypeMask(self.category_type_mask));
        criteria.set_wearable_types(self.wearable_type_mask);
        criteria.set_permissions(self.permission_mask);
        criteria.set_uuid_target(self.uuid_target);
        if self.hours_ago != 0 {
            criteria.set_hours_ago(self.hours_ago);
        } else {
            criteria.set_date_range(self.date_min, self.date_max);
        }
        criteria.set_link_policy(self.link_policy);
        criteria.set_folder_show(self.folder_visibility);
        criteria.set_exclude_cut(self.exclude_clipboard_cuts);
        criteria.set_substring(&self.substring);
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::config_io(path.as_ref(), e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), &content)
            .map_err(|e| CoreError::config_io(path.as_ref(), e))?;
        Ok(())
    }
}

/// Engine configuration: per-tick budgets and fetch pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Filter checks spent per tick before the pass yields.
    pub filter_items_per_tick: i32,

    pub multi_select: bool,

    pub sort: SortFlags,

    pub fetch: FetchConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            filter_items_per_tick: 500,
            multi_select: true,
            sort: SortFlags::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl BrowserConfig {
    /// Platform config path, e.g. `$XDG_CONFIG_HOME/arbor/config.toml`.
    pub fn default_path() -> CoreResult<PathBuf> {
        let dirs = ProjectDirs::from("", "", "arbor").ok_or(CoreError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load from the default path, falling back to defaults when the file
    /// does not exist yet.
    pub fn load_or_default() -> CoreResult<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::config_io(path.as_ref(), e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::config_io(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), &content)
            .map_err(|e| CoreError::config_io(path.as_ref(), e))?;
        Ok(())
    }
}
