use crate::config::ClipboardConfig;
use crate::error::{ClipError, ClipResult};
use indexmap::IndexSet;
use uuid::Uuid;

/// What a paste of the current contents would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    #[default]
    Copy,
    Cut,
}

/// Ordered set of staged item ids plus the pending operation.
///
/// Cut mode is the interesting one for tree consumers: items staged for a
/// cut (and everything beneath them) are conventionally hidden from view
/// until the cut is pasted or abandoned.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    entries: IndexSet<Uuid>,
    mode: ClipMode,
    generation: u64,
    config: ClipboardConfig,
}

impl Clipboard {
    #[must_use]
    pub fn new(config: ClipboardConfig) -> Self {
        Self {
            entries: IndexSet::new(),
            mode: ClipMode::Copy,
            generation: 0,
            config,
        }
    }

    /// Stage `ids` for a copy, replacing the previous contents.
    pub fn copy(&mut self, ids: &[Uuid]) -> ClipResult<()> {
        self.stage(ids, ClipMode::Copy)
    }

    /// Stage `ids` for a cut, replacing the previous contents.
    pub fn cut(&mut self, ids: &[Uuid]) -> ClipResult<()> {
        self.stage(ids, ClipMode::Cut)
    }

    /// Add one more id to the current staging without changing the mode.
    pub fn append(&mut self, id: Uuid) -> ClipResult<()> {
        if self.entries.contains(&id) {
            return Err(ClipError::DuplicateEntry(id));
        }
        self.make_room(1)?;
        self.entries.insert(id);
        self.generation += 1;
        Ok(())
    }

    /// Drop all staged entries and revert to copy mode.
    pub fn reset(&mut self) {
        if !self.entries.is_empty() || self.mode == ClipMode::Cut {
            self.entries.clear();
            self.mode = ClipMode::Copy;
            self.generation += 1;
        }
    }

    #[must_use]
    pub fn is_cut_mode(&self) -> bool {
        self.mode == ClipMode::Cut
    }

    #[must_use]
    pub fn is_on_clipboard(&self, id: Uuid) -> bool {
        self.entries.contains(&id)
    }

    /// Bumped on every mutation; readers compare against a remembered value
    /// to invalidate derived state.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn mode(&self) -> ClipMode {
        self.mode
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged ids in staging order.
    pub fn entries(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().copied()
    }

    fn stage(&mut self, ids: &[Uuid], mode: ClipMode) -> ClipResult<()> {
        if ids.is_empty() {
            return Err(ClipError::EmptySelection);
        }

        self.entries.clear();
        self.mode = mode;
        self.generation += 1;

        for &id in ids {
            self.make_room(1)?;
            self.entries.insert(id);
        }
        Ok(())
    }

    fn make_room(&mut self, incoming: usize) -> ClipResult<()> {
        while self.entries.len() + incoming > self.config.max_entries {
            if self.config.strict_capacity {
                return Err(ClipError::ClipboardFull {
                    max: self.config.max_entries,
                });
            }
            // evict oldest staged entry first
            self.entries.shift_remove_index(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn cut_sets_mode_and_membership() {
        let staged = ids(3);
        let mut clip = Clipboard::default();

        clip.cut(&staged).unwrap();

        assert!(clip.is_cut_mode());
        assert!(staged.iter().all(|&id| clip.is_on_clipboard(id)));
        assert!(!clip.is_on_clipboard(Uuid::new_v4()));
    }

    #[test]
    fn copy_replaces_previous_cut() {
        let first = ids(2);
        let second = ids(2);
        let mut clip = Clipboard::default();

        clip.cut(&first).unwrap();
        clip.copy(&second).unwrap();

        assert!(!clip.is_cut_mode());
        assert!(!clip.is_on_clipboard(first[0]));
        assert!(clip.is_on_clipboard(second[1]));
    }

    #[test]
    fn generation_bumps_on_every_mutation() {
        let mut clip = Clipboard::default();
        let g0 = clip.generation();

        clip.copy(&ids(1)).unwrap();
        let g1 = clip.generation();
        clip.append(Uuid::new_v4()).unwrap();
        let g2 = clip.generation();
        clip.reset();
        let g3 = clip.generation();

        assert!(g0 < g1 && g1 < g2 && g2 < g3);
    }

    #[test]
    fn strict_capacity_refuses_overflow() {
        let config = ClipboardConfig {
            max_entries: 2,
            strict_capacity: true,
        };
        let mut clip = Clipboard::new(config);

        let err = clip.cut(&ids(3)).unwrap_err();
        assert!(matches!(err, ClipError::ClipboardFull { max: 2 }));
    }

    #[test]
    fn lenient_capacity_evicts_oldest() {
        let config = ClipboardConfig {
            max_entries: 2,
            strict_capacity: false,
        };
        let staged = ids(3);
        let mut clip = Clipboard::new(config);

        clip.copy(&staged).unwrap();

        assert_eq!(clip.len(), 2);
        assert!(!clip.is_on_clipboard(staged[0]));
        assert!(clip.is_on_clipboard(staged[2]));
    }
}
