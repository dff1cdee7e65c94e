//! Position within the active playlist snapshot.
//!
//! The snapshot is immutable; a hot-reload swaps in a new one through
//! [`Playhead::adopt`], which re-derives the index so that the next natural
//! advance plays whatever should follow the entry on air.

use std::sync::Arc;

use loopcast_ipc::SkipDirection;

use crate::resolver::ResolvedEntry;

/// Result of adopting a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adoption {
    /// Index after correction.
    pub index: usize,

    /// Whether the playing entry survived the edit.
    pub retained: bool,
}

#[derive(Debug, Clone)]
pub struct Playhead {
    snapshot: Arc<[ResolvedEntry]>,
    index: usize,
    pending_skip: Option<usize>,
}

impl Playhead {
    pub fn new(entries: Vec<ResolvedEntry>, start: usize) -> Self {
        let mut playhead = Self {
            snapshot: entries.into(),
            index: 0,
            pending_skip: None,
        };
        playhead.index = playhead.clamp(start);
        playhead
    }

    /// Where to start a session: one past the checkpointed entry, else 0.
    pub fn resume_position(entries: &[ResolvedEntry], last_played: &str) -> usize {
        entries
            .iter()
            .position(|entry| entry.identity() == last_played)
            .map_or(0, |pos| (pos + 1) % entries.len())
    }

    pub fn snapshot(&self) -> &Arc<[ResolvedEntry]> {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&ResolvedEntry> {
        self.snapshot.get(self.index)
    }

    /// Index a natural advance moves to.
    pub fn next_index(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.index + 1) % self.len()
        }
    }

    pub fn peek_next(&self) -> Option<&ResolvedEntry> {
        self.snapshot.get(self.next_index())
    }

    /// Move to `index`, falling back to 0 if it no longer fits the snapshot.
    pub fn jump_to(&mut self, index: usize) -> usize {
        self.index = self.clamp(index);
        self.index
    }

    fn clamp(&self, index: usize) -> usize {
        if index < self.len() {
            index
        } else {
            0
        }
    }

    /// Record a skip target, stacking on a skip that has not landed yet.
    pub fn request_skip(&mut self, direction: SkipDirection) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let len = self.len();
        let from = self.pending_skip.map_or(self.index, |target| self.clamp(target));
        let target = match direction {
            SkipDirection::Next => (from + 1) % len,
            SkipDirection::Previous => (from + len - 1) % len,
        };
        self.pending_skip = Some(target);
        Some(target)
    }

    pub fn has_pending_skip(&self) -> bool {
        self.pending_skip.is_some()
    }

    /// Consume the pending skip, clamped against the current snapshot.
    pub fn take_skip(&mut self) -> Option<usize> {
        self.pending_skip.take().map(|target| self.clamp(target))
    }

    pub fn clear_skip(&mut self) {
        self.pending_skip = None;
    }

    /// Swap in a new snapshot and correct the index.
    ///
    /// If the playing entry is still present the index follows it. If it was
    /// removed, the index is parked just before its first surviving successor,
    /// so the next advance plays that successor.
    pub fn adopt(&mut self, entries: Vec<ResolvedEntry>) -> Adoption {
        let old = std::mem::replace(&mut self.snapshot, entries.into());
        let new = &self.snapshot;

        if new.is_empty() {
            self.index = 0;
            return Adoption {
                index: 0,
                retained: false,
            };
        }

        let Some(playing) = old.get(self.index) else {
            self.index = 0;
            return Adoption {
                index: 0,
                retained: false,
            };
        };

        let find = |item: &ResolvedEntry| new.iter().position(|e| e.entry.same_item(&item.entry));

        if let Some(pos) = find(playing) {
            self.index = pos;
            return Adoption {
                index: pos,
                retained: true,
            };
        }

        let successor = (1..old.len())
            .map(|k| &old[(self.index + k) % old.len()])
            .find_map(find);

        self.index = match successor {
            Some(pos) => (pos + new.len() - 1) % new.len(),
            None => self.index.min(new.len() - 1),
        };
        Adoption {
            index: self.index,
            retained: false,
        }
    }
}
