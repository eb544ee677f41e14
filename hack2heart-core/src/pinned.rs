//! Pinned-code board: a bounded list of slots plus an unpinned pool.
//!
//! Every snippet known to the board lives in exactly one container, either
//! one slot or the pool. All transitions take `&mut self` and finish before
//! returning, so a caller that re-renders after each call never observes a
//! half-applied move. Rejected gestures (full board, unknown target, moving
//! onto the current slot) return `false` and leave the board untouched.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{CodeId, CodeSnippet, CoreError, MAX_SLOTS, SLOT_ID_PREFIX, SnippetCard, SnippetKey};

/// Drop-zone id of the pool container in the card list.
pub const POOL_CONTAINER_ID: &str = "codes";
pub const POOL_MARKER: &str = "pool";

/// Stable slot label, rendered as `"blank-N"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SLOT_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for SlotId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(SLOT_ID_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
            .map(SlotId)
            .ok_or_else(|| CoreError::InvalidSlotId(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: SlotId,
    pub assigned: Option<SnippetKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Slot(SlotId),
    Pool,
}

impl DropTarget {
    /// Resolve a drop-zone identifier. Unrecognised identifiers yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            POOL_MARKER | POOL_CONTAINER_ID => Some(DropTarget::Pool),
            other => other.parse::<SlotId>().ok().map(DropTarget::Slot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Position in the slot list.
    Slot(usize),
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub source: SnippetKey,
}

/// One occupied slot in pinned order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinnedPosition {
    pub key: SnippetKey,
    pub slot_index: u32,
}

/// Body of the bulk "update indices" call: parallel arrays of server ids
/// and slot positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUpdate {
    pub code_ids: Vec<CodeId>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct PinnedBoard {
    snippets: HashMap<SnippetKey, CodeSnippet>,
    slots: Vec<Slot>,
    pool: Vec<SnippetKey>,
    max_slots: usize,
    next_slot_number: u32,
    drag: Option<DragSession>,
}

impl Default for PinnedBoard {
    fn default() -> Self {
        Self::with_max_slots(MAX_SLOTS)
    }
}

impl PinnedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty board with a single empty slot. `max_slots` is at least 1.
    pub fn with_max_slots(max_slots: usize) -> Self {
        let mut board = Self {
            snippets: HashMap::new(),
            slots: Vec::with_capacity(max_slots.max(1)),
            pool: Vec::new(),
            max_slots: max_slots.max(1),
            next_slot_number: 1,
            drag: None,
        };
        board.push_empty_slot();
        board
    }

    pub fn hydrate(snippets: Vec<CodeSnippet>) -> Self {
        Self::hydrate_with_max(snippets, MAX_SLOTS)
    }

    /// Partition server snippets into slots (by persisted index) and the pool.
    ///
    /// A snippet whose index is missing, out of range, or already claimed by
    /// an earlier snippet goes to the pool. Duplicate ids keep the first copy.
    pub fn hydrate_with_max(snippets: Vec<CodeSnippet>, max_slots: usize) -> Self {
        let mut board = Self::with_max_slots(max_slots);
        let max_slots = board.max_slots;

        let mut claimed: Vec<Option<SnippetKey>> = vec![None; max_slots];
        for snippet in snippets {
            let key = snippet.key();
            if board.snippets.contains_key(&key) {
                continue;
            }

            let slot_index = snippet
                .index
                .and_then(|index| usize::try_from(index).ok())
                .filter(|index| *index < max_slots);
            match slot_index {
                Some(index) if claimed[index].is_none() => claimed[index] = Some(key),
                _ => board.pool.push(key),
            }
            board.snippets.insert(key, snippet);
        }

        let slot_count = claimed
            .iter()
            .rposition(Option::is_some)
            .map_or(1, |last| last + 1);
        while board.slots.len() < slot_count {
            board.push_empty_slot();
        }
        for (slot, assigned) in board.slots.iter_mut().zip(claimed) {
            slot.assigned = assigned;
        }

        board
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn pool(&self) -> &[SnippetKey] {
        &self.pool
    }

    pub fn snippet(&self, key: SnippetKey) -> Option<&CodeSnippet> {
        self.snippets.get(&key)
    }

    pub fn card(&self, key: SnippetKey) -> Option<SnippetCard> {
        self.snippets.get(&key).map(CodeSnippet::card)
    }

    pub fn snippet_count(&self) -> usize {
        self.snippets.len()
    }

    pub fn can_add_slot(&self) -> bool {
        self.slots.len() < self.max_slots
    }

    pub fn location(&self, key: SnippetKey) -> Option<Location> {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.assigned == Some(key))
        {
            return Some(Location::Slot(index));
        }
        self.pool.contains(&key).then_some(Location::Pool)
    }

    pub fn slot_index(&self, slot_id: SlotId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == slot_id)
    }

    /// Append an empty slot. Saturates at the maximum.
    pub fn add_slot(&mut self) -> bool {
        if !self.can_add_slot() {
            return false;
        }
        self.push_empty_slot();
        true
    }

    /// Remove a slot, returning its snippet to the end of the pool.
    ///
    /// The last remaining slot is cleared rather than removed.
    pub fn remove_slot(&mut self, slot_id: SlotId) -> bool {
        let Some(index) = self.slot_index(slot_id) else {
            return false;
        };

        let held = self.slots[index].assigned.take();
        if let Some(key) = held
            && !self.pool.contains(&key)
        {
            self.pool.push(key);
        }

        if self.slots.len() == 1 {
            return held.is_some();
        }
        self.slots.remove(index);
        true
    }

    pub fn move_snippet(&mut self, key: SnippetKey, target: DropTarget) -> bool {
        let Some(source) = self.location(key) else {
            return false;
        };

        match target {
            DropTarget::Pool => match source {
                Location::Pool => false,
                Location::Slot(index) => {
                    self.slots[index].assigned = None;
                    self.pool.push(key);
                    true
                }
            },
            DropTarget::Slot(slot_id) => {
                let Some(dest) = self.slot_index(slot_id) else {
                    return false;
                };
                if source == Location::Slot(dest) {
                    return false;
                }

                if let Some(bumped) = self.slots[dest].assigned.take() {
                    self.pool.push(bumped);
                }
                match source {
                    Location::Slot(index) => self.slots[index].assigned = None,
                    Location::Pool => self.pool.retain(|pooled| *pooled != key),
                }
                self.slots[dest].assigned = Some(key);
                true
            }
        }
    }

    /// Forget a snippet locally. The slot that held it stays, empty.
    pub fn delete_snippet(&mut self, key: SnippetKey) -> Option<CodeSnippet> {
        let removed = self.snippets.remove(&key)?;
        match self.location(key) {
            Some(Location::Slot(index)) => self.slots[index].assigned = None,
            Some(Location::Pool) => self.pool.retain(|pooled| *pooled != key),
            None => {}
        }
        if self.drag.is_some_and(|drag| drag.source == key) {
            self.drag = None;
        }
        Some(removed)
    }

    /// Occupied slots in order, with their position in the slot list.
    pub fn serialize(&self) -> Vec<PinnedPosition> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.assigned.map(|key| PinnedPosition {
                    key,
                    slot_index: index as u32,
                })
            })
            .collect()
    }

    pub fn index_update(&self) -> IndexUpdate {
        let (code_ids, indices) = self
            .serialize()
            .into_iter()
            .map(|position| (position.key.code_id(), position.slot_index))
            .unzip();
        IndexUpdate { code_ids, indices }
    }

    pub fn begin_drag(&mut self, key: SnippetKey) -> bool {
        if !self.snippets.contains_key(&key) {
            return false;
        }
        self.drag = Some(DragSession { source: key });
        true
    }

    pub fn active_drag(&self) -> Option<DragSession> {
        self.drag
    }

    /// Finish the active drag. `None` means the gesture ended outside any
    /// drop zone.
    pub fn end_drag(&mut self, target: Option<DropTarget>) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        match target {
            Some(target) => self.move_snippet(drag.source, target),
            None => false,
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    fn push_empty_slot(&mut self) {
        self.slots.push(Slot {
            id: SlotId(self.next_slot_number),
            assigned: None,
        });
        self.next_slot_number += 1;
    }
}
