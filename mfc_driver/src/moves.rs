//! Move-status registry.
//!
//! Tracks outstanding `move_to` requests by id. A record is created in
//! state `Moving`, resolved to a terminal state by polling or by a
//! superseding command, and evicted once a terminal state has been read
//! with `clear`.
//!
//! ```text
//! Moving ──(program halted, |pos - target| <= 1)──► Done
//!    │   ──(program halted, |pos - target| > 1)───► Failed
//!    └───(new move / rotate / stop)───────────────► Interrupted
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Largest distance in encoder counts at which a halted move counts as done.
///
/// The module's zero-error check and the host's encoder read are not
/// synchronized, so one count of slop is accepted.
pub const DONE_TOLERANCE: i32 = 1;

/// Identifier of a move request. Ids increase by one per move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MoveId(u64);

impl MoveId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MoveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    /// Profile program still converging on the target
    Moving,
    /// Superseded by another move, a rotation or a stop
    Interrupted,
    /// Program halted away from the target
    Failed,
    /// Program halted on the target
    Done,
}

impl MoveStatus {
    /// Returns true for every state except `Moving`.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, MoveStatus::Moving)
    }

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            MoveStatus::Moving => "moving",
            MoveStatus::Interrupted => "interrupted",
            MoveStatus::Failed => "failed",
            MoveStatus::Done => "done",
        }
    }

    /// Status of a move after a poll.
    ///
    /// A `Moving` move whose program has stopped resolves to `Done` when the
    /// encoder is within [`DONE_TOLERANCE`] of the target and to `Failed`
    /// otherwise. Every other combination keeps the current status.
    pub fn resolve(self, program_running: bool, position: i32, target: i32) -> MoveStatus {
        if self != MoveStatus::Moving || program_running {
            return self;
        }
        let distance = (i64::from(position) - i64::from(target)).abs();
        if distance <= i64::from(DONE_TOLERANCE) {
            MoveStatus::Done
        } else {
            MoveStatus::Failed
        }
    }
}

impl fmt::Display for MoveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    /// Move id
    pub id: MoveId,
    /// When the target was handed to the module
    pub start: Instant,
    /// Target encoder position
    pub target: i32,
    /// Current status
    pub status: MoveStatus,
}

/// Move id → record table plus the most recently issued id.
#[derive(Debug, Default)]
pub struct MoveRegistry {
    records: HashMap<MoveId, MoveRecord>,
    last_id: Option<MoveId>,
}

impl MoveRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and record a `Moving` entry for it.
    pub fn begin(&mut self, target: i32, start: Instant) -> MoveId {
        let id = match self.last_id {
            Some(last) => MoveId(last.0 + 1),
            None => MoveId(0),
        };
        self.last_id = Some(id);
        self.records.insert(
            id,
            MoveRecord {
                id,
                start,
                target,
                status: MoveStatus::Moving,
            },
        );
        id
    }

    /// Most recently issued id, evicted or not.
    pub fn last_id(&self) -> Option<MoveId> {
        self.last_id
    }

    /// Record for `id`.
    pub fn get(&self, id: MoveId) -> Option<&MoveRecord> {
        self.records.get(&id)
    }

    /// Change the status of `id`. Returns false if the id is not present.
    pub fn set_status(&mut self, id: MoveId, status: MoveStatus) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Evict `id`.
    pub fn remove(&mut self, id: MoveId) -> Option<MoveRecord> {
        self.records.remove(&id)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records still `Moving`.
    pub fn moving_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.status == MoveStatus::Moving)
            .count()
    }
}
