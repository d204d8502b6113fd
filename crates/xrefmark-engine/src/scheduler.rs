//! Incremental draining of diff annotation work.
//!
//! A diff result can carry thousands of symbols. Instead of annotating them in
//! one go, they are queued as [`PendingUnit`]s and the host drains the queue a
//! slice at a time, one slice per frame, so rendering never stalls.
//!
//! The queue is LIFO: the unit pushed last is processed first. The unit pushed
//! first is flagged, so seeing it come off the queue means the whole batch ran.
//! If the queue empties without that happening, a newer request cleared it.

use crate::epoch::Epoch;
use crate::locator::DiffSide;
use crate::symbols::{DiffSymbols, Symbol};

/// Units processed per tick
pub const SLICE_SIZE: usize = 64;

/// One deferred annotation of the diff view
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUnit {
    pub epoch: Epoch,
    /// First unit scheduled in its batch
    pub first: bool,
    pub path: String,
    pub side: DiffSide,
    pub symbol: Symbol,
}

/// What one tick accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// No batch is running
    Idle,
    /// Work remains; the host should tick again on its next turn
    MorePending { processed: usize, remaining: usize },
    /// The batch's first unit was processed; nothing was abandoned
    Completed { processed: usize },
    /// The queue ran dry without reaching the batch's first unit
    Interrupted { processed: usize },
}

impl SliceOutcome {
    pub fn has_more(self) -> bool {
        matches!(self, SliceOutcome::MorePending { .. })
    }

    pub fn processed(self) -> usize {
        match self {
            SliceOutcome::Idle => 0,
            SliceOutcome::MorePending { processed, .. }
            | SliceOutcome::Completed { processed }
            | SliceOutcome::Interrupted { processed } => processed,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchScheduler {
    worklist: Vec<PendingUnit>,
    armed: bool,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.worklist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worklist.is_empty()
    }

    /// True while ticks still have something to report
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Queue every symbol of a diff result, new files first, then old ones.
    ///
    /// Returns the number of units queued. Multi-line symbols are queued too;
    /// they are skipped when processed.
    pub fn schedule_diff(&mut self, epoch: Epoch, diff: &DiffSymbols) -> usize {
        let sides = [
            (DiffSide::New, &diff.new_files),
            (DiffSide::Old, &diff.old_files),
        ];
        let mut first = true;
        let mut queued = 0;
        for (side, files) in sides {
            for file in files {
                for symbol in &file.syms {
                    self.worklist.push(PendingUnit {
                        epoch,
                        first,
                        path: file.path.clone(),
                        side,
                        symbol: symbol.clone(),
                    });
                    first = false;
                    queued += 1;
                }
            }
        }
        if !self.worklist.is_empty() {
            self.armed = true;
        }
        queued
    }

    /// Drop all queued units. A running batch stays armed so the next tick
    /// reports it as interrupted.
    pub fn clear(&mut self) {
        self.worklist.clear();
    }

    /// Pop and process up to [`SLICE_SIZE`] units, newest first.
    pub fn run_slice(&mut self, mut process: impl FnMut(PendingUnit)) -> SliceOutcome {
        if !self.armed {
            return SliceOutcome::Idle;
        }

        let mut processed = 0;
        let mut reached_first = false;
        while processed < SLICE_SIZE {
            let Some(unit) = self.worklist.pop() else {
                break;
            };
            reached_first = unit.first;
            process(unit);
            processed += 1;
        }

        if !self.worklist.is_empty() {
            return SliceOutcome::MorePending {
                processed,
                remaining: self.worklist.len(),
            };
        }
        self.armed = false;
        if reached_first {
            SliceOutcome::Completed { processed }
        } else {
            SliceOutcome::Interrupted { processed }
        }
    }
}
