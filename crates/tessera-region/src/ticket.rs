//! One-shot handoff of a populated chunk from a worker to the tick thread.
//!
//! Each in-flight population owns exactly one ticket. The worker completes
//! it; the tick thread either waits on it (blocking load) or takes it when
//! the worker's completion notice arrives.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tessera_voxel::{Chunk, ChunkCoord};

use crate::error::RegionError;

pub type PopulateResult = Result<Chunk, RegionError>;

enum TicketState {
    Pending,
    Done(PopulateResult),
    Taken,
    Abandoned,
}

pub struct PopulateTicket {
    id: u64,
    coord: ChunkCoord,
    state: Mutex<TicketState>,
    done: Condvar,
}

impl PopulateTicket {
    pub fn new(id: u64, coord: ChunkCoord) -> Self {
        Self {
            id,
            coord,
            state: Mutex::new(TicketState::Pending),
            done: Condvar::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    fn state(&self) -> MutexGuard<'_, TicketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the worker's result. Returns `false` if the ticket was
    /// abandoned, in which case the result is dropped.
    pub fn complete(&self, result: PopulateResult) -> bool {
        let mut state = self.state();
        if matches!(*state, TicketState::Abandoned) {
            return false;
        }
        *state = TicketState::Done(result);
        drop(state);
        self.done.notify_all();
        true
    }

    /// Takes the result if it is ready.
    pub fn take(&self) -> Option<PopulateResult> {
        let mut state = self.state();
        match std::mem::replace(&mut *state, TicketState::Taken) {
            TicketState::Done(result) => Some(result),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Blocks until the result is ready or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<PopulateResult> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            match std::mem::replace(&mut *state, TicketState::Taken) {
                TicketState::Done(result) => return Some(result),
                TicketState::Pending => *state = TicketState::Pending,
                other => {
                    *state = other;
                    return None;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .done
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Marks the ticket abandoned; a later completion is discarded.
    pub fn abandon(&self) {
        *self.state() = TicketState::Abandoned;
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state(), TicketState::Pending)
    }
}
