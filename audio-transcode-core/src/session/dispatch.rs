//! Ordered delivery of delegate callbacks outside the encoder state lock.
//!
//! Calls are collected while the state lock is held and sealed into a
//! numbered batch before it is released. Batches are then delivered strictly
//! in sealing order, so a delegate may call back into the session (getters,
//! `stop`, `invalidate`) without deadlocking, and never sees a stop's format
//! reset overtake packets produced before it.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::models::buffer::PresentationTime;
use crate::models::format::NegotiatedFormat;
use crate::traits::delegate::TranscodeDelegate;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DelegateCall {
    Format(Option<NegotiatedFormat>),
    Packet(Vec<u8>, PresentationTime),
}

#[derive(Debug)]
pub(crate) struct Batch {
    seq: u64,
    calls: Vec<DelegateCall>,
}

#[derive(Debug, Default)]
struct Turns {
    issued: u64,
    serving: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    turns: Mutex<Turns>,
    signal: Condvar,
}

/// Hands the turn to the next batch even if a callback panics.
struct TurnGuard<'a>(&'a Dispatcher);

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.0.turns.lock().serving += 1;
        self.0.signal.notify_all();
    }
}

impl Dispatcher {
    /// Number `calls` for delivery. Call with the encoder state lock held.
    pub fn seal(&self, calls: Vec<DelegateCall>) -> Option<Batch> {
        if calls.is_empty() {
            return None;
        }
        let mut turns = self.turns.lock();
        let seq = turns.issued;
        turns.issued += 1;
        Some(Batch { seq, calls })
    }

    /// Wait for `batch`'s turn, then run its calls. Call without the state lock.
    pub fn deliver(&self, batch: Option<Batch>, delegate: Option<Arc<dyn TranscodeDelegate>>) {
        let Some(batch) = batch else {
            return;
        };

        {
            let mut turns = self.turns.lock();
            while turns.serving != batch.seq {
                self.signal.wait(&mut turns);
            }
        }
        let _turn = TurnGuard(self);

        let Some(delegate) = delegate else {
            return;
        };
        for call in batch.calls {
            match call {
                DelegateCall::Format(format) => delegate.on_format_changed(format.as_ref()),
                DelegateCall::Packet(data, pts) => delegate.on_packet(&data, pts),
            }
        }
    }
}
