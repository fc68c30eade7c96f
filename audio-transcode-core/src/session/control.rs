use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::models::error::TranscodeError;

/// Mutations applied in order on the control queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlCommand {
    /// Carries the stop generation current when it was queued.
    Start(u64),
    Stop,
    Invalidate,
    SetBitrate(u32),
    /// No-op used to wait for everything queued before it.
    Barrier,
}

#[derive(Debug, Default)]
struct Completion {
    applied: Mutex<Option<bool>>,
    signal: Condvar,
}

impl Completion {
    fn finish(&self, applied: bool) {
        let mut slot = self.applied.lock();
        if slot.is_none() {
            *slot = Some(applied);
            self.signal.notify_all();
        }
    }
}

/// Queue-side half of a ticket. Dropped unapplied, it reports the queue closed.
struct Ack(Arc<Completion>);

impl Ack {
    fn applied(self) {
        self.0.finish(true);
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        self.0.finish(false);
    }
}

enum Envelope {
    Apply { command: ControlCommand, ack: Ack },
    Shutdown,
}

/// Handle to a queued control command.
///
/// Dropping the ticket does not cancel the command; `wait` blocks until it
/// has been applied.
#[derive(Debug)]
pub struct ControlTicket {
    completion: Arc<Completion>,
}

impl ControlTicket {
    pub fn wait(self) -> Result<(), TranscodeError> {
        let mut slot = self.completion.applied.lock();
        while slot.is_none() {
            self.completion.signal.wait(&mut slot);
        }
        match *slot {
            Some(true) => Ok(()),
            _ => Err(TranscodeError::ControlQueueClosed),
        }
    }
}

/// Dedicated sequential queue running control commands off the caller's thread.
pub(crate) struct ControlQueue {
    commands: kanal::Sender<Envelope>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ControlQueue {
    pub fn spawn<F>(name: String, mut apply: F) -> Result<Self, TranscodeError>
    where
        F: FnMut(ControlCommand) + Send + 'static,
    {
        let (commands, queue) = kanal::unbounded::<Envelope>();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                while let Ok(envelope) = queue.recv() {
                    match envelope {
                        Envelope::Apply { command, ack } => {
                            apply(command);
                            ack.applied();
                        }
                        Envelope::Shutdown => break,
                    }
                }
                log::trace!("control queue drained");
            })
            .map_err(|e| TranscodeError::ControlQueueSpawn(e.to_string()))?;

        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, command: ControlCommand) -> ControlTicket {
        let completion = Arc::new(Completion::default());
        let ack = Ack(Arc::clone(&completion));
        if self.commands.send(Envelope::Apply { command, ack }).is_err() {
            log::error!("control queue closed, dropping {:?}", command);
        }
        ControlTicket { completion }
    }
}

impl Drop for ControlQueue {
    fn drop(&mut self) {
        let _ = self.commands.send(Envelope::Shutdown);
        if let Some(handle) = self.handle.take() {
            // Dropped from a callback running on the queue itself: let it exit on its own.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
