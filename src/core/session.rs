//! Purpose: Session lifecycle and the submit/poll state machine.
//! Exports: `Client`, `Session`, `Completion`, `ItemOutcome`.
//! Role: The only code that sequences engine-boundary calls; all protocol
//! misuse is caught here, locally, before it can reach the engine.
//! Invariants: `close` crosses the boundary at most once per session.
//! Invariants: At most one batch is in flight per session; the completion
//! index domain is therefore unambiguous (`0..slots`).
//! Invariants: Destination buffers stay alive and untouched from submit
//! until the batch drains (or until an abandoning close returns).
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::batch::Batch;
use crate::core::engine::{Engine, EngineSession, STATUS_OK, SubmitView};
use crate::core::error::{Error, ErrorKind};
use crate::core::status;

#[cfg(unix)]
use crate::core::config::EngineConfig;
#[cfg(unix)]
use crate::core::engine::NativeEngine;

/// Opens sessions against one bound engine. Cheap to clone; sessions do not
/// borrow from it.
#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn Engine>,
}

impl Client {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Bind the native engine artifact selected by `config` and wrap it in a
    /// client. Configuration failures surface here, before any session work.
    #[cfg(unix)]
    pub fn native(config: &EngineConfig) -> Result<Self, Error> {
        Ok(Self::new(Arc::new(NativeEngine::load(config)?)))
    }

    /// Request a fresh engine instance.
    pub fn open_session(&self) -> Result<Session, Error> {
        match self.engine.open() {
            Ok(conn) => {
                debug!("engine session opened");
                Ok(Session {
                    engine: Arc::clone(&self.engine),
                    conn: Some(conn),
                    pending: None,
                })
            }
            Err(code) => Err(Error::new(ErrorKind::Unavailable)
                .with_code(code)
                .with_message(status::resolve(&*self.engine, code))),
        }
    }
}

// The engine binding is a trait object, so derive(Debug) is unavailable.
impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

struct PendingBatch {
    remaining: u32,
    seen: Vec<bool>,
    destinations: Vec<Vec<u8>>,
}

/// One open engine instance. Submit a batch, poll until the returned slot
/// count is drained, take the destinations back, then close (or drop).
///
/// The handle must not be shared across execution contexts without external
/// serialization; the engine instance is single-owner.
pub struct Session {
    engine: Arc<dyn Engine>,
    conn: Option<Box<dyn EngineSession>>,
    pending: Option<PendingBatch>,
}

/// Outcome of one completion unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemOutcome {
    Completed,
    /// Isolated to this unit; siblings keep draining normally.
    Failed { code: i32, message: String },
}

/// One decoded completion event. Indices are unique within the batch and
/// arrive in no particular order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    pub index: u32,
    pub outcome: ItemOutcome,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.outcome == ItemOutcome::Completed
    }

    /// The index on success, or an `ItemFailed` error carrying the engine
    /// code and resolved message.
    pub fn into_result(self) -> Result<u32, Error> {
        match self.outcome {
            ItemOutcome::Completed => Ok(self.index),
            ItemOutcome::Failed { code, message } => Err(Error::new(ErrorKind::ItemFailed)
                .with_index(self.index)
                .with_code(code)
                .with_message(message)),
        }
    }
}

impl Session {
    /// Submit a batch. Returns the number of completion slots the engine
    /// allocated; [`Session::poll`] must then be called exactly that many
    /// times before the batch counts as drained. The count may exceed the
    /// item count when the engine fans an item into several units.
    ///
    /// Destination buffers move into the session for the flight and come
    /// back from [`Session::take_destinations`]. A batch that fails
    /// validation or is refused by the engine is dropped whole, destination
    /// buffers included; none of its items are in flight and retry means
    /// building a fresh batch with fresh buffers.
    pub fn submit(&mut self, batch: Batch) -> Result<u32, Error> {
        let conn = self.conn.as_mut().ok_or_else(closed_error)?;
        if self.pending.is_some() {
            return Err(Error::new(ErrorKind::Busy).with_message("a batch is still draining"));
        }
        batch.validate()?;

        let Batch { items, credentials } = batch;
        let mut sources = Vec::with_capacity(items.len());
        let mut offsets = Vec::with_capacity(items.len());
        let mut lengths = Vec::with_capacity(items.len());
        let mut destinations = Vec::with_capacity(items.len());
        for item in items {
            sources.push(item.source);
            offsets.push(item.offset);
            lengths.push(item.length);
            destinations.push(item.destination);
        }

        let mut views: Vec<SubmitView<'_>> = Vec::with_capacity(sources.len());
        for (index, destination) in destinations.iter_mut().enumerate() {
            views.push(SubmitView {
                source: &sources[index],
                offset: offsets[index],
                length: lengths[index],
                destination: destination.as_mut_slice(),
            });
        }

        let reply = conn.submit(&mut views, &credentials);
        drop(views);

        if reply.status != STATUS_OK {
            return Err(Error::new(ErrorKind::Rejected)
                .with_code(reply.status)
                .with_message(status::resolve(&*self.engine, reply.status)));
        }

        debug!(items = sources.len(), slots = reply.slots, "batch submitted");
        self.pending = Some(PendingBatch {
            remaining: reply.slots,
            seen: vec![false; reply.slots as usize],
            destinations,
        });
        Ok(reply.slots)
    }

    /// Block until the engine reports the next completion. Completions are
    /// unordered; each slot index is delivered exactly once.
    pub fn poll(&mut self) -> Result<Completion, Error> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(closed_error());
        };
        let Some(pending) = self.pending.as_mut() else {
            return Err(Error::new(ErrorKind::Misuse).with_message("no batch in flight"));
        };
        if pending.remaining == 0 {
            return Err(Error::new(ErrorKind::Misuse).with_message("batch already drained"));
        }

        let reply = conn.poll();
        let slot = reply.index as usize;
        if slot >= pending.seen.len() {
            return Err(Error::new(ErrorKind::Misuse)
                .with_index(reply.index)
                .with_message("completion index outside the batch"));
        }
        if pending.seen[slot] {
            return Err(Error::new(ErrorKind::Misuse)
                .with_index(reply.index)
                .with_message("duplicate completion index"));
        }
        pending.seen[slot] = true;
        pending.remaining -= 1;

        let outcome = if reply.status == STATUS_OK {
            ItemOutcome::Completed
        } else {
            ItemOutcome::Failed {
                code: reply.status,
                message: status::resolve(&*self.engine, reply.status),
            }
        };
        Ok(Completion {
            index: reply.index,
            outcome,
        })
    }

    /// Completion slots not yet drained from the in-flight batch.
    pub fn outstanding(&self) -> u32 {
        self.pending.as_ref().map_or(0, |pending| pending.remaining)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Take back the destination buffers of a fully drained batch, in item
    /// order. Frees the session for the next submit.
    pub fn take_destinations(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        match &self.pending {
            Some(pending) if pending.remaining == 0 => {
                let pending = self.pending.take().expect("pending batch present");
                Ok(pending.destinations)
            }
            Some(_) => {
                Err(Error::new(ErrorKind::Busy).with_message("a batch is still draining"))
            }
            None => Err(Error::new(ErrorKind::Misuse).with_message("no drained batch to take")),
        }
    }

    /// Release the engine instance. Closing with completions outstanding
    /// abandons them: the engine may keep writing abandoned destinations
    /// until its close returns, so the buffers are only dropped afterwards.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(mut conn) = self.conn.take() else {
            return Err(Error::new(ErrorKind::Misuse).with_message("session already closed"));
        };
        if let Some(pending) = &self.pending {
            if pending.remaining > 0 {
                warn!(
                    outstanding = pending.remaining,
                    "closing session with completions outstanding"
                );
            }
        }
        conn.close();
        self.pending = None;
        debug!("engine session closed");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() {
            let _ = self.close();
        }
    }
}

fn closed_error() -> Error {
    Error::new(ErrorKind::Misuse).with_message("session is closed")
}
