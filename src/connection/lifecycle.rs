//! Transport-agnostic connection lifecycle.
//!
//! Tracks the two single-slot operations (read, write) and the close
//! sequence. The driver in [`super::Connection`] consults it before starting
//! an operation and after each completion; it never touches I/O itself.
//!
//! ```text
//!            read()                    write()
//!   Idle ─────────────► ReadPending ─────────────► ReadAndWritePending
//!    │  ◄─── done ───                 ◄─── done ───         │
//!    │                                                      │
//!    └──── close() / end-of-stream ──► Closing ── last op done ──► Closed
//! ```
//!
//! `Closed` is entered exactly once, and only when neither operation is
//! pending; that transition is the disconnect notification.

use thiserror::Error;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing in flight.
    Idle,
    /// A read is in flight.
    ReadPending,
    /// A write is in flight.
    WritePending,
    /// Both a read and a write are in flight.
    ReadAndWritePending,
    /// Shutting down; waiting for in-flight operations to finish.
    Closing,
    /// Terminal. The disconnect notification has been issued.
    Closed,
}

/// Reasons an operation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    /// A read is already in flight.
    #[error("read already pending")]
    ReadPending,
    /// A write is already in flight.
    #[error("write already pending")]
    WritePending,
    /// The connection is closing or closed.
    #[error("connection is closing")]
    Closing,
    /// Writes must carry at least one byte.
    #[error("empty payload")]
    EmptyPayload,
    /// Payload larger than the connection accepts.
    #[error("payload of {0} bytes is too large")]
    Oversized(usize),
}

/// What the driver must do after an operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Normal completion; hand the result to the owner.
    Proceed,
    /// Closing, but the other operation is still in flight.
    Wait,
    /// Last operation finished while closing: issue the disconnect notification.
    Disconnect,
}

/// Outcome of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    /// Already closing or closed; nothing to do.
    Ignored,
    /// Nothing was pending: the connection is closed now.
    Disconnect,
    /// Deferred until the pending operation(s) complete.
    Deferred,
}

/// Lifecycle bookkeeping for one connection.
#[derive(Debug, Default)]
pub struct Lifecycle {
    read_pending: bool,
    write_pending: bool,
    closing: bool,
    closed: bool,
}

impl Lifecycle {
    /// Fresh, idle lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        if self.closed {
            return ConnectionState::Closed;
        }
        if self.closing {
            return ConnectionState::Closing;
        }
        match (self.read_pending, self.write_pending) {
            (false, false) => ConnectionState::Idle,
            (true, false) => ConnectionState::ReadPending,
            (false, true) => ConnectionState::WritePending,
            (true, true) => ConnectionState::ReadAndWritePending,
        }
    }

    /// Whether a read is in flight.
    #[inline]
    pub fn is_read_pending(&self) -> bool {
        self.read_pending
    }

    /// Whether a write is in flight.
    #[inline]
    pub fn is_write_pending(&self) -> bool {
        self.write_pending
    }

    /// Whether close has begun (by either side).
    #[inline]
    pub fn is_closing(&self) -> bool {
        self.closing || self.closed
    }

    /// Mark a read as started.
    pub fn begin_read(&mut self) -> Result<(), Rejected> {
        if self.is_closing() {
            return Err(Rejected::Closing);
        }
        if self.read_pending {
            return Err(Rejected::ReadPending);
        }
        self.read_pending = true;
        Ok(())
    }

    /// Mark a write as started.
    pub fn begin_write(&mut self) -> Result<(), Rejected> {
        if self.is_closing() {
            return Err(Rejected::Closing);
        }
        if self.write_pending {
            return Err(Rejected::WritePending);
        }
        self.write_pending = true;
        Ok(())
    }

    /// Request close. Idempotent.
    pub fn close(&mut self) -> CloseStep {
        if self.is_closing() {
            return CloseStep::Ignored;
        }
        self.closing = true;
        if self.try_finish() {
            CloseStep::Disconnect
        } else {
            CloseStep::Deferred
        }
    }

    /// A read completed. `terminal` is set for end-of-stream and for errors
    /// that always end the connection.
    pub fn finish_read(&mut self, terminal: bool) -> Step {
        debug_assert!(self.read_pending, "read completion without pending read");
        self.read_pending = false;
        self.after_completion(terminal)
    }

    /// A write completed. `terminal` as for [`Lifecycle::finish_read`].
    pub fn finish_write(&mut self, terminal: bool) -> Step {
        debug_assert!(self.write_pending, "write completion without pending write");
        self.write_pending = false;
        self.after_completion(terminal)
    }

    fn after_completion(&mut self, terminal: bool) -> Step {
        if self.closed {
            return Step::Wait;
        }
        if !(self.closing || terminal) {
            return Step::Proceed;
        }
        self.closing = true;
        if self.try_finish() {
            Step::Disconnect
        } else {
            Step::Wait
        }
    }

    /// Enter `Closed` if closing and idle. Returns true on the one transition.
    fn try_finish(&mut self) -> bool {
        if self.closing && !self.closed && !self.read_pending && !self.write_pending {
            self.closed = true;
            return true;
        }
        false
    }
}
