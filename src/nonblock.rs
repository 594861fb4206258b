//! Non-blocking input helper — a background reader that buffers one byte so
//! the decoder can peek with a timeout.
//!
//! ## Architecture
//!
//! The helper owns the underlying byte source.  A background thread blocks
//! on the source one byte at a time, parking the byte in a single-slot cell
//! guarded by a mutex and a condition variable.  The editor thread drains
//! the slot through [`NonblockingReader::read`] or inspects it through
//! [`NonblockingReader::peek`]; it never touches the source directly while
//! the helper is active.
//!
//! When the helper is constructed disabled, no thread is spawned and `read`
//! pulls from the source inline; `peek` then always reports a timeout and
//! [`NonblockingReader::is_nonblocking_enabled`] returns `false`.
//!
//! Closing the underlying source makes `read` return `None` (EOF).
//! [`NonblockingReader::shutdown`] is idempotent; a thread blocked inside
//! the source's `read` call exits at the next byte or EOF.

use std::io::Read;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ── Peek ──────────────────────────────────────────────────────────────────────

/// Result of a [`NonblockingReader::peek`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peek {
    /// The next byte, left in place for a subsequent `read`.
    Byte(u8),
    /// The source is exhausted.
    Eof,
    /// No byte arrived within the timeout (or peeking is disabled).
    TimedOut,
}

// ── Shared slot ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Slot {
    byte: Option<u8>,
    eof: bool,
    /// The consumer wants a byte; the reader thread should fetch one.
    want: bool,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    cond: Condvar,
}

// ── NonblockingReader ─────────────────────────────────────────────────────────

/// Byte source with a timed peek, backed by a background reader thread.
pub struct NonblockingReader {
    shared: Option<Arc<Shared>>,
    direct: Option<Box<dyn Read + Send>>,
}

impl NonblockingReader {
    /// Wrap `source`.  When `enabled` is false the helper thread is not
    /// started and reads go straight to the source.
    pub fn new(source: Box<dyn Read + Send>, enabled: bool) -> Self {
        if !enabled {
            return Self {
                shared: None,
                direct: Some(source),
            };
        }
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            cond: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        thread::spawn(move || reader_loop(source, thread_shared));
        Self {
            shared: Some(shared),
            direct: None,
        }
    }

    /// Whether the timed [`NonblockingReader::peek`] is available.
    pub fn is_nonblocking_enabled(&self) -> bool {
        self.shared.is_some()
    }

    /// Read the next byte, blocking until one arrives.  `None` means EOF.
    pub fn read(&mut self) -> Option<u8> {
        let Some(shared) = &self.shared else {
            return self.read_direct();
        };
        let mut slot = match shared.slot.lock() {
            Ok(s) => s,
            Err(_) => return None,
        };
        loop {
            if let Some(b) = slot.byte.take() {
                shared.cond.notify_all();
                return Some(b);
            }
            if slot.eof {
                return None;
            }
            if !slot.want {
                slot.want = true;
                shared.cond.notify_all();
            }
            slot = match shared.cond.wait(slot) {
                Ok(s) => s,
                Err(_) => return None,
            };
        }
    }

    /// Look at the next byte without consuming it, waiting at most `timeout`.
    pub fn peek(&mut self, timeout: Duration) -> Peek {
        let Some(shared) = &self.shared else {
            return Peek::TimedOut;
        };
        let deadline = Instant::now() + timeout;
        let mut slot = match shared.slot.lock() {
            Ok(s) => s,
            Err(_) => return Peek::Eof,
        };
        loop {
            if let Some(b) = slot.byte {
                return Peek::Byte(b);
            }
            if slot.eof {
                return Peek::Eof;
            }
            if !slot.want {
                slot.want = true;
                shared.cond.notify_all();
            }
            let now = Instant::now();
            if now >= deadline {
                return Peek::TimedOut;
            }
            slot = match shared.cond.wait_timeout(slot, deadline - now) {
                Ok((s, _)) => s,
                Err(_) => return Peek::Eof,
            };
        }
    }

    /// Stop the background reader.  Idempotent; safe to call while the
    /// thread is blocked on the source (it exits at the next byte or EOF).
    pub fn shutdown(&mut self) {
        if let Some(shared) = &self.shared {
            if let Ok(mut slot) = shared.slot.lock() {
                slot.shutdown = true;
            }
            shared.cond.notify_all();
        }
    }

    fn read_direct(&mut self) -> Option<u8> {
        let src = self.direct.as_mut()?;
        let mut one = [0u8; 1];
        loop {
            match src.read(&mut one) {
                Ok(0) => return None,
                Ok(_) => return Some(one[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => return None,
            }
        }
    }
}

impl Drop for NonblockingReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Reader thread ─────────────────────────────────────────────────────────────

fn reader_loop(mut source: Box<dyn Read + Send>, shared: Arc<Shared>) {
    let mut one = [0u8; 1];
    loop {
        // Wait until a byte is wanted and the slot is free.
        {
            let mut slot = match shared.slot.lock() {
                Ok(s) => s,
                Err(_) => return,
            };
            loop {
                if slot.shutdown {
                    return;
                }
                if slot.want && slot.byte.is_none() {
                    break;
                }
                slot = match shared.cond.wait(slot) {
                    Ok(s) => s,
                    Err(_) => return,
                };
            }
        }

        // Block on the source outside the lock.
        let result = loop {
            match source.read(&mut one) {
                Ok(0) => break None,
                Ok(_) => break Some(one[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => break None,
            }
        };

        let mut slot = match shared.slot.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        match result {
            Some(b) => slot.byte = Some(b),
            None => slot.eof = true,
        }
        slot.want = false;
        let eof = slot.eof;
        shared.cond.notify_all();
        if eof {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
