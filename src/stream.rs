//! Streaming session lifecycle.
//!
//! A [`StreamSession`] owns the ordered event sequence for one streaming
//! response: `CONNECTING → STREAMING → {DONE | ERROR | CANCELLED}`.
//!
//! Every emitted event carries a monotonically increasing sequence
//! number; emission is serialized so delivered order matches assignment
//! order. The heartbeat runs on its own tokio task, independent of
//! generation progress, and is torn down exactly once on completion,
//! error, or client disconnect. Writes after teardown are silent no-ops
//! — a disconnected client must never crash the producer.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::{Domain, SourceSet, StreamEvent};

struct EmitState {
    seq: u64,
    active: bool,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

/// One streaming response in flight.
pub struct StreamSession {
    state: Mutex<EmitState>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Create a session and the receiving end the transport reads from.
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = std::sync::Arc::new(Self {
            state: Mutex::new(EmitState {
                seq: 0,
                active: true,
                tx,
            }),
            heartbeat: Mutex::new(None),
        });
        (session, rx)
    }

    /// Emit one event under the sequence lock. Returns false if the
    /// session is already closed or the receiver is gone (disconnect).
    fn emit(&self, build: impl FnOnce(u64) -> StreamEvent) -> bool {
        // A poisoned lock means a writer panicked mid-emit; treat the
        // session as closed rather than propagating the panic.
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if !state.active {
            return false;
        }
        let event = build(state.seq);
        state.seq += 1;
        if state.tx.send(event).is_err() {
            // Receiver dropped: the client disconnected. Suppress all
            // further writes.
            state.active = false;
            return false;
        }
        true
    }

    fn mark_closed(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let was_active = state.active;
        state.active = false;
        was_active
    }

    fn stop_heartbeat(&self) {
        if let Ok(mut heartbeat) = self.heartbeat.lock() {
            if let Some(handle) = heartbeat.take() {
                handle.abort();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().map(|state| state.active).unwrap_or(false)
    }

    /// Confirm the session and start the keep-alive timer.
    pub fn connect(self: &std::sync::Arc<Self>, context_id: String, heartbeat_every: Duration) {
        if !self.emit(|seq| StreamEvent::Connected { seq, context_id }) {
            return;
        }

        let session = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_every);
            // The immediate first tick would double up with `connected`.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !session.emit(|seq| StreamEvent::Heartbeat { seq }) {
                    break;
                }
            }
        });

        if let Ok(mut heartbeat) = self.heartbeat.lock() {
            *heartbeat = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Forward one produced fragment. No-op after teardown.
    pub fn send_content(&self, text: &str) {
        self.emit(|seq| StreamEvent::Content {
            seq,
            text: text.to_string(),
        });
    }

    /// Terminal success: one final summary event, then teardown.
    pub fn finish(&self, answer: String, sources: SourceSet, domain: Domain, confidence: f64) {
        self.emit(|seq| StreamEvent::Done {
            seq,
            answer,
            sources,
            domain,
            confidence,
        });
        self.close();
    }

    /// Terminal failure: one error event, then teardown.
    pub fn fail(&self, message: String) {
        self.emit(|seq| StreamEvent::Error { seq, message });
        self.close();
    }

    /// Idempotent teardown. Safe to call from any path — completion,
    /// error, or disconnect — any number of times.
    pub fn close(&self) {
        if self.mark_closed() {
            debug!("stream session closed");
        }
        self.stop_heartbeat();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
