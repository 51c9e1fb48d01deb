//! Thread-safe FIFO queues shared between the application thread and the
//! reader/writer threads.
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::protocol::{
    RawRequest, RawResponse, RawSignInRequest, RawSignInResponse, RawSignUpRequest,
    RawSignUpResponse,
};

/// Mutex guarded FIFO. Ordering holds within one queue only.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Queue<T> {
    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // push/pop never leave the deque inconsistent, so poisoning is ignored.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Level-triggered wake-up flag for the writer thread.
#[derive(Debug, Default)]
pub struct Signal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn notify(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = true;
        self.cond.notify_all();
    }

    /// Blocks until notified or `timeout` elapses, then clears the flag.
    /// Returns `true` if a notification was consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !*pending {
            pending = self
                .cond
                .wait_timeout_while(pending, timeout, |pending| !*pending)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        std::mem::replace(&mut *pending, false)
    }
}

/// Frames decoded by the reader thread, waiting for `poll`.
#[derive(Debug, Default)]
pub struct Inbound {
    pub requests: Queue<RawRequest>,
    pub responses: Queue<RawResponse>,
    pub sign_ups: Queue<RawSignUpResponse>,
    pub sign_ins: Queue<RawSignInResponse>,
}

/// Frames waiting for the writer thread. Every push wakes the writer.
#[derive(Debug, Default)]
pub struct Outbound {
    pub requests: Queue<RawRequest>,
    pub responses: Queue<RawResponse>,
    pub sign_ups: Queue<RawSignUpRequest>,
    pub sign_ins: Queue<RawSignInRequest>,
    pub signal: Signal,
}

impl Outbound {
    pub fn push_request(&self, request: RawRequest) {
        self.requests.push(request);
        self.signal.notify();
    }

    pub fn push_response(&self, response: RawResponse) {
        self.responses.push(response);
        self.signal.notify();
    }

    pub fn push_sign_up(&self, sign_up: RawSignUpRequest) {
        self.sign_ups.push(sign_up);
        self.signal.notify();
    }

    pub fn push_sign_in(&self, sign_in: RawSignInRequest) {
        self.sign_ins.push(sign_in);
        self.signal.notify();
    }

    /// Frames not yet written, across all four queues.
    pub fn len(&self) -> usize {
        self.requests.len() + self.responses.len() + self.sign_ups.len() + self.sign_ins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
            && self.responses.is_empty()
            && self.sign_ups.is_empty()
            && self.sign_ins.is_empty()
    }
}
