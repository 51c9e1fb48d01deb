//! Command id allocation and response correlation.
//!
//! Every outbound message carries a 15-bit command id. Requests register the
//! callback for their reply under that id; the reply removes it again.
use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::Response;

/// Highest command id handed out before wrapping back to 1.
pub const MAX_CMD_ID: u16 = 0x7fff;

/// Callback run once, on the polling thread, when the matching response arrives.
pub type ResponseHandler = Box<dyn FnOnce(&Response) + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("no pending request for command id {0}")]
    Unknown(u16),
    #[error("command id {0} is already pending")]
    Duplicate(u16),
    #[error("all {MAX_CMD_ID} command ids are in flight")]
    Full,
}

/// Wrapping command id counter: 1, 2, ..., 0x7fff, 1, ...
#[derive(Debug, Clone)]
pub struct CommandIds {
    next: u16,
}

impl Default for CommandIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl CommandIds {
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = if id >= MAX_CMD_ID { 1 } else { id + 1 };
        id
    }
}

#[derive(Default)]
pub struct CorrelationTable {
    ids: CommandIds,
    pending: HashMap<u16, ResponseHandler>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next command id for a message that expects no correlated response.
    pub fn next_id(&mut self) -> u16 {
        self.ids.next_id()
    }

    /// Picks the next command id with no pending entry and registers `handler`
    /// under it.
    pub fn allocate(&mut self, handler: ResponseHandler) -> Result<u16, CorrelationError> {
        if self.pending.len() >= MAX_CMD_ID as usize {
            return Err(CorrelationError::Full);
        }

        loop {
            let id = self.ids.next_id();
            if !self.pending.contains_key(&id) {
                self.pending.insert(id, handler);
                return Ok(id);
            }
        }
    }

    pub fn register(
        &mut self,
        cmd_id: u16,
        handler: ResponseHandler,
    ) -> Result<(), CorrelationError> {
        if self.pending.contains_key(&cmd_id) {
            return Err(CorrelationError::Duplicate(cmd_id));
        }
        self.pending.insert(cmd_id, handler);
        Ok(())
    }

    pub fn resolve(&mut self, cmd_id: u16) -> Result<ResponseHandler, CorrelationError> {
        self.pending
            .remove(&cmd_id)
            .ok_or(CorrelationError::Unknown(cmd_id))
    }

    pub fn is_pending(&self, cmd_id: u16) -> bool {
        self.pending.contains_key(&cmd_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending handler without running it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let abandoned = self.pending.len();
        self.pending.clear();
        abandoned
    }
}
