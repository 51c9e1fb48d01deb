//! Client tokens and their server-assigned identities.
//!
//! A [`ClientToken`] is a local handle. The numeric client id behind it comes
//! from the peer through the sign-up handshake, or is supplied up front for
//! clients that registered in an earlier session.
//!
//! ```text
//! Anonymous --sign-up ok--> Registered --sign-in ok--> Active
//!     |                         |
//!     +------ refused ----------+------ refused -----> Rejected
//! ```
use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use log::warn;
use thiserror::Error;

/// Client id value meaning "not registered yet".
pub const ANONYMOUS_CLIENT_ID: u64 = 0;

/// Opaque handle to one logical client on a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientToken(u64);

impl ClientToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the peer to assign a client id.
    Anonymous,
    /// Client id known, sign-in not yet acknowledged.
    Registered,
    /// Signed in on the current connection.
    Active,
    /// Sign-up or sign-in refused by the peer. Never retried.
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is not registered")]
    UnknownClient(ClientToken),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    client_id: u64,
    state: ClientState,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_token: u64,
    entries: HashMap<ClientToken, Entry>,
    by_client_id: HashMap<u64, ClientToken>,
    awaiting_sign_up: VecDeque<ClientToken>,
    awaiting_sign_in: HashMap<u16, ClientToken>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a token. A non-zero `client_id` marks the client as already
    /// registered; zero queues it for sign-up.
    pub fn create(&mut self, client_id: u64) -> ClientToken {
        let token = ClientToken(self.next_token);
        self.next_token += 1;

        let state = if client_id == ANONYMOUS_CLIENT_ID {
            self.awaiting_sign_up.push_back(token);
            ClientState::Anonymous
        } else {
            self.bind(client_id, token);
            ClientState::Registered
        };

        self.entries.insert(token, Entry { client_id, state });
        token
    }

    /// Client id of a token that may send: registered, signing in or active.
    pub fn client_id(&self, token: ClientToken) -> Result<u64, RegistryError> {
        match self.entries.get(&token) {
            Some(Entry {
                client_id,
                state: ClientState::Registered | ClientState::Active,
            }) => Ok(*client_id),
            _ => Err(RegistryError::UnknownClient(token)),
        }
    }

    pub fn state(&self, token: ClientToken) -> Option<ClientState> {
        self.entries.get(&token).map(|e| e.state)
    }

    pub fn token_for(&self, client_id: u64) -> Option<ClientToken> {
        self.by_client_id.get(&client_id).copied()
    }

    /// Tokens still waiting for a client id, oldest first.
    pub fn anonymous(&self) -> Vec<ClientToken> {
        self.awaiting_sign_up.iter().copied().collect()
    }

    /// Every token holding a client id that has not been rejected, ordered by token.
    pub fn known(&self) -> Vec<(ClientToken, u64)> {
        let mut known: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.state, ClientState::Registered | ClientState::Active))
            .map(|(token, e)| (*token, e.client_id))
            .collect();
        known.sort();
        known
    }

    /// Binds `client_id` to the oldest token waiting for sign-up.
    pub fn complete_sign_up(&mut self, client_id: u64) -> Option<ClientToken> {
        let token = self.awaiting_sign_up.pop_front()?;
        self.bind(client_id, token);
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.client_id = client_id;
            entry.state = ClientState::Registered;
        }
        Some(token)
    }

    /// Marks the oldest token waiting for sign-up as rejected.
    pub fn reject_sign_up(&mut self) -> Option<ClientToken> {
        let token = self.awaiting_sign_up.pop_front()?;
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.state = ClientState::Rejected;
        }
        Some(token)
    }

    /// Records that the sign-in sent with `cmd_id` was on behalf of `token`.
    pub fn begin_sign_in(&mut self, cmd_id: u16, token: ClientToken) {
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.state = ClientState::Registered;
        }
        self.awaiting_sign_in.insert(cmd_id, token);
    }

    /// Settles the sign-in sent with `cmd_id`. Returns the token and its client id.
    pub fn complete_sign_in(&mut self, cmd_id: u16, accepted: bool) -> Option<(ClientToken, u64)> {
        let token = self.awaiting_sign_in.remove(&cmd_id)?;
        let entry = self.entries.get_mut(&token)?;
        entry.state = if accepted {
            ClientState::Active
        } else {
            ClientState::Rejected
        };
        Some((token, entry.client_id))
    }

    /// Forgets in-flight sign-ins and drops active sessions back to
    /// registered, as after a connection is torn down.
    pub fn reset_sessions(&mut self) {
        self.awaiting_sign_in.clear();
        for entry in self.entries.values_mut() {
            if entry.state == ClientState::Active {
                entry.state = ClientState::Registered;
            }
        }
    }

    fn bind(&mut self, client_id: u64, token: ClientToken) {
        if let Some(previous) = self.by_client_id.insert(client_id, token) {
            if previous != token {
                warn!("client id {client_id} moved from {previous} to {token}");
                if let Some(entry) = self.entries.get_mut(&previous) {
                    entry.state = ClientState::Rejected;
                }
            }
        }
    }
}
