use std::{collections::HashMap, time::Duration};

use crate::{
    protocol::{Request, Response, Transport, codec::DEFAULT_MAX_PAYLOAD},
    registry::{ClientRegistry, ClientToken},
    sender::DEFAULT_POLL_INTERVAL,
};

use super::{Gateway, HandshakeEvent, HandshakeHandler, RequestHandler};

/// Collects handlers and settings before a [`Gateway`] is started.
///
/// # Example
/// ```rust
/// use protocon::{GatewayBuilder, Response};
///
/// let mut gateway = GatewayBuilder::new(2)
///     .with_gateway_id(7)
///     .with_request_handler(0x0001, |_token, _request| Response::new(0, 0, "{}"))
///     .build();
///
/// let token = gateway.create_client_token(0);
/// assert!(gateway.client_id(token).is_err());
/// ```
pub struct GatewayBuilder {
    api_version: u16,
    gateway_id: u64,
    handlers: HashMap<u16, RequestHandler>,
    client_ids: Vec<u64>,
    on_handshake: Option<HandshakeHandler>,
    poll_interval: Duration,
    max_payload: usize,
}

impl GatewayBuilder {
    pub fn new(api_version: u16) -> Self {
        Self {
            api_version,
            gateway_id: 0,
            handlers: HashMap::new(),
            client_ids: Vec::new(),
            on_handshake: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_gateway_id(mut self, gateway_id: u64) -> Self {
        self.gateway_id = gateway_id;
        self
    }

    /// Registers the handler for inbound requests of type `kind`. A later
    /// registration for the same type replaces the earlier one.
    pub fn with_request_handler<F>(mut self, kind: u16, handler: F) -> Self
    where
        F: FnMut(ClientToken, &Request) -> Response + Send + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Adds a client registered in an earlier session. It signs in directly,
    /// skipping sign-up. Look its token up with [`Gateway::token_for`].
    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_ids.push(client_id);
        self
    }

    pub fn with_handshake_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(HandshakeEvent) + Send + 'static,
    {
        self.on_handshake = Some(Box::new(handler));
        self
    }

    /// Longest time the idle writer sleeps between liveness checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Largest request or response payload accepted in either direction.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn build(self) -> Gateway {
        self.build_with_transport()
    }

    pub fn build_with_transport<T: Transport>(self) -> Gateway<T> {
        let mut registry = ClientRegistry::new();
        for client_id in self.client_ids.into_iter().filter(|id| *id != 0) {
            registry.create(client_id);
        }

        Gateway {
            api_version: self.api_version,
            gateway_id: self.gateway_id,
            poll_interval: self.poll_interval,
            max_payload: self.max_payload,
            handlers: self.handlers,
            on_handshake: self.on_handshake,
            registry,
            correlation: Default::default(),
            connection: None,
        }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}
