//! Gateway orchestration.
//!
//! A [`Gateway`] multiplexes many logical clients over one connection. It owns
//! the inbound and outbound queues, the client registry and the correlation
//! table, and drives a reader and a writer thread per connection.
//!
//! # Threads
//!
//! The application thread owns the gateway and is the only caller of
//! [`Gateway::send`], [`Gateway::poll`] and [`Gateway::create_client_token`].
//! Handlers and response callbacks run on that thread, inside `poll`. The
//! reader and writer threads only touch the queues.
//!
//! # Handshake
//!
//! On [`Gateway::run`] every client with a known id is signed in and every
//! anonymous client is signed up. A successful sign-up is followed at once by
//! a sign-in for the new id. Outcomes are reported through the handler set
//! with [`GatewayBuilder::with_handshake_handler`].
//!
//! # Example
//! ```rust,no_run
//! use protocon::{GatewayBuilder, Request, Response};
//!
//! let mut gateway = GatewayBuilder::new(2)
//!     .with_request_handler(0x0001, |_token, _request| Response::new(0, 0, "{}"))
//!     .build();
//! let token = gateway.create_client_token(0);
//!
//! gateway.run("127.0.0.1", 8082).unwrap();
//! loop {
//!     gateway.poll().unwrap();
//!     if gateway.client_id(token).is_ok() {
//!         gateway
//!             .send(token, Request::new(0, 0x0004, "{}"), |response| {
//!                 println!("status {}", response.status)
//!             })
//!             .unwrap();
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(200));
//! }
//! gateway.stop();
//! ```
mod builder;

use std::{collections::HashMap, net::TcpStream, sync::Arc, time::Duration};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    correlation::{CorrelationError, CorrelationTable},
    link::Link,
    protocol::{
        RawRequest, RawResponse, RawSignInRequest, RawSignInResponse, RawSignUpRequest,
        RawSignUpResponse, Request, Response, STATUS_OK, Transport, TransportError,
    },
    queue::{Inbound, Outbound},
    receiver::Receiver,
    registry::{ANONYMOUS_CLIENT_ID, ClientRegistry, ClientState, ClientToken, RegistryError},
    sender::Sender,
};

pub use builder::GatewayBuilder;

/// Handles one inbound request type on behalf of the addressed client.
pub type RequestHandler = Box<dyn FnMut(ClientToken, &Request) -> Response + Send + 'static>;

pub type HandshakeHandler = Box<dyn FnMut(HandshakeEvent) + Send + 'static>;

/// Outcome of a sign-up or sign-in exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    SignedUp { token: ClientToken, client_id: u64 },
    /// The peer refused the sign-up, or accepted it (`status` zero) without
    /// assigning a client id.
    SignUpFailed { token: ClientToken, status: u8 },
    SignedIn { token: ClientToken, client_id: u64 },
    SignInFailed {
        token: ClientToken,
        client_id: u64,
        status: u8,
    },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("gateway is not running")]
    NotRunning,
    #[error("gateway is already running")]
    AlreadyRunning,
    #[error("{0} is not registered")]
    UnknownClient(ClientToken),
    #[error("no token for client id {0}")]
    UnknownClientId(u64),
    #[error("no handler for request type 0x{0:04x}")]
    UnknownRequestType(u16),
    #[error("response for unknown command id {0}")]
    UnknownCorrelation(u16),
    #[error("too many requests in flight")]
    CorrelationTableFull,
    #[error("sign-up response {0} with no client awaiting sign-up")]
    UnexpectedSignUp(u16),
    #[error("sign-in response for unknown command id {0}")]
    UnexpectedSignIn(u16),
    #[error("payload of {length} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { length: usize, max: usize },
}

impl From<RegistryError> for GatewayError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownClient(token) => GatewayError::UnknownClient(token),
        }
    }
}

impl From<CorrelationError> for GatewayError {
    fn from(value: CorrelationError) -> Self {
        match value {
            CorrelationError::Unknown(id) | CorrelationError::Duplicate(id) => {
                GatewayError::UnknownCorrelation(id)
            }
            CorrelationError::Full => GatewayError::CorrelationTableFull,
        }
    }
}

/// Per-connection state: queues, liveness and the two I/O threads.
struct Connection<T: Transport> {
    inbound: Arc<Inbound>,
    outbound: Arc<Outbound>,
    link: Arc<Link>,
    receiver: Receiver<T>,
    sender: Sender<T>,
}

pub struct Gateway<T: Transport = TcpStream> {
    api_version: u16,
    gateway_id: u64,
    poll_interval: Duration,
    max_payload: usize,
    handlers: HashMap<u16, RequestHandler>,
    on_handshake: Option<HandshakeHandler>,
    registry: ClientRegistry,
    correlation: CorrelationTable,
    connection: Option<Connection<T>>,
}

impl Gateway<TcpStream> {
    /// Connects to `host:port` and starts the connection. See [`Gateway::run_with`].
    pub fn run(&mut self, host: &str, port: u16) -> Result<(), GatewayError> {
        if self.connection.is_some() {
            return Err(GatewayError::AlreadyRunning);
        }

        let stream = TcpStream::connect((host, port)).map_err(TransportError::from)?;
        info!("connected to {host}:{port}");
        self.run_with(stream)
    }
}

impl<T: Transport> Gateway<T> {
    /// Starts the reader and writer threads over `transport` and queues the
    /// sign-up/sign-in handshake for every client.
    pub fn run_with(&mut self, transport: T) -> Result<(), GatewayError> {
        if self.connection.is_some() {
            return Err(GatewayError::AlreadyRunning);
        }

        self.correlation.clear();
        let inbound = Arc::new(Inbound::default());
        let outbound = Arc::new(Outbound::default());
        let link = Arc::new(Link::new());

        let mut receiver = Receiver::new(
            transport.try_clone().map_err(TransportError::from)?,
            Arc::clone(&inbound),
            Arc::clone(&link),
            self.max_payload,
        );
        let mut sender = Sender::new(
            transport,
            Arc::clone(&outbound),
            Arc::clone(&link),
            self.poll_interval,
        );
        receiver.run()?;
        sender.run()?;

        self.connection = Some(Connection {
            inbound,
            outbound,
            link,
            receiver,
            sender,
        });
        self.bootstrap();
        Ok(())
    }

    /// Shuts the connection down and joins both I/O threads. Requests still
    /// awaiting a response are dropped without their callbacks running.
    pub fn stop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        connection.receiver.stop();
        connection.sender.stop();
        if !connection.outbound.is_empty() {
            debug!("discarding {} unsent frames", connection.outbound.len());
        }

        let abandoned = self.correlation.clear();
        if abandoned > 0 {
            warn!("abandoned {abandoned} requests awaiting a response");
        }
        self.registry.reset_sessions();
        info!("gateway stopped");
    }

    /// True while both I/O threads of a started connection are alive.
    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.link.is_open())
    }

    /// Allocates a token for a new client. Zero means the client still has to
    /// sign up; any other value is a client id from an earlier registration.
    pub fn create_client_token(&mut self, client_id: u64) -> ClientToken {
        let token = self.registry.create(client_id);
        if self.connection.is_some() {
            if client_id == ANONYMOUS_CLIENT_ID {
                self.sign_up();
            } else {
                self.sign_in(token, client_id);
            }
        }
        token
    }

    pub fn client_id(&self, token: ClientToken) -> Result<u64, GatewayError> {
        Ok(self.registry.client_id(token)?)
    }

    pub fn client_state(&self, token: ClientToken) -> Option<ClientState> {
        self.registry.state(token)
    }

    pub fn token_for(&self, client_id: u64) -> Option<ClientToken> {
        self.registry.token_for(client_id)
    }

    /// Queues `request` on behalf of `token`. `on_response` runs inside a later
    /// [`Gateway::poll`] once the peer answers. Returns the command id used.
    pub fn send<F>(
        &mut self,
        token: ClientToken,
        request: Request,
        on_response: F,
    ) -> Result<u16, GatewayError>
    where
        F: FnOnce(&Response) + Send + 'static,
    {
        let Some(connection) = &self.connection else {
            return Err(GatewayError::NotRunning);
        };
        if !connection.link.is_open() {
            return Err(TransportError::Closed.into());
        }
        let client_id = self.registry.client_id(token)?;
        if request.data.len() > self.max_payload {
            return Err(GatewayError::PayloadTooLarge {
                length: request.data.len(),
                max: self.max_payload,
            });
        }

        let cmd_id = self.correlation.allocate(Box::new(on_response))?;
        debug!("{token} sending request type {} as command {cmd_id}", request.kind);
        connection.outbound.push_request(RawRequest {
            cmd_id,
            gateway_id: self.gateway_id,
            client_id,
            api_version: self.api_version,
            request,
        });
        Ok(cmd_id)
    }

    /// Handles every frame the reader has queued so far, without blocking.
    ///
    /// Returns how many frames were handled. A frame that cannot be dispatched
    /// is dropped and its error returned; frames behind it stay queued for the
    /// next call.
    pub fn poll(&mut self) -> Result<usize, GatewayError> {
        let Some(connection) = &self.connection else {
            return Ok(0);
        };
        let inbound = Arc::clone(&connection.inbound);
        let outbound = Arc::clone(&connection.outbound);

        let mut handled = 0;
        while let Some(raw) = inbound.requests.pop() {
            handled += 1;
            self.on_request(raw, &outbound)?;
        }
        while let Some(raw) = inbound.responses.pop() {
            handled += 1;
            self.on_response(raw)?;
        }
        while let Some(raw) = inbound.sign_ups.pop() {
            handled += 1;
            self.on_sign_up(raw)?;
        }
        while let Some(raw) = inbound.sign_ins.pop() {
            handled += 1;
            self.on_sign_in(raw)?;
        }
        Ok(handled)
    }

    fn bootstrap(&mut self) {
        for (token, client_id) in self.registry.known() {
            self.sign_in(token, client_id);
        }
        for _ in self.registry.anonymous() {
            self.sign_up();
        }
    }

    fn sign_up(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };
        let cmd_id = self.correlation.next_id();
        debug!("sending sign-up as command {cmd_id}");
        connection.outbound.push_sign_up(RawSignUpRequest {
            cmd_id,
            gateway_id: self.gateway_id,
        });
    }

    fn sign_in(&mut self, token: ClientToken, client_id: u64) {
        let Some(connection) = &self.connection else {
            return;
        };
        let cmd_id = self.correlation.next_id();
        self.registry.begin_sign_in(cmd_id, token);
        debug!("{token} signing in as client {client_id}, command {cmd_id}");
        connection.outbound.push_sign_in(RawSignInRequest {
            cmd_id,
            gateway_id: self.gateway_id,
            client_id,
        });
    }

    fn on_request(&mut self, raw: RawRequest, outbound: &Outbound) -> Result<(), GatewayError> {
        let token = self
            .registry
            .token_for(raw.client_id)
            .filter(|token| self.registry.client_id(*token).is_ok())
            .ok_or(GatewayError::UnknownClientId(raw.client_id))?;
        let handler = self
            .handlers
            .get_mut(&raw.request.kind)
            .ok_or(GatewayError::UnknownRequestType(raw.request.kind))?;

        let response = handler(token, &raw.request);
        if response.data.len() > self.max_payload {
            return Err(GatewayError::PayloadTooLarge {
                length: response.data.len(),
                max: self.max_payload,
            });
        }
        outbound.push_response(RawResponse {
            cmd_id: raw.cmd_id,
            response,
        });
        Ok(())
    }

    fn on_response(&mut self, raw: RawResponse) -> Result<(), GatewayError> {
        let handler = self.correlation.resolve(raw.cmd_id)?;
        handler(&raw.response);
        Ok(())
    }

    fn on_sign_up(&mut self, raw: RawSignUpResponse) -> Result<(), GatewayError> {
        if raw.status == STATUS_OK && raw.client_id != ANONYMOUS_CLIENT_ID {
            let token = self
                .registry
                .complete_sign_up(raw.client_id)
                .ok_or(GatewayError::UnexpectedSignUp(raw.cmd_id))?;
            info!("{token} signed up as client {}", raw.client_id);
            self.report(HandshakeEvent::SignedUp {
                token,
                client_id: raw.client_id,
            });
            self.sign_in(token, raw.client_id);
        } else {
            let token = self
                .registry
                .reject_sign_up()
                .ok_or(GatewayError::UnexpectedSignUp(raw.cmd_id))?;
            if raw.status == STATUS_OK {
                warn!("{token} sign-up accepted without a client id");
            } else {
                warn!("{token} sign-up refused with status {}", raw.status);
            }
            self.report(HandshakeEvent::SignUpFailed {
                token,
                status: raw.status,
            });
        }
        Ok(())
    }

    fn on_sign_in(&mut self, raw: RawSignInResponse) -> Result<(), GatewayError> {
        let accepted = raw.status == STATUS_OK;
        let (token, client_id) = self
            .registry
            .complete_sign_in(raw.cmd_id, accepted)
            .ok_or(GatewayError::UnexpectedSignIn(raw.cmd_id))?;

        if accepted {
            info!("{token} signed in as client {client_id}");
            self.report(HandshakeEvent::SignedIn { token, client_id });
        } else {
            warn!("{token} sign-in as client {client_id} refused with status {}", raw.status);
            self.report(HandshakeEvent::SignInFailed {
                token,
                client_id,
                status: raw.status,
            });
        }
        Ok(())
    }

    fn report(&mut self, event: HandshakeEvent) {
        if let Some(handler) = self.on_handshake.as_mut() {
            handler(event);
        }
    }
}

impl<T: Transport> Drop for Gateway<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::{io, net::TcpListener, sync::Mutex, thread, time::Instant};

    use crate::protocol::{Frame, ProtocolTransport};

    use super::*;

    /// Far end of a loopback connection, speaking frames.
    struct Peer {
        transport: ProtocolTransport<TcpStream>,
    }

    impl Peer {
        fn expect(&mut self) -> Frame {
            self.transport.read_frame().unwrap()
        }

        fn expect_nothing(&mut self) {
            self.transport
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(300)))
                .unwrap();
            assert!(self.transport.read_frame().is_err());
        }

        fn reply(&mut self, frame: impl Into<Frame>) {
            self.transport.write_frame(&frame.into()).unwrap();
        }
    }

    fn connect(gateway: &mut Gateway) -> Peer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (remote, _) = listener.accept().unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        gateway.run_with(local).unwrap();
        Peer {
            transport: ProtocolTransport::new(remote),
        }
    }

    fn poll_until(gateway: &mut Gateway, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut handled = 0;
        while handled < expected {
            assert!(Instant::now() < deadline, "only {handled} frames handled");
            handled += gateway.poll().unwrap();
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn poll_error(gateway: &mut Gateway) -> GatewayError {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match gateway.poll() {
                Err(e) => return e,
                Ok(_) => assert!(Instant::now() < deadline, "poll never failed"),
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<HandshakeEvent>>>, GatewayBuilder) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let builder = GatewayBuilder::new(2)
            .with_gateway_id(7)
            .with_handshake_handler(move |e| sink.lock().unwrap().push(e));
        (events, builder)
    }

    #[test]
    fn sign_up_chains_into_sign_in() {
        let (events, builder) = recorder();
        let mut gateway = builder.build();
        let token = gateway.create_client_token(0);
        let mut peer = connect(&mut gateway);

        let Frame::SignUpRequest(sign_up) = peer.expect() else {
            panic!("expected sign-up");
        };
        assert_eq!(sign_up.gateway_id, 7);

        peer.reply(RawSignUpResponse {
            cmd_id: sign_up.cmd_id,
            client_id: 42,
            status: 0,
        });
        poll_until(&mut gateway, 1);

        assert_eq!(gateway.client_state(token), Some(ClientState::Registered));
        assert_eq!(gateway.client_id(token).unwrap(), 42);

        let Frame::SignInRequest(sign_in) = peer.expect() else {
            panic!("expected sign-in");
        };
        assert_eq!(sign_in.client_id, 42);
        assert_eq!(sign_in.gateway_id, 7);
        assert_ne!(sign_in.cmd_id, sign_up.cmd_id);
        peer.expect_nothing();

        peer.reply(RawSignInResponse {
            cmd_id: sign_in.cmd_id,
            status: 0,
        });
        poll_until(&mut gateway, 1);

        assert_eq!(gateway.client_state(token), Some(ClientState::Active));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                HandshakeEvent::SignedUp {
                    token,
                    client_id: 42
                },
                HandshakeEvent::SignedIn {
                    token,
                    client_id: 42
                },
            ]
        );
    }

    #[test]
    fn refused_sign_up_leaves_token_unusable() {
        let (events, builder) = recorder();
        let mut gateway = builder.build();
        let token = gateway.create_client_token(0);
        let mut peer = connect(&mut gateway);

        let Frame::SignUpRequest(sign_up) = peer.expect() else {
            panic!("expected sign-up");
        };
        peer.reply(RawSignUpResponse {
            cmd_id: sign_up.cmd_id,
            client_id: 42,
            status: 1,
        });
        poll_until(&mut gateway, 1);

        assert_eq!(gateway.client_state(token), Some(ClientState::Rejected));
        assert_eq!(gateway.token_for(42), None);
        assert!(matches!(
            gateway.send(token, Request::default(), |_| {}),
            Err(GatewayError::UnknownClient(t)) if t == token
        ));
        assert_eq!(
            *events.lock().unwrap(),
            vec![HandshakeEvent::SignUpFailed { token, status: 1 }]
        );
        peer.expect_nothing();
    }

    #[test]
    fn sign_up_without_client_id_is_refused() {
        let (events, builder) = recorder();
        let mut gateway = builder.build();
        let token = gateway.create_client_token(0);
        let mut peer = connect(&mut gateway);

        let Frame::SignUpRequest(sign_up) = peer.expect() else {
            panic!("expected sign-up");
        };
        peer.reply(RawSignUpResponse {
            cmd_id: sign_up.cmd_id,
            client_id: ANONYMOUS_CLIENT_ID,
            status: STATUS_OK,
        });
        poll_until(&mut gateway, 1);

        assert_eq!(gateway.client_state(token), Some(ClientState::Rejected));
        assert_eq!(gateway.token_for(ANONYMOUS_CLIENT_ID), None);
        assert!(gateway.client_id(token).is_err());
        assert_eq!(
            *events.lock().unwrap(),
            vec![HandshakeEvent::SignUpFailed {
                token,
                status: STATUS_OK
            }]
        );
        peer.expect_nothing();
    }

    #[test]
    fn known_client_signs_in_on_run() {
        let (events, builder) = recorder();
        let mut gateway = builder.with_client_id(5).build();
        let token = gateway.token_for(5).unwrap();
        let mut peer = connect(&mut gateway);

        let Frame::SignInRequest(sign_in) = peer.expect() else {
            panic!("expected sign-in");
        };
        assert_eq!(sign_in.client_id, 5);

        peer.reply(RawSignInResponse {
            cmd_id: sign_in.cmd_id,
            status: 3,
        });
        poll_until(&mut gateway, 1);

        assert_eq!(gateway.client_state(token), Some(ClientState::Rejected));
        assert_eq!(
            *events.lock().unwrap(),
            vec![HandshakeEvent::SignInFailed {
                token,
                client_id: 5,
                status: 3
            }]
        );
    }

    #[test]
    fn requests_for_rejected_client_are_refused() {
        let mut gateway = GatewayBuilder::new(2)
            .with_client_id(5)
            .with_request_handler(0x0001, |_, _| Response::default())
            .build();
        let mut peer = connect(&mut gateway);

        let Frame::SignInRequest(sign_in) = peer.expect() else {
            panic!("expected sign-in");
        };
        peer.reply(RawSignInResponse {
            cmd_id: sign_in.cmd_id,
            status: 1,
        });
        poll_until(&mut gateway, 1);

        peer.reply(RawRequest {
            cmd_id: 40,
            gateway_id: 0,
            client_id: 5,
            api_version: 2,
            request: Request::new(0, 0x0001, ""),
        });
        assert!(matches!(
            poll_error(&mut gateway),
            GatewayError::UnknownClientId(5)
        ));
        peer.expect_nothing();
    }

    #[test]
    fn oversized_handler_response_is_not_sent() {
        let mut gateway = GatewayBuilder::new(2)
            .with_client_id(3)
            .with_max_payload(4)
            .with_request_handler(0x0001, |_, _| Response::new(0, 0, "too long"))
            .build();
        let mut peer = connect(&mut gateway);
        assert!(matches!(peer.expect(), Frame::SignInRequest(_)));

        peer.reply(RawRequest {
            cmd_id: 41,
            gateway_id: 0,
            client_id: 3,
            api_version: 2,
            request: Request::new(0, 0x0001, ""),
        });
        assert!(matches!(
            poll_error(&mut gateway),
            GatewayError::PayloadTooLarge { length: 8, max: 4 }
        ));
        peer.expect_nothing();
        assert!(gateway.is_open());
    }

    #[test]
    fn token_created_while_running_is_signed_up() {
        let mut gateway = GatewayBuilder::new(1).build();
        let mut peer = connect(&mut gateway);

        gateway.create_client_token(0);
        assert!(matches!(peer.expect(), Frame::SignUpRequest(_)));

        gateway.create_client_token(9);
        let Frame::SignInRequest(sign_in) = peer.expect() else {
            panic!("expected sign-in");
        };
        assert_eq!(sign_in.client_id, 9);
    }

    #[test]
    fn responses_reach_their_own_callbacks() {
        let mut gateway = GatewayBuilder::new(2).with_client_id(3).build();
        let token = gateway.token_for(3).unwrap();
        let mut peer = connect(&mut gateway);
        assert!(matches!(peer.expect(), Frame::SignInRequest(_)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sent = Vec::new();
        for i in 0..3u8 {
            let seen = Arc::clone(&seen);
            let cmd_id = gateway
                .send(token, Request::new(0, 1, vec![i]), move |r: &Response| {
                    seen.lock().unwrap().push((i, r.data.clone()))
                })
                .unwrap();
            sent.push(cmd_id);
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            let Frame::Request(raw) = peer.expect() else {
                panic!("expected request");
            };
            assert_eq!(raw.client_id, 3);
            assert_eq!(raw.api_version, 2);
            received.push(raw);
        }
        assert_eq!(
            received.iter().map(|r| r.cmd_id).collect::<Vec<_>>(),
            sent
        );

        for raw in received.iter().rev() {
            peer.reply(RawResponse {
                cmd_id: raw.cmd_id,
                response: Response::new(0, 0, raw.request.data.clone()),
            });
        }
        poll_until(&mut gateway, 3);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![(0, vec![0]), (1, vec![1]), (2, vec![2])]);
    }

    #[test]
    fn inbound_request_is_answered_with_same_cmd_id() {
        let mut gateway = GatewayBuilder::new(2)
            .with_client_id(3)
            .with_request_handler(0x0001, |token, request| {
                let mut data = request.data.clone();
                data.push(token.value() as u8);
                Response::new(request.time, 0, data)
            })
            .build();
        let mut peer = connect(&mut gateway);
        assert!(matches!(peer.expect(), Frame::SignInRequest(_)));

        peer.reply(RawRequest {
            cmd_id: 77,
            gateway_id: 0,
            client_id: 3,
            api_version: 2,
            request: Request::new(1000, 0x0001, "x"),
        });
        poll_until(&mut gateway, 1);

        assert_eq!(
            peer.expect(),
            Frame::Response(RawResponse {
                cmd_id: 77,
                response: Response::new(1000, 0, vec![b'x', 0]),
            })
        );
    }

    #[test]
    fn undeliverable_frames_are_dropped_with_error() {
        let mut gateway = GatewayBuilder::new(2).with_client_id(3).build();
        let mut peer = connect(&mut gateway);
        assert!(matches!(peer.expect(), Frame::SignInRequest(_)));

        peer.reply(RawResponse {
            cmd_id: 99,
            response: Response::default(),
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match gateway.poll() {
                Err(e) => break e,
                Ok(_) => assert!(Instant::now() < deadline),
            }
            thread::sleep(Duration::from_millis(5));
        };
        assert!(matches!(err, GatewayError::UnknownCorrelation(99)));

        peer.reply(RawRequest {
            cmd_id: 1,
            gateway_id: 0,
            client_id: 3,
            api_version: 2,
            request: Request::new(0, 0x0fff, ""),
        });
        let err = loop {
            match gateway.poll() {
                Err(e) => break e,
                Ok(_) => assert!(Instant::now() < deadline),
            }
            thread::sleep(Duration::from_millis(5));
        };
        assert!(matches!(err, GatewayError::UnknownRequestType(0x0fff)));
        assert_eq!(gateway.poll().unwrap(), 0);
        assert!(gateway.is_open());
    }

    #[test]
    fn send_requires_running_gateway_and_registered_token() {
        let mut gateway = GatewayBuilder::new(2).with_max_payload(4).build();
        let anonymous = gateway.create_client_token(0);
        let known = gateway.create_client_token(8);

        assert!(matches!(
            gateway.send(known, Request::default(), |_| {}),
            Err(GatewayError::NotRunning)
        ));

        let _peer = connect(&mut gateway);
        assert!(matches!(
            gateway.send(anonymous, Request::default(), |_| {}),
            Err(GatewayError::UnknownClient(_))
        ));
        assert!(matches!(
            gateway.send(known, Request::new(0, 1, "too long"), |_| {}),
            Err(GatewayError::PayloadTooLarge { length: 8, max: 4 })
        ));
        // Command 1 went to the sign-in, 2 to the sign-up.
        assert_eq!(gateway.send(known, Request::new(0, 1, "ok"), |_| {}).unwrap(), 3);
    }

    #[test]
    fn run_twice_is_rejected() {
        let mut gateway = GatewayBuilder::new(2).build();
        let _peer = connect(&mut gateway);

        let (other, _) = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
            (stream, listener.accept().unwrap())
        };
        assert!(matches!(
            gateway.run_with(other),
            Err(GatewayError::AlreadyRunning)
        ));
    }

    #[test]
    fn run_reports_connect_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut gateway = GatewayBuilder::new(2).build();

        let err = gateway.run("127.0.0.1", port).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transport(TransportError::Io(ref e))
                if e.kind() == io::ErrorKind::ConnectionRefused
        ));
        assert!(!gateway.is_open());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut gateway = GatewayBuilder::new(2).with_client_id(1).build();
        let token = gateway.token_for(1).unwrap();
        let mut peer = connect(&mut gateway);
        assert!(matches!(peer.expect(), Frame::SignInRequest(_)));
        gateway.send(token, Request::default(), |_| {}).unwrap();
        assert!(gateway.is_open());

        gateway.stop();
        gateway.stop();

        assert!(!gateway.is_open());
        assert!(gateway.correlation.is_empty());
        assert_eq!(gateway.poll().unwrap(), 0);
    }

    #[test]
    fn peer_disconnect_closes_link() {
        let mut gateway = GatewayBuilder::new(2).with_client_id(1).build();
        let token = gateway.token_for(1).unwrap();
        let peer = connect(&mut gateway);
        drop(peer);

        let deadline = Instant::now() + Duration::from_secs(5);
        while gateway.is_open() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        assert!(matches!(
            gateway.send(token, Request::default(), |_| {}),
            Err(GatewayError::Transport(TransportError::Closed))
        ));
        assert!(gateway.correlation.is_empty());
        gateway.stop();
    }
}
