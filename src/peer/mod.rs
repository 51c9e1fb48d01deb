//! Reference peer for the gateway protocol.
//!
//! [`PeerServer`] is the far end a gateway connects to. It hands out client ids
//! on sign-up, accepts sign-ins for ids it knows, and answers every request by
//! echoing its payload. It can also greet each client that signs in with a
//! request of its own, which exercises the gateway's request handlers.
//!
//! Each gateway connection is served by a pool worker against one shared
//! session, so ids issued on one connection sign in on any other.
mod pool;

use std::{
    collections::HashSet,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    correlation::CommandIds,
    protocol::{
        Frame, ProtocolTransport, RawRequest, RawResponse, RawSignInResponse, RawSignUpResponse,
        Request, Response, STATUS_OK, TransportError,
    },
};

use pool::ConnectionPool;

/// Status sent back for a sign-in with an id the peer never issued.
pub const STATUS_UNKNOWN_CLIENT: u8 = 1;

const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client ids issued or accepted by the peer.
#[derive(Debug)]
struct Directory {
    next_client_id: u64,
    known: HashSet<u64>,
}

impl Default for Directory {
    fn default() -> Self {
        Self {
            next_client_id: 1,
            known: HashSet::new(),
        }
    }
}

impl Directory {
    fn issue(&mut self) -> u64 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.known.insert(id);
        id
    }

    fn knows(&self, client_id: u64) -> bool {
        self.known.contains(&client_id)
    }
}

#[derive(Debug, Clone)]
struct Greeting {
    kind: u16,
    data: Vec<u8>,
}

/// State shared by every connection the peer serves.
#[derive(Debug, Default)]
pub(crate) struct Session {
    directory: Mutex<Directory>,
    greeting: Option<Greeting>,
}

impl Session {
    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers frames from one gateway until it disconnects.
    pub(crate) fn serve(&self, stream: TcpStream) -> Result<(), PeerError> {
        let mut transport = ProtocolTransport::new(stream);
        let mut cmd_ids = CommandIds::default();

        loop {
            let frame = match transport.read_frame() {
                Ok(frame) => frame,
                Err(TransportError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            debug!("received frame: {frame:?}");

            match frame {
                Frame::SignUpRequest(r) => {
                    let client_id = self.directory().issue();
                    info!("gateway {} signed up client {client_id}", r.gateway_id);
                    transport.write_frame(&Frame::SignUpResponse(RawSignUpResponse {
                        cmd_id: r.cmd_id,
                        client_id,
                        status: STATUS_OK,
                    }))?;
                }
                Frame::SignInRequest(r) => {
                    let accepted = self.directory().knows(r.client_id);
                    let status = if accepted {
                        STATUS_OK
                    } else {
                        STATUS_UNKNOWN_CLIENT
                    };
                    info!("client {} sign-in status {status}", r.client_id);
                    transport.write_frame(&Frame::SignInResponse(RawSignInResponse {
                        cmd_id: r.cmd_id,
                        status,
                    }))?;

                    if let (true, Some(greeting)) = (accepted, &self.greeting) {
                        transport.write_frame(&Frame::Request(RawRequest {
                            cmd_id: cmd_ids.next_id(),
                            gateway_id: r.gateway_id,
                            client_id: r.client_id,
                            api_version: 0,
                            request: Request::now(greeting.kind, greeting.data.clone()),
                        }))?;
                    }
                }
                Frame::Request(r) => {
                    transport.write_frame(&Frame::Response(RawResponse {
                        cmd_id: r.cmd_id,
                        response: Response::now(STATUS_OK, r.request.data),
                    }))?;
                }
                Frame::Response(r) => {
                    info!(
                        "command {} answered with status {}",
                        r.cmd_id, r.response.status
                    );
                }
                frame => return Err(TransportError::UnexpectedFrame(frame.tag()).into()),
            }
        }
    }
}

pub struct PeerServer {
    listener: TcpListener,
    workers: usize,
    session: Session,
}

impl PeerServer {
    pub fn bind(address: SocketAddr) -> Result<Self, PeerError> {
        Self::with_workers(address, DEFAULT_WORKERS)
    }

    /// Binds with room for `workers` gateway connections served at once.
    pub fn with_workers(address: SocketAddr, workers: usize) -> Result<Self, PeerError> {
        Ok(Self {
            listener: TcpListener::bind(address)?,
            workers,
            session: Session::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PeerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts sign-ins for `client_id` as if it had been issued earlier.
    pub fn with_known_client(mut self, client_id: u64) -> Self {
        self.session
            .directory
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .known
            .insert(client_id);
        self
    }

    /// Sends a request of type `kind` to every client right after it signs in.
    pub fn with_greeting(mut self, kind: u16, data: impl Into<Vec<u8>>) -> Self {
        self.session.greeting = Some(Greeting {
            kind,
            data: data.into(),
        });
        self
    }

    pub fn listen(self) -> Result<(), PeerError> {
        info!("listening at {}", self.local_addr()?);
        let pool = ConnectionPool::new(self.workers, Arc::new(self.session))?;

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => pool.dispatch(stream),
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}
