//! Workers that serve accepted gateway connections against one shared session.
use std::{
    net::TcpStream,
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use super::{PeerError, Session};

/// Fixed set of worker threads, each serving one gateway connection at a time.
///
/// Streams queue up on a channel until a worker is free. Dropping the pool
/// closes the channel, lets the workers finish the connections they hold, and
/// joins them.
#[derive(Debug)]
pub struct ConnectionPool {
    workers: Vec<Worker>,
    streams: Option<mpsc::Sender<TcpStream>>,
}

impl ConnectionPool {
    pub fn new(size: usize, session: Arc<Session>) -> Result<Self, PeerError> {
        let (streams, backlog) = mpsc::channel();
        let backlog = Arc::new(Mutex::new(backlog));

        let workers = (0..size.max(1))
            .map(|id| Worker::spawn(id, Arc::clone(&backlog), Arc::clone(&session)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            workers,
            streams: Some(streams),
        })
    }

    /// Hands `stream` to the next free worker.
    pub fn dispatch(&self, stream: TcpStream) {
        let queued = self.streams.as_ref().map(|s| s.send(stream));
        if !matches!(queued, Some(Ok(()))) {
            warn!("connection pool is shut down, dropping connection");
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        drop(self.streams.take());

        for worker in self.workers.drain(..) {
            if worker.thread.join().is_err() {
                warn!("peer worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: JoinHandle<()>,
}

impl Worker {
    fn spawn(
        id: usize,
        backlog: Arc<Mutex<mpsc::Receiver<TcpStream>>>,
        session: Arc<Session>,
    ) -> Result<Self, PeerError> {
        let thread = thread::Builder::new()
            .name(format!("protocon-peer-{id}"))
            .spawn(move || {
                loop {
                    let next = backlog
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    let Ok(stream) = next else {
                        debug!("peer worker {id} done");
                        break;
                    };

                    let address = stream.peer_addr().map(|a| a.to_string());
                    let address = address.unwrap_or_else(|_| "unknown address".into());
                    match session.serve(stream) {
                        Ok(()) => info!("gateway {address} disconnected"),
                        Err(e) => warn!("gateway {address} failed: {e}"),
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}
