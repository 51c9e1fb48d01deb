//! Writer thread: drains the outbound queues onto the connection.
//!
//! Each cycle writes at most one frame from each queue, in the order request,
//! response, sign-up, sign-in, so a busy queue cannot starve the others. An
//! idle writer sleeps until a push wakes it or the poll interval elapses.
use std::{
    io::Write,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{info, trace, warn};

use crate::{
    link::Link,
    protocol::{Frame, ProtocolTransport, Transport, TransportError},
    queue::Outbound,
};

/// Upper bound on how long an idle writer sleeps between liveness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

pub struct Sender<T: Transport> {
    transport: T,
    outbound: Arc<Outbound>,
    link: Arc<Link>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl<T: Transport> Sender<T> {
    pub fn new(transport: T, outbound: Arc<Outbound>, link: Arc<Link>, interval: Duration) -> Self {
        Self {
            transport,
            outbound,
            link,
            interval,
            handle: None,
        }
    }

    pub fn run(&mut self) -> Result<(), TransportError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let transport = ProtocolTransport::new(self.transport.try_clone()?);
        let outbound = Arc::clone(&self.outbound);
        let link = Arc::clone(&self.link);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("protocon-sender".to_string())
            .spawn(move || send(transport, &outbound, &link, interval))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Signals the writer to exit and joins it. A writer blocked inside a
    /// write only returns once the transport is shut down.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.link.stop();
        self.outbound.signal.notify();
        if handle.join().is_err() {
            warn!("sender thread panicked");
        }
    }
}

impl<T: Transport> Drop for Sender<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send<W: Write>(
    mut transport: ProtocolTransport<W>,
    outbound: &Outbound,
    link: &Link,
    interval: Duration,
) {
    let mut failure = None;
    while link.is_open() && !link.is_stopping() {
        match cycle(&mut transport, outbound) {
            Ok(0) => {
                outbound.signal.wait(interval);
            }
            Ok(_) => {}
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    link.close();
    match failure {
        _ if link.is_stopping() => info!("sender closed by shutdown"),
        Some(e) => warn!("sender closed: {e}"),
        None => info!("sender closed: connection lost"),
    }
}

/// Writes at most one frame from each queue. Returns how many were written.
pub(crate) fn cycle<W: Write>(
    transport: &mut ProtocolTransport<W>,
    outbound: &Outbound,
) -> Result<usize, TransportError> {
    let mut written = 0;

    if let Some(r) = outbound.requests.pop() {
        write(transport, r.into())?;
        written += 1;
    }
    if let Some(r) = outbound.responses.pop() {
        write(transport, r.into())?;
        written += 1;
    }
    if let Some(r) = outbound.sign_ups.pop() {
        write(transport, r.into())?;
        written += 1;
    }
    if let Some(r) = outbound.sign_ins.pop() {
        write(transport, r.into())?;
        written += 1;
    }

    Ok(written)
}

fn write<W: Write>(
    transport: &mut ProtocolTransport<W>,
    frame: Frame,
) -> Result<(), TransportError> {
    trace!("sending frame: {frame:?}");
    transport.write_frame(&frame)
}
