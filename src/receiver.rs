//! Reader thread: decodes frames off the connection into the inbound queues.
use std::{
    io::Read,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, trace, warn};

use crate::{
    link::Link,
    protocol::{Frame, ProtocolTransport, Transport, TransportError},
    queue::Inbound,
};

pub struct Receiver<T: Transport> {
    transport: T,
    inbound: Arc<Inbound>,
    link: Arc<Link>,
    max_payload: usize,
    handle: Option<JoinHandle<()>>,
}

impl<T: Transport> Receiver<T> {
    pub fn new(transport: T, inbound: Arc<Inbound>, link: Arc<Link>, max_payload: usize) -> Self {
        Self {
            transport,
            inbound,
            link,
            max_payload,
            handle: None,
        }
    }

    /// Starts the reader thread on a clone of the transport.
    pub fn run(&mut self) -> Result<(), TransportError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let transport = ProtocolTransport::with_max_payload(
            self.transport.try_clone()?,
            self.max_payload,
        );
        let inbound = Arc::clone(&self.inbound);
        let link = Arc::clone(&self.link);

        let handle = thread::Builder::new()
            .name("protocon-receiver".to_string())
            .spawn(move || receive(transport, &inbound, &link))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Shuts the transport down to unblock the pending read, then joins.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.link.stop();
        if let Err(e) = self.transport.shutdown() {
            debug!("receiver shutdown: {e}");
        }
        if handle.join().is_err() {
            warn!("receiver thread panicked");
        }
    }
}

impl<T: Transport> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive<R: Read>(mut transport: ProtocolTransport<R>, inbound: &Inbound, link: &Link) {
    let reason = loop {
        match transport.read_frame() {
            Ok(frame) => {
                trace!("received frame: {frame:?}");
                if let Err(e) = route(frame, inbound) {
                    break e;
                }
            }
            Err(e) => break e,
        }
    };

    link.close();
    if link.is_stopping() {
        info!("receiver closed by shutdown");
    } else {
        warn!("receiver closed: {reason}");
    }
}

fn route(frame: Frame, inbound: &Inbound) -> Result<(), TransportError> {
    match frame {
        Frame::Request(r) => inbound.requests.push(r),
        Frame::Response(r) => inbound.responses.push(r),
        Frame::SignUpResponse(r) => inbound.sign_ups.push(r),
        Frame::SignInResponse(r) => inbound.sign_ins.push(r),
        frame @ (Frame::SignUpRequest(_) | Frame::SignInRequest(_)) => {
            return Err(TransportError::UnexpectedFrame(frame.tag()));
        }
    }
    Ok(())
}
