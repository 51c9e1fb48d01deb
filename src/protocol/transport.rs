use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use thiserror::Error;

use super::{Frame, codec};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("unrecognized frame tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("payload of {length} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { length: usize, max: usize },
    #[error("unexpected frame tag 0x{0:02x} for this side of the connection")]
    UnexpectedFrame(u8),
}

/// A bidirectional byte stream that can be split across threads.
///
/// Clones share the underlying connection, and [`Transport::shutdown`] on any
/// handle unblocks pending reads and writes on all of them.
pub trait Transport: Read + Write + Send + Sized + 'static {
    fn try_clone(&self) -> io::Result<Self>;

    fn shutdown(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Frame level reader/writer over a raw stream.
pub struct ProtocolTransport<T> {
    stream: T,
    max_payload: usize,
}

impl<T> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_max_payload(stream, codec::DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(stream: T, max_payload: usize) -> Self {
        Self {
            stream,
            max_payload,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }
}

impl<T: Write> ProtocolTransport<T> {
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        codec::encode(frame, &mut self.stream)
    }
}

impl<T: Read> ProtocolTransport<T> {
    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        codec::decode(&mut self.stream, self.max_payload)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use crate::protocol::{RawResponse, RawSignUpRequest, Response};

    use super::*;

    #[test]
    fn read_write_sign_up() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let frame = Frame::SignUpRequest(RawSignUpRequest {
            cmd_id: 1,
            gateway_id: 7,
        });

        transport.write_frame(&frame).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(transport.read_frame().unwrap(), frame);
    }

    #[test]
    fn read_write_response() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let frame = Frame::Response(RawResponse {
            cmd_id: 12,
            response: Response::new(5, 0, "pong"),
        });

        transport.write_frame(&frame).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(transport.read_frame().unwrap(), frame);
    }

    #[test]
    fn read_from_empty_stream_is_closed() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));

        assert!(matches!(transport.read_frame(), Err(TransportError::Closed)));
    }

    #[test]
    fn tcp_shutdown_unblocks_clone() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let mut reader = Transport::try_clone(&client).unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        Transport::shutdown(&client).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }
}
