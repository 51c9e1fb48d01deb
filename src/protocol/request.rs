/// Application request addressed to, or received from, a single client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Sender supplied timestamp, seconds since the epoch by convention.
    pub time: u64,
    /// Message type used to select the request handler.
    pub kind: u16,
    pub data: Vec<u8>,
}

impl Request {
    pub fn new(time: u64, kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            time,
            kind,
            data: data.into(),
        }
    }

    /// Request stamped with the current time.
    pub fn now(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self::new(super::unix_time(), kind, data)
    }
}

/// A [`Request`] together with the routing metadata carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub cmd_id: u16,
    pub gateway_id: u64,
    pub client_id: u64,
    pub api_version: u16,
    pub request: Request,
}

/// Registration request for an anonymous client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignUpRequest {
    pub cmd_id: u16,
    pub gateway_id: u64,
}

/// Login request activating a known client id on this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignInRequest {
    pub cmd_id: u16,
    pub gateway_id: u64,
    pub client_id: u64,
}
