/// Status value meaning success in responses and handshake replies.
pub const STATUS_OK: u8 = 0;

/// Reply to a [`Request`](super::Request), correlated through its command id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub time: u64,
    pub status: u8,
    pub data: Vec<u8>,
}

impl Response {
    pub fn new(time: u64, status: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            time,
            status,
            data: data.into(),
        }
    }

    /// Response stamped with the current time.
    pub fn now(status: u8, data: impl Into<Vec<u8>>) -> Self {
        Self::new(super::unix_time(), status, data)
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub cmd_id: u16,
    pub response: Response,
}

/// Registration reply; `client_id` is only meaningful when `status` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignUpResponse {
    pub cmd_id: u16,
    pub client_id: u64,
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignInResponse {
    pub cmd_id: u16,
    pub status: u8,
}
