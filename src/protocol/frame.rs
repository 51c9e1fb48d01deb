use super::{
    RawRequest, RawResponse, RawSignInRequest, RawSignInResponse, RawSignUpRequest,
    RawSignUpResponse,
};

pub const TAG_REQUEST: u8 = 0x00;
pub const TAG_SIGN_UP_REQUEST: u8 = 0x01;
pub const TAG_SIGN_IN_REQUEST: u8 = 0x02;
pub const TAG_RESPONSE: u8 = 0x80;
pub const TAG_SIGN_UP_RESPONSE: u8 = 0x81;
pub const TAG_SIGN_IN_RESPONSE: u8 = 0x82;

/// One complete unit on the wire, selected by its leading tag byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(RawRequest),
    Response(RawResponse),
    SignUpRequest(RawSignUpRequest),
    SignUpResponse(RawSignUpResponse),
    SignInRequest(RawSignInRequest),
    SignInResponse(RawSignInResponse),
}

impl Frame {
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Request(_) => TAG_REQUEST,
            Frame::Response(_) => TAG_RESPONSE,
            Frame::SignUpRequest(_) => TAG_SIGN_UP_REQUEST,
            Frame::SignUpResponse(_) => TAG_SIGN_UP_RESPONSE,
            Frame::SignInRequest(_) => TAG_SIGN_IN_REQUEST,
            Frame::SignInResponse(_) => TAG_SIGN_IN_RESPONSE,
        }
    }

    pub fn cmd_id(&self) -> u16 {
        match self {
            Frame::Request(r) => r.cmd_id,
            Frame::Response(r) => r.cmd_id,
            Frame::SignUpRequest(r) => r.cmd_id,
            Frame::SignUpResponse(r) => r.cmd_id,
            Frame::SignInRequest(r) => r.cmd_id,
            Frame::SignInResponse(r) => r.cmd_id,
        }
    }
}

impl From<RawRequest> for Frame {
    fn from(value: RawRequest) -> Self {
        Frame::Request(value)
    }
}

impl From<RawResponse> for Frame {
    fn from(value: RawResponse) -> Self {
        Frame::Response(value)
    }
}

impl From<RawSignUpRequest> for Frame {
    fn from(value: RawSignUpRequest) -> Self {
        Frame::SignUpRequest(value)
    }
}

impl From<RawSignUpResponse> for Frame {
    fn from(value: RawSignUpResponse) -> Self {
        Frame::SignUpResponse(value)
    }
}

impl From<RawSignInRequest> for Frame {
    fn from(value: RawSignInRequest) -> Self {
        Frame::SignInRequest(value)
    }
}

impl From<RawSignInResponse> for Frame {
    fn from(value: RawSignInResponse) -> Self {
        Frame::SignInResponse(value)
    }
}
