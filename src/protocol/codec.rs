//! Binary encoding of [`Frame`]s.
//!
//! Every frame is a one byte tag and a big-endian `u16` command id, followed by
//! the fixed fields of its kind. Request and Response frames end with a `u32`
//! length and that many payload bytes.
//!
//! ```text
//! 0x00 Request         cmd:2 gateway:8 client:8 time:8 api:2 type:2 len:4 data
//! 0x80 Response        cmd:2 time:8 status:1 len:4 data
//! 0x01 SignUpRequest   cmd:2 gateway:8
//! 0x81 SignUpResponse  cmd:2 client:8 status:1
//! 0x02 SignInRequest   cmd:2 gateway:8 client:8
//! 0x82 SignInResponse  cmd:2 status:1
//! ```
//!
//! Fixed sections go through bincode with fixed-width big-endian integers so
//! the byte order never depends on the host.
use std::io::{ErrorKind, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_std_read, encode_into_std_write,
    error::DecodeError,
};

use super::{
    Frame, RawRequest, RawResponse, RawSignInRequest, RawSignInResponse, RawSignUpRequest,
    RawSignUpResponse, Request, Response, TransportError,
    frame::{
        TAG_REQUEST, TAG_RESPONSE, TAG_SIGN_IN_REQUEST, TAG_SIGN_IN_RESPONSE, TAG_SIGN_UP_REQUEST,
        TAG_SIGN_UP_RESPONSE,
    },
};

/// Largest payload accepted by [`decode`] unless configured otherwise.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Encode, Decode)]
struct Header {
    tag: u8,
    cmd_id: u16,
}

#[derive(Debug, Encode, Decode)]
struct RequestHead {
    gateway_id: u64,
    client_id: u64,
    time: u64,
    api_version: u16,
    kind: u16,
    length: u32,
}

#[derive(Debug, Encode, Decode)]
struct ResponseHead {
    time: u64,
    status: u8,
    length: u32,
}

#[derive(Debug, Encode, Decode)]
struct SignUpRequestBody {
    gateway_id: u64,
}

#[derive(Debug, Encode, Decode)]
struct SignUpResponseBody {
    client_id: u64,
    status: u8,
}

#[derive(Debug, Encode, Decode)]
struct SignInRequestBody {
    gateway_id: u64,
    client_id: u64,
}

#[derive(Debug, Encode, Decode)]
struct SignInResponseBody {
    status: u8,
}

fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Writes one complete frame with a single `write_all`.
pub fn encode<W: Write>(frame: &Frame, writer: &mut W) -> Result<(), TransportError> {
    let config = config();
    let mut buf = Vec::with_capacity(64);

    let header = Header {
        tag: frame.tag(),
        cmd_id: frame.cmd_id(),
    };
    encode_into_std_write(header, &mut buf, config)?;

    match frame {
        Frame::Request(raw) => {
            let head = RequestHead {
                gateway_id: raw.gateway_id,
                client_id: raw.client_id,
                time: raw.request.time,
                api_version: raw.api_version,
                kind: raw.request.kind,
                length: payload_length(&raw.request.data)?,
            };
            encode_into_std_write(head, &mut buf, config)?;
            buf.extend_from_slice(&raw.request.data);
        }
        Frame::Response(raw) => {
            let head = ResponseHead {
                time: raw.response.time,
                status: raw.response.status,
                length: payload_length(&raw.response.data)?,
            };
            encode_into_std_write(head, &mut buf, config)?;
            buf.extend_from_slice(&raw.response.data);
        }
        Frame::SignUpRequest(raw) => {
            let body = SignUpRequestBody {
                gateway_id: raw.gateway_id,
            };
            encode_into_std_write(body, &mut buf, config)?;
        }
        Frame::SignUpResponse(raw) => {
            let body = SignUpResponseBody {
                client_id: raw.client_id,
                status: raw.status,
            };
            encode_into_std_write(body, &mut buf, config)?;
        }
        Frame::SignInRequest(raw) => {
            let body = SignInRequestBody {
                gateway_id: raw.gateway_id,
                client_id: raw.client_id,
            };
            encode_into_std_write(body, &mut buf, config)?;
        }
        Frame::SignInResponse(raw) => {
            let body = SignInResponseBody { status: raw.status };
            encode_into_std_write(body, &mut buf, config)?;
        }
    }

    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Reads one complete frame, rejecting payloads longer than `max_payload`.
///
/// End of stream before the first byte of a frame is reported as
/// [`TransportError::Closed`]; end of stream anywhere else is a decode error.
pub fn decode<R: Read>(reader: &mut R, max_payload: usize) -> Result<Frame, TransportError> {
    let config = config();

    let tag: u8 = match decode_from_std_read(reader, config) {
        Ok(tag) => tag,
        Err(DecodeError::Io { inner, .. }) if inner.kind() == ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed);
        }
        Err(e) => return Err(e.into()),
    };
    let cmd_id: u16 = decode_from_std_read(reader, config)?;

    let frame = match tag {
        TAG_REQUEST => {
            let head: RequestHead = decode_from_std_read(reader, config)?;
            let data = read_payload(reader, head.length, max_payload)?;
            Frame::Request(RawRequest {
                cmd_id,
                gateway_id: head.gateway_id,
                client_id: head.client_id,
                api_version: head.api_version,
                request: Request {
                    time: head.time,
                    kind: head.kind,
                    data,
                },
            })
        }
        TAG_RESPONSE => {
            let head: ResponseHead = decode_from_std_read(reader, config)?;
            let data = read_payload(reader, head.length, max_payload)?;
            Frame::Response(RawResponse {
                cmd_id,
                response: Response {
                    time: head.time,
                    status: head.status,
                    data,
                },
            })
        }
        TAG_SIGN_UP_REQUEST => {
            let body: SignUpRequestBody = decode_from_std_read(reader, config)?;
            Frame::SignUpRequest(RawSignUpRequest {
                cmd_id,
                gateway_id: body.gateway_id,
            })
        }
        TAG_SIGN_UP_RESPONSE => {
            let body: SignUpResponseBody = decode_from_std_read(reader, config)?;
            Frame::SignUpResponse(RawSignUpResponse {
                cmd_id,
                client_id: body.client_id,
                status: body.status,
            })
        }
        TAG_SIGN_IN_REQUEST => {
            let body: SignInRequestBody = decode_from_std_read(reader, config)?;
            Frame::SignInRequest(RawSignInRequest {
                cmd_id,
                gateway_id: body.gateway_id,
                client_id: body.client_id,
            })
        }
        TAG_SIGN_IN_RESPONSE => {
            let body: SignInResponseBody = decode_from_std_read(reader, config)?;
            Frame::SignInResponse(RawSignInResponse {
                cmd_id,
                status: body.status,
            })
        }
        tag => return Err(TransportError::UnknownTag(tag)),
    };

    Ok(frame)
}

fn payload_length(data: &[u8]) -> Result<u32, TransportError> {
    u32::try_from(data.len()).map_err(|_| TransportError::PayloadTooLarge {
        length: data.len(),
        max: u32::MAX as usize,
    })
}

fn read_payload<R: Read>(
    reader: &mut R,
    length: u32,
    max_payload: usize,
) -> Result<Vec<u8>, TransportError> {
    let length = length as usize;
    if length > max_payload {
        return Err(TransportError::PayloadTooLarge {
            length,
            max: max_payload,
        });
    }

    let mut data = vec![0; length];
    reader.read_exact(&mut data)?;
    Ok(data)
}
