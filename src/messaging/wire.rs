use std::fmt::{Debug, Display, Formatter};

use anyhow::bail;
use bytes::{Buf, BufMut};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

/// The operation a request asks for. Numbers on the wire are IDLE=1, PUT=2, GET=3.
///
/// Numbers outside this range are kept as [CallType::Unknown] rather than being rejected while
///  decoding: the server answers them with an error value instead of dropping them silently.
#[derive(Clone, Copy, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum CallType {
    Idle = 1,
    Put = 2,
    Get = 3,
    #[num_enum(catch_all)]
    Unknown(u32),
}
impl From<CallType> for u32 {
    fn from(value: CallType) -> Self {
        match value {
            CallType::Idle => 1,
            CallType::Put => 2,
            CallType::Get => 3,
            CallType::Unknown(n) => n,
        }
    }
}
impl Debug for CallType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::Idle => write!(f, "IDLE"),
            CallType::Put => write!(f, "PUT"),
            CallType::Get => write!(f, "GET"),
            CallType::Unknown(n) => write!(f, "UNDEF({})", n),
        }
    }
}
impl Display for CallType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ResponseType {
    /// the final result of a completed call
    Value = 0,
    /// the call was admitted and is still executing
    Ack = 1,
    /// the server refused the call
    Error = 2,
}


/// A call as it travels from client to server. All fields are little endian i32 / u32, in this
///  order:
///
/// ```ascii
///  0: call type (u32)
///  4: sequence number (i32)
///  8: client id (i32)
/// 12: arg1 (i32)
/// 16: arg2 (i32)
/// ```
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct RpcRequest {
    pub call_type: CallType,
    pub sequence_number: i32,
    pub client_id: i32,
    pub arg1: i32,
    pub arg2: i32,
}
impl Debug for RpcRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[Client {}] SEQ {} {:?}({}, {})", self.client_id, self.sequence_number, self.call_type, self.arg1, self.arg2)
    }
}

impl RpcRequest {
    pub const SERIALIZED_LEN: usize = 5 * size_of::<u32>();

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.call_type.into());
        buf.put_i32_le(self.sequence_number);
        buf.put_i32_le(self.client_id);
        buf.put_i32_le(self.arg1);
        buf.put_i32_le(self.arg2);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SERIALIZED_LEN);
        self.ser(&mut buf);
        buf
    }

    /// Decodes a complete datagram. Anything that is not exactly one request record is malformed.
    pub fn try_deser(mut buf: &[u8]) -> anyhow::Result<RpcRequest> {
        if buf.len() != Self::SERIALIZED_LEN {
            bail!("request datagram has length {}, expected {}", buf.len(), Self::SERIALIZED_LEN);
        }

        Ok(RpcRequest {
            call_type: CallType::from_primitive(buf.get_u32_le()),
            sequence_number: buf.get_i32_le(),
            client_id: buf.get_i32_le(),
            arg1: buf.get_i32_le(),
            arg2: buf.get_i32_le(),
        })
    }
}


/// A server's answer to a request, echoing the request's call type, sequence number and client
///  id. The layout keeps the two bytes of alignment padding after the response type so that
///  the record is 20 bytes like the request:
///
/// ```ascii
///  0: response type (u16)
///  2: padding (2 bytes, zero, ignored when reading)
///  4: call type (u32)
///  8: sequence number (i32)
/// 12: client id (i32)
/// 16: value (i32)
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RpcResponse {
    pub response_type: ResponseType,
    pub call_type: CallType,
    pub sequence_number: i32,
    pub client_id: i32,
    pub value: i32,
}

impl RpcResponse {
    pub const SERIALIZED_LEN: usize = 2 * size_of::<u16>() + 4 * size_of::<u32>();

    /// value sent with ERROR responses, and produced by the executor for unknown call types
    pub const ERROR_VALUE: i32 = -1;

    fn for_request(request: &RpcRequest, response_type: ResponseType, value: i32) -> RpcResponse {
        RpcResponse {
            response_type,
            call_type: request.call_type,
            sequence_number: request.sequence_number,
            client_id: request.client_id,
            value,
        }
    }

    pub fn ack(request: &RpcRequest) -> RpcResponse {
        Self::for_request(request, ResponseType::Ack, 0)
    }

    pub fn value(request: &RpcRequest, value: i32) -> RpcResponse {
        Self::for_request(request, ResponseType::Value, value)
    }

    pub fn error(request: &RpcRequest) -> RpcResponse {
        Self::for_request(request, ResponseType::Error, Self::ERROR_VALUE)
    }

    /// true if this response refers to the given request, regardless of its response type
    pub fn matches(&self, request: &RpcRequest) -> bool {
        self.client_id == request.client_id
            && self.sequence_number == request.sequence_number
            && self.call_type == request.call_type
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.response_type.into());
        buf.put_u16_le(0);
        buf.put_u32_le(self.call_type.into());
        buf.put_i32_le(self.sequence_number);
        buf.put_i32_le(self.client_id);
        buf.put_i32_le(self.value);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SERIALIZED_LEN);
        self.ser(&mut buf);
        buf
    }

    pub fn try_deser(mut buf: &[u8]) -> anyhow::Result<RpcResponse> {
        if buf.len() != Self::SERIALIZED_LEN {
            bail!("response datagram has length {}, expected {}", buf.len(), Self::SERIALIZED_LEN);
        }

        let response_type = ResponseType::try_from(buf.get_u16_le())?;
        buf.advance(size_of::<u16>());

        Ok(RpcResponse {
            response_type,
            call_type: CallType::from_primitive(buf.get_u32_le()),
            sequence_number: buf.get_i32_le(),
            client_id: buf.get_i32_le(),
            value: buf.get_i32_le(),
        })
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::put(b"\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x07\0\0\0\x63\0\0\0", Some(RpcRequest { call_type: CallType::Put, sequence_number: 1, client_id: 42, arg1: 7, arg2: 99 }))]
    #[case::get(b"\x03\0\0\0\x05\0\0\0\x2a\0\0\0\x07\0\0\0\0\0\0\0", Some(RpcRequest { call_type: CallType::Get, sequence_number: 5, client_id: 42, arg1: 7, arg2: 0 }))]
    #[case::negative_values(b"\x01\0\0\0\xff\xff\xff\xff\xfe\xff\xff\xff\0\0\0\0\0\0\0\0", Some(RpcRequest { call_type: CallType::Idle, sequence_number: -1, client_id: -2, arg1: 0, arg2: 0 }))]
    #[case::unknown_call_type(b"\x09\0\0\0\x01\0\0\0\x01\0\0\0\0\0\0\0\0\0\0\0", Some(RpcRequest { call_type: CallType::Unknown(9), sequence_number: 1, client_id: 1, arg1: 0, arg2: 0 }))]
    #[case::too_short(b"\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x07\0\0\0\x63\0\0", None)]
    #[case::too_long(b"\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x07\0\0\0\x63\0\0\0\0", None)]
    #[case::empty(b"", None)]
    fn test_request_try_deser(#[case] buf: &[u8], #[case] expected: Option<RpcRequest>) {
        match RpcRequest::try_deser(buf) {
            Ok(actual) => assert_eq!(Some(actual), expected),
            Err(_) => assert!(expected.is_none()),
        }
    }

    #[test]
    fn test_request_ser() {
        let request = RpcRequest { call_type: CallType::Put, sequence_number: 1, client_id: 42, arg1: 7, arg2: 99 };
        assert_eq!(request.to_bytes(), b"\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x07\0\0\0\x63\0\0\0");
        assert_eq!(request.to_bytes().len(), RpcRequest::SERIALIZED_LEN);
    }

    #[rstest]
    #[case::value(b"\0\0\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x63\0\0\0", Some(RpcResponse { response_type: ResponseType::Value, call_type: CallType::Put, sequence_number: 1, client_id: 42, value: 99 }))]
    #[case::ack(b"\x01\0\0\0\x03\0\0\0\x02\0\0\0\x2a\0\0\0\0\0\0\0", Some(RpcResponse { response_type: ResponseType::Ack, call_type: CallType::Get, sequence_number: 2, client_id: 42, value: 0 }))]
    #[case::error(b"\x02\0\0\0\x01\0\0\0\x02\0\0\0\x2a\0\0\0\xff\xff\xff\xff", Some(RpcResponse { response_type: ResponseType::Error, call_type: CallType::Idle, sequence_number: 2, client_id: 42, value: -1 }))]
    #[case::padding_ignored(b"\0\0\xab\xcd\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x63\0\0\0", Some(RpcResponse { response_type: ResponseType::Value, call_type: CallType::Put, sequence_number: 1, client_id: 42, value: 99 }))]
    #[case::unknown_response_type(b"\x03\0\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x63\0\0\0", None)]
    #[case::too_short(b"\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x63\0\0\0", None)]
    fn test_response_try_deser(#[case] buf: &[u8], #[case] expected: Option<RpcResponse>) {
        match RpcResponse::try_deser(buf) {
            Ok(actual) => assert_eq!(Some(actual), expected),
            Err(_) => assert!(expected.is_none()),
        }
    }

    #[test]
    fn test_response_ser() {
        let request = RpcRequest { call_type: CallType::Put, sequence_number: 1, client_id: 42, arg1: 7, arg2: 99 };
        assert_eq!(RpcResponse::value(&request, 99).to_bytes(), b"\0\0\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\x63\0\0\0");
        assert_eq!(RpcResponse::ack(&request).to_bytes(), b"\x01\0\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\0\0\0\0");
        assert_eq!(RpcResponse::error(&request).to_bytes(), b"\x02\0\0\0\x02\0\0\0\x01\0\0\0\x2a\0\0\0\xff\xff\xff\xff");
    }

    #[rstest]
    #[case::same(42, 1, CallType::Put, true)]
    #[case::other_client(43, 1, CallType::Put, false)]
    #[case::other_seq(42, 2, CallType::Put, false)]
    #[case::other_call_type(42, 1, CallType::Get, false)]
    fn test_response_matches(#[case] client_id: i32, #[case] sequence_number: i32, #[case] call_type: CallType, #[case] expected: bool) {
        let request = RpcRequest { call_type: CallType::Put, sequence_number: 1, client_id: 42, arg1: 7, arg2: 99 };
        let response = RpcResponse { response_type: ResponseType::Value, call_type, sequence_number, client_id, value: 99 };
        assert_eq!(response.matches(&request), expected);
    }
}
