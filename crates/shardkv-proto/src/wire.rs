// SPDX-License-Identifier: Apache-2.0
//! Length-prefixed binary codec for [`Message`], and the frame-accumulator
//! helpers transport code uses to peel complete frames off a streaming
//! socket.
//!
//! Grounded on `echo-session-proto::wire::Packet` for the overall
//! length-prefix-then-payload shape, and on `echo-session-ws-gateway`'s
//! `try_frame_len`/`try_extract_frame` pair for accumulator draining — this
//! codec is hand-rolled rather than serde-based because the frame header
//! carries a bare discriminant tag, not a self-describing format.

use crate::config::Configuration;
use crate::error::ProtoError;
use crate::message::{KeyValue, Message, ValueSlot};
use crate::shard::Shard;

/// Size of the frame header: one tag byte plus an 8-byte little-endian length.
pub const HEADER_BYTES: usize = 1 + 8;

mod tag {
    pub const GET_REQUEST: u8 = 0;
    pub const GET_RESPONSE: u8 = 1;
    pub const PUT_REQUEST: u8 = 2;
    pub const PUT_RESPONSE: u8 = 3;
    pub const APPEND_REQUEST: u8 = 4;
    pub const APPEND_RESPONSE: u8 = 5;
    pub const DELETE_REQUEST: u8 = 6;
    pub const DELETE_RESPONSE: u8 = 7;
    pub const MULTI_GET_REQUEST: u8 = 8;
    pub const MULTI_GET_RESPONSE: u8 = 9;
    pub const MULTI_PUT_REQUEST: u8 = 10;
    pub const MULTI_PUT_RESPONSE: u8 = 11;
    pub const JOIN_REQUEST: u8 = 12;
    pub const JOIN_RESPONSE: u8 = 13;
    pub const LEAVE_REQUEST: u8 = 14;
    pub const LEAVE_RESPONSE: u8 = 15;
    pub const MOVE_REQUEST: u8 = 16;
    pub const MOVE_RESPONSE: u8 = 17;
    pub const QUERY_REQUEST: u8 = 18;
    pub const QUERY_RESPONSE: u8 = 19;
    pub const SHARD_HANDOFF_REQUEST: u8 = 20;
    pub const SHARD_HANDOFF_RESPONSE: u8 = 21;
    pub const BULK_PUT_REQUEST: u8 = 22;
    pub const BULK_PUT_RESPONSE: u8 = 23;
    pub const ABORT_BULK_REQUEST: u8 = 24;
    pub const ABORT_BULK_RESPONSE: u8 = 25;
    pub const ERROR_RESPONSE: u8 = 26;
}

// --- Encoder ---------------------------------------------------------------

/// Encode `msg` into a complete wire frame: tag, `u64_le` payload length, payload.
#[must_use]
pub fn encode_frame(msg: &Message) -> Vec<u8> {
    let (tag, payload) = encode_payload(msg);
    let mut out = Vec::with_capacity(HEADER_BYTES + payload.len());
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

fn encode_payload(msg: &Message) -> (u8, Vec<u8>) {
    let mut out = Vec::new();
    let t = match msg {
        Message::GetRequest { key } => {
            enc_string(key, &mut out);
            tag::GET_REQUEST
        }
        Message::GetResponse { value, present } => {
            enc_bytes(value, &mut out);
            enc_bool(*present, &mut out);
            tag::GET_RESPONSE
        }
        Message::PutRequest { key, value } => {
            enc_string(key, &mut out);
            enc_bytes(value, &mut out);
            tag::PUT_REQUEST
        }
        Message::PutResponse => tag::PUT_RESPONSE,
        Message::AppendRequest { key, value } => {
            enc_string(key, &mut out);
            enc_bytes(value, &mut out);
            tag::APPEND_REQUEST
        }
        Message::AppendResponse => tag::APPEND_RESPONSE,
        Message::DeleteRequest { key } => {
            enc_string(key, &mut out);
            tag::DELETE_REQUEST
        }
        Message::DeleteResponse => tag::DELETE_RESPONSE,
        Message::MultiGetRequest { keys } => {
            enc_string_list(keys, &mut out);
            tag::MULTI_GET_REQUEST
        }
        Message::MultiGetResponse { values } => {
            enc_value_slot_list(values, &mut out);
            tag::MULTI_GET_RESPONSE
        }
        Message::MultiPutRequest { keys, values } => {
            enc_string_list(keys, &mut out);
            enc_bytes_list(values, &mut out);
            tag::MULTI_PUT_REQUEST
        }
        Message::MultiPutResponse => tag::MULTI_PUT_RESPONSE,
        Message::JoinRequest { server } => {
            enc_string(server, &mut out);
            tag::JOIN_REQUEST
        }
        Message::JoinResponse => tag::JOIN_RESPONSE,
        Message::LeaveRequest { server } => {
            enc_string(server, &mut out);
            tag::LEAVE_REQUEST
        }
        Message::LeaveResponse => tag::LEAVE_RESPONSE,
        Message::MoveRequest { dest, shards } => {
            enc_string(dest, &mut out);
            enc_shard_list(shards, &mut out);
            tag::MOVE_REQUEST
        }
        Message::MoveResponse => tag::MOVE_RESPONSE,
        Message::QueryRequest => tag::QUERY_REQUEST,
        Message::QueryResponse { configuration, epoch } => {
            enc_configuration(configuration, &mut out);
            out.extend_from_slice(&epoch.to_le_bytes());
            tag::QUERY_RESPONSE
        }
        Message::ShardHandoffRequest { piece, dest } => {
            enc_shard(*piece, &mut out);
            enc_string(dest, &mut out);
            tag::SHARD_HANDOFF_REQUEST
        }
        Message::ShardHandoffResponse => tag::SHARD_HANDOFF_RESPONSE,
        Message::BulkPutRequest { piece, items } => {
            enc_shard(*piece, &mut out);
            enc_kv_list(items, &mut out);
            tag::BULK_PUT_REQUEST
        }
        Message::BulkPutResponse => tag::BULK_PUT_RESPONSE,
        Message::AbortBulkRequest { piece } => {
            enc_shard(*piece, &mut out);
            tag::ABORT_BULK_REQUEST
        }
        Message::AbortBulkResponse => tag::ABORT_BULK_RESPONSE,
        Message::ErrorResponse { message } => {
            enc_string(message, &mut out);
            tag::ERROR_RESPONSE
        }
    };
    (t, out)
}

fn enc_bool(b: bool, out: &mut Vec<u8>) {
    out.push(u8::from(b));
}

fn enc_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn enc_string(s: &str, out: &mut Vec<u8>) {
    enc_bytes(s.as_bytes(), out);
}

fn enc_string_list(items: &[String], out: &mut Vec<u8>) {
    out.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for item in items {
        enc_string(item, out);
    }
}

fn enc_bytes_list(items: &[Vec<u8>], out: &mut Vec<u8>) {
    out.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for item in items {
        enc_bytes(item, out);
    }
}

fn enc_shard(shard: Shard, out: &mut Vec<u8>) {
    out.push(shard.low);
    out.push(shard.high);
}

fn enc_shard_list(items: &[Shard], out: &mut Vec<u8>) {
    out.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for shard in items {
        enc_shard(*shard, out);
    }
}

fn enc_kv_list(items: &[KeyValue], out: &mut Vec<u8>) {
    out.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for kv in items {
        enc_string(&kv.key, out);
        enc_bytes(&kv.value, out);
    }
}

fn enc_value_slot_list(items: &[ValueSlot], out: &mut Vec<u8>) {
    out.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for slot in items {
        match slot {
            ValueSlot::Present(value) => {
                enc_bool(true, out);
                enc_bytes(value, out);
            }
            ValueSlot::Absent => enc_bool(false, out),
        }
    }
}

fn enc_configuration(configuration: &Configuration, out: &mut Vec<u8>) {
    let servers: Vec<_> = configuration.servers().collect();
    out.extend_from_slice(&(servers.len() as u64).to_le_bytes());
    for (addr, shards) in servers {
        enc_string(addr, out);
        enc_shard_list(shards, out);
    }
}

// --- Decoder -----------------------------------------------------------

/// A cursor over an in-memory payload, tracking position for sequential field
/// decoding. Every read fails with [`ProtoError::Malformed`] on insufficient
/// bytes rather than panicking.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or_else(|| ProtoError::Malformed("length overflow".to_string()))?;
        if end > self.buf.len() {
            return Err(ProtoError::Malformed("truncated payload".to_string()));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64, ProtoError> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| ProtoError::Malformed("truncated u64".to_string()))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bool(&mut self) -> Result<bool, ProtoError> {
        Ok(self.u8()? != 0)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ProtoError> {
        let len = self.u64()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, ProtoError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|_| ProtoError::Malformed("invalid utf-8".to_string()))
    }

    fn string_list(&mut self) -> Result<Vec<String>, ProtoError> {
        let count = self.u64()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn bytes_list(&mut self) -> Result<Vec<Vec<u8>>, ProtoError> {
        let count = self.u64()?;
        (0..count).map(|_| self.bytes()).collect()
    }

    fn shard(&mut self) -> Result<Shard, ProtoError> {
        let low = self.u8()?;
        let high = self.u8()?;
        Ok(Shard::new(low, high))
    }

    fn shard_list(&mut self) -> Result<Vec<Shard>, ProtoError> {
        let count = self.u64()?;
        (0..count).map(|_| self.shard()).collect()
    }

    fn kv_list(&mut self) -> Result<Vec<KeyValue>, ProtoError> {
        let count = self.u64()?;
        (0..count)
            .map(|_| {
                let key = self.string()?;
                let value = self.bytes()?;
                Ok(KeyValue { key, value })
            })
            .collect()
    }

    fn value_slot_list(&mut self) -> Result<Vec<ValueSlot>, ProtoError> {
        let count = self.u64()?;
        (0..count)
            .map(|_| {
                if self.bool()? {
                    Ok(ValueSlot::Present(self.bytes()?))
                } else {
                    Ok(ValueSlot::Absent)
                }
            })
            .collect()
    }

    fn configuration(&mut self) -> Result<Configuration, ProtoError> {
        let count = self.u64()?;
        let mut configuration = Configuration::new();
        for _ in 0..count {
            let addr = self.string()?;
            let shards = self.shard_list()?;
            configuration.add_server(&addr);
            for shard in shards {
                configuration.assign_shard(&addr, shard);
            }
        }
        Ok(configuration)
    }

    fn finish(self) -> Result<(), ProtoError> {
        if self.pos != self.buf.len() {
            return Err(ProtoError::Malformed("trailing bytes after payload".to_string()));
        }
        Ok(())
    }
}

/// Decode a single payload (without its header) given its tag.
fn decode_payload(t: u8, payload: &[u8]) -> Result<Message, ProtoError> {
    let mut c = Cursor::new(payload);
    let msg = match t {
        tag::GET_REQUEST => Message::GetRequest { key: c.string()? },
        tag::GET_RESPONSE => Message::GetResponse {
            value: c.bytes()?,
            present: c.bool()?,
        },
        tag::PUT_REQUEST => Message::PutRequest {
            key: c.string()?,
            value: c.bytes()?,
        },
        tag::PUT_RESPONSE => Message::PutResponse,
        tag::APPEND_REQUEST => Message::AppendRequest {
            key: c.string()?,
            value: c.bytes()?,
        },
        tag::APPEND_RESPONSE => Message::AppendResponse,
        tag::DELETE_REQUEST => Message::DeleteRequest { key: c.string()? },
        tag::DELETE_RESPONSE => Message::DeleteResponse,
        tag::MULTI_GET_REQUEST => Message::MultiGetRequest { keys: c.string_list()? },
        tag::MULTI_GET_RESPONSE => Message::MultiGetResponse {
            values: c.value_slot_list()?,
        },
        tag::MULTI_PUT_REQUEST => Message::MultiPutRequest {
            keys: c.string_list()?,
            values: c.bytes_list()?,
        },
        tag::MULTI_PUT_RESPONSE => Message::MultiPutResponse,
        tag::JOIN_REQUEST => Message::JoinRequest { server: c.string()? },
        tag::JOIN_RESPONSE => Message::JoinResponse,
        tag::LEAVE_REQUEST => Message::LeaveRequest { server: c.string()? },
        tag::LEAVE_RESPONSE => Message::LeaveResponse,
        tag::MOVE_REQUEST => Message::MoveRequest {
            dest: c.string()?,
            shards: c.shard_list()?,
        },
        tag::MOVE_RESPONSE => Message::MoveResponse,
        tag::QUERY_REQUEST => Message::QueryRequest,
        tag::QUERY_RESPONSE => Message::QueryResponse {
            configuration: c.configuration()?,
            epoch: c.u64()?,
        },
        tag::SHARD_HANDOFF_REQUEST => Message::ShardHandoffRequest {
            piece: c.shard()?,
            dest: c.string()?,
        },
        tag::SHARD_HANDOFF_RESPONSE => Message::ShardHandoffResponse,
        tag::BULK_PUT_REQUEST => Message::BulkPutRequest {
            piece: c.shard()?,
            items: c.kv_list()?,
        },
        tag::BULK_PUT_RESPONSE => Message::BulkPutResponse,
        tag::ABORT_BULK_REQUEST => Message::AbortBulkRequest { piece: c.shard()? },
        tag::ABORT_BULK_RESPONSE => Message::AbortBulkResponse,
        tag::ERROR_RESPONSE => Message::ErrorResponse { message: c.string()? },
        _ => return Err(ProtoError::Malformed(format!("unknown tag {t}"))),
    };
    c.finish()?;
    Ok(msg)
}

/// Decode a complete frame (header + payload) from the front of `buf`.
/// Requires `buf.len()` to equal the frame's total length exactly; use
/// [`try_extract_frame`] when reading from a stream of unknown boundaries.
pub fn decode_frame(buf: &[u8]) -> Result<Message, ProtoError> {
    if buf.len() < HEADER_BYTES {
        return Err(ProtoError::Malformed("frame shorter than header".to_string()));
    }
    let t = buf[0];
    let payload_len = u64::from_le_bytes(buf[1..HEADER_BYTES].try_into().map_err(|_| {
        ProtoError::Malformed("truncated length prefix".to_string())
    })?) as usize;
    if buf.len() != HEADER_BYTES + payload_len {
        return Err(ProtoError::Malformed("frame length mismatch".to_string()));
    }
    decode_payload(t, &buf[HEADER_BYTES..])
}

/// Peek at `buf`'s header (if enough bytes have arrived) and return the total
/// frame length it promises, without consuming anything. `None` means the
/// header itself hasn't fully arrived yet.
#[must_use]
pub fn try_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_BYTES {
        return None;
    }
    let payload_len = u64::from_le_bytes(buf[1..HEADER_BYTES].try_into().ok()?) as usize;
    HEADER_BYTES.checked_add(payload_len)
}

/// Drain one complete frame off the front of `acc`, if one has fully
/// arrived. Leaves `acc` untouched and returns `Ok(None)` when more bytes are
/// still needed.
pub fn try_extract_frame(acc: &mut Vec<u8>) -> Result<Option<Message>, ProtoError> {
    let Some(frame_len) = try_frame_len(acc) else {
        return Ok(None);
    };
    if acc.len() < frame_len {
        return Ok(None);
    }
    let frame: Vec<u8> = acc.drain(..frame_len).collect();
    Ok(Some(decode_frame(&frame)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{KeyValue, ValueSlot};

    fn round_trip(msg: Message) {
        let frame = encode_frame(&msg);
        let decoded = decode_frame(&frame).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_simple_variants() {
        round_trip(Message::GetRequest { key: "alpha".to_string() });
        round_trip(Message::GetResponse {
            value: b"value".to_vec(),
            present: true,
        });
        round_trip(Message::PutResponse);
        round_trip(Message::DeleteRequest { key: "k".to_string() });
    }

    #[test]
    fn round_trips_multi_get_with_mixed_presence() {
        round_trip(Message::MultiGetResponse {
            values: vec![
                ValueSlot::Present(b"v1".to_vec()),
                ValueSlot::Absent,
                ValueSlot::Present(Vec::new()),
            ],
        });
    }

    #[test]
    fn round_trips_move_request() {
        round_trip(Message::MoveRequest {
            dest: "10.0.0.2:9000".to_string(),
            shards: vec![Shard::new(b'0', b'7'), Shard::new(b'8', b'F')],
        });
    }

    #[test]
    fn round_trips_configuration_in_query_response() {
        let mut configuration = Configuration::new();
        configuration.add_server("a");
        configuration.assign_shard("a", Shard::new(b'0', b'Z'));
        round_trip(Message::QueryResponse {
            configuration,
            epoch: 42,
        });
    }

    #[test]
    fn round_trips_bulk_put() {
        round_trip(Message::BulkPutRequest {
            piece: Shard::new(b'0', b'7'),
            items: vec![
                KeyValue {
                    key: "1ab".to_string(),
                    value: b"hello".to_vec(),
                },
                KeyValue {
                    key: "2cd".to_string(),
                    value: Vec::new(),
                },
            ],
        });
    }

    #[test]
    fn round_trips_error_response() {
        round_trip(Message::ErrorResponse {
            message: "server does not own the requested shard".to_string(),
        });
    }

    #[test]
    fn decode_frame_rejects_unknown_tag() {
        let mut buf = vec![255u8];
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert!(matches!(decode_frame(&buf), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn decode_frame_rejects_truncated_payload() {
        let full = encode_frame(&Message::GetRequest { key: "abcdef".to_string() });
        let truncated = &full[..full.len() - 2];
        assert!(matches!(decode_frame(truncated), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn decode_frame_rejects_trailing_bytes() {
        let mut full = encode_frame(&Message::PutResponse);
        full.push(0xFF);
        assert!(matches!(decode_frame(&full), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn try_extract_frame_drains_one_frame_and_preserves_remainder() {
        let mut acc = Vec::new();
        acc.extend_from_slice(&encode_frame(&Message::PutResponse));
        acc.extend_from_slice(&encode_frame(&Message::DeleteResponse));

        let first = try_extract_frame(&mut acc).unwrap().expect("first frame");
        assert_eq!(first, Message::PutResponse);

        let second = try_extract_frame(&mut acc).unwrap().expect("second frame");
        assert_eq!(second, Message::DeleteResponse);

        assert!(acc.is_empty());
    }

    #[test]
    fn try_extract_frame_returns_none_for_partial_header() {
        let mut acc = vec![0u8; HEADER_BYTES - 1];
        assert_eq!(try_extract_frame(&mut acc).unwrap(), None);
        assert_eq!(acc.len(), HEADER_BYTES - 1);
    }

    #[test]
    fn try_extract_frame_returns_none_for_partial_body() {
        let full = encode_frame(&Message::GetRequest { key: "xyz".to_string() });
        let mut acc = full[..full.len() - 1].to_vec();
        let before = acc.len();
        assert_eq!(try_extract_frame(&mut acc).unwrap(), None);
        assert_eq!(acc.len(), before);
    }
}
