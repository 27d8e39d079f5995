//! The wire frame: an integer-keyed CBOR map.

use std::collections::BTreeMap;

use ciborium::value::{Integer, Value as Cbor};
use uuid::Uuid;

use crate::errors::FrameError;

/// Protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 2;

const KEY_VERSION: i64 = 0;
const KEY_FRAME_TYPE: i64 = 1;
const KEY_ID: i64 = 2;
const KEY_SEQ: i64 = 3;
const KEY_CONTENT_TYPE: i64 = 4;
const KEY_META: i64 = 5;
const KEY_PAYLOAD: i64 = 6;
const KEY_LEN: i64 = 7;
const KEY_OFFSET: i64 = 8;
const KEY_EOF: i64 = 9;
const KEY_CAP: i64 = 10;
const KEY_STREAM_ID: i64 = 11;
const KEY_MEDIA_URN: i64 = 12;

/// Frame-type discriminant. Value `2` is reserved and must never be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Hello = 0,
    Req = 1,
    Chunk = 3,
    End = 4,
    Log = 5,
    Err = 6,
    Heartbeat = 7,
    StreamStart = 8,
    StreamEnd = 9,
    RelayNotify = 10,
    RelayState = 11,
}

impl FrameType {
    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            0 => Self::Hello,
            1 => Self::Req,
            3 => Self::Chunk,
            4 => Self::End,
            5 => Self::Log,
            6 => Self::Err,
            7 => Self::Heartbeat,
            8 => Self::StreamStart,
            9 => Self::StreamEnd,
            10 => Self::RelayNotify,
            11 => Self::RelayState,
            _ => return None,
        })
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// A request id: either a UUID or a small unsigned integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestId {
    Uuid(Uuid),
    Int(u64),
}

impl RequestId {
    pub fn new_uuid() -> Self {
        Self::Uuid(Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Uuid(u) => write!(f, "{u}"),
            RequestId::Int(n) => write!(f, "{n}"),
        }
    }
}

/// One wire frame. Only the fields relevant to `frame_type` are populated;
/// the rest stay `None`/empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub version: u8,
    pub frame_type: FrameType,
    pub id: RequestId,
    pub seq: Option<u64>,
    pub content_type: Option<String>,
    pub meta: BTreeMap<String, Cbor>,
    pub payload: Option<Vec<u8>>,
    pub len: Option<u64>,
    pub offset: Option<u64>,
    pub eof: Option<bool>,
    pub cap: Option<String>,
    pub stream_id: Option<String>,
    pub media_urn: Option<String>,
}

impl Frame {
    pub fn new(frame_type: FrameType, id: RequestId) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame_type,
            id,
            seq: None,
            content_type: None,
            meta: BTreeMap::new(),
            payload: None,
            len: None,
            offset: None,
            eof: None,
            cap: None,
            stream_id: None,
            media_urn: None,
        }
    }

    /// Encodes this frame to an integer-keyed CBOR map value.
    pub fn to_cbor(&self) -> Cbor {
        let mut entries: Vec<(Cbor, Cbor)> = Vec::new();
        entries.push((int(KEY_VERSION), Cbor::Integer(Integer::from(self.version))));
        entries.push((
            int(KEY_FRAME_TYPE),
            Cbor::Integer(Integer::from(self.frame_type.as_i64())),
        ));
        entries.push((int(KEY_ID), id_to_cbor(&self.id)));

        if let Some(seq) = self.seq {
            entries.push((int(KEY_SEQ), Cbor::Integer(Integer::from(seq))));
        }
        if let Some(ct) = &self.content_type {
            entries.push((int(KEY_CONTENT_TYPE), Cbor::Text(ct.clone())));
        }
        if !self.meta.is_empty() {
            let map: Vec<(Cbor, Cbor)> = self
                .meta
                .iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), v.clone()))
                .collect();
            entries.push((int(KEY_META), Cbor::Map(map)));
        }
        if let Some(payload) = &self.payload {
            entries.push((int(KEY_PAYLOAD), Cbor::Bytes(payload.clone())));
        }
        if let Some(len) = self.len {
            entries.push((int(KEY_LEN), Cbor::Integer(Integer::from(len))));
        }
        if let Some(offset) = self.offset {
            entries.push((int(KEY_OFFSET), Cbor::Integer(Integer::from(offset))));
        }
        if let Some(eof) = self.eof {
            entries.push((int(KEY_EOF), Cbor::Bool(eof)));
        }
        if let Some(cap) = &self.cap {
            entries.push((int(KEY_CAP), Cbor::Text(cap.clone())));
        }
        if let Some(stream_id) = &self.stream_id {
            entries.push((int(KEY_STREAM_ID), Cbor::Text(stream_id.clone())));
        }
        if let Some(media_urn) = &self.media_urn {
            entries.push((int(KEY_MEDIA_URN), Cbor::Text(media_urn.clone())));
        }

        Cbor::Map(entries)
    }

    /// Decodes a frame from a previously-parsed CBOR value. Rejects a
    /// non-map top level, a missing `version`, a missing/unknown
    /// `frame_type`, or a missing `id` — in that order.
    pub fn from_cbor(value: Cbor) -> Result<Self, FrameError> {
        let map = match value {
            Cbor::Map(m) => m,
            _ => {
                return Err(FrameError::InvalidFrame {
                    reason: "top-level CBOR value is not a map".to_string(),
                })
            }
        };
        let lookup: BTreeMap<i64, Cbor> = map
            .into_iter()
            .filter_map(|(k, v)| as_i64(&k).map(|k| (k, v)))
            .collect();

        let version = lookup
            .get(&KEY_VERSION)
            .and_then(as_i64)
            .ok_or_else(|| FrameError::InvalidFrame {
                reason: "missing version".to_string(),
            })?;

        let frame_type = lookup
            .get(&KEY_FRAME_TYPE)
            .and_then(as_i64)
            .and_then(FrameType::from_i64)
            .ok_or_else(|| FrameError::InvalidFrame {
                reason: "missing or unknown frame_type".to_string(),
            })?;

        let id = lookup
            .get(&KEY_ID)
            .and_then(cbor_to_id)
            .ok_or_else(|| FrameError::InvalidFrame {
                reason: "missing id".to_string(),
            })?;

        let meta = match lookup.get(&KEY_META) {
            Some(Cbor::Map(entries)) => entries
                .iter()
                .filter_map(|(k, v)| k.as_text().map(|k| (k.to_string(), v.clone())))
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(Frame {
            version: version as u8,
            frame_type,
            id,
            seq: lookup.get(&KEY_SEQ).and_then(as_u64),
            content_type: lookup
                .get(&KEY_CONTENT_TYPE)
                .and_then(Cbor::as_text)
                .map(str::to_string),
            meta,
            payload: lookup
                .get(&KEY_PAYLOAD)
                .and_then(Cbor::as_bytes)
                .map(|b| b.to_vec()),
            len: lookup.get(&KEY_LEN).and_then(as_u64),
            offset: lookup.get(&KEY_OFFSET).and_then(as_u64),
            eof: lookup.get(&KEY_EOF).and_then(Cbor::as_bool),
            cap: lookup
                .get(&KEY_CAP)
                .and_then(Cbor::as_text)
                .map(str::to_string),
            stream_id: lookup
                .get(&KEY_STREAM_ID)
                .and_then(Cbor::as_text)
                .map(str::to_string),
            media_urn: lookup
                .get(&KEY_MEDIA_URN)
                .and_then(Cbor::as_text)
                .map(str::to_string),
        })
    }

    /// `meta.code` on an ERR frame; `None` on any other frame type.
    pub fn error_code(&self) -> Option<&str> {
        if self.frame_type != FrameType::Err {
            return None;
        }
        self.meta.get("code").and_then(Cbor::as_text)
    }

    /// `meta.message` on an ERR frame; `None` on any other frame type.
    pub fn error_message(&self) -> Option<&str> {
        if self.frame_type != FrameType::Err {
            return None;
        }
        self.meta.get("message").and_then(Cbor::as_text)
    }

    pub fn with_error(id: RequestId, code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut f = Frame::new(FrameType::Err, id);
        f.meta.insert("code".to_string(), Cbor::Text(code.into()));
        f.meta
            .insert("message".to_string(), Cbor::Text(message.into()));
        f
    }
}

fn int(k: i64) -> Cbor {
    Cbor::Integer(Integer::from(k))
}

fn as_i64(v: &Cbor) -> Option<i64> {
    v.as_integer().and_then(|i| i64::try_from(i).ok())
}

fn as_u64(v: &Cbor) -> Option<u64> {
    v.as_integer().and_then(|i| u64::try_from(i).ok())
}

fn id_to_cbor(id: &RequestId) -> Cbor {
    match id {
        RequestId::Uuid(u) => Cbor::Bytes(u.as_bytes().to_vec()),
        RequestId::Int(n) => Cbor::Integer(Integer::from(*n)),
    }
}

fn cbor_to_id(v: &Cbor) -> Option<RequestId> {
    if let Some(bytes) = v.as_bytes() {
        let arr: [u8; 16] = bytes.as_slice().try_into().ok()?;
        return Some(RequestId::Uuid(Uuid::from_bytes(arr)));
    }
    as_u64(v).map(RequestId::Int)
}
