//! # Wire Protocol
//!
//! Newline-delimited JSON envelopes:
//!
//! ```text
//! {"src":"c1","dest":"n1","body":{"type":"broadcast","msg_id":3,"message":42}}
//! ```
//!
//! The body's `type` selects the payload. Replies carry `in_reply_to` set to
//! the request's `msg_id`.

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{NodeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One message on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

/// Message body: correlation ids plus the typed payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,

    #[serde(flatten)]
    pub payload: Payload,
}

/// Message kinds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Echo {
        echo: serde_json::Value,
    },
    EchoOk {
        echo: serde_json::Value,
    },
    Generate,
    GenerateOk {
        id: String,
    },
    Broadcast {
        message: Value,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<Value>,
    },
    /// Adjacency is accepted but not used; values go to every member
    Topology {
        #[serde(default)]
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,
    Delta {
        messages: Vec<Value>,
    },
    DeltaOk,
    Error {
        code: u32,
        text: String,
    },
    /// Any `type` this node does not know
    #[serde(other)]
    Unknown,
}

impl Payload {
    /// Error payload for `err`
    pub fn error(err: &MurmurError) -> Self {
        Self::Error {
            code: err.code(),
            text: err.to_string(),
        }
    }

    /// Whether this payload answers an earlier request
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Self::InitOk
                | Self::EchoOk { .. }
                | Self::GenerateOk { .. }
                | Self::BroadcastOk
                | Self::ReadOk { .. }
                | Self::TopologyOk
                | Self::DeltaOk
                | Self::Error { .. }
        )
    }
}

/// A decoded input line
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Well-formed message
    Message(Envelope),
    /// Addressed envelope whose body could not be decoded
    Malformed {
        src: NodeId,
        dest: NodeId,
        msg_id: Option<u64>,
        reason: String,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    src: NodeId,
    dest: NodeId,
    body: serde_json::Value,
}

/// Decode one line.
///
/// Lines that are not an addressed envelope at all are an error; an envelope
/// with a bad body decodes to [`Inbound::Malformed`] so the sender can be told.
pub fn decode(line: &str) -> Result<Inbound> {
    let raw: RawEnvelope =
        serde_json::from_str(line).map_err(|e| MurmurError::Serialization(e.to_string()))?;

    let msg_id = raw.body.get("msg_id").and_then(serde_json::Value::as_u64);
    match serde_json::from_value::<Body>(raw.body) {
        Ok(body) => Ok(Inbound::Message(Envelope {
            src: raw.src,
            dest: raw.dest,
            body,
        })),
        Err(e) => Ok(Inbound::Malformed {
            src: raw.src,
            dest: raw.dest,
            msg_id,
            reason: e.to_string(),
        }),
    }
}

/// Encode one envelope as a single line, without the trailing newline
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| MurmurError::Serialization(e.to_string()))
}
