//! Protocol frames and the structural classifier.
//!
//! The wire format carries no discriminant tag: a frame's kind is determined
//! by which keys it carries. In-process, frames are an explicit sum type;
//! the key-presence heuristics live only in [`Frame::decode`], which applies
//! a fixed precedence so that no legal payload is ambiguously classified.

use serde_json::{Map, Value, json};

use crate::errors::WireError;

/// A single protocol message, one per WebSocket text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Client → server write request. `{cmd, cid, data[, ack]}`
    Command {
        /// Handler name, a key into the command registry.
        name: String,
        /// Opaque client-generated correlation id.
        cid: String,
        /// Command payload.
        data: Value,
        /// Whether the caller wants a success reply.
        ack: bool,
    },

    /// Server → client command success. `{cid, result}` — sent only when the
    /// command carried the ack flag.
    CommandResult {
        /// Correlation id of the command being answered.
        cid: String,
        /// Handler result payload.
        result: Value,
    },

    /// Server → client command failure. `{cid, err}` — sent regardless of
    /// the ack flag.
    CommandError {
        /// Correlation id of the command being answered.
        cid: String,
        /// Error description.
        err: String,
    },

    /// Client → server read request. `{q, id[, params]}`
    Query {
        /// Handler name, a key into the query registry.
        name: String,
        /// Monotonically increasing per-connection id.
        id: u64,
        /// Optional query parameters.
        params: Option<Value>,
    },

    /// Server → client query stream element. `{id, row}` — 0..N per query,
    /// delivered in emission order.
    Row {
        /// Query id this row belongs to.
        id: u64,
        /// Row payload.
        row: Value,
    },

    /// Server → client clean end of a query stream. `{id}`
    End {
        /// Query id being terminated.
        id: u64,
    },

    /// Server → client query stream failure. `{id, err}` — replaces the end
    /// frame; rows already delivered remain valid.
    QueryError {
        /// Query id being terminated.
        id: u64,
        /// Error description.
        err: String,
    },

    /// Server → client broadcast. `{ev, data}` — uncorrelated, any time.
    Event {
        /// Channel name.
        channel: String,
        /// Event payload.
        data: Value,
    },

    /// Client → server subscription registration. `{sub}`
    Subscribe {
        /// Channel pattern (exact or trailing-`*` prefix).
        pattern: String,
    },

    /// Client → server subscription removal. `{unsub}`
    Unsubscribe {
        /// Channel pattern previously subscribed.
        pattern: String,
    },

    /// Server → client identity announcement. `{profile}` — the first frame
    /// after connect; `null` for an anonymous session.
    Profile {
        /// Resolved identity, or `Value::Null`.
        profile: Value,
    },
}

impl Frame {
    /// Build a command frame.
    pub fn command(
        name: impl Into<String>,
        cid: impl Into<String>,
        data: Value,
        ack: bool,
    ) -> Self {
        Self::Command {
            name: name.into(),
            cid: cid.into(),
            data,
            ack,
        }
    }

    /// Build an event frame.
    pub fn event(channel: impl Into<String>, data: Value) -> Self {
        Self::Event {
            channel: channel.into(),
            data,
        }
    }

    /// Encode to the wire JSON object.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Command {
                name,
                cid,
                data,
                ack,
            } => {
                let mut obj = json!({ "cmd": name, "cid": cid, "data": data });
                if *ack {
                    obj["ack"] = Value::Bool(true);
                }
                obj
            }
            Self::CommandResult { cid, result } => json!({ "cid": cid, "result": result }),
            Self::CommandError { cid, err } => json!({ "cid": cid, "err": err }),
            Self::Query { name, id, params } => match params {
                Some(p) => json!({ "q": name, "id": id, "params": p }),
                None => json!({ "q": name, "id": id }),
            },
            Self::Row { id, row } => json!({ "id": id, "row": row }),
            Self::End { id } => json!({ "id": id }),
            Self::QueryError { id, err } => json!({ "id": id, "err": err }),
            Self::Event { channel, data } => json!({ "ev": channel, "data": data }),
            Self::Subscribe { pattern } => json!({ "sub": pattern }),
            Self::Unsubscribe { pattern } => json!({ "unsub": pattern }),
            Self::Profile { profile } => json!({ "profile": profile }),
        }
    }

    /// Encode to a wire string (one frame per transport frame).
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode and classify a wire payload.
    ///
    /// Classification is structural, first match wins, in this exact
    /// precedence: command → query → command-result → command-error → row →
    /// query-error → end → event → subscribe → unsubscribe → profile.
    /// Reordering these checks would misroute payloads whose shapes overlap
    /// (an end frame is distinguished from a row or query-error frame only
    /// by the *absence* of the `row` and `err` keys).
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        Self::classify(&value)
    }

    /// Classify an already-decoded JSON value.
    pub fn classify(value: &Value) -> Result<Self, WireError> {
        let obj = value.as_object().ok_or(WireError::NotAnObject)?;

        if let Some(frame) = classify_command(obj) {
            return Ok(frame);
        }
        if let Some(frame) = classify_query(obj) {
            return Ok(frame);
        }
        if let Some(frame) = classify_command_reply(obj) {
            return Ok(frame);
        }
        if let Some(frame) = classify_query_reply(obj) {
            return Ok(frame);
        }
        if let Some(channel) = obj.get("ev").and_then(Value::as_str) {
            return Ok(Self::Event {
                channel: channel.to_owned(),
                data: obj.get("data").cloned().unwrap_or(Value::Null),
            });
        }
        if let Some(pattern) = obj.get("sub").and_then(Value::as_str) {
            return Ok(Self::Subscribe {
                pattern: pattern.to_owned(),
            });
        }
        if let Some(pattern) = obj.get("unsub").and_then(Value::as_str) {
            return Ok(Self::Unsubscribe {
                pattern: pattern.to_owned(),
            });
        }
        if let Some(profile) = obj.get("profile") {
            return Ok(Self::Profile {
                profile: profile.clone(),
            });
        }

        Err(WireError::Unclassifiable)
    }
}

fn classify_command(obj: &Map<String, Value>) -> Option<Frame> {
    let name = obj.get("cmd")?.as_str()?;
    let data = obj.get("data")?;
    let cid = obj.get("cid").and_then(Value::as_str).unwrap_or_default();
    Some(Frame::Command {
        name: name.to_owned(),
        cid: cid.to_owned(),
        data: data.clone(),
        ack: obj.get("ack").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn classify_query(obj: &Map<String, Value>) -> Option<Frame> {
    let name = obj.get("q")?.as_str()?;
    let id = obj.get("id").and_then(Value::as_u64)?;
    Some(Frame::Query {
        name: name.to_owned(),
        id,
        params: obj.get("params").cloned(),
    })
}

/// Command-result, then command-error: both keyed by `cid`.
fn classify_command_reply(obj: &Map<String, Value>) -> Option<Frame> {
    let cid = obj.get("cid")?.as_str()?;
    if let Some(result) = obj.get("result") {
        return Some(Frame::CommandResult {
            cid: cid.to_owned(),
            result: result.clone(),
        });
    }
    if let Some(err) = obj.get("err").and_then(Value::as_str) {
        return Some(Frame::CommandError {
            cid: cid.to_owned(),
            err: err.to_owned(),
        });
    }
    None
}

/// Row, then query-error, then end: all keyed by a numeric `id`. End is the
/// residual case — a bare numeric id with neither `row` nor `err`.
fn classify_query_reply(obj: &Map<String, Value>) -> Option<Frame> {
    let id = obj.get("id")?.as_u64()?;
    if let Some(row) = obj.get("row") {
        return Some(Frame::Row {
            id,
            row: row.clone(),
        });
    }
    if let Some(err) = obj.get("err").and_then(Value::as_str) {
        return Some(Frame::QueryError {
            id,
            err: err.to_owned(),
        });
    }
    Some(Frame::End { id })
}
