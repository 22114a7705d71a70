//! Message envelopes and the opaque payload values they carry.

use std::fmt;

/// Clock stamp carried by flusher sentinels enqueued during teardown.
pub const FLUSH_CLK: i64 = -1;

/// An opaque payload value.
///
/// The runtime core never interprets payloads beyond two operations: cloning
/// (constant channels hand out a fresh copy on every read) and fan-index
/// projection (selecting one field of a [`Value::Record`]). Type enforcement
/// is the graph builder's concern, not the scheduler's.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Composite payload whose fields can be routed to different consumers.
    Record(Vec<(String, Value)>),
}

impl Value {
    /// Builds a record payload from named fields.
    pub fn record<K, I>(fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up one field of a record payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The envelope moved through channels: a payload and a logical-clock stamp.
///
/// A payload of `None` is the absent value; channels drop absent payloads on
/// write, so the only `None`-payload messages a consumer can observe are the
/// synthetic ones produced by [`Message::absent`] (empty optional reads) and
/// [`Message::flusher`] (teardown sentinels).
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub payload: Option<Value>,
    pub clk: i64,
}

impl Message {
    pub fn new(payload: Option<Value>, clk: i64) -> Message {
        Message { payload, clk }
    }

    /// The absent message handed to optional inputs with nothing pending.
    pub fn absent() -> Message {
        Message { payload: None, clk: 0 }
    }

    /// The sentinel enqueued by `flush` to release a blocked reader.
    pub fn flusher() -> Message {
        Message { payload: None, clk: FLUSH_CLK }
    }

    pub fn is_flush(&self) -> bool {
        self.clk == FLUSH_CLK && self.payload.is_none()
    }

    /// Projects the payload to one record field, keeping the clock stamp.
    ///
    /// With no fan index the message passes through unchanged. Projecting an
    /// absent payload, a non-record payload, or a missing field yields an
    /// absent payload, which the channel layer then drops.
    pub fn project(&self, fan_index: Option<&str>) -> Message {
        match fan_index {
            None => self.clone(),
            Some(name) => Message {
                payload: self
                    .payload
                    .as_ref()
                    .and_then(|v| v.field(name).cloned()),
                clk: self.clk,
            },
        }
    }
}
