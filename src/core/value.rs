use std::collections::BTreeMap;
use std::fmt;

/// Reply returned by the backing store for a single command.
///
/// The shape follows the Redis reply model: nil, integers, bulk strings and
/// arrays. Hash replies keep field order stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Ok,
    /// Write accepted into an open `multi` batch, result pending `exec`.
    Queued,
    Int(i64),
    Bool(bool),
    Str(String),
    List(Vec<String>),
    Hash(BTreeMap<String, String>),
    /// Per-command failure inside an executed batch.
    Error(String),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(n) => Some(*n),
            Reply::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Reply::Bool(b) => *b,
            Reply::Int(n) => *n != 0,
            Reply::Ok | Reply::Queued => true,
            _ => false,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Reply::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            Reply::List(items) => items,
            _ => Vec::new(),
        }
    }

    pub fn into_hash(self) -> BTreeMap<String, String> {
        match self {
            Reply::Hash(map) => map,
            _ => BTreeMap::new(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => write!(f, "(nil)"),
            Reply::Ok => write!(f, "OK"),
            Reply::Queued => write!(f, "QUEUED"),
            Reply::Int(n) => write!(f, "(integer) {}", n),
            Reply::Bool(b) => write!(f, "(integer) {}", i64::from(*b)),
            Reply::Str(s) => write!(f, "\"{}\"", s),
            Reply::List(items) => write!(f, "{:?}", items),
            Reply::Hash(map) => write!(f, "{:?}", map),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
        }
    }
}
