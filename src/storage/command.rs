use std::collections::BTreeMap;
use std::fmt;

/// A single backing-store command.
///
/// Commands are plain data so they can be executed immediately on a
/// connection or queued into a `multi` batch and replayed at `exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
    Exists { key: String },
    Expire { key: String, seconds: u64 },

    HSet { key: String, fields: BTreeMap<String, String> },
    HGet { key: String, field: String },
    HGetAll { key: String },
    HDel { key: String, fields: Vec<String> },

    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    SIsMember { key: String, member: String },
    SMembers { key: String },

    RPush { key: String, member: String },
    LRange { key: String, start: i64, stop: i64 },
    /// `count == 0` removes every occurrence, `> 0` from the head, `< 0` from the tail.
    LRem { key: String, count: i64, member: String },
    LPos { key: String, member: String },
}

impl Command {
    pub fn key(&self) -> &str {
        match self {
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Del { key }
            | Command::Exists { key }
            | Command::Expire { key, .. }
            | Command::HSet { key, .. }
            | Command::HGet { key, .. }
            | Command::HGetAll { key }
            | Command::HDel { key, .. }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::SIsMember { key, .. }
            | Command::SMembers { key }
            | Command::RPush { key, .. }
            | Command::LRange { key, .. }
            | Command::LRem { key, .. }
            | Command::LPos { key, .. } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Expire { .. } => "EXPIRE",
            Command::HSet { .. } => "HSET",
            Command::HGet { .. } => "HGET",
            Command::HGetAll { .. } => "HGETALL",
            Command::HDel { .. } => "HDEL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SMembers { .. } => "SMEMBERS",
            Command::RPush { .. } => "RPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::LRem { .. } => "LREM",
            Command::LPos { .. } => "LPOS",
        }
    }

    /// Whether the command mutates the keyspace.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del { .. }
                | Command::Expire { .. }
                | Command::HSet { .. }
                | Command::HDel { .. }
                | Command::SAdd { .. }
                | Command::SRem { .. }
                | Command::RPush { .. }
                | Command::LRem { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_classification() {
        let write = Command::RPush {
            key: "l".into(),
            member: "a".into(),
        };
        let read = Command::LPos {
            key: "l".into(),
            member: "a".into(),
        };
        assert!(write.is_write());
        assert!(!read.is_write());
        assert_eq!(write.to_string(), "RPUSH l");
    }
}
