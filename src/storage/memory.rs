use super::command::Command;
use super::engine::{KeyValueStore, WatchGuard};
use crate::core::{KvError, Reply, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

// Process-wide keyspaces by database name, shared by every `Client::connect`
lazy_static! {
    static ref DATABASES: Mutex<HashMap<String, Arc<MemoryStore>>> = Mutex::new(HashMap::new());
}

#[derive(Debug, Clone)]
enum Stored {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    List(Vec<String>),
}

impl Stored {
    fn is_empty(&self) -> bool {
        match self {
            Stored::Str(_) => false,
            Stored::Hash(map) => map.is_empty(),
            Stored::Set(set) => set.is_empty(),
            Stored::List(list) => list.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Keyspace guarded by the store lock.
///
/// `versions` outlives deleted keys so a watch on a key that is removed and
/// recreated still observes the change.
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    clock: u64,
}

impl Keyspace {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn live(&self, key: &str) -> Option<&Stored> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.value)
    }

    fn has_expired(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|e| e.is_expired(now))
    }

    /// Drop `key` once its deadline passed, bumping its version so
    /// watchers see the expiry as a change
    fn purge_if_expired(&mut self, key: &str) {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            self.touch(key);
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn slot(&mut self, key: &str, create: fn() -> Stored) -> &mut Stored {
        self.purge_if_expired(key);
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(create()))
            .value
    }

    fn read(&self, command: &Command) -> Result<Reply> {
        let key = command.key();
        let value = self.live(key);

        match command {
            Command::Get { .. } => match value {
                None => Ok(Reply::Nil),
                Some(Stored::Str(s)) => Ok(Reply::Str(s.clone())),
                Some(_) => Err(wrong_type(key, "string")),
            },
            Command::Exists { .. } => Ok(Reply::Int(i64::from(value.is_some()))),
            Command::HGet { field, .. } => match value {
                None => Ok(Reply::Nil),
                Some(Stored::Hash(map)) => Ok(map
                    .get(field)
                    .map(|v| Reply::Str(v.clone()))
                    .unwrap_or(Reply::Nil)),
                Some(_) => Err(wrong_type(key, "hash")),
            },
            Command::HGetAll { .. } => match value {
                None => Ok(Reply::Hash(BTreeMap::new())),
                Some(Stored::Hash(map)) => Ok(Reply::Hash(map.clone())),
                Some(_) => Err(wrong_type(key, "hash")),
            },
            Command::SIsMember { member, .. } => match value {
                None => Ok(Reply::Bool(false)),
                Some(Stored::Set(set)) => Ok(Reply::Bool(set.contains(member))),
                Some(_) => Err(wrong_type(key, "set")),
            },
            Command::SMembers { .. } => match value {
                None => Ok(Reply::List(Vec::new())),
                Some(Stored::Set(set)) => Ok(Reply::List(set.iter().cloned().collect())),
                Some(_) => Err(wrong_type(key, "set")),
            },
            Command::LRange { start, stop, .. } => match value {
                None => Ok(Reply::List(Vec::new())),
                Some(Stored::List(list)) => Ok(Reply::List(list_range(list, *start, *stop))),
                Some(_) => Err(wrong_type(key, "list")),
            },
            Command::LPos { member, .. } => match value {
                None => Ok(Reply::Nil),
                Some(Stored::List(list)) => Ok(list
                    .iter()
                    .position(|m| m == member)
                    .map(|i| Reply::Int(i as i64))
                    .unwrap_or(Reply::Nil)),
                Some(_) => Err(wrong_type(key, "list")),
            },
            other => Err(KvError::Execution(format!(
                "{} is not a read command",
                other.name()
            ))),
        }
    }

    fn apply(&mut self, command: Command) -> Result<Reply> {
        if !command.is_write() {
            return self.read(&command);
        }

        match command {
            Command::Set { key, value } => {
                self.purge_if_expired(&key);
                self.entries.insert(key.clone(), Entry::new(Stored::Str(value)));
                self.touch(&key);
                Ok(Reply::Ok)
            }
            Command::Del { key } => {
                self.purge_if_expired(&key);
                if self.entries.remove(&key).is_some() {
                    self.touch(&key);
                    Ok(Reply::Int(1))
                } else {
                    Ok(Reply::Int(0))
                }
            }
            Command::Expire { key, seconds } => {
                self.purge_if_expired(&key);
                let Some(entry) = self.entries.get_mut(&key) else {
                    return Ok(Reply::Int(0));
                };
                if seconds == 0 {
                    self.entries.remove(&key);
                } else {
                    entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                }
                self.touch(&key);
                Ok(Reply::Int(1))
            }
            Command::HSet { key, fields } => {
                if fields.is_empty() {
                    return Ok(Reply::Int(0));
                }
                let Stored::Hash(map) = self.slot(&key, || Stored::Hash(BTreeMap::new())) else {
                    return Err(wrong_type(&key, "hash"));
                };
                let mut added = 0;
                for (field, value) in fields {
                    if map.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                self.touch(&key);
                Ok(Reply::Int(added))
            }
            Command::HDel { key, fields } => {
                self.purge_if_expired(&key);
                let removed = match self.entries.get_mut(&key).map(|e| &mut e.value) {
                    None => 0,
                    Some(Stored::Hash(map)) => {
                        fields.iter().filter(|f| map.remove(f.as_str()).is_some()).count()
                    }
                    Some(_) => return Err(wrong_type(&key, "hash")),
                };
                if removed > 0 {
                    self.drop_if_empty(&key);
                    self.touch(&key);
                }
                Ok(Reply::Int(removed as i64))
            }
            Command::SAdd { key, member } => {
                let Stored::Set(set) = self.slot(&key, || Stored::Set(BTreeSet::new())) else {
                    return Err(wrong_type(&key, "set"));
                };
                let added = set.insert(member);
                if added {
                    self.touch(&key);
                }
                Ok(Reply::Int(i64::from(added)))
            }
            Command::SRem { key, member } => {
                self.purge_if_expired(&key);
                let removed = match self.entries.get_mut(&key).map(|e| &mut e.value) {
                    None => false,
                    Some(Stored::Set(set)) => set.remove(&member),
                    Some(_) => return Err(wrong_type(&key, "set")),
                };
                if removed {
                    self.drop_if_empty(&key);
                    self.touch(&key);
                }
                Ok(Reply::Int(i64::from(removed)))
            }
            Command::RPush { key, member } => {
                let Stored::List(list) = self.slot(&key, || Stored::List(Vec::new())) else {
                    return Err(wrong_type(&key, "list"));
                };
                list.push(member);
                let len = list.len() as i64;
                self.touch(&key);
                Ok(Reply::Int(len))
            }
            Command::LRem { key, count, member } => {
                self.purge_if_expired(&key);
                let removed = match self.entries.get_mut(&key).map(|e| &mut e.value) {
                    None => 0,
                    Some(Stored::List(list)) => list_remove(list, count, &member),
                    Some(_) => return Err(wrong_type(&key, "list")),
                };
                if removed > 0 {
                    self.drop_if_empty(&key);
                    self.touch(&key);
                }
                Ok(Reply::Int(removed as i64))
            }
            other => self.read(&other),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> KvError {
    KvError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn list_range(list: &[String], start: i64, stop: i64) -> Vec<String> {
    let len = list.len() as i64;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return Vec::new();
    }

    list[start as usize..=stop as usize].to_vec()
}

fn list_remove(list: &mut Vec<String>, count: i64, member: &str) -> usize {
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };
    let mut removed = 0;

    if count >= 0 {
        list.retain(|m| {
            if removed < limit && m == member {
                removed += 1;
                false
            } else {
                true
            }
        });
    } else {
        let mut index = list.len();
        while index > 0 && removed < limit {
            index -= 1;
            if list[index] == member {
                list.remove(index);
                removed += 1;
            }
        }
    }

    removed
}

/// In-process key-value store with Redis-shaped commands and
/// version-based watch guards.
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
        }
    }

    /// Process-wide store for `database`, created on first use
    ///
    /// Clients connecting to the same database name share one keyspace;
    /// different names never see each other's keys.
    pub fn database(name: &str) -> Arc<MemoryStore> {
        let mut databases = DATABASES
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            databases
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new())),
        )
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let keyspace = self.keyspace.read().await;
        let now = Instant::now();
        let mut keys: Vec<String> = keyspace
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn execute(&self, command: Command) -> Result<Reply> {
        if !command.is_write() {
            let keyspace = self.keyspace.read().await;
            if !keyspace.has_expired(command.key()) {
                return keyspace.read(&command);
            }
        }

        // writes, and reads that find an expired key to reclaim
        let mut keyspace = self.keyspace.write().await;
        if command.is_write() {
            keyspace.apply(command)
        } else {
            keyspace.purge_if_expired(command.key());
            keyspace.read(&command)
        }
    }

    async fn version(&self, key: &str) -> Result<u64> {
        let mut keyspace = self.keyspace.write().await;
        keyspace.purge_if_expired(key);
        Ok(keyspace.versions.get(key).copied().unwrap_or(0))
    }

    async fn exec_atomic(
        &self,
        guards: &[WatchGuard],
        commands: Vec<Command>,
    ) -> Result<Vec<Reply>> {
        let mut keyspace = self.keyspace.write().await;

        for guard in guards {
            keyspace.purge_if_expired(&guard.key);
            let current = keyspace.versions.get(&guard.key).copied().unwrap_or(0);
            if current != guard.version {
                return Err(KvError::Conflict {
                    key: guard.key.clone(),
                });
            }
        }

        Ok(commands
            .into_iter()
            .map(|command| {
                keyspace
                    .apply(command)
                    .unwrap_or_else(|err| Reply::Error(err.to_string()))
            })
            .collect())
    }
}
