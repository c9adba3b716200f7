use super::common::add_to_container;
use super::{ContainerOps, Ops, container};
use crate::core::Result;
use crate::schema::node::{Entity, NodeCore};
use crate::schema::spec::OpsKind;
use crate::storage::Command;
use crate::transaction::Cx;
use serde_json::{Map, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;

/// Ordered container of unique member keys
#[derive(Debug, Clone)]
pub struct RangeNode {
    core: Arc<NodeCore>,
}

impl RangeNode {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self { core }
    }

    /// Append `member` unless already present; true when appended
    ///
    /// Watches the list and checks membership first, so two concurrent
    /// adds of the same member cannot both append.
    pub async fn add(&self, cx: &Cx, member: &str) -> Result<bool> {
        let path = self.path();
        let core = Arc::clone(&self.core);
        let push = Command::RPush {
            key: path.clone(),
            member: member.to_string(),
        };
        let lookup = Command::LPos {
            key: path.clone(),
            member: member.to_string(),
        };

        let exec = cx
            .isolated(|cx| async move {
                cx.watch(&path).await?;
                Ok(cx.read(lookup).await?.is_nil())
            })
            .multi(|cx, absent| async move {
                add_to_container(&cx, &core).await?;
                let append = absent && !cx.is_queued(&push);
                if append {
                    cx.write(push).await?;
                }
                Ok(append)
            })
            .exec()
            .await?;
        Ok(exec.value)
    }

    /// Remove occurrences of `member` (LREM count semantics, 0 = all)
    ///
    /// Returns how many were removed; 0 when only queued inside a `multi`.
    pub async fn remove(&self, cx: &Cx, member: &str, count: i64) -> Result<i64> {
        let reply = cx
            .write(Command::LRem {
                key: self.path(),
                count,
                member: member.to_string(),
            })
            .await?;
        Ok(reply.as_int().unwrap_or(0))
    }

    /// Ordered slice, inclusive, negative indexes count from the end
    pub async fn get(&self, cx: &Cx, start: i64, stop: i64) -> Result<Vec<String>> {
        let reply = cx
            .read(Command::LRange {
                key: self.path(),
                start,
                stop,
            })
            .await?;
        Ok(reply.into_list())
    }

    pub async fn position(&self, cx: &Cx, member: &str) -> Result<Option<i64>> {
        let reply = cx
            .read(Command::LPos {
                key: self.path(),
                member: member.to_string(),
            })
            .await?;
        Ok(reply.as_int())
    }

    /// Items view built from `read(item)` instead of the default read
    pub async fn items_with<F, Fut>(&self, cx: &Cx, read: F) -> Result<JsonValue>
    where
        F: Fn(Cx, Entity) -> Fut,
        Fut: Future<Output = Result<JsonValue>>,
    {
        let (keys, values) = container::items_with(cx, &self.core, read).await?;
        Ok(self.map_items(keys, values))
    }
}

impl Ops for RangeNode {
    fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}

impl ContainerOps for RangeNode {
    /// Hash items: `[{id, ...fields}]`. Anything else: `[{id, data}]`.
    fn map_items(&self, keys: Vec<String>, values: Vec<JsonValue>) -> JsonValue {
        let hash_items = self.core.spec().contained_or_default().kind == OpsKind::Hash;

        keys.into_iter()
            .zip(values)
            .map(|(id, value)| {
                let mut item = Map::new();
                item.insert("id".into(), JsonValue::String(id));
                match value {
                    JsonValue::Object(fields) if hash_items => item.extend(fields),
                    data => {
                        item.insert("data".into(), data);
                    }
                }
                JsonValue::Object(item)
            })
            .collect()
    }
}
