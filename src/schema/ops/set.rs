use super::common::add_to_container;
use super::{ContainerOps, Ops, container};
use crate::core::Result;
use crate::schema::node::{Entity, NodeCore};
use crate::storage::Command;
use crate::transaction::Cx;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

/// Unordered container of member keys
#[derive(Debug, Clone)]
pub struct SetNode {
    core: Arc<NodeCore>,
}

impl SetNode {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self { core }
    }

    /// Add `member`, registering this set with its own container first
    pub async fn add(&self, cx: &Cx, member: &str) -> Result<()> {
        let core = Arc::clone(&self.core);
        let member = member.to_string();

        cx.multi(|cx, ()| async move {
            add_to_container(&cx, &core).await?;
            cx.write(Command::SAdd {
                key: core.path(),
                member,
            })
            .await?;
            Ok(())
        })
        .exec()
        .await?;
        Ok(())
    }

    /// Remove `member`; true when it was present
    ///
    /// Inside a `multi` body the removal is only queued and this reports
    /// `false`, like `RangeNode::remove` reporting 0.
    pub async fn remove(&self, cx: &Cx, member: &str) -> Result<bool> {
        let reply = cx
            .write(Command::SRem {
                key: self.path(),
                member: member.to_string(),
            })
            .await?;
        Ok(reply.as_int().is_some_and(|removed| removed > 0))
    }

    pub async fn has(&self, cx: &Cx, member: &str) -> Result<bool> {
        let reply = cx
            .read(Command::SIsMember {
                key: self.path(),
                member: member.to_string(),
            })
            .await?;
        Ok(reply.as_bool())
    }

    pub async fn get(&self, cx: &Cx) -> Result<BTreeSet<String>> {
        let reply = cx.read(Command::SMembers { key: self.path() }).await?;
        Ok(reply.into_list().into_iter().collect())
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

impl Ops for SetNode {
    fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}

impl ContainerOps for SetNode {
    /// `{member: data}`
    fn map_items(&self, keys: Vec<String>, values: Vec<JsonValue>) -> JsonValue {
        let object: Map<String, JsonValue> = keys.into_iter().zip(values).collect();
        JsonValue::Object(object)
    }
}
