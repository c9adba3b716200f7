// ============================================================================
// Ops: operations available on each entity kind
// ============================================================================
//
// `Ops` is the common method set (exists, watch, delete, expire, container
// maintenance); `ContainerOps` adds item access for Set and Range. The
// per-kind structs (KeyNode, HashNode, SetNode, RangeNode) wrap a shared
// `NodeCore` and add their own inherent operations.
//
// ============================================================================

pub mod common;
pub mod container;
pub mod hash;
pub mod key;
pub mod range;
pub mod set;

use super::node::{Entity, NodeCore};
use crate::core::Result;
use crate::storage::Command;
use crate::transaction::Cx;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[async_trait]
pub trait Ops: Send + Sync {
    fn core(&self) -> &Arc<NodeCore>;

    fn key(&self) -> &str {
        self.core().key()
    }

    fn path(&self) -> String {
        self.core().path()
    }

    /// Declared child field `name`
    fn field(&self, name: &str) -> Result<Entity> {
        self.core().field(name).map(Entity::from_core)
    }

    async fn exists(&self, cx: &Cx) -> Result<bool> {
        let reply = cx.read(Command::Exists { key: self.path() }).await?;
        Ok(reply.as_bool())
    }

    /// Register this entity for optimistic-lock tracking
    async fn watch(&self, cx: &Cx) -> Result<()> {
        cx.watch(&self.path()).await
    }

    /// Delete only this entity's own data, leaving container membership
    /// and nested entities untouched
    async fn delete_this(&self, cx: &Cx) -> Result<()> {
        cx.write(Command::Del { key: self.path() }).await?;
        Ok(())
    }

    async fn expire(&self, cx: &Cx, seconds: u64) -> Result<()> {
        cx.write(Command::Expire {
            key: self.path(),
            seconds,
        })
        .await?;
        Ok(())
    }

    /// Make this entity a member of its parent container, cascading up
    async fn add_to_container(&self, cx: &Cx) -> Result<()> {
        common::add_to_container(cx, self.core()).await
    }

    /// Remove from the parent container and delete this entity's data and
    /// everything nested under it
    ///
    /// Retried on conflict when a concurrent writer changes a watched
    /// container. Deleting an absent entity is a no-op.
    async fn delete(&self, cx: &Cx) -> Result<()> {
        common::delete(cx, self.core()).await
    }
}

#[async_trait]
pub trait ContainerOps: Ops {
    /// Member keys, in container order
    async fn members(&self, cx: &Cx) -> Result<Vec<String>> {
        container::members(cx, self.core()).await
    }

    fn item(&self, key: &str) -> Entity {
        self.item_with(key, Vec::new())
    }

    /// Item `key`, carrying extra arguments used when it is later removed
    /// from this container
    fn item_with(&self, key: &str, item_args: Vec<String>) -> Entity {
        Entity::from_core(self.core().item(key, item_args))
    }

    /// Shape the per-item values into this container's items view
    fn map_items(&self, keys: Vec<String>, values: Vec<JsonValue>) -> JsonValue;

    /// Read every item
    async fn items(&self, cx: &Cx) -> Result<JsonValue> {
        let (keys, values) = container::read_items(cx, self.core()).await?;
        Ok(self.map_items(keys, values))
    }

    /// Delete every item
    async fn delete_contained(&self, cx: &Cx) -> Result<()> {
        container::delete_contained(cx, self.core()).await
    }
}
