use super::Ops;
use super::common::add_to_container;
use crate::core::Result;
use crate::schema::node::NodeCore;
use crate::storage::Command;
use crate::transaction::Cx;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flat field→value map
#[derive(Debug, Clone)]
pub struct HashNode {
    core: Arc<NodeCore>,
}

impl HashNode {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self { core }
    }

    /// Write `fields` and register this hash with its container, atomically
    pub async fn set<I, K, V>(&self, cx: &Cx, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let core = Arc::clone(&self.core);
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();

        cx.multi(|cx, ()| async move {
            add_to_container(&cx, &core).await?;
            cx.write(Command::HSet {
                key: core.path(),
                fields,
            })
            .await?;
            Ok(())
        })
        .exec()
        .await?;
        Ok(())
    }

    pub async fn get(&self, cx: &Cx, field: &str) -> Result<Option<String>> {
        let reply = cx
            .read(Command::HGet {
                key: self.path(),
                field: field.to_string(),
            })
            .await?;
        Ok(reply.into_string())
    }

    /// Whole map; empty when the hash does not exist
    pub async fn get_all(&self, cx: &Cx) -> Result<BTreeMap<String, String>> {
        let reply = cx.read(Command::HGetAll { key: self.path() }).await?;
        Ok(reply.into_hash())
    }

    /// Remove `fields`, returning how many existed
    pub async fn remove<I, K>(&self, cx: &Cx, fields: I) -> Result<i64>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Ok(0);
        }

        let reply = cx
            .write(Command::HDel {
                key: self.path(),
                fields,
            })
            .await?;
        Ok(reply.as_int().unwrap_or(0))
    }
}

impl Ops for HashNode {
    fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}
