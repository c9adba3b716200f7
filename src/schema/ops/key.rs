use super::Ops;
use super::common::add_to_container;
use crate::core::Result;
use crate::schema::node::NodeCore;
use crate::storage::Command;
use crate::transaction::Cx;
use std::sync::Arc;

/// Single scalar value
#[derive(Debug, Clone)]
pub struct KeyNode {
    core: Arc<NodeCore>,
}

impl KeyNode {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        Self { core }
    }

    /// Store `value` and register this key with its container
    pub async fn set(&self, cx: &Cx, value: impl Into<String>) -> Result<()> {
        let core = Arc::clone(&self.core);
        let value = value.into();

        cx.multi(|cx, ()| async move {
            add_to_container(&cx, &core).await?;
            cx.write(Command::Set {
                key: core.path(),
                value,
            })
            .await?;
            Ok(())
        })
        .exec()
        .await?;
        Ok(())
    }

    pub async fn get(&self, cx: &Cx) -> Result<Option<String>> {
        let reply = cx.read(Command::Get { key: self.path() }).await?;
        Ok(reply.into_string())
    }
}

impl Ops for KeyNode {
    fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}
