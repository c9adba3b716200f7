use super::container;
use super::range::RangeNode;
use super::set::SetNode;
use crate::core::Result;
use crate::schema::node::NodeCore;
use crate::schema::spec::OpsKind;
use crate::storage::Command;
use crate::transaction::Cx;
use async_recursion::async_recursion;
use futures::future::try_join_all;
use std::sync::Arc;

/// Add `node` to its nearest container ancestor
///
/// Non-container parents are skipped over. The container's own `add`
/// carries the cascade further up.
#[async_recursion]
pub(crate) async fn add_to_container(cx: &Cx, node: &Arc<NodeCore>) -> Result<()> {
    let Some(parent) = node.parent() else {
        return Ok(());
    };

    match parent.kind() {
        OpsKind::Set => {
            SetNode::from_core(Arc::clone(parent))
                .add(cx, node.key())
                .await
        }
        OpsKind::Range => {
            RangeNode::from_core(Arc::clone(parent))
                .add(cx, node.key())
                .await?;
            Ok(())
        }
        _ => add_to_container(cx, parent).await,
    }
}

/// Remove `node` from its parent container, if it has one
pub(crate) async fn remove_from_container(cx: &Cx, node: &NodeCore) -> Result<()> {
    let Some(parent) = node.container_parent() else {
        return Ok(());
    };

    let member = node.key().to_string();
    let command = match parent.kind() {
        OpsKind::Range => Command::LRem {
            key: parent.path(),
            count: removal_count(node),
            member,
        },
        _ => Command::SRem {
            key: parent.path(),
            member,
        },
    };
    cx.write(command).await?;
    Ok(())
}

/// LREM count for range items: first item argument, 0 (all) by default
fn removal_count(node: &NodeCore) -> i64 {
    node.item_args()
        .first()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0)
}

pub(crate) async fn delete(cx: &Cx, node: &Arc<NodeCore>) -> Result<()> {
    cx.retry_on_conflict(|cx| delete_once(cx, Arc::clone(node)))
        .await
}

async fn delete_once(cx: Cx, node: Arc<NodeCore>) -> Result<()> {
    let scanned = Arc::clone(&node);

    cx.isolated(move |cx| async move {
        if let Some(parent) = scanned.container_parent() {
            cx.watch(&parent.path()).await?;
        }
        doomed_paths(&cx, &scanned).await
    })
    .multi(move |cx, doomed| async move {
        remove_from_container(&cx, &node).await?;
        for key in doomed {
            cx.write(Command::Del { key }).await?;
        }
        Ok(())
    })
    .exec()
    .await?;

    Ok(())
}

/// Every store key owned by `node` and the entities nested under it
///
/// Containers are watched before their members are read, so a member added
/// concurrently aborts the delete instead of being orphaned.
#[async_recursion]
async fn doomed_paths(cx: &Cx, node: &Arc<NodeCore>) -> Result<Vec<String>> {
    let path = node.path();
    let mut doomed = Vec::new();

    if node.kind().is_container() {
        cx.watch(&path).await?;
        let items: Vec<_> = container::members(cx, node)
            .await?
            .iter()
            .map(|member| node.item(member, Vec::new()))
            .collect();
        let nested = try_join_all(items.iter().map(|item| doomed_paths(cx, item))).await?;
        doomed.extend(nested.into_iter().flatten());
    }

    for field in node.fields() {
        doomed.extend(doomed_paths(cx, &field).await?);
    }

    if node.kind() != OpsKind::Scheme {
        doomed.push(path);
    }
    Ok(doomed)
}
