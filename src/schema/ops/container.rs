use crate::core::Result;
use crate::schema::node::{Entity, NodeCore};
use crate::schema::spec::OpsKind;
use crate::storage::Command;
use crate::transaction::Cx;
use futures::future::try_join_all;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;

pub(crate) async fn members(cx: &Cx, container: &NodeCore) -> Result<Vec<String>> {
    let key = container.path();
    let command = match container.kind() {
        OpsKind::Set => Command::SMembers { key },
        OpsKind::Range => Command::LRange {
            key,
            start: 0,
            stop: -1,
        },
        _ => return Ok(Vec::new()),
    };
    Ok(cx.read(command).await?.into_list())
}

/// Member keys paired with `read(item)` for each, read concurrently
pub(crate) async fn items_with<F, Fut>(
    cx: &Cx,
    container: &Arc<NodeCore>,
    read: F,
) -> Result<(Vec<String>, Vec<JsonValue>)>
where
    F: Fn(Cx, Entity) -> Fut,
    Fut: Future<Output = Result<JsonValue>>,
{
    let keys = members(cx, container).await?;
    let values = try_join_all(keys.iter().map(|key| {
        let item = Entity::from_core(container.item(key, Vec::new()));
        read(cx.clone(), item)
    }))
    .await?;
    Ok((keys, values))
}

pub(crate) async fn read_items(
    cx: &Cx,
    container: &Arc<NodeCore>,
) -> Result<(Vec<String>, Vec<JsonValue>)> {
    items_with(cx, container, |cx, item| async move { item.read(&cx).await }).await
}

pub(crate) async fn delete_contained(cx: &Cx, container: &Arc<NodeCore>) -> Result<()> {
    let items: Vec<_> = members(cx, container)
        .await?
        .iter()
        .map(|key| Entity::from_core(container.item(key, Vec::new())))
        .collect();
    try_join_all(items.iter().map(|item| item.delete(cx))).await?;
    Ok(())
}
