use super::ops::hash::HashNode;
use super::ops::key::KeyNode;
use super::ops::range::RangeNode;
use super::ops::set::SetNode;
use super::ops::{ContainerOps, Ops};
use super::spec::{OpsKind, SpecNode};
use crate::core::{KvError, Result};
use crate::transaction::Cx;
use async_recursion::async_recursion;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Path-bound handle over one store location
///
/// Building a node never touches the store. Nodes are cheap and compare by
/// path.
#[derive(Debug)]
pub struct NodeCore {
    key: String,
    parent: Option<Arc<NodeCore>>,
    spec: Arc<SpecNode>,
    item_args: Vec<String>,
}

impl NodeCore {
    pub(crate) fn new(
        key: impl Into<String>,
        parent: Option<Arc<NodeCore>>,
        spec: Arc<SpecNode>,
        item_args: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            parent,
            spec,
            item_args,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> OpsKind {
        self.spec.kind
    }

    pub fn parent(&self) -> Option<&Arc<NodeCore>> {
        self.parent.as_ref()
    }

    pub fn spec(&self) -> &Arc<SpecNode> {
        &self.spec
    }

    /// Extra arguments given when this node was created as a container item
    pub fn item_args(&self) -> &[String] {
        &self.item_args
    }

    /// `:`-joined keys from the outermost ancestor down to this node
    pub fn path(&self) -> String {
        let mut pieces = Vec::new();
        self.assemble_path(&mut pieces);
        pieces.join(":")
    }

    fn assemble_path<'a>(&'a self, pieces: &mut Vec<&'a str>) {
        if let Some(parent) = &self.parent {
            parent.assemble_path(pieces);
        }
        pieces.push(&self.key);
    }

    /// The parent, when it is a container holding this node as a member
    pub fn container_parent(&self) -> Option<&Arc<NodeCore>> {
        self.parent.as_ref().filter(|parent| parent.kind().is_container())
    }

    /// Declared child field `name`
    pub fn field(self: &Arc<Self>, name: &str) -> Result<Arc<NodeCore>> {
        let spec = self
            .spec
            .fields
            .get(name)
            .ok_or_else(|| KvError::UnknownField {
                path: self.path(),
                field: name.to_string(),
            })?;
        Ok(NodeCore::new(
            name,
            Some(Arc::clone(self)),
            Arc::clone(spec),
            Vec::new(),
        ))
    }

    /// Child fields in declaration order
    pub fn fields(self: &Arc<Self>) -> Vec<Arc<NodeCore>> {
        self.spec
            .fields
            .iter()
            .map(|(name, spec)| {
                NodeCore::new(
                    name.as_str(),
                    Some(Arc::clone(self)),
                    Arc::clone(spec),
                    Vec::new(),
                )
            })
            .collect()
    }

    /// Container item `key`
    pub fn item(self: &Arc<Self>, key: &str, item_args: Vec<String>) -> Arc<NodeCore> {
        NodeCore::new(
            key,
            Some(Arc::clone(self)),
            self.spec.contained_or_default(),
            item_args,
        )
    }
}

/// Plain grouping node: named fields, no data of its own
#[derive(Debug, Clone)]
pub struct SchemeNode {
    core: Arc<NodeCore>,
}

impl Ops for SchemeNode {
    fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}

/// Any schema node, typed by its entity kind
#[derive(Debug, Clone)]
pub enum Entity {
    Scheme(SchemeNode),
    Key(KeyNode),
    Hash(HashNode),
    Set(SetNode),
    Range(RangeNode),
}

impl Entity {
    pub(crate) fn from_core(core: Arc<NodeCore>) -> Self {
        match core.kind() {
            OpsKind::Scheme => Entity::Scheme(SchemeNode { core }),
            OpsKind::Key => Entity::Key(KeyNode::from_core(core)),
            OpsKind::Hash => Entity::Hash(HashNode::from_core(core)),
            OpsKind::Set => Entity::Set(SetNode::from_core(core)),
            OpsKind::Range => Entity::Range(RangeNode::from_core(core)),
        }
    }

    pub fn ops(&self) -> &dyn Ops {
        match self {
            Entity::Scheme(node) => node,
            Entity::Key(node) => node,
            Entity::Hash(node) => node,
            Entity::Set(node) => node,
            Entity::Range(node) => node,
        }
    }

    pub fn container(&self) -> Option<&dyn ContainerOps> {
        match self {
            Entity::Set(node) => Some(node),
            Entity::Range(node) => Some(node),
            _ => None,
        }
    }

    pub fn core(&self) -> &Arc<NodeCore> {
        self.ops().core()
    }

    pub fn kind(&self) -> OpsKind {
        self.core().kind()
    }

    pub fn key(&self) -> &str {
        self.core().key()
    }

    pub fn path(&self) -> String {
        self.core().path()
    }

    pub fn field(&self, name: &str) -> Result<Entity> {
        self.ops().field(name)
    }

    fn mismatch(&self, expected: OpsKind) -> KvError {
        KvError::KindMismatch {
            path: self.path(),
            expected: expected.name(),
            actual: self.kind().name(),
        }
    }

    pub fn into_scheme(self) -> Result<SchemeNode> {
        match self {
            Entity::Scheme(node) => Ok(node),
            other => Err(other.mismatch(OpsKind::Scheme)),
        }
    }

    pub fn into_key(self) -> Result<KeyNode> {
        match self {
            Entity::Key(node) => Ok(node),
            other => Err(other.mismatch(OpsKind::Key)),
        }
    }

    pub fn into_hash(self) -> Result<HashNode> {
        match self {
            Entity::Hash(node) => Ok(node),
            other => Err(other.mismatch(OpsKind::Hash)),
        }
    }

    pub fn into_set(self) -> Result<SetNode> {
        match self {
            Entity::Set(node) => Ok(node),
            other => Err(other.mismatch(OpsKind::Set)),
        }
    }

    pub fn into_range(self) -> Result<RangeNode> {
        match self {
            Entity::Range(node) => Ok(node),
            other => Err(other.mismatch(OpsKind::Range)),
        }
    }

    /// Read this entity's data as JSON
    ///
    /// Key: string or null. Hash: object. Set and Range: member array.
    /// Scheme: object of its fields read recursively, null without fields.
    #[async_recursion]
    pub async fn read(&self, cx: &Cx) -> Result<JsonValue> {
        match self {
            Entity::Key(node) => Ok(node.get(cx).await?.map_or(JsonValue::Null, JsonValue::from)),
            Entity::Hash(node) => {
                let map = node.get_all(cx).await?;
                Ok(JsonValue::Object(
                    map.into_iter()
                        .map(|(field, value)| (field, JsonValue::String(value)))
                        .collect(),
                ))
            }
            Entity::Set(node) => Ok(JsonValue::from(
                node.get(cx).await?.into_iter().collect::<Vec<_>>(),
            )),
            Entity::Range(node) => Ok(JsonValue::from(node.get(cx, 0, -1).await?)),
            Entity::Scheme(node) => {
                let fields = node.core().fields();
                if fields.is_empty() {
                    return Ok(JsonValue::Null);
                }
                let mut object = Map::new();
                for field in fields {
                    let name = field.key().to_string();
                    object.insert(name, Entity::from_core(field).read(cx).await?);
                }
                Ok(JsonValue::Object(object))
            }
        }
    }

    pub async fn exists(&self, cx: &Cx) -> Result<bool> {
        self.ops().exists(cx).await
    }

    pub async fn delete(&self, cx: &Cx) -> Result<()> {
        self.ops().delete(cx).await
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

impl Eq for Entity {}
