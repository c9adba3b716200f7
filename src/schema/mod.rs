// ============================================================================
// Schema: declarative entity tree over the key-value store
// ============================================================================
//
// A schema is written with the builders in `spec` (`key`, `hash`, `set`,
// `range`, `fields`), compiled once into an immutable `SpecNode` tree, and
// then used to hand out path-bound entity nodes:
//
//   let schema = Schema::define(fields([
//       ("rooms", set([fields([("stories", range([hash([])]))])])),
//   ]))?;
//   let stories = schema.field("rooms")?.into_set()?.item("R1")
//       .field("stories")?.into_range()?;
//
// ============================================================================

pub mod node;
pub mod ops;
pub mod spec;

pub use node::{Entity, NodeCore, SchemeNode};
pub use ops::hash::HashNode;
pub use ops::key::KeyNode;
pub use ops::range::RangeNode;
pub use ops::set::SetNode;
pub use ops::{ContainerOps, Ops};
pub use spec::{Fragment, OpsKind, SpecNode, fields, hash, key, merge, range, set};

use crate::core::{KvError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Compiled schema
#[derive(Debug, Clone)]
pub struct Schema {
    source: Fragment,
    root: BTreeMap<String, Arc<SpecNode>>,
}

impl Schema {
    /// Compile a root mapping
    ///
    /// Fails on conflicting merges and on non-container kinds given
    /// contained elements.
    pub fn define(source: Fragment) -> Result<Self> {
        let Fragment::Fields(map) = source.clone() else {
            return Err(KvError::SchemaConflict {
                path: "<root>".into(),
                reason: "schema root must be a mapping".into(),
            });
        };

        let root = spec::compile_fields("", map)?;
        Ok(Self { source, root })
    }

    /// Layer several schemas into one by merging their source fragments
    pub fn merge(schemas: &[&Schema]) -> Result<Self> {
        let mut merged = Fragment::Fields(BTreeMap::new());
        for schema in schemas {
            merged = spec::merge(merged, schema.source.clone())?;
        }
        Self::define(merged)
    }

    pub fn source(&self) -> &Fragment {
        &self.source
    }

    /// Top-level field names
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    /// Node for the top-level field `name`
    pub fn field(&self, name: &str) -> Result<Entity> {
        let spec = self.root.get(name).ok_or_else(|| KvError::UnknownField {
            path: "<root>".into(),
            field: name.to_string(),
        })?;
        Ok(Entity::from_core(NodeCore::new(
            name,
            None,
            Arc::clone(spec),
            Vec::new(),
        )))
    }
}
