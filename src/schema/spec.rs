use crate::core::{KvError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Entity type of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpsKind {
    /// Plain grouping node; owns no data of its own
    Scheme,
    Key,
    Hash,
    Set,
    Range,
}

impl OpsKind {
    pub fn is_container(&self) -> bool {
        matches!(self, OpsKind::Set | OpsKind::Range)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpsKind::Scheme => "scheme",
            OpsKind::Key => "key",
            OpsKind::Hash => "hash",
            OpsKind::Set => "set",
            OpsKind::Range => "range",
        }
    }
}

impl fmt::Display for OpsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declarative schema fragment, as written by the DSL builders
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Named children
    Fields(BTreeMap<String, Fragment>),
    /// Typed entity wrapping nested fragments (merged when compiled)
    Ops { kind: OpsKind, nested: Vec<Fragment> },
}

impl Fragment {
    fn empty() -> Self {
        Fragment::Fields(BTreeMap::new())
    }

    fn describe(&self) -> &'static str {
        match self {
            Fragment::Fields(_) => "mapping",
            Fragment::Ops { kind, .. } => kind.name(),
        }
    }
}

fn ops<I>(kind: OpsKind, children: I) -> Fragment
where
    I: IntoIterator<Item = Fragment>,
{
    Fragment::Ops {
        kind,
        nested: children.into_iter().collect(),
    }
}

/// Single scalar value
pub fn key<I: IntoIterator<Item = Fragment>>(children: I) -> Fragment {
    ops(OpsKind::Key, children)
}

/// Flat field→value map
pub fn hash<I: IntoIterator<Item = Fragment>>(children: I) -> Fragment {
    ops(OpsKind::Hash, children)
}

/// Unordered container; children describe its items
pub fn set<I: IntoIterator<Item = Fragment>>(children: I) -> Fragment {
    ops(OpsKind::Set, children)
}

/// Ordered, de-duplicated container; children describe its items
pub fn range<I: IntoIterator<Item = Fragment>>(children: I) -> Fragment {
    ops(OpsKind::Range, children)
}

/// Mapping of named child fragments
pub fn fields<I, K>(entries: I) -> Fragment
where
    I: IntoIterator<Item = (K, Fragment)>,
    K: Into<String>,
{
    Fragment::Fields(
        entries
            .into_iter()
            .map(|(name, fragment)| (name.into(), fragment))
            .collect(),
    )
}

/// Merge two fragments
///
/// Mappings merge key-by-key, recursing on shared keys. Typed fragments
/// must agree on their kind; their nested fragments are combined.
pub fn merge(a: Fragment, b: Fragment) -> Result<Fragment> {
    merge_at("", a, b)
}

fn merge_at(path: &str, a: Fragment, b: Fragment) -> Result<Fragment> {
    match (a, b) {
        (Fragment::Fields(mut left), Fragment::Fields(right)) => {
            for (name, fragment) in right {
                let merged = match left.remove(&name) {
                    Some(existing) => merge_at(&join(path, &name), existing, fragment)?,
                    None => fragment,
                };
                left.insert(name, merged);
            }
            Ok(Fragment::Fields(left))
        }
        (
            Fragment::Ops {
                kind: left,
                nested: mut first,
            },
            Fragment::Ops {
                kind: right,
                nested: second,
            },
        ) => {
            if left != right {
                return Err(conflict(
                    path,
                    format!("cannot merge {} with {}", left, right),
                ));
            }
            first.extend(second);
            Ok(Fragment::Ops {
                kind: left,
                nested: first,
            })
        }
        (a, b) => Err(conflict(
            path,
            format!("cannot merge {} with {}", a.describe(), b.describe()),
        )),
    }
}

fn merge_all(path: &str, fragments: Vec<Fragment>) -> Result<Fragment> {
    let mut fragments = fragments.into_iter();
    let Some(first) = fragments.next() else {
        return Ok(Fragment::empty());
    };
    fragments.try_fold(first, |acc, next| merge_at(path, acc, next))
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn conflict(path: &str, reason: String) -> KvError {
    KvError::SchemaConflict {
        path: if path.is_empty() { "<root>".into() } else { path.into() },
        reason,
    }
}

/// Compiled, immutable schema node
#[derive(Debug, Clone, PartialEq)]
pub struct SpecNode {
    pub kind: OpsKind,
    /// Declared child fields
    pub fields: BTreeMap<String, Arc<SpecNode>>,
    /// Item shape (containers only)
    pub contained: Option<Arc<SpecNode>>,
}

impl SpecNode {
    pub(crate) fn scheme(fields: BTreeMap<String, Arc<SpecNode>>) -> Self {
        Self {
            kind: OpsKind::Scheme,
            fields,
            contained: None,
        }
    }

    /// Item shape, a bare scheme node when none was declared
    pub fn contained_or_default(&self) -> Arc<SpecNode> {
        self.contained
            .clone()
            .unwrap_or_else(|| Arc::new(SpecNode::scheme(BTreeMap::new())))
    }
}

pub(crate) fn compile(path: &str, fragment: Fragment) -> Result<Arc<SpecNode>> {
    let node = match fragment {
        Fragment::Fields(map) => SpecNode::scheme(compile_fields(path, map)?),
        Fragment::Ops { kind, nested } => match merge_all(path, nested)? {
            inner @ Fragment::Ops { .. } => {
                if !kind.is_container() {
                    return Err(conflict(
                        path,
                        format!(
                            "only container types can have contained elements, this is a {}",
                            kind
                        ),
                    ));
                }
                SpecNode {
                    kind,
                    fields: BTreeMap::new(),
                    contained: Some(compile(&join(path, "[item]"), inner)?),
                }
            }
            Fragment::Fields(map) if kind.is_container() => SpecNode {
                kind,
                fields: BTreeMap::new(),
                contained: Some(Arc::new(SpecNode::scheme(compile_fields(
                    &join(path, "[item]"),
                    map,
                )?))),
            },
            Fragment::Fields(map) => SpecNode {
                kind,
                fields: compile_fields(path, map)?,
                contained: None,
            },
        },
    };
    Ok(Arc::new(node))
}

pub(crate) fn compile_fields(
    path: &str,
    map: BTreeMap<String, Fragment>,
) -> Result<BTreeMap<String, Arc<SpecNode>>> {
    map.into_iter()
        .map(|(name, fragment)| {
            let compiled = compile(&join(path, &name), fragment)?;
            Ok((name, compiled))
        })
        .collect()
}
