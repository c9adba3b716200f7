use std::collections::BTreeMap;

/// Nested map walked by `navigate`
pub trait PathMap {
    /// Child stored under exactly `key`
    fn entry(&self, key: &str) -> Option<&Self>;

    /// All child keys, in a stable order
    fn entry_keys(&self) -> Vec<&str>;

    /// Whether navigation may descend below this node
    fn is_traversable(&self) -> bool;
}

/// Path parameter bound during navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `[name]`: one segment
    Segment(String),
    /// `[...name]`: every remaining segment
    Rest(Vec<String>),
}

#[derive(Debug)]
pub struct Navigation<'a, M> {
    /// Where navigation stopped
    pub node: &'a M,
    /// Segments not consumed
    pub remaining: Vec<String>,
    pub params: BTreeMap<String, Param>,
}

/// Literal lookup key for `segment`
///
/// Segments starting with `$`, `[` or `/` are looked up with a leading `/`,
/// so request data can never address handler or parameter keys.
pub fn escape_segment(segment: &str) -> String {
    if segment.starts_with(['$', '[', '/']) {
        format!("/{}", segment)
    } else {
        segment.to_string()
    }
}

fn rest_param(key: &str) -> Option<&str> {
    key.strip_prefix("[...")?.strip_suffix(']')
}

fn segment_param(key: &str) -> Option<&str> {
    key.strip_prefix('[')?.strip_suffix(']')
}

/// Resolve `path` against `map`
///
/// At each step a literal child wins, then a `[...rest]` child (binding all
/// remaining segments), then a `[name]` child (binding one segment).
/// `collector` sees every visited node once; the last call has
/// `terminal == true`.
pub fn navigate<'a, M, C>(map: &'a M, path: &[String], mut collector: C) -> Navigation<'a, M>
where
    M: PathMap,
    C: FnMut(&'a M, bool),
{
    let mut node = map;
    let mut remaining: &[String] = path;
    let mut params = BTreeMap::new();

    while node.is_traversable() {
        let Some((segment, rest)) = remaining.split_first() else {
            break;
        };

        if let Some(next) = node.entry(&escape_segment(segment)) {
            collector(node, false);
            node = next;
            remaining = rest;
            continue;
        }

        let keys = node.entry_keys();

        if let Some(key) = keys.iter().copied().find(|key| rest_param(key).is_some()) {
            if let (Some(name), Some(next)) = (rest_param(key), node.entry(key)) {
                collector(node, false);
                params.insert(name.to_string(), Param::Rest(remaining.to_vec()));
                node = next;
                remaining = &[];
                continue;
            }
        }

        if let Some(key) = keys.iter().copied().find(|key| segment_param(key).is_some()) {
            if let (Some(name), Some(next)) = (segment_param(key), node.entry(key)) {
                collector(node, false);
                params.insert(name.to_string(), Param::Segment(segment.clone()));
                node = next;
                remaining = rest;
                continue;
            }
        }

        break;
    }

    collector(node, true);

    Navigation {
        node,
        remaining: remaining.to_vec(),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Tree {
        Map(BTreeMap<String, Tree>),
        Leaf(&'static str),
    }

    impl PathMap for Tree {
        fn entry(&self, key: &str) -> Option<&Self> {
            match self {
                Tree::Map(map) => map.get(key),
                Tree::Leaf(_) => None,
            }
        }

        fn entry_keys(&self) -> Vec<&str> {
            match self {
                Tree::Map(map) => map.keys().map(String::as_str).collect(),
                Tree::Leaf(_) => Vec::new(),
            }
        }

        fn is_traversable(&self) -> bool {
            matches!(self, Tree::Map(_))
        }
    }

    fn map<const N: usize>(entries: [(&str, Tree); N]) -> Tree {
        Tree::Map(
            entries
                .into_iter()
                .map(|(key, tree)| (key.to_string(), tree))
                .collect(),
        )
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_segment_param() {
        let api = map([("a", map([("[id]", map([("b", Tree::Leaf("HANDLER"))]))]))]);

        let nav = navigate(&api, &path(&["a", "42", "b"]), |_, _| {});
        assert_eq!(nav.node, &Tree::Leaf("HANDLER"));
        assert!(nav.remaining.is_empty());
        assert_eq!(nav.params["id"], Param::Segment("42".into()));
    }

    #[test]
    fn test_rest_param() {
        let api = map([("a", map([("[...rest]", Tree::Leaf("HANDLER"))]))]);

        let nav = navigate(&api, &path(&["a", "x", "y"]), |_, _| {});
        assert_eq!(nav.node, &Tree::Leaf("HANDLER"));
        assert!(nav.remaining.is_empty());
        assert_eq!(nav.params["rest"], Param::Rest(path(&["x", "y"])));
    }

    #[test]
    fn test_literal_beats_params() {
        let api = map([
            ("new", Tree::Leaf("LITERAL")),
            ("[id]", Tree::Leaf("PARAM")),
        ]);

        let nav = navigate(&api, &path(&["new"]), |_, _| {});
        assert_eq!(nav.node, &Tree::Leaf("LITERAL"));
        assert!(nav.params.is_empty());
    }

    #[test]
    fn test_stops_at_dead_end_and_leaves() {
        let api = map([("a", Tree::Leaf("A"))]);

        let nav = navigate(&api, &path(&["b", "c"]), |_, _| {});
        assert_eq!(nav.node, &api);
        assert_eq!(nav.remaining, path(&["b", "c"]));

        let nav = navigate(&api, &path(&["a", "extra"]), |_, _| {});
        assert_eq!(nav.node, &Tree::Leaf("A"));
        assert_eq!(nav.remaining, path(&["extra"]));
    }

    #[test]
    fn test_special_segments_are_escaped() {
        let api = map([
            ("$get", Tree::Leaf("HANDLER")),
            ("/$get", Tree::Leaf("ESCAPED")),
        ]);

        let nav = navigate(&api, &path(&["$get"]), |_, _| {});
        assert_eq!(nav.node, &Tree::Leaf("ESCAPED"));
        assert_eq!(escape_segment("[id]"), "/[id]");
        assert_eq!(escape_segment("plain"), "plain");
    }

    #[test]
    fn test_collector_sees_each_node_once() {
        let api = map([("a", map([("[id]", map([("b", Tree::Leaf("H"))]))]))]);

        let mut visits = Vec::new();
        navigate(&api, &path(&["a", "1", "b"]), |node, terminal| {
            visits.push((node.is_traversable(), terminal));
        });

        assert_eq!(
            visits,
            vec![(true, false), (true, false), (true, false), (false, true)]
        );
    }
}
