//! Binder/reader indirection discovery.
//!
//! A binder node captures the value on its linked input under a name; reader
//! nodes elsewhere in the graph stand in for that value by name. This module
//! builds the per-call name table that the flattener consumes.

use crate::{LinkTable, SourceRef, UiGraph, UiNode};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const BINDER_NODE_TYPE: &str = "SetNode";
pub const READER_NODE_TYPE: &str = "GetNode";

const PREVIOUS_NAME_PROPERTY: &str = "previousName";
const ALIAS_PREFIXES: [&str; 2] = ["set_", "get_"];

/// Strips one case-insensitive `set_`/`get_` prefix and case-folds the rest,
/// so `Set_Foo` and `get_foo` share the key `foo`.
pub fn normalize_alias_name(name: &str) -> String {
    let stripped = match name.get(..4) {
        Some(prefix)
            if ALIAS_PREFIXES
                .iter()
                .any(|candidate| prefix.eq_ignore_ascii_case(candidate)) =>
        {
            &name[4..]
        }
        _ => name,
    };
    stripped.to_lowercase()
}

/// Title, then first panel value, then the `previousName` property.
pub fn derive_alias_name(node: &UiNode) -> Option<String> {
    let title = node.title.as_deref().unwrap_or_default().trim();
    let raw = if !title.is_empty() {
        Some(title.to_string())
    } else if let Some(first) = node.literal_values().first() {
        literal_to_name(first)
    } else {
        node.property(PREVIOUS_NAME_PROPERTY)
            .and_then(literal_to_name)
            .filter(|name| !name.is_empty())
    };

    raw.map(|name| normalize_alias_name(&name))
        .filter(|name| !name.is_empty())
}

fn literal_to_name(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Normalized alias name -> the output the binder captured.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AliasTable {
    bindings: BTreeMap<String, SourceRef>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins; the displaced binding is returned.
    pub fn bind(&mut self, name: impl Into<String>, source: SourceRef) -> Option<SourceRef> {
        self.bindings.insert(name.into(), source)
    }

    pub fn get(&self, name: &str) -> Option<&SourceRef> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceRef)> {
        self.bindings.iter()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AliasResolution {
    pub aliases: AliasTable,
    /// Binder instances; removed from the API graph after rewriting.
    pub binder_ids: BTreeSet<String>,
    /// Reader instances by UI node id, resolved later against the API graph.
    pub reader_names: BTreeMap<String, String>,
}

pub fn resolve_aliases(graph: &UiGraph) -> AliasResolution {
    let links = LinkTable::from_graph(graph);
    let mut resolution = AliasResolution::default();

    for node in &graph.nodes {
        let Some(name) = derive_alias_name(node) else {
            continue;
        };

        match node.node_type.as_str() {
            BINDER_NODE_TYPE => bind_node(node, &name, &links, &mut resolution),
            READER_NODE_TYPE => {
                if let Some(id) = &node.id {
                    resolution.reader_names.insert(id.clone(), name);
                }
            }
            _ => {}
        }
    }

    debug!(
        aliases = resolution.aliases.len(),
        binders = resolution.binder_ids.len(),
        readers = resolution.reader_names.len(),
        "resolved indirection nodes"
    );
    resolution
}

fn bind_node(node: &UiNode, name: &str, links: &LinkTable, resolution: &mut AliasResolution) {
    for input in &node.inputs {
        let Some(source) = input.link.and_then(|edge_id| links.source_of(edge_id)) else {
            continue;
        };

        if let Some(previous) = resolution.aliases.bind(name, source.clone()) {
            if &previous != source {
                warn!(
                    alias = %name,
                    previous_node = %previous.node_id,
                    replacement_node = %source.node_id,
                    "alias bound more than once; last binding wins"
                );
            }
        }
        if let Some(id) = &node.id {
            resolution.binder_ids.insert(id.clone());
        }
    }
}
