use crate::{AliasResolution, ApiGraph, READER_NODE_TYPE, SourceRef, normalize_alias_name};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Reader operations are matched by exact name or a case-insensitive
/// `getnode` suffix, which covers namespaced variants.
pub fn is_reader_operation(class_type: &str) -> bool {
    class_type == READER_NODE_TYPE || class_type.to_lowercase().ends_with("getnode")
}

/// Redirects every input that reads through a reader node to the binder's
/// captured source, then drops reader and binder nodes.
///
/// Takes the graph by value; when no aliases were bound it is handed back
/// untouched. Rewrites are single-hop: a binder fed by another reader yields
/// a reference to that (removed) reader, which integrity checks report.
pub fn flatten_indirection(mut graph: ApiGraph, resolution: &AliasResolution) -> ApiGraph {
    if resolution.aliases.is_empty() {
        return graph;
    }

    let api_reader_names = api_reader_names(&graph, resolution);
    let mut rewired = 0usize;

    for (node_id, node) in graph.nodes.iter_mut() {
        let Some(inputs) = node.inputs_mut() else {
            continue;
        };
        for (input_name, value) in inputs.iter_mut() {
            let Some(reference) = SourceRef::from_input(value) else {
                continue;
            };
            let Some(alias) = api_reader_names
                .get(&reference.node_id)
                .or_else(|| resolution.reader_names.get(&reference.node_id))
            else {
                continue;
            };

            match resolution.aliases.get(alias) {
                Some(source) => {
                    *value = source.to_value();
                    rewired += 1;
                }
                None => warn!(
                    node_id = %node_id,
                    input = %input_name,
                    reader = %reference.node_id,
                    alias = %alias,
                    "reader has no matching binder; reference left dangling"
                ),
            }
        }
    }

    let mut removed = 0usize;
    for reader_id in api_reader_names.keys() {
        removed += usize::from(graph.remove(reader_id).is_some());
    }
    for binder_id in &resolution.binder_ids {
        removed += usize::from(graph.remove(binder_id).is_some());
    }

    debug!(rewired, removed, remaining = graph.len(), "flattened indirection nodes");
    graph
}

/// API reader id -> alias. The API title wins over the UI-derived name since
/// the bridge may retitle nodes.
fn api_reader_names(graph: &ApiGraph, resolution: &AliasResolution) -> BTreeMap<String, String> {
    graph
        .iter()
        .filter(|(_, node)| is_reader_operation(node.class_type()))
        .filter_map(|(id, node)| {
            let name = node
                .title()
                .map(normalize_alias_name)
                .filter(|name| !name.is_empty())
                .or_else(|| resolution.reader_names.get(id).cloned())?;
            Some((id.clone(), name))
        })
        .collect()
}
