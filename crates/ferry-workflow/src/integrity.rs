use crate::{ApiGraph, ConvertError, IntegrityError, SourceRef, UiGraph};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub node_id: String,
    pub operation_type: String,
    pub expected_literal_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub node_id: String,
    pub input: String,
    pub target: SourceRef,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntegrityOptions {
    pub reject_dangling_references: bool,
}

/// Nodes that carried panel values in the UI graph but kept no literal input
/// after conversion. Catches total loss only, not corrupted values.
pub fn find_literal_loss(ui: &UiGraph, api: &ApiGraph) -> Vec<IntegrityViolation> {
    ui.nodes
        .iter()
        .filter_map(|ui_node| {
            let id = ui_node.id.as_deref()?;
            let expected = ui_node.literal_values().len();
            if expected == 0 {
                return None;
            }
            let api_node = api.get(id)?;
            if api_node.literal_input_count() > 0 {
                return None;
            }
            let operation_type = match api_node.class_type() {
                "" => ui_node.node_type.clone(),
                class_type => class_type.to_string(),
            };
            Some(IntegrityViolation {
                node_id: id.to_string(),
                operation_type,
                expected_literal_count: expected,
            })
        })
        .collect()
}

pub fn check_literal_inputs(ui: &UiGraph, api: &ApiGraph) -> Result<(), IntegrityError> {
    let violations = find_literal_loss(ui, api);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(IntegrityError::new(violations))
    }
}

pub fn find_dangling_references(api: &ApiGraph) -> Vec<DanglingReference> {
    let mut dangling = Vec::new();
    for (node_id, node) in api.iter() {
        for (input, value) in node.inputs().into_iter().flatten() {
            let Some(target) = SourceRef::from_input(value) else {
                continue;
            };
            if !api.contains(&target.node_id) {
                dangling.push(DanglingReference {
                    node_id: node_id.clone(),
                    input: input.clone(),
                    target,
                });
            }
        }
    }
    dangling
}

pub fn check_references(
    api: &ApiGraph,
    options: IntegrityOptions,
) -> Result<Vec<DanglingReference>, ConvertError> {
    let dangling = find_dangling_references(api);
    if options.reject_dangling_references && !dangling.is_empty() {
        let details = dangling
            .iter()
            .map(|reference| {
                format!(
                    "{}.{} -> missing node {}",
                    reference.node_id, reference.input, reference.target.node_id
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ConvertError::MalformedGraph(format!(
            "dangling references after flattening: {details}"
        )));
    }
    Ok(dangling)
}
