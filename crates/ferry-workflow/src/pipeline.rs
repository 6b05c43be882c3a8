use crate::{
    ApiGraph, ConversionBridge, ConvertError, ConvertOptions, ExternalBridge, IntegrityOptions,
    UiGraph, check_literal_inputs, check_references, flatten_indirection, is_api_graph,
    resolve_aliases, resolve_target_environment,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// States of one `convert` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvertStage {
    AlreadyFlat,
    NeedsBridge,
    Bridged,
    Flattened,
    Checked,
    Done,
}

impl ConvertStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyFlat => "already_flat",
            Self::NeedsBridge => "needs_bridge",
            Self::Bridged => "bridged",
            Self::Flattened => "flattened",
            Self::Checked => "checked",
            Self::Done => "done",
        }
    }
}

/// Converts a UI graph to an API graph through the external bridge rooted at
/// `target_path`. Input that is already an API graph is returned as a copy
/// and needs no target.
pub fn convert(
    workflow: &Value,
    target_path: &str,
    options: &ConvertOptions,
) -> Result<ApiGraph, ConvertError> {
    if is_api_graph(workflow) {
        return copy_api_graph(workflow);
    }

    let environment = resolve_target_environment(target_path).ok_or_else(|| {
        error!("conversion requested without a target environment path");
        ConvertError::MissingTargetPath
    })?;
    let bridge = ExternalBridge::new(environment, options.bridge.clone());
    convert_with_bridge(workflow, &bridge, options.integrity)
}

/// Same pipeline with an injected bridge.
pub fn convert_with_bridge(
    workflow: &Value,
    bridge: &dyn ConversionBridge,
    integrity: IntegrityOptions,
) -> Result<ApiGraph, ConvertError> {
    if is_api_graph(workflow) {
        return copy_api_graph(workflow);
    }

    let mut stage = ConvertStage::NeedsBridge;
    let result = run_stages(workflow, bridge, integrity, &mut stage);
    match &result {
        Ok(graph) => info!(
            stage = ConvertStage::Done.as_str(),
            nodes = graph.len(),
            "workflow conversion succeeded"
        ),
        Err(failure) => error!(
            stage = stage.as_str(),
            error = %failure,
            "workflow conversion failed"
        ),
    }
    result
}

fn run_stages(
    workflow: &Value,
    bridge: &dyn ConversionBridge,
    integrity: IntegrityOptions,
    stage: &mut ConvertStage,
) -> Result<ApiGraph, ConvertError> {
    let ui = UiGraph::from_value(workflow)?;
    debug!(
        stage = stage.as_str(),
        nodes = ui.nodes.len(),
        links = ui.links.len(),
        "starting workflow conversion"
    );

    let raw = bridge
        .convert(workflow)?
        .ok_or(ConvertError::NoConversionResult)?;
    *stage = ConvertStage::Bridged;
    debug!(stage = stage.as_str(), nodes = raw.len(), "bridge returned graph");

    let resolution = resolve_aliases(&ui);
    let flattened = flatten_indirection(raw, &resolution);
    *stage = ConvertStage::Flattened;
    debug!(stage = stage.as_str(), nodes = flattened.len(), "indirection removed");

    for reference in check_references(&flattened, integrity)? {
        warn!(
            node_id = %reference.node_id,
            input = %reference.input,
            target = %reference.target.node_id,
            "input references a node missing from the converted graph"
        );
    }
    check_literal_inputs(&ui, &flattened)?;
    *stage = ConvertStage::Checked;

    Ok(flattened)
}

fn copy_api_graph(workflow: &Value) -> Result<ApiGraph, ConvertError> {
    let graph = ApiGraph::from_value(workflow.clone())?;
    info!(
        stage = ConvertStage::AlreadyFlat.as_str(),
        nodes = graph.len(),
        "workflow already in API format"
    );
    Ok(graph)
}
