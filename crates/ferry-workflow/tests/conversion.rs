use ferry_workflow::{
    ApiGraph, ApiNode, ConversionBridge, ConvertError, IntegrityOptions, convert_with_bridge,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stands in for the external runtime: returns a canned API graph.
struct CannedBridge {
    graph: Option<ApiGraph>,
    calls: AtomicUsize,
}

impl CannedBridge {
    fn new(graph: ApiGraph) -> Self {
        Self {
            graph: Some(graph),
            calls: AtomicUsize::new(0),
        }
    }

    fn declining() -> Self {
        Self {
            graph: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConversionBridge for CannedBridge {
    fn convert(&self, _ui_graph: &Value) -> Result<Option<ApiGraph>, ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.graph.clone())
    }
}

fn alias_workflow(binder_title: &str, reader_title: &str) -> Value {
    json!({
        "nodes": [
            {"id": 1, "type": "CheckpointLoaderSimple", "widgets_values": ["sd15.safetensors"]},
            {"id": 2, "type": "SetNode", "title": binder_title, "widgets_values": ["foo"],
             "inputs": [{"name": "MODEL", "type": "MODEL", "link": 10}]},
            {"id": 3, "type": "GetNode", "title": reader_title, "widgets_values": ["foo"]},
            {"id": 4, "type": "KSampler", "widgets_values": [7, "fixed", 20],
             "inputs": [{"name": "model", "link": 11}]}
        ],
        "links": [
            [10, 1, 0, 2, 0, "MODEL"],
            [11, 3, 0, 4, 0, "MODEL"]
        ]
    })
}

fn alias_api_graph() -> ApiGraph {
    ApiGraph::new()
        .with_node(
            "1",
            ApiNode::new("CheckpointLoaderSimple").with_input("ckpt_name", json!("sd15.safetensors")),
        )
        .with_node(
            "2",
            ApiNode::new("SetNode").with_input("MODEL", json!(["1", 0])),
        )
        .with_node("3", ApiNode::new("GetNode"))
        .with_node(
            "4",
            ApiNode::new("KSampler")
                .with_input("model", json!(["3", 0]))
                .with_input("seed", json!(7))
                .with_input("steps", json!(20)),
        )
}

#[test]
fn convert_already_flat_expected_deep_copy_and_bridge_skipped() {
    let workflow = json!({
        "5": {"class_type": "EmptyLatentImage", "inputs": {"width": 512, "height": 512}},
        "6": {"class_type": "VAEDecode", "inputs": {"samples": ["5", 0]}, "_meta": {"title": "Decode"}}
    });
    let bridge = CannedBridge::declining();

    let graph = convert_with_bridge(&workflow, &bridge, IntegrityOptions::default())
        .expect("already-flat input should pass through");

    assert_eq!(graph.to_value().expect("serialize"), workflow);
    assert_eq!(bridge.calls(), 0);
}

#[test]
fn convert_already_flat_sparse_nodes_expected_verbatim_copy() {
    let workflow = json!({
        "1": {"class_type": "KSampler"},
        "2": {"class_type": "X", "inputs": {}, "_meta": null},
        "3": {"class_type": null, "inputs": {}}
    });
    let bridge = CannedBridge::declining();

    let graph = convert_with_bridge(&workflow, &bridge, IntegrityOptions::default())
        .expect("already-flat input should pass through");

    assert_eq!(graph.to_value().expect("serialize"), workflow);
    assert_eq!(bridge.calls(), 0);
}

#[test]
fn convert_empty_graph_expected_empty_without_bridge() {
    let bridge = CannedBridge::declining();
    let graph = convert_with_bridge(&json!({}), &bridge, IntegrityOptions::default())
        .expect("empty graph should pass");
    assert!(graph.is_empty());
    assert_eq!(bridge.calls(), 0);
}

#[test]
fn convert_alias_round_trip_expected_direct_reference() {
    let bridge = CannedBridge::new(alias_api_graph());

    let graph = convert_with_bridge(
        &alias_workflow("Set_foo", "Get_foo"),
        &bridge,
        IntegrityOptions::default(),
    )
    .expect("conversion should succeed");

    let sampler = graph.get("4").expect("sampler should remain");
    assert_eq!(sampler.input("model"), Some(&json!(["1", 0])));
    assert!(!graph.contains("2"), "binder should be removed");
    assert!(!graph.contains("3"), "reader should be removed");
    assert_eq!(bridge.calls(), 1);
}

#[test]
fn convert_mixed_case_prefixes_expected_same_alias() {
    let bridge = CannedBridge::new(alias_api_graph());

    let graph = convert_with_bridge(
        &alias_workflow("Set_Foo", "get_foo"),
        &bridge,
        IntegrityOptions::default(),
    )
    .expect("conversion should succeed");

    assert_eq!(graph.get("4").expect("sampler").input("model"), Some(&json!(["1", 0])));
}

#[test]
fn convert_duplicate_binders_expected_last_binding_wins() {
    let workflow = json!({
        "nodes": [
            {"id": 1, "type": "LoaderA"},
            {"id": 2, "type": "LoaderB"},
            {"id": 3, "type": "SetNode", "title": "foo", "inputs": [{"link": 1}]},
            {"id": 4, "type": "SetNode", "title": "foo", "inputs": [{"link": 2}]},
            {"id": 5, "type": "GetNode", "title": "foo"},
            {"id": 6, "type": "Consumer", "inputs": [{"link": 3}]}
        ],
        "links": [[1, 1, 0, 3, 0], [2, 2, 0, 4, 0], [3, 5, 0, 6, 0]]
    });
    let api = ApiGraph::new()
        .with_node("1", ApiNode::new("LoaderA"))
        .with_node("2", ApiNode::new("LoaderB"))
        .with_node("3", ApiNode::new("SetNode"))
        .with_node("4", ApiNode::new("SetNode"))
        .with_node("5", ApiNode::new("GetNode"))
        .with_node(
            "6",
            ApiNode::new("Consumer").with_input("x", json!(["5", 0])),
        );

    let graph = convert_with_bridge(&workflow, &CannedBridge::new(api), IntegrityOptions::default())
        .expect("conversion should succeed");

    assert_eq!(graph.get("6").expect("consumer").input("x"), Some(&json!(["2", 0])));
    assert_eq!(graph.len(), 3);
}

#[test]
fn convert_literal_loss_expected_integrity_violation_naming_node() {
    let workflow = json!({
        "nodes": [
            {"id": 8, "type": "CLIPTextEncode", "widgets_values": ["a cat", "extra"]},
            {"id": 9, "type": "SaveImage", "widgets_values": ["out"]}
        ],
        "links": []
    });
    let api = ApiGraph::new()
        .with_node(
            "8",
            ApiNode::new("CLIPTextEncode").with_input("clip", json!(["4", 1])),
        )
        .with_node(
            "9",
            ApiNode::new("SaveImage")
                .with_input("filename_prefix", json!("out"))
                .with_input("images", json!(["7", 0])),
        );

    let error = convert_with_bridge(&workflow, &CannedBridge::new(api), IntegrityOptions::default())
        .expect_err("literal loss should fail");

    match error {
        ConvertError::IntegrityViolation(integrity) => {
            assert_eq!(integrity.violations.len(), 1);
            assert_eq!(integrity.violations[0].node_id, "8");
            assert_eq!(integrity.violations[0].operation_type, "CLIPTextEncode");
            assert_eq!(integrity.violations[0].expected_literal_count, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn convert_dangling_reader_strict_references_expected_failure() {
    let workflow = json!({
        "nodes": [
            {"id": 1, "type": "Loader"},
            {"id": 2, "type": "SetNode", "title": "foo", "inputs": [{"link": 1}]},
            {"id": 3, "type": "GetNode", "title": "bar"},
            {"id": 4, "type": "Consumer", "inputs": [{"link": 2}]}
        ],
        "links": [[1, 1, 0, 2, 0], [2, 3, 0, 4, 0]]
    });
    let api = ApiGraph::new()
        .with_node("1", ApiNode::new("Loader"))
        .with_node("2", ApiNode::new("SetNode"))
        .with_node("3", ApiNode::new("GetNode"))
        .with_node(
            "4",
            ApiNode::new("Consumer").with_input("x", json!(["3", 0])),
        );

    let lenient = convert_with_bridge(
        &workflow,
        &CannedBridge::new(api.clone()),
        IntegrityOptions::default(),
    )
    .expect("dangling references pass through by default");
    assert_eq!(lenient.get("4").expect("consumer").input("x"), Some(&json!(["3", 0])));

    let error = convert_with_bridge(
        &workflow,
        &CannedBridge::new(api),
        IntegrityOptions {
            reject_dangling_references: true,
        },
    )
    .expect_err("strict references should fail");
    assert!(matches!(error, ConvertError::MalformedGraph(_)));
}

#[test]
fn convert_bridge_without_result_expected_no_conversion_result() {
    let error = convert_with_bridge(
        &alias_workflow("foo", "foo"),
        &CannedBridge::declining(),
        IntegrityOptions::default(),
    )
    .expect_err("missing bridge result should fail");
    assert!(matches!(error, ConvertError::NoConversionResult));
}
