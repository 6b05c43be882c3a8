use crate::ConvertError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Key that marks a mapping as an execution-ready API node.
pub const OPERATION_TYPE_KEY: &str = "class_type";

/// Normalizes a UI node id to the string form used as an API graph key.
pub fn node_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(node_id_string(&value))
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UiInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UiNode {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub widgets_values: Option<Value>,
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub inputs: Vec<UiInput>,
}

impl UiNode {
    /// Panel-entered literal values. Nodes that store their widgets as a
    /// mapping instead of a list report none.
    pub fn literal_values(&self) -> &[Value] {
        match &self.widgets_values {
            Some(Value::Array(values)) => values,
            _ => &[],
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|properties| properties.get(key))
    }
}

/// One UI edge. Only the id and its origin are meaningful here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiLink {
    pub id: i64,
    pub origin_id: String,
    pub origin_slot: i64,
}

impl<'de> Deserialize<'de> for UiLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Positional(Vec<Value>),
            Object {
                id: i64,
                origin_id: Value,
                origin_slot: i64,
            },
        }

        let (id, origin_id, origin_slot) = match Repr::deserialize(deserializer)? {
            Repr::Positional(fields) => {
                if fields.len() < 3 {
                    return Err(D::Error::custom(format!(
                        "link needs at least 3 fields, found {}",
                        fields.len()
                    )));
                }
                let id = fields[0]
                    .as_i64()
                    .ok_or_else(|| D::Error::custom("link id must be an integer"))?;
                let origin_slot = fields[2]
                    .as_i64()
                    .ok_or_else(|| D::Error::custom("link origin slot must be an integer"))?;
                (id, fields[1].clone(), origin_slot)
            }
            Repr::Object {
                id,
                origin_id,
                origin_slot,
            } => (id, origin_id, origin_slot),
        };

        let origin_id = node_id_string(&origin_id)
            .ok_or_else(|| D::Error::custom(format!("link {id} has an invalid origin node id")))?;
        Ok(Self {
            id,
            origin_id,
            origin_slot,
        })
    }
}

/// Typed view over the visual editor's node/link document.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UiGraph {
    #[serde(default)]
    pub nodes: Vec<UiNode>,
    #[serde(default)]
    pub links: Vec<UiLink>,
}

impl UiGraph {
    pub fn from_value(value: &Value) -> Result<Self, ConvertError> {
        if !value.is_object() {
            return Err(ConvertError::MalformedGraph(
                "workflow payload must be a JSON object".to_string(),
            ));
        }
        Self::deserialize(value)
            .map_err(|error| ConvertError::MalformedGraph(format!("invalid UI graph: {error}")))
    }
}

/// Reference from an API input to another node's output slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub node_id: String,
    pub slot: i64,
}

impl SourceRef {
    pub fn new(node_id: impl Into<String>, slot: i64) -> Self {
        Self {
            node_id: node_id.into(),
            slot,
        }
    }

    pub fn from_input(value: &Value) -> Option<Self> {
        let Value::Array(items) = value else {
            return None;
        };
        let [node_id, slot] = items.as_slice() else {
            return None;
        };
        Some(Self::new(node_id_string(node_id)?, slot.as_i64()?))
    }

    pub fn to_value(&self) -> Value {
        json!([self.node_id, self.slot])
    }
}

/// Any 2-element list counts as a link; everything else is a literal.
pub fn is_link_value(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.len() == 2)
}

const INPUTS_KEY: &str = "inputs";
const META_KEY: &str = "_meta";
const TITLE_KEY: &str = "title";

/// One execution node, held as the exact mapping it was read from so absent
/// or null fields survive a round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiNode {
    fields: Map<String, Value>,
}

impl ApiNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            OPERATION_TYPE_KEY.to_string(),
            Value::String(class_type.into()),
        );
        fields.insert(INPUTS_KEY.to_string(), Value::Object(Map::new()));
        Self { fields }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        if let Some(inputs) = object_entry(&mut self.fields, INPUTS_KEY) {
            inputs.insert(name.into(), value);
        }
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        if let Some(meta) = object_entry(&mut self.fields, META_KEY) {
            meta.insert(TITLE_KEY.to_string(), Value::String(title.into()));
        }
        self
    }

    /// Empty when the operation type is missing or not a string.
    pub fn class_type(&self) -> &str {
        self.fields
            .get(OPERATION_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn inputs(&self) -> Option<&Map<String, Value>> {
        self.fields.get(INPUTS_KEY).and_then(Value::as_object)
    }

    pub fn inputs_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.fields.get_mut(INPUTS_KEY).and_then(Value::as_object_mut)
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs().and_then(|inputs| inputs.get(name))
    }

    pub fn title(&self) -> Option<&str> {
        self.fields
            .get(META_KEY)
            .and_then(|meta| meta.get(TITLE_KEY))
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
    }

    pub fn literal_input_count(&self) -> usize {
        self.inputs().map_or(0, |inputs| {
            inputs.values().filter(|value| !is_link_value(value)).count()
        })
    }
}

/// Returns `fields[key]` as a mapping, replacing a missing or non-mapping value.
fn object_entry<'a>(fields: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let slot = fields
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}

/// Execution-ready graph keyed by node id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiGraph {
    pub nodes: BTreeMap<String, ApiNode>,
}

impl ApiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, ConvertError> {
        if !value.is_object() {
            return Err(ConvertError::MalformedGraph(
                "API graph must be a JSON object keyed by node id".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|error| ConvertError::MalformedGraph(format!("invalid API graph: {error}")))
    }

    pub fn to_value(&self) -> Result<Value, ConvertError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn insert(&mut self, id: impl Into<String>, node: ApiNode) -> Option<ApiNode> {
        self.nodes.insert(id.into(), node)
    }

    pub fn with_node(mut self, id: impl Into<String>, node: ApiNode) -> Self {
        self.insert(id, node);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ApiNode> {
        self.nodes.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ApiNode> {
        self.nodes.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ApiNode)> {
        self.nodes.iter()
    }
}

/// True when every top-level value is a mapping carrying an operation type.
/// An empty mapping qualifies.
pub fn is_api_graph(value: &Value) -> bool {
    let Some(entries) = value.as_object() else {
        return false;
    };
    entries.values().all(|entry| {
        entry
            .as_object()
            .is_some_and(|node| node.contains_key(OPERATION_TYPE_KEY))
    })
}
