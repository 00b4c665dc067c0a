//! Core data models for trace collection
//!
//! Field names follow the renderer's camelCase JSON contract.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything recorded by one traced run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBuffer {
    #[serde(default)]
    pub loops: BTreeMap<usize, LoopSite>,
    #[serde(default)]
    pub conditions: BTreeMap<usize, ConditionSite>,
    #[serde(default)]
    pub recursion: Vec<CallRecord>,
    #[serde(default)]
    pub call_stack: Vec<u64>,
    #[serde(default)]
    pub history: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub trees: BTreeMap<String, TreeNode>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// A loop site and its iteration snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSite {
    /// Ordered column names, loop variable first when present
    pub variables: Vec<String>,
    /// Initial snapshot at position 0, then one per completed body
    pub iterations: Vec<Snapshot>,
    pub loop_var: Option<String>,
    pub range: String,
    #[serde(default)]
    pub prev_values: IndexMap<String, PrevValue>,
    /// Set once the pre-loop snapshot has been recorded
    #[serde(skip)]
    pub has_initial: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub values: IndexMap<String, String>,
    /// Transition strings; absent on the initial snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exprs: Option<IndexMap<String, String>>,
}

/// Last observed value of a column, kept numeric when possible so deltas
/// can be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrevValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PrevValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PrevValue::Int(i) => Some(*i as f64),
            PrevValue::Float(f) => Some(*f),
            PrevValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSite {
    pub line: usize,
    pub source: String,
    /// `"True"` / `"False"` in evaluation order
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: u64,
    pub func: String,
    pub args: IndexMap<String, String>,
    pub parent: Option<u64>,
    #[serde(rename = "return")]
    pub return_value: Option<String>,
}

/// Depth-capped serialization of a linked structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub val: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<TreeNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<TreeNode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(val: impl Into<String>) -> Self {
        Self {
            val: val.into(),
            ..Self::default()
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |n| n.node_count())
            + self.right.as_ref().map_or(0, |n| n.node_count())
            + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_uses_renderer_field_names() {
        let mut buffer = TraceBuffer::new();
        buffer.call_stack.push(1);
        buffer.recursion.push(CallRecord {
            id: 1,
            func: "f".to_string(),
            args: IndexMap::new(),
            parent: None,
            return_value: Some("3".to_string()),
        });
        buffer.loops.insert(
            0,
            LoopSite {
                loop_var: Some("i".to_string()),
                range: "0..3".to_string(),
                ..LoopSite::default()
            },
        );
        let json: serde_json::Value = serde_json::from_str(&buffer.to_payload().unwrap()).unwrap();
        assert_eq!(json["callStack"][0], 1);
        assert_eq!(json["recursion"][0]["return"], "3");
        assert_eq!(json["loops"]["0"]["loopVar"], "i");
        assert!(json["loops"]["0"]["prevValues"].is_object());
    }

    #[test]
    fn test_prev_values_keep_numeric_kind() {
        let payload = r#"{"loops":{"0":{"variables":["x"],"iterations":[],"loopVar":null,"range":"while","prevValues":{"x":3,"y":"abc","z":1.5}}}}"#;
        let buffer = TraceBuffer::from_payload(payload).unwrap();
        let site = &buffer.loops[&0];
        assert_eq!(site.prev_values["x"], PrevValue::Int(3));
        assert_eq!(site.prev_values["y"], PrevValue::Text("abc".to_string()));
        assert_eq!(site.prev_values["z"].as_number(), Some(1.5));
    }

    #[test]
    fn test_tree_node_count() {
        let mut root = TreeNode::leaf("1");
        root.left = Some(Box::new(TreeNode::leaf("2")));
        root.children.push(TreeNode::leaf("3"));
        assert_eq!(root.node_count(), 3);
    }
}
