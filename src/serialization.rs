//! Snapshot serialization
//!
//! Each node is stored as
//! `{"type": "EntitySnapshot" | "ParameterizedValueSnapshot", "data", "inbound"?, "outbound"?}`
//! in a flat map keyed by node id.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::{GraphSnapshot, NodeId, NodeKind, NodeReference, NodeSnapshot};
use crate::value::JsonValue;

/// Serialized form of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Absent when the node's value is a reference; an explicit `null` is kept
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_data")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound: Option<Vec<NodeReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<Vec<NodeReference>>,
}

fn present_data<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

pub type SerializedSnapshot = BTreeMap<NodeId, SerializedNode>;

fn non_empty(references: &[NodeReference]) -> Option<Vec<NodeReference>> {
    if references.is_empty() {
        None
    } else {
        Some(references.to_vec())
    }
}

/// Serializable copy of every node
pub fn extract(snapshot: &GraphSnapshot) -> SerializedSnapshot {
    snapshot
        .iter()
        .map(|(id, node)| {
            (
                id.clone(),
                SerializedNode {
                    kind: node.kind,
                    data: node.data.clone(),
                    inbound: non_empty(&node.inbound),
                    outbound: non_empty(&node.outbound),
                },
            )
        })
        .collect()
}

/// Rebuild a snapshot; dangling or asymmetric references are rejected
pub fn restore(serialized: SerializedSnapshot) -> Result<GraphSnapshot> {
    let values: HashMap<NodeId, Arc<NodeSnapshot>> = serialized
        .into_iter()
        .map(|(id, node)| {
            (
                id,
                Arc::new(NodeSnapshot {
                    kind: node.kind,
                    data: node.data,
                    inbound: node.inbound.unwrap_or_default(),
                    outbound: node.outbound.unwrap_or_default(),
                }),
            )
        })
        .collect();

    let snapshot = GraphSnapshot::from_nodes(values);
    if let Err(problems) = snapshot.check_integrity() {
        return Err(GraphError::InvalidFormat(problems.join("; ")));
    }

    tracing::info!("Restored snapshot with {} nodes", snapshot.len());
    Ok(snapshot)
}

pub fn to_json(snapshot: &GraphSnapshot) -> Result<String> {
    Ok(serde_json::to_string(&extract(snapshot))?)
}

pub fn from_json(json: &str) -> Result<GraphSnapshot> {
    restore(serde_json::from_str(json)?)
}

/// Write an extracted snapshot to `path`
pub fn save<P: AsRef<Path>>(snapshot: &GraphSnapshot, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(&mut writer, &extract(snapshot))?;
    writer.flush()?;
    Ok(())
}

/// Read a snapshot written by [`save`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<GraphSnapshot> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    restore(serde_json::from_reader(reader)?)
}
