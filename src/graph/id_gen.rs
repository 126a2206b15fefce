//! Deterministic id generation

use blake3::Hasher;

use super::NodeId;
use crate::value::{JsonObject, JsonValue, PathPart};

/// Separator between the components of a parameterized value id
pub const PARAMETERIZED_ID_SEPARATOR: char = '❖';

/// Id of the node holding one field invocation.
///
/// ID = container ❖ JSON(path) ❖ JSON(args). Argument objects serialize with
/// sorted keys, so the id is independent of argument order.
///
/// # Examples
/// ```
/// use graph_cache::graph::node_id_for_parameterized_value;
/// use graph_cache::value::{JsonObject, JsonValue, PathPart};
///
/// let mut args = JsonObject::new();
/// args.insert("city".to_string(), JsonValue::from("Seattle"));
/// let id = node_id_for_parameterized_value("ROOT_QUERY", &[PathPart::from("shipment")], &args);
/// assert_eq!(id, r#"ROOT_QUERY❖["shipment"]❖{"city":"Seattle"}"#);
/// ```
pub fn node_id_for_parameterized_value(container_id: &str, path: &[PathPart], args: &JsonObject) -> NodeId {
    let path_json = serde_json::to_string(path).unwrap_or_default();
    let args_json = JsonValue::object(args.clone()).to_string();
    format!(
        "{}{sep}{}{sep}{}",
        container_id,
        path_json,
        args_json,
        sep = PARAMETERIZED_ID_SEPARATOR
    )
}

/// Compute the identity of an operation for memoization.
///
/// ID = BLAKE3(document|root|name|variables) -> u128 (first 16 bytes).
/// Variables are hashed by value, never by identity.
pub fn operation_fingerprint(
    document: &str,
    root_id: &str,
    name: Option<&str>,
    variables: &JsonObject,
) -> u128 {
    let mut hasher = Hasher::new();

    hasher.update(document.as_bytes());
    hasher.update(b"|");
    hasher.update(root_id.as_bytes());
    hasher.update(b"|");
    hasher.update(name.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(JsonValue::object(variables.clone()).to_string().as_bytes());

    let hash = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[0..16]);
    u128::from_le_bytes(bytes)
}
