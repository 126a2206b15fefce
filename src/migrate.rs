//! Bulk migration of cached entities between application versions
//!
//! Entity migrations rewrite fields of every entity of a type. Parameterized
//! migrations add a field invocation to every entity of a type that does not
//! have one yet, seeded with a default or copied from another invocation.
//! Migration is additive: nothing is removed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::graph::node::add_reference;
use crate::graph::{
    node_id_for_parameterized_value, GraphSnapshot, NodeId, NodeSnapshot, MUTATION_ROOT_ID, QUERY_ROOT_ID,
    SUBSCRIPTION_ROOT_ID,
};
use crate::value::{JsonObject, JsonValue, PathPart};

/// Computes a field's new value from its previous one (`None` when absent)
pub type FieldTransform = Arc<dyn Fn(Option<&JsonValue>) -> JsonValue + Send + Sync>;

/// Field invocation to add where missing
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterizedMigration {
    pub path: Vec<PathPart>,
    pub args: JsonObject,
    pub default_return: JsonValue,
    /// Invocation whose value (and references) seed the new one
    pub copy_from: Option<ParameterizedSource>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterizedSource {
    pub path: Vec<PathPart>,
    pub args: JsonObject,
}

/// Migrations keyed by `__typename`
#[derive(Clone, Default)]
pub struct MigrationMap {
    entities: HashMap<String, BTreeMap<String, FieldTransform>>,
    parameterized: HashMap<String, Vec<ParameterizedMigration>>,
}

impl MigrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_field<F>(mut self, typename: &str, field: &str, transform: F) -> Self
    where
        F: Fn(Option<&JsonValue>) -> JsonValue + Send + Sync + 'static,
    {
        self.entities
            .entry(typename.to_string())
            .or_default()
            .insert(field.to_string(), Arc::new(transform));
        self
    }

    pub fn parameterized(mut self, typename: &str, migration: ParameterizedMigration) -> Self {
        self.parameterized
            .entry(typename.to_string())
            .or_default()
            .push(migration);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.parameterized.is_empty()
    }
}

impl fmt::Debug for MigrationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entities: BTreeMap<&String, Vec<&String>> = self
            .entities
            .iter()
            .map(|(typename, fields)| (typename, fields.keys().collect()))
            .collect();
        f.debug_struct("MigrationMap")
            .field("entities", &entities)
            .field("parameterized", &self.parameterized)
            .finish()
    }
}

/// Type name of an entity; roots fall back to their operation type
fn typename_of(id: &str, node: &NodeSnapshot) -> Option<String> {
    if let Some(typename) = node.data.as_ref().and_then(|d| d.get("__typename")).and_then(|t| t.as_str()) {
        return Some(typename.to_string());
    }
    match id {
        QUERY_ROOT_ID => Some("Query".to_string()),
        MUTATION_ROOT_ID => Some("Mutation".to_string()),
        SUBSCRIPTION_ROOT_ID => Some("Subscription".to_string()),
        _ => None,
    }
}

/// Apply `migrations` to every entity of `snapshot`
pub fn migrate(snapshot: &GraphSnapshot, migrations: &MigrationMap) -> Result<GraphSnapshot> {
    let mut values = snapshot.values().clone();
    if migrations.is_empty() {
        return Ok(GraphSnapshot::from_nodes(values));
    }

    let entities: Vec<(NodeId, String)> = snapshot
        .iter()
        .filter(|(_, node)| node.is_entity())
        .filter_map(|(id, node)| typename_of(id, node).map(|typename| (id.clone(), typename)))
        .collect();

    let mut migrated = 0;
    let mut created = 0;

    for (id, typename) in &entities {
        if let Some(fields) = migrations.entities.get(typename) {
            if migrate_fields(&mut values, id, fields) {
                migrated += 1;
            }
        }
        for migration in migrations.parameterized.get(typename).into_iter().flatten() {
            if add_parameterized_value(&mut values, id, migration) {
                created += 1;
            }
        }
    }

    tracing::info!(
        "Migrated {} entities, created {} parameterized values",
        migrated,
        created
    );
    Ok(GraphSnapshot::from_nodes(values))
}

fn migrate_fields(
    values: &mut HashMap<NodeId, Arc<NodeSnapshot>>,
    id: &str,
    fields: &BTreeMap<String, FieldTransform>,
) -> bool {
    let Some(JsonValue::Object(data)) = values.get(id).and_then(|node| node.data.as_ref()) else {
        return false;
    };

    let updates: Vec<(String, JsonValue)> = fields
        .iter()
        .filter_map(|(field, transform)| {
            let previous = data.get(field);
            let next = transform(previous);
            (previous != Some(&next)).then(|| (field.clone(), next))
        })
        .collect();
    if updates.is_empty() {
        return false;
    }

    if let Some(node) = values.get_mut(id) {
        if let Some(JsonValue::Object(data)) = Arc::make_mut(node).data.as_mut() {
            let data = Arc::make_mut(data);
            data.extend(updates);
        }
    }
    true
}

fn add_parameterized_value(
    values: &mut HashMap<NodeId, Arc<NodeSnapshot>>,
    container_id: &str,
    migration: &ParameterizedMigration,
) -> bool {
    let param_id = node_id_for_parameterized_value(container_id, &migration.path, &migration.args);
    if values.contains_key(&param_id) {
        return false;
    }

    let source = migration.copy_from.as_ref().and_then(|source| {
        let source_id = node_id_for_parameterized_value(container_id, &source.path, &source.args);
        values.get(&source_id).cloned()
    });

    let mut param = NodeSnapshot::parameterized_value(Some(migration.default_return.clone()));
    if let Some(source) = source {
        param.data = source.data.clone();
        param.outbound = source.outbound.clone();
    }
    add_reference(&mut param.inbound, container_id, &migration.path);

    for reference in &param.outbound {
        if let Some(target) = values.get_mut(&reference.id) {
            let path = reference.path.clone().unwrap_or_default();
            add_reference(&mut Arc::make_mut(target).inbound, &param_id, &path);
        }
    }
    if let Some(container) = values.get_mut(container_id) {
        add_reference(&mut Arc::make_mut(container).outbound, &param_id, &migration.path);
    }
    values.insert(param_id, Arc::new(param));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CacheContext, RawOperation};
    use crate::editor::merge;
    use crate::graph::GraphStore;
    use serde_json::json;

    fn seed(document: &str, payload: serde_json::Value) -> GraphSnapshot {
        let context = CacheContext::default();
        let query = context.parse_operation(&RawOperation::query(document)).unwrap();
        merge(&context, &GraphSnapshot::new(), &query, &JsonValue::from(payload))
            .unwrap()
            .snapshot
    }

    #[test]
    fn test_entity_field_migration() {
        let snapshot = seed(
            "{ viewer { __typename id name } }",
            json!({"viewer": {"__typename": "User", "id": 1, "name": "ada"}}),
        );
        let migrations = MigrationMap::new()
            .entity_field("User", "name", |previous| {
                JsonValue::from(previous.and_then(|v| v.as_str()).unwrap_or("").to_uppercase().as_str())
            })
            .entity_field("User", "version", |_| JsonValue::from(2));

        let migrated = migrate(&snapshot, &migrations).unwrap();
        let data = migrated.get("1").unwrap();
        assert_eq!(data.get("name"), Some(&JsonValue::from("ADA")));
        assert_eq!(data.get("version"), Some(&JsonValue::from(2)));
        assert_eq!(snapshot.get("1").unwrap().get("name"), Some(&JsonValue::from("ada")));
    }

    #[test]
    fn test_other_types_untouched() {
        let snapshot = seed(
            "{ viewer { __typename id } }",
            json!({"viewer": {"__typename": "Admin", "id": 1}}),
        );
        let migrations = MigrationMap::new().entity_field("User", "flag", |_| JsonValue::Bool(true));
        let migrated = migrate(&snapshot, &migrations).unwrap();
        assert!(migrated.get("1").unwrap().ptr_eq(snapshot.get("1").unwrap()));
    }

    #[test]
    fn test_parameterized_default() {
        let snapshot = seed("{ a }", json!({"a": 1}));
        let migrations = MigrationMap::new().parameterized(
            "Query",
            ParameterizedMigration {
                path: vec![PathPart::from("feed")],
                args: JsonValue::from(json!({"first": 10})).as_object().cloned().unwrap(),
                default_return: JsonValue::array(vec![]),
                copy_from: None,
            },
        );

        let migrated = migrate(&snapshot, &migrations).unwrap();
        let param_id = r#"ROOT_QUERY❖["feed"]❖{"first":10}"#;
        assert_eq!(migrated.get(param_id), Some(&JsonValue::array(vec![])));
        assert!(migrated.check_integrity().is_ok());

        let context = CacheContext::default();
        let query = context
            .parse_operation(&RawOperation::query("{ feed(first: 10) }"))
            .unwrap();
        assert!(crate::read::read(&query, &migrated, false).complete);
    }

    #[test]
    fn test_parameterized_copy_from() {
        let snapshot = seed(
            "{ feed(first: 2) { id } }",
            json!({"feed": [{"id": "p1"}, {"id": "p2"}]}),
        );
        let migrations = MigrationMap::new().parameterized(
            "Query",
            ParameterizedMigration {
                path: vec![PathPart::from("feed")],
                args: JsonValue::from(json!({"first": 2, "after": null})).as_object().cloned().unwrap(),
                default_return: JsonValue::Null,
                copy_from: Some(ParameterizedSource {
                    path: vec![PathPart::from("feed")],
                    args: JsonValue::from(json!({"first": 2})).as_object().cloned().unwrap(),
                }),
            },
        );

        let migrated = migrate(&snapshot, &migrations).unwrap();
        assert!(migrated.check_integrity().is_ok());
        assert_eq!(migrated.get_node_snapshot("p1").unwrap().inbound.len(), 2);

        let context = CacheContext::default();
        let query = context
            .parse_operation(&RawOperation::query("{ feed(first: 2, after: null) { id } }"))
            .unwrap();
        let result = crate::read::read(&query, &migrated, false);
        assert!(result.complete);
        assert_eq!(
            result.result,
            Some(JsonValue::from(json!({"feed": [{"id": "p1"}, {"id": "p2"}]})))
        );
    }

    #[test]
    fn test_existing_parameterized_value_kept() {
        let snapshot = seed("{ feed(first: 1) }", json!({"feed": "cached"}));
        let migrations = MigrationMap::new().parameterized(
            "Query",
            ParameterizedMigration {
                path: vec![PathPart::from("feed")],
                args: JsonValue::from(json!({"first": 1})).as_object().cloned().unwrap(),
                default_return: JsonValue::from("default"),
                copy_from: None,
            },
        );
        let migrated = migrate(&snapshot, &migrations).unwrap();
        assert_eq!(
            migrated.get(r#"ROOT_QUERY❖["feed"]❖{"first":1}"#),
            Some(&JsonValue::from("cached"))
        );
    }
}
