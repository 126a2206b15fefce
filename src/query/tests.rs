//! Tests for query documents, field maps and shapes

use super::*;
use crate::error::GraphError;
use crate::value::JsonValue;

fn vars(pairs: &[(&str, JsonValue)]) -> JsonObject {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn field_map_of(source: &str) -> Option<RawFieldMap> {
    let document = parse_document(source).unwrap();
    let operation = document.operation(None).unwrap();
    build_field_map(&document.fragment_map(), &operation.selection_set).unwrap()
}

// ============================================================================
// Parser
// ============================================================================

mod parser_tests {
    use super::*;

    #[test]
    fn test_parse_anonymous_query() {
        let document = parse_document("{ viewer { id name } }").unwrap();
        assert_eq!(document.operations.len(), 1);

        let operation = &document.operations[0];
        assert_eq!(operation.operation, OperationType::Query);
        assert_eq!(operation.name, None);

        match &operation.selection_set[0] {
            Selection::Field(field) => {
                assert_eq!(field.name, "viewer");
                assert_eq!(field.selection_set.as_ref().map(|s| s.len()), Some(2));
            }
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_named_operation_with_variables() {
        let document = parse_document(
            "query GetUser($id: ID!, $limit: Int = 10, $tags: [String!]) { user(id: $id) { id } }",
        )
        .unwrap();
        let operation = document.operation(Some("GetUser")).unwrap();

        assert_eq!(operation.variables.len(), 3);
        assert_eq!(operation.variables[0].type_name, "ID!");
        assert_eq!(operation.variables[2].type_name, "[String!]");
        assert_eq!(
            operation.default_variables().unwrap(),
            vars(&[("limit", JsonValue::from(10))])
        );
    }

    #[test]
    fn test_parse_mutation_root() {
        let document = parse_document("mutation { createUser(name: \"ada\") { id } }").unwrap();
        assert_eq!(document.operations[0].operation.root_id(), crate::graph::MUTATION_ROOT_ID);
    }

    #[test]
    fn test_parse_alias_and_arguments() {
        let selection = parse_selection_set(r#"{ first: user(id: 1, active: true, role: ADMIN) { id } }"#).unwrap();
        let Selection::Field(field) = &selection[0] else {
            panic!("expected field");
        };

        assert_eq!(field.alias.as_deref(), Some("first"));
        assert_eq!(field.name, "user");
        assert_eq!(field.response_key(), "first");
        assert_eq!(field.arguments["id"], ArgumentValue::Literal(JsonValue::from(1)));
        assert_eq!(field.arguments["active"], ArgumentValue::Literal(JsonValue::Bool(true)));
        assert_eq!(field.arguments["role"], ArgumentValue::Literal(JsonValue::from("ADMIN")));
    }

    #[test]
    fn test_parse_complex_values() {
        let value = parse_value(r#"{ city: $city, ids: [1, 2.5, "three", null] }"#).unwrap();
        let ArgumentValue::Object(fields) = value else {
            panic!("expected object");
        };
        assert_eq!(fields["city"], ArgumentValue::variable("city"));

        let ArgumentValue::List(ref items) = fields["ids"] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[3], ArgumentValue::Literal(JsonValue::Null));
    }

    #[test]
    fn test_parse_string_escapes() {
        let value = parse_value(r#""line\n\"quoted\" A""#).unwrap();
        assert_eq!(value, ArgumentValue::Literal(JsonValue::from("line\n\"quoted\" A")));
    }

    #[test]
    fn test_parse_fragments_and_spreads() {
        let document = parse_document(
            r#"
            # leading comment
            query { viewer { ...UserFields ... on User { email } ... @include(if: true) { age } } }
            fragment UserFields on User { id name }
            "#,
        )
        .unwrap();

        assert_eq!(document.fragments.len(), 1);
        assert_eq!(document.fragments[0].type_condition, "User");
        assert_eq!(document.fragment(None).unwrap().name, "UserFields");

        let Selection::Field(viewer) = &document.operations[0].selection_set[0] else {
            panic!("expected field");
        };
        let children = viewer.selection_set.as_ref().unwrap();
        assert_eq!(children[0], Selection::FragmentSpread("UserFields".to_string()));
        assert!(matches!(
            &children[1],
            Selection::InlineFragment { type_condition: Some(t), .. } if t == "User"
        ));
        assert!(matches!(&children[2], Selection::InlineFragment { type_condition: None, .. }));
    }

    #[test]
    fn test_parse_directives_are_ignored() {
        let selection = parse_selection_set("{ user @skip(if: $hidden) { id @client } }").unwrap();
        let Selection::Field(field) = &selection[0] else {
            panic!("expected field");
        };
        assert!(field.arguments.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_document("").is_err());
        assert!(parse_document("{ }").is_err());
        assert!(parse_document("{ user(id: ) }").is_err());
        assert!(parse_document("query { user ").is_err());
        assert!(parse_document("operation { id }").is_err());
        assert!(parse_document("fragment on on User { id }").is_err());
        assert!(parse_value(r#""unterminated"#).is_err());
        assert!(parse_selection_set("{ id } trailing").is_err());
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_document("{ user(id: %) }").unwrap_err();
        assert_eq!(err.position, 11);
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn test_default_cannot_reference_variable() {
        assert!(parse_document("query ($a: Int = $b) { id }").is_err());
    }
}

// ============================================================================
// Document lookup
// ============================================================================

mod document_tests {
    use super::*;

    #[test]
    fn test_operation_by_name() {
        let document = parse_document("query A { a } query B { b }").unwrap();
        assert_eq!(document.operation(Some("B")).unwrap().name.as_deref(), Some("B"));
        assert_eq!(document.operation(None).unwrap().name.as_deref(), Some("A"));
        assert!(matches!(
            document.operation(Some("C")),
            Err(GraphError::OperationNotFound(name)) if name == "C"
        ));
    }

    #[test]
    fn test_fragment_lookup() {
        let document = parse_document("fragment A on T { a } fragment B on T { b }").unwrap();
        assert_eq!(document.fragment(Some("B")).unwrap().name, "B");
        assert!(matches!(document.fragment(None), Err(GraphError::AmbiguousFragment(2))));
        assert!(matches!(document.fragment(Some("Z")), Err(GraphError::FragmentNotFound(_))));
    }
}

// ============================================================================
// Field map
// ============================================================================

mod field_map_tests {
    use super::*;

    #[test]
    fn test_static_selection_has_no_map() {
        assert_eq!(field_map_of("{ viewer { id name friends { id } } }"), None);
    }

    #[test]
    fn test_parameterized_field() {
        let map = field_map_of(r#"{ shipment(city: "Seattle") { id } }"#).unwrap();
        let entry = &map["shipment"];
        assert_eq!(
            entry.args().unwrap()["city"],
            ArgumentValue::Literal(JsonValue::from("Seattle"))
        );
        assert_eq!(entry.children(), None);
        assert_eq!(entry.field_name("shipment"), "shipment");
    }

    #[test]
    fn test_nested_parameterized_field() {
        let map = field_map_of("{ viewer { name friends(first: 2) { id } } }").unwrap();
        let FieldMapEntry::Nested(children) = &map["viewer"] else {
            panic!("expected nested entry");
        };
        assert_eq!(children.len(), 1);
        assert!(children["friends"].args().is_some());
    }

    #[test]
    fn test_alias_entry() {
        let map = field_map_of("{ me: viewer { id } }").unwrap();
        let entry = &map["me"];
        assert_eq!(entry.args(), None);
        assert_eq!(entry.field_name("me"), "viewer");
    }

    #[test]
    fn test_fragment_union() {
        let map = field_map_of(
            r#"
            { viewer { ...A ...B } }
            fragment A on User { posts(first: 1) { id } }
            fragment B on User { avatar(size: 64) }
            "#,
        )
        .unwrap();
        let children = map["viewer"].children().unwrap();
        assert!(children.contains_key("posts"));
        assert!(children.contains_key("avatar"));
    }

    #[test]
    fn test_missing_fragment() {
        let document = parse_document("{ viewer { ...Missing } }").unwrap();
        let result = build_field_map(&document.fragment_map(), &document.operations[0].selection_set);
        assert!(matches!(result, Err(GraphError::FragmentNotFound(name)) if name == "Missing"));
    }

    #[test]
    fn test_fragment_cycle() {
        let document = parse_document(
            "{ viewer { ...A } } fragment A on T { ...B } fragment B on T { ...A }",
        )
        .unwrap();
        let result = build_field_map(&document.fragment_map(), &document.operations[0].selection_set);
        assert!(matches!(result, Err(GraphError::InvalidFormat(_))));
    }

    #[test]
    fn test_expand_variables() {
        let map = field_map_of(r#"query ($id: ID!) { user(id: $id, filter: { tags: [$id, "x"] }) { id } }"#).unwrap();
        let expanded = expand_variables(&map, &vars(&[("id", JsonValue::from("u1"))])).unwrap();

        let args = expanded["user"].args().unwrap();
        assert_eq!(args["id"], JsonValue::from("u1"));
        assert_eq!(
            args["filter"],
            JsonValue::from(serde_json::json!({ "tags": ["u1", "x"] }))
        );
    }

    #[test]
    fn test_expand_missing_variable() {
        let map = field_map_of("query ($id: ID!) { user(id: $id) { id } }").unwrap();
        let result = expand_variables(&map, &JsonObject::new());
        assert!(matches!(result, Err(GraphError::MissingVariable(name)) if name == "id"));
    }
}

// ============================================================================
// Shape
// ============================================================================

mod shape_tests {
    use super::*;

    fn shape_of(source: &str) -> Shape {
        let document = parse_document(source).unwrap();
        build_shape(&document.fragment_map(), &document.operations[0].selection_set).unwrap()
    }

    #[test]
    fn test_flatten_fragments() {
        let shape = shape_of(
            r#"
            { viewer { id ...Profile ... on User { email } } }
            fragment Profile on User { name id }
            "#,
        );
        let viewer = shape.field("viewer").unwrap().children.as_ref().unwrap();
        let keys: Vec<_> = viewer.fields.iter().map(|f| f.response_key.as_str()).collect();
        assert_eq!(keys, vec!["id", "name", "email"]);
    }

    #[test]
    fn test_merge_same_key() {
        let shape = shape_of("{ viewer { id } viewer { name } }");
        assert_eq!(shape.fields.len(), 1);
        let children = shape.fields[0].children.as_ref().unwrap();
        assert!(children.field("id").is_some());
        assert!(children.field("name").is_some());
    }

    #[test]
    fn test_alias_and_arguments() {
        let shape = shape_of("{ small: avatar(size: 16) large: avatar(size: 128) }");
        let small = shape.field("small").unwrap();
        assert_eq!(small.name, "avatar");
        assert!(small.has_arguments);
        assert!(small.children.is_none());
        assert!(shape.field("avatar").is_none());
    }
}

// ============================================================================
// Parsed query
// ============================================================================

mod parsed_query_tests {
    use super::*;

    #[test]
    fn test_parsed_query_expands_dynamic_fields() {
        let document = parse_document("query ($n: Int) { feed(first: $n) { id } }").unwrap();
        let operation = document.operation(None).unwrap();
        let query = ParsedQuery::new(
            "ROOT_QUERY",
            &document.fragment_map(),
            &operation.selection_set,
            vars(&[("n", JsonValue::from(3))]),
            7,
        )
        .unwrap();

        assert!(!query.is_static());
        let dynamic = query.dynamic_fields.as_ref().unwrap();
        assert_eq!(dynamic["feed"].args().unwrap()["first"], JsonValue::from(3));
        assert!(query.shape.field("feed").is_some());
    }

    #[test]
    fn test_parsed_query_static() {
        let selection = parse_selection_set("{ viewer { id } }").unwrap();
        let query = ParsedQuery::new("ROOT_QUERY", &Fragments::new(), &selection, JsonObject::new(), 0).unwrap();
        assert!(query.is_static());
    }
}
