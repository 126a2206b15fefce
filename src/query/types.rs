//! Query document types: operations, fragments, selections, arguments

use std::collections::{BTreeMap, HashMap};

use crate::error::{GraphError, Result};
use crate::graph::{MUTATION_ROOT_ID, QUERY_ROOT_ID, SUBSCRIPTION_ROOT_ID};
use crate::value::{JsonObject, JsonValue};

/// Argument value as written in the document.
///
/// Variables stay unresolved placeholders until [`ArgumentValue::expand`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentValue {
    Variable(String),
    Literal(JsonValue),
    List(Vec<ArgumentValue>),
    Object(BTreeMap<String, ArgumentValue>),
}

/// Field arguments by name
pub type Arguments = BTreeMap<String, ArgumentValue>;

impl ArgumentValue {
    /// Create a variable placeholder
    pub fn variable(name: &str) -> Self {
        ArgumentValue::Variable(name.to_string())
    }

    /// Check if this value or any nested value is a variable
    pub fn has_variables(&self) -> bool {
        match self {
            ArgumentValue::Variable(_) => true,
            ArgumentValue::Literal(_) => false,
            ArgumentValue::List(items) => items.iter().any(|v| v.has_variables()),
            ArgumentValue::Object(fields) => fields.values().any(|v| v.has_variables()),
        }
    }

    /// Substitute variables with their values
    pub fn expand(&self, variables: &JsonObject) -> Result<JsonValue> {
        match self {
            ArgumentValue::Variable(name) => variables
                .get(name)
                .cloned()
                .ok_or_else(|| GraphError::MissingVariable(name.clone())),
            ArgumentValue::Literal(value) => Ok(value.clone()),
            ArgumentValue::List(items) => Ok(JsonValue::array(
                items.iter().map(|v| v.expand(variables)).collect::<Result<Vec<_>>>()?,
            )),
            ArgumentValue::Object(fields) => Ok(JsonValue::object(expand_arguments(fields, variables)?)),
        }
    }
}

/// Substitute variables in every argument
pub fn expand_arguments(arguments: &Arguments, variables: &JsonObject) -> Result<JsonObject> {
    arguments
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.expand(variables)?)))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    /// Well-known node the operation's result is stored under
    pub fn root_id(&self) -> &'static str {
        match self {
            OperationType::Query => QUERY_ROOT_ID,
            OperationType::Mutation => MUTATION_ROOT_ID,
            OperationType::Subscription => SUBSCRIPTION_ROOT_ID,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    /// Type as written, e.g. `[ID!]!`
    pub type_name: String,
    pub default_value: Option<ArgumentValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperationDefinition {
    pub operation: OperationType,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

impl OperationDefinition {
    /// Default values of the declared variables that have one
    pub fn default_variables(&self) -> Result<JsonObject> {
        let mut defaults = JsonObject::new();
        for definition in &self.variables {
            if let Some(ref value) = definition.default_value {
                defaults.insert(definition.name.clone(), value.expand(&JsonObject::new())?);
            }
        }
        Ok(defaults)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

pub type SelectionSet = Vec<Selection>;

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(String),
    InlineFragment {
        type_condition: Option<String>,
        selection_set: SelectionSet,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Arguments,
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    /// Create a leaf field without arguments
    pub fn leaf(name: &str) -> Self {
        Field {
            alias: None,
            name: name.to_string(),
            arguments: Arguments::new(),
            selection_set: None,
        }
    }

    /// Key of this field in a result payload
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Fragment definitions by name
pub type Fragments = HashMap<String, FragmentDefinition>;

/// A parsed executable document
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: Vec<FragmentDefinition>,
}

impl Document {
    pub fn fragment_map(&self) -> Fragments {
        self.fragments
            .iter()
            .map(|fragment| (fragment.name.clone(), fragment.clone()))
            .collect()
    }

    /// Operation by name, or the only operation when no name is given
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| GraphError::OperationNotFound(name.to_string())),
            None => self
                .operations
                .first()
                .ok_or_else(|| GraphError::OperationNotFound("<anonymous>".to_string())),
        }
    }

    /// Fragment by name; without a name the document must hold exactly one
    pub fn fragment(&self, name: Option<&str>) -> Result<&FragmentDefinition> {
        match name {
            Some(name) => self
                .fragments
                .iter()
                .find(|fragment| fragment.name == name)
                .ok_or_else(|| GraphError::FragmentNotFound(name.to_string())),
            None => match self.fragments.as_slice() {
                [only] => Ok(only),
                [] => Err(GraphError::FragmentNotFound("<unnamed>".to_string())),
                many => Err(GraphError::AmbiguousFragment(many.len())),
            },
        }
    }
}
