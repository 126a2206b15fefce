//! Cache configuration and the per-cache context shared by reads and writes

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::graph::{operation_fingerprint, NodeId, QUERY_ROOT_ID};
use crate::query::{parse_document, ParsedQuery};
use crate::value::{JsonObject, JsonValue};

/// Extracts the entity id of an object, or `None` for plain values
pub type EntityIdFn = Arc<dyn Fn(&JsonObject) -> Option<NodeId> + Send + Sync>;

/// Rewrites entity data once per commit that changed it
pub type EntityTransformer = Arc<dyn Fn(&JsonValue) -> JsonValue + Send + Sync>;

/// Default entity id: the `id` field when it is a string or a number
pub fn default_entity_id(node: &JsonObject) -> Option<NodeId> {
    match node.get("id")? {
        JsonValue::String(id) => Some(id.clone()),
        JsonValue::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Configuration {
    pub entity_id_for_node: EntityIdFn,
    pub entity_transformer: Option<EntityTransformer>,
    /// Freeze every snapshot the editor produces
    pub freeze: bool,
    /// Treat selected fields missing from a payload as errors
    pub strict: bool,
    /// Log commits at info level instead of debug
    pub verbose: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            entity_id_for_node: Arc::new(default_entity_id),
            entity_transformer: None,
            freeze: false,
            strict: false,
            verbose: false,
        }
    }
}

impl Configuration {
    pub fn with_entity_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&JsonObject) -> Option<NodeId> + Send + Sync + 'static,
    {
        self.entity_id_for_node = Arc::new(f);
        self
    }

    pub fn with_entity_transformer<F>(mut self, f: F) -> Self
    where
        F: Fn(&JsonValue) -> JsonValue + Send + Sync + 'static,
    {
        self.entity_transformer = Some(Arc::new(f));
        self
    }

    pub fn with_freeze(mut self, freeze: bool) -> Self {
        self.freeze = freeze;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("entity_transformer", &self.entity_transformer.is_some())
            .field("freeze", &self.freeze)
            .field("strict", &self.strict)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Unparsed operation as handed to the cache.
///
/// A fragment operation reads or writes the fragment's selection relative to
/// an arbitrary node; a regular operation is rooted at its operation type's
/// root unless `root_id` overrides it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawOperation {
    pub root_id: Option<NodeId>,
    pub document: String,
    /// Operation or fragment name; needed when the document holds several
    pub name: Option<String>,
    pub fragment: bool,
    pub variables: JsonObject,
}

impl RawOperation {
    pub fn query(document: impl Into<String>) -> Self {
        RawOperation {
            root_id: None,
            document: document.into(),
            name: None,
            fragment: false,
            variables: JsonObject::new(),
        }
    }

    pub fn fragment(root_id: impl Into<NodeId>, document: impl Into<String>) -> Self {
        RawOperation {
            root_id: Some(root_id.into()),
            document: document.into(),
            name: None,
            fragment: true,
            variables: JsonObject::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_root(mut self, root_id: impl Into<NodeId>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }

    pub fn with_variables(mut self, variables: JsonObject) -> Self {
        self.variables = variables;
        self
    }

    pub fn fingerprint(&self) -> u128 {
        let name = match (self.fragment, self.name.as_deref()) {
            (true, Some(name)) => format!("fragment:{}", name),
            (true, None) => "fragment:".to_string(),
            (false, name) => name.unwrap_or_default().to_string(),
        };
        operation_fingerprint(
            &self.document,
            self.root_id.as_deref().unwrap_or_default(),
            Some(&name),
            &self.variables,
        )
    }
}

/// Configuration plus the memo of parsed operations
pub struct CacheContext {
    config: Configuration,
    parsed_queries: Mutex<HashMap<u128, Arc<ParsedQuery>>>,
}

impl CacheContext {
    pub fn new(config: Configuration) -> Self {
        CacheContext {
            config,
            parsed_queries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Entity id of a payload value; only objects can be entities
    pub fn entity_id_for_value(&self, value: &JsonValue) -> Option<NodeId> {
        value.as_object().and_then(|node| (self.config.entity_id_for_node)(node))
    }

    pub fn transform_entity(&self, data: &JsonValue) -> Option<JsonValue> {
        self.config.entity_transformer.as_ref().map(|transform| transform(data))
    }

    /// Advisory message; never affects control flow
    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    /// Resolve an operation, memoized by document, root, name and variables
    pub fn parse_operation(&self, raw: &RawOperation) -> Result<Arc<ParsedQuery>> {
        let fingerprint = raw.fingerprint();
        if let Some(parsed) = self.parsed_queries.lock().ok().and_then(|memo| memo.get(&fingerprint).cloned()) {
            tracing::trace!("Parsed query memo hit: {:032x}", fingerprint);
            return Ok(parsed);
        }

        let document = parse_document(&raw.document)?;
        let fragments = document.fragment_map();

        let parsed = if raw.fragment {
            let fragment = document.fragment(raw.name.as_deref())?;
            let root_id = raw.root_id.clone().unwrap_or_else(|| QUERY_ROOT_ID.to_string());
            ParsedQuery::new(root_id, &fragments, &fragment.selection_set, raw.variables.clone(), fingerprint)?
        } else {
            let operation = document.operation(raw.name.as_deref())?;
            let mut variables = operation.default_variables()?;
            variables.extend(raw.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
            let root_id = raw
                .root_id
                .clone()
                .unwrap_or_else(|| operation.operation.root_id().to_string());
            ParsedQuery::new(root_id, &fragments, &operation.selection_set, variables, fingerprint)?
        };

        let parsed = Arc::new(parsed);
        if let Ok(mut memo) = self.parsed_queries.lock() {
            memo.insert(fingerprint, Arc::clone(&parsed));
        }
        Ok(parsed)
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        CacheContext::new(Configuration::default())
    }
}

impl fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContext").field("config", &self.config).finish()
    }
}
