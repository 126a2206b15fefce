//! Query documents and their cache-facing representations
//!
//! The cache never walks raw documents. An operation is turned once into a
//! [`ParsedQuery`]: the flattened [`Shape`] of its selection plus the
//! [`ExpandedFieldMap`] of its parameterized fields.
//!
//! # Example
//! ```
//! use graph_cache::query::{build_field_map, parse_document};
//!
//! let document = parse_document(r#"{ shipment(city: "Seattle") { id } }"#).unwrap();
//! let operation = document.operation(None).unwrap();
//! let map = build_field_map(&document.fragment_map(), &operation.selection_set).unwrap();
//! assert!(map.unwrap().contains_key("shipment"));
//! ```

mod field_map;
mod parser;
mod shape;
mod types;

pub use field_map::*;
pub use parser::*;
pub use shape::*;
pub use types::*;

use crate::error::Result;
use crate::graph::NodeId;
use crate::value::JsonObject;

/// An operation resolved against its fragments and variables
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuery {
    /// Node the operation's result is rooted at
    pub root_id: NodeId,
    pub shape: Shape,
    /// `None` when no field in the selection is dynamic
    pub dynamic_fields: Option<ExpandedFieldMap>,
    /// Variables with defaults applied
    pub variables: JsonObject,
    /// Operation identity used for memoization
    pub fingerprint: u128,
}

impl ParsedQuery {
    /// Resolve a selection set. `variables` must already include defaults.
    pub fn new(
        root_id: impl Into<NodeId>,
        fragments: &Fragments,
        selection_set: &SelectionSet,
        variables: JsonObject,
        fingerprint: u128,
    ) -> Result<Self> {
        let shape = build_shape(fragments, selection_set)?;
        let dynamic_fields = build_field_map(fragments, selection_set)?
            .map(|map| expand_variables(&map, &variables))
            .transpose()?;

        Ok(ParsedQuery {
            root_id: root_id.into(),
            shape,
            dynamic_fields,
            variables,
            fingerprint,
        })
    }

    /// Whether any field needs parameterized-value handling
    pub fn is_static(&self) -> bool {
        self.dynamic_fields.is_none()
    }
}

#[cfg(test)]
mod tests;
