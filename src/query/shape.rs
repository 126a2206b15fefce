//! Flattened selection shape
//!
//! Fragment spreads and inline fragments are inlined and fields sharing a
//! response key are merged, so walkers see one field per key and level. No
//! type-condition filtering is performed.

use crate::error::{GraphError, Result};
use crate::query::types::*;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    pub fields: Vec<ShapeField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShapeField {
    /// Key in result payloads (alias or name)
    pub response_key: String,
    /// Field name
    pub name: String,
    pub has_arguments: bool,
    /// Selection below the field; `None` for leaves
    pub children: Option<Shape>,
}

impl Shape {
    pub fn field(&self, response_key: &str) -> Option<&ShapeField> {
        self.fields.iter().find(|field| field.response_key == response_key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn merge_field(&mut self, field: ShapeField) {
        match self.fields.iter_mut().find(|f| f.response_key == field.response_key) {
            Some(existing) => {
                existing.has_arguments |= field.has_arguments;
                existing.children = match (existing.children.take(), field.children) {
                    (Some(mut a), Some(b)) => {
                        for child in b.fields {
                            a.merge_field(child);
                        }
                        Some(a)
                    }
                    (a, b) => a.or(b),
                };
            }
            None => self.fields.push(field),
        }
    }
}

/// Flatten a selection set against its fragments
pub fn build_shape(fragments: &Fragments, selection_set: &SelectionSet) -> Result<Shape> {
    let mut shape = Shape::default();
    let mut visiting = Vec::new();
    collect(fragments, selection_set, &mut shape, &mut visiting)?;
    Ok(shape)
}

fn collect<'a>(
    fragments: &'a Fragments,
    selection_set: &'a SelectionSet,
    shape: &mut Shape,
    visiting: &mut Vec<&'a str>,
) -> Result<()> {
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                let children = match field.selection_set {
                    Some(ref selection_set) => {
                        let mut children = Shape::default();
                        collect(fragments, selection_set, &mut children, visiting)?;
                        Some(children)
                    }
                    None => None,
                };
                shape.merge_field(ShapeField {
                    response_key: field.response_key().to_string(),
                    name: field.name.clone(),
                    has_arguments: !field.arguments.is_empty(),
                    children,
                });
            }
            Selection::FragmentSpread(name) => {
                let fragment = fragments
                    .get(name)
                    .ok_or_else(|| GraphError::FragmentNotFound(name.clone()))?;
                if visiting.contains(&name.as_str()) {
                    return Err(GraphError::InvalidFormat(format!("fragment cycle through '{}'", name)));
                }
                visiting.push(name);
                collect(fragments, &fragment.selection_set, shape, visiting)?;
                visiting.pop();
            }
            Selection::InlineFragment { selection_set, .. } => {
                collect(fragments, selection_set, shape, visiting)?;
            }
        }
    }
    Ok(())
}
