//! Parameterized field map
//!
//! A static tree, derived once per document, marking the fields of a result
//! shape that carry arguments or aliases. Writers and readers consult it while
//! walking data instead of re-inspecting the document.

use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::query::types::*;
use crate::value::JsonObject;

/// Entries keyed by response key (the alias when one is present)
pub type FieldMap<A> = BTreeMap<String, FieldMapEntry<A>>;

/// Field map with unresolved variables
pub type RawFieldMap = FieldMap<Arguments>;

/// Field map with every variable substituted
pub type ExpandedFieldMap = FieldMap<JsonObject>;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldMapEntry<A> {
    /// Field with arguments and/or an alias
    Dynamic(DynamicField<A>),
    /// Plain field whose descendants are dynamic
    Nested(FieldMap<A>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DynamicField<A> {
    /// Arguments, if the field takes any
    pub args: Option<A>,
    /// Actual field name when the response key is an alias
    pub alias_of: Option<String>,
    pub children: Option<FieldMap<A>>,
}

impl<A> FieldMapEntry<A> {
    /// Arguments of a parameterized field
    pub fn args(&self) -> Option<&A> {
        match self {
            FieldMapEntry::Dynamic(field) => field.args.as_ref(),
            FieldMapEntry::Nested(_) => None,
        }
    }

    /// Stored field name for the given response key
    pub fn field_name<'a>(&'a self, response_key: &'a str) -> &'a str {
        match self {
            FieldMapEntry::Dynamic(DynamicField { alias_of: Some(name), .. }) => name,
            _ => response_key,
        }
    }

    /// Field map of the selection below this entry
    pub fn children(&self) -> Option<&FieldMap<A>> {
        match self {
            FieldMapEntry::Dynamic(field) => field.children.as_ref(),
            FieldMapEntry::Nested(children) => Some(children),
        }
    }
}

/// Build the field map of a selection set.
///
/// Fragment spreads are unioned into the level they appear at. Returns `None`
/// when nothing in the selection is dynamic.
pub fn build_field_map(fragments: &Fragments, selection_set: &SelectionSet) -> Result<Option<RawFieldMap>> {
    let mut visiting = Vec::new();
    let map = build_level(fragments, selection_set, &mut visiting)?;
    Ok(if map.is_empty() { None } else { Some(map) })
}

fn build_level<'a>(
    fragments: &'a Fragments,
    selection_set: &'a SelectionSet,
    visiting: &mut Vec<&'a str>,
) -> Result<RawFieldMap> {
    let mut map = RawFieldMap::new();

    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                let children = match field.selection_set {
                    Some(ref selection_set) => {
                        let children = build_level(fragments, selection_set, visiting)?;
                        if children.is_empty() { None } else { Some(children) }
                    }
                    None => None,
                };
                let args = if field.arguments.is_empty() {
                    None
                } else {
                    Some(field.arguments.clone())
                };

                let entry = if args.is_some() || field.alias.is_some() {
                    FieldMapEntry::Dynamic(DynamicField {
                        args,
                        alias_of: field.alias.as_ref().map(|_| field.name.clone()),
                        children,
                    })
                } else if let Some(children) = children {
                    FieldMapEntry::Nested(children)
                } else {
                    continue;
                };
                insert_entry(&mut map, field.response_key(), entry);
            }
            Selection::FragmentSpread(name) => {
                let fragment = fragments
                    .get(name)
                    .ok_or_else(|| GraphError::FragmentNotFound(name.clone()))?;
                if visiting.contains(&name.as_str()) {
                    return Err(GraphError::InvalidFormat(format!("fragment cycle through '{}'", name)));
                }
                visiting.push(name);
                let fragment_map = build_level(fragments, &fragment.selection_set, visiting)?;
                visiting.pop();
                union_into(&mut map, fragment_map);
            }
            Selection::InlineFragment { selection_set, .. } => {
                let fragment_map = build_level(fragments, selection_set, visiting)?;
                union_into(&mut map, fragment_map);
            }
        }
    }

    Ok(map)
}

fn union_into(target: &mut RawFieldMap, source: RawFieldMap) {
    for (key, entry) in source {
        insert_entry(target, &key, entry);
    }
}

fn insert_entry(map: &mut RawFieldMap, key: &str, entry: FieldMapEntry<Arguments>) {
    let merged = match map.remove(key) {
        None => entry,
        Some(existing) => merge_entries(existing, entry),
    };
    map.insert(key.to_string(), merged);
}

fn merge_children(a: Option<RawFieldMap>, b: Option<RawFieldMap>) -> Option<RawFieldMap> {
    match (a, b) {
        (Some(mut a), Some(b)) => {
            union_into(&mut a, b);
            Some(a)
        }
        (a, b) => a.or(b),
    }
}

fn merge_entries(a: FieldMapEntry<Arguments>, b: FieldMapEntry<Arguments>) -> FieldMapEntry<Arguments> {
    match (a, b) {
        (FieldMapEntry::Nested(a), FieldMapEntry::Nested(b)) => {
            FieldMapEntry::Nested(merge_children(Some(a), Some(b)).unwrap_or_default())
        }
        (FieldMapEntry::Dynamic(mut field), FieldMapEntry::Nested(children))
        | (FieldMapEntry::Nested(children), FieldMapEntry::Dynamic(mut field)) => {
            field.children = merge_children(field.children, Some(children));
            FieldMapEntry::Dynamic(field)
        }
        (FieldMapEntry::Dynamic(mut a), FieldMapEntry::Dynamic(b)) => {
            a.children = merge_children(a.children, b.children);
            a.args = a.args.or(b.args);
            a.alias_of = a.alias_of.or(b.alias_of);
            FieldMapEntry::Dynamic(a)
        }
    }
}

/// Replace every variable placeholder with its value.
///
/// Defaults must already be merged into `variables`; a missing variable is an
/// error.
pub fn expand_variables(map: &RawFieldMap, variables: &JsonObject) -> Result<ExpandedFieldMap> {
    map.iter()
        .map(|(key, entry)| {
            let expanded = match entry {
                FieldMapEntry::Nested(children) => FieldMapEntry::Nested(expand_variables(children, variables)?),
                FieldMapEntry::Dynamic(field) => FieldMapEntry::Dynamic(DynamicField {
                    args: field
                        .args
                        .as_ref()
                        .map(|args| expand_arguments(args, variables))
                        .transpose()?,
                    alias_of: field.alias_of.clone(),
                    children: field
                        .children
                        .as_ref()
                        .map(|children| expand_variables(children, variables))
                        .transpose()?,
                }),
            };
            Ok((key.clone(), expanded))
        })
        .collect()
}
