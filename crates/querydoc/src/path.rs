//! Dotted-path resolution against a document schema.
//!
//! Paths resolve segment by segment: name segments are renamed to their wire
//! names, positional segments (`$` or all digits) descend into the array item
//! and are preserved verbatim. Resolution against an uncooperative schema
//! degrades to literal pass-through rather than erroring, because raw string
//! paths against dynamic documents are a first-class use case.

use crate::schema::Schema;

/// Resolve a dotted path against a schema.
///
/// Returns the (possibly renamed) wire path plus the schema of the value at
/// that position. The schema is `None` whenever resolution failed partway:
/// segments resolved before the failure keep their renamed form, the failing
/// segment and everything after it pass through unchanged.
pub fn resolve(schema: &Schema, path: &str) -> (String, Option<Schema>) {
    // Literal fallback for dynamic/untyped documents.
    let Schema::Document(_) = schema else {
        return (path.to_string(), None);
    };

    // Whole-path lookup first: dotted names may be registered directly.
    if let Some(member) = schema.member(path) {
        return (member.wire_name.clone(), Some(member.schema.clone()));
    }

    // A single unresolvable segment passes through literally.
    if !path.contains('.') {
        return (path.to_string(), None);
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut resolved: Vec<String> = Vec::with_capacity(segments.len());
    let mut current = schema.clone();

    for (i, segment) in segments.iter().enumerate() {
        match step(&current, segment) {
            Some((rendered, next)) => {
                resolved.push(rendered);
                current = next;
            }
            None => {
                // Keep the renamed prefix, pass the rest through unchanged.
                resolved.extend(segments[i..].iter().map(|s| (*s).to_string()));
                return (resolved.join("."), None);
            }
        }
    }

    (resolved.join("."), Some(current))
}

/// Resolve a typed member-access chain strictly.
///
/// Every segment must resolve; the first failure aborts with a reason string
/// (the caller wraps it into a render error, since no wire name exists for
/// an unresolved typed member).
pub(crate) fn resolve_strict(schema: &Schema, segments: &[String]) -> Result<(String, Schema), String> {
    if !matches!(schema, Schema::Document(_)) {
        return Err("the root schema is not a document".to_string());
    }

    let mut resolved: Vec<String> = Vec::with_capacity(segments.len());
    let mut current = schema.clone();

    for segment in segments {
        match step(&current, segment) {
            Some((rendered, next)) => {
                resolved.push(rendered);
                current = next;
            }
            None => {
                return Err(if is_array_position(segment) {
                    format!("positional segment '{segment}' applied to a non-array schema")
                } else {
                    format!("no member named '{segment}'")
                });
            }
        }
    }

    Ok((resolved.join("."), current))
}

/// Resolve one path segment against the schema at the current position.
///
/// Returns the rendered segment text and the schema to continue with, or
/// `None` when the segment cannot be resolved.
fn step(current: &Schema, segment: &str) -> Option<(String, Schema)> {
    if is_array_position(segment) {
        // Positional segments descend into the array item and are never
        // renamed.
        let item = current.item()?;
        return Some((segment.to_string(), item.clone()));
    }

    // Member lookup, with one fallback: an array schema retries the lookup
    // against its item.
    let member = current
        .member(segment)
        .or_else(|| current.item().and_then(|item| item.member(segment)))?;
    Some((member.wire_name.clone(), member.schema.clone()))
}

/// A positional/array segment: the `$` placeholder or a bare element index.
fn is_array_position(segment: &str) -> bool {
    segment == "$" || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
}
