//! Field references: raw dotted paths or typed member-access chains.
//!
//! A [`FieldRef`] is resolved lazily at render time, so one built expression
//! can be rendered against different schemas (a base document type once, a
//! derived collection element type another time).

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BuildError, RenderError};
use crate::path;
use crate::schema::{DocumentType, Schema};

/// A typed member-access chain rooted at document type `T`.
///
/// The phantom parameter ties the chain to its declaring document type at
/// the call site; mismatched chains are a compile error rather than a
/// runtime check.
#[derive(Debug, Clone)]
pub struct TypedPath<T> {
    segments: Vec<String>,
    _declaring: PhantomData<fn() -> T>,
}

impl<T: DocumentType> TypedPath<T> {
    /// The empty chain at the document root.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            _declaring: PhantomData,
        }
    }

    /// Append a member access.
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    /// Append the positional (`$`) array segment.
    pub fn positional(mut self) -> Self {
        self.segments.push("$".to_string());
        self
    }

    /// Append a concrete array element index.
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(index.to_string());
        self
    }
}

impl<T: DocumentType> Default for TypedPath<T> {
    fn default() -> Self {
        Self::root()
    }
}

/// A reference to a document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRef {
    /// A raw dotted path. Unresolvable segments pass through literally.
    Named(String),
    /// A typed member-access chain. Every segment must resolve at render
    /// time; there is no literal fallback because no wire name exists for
    /// an unresolved typed member.
    Typed {
        declaring: String,
        segments: Vec<String>,
    },
}

impl FieldRef {
    /// A raw dotted-path reference.
    pub fn named(path: impl Into<String>) -> Result<Self, BuildError> {
        FieldRef::Named(path.into()).validated()
    }

    /// A typed member-chain reference.
    pub fn typed<T: DocumentType>(path: TypedPath<T>) -> Result<Self, BuildError> {
        FieldRef::from(path).validated()
    }

    /// Validate construction-time invariants: a non-empty path and
    /// non-empty member names.
    pub(crate) fn validated(self) -> Result<Self, BuildError> {
        match &self {
            FieldRef::Named(p) if p.is_empty() => Err(BuildError::EmptyFieldPath),
            FieldRef::Typed { segments, .. } if segments.is_empty() => {
                Err(BuildError::EmptyMemberChain)
            }
            FieldRef::Typed { segments, .. } if segments.iter().any(String::is_empty) => {
                Err(BuildError::EmptyMemberName)
            }
            _ => Ok(self),
        }
    }

    /// Resolve this reference against a schema.
    pub fn render(&self, schema: &Schema) -> Result<RenderedField, RenderError> {
        match self {
            FieldRef::Named(p) => {
                let (path, resolved) = path::resolve(schema, p);
                Ok(RenderedField {
                    path,
                    schema: resolved,
                })
            }
            FieldRef::Typed {
                declaring,
                segments,
            } => match path::resolve_strict(schema, segments) {
                Ok((path, resolved)) => Ok(RenderedField {
                    path,
                    schema: Some(resolved),
                }),
                Err(reason) => Err(RenderError::UnresolvedTypedField {
                    path: segments.join("."),
                    declaring: declaring.clone(),
                    reason,
                }),
            },
        }
    }
}

impl From<&str> for FieldRef {
    fn from(path: &str) -> Self {
        FieldRef::Named(path.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(path: String) -> Self {
        FieldRef::Named(path)
    }
}

impl<T: DocumentType> From<TypedPath<T>> for FieldRef {
    fn from(path: TypedPath<T>) -> Self {
        FieldRef::Typed {
            declaring: T::NAME.to_string(),
            segments: path.segments,
        }
    }
}

/// The result of resolving a field reference: the wire path plus the schema
/// of the value at that position, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedField {
    pub path: String,
    pub schema: Option<Schema>,
}

impl RenderedField {
    /// Serialize a value with the resolved schema, or pass it through.
    pub(crate) fn serialize(&self, value: &Value) -> Value {
        match &self.schema {
            Some(schema) => schema.serialize_value(value),
            None => value.clone(),
        }
    }

    /// The item schema when this field is array-like.
    ///
    /// `Ok(None)` for unresolved or dynamic fields (lenient pass-through);
    /// an error when the schema is known and not an array.
    pub(crate) fn item_schema(&self) -> Result<Option<Schema>, RenderError> {
        match &self.schema {
            Some(Schema::Array(item)) => Ok(Some((**item).clone())),
            Some(Schema::Dynamic) | None => Ok(None),
            Some(_) => Err(RenderError::NotAnArrayField {
                field: self.path.clone(),
            }),
        }
    }
}

/// Serialize a value with an optional item schema.
pub(crate) fn serialize_with(schema: &Option<Schema>, value: &Value) -> Value {
    match schema {
        Some(schema) => schema.serialize_value(value),
        None => value.clone(),
    }
}
