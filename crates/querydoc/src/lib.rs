//! # querydoc
//!
//! A builder library for document-database query, update, and projection
//! expressions.
//!
//! Expressions are immutable trees built through constructor facades and
//! rendered lazily against a [`Schema`](schema::Schema), which maps declared
//! member names to their wire names. The same expression can be rendered
//! against different schemas, and a raw string path that the schema does not
//! know simply passes through unchanged.
//!
//! ## Quick Start
//!
//! ```
//! use querydoc::filter::Filter;
//! use querydoc::schema::{Schema, SchemaRegistry};
//! use serde_json::json;
//!
//! // Describe how Person serializes: "Name" is stored as "name".
//! let schema = Schema::document()
//!     .renamed("Name", "name", Schema::Scalar)
//!     .renamed("Tags", "tags", Schema::array(Schema::Scalar))
//!     .build();
//! let registry = SchemaRegistry::new();
//!
//! // Build a filter and render it to a query document.
//! let filter = Filter::and(vec![
//!     Filter::eq("Name", "Bob").unwrap(),
//!     Filter::is_in("Tags", vec![json!("rust")]).unwrap(),
//! ]);
//! let query = filter.render(&schema, &registry).unwrap();
//! assert_eq!(
//!     serde_json::Value::Object(query),
//!     json!({"name": "Bob", "tags": {"$in": ["rust"]}})
//! );
//! ```

pub mod error;
pub mod field;
pub mod filter;
pub mod path;
pub mod projection;
pub mod schema;
pub mod update;

/// A rendered document: an ordered map of field names to values.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub use error::{BuildError, Error, RenderError, Result};
pub use field::{FieldRef, TypedPath};
pub use filter::{Filter, TextOptions};
pub use projection::{Projection, ProjectionContext};
pub use schema::{DocumentType, Schema, SchemaRegistry};
pub use update::{PushModifiers, Update};
