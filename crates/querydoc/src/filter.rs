//! Filter expressions and their canonical document rendering.
//!
//! A [`Filter`] is an immutable expression tree. Construction performs only
//! argument validation; all schema work happens in [`Filter::render`], which
//! is a pure function and may be called repeatedly against different schemas.
//!
//! Rendering is canonical: nested `$and`/`$or` are flattened, clauses on the
//! same field merge when their operators are distinct and promote to `$and`
//! form when they collide, and `Not` rewrites operators instead of wrapping
//! whenever the operator dictionary permits it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Document;
use crate::error::{BuildError, RenderError};
use crate::field::{FieldRef, serialize_with};
use crate::schema::{Schema, SchemaRegistry};

/// Scalar test operators rendered as `{field: {op: value}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    Size,
    Mod,
    Type,
    Exists,
    Regex,
}

impl CmpOp {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            CmpOp::Gt => "$gt",
            CmpOp::Gte => "$gte",
            CmpOp::Lt => "$lt",
            CmpOp::Lte => "$lte",
            CmpOp::Ne => "$ne",
            CmpOp::Size => "$size",
            CmpOp::Mod => "$mod",
            CmpOp::Type => "$type",
            CmpOp::Exists => "$exists",
            CmpOp::Regex => "$regex",
        }
    }

    /// Whether the operand is a field-typed value (serialized with the
    /// field's schema) rather than operator-shaped data like a size or a
    /// type name.
    const fn takes_field_value(self) -> bool {
        matches!(
            self,
            CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte | CmpOp::Ne
        )
    }
}

/// Array-valued operators rendered as `{field: {op: [v1, v2, ...]}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayOp {
    All,
    In,
    Nin,
}

impl ArrayOp {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            ArrayOp::All => "$all",
            ArrayOp::In => "$in",
            ArrayOp::Nin => "$nin",
        }
    }
}

/// Shapes accepted by `$geoWithin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeoShape {
    Box {
        bottom_left: [f64; 2],
        top_right: [f64; 2],
    },
    Center {
        center: [f64; 2],
        radius: f64,
    },
    CenterSphere {
        center: [f64; 2],
        radius: f64,
    },
    Polygon {
        vertices: Vec<[f64; 2]>,
    },
}

impl GeoShape {
    fn render(&self) -> Document {
        fn point(p: [f64; 2]) -> Value {
            Value::Array(vec![p[0].into(), p[1].into()])
        }
        match self {
            GeoShape::Box {
                bottom_left,
                top_right,
            } => doc_one(
                "$box",
                Value::Array(vec![point(*bottom_left), point(*top_right)]),
            ),
            GeoShape::Center { center, radius } => doc_one(
                "$center",
                Value::Array(vec![point(*center), (*radius).into()]),
            ),
            GeoShape::CenterSphere { center, radius } => doc_one(
                "$centerSphere",
                Value::Array(vec![point(*center), (*radius).into()]),
            ),
            GeoShape::Polygon { vertices } => doc_one(
                "$polygon",
                Value::Array(vertices.iter().map(|v| point(*v)).collect()),
            ),
        }
    }
}

/// Options for `$text` search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    pub language: Option<String>,
    pub case_sensitive: bool,
    pub diacritic_sensitive: bool,
}

/// A filter expression that renders to a canonical query document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document; renders `{}`.
    Empty,
    /// `{field: value}`.
    Eq { field: FieldRef, value: Value },
    /// `{field: {op: value}}`.
    Cmp {
        field: FieldRef,
        op: CmpOp,
        value: Value,
    },
    /// `{field: {op: [v1, v2, ...]}}`; items serialize with the array's
    /// item schema.
    ArrayCmp {
        field: FieldRef,
        op: ArrayOp,
        values: Vec<Value>,
    },
    /// `{field: {$elemMatch: inner}}`; the inner filter renders against the
    /// item schema.
    ElemMatch {
        field: FieldRef,
        filter: Box<Filter>,
    },
    /// `{field: {$geoWithin: {shape...}}}`.
    GeoWithin { field: FieldRef, shape: GeoShape },
    /// `{field: {$geoIntersects: {$geometry: geometry}}}`.
    GeoIntersects { field: FieldRef, geometry: Value },
    /// `{field: {$near|$nearSphere: {$geometry, $maxDistance?, $minDistance?}}}`.
    Near {
        field: FieldRef,
        geometry: Value,
        max_distance: Option<f64>,
        min_distance: Option<f64>,
        spherical: bool,
    },
    /// `{$text: {$search, $language?, $caseSensitive?, $diacriticSensitive?}}`.
    Text {
        search: String,
        options: TextOptions,
    },
    /// `{field.index: {$exists: exists}}`; backs the size comparisons.
    ArrayIndexExists {
        field: FieldRef,
        index: u64,
        exists: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Render this filter to a query document.
    pub fn render(
        &self,
        schema: &Schema,
        registry: &SchemaRegistry,
    ) -> Result<Document, RenderError> {
        match self {
            Filter::Empty => Ok(Document::new()),

            Filter::Eq { field, value } => {
                let field = field.render(schema)?;
                let value = field.serialize(value);
                Ok(doc_one(field.path, value))
            }

            Filter::Cmp { field, op, value } => {
                let field = field.render(schema)?;
                let value = if op.takes_field_value() {
                    field.serialize(value)
                } else {
                    value.clone()
                };
                Ok(doc_one(field.path, Value::Object(doc_one(op.name(), value))))
            }

            Filter::ArrayCmp { field, op, values } => {
                let field = field.render(schema)?;
                let item = field.item_schema()?;
                let items: Vec<Value> = values.iter().map(|v| serialize_with(&item, v)).collect();
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one(op.name(), Value::Array(items))),
                ))
            }

            Filter::ElemMatch { field, filter } => {
                let field = field.render(schema)?;
                let item = field.item_schema()?.unwrap_or(Schema::Dynamic);
                let inner = filter.render(&item, registry)?;
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one("$elemMatch", Value::Object(inner))),
                ))
            }

            Filter::GeoWithin { field, shape } => {
                let field = field.render(schema)?;
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one("$geoWithin", Value::Object(shape.render()))),
                ))
            }

            Filter::GeoIntersects { field, geometry } => {
                let field = field.render(schema)?;
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one(
                        "$geoIntersects",
                        Value::Object(doc_one("$geometry", geometry.clone())),
                    )),
                ))
            }

            Filter::Near {
                field,
                geometry,
                max_distance,
                min_distance,
                spherical,
            } => {
                let field = field.render(schema)?;
                let mut near = doc_one("$geometry", geometry.clone());
                if let Some(max) = max_distance {
                    near.insert("$maxDistance".to_string(), (*max).into());
                }
                if let Some(min) = min_distance {
                    near.insert("$minDistance".to_string(), (*min).into());
                }
                let op = if *spherical { "$nearSphere" } else { "$near" };
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one(op, Value::Object(near))),
                ))
            }

            Filter::Text { search, options } => {
                let mut text = doc_one("$search", Value::String(search.clone()));
                if let Some(language) = &options.language {
                    text.insert("$language".to_string(), Value::String(language.clone()));
                }
                if options.case_sensitive {
                    text.insert("$caseSensitive".to_string(), Value::Bool(true));
                }
                if options.diacritic_sensitive {
                    text.insert("$diacriticSensitive".to_string(), Value::Bool(true));
                }
                Ok(doc_one("$text", Value::Object(text)))
            }

            Filter::ArrayIndexExists {
                field,
                index,
                exists,
            } => {
                let field = field.render(schema)?;
                Ok(doc_one(
                    format!("{}.{}", field.path, index),
                    Value::Object(doc_one("$exists", Value::Bool(*exists))),
                ))
            }

            Filter::And(children) => {
                let mut doc = Document::new();
                for child in children {
                    let rendered = child.render(schema, registry)?;
                    for (key, value) in rendered {
                        add_clause(&mut doc, key, value);
                    }
                }
                Ok(doc)
            }

            Filter::Or(children) => {
                let mut clauses: Vec<Value> = Vec::with_capacity(children.len());
                for child in children {
                    let rendered = child.render(schema, registry)?;
                    // A child that rendered to exactly {$or: [...]} is
                    // spliced into the outer array instead of nesting.
                    if rendered.len() == 1 {
                        if let Some(Value::Array(inner)) = rendered.get("$or") {
                            clauses.extend(inner.iter().cloned());
                            continue;
                        }
                    }
                    clauses.push(Value::Object(rendered));
                }
                Ok(doc_one("$or", Value::Array(clauses)))
            }

            Filter::Not(inner) => {
                let rendered = inner.render(schema, registry)?;
                Ok(negate(rendered))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// And-clause merging
// ---------------------------------------------------------------------------

/// Add one top-level clause to an accumulating conjunction document.
fn add_clause(doc: &mut Document, key: String, value: Value) {
    if key == "$and" {
        // Flatten nested $and instead of nesting it.
        if let Value::Array(items) = value {
            for item in items {
                if let Value::Object(clauses) = item {
                    for (k, v) in clauses {
                        add_clause(doc, k, v);
                    }
                }
            }
            return;
        }
        doc.insert(key, value);
        return;
    }

    // Once the accumulator has been promoted to {$and: [...]}, new clauses
    // simply append to the array.
    if doc.len() == 1 && doc.keys().next().map(String::as_str) == Some("$and") {
        if let Some(Value::Array(clauses)) = doc.get_mut("$and") {
            clauses.push(Value::Object(doc_one(key, value)));
            return;
        }
    }

    if doc.contains_key(&key) {
        let mergeable = match (doc.get(&key), &value) {
            // Two operator documents merge only when their operators are
            // disjoint (e.g. $gt + $lt on the same field).
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                !incoming.keys().any(|op| existing.contains_key(op))
            }
            _ => false,
        };
        if mergeable {
            if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (doc.get_mut(&key), value)
            {
                for (op, v) in incoming {
                    existing.insert(op, v);
                }
            }
        } else {
            promote_to_and(doc, key, value);
        }
        return;
    }

    doc.insert(key, value);
}

/// Convert the accumulator into `{$and: [...]}`, one sub-document per
/// existing clause, appending the conflicting clause last.
fn promote_to_and(doc: &mut Document, key: String, value: Value) {
    let existing = std::mem::take(doc);
    let mut clauses: Vec<Value> = existing
        .into_iter()
        .map(|(k, v)| Value::Object(doc_one(k, v)))
        .collect();
    clauses.push(Value::Object(doc_one(key, value)));
    doc.insert("$and".to_string(), Value::Array(clauses));
}

// ---------------------------------------------------------------------------
// Negation
// ---------------------------------------------------------------------------

/// Negate a rendered filter document.
fn negate(rendered: Document) -> Document {
    if rendered.len() != 1 {
        return nor_wrap(rendered);
    }

    let (key, value) = rendered.into_iter().next().expect("one clause");

    if key.starts_with('$') {
        return match key.as_str() {
            "$or" => doc_one("$nor", value),
            "$nor" => doc_one("$or", value),
            // $not only works as a meta operator on a single field
            // operator, so any other top-level operator is simulated
            // through $nor.
            _ => nor_wrap(doc_one(key, value)),
        };
    }

    match value {
        Value::Object(selector) => {
            // A document value counts as operator-shaped only when its
            // first key is an operator (and not a DBRef).
            let operator_shaped = selector
                .keys()
                .next()
                .is_some_and(|k| k.starts_with('$') && k != "$ref");
            if !operator_shaped {
                return doc_one(
                    key,
                    Value::Object(doc_one("$ne", Value::Object(selector))),
                );
            }
            if selector.len() == 1 {
                let (op, op_value) = selector.into_iter().next().expect("one operator");
                negate_field_operator(key, op, op_value)
            } else {
                // A conjunction of operators on one field cannot be safely
                // negated with a single operator.
                nor_wrap(doc_one(key, Value::Object(selector)))
            }
        }
        scalar => doc_one(key, Value::Object(doc_one("$ne", scalar))),
    }
}

/// Negate a single `{field: {op: value}}` clause by rewriting the operator.
fn negate_field_operator(field: String, op: String, value: Value) -> Document {
    match op.as_str() {
        "$exists" => match value.as_bool() {
            Some(b) => doc_one(field, Value::Object(doc_one("$exists", Value::Bool(!b)))),
            None => doc_one(
                field,
                Value::Object(doc_one("$not", Value::Object(doc_one("$exists", value)))),
            ),
        },
        "$in" => doc_one(field, Value::Object(doc_one("$nin", value))),
        "$nin" => doc_one(field, Value::Object(doc_one("$in", value))),
        // Double negation cancels to the bare value.
        "$ne" | "$not" => doc_one(field, value),
        _ => doc_one(
            field,
            Value::Object(doc_one("$not", Value::Object(doc_one(op, value)))),
        ),
    }
}

fn nor_wrap(filter: Document) -> Document {
    doc_one("$nor", Value::Array(vec![Value::Object(filter)]))
}

pub(crate) fn doc_one(key: impl Into<String>, value: Value) -> Document {
    let mut doc = Document::new();
    doc.insert(key.into(), value);
    doc
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

impl Filter {
    /// The match-all filter.
    pub fn empty() -> Self {
        Filter::Empty
    }

    /// `field == value`
    pub fn eq(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Filter::Eq {
            field: field.into().validated()?,
            value: value.into(),
        })
    }

    /// `field != value`
    pub fn ne(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Ne, value.into())
    }

    /// `field > value`
    pub fn gt(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Gt, value.into())
    }

    /// `field >= value`
    pub fn gte(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Gte, value.into())
    }

    /// `field < value`
    pub fn lt(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Lt, value.into())
    }

    /// `field <= value`
    pub fn lte(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Lte, value.into())
    }

    /// Exact array size test.
    pub fn size(field: impl Into<FieldRef>, size: u64) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Size, size.into())
    }

    /// `field % divisor == remainder`
    pub fn modulo(
        field: impl Into<FieldRef>,
        divisor: i64,
        remainder: i64,
    ) -> Result<Self, BuildError> {
        Self::cmp(
            field,
            CmpOp::Mod,
            Value::Array(vec![divisor.into(), remainder.into()]),
        )
    }

    /// BSON type test (`$type`).
    pub fn has_type(field: impl Into<FieldRef>, type_name: &str) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Type, type_name.into())
    }

    /// Field existence test.
    pub fn exists(field: impl Into<FieldRef>, exists: bool) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Exists, exists.into())
    }

    /// Regular-expression match.
    pub fn regex(field: impl Into<FieldRef>, pattern: &str) -> Result<Self, BuildError> {
        Self::cmp(field, CmpOp::Regex, pattern.into())
    }

    fn cmp(field: impl Into<FieldRef>, op: CmpOp, value: Value) -> Result<Self, BuildError> {
        Ok(Filter::Cmp {
            field: field.into().validated()?,
            op,
            value,
        })
    }

    /// `$all`: the array field contains every given value.
    pub fn all(field: impl Into<FieldRef>, values: Vec<Value>) -> Result<Self, BuildError> {
        Self::array_cmp(field, ArrayOp::All, values)
    }

    /// `$in`: the field value is one of the given values.
    pub fn is_in(field: impl Into<FieldRef>, values: Vec<Value>) -> Result<Self, BuildError> {
        Self::array_cmp(field, ArrayOp::In, values)
    }

    /// `$nin`: the field value is none of the given values.
    pub fn not_in(field: impl Into<FieldRef>, values: Vec<Value>) -> Result<Self, BuildError> {
        Self::array_cmp(field, ArrayOp::Nin, values)
    }

    fn array_cmp(
        field: impl Into<FieldRef>,
        op: ArrayOp,
        values: Vec<Value>,
    ) -> Result<Self, BuildError> {
        Ok(Filter::ArrayCmp {
            field: field.into().validated()?,
            op,
            values,
        })
    }

    /// `$elemMatch`: some array element matches the inner filter.
    pub fn elem_match(field: impl Into<FieldRef>, filter: Filter) -> Result<Self, BuildError> {
        Ok(Filter::ElemMatch {
            field: field.into().validated()?,
            filter: Box::new(filter),
        })
    }

    /// Array size strictly greater than `size` (element at index `size`
    /// exists).
    pub fn size_gt(field: impl Into<FieldRef>, size: u64) -> Result<Self, BuildError> {
        Self::index_exists(field, size, true)
    }

    /// Array size at least `size` (element at index `size - 1` exists).
    pub fn size_gte(field: impl Into<FieldRef>, size: u64) -> Result<Self, BuildError> {
        let index = size
            .checked_sub(1)
            .ok_or(BuildError::SizeBoundOutOfRange { bound: size })?;
        Self::index_exists(field, index, true)
    }

    /// Array size strictly less than `size` (element at index `size - 1`
    /// does not exist).
    pub fn size_lt(field: impl Into<FieldRef>, size: u64) -> Result<Self, BuildError> {
        let index = size
            .checked_sub(1)
            .ok_or(BuildError::SizeBoundOutOfRange { bound: size })?;
        Self::index_exists(field, index, false)
    }

    /// Array size at most `size` (element at index `size` does not exist).
    pub fn size_lte(field: impl Into<FieldRef>, size: u64) -> Result<Self, BuildError> {
        Self::index_exists(field, size, false)
    }

    fn index_exists(
        field: impl Into<FieldRef>,
        index: u64,
        exists: bool,
    ) -> Result<Self, BuildError> {
        Ok(Filter::ArrayIndexExists {
            field: field.into().validated()?,
            index,
            exists,
        })
    }

    /// `$geoWithin` a rectangle.
    pub fn geo_within_box(
        field: impl Into<FieldRef>,
        bottom_left: [f64; 2],
        top_right: [f64; 2],
    ) -> Result<Self, BuildError> {
        Ok(Filter::GeoWithin {
            field: field.into().validated()?,
            shape: GeoShape::Box {
                bottom_left,
                top_right,
            },
        })
    }

    /// `$geoWithin` a flat circle.
    pub fn geo_within_center(
        field: impl Into<FieldRef>,
        center: [f64; 2],
        radius: f64,
    ) -> Result<Self, BuildError> {
        Ok(Filter::GeoWithin {
            field: field.into().validated()?,
            shape: GeoShape::Center { center, radius },
        })
    }

    /// `$geoWithin` a spherical circle.
    pub fn geo_within_center_sphere(
        field: impl Into<FieldRef>,
        center: [f64; 2],
        radius: f64,
    ) -> Result<Self, BuildError> {
        Ok(Filter::GeoWithin {
            field: field.into().validated()?,
            shape: GeoShape::CenterSphere { center, radius },
        })
    }

    /// `$geoWithin` a polygon.
    pub fn geo_within_polygon(
        field: impl Into<FieldRef>,
        vertices: Vec<[f64; 2]>,
    ) -> Result<Self, BuildError> {
        if vertices.len() < 3 {
            return Err(BuildError::DegeneratePolygon {
                got: vertices.len(),
            });
        }
        Ok(Filter::GeoWithin {
            field: field.into().validated()?,
            shape: GeoShape::Polygon { vertices },
        })
    }

    /// `$geoIntersects` a GeoJSON geometry.
    pub fn geo_intersects(
        field: impl Into<FieldRef>,
        geometry: Value,
    ) -> Result<Self, BuildError> {
        Ok(Filter::GeoIntersects {
            field: field.into().validated()?,
            geometry,
        })
    }

    /// `$near` a GeoJSON geometry, with optional distance bounds in meters.
    pub fn near(
        field: impl Into<FieldRef>,
        geometry: Value,
        max_distance: Option<f64>,
        min_distance: Option<f64>,
    ) -> Result<Self, BuildError> {
        Ok(Filter::Near {
            field: field.into().validated()?,
            geometry,
            max_distance,
            min_distance,
            spherical: false,
        })
    }

    /// `$nearSphere` a GeoJSON geometry, with optional distance bounds.
    pub fn near_sphere(
        field: impl Into<FieldRef>,
        geometry: Value,
        max_distance: Option<f64>,
        min_distance: Option<f64>,
    ) -> Result<Self, BuildError> {
        Ok(Filter::Near {
            field: field.into().validated()?,
            geometry,
            max_distance,
            min_distance,
            spherical: true,
        })
    }

    /// `$text` full-text search. Top-level only; carries no field.
    pub fn text(search: &str, options: TextOptions) -> Result<Self, BuildError> {
        if search.is_empty() {
            return Err(BuildError::EmptySearchText);
        }
        Ok(Filter::Text {
            search: search.to_string(),
            options,
        })
    }

    /// Conjunction. Direct `And` children are flattened into this node.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut children = Vec::new();
        for filter in filters {
            match filter {
                Filter::And(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        Filter::And(children)
    }

    /// Disjunction. Direct `Or` children are flattened into this node.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut children = Vec::new();
        for filter in filters {
            match filter {
                Filter::Or(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        Filter::Or(children)
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }
}
