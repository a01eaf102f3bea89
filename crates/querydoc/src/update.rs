//! Update expressions and their canonical document rendering.
//!
//! An [`Update`] describes one mutation (or a combination of mutations) and
//! renders to the `{$op: {field: argument}}` document form. Combining updates
//! merges them at the operator level, so `set("a", 1)` and `set("b", 2)`
//! render as a single `$set` document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::map::Entry;

use crate::Document;
use crate::error::{BuildError, RenderError};
use crate::field::{FieldRef, serialize_with};
use crate::filter::{Filter, doc_one};
use crate::schema::{Schema, SchemaRegistry};

/// Bitwise update operators (`$bit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

impl BitOp {
    const fn name(self) -> &'static str {
        match self {
            BitOp::And => "and",
            BitOp::Or => "or",
            BitOp::Xor => "xor",
        }
    }
}

/// Value type hint for `$currentDate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentDateType {
    Date,
    Timestamp,
}

impl CurrentDateType {
    const fn name(self) -> &'static str {
        match self {
            CurrentDateType::Date => "date",
            CurrentDateType::Timestamp => "timestamp",
        }
    }
}

/// What `$pull` removes: a list of values, or every element matching a
/// filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PullCriteria {
    /// `{$pull: {field: value}}` for exactly one value,
    /// `{$pullAll: {field: [v1, v2, ...]}}` otherwise. The operator name is
    /// driven by cardinality.
    Values(Vec<Value>),
    /// `{$pull: {field: filter}}`; the filter renders against the array's
    /// item schema.
    Matching(Box<Filter>),
}

/// Modifiers for `$push` with `$each`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushModifiers {
    /// `$slice`: trim the array after the push. Negative keeps the tail.
    pub slice: Option<i64>,
    /// `$position`: insert at an index instead of appending.
    pub position: Option<i64>,
    /// `$sort`: sort the array after the push. `1`/`-1` for whole-element
    /// sorts, a document for field sorts.
    pub sort: Option<Value>,
}

impl PushModifiers {
    fn is_empty(&self) -> bool {
        self.slice.is_none() && self.position.is_none() && self.sort.is_none()
    }
}

/// An update expression that renders to a canonical update document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Update {
    /// `{$set: {field: value}}`
    Set { field: FieldRef, value: Value },
    /// `{$setOnInsert: {field: value}}`
    SetOnInsert { field: FieldRef, value: Value },
    /// `{$unset: {field: 1}}`
    Unset { field: FieldRef },
    /// `{$inc: {field: amount}}`
    Inc { field: FieldRef, amount: Value },
    /// `{$mul: {field: factor}}`
    Mul { field: FieldRef, factor: Value },
    /// `{$min: {field: value}}`
    Min { field: FieldRef, value: Value },
    /// `{$max: {field: value}}`
    Max { field: FieldRef, value: Value },
    /// `{$rename: {field: "new.name"}}`; the target is a literal wire path
    /// and is never resolved.
    Rename { field: FieldRef, new_name: String },
    /// `{$currentDate: {field: true}}` or `{$currentDate: {field: {$type: ...}}}`.
    CurrentDate {
        field: FieldRef,
        date_type: Option<CurrentDateType>,
    },
    /// `{$bit: {field: {and|or|xor: value}}}`
    Bit {
        field: FieldRef,
        op: BitOp,
        value: i64,
    },
    /// `{$addToSet: {field: value}}` for exactly one value,
    /// `{$addToSet: {field: {$each: [...]}}}` otherwise.
    AddToSet { field: FieldRef, values: Vec<Value> },
    /// `{$pop: {field: -1|1}}`
    Pop { field: FieldRef, first: bool },
    /// `$pull` / `$pullAll`, depending on the criteria.
    Pull {
        field: FieldRef,
        criteria: PullCriteria,
    },
    /// `{$push: {field: value}}` or `{$push: {field: {$each: [...], ...}}}`.
    Push {
        field: FieldRef,
        values: Vec<Value>,
        modifiers: PushModifiers,
    },
    /// Operator-level merge of several updates.
    Combine(Vec<Update>),
}

impl Update {
    /// Render this update to an update document.
    pub fn render(
        &self,
        schema: &Schema,
        registry: &SchemaRegistry,
    ) -> Result<Document, RenderError> {
        match self {
            Update::Set { field, value } => field_op("$set", field, value, schema),
            Update::SetOnInsert { field, value } => field_op("$setOnInsert", field, value, schema),

            Update::Unset { field } => {
                let field = field.render(schema)?;
                Ok(doc_one("$unset", Value::Object(doc_one(field.path, 1.into()))))
            }

            Update::Inc { field, amount } => field_op("$inc", field, amount, schema),
            Update::Mul { field, factor } => field_op("$mul", field, factor, schema),
            Update::Min { field, value } => field_op("$min", field, value, schema),
            Update::Max { field, value } => field_op("$max", field, value, schema),

            Update::Rename { field, new_name } => {
                let field = field.render(schema)?;
                Ok(doc_one(
                    "$rename",
                    Value::Object(doc_one(field.path, Value::String(new_name.clone()))),
                ))
            }

            Update::CurrentDate { field, date_type } => {
                let field = field.render(schema)?;
                let argument = match date_type {
                    None => Value::Bool(true),
                    Some(t) => Value::Object(doc_one("$type", Value::String(t.name().to_string()))),
                };
                Ok(doc_one(
                    "$currentDate",
                    Value::Object(doc_one(field.path, argument)),
                ))
            }

            Update::Bit { field, op, value } => {
                let field = field.render(schema)?;
                Ok(doc_one(
                    "$bit",
                    Value::Object(doc_one(
                        field.path,
                        Value::Object(doc_one(op.name(), (*value).into())),
                    )),
                ))
            }

            Update::AddToSet { field, values } => {
                let field = field.render(schema)?;
                let item = field.item_schema()?;
                let argument = if let [value] = values.as_slice() {
                    serialize_with(&item, value)
                } else {
                    let items: Vec<Value> =
                        values.iter().map(|v| serialize_with(&item, v)).collect();
                    Value::Object(doc_one("$each", Value::Array(items)))
                };
                Ok(doc_one(
                    "$addToSet",
                    Value::Object(doc_one(field.path, argument)),
                ))
            }

            Update::Pop { field, first } => {
                let field = field.render(schema)?;
                let direction = if *first { -1 } else { 1 };
                Ok(doc_one(
                    "$pop",
                    Value::Object(doc_one(field.path, direction.into())),
                ))
            }

            Update::Pull { field, criteria } => {
                let field = field.render(schema)?;
                let item = field.item_schema()?;
                match criteria {
                    PullCriteria::Values(values) => {
                        // One value pulls it directly; any other count
                        // switches to $pullAll.
                        if let [value] = values.as_slice() {
                            return Ok(doc_one(
                                "$pull",
                                Value::Object(doc_one(field.path, serialize_with(&item, value))),
                            ));
                        }
                        let items: Vec<Value> =
                            values.iter().map(|v| serialize_with(&item, v)).collect();
                        Ok(doc_one(
                            "$pullAll",
                            Value::Object(doc_one(field.path, Value::Array(items))),
                        ))
                    }
                    PullCriteria::Matching(filter) => {
                        let item = item.unwrap_or(Schema::Dynamic);
                        let condition = filter.render(&item, registry)?;
                        Ok(doc_one(
                            "$pull",
                            Value::Object(doc_one(field.path, Value::Object(condition))),
                        ))
                    }
                }
            }

            Update::Push {
                field,
                values,
                modifiers,
            } => {
                let field = field.render(schema)?;
                let item = field.item_schema()?;
                let argument = if modifiers.is_empty() && values.len() == 1 {
                    serialize_with(&item, &values[0])
                } else {
                    let items: Vec<Value> =
                        values.iter().map(|v| serialize_with(&item, v)).collect();
                    let mut each = doc_one("$each", Value::Array(items));
                    if let Some(slice) = modifiers.slice {
                        each.insert("$slice".to_string(), slice.into());
                    }
                    if let Some(position) = modifiers.position {
                        each.insert("$position".to_string(), position.into());
                    }
                    if let Some(sort) = &modifiers.sort {
                        each.insert("$sort".to_string(), sort.clone());
                    }
                    Value::Object(each)
                };
                Ok(doc_one("$push", Value::Object(doc_one(field.path, argument))))
            }

            Update::Combine(updates) => {
                let mut doc = Document::new();
                for update in updates {
                    let rendered = update.render(schema, registry)?;
                    for (op, argument) in rendered {
                        merge_operator(&mut doc, op, argument);
                    }
                }
                Ok(doc)
            }
        }
    }
}

/// Render one `{$op: {field: serialized value}}` clause.
fn field_op(
    op: &str,
    field: &FieldRef,
    value: &Value,
    schema: &Schema,
) -> Result<Document, RenderError> {
    let field = field.render(schema)?;
    let value = field.serialize(value);
    Ok(doc_one(op, Value::Object(doc_one(field.path, value))))
}

/// Merge one operator document into the combined accumulator. Field entries
/// under the same operator merge with last-wins semantics.
fn merge_operator(doc: &mut Document, op: String, argument: Value) {
    match doc.entry(op) {
        Entry::Vacant(slot) => {
            slot.insert(argument);
        }
        Entry::Occupied(mut slot) => match (slot.get_mut(), argument) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (field, value) in incoming {
                    existing.insert(field, value);
                }
            }
            (slot, argument) => *slot = argument,
        },
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

impl Update {
    /// `$set`
    pub fn set(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Set {
            field: field.into().validated()?,
            value: value.into(),
        })
    }

    /// `$setOnInsert`
    pub fn set_on_insert(
        field: impl Into<FieldRef>,
        value: impl Into<Value>,
    ) -> Result<Self, BuildError> {
        Ok(Update::SetOnInsert {
            field: field.into().validated()?,
            value: value.into(),
        })
    }

    /// `$unset`
    pub fn unset(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Update::Unset {
            field: field.into().validated()?,
        })
    }

    /// `$inc`
    pub fn inc(field: impl Into<FieldRef>, amount: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Inc {
            field: field.into().validated()?,
            amount: amount.into(),
        })
    }

    /// `$mul`
    pub fn mul(field: impl Into<FieldRef>, factor: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Mul {
            field: field.into().validated()?,
            factor: factor.into(),
        })
    }

    /// `$min`
    pub fn min(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Min {
            field: field.into().validated()?,
            value: value.into(),
        })
    }

    /// `$max`
    pub fn max(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Max {
            field: field.into().validated()?,
            value: value.into(),
        })
    }

    /// `$rename`; `new_name` is used verbatim as the target wire path.
    pub fn rename(field: impl Into<FieldRef>, new_name: &str) -> Result<Self, BuildError> {
        if new_name.is_empty() {
            return Err(BuildError::EmptyRenameTarget);
        }
        Ok(Update::Rename {
            field: field.into().validated()?,
            new_name: new_name.to_string(),
        })
    }

    /// `$currentDate` with the server's default type.
    pub fn current_date(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Update::CurrentDate {
            field: field.into().validated()?,
            date_type: None,
        })
    }

    /// `$currentDate` with an explicit type hint.
    pub fn current_date_of(
        field: impl Into<FieldRef>,
        date_type: CurrentDateType,
    ) -> Result<Self, BuildError> {
        Ok(Update::CurrentDate {
            field: field.into().validated()?,
            date_type: Some(date_type),
        })
    }

    /// `$bit` with `and`.
    pub fn bit_and(field: impl Into<FieldRef>, value: i64) -> Result<Self, BuildError> {
        Self::bit(field, BitOp::And, value)
    }

    /// `$bit` with `or`.
    pub fn bit_or(field: impl Into<FieldRef>, value: i64) -> Result<Self, BuildError> {
        Self::bit(field, BitOp::Or, value)
    }

    /// `$bit` with `xor`.
    pub fn bit_xor(field: impl Into<FieldRef>, value: i64) -> Result<Self, BuildError> {
        Self::bit(field, BitOp::Xor, value)
    }

    fn bit(field: impl Into<FieldRef>, op: BitOp, value: i64) -> Result<Self, BuildError> {
        Ok(Update::Bit {
            field: field.into().validated()?,
            op,
            value,
        })
    }

    /// `$addToSet` with a single value.
    pub fn add_to_set(
        field: impl Into<FieldRef>,
        value: impl Into<Value>,
    ) -> Result<Self, BuildError> {
        Ok(Update::AddToSet {
            field: field.into().validated()?,
            values: vec![value.into()],
        })
    }

    /// `$addToSet` with a list of values; a single-element list renders the
    /// bare value, anything else renders `$each`.
    pub fn add_to_set_each(
        field: impl Into<FieldRef>,
        values: Vec<Value>,
    ) -> Result<Self, BuildError> {
        Ok(Update::AddToSet {
            field: field.into().validated()?,
            values,
        })
    }

    /// `$pop` the first element.
    pub fn pop_first(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Update::Pop {
            field: field.into().validated()?,
            first: true,
        })
    }

    /// `$pop` the last element.
    pub fn pop_last(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Update::Pop {
            field: field.into().validated()?,
            first: false,
        })
    }

    /// `$pull` one value.
    pub fn pull(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Pull {
            field: field.into().validated()?,
            criteria: PullCriteria::Values(vec![value.into()]),
        })
    }

    /// Remove every occurrence of each value. Renders `$pull` for a
    /// single-element list and `$pullAll` otherwise.
    pub fn pull_all(field: impl Into<FieldRef>, values: Vec<Value>) -> Result<Self, BuildError> {
        Ok(Update::Pull {
            field: field.into().validated()?,
            criteria: PullCriteria::Values(values),
        })
    }

    /// `$pull` every element matching a filter.
    pub fn pull_filter(field: impl Into<FieldRef>, filter: Filter) -> Result<Self, BuildError> {
        Ok(Update::Pull {
            field: field.into().validated()?,
            criteria: PullCriteria::Matching(Box::new(filter)),
        })
    }

    /// `$push` one value.
    pub fn push(field: impl Into<FieldRef>, value: impl Into<Value>) -> Result<Self, BuildError> {
        Ok(Update::Push {
            field: field.into().validated()?,
            values: vec![value.into()],
            modifiers: PushModifiers::default(),
        })
    }

    /// `$push` with `$each` and optional modifiers.
    pub fn push_each(
        field: impl Into<FieldRef>,
        values: Vec<Value>,
        modifiers: PushModifiers,
    ) -> Result<Self, BuildError> {
        Ok(Update::Push {
            field: field.into().validated()?,
            values,
            modifiers,
        })
    }

    /// Combine several updates into one document. Direct `Combine` children
    /// are flattened into this node.
    pub fn combine(updates: impl IntoIterator<Item = Update>) -> Self {
        let mut children = Vec::new();
        for update in updates {
            match update {
                Update::Combine(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        Update::Combine(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::document()
            .renamed("Name", "name", Schema::Scalar)
            .renamed("Tags", "tags", Schema::array(Schema::Scalar))
            .renamed(
                "Addresses",
                "addrs",
                Schema::array(
                    Schema::document()
                        .renamed("City", "city", Schema::Scalar)
                        .build(),
                ),
            )
            .build()
    }

    fn render(update: &Update) -> Value {
        let registry = SchemaRegistry::new();
        Value::Object(update.render(&schema(), &registry).unwrap())
    }

    // -----------------------------------------------------------------------
    // Field operators
    // -----------------------------------------------------------------------

    #[test]
    fn test_set_resolves_wire_name() {
        let u = Update::set("Name", "Bob").unwrap();
        assert_eq!(render(&u), json!({"$set": {"name": "Bob"}}));
    }

    #[test]
    fn test_set_on_insert() {
        let u = Update::set_on_insert("created", 1).unwrap();
        assert_eq!(render(&u), json!({"$setOnInsert": {"created": 1}}));
    }

    #[test]
    fn test_unset_renders_one() {
        let u = Update::unset("Name").unwrap();
        assert_eq!(render(&u), json!({"$unset": {"name": 1}}));
    }

    #[test]
    fn test_numeric_operators() {
        assert_eq!(
            render(&Update::inc("count", 2).unwrap()),
            json!({"$inc": {"count": 2}})
        );
        assert_eq!(
            render(&Update::mul("count", 3).unwrap()),
            json!({"$mul": {"count": 3}})
        );
        assert_eq!(
            render(&Update::min("low", 1).unwrap()),
            json!({"$min": {"low": 1}})
        );
        assert_eq!(
            render(&Update::max("high", 9).unwrap()),
            json!({"$max": {"high": 9}})
        );
    }

    #[test]
    fn test_rename_target_is_literal() {
        let u = Update::rename("Name", "FullName").unwrap();
        // The source resolves; the target never does.
        assert_eq!(render(&u), json!({"$rename": {"name": "FullName"}}));
    }

    #[test]
    fn test_rename_rejects_empty_target() {
        assert_eq!(
            Update::rename("Name", "").unwrap_err(),
            BuildError::EmptyRenameTarget
        );
    }

    #[test]
    fn test_current_date_default() {
        let u = Update::current_date("ts").unwrap();
        assert_eq!(render(&u), json!({"$currentDate": {"ts": true}}));
    }

    #[test]
    fn test_current_date_with_type() {
        let u = Update::current_date_of("ts", CurrentDateType::Timestamp).unwrap();
        assert_eq!(
            render(&u),
            json!({"$currentDate": {"ts": {"$type": "timestamp"}}})
        );
        let u = Update::current_date_of("ts", CurrentDateType::Date).unwrap();
        assert_eq!(render(&u), json!({"$currentDate": {"ts": {"$type": "date"}}}));
    }

    #[test]
    fn test_bit_operators() {
        assert_eq!(
            render(&Update::bit_and("flags", 0b1010).unwrap()),
            json!({"$bit": {"flags": {"and": 10}}})
        );
        assert_eq!(
            render(&Update::bit_or("flags", 1).unwrap()),
            json!({"$bit": {"flags": {"or": 1}}})
        );
        assert_eq!(
            render(&Update::bit_xor("flags", 7).unwrap()),
            json!({"$bit": {"flags": {"xor": 7}}})
        );
    }

    // -----------------------------------------------------------------------
    // Array operators
    // -----------------------------------------------------------------------

    #[test]
    fn test_add_to_set_single() {
        let u = Update::add_to_set("Tags", "new").unwrap();
        assert_eq!(render(&u), json!({"$addToSet": {"tags": "new"}}));
    }

    #[test]
    fn test_add_to_set_each_single_value_is_bare() {
        // The single-vs-$each boundary is count-based, whichever constructor
        // built the node.
        let u = Update::add_to_set_each("Tags", vec![json!("a")]).unwrap();
        assert_eq!(render(&u), json!({"$addToSet": {"tags": "a"}}));
    }

    #[test]
    fn test_add_to_set_each_many_values_render_each() {
        let u = Update::add_to_set_each("Tags", vec![json!("a"), json!("b")]).unwrap();
        assert_eq!(
            render(&u),
            json!({"$addToSet": {"tags": {"$each": ["a", "b"]}}})
        );
    }

    #[test]
    fn test_add_to_set_on_scalar_field_errors() {
        let u = Update::add_to_set("Name", "x").unwrap();
        let registry = SchemaRegistry::new();
        assert!(matches!(
            u.render(&schema(), &registry).unwrap_err(),
            RenderError::NotAnArrayField { .. }
        ));
    }

    #[test]
    fn test_pop() {
        assert_eq!(
            render(&Update::pop_first("Tags").unwrap()),
            json!({"$pop": {"tags": -1}})
        );
        assert_eq!(
            render(&Update::pop_last("Tags").unwrap()),
            json!({"$pop": {"tags": 1}})
        );
    }

    #[test]
    fn test_pull_value() {
        let u = Update::pull("Tags", "old").unwrap();
        assert_eq!(render(&u), json!({"$pull": {"tags": "old"}}));
    }

    #[test]
    fn test_pull_all() {
        let u = Update::pull_all("Tags", vec![json!("a"), json!("b")]).unwrap();
        assert_eq!(render(&u), json!({"$pullAll": {"tags": ["a", "b"]}}));
    }

    #[test]
    fn test_pull_all_single_value_renders_pull() {
        // The operator name itself is cardinality-driven.
        let u = Update::pull_all("Tags", vec![json!("old")]).unwrap();
        assert_eq!(render(&u), json!({"$pull": {"tags": "old"}}));
    }

    #[test]
    fn test_pull_filter_renders_against_item_schema() {
        let u = Update::pull_filter("Addresses", Filter::eq("City", "Portland").unwrap()).unwrap();
        assert_eq!(
            render(&u),
            json!({"$pull": {"addrs": {"city": "Portland"}}})
        );
    }

    #[test]
    fn test_push_single_is_bare() {
        let u = Update::push("Tags", "new").unwrap();
        assert_eq!(render(&u), json!({"$push": {"tags": "new"}}));
    }

    #[test]
    fn test_push_many_uses_each() {
        let u = Update::push_each(
            "Tags",
            vec![json!("a"), json!("b")],
            PushModifiers::default(),
        )
        .unwrap();
        assert_eq!(render(&u), json!({"$push": {"tags": {"$each": ["a", "b"]}}}));
    }

    #[test]
    fn test_push_single_with_modifier_uses_each() {
        let u = Update::push_each(
            "Tags",
            vec![json!("a")],
            PushModifiers {
                slice: Some(-5),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            render(&u),
            json!({"$push": {"tags": {"$each": ["a"], "$slice": -5}}})
        );
    }

    #[test]
    fn test_push_modifier_order() {
        let u = Update::push_each(
            "Tags",
            vec![json!("a")],
            PushModifiers {
                slice: Some(3),
                position: Some(0),
                sort: Some(json!(-1)),
            },
        )
        .unwrap();
        let rendered = render(&u);
        assert_eq!(
            rendered,
            json!({"$push": {"tags": {
                "$each": ["a"],
                "$slice": 3,
                "$position": 0,
                "$sort": -1
            }}})
        );
        // Modifier keys keep their canonical order.
        let keys: Vec<&String> = rendered["$push"]["tags"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(keys, ["$each", "$slice", "$position", "$sort"]);
    }

    #[test]
    fn test_push_serializes_items_with_item_schema() {
        let u = Update::push("Addresses", json!({"City": "Portland"})).unwrap();
        assert_eq!(
            render(&u),
            json!({"$push": {"addrs": {"city": "Portland"}}})
        );
    }

    // -----------------------------------------------------------------------
    // Combine
    // -----------------------------------------------------------------------

    #[test]
    fn test_combine_merges_same_operator() {
        let u = Update::combine(vec![
            Update::set("a", 1).unwrap(),
            Update::set("b", 2).unwrap(),
        ]);
        assert_eq!(render(&u), json!({"$set": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_combine_keeps_distinct_operators() {
        let u = Update::combine(vec![
            Update::set("a", 1).unwrap(),
            Update::inc("b", 2).unwrap(),
        ]);
        assert_eq!(render(&u), json!({"$set": {"a": 1}, "$inc": {"b": 2}}));
    }

    #[test]
    fn test_combine_last_wins_on_same_field() {
        let u = Update::combine(vec![
            Update::set("a", 1).unwrap(),
            Update::set("a", 2).unwrap(),
        ]);
        assert_eq!(render(&u), json!({"$set": {"a": 2}}));
    }

    #[test]
    fn test_combine_flattens_nested_combine() {
        let u = Update::combine(vec![
            Update::combine(vec![
                Update::set("a", 1).unwrap(),
                Update::inc("b", 1).unwrap(),
            ]),
            Update::set("c", 3).unwrap(),
        ]);
        match &u {
            Update::Combine(children) => assert_eq!(children.len(), 3),
            _ => unreachable!(),
        }
        assert_eq!(
            render(&u),
            json!({"$set": {"a": 1, "c": 3}, "$inc": {"b": 1}})
        );
    }

    #[test]
    fn test_hand_built_nested_combine_still_merges() {
        let inner = Update::Combine(vec![Update::set("a", 1).unwrap()]);
        let u = Update::Combine(vec![inner, Update::set("b", 2).unwrap()]);
        assert_eq!(render(&u), json!({"$set": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_empty_combine_renders_empty() {
        assert_eq!(render(&Update::combine(vec![])), json!({}));
    }

    // -----------------------------------------------------------------------
    // Wire transport
    // -----------------------------------------------------------------------

    #[test]
    fn test_update_serde_roundtrip_json() {
        let u = Update::combine(vec![
            Update::set("Name", "Bob").unwrap(),
            Update::push_each(
                "Tags",
                vec![json!("a")],
                PushModifiers {
                    slice: Some(10),
                    ..Default::default()
                },
            )
            .unwrap(),
        ]);
        let encoded = serde_json::to_string(&u).unwrap();
        let decoded: Update = serde_json::from_str(&encoded).unwrap();
        assert_eq!(u, decoded);
    }

    #[test]
    fn test_update_serde_roundtrip_msgpack() {
        let u = Update::pull_filter("Addresses", Filter::eq("City", "X").unwrap()).unwrap();
        let bytes = rmp_serde::to_vec(&u).unwrap();
        let decoded: Update = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(u, decoded);
    }
}
