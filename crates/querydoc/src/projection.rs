//! Projection expressions and their canonical document rendering.
//!
//! Projections are the one expression family whose rendering depends on the
//! pipeline position: `$slice` takes the `{field: {$slice: n}}` form in a
//! find projection and the `{field: {$slice: ["$field", n]}}` expression form
//! in an aggregation stage. [`ProjectionContext`] carries that switch along
//! with the schema and registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Document;
use crate::error::{BuildError, RenderError};
use crate::field::FieldRef;
use crate::filter::{Filter, doc_one};
use crate::schema::{DocumentType, Schema, SchemaRegistry};

/// Rendering context for projections.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionContext<'a> {
    pub schema: &'a Schema,
    pub registry: &'a SchemaRegistry,
    /// Whether this projection feeds a find operation (as opposed to an
    /// aggregation `$project` stage).
    pub for_find: bool,
}

impl<'a> ProjectionContext<'a> {
    /// Context for a find projection.
    pub fn find(schema: &'a Schema, registry: &'a SchemaRegistry) -> Self {
        Self {
            schema,
            registry,
            for_find: true,
        }
    }

    /// Context for an aggregation `$project` stage.
    pub fn aggregation(schema: &'a Schema, registry: &'a SchemaRegistry) -> Self {
        Self {
            schema,
            registry,
            for_find: false,
        }
    }
}

/// Keywords accepted by `$meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaKeyword {
    TextScore,
    SearchScore,
    SearchScoreDetails,
    SearchHighlights,
}

impl MetaKeyword {
    const fn name(self) -> &'static str {
        match self {
            MetaKeyword::TextScore => "textScore",
            MetaKeyword::SearchScore => "searchScore",
            MetaKeyword::SearchScoreDetails => "searchScoreDetails",
            MetaKeyword::SearchHighlights => "searchHighlights",
        }
    }
}

/// A projection expression that renders to a projection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// `{field: 1}`
    Include(FieldRef),
    /// `{field: 0}`
    Exclude(FieldRef),
    /// `{field.$: 1}`: project the first array element matched by the query.
    FirstMatching(FieldRef),
    /// `{field: {$elemMatch: filter}}`. The inner filter renders against the
    /// array's item schema; when the field resolves to no schema,
    /// `item_type` names a registry entry to use instead.
    ElemMatch {
        field: FieldRef,
        filter: Box<Filter>,
        item_type: Option<String>,
    },
    /// `$slice`, in the find or aggregation form depending on context.
    Slice {
        field: FieldRef,
        skip: Option<i64>,
        limit: i64,
    },
    /// `{field: {$meta: keyword}}`
    Meta {
        field: FieldRef,
        keyword: MetaKeyword,
    },
    /// Later projections override earlier ones field by field.
    Combine(Vec<Projection>),
}

impl Projection {
    /// Render this projection to a projection document.
    pub fn render(&self, ctx: &ProjectionContext<'_>) -> Result<Document, RenderError> {
        match self {
            Projection::Include(field) => {
                let field = field.render(ctx.schema)?;
                Ok(doc_one(field.path, 1.into()))
            }

            Projection::Exclude(field) => {
                let field = field.render(ctx.schema)?;
                Ok(doc_one(field.path, 0.into()))
            }

            Projection::FirstMatching(field) => {
                let field = field.render(ctx.schema)?;
                Ok(doc_one(format!("{}.$", field.path), 1.into()))
            }

            Projection::ElemMatch {
                field,
                filter,
                item_type,
            } => {
                let field = field.render(ctx.schema)?;
                let item = match field.item_schema()? {
                    Some(item) => item,
                    None => item_type
                        .as_deref()
                        .and_then(|name| ctx.registry.get(name))
                        .cloned()
                        .unwrap_or(Schema::Dynamic),
                };
                let inner = filter.render(&item, ctx.registry)?;
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one("$elemMatch", Value::Object(inner))),
                ))
            }

            Projection::Slice { field, skip, limit } => {
                let field = field.render(ctx.schema)?;
                let argument = if ctx.for_find {
                    match skip {
                        Some(skip) => Value::Array(vec![(*skip).into(), (*limit).into()]),
                        None => (*limit).into(),
                    }
                } else {
                    // Aggregation $slice is an expression over the field
                    // path.
                    let expr = Value::String(format!("${}", field.path));
                    match skip {
                        Some(skip) => {
                            Value::Array(vec![expr, (*skip).into(), (*limit).into()])
                        }
                        None => Value::Array(vec![expr, (*limit).into()]),
                    }
                };
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one("$slice", argument)),
                ))
            }

            Projection::Meta { field, keyword } => {
                let field = field.render(ctx.schema)?;
                Ok(doc_one(
                    field.path,
                    Value::Object(doc_one("$meta", Value::String(keyword.name().to_string()))),
                ))
            }

            Projection::Combine(projections) => {
                let mut doc = Document::new();
                for projection in projections {
                    let rendered = projection.render(ctx)?;
                    for (key, value) in rendered {
                        // Last wins, and the winning clause moves to the
                        // position of its final mention.
                        doc.shift_remove(&key);
                        doc.insert(key, value);
                    }
                }
                Ok(doc)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

impl Projection {
    /// Include a field.
    pub fn include(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Projection::Include(field.into().validated()?))
    }

    /// Exclude a field.
    pub fn exclude(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Projection::Exclude(field.into().validated()?))
    }

    /// Project the first array element matched by the query filter
    /// (`field.$`).
    pub fn first_matching(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Ok(Projection::FirstMatching(field.into().validated()?))
    }

    /// `$elemMatch`: project the first array element matching the filter.
    pub fn elem_match(field: impl Into<FieldRef>, filter: Filter) -> Result<Self, BuildError> {
        Ok(Projection::ElemMatch {
            field: field.into().validated()?,
            filter: Box::new(filter),
            item_type: None,
        })
    }

    /// `$elemMatch` with a declared item type, used to look up the item
    /// schema in the registry when the field itself resolves to none.
    pub fn elem_match_of<T: DocumentType>(
        field: impl Into<FieldRef>,
        filter: Filter,
    ) -> Result<Self, BuildError> {
        Ok(Projection::ElemMatch {
            field: field.into().validated()?,
            filter: Box::new(filter),
            item_type: Some(T::NAME.to_string()),
        })
    }

    /// `$slice`: the first `limit` elements (or the last, when negative).
    pub fn slice(field: impl Into<FieldRef>, limit: i64) -> Result<Self, BuildError> {
        Ok(Projection::Slice {
            field: field.into().validated()?,
            skip: None,
            limit,
        })
    }

    /// `$slice` with a skip.
    pub fn slice_skip(
        field: impl Into<FieldRef>,
        skip: i64,
        limit: i64,
    ) -> Result<Self, BuildError> {
        Ok(Projection::Slice {
            field: field.into().validated()?,
            skip: Some(skip),
            limit,
        })
    }

    /// `$meta` projection.
    pub fn meta(field: impl Into<FieldRef>, keyword: MetaKeyword) -> Result<Self, BuildError> {
        Ok(Projection::Meta {
            field: field.into().validated()?,
            keyword,
        })
    }

    /// `{field: {$meta: "textScore"}}`
    pub fn meta_text_score(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Self::meta(field, MetaKeyword::TextScore)
    }

    /// `{field: {$meta: "searchScore"}}`
    pub fn meta_search_score(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Self::meta(field, MetaKeyword::SearchScore)
    }

    /// `{field: {$meta: "searchScoreDetails"}}`
    pub fn meta_search_score_details(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Self::meta(field, MetaKeyword::SearchScoreDetails)
    }

    /// `{field: {$meta: "searchHighlights"}}`
    pub fn meta_search_highlights(field: impl Into<FieldRef>) -> Result<Self, BuildError> {
        Self::meta(field, MetaKeyword::SearchHighlights)
    }

    /// Combine several projections. Direct `Combine` children are flattened
    /// into this node.
    pub fn combine(projections: impl IntoIterator<Item = Projection>) -> Self {
        let mut children = Vec::new();
        for projection in projections {
            match projection {
                Projection::Combine(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        Projection::Combine(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Address;
    impl DocumentType for Address {
        const NAME: &'static str = "Address";
    }

    fn schema() -> Schema {
        Schema::document()
            .renamed("Name", "name", Schema::Scalar)
            .renamed("Tags", "tags", Schema::array(Schema::Scalar))
            .renamed(
                "Addresses",
                "addrs",
                Schema::array(address_schema()),
            )
            .build()
    }

    fn address_schema() -> Schema {
        Schema::document()
            .renamed("City", "city", Schema::Scalar)
            .build()
    }

    fn render_find(projection: &Projection) -> Value {
        let registry = SchemaRegistry::new();
        let schema = schema();
        let ctx = ProjectionContext::find(&schema, &registry);
        Value::Object(projection.render(&ctx).unwrap())
    }

    fn render_aggregation(projection: &Projection) -> Value {
        let registry = SchemaRegistry::new();
        let schema = schema();
        let ctx = ProjectionContext::aggregation(&schema, &registry);
        Value::Object(projection.render(&ctx).unwrap())
    }

    // -----------------------------------------------------------------------
    // Include / exclude
    // -----------------------------------------------------------------------

    #[test]
    fn test_include_resolves_wire_name() {
        let p = Projection::include("Name").unwrap();
        assert_eq!(render_find(&p), json!({"name": 1}));
    }

    #[test]
    fn test_exclude() {
        let p = Projection::exclude("_id").unwrap();
        assert_eq!(render_find(&p), json!({"_id": 0}));
    }

    #[test]
    fn test_first_matching_appends_positional() {
        let p = Projection::first_matching("Tags").unwrap();
        assert_eq!(render_find(&p), json!({"tags.$": 1}));
    }

    // -----------------------------------------------------------------------
    // ElemMatch
    // -----------------------------------------------------------------------

    #[test]
    fn test_elem_match_uses_item_schema() {
        let p =
            Projection::elem_match("Addresses", Filter::eq("City", "Portland").unwrap()).unwrap();
        assert_eq!(
            render_find(&p),
            json!({"addrs": {"$elemMatch": {"city": "Portland"}}})
        );
    }

    #[test]
    fn test_elem_match_falls_back_to_registry() {
        let registry = SchemaRegistry::new().register::<Address>(address_schema());
        let dynamic = Schema::Dynamic;
        let ctx = ProjectionContext::find(&dynamic, &registry);
        let p = Projection::elem_match_of::<Address>(
            "addresses",
            Filter::eq("City", "Portland").unwrap(),
        )
        .unwrap();
        assert_eq!(
            Value::Object(p.render(&ctx).unwrap()),
            json!({"addresses": {"$elemMatch": {"city": "Portland"}}})
        );
    }

    #[test]
    fn test_elem_match_without_registry_entry_is_dynamic() {
        let p = Projection::elem_match("unknown", Filter::gt("score", 5).unwrap()).unwrap();
        assert_eq!(
            render_find(&p),
            json!({"unknown": {"$elemMatch": {"score": {"$gt": 5}}}})
        );
    }

    // -----------------------------------------------------------------------
    // Slice
    // -----------------------------------------------------------------------

    #[test]
    fn test_slice_find_form() {
        let p = Projection::slice("Tags", 3).unwrap();
        assert_eq!(render_find(&p), json!({"tags": {"$slice": 3}}));
    }

    #[test]
    fn test_slice_find_form_with_skip() {
        let p = Projection::slice_skip("Tags", 2, 3).unwrap();
        assert_eq!(render_find(&p), json!({"tags": {"$slice": [2, 3]}}));
    }

    #[test]
    fn test_slice_aggregation_form() {
        let p = Projection::slice("Tags", 3).unwrap();
        assert_eq!(
            render_aggregation(&p),
            json!({"tags": {"$slice": ["$tags", 3]}})
        );
    }

    #[test]
    fn test_slice_aggregation_form_with_skip() {
        let p = Projection::slice_skip("Tags", 2, 3).unwrap();
        assert_eq!(
            render_aggregation(&p),
            json!({"tags": {"$slice": ["$tags", 2, 3]}})
        );
    }

    #[test]
    fn test_slice_negative_limit_keeps_tail() {
        let p = Projection::slice("Tags", -2).unwrap();
        assert_eq!(render_find(&p), json!({"tags": {"$slice": -2}}));
    }

    // -----------------------------------------------------------------------
    // Meta
    // -----------------------------------------------------------------------

    #[test]
    fn test_meta_keywords() {
        assert_eq!(
            render_find(&Projection::meta_text_score("score").unwrap()),
            json!({"score": {"$meta": "textScore"}})
        );
        assert_eq!(
            render_find(&Projection::meta_search_score("score").unwrap()),
            json!({"score": {"$meta": "searchScore"}})
        );
        assert_eq!(
            render_find(&Projection::meta_search_score_details("detail").unwrap()),
            json!({"detail": {"$meta": "searchScoreDetails"}})
        );
        assert_eq!(
            render_find(&Projection::meta_search_highlights("hl").unwrap()),
            json!({"hl": {"$meta": "searchHighlights"}})
        );
    }

    // -----------------------------------------------------------------------
    // Combine
    // -----------------------------------------------------------------------

    #[test]
    fn test_combine_collects_clauses() {
        let p = Projection::combine(vec![
            Projection::include("Name").unwrap(),
            Projection::exclude("_id").unwrap(),
        ]);
        assert_eq!(render_find(&p), json!({"name": 1, "_id": 0}));
    }

    #[test]
    fn test_combine_last_wins_and_moves_to_end() {
        let p = Projection::combine(vec![
            Projection::include("Name").unwrap(),
            Projection::include("Tags").unwrap(),
            Projection::exclude("Name").unwrap(),
        ]);
        let rendered = render_find(&p);
        assert_eq!(rendered, json!({"tags": 1, "name": 0}));
        let keys: Vec<&String> = rendered.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["tags", "name"]);
    }

    #[test]
    fn test_combine_flattens_nested_combine() {
        let p = Projection::combine(vec![
            Projection::combine(vec![
                Projection::include("Name").unwrap(),
                Projection::include("Tags").unwrap(),
            ]),
            Projection::exclude("_id").unwrap(),
        ]);
        match &p {
            Projection::Combine(children) => assert_eq!(children.len(), 3),
            _ => unreachable!(),
        }
        assert_eq!(render_find(&p), json!({"name": 1, "tags": 1, "_id": 0}));
    }

    #[test]
    fn test_empty_combine_renders_empty() {
        assert_eq!(render_find(&Projection::combine(vec![])), json!({}));
    }

    // -----------------------------------------------------------------------
    // Wire transport
    // -----------------------------------------------------------------------

    #[test]
    fn test_projection_serde_roundtrip_json() {
        let p = Projection::combine(vec![
            Projection::include("Name").unwrap(),
            Projection::slice_skip("Tags", 1, 5).unwrap(),
            Projection::meta_text_score("score").unwrap(),
        ]);
        let encoded = serde_json::to_string(&p).unwrap();
        let decoded: Projection = serde_json::from_str(&encoded).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn test_projection_serde_roundtrip_msgpack() {
        let p = Projection::elem_match("Addresses", Filter::eq("City", "X").unwrap()).unwrap();
        let bytes = rmp_serde::to_vec(&p).unwrap();
        let decoded: Projection = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(p, decoded);
    }
}
