//! Leaf conditions and the builder that produces them from query terms.

use crate::ast::{NodeId, NodeKind, ScalarValue, Term};
use crate::compiler::ContextParameters;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::model::{EntityProperty, EntityType, ModelResolver};
use crate::range::{bound_terms, extract_range};
use crate::value::{typify, TypedValue, ValueType};
use serde::Serialize;
use tracing::debug;

/// Value of the "match any type" sentinel placed in an otherwise empty type rule.
pub const ANY_TYPE: &str = "*";

const BOUND_PLACEHOLDER: &str = "?";
const CONTEXT_PLACEHOLDER: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    SetTo,
    Between,
}

/// Whether each end of a `Between` rule includes its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RangeBounds {
    pub lower_inclusive: bool,
    pub upper_inclusive: bool,
}

impl RangeBounds {
    pub const CLOSED: RangeBounds = RangeBounds { lower_inclusive: true, upper_inclusive: true };

    pub fn is_closed(&self) -> bool {
        self.lower_inclusive && self.upper_inclusive
    }
}

/// A single field-operator-values condition.
///
/// `Between` rules always carry exactly two values, where [`TypedValue::Null`]
/// marks an open bound, plus their [`RangeBounds`]. `Equals` and `SetTo`
/// rules carry at least one value and never a null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub field: String,
    pub operator: Operator,
    pub value_type: ValueType,
    pub values: Vec<TypedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<RangeBounds>,
}

impl Rule {
    pub fn between(
        field: &str,
        lower: Option<TypedValue>,
        upper: Option<TypedValue>,
        bounds: RangeBounds,
    ) -> Self {
        let values = vec![lower.unwrap_or(TypedValue::Null), upper.unwrap_or(TypedValue::Null)];
        Self {
            field: field.to_string(),
            operator: Operator::Between,
            value_type: leading_type(&values),
            values,
            bounds: Some(bounds),
        }
    }
}

fn leading_type(values: &[TypedValue]) -> ValueType {
    values
        .iter()
        .find_map(TypedValue::value_type)
        .unwrap_or(ValueType::Literal)
}

/// The value side of a resolved field: one term, or the terms gathered from a
/// collapsed disjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Term),
    List(Vec<Term>),
}

impl FieldValue {
    pub fn terms(&self) -> &[Term] {
        match self {
            FieldValue::Single(term) => std::slice::from_ref(term),
            FieldValue::List(terms) => terms,
        }
    }
}

/// A field ready to be turned into a [`Rule`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub key: String,
    pub value: FieldValue,
    pub operator: Operator,
    /// The node the field came from; ancestor lookups start here.
    pub source_node: NodeId,
}

pub struct RuleBuilder<'a> {
    params: &'a ContextParameters,
    resolver: &'a ModelResolver<'a>,
    config: &'a CompilerConfig,
}

impl<'a> RuleBuilder<'a> {
    pub fn new(
        params: &'a ContextParameters,
        resolver: &'a ModelResolver<'a>,
        config: &'a CompilerConfig,
    ) -> Self {
        Self { params, resolver, config }
    }

    pub fn build_rule(&self, field: &ResolvedField) -> Result<Rule> {
        let mut raw = Vec::new();
        for term in field.value.terms() {
            self.substitute(&field.key, term, &mut raw)?;
        }

        let rule = if self.resolver.is_type_field(&field.key) {
            self.type_rule(raw)?
        } else {
            self.value_rule(field, raw)?
        };
        debug!(field = %rule.field, operator = ?rule.operator, values = rule.values.len(), "built rule");
        Ok(rule)
    }

    /// A `Between` rule for a range node. Under a type constraint the field
    /// and both bounds go through the model like any other typed field.
    pub fn range_rule(&self, range: NodeId) -> Result<Rule> {
        let ast = &self.params.query;
        let NodeKind::Range { field, lower_inclusive, upper_inclusive } = ast.kind(range) else {
            return Err(CompileError::UnsupportedNode { fragment: ast.render(range) });
        };
        let bounds = RangeBounds { lower_inclusive: *lower_inclusive, upper_inclusive: *upper_inclusive };

        let Some(type_name) = self.type_constraint(range)? else {
            let (lower, upper) = extract_range(ast, range, &self.config.date_format)?;
            return Ok(Rule::between(field, lower, upper, bounds));
        };
        let (entity, property) = self.typed_property(&type_name, field)?;
        let (lower, upper) = bound_terms(ast, range)?;

        let mut internal_field = None;
        let mut convert = |term: Option<&Term>| -> Result<Option<TypedValue>> {
            let Some(term) = term else {
                return Ok(None);
            };
            let (id, value) = self.resolver.model().convert_value(
                &property.uri,
                term.value.clone(),
                &entity.identifier,
            )?;
            internal_field.get_or_insert(id);
            Ok(Some(value))
        };
        let lower = convert(lower)?;
        let upper = convert(upper)?;
        let rule_field = internal_field.unwrap_or(property.property_id);
        Ok(Rule::between(&rule_field, lower, upper, bounds))
    }

    /// Replaces bare placeholders. A list bound value expands into its
    /// elements; a null or empty list binds nothing.
    fn substitute(&self, field: &str, term: &Term, out: &mut Vec<ScalarValue>) -> Result<()> {
        if term.is_bare(BOUND_PLACEHOLDER) {
            let missing = || CompileError::MissingBoundValue { field: field.to_string() };
            match &self.params.bound_value {
                None | Some(ScalarValue::Null) => return Err(missing()),
                Some(ScalarValue::List(items)) if items.is_empty() => return Err(missing()),
                Some(ScalarValue::List(items)) => out.extend(items.iter().cloned()),
                Some(value) => out.push(value.clone()),
            }
        } else if term.is_bare(CONTEXT_PLACEHOLDER) {
            match &self.params.context_instance_id {
                Some(id) => out.push(ScalarValue::String(id.clone())),
                None => return Err(CompileError::MissingContextInstance { field: field.to_string() }),
            }
        } else {
            out.push(term.value.clone());
        }
        Ok(())
    }

    /// The type named by the nearest type constraint above `node`, with
    /// placeholders substituted. Wildcards constrain nothing.
    fn type_constraint(&self, node: NodeId) -> Result<Option<String>> {
        let Some(term) = self.resolver.find_type_constraint(&self.params.query, node) else {
            return Ok(None);
        };
        let mut names = Vec::new();
        self.substitute(&self.config.type_field, term, &mut names)?;
        Ok(names.iter().map(ToString::to_string).find(|name| name != ANY_TYPE))
    }

    fn typed_property(&self, type_name: &str, field: &str) -> Result<(EntityType, EntityProperty)> {
        let entity = self.resolver.resolve_type(type_name)?;
        let property = self.resolver.resolve_property(&entity, field)?;
        Ok((entity, property))
    }

    /// Membership rule over the URIs of the named types.
    fn type_rule(&self, names: Vec<ScalarValue>) -> Result<Rule> {
        let mut uris: Vec<TypedValue> = Vec::new();
        for name in names {
            let name = name.to_string();
            if name == ANY_TYPE {
                continue;
            }
            let uri = TypedValue::Object(self.resolver.resolve_type(&name)?.uri);
            if !uris.contains(&uri) {
                uris.push(uri);
            }
        }
        if uris.is_empty() {
            uris.push(TypedValue::Object(ANY_TYPE.to_string()));
        }
        Ok(Rule {
            field: self.config.types_rule_field.clone(),
            operator: Operator::Equals,
            value_type: ValueType::Object,
            values: uris,
            bounds: None,
        })
    }

    fn value_rule(&self, field: &ResolvedField, raw: Vec<ScalarValue>) -> Result<Rule> {
        if raw.is_empty() {
            return Err(CompileError::MissingBoundValue { field: field.key.clone() });
        }

        let (rule_field, values) = match self.type_constraint(field.source_node)? {
            Some(type_name) => {
                let (entity, property) = self.typed_property(&type_name, &field.key)?;
                let model = self.resolver.model();
                let mut internal_field = None;
                let mut values = Vec::with_capacity(raw.len());
                for value in raw {
                    let (id, converted) = model.convert_value(&property.uri, value, &entity.identifier)?;
                    internal_field.get_or_insert(id);
                    values.push(converted);
                }
                (internal_field.unwrap_or(property.property_id), values)
            }
            None => {
                let values = raw
                    .iter()
                    .map(|value| typify(&field.key, value))
                    .collect::<Result<Vec<_>>>()?;
                (field.key.clone(), values)
            }
        };

        let operator = if field.operator == Operator::Equals
            && values.iter().all(|v| v.operator_hint() == Some(Operator::SetTo))
        {
            Operator::SetTo
        } else {
            field.operator
        };

        Ok(Rule {
            field: rule_field,
            operator,
            value_type: leading_type(&values),
            values,
            bounds: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::compiler::QueryCompiler;

    const CATALOG: &str = r#"{
        "types": [
            {
                "name": "Person",
                "identifier": "person",
                "uri": "urn:type:person",
                "properties": [
                    { "name": "name", "uri": "name", "property_id": "p_name", "data_type": "string" },
                    { "name": "age", "uri": "age", "property_id": "p_age", "data_type": "number" },
                    { "name": "employer", "uri": "employer", "property_id": "p_employer", "data_type": "reference" }
                ]
            },
            { "name": "Company", "identifier": "company", "uri": "urn:type:company", "properties": [] }
        ]
    }"#;

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_json_str(CATALOG).unwrap()
    }

    fn params(query: &str) -> ContextParameters {
        ContextParameters::new(QueryCompiler::default().parse(query).unwrap())
    }

    fn build(params: &ContextParameters, field: ResolvedField) -> Result<Rule> {
        let config = CompilerConfig::default();
        let catalog = catalog();
        let resolver = ModelResolver::new(&catalog, &config.type_field);
        RuleBuilder::new(params, &resolver, &config).build_rule(&field)
    }

    fn leaf(params: &ContextParameters, key: &str, term: Term) -> ResolvedField {
        let source_node = (0..params.query.len())
            .map(NodeId)
            .find(|id| params.query.children(*id).is_empty())
            .unwrap();
        ResolvedField { key: key.to_string(), value: FieldValue::Single(term), operator: Operator::Equals, source_node }
    }

    #[test]
    fn test_type_rule() {
        let p = params("type:Person");
        let rule = build(&p, leaf(&p, "type", Term::bare("Person"))).unwrap();
        assert_eq!(rule.field, "types");
        assert_eq!(rule.operator, Operator::Equals);
        assert_eq!(rule.values, vec![TypedValue::Object("urn:type:person".to_string())]);
    }

    #[test]
    fn test_type_rule_with_only_wildcards_matches_any() {
        let p = params("type:*");
        let rule = build(&p, leaf(&p, "type", Term::bare("*"))).unwrap();
        assert_eq!(rule.values, vec![TypedValue::Object(ANY_TYPE.to_string())]);
    }

    #[test]
    fn test_unknown_type() {
        let p = params("type:Robot");
        let err = build(&p, leaf(&p, "type", Term::bare("Robot"))).unwrap_err();
        assert_eq!(err, CompileError::UnresolvedType { type_name: "Robot".to_string() });
    }

    #[test]
    fn test_untyped_value_keeps_field_name() {
        let p = params("title:Report");
        let rule = build(&p, leaf(&p, "title", Term::bare("Report"))).unwrap();
        assert_eq!(rule.field, "title");
        assert_eq!(rule.value_type, ValueType::Literal);
        assert_eq!(rule.values, vec![TypedValue::Literal("Report".to_string())]);
    }

    #[test]
    fn test_reference_value_hints_set_to() {
        let p = params(r"owner:urn\:user\:1");
        let rule = build(&p, leaf(&p, "owner", Term::bare("urn:user:1"))).unwrap();
        assert_eq!(rule.operator, Operator::SetTo);
        assert_eq!(rule.value_type, ValueType::Object);
    }

    #[test]
    fn test_bound_placeholder() {
        let p = params("title:?");
        let err = build(&p, leaf(&p, "title", Term::bare("?"))).unwrap_err();
        assert_eq!(err, CompileError::MissingBoundValue { field: "title".to_string() });

        let p = params("title:?").with_bound_value(ScalarValue::Integer(5));
        let rule = build(&p, leaf(&p, "title", Term::bare("?"))).unwrap();
        assert_eq!(rule.values, vec![TypedValue::Integer(5)]);
    }

    #[test]
    fn test_quoted_placeholder_is_literal() {
        let p = params(r#"title:"?""#);
        let rule = build(&p, leaf(&p, "title", Term::quoted("?"))).unwrap();
        assert_eq!(rule.values, vec![TypedValue::Literal("?".to_string())]);
    }

    #[test]
    fn test_list_bound_value_expands() {
        let p = params("title:?").with_bound_value(ScalarValue::List(vec![
            ScalarValue::String("a".to_string()),
            ScalarValue::String("b".to_string()),
        ]));
        let rule = build(&p, leaf(&p, "title", Term::bare("?"))).unwrap();
        assert_eq!(rule.values.len(), 2);
    }

    #[test]
    fn test_context_placeholder() {
        let p = params("owner:current");
        let err = build(&p, leaf(&p, "owner", Term::bare("current"))).unwrap_err();
        assert_eq!(err, CompileError::MissingContextInstance { field: "owner".to_string() });

        let p = params("owner:current").with_context_instance("urn:user:7");
        let rule = build(&p, leaf(&p, "owner", Term::bare("current"))).unwrap();
        assert_eq!(rule.values, vec![TypedValue::Object("urn:user:7".to_string())]);
    }

    #[test]
    fn test_typed_conversion_uses_internal_field() {
        let p = params("type:Person AND age:42");
        let field = ResolvedField {
            key: "age".to_string(),
            value: FieldValue::Single(Term::bare("42")),
            operator: Operator::Equals,
            source_node: NodeId(1),
        };
        let rule = build(&p, field).unwrap();
        assert_eq!(rule.field, "p_age");
        assert_eq!(rule.value_type, ValueType::Numeric);
        assert_eq!(rule.values, vec![TypedValue::Integer(42)]);
    }

    #[test]
    fn test_unknown_property_on_type() {
        let p = params("type:Company AND age:42");
        let field = ResolvedField {
            key: "age".to_string(),
            value: FieldValue::Single(Term::bare("42")),
            operator: Operator::Equals,
            source_node: NodeId(1),
        };
        let err = build(&p, field).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnresolvedProperty { field: "age".to_string(), type_name: "company".to_string() }
        );
    }

    #[test]
    fn test_between_rule_shape() {
        let rule = Rule::between(
            "d",
            None,
            Some(TypedValue::DateTime("2020-12-31T00:00:00".into())),
            RangeBounds::CLOSED,
        );
        assert_eq!(rule.operator, Operator::Between);
        assert_eq!(rule.value_type, ValueType::DateTime);
        assert_eq!(rule.values[0], TypedValue::Null);
        assert_eq!(rule.bounds, Some(RangeBounds::CLOSED));

        let open = Rule::between("d", None, None, RangeBounds::CLOSED);
        assert_eq!(open.values, vec![TypedValue::Null, TypedValue::Null]);
        assert_eq!(open.value_type, ValueType::Literal);
    }

    #[test]
    fn test_empty_or_null_bound_value_is_missing() {
        let missing = CompileError::MissingBoundValue { field: "owner".to_string() };

        let p = params("owner:?").with_bound_value(ScalarValue::List(vec![]));
        assert_eq!(build(&p, leaf(&p, "owner", Term::bare("?"))).unwrap_err(), missing);

        let p = params("owner:?").with_bound_value(ScalarValue::Null);
        assert_eq!(build(&p, leaf(&p, "owner", Term::bare("?"))).unwrap_err(), missing);
    }

    #[test]
    fn test_null_inside_list_bound_value_is_rejected() {
        let p = params("owner:?").with_bound_value(ScalarValue::List(vec![
            ScalarValue::String("a".to_string()),
            ScalarValue::Null,
        ]));
        let err = build(&p, leaf(&p, "owner", Term::bare("?"))).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedValue { ref field, .. } if field == "owner"));
    }

    #[test]
    fn test_type_constraint_placeholder_is_substituted() {
        let p = params("type:? AND age:42").with_bound_value(ScalarValue::String("Person".to_string()));
        let field = ResolvedField {
            key: "age".to_string(),
            value: FieldValue::Single(Term::bare("42")),
            operator: Operator::Equals,
            source_node: NodeId(1),
        };
        let rule = build(&p, field.clone()).unwrap();
        assert_eq!(rule.field, "p_age");

        let unbound = params("type:? AND age:42");
        let err = build(&unbound, field).unwrap_err();
        assert_eq!(err, CompileError::MissingBoundValue { field: "type".to_string() });
    }

    fn range_rule(query: &str) -> Result<Rule> {
        let p = params(query);
        let config = CompilerConfig::default();
        let catalog = catalog();
        let resolver = ModelResolver::new(&catalog, &config.type_field);
        let range = (0..p.query.len())
            .map(NodeId)
            .find(|id| matches!(p.query.kind(*id), NodeKind::Range { .. }))
            .unwrap();
        RuleBuilder::new(&p, &resolver, &config).range_rule(range)
    }

    #[test]
    fn test_untyped_range_keeps_field_and_bounds() {
        let rule = range_rule("n:{a TO m]").unwrap();
        assert_eq!(rule.field, "n");
        assert_eq!(
            rule.bounds,
            Some(RangeBounds { lower_inclusive: false, upper_inclusive: true })
        );
        assert_eq!(
            rule.values,
            vec![TypedValue::Literal("a".to_string()), TypedValue::Literal("m".to_string())]
        );
    }

    #[test]
    fn test_typed_range_uses_internal_field() {
        let rule = range_rule("type:Person AND age:[18 TO *]").unwrap();
        assert_eq!(rule.field, "p_age");
        assert_eq!(rule.values, vec![TypedValue::Integer(18), TypedValue::Null]);
        assert_eq!(rule.value_type, ValueType::Numeric);

        let err = range_rule("type:Person AND age:[young TO old]").unwrap_err();
        assert!(matches!(err, CompileError::Conversion(_)));

        let err = range_rule("type:Company AND age:[1 TO 2]").unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedProperty { .. }));
    }
}
