//! Renders a [`ConditionTree`] as a SQL `SELECT` using sea-query, for
//! back-ends that store entities in a relational table.

use crate::compiler::{ConditionEntry, ConditionTree, Junction};
use crate::config::CompilerConfig;
use crate::rule::{Operator, RangeBounds, Rule, ANY_TYPE};
use crate::value::TypedValue;
use sea_query::{Asterisk, Condition, Expr, Iden, PostgresQueryBuilder, SelectStatement, SimpleExpr, Value};

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

pub struct SqlCompiler {
    table: String,
    /// Field name of type membership rules, whose match-any sentinel renders
    /// no predicate.
    types_rule_field: String,
}

impl SqlCompiler {
    pub fn new(table: &str, config: &CompilerConfig) -> Self {
        Self {
            table: table.to_string(),
            types_rule_field: config.types_rule_field.clone(),
        }
    }

    pub fn select(&self, tree: &ConditionTree) -> SelectStatement {
        let mut select = SelectStatement::new();
        select
            .column(Asterisk)
            .from(TableName(self.table.clone()))
            .cond_where(self.condition(tree));
        select
    }

    pub fn compile(&self, tree: &ConditionTree) -> String {
        self.select(tree).to_string(PostgresQueryBuilder)
    }

    fn condition(&self, tree: &ConditionTree) -> Condition {
        let mut condition = match tree.junction {
            Junction::And => Condition::all(),
            Junction::Or => Condition::any(),
        };
        for entry in &tree.rules {
            match entry {
                ConditionEntry::Rule(rule) => {
                    if let Some(expr) = self.rule_expr(rule) {
                        condition = condition.add(expr);
                    }
                }
                ConditionEntry::Tree(nested) => {
                    condition = condition.add(self.condition(nested));
                }
            }
        }
        condition
    }

    fn rule_expr(&self, rule: &Rule) -> Option<SimpleExpr> {
        let col = || Expr::col(ColumnName(rule.field.clone()));
        match rule.operator {
            Operator::Equals | Operator::SetTo => {
                if rule.field == self.types_rule_field
                    && rule.values == [TypedValue::Object(ANY_TYPE.to_string())]
                {
                    return None;
                }
                let mut values: Vec<Value> = rule.values.iter().filter_map(to_value).collect();
                match values.len() {
                    0 => None,
                    1 => values.pop().map(|v| col().eq(v)),
                    _ => Some(col().is_in(values)),
                }
            }
            Operator::Between => {
                let bounds = rule.bounds.unwrap_or(RangeBounds::CLOSED);
                let lower = rule.values.first().and_then(to_value);
                let upper = rule.values.get(1).and_then(to_value);
                if let (Some(lo), Some(hi), true) = (&lower, &upper, bounds.is_closed()) {
                    return Some(col().between(lo.clone(), hi.clone()));
                }
                let lower = lower.map(|v| if bounds.lower_inclusive { col().gte(v) } else { col().gt(v) });
                let upper = upper.map(|v| if bounds.upper_inclusive { col().lte(v) } else { col().lt(v) });
                match (lower, upper) {
                    (Some(lo), Some(hi)) => Some(lo.and(hi)),
                    (lo, hi) => lo.or(hi),
                }
            }
        }
    }
}

/// Convert a rule value to a sea-query Value; open bounds have none.
fn to_value(value: &TypedValue) -> Option<Value> {
    match value {
        TypedValue::Literal(s) | TypedValue::DateTime(s) | TypedValue::Object(s) => Some(Value::from(s.clone())),
        TypedValue::Integer(n) => Some(Value::from(*n)),
        TypedValue::Float(x) => Some(Value::from(*x)),
        TypedValue::Null => None,
    }
}
