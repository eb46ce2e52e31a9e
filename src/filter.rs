//! Filter compiler: declarative (column, operator, value) triples to query predicates.
//!
//! Conditions are applied in list order and always conjoined. Operators map to
//! builder methods through a fixed, exhaustive table ([`applier`]), so an
//! unknown operator is rejected while validating the request rather than at
//! the remote service.

use crate::adapter::TableQuery;
use crate::error::GatewayError;
use crate::security::validate_identifier;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
    Contains,
    ContainedBy,
    Overlaps,
}

impl FilterOperator {
    /// Every operator, in declaration order.
    pub const ALL: [FilterOperator; 13] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Like,
        FilterOperator::Ilike,
        FilterOperator::Is,
        FilterOperator::In,
        FilterOperator::Contains,
        FilterOperator::ContainedBy,
        FilterOperator::Overlaps,
    ];

    /// Wire name as accepted in requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
            FilterOperator::Contains => "contains",
            FilterOperator::ContainedBy => "containedBy",
            FilterOperator::Overlaps => "overlaps",
        }
    }

    /// All wire names.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(FilterOperator::as_str).collect()
    }

    /// Check a value's shape against this operator.
    fn check_value(&self, value: &Value) -> Result<(), &'static str> {
        match self {
            FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte => match value {
                Value::Null => Err("expected a scalar value; use 'is' to compare with null"),
                Value::Array(_) | Value::Object(_) => Err("expected a scalar value"),
                _ => Ok(()),
            },
            FilterOperator::Like | FilterOperator::Ilike => match value {
                Value::String(_) => Ok(()),
                _ => Err("expected a string pattern"),
            },
            FilterOperator::Is => match value {
                Value::Null | Value::Bool(_) => Ok(()),
                _ => Err("expected null, true or false"),
            },
            FilterOperator::In => match value {
                Value::Array(items) if items.iter().all(is_scalar) => Ok(()),
                Value::Array(_) => Err("expected an array of scalar values"),
                _ => Err("expected an array"),
            },
            FilterOperator::Contains | FilterOperator::ContainedBy => match value {
                Value::Array(_) | Value::Object(_) => Ok(()),
                _ => Err("expected an array or an object"),
            },
            FilterOperator::Overlaps => match value {
                Value::Array(_) => Ok(()),
                _ => Err("expected an array"),
            },
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| GatewayError::unsupported_operator(s))
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// A filter condition as it arrives in request parameters.
///
/// The operator stays a plain string until [`compile`] so that an unknown
/// operator surfaces as [`GatewayError::UnsupportedFilterOperator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterCondition {
    /// Column to filter on.
    pub column: String,

    /// Operator name.
    #[schemars(with = "FilterOperator")]
    pub operator: String,

    /// Operand; a sequence for `in`, `overlaps` and `containedBy`.
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    /// Create a condition.
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
        }
    }
}

/// A validated condition, ready to be applied to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

/// Builder method that applies one predicate to a query.
pub type Applier = fn(TableQuery, &str, Value) -> TableQuery;

/// Map an operator to the builder method implementing it.
pub fn applier(operator: FilterOperator) -> Applier {
    match operator {
        FilterOperator::Eq => TableQuery::eq,
        FilterOperator::Neq => TableQuery::neq,
        FilterOperator::Gt => TableQuery::gt,
        FilterOperator::Gte => TableQuery::gte,
        FilterOperator::Lt => TableQuery::lt,
        FilterOperator::Lte => TableQuery::lte,
        FilterOperator::Like => TableQuery::like,
        FilterOperator::Ilike => TableQuery::ilike,
        FilterOperator::Is => TableQuery::is,
        FilterOperator::In => TableQuery::in_,
        FilterOperator::Contains => TableQuery::contains,
        FilterOperator::ContainedBy => TableQuery::contained_by,
        FilterOperator::Overlaps => TableQuery::overlaps,
    }
}

/// Validate filter conditions and turn them into predicates, preserving order.
pub fn compile(filters: &[FilterCondition]) -> Result<Vec<Predicate>, GatewayError> {
    filters.iter().map(compile_one).collect()
}

fn compile_one(condition: &FilterCondition) -> Result<Predicate, GatewayError> {
    let operator: FilterOperator = condition.operator.parse()?;

    if condition.column.trim().is_empty() {
        return Err(GatewayError::invalid_filter_value(
            &condition.column,
            operator.as_str(),
            "column must not be empty",
        ));
    }
    validate_identifier(&condition.column)?;

    operator
        .check_value(&condition.value)
        .map_err(|msg| {
            GatewayError::invalid_filter_value(&condition.column, operator.as_str(), msg)
        })?;

    Ok(Predicate {
        column: condition.column.clone(),
        operator,
        value: condition.value.clone(),
    })
}

/// Apply compiled predicates to a query, in order.
pub fn apply(query: TableQuery, predicates: Vec<Predicate>) -> TableQuery {
    predicates.into_iter().fold(query, |query, predicate| {
        applier(predicate.operator)(query, &predicate.column, predicate.value)
    })
}

/// Compile `filters` and apply them to `query`.
pub fn compile_onto(
    query: TableQuery,
    filters: &[FilterCondition],
) -> Result<TableQuery, GatewayError> {
    Ok(apply(query, compile(filters)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RemoteRequest;
    use serde_json::json;

    #[test]
    fn test_operator_round_trip_names() {
        for op in FilterOperator::ALL {
            assert_eq!(op.as_str().parse::<FilterOperator>().unwrap(), op);
        }
        assert_eq!(FilterOperator::names().len(), 13);
    }

    #[test]
    fn test_operator_serde_matches_wire_names() {
        let op: FilterOperator = serde_json::from_value(json!("containedBy")).unwrap();
        assert_eq!(op, FilterOperator::ContainedBy);
        assert_eq!(serde_json::to_value(FilterOperator::Ilike).unwrap(), json!("ilike"));
    }

    #[test]
    fn test_unsupported_operator() {
        let filters = vec![FilterCondition::new("age", "between", json!([1, 2]))];
        let err = compile(&filters).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedFilterOperator(ref op) if op == "between"));
    }

    #[test]
    fn test_operator_names_are_case_sensitive() {
        assert!("EQ".parse::<FilterOperator>().is_err());
        assert!("contained_by".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn test_in_requires_sequence() {
        let filters = vec![FilterCondition::new("status", "in", json!("active"))];
        let err = compile(&filters).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidFilterValue { .. }));

        let filters = vec![FilterCondition::new("status", "in", json!(["active", "trial"]))];
        assert!(compile(&filters).is_ok());
    }

    #[test]
    fn test_value_shapes() {
        let ok = [
            ("eq", json!(18)),
            ("neq", json!("x")),
            ("gte", json!(1.5)),
            ("like", json!("%smith%")),
            ("is", json!(null)),
            ("is", json!(true)),
            ("contains", json!({"tier": "gold"})),
            ("containedBy", json!(["a", "b"])),
            ("overlaps", json!([1, 2])),
        ];
        for (op, value) in ok {
            let filters = vec![FilterCondition::new("col", op, value.clone())];
            assert!(compile(&filters).is_ok(), "{op} should accept {value}");
        }

        let bad = [
            ("eq", json!(null)),
            ("lt", json!([1])),
            ("ilike", json!(5)),
            ("is", json!("maybe")),
            ("in", json!([[1]])),
            ("overlaps", json!({"a": 1})),
        ];
        for (op, value) in bad {
            let filters = vec![FilterCondition::new("col", op, value.clone())];
            assert!(compile(&filters).is_err(), "{op} should reject {value}");
        }
    }

    #[test]
    fn test_empty_column_rejected() {
        let filters = vec![FilterCondition::new("", "eq", json!(1))];
        assert!(matches!(
            compile(&filters).unwrap_err(),
            GatewayError::InvalidFilterValue { .. }
        ));
    }

    #[test]
    fn test_apply_preserves_order() {
        let filters = vec![
            FilterCondition::new("age", "gte", json!(18)),
            FilterCondition::new("country", "eq", json!("NL")),
            FilterCondition::new("deleted_at", "is", json!(null)),
        ];
        let query = compile_onto(RemoteRequest::from("users").select("*"), &filters).unwrap();

        let applied: Vec<(&str, FilterOperator)> = query
            .filters
            .iter()
            .map(|p| (p.column.as_str(), p.operator))
            .collect();
        assert_eq!(
            applied,
            vec![
                ("age", FilterOperator::Gte),
                ("country", FilterOperator::Eq),
                ("deleted_at", FilterOperator::Is),
            ]
        );
    }

    #[test]
    fn test_condition_deserializes_without_value() {
        let condition: FilterCondition =
            serde_json::from_value(json!({"column": "archived", "operator": "is"})).unwrap();
        assert_eq!(condition.value, Value::Null);
        assert!(compile(&[condition]).is_ok());
    }
}
