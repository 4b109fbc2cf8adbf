//! Typed equality filters over snapshot rows.
//!
//! Filters arrive as query-string key/value pairs and are evaluated
//! in-process against the JSON rows of a dimension snapshot. Unknown field
//! names are rejected rather than ignored, so a typo returns an error
//! instead of an unfiltered result set.

use serde_json::Value;

use crate::utils::{ApiError, ApiResult};

/// Supported comparison operators. Only equality for now; the typed shape
/// leaves room for range operators without changing the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), op: FilterOp::Eq, value: value.into() }
    }

    /// Compare the raw string value against a JSON field, coercing to the
    /// field's type. Numbers compare numerically so "10" matches 10.0.
    fn matches_value(&self, field_value: &Value) -> bool {
        match self.op {
            FilterOp::Eq => match field_value {
                Value::String(s) => s == &self.value,
                // u64 first: drill-down keys are full-width hashes and must
                // not round-trip through f64.
                Value::Number(n) => {
                    if let (Some(rhs), Ok(lhs)) = (n.as_u64(), self.value.parse::<u64>()) {
                        lhs == rhs
                    } else {
                        self.value
                            .parse::<f64>()
                            .ok()
                            .zip(n.as_f64())
                            .is_some_and(|(lhs, rhs)| lhs == rhs)
                    }
                },
                Value::Bool(b) => self.value.parse::<bool>().ok() == Some(*b),
                Value::Null => self.value.eq_ignore_ascii_case("null"),
                _ => false,
            },
        }
    }
}

/// Validate every filter field against the snapshot's schema, then return
/// the rows matching all filters, up to `limit`, preserving row order.
pub fn apply_filters(
    rows: &[Value],
    filters: &[Filter],
    limit: Option<usize>,
) -> ApiResult<Vec<Value>> {
    if let Some(first) = rows.first() {
        for filter in filters {
            let known = first
                .as_object()
                .is_some_and(|obj| obj.contains_key(&filter.field));
            if !known {
                return Err(ApiError::invalid_filter(&filter.field));
            }
        }
    }

    let cap = limit.unwrap_or(usize::MAX);
    let matched = rows
        .iter()
        .filter(|row| {
            filters.iter().all(|f| {
                row.get(&f.field).is_some_and(|v| f.matches_value(v))
            })
        })
        .take(cap)
        .cloned()
        .collect();
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"user_name": "A", "warehouse_name": "WH1", "total_queries": 10, "is_failed": false}),
            json!({"user_name": "B", "warehouse_name": "WH1", "total_queries": 5, "is_failed": true}),
            json!({"user_name": "C", "warehouse_name": "WH2", "total_queries": 10, "is_failed": false}),
        ]
    }

    #[test]
    fn equality_filter_keeps_matching_rows_in_order() {
        let out =
            apply_filters(&rows(), &[Filter::eq("warehouse_name", "WH1")], None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["user_name"], "A");
        assert_eq!(out[1]["user_name"], "B");
    }

    #[test]
    fn limit_truncates_after_filtering() {
        let out =
            apply_filters(&rows(), &[Filter::eq("warehouse_name", "WH1")], Some(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["user_name"], "A");
    }

    #[test]
    fn numeric_and_boolean_values_coerce() {
        let numeric = apply_filters(&rows(), &[Filter::eq("total_queries", "10")], None).unwrap();
        assert_eq!(numeric.len(), 2);

        let boolean = apply_filters(&rows(), &[Filter::eq("is_failed", "true")], None).unwrap();
        assert_eq!(boolean.len(), 1);
        assert_eq!(boolean[0]["user_name"], "B");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = apply_filters(&rows(), &[Filter::eq("no_such_field", "x")], None);
        assert!(matches!(err, Err(ApiError::InvalidFilter(_))));
    }

    #[test]
    fn empty_snapshot_matches_nothing_without_error() {
        let out = apply_filters(&[], &[Filter::eq("anything", "x")], None).unwrap();
        assert!(out.is_empty());
    }
}
