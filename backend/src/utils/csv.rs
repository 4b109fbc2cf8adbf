//! CSV rendering for the `export=csv` query parameter.

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::Value;

use super::{ApiError, ApiResult};

/// Render snapshot rows as CSV text. Column order follows the first row's
/// key order; later rows are looked up by key so a missing field becomes an
/// empty cell rather than a column shift.
pub fn rows_to_csv(rows: &[Value]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let Some(first) = rows.first().and_then(Value::as_object) else {
        return Ok(String::new());
    };
    let columns: Vec<&String> = first.keys().collect();
    writer
        .write_record(&columns)
        .map_err(|e| ApiError::internal_error(format!("CSV write error: {}", e)))?;

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|col| match row.get(col.as_str()) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| ApiError::internal_error(format!("CSV write error: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::internal_error(format!("CSV write error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ApiError::internal_error(e.to_string()))
}

/// Wrap CSV text as a downloadable attachment response.
pub fn csv_response(dimension: &str, body: String) -> Response {
    let filename = format!("{}_{}.csv", dimension, Utc::now().format("%Y%m%d_%H%M%S"));
    let disposition = format!("attachment; filename=\"{}\"", filename);
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
            ),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_header_and_rows() {
        let rows = vec![
            json!({"name": "WH1", "total_credits": 1.5, "active": true}),
            json!({"name": "WH2", "total_credits": 0.0, "active": false}),
        ];
        let out = rows_to_csv(&rows).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("active,name,total_credits"));
        assert_eq!(lines.next(), Some("true,WH1,1.5"));
        assert_eq!(lines.next(), Some("false,WH2,0.0"));
    }

    #[test]
    fn empty_set_renders_empty_body() {
        assert_eq!(rows_to_csv(&[]).unwrap(), "");
    }

    #[test]
    fn null_fields_become_empty_cells() {
        let rows = vec![json!({"a": "x", "b": null})];
        let out = rows_to_csv(&rows).unwrap();
        assert!(out.contains("x,"));
    }
}
