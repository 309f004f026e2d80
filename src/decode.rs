use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value as JsonValue;

use crate::{
    types::{Column, ExecOutcome, ResultSet},
    wire, QuorumDbError, Value,
};

/// Encodes one bound parameter into its wire JSON form. Blobs travel as
/// base64 text; non-finite floats have no JSON representation and are
/// rejected up front.
pub(crate) fn encode_value(value: &Value) -> Result<JsonValue, QuorumDbError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Integer(value) => Ok(JsonValue::from(*value)),
        Value::Real(value) => {
            if !value.is_finite() {
                return Err(QuorumDbError::Encode(format!(
                    "non-finite float parameter '{value}' is unsupported"
                )));
            }
            Ok(JsonValue::from(*value))
        }
        Value::Text(value) => Ok(JsonValue::String(value.clone())),
        Value::Blob(bytes) => Ok(JsonValue::String(BASE64.encode(bytes))),
        Value::Boolean(value) => Ok(JsonValue::Bool(*value)),
    }
}

/// Materializes one per-statement result into an immutable [`ResultSet`].
///
/// Fail-fast: a duplicate column name, a row of the wrong arity or a single
/// uncoercible cell fails the whole decode with a protocol error so callers
/// never see a partially-typed result.
pub(crate) fn decode_result_set(result: wire::StatementResult) -> Result<ResultSet, QuorumDbError> {
    let names = result.columns.unwrap_or_default();
    let types = result.types.unwrap_or_default();
    if !types.is_empty() && types.len() != names.len() {
        return Err(QuorumDbError::Protocol(format!(
            "column/type arity mismatch: {} columns, {} types",
            names.len(),
            types.len()
        )));
    }

    for (i, name) in names.iter().enumerate() {
        if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(QuorumDbError::Protocol(format!(
                "duplicate column name '{name}'"
            )));
        }
    }

    let columns: Vec<Column> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column {
            name,
            decltype: types.get(i).filter(|t| !t.is_empty()).cloned(),
        })
        .collect();

    let raw_rows = result.values.unwrap_or_default();
    let mut rows = Vec::with_capacity(raw_rows.len());
    for (row_index, raw_row) in raw_rows.into_iter().enumerate() {
        if raw_row.len() != columns.len() {
            return Err(QuorumDbError::Protocol(format!(
                "row {row_index} has {} values for {} columns",
                raw_row.len(),
                columns.len()
            )));
        }
        let mut row = Vec::with_capacity(raw_row.len());
        for (cell_index, cell) in raw_row.into_iter().enumerate() {
            let column = &columns[cell_index];
            let value = decode_cell(column.decltype.as_deref(), cell).map_err(|detail| {
                QuorumDbError::Protocol(format!(
                    "row {row_index}, column '{}': {detail}",
                    column.name
                ))
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    Ok(ResultSet::new(columns, rows, result.time))
}

/// Extracts write metadata from one per-statement result.
pub(crate) fn decode_exec_outcome(result: wire::StatementResult) -> ExecOutcome {
    ExecOutcome {
        rows_affected: result.rows_affected.unwrap_or(0),
        last_insert_id: result.last_insert_id,
        time: result.time,
    }
}

/// Column type classes recognized from SQLite-style declared types.
enum TypeClass {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    /// No usable declaration: infer from the JSON cell.
    Dynamic,
}

fn type_class(decltype: Option<&str>) -> TypeClass {
    let Some(decltype) = decltype else {
        return TypeClass::Dynamic;
    };
    let lower = decltype.to_ascii_lowercase();
    if lower.contains("bool") {
        TypeClass::Boolean
    } else if lower.contains("int") {
        TypeClass::Integer
    } else if lower.contains("char") || lower.contains("clob") || lower.contains("text") {
        TypeClass::Text
    } else if lower.contains("real")
        || lower.contains("floa")
        || lower.contains("doub")
        || lower.contains("numeric")
        || lower.contains("decimal")
    {
        TypeClass::Real
    } else if lower.contains("blob") {
        TypeClass::Blob
    } else {
        TypeClass::Dynamic
    }
}

/// Coerces one JSON cell to the declared column type.
///
/// JSON nulls decode to [`Value::Null`] under every declaration. Otherwise
/// the declared type's canonical parse rule applies; a cell that cannot be
/// coerced losslessly is an error, described for the caller.
fn decode_cell(decltype: Option<&str>, cell: JsonValue) -> Result<Value, String> {
    if cell.is_null() {
        return Ok(Value::Null);
    }
    match type_class(decltype) {
        TypeClass::Integer => decode_integer(cell),
        TypeClass::Real => decode_real(cell),
        TypeClass::Text => decode_text(cell),
        TypeClass::Blob => decode_blob(cell),
        TypeClass::Boolean => decode_boolean(cell),
        TypeClass::Dynamic => decode_dynamic(cell),
    }
}

fn decode_integer(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(Value::Integer(v));
            }
            // Some stores emit integral floats; accept them only when exact.
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    return Ok(Value::Integer(f as i64));
                }
            }
            Err(format!("number {n} does not fit an integer column"))
        }
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("text '{s}' is not an integer")),
        other => Err(format!("{} cannot be an integer", json_kind(&other))),
    }
}

fn decode_real(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Value::Real)
            .ok_or_else(|| format!("number {n} does not fit a real column")),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Real)
            .ok_or_else(|| format!("text '{s}' is not a real")),
        other => Err(format!("{} cannot be a real", json_kind(&other))),
    }
}

fn decode_text(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::String(s) => Ok(Value::Text(s)),
        JsonValue::Number(n) => Ok(Value::Text(n.to_string())),
        other => Err(format!("{} cannot be text", json_kind(&other))),
    }
}

fn decode_blob(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::String(s) => BASE64
            .decode(s.as_bytes())
            .map(Value::Blob)
            .map_err(|err| format!("invalid base64 blob: {err}")),
        other => Err(format!("{} cannot be a blob", json_kind(&other))),
    }
}

fn decode_boolean(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::Bool(b) => Ok(Value::Boolean(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Boolean(false)),
            Some(1) => Ok(Value::Boolean(true)),
            _ => Err(format!("number {n} is not a boolean")),
        },
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(format!("text '{s}' is not a boolean")),
        },
        other => Err(format!("{} cannot be a boolean", json_kind(&other))),
    }
}

fn decode_dynamic(cell: JsonValue) -> Result<Value, String> {
    match cell {
        JsonValue::Bool(b) => Ok(Value::Boolean(b)),
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(Value::Integer(v))
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(Value::Real)
                    .ok_or_else(|| format!("number {n} is not representable"))
            }
        }
        JsonValue::String(s) => Ok(Value::Text(s)),
        other => Err(format!("{} has no column type", json_kind(&other))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
