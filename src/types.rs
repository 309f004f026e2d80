use crate::{PeerRole, Value};

/// One result-set column: name plus the store's declared type, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub decltype: Option<String>,
}

/// A fully-materialized, immutable query result.
///
/// Decoding happens once, eagerly, from the whole response body; reading a
/// result set performs no further network activity. Rows are addressable
/// forward and by random position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    time: Option<f64>,
}

impl ResultSet {
    pub(crate) fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>, time: Option<f64>) -> Self {
        Self {
            columns,
            rows,
            time,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Store-reported execution time for this statement, in seconds.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))
    }

    /// Random positional access to one row.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }
}

/// Borrowed view of one row, aligned 1:1 with the result set's columns.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Value at a column position.
    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// Value by case-insensitive column name.
    pub fn get_named(&self, name: &str) -> Option<&'a Value> {
        let index = self
            .columns
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get_named(name)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get_named(name)? {
            Value::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&'a str> {
        match self.get_named(name)? {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn get_blob(&self, name: &str) -> Option<&'a [u8]> {
        match self.get_named(name)? {
            Value::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get_named(name)? {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// Write metadata for one executed statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
    /// Store-reported execution time in seconds.
    pub time: Option<f64>,
}

/// Per-statement outcome of a batch, positionally aligned with the request.
///
/// A statement-level SQL failure does not fail the whole batch; callers see
/// exactly which member failed and what the others produced.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementOutcome {
    Rows(ResultSet),
    Exec(ExecOutcome),
    SqlError {
        /// Index of the failing statement in the batch.
        index: usize,
        /// Store message, verbatim.
        message: String,
    },
}

/// One cluster member as reported by the discovery endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub api_addr: String,
    pub role: PeerRole,
    pub reachable: bool,
}

#[cfg(test)]
mod tests {
    use super::{Column, ResultSet};
    use crate::Value;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec![
                Column {
                    name: "id".to_owned(),
                    decltype: Some("integer".to_owned()),
                },
                Column {
                    name: "name".to_owned(),
                    decltype: Some("text".to_owned()),
                },
            ],
            vec![
                vec![Value::Integer(1), Value::Text("fiona".to_owned())],
                vec![Value::Integer(2), Value::Null],
            ],
            None,
        )
    }

    #[test]
    fn positional_and_named_access_agree() {
        let set = sample();
        let row = set.row(1).expect("row 1 exists");
        assert_eq!(row.get(0), Some(&Value::Integer(2)));
        assert_eq!(row.get_named("ID"), Some(&Value::Integer(2)));
        assert_eq!(row.get_named("name"), Some(&Value::Null));
        assert!(set.row(2).is_none());
    }

    #[test]
    fn typed_getters_filter_by_variant() {
        let set = sample();
        let row = set.row(0).expect("row 0 exists");
        assert_eq!(row.get_i64("id"), Some(1));
        assert_eq!(row.get_text("name"), Some("fiona"));
        assert_eq!(row.get_f64("id"), None);
    }

    #[test]
    fn iteration_preserves_order() {
        let set = sample();
        let ids: Vec<i64> = set.rows().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
