/// Row decoding.
///
/// A joined SELECT returns the table's columns, the `__divider` column, then
/// the joined table's columns. The decoder walks the result columns once,
/// switching from the primary section to a joined section at each divider.
use super::driver::ResultSet;
use super::query::DIVIDER;
use crate::core::value::{Row, Value};
use crate::core::{MapperError, Result};
use std::mem;

/// One joined section of a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSlot {
    /// Key the nested row is stored under
    pub alias: String,
    /// For a LEFT JOIN, the joined table's primary-key column; a NULL there
    /// means no match and the section decodes to `None`
    pub null_key: Option<String>,
}

enum DecodeState {
    Primary,
    Joined { slot: usize, row: Row, matched: bool },
}

#[derive(Debug, Clone, Default)]
pub struct RowDecoder {
    slots: Vec<JoinSlot>,
}

impl RowDecoder {
    /// Decoder for results without joins
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: Vec<JoinSlot>) -> Self {
        RowDecoder { slots }
    }

    pub fn decode(&self, columns: &[String], values: Vec<Value>) -> Result<Row> {
        if columns.len() != values.len() {
            return Err(MapperError::Query(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }

        let mut out = Row::new();
        let mut state = DecodeState::Primary;
        let mut next_slot = 0;

        for (name, value) in columns.iter().zip(values) {
            if name == DIVIDER {
                self.finish(&mut out, mem::replace(&mut state, DecodeState::Primary));
                if next_slot >= self.slots.len() {
                    return Err(MapperError::Query(
                        "result has more join sections than the query declared".to_string(),
                    ));
                }
                state = DecodeState::Joined {
                    slot: next_slot,
                    row: Row::new(),
                    matched: true,
                };
                next_slot += 1;
                continue;
            }

            match &mut state {
                DecodeState::Primary => out.insert(name.as_str(), value),
                DecodeState::Joined { slot, row, matched } => {
                    if value.is_null() && self.slots[*slot].null_key.as_deref() == Some(name) {
                        *matched = false;
                    }
                    row.insert(name.as_str(), value);
                }
            }
        }
        self.finish(&mut out, state);
        Ok(out)
    }

    fn finish(&self, out: &mut Row, state: DecodeState) {
        if let DecodeState::Joined { slot, row, matched } = state {
            let alias = self.slots[slot].alias.clone();
            out.insert_joined(alias, if matched { Some(row) } else { None });
        }
    }

    pub fn decode_all(&self, result: ResultSet) -> Result<Vec<Row>> {
        let columns = result.columns;
        result
            .rows
            .into_iter()
            .map(|values| self.decode(&columns, values))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn left_slot() -> RowDecoder {
        RowDecoder::with_slots(vec![JoinSlot {
            alias: "b".to_string(),
            null_key: Some("id".to_string()),
        }])
    }

    #[test]
    fn test_plain_rows_keep_column_order() {
        let row = RowDecoder::plain()
            .decode(&columns(&["id", "name"]), vec![Value::from(1), Value::from("x")])
            .unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_joined_section_is_nested() {
        let cols = columns(&["id", "book_id", DIVIDER, "id", "name"]);
        let row = left_slot()
            .decode(
                &cols,
                vec![
                    Value::from(10),
                    Value::from(1),
                    Value::from(""),
                    Value::from(1),
                    Value::from("ubuntu"),
                ],
            )
            .unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(10)));
        let book = row.joined("b").unwrap().unwrap();
        assert_eq!(book.get("name"), Some(&Value::from("ubuntu")));
        assert_eq!(book.get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_null_key_decodes_to_none() {
        let cols = columns(&["id", "book_id", DIVIDER, "id", "name"]);
        let row = left_slot()
            .decode(
                &cols,
                vec![Value::from(11), Value::from(99), Value::from(""), Value::Null, Value::Null],
            )
            .unwrap();
        assert_eq!(row.joined("b"), Some(None));
        assert_eq!(row.to_json().unwrap()["b"], serde_json::Value::Null);
    }

    #[test]
    fn test_slot_without_key_stays_a_mapping() {
        let decoder = RowDecoder::with_slots(vec![JoinSlot {
            alias: "b".to_string(),
            null_key: None,
        }]);
        let cols = columns(&["id", DIVIDER, "name"]);
        let row = decoder
            .decode(&cols, vec![Value::from(1), Value::from(""), Value::Null])
            .unwrap();
        assert_eq!(row.joined("b").unwrap().unwrap().get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_unexpected_divider_is_an_error() {
        let cols = columns(&["id", DIVIDER, "name"]);
        let err = RowDecoder::plain()
            .decode(&cols, vec![Value::from(1), Value::from(""), Value::Null])
            .unwrap_err();
        assert!(matches!(err, MapperError::Query(_)));
    }

    #[test]
    fn test_decode_all() {
        let result = ResultSet {
            columns: columns(&["v"]),
            rows: vec![vec![Value::from(1)], vec![Value::from(2)]],
            rowcount: 2,
            last_insert_id: None,
        };
        let rows = RowDecoder::plain().decode_all(result).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("v"), Some(&Value::Integer(2)));
    }
}
