//! Warehouse result normalization.
//!
//! Warehouse drivers hand back tabular results in one of three encodings.
//! [`RawResult::classify`] turns an arbitrary JSON value into a tagged union
//! once, at the driver boundary; [`normalize`] maps any variant onto
//! canonical [`FarmRecord`]s.
//!
//! Equivalent data in any encoding yields identical records.

use serde_json::{Map, Value};

use crate::farm::{lookup_keyed, FarmField, FarmRecord};

/// A tabular result in one of the recognized encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Sequence of key/value rows.
    Records(Vec<Map<String, Value>>),
    /// Sequence of positional rows in [`FarmField::ALL`] order.
    Tuples(Vec<Vec<Value>>),
    /// Column names plus rows; rows are positional against `columns` or
    /// key/value.
    Table { columns: Vec<String>, rows: Vec<Value> },
    /// Anything else. Carries a short description of what was seen.
    Unrecognized(String),
}

impl RawResult {
    /// Classify a JSON value into one of the recognized encodings.
    ///
    /// An empty array is an empty `Records`. A `Table` is an object with a
    /// `columns` array (names, or objects with a `name`) and a `rows` array.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => classify_sequence(items),
            Value::Object(mut map) => {
                let columns = map.remove("columns");
                let rows = map.remove("rows");
                match (columns, rows) {
                    (Some(Value::Array(columns)), Some(Value::Array(rows))) => {
                        match column_names(&columns) {
                            Some(columns) => RawResult::Table { columns, rows },
                            None => RawResult::Unrecognized(
                                "columns list contains unnamed entries".to_string(),
                            ),
                        }
                    }
                    _ => RawResult::Unrecognized("object without columns/rows".to_string()),
                }
            }
            other => RawResult::Unrecognized(format!("{} value", json_kind(&other))),
        }
    }

    /// Number of rows carried, zero for unrecognized results.
    pub fn row_count(&self) -> usize {
        match self {
            RawResult::Records(rows) => rows.len(),
            RawResult::Tuples(rows) => rows.len(),
            RawResult::Table { rows, .. } => rows.len(),
            RawResult::Unrecognized(_) => 0,
        }
    }

    /// Render as plain JSON for diagnostic responses.
    pub fn to_json(&self) -> Value {
        match self {
            RawResult::Records(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect())
            }
            RawResult::Tuples(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Array).collect())
            }
            RawResult::Table { columns, rows } => serde_json::json!({
                "columns": columns,
                "rows": rows,
            }),
            RawResult::Unrecognized(_) => Value::Null,
        }
    }
}

fn classify_sequence(items: Vec<Value>) -> RawResult {
    if items.iter().all(Value::is_object) {
        let rows = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        return RawResult::Records(rows);
    }
    if items.iter().all(Value::is_array) {
        let rows = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Array(values) => Some(values),
                _ => None,
            })
            .collect();
        return RawResult::Tuples(rows);
    }
    RawResult::Unrecognized("array of mixed rows".to_string())
}

fn column_names(columns: &[Value]) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|column| match column {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Map a raw result onto canonical farm records, preserving row order.
///
/// Unrecognized results produce an empty list and a warning.
pub fn normalize(raw: &RawResult) -> Vec<FarmRecord> {
    match raw {
        RawResult::Records(rows) => rows
            .iter()
            .map(|row| FarmRecord::from_lookup(|field| lookup_keyed(row, field)))
            .collect(),
        RawResult::Tuples(rows) => rows
            .iter()
            .map(|row| {
                FarmRecord::from_lookup(|field| {
                    row.get(field.position()).filter(|v| !v.is_null())
                })
            })
            .collect(),
        RawResult::Table { columns, rows } => normalize_table(columns, rows),
        RawResult::Unrecognized(shape) => {
            tracing::warn!(shape = %shape, "Unrecognized warehouse result shape, returning no rows");
            Vec::new()
        }
    }
}

fn normalize_table(columns: &[String], rows: &[Value]) -> Vec<FarmRecord> {
    let index_of = |key: &str| columns.iter().position(|c| c == key);
    let indexes: Vec<(Option<usize>, Option<usize>)> = FarmField::ALL
        .iter()
        .map(|field| (index_of(field.canonical_key()), index_of(field.fallback_key())))
        .collect();

    rows.iter()
        .filter_map(|row| match row {
            Value::Array(values) => Some(FarmRecord::from_lookup(|field| {
                let (primary, fallback) = indexes[field.position()];
                let at = |idx: Option<usize>| {
                    idx.and_then(|i| values.get(i)).filter(|v| !v.is_null())
                };
                at(primary).or_else(|| at(fallback))
            })),
            Value::Object(map) => Some(FarmRecord::from_lookup(|field| lookup_keyed(map, field))),
            other => {
                tracing::warn!(kind = json_kind(other), "Skipping table row that is neither array nor object");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::json;

    fn canonical_columns() -> Vec<String> {
        FarmField::ALL
            .iter()
            .map(|f| f.canonical_key().to_string())
            .collect()
    }

    fn sample_tuple() -> Vec<Value> {
        vec![
            json!("1"),
            json!("Farm A"),
            json!("Seoul"),
            json!("gold"),
            json!("5"),
            json!("Kim"),
            json!("Feedco"),
            json!(7),
            json!("Lee"),
            json!("active"),
            json!("2024-01-01"),
            Value::Null,
        ]
    }

    fn as_record_row(values: &[Value]) -> Map<String, Value> {
        FarmField::ALL
            .iter()
            .zip(values)
            .map(|(f, v)| (f.canonical_key().to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_classify_each_shape() {
        assert!(matches!(
            RawResult::classify(json!([{"농장ID": 1}])),
            RawResult::Records(rows) if rows.len() == 1
        ));
        assert!(matches!(
            RawResult::classify(json!([[1, "a"]])),
            RawResult::Tuples(rows) if rows.len() == 1
        ));
        assert!(matches!(
            RawResult::classify(json!({"columns": [{"name": "농장ID"}], "rows": [[1]]})),
            RawResult::Table { columns, .. } if columns == vec!["농장ID".to_string()]
        ));
        assert_eq!(RawResult::classify(json!([])), RawResult::Records(vec![]));
    }

    #[test]
    fn test_unrecognized_shapes_normalize_to_empty() {
        for value in [json!("text"), json!(42), json!({"rows": []}), json!([1, [2]])] {
            let raw = RawResult::classify(value);
            assert!(matches!(raw, RawResult::Unrecognized(_)));
            assert!(normalize(&raw).is_empty());
        }
    }

    #[test]
    fn test_tuple_row_maps_by_position() {
        let records = normalize(&RawResult::Tuples(vec![sample_tuple()]));
        assert_eq!(records.len(), 1);
        let farm = &records[0];
        assert_eq!(farm.id, Some(1));
        assert_eq!(farm.region.as_deref(), Some("Seoul"));
        assert_eq!(farm.owner_id, Some(5));
        assert_eq!(farm.manager_id, Some(7));
        assert_eq!(farm.contract_start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(farm.contract_end, None);
    }

    #[test]
    fn test_short_tuple_fills_missing_with_none() {
        let records = normalize(&RawResult::Tuples(vec![vec![json!(4), json!("Only name")]]));
        assert_eq!(records[0].id, Some(4));
        assert_eq!(records[0].name.as_deref(), Some("Only name"));
        assert_eq!(records[0].contract_status, None);
    }

    #[test]
    fn test_records_fall_back_to_english_keys() {
        let raw = RawResult::classify(json!([{
            "id": 9,
            "name": "Green",
            "feedCompany": "Feedco",
            "contractEnd": "2025-12-31T00:00:00Z"
        }]));
        let farm = &normalize(&raw)[0];
        assert_eq!(farm.id, Some(9));
        assert_eq!(farm.name.as_deref(), Some("Green"));
        assert_eq!(farm.feed_company.as_deref(), Some("Feedco"));
        assert_eq!(farm.contract_end, NaiveDate::from_ymd_opt(2025, 12, 31));
    }

    #[test]
    fn test_table_with_english_and_reordered_columns() {
        let raw = RawResult::Table {
            columns: vec!["region".to_string(), "농장ID".to_string()],
            rows: vec![json!(["Daegu", "11"])],
        };
        let farm = &normalize(&raw)[0];
        assert_eq!(farm.id, Some(11));
        assert_eq!(farm.region.as_deref(), Some("Daegu"));
        assert_eq!(farm.name, None);
    }

    #[test]
    fn test_row_order_is_preserved() {
        let rows = (1..=5).map(|i| vec![json!(i)]).collect();
        let ids: Vec<_> = normalize(&RawResult::Tuples(rows))
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, (1..=5).map(Some).collect::<Vec<_>>());
    }

    fn cell() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-zA-Z' ]{0,12}".prop_map(Value::String),
            (2000i32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| json!(format!("{y:04}-{m:02}-{d:02}"))),
        ]
    }

    proptest! {
        #[test]
        fn prop_shape_independence(rows in prop::collection::vec(prop::collection::vec(cell(), 12), 0..8)) {
            let tuples = normalize(&RawResult::Tuples(rows.clone()));
            let records = normalize(&RawResult::Records(
                rows.iter().map(|r| as_record_row(r)).collect(),
            ));
            let table = normalize(&RawResult::Table {
                columns: canonical_columns(),
                rows: rows.iter().cloned().map(Value::Array).collect(),
            });

            prop_assert_eq!(&tuples, &records);
            prop_assert_eq!(&tuples, &table);
            prop_assert_eq!(tuples.len(), rows.len());
        }
    }
}
