//! Parameterized warehouse statements for farm CRUD.
//!
//! Values never appear in SQL text. Each statement carries named parameters
//! (`:name` markers) with an explicit SQL type; a `None` value binds NULL.
//! Only the table identifier is interpolated, and [`TableName`] restricts it
//! to plain dotted identifiers.

use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::farm::{FarmField, FarmInput};

static TABLE_NAME: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$")
});

/// Validated `[catalog.][schema.]table` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> CoreResult<Self> {
        let name = name.trim();
        let valid = match TABLE_NAME.as_ref() {
            Ok(re) => re.is_match(name),
            Err(_) => false,
        };
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(CoreError::InvalidTableName {
                name: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    String(Option<String>),
    BigInt(Option<i64>),
    Date(Option<NaiveDate>),
}

impl SqlValue {
    /// SQL type name sent alongside the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::String(_) => "STRING",
            SqlValue::BigInt(_) => "BIGINT",
            SqlValue::Date(_) => "DATE",
        }
    }

    /// String rendering of the value, `None` for NULL.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            SqlValue::String(v) => v.clone(),
            SqlValue::BigInt(v) => v.map(|n| n.to_string()),
            SqlValue::Date(v) => v.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::String(v) => v.is_none(),
            SqlValue::BigInt(v) => v.is_none(),
            SqlValue::Date(v) => v.is_none(),
        }
    }
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlParam {
    pub name: &'static str,
    pub value: SqlValue,
}

/// One warehouse statement: SQL text plus bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &'static str, value: SqlValue) -> Self {
        self.params.push(SqlParam { name, value });
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Look up a bound parameter by name.
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

fn quoted(field: FarmField) -> String {
    format!("`{}`", field.canonical_key())
}

fn input_value(input: &FarmInput, field: FarmField) -> SqlValue {
    match field {
        FarmField::Id => SqlValue::BigInt(None),
        FarmField::Name => SqlValue::String(input.name.clone()),
        FarmField::Region => SqlValue::String(input.region.clone()),
        FarmField::Badge => SqlValue::String(input.badge.clone()),
        FarmField::OwnerId => SqlValue::BigInt(input.owner_id),
        FarmField::Owner => SqlValue::String(input.owner.clone()),
        FarmField::FeedCompany => SqlValue::String(input.feed_company.clone()),
        FarmField::ManagerId => SqlValue::BigInt(input.manager_id),
        FarmField::Manager => SqlValue::String(input.manager.clone()),
        FarmField::ContractStatus => SqlValue::String(input.contract_status.clone()),
        FarmField::ContractStart => SqlValue::Date(input.contract_start),
        FarmField::ContractEnd => SqlValue::Date(input.contract_end),
    }
}

fn bind_input(statement: Statement, input: &FarmInput) -> Statement {
    FarmField::EDITABLE.iter().fold(statement, |stmt, &field| {
        stmt.bind(field.param_name(), input_value(input, field))
    })
}

/// Connectivity check used by the diagnostic endpoint.
pub fn connectivity_check() -> Statement {
    Statement::new("SELECT 1")
}

/// All farms ordered by identifier.
pub fn list_farms(table: &TableName) -> Statement {
    Statement::new(format!(
        "SELECT * FROM {table} ORDER BY {} ASC",
        quoted(FarmField::Id)
    ))
}

/// Insert one farm; the identifier is assigned by the warehouse.
pub fn insert_farm(table: &TableName, input: &FarmInput) -> Statement {
    let columns: Vec<String> = FarmField::EDITABLE.iter().map(|f| quoted(*f)).collect();
    let markers: Vec<String> = FarmField::EDITABLE
        .iter()
        .map(|f| format!(":{}", f.param_name()))
        .collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        markers.join(", ")
    );
    bind_input(Statement::new(sql), input)
}

/// Overwrite every editable field of the farm with identifier `id`.
pub fn update_farm(table: &TableName, id: i64, input: &FarmInput) -> Statement {
    let assignments: Vec<String> = FarmField::EDITABLE
        .iter()
        .map(|f| format!("{} = :{}", quoted(*f), f.param_name()))
        .collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE {} = :{}",
        assignments.join(", "),
        quoted(FarmField::Id),
        FarmField::Id.param_name()
    );
    bind_input(Statement::new(sql), input)
        .bind(FarmField::Id.param_name(), SqlValue::BigInt(Some(id)))
}

/// Delete the farm with identifier `id`. Deleting a missing id affects no rows.
pub fn delete_farm(table: &TableName, id: i64) -> Statement {
    Statement::new(format!(
        "DELETE FROM {table} WHERE {} = :{}",
        quoted(FarmField::Id),
        FarmField::Id.param_name()
    ))
    .bind(FarmField::Id.param_name(), SqlValue::BigInt(Some(id)))
}
