//! Farmdesk Test Utilities
//!
//! In-memory stand-ins for the outbound seams of `farmdesk-api`:
//! - [`MemoryWarehouse`]: a warehouse driver that interprets farm statements
//!   against an in-memory table and records every lifecycle step
//! - [`MemoryFileStore`]: a data lake file store with failure injection
//! - [`StaticTokenSource`] / [`FailingTokenSource`]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use farmdesk_api::storage::{FileStore, StorageError};
use farmdesk_api::token::{TokenError, TokenSource};
use farmdesk_api::warehouse::{
    ConnectionParams, WarehouseConnection, WarehouseDriver, WarehouseError, WarehouseOperation,
    WarehouseSession,
};
use farmdesk_core::{FarmField, FarmRecord, RawResult, SqlValue, Statement};
use secrecy::SecretString;
use serde_json::{json, Map, Value};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// TOKEN SOURCES
// ============================================================================

/// Always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource(pub SecretString);

impl StaticTokenSource {
    pub fn new(token: &str) -> Self {
        Self(SecretString::new(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn bearer_token(&self) -> Result<SecretString, TokenError> {
        Ok(self.0.clone())
    }
}

/// Always fails as if the token endpoint rejected the grant.
#[derive(Debug, Clone, Default)]
pub struct FailingTokenSource;

#[async_trait]
impl TokenSource for FailingTokenSource {
    async fn bearer_token(&self) -> Result<SecretString, TokenError> {
        Err(TokenError::Rejected {
            status: 401,
            payload: json!({ "error": "invalid_client" }),
        })
    }
}

// ============================================================================
// IN-MEMORY WAREHOUSE
// ============================================================================

/// Lifecycle step of a warehouse call, used for failure injection and for
/// asserting release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarehouseStep {
    Connect,
    OpenSession,
    Execute,
    Fetch,
    CloseOperation,
    CloseSession,
    CloseConnection,
}

#[derive(Debug, Default)]
struct WarehouseInner {
    rows: Vec<FarmRecord>,
    next_id: i64,
    steps: Vec<WarehouseStep>,
    statements: Vec<Statement>,
    failures: HashSet<WarehouseStep>,
    connections: Vec<ConnectionParams>,
}

/// Warehouse driver backed by an in-memory farm table.
///
/// Understands exactly the statements `farmdesk-core` builds: the connectivity check,
/// list, insert, update and delete. Identifiers are assigned from 1 upward.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<WarehouseInner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing rows; new ids continue after the largest one.
    pub fn with_rows(rows: Vec<FarmRecord>) -> Self {
        let next_id = rows.iter().filter_map(|r| r.id).max().unwrap_or(0);
        Self {
            inner: Arc::new(Mutex::new(WarehouseInner {
                rows,
                next_id,
                ..Default::default()
            })),
        }
    }

    /// Make `step` fail from now on.
    pub fn fail_at(&self, step: WarehouseStep) {
        lock(&self.inner).failures.insert(step);
    }

    pub fn rows(&self) -> Vec<FarmRecord> {
        lock(&self.inner).rows.clone()
    }

    /// Every lifecycle step attempted so far, in order.
    pub fn steps(&self) -> Vec<WarehouseStep> {
        lock(&self.inner).steps.clone()
    }

    /// Every statement submitted so far.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.inner).statements.clone()
    }

    /// Coordinates of every connection opened so far.
    pub fn connections(&self) -> Vec<ConnectionParams> {
        lock(&self.inner).connections.clone()
    }

    fn step(&self, step: WarehouseStep) -> Result<(), WarehouseError> {
        let mut inner = lock(&self.inner);
        inner.steps.push(step);
        if inner.failures.contains(&step) {
            return Err(WarehouseError::Protocol(format!("injected failure at {:?}", step)));
        }
        Ok(())
    }

    fn apply(&self, statement: &Statement) -> Result<RawResult, WarehouseError> {
        let mut inner = lock(&self.inner);
        inner.statements.push(statement.clone());

        let sql = statement.sql();
        if sql == "SELECT 1" {
            return Ok(RawResult::Tuples(vec![vec![json!(1)]]));
        }
        if sql.starts_with("SELECT") {
            let mut rows = inner.rows.clone();
            rows.sort_by_key(|r| r.id);
            return rows
                .into_iter()
                .map(|r| match serde_json::to_value(r) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(other) => Err(WarehouseError::Protocol(format!("row encoded as {}", other))),
                    Err(e) => Err(WarehouseError::Protocol(e.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RawResult::Records);
        }
        if sql.starts_with("INSERT") {
            inner.next_id += 1;
            let mut record = record_from_params(statement);
            record.id = Some(inner.next_id);
            inner.rows.push(record);
            return Ok(affected(1));
        }
        if sql.starts_with("UPDATE") {
            let id = bound_id(statement)?;
            let update = record_from_params(statement);
            let mut count = 0;
            for row in inner.rows.iter_mut().filter(|r| r.id == Some(id)) {
                *row = FarmRecord {
                    id: Some(id),
                    ..update.clone()
                };
                count += 1;
            }
            return Ok(affected(count));
        }
        if sql.starts_with("DELETE") {
            let id = bound_id(statement)?;
            let before = inner.rows.len();
            inner.rows.retain(|r| r.id != Some(id));
            return Ok(affected(before - inner.rows.len()));
        }
        Err(WarehouseError::Statement {
            state: "FAILED".to_string(),
            message: format!("unsupported statement: {}", sql),
        })
    }
}

fn affected(count: usize) -> RawResult {
    RawResult::Table {
        columns: vec!["num_affected_rows".to_string()],
        rows: vec![json!([count])],
    }
}

fn bound_id(statement: &Statement) -> Result<i64, WarehouseError> {
    match statement.param(FarmField::Id.param_name()) {
        Some(SqlValue::BigInt(Some(id))) => Ok(*id),
        other => Err(WarehouseError::Protocol(format!("missing id parameter: {:?}", other))),
    }
}

fn param_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::BigInt(Some(n)) => json!(n),
        other => other.to_wire().map(Value::String).unwrap_or(Value::Null),
    }
}

fn record_from_params(statement: &Statement) -> FarmRecord {
    let values: Map<String, Value> = FarmField::EDITABLE
        .iter()
        .filter_map(|f| {
            statement
                .param(f.param_name())
                .map(|v| (f.canonical_key().to_string(), param_json(v)))
        })
        .collect();
    FarmRecord::from_lookup(|f| values.get(f.canonical_key()))
}

#[async_trait]
impl WarehouseDriver for MemoryWarehouse {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        self.step(WarehouseStep::Connect)?;
        lock(&self.inner).connections.push(params.clone());
        Ok(Box::new(MemoryConnection(self.clone())))
    }
}

struct MemoryConnection(MemoryWarehouse);

#[async_trait]
impl WarehouseConnection for MemoryConnection {
    async fn open_session(&self) -> Result<Box<dyn WarehouseSession>, WarehouseError> {
        self.0.step(WarehouseStep::OpenSession)?;
        Ok(Box::new(MemorySession(self.0.clone())))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        self.0.step(WarehouseStep::CloseConnection)
    }
}

struct MemorySession(MemoryWarehouse);

#[async_trait]
impl WarehouseSession for MemorySession {
    async fn execute(
        &self,
        statement: &Statement,
    ) -> Result<Box<dyn WarehouseOperation>, WarehouseError> {
        self.0.step(WarehouseStep::Execute)?;
        let result = self.0.apply(statement);
        Ok(Box::new(MemoryOperation {
            warehouse: self.0.clone(),
            result: Some(result),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        self.0.step(WarehouseStep::CloseSession)
    }
}

struct MemoryOperation {
    warehouse: MemoryWarehouse,
    result: Option<Result<RawResult, WarehouseError>>,
}

#[async_trait]
impl WarehouseOperation for MemoryOperation {
    async fn fetch_all(&mut self) -> Result<RawResult, WarehouseError> {
        self.warehouse.step(WarehouseStep::Fetch)?;
        self.result
            .take()
            .unwrap_or_else(|| Err(WarehouseError::Protocol("result already fetched".to_string())))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        self.warehouse.step(WarehouseStep::CloseOperation)
    }
}

// ============================================================================
// IN-MEMORY FILE STORE
// ============================================================================

/// File store operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreStep {
    Exists,
    Create,
    Append,
    Flush,
}

#[derive(Debug, Default)]
struct StoreInner {
    file_systems: HashSet<String>,
    /// Committed content by (file system, path).
    files: HashMap<(String, String), Vec<u8>>,
    /// Appended but not yet flushed content.
    staged: HashMap<(String, String), Vec<u8>>,
    failures: HashSet<StoreStep>,
}

/// Data lake stand-in with append/flush semantics.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryFileStore {
    /// A store holding the given file-system containers.
    pub fn with_file_systems(names: &[&str]) -> Self {
        let store = Self::default();
        lock(&store.inner)
            .file_systems
            .extend(names.iter().map(|n| n.to_string()));
        store
    }

    pub fn fail_at(&self, step: StoreStep) {
        lock(&self.inner).failures.insert(step);
    }

    /// Committed content of a file, if flushed.
    pub fn file(&self, file_system: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.inner)
            .files
            .get(&(file_system.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths of every file created in `file_system`.
    pub fn paths(&self, file_system: &str) -> Vec<String> {
        let inner = lock(&self.inner);
        let mut paths: Vec<String> = inner
            .files
            .keys()
            .filter(|(fs, _)| fs == file_system)
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    fn check(&self, step: StoreStep, inner: &StoreInner) -> Result<(), StorageError> {
        if inner.failures.contains(&step) {
            return Err(StorageError::Status {
                operation: "injected",
                status: 500,
                message: format!("injected failure at {:?}", step),
            });
        }
        Ok(())
    }
}

fn not_found(operation: &'static str, path: &str) -> StorageError {
    StorageError::Status {
        operation,
        status: 404,
        message: format!("{} not found", path),
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn file_system_exists(&self, file_system: &str) -> Result<bool, StorageError> {
        let inner = lock(&self.inner);
        self.check(StoreStep::Exists, &inner)?;
        Ok(inner.file_systems.contains(file_system))
    }

    async fn create_file(&self, file_system: &str, path: &str) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        self.check(StoreStep::Create, &inner)?;
        if !inner.file_systems.contains(file_system) {
            return Err(not_found("create", file_system));
        }
        let key = (file_system.to_string(), path.to_string());
        inner.files.insert(key.clone(), Vec::new());
        inner.staged.insert(key, Vec::new());
        Ok(())
    }

    async fn append(
        &self,
        file_system: &str,
        path: &str,
        position: u64,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        self.check(StoreStep::Append, &inner)?;
        let key = (file_system.to_string(), path.to_string());
        let staged = inner
            .staged
            .get_mut(&key)
            .ok_or_else(|| not_found("append", path))?;
        if staged.len() as u64 != position {
            return Err(StorageError::Status {
                operation: "append",
                status: 400,
                message: format!("invalid position {}", position),
            });
        }
        staged.extend(data);
        Ok(())
    }

    async fn flush(&self, file_system: &str, path: &str, position: u64) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        self.check(StoreStep::Flush, &inner)?;
        let key = (file_system.to_string(), path.to_string());
        let staged = inner
            .staged
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found("flush", path))?;
        if staged.len() as u64 != position {
            return Err(StorageError::Status {
                operation: "flush",
                status: 400,
                message: format!("invalid flush position {}", position),
            });
        }
        inner.files.insert(key, staged);
        Ok(())
    }
}
