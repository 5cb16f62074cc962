//! Recording warehouse for testing
//!
//! This connection never touches a database. It records every call in
//! order, tracks which statements were committed, and keeps a rough model of
//! which tables exist so drop/create sequences can be checked. It's useful for:
//! - Verifying statement order within and across phases
//! - Injecting a failure at a chosen statement
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut warehouse = RecordingWarehouse::new().fail_on_execute(3);
//! let handle = warehouse.clone();
//! driver.run(&mut warehouse, &mut report).await.unwrap_err();
//! assert_eq!(handle.committed().await.len(), 2);
//! ```

use crate::warehouse::{Warehouse, WarehouseError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One call made against the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TestConnection,
    Execute(String),
    Commit,
    Close,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,

    /// Statements executed since the last commit
    pending: Vec<String>,

    /// Statements that were committed, in order
    committed: Vec<String>,

    /// Tables that exist after committed DDL
    tables: BTreeSet<String>,

    executions: usize,
    closed: bool,
}

/// In-memory connection that records calls
///
/// Clones share state, so a test can keep a handle while the driver owns
/// the connection.
#[derive(Debug, Clone)]
pub struct RecordingWarehouse {
    state: Arc<RwLock<State>>,

    /// 1-based execute call that fails
    fail_on_execute: Option<usize>,

    /// Fail any statement containing this text
    fail_on_match: Option<String>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Rows reported per statement
    rows_per_statement: u64,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,
}

impl RecordingWarehouse {
    /// Create a new recording warehouse with no tables
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            fail_on_execute: None,
            fail_on_match: None,
            fail_connection: false,
            rows_per_statement: 0,
            latency_ms: 0,
        }
    }

    /// Fail the `n`th execute call (1-based, counted across the whole run)
    pub fn fail_on_execute(mut self, n: usize) -> Self {
        self.fail_on_execute = Some(n);
        self
    }

    /// Fail every statement whose SQL contains `pattern`
    pub fn fail_on_match(mut self, pattern: impl Into<String>) -> Self {
        self.fail_on_match = Some(pattern.into());
        self
    }

    /// Configure to fail connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Rows each statement reports as affected
    pub fn with_rows_per_statement(mut self, rows: u64) -> Self {
        self.rows_per_statement = rows;
        self
    }

    /// Configure simulated latency for every call
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Start with tables already present
    pub async fn with_tables(self, tables: &[&str]) -> Self {
        {
            let mut state = self.state.write().await;
            state.tables.extend(tables.iter().map(|t| t.to_string()));
        }
        self
    }

    /// Every call, in order
    pub async fn events(&self) -> Vec<Event> {
        self.state.read().await.events.clone()
    }

    /// SQL of every execute call that reached the connection, in order
    pub async fn executed(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statements that were committed, in order
    pub async fn committed(&self) -> Vec<String> {
        self.state.read().await.committed.clone()
    }

    /// Tables present after committed DDL
    pub async fn existing_tables(&self) -> Vec<String> {
        self.state.read().await.tables.iter().cloned().collect()
    }

    /// Whether `close` was called
    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for RecordingWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a committed DDL statement to the table model
///
/// Only the statement shapes the loader emits are understood; anything else
/// leaves the model unchanged.
fn apply_ddl(tables: &mut BTreeSet<String>, sql: &str) -> Result<(), String> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    let upper: Vec<String> = words.iter().take(5).map(|w| w.to_ascii_uppercase()).collect();
    let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

    let name = |i: usize| -> String {
        words
            .get(i)
            .map(|w| w.trim_end_matches(|c| c == ';' || c == '(').to_string())
            .unwrap_or_default()
    };

    match upper.as_slice() {
        ["DROP", "TABLE", "IF", "EXISTS", ..] => {
            tables.remove(&name(4));
        }
        ["DROP", "TABLE", ..] => {
            let table = name(2);
            if !tables.remove(&table) {
                return Err(format!("table \"{}\" does not exist", table));
            }
        }
        ["CREATE", "TABLE", "IF", "NOT", "EXISTS"] => {
            tables.insert(name(5));
        }
        ["CREATE", "TABLE", ..] => {
            let table = name(2);
            if !tables.insert(table.clone()) {
                return Err(format!("relation \"{}\" already exists", table));
            }
        }
        _ => {}
    }

    Ok(())
}

#[async_trait::async_trait]
impl Warehouse for RecordingWarehouse {
    fn name(&self) -> &'static str {
        "Recording"
    }

    async fn test_connection(&mut self) -> Result<(), WarehouseError> {
        self.simulate_latency().await;
        self.state.write().await.events.push(Event::TestConnection);

        if self.fail_connection {
            Err(WarehouseError::connection("recording", "Simulated connection failure"))
        } else {
            Ok(())
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(WarehouseError::Closed);
        }

        state.executions += 1;
        state.events.push(Event::Execute(sql.to_string()));

        if self.fail_on_execute == Some(state.executions) {
            state.pending.clear();
            return Err(WarehouseError::execution(format!(
                "Simulated failure on statement {}",
                state.executions
            )));
        }
        if let Some(pattern) = &self.fail_on_match {
            if sql.contains(pattern.as_str()) {
                state.pending.clear();
                return Err(WarehouseError::execution(format!(
                    "Simulated failure on statement matching '{}'",
                    pattern
                )));
            }
        }

        // DDL takes effect on commit, but a duplicate CREATE fails right away
        let mut preview = state.tables.clone();
        for pending in &state.pending {
            let _ = apply_ddl(&mut preview, pending);
        }
        if let Err(message) = apply_ddl(&mut preview, sql) {
            state.pending.clear();
            return Err(WarehouseError::execution(message));
        }

        state.pending.push(sql.to_string());
        Ok(self.rows_per_statement)
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(WarehouseError::Closed);
        }
        state.events.push(Event::Commit);

        let pending = std::mem::take(&mut state.pending);
        for sql in pending {
            let _ = apply_ddl(&mut state.tables, &sql);
            state.committed.push(sql);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        let mut state = self.state.write().await;
        state.events.push(Event::Close);
        state.pending.clear();
        state.closed = true;
        Ok(())
    }
}
