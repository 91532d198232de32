//! Mock sessions and connectors for testing.
//!
//! Provides in-memory sessions that return predefined results, and
//! connectors that record which backend family was asked to connect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    BackendFamily, ConnectionHandle, CursorSession, Record, RecordSession, SourceType,
    TabularResult,
};
use crate::connection::{BackendConnector, HostList, SourceDescriptor, WideColumnConnector};
use crate::error::{ExtractError, Result};

/// A cursor session that replays queued results, then returns empty tables.
pub struct MockCursorSession {
    label: String,
    responses: VecDeque<std::result::Result<TabularResult, String>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockCursorSession {
    /// Creates a session with no queued responses.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            responses: VecDeque::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a successful result.
    pub fn with_result(mut self, result: TabularResult) -> Self {
        self.responses.push_back(Ok(result));
        self
    }

    /// Queues a backend failure with the given diagnostic.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.responses.push_back(Err(message.into()));
        self
    }

    /// Shared log of every query text this session received.
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

#[async_trait]
impl CursorSession for MockCursorSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        match self.responses.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(ExtractError::query(&self.label, message)),
            None => Ok(TabularResult::new()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A wide-column session that returns a fixed record list for every query.
pub struct MockRecordSession {
    records: Vec<Record>,
    error: Option<String>,
}

impl MockRecordSession {
    /// Creates a session returning the given records.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            error: None,
        }
    }

    /// Creates a session whose every query fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl RecordSession for MockRecordSession {
    async fn fetch_records(&mut self, _query: &str) -> Result<Vec<Record>> {
        match &self.error {
            Some(message) => Err(ExtractError::query("cassandra", message)),
            None => Ok(self.records.clone()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Records which families were asked to connect.
#[derive(Default)]
pub struct RecordingConnector {
    calls: Arc<Mutex<Vec<BackendFamily>>>,
}

impl RecordingConnector {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector for `family` that succeeds with a mock cursor session.
    pub fn for_family(&self, family: BackendFamily) -> FamilyConnector {
        FamilyConnector {
            family,
            calls: Arc::clone(&self.calls),
            failure: None,
        }
    }

    /// A connector for `family` that fails with the given diagnostic.
    pub fn failing(&self, family: BackendFamily, message: impl Into<String>) -> FamilyConnector {
        FamilyConnector {
            family,
            calls: Arc::clone(&self.calls),
            failure: Some(message.into()),
        }
    }

    /// Families invoked so far, in call order.
    pub fn calls(&self) -> Vec<BackendFamily> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// A connector for one family that logs each invocation.
pub struct FamilyConnector {
    family: BackendFamily,
    calls: Arc<Mutex<Vec<BackendFamily>>>,
    failure: Option<String>,
}

#[async_trait]
impl BackendConnector for FamilyConnector {
    fn family(&self) -> BackendFamily {
        self.family
    }

    async fn connect(
        &self,
        source_type: SourceType,
        _descriptor: &SourceDescriptor,
    ) -> Result<ConnectionHandle> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(self.family);
        }
        if let Some(message) = &self.failure {
            return Err(ExtractError::connection(source_type.as_str(), message));
        }
        Ok(ConnectionHandle::cursor(
            source_type.as_str(),
            self.family,
            Box::new(MockCursorSession::new(source_type.as_str())),
        ))
    }
}

/// Wide-column connector that logs each invocation.
#[derive(Default)]
pub struct RecordingWideColumnConnector {
    calls: Mutex<Vec<Option<String>>>,
    records: Vec<Record>,
}

impl RecordingWideColumnConnector {
    /// Creates a connector whose sessions return no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector whose sessions return `records`.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            records,
        }
    }

    /// Number of connection attempts.
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Keyspace requested by the most recent attempt.
    pub fn last_keyspace(&self) -> Option<String> {
        self.calls
            .lock()
            .ok()
            .and_then(|c| c.last().cloned())
            .flatten()
    }
}

#[async_trait]
impl WideColumnConnector for RecordingWideColumnConnector {
    async fn connect(&self, _hosts: &HostList, keyspace: Option<&str>) -> Result<ConnectionHandle> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(keyspace.map(String::from));
        }
        Ok(ConnectionHandle::wide_column(
            "cassandra",
            Box::new(MockRecordSession::new(self.records.clone())),
        ))
    }
}
