// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error and discrepancy monitor
//!
//! An explicitly constructed aggregator shared by everything that runs during
//! an export. Keeps a bounded ring of recent errors, a map of discrepancies
//! keyed by `(code, schema version)` and the set of codes seen recurring.

use crate::traits::ConversionResult;
use crate::validation::{Severity, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Entries scanned when checking for a recurring code
pub const RECURRING_WINDOW: usize = 100;

/// Matches within the window that make a code recurring
pub const RECURRING_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Schema,
    Migration,
    Conversion,
    Storage,
    Unknown,
}

impl ErrorCategory {
    /// Classify by substrings of the code, then the message
    pub fn classify(code: &str, message: &str) -> Self {
        let code = code.to_ascii_uppercase();
        let message = message.to_ascii_lowercase();
        if code.contains("MIGRATION") || message.contains("migrat") {
            Self::Migration
        } else if ["EXPORT", "CONVERSION", "FILE", "FENCE", "SIDECAR"]
            .iter()
            .any(|s| code.contains(s))
        {
            Self::Conversion
        } else if code.contains("SCHEMA") || code.contains("_VERSION") {
            Self::Schema
        } else if [
            "METADATA",
            "ATTRIBUTE",
            "UNKNOWN",
            "ROOT",
            "STRUCTURE",
            "CIRCULAR",
            "LARGE",
            "MALFORMED",
        ]
        .iter()
        .any(|s| code.contains(s))
        {
            Self::Validation
        } else if code.contains("FETCH") || message.contains("fetch") || message.contains("store") {
            Self::Storage
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscrepancyType {
    MissingField,
    UnknownType,
    SchemaMismatch,
    StructuralError,
    SizeLimit,
    OutputIntegrity,
    Other,
}

impl DiscrepancyType {
    pub fn classify(code: &str) -> Self {
        let code = code.to_ascii_uppercase();
        if code.contains("MISSING") {
            Self::MissingField
        } else if code.contains("UNKNOWN") {
            Self::UnknownType
        } else if code.contains("SCHEMA") || code.contains("_VERSION") {
            Self::SchemaMismatch
        } else if code.contains("LARGE") || code.contains("SIZE") {
            Self::SizeLimit
        } else if ["STRUCTURE", "ROOT", "CIRCULAR", "MALFORMED"]
            .iter()
            .any(|s| code.contains(s))
        {
            Self::StructuralError
        } else if ["EXPORT", "FILE", "FENCE", "SIDECAR"]
            .iter()
            .any(|s| code.contains(s))
        {
            Self::OutputIntegrity
        } else {
            Self::Other
        }
    }

    pub const fn remediation(&self) -> &'static str {
        match self {
            Self::MissingField => "Fill in the missing attributes or metadata fields at the source",
            Self::UnknownType => "Register the type in the schema or add a migration that replaces it",
            Self::SchemaMismatch => "Add a migration step covering this schema version",
            Self::StructuralError => "Repair the document tree before exporting",
            Self::SizeLimit => "Split the document into smaller pages",
            Self::OutputIntegrity => "Inspect the converter for this format",
            Self::Other => "Inspect the sample message",
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub category: ErrorCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

/// Aggregate of one `(code, schema version)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    pub error_code: String,
    pub schema_version: String,
    pub occurrences: u64,
    pub severity: Severity,
    pub discrepancy_type: DiscrepancyType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sample_message: String,
    pub remediation: String,
}

/// Input to [`ErrorMonitor::log_error`]
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub document_id: Option<String>,
    pub schema_version: Option<String>,
    pub context: Map<String, Value>,
}

impl ErrorEvent {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            document_id: None,
            schema_version: None,
            context: Map::new(),
        }
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Read filter for [`ErrorMonitor::recent`]
#[derive(Debug, Clone, Default)]
pub struct ErrorFilter {
    pub severity: Option<Severity>,
    pub category: Option<ErrorCategory>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Read filter for [`ErrorMonitor::discrepancies_matching`]
#[derive(Debug, Clone, Default)]
pub struct DiscrepancyFilter {
    /// Lowest severity to include
    pub min_severity: Option<Severity>,
    pub discrepancy_type: Option<DiscrepancyType>,
    pub schema_version: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSummary {
    /// Entries still in the ring
    pub retained: usize,
    /// Entries ever logged, including evicted ones
    pub total_logged: u64,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub discrepancies: usize,
    pub recurring_codes: Vec<String>,
}

#[derive(Default)]
struct MonitorState {
    logs: VecDeque<ErrorLog>,
    next_id: u64,
    discrepancies: HashMap<(String, String), DiscrepancyReport>,
    recurring: BTreeSet<String>,
}

/// Thread-safe aggregator; share it by reference or `Arc`
pub struct ErrorMonitor {
    capacity: usize,
    state: Mutex<MonitorState>,
}

impl ErrorMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        // A panic while holding the lock leaves the state usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and return its id
    pub fn log_error(&self, event: ErrorEvent) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;

        let category = ErrorCategory::classify(&event.code, &event.message);
        tracing::debug!(
            id,
            code = %event.code,
            severity = event.severity.as_str(),
            document_id = event.document_id.as_deref().unwrap_or("-"),
            "error logged"
        );
        state.logs.push_back(ErrorLog {
            id,
            timestamp: Utc::now(),
            code: event.code.clone(),
            message: event.message,
            severity: event.severity,
            category,
            document_id: event.document_id,
            schema_version: event.schema_version,
            context: event.context,
        });
        while state.logs.len() > self.capacity {
            state.logs.pop_front();
        }

        let matches = state
            .logs
            .iter()
            .rev()
            .take(RECURRING_WINDOW)
            .filter(|log| log.code == event.code)
            .count();
        if matches >= RECURRING_THRESHOLD && state.recurring.insert(event.code.clone()) {
            tracing::warn!(
                code = %event.code,
                matches,
                window = RECURRING_WINDOW,
                "recurring error detected"
            );
        }
        id
    }

    /// Record a validation outcome: errors go to the log, everything to the
    /// discrepancy map
    pub fn log_validation(
        &self,
        result: &ValidationResult,
        document_id: Option<&str>,
        schema_version: &str,
    ) {
        for error in &result.errors {
            let mut event = ErrorEvent::new(error.code.as_str(), &error.message, error.severity)
                .schema_version(schema_version);
            if let Some(id) = document_id {
                event = event.document(id);
            }
            if let Some(context) = &error.context {
                event.context = context.clone();
            }
            self.log_error(event);
        }

        let mut state = self.state();
        let now = Utc::now();
        let issues = result
            .errors
            .iter()
            .map(|e| (e.code.as_str(), e.message.as_str(), e.severity))
            .chain(
                result
                    .warnings
                    .iter()
                    .map(|w| (w.code.as_str(), w.message.as_str(), Severity::Low)),
            );
        for (code, message, severity) in issues {
            let key = (code.to_string(), schema_version.to_string());
            let report = state.discrepancies.entry(key).or_insert_with(|| {
                let discrepancy_type = DiscrepancyType::classify(code);
                DiscrepancyReport {
                    error_code: code.to_string(),
                    schema_version: schema_version.to_string(),
                    occurrences: 0,
                    severity,
                    discrepancy_type,
                    first_seen: now,
                    last_seen: now,
                    sample_message: message.to_string(),
                    remediation: discrepancy_type.remediation().to_string(),
                }
            });
            report.occurrences += 1;
            report.last_seen = now;
            report.severity = report.severity.max(severity);
        }
    }

    /// Record a failed conversion; successful results are ignored
    pub fn log_conversion(&self, result: &ConversionResult, document_id: Option<&str>) {
        if result.success {
            return;
        }
        let format = result
            .format()
            .map_or_else(|| "unknown".to_string(), |f| f.to_string());
        let mut event = ErrorEvent::new(
            "CONVERSION_FAILED",
            result.warnings().join("; "),
            Severity::High,
        )
        .context("format", format)
        .context("fallbackFiles", result.files.len());
        if let Some(id) = document_id {
            event = event.document(id);
        }
        self.log_error(event);
    }

    /// Entries matching `filter`, oldest first
    pub fn recent(&self, filter: &ErrorFilter) -> Vec<ErrorLog> {
        let state = self.state();
        let matching: Vec<ErrorLog> = state
            .logs
            .iter()
            .filter(|log| filter.severity.map_or(true, |s| log.severity == s))
            .filter(|log| filter.category.map_or(true, |c| log.category == c))
            .filter(|log| filter.since.map_or(true, |t| log.timestamp >= t))
            .cloned()
            .collect();
        match filter.limit {
            Some(limit) if matching.len() > limit => matching[matching.len() - limit..].to_vec(),
            _ => matching,
        }
    }

    /// Discrepancies, most frequent first
    pub fn discrepancies(&self) -> Vec<DiscrepancyReport> {
        self.discrepancies_matching(&DiscrepancyFilter::default())
    }

    /// Discrepancies matching `filter`, most frequent first
    pub fn discrepancies_matching(&self, filter: &DiscrepancyFilter) -> Vec<DiscrepancyReport> {
        let mut reports: Vec<_> = self
            .state()
            .discrepancies
            .values()
            .filter(|r| filter.min_severity.map_or(true, |s| r.severity >= s))
            .filter(|r| filter.discrepancy_type.map_or(true, |t| r.discrepancy_type == t))
            .filter(|r| {
                filter
                    .schema_version
                    .as_ref()
                    .map_or(true, |v| &r.schema_version == v)
            })
            .cloned()
            .collect();
        reports.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.error_code.cmp(&b.error_code))
                .then_with(|| a.schema_version.cmp(&b.schema_version))
        });
        if let Some(limit) = filter.limit {
            reports.truncate(limit);
        }
        reports
    }

    pub fn recurring_issues(&self) -> Vec<String> {
        self.state().recurring.iter().cloned().collect()
    }

    pub fn summary(&self) -> MonitorSummary {
        let state = self.state();
        let mut summary = MonitorSummary {
            retained: state.logs.len(),
            total_logged: state.next_id,
            discrepancies: state.discrepancies.len(),
            recurring_codes: state.recurring.iter().cloned().collect(),
            ..MonitorSummary::default()
        };
        for log in &state.logs {
            *summary.by_severity.entry(log.severity).or_default() += 1;
            *summary.by_category.entry(log.category).or_default() += 1;
        }
        summary
    }

    /// Drop discrepancies not seen since `older_than`; returns how many
    pub fn prune_discrepancies(&self, older_than: DateTime<Utc>) -> usize {
        let mut state = self.state();
        let before = state.discrepancies.len();
        state
            .discrepancies
            .retain(|_, report| report.last_seen >= older_than);
        before - state.discrepancies.len()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.logs.clear();
        state.discrepancies.clear();
        state.recurring.clear();
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ConversionOptions, ConverterRegistry};
    use crate::tree::{ExportFormat, Node};
    use crate::validation::Validator;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let monitor = ErrorMonitor::with_capacity(3);
        for i in 0..5 {
            monitor.log_error(ErrorEvent::new(format!("CODE_{i}"), "x", Severity::Low));
        }
        let logs = monitor.recent(&ErrorFilter::default());
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].code, "CODE_2");
        assert_eq!(logs[0].id, 2);

        let summary = monitor.summary();
        assert_eq!(summary.retained, 3);
        assert_eq!(summary.total_logged, 5);
    }

    #[test]
    fn test_recurring_detection() {
        let monitor = ErrorMonitor::new();
        for _ in 0..RECURRING_THRESHOLD - 1 {
            monitor.log_error(ErrorEvent::new("EXPORT_FAILED", "boom", Severity::High));
        }
        assert!(monitor.recurring_issues().is_empty());

        monitor.log_error(ErrorEvent::new("EXPORT_FAILED", "boom", Severity::High));
        assert_eq!(monitor.recurring_issues(), vec!["EXPORT_FAILED"]);
    }

    #[test]
    fn test_recurring_window_is_bounded() {
        let monitor = ErrorMonitor::new();
        for _ in 0..RECURRING_THRESHOLD - 1 {
            monitor.log_error(ErrorEvent::new("RARE", "x", Severity::Low));
        }
        for _ in 0..RECURRING_WINDOW {
            monitor.log_error(ErrorEvent::new("NOISE", "x", Severity::Low));
        }
        monitor.log_error(ErrorEvent::new("RARE", "x", Severity::Low));
        assert_eq!(monitor.recurring_issues(), vec!["NOISE"]);
    }

    #[test]
    fn test_log_validation_aggregates() {
        let monitor = ErrorMonitor::new();
        let validator = Validator::default();
        let tree = Node::doc()
            .with_child(Node::new("heading"))
            .with_child(Node::new("mermaid"));
        let result = validator.validate_tree(&tree);

        monitor.log_validation(&result, Some("doc-1"), "1.2.0");
        monitor.log_validation(&result, Some("doc-2"), "1.2.0");
        monitor.log_validation(&result, Some("doc-3"), "1.0.0");

        // only errors reach the log
        let logs = monitor.recent(&ErrorFilter::default());
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.code == "MISSING_REQUIRED_ATTRIBUTE"));
        assert_eq!(logs[0].category, ErrorCategory::Validation);
        assert_eq!(logs[0].document_id.as_deref(), Some("doc-1"));

        let reports = monitor.discrepancies();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].occurrences, 2);
        let missing = reports
            .iter()
            .find(|r| r.error_code == "MISSING_REQUIRED_ATTRIBUTE" && r.schema_version == "1.2.0")
            .unwrap();
        assert_eq!(missing.severity, Severity::High);
        assert_eq!(missing.discrepancy_type, DiscrepancyType::MissingField);
        let unknown = reports
            .iter()
            .find(|r| r.error_code == "UNKNOWN_NODE_TYPE")
            .unwrap();
        assert_eq!(unknown.discrepancy_type, DiscrepancyType::UnknownType);
        assert_eq!(unknown.severity, Severity::Low);
    }

    #[test]
    fn test_discrepancy_filters() {
        let monitor = ErrorMonitor::new();
        let tree = Node::doc()
            .with_child(Node::new("heading"))
            .with_child(Node::new("mermaid"));
        let result = Validator::default().validate_tree(&tree);
        monitor.log_validation(&result, Some("doc-1"), "1.2.0");
        monitor.log_validation(&result, Some("doc-2"), "1.1.0");

        let high = monitor.discrepancies_matching(&DiscrepancyFilter {
            min_severity: Some(Severity::High),
            ..DiscrepancyFilter::default()
        });
        assert_eq!(high.len(), 2);
        assert!(high.iter().all(|r| r.error_code == "MISSING_REQUIRED_ATTRIBUTE"));

        let unknown = monitor.discrepancies_matching(&DiscrepancyFilter {
            discrepancy_type: Some(DiscrepancyType::UnknownType),
            schema_version: Some("1.1.0".into()),
            ..DiscrepancyFilter::default()
        });
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].error_code, "UNKNOWN_NODE_TYPE");
        assert_eq!(unknown[0].schema_version, "1.1.0");

        let limited = monitor.discrepancies_matching(&DiscrepancyFilter {
            limit: Some(1),
            ..DiscrepancyFilter::default()
        });
        assert_eq!(limited.len(), 1);
        assert_eq!(monitor.discrepancies().len(), 4);
    }

    #[test]
    fn test_log_conversion_only_failures() {
        let monitor = ErrorMonitor::new();
        let registry = ConverterRegistry::new();
        let ok = registry.convert(&Node::doc(), &ConversionOptions::new(ExportFormat::Json));
        monitor.log_conversion(&ok, Some("doc-1"));
        assert_eq!(monitor.summary().total_logged, 0);

        let failed = registry.convert(&Node::doc(), &ConversionOptions::new(ExportFormat::Docx));
        monitor.log_conversion(&failed, Some("doc-1"));
        let logs = monitor.recent(&ErrorFilter::default());
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].category, ErrorCategory::Conversion);
        assert_eq!(logs[0].context["format"], "docx");
    }

    #[test]
    fn test_filters_and_summary() {
        let monitor = ErrorMonitor::new();
        monitor.log_error(ErrorEvent::new("SCHEMA_VERSION_MISMATCH", "old", Severity::Medium));
        monitor.log_error(ErrorEvent::new("FETCH_FAILED", "store offline", Severity::Critical));
        monitor.log_error(ErrorEvent::new("FETCH_FAILED", "store offline", Severity::Critical));

        let critical = monitor.recent(&ErrorFilter {
            severity: Some(Severity::Critical),
            ..ErrorFilter::default()
        });
        assert_eq!(critical.len(), 2);

        let schema = monitor.recent(&ErrorFilter {
            category: Some(ErrorCategory::Schema),
            ..ErrorFilter::default()
        });
        assert_eq!(schema.len(), 1);

        let last = monitor.recent(&ErrorFilter {
            limit: Some(1),
            ..ErrorFilter::default()
        });
        assert_eq!(last[0].id, 2);

        let future = monitor.recent(&ErrorFilter {
            since: Some(Utc::now() + Duration::hours(1)),
            ..ErrorFilter::default()
        });
        assert!(future.is_empty());

        let summary = monitor.summary();
        assert_eq!(summary.by_severity[&Severity::Critical], 2);
        assert_eq!(summary.by_category[&ErrorCategory::Storage], 2);
    }

    #[test]
    fn test_prune_and_clear() {
        let monitor = ErrorMonitor::new();
        let result = Validator::default().validate_tree(&Node::doc().with_child(Node::new("x")));
        monitor.log_validation(&result, None, "1.2.0");
        assert_eq!(monitor.prune_discrepancies(Utc::now() - Duration::hours(1)), 0);
        assert_eq!(monitor.prune_discrepancies(Utc::now() + Duration::hours(1)), 1);
        assert!(monitor.discrepancies().is_empty());

        monitor.log_error(ErrorEvent::new("A", "x", Severity::Low));
        monitor.clear();
        assert_eq!(monitor.summary().retained, 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let monitor = Arc::new(ErrorMonitor::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let monitor = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        monitor.log_error(ErrorEvent::new(format!("T{t}"), "x", Severity::Low));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(monitor.summary().total_logged, 100);
        assert_eq!(monitor.recurring_issues().len(), 4);
    }
}
