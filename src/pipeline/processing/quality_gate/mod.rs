use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::error::{Result, ScraperError};
use crate::metrics as metric_names;
use crate::pipeline::processing::schema::{Row, Schema};

/// One broken constraint, attributed to a row where possible
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Stage whose gate produced this violation
    pub stage: String,
    /// Row index within the validated table
    pub row: Option<usize>,
    /// Record id, when the row has one
    pub id: Option<u64>,
    /// Field that triggered the violation
    pub field: Option<String>,
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Human-readable description
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The row has no value for a declared field
    Missing,
    /// Text shorter than the declared minimum
    TooShort,
    /// Integer below the declared minimum
    BelowMinimum,
    /// Text does not fully match the declared pattern
    PatternMismatch,
    /// Value already seen in an earlier row
    Duplicate,
    /// Derived field differs from re-deriving it from its source
    DerivationMismatch,
    /// Records were dropped because their section has no preacher mapping
    UnmappedSection,
}

/// Severity levels for violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// What the gate decided for a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    /// No violations
    Pass,
    /// Only warnings or informational violations
    PassWithWarnings,
    /// Errors were found; the run continues because fail-fast is off
    PassWithErrors,
}

/// Gate outcome for one stage boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub rows_checked: usize,
    pub decision: GateDecision,
    pub violations: Vec<Violation>,
    pub checked_at: DateTime<Utc>,
}

impl StageReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violation counts keyed by kind, for summaries
    pub fn counts_by_kind(&self) -> BTreeMap<ViolationKind, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.violations {
            *counts.entry(v.kind.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationGateConfig {
    /// Return an error instead of a report when any error-level violation is found
    pub fail_fast: bool,
}

/// Runs a schema over a table at a stage boundary. Stateless, never mutates the table.
#[derive(Debug, Clone, Default)]
pub struct ValidationGate {
    pub config: ValidationGateConfig,
}

impl ValidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationGateConfig) -> Self {
        Self { config }
    }

    pub fn fail_fast(fail_fast: bool) -> Self {
        Self::with_config(ValidationGateConfig { fail_fast })
    }

    pub fn check<R: Row>(&self, schema: &Schema, rows: &[R]) -> Result<StageReport> {
        self.check_with(schema, rows, Vec::new())
    }

    /// Like [`check`](Self::check), with violations found earlier in the stage folded in.
    #[instrument(skip(self, schema, rows, extra), fields(stage = schema.name, rows = rows.len()))]
    pub fn check_with<R: Row>(
        &self,
        schema: &Schema,
        rows: &[R],
        extra: Vec<Violation>,
    ) -> Result<StageReport> {
        let mut violations = extra;
        violations.extend(schema.validate(rows));

        let decision = Self::decide(&violations);
        let errors = violations
            .iter()
            .filter(|v| v.severity >= Severity::Error)
            .count();

        metrics::counter!(metric_names::VIOLATIONS, "stage" => schema.name).increment(violations.len() as u64);

        for v in &violations {
            warn!(
                stage = schema.name,
                id = ?v.id,
                field = ?v.field,
                kind = ?v.kind,
                "{}",
                v.message
            );
        }

        if self.config.fail_fast && errors > 0 {
            return Err(ScraperError::Validation {
                stage: schema.name.to_string(),
                violations: errors,
            });
        }

        info!(
            "Validated {} rows at '{}': {} violation(s), decision {:?}",
            rows.len(),
            schema.name,
            violations.len(),
            decision
        );

        Ok(StageReport {
            stage: schema.name.to_string(),
            rows_checked: rows.len(),
            decision,
            violations,
            checked_at: Utc::now(),
        })
    }

    fn decide(violations: &[Violation]) -> GateDecision {
        if violations.iter().any(|v| v.severity >= Severity::Error) {
            GateDecision::PassWithErrors
        } else if violations.is_empty() {
            GateDecision::Pass
        } else {
            GateDecision::PassWithWarnings
        }
    }
}
