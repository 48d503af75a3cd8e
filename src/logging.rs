//! Audit trail of lock decisions
//!
//! Every acquire, release and session release produces one `AuditEvent`.
//! Events are kept in a bounded `AuditLog` owned by the lock service and can
//! be exported as JSON lines or text for the operator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::request::{Owner, TransactionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Acquire,
    Release,
    ReleaseSession,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOperation::Acquire => write!(f, "acquire"),
            AuditOperation::Release => write!(f, "release"),
            AuditOperation::ReleaseSession => write!(f, "release_session"),
        }
    }
}

/// What the service decided for one operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Granted,
    /// Contention: self conflict or conflict with a held grant
    Rejected,
    /// Malformed acquire or release naming unknown ids
    Invalid,
    Released,
    /// Release by a console that does not own the transaction
    Refused,
}

impl AuditOutcome {
    pub fn level(self) -> LogLevel {
        match self {
            AuditOutcome::Granted | AuditOutcome::Released | AuditOutcome::Rejected => LogLevel::Info,
            AuditOutcome::Invalid | AuditOutcome::Refused => LogLevel::Warn,
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Granted => write!(f, "granted"),
            AuditOutcome::Rejected => write!(f, "rejected"),
            AuditOutcome::Invalid => write!(f, "invalid"),
            AuditOutcome::Released => write!(f, "released"),
            AuditOutcome::Refused => write!(f, "refused"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub operation: AuditOperation,
    pub outcome: AuditOutcome,
    /// Console session that issued the operation, when known
    pub requester: Option<String>,
    pub transaction_ids: Vec<TransactionId>,
    pub detail: Option<serde_json::Value>,
    /// Lock service instance that recorded the event
    pub service_id: String,
}

impl AuditEvent {
    pub fn new(operation: AuditOperation, outcome: AuditOutcome, service_id: impl Into<String>) -> Self {
        AuditEvent {
            timestamp: Utc::now(),
            level: outcome.level(),
            operation,
            outcome,
            requester: None,
            transaction_ids: Vec::new(),
            detail: None,
            service_id: service_id.into(),
        }
    }

    pub fn requester(mut self, owner: &Owner) -> Self {
        self.requester = Some(owner.to_string());
        self
    }

    pub fn transactions(mut self, ids: &[TransactionId]) -> Self {
        self.transaction_ids = ids.to_vec();
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"timestamp":"{}","operation":"{}","outcome":"{}"}}"#,
                self.timestamp.to_rfc3339(),
                self.operation,
                self.outcome
            )
        })
    }

    /// One line for an operator terminal
    pub fn to_text(&self) -> String {
        let mut line = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.operation,
            self.outcome
        );

        if let Some(requester) = &self.requester {
            line.push_str(&format!(" by {}", requester));
        }
        if !self.transaction_ids.is_empty() {
            line.push_str(&format!(" transactions={:?}", self.transaction_ids));
        }
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" {}", detail));
        }

        line
    }
}

/// Bounded buffer of audit events, oldest dropped first
pub struct AuditLog {
    events: VecDeque<AuditEvent>,
    max_size: usize,
    min_level: LogLevel,
}

impl AuditLog {
    pub fn new(max_size: usize, min_level: LogLevel) -> Self {
        AuditLog {
            events: VecDeque::new(),
            max_size,
            min_level,
        }
    }

    pub fn record(&mut self, event: AuditEvent) {
        if event.level < self.min_level {
            return;
        }
        self.events.push_back(event);
        while self.events.len() > self.max_size {
            self.events.pop_front();
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn export_jsonl(&self) -> String {
        self.events.iter().map(AuditEvent::to_json).collect::<Vec<_>>().join("\n")
    }

    pub fn export_text(&self) -> String {
        self.events.iter().map(AuditEvent::to_text).collect::<Vec<_>>().join("\n")
    }

    pub fn stats(&self) -> AuditStats {
        let mut stats = AuditStats {
            total: self.events.len(),
            ..AuditStats::default()
        };

        for event in &self.events {
            match event.outcome {
                AuditOutcome::Granted => stats.granted += 1,
                AuditOutcome::Rejected => stats.rejected += 1,
                AuditOutcome::Invalid => stats.invalid += 1,
                AuditOutcome::Released => stats.released += 1,
                AuditOutcome::Refused => stats.refused += 1,
            }
        }

        stats
    }
}

/// Decision counts over the retained audit events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub granted: usize,
    pub rejected: usize,
    pub invalid: usize,
    pub released: usize,
    pub refused: usize,
}

impl fmt::Display for AuditStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} decision(s): {} granted | {} rejected | {} invalid | {} released | {} refused",
            self.total, self.granted, self.rejected, self.invalid, self.released, self.refused
        )
    }
}
