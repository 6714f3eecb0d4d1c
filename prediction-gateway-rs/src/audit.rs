//! Audit logging for prediction requests.
//!
//! Wraps the durable [`AuditLedger`]. Recording never fails the caller:
//! ledger errors, or a ledger that could not be opened at startup, send the
//! record to the fallback channel (stderr plus an error event) instead.

use std::path::Path;
use std::sync::Arc;

use audit_ledger::{AuditLedger, AuditRecord, TailRepair};

pub struct AuditLogger {
    ledger: Option<Arc<AuditLedger>>,
    include_input: bool,
}

impl AuditLogger {
    pub fn new(ledger: AuditLedger, include_input: bool) -> Self {
        Self {
            ledger: Some(Arc::new(ledger)),
            include_input,
        }
    }

    /// Open the ledger at `path`, degrading to fallback-only logging when
    /// it cannot be opened.
    pub fn open(path: impl AsRef<Path>, include_input: bool) -> Self {
        let path = path.as_ref();
        match AuditLedger::open(path) {
            Ok(ledger) => {
                match ledger.tail_repair() {
                    Some(TailRepair::Truncated { removed_bytes }) => tracing::error!(
                        path = %path.display(),
                        removed_bytes,
                        "Audit ledger ended in an incomplete line; truncated to last complete entry"
                    ),
                    Some(TailRepair::Terminated) => tracing::warn!(
                        path = %path.display(),
                        "Audit ledger was missing its final newline; restored"
                    ),
                    None => {}
                }
                tracing::info!(
                    path = %path.display(),
                    existing_entries = ledger.len(),
                    "Audit ledger opened"
                );
                Self::new(ledger, include_input)
            }
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = %err,
                    "Failed to open audit ledger; audit records will go to stderr"
                );
                Self::fallback_only(include_input)
            }
        }
    }

    pub fn fallback_only(include_input: bool) -> Self {
        Self {
            ledger: None,
            include_input,
        }
    }

    /// Whether records should carry the full request body.
    pub fn include_input(&self) -> bool {
        self.include_input
    }

    pub fn is_durable(&self) -> bool {
        self.ledger.is_some()
    }

    /// Append one record. The write runs on the blocking pool and is awaited,
    /// so the record is on disk (or in the fallback channel) when this returns.
    pub async fn record(&self, record: AuditRecord) {
        let Some(ledger) = self.ledger.as_ref().map(Arc::clone) else {
            write_fallback(&record, "audit ledger unavailable");
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            let outcome = ledger.append(&record).map(|_| ());
            (record, outcome)
        })
        .await;

        match result {
            Ok((_, Ok(()))) => {}
            Ok((record, Err(err))) => write_fallback(&record, &err.to_string()),
            Err(join_err) => {
                tracing::error!(
                    target: "audit_fallback",
                    error = %join_err,
                    "Audit write task failed; record lost"
                );
            }
        }
    }
}

fn write_fallback(record: &AuditRecord, reason: &str) {
    match serde_json::to_string(record) {
        Ok(line) => {
            tracing::error!(target: "audit_fallback", reason, record_id = %record.id, "Audit record written to fallback channel");
            eprintln!("{}", line);
        }
        Err(err) => {
            tracing::error!(target: "audit_fallback", reason, error = %err, "Audit record could not be serialized");
        }
    }
}
