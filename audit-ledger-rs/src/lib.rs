// audit-ledger-rs/src/lib.rs
// Append-only audit ledger for the prediction gateway.
//
// Every prediction attempt produces exactly one `AuditRecord`. Records are
// written as JSON lines with the following invariants:
//
// - Append-only on disk; a line is assembled in full and written with a
//   single `write_all` while the ledger lock is held
// - Each line participates in a SHA-256 hash chain for tamper detection
// - Opening an existing ledger replays and verifies the chain
// - A torn final line (no trailing newline, left by a crash mid-write) is
//   cut off on open; a failed append truncates back to the previous end
//
// Public API:
//     * AuditLedger::open / AuditLedger::append
//     * verify_ledger / read_records for offline inspection

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hash of the (virtual) entry preceding the first line of a ledger.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Opaque identifier for a single audit record.
pub type AuditEntryId = Uuid;

/// One audited request attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    /// SHA-256 (hex) of the raw request body.
    pub input_digest: String,
    /// Full parsed input, only kept when the gateway is configured to do so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    pub outcome: AuditOutcome,
    pub latency_ms: f64,
}

impl AuditRecord {
    /// Build a record stamped with a fresh id and the current time.
    pub fn new(
        client_id: impl Into<String>,
        raw_input: &[u8],
        outcome: AuditOutcome,
        latency_ms: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            client_id: client_id.into(),
            input_digest: digest_hex(raw_input),
            input: None,
            outcome,
            latency_ms,
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Success { .. })
    }
}

/// Result of an audited request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success {
        probability: f64,
        prediction: String,
    },
    Failure {
        /// Stable error kind, e.g. `validation` or `rate_limited`.
        error_kind: String,
        http_status: u16,
        /// Last pipeline stage reached before the failure.
        stage: String,
    },
}

/// Errors produced by the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("ledger corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },
}

/// Summary of a verified ledger file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSummary {
    pub entries: u64,
    pub head_hash: String,
}

/// Line layout written to disk. The record is embedded verbatim so the
/// hash can be recomputed from the exact bytes that were chained.
#[derive(Serialize)]
struct LedgerLineOut<'a> {
    seq: u64,
    prev_hash: &'a str,
    hash: &'a str,
    record: &'a RawValue,
}

#[derive(Deserialize)]
struct LedgerLineIn {
    seq: u64,
    prev_hash: String,
    hash: String,
    record: Box<RawValue>,
}

struct ChainHead {
    file: File,
    next_seq: u64,
    last_hash: String,
    /// File length after the last complete line.
    end_offset: u64,
    /// A failed append could not be rolled back; retry before the next write.
    needs_truncate: bool,
}

/// What [`AuditLedger::open`] had to repair at the end of an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailRepair {
    /// An incomplete final line was removed.
    Truncated { removed_bytes: u64 },
    /// A complete final line was missing its newline.
    Terminated,
}

/// Append-only, hash-chained audit ledger.
pub struct AuditLedger {
    path: PathBuf,
    head: Mutex<ChainHead>,
    tail_repair: Option<TailRepair>,
}

impl AuditLedger {
    /// Open (or create) the ledger at `path`.
    ///
    /// An existing file is replayed to rebuild the chain head; a broken
    /// chain is reported as [`LedgerError::Corrupted`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tail_repair = if path.exists() {
            repair_tail(&path)?
        } else {
            None
        };

        let summary = if path.exists() {
            verify_ledger(&path)?
        } else {
            LedgerSummary {
                entries: 0,
                head_hash: GENESIS_HASH.to_string(),
            }
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let end_offset = file.metadata()?.len();

        Ok(Self {
            path,
            head: Mutex::new(ChainHead {
                file,
                next_seq: summary.entries,
                last_hash: summary.head_hash,
                end_offset,
                needs_truncate: false,
            }),
            tail_repair,
        })
    }

    /// Repair applied to the end of the file when it was opened, if any.
    pub fn tail_repair(&self) -> Option<&TailRepair> {
        self.tail_repair.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended so far, including those found on open.
    pub fn len(&self) -> u64 {
        self.lock_head().next_seq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one record.
    ///
    /// The line is serialized before the lock is taken and written with a
    /// single `write_all`; the in-memory head only advances once the write
    /// succeeded.
    pub fn append(&self, record: &AuditRecord) -> Result<AuditEntryId, LedgerError> {
        let record_json = serde_json::to_string(record)?;
        let raw = RawValue::from_string(record_json)?;

        let mut head = self.lock_head();
        let hash = chain_hash(&head.last_hash, raw.get());

        let mut line = serde_json::to_string(&LedgerLineOut {
            seq: head.next_seq,
            prev_hash: &head.last_hash,
            hash: &hash,
            record: &raw,
        })?;
        line.push('\n');

        let end_offset = head.end_offset;
        if head.needs_truncate {
            head.file.truncate_to(end_offset)?;
            head.needs_truncate = false;
        }

        if let Err(err) = write_line(&mut head.file, end_offset, line.as_bytes()) {
            head.needs_truncate = err.rollback_failed;
            return Err(err.source.into());
        }

        head.next_seq += 1;
        head.last_hash = hash;
        head.end_offset += line.len() as u64;

        Ok(record.id)
    }

    fn lock_head(&self) -> std::sync::MutexGuard<'_, ChainHead> {
        // A panic while holding the lock cannot leave a half-written line
        // behind, so the head is still usable.
        self.head.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Replay the ledger at `path`, checking sequence numbers and the hash chain.
pub fn verify_ledger(path: impl AsRef<Path>) -> Result<LedgerSummary, LedgerError> {
    let mut entries = 0u64;
    let mut head_hash = GENESIS_HASH.to_string();

    for_each_line(path.as_ref(), |line_no, line| {
        if line.seq != entries {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: format!("expected seq {}, found {}", entries, line.seq),
            });
        }
        if line.prev_hash != head_hash {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: "prev_hash does not match chain head".to_string(),
            });
        }
        let computed = chain_hash(&line.prev_hash, line.record.get());
        if computed != line.hash {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: "hash mismatch; possible tampering".to_string(),
            });
        }

        entries += 1;
        head_hash = line.hash;
        Ok(())
    })?;

    Ok(LedgerSummary { entries, head_hash })
}

/// Read every record in file order without verifying the chain.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, LedgerError> {
    let mut records = Vec::new();
    for_each_line(path.as_ref(), |_, line| {
        records.push(serde_json::from_str(line.record.get())?);
        Ok(())
    })?;
    Ok(records)
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

// --- helpers ---------------------------------------------------------------

/// Sink the ledger writes to; `File` in production.
trait LedgerSink: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LedgerSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

struct WriteFailure {
    source: io::Error,
    rollback_failed: bool,
}

/// Write one complete line; on failure cut the sink back to `end_offset` so
/// no fragment is left for the next line to be glued onto.
fn write_line<W: LedgerSink>(sink: &mut W, end_offset: u64, line: &[u8]) -> Result<(), WriteFailure> {
    let result = sink.write_all(line).and_then(|_| sink.flush());
    match result {
        Ok(()) => Ok(()),
        Err(source) => Err(WriteFailure {
            rollback_failed: sink.truncate_to(end_offset).is_err(),
            source,
        }),
    }
}

/// Cut off an incomplete final line left by an interrupted write.
///
/// Only the bytes after the last newline are considered. If they parse as a
/// ledger line the write completed except for its terminator, which is
/// added; otherwise they are removed. Damage before the last newline is left
/// for [`verify_ledger`] to report.
fn repair_tail(path: &Path) -> Result<Option<TailRepair>, LedgerError> {
    let contents = fs::read(path)?;
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(None);
    }

    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    let tail = &contents[keep..];

    let mut file = OpenOptions::new().write(true).open(path)?;
    if serde_json::from_slice::<LedgerLineIn>(tail).is_ok() {
        file.seek(SeekFrom::End(0))?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        return Ok(Some(TailRepair::Terminated));
    }

    file.set_len(keep as u64)?;
    file.sync_all()?;
    if tail.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }

    Ok(Some(TailRepair::Truncated {
        removed_bytes: tail.len() as u64,
    }))
}

fn chain_hash(prev_hash: &str, record_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(record_json.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn for_each_line<F>(path: &Path, mut visit: F) -> Result<(), LedgerError>
where
    F: FnMut(usize, LedgerLineIn) -> Result<(), LedgerError>,
{
    let reader = BufReader::new(File::open(path)?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: LedgerLineIn = serde_json::from_str(&line).map_err(|e| LedgerError::Corrupted {
            line: idx + 1,
            reason: format!("unparseable line: {e}"),
        })?;
        visit(idx + 1, parsed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn success(client: &str) -> AuditRecord {
        AuditRecord::new(
            client,
            br#"{"age":45}"#,
            AuditOutcome::Success {
                probability: 0.61,
                prediction: "Likely to survive".to_string(),
            },
            1.5,
        )
    }

    fn failure(client: &str, kind: &str, status: u16) -> AuditRecord {
        AuditRecord::new(
            client,
            b"{}",
            AuditOutcome::Failure {
                error_kind: kind.to_string(),
                http_status: status,
                stage: "received".to_string(),
            },
            0.2,
        )
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/predictions.jsonl");

        let ledger = AuditLedger::open(&path).unwrap();
        assert!(ledger.is_empty());

        let first = success("10.0.0.1");
        let second = failure("10.0.0.2", "rate_limited", 429);
        ledger.append(&first).unwrap();
        ledger.append(&second).unwrap();
        assert_eq!(ledger.len(), 2);

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![first, second]);

        let summary = verify_ledger(&path).unwrap();
        assert_eq!(summary.entries, 2);
        assert_ne!(summary.head_hash, GENESIS_HASH);
    }

    #[test]
    fn test_reopen_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let ledger = AuditLedger::open(&path).unwrap();
            ledger.append(&success("a")).unwrap();
        }

        let ledger = AuditLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        ledger.append(&failure("b", "validation", 422)).unwrap();

        assert_eq!(verify_ledger(&path).unwrap().entries, 2);
    }

    #[test]
    fn test_tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let ledger = AuditLedger::open(&path).unwrap();
        ledger.append(&success("a")).unwrap();
        ledger.append(&success("b")).unwrap();
        drop(ledger);

        let contents = fs::read_to_string(&path).unwrap();
        fs::write(&path, contents.replace("0.61", "0.99")).unwrap();

        let err = verify_ledger(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupted { line: 1, .. }));
        assert!(AuditLedger::open(&path).is_err());
    }

    #[test]
    fn test_torn_tail_is_cut_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let ledger = AuditLedger::open(&path).unwrap();
        ledger.append(&success("a")).unwrap();
        drop(ledger);

        let fragment = br#"{"seq":1,"prev_ha"#;
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(fragment).unwrap();
        drop(file);
        assert!(verify_ledger(&path).is_err());

        let ledger = AuditLedger::open(&path).unwrap();
        assert_eq!(
            ledger.tail_repair(),
            Some(&TailRepair::Truncated {
                removed_bytes: fragment.len() as u64
            })
        );
        assert_eq!(ledger.len(), 1);

        ledger.append(&success("b")).unwrap();
        assert_eq!(verify_ledger(&path).unwrap().entries, 2);
    }

    #[test]
    fn test_missing_final_newline_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let ledger = AuditLedger::open(&path).unwrap();
        ledger.append(&success("a")).unwrap();
        ledger.append(&success("b")).unwrap();
        drop(ledger);

        let contents = fs::read_to_string(&path).unwrap();
        fs::write(&path, contents.trim_end_matches('\n')).unwrap();

        let ledger = AuditLedger::open(&path).unwrap();
        assert_eq!(ledger.tail_repair(), Some(&TailRepair::Terminated));
        assert_eq!(ledger.len(), 2);

        ledger.append(&success("c")).unwrap();
        assert_eq!(verify_ledger(&path).unwrap().entries, 3);
    }

    #[test]
    fn test_clean_ledger_needs_no_repair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        AuditLedger::open(&path).unwrap().append(&success("a")).unwrap();
        assert_eq!(AuditLedger::open(&path).unwrap().tail_repair(), None);
    }

    /// Accepts `capacity` bytes, then fails every write.
    struct ShortSink {
        buf: Vec<u8>,
        capacity: usize,
        truncate_fails: bool,
    }

    impl Write for ShortSink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let room = self.capacity.saturating_sub(self.buf.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = room.min(data.len());
            self.buf.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LedgerSink for ShortSink {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            if self.truncate_fails {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only"));
            }
            self.buf.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_partial_write_is_rolled_back() {
        let mut sink = ShortSink {
            buf: b"{\"seq\":0}\n".to_vec(),
            capacity: 16,
            truncate_fails: false,
        };
        let before = sink.buf.clone();

        let failure = write_line(&mut sink, before.len() as u64, b"{\"seq\":1,\"prev_hash\":\"x\"}\n")
            .err()
            .unwrap();
        assert!(!failure.rollback_failed);
        assert_eq!(sink.buf, before);
    }

    #[test]
    fn test_failed_rollback_is_reported() {
        let mut sink = ShortSink {
            buf: Vec::new(),
            capacity: 4,
            truncate_fails: true,
        };

        let failure = write_line(&mut sink, 0, b"0123456789\n").err().unwrap();
        assert!(failure.rollback_failed);
        assert_eq!(failure.source.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_concurrent_appends_keep_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = Arc::new(AuditLedger::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        ledger.append(&success(&format!("client-{t}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = verify_ledger(&path).unwrap();
        assert_eq!(summary.entries, 200);
        assert_eq!(read_records(&path).unwrap().len(), 200);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let record = failure("c", "model_unavailable", 503);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"]["status"], "failure");
        assert_eq!(value["outcome"]["error_kind"], "model_unavailable");
        assert!(value.get("input").is_none());
        assert_eq!(record.input_digest, digest_hex(b"{}"));
    }
}
