// Offline integrity check for a prediction audit ledger.
//
// Usage: verify-audit [path]   (defaults to $AUDIT_LOG_PATH)

use std::process::ExitCode;

use audit_ledger::{read_records, verify_ledger};

fn main() -> ExitCode {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AUDIT_LOG_PATH").ok())
        .unwrap_or_else(|| "data/audit/predictions.jsonl".to_string());

    println!("Verifying audit ledger at {}", path);

    let summary = match verify_ledger(&path) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("Verification failed: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let records = match read_records(&path) {
        Ok(records) => records,
        Err(err) => {
            eprintln!("Failed to read records: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let successes = records.iter().filter(|r| r.is_success()).count();
    println!("Entries:   {}", summary.entries);
    println!("Successes: {}", successes);
    println!("Failures:  {}", records.len() - successes);
    println!("Head hash: {}", summary.head_hash);

    ExitCode::SUCCESS
}
