//! Append-only operation log boundary.
//!
//! The log is the durable audit trail of every quantity-changing event.
//! Entries are never mutated or deleted once appended; external analytics read
//! them through [`OperationLog::query`] or the JSON-lines export.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryOperationLog;
pub use r#trait::{LogFilter, OperationLog, OperationLogError};

use stockcore_inventory::OperationLogEntry;

/// Render entries as newline-delimited JSON (one entry per line).
pub fn export_json_lines(entries: &[OperationLogEntry]) -> Result<String, OperationLogError> {
    let mut out = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| OperationLogError::Serialize(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}
