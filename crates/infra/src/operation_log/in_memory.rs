use std::collections::HashSet;
use std::sync::RwLock;

use stockcore_core::OperationId;
use stockcore_inventory::OperationLogEntry;

use super::r#trait::{LogFilter, OperationLog, OperationLogError};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<OperationLogEntry>,
    ids: HashSet<OperationId>,
}

/// In-memory append-only operation log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOperationLog {
    state: RwLock<LogState>,
}

impl InMemoryOperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OperationLog for InMemoryOperationLog {
    fn append(&self, entries: Vec<OperationLogEntry>) -> Result<Vec<OperationId>, OperationLogError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OperationLogError::Unavailable("lock poisoned".to_string()))?;

        let mut batch = HashSet::new();
        for e in &entries {
            if state.ids.contains(&e.operation_id) || !batch.insert(e.operation_id) {
                return Err(OperationLogError::DuplicateOperation(e.operation_id));
            }
        }

        let ids: Vec<OperationId> = entries.iter().map(|e| e.operation_id).collect();
        state.ids.extend(ids.iter().copied());
        state.entries.extend(entries);
        Ok(ids)
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<OperationLogEntry>, OperationLogError> {
        let state = self
            .state
            .read()
            .map_err(|_| OperationLogError::Unavailable("lock poisoned".to_string()))?;
        Ok(state
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}
