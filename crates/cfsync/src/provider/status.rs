//! stack status helpers

/// Statuses in which a stack accepts a new action
pub const READY_STATUSES: [&str; 4] = [
    "CREATE_COMPLETE",
    "UPDATE_COMPLETE",
    "ROLLBACK_COMPLETE",
    "UPDATE_ROLLBACK_COMPLETE",
];

pub fn is_ready(status: &str) -> bool {
    READY_STATUSES.contains(&status)
}

pub fn is_failed(status: &str) -> bool {
    status.ends_with("_FAILED")
}

/// `ROLLBACK_IN_PROGRESS`, `UPDATE_ROLLBACK_IN_PROGRESS`
pub fn is_rollback_in_progress(status: &str) -> bool {
    status.ends_with("ROLLBACK_IN_PROGRESS")
}

/// `ROLLBACK_COMPLETE`, `UPDATE_ROLLBACK_COMPLETE`
pub fn is_rolled_back(status: &str) -> bool {
    status.ends_with("ROLLBACK_COMPLETE")
}
