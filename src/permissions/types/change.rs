use serde::{Deserialize, Serialize};
use std::fmt;

use super::records::PermissionChangeRecord;

/// Receipt for a submitted permission change: the id of the change record
/// and the identity of the user whose management realm holds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionChangeTicket {
    pub id: String,
    pub user: String,
}

impl fmt::Display for PermissionChangeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "change {} of {}", self.id, self.user)
    }
}

/// Server-side processing state of a permission change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Pending,
    Accepted,
    Rejected { code: i64, message: String },
}

impl ChangeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChangeStatus::Pending)
    }
}

impl From<&PermissionChangeRecord> for ChangeStatus {
    fn from(record: &PermissionChangeRecord) -> Self {
        match record.status_code {
            None => ChangeStatus::Pending,
            Some(0) => ChangeStatus::Accepted,
            Some(code) => ChangeStatus::Rejected {
                code,
                message: record
                    .status_message
                    .clone()
                    .unwrap_or_else(|| format!("permission change rejected with code {}", code)),
            },
        }
    }
}
