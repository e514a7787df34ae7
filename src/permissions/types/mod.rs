pub mod change;
pub mod permission;
pub mod records;

pub use change::{ChangeStatus, PermissionChangeTicket};
pub use permission::{AccessLevel, Condition, Permission};
pub use records::{
    PermissionChangeRecord, PermissionRecord, PERMISSION_CHANGE_TABLE, PERMISSION_TABLE,
};
