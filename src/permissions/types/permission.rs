use serde::{Deserialize, Serialize};
use std::fmt;

/// Access granted by a permission. Each level includes every capability of
/// the levels below it, so `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    None,
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    /// Whether this level grants everything `required` grants.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self >= required
    }

    pub fn may_read(self) -> bool {
        self.satisfies(AccessLevel::Read)
    }

    pub fn may_write(self) -> bool {
        self.satisfies(AccessLevel::Write)
    }

    pub fn may_manage(self) -> bool {
        self.satisfies(AccessLevel::Admin)
    }

    /// Highest level implied by the stored `(mayRead, mayWrite, mayManage)`
    /// triple.
    pub fn from_flags(may_read: bool, may_write: bool, may_manage: bool) -> Self {
        if may_manage {
            AccessLevel::Admin
        } else if may_write {
            AccessLevel::Write
        } else if may_read {
            AccessLevel::Read
        } else {
            AccessLevel::None
        }
    }

    pub fn to_flags(self) -> (bool, bool, bool) {
        (self.may_read(), self.may_write(), self.may_manage())
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessLevel::None => "none",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Who a permission applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Condition {
    UserId(String),
    KeyValue(String, String),
}

impl Condition {
    pub fn user_id(user_id: impl Into<String>) -> Self {
        Condition::UserId(user_id.into())
    }

    pub fn key_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::KeyValue(key.into(), value.into())
    }
}

impl From<String> for Condition {
    fn from(user_id: String) -> Self {
        Condition::UserId(user_id)
    }
}

impl From<&str> for Condition {
    fn from(user_id: &str) -> Self {
        Condition::user_id(user_id)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::UserId(user_id) => write!(f, "user {}", user_id),
            Condition::KeyValue(key, value) => write!(f, "{}={}", key, value),
        }
    }
}

/// One access-control entry: `condition` has `access` to the realm at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub path: String,
    pub access: AccessLevel,
    pub condition: Condition,
}

impl Permission {
    pub fn new(path: impl Into<String>, access: AccessLevel, condition: impl Into<Condition>) -> Self {
        Self {
            path: path.into(),
            access,
            condition: condition.into(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has {} access to {}", self.condition, self.access, self.path)
    }
}
