//! Feature-specific logging targets and macros
//!
//! Each component logs under its own target so output can be filtered per
//! feature, e.g. `RUST_LOG=sync_permissions::notifications=trace`.

/// Feature categories for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFeature {
    Permissions,
    Realm,
    Schema,
    Notifications,
}

impl LogFeature {
    pub const ALL: [LogFeature; 4] = [
        LogFeature::Permissions,
        LogFeature::Realm,
        LogFeature::Schema,
        LogFeature::Notifications,
    ];

    /// Get the target string for this feature
    pub fn target(&self) -> &'static str {
        match self {
            LogFeature::Permissions => "sync_permissions::permissions",
            LogFeature::Realm => "sync_permissions::realm",
            LogFeature::Schema => "sync_permissions::schema",
            LogFeature::Notifications => "sync_permissions::notifications",
        }
    }

    /// Name used for per-feature overrides in the configuration
    pub fn name(&self) -> &'static str {
        match self {
            LogFeature::Permissions => "permissions",
            LogFeature::Realm => "realm",
            LogFeature::Schema => "schema",
            LogFeature::Notifications => "notifications",
        }
    }
}

// Permission-manager logging macros
#[macro_export]
macro_rules! log_permissions_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "sync_permissions::permissions", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_permissions_info {
    ($($arg:tt)*) => {
        log::info!(target: "sync_permissions::permissions", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_permissions_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "sync_permissions::permissions", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_permissions_error {
    ($($arg:tt)*) => {
        log::error!(target: "sync_permissions::permissions", $($arg)*)
    };
}

// Realm storage logging macros
#[macro_export]
macro_rules! log_realm_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "sync_permissions::realm", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_realm_info {
    ($($arg:tt)*) => {
        log::info!(target: "sync_permissions::realm", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_realm_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "sync_permissions::realm", $($arg)*)
    };
}

// Schema logging macros
#[macro_export]
macro_rules! log_schema_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "sync_permissions::schema", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_schema_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "sync_permissions::schema", $($arg)*)
    };
}

// Live-query notification logging macros
#[macro_export]
macro_rules! log_notifications_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "sync_permissions::notifications", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_notifications_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "sync_permissions::notifications", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_notifications_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "sync_permissions::notifications", $($arg)*)
    };
}
