//! Commands consumed by the scope tree.

use crate::event::{ActionType, ErrorSource, ResourceKind};
use chrono::{DateTime, Utc};
use std::fmt;

/// Identity of a view across its lifetime, chosen by the host (for example a
/// screen's stable key). Two start commands with the same identity refer to
/// the same view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewIdentity(String);

impl ViewIdentity {
    /// Creates a view identity.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the identity key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lifecycle command, stamped with the time it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum RumCommand {
    /// A view became visible.
    StartView {
        /// When the command happened.
        time: DateTime<Utc>,
        /// View identity.
        identity: ViewIdentity,
        /// URI or name reported for the view.
        uri: String,
    },
    /// A view is no longer visible.
    StopView {
        /// When the command happened.
        time: DateTime<Utc>,
        /// View identity.
        identity: ViewIdentity,
    },
    /// An instant user action such as a tap.
    AddUserAction {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Kind of action.
        action_type: ActionType,
        /// Action name.
        name: String,
    },
    /// A user action with a duration, such as a scroll, started.
    StartUserAction {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Kind of action.
        action_type: ActionType,
        /// Action name.
        name: String,
    },
    /// The started user action ended.
    StopUserAction {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Kind of action; must match the started action.
        action_type: ActionType,
        /// Replacement name, if any.
        name: Option<String>,
    },
    /// A network resource started loading.
    StartResource {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Host-chosen key pairing start and stop.
        resource_key: String,
        /// Resource URL.
        url: String,
        /// HTTP method.
        method: String,
    },
    /// A network resource finished loading.
    StopResource {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Key given at start.
        resource_key: String,
        /// Kind of resource.
        kind: ResourceKind,
        /// HTTP status code, if any.
        http_status_code: Option<u16>,
        /// Response size in bytes, if known.
        size: Option<u64>,
    },
    /// A network resource failed to load.
    StopResourceWithError {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Key given at start.
        resource_key: String,
        /// Error message.
        message: String,
        /// HTTP status code, if any.
        http_status_code: Option<u16>,
    },
    /// An error happened on the current view.
    AddError {
        /// When the command happened.
        time: DateTime<Utc>,
        /// Error message.
        message: String,
        /// Error origin.
        source: ErrorSource,
        /// Stack trace, if available.
        stack: Option<String>,
    },
}

impl RumCommand {
    /// Returns when the command happened.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::StartView { time, .. }
            | Self::StopView { time, .. }
            | Self::AddUserAction { time, .. }
            | Self::StartUserAction { time, .. }
            | Self::StopUserAction { time, .. }
            | Self::StartResource { time, .. }
            | Self::StopResource { time, .. }
            | Self::StopResourceWithError { time, .. }
            | Self::AddError { time, .. } => *time,
        }
    }

    /// Returns the command name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartView { .. } => "start_view",
            Self::StopView { .. } => "stop_view",
            Self::AddUserAction { .. } => "add_user_action",
            Self::StartUserAction { .. } => "start_user_action",
            Self::StopUserAction { .. } => "stop_user_action",
            Self::StartResource { .. } => "start_resource",
            Self::StopResource { .. } => "stop_resource",
            Self::StopResourceWithError { .. } => "stop_resource_with_error",
            Self::AddError { .. } => "add_error",
        }
    }
}
