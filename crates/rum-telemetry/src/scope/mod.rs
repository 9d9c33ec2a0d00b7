//! The Application -> Session -> View -> (Action | Resource) scope tree.
//!
//! Every scope owns its children. A child never reaches its parent; it only
//! sees the read-only [`RumContext`] handed down with each command. A child
//! returning `false` from [`Scope::process`] has ended and is dropped by its
//! parent after the call.

mod action;
mod application;
mod resource;
mod session;
mod view;

pub use action::UserActionScope;
pub use application::ApplicationScope;
pub use resource::ResourceScope;
pub use session::SessionScope;
pub use view::ViewScope;

use crate::command::RumCommand;
use crate::config::SessionConfig;
use crate::context::{IdGenerator, RumContext, UuidGenerator};
use crate::event::{EventContext, EventWriter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A node of the scope tree.
pub trait Scope {
    /// Applies `command` and returns whether the scope is still alive.
    fn process(&mut self, command: &RumCommand, context: &RumContext) -> bool;
}

/// Collaborators shared by every scope of one tree.
pub struct ScopeDependencies {
    /// Sink for finished records.
    pub writer: Arc<dyn EventWriter>,
    /// Source of session, view, action and resource identifiers.
    pub id_generator: Arc<dyn IdGenerator>,
    /// Session and action timing.
    pub session: SessionConfig,
}

impl ScopeDependencies {
    /// Creates dependencies with random identifiers.
    pub fn new(writer: Arc<dyn EventWriter>, session: SessionConfig) -> Self {
        Self {
            writer,
            id_generator: Arc::new(UuidGenerator),
            session,
        }
    }

    /// Replaces the identifier source.
    #[must_use]
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }
}

/// Builds the shared record fields for an event at `time`.
pub(crate) fn event_context(context: &RumContext, time: DateTime<Utc>) -> EventContext {
    EventContext {
        date: time.timestamp_millis(),
        application_id: context.rum_application_id.clone(),
        session_id: context.session_id,
        view_id: context.active_view_id.unwrap_or_default(),
        view_url: context.active_view_uri.clone().unwrap_or_default(),
    }
}

/// Nanoseconds between two instants, zero if they are out of order.
fn elapsed_ns(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from)
        .num_nanoseconds()
        .unwrap_or(i64::MAX)
        .max(0)
}

/// Whether at least `limit` elapsed between two instants.
fn has_elapsed(from: DateTime<Utc>, to: DateTime<Utc>, limit: Duration) -> bool {
    match chrono::Duration::from_std(limit) {
        Ok(limit) => to - from >= limit,
        Err(_) => false,
    }
}
