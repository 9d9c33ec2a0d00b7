use super::{Scope, ScopeDependencies, elapsed_ns, event_context, has_elapsed};
use crate::command::RumCommand;
use crate::context::RumContext;
use crate::event::{ActionEvent, ActionType, RumEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A user action on a view.
///
/// A discrete action (a tap) stays open briefly so the resources it triggers
/// are attributed to it; it ends once nothing is pending and no activity
/// happened for the discrete timeout. A continuous action (a scroll) ends on
/// its matching stop command or after the continuous timeout.
pub struct UserActionScope {
    dependencies: Arc<ScopeDependencies>,
    action_id: Uuid,
    action_type: ActionType,
    name: String,
    start: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    is_continuous: bool,
    pending_resources: Vec<String>,
    resource_count: u64,
    error_count: u64,
}

impl UserActionScope {
    pub(crate) fn new(
        dependencies: Arc<ScopeDependencies>,
        action_type: ActionType,
        name: String,
        start: DateTime<Utc>,
        is_continuous: bool,
    ) -> Self {
        let action_id = dependencies.id_generator.generate();
        Self {
            dependencies,
            action_id,
            action_type,
            name,
            start,
            last_activity: start,
            is_continuous,
            pending_resources: Vec::new(),
            resource_count: 0,
            error_count: 0,
        }
    }

    /// Returns the action identifier.
    pub fn action_id(&self) -> Uuid {
        self.action_id
    }

    /// Returns the action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the action was started with a stop command pending.
    pub fn is_continuous(&self) -> bool {
        self.is_continuous
    }

    fn timed_out(&self, now: DateTime<Utc>) -> bool {
        let timing = &self.dependencies.session;
        if self.is_continuous {
            has_elapsed(self.start, now, timing.continuous_action_timeout)
        } else {
            self.pending_resources.is_empty()
                && has_elapsed(self.last_activity, now, timing.discrete_action_timeout)
        }
    }

    fn send(&self, context: &RumContext, end: DateTime<Utc>) {
        let event = RumEvent::Action(ActionEvent {
            context: event_context(context, self.start),
            action_id: self.action_id,
            action_type: self.action_type,
            name: self.name.clone(),
            loading_time_ns: elapsed_ns(self.start, end),
            resource_count: self.resource_count,
            error_count: self.error_count,
        });
        self.dependencies.writer.write(&event);
    }

    fn take_pending(&mut self, key: &str) -> bool {
        let before = self.pending_resources.len();
        self.pending_resources.retain(|pending| pending != key);
        self.pending_resources.len() != before
    }
}

impl Scope for UserActionScope {
    fn process(&mut self, command: &RumCommand, context: &RumContext) -> bool {
        let now = command.time();
        if self.timed_out(now) {
            let end = if self.is_continuous {
                let limit = chrono::Duration::from_std(
                    self.dependencies.session.continuous_action_timeout,
                )
                .unwrap_or(chrono::Duration::zero());
                self.start + limit
            } else {
                self.last_activity
            };
            self.send(context, end);
            return false;
        }

        match command {
            RumCommand::StartResource { resource_key, .. } => {
                self.pending_resources.push(resource_key.clone());
                self.last_activity = now;
            }
            RumCommand::StopResource { resource_key, .. } => {
                if self.take_pending(resource_key) {
                    self.resource_count += 1;
                    self.last_activity = now;
                }
            }
            RumCommand::StopResourceWithError { resource_key, .. } => {
                if self.take_pending(resource_key) {
                    self.error_count += 1;
                    self.last_activity = now;
                }
            }
            RumCommand::AddError { .. } => {
                self.error_count += 1;
            }
            RumCommand::StopUserAction {
                action_type, name, ..
            } if self.is_continuous && *action_type == self.action_type => {
                if let Some(name) = name {
                    self.name = name.clone();
                }
                self.send(context, now);
                return false;
            }
            _ => {}
        }
        true
    }
}
