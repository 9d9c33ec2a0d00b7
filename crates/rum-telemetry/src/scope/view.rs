use super::{ResourceScope, Scope, ScopeDependencies, UserActionScope, elapsed_ns, event_context};
use crate::command::{RumCommand, ViewIdentity};
use crate::context::RumContext;
use crate::event::{ErrorEvent, RumEvent, ViewEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A view shown by the host.
///
/// Only an active view accepts new actions, resources and errors. Once
/// stopped it emits its record and lingers, inactive, until its pending
/// resources and user action have finished.
pub struct ViewScope {
    dependencies: Arc<ScopeDependencies>,
    identity: ViewIdentity,
    view_id: Uuid,
    uri: String,
    start: DateTime<Utc>,
    is_active: bool,
    action_count: u64,
    resource_count: u64,
    error_count: u64,
    user_action: Option<UserActionScope>,
    resources: Vec<ResourceScope>,
}

impl ViewScope {
    pub(crate) fn new(
        dependencies: Arc<ScopeDependencies>,
        identity: ViewIdentity,
        uri: String,
        start: DateTime<Utc>,
    ) -> Self {
        let view_id = dependencies.id_generator.generate();
        tracing::trace!(view = %identity, %view_id, "View started");
        Self {
            dependencies,
            identity,
            view_id,
            uri,
            start,
            is_active: true,
            action_count: 0,
            resource_count: 0,
            error_count: 0,
            user_action: None,
            resources: Vec::new(),
        }
    }

    /// Returns the identity the host started the view with.
    pub fn identity(&self) -> &ViewIdentity {
        &self.identity
    }

    /// Returns the view identifier.
    pub fn view_id(&self) -> Uuid {
        self.view_id
    }

    /// Returns the view URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns whether the view has not been stopped yet.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the user action in progress, if any.
    pub fn user_action(&self) -> Option<&UserActionScope> {
        self.user_action.as_ref()
    }

    /// Returns the resources still loading.
    pub fn resources(&self) -> &[ResourceScope] {
        &self.resources
    }

    /// Returns the number of completed user actions.
    pub fn action_count(&self) -> u64 {
        self.action_count
    }

    /// Returns the number of completed resources.
    pub fn resource_count(&self) -> u64 {
        self.resource_count
    }

    /// Returns the number of errors raised on the view.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Context seen by this view's children.
    pub(crate) fn context(&self, parent: &RumContext) -> RumContext {
        RumContext {
            active_view_id: Some(self.view_id),
            active_view_uri: Some(self.uri.clone()),
            active_user_action_id: self.user_action.as_ref().map(UserActionScope::action_id),
            ..parent.clone()
        }
    }

    fn stop(&mut self, context: &RumContext, time: DateTime<Utc>) {
        self.is_active = false;
        let event = RumEvent::View(ViewEvent {
            context: event_context(context, self.start),
            time_spent_ns: elapsed_ns(self.start, time),
            action_count: self.action_count,
            resource_count: self.resource_count,
            error_count: self.error_count,
        });
        self.dependencies.writer.write(&event);
        tracing::trace!(view = %self.identity, view_id = %self.view_id, "View stopped");
    }

    fn start_action(&mut self, command: &RumCommand) {
        if self.user_action.is_some() {
            tracing::debug!(
                view = %self.identity,
                command = command.name(),
                "User action already in progress, ignoring"
            );
            return;
        }

        let (action_type, name, time, is_continuous) = match command {
            RumCommand::AddUserAction {
                action_type,
                name,
                time,
            } => (*action_type, name, *time, false),
            RumCommand::StartUserAction {
                action_type,
                name,
                time,
            } => (*action_type, name, *time, true),
            _ => return,
        };

        self.user_action = Some(UserActionScope::new(
            Arc::clone(&self.dependencies),
            action_type,
            name.clone(),
            time,
            is_continuous,
        ));
    }
}

impl Scope for ViewScope {
    fn process(&mut self, command: &RumCommand, parent: &RumContext) -> bool {
        let context = self.context(parent);
        let action_ended = self
            .user_action
            .as_mut()
            .is_some_and(|action| !action.process(command, &context));
        if action_ended {
            self.user_action = None;
            self.action_count += 1;
        }

        let context = self.context(parent);
        let before = self.resources.len();
        self.resources
            .retain_mut(|resource| resource.process(command, &context));
        let finished = (before - self.resources.len()) as u64;
        match command {
            RumCommand::StopResource { .. } => self.resource_count += finished,
            RumCommand::StopResourceWithError { .. } => self.error_count += finished,
            _ => {}
        }

        if self.is_active {
            match command {
                RumCommand::StartView { identity, time, .. } if *identity != self.identity => {
                    self.stop(&context, *time);
                }
                RumCommand::StopView { identity, time } if *identity == self.identity => {
                    self.stop(&context, *time);
                }
                RumCommand::StartResource {
                    time,
                    resource_key,
                    url,
                    method,
                } => {
                    self.resources.push(ResourceScope::new(
                        Arc::clone(&self.dependencies),
                        &context,
                        resource_key.clone(),
                        url.clone(),
                        method.clone(),
                        *time,
                    ));
                }
                RumCommand::AddUserAction { .. } | RumCommand::StartUserAction { .. } => {
                    self.start_action(command);
                }
                RumCommand::AddError {
                    time,
                    message,
                    source,
                    stack,
                } => {
                    self.error_count += 1;
                    let event = RumEvent::Error(ErrorEvent {
                        context: event_context(&context, *time),
                        error_id: self.dependencies.id_generator.generate(),
                        action_id: context.active_user_action_id,
                        message: message.clone(),
                        source: *source,
                        stack: stack.clone(),
                        resource: None,
                        crash_type: None,
                    });
                    self.dependencies.writer.write(&event);
                }
                _ => {}
            }
        }

        self.is_active || !self.resources.is_empty() || self.user_action.is_some()
    }
}
