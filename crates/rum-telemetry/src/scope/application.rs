use super::{Scope, ScopeDependencies, SessionScope};
use crate::command::RumCommand;
use crate::context::RumContext;
use std::sync::Arc;

/// Root of the scope tree, alive for the lifetime of the monitor.
///
/// Holds at most one session. The first session starts with the first
/// `StartView`; until then every other command is accepted and ignored.
pub struct ApplicationScope {
    context: RumContext,
    dependencies: Arc<ScopeDependencies>,
    session: Option<SessionScope>,
}

impl ApplicationScope {
    /// Creates the application scope.
    pub fn new(rum_application_id: impl Into<String>, dependencies: Arc<ScopeDependencies>) -> Self {
        Self {
            context: RumContext::new(rum_application_id),
            dependencies,
            session: None,
        }
    }

    /// Applies `command` to the tree. Always returns `true`.
    pub fn process(&mut self, command: &RumCommand) -> bool {
        if self.session.is_none() {
            if matches!(command, RumCommand::StartView { .. }) {
                let mut session = SessionScope::new(Arc::clone(&self.dependencies), command.time());
                tracing::debug!(session_id = %session.session_id(), "Session started");
                session.process(command, &self.context);
                self.session = Some(session);
            }
            return true;
        }

        let Some(session) = self.session.as_mut() else {
            return true;
        };

        if !session.process(command, &self.context)
            && let Some(expired) = self.session.take()
        {
            let expired_id = expired.session_id();
            let mut renewed = SessionScope::from_expired(expired, command.time());
            tracing::debug!(
                expired_session_id = %expired_id,
                session_id = %renewed.session_id(),
                transferred_views = renewed.view_scopes().len(),
                "Session expired, started a new one"
            );
            renewed.process(command, &self.context);
            self.session = Some(renewed);
        }

        true
    }

    /// Returns the context of the deepest active scope.
    pub fn context(&self) -> RumContext {
        match &self.session {
            Some(session) => session.active_context(&self.context),
            None => self.context.clone(),
        }
    }

    /// Returns the current session, if one was started.
    pub fn session_scope(&self) -> Option<&SessionScope> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{
        add_action, at, dependencies, start_resource, start_view, stop_resource, stop_view, t0,
    };
    use super::*;
    use crate::event::RumEvent;

    #[test]
    fn test_root_context() {
        let (dependencies, _writer) = dependencies();
        let scope = ApplicationScope::new("abc-123", dependencies);

        let context = scope.context();
        assert_eq!(context.rum_application_id, "abc-123");
        assert!(context.session_id.is_nil());
        assert!(context.active_view_id.is_none());
        assert!(context.active_view_uri.is_none());
        assert!(context.active_user_action_id.is_none());
    }

    #[test]
    fn test_first_view_starts_session() {
        let (dependencies, _writer) = dependencies();
        let mut scope = ApplicationScope::new("app", dependencies);

        assert!(scope.session_scope().is_none());
        assert!(scope.process(&start_view(t0(), "Home")));
        assert!(scope.session_scope().is_some());
        assert!(scope.context().has_session());
    }

    #[test]
    fn test_commands_before_first_view_are_ignored() {
        let (dependencies, writer) = dependencies();
        let mut scope = ApplicationScope::new("app", dependencies);

        assert!(scope.process(&stop_view(t0(), "Home")));
        assert!(scope.process(&add_action(t0(), "Tap")));
        assert!(scope.process(&start_resource(t0(), "r")));
        assert!(scope.process(&stop_resource(t0(), "r")));
        assert!(scope.session_scope().is_none());
        assert!(writer.events().is_empty());
    }

    #[test]
    fn test_expired_session_is_replaced_and_views_transferred() {
        let (dependencies, _writer) = dependencies();
        let max = dependencies.session.max_duration;
        let mut scope = ApplicationScope::new("app", dependencies);

        scope.process(&start_view(t0(), "Home"));
        let first = scope.session_scope().map(SessionScope::session_id);
        let first_view = scope
            .session_scope()
            .and_then(SessionScope::active_view)
            .map(|v| (v.view_id(), v.identity().clone()));

        assert!(scope.process(&add_action(at(max), "Tap")));

        let second = scope.session_scope().map(SessionScope::session_id);
        assert_ne!(first, second);
        let views = scope.session_scope().map(SessionScope::view_scopes).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(Some((views[0].view_id(), views[0].identity().clone())), first_view);
    }

    #[test]
    fn test_command_is_applied_to_renewed_session() {
        let (dependencies, _writer) = dependencies();
        let max = dependencies.session.max_duration;
        let mut scope = ApplicationScope::new("app", dependencies);

        scope.process(&start_view(t0(), "Home"));
        scope.process(&start_view(at(max), "Cart"));

        let session = scope.session_scope().unwrap();
        assert_eq!(session.active_view().map(|v| v.uri()), Some("Cart"));
        assert_eq!(scope.context().session_id, session.session_id());
    }

    #[test]
    fn test_stopped_views_are_not_transferred() {
        let (dependencies, writer) = dependencies();
        let max = dependencies.session.max_duration;
        let mut scope = ApplicationScope::new("app", dependencies);

        scope.process(&start_view(t0(), "Home"));
        scope.process(&start_resource(at(std::time::Duration::from_secs(1)), "slow"));
        scope.process(&stop_view(at(std::time::Duration::from_secs(2)), "Home"));
        assert_eq!(scope.session_scope().map(|s| s.view_scopes().len()), Some(1));

        scope.process(&add_action(at(max), "Tap"));
        assert_eq!(scope.session_scope().map(|s| s.view_scopes().len()), Some(0));

        let views = writer
            .events()
            .into_iter()
            .filter(|e| matches!(e, RumEvent::View(_)))
            .count();
        assert_eq!(views, 1);
    }
}
