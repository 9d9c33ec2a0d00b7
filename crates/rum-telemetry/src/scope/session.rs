use super::{Scope, ScopeDependencies, ViewScope, has_elapsed};
use crate::command::RumCommand;
use crate::context::RumContext;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A user session.
///
/// Expires once it is older than the maximum session duration or nothing
/// happened for the inactivity timeout. An expired session processes nothing
/// and reports itself as ended so the application scope can replace it.
pub struct SessionScope {
    dependencies: Arc<ScopeDependencies>,
    session_id: Uuid,
    start: DateTime<Utc>,
    last_interaction: DateTime<Utc>,
    view_scopes: Vec<ViewScope>,
}

impl SessionScope {
    pub(crate) fn new(dependencies: Arc<ScopeDependencies>, start: DateTime<Utc>) -> Self {
        let session_id = dependencies.id_generator.generate();
        Self {
            dependencies,
            session_id,
            start,
            last_interaction: start,
            view_scopes: Vec::new(),
        }
    }

    /// Starts the session replacing `expired`, taking over its active views.
    pub(crate) fn from_expired(expired: SessionScope, start: DateTime<Utc>) -> Self {
        let mut session = Self::new(Arc::clone(&expired.dependencies), start);
        session.view_scopes = expired
            .view_scopes
            .into_iter()
            .filter(ViewScope::is_active)
            .collect();
        session
    }

    /// Returns the session identifier.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns when the session started.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the views owned by this session, active or lingering.
    pub fn view_scopes(&self) -> &[ViewScope] {
        &self.view_scopes
    }

    /// Returns the most recently started view that is still active.
    pub fn active_view(&self) -> Option<&ViewScope> {
        self.view_scopes.iter().rev().find(|view| view.is_active())
    }

    /// Context seen by this session's views.
    pub(crate) fn context(&self, parent: &RumContext) -> RumContext {
        RumContext {
            session_id: self.session_id,
            ..parent.clone()
        }
    }

    /// Context of the deepest active scope under this session.
    pub(crate) fn active_context(&self, parent: &RumContext) -> RumContext {
        let context = self.context(parent);
        match self.active_view() {
            Some(view) => view.context(&context),
            None => context,
        }
    }

    /// Returns whether the session is over at `time`.
    pub fn is_expired(&self, time: DateTime<Utc>) -> bool {
        let timing = &self.dependencies.session;
        has_elapsed(self.start, time, timing.max_duration)
            || has_elapsed(self.last_interaction, time, timing.inactivity_timeout)
    }
}

impl Scope for SessionScope {
    fn process(&mut self, command: &RumCommand, parent: &RumContext) -> bool {
        let time = command.time();
        if self.is_expired(time) {
            return false;
        }
        self.last_interaction = time;

        let context = self.context(parent);
        self.view_scopes
            .retain_mut(|view| view.process(command, &context));

        if let RumCommand::StartView {
            time,
            identity,
            uri,
        } = command
            && !self
                .view_scopes
                .iter()
                .any(|view| view.is_active() && view.identity() == identity)
        {
            self.view_scopes.push(ViewScope::new(
                Arc::clone(&self.dependencies),
                identity.clone(),
                uri.clone(),
                *time,
            ));
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{at, dependencies, start_view, stop_view, t0};
    use super::*;
    use crate::event::RumEvent;
    use std::time::Duration;

    #[test]
    fn test_start_view_creates_view_once() {
        let (dependencies, _writer) = dependencies();
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        assert!(session.process(&start_view(t0(), "Home"), &app));
        assert!(session.process(&start_view(at(Duration::from_secs(1)), "Home"), &app));
        assert_eq!(session.view_scopes().len(), 1);
    }

    #[test]
    fn test_new_view_replaces_active_one() {
        let (dependencies, writer) = dependencies();
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        session.process(&start_view(t0(), "Home"), &app);
        session.process(&start_view(at(Duration::from_secs(3)), "Cart"), &app);

        assert_eq!(session.view_scopes().len(), 1);
        assert_eq!(session.active_view().map(|v| v.uri()), Some("Cart"));
        let views = writer
            .events()
            .into_iter()
            .filter(|e| matches!(e, RumEvent::View(_)))
            .count();
        assert_eq!(views, 1);
    }

    #[test]
    fn test_expires_at_max_duration() {
        let (dependencies, _writer) = dependencies();
        let max = dependencies.session.max_duration;
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        let mut time = t0();
        while time < at(max) {
            time += chrono::Duration::minutes(10);
            if time >= at(max) {
                break;
            }
            assert!(session.process(&stop_view(time, "none"), &app));
        }
        assert!(session.is_expired(at(max)));
        assert!(!session.process(&stop_view(at(max), "none"), &app));
    }

    #[test]
    fn test_expires_after_inactivity() {
        let (dependencies, _writer) = dependencies();
        let timeout = dependencies.session.inactivity_timeout;
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        assert!(session.process(&start_view(t0(), "Home"), &app));
        assert!(!session.is_expired(at(timeout - Duration::from_millis(1))));
        assert!(!session.process(&stop_view(at(timeout), "Home"), &app));
    }

    #[test]
    fn test_from_expired_keeps_only_active_views() {
        let (dependencies, _writer) = dependencies();
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        session.process(&start_view(t0(), "Home"), &app);
        session.process(
            &crate::command::RumCommand::StartResource {
                time: at(Duration::from_millis(1)),
                resource_key: "r".into(),
                url: "https://example.com".into(),
                method: "GET".into(),
            },
            &app,
        );
        session.process(&start_view(at(Duration::from_millis(2)), "Cart"), &app);
        assert_eq!(session.view_scopes().len(), 2);

        let old_id = session.session_id();
        let cart_id = session.active_view().map(ViewScope::view_id);
        let renewed = SessionScope::from_expired(session, at(Duration::from_secs(5)));

        assert_ne!(renewed.session_id(), old_id);
        assert_eq!(renewed.view_scopes().len(), 1);
        assert_eq!(renewed.active_view().map(ViewScope::view_id), cart_id);
    }

    #[test]
    fn test_active_context_reflects_deepest_scope() {
        let (dependencies, _writer) = dependencies();
        let mut session = SessionScope::new(dependencies, t0());
        let app = RumContext::new("app");

        assert_eq!(session.active_context(&app).session_id, session.session_id());
        assert!(session.active_context(&app).active_view_id.is_none());

        session.process(&start_view(t0(), "Home"), &app);
        let context = session.active_context(&app);
        assert_eq!(context.active_view_uri.as_deref(), Some("Home"));
        assert_eq!(context.rum_application_id, "app");
    }
}
