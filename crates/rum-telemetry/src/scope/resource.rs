use super::{Scope, ScopeDependencies, elapsed_ns, event_context};
use crate::command::RumCommand;
use crate::context::RumContext;
use crate::event::{ErrorEvent, ErrorResource, ErrorSource, ResourceEvent, RumEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A network resource loading on a view.
///
/// Ends on the stop command carrying its key, emitting either a resource
/// record or a network error record.
pub struct ResourceScope {
    dependencies: Arc<ScopeDependencies>,
    resource_key: String,
    resource_id: Uuid,
    url: String,
    method: String,
    start: DateTime<Utc>,
    action_id: Option<Uuid>,
}

impl ResourceScope {
    pub(crate) fn new(
        dependencies: Arc<ScopeDependencies>,
        context: &RumContext,
        resource_key: String,
        url: String,
        method: String,
        start: DateTime<Utc>,
    ) -> Self {
        let resource_id = dependencies.id_generator.generate();
        Self {
            dependencies,
            resource_key,
            resource_id,
            url,
            method,
            start,
            action_id: context.active_user_action_id,
        }
    }

    /// Returns the key pairing the start and stop commands.
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    /// Returns the resource identifier.
    pub fn resource_id(&self) -> Uuid {
        self.resource_id
    }
}

impl Scope for ResourceScope {
    fn process(&mut self, command: &RumCommand, context: &RumContext) -> bool {
        match command {
            RumCommand::StopResource {
                time,
                resource_key,
                kind,
                http_status_code,
                size,
            } if *resource_key == self.resource_key => {
                let event = RumEvent::Resource(ResourceEvent {
                    context: event_context(context, *time),
                    resource_id: self.resource_id,
                    action_id: self.action_id,
                    url: self.url.clone(),
                    method: self.method.clone(),
                    kind: *kind,
                    status_code: *http_status_code,
                    size: *size,
                    duration_ns: elapsed_ns(self.start, *time),
                });
                self.dependencies.writer.write(&event);
                false
            }
            RumCommand::StopResourceWithError {
                time,
                resource_key,
                message,
                http_status_code,
            } if *resource_key == self.resource_key => {
                let event = RumEvent::Error(ErrorEvent {
                    context: event_context(context, *time),
                    error_id: self.dependencies.id_generator.generate(),
                    action_id: self.action_id,
                    message: message.clone(),
                    source: ErrorSource::Network,
                    stack: None,
                    resource: Some(ErrorResource {
                        url: self.url.clone(),
                        method: self.method.clone(),
                        status_code: *http_status_code,
                    }),
                    crash_type: None,
                });
                self.dependencies.writer.write(&event);
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{dependencies, start_resource, stop_resource, t0, at};
    use super::*;
    use std::time::Duration;

    fn resource(context: &RumContext) -> (ResourceScope, crate::event::MemoryEventWriter) {
        let (dependencies, writer) = dependencies();
        let RumCommand::StartResource {
            resource_key,
            url,
            method,
            time,
        } = start_resource(t0(), "r1")
        else {
            unreachable!()
        };
        (
            ResourceScope::new(dependencies, context, resource_key, url, method, time),
            writer,
        )
    }

    #[test]
    fn test_stop_with_other_key_keeps_resource_alive() {
        let context = RumContext::new("app");
        let (mut scope, writer) = resource(&context);

        assert!(scope.process(&stop_resource(at(Duration::from_millis(5)), "r2"), &context));
        assert!(writer.events().is_empty());
    }

    #[test]
    fn test_stop_emits_resource_record() {
        let mut context = RumContext::new("app");
        context.active_user_action_id = Some(Uuid::from_u128(99));
        let (mut scope, writer) = resource(&context);
        context.active_user_action_id = None;

        assert!(!scope.process(&stop_resource(at(Duration::from_millis(250)), "r1"), &context));

        let events = writer.events();
        let [RumEvent::Resource(event)] = events.as_slice() else {
            panic!("expected one resource record, got {events:?}");
        };
        assert_eq!(event.url, "https://example.com/r1");
        assert_eq!(event.method, "GET");
        assert_eq!(event.status_code, Some(200));
        assert_eq!(event.duration_ns, 250_000_000);
        assert_eq!(event.action_id, Some(Uuid::from_u128(99)));
    }

    #[test]
    fn test_stop_with_error_emits_network_error() {
        let context = RumContext::new("app");
        let (mut scope, writer) = resource(&context);

        let command = RumCommand::StopResourceWithError {
            time: at(Duration::from_millis(10)),
            resource_key: "r1".to_string(),
            message: "connection reset".to_string(),
            http_status_code: None,
        };
        assert!(!scope.process(&command, &context));

        let events = writer.events();
        let [RumEvent::Error(event)] = events.as_slice() else {
            panic!("expected one error record, got {events:?}");
        };
        assert_eq!(event.source, ErrorSource::Network);
        assert_eq!(event.message, "connection reset");
        assert_eq!(
            event.resource.as_ref().map(|r| r.url.as_str()),
            Some("https://example.com/r1")
        );
    }
}
