//! Fan-out of domain events to NATS.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    prefix: String,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>, prefix: impl Into<String>) -> Self {
        Self { nats, prefix: prefix.into() }
    }

    /// A publisher that drops everything; used when `NATS_URL` is unset.
    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub fn subject_for(&self, event: &DomainEvent) -> String {
        format!("{}.{}", self.prefix, event.subject())
    }

    /// Publishes each event. Failures are logged; callers never see them.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let subject = self.subject_for(&event);
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(%subject, error = %e, "could not encode event");
                    continue;
                }
            };
            match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => tracing::debug!(%subject, "event published"),
                Err(e) => tracing::warn!(%subject, error = %e, "event publish failed"),
            }
        }
    }
}
