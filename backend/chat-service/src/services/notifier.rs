use crate::metrics::{DELIVERY_FAILURES, EVENTS_DELIVERED};
use crate::models::UserId;
use crate::websocket::events::RealtimeEvent;
use crate::websocket::{ConnectionRegistry, OutboundFrame};
use std::collections::HashSet;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Pushes events to every live session of the given users.
///
/// A failed send to one session never affects the others and is never
/// returned to the caller.
#[derive(Clone)]
pub struct Notifier {
    registry: ConnectionRegistry,
}

impl Notifier {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn broadcast(&self, user_ids: &[UserId], event: &RealtimeEvent) -> DeliveryReport {
        let event_type = event.event_type();
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(event = event_type, error = %e, "failed to serialize realtime event");
                return DeliveryReport::default();
            }
        };

        let mut report = DeliveryReport::default();
        let mut seen = HashSet::with_capacity(user_ids.len());
        for user_id in user_ids {
            if !seen.insert(user_id) {
                continue;
            }
            for session in self.registry.sessions_of(user_id).await {
                match session.send(OutboundFrame::Event(frame.clone())) {
                    Ok(()) => report.delivered += 1,
                    Err(_) => {
                        report.failed += 1;
                        warn!(user_id = %user_id, event = event_type, "dropping event for closed session");
                        self.registry.unregister(user_id, session.id()).await;
                    }
                }
            }
        }

        EVENTS_DELIVERED
            .with_label_values(&[event_type])
            .inc_by(report.delivered as u64);
        if report.failed > 0 {
            DELIVERY_FAILURES
                .with_label_values(&[event_type])
                .inc_by(report.failed as u64);
        }
        debug!(
            event = event_type,
            delivered = report.delivered,
            failed = report.failed,
            "realtime event fanned out"
        );
        report
    }

    /// Fire-and-forget fan-out on the runtime; the caller does not wait
    pub fn dispatch(&self, user_ids: Vec<UserId>, event: RealtimeEvent) -> JoinHandle<DeliveryReport> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.broadcast(&user_ids, &event).await })
    }
}
