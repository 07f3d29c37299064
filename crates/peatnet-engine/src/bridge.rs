//! Outbound event bridge from the engine's [`EventBus`] to NATS.
//!
//! # Subject Convention
//!
//! - **Chat events:** `peatnet.events.{chat_id}`
//! - **Court events:** `peatnet.events.court`
//!
//! Payloads are the JSON form of [`EngineEvent`], tagged by `type`. Delivery
//! failures are logged and dropped; the state change that produced the event
//! has already committed.
//!
//! [`EventBus`]: peatnet_core::events::EventBus

use peatnet_types::EngineEvent;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Prefix shared by every outbound subject.
const EVENT_PREFIX: &str = "peatnet.events";

/// NATS subject an event is published on.
pub fn subject(event: &EngineEvent) -> String {
    event.chat_id().map_or_else(
        || format!("{EVENT_PREFIX}.court"),
        |chat| format!("{EVENT_PREFIX}.{chat}"),
    )
}

/// Forward events until the bus closes or shutdown is signalled.
pub async fn run_event_bridge(
    client: async_nats::Client,
    mut events: broadcast::Receiver<EngineEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("event bridge started");
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => publish(&client, &event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bridge lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    if let Err(err) = client.flush().await {
        warn!(error = %err, "failed to flush NATS on shutdown");
    }
    info!("event bridge stopped");
}

async fn publish(client: &async_nats::Client, event: &EngineEvent) {
    let subject = subject(event);
    let payload = match serde_json::to_vec(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(event = event.kind(), error = %err, "failed to serialize event");
            return;
        }
    };
    match client.publish(subject.clone(), payload.into()).await {
        Ok(()) => debug!(%subject, event = event.kind(), "event published"),
        Err(err) => warn!(%subject, error = %err, "failed to publish event"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use peatnet_types::{CaseId, ChatId, CourtType, UserId};

    use super::*;

    #[test]
    fn chat_events_go_to_their_chat() {
        let event = EngineEvent::PerforationInflicted {
            chat_id: ChatId(-100_500),
            user_id: UserId(7),
            health_loss: 20,
            at: Utc::now(),
        };
        assert_eq!(subject(&event), "peatnet.events.-100500");
    }

    #[test]
    fn court_events_share_one_subject() {
        let event = EngineEvent::CaseFiled {
            case_id: CaseId::new(),
            court_type: CourtType::Kishka,
            plaintiff: UserId(1),
            defendant: UserId(2),
            decide_at: Utc::now(),
        };
        assert_eq!(subject(&event), "peatnet.events.court");

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("type").and_then(serde_json::Value::as_str), Some("case_filed"));
        assert_eq!(json.get("court_type").and_then(serde_json::Value::as_str), Some("kishka"));
    }
}
