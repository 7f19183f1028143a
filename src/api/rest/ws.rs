use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::engine::notifications::OutboundEvent;
use crate::error::AppError;
use crate::messaging::topology::routing_keys;
use crate::models::driver::Driver;
use crate::state::AppState;

const DRIVER_REGISTERED: &str = "driver.cmd.register";

#[derive(Debug, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

#[derive(Deserialize)]
pub struct DriverSocketParams {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "packageSlug")]
    pub package_slug: String,
}

#[derive(Deserialize)]
pub struct RiderSocketParams {
    #[serde(rename = "userID")]
    pub user_id: String,
}

pub async fn drivers_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<DriverSocketParams>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if params.user_id.trim().is_empty() || params.package_slug.trim().is_empty() {
        return Err(AppError::BadRequest(
            "userID and packageSlug are required".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| handle_driver_socket(socket, state, params)))
}

pub async fn riders_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<RiderSocketParams>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if params.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("userID is required".to_string()));
    }

    Ok(ws.on_upgrade(move |socket| handle_rider_socket(socket, state, params.user_id)))
}

/// Drops a dispatch command for the trip just pushed to this connection. The
/// matcher publishes at least once, so the same offer can arrive twice in a
/// row; a driver holds one trip at a time, so only the latest is remembered.
#[derive(Default)]
struct OfferFilter {
    last_trip: Option<String>,
}

impl OfferFilter {
    fn admit(&mut self, event: &OutboundEvent) -> bool {
        let Some(payload) = &event.payload else {
            return true;
        };
        if self.last_trip.as_deref() == Some(payload.trip.id.as_str()) {
            return false;
        }
        self.last_trip = Some(payload.trip.id.clone());
        true
    }
}

fn registration_greeting(driver: &Driver) -> Result<String, serde_json::Error> {
    let data = serde_json::to_value(driver)?;
    serde_json::to_string(&WsMessage {
        kind: DRIVER_REGISTERED.to_string(),
        data,
    })
}

fn to_ws_text(event: &OutboundEvent) -> Option<String> {
    let data = match &event.payload {
        Some(payload) => serde_json::to_value(payload).ok()?,
        None => Value::Null,
    };

    serde_json::to_string(&WsMessage {
        kind: event.routing_key.clone(),
        data,
    })
    .map_err(|err| warn!(error = %err, "failed to serialize event for ws"))
    .ok()
}

async fn handle_driver_socket(socket: WebSocket, state: Arc<AppState>, params: DriverSocketParams) {
    let (mut sender, mut receiver) = socket.split();
    let events = BroadcastStream::new(state.events_tx.subscribe());
    let driver_id = params.user_id;

    let (driver, session) = match state.registry.register_session(&driver_id, &params.package_slug) {
        Ok(registered) => registered,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "driver socket refused");
            let refusal = json!({ "type": "error", "data": { "error": err.to_string() } });
            let _ = sender.send(Message::Text(refusal.to_string())).await;
            let _ = sender.close().await;
            return;
        }
    };

    info!(driver_id = %driver_id, session, "driver websocket connected");

    let greeting = match registration_greeting(&driver) {
        Ok(greeting) => greeting,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "failed to serialize driver");
            let _ = state.registry.unregister_session(&driver_id, session);
            let _ = sender.close().await;
            return;
        }
    };

    let owner = driver_id.clone();
    let send_task = tokio::spawn(async move {
        if sender.send(Message::Text(greeting)).await.is_err() {
            return;
        }

        let mut offers = OfferFilter::default();
        let events = events.filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(error = %err, "driver socket lagged behind events");
                    None
                }
            }
        });
        let mut events = std::pin::pin!(events);

        while let Some(event) = events.next().await {
            if event.routing_key != routing_keys::DRIVER_CMD_REQUEST || event.owner_id != owner {
                continue;
            }
            if !offers.admit(&event) {
                debug!(driver_id = %owner, "duplicate trip offer dropped");
                continue;
            }
            let Some(text) = to_ws_text(&event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reader = driver_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                debug!(driver_id = %reader, message = %text, "driver message received");
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    match state.registry.unregister_session(&driver_id, session) {
        Ok(true) => {}
        Ok(false) => {
            debug!(driver_id = %driver_id, session, "driver re-registered elsewhere; left online")
        }
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "driver already offline on disconnect")
        }
    }
    info!(driver_id = %driver_id, "driver websocket disconnected");
}

async fn handle_rider_socket(socket: WebSocket, state: Arc<AppState>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    info!(user_id = %user_id, "rider websocket connected");

    let owner = user_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "rider socket lagged behind events");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            if event.routing_key != routing_keys::TRIP_NO_DRIVERS_FOUND || event.owner_id != owner {
                continue;
            }
            let Some(text) = to_ws_text(&event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(user_id = %user_id, "rider websocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::{registration_greeting, to_ws_text, OfferFilter};
    use crate::engine::registry::DriverRegistry;
    use crate::engine::notifications::OutboundEvent;
    use crate::models::message::TripEventData;
    use crate::models::trip::{RideFare, Trip, TripStatus};

    fn offer(trip_id: &str) -> OutboundEvent {
        OutboundEvent {
            routing_key: "driver.cmd.request".to_string(),
            owner_id: "d1".to_string(),
            payload: Some(TripEventData {
                trip: Trip {
                    id: trip_id.to_string(),
                    user_id: "r1".to_string(),
                    status: TripStatus::DriverAssigned,
                    selected_fare: RideFare {
                        id: "fare-1".to_string(),
                        user_id: "r1".to_string(),
                        package_slug: "sedan".to_string(),
                        total_price_in_cents: 1200,
                        route: None,
                    },
                    driver: None,
                },
            }),
        }
    }

    #[test]
    fn repeated_offer_for_same_trip_is_dropped() {
        let mut filter = OfferFilter::default();

        assert!(filter.admit(&offer("t1")));
        assert!(!filter.admit(&offer("t1")));
        assert!(filter.admit(&offer("t2")));
        assert!(!filter.admit(&offer("t2")));
        assert_eq!(filter.last_trip.as_deref(), Some("t2"));
    }

    #[test]
    fn greeting_carries_the_registered_driver() {
        let registry = DriverRegistry::new();
        let driver = registry.register("d1", "luxury").unwrap();

        let text = registration_greeting(&driver).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "driver.cmd.register");
        assert_eq!(value["data"]["id"], "d1");
        assert_eq!(value["data"]["packageSlug"], "luxury");
    }

    #[test]
    fn event_is_wrapped_with_routing_key_as_type() {
        let text = to_ws_text(&offer("t1")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "driver.cmd.request");
        assert_eq!(value["data"]["trip"]["id"], "t1");
        assert_eq!(value["data"]["trip"]["selectedFare"]["packageSlug"], "sedan");
    }
}
