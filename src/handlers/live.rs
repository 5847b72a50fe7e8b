use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    Extension,
};
use futures_util::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{ride, user};
use crate::error::{AppError, AppResult};
use crate::handlers::rides::RideResponse;
use crate::tracking::hub::Subscription;
use crate::tracking::ledger::ledger_for;
use crate::AppState;

async fn snapshot(state: &AppState, ride: ride::Model) -> AppResult<Value> {
    let ledger = ledger_for(&state.db, &ride).await?;
    Ok(serde_json::json!({
        "type": "snapshot",
        "ride": RideResponse::new(ride, ledger),
    }))
}

async fn reload_snapshot(state: &AppState, ride_id: Uuid) -> AppResult<Value> {
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;
    snapshot(state, ride).await
}

/// Subscribe to live updates of a ride over a WebSocket.
///
/// Open to the driver and to passengers holding an accepted booking.
pub async fn ride_live(
    State(state): State<AppState>,
    Extension(user): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    if ride.driver_id != user.id {
        let bookings = booking::Entity::find()
            .filter(booking::Column::RideId.eq(ride.id))
            .filter(booking::Column::PassengerId.eq(user.id))
            .filter(booking::Column::Status.eq(BookingStatus::Accepted))
            .count(&state.db)
            .await?;

        if bookings == 0 {
            return Err(AppError::Forbidden(
                "Only the driver and passengers can follow this ride".to_string(),
            ));
        }
    }

    // Nothing will be published for a finished ride
    if ride.status.is_terminal() {
        let snapshot = snapshot(&state, ride).await?;
        return Ok(ws.on_upgrade(move |socket| async move {
            let (mut sender, _) = socket.split();
            if send_json(&mut sender, &snapshot).await {
                let _ = sender.send(Message::Close(None)).await;
            }
        }));
    }

    // Subscribe before reading the snapshot so no update falls in between
    let subscription = state.hub.subscribe(ride.id);
    let snapshot = snapshot(&state, ride).await?;

    Ok(ws.on_upgrade(move |socket| forward_events(socket, state, ride_id, snapshot, subscription)))
}

/// Returns false once the client is gone
async fn send_json(sender: &mut SplitSink<WebSocket, Message>, value: &impl serde::Serialize) -> bool {
    let Ok(text) = serde_json::to_string(value) else {
        return true;
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn forward_events(
    socket: WebSocket,
    state: AppState,
    ride_id: Uuid,
    snapshot: Value,
    mut subscription: Subscription,
) {
    let (mut sender, mut receiver) = socket.split();

    if !send_json(&mut sender, &snapshot).await {
        return;
    }

    tracing::debug!(%ride_id, "Live subscriber connected");

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Ok(event) => {
                    if !send_json(&mut sender, &event).await || event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed seat or pickup changes are covered by a fresh snapshot
                    tracing::debug!(%ride_id, skipped, "Live subscriber lagged, resending snapshot");
                    match reload_snapshot(&state, ride_id).await {
                        Ok(snapshot) if send_json(&mut sender, &snapshot).await => {}
                        _ => break,
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    tracing::debug!(%ride_id, "Live subscriber disconnected");
}
