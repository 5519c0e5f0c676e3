use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::models::order::{OrderEvent, OrderStatus};
use crate::models::principal::{Principal, Role};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

/// Customers follow their own orders, drivers their own plus newly posted work.
fn is_visible(event: &OrderEvent, principal: &Principal) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::Customer => event.customer_id == principal.id,
        Role::Driver => {
            event.driver_id == Some(principal.id) || event.status == OrderStatus::Pending
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, principal: Principal) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.order_events_tx.subscribe());

    info!(principal_id = %principal.id, role = %principal.role, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "websocket subscriber lagged");
                    continue;
                }
            };
            if !is_visible(&event, &principal) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize order event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    until_either_finishes(send_task, recv_task).await;

    info!(principal_id = %principal.id, "websocket client disconnected");
}

/// Returns when one task ends and aborts the other.
async fn until_either_finishes(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use tokio::sync::oneshot;

    use super::{is_visible, until_either_finishes};
    use crate::models::order::{OrderEvent, OrderStatus, OrderType};
    use crate::models::principal::{Principal, Role};

    fn event(status: OrderStatus, customer_id: Uuid, driver_id: Option<Uuid>) -> OrderEvent {
        OrderEvent {
            order_id: Uuid::new_v4(),
            order_type: OrderType::Delivery,
            status,
            customer_id,
            driver_id,
            at: Utc::now(),
        }
    }

    #[test]
    fn customers_only_see_their_orders() {
        let me = Principal::new(Uuid::new_v4(), Role::Customer);
        assert!(is_visible(&event(OrderStatus::Pending, me.id, None), &me));
        assert!(!is_visible(&event(OrderStatus::Pending, Uuid::new_v4(), None), &me));
    }

    #[test]
    fn drivers_see_new_work_and_their_own_orders() {
        let me = Principal::new(Uuid::new_v4(), Role::Driver);
        let customer = Uuid::new_v4();

        assert!(is_visible(&event(OrderStatus::Pending, customer, None), &me));
        assert!(is_visible(&event(OrderStatus::Completed, customer, Some(me.id)), &me));
        assert!(!is_visible(
            &event(OrderStatus::Accepted, customer, Some(Uuid::new_v4())),
            &me
        ));
    }

    #[tokio::test]
    async fn finished_side_aborts_the_other_task() {
        let (alive_tx, alive_rx) = oneshot::channel::<()>();

        let finished = tokio::spawn(async {});
        let lingering = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });

        until_either_finishes(finished, lingering).await;

        // The sender is dropped only when the lingering task is torn down.
        assert!(alive_rx.await.is_err());
    }
}
