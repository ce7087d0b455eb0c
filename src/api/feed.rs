use axum::{
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message as Frame, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AppResult, Store, Subscription, model::Entity};

use super::Caller;

#[derive(Deserialize)]
pub(crate) struct FeedQuery {
    /// Resume after this sequence number.
    after: Option<i64>,
    /// Comma separated entity names. All published entities when absent.
    entities: Option<String>,
}

fn parse_entities(raw: Option<&str>) -> Result<Vec<Entity>, String> {
    let Some(raw) = raw else {
        return Ok(Entity::FEED.to_vec());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn feed(
    Caller(caller): Caller,
    State(store): State<Store>,
    Query(FeedQuery { after, entities }): Query<FeedQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let entities = match parse_entities(entities.as_deref()) {
        Ok(entities) => entities,
        Err(why) => return Ok((StatusCode::BAD_REQUEST, why).into_response()),
    };
    let subscription = store.subscribe(caller, &entities, after).await?;
    Ok(ws.on_upgrade(move |socket| relay(socket, subscription)))
}

async fn relay(socket: WebSocket, subscription: Subscription) {
    let caller = subscription.caller();
    let (mut sender, mut receiver) = socket.split();
    let mut changes = Box::pin(subscription.into_stream());

    let mut relay_task = tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            let change = match change {
                Ok(change) => change,
                Err(err) => {
                    warn!(%caller, %err, "feed stopped");
                    break;
                }
            };
            let Ok(text) = serde_json::to_string(&change) else {
                continue;
            };
            if sender.send(Frame::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Nothing is read from clients; this only notices them leaving.
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            if let Frame::Close(_) = frame {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut relay_task => client_task.abort(),
        _ = &mut client_task => relay_task.abort(),
    };
    debug!(%caller, "feed closed");
}
