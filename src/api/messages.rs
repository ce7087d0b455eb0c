use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppResult, Store,
    model::{Message, MessageKind, NewMessage, NewReadReceipt, ReadReceipt},
};

use super::Caller;

#[derive(Deserialize)]
pub(crate) struct SendMessageBody {
    sender_id: Option<Uuid>,
    content: String,
    #[serde(default)]
    kind: MessageKind,
    file_url: Option<String>,
    reply_to_id: Option<Uuid>,
}

/// Editable message columns. Deletion goes through `DELETE`.
#[derive(Deserialize)]
pub(crate) struct EditMessageBody {
    content: String,
    #[serde(default)]
    kind: MessageKind,
    file_url: Option<String>,
    reply_to_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub(crate) struct ReadAtBody {
    #[serde(with = "time::serde::rfc3339")]
    read_at: OffsetDateTime,
}

#[derive(Deserialize)]
pub(crate) struct MarkReadBody {
    message_ids: Vec<Uuid>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(store.list_messages(caller, id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageBody>,
) -> AppResult<Response> {
    let SendMessageBody { sender_id, content, kind, file_url, reply_to_id } = body;
    let new = NewMessage {
        conversation_id: id,
        sender_id: sender_id.unwrap_or(caller),
        content,
        kind,
        file_url,
        reply_to_id,
    };
    let message = store.send_message(caller, new).await?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(message) = store.get_message(caller, id).await? else {
        return Ok(super::sorry());
    };
    Ok(Json(message).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(body): Json<EditMessageBody>,
) -> AppResult<Json<Message>> {
    let current = super::target(store.get_message(caller, id).await?)?;
    let EditMessageBody { content, kind, file_url, reply_to_id } = body;
    let message = Message {
        content,
        kind,
        file_url,
        reply_to_id,
        ..current
    };
    Ok(Json(store.update_message(caller, message).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    Ok(Json(store.delete_message(caller, id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn receipts(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ReadReceipt>>> {
    Ok(Json(store.list_receipts(caller, id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_read(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let new = NewReadReceipt {
        message_id: id,
        identity_id: caller,
    };
    let receipt = store.mark_read(caller, new).await?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_read_many(
    Caller(caller): Caller,
    State(store): State<Store>,
    Json(MarkReadBody { message_ids }): Json<MarkReadBody>,
) -> AppResult<Response> {
    let new = message_ids
        .into_iter()
        .map(|message_id| NewReadReceipt {
            message_id,
            identity_id: caller,
        })
        .collect();
    let receipts = store.mark_read_many(caller, new).await?;
    Ok((StatusCode::CREATED, Json(receipts)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_receipt(
    Caller(caller): Caller,
    State(store): State<Store>,
    Path(id): Path<Uuid>,
    Json(ReadAtBody { read_at }): Json<ReadAtBody>,
) -> AppResult<Json<ReadReceipt>> {
    let current: ReadReceipt = super::target(store.get(caller, id).await?)?;
    let receipt = ReadReceipt { read_at, ..current };
    Ok(Json(store.update_receipt(caller, receipt).await?))
}
