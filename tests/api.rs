mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chatguard::{AppState, api, model::Conversation};
use common::{identity, store};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn app(store: chatguard::Store) -> Router {
    api::router().with_state(AppState { store })
}

fn request(method: &str, uri: &str, caller: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(api::CALLER_HEADER, caller.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_a_caller_are_unauthorized() {
    let app = app(store().await);
    let response = app
        .oneshot(request("GET", "/conversations", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_webhook_bootstraps_a_profile() {
    let store = store().await;
    let id = Uuid::now_v7();

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            "/identities",
            None,
            Some(json!({ "id": id, "handle": "ada" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let profile: Value = json_body(response).await;
    assert_eq!(profile["handle"], "ada");
    assert_eq!(profile["display_name"], Value::Null);

    let response = app(store.clone())
        .oneshot(request("GET", &format!("/profiles/{id}"), Some(id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(store.clone())
        .oneshot(request("DELETE", &format!("/identities/{id}"), None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app(store)
        .oneshot(request("DELETE", &format!("/identities/{id}"), None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conversations_are_hidden_from_outsiders() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let c = identity(&store, "cy").await;

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            "/conversations",
            Some(a),
            Some(json!({ "name": "crew", "is_group": true, "created_by": a })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let group: Conversation = json_body(response).await;

    let uri = format!("/conversations/{}", group.id);
    let response = app(store.clone())
        .oneshot(request("GET", &uri, Some(a), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(store.clone())
        .oneshot(request("GET", &uri, Some(c), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            &format!("{uri}/messages"),
            Some(c),
            Some(json!({ "content": "let me in" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(store)
        .oneshot(request("GET", "/conversations", Some(c), None))
        .await
        .unwrap();
    let listed: Vec<Conversation> = json_body(response).await;
    assert!(listed.is_empty());
}

#[tokio::test]
async fn refusals_and_conflicts_have_distinct_statuses() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            "/conversations",
            Some(a),
            Some(json!({ "name": "crew", "is_group": true, "created_by": b })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            "/conversations",
            Some(a),
            Some(json!({ "is_group": true, "created_by": a })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(store)
        .oneshot(request(
            "DELETE",
            &format!("/messages/{}", Uuid::now_v7()),
            Some(a),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn members_chat_through_the_api() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let group = common::group(&store, a, "crew").await;
    let base = format!("/conversations/{}", group.id);

    let response = app(store.clone())
        .oneshot(request("POST", &format!("{base}/members"), Some(b), Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app(store.clone())
        .oneshot(request(
            "POST",
            &format!("{base}/messages"),
            Some(b),
            Some(json!({ "content": "hello" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let message: Value = json_body(response).await;
    assert_eq!(message["sender_id"], json!(b));
    assert_eq!(message["kind"], "text");

    let response = app(store.clone())
        .oneshot(request("GET", &format!("{base}/messages"), Some(a), None))
        .await
        .unwrap();
    let messages: Vec<Value> = json_body(response).await;
    assert_eq!(messages.len(), 1);

    let response = app(store)
        .oneshot(request(
            "DELETE",
            &format!("{base}/members/{b}"),
            Some(a),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn edits_send_only_editable_columns() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let c = identity(&store, "cy").await;
    let group = common::group(&store, a, "crew").await;
    let message = store
        .send_message(a, chatguard::model::NewMessage::text(group.id, a, "teh"))
        .await
        .unwrap();

    let response = app(store.clone())
        .oneshot(request(
            "PUT",
            &format!("/conversations/{}", group.id),
            Some(a),
            Some(json!({ "name": "renamed", "description": "the crew" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let renamed: Conversation = json_body(response).await;
    assert_eq!(renamed.name.as_deref(), Some("renamed"));
    assert!(renamed.is_group);
    assert_eq!(renamed.created_at, group.created_at);

    let response = app(store.clone())
        .oneshot(request(
            "PUT",
            &format!("/messages/{}", message.id),
            Some(a),
            Some(json!({ "content": "the" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let edited: Value = json_body(response).await;
    assert_eq!(edited["content"], "the");
    assert_eq!(edited["sender_id"], json!(a));

    let response = app(store.clone())
        .oneshot(request(
            "PUT",
            &format!("/profiles/{a}"),
            Some(a),
            Some(json!({ "handle": "ada", "bio": "hello" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = json_body(response).await;
    assert_eq!(profile["bio"], "hello");

    // Outsiders cannot see the message, so editing it looks like a refusal.
    let response = app(store)
        .oneshot(request(
            "PUT",
            &format!("/messages/{}", message.id),
            Some(c),
            Some(json!({ "content": "mine now" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
