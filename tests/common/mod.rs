#![allow(dead_code)]

use chatguard::Store;
use chatguard::model::{Conversation, IdentityCreated, NewConversation};
use uuid::Uuid;

pub async fn store() -> Store {
    Store::in_memory().await.expect("in-memory store")
}

pub async fn identity(store: &Store, handle: &str) -> Uuid {
    let id = Uuid::now_v7();
    store
        .identity_created(IdentityCreated {
            id,
            handle: Some(handle.to_owned()),
            display_name: Some(handle.to_uppercase()),
        })
        .await
        .expect("bootstrap profile");
    id
}

pub async fn group(store: &Store, creator: Uuid, name: &str) -> Conversation {
    store
        .create_conversation(creator, NewConversation::group(creator, name))
        .await
        .expect("create group")
}
