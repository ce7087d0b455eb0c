mod common;

use std::str::FromStr;
use std::time::Duration;

use chatguard::model::{Entity, NewConversation, NewMembership, NewMessage, NewReadReceipt, Row};
use chatguard::{Change, ChangeKind, Store, Subscription};
use common::{group, identity, store};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::time::timeout;

async fn next(sub: &mut Subscription) -> Change {
    timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("change within deadline")
        .expect("feed error")
        .expect("feed open")
}

fn content(change: &Change) -> Option<&str> {
    match change.row()? {
        Row::Message(message) => Some(message.content.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn outsiders_see_nothing_from_other_conversations() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let c = identity(&store, "cy").await;
    let g = group(&store, a, "crew").await;
    store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();

    let mut outsider = store.subscribe(c, &Entity::FEED, None).await.unwrap();

    let hello = store
        .send_message(a, NewMessage::text(g.id, a, "hi"))
        .await
        .unwrap();
    store
        .mark_read(
            b,
            NewReadReceipt {
                message_id: hello.id,
                identity_id: b,
            },
        )
        .await
        .unwrap();
    store.set_typing(b, g.id, true).await.unwrap();

    let own = store
        .create_conversation(c, NewConversation::private(c))
        .await
        .unwrap();

    let first = next(&mut outsider).await;
    assert_eq!(first.entity, Entity::Conversation);
    assert_eq!(first.kind, ChangeKind::Insert);
    assert_eq!(first.conversation_id, Some(own.id));
    let second = next(&mut outsider).await;
    assert_eq!(second.entity, Entity::Membership);
    assert!(outsider.checkpoint() > 5);
}

#[tokio::test]
async fn members_see_messages_in_commit_order() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let g = group(&store, a, "crew").await;
    store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();

    let mut sub = store.subscribe(b, &[Entity::Message], None).await.unwrap();
    for i in 0..5 {
        store
            .send_message(a, NewMessage::text(g.id, a, format!("m{i}")))
            .await
            .unwrap();
    }

    let mut last = 0;
    for i in 0..5 {
        let change = next(&mut sub).await;
        assert!(change.seq > last);
        last = change.seq;
        assert_eq!(change.conversation_id, Some(g.id));
        assert_eq!(content(&change), Some(format!("m{i}").as_str()));
    }
}

#[tokio::test]
async fn updates_carry_both_images() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let g = group(&store, a, "crew").await;
    let msg = store
        .send_message(a, NewMessage::text(g.id, a, "teh"))
        .await
        .unwrap();

    let mut sub = store.subscribe(a, &[Entity::Message], None).await.unwrap();
    store
        .update_message(
            a,
            chatguard::model::Message {
                content: "the".into(),
                ..msg
            },
        )
        .await
        .unwrap();
    store.delete_message(a, msg.id).await.unwrap();

    let edit = next(&mut sub).await;
    assert_eq!(edit.kind, ChangeKind::Update);
    match (&edit.old, &edit.new) {
        (Some(Row::Message(old)), Some(Row::Message(new))) => {
            assert_eq!(old.content, "teh");
            assert_eq!(new.content, "the");
        }
        other => panic!("unexpected images {other:?}"),
    }

    let soft = next(&mut sub).await;
    assert_eq!(soft.kind, ChangeKind::Update);
    assert!(matches!(soft.new, Some(Row::Message(ref m)) if m.is_deleted));
}

#[tokio::test]
async fn removed_members_stop_receiving() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let g = group(&store, a, "crew").await;
    let membership = store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();

    let mut sub = store.subscribe(b, &Entity::FEED, None).await.unwrap();
    store
        .send_message(a, NewMessage::text(g.id, a, "before"))
        .await
        .unwrap();
    assert_eq!(content(&next(&mut sub).await), Some("before"));

    store.remove_membership(a, membership.id).await.unwrap();
    store
        .send_message(a, NewMessage::text(g.id, a, "after"))
        .await
        .unwrap();
    let own = store
        .create_conversation(b, NewConversation::private(b))
        .await
        .unwrap();

    let change = next(&mut sub).await;
    assert_eq!(change.entity, Entity::Conversation);
    assert_eq!(change.conversation_id, Some(own.id));
}

#[tokio::test]
async fn replay_resumes_from_checkpoint() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let g = group(&store, a, "crew").await;
    store
        .send_message(a, NewMessage::text(g.id, a, "one"))
        .await
        .unwrap();

    let mut sub = store.subscribe(a, &Entity::FEED, Some(0)).await.unwrap();
    let created = next(&mut sub).await;
    assert_eq!(created.entity, Entity::Conversation);
    assert_eq!(next(&mut sub).await.entity, Entity::Membership);
    assert_eq!(content(&next(&mut sub).await), Some("one"));
    let checkpoint = sub.checkpoint();
    drop(sub);

    store
        .send_message(a, NewMessage::text(g.id, a, "two"))
        .await
        .unwrap();

    let mut resumed = store
        .subscribe(a, &Entity::FEED, Some(checkpoint))
        .await
        .unwrap();
    let change = next(&mut resumed).await;
    assert_eq!(content(&change), Some("two"));

    // Live changes follow the replayed ones without duplicates.
    store
        .send_message(a, NewMessage::text(g.id, a, "three"))
        .await
        .unwrap();
    let live = next(&mut resumed).await;
    assert_eq!(content(&live), Some("three"));
    assert!(live.seq > change.seq);
}

#[tokio::test]
async fn pruned_history_is_not_replayed() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let g = group(&store, a, "crew").await;
    let first = store
        .send_message(a, NewMessage::text(g.id, a, "old"))
        .await
        .unwrap();

    let mut sub = store.subscribe(a, &[Entity::Message], Some(0)).await.unwrap();
    let old = next(&mut sub).await;
    assert_eq!(old.row().map(Row::id), Some(first.id));
    drop(sub);

    assert_eq!(store.prune_change_log(old.seq).await.unwrap(), 3);
    store
        .send_message(a, NewMessage::text(g.id, a, "new"))
        .await
        .unwrap();

    let mut sub = store.subscribe(a, &Entity::FEED, Some(0)).await.unwrap();
    assert_eq!(content(&next(&mut sub).await), Some("new"));
}

#[tokio::test]
async fn lagging_subscribers_catch_up_from_the_log() {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    let store = Store::from_pool(pool, 2).await.unwrap();
    let a = identity(&store, "ada").await;
    let g = group(&store, a, "crew").await;

    let mut sub = store.subscribe(a, &[Entity::Message], None).await.unwrap();
    for i in 0..10 {
        store
            .send_message(a, NewMessage::text(g.id, a, format!("m{i}")))
            .await
            .unwrap();
    }

    for i in 0..10 {
        let change = next(&mut sub).await;
        assert_eq!(content(&change), Some(format!("m{i}").as_str()));
    }
}

#[tokio::test]
async fn members_receive_receipts_and_typing() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let g = group(&store, a, "crew").await;
    store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();

    let mut sub = store
        .subscribe(a, &[Entity::ReadReceipt, Entity::TypingStatus], None)
        .await
        .unwrap();
    let msg = store
        .send_message(a, NewMessage::text(g.id, a, "hi"))
        .await
        .unwrap();
    let receipt = store
        .mark_read(
            b,
            NewReadReceipt {
                message_id: msg.id,
                identity_id: b,
            },
        )
        .await
        .unwrap();
    store.set_typing(b, g.id, true).await.unwrap();

    let read = next(&mut sub).await;
    assert_eq!((read.entity, read.kind), (Entity::ReadReceipt, ChangeKind::Insert));
    assert_eq!(read.conversation_id, Some(g.id));
    assert_eq!(read.row().map(Row::id), Some(receipt.id));

    let typing = next(&mut sub).await;
    assert_eq!((typing.entity, typing.kind), (Entity::TypingStatus, ChangeKind::Insert));
    assert!(matches!(typing.new, Some(Row::TypingStatus(ref t)) if t.is_typing && t.identity_id == b));
}

#[tokio::test]
async fn identity_removal_publishes_cascaded_deletes() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let g = group(&store, a, "crew").await;
    store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();
    let from_a = store
        .send_message(a, NewMessage::text(g.id, a, "from ada"))
        .await
        .unwrap();
    let from_b = store
        .send_message(b, NewMessage::text(g.id, b, "from bob"))
        .await
        .unwrap();
    store
        .mark_read(
            b,
            NewReadReceipt {
                message_id: from_a.id,
                identity_id: b,
            },
        )
        .await
        .unwrap();
    store
        .mark_read(
            a,
            NewReadReceipt {
                message_id: from_b.id,
                identity_id: a,
            },
        )
        .await
        .unwrap();

    let mut sub = store.subscribe(a, &Entity::FEED, None).await.unwrap();
    assert!(store.identity_removed(b).await.unwrap());

    let mut seen = Vec::new();
    for _ in 0..4 {
        let change = next(&mut sub).await;
        assert_eq!(change.conversation_id, Some(g.id));
        assert!(change.new.is_none());
        seen.push((change.entity, change.kind));
    }
    assert_eq!(
        seen,
        vec![
            (Entity::ReadReceipt, ChangeKind::Delete),
            (Entity::ReadReceipt, ChangeKind::Delete),
            (Entity::Message, ChangeKind::Delete),
            (Entity::Membership, ChangeKind::Delete),
        ]
    );

    store
        .send_message(a, NewMessage::text(g.id, a, "alone"))
        .await
        .unwrap();
    assert_eq!(content(&next(&mut sub).await), Some("alone"));
}

#[tokio::test]
async fn removals_reach_remaining_members_only() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let b = identity(&store, "bob").await;
    let c = identity(&store, "cy").await;
    let g = group(&store, a, "crew").await;
    store
        .join_conversation(b, NewMembership::member(g.id, b))
        .await
        .unwrap();
    let gone = store
        .join_conversation(c, NewMembership::member(g.id, c))
        .await
        .unwrap();

    let mut admin = store.subscribe(a, &[Entity::Membership], None).await.unwrap();
    let mut member = store.subscribe(b, &[Entity::Membership], None).await.unwrap();
    let mut removed = store
        .subscribe(c, &[Entity::Membership, Entity::Conversation], None)
        .await
        .unwrap();

    store.remove_membership(a, gone.id).await.unwrap();

    for sub in [&mut admin, &mut member] {
        let change = next(sub).await;
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.old.as_ref().map(Row::id), Some(gone.id));
    }

    let own = store
        .create_conversation(c, NewConversation::private(c))
        .await
        .unwrap();
    let change = next(&mut removed).await;
    assert_eq!(change.entity, Entity::Conversation);
    assert_eq!(change.conversation_id, Some(own.id));
}

#[tokio::test]
async fn feed_ends_when_the_store_is_dropped() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let mut sub = store.subscribe(a, &Entity::FEED, None).await.unwrap();
    drop(store);

    let end = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("feed closes")
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn failed_admission_keeps_the_checkpoint() {
    let store = store().await;
    let a = identity(&store, "ada").await;
    let g = group(&store, a, "crew").await;

    let mut sub = store.subscribe(a, &Entity::FEED, None).await.unwrap();
    let before = sub.checkpoint();
    store
        .send_message(a, NewMessage::text(g.id, a, "lost?"))
        .await
        .unwrap();
    store.pool().close().await;

    let result = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("admission fails fast");
    assert!(result.is_err());
    assert_eq!(sub.checkpoint(), before);
}
