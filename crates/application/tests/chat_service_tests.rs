//! 聊天消息服务单元测试

use std::sync::Arc;

use application::{Clock, ChatMessagingService, ChatMessagingServiceDependencies};
use domain::{Timestamp, User};
use infrastructure::memory::InMemoryStorage;

struct FixedClock(Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

fn at(hour: u32, minute: u32) -> Timestamp {
    chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

async fn setup() -> (InMemoryStorage, ChatMessagingService) {
    let storage = InMemoryStorage::new();
    for name in ["alice", "bob"] {
        storage
            .user_repository()
            .save(User::new(name, "stored-hash").with_created_at(at(0, 0)))
            .await
            .unwrap();
    }

    let service = ChatMessagingService::new(ChatMessagingServiceDependencies {
        user_repository: storage.user_repository(),
        room_repository: storage.room_repository(),
        direct_chat_repository: storage.direct_chat_repository(),
        message_repository: storage.message_repository(),
        clock: Arc::new(FixedClock(at(23, 59))),
    });

    (storage, service)
}

#[tokio::test]
async fn blank_room_falls_back_to_general() {
    let (_storage, service) = setup().await;

    service
        .post_to_room("  ", "alice", "  hello  ", Some(at(10, 0)))
        .await
        .unwrap();

    let history = service.get_room_history("General", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].room.as_deref(), Some("General"));
    assert_eq!(history[0].from, "alice");
    assert_eq!(history[0].to, None);
    assert_eq!(history[0].content, "hello");
    assert_eq!(history[0].sent_at, at(10, 0));
}

#[tokio::test]
async fn unknown_sender_is_a_storage_error() {
    let (_storage, service) = setup().await;

    let err = service
        .post_to_room("General", "ghost", "hello", Some(at(10, 0)))
        .await
        .unwrap_err();
    assert!(err.is_database());
}

#[tokio::test]
async fn history_is_ascending_and_limited() {
    let (_storage, service) = setup().await;

    service
        .post_to_room("General", "alice", "first", Some(at(10, 0)))
        .await
        .unwrap();
    service
        .post_to_room("General", "bob", "second", Some(at(10, 1)))
        .await
        .unwrap();
    service
        .post_to_room("General", "alice", "third", Some(at(10, 2)))
        .await
        .unwrap();

    let history = service.get_room_history("General", 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[1].content, "second");
}

#[tokio::test]
async fn direct_history_projects_the_other_user() {
    let (_storage, service) = setup().await;

    service
        .post_direct("alice", "bob", "hi bob", Some(at(9, 0)))
        .await
        .unwrap();
    service
        .post_direct("bob", "alice", "hi alice", Some(at(9, 1)))
        .await
        .unwrap();

    // 两个方向看到同一条历史，to 始终指向"对方"
    let history = service.get_direct_history("alice", "bob", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].from, "alice");
    assert_eq!(history[0].to.as_deref(), Some("bob"));
    assert_eq!(history[1].from, "bob");
    assert_eq!(history[1].to.as_deref(), Some("alice"));
    assert!(history.iter().all(|entry| entry.room.is_none()));

    let mirrored = service.get_direct_history("bob", "alice", 10).await.unwrap();
    assert_eq!(mirrored.len(), 2);
    assert_eq!(mirrored[0].from, "alice");
    assert_eq!(mirrored[0].to.as_deref(), Some("bob"));
}

#[tokio::test]
async fn direct_history_is_empty_without_pairing() {
    let (_storage, service) = setup().await;

    let history = service.get_direct_history("alice", "bob", 10).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn dm_pairing_is_reused_across_directions() {
    let (storage, service) = setup().await;

    service
        .post_direct("alice", "bob", "one", Some(at(9, 0)))
        .await
        .unwrap();
    service
        .post_direct("bob", "alice", "two", Some(at(9, 1)))
        .await
        .unwrap();

    // 两个方向命中同一个 DM 房间
    assert_eq!(storage.dm_room_count().await, 1);
}

#[tokio::test]
async fn content_validation_is_identical_for_both_paths() {
    let (_storage, service) = setup().await;

    let room_err = service
        .post_to_room("General", "alice", "   ", Some(at(10, 0)))
        .await
        .unwrap_err();
    let dm_err = service
        .post_direct("alice", "bob", "   ", Some(at(10, 0)))
        .await
        .unwrap_err();
    assert_eq!(room_err, dm_err);

    let oversize = "a".repeat(1001);
    let err = service
        .post_to_room("General", "alice", &oversize, Some(at(10, 0)))
        .await
        .unwrap_err();
    assert!(!err.is_database());
}
