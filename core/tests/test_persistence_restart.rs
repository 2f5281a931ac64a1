use chatlog_core::{MessageStore, NewMessage, Role};

#[tokio::test]
async fn history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    // First instance: write a short conversation
    {
        let store = MessageStore::new(&path);
        store.save("session-001", NewMessage::user("hello")).await.unwrap();
        store
            .save("session-001", NewMessage::assistant("hi there"))
            .await
            .unwrap();
        store.save("session-002", NewMessage::user("other thread")).await.unwrap();
    }
    // store dropped here — sled flushes on drop, and every save flushed

    // Second instance: records and indexes are still intact
    {
        let store = MessageStore::new(&path);
        let records = store.list_by_session("session-001").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "hello");
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].content, "hi there");

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
    }
}

#[tokio::test]
async fn surrogate_keys_stay_monotonic_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    let before = {
        let store = MessageStore::new(&path);
        store.save("s", NewMessage::user("first")).await.unwrap()
    };

    let after = {
        let store = MessageStore::new(&path);
        store.save("s", NewMessage::user("second")).await.unwrap()
    };

    assert!(after > before);
}

#[tokio::test]
async fn delete_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    {
        let store = MessageStore::new(&path);
        store.save("doomed", NewMessage::user("bye")).await.unwrap();
        store.save("kept", NewMessage::user("hi")).await.unwrap();
        store.delete_session("doomed").await.unwrap();
    }

    {
        let store = MessageStore::new(&path);
        assert!(store.list_by_session("doomed").await.unwrap().is_empty());
        assert_eq!(store.list_by_session("kept").await.unwrap().len(), 1);
    }
}
