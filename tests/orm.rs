//! Object mapper tests against in-memory shards

mod common;

use schemaless_store::orm::{EntitySchema, LifecycleState, Mapper, Session};
use schemaless_store::{
    Backend, DataStore, Fields, MemoryBackend, PutRequest, StoreError, Value, col, generate_id,
};

use common::flaky_store;

const USER_TAG: i32 = 1;

fn user_schema() -> EntitySchema {
    EntitySchema::builder(USER_TAG)
        .persist(["user_id", "first_name", "last_name"])
        .id_field("user_id")
        .index("index_user_id", ["user_id"])
        .index("index_user_name", ["first_name", "last_name"])
        .build()
        .expect("Should build user schema")
}

fn define_user_indexes<B: Backend>(store: &DataStore<B>) {
    store
        .define_index("index_user_id", ["user_id"], None)
        .expect("Should define index_user_id");
    store
        .define_index("index_user_name", ["first_name", "last_name"], None)
        .expect("Should define index_user_name");
}

fn users(shards: usize) -> (Mapper<MemoryBackend>, Session<MemoryBackend>) {
    let store = DataStore::in_memory(shards).expect("Should build store");
    define_user_indexes(&store);
    let session = Session::new();
    let mapper = Mapper::new(store, session.clone(), user_schema()).expect("Should bind mapper");
    (mapper, session)
}

fn user_fields(first: &str, last: &str) -> Fields {
    Fields::new()
        .with("user_id", generate_id())
        .with("first_name", first)
        .with("last_name", last)
}

// ==================== Lifecycle Tests ====================

#[tokio::test]
async fn test_create_object_save_delete() {
    let (users, _session) = users(2);

    let u = users.create();
    assert!(!u.saveable());
    assert!(u.is_dirty());
    assert_eq!(u.state(), LifecycleState::New);

    let user_id = generate_id();
    u.set("user_id", user_id).set("first_name", "evan");
    assert!(!u.saveable());
    assert!(u.is_dirty());
    assert_eq!(u.state(), LifecycleState::Partial);
    assert!(users.get(&[col("user_id").equals(user_id)]).await.unwrap().is_none());

    u.set("last_name", "klitzke");
    assert!(u.saveable());
    assert!(u.is_dirty());
    assert_eq!(u.state(), LifecycleState::Ready);

    let entity_id = u.save().await.unwrap();
    assert!(u.saveable());
    assert!(!u.is_dirty());
    assert_eq!(u.state(), LifecycleState::Clean);
    assert_eq!(u.entity_id(), Some(entity_id));

    let fetched = users
        .get(&[col("user_id").equals(user_id)])
        .await
        .unwrap()
        .expect("Should find saved user");
    assert_eq!(fetched.entity_id(), Some(entity_id));
    assert_eq!(fetched.get("last_name"), Some(Value::from("klitzke")));
    assert!(!fetched.is_dirty());

    u.delete().await.unwrap();
    assert!(u.saveable());
    assert!(!u.is_dirty());
    assert_eq!(u.state(), LifecycleState::Deleted);
    assert_eq!(u.get("first_name"), Some(Value::from("evan")));
    assert!(users.get(&[col("user_id").equals(user_id)]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_incomplete_record_fails() {
    let (users, _session) = users(1);
    let u = users.create();
    u.set("first_name", "evan");

    let err = u.save().await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(err.to_string().contains("user_id"));
    assert!(err.to_string().contains("last_name"));
    assert!(u.is_dirty());
}

#[tokio::test]
async fn test_delete_unsaved_record_fails() {
    let (users, _session) = users(1);
    let u = users.create_with(user_fields("evan", "klitzke"));
    let err = u.delete().await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_resave_updates_in_place() {
    let (users, _session) = users(2);
    let u = users.create_with(user_fields("evan", "klitzke"));
    let first = u.save().await.unwrap();

    u.set("last_name", "k");
    assert!(u.is_dirty());
    let second = u.save().await.unwrap();
    assert_eq!(first, second);

    let old = [col("first_name").equals("evan"), col("last_name").equals("klitzke")];
    assert!(users.get(&old).await.unwrap().is_none());
    let new = [col("first_name").equals("evan"), col("last_name").equals("k")];
    assert_eq!(users.query(&new).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unpersisted_field_is_local_only() {
    let (users, session) = users(2);
    let u = users.create_with(user_fields("evan", "klitzke"));
    session.save().await.unwrap();

    u.set("nickname", "ev");
    assert!(!u.is_dirty());
    assert_eq!(session.pending_len(), 0);

    let fetched = users.find(u.identity().unwrap()).await.unwrap().unwrap();
    assert_eq!(fetched.get("nickname"), None);
}

#[tokio::test]
async fn test_save_after_delete_recreates() {
    let (users, _session) = users(2);
    let u = users.create_with(user_fields("evan", "klitzke"));
    let id = u.save().await.unwrap();
    u.delete().await.unwrap();

    u.set("first_name", "evan");
    assert_eq!(u.state(), LifecycleState::Ready);
    assert_eq!(u.save().await.unwrap(), id);
    assert!(users.find(u.identity().unwrap()).await.unwrap().is_some());
}

// ==================== Query Tests ====================

#[tokio::test]
async fn test_in_query() {
    let (users, session) = users(4);
    let records: Vec<_> = (0..5)
        .map(|_| users.create_with(user_fields("foo", "bar")))
        .collect();
    let user_ids: Vec<Value> = records.iter().filter_map(|u| u.identity()).collect();
    session.save().await.unwrap();

    let fetched = users
        .query(&[col("user_id").in_values(user_ids[..3].to_vec())])
        .await
        .unwrap();
    let mut fetched_ids: Vec<Value> = fetched.iter().filter_map(|u| u.identity()).collect();
    let mut expected = user_ids[..3].to_vec();
    fetched_ids.sort_by_key(|v| v.to_string());
    expected.sort_by_key(|v| v.to_string());
    assert_eq!(fetched_ids, expected);
}

#[tokio::test]
async fn test_name_query() {
    let (users, _session) = users(2);
    let u = users.create_with(user_fields("foo", "bar"));
    u.save().await.unwrap();

    let v = users
        .get(&[col("first_name").equals("foo"), col("last_name").equals("bar")])
        .await
        .unwrap()
        .expect("Should find by name");
    assert_eq!(u.identity(), v.identity());
}

#[tokio::test]
async fn test_query_without_binding_fails() {
    let (users, _session) = users(1);
    let err = users
        .query(&[col("last_name").equals("bar")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NoSuitableIndex { .. }));
}

#[tokio::test]
async fn test_query_ignores_other_tags() {
    let store = DataStore::in_memory(2).unwrap();
    define_user_indexes(&store);
    let session = Session::new();
    let users = Mapper::new(store.clone(), session.clone(), user_schema()).unwrap();

    store
        .put(PutRequest::new(user_fields("foo", "bar")).tag(USER_TAG + 1))
        .await
        .unwrap();
    let rows = users
        .query(&[col("first_name").equals("foo")])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// ==================== Session Tests ====================

#[tokio::test]
async fn test_session_saves_all_pending() {
    let (users, session) = users(3);
    let records: Vec<_> = (0..5)
        .map(|i| users.create_with(user_fields(&format!("user{i}"), "bar")))
        .collect();
    assert_eq!(session.pending_len(), 5);

    let saved = session.save().await.unwrap();
    assert_eq!(saved.len(), 5);
    assert_eq!(session.pending_len(), 0);

    for (record, id) in records.iter().zip(&saved) {
        assert!(!record.is_dirty());
        assert_eq!(record.entity_id(), Some(*id));
        let fetched = users.find(record.identity().unwrap()).await.unwrap();
        assert_eq!(fetched.and_then(|r| r.entity_id()), Some(*id));
    }
}

#[tokio::test]
async fn test_session_saves_record_once() {
    let (users, session) = users(2);
    let u = users.create();
    u.set("user_id", generate_id());
    u.set("first_name", "a");
    u.set("last_name", "b");
    u.set("first_name", "c");
    assert_eq!(session.pending_len(), 1);
    assert!(session.is_pending(&u));

    let saved = session.save().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(!session.is_pending(&u));
    assert_eq!(u.get("first_name"), Some(Value::from("c")));
}

#[tokio::test]
async fn test_session_keeps_unsaveable_records() {
    let (users, session) = users(2);
    let complete = users.create_with(user_fields("a", "b"));
    let partial = users.create();
    partial.set("first_name", "only");

    let saved = session.save().await.unwrap();
    assert_eq!(saved, vec![complete.entity_id().unwrap()]);
    assert!(session.is_pending(&partial));
    assert!(partial.is_dirty());

    partial.set("user_id", generate_id()).set("last_name", "now");
    assert_eq!(session.save().await.unwrap().len(), 1);
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn test_session_drops_released_records() {
    let (users, session) = users(1);
    {
        let _dropped = users.create_with(user_fields("gone", "soon"));
    }
    let kept = users.create_with(user_fields("kept", "here"));
    assert_eq!(session.pending_len(), 2);

    let saved = session.save().await.unwrap();
    assert_eq!(saved, vec![kept.entity_id().unwrap()]);
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn test_session_failure_reports_progress() {
    let (store, faults) = flaky_store(2);
    define_user_indexes(&store);
    let session = Session::new();
    let users = Mapper::new(store, session.clone(), user_schema()).unwrap();

    let records: Vec<_> = (0..3)
        .map(|i| users.create_with(user_fields(&format!("user{i}"), "bar")))
        .collect();

    // one record's worth of index writes
    faults.fail_after(2);
    let err = session.save().await.unwrap_err();
    match &err {
        StoreError::SessionFlush { saved, source } => {
            assert_eq!(saved, &vec![records[0].entity_id().unwrap()]);
            assert!(matches!(**source, StoreError::PartialWrite { .. }));
        }
        other => panic!("expected session flush error, got {other}"),
    }
    assert!(err.is_retryable());
    assert!(!records[0].is_dirty());
    assert!(records[1].is_dirty());
    let written = records[1].entity_id().expect("Partial write should adopt the id");
    assert_eq!(session.pending_len(), 2);

    faults.heal();
    let saved = session.save().await.unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0], written);
    assert_eq!(session.pending_len(), 0);
    for record in &records {
        assert!(users.find(record.identity().unwrap()).await.unwrap().is_some());
    }
}

// ==================== Binding Tests ====================

#[tokio::test]
async fn test_mapper_rejects_undefined_index() {
    let store = DataStore::in_memory(1).unwrap();
    store.define_index("index_user_id", ["user_id"], None).unwrap();

    let err = Mapper::new(store, Session::new(), user_schema()).unwrap_err();
    assert!(matches!(err, StoreError::Configuration(_)));
    assert!(err.to_string().contains("index_user_name"));
}

#[tokio::test]
async fn test_mapper_rejects_mismatched_columns() {
    let store = DataStore::in_memory(1).unwrap();
    store.define_index("index_user_id", ["user_id"], None).unwrap();
    store
        .define_index("index_user_name", ["last_name", "first_name"], None)
        .unwrap();

    let err = Mapper::new(store, Session::new(), user_schema()).unwrap_err();
    assert!(matches!(err, StoreError::Configuration(_)));
}
