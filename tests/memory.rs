//! End-to-end flow through the public router, backed by the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use phone_contacts::http::{router, AppState, NameResponse};
use phone_contacts::model::{Friend, Relation, UserId};
use phone_contacts::store::memory::{MemoryStore, WriteFault};
use phone_contacts::{ContactService, Error};
use tower::ServiceExt;

const BODY_LIMIT: usize = 64 * 1024;

fn directory() -> MemoryStore {
    MemoryStore::new()
        .with_user(1, "Alice", "+1000")
        .with_user(2, "Bob", "+1001")
        .with_user(3, "Carol", "+1002")
        .with_user(4, "Dave", "+1003")
}

fn app(store: &MemoryStore) -> Router {
    let service = Arc::new(ContactService::new(store.clone()));
    router(AppState::new(service, Duration::from_secs(5)))
}

fn uid(raw: i32) -> UserId {
    UserId::new(raw).expect("user id")
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_owned())
        }
        None => Body::empty(),
    };
    let response = app
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

#[tokio::test]
async fn uploaded_contacts_show_up_as_friends() {
    let store = directory();

    let (status, _) = send(
        app(&store),
        Method::POST,
        "/user/1/contact",
        Some(
            r#"{"contacts":[{"name":"_","phoneNumber":"+1001"},{"name":"_","phoneNumber":"+1002"},{"name":"_","phoneNumber":"+9999"}]}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app(&store), Method::GET, "/user/1/friends", None).await;
    assert_eq!(status, StatusCode::OK);
    let friends: Vec<Friend> = serde_json::from_slice(&body).expect("friends");
    assert_eq!(
        friends,
        vec![
            Friend {
                user_id: uid(1),
                relation_user_id: uid(2),
                phone_number: "+1001".into(),
            },
            Friend {
                user_id: uid(1),
                relation_user_id: uid(3),
                phone_number: "+1002".into(),
            },
        ]
    );

    let (status, body) = send(app(&store), Method::GET, "/user/2/contact/name", None).await;
    assert_eq!(status, StatusCode::OK);
    let name: NameResponse = serde_json::from_slice(&body).expect("name");
    assert_eq!(name.name, "Bob");

    let (status, _) = send(app(&store), Method::GET, "/user/99/contact/name", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_write_leaves_no_relations_behind() {
    let store = directory();
    store.fault_on_write(2, WriteFault::Fail(Error::store_unavailable("reset")));

    let (status, _) = send(
        app(&store),
        Method::POST,
        "/user/1/contact",
        Some(
            r#"{"contacts":[{"name":"_","phoneNumber":"+1001"},{"name":"_","phoneNumber":"+1002"},{"name":"_","phoneNumber":"+1003"}]}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.relations(), Vec::<Relation>::new());
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn request_deadline_rolls_back_a_stalled_upload() {
    let store = directory();
    store.fault_on_write(2, WriteFault::Stall);
    let service = Arc::new(ContactService::new(store.clone()));
    let app = router(AppState::new(service, Duration::from_millis(20)));

    let (status, _) = send(
        app,
        Method::POST,
        "/user/1/contact",
        Some(r#"{"contacts":[{"name":"_","phoneNumber":"+1001"},{"name":"_","phoneNumber":"+1002"}]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(store.relations().is_empty());
    assert_eq!(store.rollbacks(), 1);
}
