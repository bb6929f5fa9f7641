use std::sync::Arc;
use std::time::Duration;

use errors::RemoteError;
use parking_lot::Mutex;
use pr_core::{ChangeCallback, Collection, Entity, RemoteStore};
use serde_json::{Value, json};
use storage::FirebaseRemote;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer, token: Option<&str>) -> FirebaseRemote {
    FirebaseRemote::new(
        server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
        Duration::from_millis(50),
    )
    .unwrap()
}

#[tokio::test]
async fn test_fetch_all_decodes_tree() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": {
                "Foo": {"id": "p1", "type": "project", "projectName": "Foo", "_version": 2}
            },
            "tasks": {"Foo": {"tasks": [{"text": "ship", "assignee": "Ash", "completed": false}]}},
            "lastUpdated": "2024-01-01T00:00:00.000Z"
        })))
        .mount(&server)
        .await;

    let tree = remote_for(&server, None).fetch_all().await.unwrap();
    assert_eq!(tree.projects["Foo"].version, 2);
    assert_eq!(tree.tasks["Foo"].tasks[0].text, "ship");
    assert!(tree.feedback.is_empty());
}

#[tokio::test]
async fn test_fetch_all_of_empty_database() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .mount(&server)
        .await;

    assert!(remote_for(&server, None).fetch_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_put_entity_overwrites_document_with_auth() {
    let server = MockServer::start().await;
    let doc = json!({"id": "f1", "type": "feedback", "feedbackText": "great"});
    Mock::given(method("PUT"))
        .and(path("/feedback/f1.json"))
        .and(query_param("auth", "secret"))
        .and(body_json(&doc))
        .respond_with(ResponseTemplate::new(200).set_body_json(&doc))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server, Some("secret"))
        .put_entity(Collection::Feedback, "f1", &doc)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remove_entity_deletes_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/Roadmap.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server, None)
        .remove_entity(Collection::Tasks, "Roadmap")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_auth_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let err = remote_for(&server, None).fetch_all().await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_bad_request_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid data"))
        .mount(&server)
        .await;

    let err = remote_for(&server, None)
        .put_entity(Collection::Projects, "Foo", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn test_forbidden_key_never_hits_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = remote_for(&server, None)
        .put_entity(Collection::Projects, "v1.0", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidKey { .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let remote = FirebaseRemote::new(
        "http://127.0.0.1:1",
        None,
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .unwrap();
    assert!(remote.fetch_all().await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_subscription_delivers_initial_value_then_changes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Foo": {"content": "a"}})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notes.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Foo": {"content": "b"}})))
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ChangeCallback = Arc::new(move |value| sink.lock().push(value));

    let mut subscription = remote_for(&server, None)
        .subscribe(Collection::Notes, callback)
        .await
        .unwrap();
    assert_eq!(seen.lock().len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    subscription.dispose();

    let seen = seen.lock();
    // The unchanged second poll is not delivered.
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0]["Foo"]["content"], "a");
    assert_eq!(seen[1]["Foo"]["content"], "b");
}

const RESERVED_NAME: &str = "Done? 100% & more";
const ENCODED_PATH: &str = "/projects/Done%3F%20100%25%20&%20more.json";

#[tokio::test]
async fn test_reserved_characters_in_keys_are_percent_encoded() {
    let server = MockServer::start().await;
    let key = utils::sanitize_key(RESERVED_NAME);
    let doc = json!({"id": "p1", "type": "project", "projectName": RESERVED_NAME});
    Mock::given(method("PUT"))
        .and(path(ENCODED_PATH))
        .and(query_param("auth", "t&k=1/2"))
        .and(body_json(&doc))
        .respond_with(ResponseTemplate::new(200).set_body_json(&doc))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/Done%3F%20100%25%20&%20more.json"))
        .and(query_param("auth", "t&k=1/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server, Some("t&k=1/2"));
    remote.put_entity(Collection::Projects, &key, &doc).await.unwrap();
    remote.remove_entity(Collection::Tasks, &key).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let pairs: Vec<(String, String)> = requests[0]
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(pairs, vec![("auth".to_string(), "t&k=1/2".to_string())]);
}

#[tokio::test]
async fn test_reserved_name_round_trips_through_fetch_all() {
    let server = MockServer::start().await;
    let key = utils::sanitize_key(RESERVED_NAME);
    let entity: Entity = serde_json::from_value(json!({
        "id": "p1",
        "type": "project",
        "timestamp": "2024-05-01T10:00:00.000Z",
        "_version": 2,
        "_lastModified": "2024-05-02T10:00:00.000Z",
        "projectName": RESERVED_NAME,
        "status": "completed",
        "tags": ["ops"]
    }))
    .unwrap();
    Mock::given(method("PUT"))
        .and(path(ENCODED_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server, None);
    remote
        .put_entity(Collection::Projects, &key, &entity.try_to_json().unwrap())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let stored: Value = serde_json::from_slice(&requests[0].body).unwrap();
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": {key.clone(): stored}})))
        .mount(&server)
        .await;

    let tree = remote.fetch_all().await.unwrap();
    assert_eq!(tree.projects[&key], entity);
}

#[tokio::test]
async fn test_base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/review-db/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let remote = FirebaseRemote::new(
        format!("{}/review-db/", server.uri()),
        None,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .unwrap();
    assert!(remote.fetch_all().await.unwrap().is_empty());
}

#[test]
fn test_unparseable_base_url_is_rejected() {
    for raw in ["review-app.firebaseio.com", "mailto:ops@example.com", "https://db.example.com/?ns=x"] {
        let err = FirebaseRemote::new(raw, None, Duration::from_secs(1), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidEndpoint { .. }), "{raw}: {err}");
    }
}

#[tokio::test]
async fn test_null_document_is_never_written() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = remote_for(&server, None)
        .put_entity(Collection::Projects, "Foo", &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::MalformedDocument { .. }));
}
