use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use std::net::TcpListener;
use std::time::Duration;
use tripwire_cli::ApiClient;
use tripwire_core::Tag;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.base_url(), "alice", "s3cret", Duration::from_secs(5)).unwrap()
}

fn sample_tag() -> Tag {
    Tag {
        username: "alice".to_string(),
        file_path: "/home/alice/report.docx".to_string(),
        id: "7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
        client_id: "desk-1".to_string(),
        hash: "ab".repeat(32),
        url: "http://api.example.test/7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
        created: 1_700_000_000,
    }
}

#[test]
fn new_rejects_invalid_url() {
    assert!(ApiClient::new("not a url", "u", "p", Duration::from_secs(1)).is_err());
    let client = ApiClient::new("http://api.example.test/", "u", "p", Duration::from_secs(1)).unwrap();
    assert_eq!(client.base_url(), "http://api.example.test");
}

#[tokio::test]
async fn post_tag_sends_basic_auth_and_json() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let tag = sample_tag();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/tag")
            .header("authorization", "Basic YWxpY2U6czNjcmV0")
            .header("content-type", "application/json")
            .json_body(serde_json::to_value(&tag).unwrap());
        then.status(201);
    });

    client(&server).post_tag(&tag).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn post_tag_reports_non_success_status() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/tag");
        then.status(403).body("forbidden");
    });

    let err = client(&server).post_tag(&sample_tag()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("403"), "unexpected error: {message}");
    assert!(message.contains("forbidden"), "unexpected error: {message}");
    // no retry
    mock.assert_hits(1);
}

#[tokio::test]
async fn probe_access_is_true_only_on_200() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mut ok = server.mock(|when, then| {
        when.method(GET)
            .path("/access")
            .header("authorization", "Basic YWxpY2U6czNjcmV0");
        then.status(200);
    });
    assert!(client(&server).probe_access().await.unwrap());
    ok.assert();
    ok.delete();

    server.mock(|when, then| {
        when.method(GET).path("/access");
        then.status(204);
    });
    assert!(!client(&server).probe_access().await.unwrap());
}
