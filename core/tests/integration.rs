//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises the client over
//! real HTTP with the default ureq transport. Validates that request building,
//! license acceptance, and response parsing work against an actual server.

use std::io::{Read, Write};
use std::time::Duration;

use movebank_core::{
    studies_by_sensor, transform_raw_acc, transform_raw_gps, AccUnit, ApiError, ClientConfig, HttpMethod,
    HttpRequest, MovebankClient, RequestParams, SensorType, Sensitivity, Transport, UreqTransport,
};

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/movebank/service")
}

/// Serve exactly one connection with a canned reply and hand back the raw
/// request that arrived.
fn serve_once(reply: Vec<u8>) -> (String, std::thread::JoinHandle<Vec<u8>>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
            let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
                if n == 0 {
                    break;
                }
                continue;
            };
            let head = String::from_utf8_lossy(&received[..end]).to_ascii_lowercase();
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            if received.len() >= end + 4 + length || n == 0 {
                break;
            }
        }
        stream.write_all(&reply).unwrap();
        stream.flush().unwrap();
        received
    });
    (format!("http://{addr}"), handle)
}

fn raw_reply(status_line: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut reply = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    reply.extend_from_slice(body);
    reply
}

fn client(base_url: &str) -> MovebankClient {
    let config = ClientConfig::new(base_url)
        .with_credentials(mock_server::USERNAME, mock_server::PASSWORD)
        .with_timeout(Duration::from_secs(10));
    MovebankClient::new(config).unwrap()
}

#[test]
fn movebank_session() {
    let base_url = start_server();
    let client = client(&base_url);

    // Step 1: studies, filtered to those fully visible.
    let studies = client.studies().unwrap();
    let ids: Vec<&str> = studies.iter().map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec!["2911040", "77"]);
    assert_eq!(studies[1]["name"], "White Storks, Rhine valley");

    let gps_studies = studies_by_sensor(&studies, "GPS");
    assert_eq!(gps_studies.len(), 1);

    // Step 2: individuals of an open study.
    let individuals = client.individuals_by_study(mock_server::OPEN_STUDY_ID).unwrap();
    assert_eq!(individuals.len(), 2);
    assert_eq!(individuals[0]["taxon_canonical_name"], "Phoebastria irrorata");

    // Step 3: individuals of a licensed study, license accepted on the way.
    let individuals = client.individuals_by_study(mock_server::LICENSED_STUDY_ID).unwrap();
    assert_eq!(individuals.len(), 1);
    assert_eq!(individuals[0]["local_identifier"], "DER AU057");

    // Step 4: GPS events, reduced to fixes.
    let events = client
        .individual_events(mock_server::OPEN_STUDY_ID, 2911059, SensorType::Gps)
        .unwrap();
    let fixes = transform_raw_gps(&events).unwrap();
    assert_eq!(fixes.len(), 3);
    assert_eq!(fixes[0].location_lat, Some(-1.3737));
    assert_eq!(fixes[2].location_long, None);

    // Step 5: acceleration bursts.
    let events = client
        .individual_events(mock_server::OPEN_STUDY_ID, 2911059, SensorType::Acceleration)
        .unwrap();
    let bursts = transform_raw_acc(&events, AccUnit::G, Sensitivity::High).unwrap();
    assert_eq!(bursts.len(), 1);
    assert_eq!(bursts[0].len(), 2);
    assert_eq!(bursts[0][0].y, 1.0);
    assert_eq!(bursts[0][1].timestamp, "2008-05-31 13:30:05.100");

    // Step 6: JSON service.
    let value = client
        .fetch_json(&RequestParams::new("event").with("study_id", mock_server::OPEN_STUDY_ID))
        .unwrap();
    assert_eq!(value["individuals"][0]["individual_local_identifier"], "4264-84830852");

    // Step 7: unknown study.
    let err = client.individuals_by_study(12345).unwrap_err();
    assert!(err.is_not_found(), "expected 404, got {err:?}");
}

#[test]
fn license_left_unaccepted_when_disabled() {
    let base_url = start_server();
    let config = ClientConfig::new(&base_url)
        .with_credentials(mock_server::USERNAME, mock_server::PASSWORD)
        .with_accept_license(false);
    let client = MovebankClient::new(config).unwrap();

    let params = RequestParams::new("individual").with("study_id", mock_server::LICENSED_STUDY_ID);
    let raw = client.request(&params, movebank_core::Format::Csv).unwrap();
    assert_eq!(raw.text(), mock_server::LICENSE_TERMS);
}

#[test]
fn wrong_credentials_are_remote_errors() {
    let base_url = start_server();
    let config = ClientConfig::new(&base_url).with_credentials("ringer", "wrong");
    let client = MovebankClient::new(config).unwrap();

    let err = client.studies().unwrap_err();
    assert!(matches!(err, ApiError::Remote { status: 401, .. }));
}

#[test]
fn unreachable_host_is_network_error() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = client(&format!("http://127.0.0.1:{port}/movebank/service"));

    let err = client.studies().unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}

#[test]
fn silent_server_times_out() {
    // Accepts connections into the backlog but never answers.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig::new(&format!("http://{addr}/movebank/service"))
        .with_timeout(Duration::from_millis(300));
    let client = MovebankClient::new(config).unwrap();

    let err = client.studies().unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    drop(listener);
}

#[test]
fn error_status_with_binary_body_stays_remote() {
    let (base_url, server) = serve_once(raw_reply("404 Not Found", "text/plain", b"no study \xff\xfe"));
    let client = client(&format!("{base_url}/movebank/service"));

    let err = client.studies().unwrap_err();
    match err {
        ApiError::Remote { status, body } => {
            assert_eq!(status, 404);
            assert!(body.starts_with("no study "));
        }
        other => panic!("expected Remote, got {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn success_with_binary_body_is_format_error() {
    let (base_url, server) = serve_once(raw_reply("200 OK", "text/csv", b"id\n\xff\n"));
    let client = client(&format!("{base_url}/movebank/service"));

    let err = client.studies().unwrap_err();
    assert!(matches!(err, ApiError::Format(_)), "got {err:?}");
    server.join().unwrap();
}

#[test]
fn ureq_transport_sends_post_body_and_headers() {
    let (base_url, server) = serve_once(raw_reply("200 OK", "application/json", b"{\"ok\":true}"));
    let transport = UreqTransport::new(Duration::from_secs(10));
    let request = HttpRequest {
        method: HttpMethod::Post,
        url: format!("{base_url}/movebank/service/direct-read"),
        headers: vec![("content-type".to_string(), "application/x-www-form-urlencoded".to_string())],
        body: Some("entity_type=study".to_string()),
    };

    let response = transport.execute(&request).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.body, "{\"ok\":true}");

    let received = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(received.starts_with("POST /movebank/service/direct-read HTTP/1.1"), "{received}");
    assert!(received.to_ascii_lowercase().contains("content-type: application/x-www-form-urlencoded"));
    assert!(received.ends_with("entity_type=study"));
}
