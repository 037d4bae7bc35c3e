//! The HTTP protocol implementation against a one-shot stub server.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use data_entry::*;

/// Serves exactly one request and hands back the raw request text.
fn serve_once(response: String) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{}", addr), handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let header_end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => pos + 4,
        None => return false,
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]);
    let mut content_length = 0usize;
    for line in headers.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    buf.len() >= header_end + content_length
}

fn http_response(status: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}

fn target() -> EntryTarget {
    EntryTarget {
        election_id: 1,
        polling_station_id: 2,
        entry_number: 1,
    }
}

const CLAIM_BODY: &str = r#"{
  "client_state": {"continue": true, "furthest": 2},
  "progress": 40,
  "data": {
    "recounted": false,
    "voters_counts": {"poll_card_count": 10, "proxy_certificate_count": 0, "voter_card_count": 0, "total_admitted_voters_count": 10},
    "votes_counts": {"votes_candidates_count": 10, "blank_votes_count": 0, "invalid_votes_count": 0, "total_votes_cast_count": 10},
    "differences_counts": {"more_ballots_count": 0, "fewer_ballots_count": 0, "unreturned_ballots_count": 0, "too_few_ballots_handed_out_count": 0, "too_many_ballots_handed_out_count": 0, "other_explanation_count": 0, "no_explanation_count": 0},
    "political_group_votes": [{"number": 1, "total": 10, "candidate_votes": [{"number": 1, "votes": 10}]}]
  }
}"#;

#[test]
fn claim_parses_the_record_and_sends_the_session_cookie() {
    let (url, handle) = serve_once(http_response(200, "OK", CLAIM_BODY));
    let api = HttpEntryApi::new(&url, Some("session=abc123".to_string()));
    let outcome = api.claim(&target()).unwrap();
    let claim = match outcome {
        ClaimOutcome::Found(claim) => claim,
        other => panic!("expected a record, got {:?}", other),
    };
    assert_eq!(claim.progress, 40);
    assert!(claim.client_state.continues());
    assert_eq!(claim.data.voters_counts.poll_card_count, 10);
    assert_eq!(claim.data.political_group_votes.len(), 1);

    let request = handle.join().unwrap();
    assert!(request.starts_with("POST /api/elections/1/polling_stations/2/data_entries/1/claim"));
    assert!(request.contains("Cookie: session=abc123"));
}

#[test]
fn claim_maps_404_to_the_not_found_outcome() {
    let (url, handle) = serve_once(http_response(
        404,
        "Not Found",
        r#"{"error": "no data entry", "fatal": false, "reference": "EntryNotFound"}"#,
    ));
    let api = HttpEntryApi::new(&url, None);
    let outcome = api.claim(&target()).unwrap();
    assert_eq!(outcome, ClaimOutcome::NotFound);
    handle.join().unwrap();
}

#[test]
fn save_posts_the_full_tree_and_parses_the_validation_arrays() {
    let body = r#"{"validation_results": {"errors": [{"code": "F201", "fields": ["data.voters_counts.poll_card_count"]}], "warnings": []}}"#;
    let (url, handle) = serve_once(http_response(200, "OK", body));
    let api = HttpEntryApi::new(&url, None);

    let election = Election {
        id: 1,
        name: "Test".to_string(),
        recount: false,
        political_groups: vec![PoliticalGroup {
            number: 1,
            name: "One".to_string(),
            candidates: vec![Candidate {
                number: 1,
                name: "A".to_string(),
            }],
        }],
    };
    let mut client_state = ClientState::default();
    client_state.set_continue(true);
    let request = SaveRequest {
        data: PollingStationResults::empty(&election),
        client_state,
    };
    let response = api.save(&target(), &request).unwrap();
    assert_eq!(response.validation_results.errors[0].code, "F201");
    assert!(response.validation_results.warnings.is_empty());

    let raw = handle.join().unwrap();
    assert!(raw.starts_with("POST /api/elections/1/polling_stations/2/data_entries/1 "));
    assert!(raw.contains(r#""continue":true"#));
    assert!(raw.contains(r#""political_group_votes""#));
}

#[test]
fn an_error_envelope_is_surfaced_with_its_reference() {
    let (url, handle) = serve_once(http_response(
        409,
        "Conflict",
        r#"{"error": "data entry already claimed", "fatal": false, "reference": "EntryInProgress"}"#,
    ));
    let api = HttpEntryApi::new(&url, None);
    let err = api.finalise(&target()).unwrap_err();
    match err {
        ApiError::Server { status, envelope } => {
            assert_eq!(status, 409);
            assert_eq!(envelope.reference, "EntryInProgress");
            assert!(!envelope.fatal);
        }
        other => panic!("expected a server error, got {:?}", other),
    }
    let raw = handle.join().unwrap();
    assert!(raw.starts_with("POST /api/elections/1/polling_stations/2/data_entries/1/finalise"));
}

#[test]
fn plain_error_bodies_are_wrapped_in_a_synthetic_envelope() {
    let (url, handle) = serve_once(http_response(500, "Internal Server Error", "oops"));
    let api = HttpEntryApi::new(&url, None);
    let err = api.delete(&target()).unwrap_err();
    match err {
        ApiError::Server { status, envelope } => {
            assert_eq!(status, 500);
            assert!(envelope.fatal);
            assert_eq!(envelope.error, "oops");
        }
        other => panic!("expected a server error, got {:?}", other),
    }
    let raw = handle.join().unwrap();
    assert!(raw.starts_with("DELETE /api/elections/1/polling_stations/2/data_entries/1 "));
}

#[test]
fn delete_returns_unit_on_success() {
    let (url, handle) = serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string());
    let api = HttpEntryApi::new(&url, None);
    api.delete(&target()).unwrap();
    handle.join().unwrap();
}

#[test]
fn transport_failures_are_reported_as_network_errors() {
    // Bind a port and close it again: nobody is listening there now.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = HttpEntryApi::new(&format!("http://{}", addr), None);
    let err = api.claim(&target()).unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }));
}
