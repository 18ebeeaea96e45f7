//! Integration tests against a stand-in collector.
//!
//! These tests install the probe over an in-process page, drive page
//! activity through the installed interceptors, and verify what reaches the
//! collector's `/log` endpoint.

#![cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]

use std::rc::Rc;
use std::time::Duration;

use pagetap_probe::config::{Config, DEFAULT_MARKER_NAME};
use pagetap_probe::console::Console;
use pagetap_probe::message::IncomingMessage;
use pagetap_probe::mutation::DomMutation;
use pagetap_probe::page::{CrossOriginWindow, SameOriginWindow};
use pagetap_probe::reporter::{DeliveryStats, Reporter};
use pagetap_probe::session::{PageSession, SessionMarker};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

const PAGE_URL: &str = "https://shop.example/cart";

/// Creates a session posting to `collector_url` over a fresh page.
fn connect(collector_url: &str, marker: &Rc<SessionMarker>) -> (PageSession, Reporter) {
    let config = Config::new(collector_url, DEFAULT_MARKER_NAME).unwrap();
    PageSession::connect(&config, marker.clone(), Rc::new(|| PAGE_URL.to_string())).unwrap()
}

/// Waits until `count` deliveries have settled, failing after two seconds.
async fn settle(reporter: &Reporter, count: u64) -> DeliveryStats {
    for _ in 0..200 {
        let stats = reporter.stats();
        if stats.settled() >= count {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deliveries did not settle: {:?}", reporter.stats());
}

async fn accepting_collector() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;
    mock_server
}

async fn received_bodies(mock_server: &MockServer) -> Vec<Value> {
    mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

// =============================================================================
// End-to-end
// =============================================================================

/// A page script calling `console.log("hello", 42)` yields exactly one
/// `POST /log` with the call's arguments.
#[tokio::test]
async fn test_console_log_reaches_collector() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"type": "console.log", "params": ["hello", 42]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let marker = Rc::new(SessionMarker::new());
    let (session, reporter) = connect(&mock_server.uri(), &marker);
    let installation = session.install(|_: &[Value]| ()).unwrap();

    installation.console.log(&[json!("hello"), json!(42)]);

    let stats = settle(&reporter, 1).await;
    assert_eq!(stats.sent, 1);
}

/// The wrapped console returns what the original returns, even though a
/// report is in flight.
#[tokio::test]
async fn test_wrapped_console_is_transparent() {
    let mock_server = accepting_collector().await;
    let marker = Rc::new(SessionMarker::new());
    let (session, reporter) = connect(&mock_server.uri(), &marker);

    let installation = session
        .install(|args: &[Value]| format!("{} args", args.len()))
        .unwrap();

    assert_eq!(installation.console.log(&[json!(1), json!(2)]), "2 args");
    settle(&reporter, 1).await;

    assert_eq!(
        received_bodies(&mock_server).await,
        vec![json!({"type": "console.log", "params": [1, 2]})]
    );
}

/// Installing twice on the same page produces one set of interceptors, so a
/// single call is reported once.
#[tokio::test]
async fn test_double_installation_does_not_duplicate_reports() {
    let mock_server = accepting_collector().await;
    let marker = Rc::new(SessionMarker::new());

    let (first, reporter) = connect(&mock_server.uri(), &marker);
    let (second, _) = connect(&mock_server.uri(), &marker);

    let installation = first.install(|_: &[Value]| ()).unwrap();
    assert!(second.install(|_: &[Value]| ()).is_none());

    installation.console.log(&[json!("once")]);
    settle(&reporter, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(received_bodies(&mock_server).await.len(), 1);
}

/// Only the non-empty node of a mixed batch reaches the collector.
#[tokio::test]
async fn test_mutation_batch_is_filtered() {
    let mock_server = accepting_collector().await;
    let marker = Rc::new(SessionMarker::new());
    let (session, reporter) = connect(&mock_server.uri(), &marker);
    let installation = session.install(|_: &[Value]| ()).unwrap();

    installation.mutations.document_ready();
    let emitted = installation.mutations.observe(&[
        DomMutation::ChildList {
            added: vec![String::new(), "<span>injected</span>".to_string()],
            removed: 0,
        },
        DomMutation::Attributes {
            name: "style".to_string(),
            old_value: None,
        },
    ]);
    assert_eq!(emitted, 1);

    settle(&reporter, 1).await;
    assert_eq!(
        received_bodies(&mock_server).await,
        vec![json!({
            "type": "mutation",
            "params": {"pageUrl": PAGE_URL, "addedContent": ["<span>injected</span>"]}
        })]
    );
}

/// Messages from same-origin senders are relayed; cross-origin ones are lost
/// without disturbing the page.
#[tokio::test]
async fn test_messages_by_sender_origin() {
    let mock_server = accepting_collector().await;
    let marker = Rc::new(SessionMarker::new());
    let (session, reporter) = connect(&mock_server.uri(), &marker);
    let installation = session.install(|_: &[Value]| ()).unwrap();

    let same = SameOriginWindow::new("https://shop.example/widget");
    let cross = CrossOriginWindow::new("https://ads.example");

    assert!(installation.messages.on_message(&IncomingMessage::new(
        "https://shop.example",
        json!({"x": 1}),
        &same,
    )));
    assert!(!installation.messages.on_message(&IncomingMessage::new(
        "https://ads.example",
        json!({"x": 2}),
        &cross,
    )));

    let stats = settle(&reporter, 2).await;
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.dropped, 1);

    let bodies = received_bodies(&mock_server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["type"], "message");
    assert_eq!(bodies[0]["params"]["sourceHref"], "https://shop.example/widget");
    assert_eq!(bodies[0]["params"]["data"], json!({"x": 1}));
}

// =============================================================================
// Failure handling
// =============================================================================

/// A non-success status is informational: counted, not retried.
#[tokio::test]
async fn test_non_success_status_is_counted_not_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .respond_with(ResponseTemplate::new(500).set_body_string("collector down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let marker = Rc::new(SessionMarker::new());
    let (session, reporter) = connect(&mock_server.uri(), &marker);
    let installation = session.install(|_: &[Value]| ()).unwrap();

    installation.console.log(&[json!("x")]);

    let stats = settle(&reporter, 1).await;
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.sent, 0);
}

/// An unreachable collector changes nothing for the page.
#[tokio::test]
async fn test_unreachable_collector_is_harmless() {
    let marker = Rc::new(SessionMarker::new());
    // Port 1 is reserved and refuses connections.
    let (session, reporter) = connect("http://127.0.0.1:1", &marker);
    let installation = session.install(|args: &[Value]| args.len()).unwrap();

    assert_eq!(installation.console.log(&[json!("a"), json!("b")]), 2);
    installation.mutations.document_ready();
    installation.mutations.observe(&[DomMutation::ChildList {
        added: vec!["<p>x</p>".to_string()],
        removed: 0,
    }]);

    let stats = settle(&reporter, 2).await;
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.sent, 0);
}

/// `send` exposes the delivery outcome that `report` only counts.
#[tokio::test]
async fn test_send_returns_delivery_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = Config::new(&mock_server.uri(), DEFAULT_MARKER_NAME).unwrap();
    let reporter = Reporter::new(&config).unwrap();

    let delivery = reporter
        .send(&pagetap_probe::Event::console(&[json!("direct")]))
        .await
        .unwrap();

    assert_eq!(delivery.status, 404);
    assert!(!delivery.is_success());
    assert_eq!(reporter.stats().rejected, 1);
}
