//! End-to-end tests against the simulated daemon.
//!
//! Each test starts its own simulator on a free port, connects a real
//! `Client` to it and drives both channels over TCP.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pilight_client::{
    Client, ClientConfig, ClientError, EngineState, Envelope, IdentifyOptions, Role,
};
use pilight_daemon_sim::{EventFeed, SimConfig, SimDaemon};
use serde_json::json;

fn test_config(daemon: &SimDaemon) -> ClientConfig {
    ClientConfig {
        timeout_ms: 100,
        heartbeat_interval_ms: 50,
        reconnect_delay_ms: 20,
        ..ClientConfig::new("127.0.0.1", daemon.port())
    }
}

type Inbox = Arc<Mutex<Vec<Envelope>>>;

fn start_collecting(client: &Client) -> Inbox {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    client
        .set_handler(move |event| sink.lock().unwrap().push(event))
        .unwrap();
    client.start().unwrap();
    inbox
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn repeats(inbox: &Inbox) -> Vec<i64> {
    inbox
        .lock()
        .unwrap()
        .iter()
        .filter_map(Envelope::repeats)
        .collect()
}

#[test]
fn test_connect_identifies_both_channels() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();

    assert_eq!(client.state(), EngineState::Ready);
    assert_eq!(client.endpoint().port(), daemon.port());

    let idents = daemon.identifications();
    assert_eq!(idents.len(), 2);
    assert_eq!(idents[0], IdentifyOptions::sender());
    assert_eq!(idents[1], IdentifyOptions::receiver());
}

#[test]
fn test_custom_receiver_identification_is_sent() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let config = ClientConfig {
        recv_ident: Some(IdentifyOptions::receiver().with("core", 1)),
        ..test_config(&daemon)
    };
    let _client = Client::connect(config).unwrap();

    let idents = daemon.identifications();
    assert!(idents[1].requests("core"));
    assert!(idents[1].requests("receiver"));
}

#[test]
fn test_rejected_receiver_aborts_construction() {
    let daemon = SimDaemon::start(SimConfig {
        reject_receivers: true,
        ..SimConfig::default()
    })
    .unwrap();

    match Client::connect(test_config(&daemon)).unwrap_err() {
        ClientError::ConnectionRejected { role, .. } => assert_eq!(role, Role::Event),
        other => panic!("expected ConnectionRejected, got: {}", other),
    }

    assert!(
        wait_until(Duration::from_secs(1), || daemon.active_connections() == 0),
        "no connection may stay open after a failed construction"
    );
}

#[test]
fn test_unreachable_daemon_is_rejected() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let config = test_config(&daemon);
    daemon.stop();

    let err = Client::connect(config).unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_REJECTED");
}

#[test]
fn test_send_outcomes() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();

    client
        .send_code(&json!({"protocol": ["daycom"], "systemcode": 1, "on": 1}), true)
        .unwrap();

    assert!(matches!(
        client
            .send_code(&json!({"protocol": ["kaku_switch"]}), true)
            .unwrap_err(),
        ClientError::AcknowledgmentMissing { .. }
    ));

    assert!(matches!(
        client
            .send_code(&json!({"not_a_protocol": ["daycom"]}), true)
            .unwrap_err(),
        ClientError::InvalidCommand { .. }
    ));

    let codes = daemon.received_codes();
    assert_eq!(codes.len(), 2);
    assert_eq!(codes[0]["systemcode"], 1);
}

#[test]
fn test_send_while_running_does_not_disturb_watchdog() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();
    let _inbox = start_collecting(&client);

    for _ in 0..20 {
        client.send_code(&json!({"protocol": "daycom"}), true).unwrap();
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(daemon.heartbeats() >= 2);
    assert_eq!(client.state(), EngineState::Ready);
    assert_eq!(daemon.connections_accepted(), 2, "no reconnect expected");
}

#[test]
fn test_repeats_suppressed_by_default() {
    let daemon = SimDaemon::start(SimConfig {
        feed: Some(EventFeed::button_press()),
        ..SimConfig::default()
    })
    .unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();
    let inbox = start_collecting(&client);

    assert!(wait_until(Duration::from_secs(1), || !repeats(&inbox).is_empty()));
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(repeats(&inbox), vec![1]);
}

#[test]
fn test_all_repeats_delivered_in_order_when_not_suppressed() {
    let daemon = SimDaemon::start(SimConfig {
        feed: Some(EventFeed::button_press()),
        ..SimConfig::default()
    })
    .unwrap();
    let config = ClientConfig {
        veto_repeats: false,
        ..test_config(&daemon)
    };
    let client = Client::connect(config).unwrap();
    let inbox = start_collecting(&client);

    assert!(wait_until(Duration::from_secs(2), || repeats(&inbox).len() == 10));
    assert_eq!(repeats(&inbox), (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_non_receiver_frames_filtered() {
    let frames = vec![
        json!({"origin": "core", "values": {"cpu": 1.5}}),
        json!({"origin": "receiver", "repeats": 1, "message": {"id": 1}}),
        json!({"origin": "sender", "repeats": 1, "message": {"id": 2}}),
        json!({"origin": "config", "repeats": 1}),
        json!({"origin": "receiver", "repeats": 1, "message": {"id": 3}}),
    ];
    let daemon = SimDaemon::start(SimConfig {
        feed: Some(EventFeed::once(frames)),
        ..SimConfig::default()
    })
    .unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();
    let inbox = start_collecting(&client);

    assert!(wait_until(Duration::from_secs(1), || inbox.lock().unwrap().len() == 2));
    std::thread::sleep(Duration::from_millis(100));

    let ids: Vec<i64> = inbox
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.message().and_then(|m| m["id"].as_i64()))
        .collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_unfiltered_policy_delivers_everything() {
    let frames = vec![
        json!({"origin": "core", "values": {}}),
        json!({"origin": "receiver", "repeats": 4}),
    ];
    let daemon = SimDaemon::start(SimConfig {
        feed: Some(EventFeed::once(frames)),
        ..SimConfig::default()
    })
    .unwrap();
    let config = ClientConfig {
        recv_codes_only: false,
        ..test_config(&daemon)
    };
    let client = Client::connect(config).unwrap();
    let inbox = start_collecting(&client);

    assert!(wait_until(Duration::from_secs(1), || inbox.lock().unwrap().len() == 2));
    assert_eq!(inbox.lock().unwrap()[0].origin(), Some("core"));
}

#[test]
fn test_recovers_after_daemon_drops_connections() {
    let daemon = SimDaemon::start(SimConfig {
        feed: Some(EventFeed::button_press()),
        ..SimConfig::default()
    })
    .unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();
    let inbox = start_collecting(&client);

    assert!(wait_until(Duration::from_secs(1), || repeats(&inbox).len() == 1));

    daemon.sever_connections();

    assert!(
        wait_until(Duration::from_secs(2), || repeats(&inbox).len() >= 2),
        "events resume on the rebuilt event channel"
    );
    assert!(wait_until(Duration::from_secs(2), || client.state()
        == EngineState::Ready));
    client.send_code(&json!({"protocol": "daycom"}), true).unwrap();
    assert!(daemon.connections_accepted() >= 4);
}

#[test]
fn test_send_after_sever_reconnects_once() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();

    daemon.sever_connections();
    std::thread::sleep(Duration::from_millis(50));

    client.send_code(&json!({"protocol": "daycom"}), true).unwrap();
    assert_eq!(daemon.received_codes().len(), 1);
    assert_eq!(daemon.connections_accepted(), 3);
}

#[test]
fn test_stop_is_bounded_idempotent_and_closes_sockets() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();
    let _inbox = start_collecting(&client);
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    client.stop();
    assert!(started.elapsed() < Duration::from_secs(1));

    client.stop();
    assert_eq!(client.state(), EngineState::Stopped);
    assert!(wait_until(Duration::from_secs(1), || daemon.active_connections() == 0));
}

#[test]
fn test_handler_required_before_start() {
    let daemon = SimDaemon::start(SimConfig::default()).unwrap();
    let client = Client::connect(test_config(&daemon)).unwrap();

    let err = client.start().unwrap_err();
    assert!(matches!(err, ClientError::HandlerMissing));
    assert!(err.is_user_error());

    let _inbox = start_collecting(&client);
    assert!(matches!(
        client.start().unwrap_err(),
        ClientError::AlreadyStarted
    ));
}
