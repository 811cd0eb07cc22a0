//! End-to-end tests driving a real TCP server with [`GymClient`].

use std::path::Path;
use std::sync::Arc;
use std::thread;

use gymsock_core::space::Space;
use gymsock_core::traits::Hooks;
use gymsock_core::value::Value;
use gymsock_server::{ClientError, GymClient, GymServer, SpaceId};
use gymsock_test_utils::{AcceptingMonitor, MockProvider, RecordingUploader, test_hooks};
use serde_json::json;

fn spawn_server(
    server: GymServer,
    connections: usize,
) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.serve_n(connections).unwrap());
    (addr, handle)
}

fn noop_server(hooks: Hooks) -> GymServer {
    GymServer::bind("127.0.0.1:0", Arc::new(MockProvider::noop()), hooks).unwrap()
}

#[test]
fn noop_episode() {
    let (addr, server) = spawn_server(noop_server(test_hooks()), 1);

    let mut client = GymClient::connect(addr, "no-op-env").unwrap();
    let spaces = client.spaces().unwrap().clone();
    assert_eq!(spaces.action, Space::discrete(4));
    assert_eq!(spaces.observation, Space::discrete(4));

    assert_eq!(client.reset().unwrap(), Value::Discrete(0));
    let reply = client.step(&json!(3)).unwrap();
    assert_eq!(reply.observation, Value::Discrete(0));
    assert!(!reply.done);
    assert_eq!(reply.info, json!({}));

    for _ in 0..20 {
        let action = client.sample_action().unwrap().as_u64().unwrap();
        assert!(action < 4);
    }
    client.render().unwrap();
    assert_eq!(client.get_space(SpaceId::Observation).unwrap(), Space::discrete(4));

    drop(client);
    server.join().unwrap();
}

#[test]
fn unknown_environment_is_reported() {
    let (addr, server) = spawn_server(noop_server(test_hooks()), 1);

    let err = GymClient::connect(addr, "Missing-v0").unwrap_err();
    match err {
        ClientError::Remote(message) => {
            assert_eq!(message, "no registered environment with id: Missing-v0");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn monitor_and_upload_reach_hooks() {
    let monitor = AcceptingMonitor::default();
    let uploader = RecordingUploader::default();
    let hooks = Hooks::new(monitor.clone()).with_uploader(uploader.clone());
    let (addr, server) = spawn_server(noop_server(hooks), 2);

    let mut client = GymClient::connect(addr, "no-op-env").unwrap();
    client
        .monitor(Path::new("/tmp/gymsock-runs"), false, true, false)
        .unwrap();
    let started = monitor.started();
    assert_eq!(started.len(), 1);
    assert!(started[0].force);
    assert_eq!(started[0].directory, Path::new("/tmp/gymsock-runs"));
    drop(client);

    // upload works without an environment
    let mut uploader_client = GymClient::connect(addr, "").unwrap();
    assert!(uploader_client.spaces().is_none());
    uploader_client
        .upload(Path::new("/tmp/gymsock-runs"), "secret", Some("alg-1"))
        .unwrap();
    let err = uploader_client
        .upload(Path::new("/tmp/gymsock-runs"), "", None)
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote(_)));
    drop(uploader_client);

    server.join().unwrap();
    let requests = uploader.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].algorithm_id.as_deref(), Some("alg-1"));
}

#[test]
fn extensions_disabled_is_recoverable() {
    let (addr, server) = spawn_server(noop_server(test_hooks()), 1);

    let mut client = GymClient::connect(addr, "no-op-env").unwrap();
    let err = client.configure(&json!({"difficulty": 2})).unwrap_err();
    assert_eq!(err.to_string(), "server error: extensions are not enabled");
    let err = client.wrap("TimeLimit", &json!({})).unwrap_err();
    assert_eq!(err.to_string(), "server error: extensions are not enabled");

    // the session keeps serving after recoverable errors
    assert_eq!(client.reset().unwrap(), Value::Discrete(0));

    drop(client);
    server.join().unwrap();
}

#[test]
fn two_clients_are_served_concurrently() {
    let (addr, server) = spawn_server(noop_server(test_hooks()), 2);

    let mut first = GymClient::connect(addr, "no-op-env").unwrap();
    let mut second = GymClient::connect(addr, "no-op-env").unwrap();

    first.reset().unwrap();
    second.reset().unwrap();
    for action in 0..4 {
        first.step(&json!(action)).unwrap();
        second.step(&json!(3 - action)).unwrap();
    }

    drop(first);
    drop(second);
    server.join().unwrap();
}

#[test]
fn seeded_servers_sample_identically() {
    let samples = || {
        let server = noop_server(test_hooks()).with_seed(Some(11));
        let (addr, handle) = spawn_server(server, 1);
        let mut client = GymClient::connect(addr, "no-op-env").unwrap();
        let drawn: Vec<_> = (0..16).map(|_| client.sample_action().unwrap()).collect();
        drop(client);
        handle.join().unwrap();
        drawn
    };
    assert_eq!(samples(), samples());
}
