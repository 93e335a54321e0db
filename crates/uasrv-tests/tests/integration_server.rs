// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Server Integration Tests
//!
//! ## Test Categories
//!
//! - `test_lifecycle_*`: Start, stop and restart
//! - `test_ids_*`: Identifier counters
//! - `test_history_*`: History toggles on node attributes
//! - `test_persistence_*`: Discovery registrations across restarts

use std::thread;
use std::time::Duration;

use uasrv_core::error::{ServerError, UaError};
use uasrv_core::types::{
    object_ids, AccessLevel, AttributeId, DataValue, EventNotifier, NodeId, User, Variant,
};
use uasrv_server::{InternalServer, SessionState};
use uasrv_tests::prelude::*;

fn status_node(id: u32) -> NodeId {
    NodeId::numeric(0, id)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_lifecycle_start_writes_status_nodes() {
    let harness = TestServer::started(
        TestHarnessConfig::new("server_start").with_clock(Duration::from_millis(20)),
    );
    let nodes = &harness.mocks.nodes;

    assert!(harness.server.is_running());
    assert_eq!(
        nodes.value(&status_node(object_ids::SERVER_SERVER_STATUS_STATE), AttributeId::Value),
        Some(Variant::Int32(0))
    );
    let start_time = nodes.value(
        &status_node(object_ids::SERVER_SERVER_STATUS_START_TIME),
        AttributeId::Value,
    );
    assert!(matches!(start_time, Some(Variant::DateTime(_))));

    thread::sleep(Duration::from_millis(100));
    let first = nodes.value(
        &status_node(object_ids::SERVER_SERVER_STATUS_CURRENT_TIME),
        AttributeId::Value,
    );
    thread::sleep(Duration::from_millis(100));
    let second = nodes.value(
        &status_node(object_ids::SERVER_SERVER_STATUS_CURRENT_TIME),
        AttributeId::Value,
    );
    match (first, second) {
        (Some(Variant::DateTime(a)), Some(Variant::DateTime(b))) => assert!(b > a),
        other => panic!("clock did not tick: {:?}", other),
    }
}

#[test]
fn test_lifecycle_stop_halts_clock() {
    let harness = TestServer::started(
        TestHarnessConfig::new("server_stop_clock").with_clock(Duration::from_millis(20)),
    );
    thread::sleep(Duration::from_millis(80));
    harness.server.stop();
    assert!(!harness.server.is_running());

    let node = status_node(object_ids::SERVER_SERVER_STATUS_CURRENT_TIME);
    let frozen = harness.mocks.nodes.value(&node, AttributeId::Value);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(harness.mocks.nodes.value(&node, AttributeId::Value), frozen);
}

#[test]
fn test_lifecycle_clock_can_be_disabled() {
    let harness = TestServer::with_name("server_clock_disabled");
    harness.server.set_clock_enabled(false);
    harness.server.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        harness.mocks.nodes.value(
            &status_node(object_ids::SERVER_SERVER_STATUS_CURRENT_TIME),
            AttributeId::Value
        ),
        None
    );
}

#[test]
fn test_lifecycle_start_is_idempotent() {
    let harness = TestServer::started(TestHarnessConfig::new("server_start_twice"));
    let session = harness.server.internal_session();
    harness.server.start().unwrap();
    assert_eq!(harness.server.internal_session().session_id(), session.session_id());
    assert_eq!(harness.mocks.subscriptions.scheduler_updates(), vec![true]);
}

#[test]
fn test_lifecycle_stop_closes_internal_session_and_history() {
    let harness = TestServer::started(TestHarnessConfig::new("server_stop"));
    let internal = harness.server.internal_session();

    harness.server.stop();
    assert_eq!(internal.state(), SessionState::Closed);
    assert_eq!(harness.mocks.history.calls(), vec![HistoryCall::Stop]);
    assert_eq!(harness.mocks.subscriptions.scheduler_updates(), vec![true, false]);

    // Stopping a stopped server changes nothing.
    harness.server.stop();
    assert_eq!(harness.mocks.history.calls().len(), 1);
}

#[test]
fn test_lifecycle_restart() {
    let harness = TestServer::started(TestHarnessConfig::new("server_restart"));
    let before = harness.server.internal_session();
    harness.server.stop();
    harness.server.start().unwrap();

    let after = harness.server.internal_session();
    assert_ne!(before.session_id(), after.session_id());
    assert_eq!(after.user(), User::Admin);
    assert!(harness.server.is_running());

    // The restarted scheduler serves new work.
    let discovery = harness.server.local_discovery_service();
    discovery
        .register_server(
            &DiscoveryFixtures::registered_server("urn:plant:restart", "opc.tcp://0.0.0.0:4840"),
            Vec::new(),
        )
        .unwrap();
}

#[test]
fn test_lifecycle_start_fails_when_status_write_fails() {
    let harness = TestServer::with_name("server_start_failure");
    harness.mocks.nodes.set_fail_writes(true);
    let err = harness.server.start().unwrap_err();
    assert!(matches!(err, UaError::Service(_)));
    assert!(!harness.server.is_running());
    assert_eq!(harness.mocks.subscriptions.scheduler_updates(), vec![true, false]);
}

// =============================================================================
// Identifiers
// =============================================================================

#[test]
fn test_ids_are_unique_and_increasing() {
    let harness = TestServer::with_name("server_ids");
    let sessions: Vec<_> = (0..5)
        .map(|i| harness.server.create_session(format!("s{}", i), User::Anonymous, true).unwrap())
        .collect();

    let ids: Vec<u32> = sessions
        .iter()
        .map(|s| s.session_id().as_numeric().unwrap())
        .collect();
    assert_eq!(ids, vec![11, 12, 13, 14, 15]);

    let tokens: Vec<u32> = sessions
        .iter()
        .map(|s| s.authentication_token().as_numeric().unwrap())
        .collect();
    assert_eq!(tokens, vec![1001, 1002, 1003, 1004, 1005]);
}

#[test]
fn test_ids_channels_from_many_threads() {
    let harness = TestServer::with_name("server_channels");
    let server = &harness.server;

    let mut ids: Vec<u32> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| (0..25).map(|_| server.get_new_channel_id().unwrap()).collect::<Vec<_>>()))
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });
    ids.sort_unstable();
    assert_eq!(ids, (6..106).collect::<Vec<u32>>());
}

// =============================================================================
// History
// =============================================================================

#[test]
fn test_history_data_change_toggle() {
    let harness = TestServer::with_name("server_history_data");
    let nodes = &harness.mocks.nodes;
    let node = NodeId::string(2, "Tank.Level");
    let rw = AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE;
    nodes.put(&node, AttributeId::AccessLevel, Variant::Byte(rw));
    nodes.put(&node, AttributeId::UserAccessLevel, Variant::Byte(AccessLevel::CURRENT_READ));

    let retention = harness.server.default_history_retention();
    harness.server.enable_history_data_change(&node, retention).unwrap();
    assert_eq!(nodes.value(&node, AttributeId::Historizing), Some(Variant::Boolean(true)));
    assert_eq!(
        nodes.value(&node, AttributeId::AccessLevel),
        Some(Variant::Byte(rw | AccessLevel::HISTORY_READ))
    );
    assert_eq!(
        nodes.value(&node, AttributeId::UserAccessLevel),
        Some(Variant::Byte(AccessLevel::CURRENT_READ | AccessLevel::HISTORY_READ))
    );

    harness.server.disable_history_data_change(&node).unwrap();
    assert_eq!(nodes.value(&node, AttributeId::Historizing), Some(Variant::Boolean(false)));
    assert_eq!(nodes.value(&node, AttributeId::AccessLevel), Some(Variant::Byte(rw)));

    assert_eq!(
        harness.mocks.history.calls(),
        vec![
            HistoryCall::DataChange(node.clone()),
            HistoryCall::Dehistorize(node.clone())
        ]
    );
}

#[test]
fn test_history_event_requires_subscribe_bit() {
    let harness = TestServer::with_name("server_history_event");
    let nodes = &harness.mocks.nodes;
    let source = NodeId::numeric(0, 2253);
    nodes.put(&source, AttributeId::EventNotifier, Variant::Byte(0));

    let err = harness
        .server
        .enable_history_event(&source, harness.server.default_history_retention())
        .unwrap_err();
    assert!(matches!(err, UaError::Server(ServerError::NodeNotEventSource { .. })));
    assert!(harness.mocks.history.calls().is_empty());

    nodes.put(
        &source,
        AttributeId::EventNotifier,
        Variant::Byte(EventNotifier::SUBSCRIBE_TO_EVENTS),
    );
    harness
        .server
        .enable_history_event(&source, harness.server.default_history_retention())
        .unwrap();
    assert_eq!(
        nodes.value(&source, AttributeId::EventNotifier),
        Some(Variant::Byte(EventNotifier::SUBSCRIBE_TO_EVENTS | EventNotifier::HISTORY_READ))
    );
    assert_eq!(harness.mocks.history.calls(), vec![HistoryCall::Event(source.clone())]);

    harness.server.disable_history_event(&source).unwrap();
    assert_eq!(
        nodes.value(&source, AttributeId::EventNotifier),
        Some(Variant::Byte(EventNotifier::SUBSCRIBE_TO_EVENTS))
    );
}

#[test]
fn test_history_set_attribute_value_honours_attribute() {
    let harness = TestServer::with_name("server_set_attribute");
    let node = NodeId::numeric(2, 7);
    harness
        .server
        .set_attribute_value(&node, DataValue::new(true), AttributeId::Historizing)
        .unwrap();
    assert_eq!(
        harness.mocks.nodes.value(&node, AttributeId::Historizing),
        Some(Variant::Boolean(true))
    );
    assert_eq!(harness.mocks.nodes.value(&node, AttributeId::Value), None);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_persistence_registrations_survive_restart() {
    let harness = TestServer::with_name("server_persistence");
    let config = harness.persistent_config();

    {
        let mocks = MockServices::new();
        let server = InternalServer::from_config(&config, mocks.service_set()).unwrap();
        server.start().unwrap();
        let discovery = server.local_discovery_service();
        for registered in DiscoveryFixtures::registered_batch(2) {
            discovery.register_server(&registered, Vec::new()).unwrap();
        }
        assert_eq!(discovery.len(), 3);
        server.stop();
    }

    let mocks = MockServices::new();
    let server = InternalServer::from_config(&config, mocks.service_set()).unwrap();
    server.start().unwrap();
    let discovery = server.local_discovery_service();
    assert!(discovery.contains("urn:plant:line:0"));
    assert!(discovery.contains("urn:plant:line:1"));
    assert_eq!(discovery.len(), 3);
    server.stop();
}

#[test]
fn test_persistence_expiry_deletes_stored_row() {
    let harness = TestServer::with_name("server_persistence_expiry");
    let mut config = harness.persistent_config();
    config.discovery.registration_timeout_secs = 1;

    let mocks = MockServices::new();
    let server = InternalServer::from_config(&config, mocks.service_set()).unwrap();
    server.start().unwrap();
    server
        .local_discovery_service()
        .register_server(
            &DiscoveryFixtures::registered_server("urn:plant:brief", "opc.tcp://0.0.0.0:4840"),
            Vec::new(),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(1500));
    assert!(!server.local_discovery_service().contains("urn:plant:brief"));
    server.stop();
    drop(server);

    let backend = uasrv_store::SqliteBackend::open(
        harness.temp_file("registry.db"),
        uasrv_store::StoreMode::ReadWrite,
        Default::default(),
    )
    .unwrap();
    let store = uasrv_server::RegistrationStore::new(std::sync::Arc::new(backend)).unwrap();
    assert!(store.is_empty().unwrap());
}
