//! Tests for the connection layer
//!
//! These drive a full connection over the scripted transport: startup
//! registration, sample streams, commands and the shutdown paths.

use super::*;
use crate::config::VariableConfig;
use crate::protocol::FrameBuilder;
use crate::transports::{ScriptedHandle, ScriptedTransport, TransportCall};
use crate::types::RequestId;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn standby_only() -> BridgeConfig {
    BridgeConfig {
        variables: vec![VariableConfig::new("COM STANDBY FREQUENCY:1", "MHz")],
        ..BridgeConfig::default()
    }
}

async fn start(config: &BridgeConfig) -> (BridgeConnection, ScriptedHandle) {
    let (transport, handle) = ScriptedTransport::new();
    let connection = BridgeConnection::start(transport, config).await.expect("start");
    (connection, handle)
}

#[tokio::test]
async fn startup_registers_subscribes_and_binds() {
    let (connection, handle) = start(&BridgeConfig::default()).await;

    let calls = handle.calls();
    let definitions =
        calls.iter().filter(|c| matches!(c, TransportCall::AddToDataDefinition { .. })).count();
    let requests =
        calls.iter().filter(|c| matches!(c, TransportCall::RequestDataOnSimObject { .. })).count();

    assert_eq!(definitions, 4);
    assert_eq!(requests, 4);
    assert_eq!(connection.variables().len(), 4);

    let standby = connection.standby().expect("standby binding");
    assert_eq!(standby.sim_event, "COM_STBY_RADIO_SET_HZ");
    assert_ne!(standby.group.raw(), 0);
}

#[tokio::test]
async fn wait_connected_resolves_on_open() {
    let (connection, handle) = start(&standby_only()).await;
    assert_eq!(connection.state(), SessionState::Connecting);

    handle.push_frame(FrameBuilder::open());
    tokio::time::timeout(WAIT, connection.wait_connected()).await.unwrap().unwrap();
    assert_eq!(connection.state(), SessionState::Connected);
}

#[tokio::test]
async fn wait_connected_fails_when_session_quits_first() {
    let (connection, handle) = start(&standby_only()).await;
    handle.push_frame(FrameBuilder::quit());

    let result = tokio::time::timeout(WAIT, connection.wait_connected()).await.unwrap();
    assert!(matches!(result, Err(BridgeError::Closed)));
}

#[tokio::test]
async fn samples_for_filters_by_name() {
    let (connection, handle) = start(&BridgeConfig::default()).await;
    let active = connection.variables()[0].definition;
    let standby = connection.variables()[1].definition;
    let mut samples = connection.samples_for("COM STANDBY FREQUENCY:1", UpdateRate::Native);

    handle.push_frames([
        FrameBuilder::open(),
        FrameBuilder::object_data(RequestId::new(1), active, 121.5),
        FrameBuilder::object_data(RequestId::new(2), standby, 122.8),
    ]);

    let report = tokio::time::timeout(WAIT, samples.next()).await.unwrap().unwrap();
    assert_eq!(report.name(), "COM STANDBY FREQUENCY:1");
    assert_eq!(report.value(), 122.8);
}

#[tokio::test]
async fn set_standby_transmits_encoded_payload() {
    let config = BridgeConfig {
        standby_event: Some("COM_STBY_RADIO_SET".to_string()),
        standby_encoding: FrequencyEncoding::Bcd16,
        ..standby_only()
    };
    let (connection, handle) = start(&config).await;

    let command = connection.set_standby(Frequency::parse_mhz("118.000").unwrap()).await.unwrap();

    assert_eq!(command.payload, 0x0000_0118);
    assert!(handle.calls().iter().any(|c| matches!(
        c,
        TransportCall::TransmitClientEvent { data: 0x0000_0118, .. }
    )));
}

#[tokio::test]
async fn runtime_registration_goes_through_the_driver() {
    let config =
        BridgeConfig { variables: Vec::new(), standby_event: None, ..BridgeConfig::default() };
    let (connection, handle) = start(&config).await;

    let variable = connection
        .register_variable("NAV ACTIVE FREQUENCY:1", "MHz", DataType::Float64)
        .await
        .unwrap();
    let subscription = connection
        .subscribe(variable.definition, ObjectId::USER, DeliveryMode::Once { radius_meters: 0 })
        .await
        .unwrap();

    assert_eq!(subscription.definition, variable.definition);
    assert_eq!(handle.calls().len(), 2);

    let no_standby = connection.set_standby(Frequency::from_khz(118_000).unwrap()).await;
    assert!(matches!(no_standby, Err(BridgeError::Config { .. })));
}

#[tokio::test]
async fn setup_failure_closes_transport() {
    let (transport, handle) = ScriptedTransport::new();
    handle.fail_next_call(-1);

    let result = BridgeConnection::start(transport, &standby_only()).await;

    assert!(matches!(result, Err(BridgeError::Setup { .. })));
    assert_eq!(handle.close_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_transport_once() {
    let (connection, handle) = start(&standby_only()).await;

    let exit = connection.shutdown().await.unwrap();

    assert_eq!(exit.reason, crate::driver::DisconnectReason::Shutdown);
    assert_eq!(handle.close_count(), 1);
}

#[tokio::test]
async fn commands_after_close_fail() {
    let (connection, handle) = start(&standby_only()).await;
    handle.push_frame(FrameBuilder::quit());
    tokio::time::timeout(WAIT, connection.closed()).await.unwrap();

    let result = connection.set_standby(Frequency::from_khz(118_000).unwrap()).await;
    assert!(matches!(result, Err(BridgeError::Closed)));
    assert_eq!(handle.close_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_stream_sees_events_published_before_it_was_taken() {
    let (transport, handle) = ScriptedTransport::new();
    // definition and request ids are the first ones the session allocates
    handle.push_frames([
        FrameBuilder::open(),
        FrameBuilder::object_data(RequestId::new(1), DefinitionId::new(1), 122.8),
    ]);
    let connection = BridgeConnection::start(transport, &standby_only()).await.unwrap();
    tokio::time::timeout(WAIT, connection.wait_connected()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut events = connection.events();
    handle.push_frames([
        FrameBuilder::object_data(RequestId::new(1), DefinitionId::new(1), 122.8),
        FrameBuilder::quit(),
    ]);

    let mut seen = Vec::new();
    while let Some(event) = tokio::time::timeout(WAIT, events.next()).await.unwrap() {
        seen.push(event);
    }

    assert_eq!(seen.len(), 3, "{seen:?}");
    assert!(matches!(seen[0], BridgeEvent::Connected));
    assert!(matches!(&seen[1], BridgeEvent::Sample(report) if report.value() == 122.8));
    assert!(matches!(seen[2], BridgeEvent::Disconnected(crate::driver::DisconnectReason::Quit)));
}

#[tokio::test]
async fn later_streams_start_at_the_time_they_are_taken() {
    let (connection, handle) = start(&standby_only()).await;
    let mut first = connection.events();
    handle.push_frame(FrameBuilder::open());
    assert!(matches!(
        tokio::time::timeout(WAIT, first.next()).await.unwrap(),
        Some(BridgeEvent::Connected)
    ));

    let mut second = connection.events();
    handle.push_frame(FrameBuilder::quit());
    assert!(matches!(
        tokio::time::timeout(WAIT, second.next()).await.unwrap(),
        Some(BridgeEvent::Disconnected(_))
    ));
}
