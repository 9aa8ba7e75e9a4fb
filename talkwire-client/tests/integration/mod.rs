//! Integration tests for talkwire-client.
//!
//! Tests are organized by functionality:
//! - `router_tests` - listener registration and dispatch
//! - `roster_tests` - snapshot diffing and remote call end
//! - `peer_tests` - connection lifecycle against a fake media engine
//! - `call_state_tests` - transition table and state timers
//! - `config_tests` - configuration defaults and parsing
//! - `transport_tests` - polling backoff and relay resumption
//! - `session_tests` - full call sessions over mock transport and backend


use std::sync::Arc;
use talkwire_client::{
    CallConfig, CallHandle, CallSession, ChannelListener, EngineEvent, LeaveReason,
    PeerConnectionManager, Routed, SignalingRouter, Subscription, Topology,
};
use talkwire_core::SignalingMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Level;

use crate::utils::{
    EventLog, FakeEngine, MockBackend, MockSignalingOutput, MockTransport, new_event_log, sid,
};

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A connection manager wired to a fake engine and a capturing output.
pub struct PeerHarness {
    pub manager: PeerConnectionManager,
    pub engine: FakeEngine,
    pub output: MockSignalingOutput,
    pub sent_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    pub router: SignalingRouter,
    pub routed_rx: mpsc::UnboundedReceiver<Routed>,
    pub engine_rx: mpsc::Receiver<EngineEvent>,
    pub log: EventLog,
    _fallback: Subscription,
}

impl PeerHarness {
    pub fn new(topology: Topology, local: &str) -> Self {
        let log = new_event_log();
        let engine = FakeEngine::new(log.clone());
        let (output, sent_rx) = MockSignalingOutput::new();
        let router = SignalingRouter::new(sid(local));
        let (routed_tx, routed_rx) = mpsc::unbounded_channel();
        let listener = ChannelListener(routed_tx);
        let fallback = router.set_fallback_listener(Arc::new(listener.clone()));
        let (engine_tx, engine_rx) = mpsc::channel(64);

        let config = CallConfig {
            topology,
            ..CallConfig::default()
        };
        let manager = PeerConnectionManager::new(
            &config,
            sid(local),
            Arc::new(engine.clone()),
            Arc::new(output.clone()),
            router.clone(),
            listener,
            engine_tx,
        );

        Self {
            manager,
            engine,
            output,
            sent_rx,
            router,
            routed_rx,
            engine_rx,
            log,
            _fallback: fallback,
        }
    }

    /// Feeds the next pending engine event to the manager.
    pub async fn pump_engine(&mut self) -> Option<talkwire_client::PeerUpdate> {
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), self.engine_rx.recv())
            .await
            .expect("Timed out waiting for engine event")
            .expect("Engine channel closed");
        self.manager.handle_engine_event(event).await
    }
}

/// Test doubles behind a running call session.
pub struct CallHarness {
    pub handle: CallHandle,
    pub task: JoinHandle<LeaveReason>,
    pub engine: FakeEngine,
    pub transport: MockTransport,
    pub sent_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    pub backend: MockBackend,
    pub log: EventLog,
}

/// Spawns a call session for `local` with default doubles.
pub fn start_call(config: CallConfig, local: &str) -> CallHarness {
    let log = new_event_log();
    let engine = FakeEngine::new(log.clone());
    let (transport, sent_rx) = MockTransport::new(log.clone());
    let backend = MockBackend::new(log.clone());
    start_call_with(config, local, engine, transport, sent_rx, backend, log)
}

pub fn start_call_with(
    config: CallConfig,
    local: &str,
    engine: FakeEngine,
    transport: MockTransport,
    sent_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    backend: MockBackend,
    log: EventLog,
) -> CallHarness {
    let (session, handle) = CallSession::new(
        config,
        sid(local),
        Arc::new(engine.clone()),
        Arc::new(transport.clone()),
        Arc::new(backend.clone()),
    );

    let task = tokio::spawn(session.run());

    CallHarness {
        handle,
        task,
        engine,
        transport,
        sent_rx,
        backend,
        log,
    }
}
