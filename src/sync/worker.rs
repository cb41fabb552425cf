//! Sync worker: owns the MQTT session lifecycle.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │ loop                                                     │
//!  │   connect_cycle()   Standby → Connecting → Connected     │
//!  │     ├ time sync (bounded retries)  ✗ → TimeSyncError     │
//!  │     ├ derive password (per attempt)                      │
//!  │     ├ connect + 4 subscriptions    ✗ → ConnectError      │
//!  │   session_loop()    (edge-executor + async-io-mini)      │
//!  │     ├ inbound message → dispatcher → acks → [restart]    │
//!  │     ├ liveness timer  → ping/up report                   │
//!  │     └ disconnect      → Disconnected → Standby           │
//!  │   fixed backoff                                          │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport callback only queues [`InboundEvent`]s; all handler logic
//! runs here, on one thread, so handlers never block the MQTT client.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use futures_lite::future;
use log::{info, warn};

use super::auth;
use super::channels::{InboundChannel, InboundEvent};
use super::dispatcher::{DispatchOutcome, Dispatcher, HandlerPorts};
use super::ota;
use super::packet::{LivenessReport, to_payload};
use super::session::{self, SessionStatus};
use super::topics::Route;
use super::transfer::ReadScheduler;
use crate::adapters::device_id::{self, MacAddress};
use crate::app::events::SyncEvent;
use crate::app::ports::{
    ClockPort, Credentials, EventSink, ExecPort, FilePort, MqttPort, StoragePort, SystemPort,
};
use crate::config::{CredentialSecret, SyncConfig};

/// Borrowed collaborators the worker hands to handlers and reports to.
pub struct WorkerPorts<'a> {
    pub settings: &'a mut dyn StoragePort,
    pub exec: &'a mut dyn ExecPort,
    pub reads: &'a dyn ReadScheduler,
    pub events: &'a mut dyn EventSink,
}

enum Wake {
    Inbound(InboundEvent),
    Liveness,
}

pub struct SyncWorker<'a, M, C, S, F: FilePort> {
    config: SyncConfig,
    secret: CredentialSecret,
    mac: MacAddress,
    mqtt: Arc<M>,
    clock: C,
    system: S,
    dispatcher: Dispatcher<F>,
    ports: WorkerPorts<'a>,
}

impl<'a, M, C, S, F> SyncWorker<'a, M, C, S, F>
where
    M: MqttPort,
    C: ClockPort,
    S: SystemPort,
    F: FilePort,
{
    pub fn new(
        config: SyncConfig,
        mac: MacAddress,
        mqtt: Arc<M>,
        clock: C,
        system: S,
        dispatcher: Dispatcher<F>,
        ports: WorkerPorts<'a>,
    ) -> Self {
        Self {
            config,
            secret: CredentialSecret::builtin(),
            mac,
            mqtt,
            clock,
            system,
            dispatcher,
            ports,
        }
    }

    pub fn with_secret(mut self, secret: CredentialSecret) -> Self {
        self.secret = secret;
        self
    }

    pub fn status(&self) -> SessionStatus {
        session::lock(self.dispatcher.session()).status()
    }

    pub fn dispatcher(&self) -> &Dispatcher<F> {
        &self.dispatcher
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    fn set_status(&mut self, to: SessionStatus) {
        let event = session::lock(self.dispatcher.session()).transition(to);
        if let Some(event) = event {
            self.ports.events.emit(&event);
        }
    }

    /// Fail the current attempt through `error` back to `Standby`.
    fn fail(&mut self, error: SessionStatus) -> bool {
        self.set_status(error);
        self.set_status(SessionStatus::Standby);
        false
    }

    // ── Connect ───────────────────────────────────────────────

    /// One connection attempt from `Standby`. Returns `true` once the
    /// session is `Connected` with every topic subscribed.
    pub fn connect_cycle(&mut self) -> bool {
        self.set_status(SessionStatus::Connecting);

        let Some(now) = self.wait_for_time() else {
            warn!("sync: time sync gave up after {} attempts", self.config.time_sync_retries);
            return self.fail(SessionStatus::TimeSyncError);
        };

        let client_id = device_id::client_id(&self.mac);
        let password = match auth::derive_password(&client_id, now, &self.secret) {
            Ok(p) => p,
            Err(e) => {
                warn!("sync: cannot derive credentials: {e}");
                return self.fail(SessionStatus::ConnectError);
            }
        };
        let host = ota::server_override(&*self.ports.settings);
        let credentials = Credentials {
            url: self.config.broker_url(host.as_deref()),
            client_id: client_id.as_str().to_owned(),
            username: client_id.as_str().to_owned(),
            password,
        };

        if let Err(e) = self.mqtt.connect(&credentials) {
            warn!("sync: connect to {} failed: {e}", credentials.url);
            return self.fail(SessionStatus::ConnectError);
        }

        let subscribed = self
            .dispatcher
            .topics()
            .subscriptions()
            .try_for_each(|topic| self.mqtt.subscribe(topic));
        if let Err(e) = subscribed {
            warn!("sync: subscribe failed: {e}");
            self.mqtt.disconnect();
            return self.fail(SessionStatus::ConnectError);
        }

        self.set_status(SessionStatus::Connected);
        info!("sync: session up as {}", credentials.client_id);
        true
    }

    fn wait_for_time(&mut self) -> Option<u64> {
        for attempt in 1..=self.config.time_sync_retries {
            if self.clock.sync_time() {
                if let Some(now) = self.clock.unix_time() {
                    return Some(now);
                }
            }
            info!("sync: waiting for time ({attempt}/{})", self.config.time_sync_retries);
            self.system.delay_ms(self.config.time_sync_wait_ms);
        }
        None
    }

    // ── Session ───────────────────────────────────────────────

    /// Apply one transport event. Returns `false` once the session is over.
    pub fn handle_inbound(&mut self, event: InboundEvent) -> bool {
        match event {
            InboundEvent::Message { topic, payload } => {
                let mut handler_ports = HandlerPorts {
                    settings: &mut *self.ports.settings,
                    exec: &mut *self.ports.exec,
                    reads: self.ports.reads,
                };
                let outcome = self.dispatcher.dispatch(&topic, &payload, &mut handler_ports);
                self.apply(outcome);
                true
            }
            InboundEvent::Disconnected => {
                if self.status() == SessionStatus::Connected {
                    warn!("sync: broker connection lost");
                    self.set_status(SessionStatus::Disconnected);
                    self.set_status(SessionStatus::Standby);
                }
                false
            }
        }
    }

    fn apply(&mut self, outcome: DispatchOutcome) {
        for msg in &outcome.outbound {
            if let Err(e) = self.mqtt.publish(&msg.topic, &msg.payload) {
                warn!("sync: publish on {} failed: {e}", msg.topic);
            }
        }
        for event in &outcome.events {
            self.ports.events.emit(event);
        }
        if outcome.restart {
            self.system.restart();
        }
    }

    /// Publish the unsolicited liveness report on `ping/up`.
    pub fn report_liveness(&mut self) {
        let free_heap = self.system.free_heap();
        let report = LivenessReport::online(free_heap, self.config.board_type, &self.config.board_name);
        let topic = self.dispatcher.topics().up(Route::Ping);
        match self.mqtt.publish(topic, &to_payload(&report)) {
            Ok(()) => self.ports.events.emit(&SyncEvent::LivenessReported { free_heap }),
            Err(e) => warn!("sync: liveness publish failed: {e}"),
        }
    }

    /// Drain queued events without waiting. Returns `false` if the session
    /// ended while draining.
    pub fn pump(&mut self, inbound: &InboundChannel) -> bool {
        while let Ok(event) = inbound.try_receive() {
            if !self.handle_inbound(event) {
                return false;
            }
        }
        true
    }

    /// Serve the connected session until the transport drops it.
    pub async fn session_loop(&mut self, inbound: &InboundChannel) {
        let interval = Duration::from_secs(u64::from(self.config.ping_interval_secs));
        self.report_liveness();
        let mut next_report = Instant::now() + interval;

        loop {
            let remaining = next_report.saturating_duration_since(Instant::now());
            let wake = future::or(async { Wake::Inbound(inbound.receive().await) }, async {
                async_io_mini::Timer::after(remaining).await;
                Wake::Liveness
            })
            .await;

            match wake {
                Wake::Inbound(event) => {
                    if !self.handle_inbound(event) {
                        break;
                    }
                }
                Wake::Liveness => {
                    self.report_liveness();
                    next_report = Instant::now() + interval;
                }
            }
        }
        self.mqtt.disconnect();
    }

    /// Connect, serve, back off, forever.
    pub fn run(&mut self, inbound: &InboundChannel) -> ! {
        let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
        info!("sync: worker started");

        loop {
            if self.connect_cycle() {
                future::block_on(executor.run(self.session_loop(inbound)));
            }
            self.system.delay_ms(self.config.reconnect_backoff_ms);
        }
    }
}
