//! MQTT transport adapter.
//!
//! Implements [`MqttPort`] / [`Publisher`]. Inbound traffic never goes
//! through the port: the connection's event loop pushes every complete
//! message (and every disconnect) onto the inbound channel with
//! `try_send`, so a slow worker can never stall the MQTT client.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` over TLS. A poll thread
//!   drains the connection, reassembling fragmented messages, and
//!   reports the connect outcome back to the blocked `connect()` call.
//! - **all other targets**: an in-memory broker that records publishes
//!   and subscriptions and lets tests inject inbound messages.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::app::ports::{Credentials, MqttPort, Publisher, TransportError};
use crate::sync::channels::{InboundChannel, InboundEvent, push_inbound};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;
    use std::sync::mpsc;

    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration, QoS,
    };
    use log::debug;

    use super::*;

    /// How long `connect()` waits for the broker's CONNACK.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    pub struct EspMqtt {
        inbound: &'static InboundChannel,
        client: Mutex<Option<EspMqttClient<'static>>>,
    }

    impl EspMqtt {
        pub fn new(inbound: &'static InboundChannel) -> Self {
            Self {
                inbound,
                client: Mutex::new(None),
            }
        }
    }

    /// A message being received in fragments.
    struct Partial {
        topic: String,
        data: Vec<u8>,
        total: usize,
    }

    fn poll(mut conn: EspMqttConnection, inbound: &'static InboundChannel, connected: mpsc::SyncSender<bool>) {
        let mut partial: Option<Partial> = None;
        let mut reported = false;

        while let Ok(event) = conn.next() {
            match event.payload() {
                EventPayload::Connected(_) => {
                    if !reported {
                        let _ = connected.try_send(true);
                        reported = true;
                    }
                }
                EventPayload::Disconnected => {
                    if !reported {
                        let _ = connected.try_send(false);
                        reported = true;
                    }
                    partial = None;
                    push_inbound(inbound, InboundEvent::Disconnected);
                }
                EventPayload::Received { topic, data, details, .. } => match details {
                    Details::Complete => {
                        if let Some(topic) = topic {
                            push_inbound(
                                inbound,
                                InboundEvent::Message {
                                    topic: topic.to_owned(),
                                    payload: data.to_vec(),
                                },
                            );
                        }
                    }
                    Details::InitialChunk(first) => {
                        partial = topic.map(|t| {
                            let mut buf = Vec::with_capacity(first.total_data_size);
                            buf.extend_from_slice(data);
                            Partial {
                                topic: t.to_owned(),
                                data: buf,
                                total: first.total_data_size,
                            }
                        });
                    }
                    Details::SubsequentChunk(_) => {
                        let done = partial.as_mut().is_some_and(|p| {
                            p.data.extend_from_slice(data);
                            p.data.len() >= p.total
                        });
                        if done {
                            if let Some(p) = partial.take() {
                                push_inbound(
                                    inbound,
                                    InboundEvent::Message {
                                        topic: p.topic,
                                        payload: p.data,
                                    },
                                );
                            }
                        }
                    }
                },
                EventPayload::Error(e) => warn!("mqtt: {e:?}"),
                other => debug!("mqtt: {other:?}"),
            }
        }
        info!("mqtt: connection closed");
        if !reported {
            let _ = connected.try_send(false);
        }
    }

    impl Publisher for EspMqtt {
        fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            let mut guard = lock(&self.client);
            let client = guard.as_mut().ok_or(TransportError::NotConnected)?;
            client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("mqtt: publish {topic}: {e}");
                    TransportError::PublishFailed
                })
        }
    }

    impl MqttPort for EspMqtt {
        fn connect(&self, credentials: &Credentials) -> Result<(), TransportError> {
            self.disconnect();

            let conf = MqttClientConfiguration {
                client_id: Some(credentials.client_id.as_str()),
                username: Some(credentials.username.as_str()),
                password: Some(credentials.password.as_str()),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let (client, conn) = EspMqttClient::new(&credentials.url, &conf).map_err(|e| {
                warn!("mqtt: client create failed: {e}");
                TransportError::ConnectFailed
            })?;

            let (tx, rx) = mpsc::sync_channel(1);
            let inbound = self.inbound;
            std::thread::Builder::new()
                .name("mqtt-poll".into())
                .stack_size(6 * 1024)
                .spawn(move || poll(conn, inbound, tx))
                .map_err(|_| TransportError::ConnectFailed)?;

            *lock(&self.client) = Some(client);
            match rx.recv_timeout(CONNECT_TIMEOUT) {
                Ok(true) => {
                    info!("mqtt: connected to {}", credentials.url);
                    Ok(())
                }
                _ => {
                    self.disconnect();
                    Err(TransportError::ConnectFailed)
                }
            }
        }

        fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
            let mut guard = lock(&self.client);
            let client = guard.as_mut().ok_or(TransportError::NotConnected)?;
            client.subscribe(topic, QoS::AtLeastOnce).map(|_| ()).map_err(|e| {
                warn!("mqtt: subscribe {topic}: {e}");
                TransportError::SubscribeFailed
            })
        }

        fn disconnect(&self) {
            // dropping the client stops the connection and ends the poll thread
            if lock(&self.client).take().is_some() {
                info!("mqtt: client dropped");
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspMqtt;

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimState {
    connected: bool,
    refuse_connect: bool,
    last_credentials: Option<Credentials>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
}

/// In-memory broker standing in for the ESP-IDF client.
#[cfg(not(target_os = "espidf"))]
pub struct EspMqtt {
    inbound: &'static InboundChannel,
    state: Mutex<SimState>,
}

#[cfg(not(target_os = "espidf"))]
impl EspMqtt {
    pub fn new(inbound: &'static InboundChannel) -> Self {
        Self {
            inbound,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Make subsequent connect attempts fail.
    pub fn refuse_connect(&self, refuse: bool) {
        lock(&self.state).refuse_connect = refuse;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn last_credentials(&self) -> Option<Credentials> {
        lock(&self.state).last_credentials.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }

    /// Drain everything published so far.
    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        core::mem::take(&mut lock(&self.state).published)
    }

    /// Deliver a message as if the broker had sent it.
    pub fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        push_inbound(
            self.inbound,
            InboundEvent::Message {
                topic: topic.to_owned(),
                payload: payload.to_vec(),
            },
        )
    }

    /// Simulate the broker dropping the session.
    pub fn drop_connection(&self) {
        lock(&self.state).connected = false;
        push_inbound(self.inbound, InboundEvent::Disconnected);
    }
}

#[cfg(not(target_os = "espidf"))]
impl Publisher for EspMqtt {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttPort for EspMqtt {
    fn connect(&self, credentials: &Credentials) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.last_credentials = Some(credentials.clone());
        if state.refuse_connect {
            warn!("mqtt: connection refused (simulation)");
            return Err(TransportError::ConnectFailed);
        }
        state.connected = true;
        state.subscriptions.clear();
        info!("mqtt: connected to {} (simulation)", credentials.url);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn disconnect(&self) {
        lock(&self.state).connected = false;
    }
}
