//! MAC-derived MQTT topic names.
//!
//! ```text
//! /v1/device/{mac}/ping/{down,up}
//! /v1/device/{mac}/exec/{down,up}
//! /v1/device/{mac}/file/{down,up}
//! /v2/device/{mac}/paircode/{down,up}
//! ```
//!
//! `{mac}` is the 12-digit lowercase hex MAC. Inbound routing is by exact
//! string match on the `down` topics.

use crate::adapters::device_id::{MacAddress, topic_mac};

/// The four device channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    Exec,
    File,
    PairCode,
}

impl Route {
    pub const ALL: [Route; 4] = [Route::Ping, Route::Exec, Route::File, Route::PairCode];

    fn template(self) -> (&'static str, &'static str) {
        match self {
            Self::Ping => ("v1", "ping"),
            Self::Exec => ("v1", "exec"),
            Self::File => ("v1", "file"),
            Self::PairCode => ("v2", "paircode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TopicPair {
    down: String,
    up: String,
}

/// Resolved topic names for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pairs: [TopicPair; 4],
}

impl Topics {
    pub fn for_mac(mac: &MacAddress) -> Self {
        let mac = topic_mac(mac);
        let pairs = Route::ALL.map(|route| {
            let (version, name) = route.template();
            TopicPair {
                down: format!("/{version}/device/{mac}/{name}/down"),
                up: format!("/{version}/device/{mac}/{name}/up"),
            }
        });
        Self { pairs }
    }

    fn pair(&self, route: Route) -> &TopicPair {
        &self.pairs[route as usize]
    }

    /// Inbound topic for `route`.
    pub fn down(&self, route: Route) -> &str {
        &self.pair(route).down
    }

    /// Outbound topic paired with `route`.
    pub fn up(&self, route: Route) -> &str {
        &self.pair(route).up
    }

    /// Exact-match lookup of an inbound topic.
    pub fn route(&self, topic: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|r| self.down(*r) == topic)
    }

    /// Topics the session subscribes to.
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.down.as_str())
    }
}
