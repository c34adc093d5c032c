/// Transport orchestration: relay, then direct WAN, then cellular.
///
/// Tiers are tried strictly in order and the first success wins. The two
/// wide-area tiers run with the short-range radio suspended. A reading that
/// no tier accepts is dropped; there is no retry queue.
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::feedback::{Cue, Feedback};
use crate::gps::GpsFix;
use crate::modem::{AtPort, Modem, ModemError};
use crate::protocol::{encode_payload, Identity, Reading};
use crate::radio::{RadioGuard, ShortRangeRadio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WanError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error {0}")]
    Transport(i32),
    #[error("malformed response")]
    Status,
}

/// The node's own wide-area association (WiFi station).
pub trait WanLink {
    fn is_associated(&mut self) -> bool;
    /// POST `body` as `application/json`; returns the HTTP status.
    fn post_json(&mut self, url: &str, body: &[u8], timeout_ms: u32) -> Result<u16, WanError>;
}

/// The cellular fallback path.
pub trait CellularLink {
    /// Bring the data path up if needed, then POST `body`.
    fn post_json<C: Clock>(&mut self, url: &str, body: &[u8], clock: &C) -> Result<u16, ModemError>;
    /// Current fix, if the modem is already running. Never powers it on.
    fn location<C: Clock>(&mut self, clock: &C) -> Option<GpsFix>;
}

impl<P: AtPort> CellularLink for Modem<P> {
    fn post_json<C: Clock>(&mut self, url: &str, body: &[u8], clock: &C) -> Result<u16, ModemError> {
        self.ensure_data_bearer(clock)?;
        self.http_post(url, body, clock)
    }

    fn location<C: Clock>(&mut self, clock: &C) -> Option<GpsFix> {
        self.poll_gps(clock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Relay,
    DirectWan,
    Cellular,
    None,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Relay => "relay",
            Transport::DirectWan => "wifi",
            Transport::Cellular => "cellular",
            Transport::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub transport_used: Transport,
    pub succeeded: bool,
}

impl DeliveryOutcome {
    const FAILED: Self = Self {
        transport_used: Transport::None,
        succeeded: false,
    };

    fn via(transport: Transport) -> Self {
        Self {
            transport_used: transport,
            succeeded: true,
        }
    }
}

/// Borrowed radios available to one delivery
pub struct Links<'a, R, W, M> {
    pub radio: &'a mut R,
    pub wan: &'a mut W,
    pub cellular: &'a mut M,
}

/// Collector acceptance: 200 OK or 201 Created.
pub fn is_accepted(status: u16) -> bool {
    status == 200 || status == 201
}

/// Deliver one reading. Emits `Cue::Delivered` or `Cue::Failed`.
pub fn deliver<R, W, M, F, C>(
    reading: &Reading,
    identity: &Identity,
    config: &NodeConfig,
    links: Links<'_, R, W, M>,
    feedback: &mut F,
    clock: &C,
) -> DeliveryOutcome
where
    R: ShortRangeRadio,
    W: WanLink,
    M: CellularLink,
    F: Feedback,
    C: Clock,
{
    let outcome = match encode_payload(reading, identity) {
        Some(payload) => attempt_all(&payload, config, links, clock),
        None => {
            log::error!("Reading does not fit the payload buffer");
            DeliveryOutcome::FAILED
        }
    };

    if outcome.succeeded {
        log::info!("Delivered {} reading via {}", reading.reason.as_str(), outcome.transport_used.as_str());
        feedback.cue(Cue::Delivered);
    } else {
        log::error!("All transports failed, dropping {} reading", reading.reason.as_str());
        feedback.cue(Cue::Failed);
    }
    outcome
}

fn attempt_all<R, W, M, C>(payload: &[u8], config: &NodeConfig, links: Links<'_, R, W, M>, clock: &C) -> DeliveryOutcome
where
    R: ShortRangeRadio,
    W: WanLink,
    M: CellularLink,
    C: Clock,
{
    let Links { radio, wan, cellular } = links;

    if radio.relay_attached() {
        if radio.notify_relay(payload) {
            return DeliveryOutcome::via(Transport::Relay);
        }
        log::warn!("Relay notification failed");
    } else {
        log::debug!("No relay attached");
    }

    let _guard = RadioGuard::suspend(radio);

    if wan.is_associated() {
        match wan.post_json(config.endpoint_url, payload, config.post_timeout_ms) {
            Ok(status) if is_accepted(status) => return DeliveryOutcome::via(Transport::DirectWan),
            Ok(status) => log::warn!("WiFi POST rejected with status {}", status),
            Err(e) => log::warn!("WiFi POST failed: {}", e),
        }
    } else {
        log::debug!("WiFi not associated");
    }

    match cellular.post_json(config.endpoint_url, payload, clock) {
        Ok(status) if is_accepted(status) => DeliveryOutcome::via(Transport::Cellular),
        Ok(status) => {
            log::warn!("Cellular POST rejected with status {}", status);
            DeliveryOutcome::FAILED
        }
        Err(e) => {
            log::warn!("Cellular delivery failed: {}", e);
            DeliveryOutcome::FAILED
        }
    }
}
