/// WiFi network selection.
///
/// Given a fresh scan and the saved credentials, candidates are tried in a
/// strict order: the first scanned network we have credentials for, then the
/// first open network, then the compiled-in fallback network. Each candidate
/// gets one association attempt bounded by the configured poll budget.
use heapless::Vec;

use crate::clock::{poll_until, Clock};
use crate::config::NodeConfig;
use crate::credentials::{CredentialStore, KeyValueStore, SsidString};

/// Maximum number of networks kept from one scan
pub const MAX_SCAN_RESULTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
    Secured,
}

/// One access point from a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: SsidString,
    pub rssi: i8,
    pub channel: u8,
    pub security: Security,
}

pub type ScanResults = Vec<ScanEntry, MAX_SCAN_RESULTS>;

/// Which priority tier produced the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    Saved,
    Open,
    Fallback,
}

impl SelectionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionTier::Saved => "saved",
            SelectionTier::Open => "open",
            SelectionTier::Fallback => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttemptResult {
    pub succeeded: bool,
    /// Empty when nothing connected
    pub ssid_used: SsidString,
    pub tier: Option<SelectionTier>,
}

impl ConnectionAttemptResult {
    fn failed() -> Self {
        Self {
            succeeded: false,
            ssid_used: SsidString::new(),
            tier: None,
        }
    }
}

/// Station-mode WiFi radio.
pub trait WifiStation {
    /// Scan visible networks into `out`, strongest first where the driver
    /// provides ordering.
    fn scan(&mut self, out: &mut ScanResults);
    /// Start associating. An empty secret means an open network.
    /// Returns `false` if the request could not be issued at all.
    fn begin(&mut self, ssid: &str, secret: &str) -> bool;
    fn is_connected(&mut self) -> bool;
    fn disconnect(&mut self);
}

/// A network worth one association attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub ssid: &'a str,
    pub secret: &'a str,
    pub tier: SelectionTier,
}

/// Build the ordered candidate list. A network already listed by a higher
/// tier is not retried by a lower one.
pub fn plan<'a, S: KeyValueStore>(
    scan: &'a [ScanEntry],
    store: &'a CredentialStore<S>,
    config: &NodeConfig,
) -> Vec<Candidate<'a>, 3> {
    let mut candidates: Vec<Candidate<'a>, 3> = Vec::new();

    let saved = scan.iter().find_map(|entry| {
        store
            .lookup_secret(&entry.ssid)
            .map(|secret| (entry.ssid.as_str(), secret))
    });
    if let Some((ssid, secret)) = saved {
        let _ = candidates.push(Candidate {
            ssid,
            secret,
            tier: SelectionTier::Saved,
        });
    }

    let open = scan.iter().find(|entry| {
        entry.security == Security::Open
            && !entry.ssid.is_empty()
            && !candidates.iter().any(|c| c.ssid == entry.ssid.as_str())
    });
    if let Some(entry) = open {
        let _ = candidates.push(Candidate {
            ssid: &entry.ssid,
            secret: "",
            tier: SelectionTier::Open,
        });
    }

    if !config.fallback_ssid.is_empty()
        && !candidates.iter().any(|c| c.ssid == config.fallback_ssid)
    {
        let _ = candidates.push(Candidate {
            ssid: config.fallback_ssid,
            secret: config.fallback_secret,
            tier: SelectionTier::Fallback,
        });
    }

    candidates
}

/// Walk the candidate list until one associates.
pub fn connect_best<W, S, C>(
    station: &mut W,
    scan: &[ScanEntry],
    store: &CredentialStore<S>,
    config: &NodeConfig,
    clock: &C,
) -> ConnectionAttemptResult
where
    W: WifiStation,
    S: KeyValueStore,
    C: Clock,
{
    let candidates = plan(scan, store, config);
    if candidates.is_empty() {
        log::warn!("No usable network: nothing saved, open or configured");
        return ConnectionAttemptResult::failed();
    }

    for candidate in &candidates {
        log::info!(
            "Trying {} network '{}'",
            candidate.tier.as_str(),
            candidate.ssid
        );

        if !station.begin(candidate.ssid, candidate.secret) {
            log::warn!("Could not start association with '{}'", candidate.ssid);
            continue;
        }

        let connected = poll_until(clock, config.connect_attempts, config.connect_poll_ms, || {
            station.is_connected()
        });

        if connected {
            log::info!("Connected to '{}'", candidate.ssid);
            let mut ssid_used = SsidString::new();
            let _ = ssid_used.push_str(candidate.ssid);
            return ConnectionAttemptResult {
                succeeded: true,
                ssid_used,
                tier: Some(candidate.tier),
            };
        }

        log::warn!("Association with '{}' timed out", candidate.ssid);
        station.disconnect();
    }

    ConnectionAttemptResult::failed()
}
