/// Node context and the event handling of the main loop.
///
/// [`Node`] owns every component the loop touches: the tap detector, the
/// credential store, the radios, the sensors and the feedback sink. Radio
/// callbacks never act directly; the firmware turns them into [`NodeEvent`]s
/// which are handled here one at a time.
use crate::clock::Clock;
use crate::comm::{serialize_scan_results, status_text, Endpoint, WifiCommand, MAX_SCAN_JSON_LEN};
use crate::config::NodeConfig;
use crate::credentials::{CredentialStore, KeyValueStore, SsidString};
use crate::feedback::{Cue, Feedback};
use crate::protocol::{Identity, Reading, Reason};
use crate::radio::ShortRangeRadio;
use crate::selector::{connect_best, ConnectionAttemptResult, ScanResults, WifiStation};
use crate::sensor::SensorSource;
use crate::tap::{TapDetector, TapEvent};
use crate::transport::{deliver, CellularLink, DeliveryOutcome, Links, WanLink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Tap(TapEvent),
    Touch,
    ScheduleDue,
    RelayAttached,
    RelayDetached,
    ScanRequested,
    Wifi(WifiCommand),
}

/// Hardware collaborators handed to [`Node::new`]
pub struct Hardware<S, W, R, M, T, F> {
    pub storage: S,
    pub wifi: W,
    pub radio: R,
    pub cellular: M,
    pub sensor: T,
    pub feedback: F,
}

pub struct Node<S, W, R, M, T, F>
where
    S: KeyValueStore,
{
    config: NodeConfig,
    tap: TapDetector,
    credentials: CredentialStore<S>,
    wifi: W,
    radio: R,
    cellular: M,
    sensor: T,
    feedback: F,
    scan: ScanResults,
    connected_ssid: SsidString,
    next_scheduled_ms: Option<u64>,
}

impl<S, W, R, M, T, F> Node<S, W, R, M, T, F>
where
    S: KeyValueStore,
    W: WifiStation + WanLink,
    R: ShortRangeRadio,
    M: CellularLink,
    T: SensorSource,
    F: Feedback,
{
    /// Loads saved credentials from `hw.storage`.
    pub fn new(config: NodeConfig, hw: Hardware<S, W, R, M, T, F>) -> Self {
        Self {
            tap: TapDetector::from_config(&config),
            credentials: CredentialStore::load(hw.storage),
            config,
            wifi: hw.wifi,
            radio: hw.radio,
            cellular: hw.cellular,
            sensor: hw.sensor,
            feedback: hw.feedback,
            scan: ScanResults::new(),
            connected_ssid: SsidString::new(),
            next_scheduled_ms: None,
        }
    }

    pub fn credentials(&self) -> &CredentialStore<S> {
        &self.credentials
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn cellular(&self) -> &M {
        &self.cellular
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    /// SSID of the current association, empty if none
    pub fn connected_ssid(&self) -> &str {
        &self.connected_ssid
    }

    /// Startup: boot cue, one connection attempt, arm the schedule.
    pub fn boot<C: Clock>(&mut self, clock: &C) {
        log::info!(
            "{} v{} on {}, {} saved network(s)",
            crate::NAME,
            crate::protocol::VERSION,
            crate::board::BOARD_NAME,
            self.credentials.len()
        );
        self.feedback.cue(Cue::Boot);
        self.publish_text(Endpoint::Status, "booting");
        self.connect_wifi(clock);
        self.arm_schedule(clock.now_ms());
    }

    /// One loop iteration: feed the button sample, fire the schedule.
    pub fn poll<C: Clock>(&mut self, button_pressed: bool, clock: &C) {
        let now = clock.now_ms();
        if let Some(event) = self.tap.update(button_pressed, now) {
            self.handle_event(NodeEvent::Tap(event), clock);
        }

        if self.config.scheduled_interval_ms == 0 {
            return;
        }
        match self.next_scheduled_ms {
            None => self.arm_schedule(now),
            Some(due) if now >= due => self.handle_event(NodeEvent::ScheduleDue, clock),
            Some(_) => {}
        }
    }

    pub fn handle_event<C: Clock>(&mut self, event: NodeEvent, clock: &C) {
        match event {
            NodeEvent::Tap(tap) => {
                log::info!("Tap sequence: {} press(es)", tap.count);
                self.feedback.cue(Cue::Taps(tap.count));
                self.publish_text(Endpoint::Button, status_text(format_args!("{}", tap.count)).as_str());
                match Reason::from_tap_count(tap.count) {
                    Some(reason) => {
                        self.take_reading(reason, clock);
                    }
                    None => {
                        log::info!("Reconnect gesture");
                        self.connect_wifi(clock);
                    }
                }
            }
            NodeEvent::Touch => {
                self.take_reading(Reason::Touch, clock);
            }
            NodeEvent::ScheduleDue => {
                self.arm_schedule(clock.now_ms());
                self.take_reading(Reason::Scheduled, clock);
            }
            NodeEvent::RelayAttached => {
                log::info!("Relay companion attached");
                self.publish_text(Endpoint::Status, "relay attached");
            }
            NodeEvent::RelayDetached => {
                log::info!("Relay companion detached");
                self.publish_text(Endpoint::Status, "relay detached");
            }
            NodeEvent::ScanRequested => self.publish_scan(),
            NodeEvent::Wifi(WifiCommand::Save { ssid, secret }) => {
                match self.credentials.save(&ssid, &secret) {
                    Ok(()) => {
                        let text = status_text(format_args!("Saved: {}", ssid));
                        self.publish_text(Endpoint::WifiStatus, &text);
                        self.connect_wifi(clock);
                    }
                    Err(e) => {
                        log::error!("Saving '{}' failed: {}", ssid, e);
                        self.publish_text(Endpoint::WifiStatus, "Save failed");
                    }
                }
            }
            NodeEvent::Wifi(WifiCommand::Forget { ssid }) => {
                let text = match self.credentials.forget(&ssid) {
                    Ok(()) => status_text(format_args!("Forgot: {}", ssid)),
                    Err(e) => {
                        log::error!("Forgetting '{}' failed: {}", ssid, e);
                        status_text(format_args!("Forget failed"))
                    }
                };
                self.publish_text(Endpoint::WifiStatus, &text);
            }
        }
    }

    /// Scan and associate with the best candidate. Joining a different
    /// network than before posts one "network changed" notification.
    pub fn connect_wifi<C: Clock>(&mut self, clock: &C) -> ConnectionAttemptResult {
        self.wifi.scan(&mut self.scan);
        log::info!("Scan found {} network(s)", self.scan.len());

        let result = connect_best(&mut self.wifi, &self.scan, &self.credentials, &self.config, clock);
        match result.tier {
            Some(tier) if result.succeeded => {
                let text = status_text(format_args!("Connected: {} ({})", result.ssid_used, tier.as_str()));
                self.publish_text(Endpoint::WifiStatus, &text);
                if self.connected_ssid != result.ssid_used {
                    self.connected_ssid = result.ssid_used.clone();
                    self.publish_text(Endpoint::Status, "network changed");
                    self.feedback.cue(Cue::NetworkChanged);
                } else {
                    log::info!("Rejoined '{}'", result.ssid_used);
                }
            }
            _ => {
                self.connected_ssid.clear();
                self.publish_text(Endpoint::WifiStatus, "Not connected");
            }
        }
        result
    }

    /// Sample, deliver, then publish the results.
    pub fn take_reading<C: Clock>(&mut self, reason: Reason, clock: &C) -> DeliveryOutcome {
        let sample = self.sensor.sample();
        let reading = Reading {
            temperature: sample.temperature,
            moisture: sample.moisture,
            reason,
            gps: self.cellular.location(clock),
        };
        let identity = Identity {
            device_id: self.config.device_id,
            api_key: self.config.api_key,
        };

        let links = Links {
            radio: &mut self.radio,
            wan: &mut self.wifi,
            cellular: &mut self.cellular,
        };
        let outcome = deliver(&reading, &identity, &self.config, links, &mut self.feedback, clock);

        let status = if outcome.succeeded {
            status_text(format_args!("{}: sent via {}", reason.as_str(), outcome.transport_used.as_str()))
        } else {
            status_text(format_args!("{}: delivery failed", reason.as_str()))
        };
        self.publish_text(Endpoint::Status, &status);
        self.publish_text(Endpoint::Sensor, &sample.summary());
        let gps = match reading.gps {
            Some(fix) => status_text(format_args!("GPS: {:.6},{:.6}", fix.latitude, fix.longitude)),
            None => status_text(format_args!("GPS: no fix")),
        };
        self.publish_text(Endpoint::Gps, &gps);
        outcome
    }

    fn publish_scan(&mut self) {
        self.wifi.scan(&mut self.scan);
        let mut buf = [0u8; MAX_SCAN_JSON_LEN];
        match serialize_scan_results(&self.scan, &mut buf) {
            Some(len) => self.radio.publish(Endpoint::WifiScan, &buf[..len]),
            None => log::error!("Scan results did not serialize"),
        }
    }

    fn publish_text(&mut self, endpoint: Endpoint, text: &str) {
        self.radio.publish(endpoint, text.as_bytes());
    }

    fn arm_schedule(&mut self, now_ms: u64) {
        let interval = self.config.scheduled_interval_ms;
        self.next_scheduled_ms = (interval > 0).then(|| now_ms + interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::MockClock;
    use crate::credentials::memory::MemoryStore;
    use crate::feedback::mock::RecordingFeedback;
    use crate::gps::GpsFix;
    use crate::radio::mock::{RadioCall, RecordingRadio};
    use crate::selector::mock::{entry, FakeStation};
    use crate::selector::Security;
    use crate::sensor::mock::FixedSensor;
    use crate::sensor::SensorSample;
    use crate::transport::mock::FakeCellular;
    use crate::transport::Transport;

    type TestNode = Node<MemoryStore, FakeStation, RecordingRadio, FakeCellular, FixedSensor, RecordingFeedback>;

    const SAMPLE: SensorSample = SensorSample {
        temperature: 22.0,
        moisture: 35.5,
    };

    fn node_with(wifi: FakeStation, cellular: FakeCellular) -> TestNode {
        Node::new(
            NodeConfig::new(),
            Hardware {
                storage: MemoryStore::default(),
                wifi,
                radio: RecordingRadio::default(),
                cellular,
                sensor: FixedSensor(SAMPLE),
                feedback: RecordingFeedback::default(),
            },
        )
    }

    /// Sample the button every 10 ms with the given (down, up) presses.
    fn press(node: &mut TestNode, clock: &MockClock, presses: &[(u64, u64)], end_ms: u64) {
        while clock.now_ms() < end_ms {
            let t = clock.now_ms();
            let down = presses.iter().any(|&(d, u)| t >= d && t < u);
            node.poll(down, clock);
            clock.advance(10);
        }
    }

    fn posted_json(node: &TestNode) -> std::string::String {
        std::string::String::from_utf8(node.wifi().posts[0].1.clone()).unwrap()
    }

    #[test]
    fn double_tap_delivers_reading() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::connected_to("Home", &[Ok(201)]), FakeCellular::default());

        press(&mut node, &clock, &[(0, 80), (230, 310)], 1_000);

        assert_eq!(node.wifi().posts.len(), 1);
        assert!(posted_json(&node).contains("\"function\":\"double_tap\""));
        assert_eq!(node.feedback().cues, [Cue::Taps(2), Cue::Delivered]);
        assert_eq!(node.radio().published(Endpoint::Button), Some("2"));
        assert_eq!(node.radio().published(Endpoint::Status), Some("double_tap: sent via wifi"));
        assert_eq!(node.radio().published(Endpoint::Sensor), Some("T:22.0C M:35.5%"));
        assert_eq!(node.radio().published(Endpoint::Gps), Some("GPS: no fix"));
    }

    #[test]
    fn quadruple_tap_reconnects_without_reading() {
        let clock = MockClock::new();
        let mut wifi = FakeStation::new(std::vec![entry("Cafe", -50, Security::Open)], &["Cafe"]);
        wifi.wan_replies = std::vec![Ok(200)];
        let mut node = node_with(wifi, FakeCellular::answering(Ok(200)));

        press(&mut node, &clock, &[(0, 80), (200, 280), (400, 480), (600, 680)], 1_200);

        assert!(node.wifi().posts.is_empty());
        assert!(node.cellular().posts.is_empty());
        assert_eq!(node.wifi().attempted(), ["Cafe"]);
        assert_eq!(node.connected_ssid(), "Cafe");
        assert_eq!(node.feedback().cues, [Cue::Taps(4), Cue::NetworkChanged]);
    }

    #[test]
    fn touch_reading_falls_back_to_cellular_with_gps() {
        let clock = MockClock::new();
        let cellular = FakeCellular {
            reply: Some(Ok(201)),
            fix: Some(GpsFix {
                latitude: 51.5,
                longitude: -0.125,
            }),
            ..Default::default()
        };
        let mut node = node_with(FakeStation::default(), cellular);

        node.handle_event(NodeEvent::Touch, &clock);

        let body = std::string::String::from_utf8(node.cellular().posts[0].clone()).unwrap();
        assert!(body.contains("\"function\":\"touch\""));
        assert!(body.contains("\"latitude\":51.5"));
        assert_eq!(node.radio().published(Endpoint::Gps), Some("GPS: 51.500000,-0.125000"));
        assert_eq!(node.radio().count(&RadioCall::Suspend), 1);
        assert_eq!(node.radio().count(&RadioCall::Resume), 1);
    }

    #[test]
    fn failed_delivery_reports_status() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::default(), FakeCellular::default());

        let outcome = node.take_reading(Reason::Single, &clock);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.transport_used, Transport::None);
        assert_eq!(node.feedback().cues, [Cue::Failed]);
        assert_eq!(node.radio().published(Endpoint::Status), Some("single_tap: delivery failed"));
    }

    #[test]
    fn relay_attached_companion_gets_reading() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::connected_to("Home", &[Ok(200)]), FakeCellular::default());
        node.radio.attached = true;

        node.handle_event(NodeEvent::RelayAttached, &clock);
        let outcome = node.take_reading(Reason::Triple, &clock);

        assert_eq!(outcome.transport_used, Transport::Relay);
        assert!(node.wifi().posts.is_empty());
        assert!(node
            .radio()
            .calls
            .iter()
            .any(|c| matches!(c, RadioCall::Relay(json) if json.contains("triple_tap"))));
    }

    #[test]
    fn boot_connects_and_notifies_once() {
        let clock = MockClock::new();
        let wifi = FakeStation::new(
            std::vec![
                entry("Home", -40, Security::Secured),
                entry("Cafe", -60, Security::Open),
            ],
            &["Cafe"],
        );
        let mut node = node_with(wifi, FakeCellular::default());
        node.credentials.save("Home", "pw").unwrap();

        node.boot(&clock);

        // Saved network failed first; still a single notification
        assert_eq!(node.wifi().attempted(), ["Home", "Cafe"]);
        assert_eq!(node.feedback().cues, [Cue::Boot, Cue::NetworkChanged]);
        let changed = node
            .radio()
            .calls
            .iter()
            .filter(|c| matches!(c, RadioCall::Publish(Endpoint::Status, s) if s == "network changed"))
            .count();
        assert_eq!(changed, 1);
        assert_eq!(node.radio().published(Endpoint::WifiStatus), Some("Connected: Cafe (open)"));
    }

    #[test]
    fn rejoining_same_network_does_not_notify() {
        let clock = MockClock::new();
        let wifi = FakeStation::new(std::vec![entry("Cafe", -50, Security::Open)], &["Cafe"]);
        let mut node = node_with(wifi, FakeCellular::default());

        assert!(node.connect_wifi(&clock).succeeded);
        assert!(node.connect_wifi(&clock).succeeded);

        assert_eq!(node.connected_ssid(), "Cafe");
        assert_eq!(node.feedback().cues, [Cue::NetworkChanged]);
        let changed = node
            .radio()
            .calls
            .iter()
            .filter(|c| matches!(c, RadioCall::Publish(Endpoint::Status, s) if s == "network changed"))
            .count();
        assert_eq!(changed, 1);
        assert_eq!(node.radio().published(Endpoint::WifiStatus), Some("Connected: Cafe (open)"));
    }

    #[test]
    fn failed_connection_reports_not_connected() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::default(), FakeCellular::default());

        let result = node.connect_wifi(&clock);
        assert!(!result.succeeded);
        assert!(node.feedback().cues.is_empty());
        assert_eq!(node.radio().published(Endpoint::WifiStatus), Some("Not connected"));
    }

    #[test]
    fn saved_credential_persists_and_connects() {
        let clock = MockClock::new();
        let wifi = FakeStation::new(std::vec![entry("Lab", -55, Security::Secured)], &["Lab"]);
        let mut node = node_with(wifi, FakeCellular::default());

        let cmd = crate::comm::parse_wifi_command(b"Lab:s3cret").unwrap();
        node.handle_event(NodeEvent::Wifi(cmd), &clock);

        assert_eq!(node.credentials().lookup_secret("Lab"), Some("s3cret"));
        assert_eq!(
            node.credentials().backend().values.get("pass0").map(|s| s.as_str()),
            Some("s3cret")
        );
        assert_eq!(node.wifi().attempts, [("Lab".to_string(), "s3cret".to_string())]);
        assert_eq!(node.connected_ssid(), "Lab");
    }

    #[test]
    fn forget_removes_credential() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::default(), FakeCellular::default());
        node.credentials.save("Home", "a").unwrap();
        node.credentials.save("Office", "b").unwrap();

        let cmd = crate::comm::parse_wifi_command(b"FORGET:Home").unwrap();
        node.handle_event(NodeEvent::Wifi(cmd), &clock);

        let ssids: std::vec::Vec<&str> = node.credentials().list().iter().map(|c| c.ssid.as_str()).collect();
        assert_eq!(ssids, ["Office"]);
        assert_eq!(node.radio().published(Endpoint::WifiStatus), Some("Forgot: Home"));
        assert!(node.wifi().attempts.is_empty());
    }

    #[test]
    fn scan_request_publishes_json() {
        let clock = MockClock::new();
        let wifi = FakeStation::new(std::vec![entry("Cafe", -61, Security::Open)], &[]);
        let mut node = node_with(wifi, FakeCellular::default());

        node.handle_event(NodeEvent::ScanRequested, &clock);

        assert_eq!(
            node.radio().published(Endpoint::WifiScan),
            Some(r#"[{"ssid":"Cafe","rssi":-61,"ch":6,"open":true}]"#)
        );
    }

    #[test]
    fn scheduled_reading_fires_each_interval() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::connected_to("Home", &[Ok(200)]), FakeCellular::default());
        node.config.scheduled_interval_ms = 1_000;

        for _ in 0..250 {
            node.poll(false, &clock);
            clock.advance(10);
        }

        assert_eq!(node.wifi().posts.len(), 2);
        assert!(posted_json(&node).contains("\"function\":\"scheduled\""));
    }

    #[test]
    fn zero_interval_disables_schedule() {
        let clock = MockClock::new();
        let mut node = node_with(FakeStation::connected_to("Home", &[Ok(200)]), FakeCellular::default());
        node.config.scheduled_interval_ms = 0;

        for _ in 0..100 {
            node.poll(false, &clock);
            clock.advance(100);
        }
        assert!(node.wifi().posts.is_empty());
    }
}
