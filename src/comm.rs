/// Communication layer: BLE GATT service surface and serial line framing.
///
/// The companion app talks to the node over one GATT service with a
/// characteristic per concern. Writes arrive as raw bytes and are parsed
/// here into commands for the node loop; outgoing values are short status
/// strings or JSON documents.
use core::fmt::Write as _;

use heapless::{String, Vec};
use serde::Serialize;

use crate::credentials::{SecretString, SsidString};
use crate::selector::{ScanEntry, Security};

/// BLE GATT service UUIDs.
///
/// Service, button and status UUIDs are shared with the companion app.
pub mod ble_uuids {
    /// Primary service UUID
    pub const SERVICE: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";
    /// Button state: read, notify
    pub const BUTTON_CHAR: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";
    /// Free-text device status: read, notify
    pub const STATUS_CHAR: &str = "1c95d5e3-d8f7-413a-bf3d-7a2e5d7be87e";
    /// WiFi scan: write "SCAN", notify JSON array
    pub const WIFI_SCAN_CHAR: &str = "1c95d5e4-d8f7-413a-bf3d-7a2e5d7be87e";
    /// WiFi credentials: write "SSID:secret" or "FORGET:SSID"
    pub const WIFI_CREDS_CHAR: &str = "1c95d5e5-d8f7-413a-bf3d-7a2e5d7be87e";
    /// WiFi status text: read, notify
    pub const WIFI_STATUS_CHAR: &str = "1c95d5e6-d8f7-413a-bf3d-7a2e5d7be87e";
    /// Sensor summary text: read, notify
    pub const SENSOR_CHAR: &str = "1c95d5e7-d8f7-413a-bf3d-7a2e5d7be87e";
    /// Relay payload JSON: notify
    pub const RELAY_CHAR: &str = "1c95d5e8-d8f7-413a-bf3d-7a2e5d7be87e";
    /// GPS / cellular status text: read, notify
    pub const GPS_CHAR: &str = "1c95d5e9-d8f7-413a-bf3d-7a2e5d7be87e";
}

/// BLE advertising name
pub const BLE_ADV_NAME: &str = "ESP32-Sensor";

/// Serial line buffer size (modem responses)
pub const MAX_LINE_LEN: usize = 256;

/// Maximum size of the scan result document
pub const MAX_SCAN_JSON_LEN: usize = 512;

/// Text endpoints the node publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Button,
    Status,
    WifiScan,
    WifiStatus,
    Sensor,
    Relay,
    Gps,
}

impl Endpoint {
    pub fn uuid(&self) -> &'static str {
        match self {
            Endpoint::Button => ble_uuids::BUTTON_CHAR,
            Endpoint::Status => ble_uuids::STATUS_CHAR,
            Endpoint::WifiScan => ble_uuids::WIFI_SCAN_CHAR,
            Endpoint::WifiStatus => ble_uuids::WIFI_STATUS_CHAR,
            Endpoint::Sensor => ble_uuids::SENSOR_CHAR,
            Endpoint::Relay => ble_uuids::RELAY_CHAR,
            Endpoint::Gps => ble_uuids::GPS_CHAR,
        }
    }
}

/// Short status string published to a text endpoint
pub type StatusText = String<64>;

struct Truncating<'a>(&'a mut StatusText);

impl core::fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Format a status string, truncating on overflow.
pub fn status_text(args: core::fmt::Arguments) -> StatusText {
    let mut s = StatusText::new();
    let _ = Truncating(&mut s).write_fmt(args);
    s
}

/// Commands written to the WiFi credentials characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiCommand {
    Save { ssid: SsidString, secret: SecretString },
    Forget { ssid: SsidString },
}

/// Parse `"SSID:secret"` or `"FORGET:SSID"`. The secret is everything after
/// the first `:` and may be empty (open network).
pub fn parse_wifi_command(data: &[u8]) -> Option<WifiCommand> {
    let text = core::str::from_utf8(trim_trailing_whitespace(data)).ok()?;
    let (head, tail) = text.split_once(':')?;

    if head == "FORGET" {
        if tail.is_empty() {
            return None;
        }
        return Some(WifiCommand::Forget {
            ssid: SsidString::try_from(tail).ok()?,
        });
    }

    if head.is_empty() {
        return None;
    }
    Some(WifiCommand::Save {
        ssid: SsidString::try_from(head).ok()?,
        secret: SecretString::try_from(tail).ok()?,
    })
}

/// True when a write to the scan characteristic asks for a scan.
pub fn is_scan_request(data: &[u8]) -> bool {
    trim_trailing_whitespace(data).eq_ignore_ascii_case(b"SCAN")
}

#[derive(Serialize)]
struct ScanItem<'a> {
    ssid: &'a str,
    rssi: i8,
    ch: u8,
    open: bool,
}

/// Serialize scan results as a JSON array. Entries that don't fit are
/// dropped from the end.
pub fn serialize_scan_results(entries: &[ScanEntry], buf: &mut [u8]) -> Option<usize> {
    let mut items: Vec<ScanItem, 16> = Vec::new();
    for entry in entries.iter().filter(|e| !e.ssid.is_empty()) {
        let _ = items.push(ScanItem {
            ssid: &entry.ssid,
            rssi: entry.rssi,
            ch: entry.channel,
            open: entry.security == Security::Open,
        });
    }

    while !items.is_empty() {
        if let Ok(len) = serde_json_core::to_slice(items.as_slice(), buf) {
            return Some(len);
        }
        items.pop();
    }
    serde_json_core::to_slice(items.as_slice(), buf).ok()
}

/// Serial line reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard and reset
            self.pos = 0;
            None
        }
    }

    /// Bytes received since the last line break.
    pub fn partial(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn clear(&mut self) {
        self.pos = 0;
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b' ' || data[end - 1] == b'\n' || data[end - 1] == b'\r' || data[end - 1] == b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::mock::entry;

    #[test]
    fn parses_save_command() {
        let cmd = parse_wifi_command(b"Home:hunter22\n").unwrap();
        assert_eq!(
            cmd,
            WifiCommand::Save {
                ssid: "Home".try_into().unwrap(),
                secret: "hunter22".try_into().unwrap(),
            }
        );
    }

    #[test]
    fn secret_may_contain_colons() {
        let Some(WifiCommand::Save { ssid, secret }) = parse_wifi_command(b"Lab:a:b:c") else {
            panic!("expected save");
        };
        assert_eq!(ssid, "Lab");
        assert_eq!(secret, "a:b:c");
    }

    #[test]
    fn open_network_has_empty_secret() {
        let Some(WifiCommand::Save { secret, .. }) = parse_wifi_command(b"Cafe:") else {
            panic!("expected save");
        };
        assert!(secret.is_empty());
    }

    #[test]
    fn parses_forget_command() {
        assert_eq!(
            parse_wifi_command(b"FORGET:Home"),
            Some(WifiCommand::Forget {
                ssid: "Home".try_into().unwrap()
            })
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_wifi_command(b"no separator"), None);
        assert_eq!(parse_wifi_command(b":secret"), None);
        assert_eq!(parse_wifi_command(b"FORGET:"), None);
        assert_eq!(parse_wifi_command(&[0xff, b':', b'x']), None);
    }

    #[test]
    fn scan_request_is_case_insensitive() {
        assert!(is_scan_request(b"SCAN"));
        assert!(is_scan_request(b"scan\r\n"));
        assert!(!is_scan_request(b"SCANX"));
    }

    #[test]
    fn scan_results_json_array() {
        let entries = [
            entry("Home", -48, Security::Secured),
            entry("", -80, Security::Open),
            entry("Cafe", -71, Security::Open),
        ];
        let mut buf = [0u8; MAX_SCAN_JSON_LEN];
        let len = serialize_scan_results(&entries, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(
            json,
            r#"[{"ssid":"Home","rssi":-48,"ch":6,"open":false},{"ssid":"Cafe","rssi":-71,"ch":6,"open":true}]"#
        );
    }

    #[test]
    fn scan_results_truncate_to_fit() {
        let entries = [
            entry("Home", -48, Security::Secured),
            entry("Cafe", -71, Security::Open),
        ];
        let mut buf = [0u8; 60];
        let len = serialize_scan_results(&entries, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains("Home"));
        assert!(!json.contains("Cafe"));
    }

    #[test]
    fn line_reader_splits_on_crlf() {
        let mut reader = LineReader::new();
        let mut lines = std::vec::Vec::new();
        for &b in b"\r\nOK\r\n+CREG: 0,1\r\n" {
            if let Some(line) = reader.feed(b) {
                lines.push(std::string::String::from_utf8(line.to_vec()).unwrap());
            }
        }
        assert_eq!(lines, ["OK", "+CREG: 0,1"]);
        assert!(reader.partial().is_empty());
    }

    #[test]
    fn status_text_truncates() {
        let long = "x".repeat(100);
        let s = status_text(format_args!("WiFi: {}", long));
        assert!(s.len() <= 64);
        assert!(s.starts_with("WiFi: x"));
    }
}
