/// Reading model and the JSON wire payload posted to the collector.
///
/// The same payload is handed to the relay companion and POSTed over
/// direct WAN or the cellular modem.
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::Vec;
use serde::Serialize;

use crate::gps::GpsFix;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized reading payload
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Buffer type for serialized payloads
pub type PayloadBuffer = Vec<u8, MAX_PAYLOAD_LEN>;

/// What triggered a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Single,
    Double,
    Triple,
    Touch,
    Scheduled,
}

impl Reason {
    /// Tag sent in the payload's `function` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Single => "single_tap",
            Reason::Double => "double_tap",
            Reason::Triple => "triple_tap",
            Reason::Touch => "touch",
            Reason::Scheduled => "scheduled",
        }
    }

    /// Reading reason for a tap sequence. Longer sequences are gestures,
    /// not readings.
    pub fn from_tap_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(Reason::Single),
            2 => Some(Reason::Double),
            3 => Some(Reason::Triple),
            _ => None,
        }
    }
}

/// One sensor reading on its way to the collector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Soil moisture, percent
    pub moisture: f32,
    pub reason: Reason,
    pub gps: Option<GpsFix>,
}

/// Who is reporting
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub device_id: &'a str,
    pub api_key: &'a str,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    temperature: f32,
    moisture: f32,
    #[serde(rename = "deviceId")]
    device_id: &'a str,
    function: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(rename = "apiKey")]
    api_key: &'a str,
}

fn round1(value: f32) -> f32 {
    let scaled = value * 10.0;
    let rounded = if scaled >= 0.0 { scaled + 0.5 } else { scaled - 0.5 };
    (rounded as i32) as f32 / 10.0
}

fn round6(value: f64) -> f64 {
    let scaled = value * 1_000_000.0;
    let rounded = if scaled >= 0.0 { scaled + 0.5 } else { scaled - 0.5 };
    (rounded as i64) as f64 / 1_000_000.0
}

/// Serialize a reading into `buf`. Returns the number of bytes written,
/// or None if serialization failed.
pub fn serialize_payload(reading: &Reading, identity: &Identity, buf: &mut [u8]) -> Option<usize> {
    let payload = WirePayload {
        temperature: round1(reading.temperature),
        moisture: round1(reading.moisture),
        device_id: identity.device_id,
        function: reading.reason.as_str(),
        latitude: reading.gps.map(|fix| round6(fix.latitude)),
        longitude: reading.gps.map(|fix| round6(fix.longitude)),
        api_key: identity.api_key,
    };
    serde_json_core::to_slice(&payload, buf).ok()
}

/// Serialize a reading into an owned payload buffer.
pub fn encode_payload(reading: &Reading, identity: &Identity) -> Option<PayloadBuffer> {
    let mut buf = PayloadBuffer::new();
    buf.resize_default(MAX_PAYLOAD_LEN).ok();
    let len = serialize_payload(reading, identity, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}
