//! NimBLE GATT service: companion app surface and relay transport.
//!
//! Characteristic writes and connection changes are parsed in NimBLE's
//! callback context and forwarded to the main loop as [`NodeEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use esp32_nimble::utilities::mutex::Mutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{BLEAdvertisementData, BLECharacteristic, BLEDevice, NimbleProperties};

use tapnode::comm::{self, ble_uuids, Endpoint};
use tapnode::node::NodeEvent;
use tapnode::radio::ShortRangeRadio;

/// Set while the radio arbiter holds BLE off
static SUSPENDED: AtomicBool = AtomicBool::new(false);

type Characteristic = Arc<Mutex<BLECharacteristic>>;

pub struct BleRadio {
    endpoints: Vec<(Endpoint, Characteristic)>,
}

fn uuid(s: &str) -> anyhow::Result<BleUuid> {
    BleUuid::from_uuid128_string(s).map_err(|e| anyhow::anyhow!("invalid UUID {}: {:?}", s, e))
}

fn start_advertising() {
    if let Err(e) = BLEDevice::take().get_advertising().lock().start() {
        log::warn!("BLE advertising start failed: {:?}", e);
    }
}

impl BleRadio {
    pub fn start(events: SyncSender<NodeEvent>) -> anyhow::Result<Self> {
        let ble_device = BLEDevice::take();
        let server = ble_device.get_server();

        // Advertising restarts are ours to make so suspend can hold it off
        server.advertise_on_disconnect(false);

        let tx = events.clone();
        server.on_connect(move |_server, desc| {
            log::info!("BLE client connected: {}", desc.address());
            let _ = tx.try_send(NodeEvent::RelayAttached);
        });
        let tx = events.clone();
        server.on_disconnect(move |desc, _reason| {
            log::info!("BLE client disconnected: {}", desc.address());
            let _ = tx.try_send(NodeEvent::RelayDetached);
            if !SUSPENDED.load(Ordering::Relaxed) {
                start_advertising();
            }
        });

        let service_uuid = uuid(ble_uuids::SERVICE)?;
        let service = server.create_service(service_uuid);
        let read_notify = NimbleProperties::READ | NimbleProperties::NOTIFY;

        let mut endpoints = Vec::new();
        for endpoint in [
            Endpoint::Button,
            Endpoint::Status,
            Endpoint::WifiStatus,
            Endpoint::Sensor,
            Endpoint::Gps,
        ] {
            let chr = service.lock().create_characteristic(uuid(endpoint.uuid())?, read_notify);
            endpoints.push((endpoint, chr));
        }

        let relay = service
            .lock()
            .create_characteristic(uuid(Endpoint::Relay.uuid())?, NimbleProperties::NOTIFY);
        endpoints.push((Endpoint::Relay, relay));

        let scan = service.lock().create_characteristic(
            uuid(Endpoint::WifiScan.uuid())?,
            NimbleProperties::WRITE | NimbleProperties::NOTIFY,
        );
        let tx = events.clone();
        scan.lock().on_write(move |args| {
            if comm::is_scan_request(args.recv_data()) {
                let _ = tx.try_send(NodeEvent::ScanRequested);
            }
        });
        endpoints.push((Endpoint::WifiScan, scan));

        let creds = service
            .lock()
            .create_characteristic(uuid(ble_uuids::WIFI_CREDS_CHAR)?, NimbleProperties::WRITE);
        let tx = events;
        creds.lock().on_write(move |args| match comm::parse_wifi_command(args.recv_data()) {
            Some(cmd) => {
                let _ = tx.try_send(NodeEvent::Wifi(cmd));
            }
            None => log::warn!("Ignoring malformed credential write"),
        });

        let mut adv_data = BLEAdvertisementData::new();
        adv_data.name(comm::BLE_ADV_NAME).add_service_uuid(service_uuid);
        ble_device
            .get_advertising()
            .lock()
            .set_data(&mut adv_data)
            .map_err(|e| anyhow::anyhow!("BLE advertising data failed: {:?}", e))?;
        start_advertising();
        log::info!("BLE advertising as '{}'", comm::BLE_ADV_NAME);

        Ok(Self { endpoints })
    }

    fn characteristic(&self, endpoint: Endpoint) -> Option<&Characteristic> {
        self.endpoints.iter().find(|(e, _)| *e == endpoint).map(|(_, c)| c)
    }
}

impl ShortRangeRadio for BleRadio {
    fn relay_attached(&self) -> bool {
        !SUSPENDED.load(Ordering::Relaxed) && BLEDevice::take().get_server().connected_count() > 0
    }

    fn notify_relay(&mut self, payload: &[u8]) -> bool {
        if !self.relay_attached() {
            return false;
        }
        match self.characteristic(Endpoint::Relay) {
            Some(chr) => {
                chr.lock().set_value(payload).notify();
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, endpoint: Endpoint, value: &[u8]) {
        if let Some(chr) = self.characteristic(endpoint) {
            chr.lock().set_value(value).notify();
        }
    }

    fn suspend(&mut self) {
        SUSPENDED.store(true, Ordering::Relaxed);
        let ble_device = BLEDevice::take();
        if let Err(e) = ble_device.get_advertising().lock().stop() {
            log::warn!("BLE advertising stop failed: {:?}", e);
        }
        let server = ble_device.get_server();
        let handles: Vec<u16> = server.connections().map(|c| c.conn_handle()).collect();
        for handle in handles {
            if let Err(e) = server.disconnect(handle) {
                log::warn!("BLE disconnect failed: {:?}", e);
            }
        }
    }

    fn resume(&mut self) {
        SUSPENDED.store(false, Ordering::Relaxed);
        start_advertising();
    }
}
