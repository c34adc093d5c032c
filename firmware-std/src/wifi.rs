//! WiFi station: scan, associate, and POST readings.
//!
//! Association is started non-blocking so the core's selector decides how
//! long to wait. The same radio carries the direct WAN transport.

use std::time::Duration;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{EspError, ESP_ERR_HTTP_EAGAIN, ESP_ERR_TIMEOUT};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use tapnode::credentials::SsidString;
use tapnode::selector::{ScanEntry, ScanResults, Security, WifiStation};
use tapnode::transport::{WanError, WanLink};

pub struct WifiRadio {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl WifiRadio {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;
        log::info!("WiFi station started");
        Ok(Self { wifi })
    }
}

fn wan_error(e: EspError) -> WanError {
    let code = e.code();
    if code == ESP_ERR_TIMEOUT as i32 || code == ESP_ERR_HTTP_EAGAIN as i32 {
        WanError::Timeout
    } else {
        WanError::Transport(code)
    }
}

impl WifiStation for WifiRadio {
    fn scan(&mut self, out: &mut ScanResults) {
        out.clear();
        let mut found = match self.wifi.scan() {
            Ok(found) => found,
            Err(e) => {
                log::warn!("WiFi scan failed: {:?}", e);
                return;
            }
        };
        found.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));

        for ap in found {
            let mut ssid = SsidString::new();
            if ssid.push_str(ap.ssid.as_str()).is_err() {
                continue;
            }
            let security = match ap.auth_method {
                None | Some(AuthMethod::None) => Security::Open,
                Some(_) => Security::Secured,
            };
            let entry = ScanEntry {
                ssid,
                rssi: ap.signal_strength,
                channel: ap.channel,
                security,
            };
            if out.push(entry).is_err() {
                break;
            }
        }
    }

    fn begin(&mut self, ssid: &str, secret: &str) -> bool {
        let (Ok(ssid_cfg), Ok(password)) = (ssid.try_into(), secret.try_into()) else {
            log::warn!("SSID or secret too long for driver");
            return false;
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid_cfg,
            password,
            auth_method: if secret.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        if let Err(e) = self.wifi.set_configuration(&config) {
            log::warn!("WiFi configuration failed: {:?}", e);
            return false;
        }
        // Non-blocking; the selector polls is_connected()
        match self.wifi.wifi_mut().connect() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("WiFi connect to '{}' failed: {:?}", ssid, e);
                false
            }
        }
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.wifi_mut().disconnect() {
            log::debug!("WiFi disconnect: {:?}", e);
        }
    }
}

impl WanLink for WifiRadio {
    fn is_associated(&mut self) -> bool {
        self.is_connected()
    }

    fn post_json(&mut self, url: &str, body: &[u8], timeout_ms: u32) -> Result<u16, WanError> {
        let mut conn = EspHttpConnection::new(&HttpConfig {
            timeout: Some(Duration::from_millis(timeout_ms as u64)),
            ..Default::default()
        })
        .map_err(wan_error)?;

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];
        conn.initiate_request(Method::Post, url, &headers).map_err(wan_error)?;
        conn.write_all(body).map_err(|e| wan_error(e.0))?;
        conn.initiate_response().map_err(wan_error)?;

        let status = conn.status();
        log::info!("WiFi POST returned {}", status);
        Ok(status)
    }
}
