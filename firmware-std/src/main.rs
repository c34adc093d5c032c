//! TapNode ESP-IDF std firmware
//!
//! One cooperative loop on the main thread owns the [`Node`]: it drains BLE
//! events, samples the button and touch inputs every 10 ms and lets the core
//! do the rest. Only the buzzer runs on its own thread.

mod ble;
mod buzzer;
mod modem_uart;
mod sensors;
mod storage;
mod wifi;

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver, Pull};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use tapnode::clock::Clock;
use tapnode::config::NodeConfig;
use tapnode::feedback::Cue;
use tapnode::modem::Modem;
use tapnode::node::{Hardware, Node, NodeEvent};
use tapnode::protocol::VERSION;
use tapnode::board;

const BUTTON_POLL_MS: u64 = 10;

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

const DEFAULTS: NodeConfig = NodeConfig::new();

const CONFIG: NodeConfig = NodeConfig {
    endpoint_url: env_or(option_env!("TAPNODE_ENDPOINT_URL"), DEFAULTS.endpoint_url),
    api_key: env_or(option_env!("TAPNODE_API_KEY"), DEFAULTS.api_key),
    device_id: env_or(option_env!("TAPNODE_DEVICE_ID"), DEFAULTS.device_id),
    fallback_ssid: env_or(option_env!("TAPNODE_FALLBACK_SSID"), DEFAULTS.fallback_ssid),
    fallback_secret: env_or(option_env!("TAPNODE_FALLBACK_SECRET"), DEFAULTS.fallback_secret),
    apn: env_or(option_env!("TAPNODE_APN"), DEFAULTS.apn),
    ..DEFAULTS
};

/// Monotonic milliseconds since boot; sleeping blocks the loop.
struct EspClock {
    boot: Instant,
}

impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let clock = EspClock { boot: Instant::now() };
    log::info!("TapNode v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // The GPIOs taken below must agree with the core's board map
    #[cfg(feature = "xiao")]
    const _: () = assert!(
        board::HAS_MODEM
            && board::BUTTON_PIN == 1
            && board::TOUCH_PIN == 4
            && board::BUZZER_PIN == 3
            && board::TEMP_ADC_PIN == 2
            && board::MOISTURE_ADC_PIN == 9
            && board::MODEM_TX_PIN == 43
            && board::MODEM_RX_PIN == 44
            && board::MODEM_PWRKEY_PIN == 7
    );
    #[cfg(all(feature = "devkit", not(feature = "xiao")))]
    const _: () = assert!(
        board::HAS_MODEM
            && board::BUTTON_PIN == 0
            && board::TOUCH_PIN == 4
            && board::BUZZER_PIN == 25
            && board::TEMP_ADC_PIN == 34
            && board::MOISTURE_ADC_PIN == 35
            && board::MODEM_TX_PIN == 27
            && board::MODEM_RX_PIN == 26
            && board::MODEM_PWRKEY_PIN == 23
    );

    #[cfg(feature = "xiao")]
    let (button_pin, touch_pin, buzzer_pin, temp_pin, moisture_pin, modem_tx, modem_rx, pwrkey_pin) = (
        AnyIOPin::from(pins.gpio1),
        AnyIOPin::from(pins.gpio4),
        pins.gpio3,
        pins.gpio2,
        pins.gpio9,
        pins.gpio43,
        pins.gpio44,
        AnyOutputPin::from(pins.gpio7),
    );
    #[cfg(all(feature = "devkit", not(feature = "xiao")))]
    let (button_pin, touch_pin, buzzer_pin, temp_pin, moisture_pin, modem_tx, modem_rx, pwrkey_pin) = (
        AnyIOPin::from(pins.gpio0),
        AnyIOPin::from(pins.gpio4),
        pins.gpio25,
        pins.gpio34,
        pins.gpio35,
        pins.gpio27,
        pins.gpio26,
        AnyOutputPin::from(pins.gpio23),
    );

    // ── Channels ─────────────────────────────────────────────────────

    let (event_tx, event_rx) = mpsc::sync_channel::<NodeEvent>(8);
    let (cue_tx, cue_rx) = mpsc::sync_channel::<Cue>(4);

    // ── Buzzer thread ────────────────────────────────────────────────

    {
        let ledc_timer = peripherals.ledc.timer0;
        let ledc_channel = peripherals.ledc.channel0;
        thread::Builder::new()
            .name("buzzer".into())
            .stack_size(2048)
            .spawn(move || {
                buzzer::buzzer_thread(cue_rx, ledc_timer, ledc_channel, buzzer_pin);
            })?;
        log::info!("Buzzer thread spawned");
    }

    // ── Inputs ───────────────────────────────────────────────────────

    let mut button = PinDriver::input(button_pin)?;
    button.set_pull(Pull::Up)?;
    let touch = PinDriver::input(touch_pin)?;

    // ── Radios, storage, sensors ─────────────────────────────────────

    let storage = storage::NvsStore::new(nvs.clone())?;
    let wifi = wifi::WifiRadio::new(peripherals.modem, sys_loop, nvs)?;
    let radio = ble::BleRadio::start(event_tx)?;

    let uart_config = UartConfig::default().baudrate(Hertz(board::MODEM_BAUD));
    let uart = UartDriver::new(
        peripherals.uart1,
        modem_tx,
        modem_rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let port = modem_uart::UartAtPort::new(uart, PinDriver::output(pwrkey_pin)?);
    let modem = Modem::new(port, &CONFIG);

    let sensors = sensors::AdcSensors::new(peripherals.adc1, temp_pin, moisture_pin)?;

    // ── Node loop ────────────────────────────────────────────────────

    let mut node = Node::new(
        CONFIG,
        Hardware {
            storage,
            wifi,
            radio,
            cellular: modem,
            sensor: sensors,
            feedback: buzzer::BuzzerFeedback::new(cue_tx),
        },
    );
    node.boot(&clock);

    let mut was_touched = false;
    loop {
        while let Ok(event) = event_rx.try_recv() {
            node.handle_event(event, &clock);
        }

        let touched = touch.is_high();
        if touched && !was_touched {
            node.handle_event(NodeEvent::Touch, &clock);
        }
        was_touched = touched;

        // Active-low button
        node.poll(button.is_low(), &clock);
        thread::sleep(Duration::from_millis(BUTTON_POLL_MS));
    }
}
