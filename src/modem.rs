/// Cellular modem driver (SIM7000-class AT command set).
///
/// The session walks `Uninitialized → Initialized → NetworkAttached →
/// DataBearerUp`. Each step is a short exchange of AT commands over the
/// serial port, with every wait bounded by the injected [`Clock`]. A failed
/// step leaves the session where it was; nothing tears it down except a
/// reboot.
use core::fmt::Write as _;

use heapless::String;

use crate::clock::Clock;
use crate::comm::{LineReader, MAX_LINE_LEN};
use crate::config::NodeConfig;
use crate::gps::{parse_gnss_info, GpsFix, CGNSINF_PREFIX};

const PWRKEY_PULSE_MS: u32 = 1_000;
const BOOT_WAIT_MS: u32 = 3_000;
const AT_TIMEOUT_MS: u32 = 1_000;
const SIM_TIMEOUT_MS: u32 = 5_000;
const REG_POLL_MS: u32 = 1_000;
const BEARER_OPEN_TIMEOUT_MS: u32 = 30_000;
const HTTP_DATA_TIMEOUT_MS: u32 = 10_000;
const HTTP_ACTION_TIMEOUT_MS: u32 = 30_000;
/// Sleep between serial polls while waiting for a reply
const POLL_SLICE_MS: u32 = 10;

/// One outgoing AT command line, URL included
type CommandLine = String<320>;

/// One captured response line
pub type ResponseLine = String<MAX_LINE_LEN>;

/// Serial link to the modem plus its power key.
pub trait AtPort {
    fn write(&mut self, data: &[u8]);
    /// Next received byte, if any. Never blocks.
    fn read_byte(&mut self) -> Option<u8>;
    /// Drive the PWRKEY line; `true` holds the key down.
    fn set_power_key(&mut self, asserted: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModemSession {
    Uninitialized,
    Initialized,
    NetworkAttached,
    DataBearerUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModemError {
    #[error("modem did not answer in time")]
    Timeout,
    #[error("unexpected modem reply")]
    Unexpected,
    #[error("command line too long")]
    Overflow,
    #[error("modem not ready")]
    NotReady,
}

pub struct Modem<P: AtPort> {
    port: P,
    state: ModemSession,
    reader: LineReader,
    apn: &'static str,
    registration_timeout_ms: u32,
    last_fix: Option<GpsFix>,
}

fn is_error_line(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

fn capture(line: &str) -> ResponseLine {
    let mut out = ResponseLine::new();
    let _ = out.push_str(line);
    out
}

/// Second comma-separated field after `prefix`, e.g. the `<stat>` of
/// `+CREG: 0,1`.
fn second_field<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?
        .trim_start()
        .split(',')
        .nth(1)
        .map(str::trim)
}

/// `+HTTPACTION: <method>,<status>,<datalen>`
pub fn parse_http_action(line: &str) -> Option<u16> {
    second_field(line, "+HTTPACTION:")?.parse().ok()
}

impl<P: AtPort> Modem<P> {
    pub fn new(port: P, config: &NodeConfig) -> Self {
        Self {
            port,
            state: ModemSession::Uninitialized,
            reader: LineReader::new(),
            apn: config.apn,
            registration_timeout_ms: config.registration_timeout_ms,
            last_fix: None,
        }
    }

    pub fn state(&self) -> ModemSession {
        self.state
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Last fix from [`poll_gps`](Self::poll_gps)
    pub fn last_fix(&self) -> Option<GpsFix> {
        self.last_fix
    }

    /// Power on, handshake and enable GNSS. The handshake is retried once
    /// with a second power pulse.
    pub fn initialize<C: Clock>(&mut self, clock: &C) -> Result<(), ModemError> {
        if self.state != ModemSession::Uninitialized {
            return Ok(());
        }

        self.power_pulse(clock);
        if self.command("AT", AT_TIMEOUT_MS, clock).is_err() {
            log::warn!("Modem silent after power-on, retrying");
            self.power_pulse(clock);
            self.command("AT", AT_TIMEOUT_MS, clock).inspect_err(|e| {
                log::error!("Modem handshake failed: {}", e);
            })?;
        }

        self.command("ATE0", AT_TIMEOUT_MS, clock)?;
        if let Err(e) = self.command("AT+CGNSPWR=1", AT_TIMEOUT_MS, clock) {
            log::warn!("GNSS enable failed: {}", e);
        }

        self.state = ModemSession::Initialized;
        log::info!("Modem initialized");
        Ok(())
    }

    /// Check the SIM, then wait for network registration.
    pub fn attach_network<C: Clock>(&mut self, clock: &C) -> Result<(), ModemError> {
        match self.state {
            ModemSession::Uninitialized => return Err(ModemError::NotReady),
            ModemSession::Initialized => {}
            _ => return Ok(()),
        }

        let cpin = self.query("AT+CPIN?", "+CPIN:", SIM_TIMEOUT_MS, clock)?;
        if !cpin.contains("READY") {
            log::error!("SIM not ready: {}", cpin);
            return Err(ModemError::NotReady);
        }

        let deadline = clock.now_ms() + self.registration_timeout_ms as u64;
        loop {
            if let Ok(line) = self.query("AT+CREG?", "+CREG:", AT_TIMEOUT_MS, clock) {
                // 1 = home network, 5 = roaming
                if matches!(second_field(&line, "+CREG:"), Some("1") | Some("5")) {
                    break;
                }
            }
            if clock.now_ms() >= deadline {
                log::error!("Network registration timed out");
                return Err(ModemError::Timeout);
            }
            clock.sleep_ms(REG_POLL_MS);
        }

        self.state = ModemSession::NetworkAttached;
        log::info!("Modem registered on network");
        Ok(())
    }

    /// Configure and open the packet data bearer.
    pub fn open_bearer<C: Clock>(&mut self, clock: &C) -> Result<(), ModemError> {
        match self.state {
            ModemSession::DataBearerUp => return Ok(()),
            ModemSession::NetworkAttached => {}
            _ => return Err(ModemError::NotReady),
        }

        self.command("AT+SAPBR=3,1,\"Contype\",\"GPRS\"", AT_TIMEOUT_MS, clock)?;
        let mut apn = CommandLine::new();
        write!(apn, "AT+SAPBR=3,1,\"APN\",\"{}\"", self.apn).map_err(|_| ModemError::Overflow)?;
        self.command(&apn, AT_TIMEOUT_MS, clock)?;

        if !self.bearer_open(clock) {
            self.command("AT+SAPBR=1,1", BEARER_OPEN_TIMEOUT_MS, clock)?;
            if !self.bearer_open(clock) {
                log::error!("Bearer did not come up");
                return Err(ModemError::Unexpected);
            }
        }

        self.state = ModemSession::DataBearerUp;
        log::info!("Cellular data bearer up");
        Ok(())
    }

    /// Walk the session all the way to `DataBearerUp`.
    pub fn ensure_data_bearer<C: Clock>(&mut self, clock: &C) -> Result<(), ModemError> {
        self.initialize(clock)?;
        self.attach_network(clock)?;
        self.open_bearer(clock)
    }

    /// Query GNSS. Never powers the modem; no fix is not an error.
    pub fn poll_gps<C: Clock>(&mut self, clock: &C) -> Option<GpsFix> {
        if self.state == ModemSession::Uninitialized {
            return None;
        }
        self.last_fix = match self.query("AT+CGNSINF", CGNSINF_PREFIX, AT_TIMEOUT_MS, clock) {
            Ok(line) => parse_gnss_info(&line),
            Err(e) => {
                log::debug!("GNSS query failed: {}", e);
                None
            }
        };
        self.last_fix
    }

    /// POST `body` as JSON via the modem's HTTP stack and return the status
    /// code. The HTTP session is always terminated before returning.
    pub fn http_post<C: Clock>(&mut self, url: &str, body: &[u8], clock: &C) -> Result<u16, ModemError> {
        if self.state != ModemSession::DataBearerUp {
            return Err(ModemError::NotReady);
        }

        let result = self.http_exchange(url, body, clock);
        if let Err(e) = self.command("AT+HTTPTERM", AT_TIMEOUT_MS, clock) {
            log::warn!("HTTPTERM failed: {}", e);
        }
        if let Err(e) = &result {
            log::error!("Cellular POST failed: {}", e);
        }
        result
    }

    fn http_exchange<C: Clock>(&mut self, url: &str, body: &[u8], clock: &C) -> Result<u16, ModemError> {
        self.command("AT+HTTPINIT", AT_TIMEOUT_MS, clock)?;
        self.command("AT+HTTPPARA=\"CID\",1", AT_TIMEOUT_MS, clock)?;

        let mut line = CommandLine::new();
        write!(line, "AT+HTTPPARA=\"URL\",\"{}\"", url).map_err(|_| ModemError::Overflow)?;
        self.command(&line, AT_TIMEOUT_MS, clock)?;
        self.command("AT+HTTPPARA=\"CONTENT\",\"application/json\"", AT_TIMEOUT_MS, clock)?;

        line.clear();
        write!(line, "AT+HTTPDATA={},{}", body.len(), HTTP_DATA_TIMEOUT_MS).map_err(|_| ModemError::Overflow)?;
        self.command_expect(&line, "DOWNLOAD", AT_TIMEOUT_MS, clock)?;
        self.port.write(body);
        self.wait_for(HTTP_DATA_TIMEOUT_MS, clock, |line| match line {
            "OK" => Some(Ok(())),
            l if is_error_line(l) => Some(Err(ModemError::Unexpected)),
            _ => None,
        })?;

        self.command("AT+HTTPACTION=1", AT_TIMEOUT_MS, clock)?;
        let action = self.wait_for(HTTP_ACTION_TIMEOUT_MS, clock, |line| {
            if line.starts_with("+HTTPACTION:") {
                Some(Ok(capture(line)))
            } else if is_error_line(line) {
                Some(Err(ModemError::Unexpected))
            } else {
                None
            }
        })?;

        let status = parse_http_action(&action).ok_or(ModemError::Unexpected)?;
        log::info!("Cellular POST returned {}", status);
        Ok(status)
    }

    fn bearer_open<C: Clock>(&mut self, clock: &C) -> bool {
        // +SAPBR: <cid>,<status>,<ip>; status 1 = connected
        self.query("AT+SAPBR=2,1", "+SAPBR:", AT_TIMEOUT_MS, clock)
            .map(|line| second_field(&line, "+SAPBR:") == Some("1"))
            .unwrap_or(false)
    }

    fn power_pulse<C: Clock>(&mut self, clock: &C) {
        self.port.set_power_key(true);
        clock.sleep_ms(PWRKEY_PULSE_MS);
        self.port.set_power_key(false);
        clock.sleep_ms(BOOT_WAIT_MS);
    }

    fn send(&mut self, cmd: &str) -> Result<(), ModemError> {
        let mut line = CommandLine::new();
        line.push_str(cmd).map_err(|_| ModemError::Overflow)?;
        line.push('\r').map_err(|_| ModemError::Overflow)?;

        // Drop stale unsolicited output before a new exchange
        while self.port.read_byte().is_some() {}
        self.reader.clear();

        log::debug!("AT> {}", cmd);
        self.port.write(line.as_bytes());
        Ok(())
    }

    /// Send `cmd` and wait for `OK`.
    fn command<C: Clock>(&mut self, cmd: &str, timeout_ms: u32, clock: &C) -> Result<(), ModemError> {
        self.command_expect(cmd, "OK", timeout_ms, clock)
    }

    /// Send `cmd` and wait for a line equal to `token`.
    fn command_expect<C: Clock>(
        &mut self,
        cmd: &str,
        token: &str,
        timeout_ms: u32,
        clock: &C,
    ) -> Result<(), ModemError> {
        self.send(cmd)?;
        self.wait_for(timeout_ms, clock, |line| {
            if line == token {
                Some(Ok(()))
            } else if is_error_line(line) {
                Some(Err(ModemError::Unexpected))
            } else {
                None
            }
        })
        .inspect_err(|e| log::warn!("{} failed: {}", cmd, e))
    }

    /// Send `cmd`, capture the line starting with `prefix`, then wait for `OK`.
    fn query<C: Clock>(
        &mut self,
        cmd: &str,
        prefix: &str,
        timeout_ms: u32,
        clock: &C,
    ) -> Result<ResponseLine, ModemError> {
        self.send(cmd)?;
        let mut captured: Option<ResponseLine> = None;
        self.wait_for(timeout_ms, clock, |line| {
            if line.starts_with(prefix) {
                captured = Some(capture(line));
                None
            } else if line == "OK" {
                Some(captured.take().ok_or(ModemError::Unexpected))
            } else if is_error_line(line) {
                Some(Err(ModemError::Unexpected))
            } else {
                None
            }
        })
    }

    /// Read lines until `on_line` returns a result or the timeout passes.
    fn wait_for<C: Clock, T>(
        &mut self,
        timeout_ms: u32,
        clock: &C,
        mut on_line: impl FnMut(&str) -> Option<Result<T, ModemError>>,
    ) -> Result<T, ModemError> {
        let deadline = clock.now_ms() + timeout_ms as u64;
        loop {
            while let Some(byte) = self.port.read_byte() {
                let Some(line) = self.reader.feed(byte) else {
                    continue;
                };
                let Ok(line) = core::str::from_utf8(line) else {
                    continue;
                };
                log::debug!("AT< {}", line);
                if let Some(done) = on_line(line.trim()) {
                    return done;
                }
            }
            if clock.now_ms() >= deadline {
                return Err(ModemError::Timeout);
            }
            clock.sleep_ms(POLL_SLICE_MS);
        }
    }
}
