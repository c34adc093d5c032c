//! AT port for the cellular module: UART plus the PWRKEY line.

use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::hal::uart::UartDriver;
use tapnode::modem::AtPort;

pub struct UartAtPort {
    uart: UartDriver<'static>,
    pwrkey: PinDriver<'static, AnyOutputPin, Output>,
}

impl UartAtPort {
    pub fn new(uart: UartDriver<'static>, pwrkey: PinDriver<'static, AnyOutputPin, Output>) -> Self {
        Self { uart, pwrkey }
    }
}

impl AtPort for UartAtPort {
    fn write(&mut self, data: &[u8]) {
        if let Err(e) = self.uart.write(data) {
            log::warn!("Modem UART write failed: {:?}", e);
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte, NON_BLOCK) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn set_power_key(&mut self, asserted: bool) {
        // PWRKEY is driven through an NPN: high output pulls the key low
        let result = if asserted {
            self.pwrkey.set_high()
        } else {
            self.pwrkey.set_low()
        };
        if let Err(e) = result {
            log::warn!("PWRKEY drive failed: {:?}", e);
        }
    }
}
