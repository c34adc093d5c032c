/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BUTTON_PIN: u8 = 1; // active-low, internal pull-up
    pub const TOUCH_PIN: u8 = 4;
    pub const BUZZER_PIN: u8 = 3;
    pub const TEMP_ADC_PIN: u8 = 2;
    pub const MOISTURE_ADC_PIN: u8 = 9;
    pub const MODEM_TX_PIN: u8 = 43;
    pub const MODEM_RX_PIN: u8 = 44;
    pub const MODEM_PWRKEY_PIN: u8 = 7;
    pub const HAS_MODEM: bool = true;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(all(feature = "board-devkit", not(feature = "board-xiao")))]
mod hw {
    pub const BUTTON_PIN: u8 = 0; // BOOT button
    pub const TOUCH_PIN: u8 = 4;
    pub const BUZZER_PIN: u8 = 25;
    pub const TEMP_ADC_PIN: u8 = 34;
    pub const MOISTURE_ADC_PIN: u8 = 35;
    pub const MODEM_TX_PIN: u8 = 27;
    pub const MODEM_RX_PIN: u8 = 26;
    pub const MODEM_PWRKEY_PIN: u8 = 23;
    pub const HAS_MODEM: bool = true;
    pub const BOARD_NAME: &str = "esp32_devkit";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-devkit")))]
mod hw {
    pub const HAS_MODEM: bool = false;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Frequency of the passive buzzer tone
pub const BUZZER_FREQ_HZ: u32 = 2700;

/// Modem UART baud rate
pub const MODEM_BAUD: u32 = 115200;
