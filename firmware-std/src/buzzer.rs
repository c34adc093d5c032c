//! Buzzer driver using ESP-IDF LEDC PWM.
//!
//! Drives a passive buzzer from a dedicated thread. Cues arrive over an
//! mpsc channel and are played as the beep pattern the core defines.

use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, CHANNEL0, TIMER0};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::{ledc_mode_t_LEDC_LOW_SPEED_MODE, ledc_set_freq, ledc_timer_t_LEDC_TIMER_0};

use tapnode::board;
use tapnode::feedback::{Cue, Feedback};

/// Feedback sink that hands cues to the buzzer thread without blocking.
pub struct BuzzerFeedback {
    tx: SyncSender<Cue>,
}

impl BuzzerFeedback {
    pub fn new(tx: SyncSender<Cue>) -> Self {
        Self { tx }
    }
}

impl Feedback for BuzzerFeedback {
    fn cue(&mut self, cue: Cue) {
        if self.tx.try_send(cue).is_err() {
            log::debug!("Buzzer busy, dropped {:?}", cue);
        }
    }
}

pub fn buzzer_thread(
    cue_rx: mpsc::Receiver<Cue>,
    timer: impl Peripheral<P = TIMER0> + 'static,
    channel: impl Peripheral<P = CHANNEL0> + 'static,
    pin: impl Peripheral<P = impl OutputPin> + 'static,
) {
    let timer_config = TimerConfig::new()
        .frequency(Hertz(board::BUZZER_FREQ_HZ))
        .resolution(Resolution::Bits8);

    let timer_driver = match LedcTimerDriver::new(timer, &timer_config) {
        Ok(t) => t,
        Err(e) => {
            log::error!("LEDC timer init failed: {:?}", e);
            return;
        }
    };

    let mut channel_driver = match LedcDriver::new(channel, &timer_driver, pin) {
        Ok(c) => c,
        Err(e) => {
            log::error!("LEDC channel init failed: {:?}", e);
            return;
        }
    };

    let max_duty = channel_driver.get_max_duty();
    log::info!("Buzzer ready on GPIO{}", board::BUZZER_PIN);

    while let Ok(cue) = cue_rx.recv() {
        for beep in cue.pattern() {
            // SAFETY: timer 0 is owned by `timer_driver` for this thread's lifetime
            unsafe {
                ledc_set_freq(ledc_mode_t_LEDC_LOW_SPEED_MODE, ledc_timer_t_LEDC_TIMER_0, beep.freq_hz);
            }
            channel_driver.set_duty(max_duty / 2).ok();
            thread::sleep(Duration::from_millis(beep.on_ms as u64));
            channel_driver.set_duty(0).ok();
            thread::sleep(Duration::from_millis(beep.off_ms as u64));
        }
    }
}
