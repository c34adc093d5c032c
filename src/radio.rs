/// Short-range radio seam and the radio arbiter.
///
/// The short-range (BLE) and wide-area (WiFi/cellular) radios share an
/// antenna and RF front end. While a wide-area transfer runs the BLE side is
/// held suspended by a [`RadioGuard`]; dropping the guard resumes it, so
/// every exit path of the transfer restores advertising.
use crate::comm::Endpoint;

/// The BLE side of the node, as seen from the core.
pub trait ShortRangeRadio {
    /// True while a relay companion is connected and subscribed.
    fn relay_attached(&self) -> bool;
    /// Hand a payload to the relay. Returns `false` if it could not be sent.
    fn notify_relay(&mut self, payload: &[u8]) -> bool;
    /// Update a read/notify endpoint.
    fn publish(&mut self, endpoint: Endpoint, value: &[u8]);
    /// Stop advertising and drop connections.
    fn suspend(&mut self);
    /// Restart advertising.
    fn resume(&mut self);
}

/// Holds the short-range radio suspended for its lifetime.
pub struct RadioGuard<'a, R: ShortRangeRadio> {
    radio: &'a mut R,
}

impl<'a, R: ShortRangeRadio> RadioGuard<'a, R> {
    pub fn suspend(radio: &'a mut R) -> Self {
        log::debug!("Suspending short-range radio");
        radio.suspend();
        Self { radio }
    }
}

impl<R: ShortRangeRadio> Drop for RadioGuard<'_, R> {
    fn drop(&mut self) {
        log::debug!("Resuming short-range radio");
        self.radio.resume();
    }
}

#[cfg(test)]
pub mod mock {
    use std::string::String;
    use std::vec::Vec;

    use super::ShortRangeRadio;
    use crate::comm::Endpoint;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RadioCall {
        Suspend,
        Resume,
        Relay(String),
        Publish(Endpoint, String),
    }

    #[derive(Default)]
    pub struct RecordingRadio {
        pub attached: bool,
        /// Relay notifications fail when set
        pub relay_broken: bool,
        pub calls: Vec<RadioCall>,
    }

    impl RecordingRadio {
        pub fn count(&self, call: &RadioCall) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }

        /// Last value published to `endpoint`
        pub fn published(&self, endpoint: Endpoint) -> Option<&str> {
            self.calls.iter().rev().find_map(|c| match c {
                RadioCall::Publish(e, v) if *e == endpoint => Some(v.as_str()),
                _ => None,
            })
        }
    }

    impl ShortRangeRadio for RecordingRadio {
        fn relay_attached(&self) -> bool {
            self.attached
        }

        fn notify_relay(&mut self, payload: &[u8]) -> bool {
            if self.relay_broken {
                return false;
            }
            self.calls
                .push(RadioCall::Relay(String::from_utf8_lossy(payload).into_owned()));
            true
        }

        fn publish(&mut self, endpoint: Endpoint, value: &[u8]) {
            self.calls.push(RadioCall::Publish(
                endpoint,
                String::from_utf8_lossy(value).into_owned(),
            ));
        }

        fn suspend(&mut self) {
            self.calls.push(RadioCall::Suspend);
        }

        fn resume(&mut self) {
            self.calls.push(RadioCall::Resume);
        }
    }
}
