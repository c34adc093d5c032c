/// Persistent store of learned WiFi credentials.
///
/// Holds at most [`MAX_CREDENTIALS`] entries as an insertion-ordered list
/// mirrored into a key-value backend as `ssid{i}` / `pass{i}`. Saving a
/// known SSID rewrites its secret in place. Saving a new SSID into a full
/// store evicts the oldest entry (slot 0), shifts every other entry one slot
/// left and appends the new one at the end.
use core::fmt::Write;

use heapless::{String, Vec};

/// Number of credential slots
pub const MAX_CREDENTIALS: usize = 5;

/// Maximum SSID length (802.11 limit)
pub type SsidString = String<32>;

/// Maximum WPA passphrase length
pub type SecretString = String<64>;

/// Storage key such as "ssid3" or "pass0"
type SlotKey = String<8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage read failed")]
    Read,
    #[error("storage write failed")]
    Write,
    #[error("value does not fit")]
    TooLong,
}

/// Fixed-capacity keyed string storage (NVS on the device).
pub trait KeyValueStore {
    /// Read `key` into `buf`, returning the stored string if present.
    fn get<'b>(&self, key: &str, buf: &'b mut [u8]) -> Result<Option<&'b str>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// A learned network. An empty secret means an open network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub ssid: SsidString,
    pub secret: SecretString,
    pub slot_index: u8,
}

pub struct CredentialStore<S: KeyValueStore> {
    backend: S,
    entries: Vec<Credential, MAX_CREDENTIALS>,
}

fn slot_key(prefix: &str, slot: usize) -> SlotKey {
    let mut key = SlotKey::new();
    let _ = write!(key, "{}{}", prefix, slot);
    key
}

impl<S: KeyValueStore> CredentialStore<S> {
    /// Load every populated slot from the backend. Gaps and duplicate SSIDs
    /// left by an interrupted write are skipped and the list re-packed.
    pub fn load(backend: S) -> Self {
        let entries = read_entries(&backend);
        log::info!("Loaded {} saved networks", entries.len());
        Self { backend, entries }
    }

    /// Saved credentials in slot order.
    pub fn list(&self) -> &[Credential] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup_secret(&self, ssid: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|c| c.ssid == ssid)
            .map(|c| c.secret.as_str())
    }

    /// Remember a network. Known SSIDs keep their slot.
    pub fn save(&mut self, ssid: &str, secret: &str) -> Result<(), StorageError> {
        let ssid_str = SsidString::try_from(ssid).map_err(|_| StorageError::TooLong)?;
        let secret_str = SecretString::try_from(secret).map_err(|_| StorageError::TooLong)?;

        let mut next = self.entries.clone();
        if let Some(pos) = next.iter().position(|c| c.ssid == ssid) {
            if next[pos].secret == secret {
                return Ok(());
            }
            next[pos].secret = secret_str;
            self.persist(next)?;
            log::info!("Updated saved network '{}' in slot {}", ssid, pos);
            return Ok(());
        }

        if next.is_full() {
            let evicted = next.remove(0);
            log::info!("Credential store full, evicting '{}'", evicted.ssid);
        }
        let _ = next.push(Credential {
            ssid: ssid_str,
            secret: secret_str,
            slot_index: 0,
        });
        let slot = next.len() - 1;
        self.persist(next)?;
        log::info!("Saved network '{}' in slot {}", ssid, slot);
        Ok(())
    }

    /// Drop a network and close the gap. Unknown SSIDs are ignored.
    pub fn forget(&mut self, ssid: &str) -> Result<(), StorageError> {
        let Some(pos) = self.entries.iter().position(|c| c.ssid == ssid) else {
            return Ok(());
        };

        let mut next = self.entries.clone();
        next.remove(pos);
        self.persist(next)?;
        log::info!("Forgot network '{}'", ssid);
        Ok(())
    }

    /// Write `next` over every slot and clear the slots past its end. The
    /// in-memory list only changes once the backend holds `next`; after a
    /// failed write it is re-read so it matches what storage now holds.
    fn persist(&mut self, mut next: Vec<Credential, MAX_CREDENTIALS>) -> Result<(), StorageError> {
        for (i, entry) in next.iter_mut().enumerate() {
            entry.slot_index = i as u8;
        }
        if let Err(e) = self.write_all(&next) {
            log::error!("Credential write failed: {}", e);
            self.entries = read_entries(&self.backend);
            return Err(e);
        }
        self.entries = next;
        Ok(())
    }

    /// Secret goes first so a slot never shows a new SSID with a stale secret.
    fn write_all(&mut self, entries: &[Credential]) -> Result<(), StorageError> {
        for (slot, entry) in entries.iter().enumerate() {
            self.backend.set(&slot_key("pass", slot), &entry.secret)?;
            self.backend.set(&slot_key("ssid", slot), &entry.ssid)?;
        }
        for slot in entries.len()..MAX_CREDENTIALS {
            self.backend.remove(&slot_key("ssid", slot))?;
            self.backend.remove(&slot_key("pass", slot))?;
        }
        Ok(())
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }
}

fn read_entries<S: KeyValueStore>(backend: &S) -> Vec<Credential, MAX_CREDENTIALS> {
    let mut entries: Vec<Credential, MAX_CREDENTIALS> = Vec::new();

    for slot in 0..MAX_CREDENTIALS {
        let mut ssid_buf = [0u8; 33];
        let mut pass_buf = [0u8; 65];
        let ssid = match backend.get(&slot_key("ssid", slot), &mut ssid_buf) {
            Ok(Some(s)) if !s.is_empty() => s,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("Credential slot {} unreadable: {}", slot, e);
                continue;
            }
        };
        if entries.iter().any(|c| c.ssid == ssid) {
            log::warn!("Credential slot {} repeats '{}', skipping", slot, ssid);
            continue;
        }
        let secret = backend
            .get(&slot_key("pass", slot), &mut pass_buf)
            .ok()
            .flatten()
            .unwrap_or("");

        let (Ok(ssid), Ok(secret)) = (SsidString::try_from(ssid), SecretString::try_from(secret)) else {
            continue;
        };
        let slot_index = entries.len() as u8;
        let _ = entries.push(Credential {
            ssid,
            secret,
            slot_index,
        });
    }
    entries
}

#[cfg(test)]
pub mod memory {
    use std::collections::BTreeMap;
    use std::string::String;

    use super::{KeyValueStore, StorageError};

    /// In-memory key-value store with a write counter. With `writes_left`
    /// set, `set` fails once that many writes have gone through.
    #[derive(Default)]
    pub struct MemoryStore {
        pub values: BTreeMap<String, String>,
        pub writes: usize,
        pub writes_left: Option<usize>,
    }

    impl KeyValueStore for MemoryStore {
        fn get<'b>(&self, key: &str, buf: &'b mut [u8]) -> Result<Option<&'b str>, StorageError> {
            let Some(value) = self.values.get(key) else {
                return Ok(None);
            };
            let bytes = value.as_bytes();
            if bytes.len() > buf.len() {
                return Err(StorageError::TooLong);
            }
            buf[..bytes.len()].copy_from_slice(bytes);
            core::str::from_utf8(&buf[..bytes.len()])
                .map(Some)
                .map_err(|_| StorageError::Read)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            match self.writes_left {
                Some(0) => return Err(StorageError::Write),
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            self.writes += 1;
            self.values.insert(key.into(), value.into());
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.values.remove(key);
            Ok(())
        }
    }
}
