//! NVS-backed key-value store for saved WiFi credentials.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use tapnode::credentials::{KeyValueStore, StorageError};

const NAMESPACE: &str = "tapnode";

pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl KeyValueStore for NvsStore {
    fn get<'b>(&self, key: &str, buf: &'b mut [u8]) -> Result<Option<&'b str>, StorageError> {
        self.nvs.get_str(key, buf).map_err(|e| {
            log::error!("NVS read {} failed: {:?}", key, e);
            StorageError::Read
        })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.nvs.set_str(key, value).map_err(|e| {
            log::error!("NVS write {} failed: {:?}", key, e);
            StorageError::Write
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.nvs.remove(key).map(|_| ()).map_err(|e| {
            log::error!("NVS remove {} failed: {:?}", key, e);
            StorageError::Write
        })
    }
}
