//! NVS persistence for link credentials.
//!
//! Credentials written here (by a provisioning build) take precedence over
//! the ones compiled into the firmware.

use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::warn;
use zeroize::Zeroizing;

use crate::config::{LinkCredentials, MAX_PSK_LEN, MAX_SSID_LEN};

/// NVS namespace for link configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// Format: [ssid_len:1][ssid:32][psk_len:1][psk:64], plus margin.
const MAX_CONFIG_BUFFER_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PSK_LEN + 4;

/// Load credentials from NVS.
///
/// Returns `None` if nothing is stored or the stored record is corrupted.
pub fn load_credentials(nvs: &EspNvs<NvsDefault>) -> Option<LinkCredentials> {
    let mut buf = Zeroizing::new([0u8; MAX_CONFIG_BUFFER_SIZE]);
    let bytes = nvs.get_raw(NVS_KEY, &mut buf[..]).ok()??;
    match LinkCredentials::from_bytes(bytes) {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!("Stored credentials rejected: {}", e);
            None
        }
    }
}

/// Save credentials to NVS.
pub fn save_credentials(
    nvs: &mut EspNvs<NvsDefault>,
    credentials: &LinkCredentials,
) -> Result<(), EspError> {
    nvs.set_raw(NVS_KEY, &credentials.to_bytes())?;
    Ok(())
}

/// Clear stored credentials from NVS.
pub fn clear_credentials(nvs: &mut EspNvs<NvsDefault>) -> Result<(), EspError> {
    nvs.remove(NVS_KEY)?;
    Ok(())
}

/// Open the NVS namespace holding link configuration.
pub fn init_nvs(partition: esp_idf_svc::nvs::EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}
