//! Link credential provisioning for ESP32.
//!
//! Stores credentials in NVS so the probe uses them instead of the ones
//! compiled into its own image.
//!
//! Usage:
//!   PROBE_WIFI_SSID="MyNetwork" PROBE_WIFI_PSK="secret" cargo espflash flash --bin provision --features esp32
//!
//! For open networks set `PROBE_WIFI_PSK=""`. To remove stored credentials
//! build with `PROBE_WIFI_CLEAR=1`.

/// Set at compile time to erase stored credentials instead of writing them.
#[cfg(feature = "esp32")]
const CLEAR: Option<&str> = option_env!("PROBE_WIFI_CLEAR");

/// Print error message and halt. We pause briefly then exit so the serial
/// monitor shows the output.
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Provisioning failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use coap_probe_esp32::config::{ConfigError, ProbeConfig, UNSET_SSID};
    use coap_probe_esp32::link::{clear_credentials, init_nvs, save_credentials};
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== Link Credential Provisioning ===\n");

    let mut nvs = match EspDefaultNvsPartition::take().and_then(init_nvs) {
        Ok(nvs) => nvs,
        Err(e) => halt_with_error(&format!("Error initializing NVS: {:?}", e)),
    };

    if CLEAR.is_some_and(|v| !v.is_empty() && v != "0") {
        if let Err(e) = clear_credentials(&mut nvs) {
            halt_with_error(&format!("Error clearing NVS: {:?}", e));
        }
        println!("Stored credentials removed; the probe will use compiled-in values.");
        std::thread::sleep(std::time::Duration::from_secs(2));
        return;
    }

    let credentials = match ProbeConfig::compiled() {
        Ok(config) if config.credentials.ssid == UNSET_SSID => halt_with_error(
            "Error: PROBE_WIFI_SSID not set at compile time.\n\n\
             Usage:\n  \
             PROBE_WIFI_SSID=\"MyNetwork\" PROBE_WIFI_PSK=\"secret\" cargo espflash flash --bin provision --features esp32",
        ),
        Ok(config) => config.credentials,
        Err(ConfigError::PskTooShort { len, min }) => halt_with_error(&format!(
            "Error: key too short ({} bytes, min {} for WPA2)",
            len, min
        )),
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    };

    println!("SSID: {}", credentials.ssid);
    println!("Security: {}", credentials.security);

    if let Err(e) = save_credentials(&mut nvs, &credentials) {
        halt_with_error(&format!("Error saving to NVS: {:?}", e));
    }

    println!("\n=== Credentials saved to NVS ===");
    println!("Credentials persist across reboots.");
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  PROBE_WIFI_SSID=\"MyNetwork\" PROBE_WIFI_PSK=\"secret\" cargo espflash flash --bin provision --features esp32");
    std::process::exit(1);
}
