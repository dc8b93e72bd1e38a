//! Entropy pool and CoAP connectivity probe.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin probe` (association is simulated, the
//!   exchange uses the host network)
//! - **ESP32**: `cargo espflash flash --bin probe --features esp32 --release --monitor`
//!
//! Settings come from `PROBE_*` variables: read at runtime on the host,
//! baked in at build time for the device. On the device, credentials stored
//! by the `provision` binary override the compiled-in ones.
//!
//! Exits 0 only when the entropy battery, the link and the exchange all pass.

use std::error::Error;

use coap_probe_esp32::config::ProbeConfig;
use coap_probe_esp32::entropy::EntropyPool;
use coap_probe_esp32::harness::{Harness, TapReporter, Verdict};
use log::{error, info};

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn load_config() -> Result<ProbeConfig, Box<dyn Error>> {
    Ok(ProbeConfig::compiled()?)
}

#[cfg(not(feature = "esp32"))]
fn load_config() -> Result<ProbeConfig, Box<dyn Error>> {
    Ok(ProbeConfig::from_env()?)
}

#[cfg(feature = "esp32")]
fn run(mut config: ProbeConfig) -> Result<Verdict, Box<dyn Error>> {
    use coap_probe_esp32::link::{init_nvs, load_credentials, EspLinkDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::warn;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    match init_nvs(nvs_partition.clone()).map(|nvs| load_credentials(&nvs)) {
        Ok(Some(credentials)) => {
            info!("Using stored credentials for '{}'", credentials.ssid);
            config.credentials = credentials;
        }
        Ok(None) => info!("No stored credentials, using compiled-in values"),
        Err(e) => warn!("NVS unavailable ({}), using compiled-in values", e),
    }

    let driver = EspLinkDriver::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let harness = Harness::new(config);
    let mut controller = harness.controller(driver);
    let mut engine = harness.engine();
    let mut pool = EntropyPool::new()?;
    let mut reporter = TapReporter::stdout();

    Ok(harness.run(&mut controller, &mut engine, &mut pool, &mut reporter))
}

#[cfg(not(feature = "esp32"))]
fn run(config: ProbeConfig) -> Result<Verdict, Box<dyn Error>> {
    use coap_probe_esp32::link::HostLinkDriver;

    let harness = Harness::new(config);
    let mut controller = harness.controller(HostLinkDriver::new());
    let mut engine = harness.engine();
    let mut pool = EntropyPool::new()?;
    let mut reporter = TapReporter::stdout();

    Ok(harness.run(&mut controller, &mut engine, &mut pool, &mut reporter))
}

/// Exit with `code`. On ESP32, pause briefly first so the serial output is
/// flushed before the process terminates.
fn exit_with(code: i32) -> ! {
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(code)
}

fn main() {
    platform_init();

    info!("=== CoAP probe starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            exit_with(1);
        }
    };
    info!("Target: {}", config.coap_uri);

    match run(config) {
        Ok(verdict) => exit_with(verdict.exit_code()),
        Err(e) => {
            error!("Probe setup failed: {}", e);
            exit_with(1);
        }
    }
}
