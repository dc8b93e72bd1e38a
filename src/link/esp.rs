//! ESP-IDF Wi-Fi station driver.
//!
//! Wraps the non-blocking `EspWifi` driver. Connect and disconnect calls
//! return as soon as ESP-IDF accepts them; outcomes come back through a
//! system event loop subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AuthMethod, ClientConfiguration, Configuration, EspWifi, PmfConfiguration, ScanConfig,
    WifiEvent,
};
use esp_idf_sys::EspError;
use log::{debug, info};

use super::event::{LinkEventListener, ScanEntry, STATUS_OK};
use super::{DriverError, InterfaceId, LinkDriver};
use crate::config::{Channel, LinkCredentials, MfpPreference, SecurityMode};

/// Station interface name.
const STA_INTERFACE: &str = "sta";

/// Status reported when the station drops while associating.
const STATUS_ASSOC_FAILED: i32 = 1;

/// Wi-Fi station driver for ESP32.
pub struct EspLinkDriver<'a> {
    wifi: EspWifi<'a>,
    sysloop: EspSystemEventLoop,
    subscription: Option<EspSubscription<'static, System>>,
    listener: Option<Arc<dyn LinkEventListener>>,
    connect_pending: Arc<AtomicBool>,
    started: bool,
}

impl<'a> EspLinkDriver<'a> {
    /// Create a new driver on the radio modem.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        Ok(Self {
            wifi,
            sysloop,
            subscription: None,
            listener: None,
            connect_pending: Arc::new(AtomicBool::new(false)),
            started: false,
        })
    }

    fn ensure_started(&mut self) -> Result<(), DriverError> {
        if !self.started {
            self.wifi
                .set_configuration(&Configuration::Client(ClientConfiguration::default()))
                .map_err(rejected)?;
            self.wifi.start().map_err(rejected)?;
            self.started = true;
        }
        Ok(())
    }

    fn client_configuration(credentials: &LinkCredentials) -> Result<Configuration, DriverError> {
        let auth_method = match credentials.security {
            SecurityMode::Open => AuthMethod::None,
            SecurityMode::Psk => AuthMethod::WPA2Personal,
        };
        let pmf_cfg = match credentials.mfp {
            MfpPreference::Disabled => PmfConfiguration::NotCapable,
            MfpPreference::Optional => PmfConfiguration::Capable { required: false },
            MfpPreference::Required => PmfConfiguration::Capable { required: true },
        };
        let channel = match credentials.channel {
            Channel::Any => None,
            Channel::Specific(ch) => Some(ch),
        };

        Ok(Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| DriverError::InvalidCredentials("ssid"))?,
            password: credentials
                .psk()
                .try_into()
                .map_err(|_| DriverError::InvalidCredentials("psk"))?,
            auth_method,
            channel,
            pmf_cfg,
            ..Default::default()
        }))
    }
}

fn rejected(e: EspError) -> DriverError {
    DriverError::Rejected(e.code())
}

impl<'a> LinkDriver for EspLinkDriver<'a> {
    fn default_interface(&self) -> Option<InterfaceId> {
        Some(InterfaceId::new(STA_INTERFACE))
    }

    fn subscribe(&mut self, listener: Arc<dyn LinkEventListener>) {
        let pending = self.connect_pending.clone();
        let events = listener.clone();
        let subscription = self.sysloop.subscribe::<WifiEvent, _>(move |event| match event {
            WifiEvent::StaConnected(_) => {
                pending.store(false, Ordering::SeqCst);
                events.on_connect_result(STATUS_OK);
            }
            WifiEvent::StaDisconnected(_) => {
                // ESP-IDF reports a failed association as a disconnect.
                if pending.swap(false, Ordering::SeqCst) {
                    events.on_connect_result(STATUS_ASSOC_FAILED);
                } else {
                    events.on_disconnect_result(STATUS_OK);
                }
            }
            other => debug!("Unhandled Wi-Fi event: {:?}", other),
        });

        match subscription {
            Ok(sub) => {
                self.subscription = Some(sub);
                self.listener = Some(listener);
            }
            Err(e) => log::error!("Wi-Fi event subscription failed: {:?}", e),
        }
    }

    fn submit_connect(
        &mut self,
        _iface: &InterfaceId,
        credentials: &LinkCredentials,
    ) -> Result<(), DriverError> {
        let config = Self::client_configuration(credentials)?;
        self.ensure_started()?;
        self.wifi.set_configuration(&config).map_err(rejected)?;

        self.connect_pending.store(true, Ordering::SeqCst);
        if let Err(e) = self.wifi.connect() {
            self.connect_pending.store(false, Ordering::SeqCst);
            return Err(rejected(e));
        }
        info!("Association with '{}' submitted", credentials.ssid);
        Ok(())
    }

    fn submit_disconnect(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::NotReady);
        }
        self.connect_pending.store(false, Ordering::SeqCst);
        self.wifi.disconnect().map_err(rejected)
    }

    fn submit_scan(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        self.ensure_started()?;
        let listener = self.listener.clone().ok_or(DriverError::NotReady)?;

        let scan = self
            .wifi
            .start_scan(&ScanConfig::default(), true)
            .and_then(|()| self.wifi.get_scan_result());

        match scan {
            Ok(access_points) => {
                for ap in access_points {
                    listener.on_scan_result(&ScanEntry {
                        ssid: ap.ssid.to_string(),
                        channel: ap.channel,
                        rssi: ap.signal_strength,
                        security: match ap.auth_method {
                            None | Some(AuthMethod::None) => SecurityMode::Open,
                            Some(_) => SecurityMode::Psk,
                        },
                    });
                }
                listener.on_scan_done(STATUS_OK);
            }
            Err(e) => listener.on_scan_done(e.code()),
        }
        Ok(())
    }
}
