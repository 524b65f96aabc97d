//! Access point capability
//!
//! During provisioning the device drops its station association and hosts
//! an open network of its own, so an installer's phone can reach the form
//! without any infrastructure.

use crate::config::ProvisioningConfig;
use crate::error::CPError;
use std::net::Ipv4Addr;

/// Static addressing of the provisioning network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApAddressing {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl ApAddressing {
    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self {
            address: config.ap_address,
            gateway: config.ap_gateway,
            netmask: config.ap_netmask,
        }
    }
}

impl Default for ApAddressing {
    fn default() -> Self {
        Self::from_config(&ProvisioningConfig::default())
    }
}

/// Radio control needed by the provisioning session.
pub trait AccessPoint {
    /// Hardware identifier (MAC address); the SSID suffix comes from it.
    fn hardware_id(&self) -> [u8; 6];

    /// Leave any station network.
    fn disconnect_station(&mut self);

    /// Apply static addressing. Failure aborts the session start.
    fn configure(&mut self, addressing: &ApAddressing) -> Result<(), CPError>;

    /// Start advertising an open network named `ssid`.
    fn start(&mut self, ssid: &str) -> Result<(), CPError>;

    fn stop(&mut self);

    /// Stations currently associated.
    fn client_count(&self) -> usize;
}

/// `<prefix>-XXXX` from the last two bytes of the hardware id.
pub fn derive_ssid(prefix: &str, hardware_id: &[u8; 6]) -> String {
    format!("{}-{:02X}{:02X}", prefix, hardware_id[4], hardware_id[5])
}

/// Access point stand-in for hosts without a radio.
///
/// Records what a real radio would do and logs it; the HTTP side is served
/// by whichever listener the session is given. Failures can be injected
/// for tests.
#[derive(Debug, Clone, Default)]
pub struct HostAccessPoint {
    hardware_id: [u8; 6],
    addressing: Option<ApAddressing>,
    ssid: Option<String>,
    clients: usize,
    station_disconnects: usize,
    fail_configure: bool,
    fail_start: bool,
}

impl HostAccessPoint {
    pub fn new(hardware_id: [u8; 6]) -> Self {
        Self {
            hardware_id,
            ..Default::default()
        }
    }

    pub fn with_configure_failure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn set_client_count(&mut self, clients: usize) {
        self.clients = clients;
    }

    /// SSID currently advertised.
    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn addressing(&self) -> Option<&ApAddressing> {
        self.addressing.as_ref()
    }

    pub fn station_disconnects(&self) -> usize {
        self.station_disconnects
    }
}

impl AccessPoint for HostAccessPoint {
    fn hardware_id(&self) -> [u8; 6] {
        self.hardware_id
    }

    fn disconnect_station(&mut self) {
        self.station_disconnects += 1;
        log::debug!("Station disconnected");
    }

    fn configure(&mut self, addressing: &ApAddressing) -> Result<(), CPError> {
        if self.fail_configure {
            return Err(CPError::AccessPointConfig);
        }
        log::debug!(
            "AP addressing {} gw {} mask {}",
            addressing.address,
            addressing.gateway,
            addressing.netmask
        );
        self.addressing = Some(*addressing);
        Ok(())
    }

    fn start(&mut self, ssid: &str) -> Result<(), CPError> {
        if self.fail_start {
            return Err(CPError::AccessPointStart);
        }
        self.ssid = Some(ssid.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(ssid) = self.ssid.take() {
            log::debug!("AP '{}' stopped", ssid);
        }
        self.clients = 0;
    }

    fn client_count(&self) -> usize {
        self.clients
    }
}
