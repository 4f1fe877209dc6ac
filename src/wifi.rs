//! WiFi module for the ESP32-C3 pulse beacon
//!
//! Handles station association using esp-wifi with embassy-net DHCP. The
//! pulse engine never sees any of this; the supervisor task drives
//! association and retries before the control loop takes over the strip.

use crate::BoardError;
use embassy_net::Stack;
use esp_println::println;
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, WifiController};

/// WiFi manager for handling network connectivity with DHCP
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    is_connected: bool,
    stack: Option<Stack<'a>>,
}

impl<'a> WiFiManager<'a> {
    /// Create a new WiFi manager instance
    pub fn new(controller: WifiController<'a>) -> Self {
        Self {
            controller,
            is_connected: false,
            stack: None,
        }
    }

    /// Set the embassy-net stack used to report the DHCP lease
    pub fn set_stack(&mut self, stack: Stack<'a>) {
        self.stack = Some(stack);
    }

    /// Connect to the configured WiFi network
    pub fn connect(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        println!("[WIFI] Connecting to WiFi network: {}", ssid);

        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
            password: password.try_into().map_err(|_| BoardError::WiFiError)?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        };

        self.controller
            .set_configuration(&esp_wifi::wifi::Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiError)?;

        self.controller.start().map_err(|_| BoardError::WiFiError)?;
        self.controller.connect().map_err(|_| BoardError::WiFiError)?;

        // Wait for association; the supervisor handles longer-term retries
        let mut attempts = 0;
        while !self.controller.is_connected().unwrap_or(false) && attempts < 50 {
            attempts += 1;
            for _ in 0..100000 {
                core::hint::spin_loop();
            }
        }

        if self.controller.is_connected().unwrap_or(false) {
            self.is_connected = true;
            println!("[WIFI] Successfully connected to WiFi network");
            Ok(())
        } else {
            println!(
                "[WIFI] Failed to connect to WiFi network after {} attempts",
                attempts
            );
            Err(BoardError::WiFiError)
        }
    }

    /// Current IP address from the DHCP lease, if one has been obtained
    pub fn get_ip_address(&self) -> Option<[u8; 4]> {
        if !self.is_connected {
            return None;
        }

        let stack = self.stack.as_ref()?;
        let config = stack.config_v4()?;
        Some(config.address.address().octets())
    }

    /// Check if WiFi is connected
    pub fn is_connected(&self) -> bool {
        self.is_connected && self.controller.is_connected().unwrap_or(false)
    }

    /// Track association state changes, updating the cached flag
    pub fn monitor_connection(&mut self) -> Result<(), BoardError> {
        let current_status = self.controller.is_connected().unwrap_or(false);

        if self.is_connected && !current_status {
            println!("[WIFI] WiFi connection lost!");
            self.is_connected = false;
        } else if !self.is_connected && current_status {
            println!("[WIFI] WiFi connection restored!");
            self.is_connected = true;
        }

        Ok(())
    }
}
