#![no_std]

//! ESP32-C3 BPM Pulse Beacon Library
//!
//! This library provides modules for implementing a WiFi-enabled LED beacon
//! that receives a beats-per-minute value over HTTP and pulses a WS2812 LED
//! strip in time with it.

extern crate alloc;

pub mod http_server;
pub mod led_control;
pub mod mdns;
pub mod pulse;
pub mod state_machine;
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    /// TCP port for the HTTP control endpoint
    pub const HTTP_PORT: u16 = 80;

    /// Default LED data GPIO pin
    pub const LED_DATA_PIN: u8 = 5;

    /// Number of LEDs on the strip
    pub const NUM_LEDS: usize = 30;

    /// Uniform channel brightness for the pulse frame (0-255)
    pub const BRIGHTNESS: u8 = 50;

    /// BPM assumed at startup, before the first update arrives
    pub const DEFAULT_BPM: i32 = 120;

    /// How long a single pulse keeps the strip lit, in milliseconds
    pub const PULSE_DURATION_MS: u64 = 50;

    /// Without a BPM update for this long, pulsing is disabled
    pub const BPM_STALE_TIMEOUT_MS: u64 = 10_000;

    /// mDNS service name advertised for the control endpoint
    pub const MDNS_SERVICE_NAME: &str = "_heartbeat._tcp.local.";

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");
}

/// Error types for the pulse beacon
#[derive(Debug, Clone, Copy)]
pub enum BoardError {
    /// WiFi connection error
    WiFiError,
    /// HTTP server error
    HttpError,
    /// LED control error
    LedError,
    /// mDNS service error
    MdnsError,
}
