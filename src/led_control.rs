//! WS2812 LED strip control
//!
//! Drives the strip through the RMT peripheral. Owns no pulse timing; the
//! pulse engine decides the frame and this module only renders it. Before
//! the system is operational the strip doubles as a status indicator.

use crate::config;
use crate::pulse::Frame;
use crate::BoardError;
use alloc::vec;
use esp_hal::gpio::Level;
use esp_hal::rmt::{PulseCode, TxChannel};
use smart_leds::RGB8;

/// LED status states for visual feedback while not yet operational
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedStatus {
    // System initialization states
    Starting,

    // Network connection states
    WiFiConnecting,
    DHCPRequesting,
    NetworkReady,

    // Service states
    HttpServerBinding,
    HttpServerListening,

    // Operational state: the pulse engine owns the strip
    Operational,

    // Error states
    WiFiError,
    NetworkError,
    ServiceError,

    // Recovery states
    Reconnecting,
}

/// Pulse frame color at the configured brightness
const PULSE_WHITE: RGB8 = RGB8::new(config::BRIGHTNESS, config::BRIGHTNESS, config::BRIGHTNESS);

/// Dim blue used for status indication
const STATUS_BLUE: RGB8 = RGB8::new(0, 0, 40);

const OFF: RGB8 = RGB8::new(0, 0, 0);

/// LED controller for WS2812 strips using the RMT peripheral
pub struct LedController<TX>
where
    TX: TxChannel,
{
    channel: Option<TX>,
    status: LedStatus,
    status_counter: u32,
}

impl<TX> LedController<TX>
where
    TX: TxChannel,
{
    /// Create a new LED controller
    pub fn new(channel: TX) -> Self {
        Self {
            channel: Some(channel),
            status: LedStatus::Starting,
            status_counter: 0,
        }
    }

    /// Update the LED status
    pub fn set_status(&mut self, status: LedStatus) {
        if self.status != status {
            self.status = status;
            self.status_counter = 0; // Reset counter for new status
        }
    }

    /// Get current status
    pub fn get_status(&self) -> LedStatus {
        self.status
    }

    /// Render a pulse engine frame: the whole strip white or black
    pub fn render_frame(&mut self, frame: Frame) -> Result<(), BoardError> {
        let color = match frame {
            Frame::White => PULSE_WHITE,
            Frame::Blank => OFF,
        };
        self.fill(color)
    }

    /// Render one step of the status blink pattern
    ///
    /// Called periodically by the control loop while the system is still
    /// starting up, reconnecting, or in an error state.
    pub fn show_status(&mut self) -> Result<(), BoardError> {
        self.status_counter += 1;

        let status_on = match self.status {
            // System initialization - very fast blink
            LedStatus::Starting => (self.status_counter / 4) % 2 == 0,

            // Network connection states - fast blink
            LedStatus::WiFiConnecting | LedStatus::DHCPRequesting | LedStatus::Reconnecting => {
                (self.status_counter / 6) % 2 == 0
            }

            // Service states - medium blink
            LedStatus::HttpServerBinding | LedStatus::HttpServerListening => {
                (self.status_counter / 8) % 2 == 0
            }

            // Ready / operational - slow pulse
            LedStatus::NetworkReady | LedStatus::Operational => {
                (self.status_counter / 10) % 3 == 0
            }

            // Error states - slow blink
            LedStatus::WiFiError | LedStatus::NetworkError | LedStatus::ServiceError => {
                (self.status_counter / 10) % 2 == 0
            }
        };

        let color = if status_on { STATUS_BLUE } else { OFF };
        self.fill(color)
    }

    /// Push a uniform color to every pixel on the strip
    fn fill(&mut self, color: RGB8) -> Result<(), BoardError> {
        // WS2812 wire order is G, R, B
        let mut data = vec![0u8; config::NUM_LEDS * 3];
        for led in data.chunks_exact_mut(3) {
            led[0] = color.g;
            led[1] = color.r;
            led[2] = color.b;
        }
        self.write_pixels(&data)
    }

    /// Transmit raw GRB pixel data to the strip
    fn write_pixels(&mut self, data: &[u8]) -> Result<(), BoardError> {
        // Convert each byte to RMT pulses
        let mut pulses = vec::Vec::with_capacity(data.len() * 8 + 1);
        for &byte in data {
            let byte_pulses = byte_to_pulses(byte);
            pulses.extend_from_slice(&byte_pulses);
        }

        // Reset pulse: 50us low at 10MHz
        pulses.push(PulseCode::new(Level::Low, 500, Level::Low, 0));

        if let Some(channel) = self.channel.take() {
            match channel.transmit(&pulses) {
                Ok(transaction) => match transaction.wait() {
                    Ok(channel) => {
                        self.channel = Some(channel);
                        Ok(())
                    }
                    Err((_, channel)) => {
                        self.channel = Some(channel);
                        // Transmission often succeeds despite end-of-frame warnings
                        Ok(())
                    }
                },
                Err(_) => Err(BoardError::LedError),
            }
        } else {
            Err(BoardError::LedError)
        }
    }
}

/// Convert a single byte to RMT pulses for WS2812 LEDs
/// Uses WS2812 timing at 10MHz: 1-bit = 8 high + 4 low cycles (800ns/400ns),
/// 0-bit = 4 high + 8 low cycles (400ns/800ns)
fn byte_to_pulses(byte: u8) -> [u32; 8] {
    let mut pulses = [0u32; 8];

    for i in 0..8 {
        let bit = (byte >> (7 - i)) & 1;
        pulses[i] = if bit == 1 {
            PulseCode::new(Level::High, 8, Level::Low, 4)
        } else {
            PulseCode::new(Level::High, 4, Level::Low, 8)
        };
    }

    pulses
}
