//! HTTP control endpoint
//!
//! Accepts `GET /bpm?bpm=<integer>` over a TCP socket and forwards the
//! value to the pulse engine. One request is serviced at a time; if two
//! updates race, the last one processed wins.

use crate::pulse::PulseEngine;
use crate::state_machine::{SystemEvent, SystemStateMachine};
use crate::{config, BoardError};
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};
use embedded_io_async::Write;
use esp_println::println;

/// Request buffer size; a BPM update request line is well under this
const MAX_REQUEST_SIZE: usize = 512;

const RESPONSE_OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";
const RESPONSE_MISSING_BPM: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\nContent-Length: 11\r\nConnection: close\r\n\r\nMissing bpm";
const RESPONSE_NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot found";

/// HTTP server for receiving BPM updates
pub struct HttpServer<'a> {
    port: u16,
    stack: Option<&'a Stack<'a>>,
}

impl<'a> HttpServer<'a> {
    /// Create a new HTTP server instance
    pub fn new() -> Self {
        Self {
            port: config::HTTP_PORT,
            stack: None,
        }
    }

    /// Set the network stack for TCP operations
    pub fn set_stack(&mut self, stack: &'a Stack<'a>) {
        self.stack = Some(stack);
    }

    /// Get the listening port
    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Accept and service requests forever (async)
    pub async fn start_listening(
        &mut self,
        engine: &'static Mutex<CriticalSectionRawMutex, PulseEngine>,
        state_machine: &'static Mutex<CriticalSectionRawMutex, SystemStateMachine>,
    ) -> Result<(), BoardError> {
        let stack = self.stack.ok_or(BoardError::HttpError)?;

        let mut rx_buffer = [0u8; 1024];
        let mut tx_buffer = [0u8; 1024];

        println!("[HTTP] Server listening on port {}", self.port);

        loop {
            let mut socket = TcpSocket::new(*stack, &mut rx_buffer, &mut tx_buffer);
            socket.set_timeout(Some(Duration::from_secs(10)));

            if socket.accept(self.port).await.is_err() {
                println!("[HTTP] Accept error");
                continue;
            }

            let mut buf = [0u8; MAX_REQUEST_SIZE];
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => continue,
                Ok(n) => n,
            };

            let request = core::str::from_utf8(&buf[..n]).unwrap_or("");
            let path = request_path(request);

            let response = if path == "/bpm" || path.starts_with("/bpm?") {
                match bpm_param(path) {
                    Some(bpm) => {
                        let now = Instant::now().as_millis();
                        engine.lock().await.set_bpm(bpm, now);
                        println!("[HTTP] BPM updated: {}", bpm);
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::BpmReceived);
                        RESPONSE_OK
                    }
                    None => {
                        println!("[HTTP] Rejected request without bpm parameter");
                        RESPONSE_MISSING_BPM
                    }
                }
            } else {
                RESPONSE_NOT_FOUND
            };

            let _ = socket.write_all(response).await;
            let _ = socket.flush().await;
            socket.close();
        }
    }
}

impl<'a> Default for HttpServer<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the request path from a raw HTTP request
///
/// `"GET /bpm?bpm=120 HTTP/1.1..."` yields `"/bpm?bpm=120"`. Malformed
/// request lines fall back to `"/"`.
pub fn request_path(request: &str) -> &str {
    request
        .split_once(' ')
        .and_then(|(_, rest)| rest.split_once(' '))
        .map(|(path, _)| path)
        .unwrap_or("/")
}

/// Extract the `bpm` query parameter from a request path
///
/// Returns `None` when the parameter is absent. A present but non-numeric
/// value parses to 0, which the engine treats as "pulsing disabled" - the
/// same convention the control endpoint has always had.
pub fn bpm_param(path: &str) -> Option<i32> {
    let (_, query) = path.split_once('?')?;
    for pair in query.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some(kv) => kv,
            None => (pair, ""),
        };
        if key == "bpm" {
            return Some(value.parse::<i32>().unwrap_or(0));
        }
    }
    None
}
