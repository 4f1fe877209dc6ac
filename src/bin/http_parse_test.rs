//! HTTP request parsing and supervisor transition test program
//!
//! Checks request-line extraction, the `bpm` parameter convention and the
//! system state machine transitions around the control endpoint.

#![no_std]
#![no_main]

extern crate alloc;

use esp_hal::clock::CpuClock;
use esp_println::println;
use pulse_rs::http_server::{bpm_param, request_path};
use pulse_rs::state_machine::{SystemEvent, SystemState, SystemStateMachine};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== HTTP parsing test ===");

    // 1. Request-line extraction
    println!("\n1. Request path extraction");
    assert_eq!(
        request_path("GET /bpm?bpm=120 HTTP/1.1\r\nHost: pulse-rs.local\r\n\r\n"),
        "/bpm?bpm=120"
    );
    assert_eq!(request_path("GET / HTTP/1.1\r\n\r\n"), "/");
    assert_eq!(request_path("garbage"), "/");
    assert_eq!(request_path(""), "/");
    println!("✅ Request paths extracted");

    // 2. bpm parameter present
    println!("\n2. bpm parameter parsing");
    assert_eq!(bpm_param("/bpm?bpm=120"), Some(120));
    assert_eq!(bpm_param("/bpm?bpm=72"), Some(72));
    assert_eq!(bpm_param("/bpm?foo=1&bpm=88"), Some(88));
    assert_eq!(bpm_param("/bpm?bpm=-10"), Some(-10));
    println!("✅ Integer values parsed");

    // 3. bpm parameter absent -> None (endpoint answers 400)
    println!("\n3. Missing bpm parameter");
    assert_eq!(bpm_param("/bpm"), None);
    assert_eq!(bpm_param("/bpm?"), None);
    assert_eq!(bpm_param("/bpm?tempo=120"), None);
    println!("✅ Missing parameter detected");

    // 4. Non-integer values coerce to 0, which disables pulsing
    println!("\n4. Non-integer bpm convention");
    assert_eq!(bpm_param("/bpm?bpm=fast"), Some(0));
    assert_eq!(bpm_param("/bpm?bpm="), Some(0));
    assert_eq!(bpm_param("/bpm?bpm=12.5"), Some(0));
    println!("✅ Malformed values coerce to 0");

    // 5. Supervisor transitions around the endpoint
    println!("\n5. State machine bring-up and BPM transitions");
    let mut sm = SystemStateMachine::new();
    assert_eq!(sm.get_current_state(), SystemState::SystemInit);

    sm.handle_event(SystemEvent::SystemStarted);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);

    sm.handle_event(SystemEvent::WiFiConnected);
    assert_eq!(sm.get_current_state(), SystemState::DHCPRequesting);

    sm.handle_event(SystemEvent::DHCPSuccess);
    assert_eq!(sm.get_current_state(), SystemState::NetworkReady);

    sm.handle_event(SystemEvent::HttpServerStarted);
    assert_eq!(sm.get_current_state(), SystemState::HttpStarting);

    sm.handle_event(SystemEvent::HttpServerStarted);
    assert_eq!(sm.get_current_state(), SystemState::HttpListening);
    assert!(sm.is_operational()); // engine owns the strip from here on

    sm.handle_event(SystemEvent::BpmReceived);
    assert_eq!(sm.get_current_state(), SystemState::Operational);

    // Staleness demotes back to listening, still engine-owned
    sm.handle_event(SystemEvent::BpmStale);
    assert_eq!(sm.get_current_state(), SystemState::HttpListening);
    assert!(sm.is_operational());

    // A fresh update promotes again
    sm.handle_event(SystemEvent::BpmReceived);
    assert_eq!(sm.get_current_state(), SystemState::Operational);

    // WiFi loss requires a fresh DHCP lease
    sm.handle_event(SystemEvent::WiFiDisconnected);
    assert_eq!(sm.get_current_state(), SystemState::Reconnecting);
    sm.handle_event(SystemEvent::WiFiConnected);
    assert_eq!(sm.get_current_state(), SystemState::DHCPRequesting);
    println!("✅ Supervisor transitions correct");

    println!("\n=== All HTTP parsing tests passed! ===");

    loop {
        for _ in 0..1000000 {
            core::hint::spin_loop();
        }
    }
}
