//! mDNS advertisement packet test program
//!
//! Checks that the manager encodes a well-formed announcement for the
//! control endpoint: response header, answer count, service labels, SRV
//! port and host address.

#![no_std]
#![no_main]

extern crate alloc;

use esp_hal::clock::CpuClock;
use esp_println::println;
use pulse_rs::config;
use pulse_rs::mdns::{MdnsManager, MAX_MDNS_PACKET_SIZE};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[esp_hal::main]
fn main() -> ! {
    let config_hal = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(config_hal);

    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== mDNS advertisement test ===");

    // 1. No packet before the service is started
    println!("\n1. Not running yet");
    let mdns = MdnsManager::new();
    let mut buf = [0u8; MAX_MDNS_PACKET_SIZE];
    assert!(mdns.build_response(&mut buf).is_none());
    println!("✅ No response before start_service");

    // 2. Encoded announcement
    println!("\n2. Announcement packet");
    let ip = [192, 168, 1, 50];
    let mut mdns = MdnsManager::new();
    mdns.start_service(ip).unwrap();
    let len = mdns.build_response(&mut buf).unwrap();
    assert!(len > 12 && len <= MAX_MDNS_PACKET_SIZE);

    // Header: authoritative response, no questions, 3 answers
    assert_eq!(buf[0], 0x00);
    assert_eq!(buf[1], 0x00);
    assert_eq!(buf[2], 0x84);
    assert_eq!(buf[3], 0x00);
    assert_eq!(buf[5], 0x00); // questions
    assert_eq!(buf[7], 0x03); // answer records
    println!("✅ Header correct");

    // 3. Service type name directly after the header
    println!("\n3. Service labels");
    assert_eq!(buf[12], 10);
    assert_eq!(&buf[13..23], b"_heartbeat");
    assert_eq!(buf[23], 4);
    assert_eq!(&buf[24..28], b"_tcp");
    assert_eq!(buf[28], 5);
    assert_eq!(&buf[29..34], b"local");
    // Instance label appears in the PTR data
    let has_instance = buf[..len]
        .windows(9)
        .any(|w| w[0] == 8 && &w[1..] == b"pulse-rs");
    assert!(has_instance);
    println!("✅ Service and instance labels encoded");

    // 4. SRV carries the HTTP port, A record carries the address
    println!("\n4. Port and address");
    let port = config::HTTP_PORT;
    let port_bytes = [(port >> 8) as u8, (port & 0xFF) as u8];
    let has_port = buf[..len].windows(2).any(|w| w == port_bytes);
    assert!(has_port);
    assert_eq!(&buf[len - 4..len], &ip);
    println!("✅ Port {} and address advertised", port);

    println!("\n=== All mDNS tests passed! ===");

    loop {
        for _ in 0..1000000 {
            core::hint::spin_loop();
        }
    }
}
