//! Pulse engine timing test program
//!
//! Runs the pulse engine against simulated millisecond timelines and checks
//! beat scheduling, pulse width, idempotence and the staleness policy.

#![no_std]
#![no_main]

extern crate alloc;

use esp_hal::clock::CpuClock;
use esp_println::println;
use pulse_rs::pulse::{Frame, PulseEngine, PulseState};

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

    println!("=== Pulse engine test ===");

    // 1. No update ever received: every tick is blank
    println!("\n1. Startup without any BPM update");
    let mut engine = PulseEngine::new();
    assert!(!engine.is_active());
    for now in [0u64, 1, 100, 5_000, 60_000] {
        assert_eq!(engine.tick(now), Frame::Blank);
    }
    assert_eq!(engine.state(), PulseState::Idle);
    println!("✅ Default-inactive engine stays blank");

    // 2. Beat scenario at 60 BPM (1000ms interval, 50ms pulse)
    println!("\n2. Beat scenario at 60 BPM");
    let mut engine = PulseEngine::new();
    engine.set_bpm(60, 0);
    assert!(engine.is_active());
    assert_eq!(engine.tick(0), Frame::White); // first beat fires immediately
    assert_eq!(engine.tick(40), Frame::White); // within the 50ms pulse
    assert_eq!(engine.tick(60), Frame::Blank); // pulse over
    assert_eq!(engine.tick(500), Frame::Blank); // interval not yet elapsed
    assert_eq!(engine.tick(1000), Frame::White); // next beat, >= boundary
    println!("✅ Beat scenario correct");

    // 3. Idempotence: same `now` twice yields the same frame
    println!("\n3. Tick idempotence");
    let mut engine = PulseEngine::new();
    engine.set_bpm(60, 0);
    let first = engine.tick(0);
    assert_eq!(engine.tick(0), first);
    let first = engine.tick(60);
    assert_eq!(engine.tick(60), first);
    let first = engine.tick(730);
    assert_eq!(engine.tick(730), first);
    println!("✅ Repeated ticks are stable");

    // 4. BPM <= 0 disables pulsing
    println!("\n4. Non-positive BPM");
    let mut engine = PulseEngine::new();
    engine.set_bpm(0, 0);
    for now in 0..200u64 {
        assert_eq!(engine.tick(now), Frame::Blank);
        assert_eq!(engine.state(), PulseState::Idle);
    }
    engine.set_bpm(-5, 300);
    assert_eq!(engine.tick(300), Frame::Blank);
    println!("✅ BPM <= 0 never lights the strip");

    // 5. Pulse width: lit for exactly 50ms, never less
    println!("\n5. Pulse width");
    let mut engine = PulseEngine::new();
    engine.set_bpm(60, 0);
    assert_eq!(engine.tick(0), Frame::White);
    for now in 1..50u64 {
        assert_eq!(engine.tick(now), Frame::White, "early blank at {}ms", now);
    }
    assert_eq!(engine.tick(50), Frame::Blank);
    println!("✅ 50ms pulse width respected");

    // 6. Exactly one beat per interval window over a dense tick sweep
    println!("\n6. Beat rate at 120 BPM over 10s of 1ms ticks");
    let mut engine = PulseEngine::new();
    engine.set_bpm(120, 0); // 500ms interval
    let mut beats = 0u32;
    let mut prev = Frame::Blank;
    for now in 0..10_000u64 {
        let frame = engine.tick(now);
        if prev == Frame::Blank && frame == Frame::White {
            beats += 1;
        }
        prev = frame;
    }
    assert_eq!(beats, 20);
    println!("✅ 20 beats in 10s at 120 BPM");

    // 7. Staleness: no update for >10s disables pulsing
    println!("\n7. Staleness timeout");
    let mut engine = PulseEngine::new();
    engine.set_bpm(60, 0);
    assert_eq!(engine.tick(0), Frame::White);
    // At exactly 10s the engine is still armed; the frame is blank only
    // because the 50ms pulse from t=0 is long over, not because of
    // staleness.
    assert_eq!(engine.tick(10_000), Frame::Blank);
    assert!(engine.is_active());
    assert_eq!(engine.tick(10_001), Frame::Blank);
    assert!(!engine.is_active());
    assert_eq!(engine.tick(10_500), Frame::Blank);
    // A fresh update re-arms the engine and the first tick beats immediately
    engine.set_bpm(80, 20_000);
    assert!(engine.is_active());
    assert_eq!(engine.tick(20_000), Frame::White);
    println!("✅ Staleness disables and a new update re-arms");

    // 8. Free-run variant: staleness disabled, pulses forever
    println!("\n8. Free-run variant");
    let mut engine = PulseEngine::with_stale_timeout(None);
    engine.set_bpm(60, 0);
    assert_eq!(engine.tick(0), Frame::White);
    assert_eq!(engine.tick(100_000), Frame::White); // far past any timeout
    assert!(engine.is_active());
    println!("✅ Free-run engine never deactivates");

    // 9. Interval floor: absurdly high BPM cannot produce a zero interval
    println!("\n9. Interval floor at extreme BPM");
    let mut engine = PulseEngine::new();
    engine.set_bpm(100_000, 0);
    assert_eq!(engine.tick(0), Frame::White);
    // Overlapping pulses are acceptable; on-time stays capped at 50ms
    assert_eq!(engine.tick(49), Frame::White);
    assert_eq!(engine.tick(50), Frame::Blank);
    assert_eq!(engine.tick(51), Frame::White);
    println!("✅ 1ms interval floor holds");

    println!("\n=== All pulse engine tests passed! ===");

    loop {
        for _ in 0..1000000 {
            core::hint::spin_loop();
        }
    }
}
