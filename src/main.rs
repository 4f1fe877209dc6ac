#![no_std]
#![no_main]

use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rmt::{Rmt, TxChannelCreator};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;

extern crate alloc;

use esp_wifi::wifi;

use embassy_net::{Config, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

use pulse_rs::config;
use pulse_rs::pulse::{Frame, PulseEngine};
use pulse_rs::state_machine::{Action, SystemEvent, SystemStateMachine};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

// Static cells for embassy components
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_CELL: StaticCell<Stack<'static>> = StaticCell::new();
static WIFI_MANAGER_CELL: StaticCell<pulse_rs::wifi::WiFiManager<'static>> = StaticCell::new();
// Use the concrete channel type
type ConcreteChannel = esp_hal::rmt::Channel<esp_hal::Blocking, 0>;
type LedControllerType = pulse_rs::led_control::LedController<ConcreteChannel>;
static LED_CONTROLLER_CELL: StaticCell<Mutex<CriticalSectionRawMutex, LedControllerType>> =
    StaticCell::new();

// The pulse engine owns every piece of beat timing state
static PULSE_ENGINE_CELL: StaticCell<Mutex<CriticalSectionRawMutex, PulseEngine>> =
    StaticCell::new();

static STATE_MACHINE_CELL: StaticCell<Mutex<CriticalSectionRawMutex, SystemStateMachine>> =
    StaticCell::new();

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

/// Supervisor task: drives WiFi association, DHCP, service startup and
/// recovery through the system state machine.
#[embassy_executor::task]
async fn state_machine_task(
    wifi_manager: &'static mut pulse_rs::wifi::WiFiManager<'static>,
    engine: &'static Mutex<CriticalSectionRawMutex, PulseEngine>,
    led_controller: &'static Mutex<CriticalSectionRawMutex, LedControllerType>,
    state_machine: &'static Mutex<CriticalSectionRawMutex, SystemStateMachine>,
) -> ! {
    println!("[STATE] Starting supervisor task");

    {
        let mut sm = state_machine.lock().await;
        sm.handle_event(SystemEvent::SystemStarted);
    }

    // Edge-detects the engine deactivating itself on staleness
    let mut engine_was_active = false;

    loop {
        let actions = {
            let mut sm = state_machine.lock().await;
            sm.update()
        };

        for action in actions {
            match action {
                Action::UpdateLedStatus(status) => {
                    led_controller.lock().await.set_status(status);
                }
                Action::StartWiFiConnection => {
                    println!("[STATE] Executing WiFi connection...");
                    match wifi_manager.connect(config::WIFI_SSID, config::WIFI_PASSWORD) {
                        Ok(_) => {
                            state_machine
                                .lock()
                                .await
                                .handle_event(SystemEvent::WiFiConnected);
                        }
                        Err(_) => {
                            let mut sm = state_machine.lock().await;
                            sm.increment_retry();
                            sm.handle_event(SystemEvent::WiFiConnectionFailed);
                        }
                    }
                }
                Action::StartDhcpRequest => {
                    if let Some(ip) = wifi_manager.get_ip_address() {
                        println!(
                            "[DHCP] IP address obtained: {}.{}.{}.{}",
                            ip[0], ip[1], ip[2], ip[3]
                        );
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::DHCPSuccess);
                    } else {
                        // Continue waiting for DHCP
                        Timer::after(Duration::from_millis(1000)).await;
                    }
                }
                Action::StartNetworkServices | Action::StartHttpServer => {
                    // The HTTP server already runs as a background task
                    state_machine
                        .lock()
                        .await
                        .handle_event(SystemEvent::HttpServerStarted);
                }
                Action::StartMdnsService => {
                    // The responder already runs as a background task; it
                    // starts answering once the stack has a lease
                    state_machine.lock().await.mark_mdns_started();
                }
                Action::MonitorConnection => {
                    match wifi_manager.monitor_connection() {
                        Ok(_) => {
                            if !wifi_manager.is_connected() {
                                state_machine
                                    .lock()
                                    .await
                                    .handle_event(SystemEvent::WiFiDisconnected);
                            }
                        }
                        Err(_) => {
                            state_machine
                                .lock()
                                .await
                                .handle_event(SystemEvent::WiFiDisconnected);
                        }
                    }

                    // Report the staleness timeout tripping in the engine
                    let engine_active = engine.lock().await.is_active();
                    if engine_was_active && !engine_active {
                        println!("[STATE] BPM updates went stale, pulsing disabled");
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::BpmStale);
                    }
                    engine_was_active = engine_active;
                }
                Action::SystemRecover => {
                    println!("[STATE] Initiating system recovery...");
                    let mut sm = state_machine.lock().await;
                    sm.increment_retry();
                    sm.handle_event(SystemEvent::RecoveryRequested);
                }
                Action::LogError(error_state) => {
                    println!("[STATE] Error logged: {:?}", error_state);
                }
            }
        }

        Timer::after(Duration::from_millis(100)).await;
    }
}

/// Control loop task: the single owner of the strip at runtime.
///
/// Every millisecond it evaluates one pulse engine tick and pushes the
/// resulting frame, but only when it differs from the last pushed frame so
/// the RMT bus is not rewritten redundantly. While the system is still
/// starting up it renders the status blink pattern instead.
#[embassy_executor::task]
async fn control_loop_task(
    engine: &'static Mutex<CriticalSectionRawMutex, PulseEngine>,
    led_controller: &'static Mutex<CriticalSectionRawMutex, LedControllerType>,
    state_machine: &'static Mutex<CriticalSectionRawMutex, SystemStateMachine>,
) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(1));
    let mut last_frame: Option<Frame> = None;
    let mut status_divider: u32 = 0;

    println!("[LOOP] Control loop started");

    loop {
        let operational = state_machine.lock().await.is_operational();

        if operational {
            let now = Instant::now().as_millis();
            let frame = engine.lock().await.tick(now);

            if last_frame != Some(frame) {
                let _ = led_controller.lock().await.render_frame(frame);
                last_frame = Some(frame);
            }
        } else {
            // Status indication runs at ~30fps, not at tick rate
            status_divider += 1;
            if status_divider >= 33 {
                status_divider = 0;
                let status = state_machine.lock().await.get_led_status();
                let mut leds = led_controller.lock().await;
                leds.set_status(status);
                let _ = leds.show_status();
            }
            // Force a redraw of the first pulse frame after startup
            last_frame = None;
        }

        ticker.next().await;
    }
}

/// HTTP control endpoint background task
#[embassy_executor::task]
async fn http_server_task(
    stack: &'static Stack<'static>,
    engine: &'static Mutex<CriticalSectionRawMutex, PulseEngine>,
    state_machine: &'static Mutex<CriticalSectionRawMutex, SystemStateMachine>,
) {
    use pulse_rs::http_server::HttpServer;

    println!("[HTTP] Starting HTTP server task...");

    stack.wait_config_up().await;

    let mut server = HttpServer::new();
    server.set_stack(stack);

    match server.start_listening(engine, state_machine).await {
        Ok(_) => {
            println!("[HTTP] HTTP server stopped unexpectedly");
        }
        Err(e) => {
            println!("[HTTP] HTTP server error: {:?}", e);
            state_machine
                .lock()
                .await
                .handle_event(SystemEvent::HttpServerFailed);
        }
    }
}

/// mDNS responder background task
///
/// Joins the mDNS multicast group, announces the control endpoint on
/// startup and every 30 seconds, and answers incoming queries with the
/// packet built from the service definitions.
#[embassy_executor::task]
async fn mdns_server_task(stack: &'static Stack<'static>) {
    use embassy_net::udp::{PacketMetadata, UdpSocket};
    use embassy_net::{IpAddress, IpEndpoint};
    use pulse_rs::mdns::{MdnsManager, MAX_MDNS_PACKET_SIZE};

    println!("[MDNS] Starting mDNS responder task...");

    stack.wait_config_up().await;

    let Some(net_config) = stack.config_v4() else {
        println!("[MDNS] No IPv4 configuration available");
        return;
    };
    let our_ip = net_config.address.address().octets();

    let mut mdns = MdnsManager::new();
    if mdns.start_service(our_ip).is_err() {
        println!("[MDNS] Failed to start mDNS service");
        return;
    }

    let mut response = [0u8; MAX_MDNS_PACKET_SIZE];
    let Some(response_len) = mdns.build_response(&mut response) else {
        println!("[MDNS] Failed to encode mDNS response");
        return;
    };

    // Join the mDNS multicast group (224.0.0.251)
    let multicast_addr = IpAddress::v4(224, 0, 0, 251);
    if let Err(e) = stack.join_multicast_group(multicast_addr) {
        println!("[MDNS] Failed to join mDNS multicast group: {:?}", e);
        return;
    }

    let mut rx_buffer = [0; 1500];
    let mut tx_buffer = [0; 1500];
    let mut rx_meta = [PacketMetadata::EMPTY; 8];
    let mut tx_meta = [PacketMetadata::EMPTY; 8];
    let mut socket = UdpSocket::new(
        *stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if let Err(e) = socket.bind(5353) {
        println!("[MDNS] Failed to bind mDNS socket: {:?}", e);
        return;
    }

    let multicast = IpEndpoint::new(multicast_addr, 5353);

    // Initial announcement
    if let Err(e) = socket.send_to(&response[..response_len], multicast).await {
        println!("[MDNS] Failed to send initial announcement: {:?}", e);
    }
    let mut last_announcement = Instant::now();

    let mut buffer = [0u8; 1500];
    loop {
        // Periodic re-announcement every 30 seconds
        let now = Instant::now();
        if now.duration_since(last_announcement) > Duration::from_secs(30) {
            let _ = socket.send_to(&response[..response_len], multicast).await;
            last_announcement = now;
        }

        match embassy_time::with_timeout(
            Duration::from_millis(1000),
            socket.recv_from(&mut buffer),
        )
        .await
        {
            Ok(Ok((len, endpoint))) => {
                // Answer queries only (QR bit clear), echoing the
                // transaction ID
                if len > 12 && (buffer[2] & 0x80) == 0 {
                    let mut reply = response;
                    reply[0] = buffer[0];
                    reply[1] = buffer[1];
                    let _ = socket.send_to(&reply[..response_len], multicast).await;
                    // Unicast copy for compatibility
                    let _ = socket.send_to(&reply[..response_len], endpoint).await;
                }
            }
            Ok(Err(e)) => {
                println!("[MDNS] Socket error: {:?}", e);
            }
            Err(_) => {
                // Timeout, continue to the next announcement check
            }
        }
    }
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let rng = Rng::new(peripherals.RNG);
    let wifi_init = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK).unwrap();

    println!("[WIFI] WiFi driver initialized successfully");

    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = wifi::new(wifi_init_ref, peripherals.WIFI).unwrap();
    let wifi_device = wifi_interfaces.sta;

    // Create embassy-net stack with DHCP configuration
    static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let stack_resources = STACK_RESOURCES.init(StackResources::new());

    let net_config = Config::dhcpv4(Default::default());

    let (stack, runner) = embassy_net::new(wifi_device, net_config, stack_resources, 1234);

    println!("[WIFI] Embassy-net stack created with DHCP configuration");

    use pulse_rs::wifi::WiFiManager;
    let mut wifi_manager = WiFiManager::new(wifi_controller);

    let stack_ref = STACK_CELL.init(stack);
    wifi_manager.set_stack(*stack_ref);

    // Initialize the WS2812 driver on the configured data pin
    println!(
        "[LED] Setting up GPIO pin {} for LED data...",
        config::LED_DATA_PIN
    );
    let led_pin = Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default())
        .into_peripheral_output();

    let frequency = Rate::from_mhz(10);
    let rmt = match Rmt::new(peripherals.RMT, frequency) {
        Ok(rmt) => rmt,
        Err(e) => {
            println!("[LED] Failed to initialize RMT: {:?}", e);
            panic!("RMT initialization failed");
        }
    };

    let tx_config = esp_hal::rmt::TxChannelConfig::default()
        .with_clk_divider(1)
        .with_idle_output_level(esp_hal::gpio::Level::Low)
        .with_idle_output(false)
        .with_carrier_modulation(false);

    let rmt_channel = rmt.channel0.configure(led_pin, tx_config).unwrap();

    use pulse_rs::led_control::LedController;
    let led_controller = LedController::new(rmt_channel);
    println!("[LED] LED controller initialized ({} LEDs)", config::NUM_LEDS);

    // Create static references for embassy tasks
    let wifi_manager = WIFI_MANAGER_CELL.init(wifi_manager);
    let led_controller = LED_CONTROLLER_CELL.init(Mutex::new(led_controller));

    // Pulse engine with the 10s staleness timeout enabled
    let engine = PULSE_ENGINE_CELL.init(Mutex::new(PulseEngine::new()));

    let state_machine = STATE_MACHINE_CELL.init(Mutex::new(SystemStateMachine::new()));
    println!("[STATE] System state machine initialized");

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        println!("[MAIN] Spawning supervisor task...");
        spawner
            .spawn(state_machine_task(
                wifi_manager,
                engine,
                led_controller,
                state_machine,
            ))
            .ok();

        println!("[MAIN] Spawning control loop task...");
        spawner
            .spawn(control_loop_task(engine, led_controller, state_machine))
            .ok();

        println!("[MAIN] Spawning HTTP server task...");
        spawner
            .spawn(http_server_task(stack_ref, engine, state_machine))
            .ok();

        println!("[MAIN] Spawning mDNS responder task...");
        spawner.spawn(mdns_server_task(stack_ref)).ok();
    });
}
