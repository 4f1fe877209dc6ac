//! System state machine
//!
//! Supervises the firmware lifecycle: WiFi association, DHCP, HTTP control
//! endpoint startup, and the operational pulse phase. The pulse engine's
//! own beat timing is deliberately not part of this machine; only the
//! coarse "are updates arriving" signal is.

use crate::led_control::LedStatus;
use esp_println::println;

/// System state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    // Initialization
    SystemInit,

    // Network bring-up
    WiFiConnecting,
    DHCPRequesting,
    NetworkReady,

    // Service bring-up
    HttpStarting,
    HttpListening,

    // Running: BPM updates arriving, pulse engine active
    Operational,

    // Error states
    WiFiError,
    DHCPError,
    HttpError,

    // Recovery
    Reconnecting,
}

/// System event enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    SystemStarted,

    // Network events
    WiFiConnected,
    WiFiDisconnected,
    WiFiConnectionFailed,
    DHCPSuccess,
    DHCPFailed,

    // HTTP events
    HttpServerStarted,
    HttpServerFailed,

    // BPM events
    /// A BPM update was accepted by the control endpoint
    BpmReceived,
    /// The pulse engine disabled itself after the staleness timeout
    BpmStale,

    // Error and recovery events
    RecoveryRequested,
    StateTimeout,
}

/// Result of applying an event to the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(SystemState),
    /// Move to a new state and reset the retry counter
    TransitionWithReset(SystemState),
}

/// Actions the supervisor task must execute for the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Update the LED status display
    UpdateLedStatus(LedStatus),
    /// Start WiFi connection
    StartWiFiConnection,
    /// Start DHCP request
    StartDhcpRequest,
    /// Start network services
    StartNetworkServices,
    /// Start the HTTP control endpoint
    StartHttpServer,
    /// Start mDNS advertisement
    StartMdnsService,
    /// Monitor the network connection
    MonitorConnection,
    /// System recovery
    SystemRecover,
    /// Record an error
    LogError(SystemState),
}

/// System state machine
pub struct SystemStateMachine {
    current_state: SystemState,
    previous_state: Option<SystemState>,
    retry_count: u32,
    max_retries: u32,
    mdns_started: bool,
}

impl SystemStateMachine {
    /// Create a new state machine instance
    pub fn new() -> Self {
        Self {
            current_state: SystemState::SystemInit,
            previous_state: None,
            retry_count: 0,
            max_retries: 3,
            mdns_started: false,
        }
    }

    /// Get the current state
    pub fn get_current_state(&self) -> SystemState {
        self.current_state
    }

    /// Map the current state to a status LED pattern
    pub fn get_led_status(&self) -> LedStatus {
        match self.current_state {
            SystemState::SystemInit => LedStatus::Starting,
            SystemState::WiFiConnecting => LedStatus::WiFiConnecting,
            SystemState::DHCPRequesting => LedStatus::DHCPRequesting,
            SystemState::NetworkReady => LedStatus::NetworkReady,
            SystemState::HttpStarting => LedStatus::HttpServerBinding,
            SystemState::HttpListening => LedStatus::HttpServerListening,
            SystemState::Operational => LedStatus::Operational,
            SystemState::WiFiError => LedStatus::WiFiError,
            SystemState::DHCPError => LedStatus::NetworkError,
            SystemState::HttpError => LedStatus::ServiceError,
            SystemState::Reconnecting => LedStatus::Reconnecting,
        }
    }

    /// Apply a system event
    pub fn handle_event(&mut self, event: SystemEvent) -> StateTransition {
        let transition = self.get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => {
                self.transition_to_state(new_state);
            }
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {}
        }

        transition
    }

    /// Produce the actions for the current state
    pub fn update(&mut self) -> alloc::vec::Vec<Action> {
        let mut actions = alloc::vec::Vec::new();

        match self.current_state {
            SystemState::SystemInit => {
                actions.push(Action::UpdateLedStatus(LedStatus::Starting));
            }

            SystemState::WiFiConnecting => {
                actions.push(Action::UpdateLedStatus(LedStatus::WiFiConnecting));
                actions.push(Action::StartWiFiConnection);
            }

            SystemState::DHCPRequesting => {
                actions.push(Action::UpdateLedStatus(LedStatus::DHCPRequesting));
                actions.push(Action::StartDhcpRequest);
            }

            SystemState::NetworkReady => {
                actions.push(Action::UpdateLedStatus(LedStatus::NetworkReady));
                actions.push(Action::StartNetworkServices);
            }

            SystemState::HttpStarting => {
                actions.push(Action::StartHttpServer);
            }

            SystemState::HttpListening => {
                // Advertise once when the endpoint first comes up
                if !self.mdns_started {
                    actions.push(Action::StartMdnsService);
                }
                actions.push(Action::MonitorConnection);
            }

            SystemState::Operational => {
                actions.push(Action::MonitorConnection);
            }

            SystemState::WiFiError => {
                actions.push(Action::UpdateLedStatus(LedStatus::WiFiError));
                actions.push(Action::LogError(self.current_state));
                if self.retry_count < self.max_retries {
                    actions.push(Action::SystemRecover);
                }
            }

            SystemState::DHCPError => {
                actions.push(Action::UpdateLedStatus(LedStatus::NetworkError));
                actions.push(Action::LogError(self.current_state));
                if self.retry_count < self.max_retries {
                    actions.push(Action::SystemRecover);
                }
            }

            SystemState::HttpError => {
                actions.push(Action::UpdateLedStatus(LedStatus::ServiceError));
                actions.push(Action::LogError(self.current_state));
                if self.retry_count < self.max_retries {
                    actions.push(Action::SystemRecover);
                }
            }

            SystemState::Reconnecting => {
                actions.push(Action::UpdateLedStatus(LedStatus::Reconnecting));
                actions.push(Action::SystemRecover);
            }
        }

        actions
    }

    /// Internal state transition
    fn transition_to_state(&mut self, new_state: SystemState) {
        if new_state != self.current_state {
            match new_state {
                SystemState::Operational => println!("[STATE] System operational"),
                SystemState::WiFiError | SystemState::DHCPError | SystemState::HttpError => {
                    println!("[STATE] Error state: {:?}", new_state);
                }
                SystemState::HttpListening => {
                    // Re-advertise when the endpoint comes (back) up
                    if self.previous_state != Some(SystemState::Operational) {
                        self.mdns_started = false;
                    }
                }
                _ => {} // Silent for normal transitions
            }

            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    /// State transition rules
    fn get_state_transition(
        &self,
        current_state: SystemState,
        event: SystemEvent,
    ) -> StateTransition {
        match (current_state, event) {
            // System startup
            (SystemState::SystemInit, SystemEvent::SystemStarted) => {
                StateTransition::Transition(SystemState::WiFiConnecting)
            }

            // WiFi association, then DHCP
            (SystemState::WiFiConnecting, SystemEvent::WiFiConnected) => {
                StateTransition::TransitionWithReset(SystemState::DHCPRequesting)
            }
            (SystemState::WiFiConnecting, SystemEvent::WiFiConnectionFailed) => {
                if self.retry_count < self.max_retries {
                    StateTransition::Stay // keep retrying
                } else {
                    StateTransition::Transition(SystemState::WiFiError)
                }
            }
            (SystemState::WiFiConnecting, SystemEvent::StateTimeout) => {
                StateTransition::Transition(SystemState::WiFiError)
            }

            // DHCP, then service startup
            (SystemState::DHCPRequesting, SystemEvent::DHCPSuccess) => {
                StateTransition::TransitionWithReset(SystemState::NetworkReady)
            }
            (SystemState::DHCPRequesting, SystemEvent::DHCPFailed) => {
                if self.retry_count < self.max_retries {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(SystemState::DHCPError)
                }
            }
            (SystemState::DHCPRequesting, SystemEvent::StateTimeout) => {
                StateTransition::Transition(SystemState::DHCPError)
            }

            // HTTP endpoint startup
            (SystemState::NetworkReady, SystemEvent::HttpServerStarted) => {
                StateTransition::Transition(SystemState::HttpStarting)
            }
            (SystemState::HttpStarting, SystemEvent::HttpServerStarted) => {
                StateTransition::TransitionWithReset(SystemState::HttpListening)
            }
            (SystemState::HttpStarting, SystemEvent::HttpServerFailed) => {
                StateTransition::Transition(SystemState::HttpError)
            }

            // First accepted BPM update promotes to operational
            (SystemState::HttpListening, SystemEvent::BpmReceived) => {
                StateTransition::TransitionWithReset(SystemState::Operational)
            }

            // Running: updates keep arriving, staleness demotes
            (SystemState::Operational, SystemEvent::BpmReceived) => StateTransition::Stay,
            (SystemState::Operational, SystemEvent::BpmStale) => {
                StateTransition::Transition(SystemState::HttpListening)
            }

            // WiFi loss from anywhere requires a fresh DHCP lease
            (_, SystemEvent::WiFiDisconnected) => {
                StateTransition::Transition(SystemState::Reconnecting)
            }
            (SystemState::Reconnecting, SystemEvent::WiFiConnected) => {
                StateTransition::Transition(SystemState::DHCPRequesting)
            }

            // Error recovery
            (SystemState::WiFiError, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::WiFiConnecting)
            }
            (SystemState::DHCPError, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::DHCPRequesting)
            }
            (SystemState::HttpError, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::HttpStarting)
            }

            // Default: keep the current state
            _ => StateTransition::Stay,
        }
    }

    /// Increment the retry counter
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Whether the endpoint is up and the pulse engine may own the strip
    ///
    /// Covers the listening state too: with no (or stale) BPM the engine
    /// renders blank frames, which is exactly the strip-off behavior the
    /// staleness policy asks for.
    pub fn is_operational(&self) -> bool {
        matches!(
            self.current_state,
            SystemState::Operational | SystemState::HttpListening
        )
    }

    /// Mark the mDNS service as started
    pub fn mark_mdns_started(&mut self) {
        self.mdns_started = true;
    }
}

impl Default for SystemStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
