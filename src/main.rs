//! ADS8689 data acquisition firmware.
//!
//! 1. Load settings from NVS
//! 2. Bring up the ADC (SPI, reset, ready line) and apply the input range
//! 3. Join Wi-Fi and listen for a TCP client
//! 4. Start the timer-triggered stream (interrupts on core 0)
//! 5. Forward samples on core 1, log through UART on core 1
//! 6. Report health every few seconds

#[cfg(target_os = "espidf")]
mod firmware;

#[cfg(target_os = "espidf")]
fn main() {
    firmware::main();
}

#[cfg(not(target_os = "espidf"))]
fn main() {}
