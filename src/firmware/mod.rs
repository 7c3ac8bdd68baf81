//! Firmware wiring. ESP-IDF only.

mod tcp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ads8689_stream::config::{self, DaqSettings, MigrationResult, CONFIG};
use ads8689_stream::event::{LinkEvent, LinkState};
use ads8689_stream::forward::{ForwardPolicy, Forwarder};
use ads8689_stream::stats::ForwardHealth;
use ads8689_stream::hal::esp32;
use ads8689_stream::logging::timestamp_us;
use ads8689_stream::uart_logger::{self, UartLoggerConfig};
use ads8689_stream::{
    rt_error, rt_info, rt_warn, Ads8689, Error, TransportError, ACQ_LOG_STREAM, NET_LOG_STREAM,
};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::cpu::Core;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{IOPin, InputPin};
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{self, EspError};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use self::tcp::TcpTransport;

const WIFI_SSID: &str = match option_env!("DAQ_WIFI_SSID") {
    Some(s) => s,
    None => "daq-setup",
};
const WIFI_PASSWORD: &str = match option_env!("DAQ_WIFI_PASSWORD") {
    Some(s) => s,
    None => "",
};

const VERSION: &str = env!("VERSION_STRING");

const HEALTH_INTERVAL_MS: u32 = 5_000;
const FORWARDER_STACK: usize = 8 * 1024;
const LOGGER_STACK: usize = 4 * 1024;

static LINK: LinkState = LinkState::new();

#[derive(Debug)]
enum FirmwareError {
    Esp(EspError),
    Driver(Error),
    Wifi(&'static str),
    Io(std::io::ErrorKind),
    Spawn,
}

impl From<EspError> for FirmwareError {
    fn from(e: EspError) -> Self {
        FirmwareError::Esp(e)
    }
}

impl From<Error> for FirmwareError {
    fn from(e: Error) -> Self {
        FirmwareError::Driver(e)
    }
}

impl From<std::io::Error> for FirmwareError {
    fn from(e: std::io::Error) -> Self {
        FirmwareError::Io(e.kind())
    }
}

impl From<TransportError> for FirmwareError {
    fn from(e: TransportError) -> Self {
        FirmwareError::Driver(e.into())
    }
}

impl core::fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FirmwareError::Esp(e) => write!(f, "esp: {}", e),
            FirmwareError::Driver(e) => write!(f, "driver: {}", e),
            FirmwareError::Wifi(msg) => write!(f, "wifi: {}", msg),
            FirmwareError::Io(kind) => write!(f, "io: {}", kind),
            FirmwareError::Spawn => write!(f, "thread spawn failed"),
        }
    }
}

pub fn main() {
    sys::link_patches();

    if let Err(e) = run() {
        rt_error!(ACQ_LOG_STREAM, timestamp_us(), "startup failed: {}", e);
        // Leave the logger running so the failure reaches the console.
        loop {
            FreeRtos::delay_ms(1_000);
        }
    }
}

fn run() -> Result<(), FirmwareError> {
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut uart = uart_logger::init_uart_logger(
        peripherals.uart1,
        peripherals.pins.gpio17,
        &UartLoggerConfig::default(),
    )?;
    spawn_pinned(c"uart_log", LOGGER_STACK, 2, Core::Core1, move || {
        uart_logger::uart_logger_task(&mut uart)
    })?;
    rt_info!(ACQ_LOG_STREAM, timestamp_us(), "{}", VERSION);

    match config::nvs::load_from_nvs(nvs.clone()) {
        Ok(result) => {
            rt_info!(ACQ_LOG_STREAM, timestamp_us(), "settings: {:?}", result);
            // Write the current schema back so the next boot loads it as-is.
            if matches!(result, MigrationResult::FreshInstall | MigrationResult::Migrated { .. }) {
                persist_settings(&nvs);
            }
        }
        Err(e) => rt_warn!(ACQ_LOG_STREAM, timestamp_us(), "settings defaults ({:?})", e),
    }
    let settings = CONFIG.snapshot();

    let (channel, backend) = esp32::init(
        peripherals.spi3,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        peripherals.pins.gpio19,
        peripherals.pins.gpio5,
        peripherals.pins.gpio15.downgrade(),
        peripherals.pins.gpio14.downgrade_input(),
        peripherals.timer00,
    )?;
    let mut adc = Ads8689::new(channel, backend);

    let id = adc.read_device_id()?;
    rt_info!(ACQ_LOG_STREAM, timestamp_us(), "device id {:#06x}", id);
    adc.configure(&settings)?;

    let _wifi = connect_wifi(peripherals.modem, sysloop, nvs.clone())?;
    let transport = TcpTransport::bind(settings.tcp_port, &LINK)?;

    let session = adc.start_stream(settings.buffer_capacity as usize, settings.sample_freq_hz)?;

    let running = Arc::new(AtomicBool::new(true));
    let mut forwarder = Forwarder::new(
        session.clone(),
        transport,
        ForwardPolicy::from_settings(&settings),
    );
    let health = forwarder.health();
    let fwd_running = running.clone();
    let forwarder_task = spawn_pinned(c"forwarder", FORWARDER_STACK, 5, Core::Core1, move || {
        forwarder.run_with_config(&mut FreeRtos, &fwd_running, &CONFIG);
        forwarder
    })?;

    supervise(&adc, &health, &settings, &nvs);

    // Only reached if supervision ends: stop cleanly.
    running.store(false, Ordering::Release);
    if forwarder_task.join().is_err() {
        rt_error!(NET_LOG_STREAM, timestamp_us(), "forwarder panicked");
    }
    adc.stop_stream();
    Ok(())
}

fn persist_settings(nvs: &EspDefaultNvsPartition) {
    match config::nvs::save_to_nvs(nvs.clone()) {
        Ok(()) => rt_info!(ACQ_LOG_STREAM, timestamp_us(), "settings saved"),
        Err(e) => rt_warn!(ACQ_LOG_STREAM, timestamp_us(), "settings not saved ({:?})", e),
    }
}

/// Periodic health report and settings persistence, until the session ends.
fn supervise<SPI, B>(
    adc: &Ads8689<SPI, B>,
    health: &ForwardHealth,
    settings: &DaqSettings,
    nvs: &EspDefaultNvsPartition,
) where
    SPI: embedded_hal::spi::SpiDevice,
    B: ads8689_stream::hal::StreamBackend,
{
    let mut last_conversions = 0u32;
    let mut seen_generation = CONFIG.generation();
    loop {
        FreeRtos::delay_ms(HEALTH_INTERVAL_MS);

        let generation = CONFIG.generation();
        if generation != seen_generation {
            seen_generation = generation;
            persist_settings(nvs);
            let current = CONFIG.snapshot();
            if current.sample_freq_hz != settings.sample_freq_hz
                || current.buffer_capacity != settings.buffer_capacity
                || current.range != settings.range
                || current.tcp_port != settings.tcp_port
            {
                rt_info!(
                    ACQ_LOG_STREAM,
                    timestamp_us(),
                    "frequency, capacity, range and port changes apply after restart"
                );
            }
        }

        let Some(session) = adc.session() else {
            return;
        };
        let stats = session.stats();
        let rate_hz = stats.conversions.wrapping_sub(last_conversions) as u64 * 1_000
            / HEALTH_INTERVAL_MS as u64;
        last_conversions = stats.conversions;

        rt_info!(
            NET_LOG_STREAM,
            timestamp_us(),
            "acq {} Hz (target {}), overruns {}, missed {}, jitter max {} us, client {}",
            rate_hz,
            settings.sample_freq_hz,
            stats.overruns,
            stats.missed_conversions(),
            stats.max_delta_us,
            LINK.client_connected()
        );

        let fwd = health.snapshot();
        rt_info!(
            NET_LOG_STREAM,
            timestamp_us(),
            "fwd saturation {}%, saturated {}, rejected {}, discarded {} blocks / {} samples",
            (fwd.saturation_ratio * 100.0) as u32,
            fwd.saturated,
            fwd.rejected,
            fwd.discarded_blocks,
            fwd.discarded_samples
        );
    }
}

fn connect_wifi(
    modem: esp_idf_svc::hal::modem::Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>, FirmwareError> {
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;

    let auth_method = if WIFI_PASSWORD.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID.try_into().map_err(|_| FirmwareError::Wifi("ssid too long"))?,
        password: WIFI_PASSWORD
            .try_into()
            .map_err(|_| FirmwareError::Wifi("password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;

    let ip = wifi.wifi().sta_netif().get_ip_info()?.ip;
    LINK.handle(LinkEvent::WifiConnected { ip: ip.octets() });
    rt_info!(NET_LOG_STREAM, timestamp_us(), "wifi up, {}", ip);
    Ok(wifi)
}

fn spawn_pinned<F, T>(
    name: &'static core::ffi::CStr,
    stack_size: usize,
    priority: u8,
    core: Core,
    f: F,
) -> Result<thread::JoinHandle<T>, FirmwareError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    ThreadSpawnConfiguration {
        name: Some(name.to_bytes_with_nul()),
        stack_size,
        priority,
        pin_to_core: Some(core),
        ..Default::default()
    }
    .set()?;
    let handle = thread::Builder::new()
        .stack_size(stack_size)
        .spawn(f)
        .map_err(|_| FirmwareError::Spawn);
    ThreadSpawnConfiguration::default().set()?;
    handle
}
