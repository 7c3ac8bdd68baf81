//! ESP32 stream backend.
//!
//! - Conversion trigger: timer group 0 / timer 0 alarm sets `SPI_USR` on
//!   the GPSPI peripheral directly, repeating the 16-bit read transaction
//!   primed at attach time.
//! - Conversion completion: `SPI_TRANS_DONE` raises an IRAM interrupt
//!   allocated with `esp_intr_alloc` whose argument is the session.
//! - While attached the backend holds the SPI bus (`spi_device_acquire_bus`),
//!   so no queued driver transaction can touch the peripheral.
//! - The bus runs without DMA. Every transaction, command or conversion,
//!   moves through the 64-byte W0..W15 buffer (see
//!   [`crate::channel::MAX_TRANSACTION_LEN`]).

use alloc::sync::Arc;
use core::ffi::c_void;
use core::ptr;

use esp_idf_svc::hal::delay::{FreeRtos, BLOCK};
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyInputPin, Input, InputOutput, PinDriver};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::spi::{
    config::{Config as SpiConfig, MODE_0},
    Dma, Spi, SpiAnyPins, SpiDeviceDriver, SpiDriver, SpiDriverConfig,
};
use esp_idf_svc::hal::timer::{config::Config as TimerConfig, TimerDriver, TIMER00};
use esp_idf_svc::hal::units::FromValueType;
use esp_idf_svc::sys::{self, esp};

use super::{HotRegisters, StreamBackend};
use crate::channel::CommandChannel;
use crate::error::TransportError;
use crate::log_globals::ACQ_LOG_STREAM;
use crate::logging::timestamp_us;
use crate::session::AcquisitionSession;
use crate::timing::TIMER_DIVIDER;

/// SPI clock for command and conversion transactions.
pub const SPI_CLOCK_MHZ: u32 = 40;

/// Reset line low time at power-up.
pub const RESET_PULSE_MS: u32 = 100;


// GPSPI register offsets (ESP32 TRM, SPI chapter).
const SPI_CMD_REG: usize = 0x00;
const SPI_USR: u32 = 1 << 18;
const SPI_SLAVE_REG: usize = 0x38;
const SPI_TRANS_DONE: u32 = 1 << 4;
const SPI_TRANS_INTEN: u32 = 1 << 9;
const SPI_W0_REG: usize = 0x80;

/// General purpose SPI host wired to the ADC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiHost {
    /// SPI2
    Hspi,
    /// SPI3
    Vspi,
}

impl SpiHost {
    fn from_device(device: sys::spi_host_device_t) -> Option<Self> {
        match device {
            sys::spi_host_device_t_SPI2_HOST => Some(Self::Hspi),
            sys::spi_host_device_t_SPI3_HOST => Some(Self::Vspi),
            _ => None,
        }
    }

    const fn base(self) -> usize {
        match self {
            Self::Hspi => 0x3FF6_4000,
            Self::Vspi => 0x3FF6_5000,
        }
    }

    fn intr_source(self) -> i32 {
        match self {
            Self::Hspi => sys::periph_interrupt_t_ETS_SPI2_INTR_SOURCE as i32,
            Self::Vspi => sys::periph_interrupt_t_ETS_SPI3_INTR_SOURCE as i32,
        }
    }
}

/// Raw GPSPI register access.
#[derive(Clone, Copy)]
pub struct EspRegisters {
    base: usize,
}

impl EspRegisters {
    pub const fn new(host: SpiHost) -> Self {
        Self { base: host.base() }
    }

    #[inline(always)]
    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    #[inline(always)]
    fn modify(&self, offset: usize, set: u32, clear: u32) {
        // SAFETY: fixed peripheral address, 32-bit aligned.
        unsafe {
            let r = self.reg(offset);
            ptr::write_volatile(r, (ptr::read_volatile(r) | set) & !clear);
        }
    }

    fn enable_done_interrupt(&self, on: bool) {
        if on {
            self.modify(SPI_SLAVE_REG, SPI_TRANS_INTEN, SPI_TRANS_DONE);
        } else {
            self.modify(SPI_SLAVE_REG, 0, SPI_TRANS_INTEN | SPI_TRANS_DONE);
        }
    }
}

// SAFETY: volatile accesses to the owned host's registers only; each is a
// single load/store, IRAM-inlined into the handlers.
unsafe impl HotRegisters for EspRegisters {
    #[inline(always)]
    fn start_conversion(&self) {
        self.modify(SPI_CMD_REG, SPI_USR, 0);
    }

    #[inline(always)]
    fn clear_done(&self) {
        self.modify(SPI_SLAVE_REG, 0, SPI_TRANS_DONE);
    }

    #[inline(always)]
    fn read_word(&self) -> u16 {
        // SAFETY: W0 is readable any time; holds the first received bytes.
        let w0 = unsafe { ptr::read_volatile(self.reg(SPI_W0_REG)) };
        // First byte on the wire lands in bits 7..0.
        (w0 as u16).swap_bytes()
    }
}

pub type EspSession = AcquisitionSession<EspRegisters>;

/// SPI-completion handler.
///
/// # Safety
///
/// `arg` is `Arc::as_ptr` of the attached session, kept alive by the
/// backend until after `esp_intr_free`.
#[link_section = ".iram1.ads8689_conversion_isr"]
unsafe extern "C" fn conversion_isr(arg: *mut c_void) {
    let session = &*(arg as *const EspSession);
    session.on_conversion_complete(sys::esp_timer_get_time() as u32);
}

pub struct Esp32Backend<'d> {
    timer: TimerDriver<'d>,
    host: SpiHost,
    device: sys::spi_device_handle_t,
    intr: sys::intr_handle_t,
    session: Option<Arc<EspSession>>,
    ready: PinDriver<'d, AnyInputPin, Input>,
    _reset: PinDriver<'d, AnyIOPin, InputOutput>,
}

impl<'d> Esp32Backend<'d> {
    /// Level of the ADC ready/status line.
    pub fn ready(&self) -> bool {
        self.ready.is_high()
    }

    fn attach_inner(&mut self, session: &Arc<EspSession>) -> Result<(), TransportError> {
        // Prime one 16-bit read so the peripheral holds the transaction
        // that SPI_USR repeats.
        let mut prime = sys::spi_transaction_t {
            flags: sys::SPI_TRANS_USE_RXDATA,
            length: 16,
            rxlength: 16,
            ..Default::default()
        };
        // SAFETY: device handle owned by the channel, bus held by us.
        esp!(unsafe { sys::spi_device_polling_transmit(self.device, &mut prime) })?;

        let regs = EspRegisters::new(self.host);
        regs.enable_done_interrupt(false);
        let mut handle: sys::intr_handle_t = ptr::null_mut();
        // SAFETY: the session outlives the allocation (see `detach`).
        esp!(unsafe {
            sys::esp_intr_alloc(
                self.host.intr_source(),
                (sys::ESP_INTR_FLAG_IRAM | sys::ESP_INTR_FLAG_LEVEL3) as i32,
                Some(conversion_isr),
                Arc::as_ptr(session) as *mut c_void,
                &mut handle,
            )
        })?;
        self.intr = handle;
        regs.enable_done_interrupt(true);

        self.timer.set_counter(0)?;
        self.timer.set_alarm(session.plan().alarm_ticks() as u64)?;
        let alarm_session = session.clone();
        // SAFETY: closure only touches atomics and registers.
        unsafe {
            self.timer.subscribe(move || {
                alarm_session.on_timer_alarm(sys::esp_timer_get_time() as u32);
                sys::timer_group_enable_alarm_in_isr(
                    sys::timer_group_t_TIMER_GROUP_0,
                    sys::timer_idx_t_TIMER_0,
                );
            })?;
        }
        self.timer.enable_interrupt()?;
        self.timer.enable_alarm(true)?;
        self.timer.enable(true)?;
        Ok(())
    }

    fn detach_timer(&mut self) {
        let steps = [
            ("timer stop", self.timer.enable(false)),
            ("alarm disable", self.timer.enable_alarm(false)),
            ("timer interrupt disable", self.timer.disable_interrupt()),
            // Drops the closure's session reference.
            ("timer unsubscribe", self.timer.unsubscribe()),
        ];
        for (step, result) in steps {
            if let Err(e) = result {
                crate::rt_error!(ACQ_LOG_STREAM, timestamp_us(), "{}: {}", step, e);
            }
        }
    }

    fn detach_completion(&mut self) {
        EspRegisters::new(self.host).enable_done_interrupt(false);
        if !self.intr.is_null() {
            // SAFETY: handle from esp_intr_alloc, freed once.
            if let Err(e) = esp!(unsafe { sys::esp_intr_free(self.intr) }) {
                crate::rt_error!(ACQ_LOG_STREAM, timestamp_us(), "esp_intr_free: {}", e);
            }
            self.intr = ptr::null_mut();
        }
    }
}

impl<'d> StreamBackend for Esp32Backend<'d> {
    type Registers = EspRegisters;

    fn tick_hz(&self) -> u32 {
        self.timer.tick_hz() as u32
    }

    fn now_us(&self) -> u32 {
        // SAFETY: always callable.
        unsafe { sys::esp_timer_get_time() as u32 }
    }

    fn registers(&self) -> EspRegisters {
        EspRegisters::new(self.host)
    }

    fn attach(&mut self, session: &Arc<EspSession>) -> Result<(), TransportError> {
        // SAFETY: device handle valid for 'd.
        esp!(unsafe { sys::spi_device_acquire_bus(self.device, BLOCK) })?;
        self.session = Some(session.clone());

        if let Err(e) = self.attach_inner(session) {
            self.detach();
            return Err(e);
        }
        Ok(())
    }

    fn detach(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.detach_timer();
        self.detach_completion();
        // SAFETY: acquired in attach.
        unsafe { sys::spi_device_release_bus(self.device) };
        self.session = None;
    }
}

impl Drop for Esp32Backend<'_> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Bring up the SPI device, pulse reset and configure the ready input.
///
/// Returns the command channel and the stream backend sharing the device.
/// Any failure leaves nothing configured (drivers drop on return).
#[allow(clippy::too_many_arguments)]
pub fn init<'d, SPI: SpiAnyPins>(
    spi: impl Peripheral<P = SPI> + 'd,
    sclk: impl Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
    sdo: impl Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
    sdi: impl Peripheral<P = impl esp_idf_svc::hal::gpio::InputPin> + 'd,
    cs: impl Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
    reset: AnyIOPin,
    ready: AnyInputPin,
    timer: impl Peripheral<P = TIMER00> + 'd,
) -> Result<(CommandChannel<SpiDeviceDriver<'d, SpiDriver<'d>>>, Esp32Backend<'d>), TransportError>
{
    let host = SpiHost::from_device(SPI::device()).ok_or(TransportError::Esp(sys::ESP_ERR_NOT_SUPPORTED))?;

    let mut reset = PinDriver::input_output_od(reset)?;
    reset.set_low()?;
    FreeRtos::delay_ms(RESET_PULSE_MS);
    reset.set_high()?;
    let ready = PinDriver::input(ready)?;

    let driver = SpiDriver::new::<SPI>(
        spi,
        sclk,
        sdo,
        Some(sdi),
        // No DMA: received bytes must land in W0..W15, where the completion
        // handler reads them after every SPI_USR restart.
        &SpiDriverConfig::new().dma(Dma::Disabled),
    )?;
    let device = SpiDeviceDriver::new(
        driver,
        Some(cs),
        &SpiConfig::new()
            .baudrate(SPI_CLOCK_MHZ.MHz().into())
            .data_mode(MODE_0),
    )?;
    let handle = device.device();

    let timer = TimerDriver::new(
        timer,
        &TimerConfig::new().divider(TIMER_DIVIDER).auto_reload(true),
    )?;

    crate::rt_info!(
        ACQ_LOG_STREAM,
        timestamp_us(),
        "ADS8689 on {:?}, {} MHz, timer {} Hz",
        host,
        SPI_CLOCK_MHZ,
        timer.tick_hz()
    );

    Ok((
        CommandChannel::new(device),
        Esp32Backend {
            timer,
            host,
            device: handle,
            intr: ptr::null_mut(),
            session: None,
            ready,
            _reset: reset,
        },
    ))
}
