//! ADS8689 device driver: command traffic plus stream lifecycle.
//!
//! ```text
//! Ads8689 ──owns──▶ CommandChannel (setup only)
//!    │
//!    └──owns──▶ StreamBackend ──Arc──▶ AcquisitionSession ◀──Arc── drain task
//! ```
//!
//! While a session is attached the peripheral belongs to the interrupt
//! handlers, so command transactions are refused with `Busy`.

use alloc::sync::Arc;

use embedded_hal::spi::SpiDevice;

use crate::channel::CommandChannel;
use crate::command::{InputRange, Opcode, Register};
use crate::config::DaqSettings;
use crate::error::{ConfigurationError, Error, TransportError};
use crate::hal::StreamBackend;
use crate::log_globals::ACQ_LOG_STREAM;
use crate::logging::timestamp_us;
use crate::session::AcquisitionSession;
use crate::timing::TimingPlan;

pub type Session<B> = AcquisitionSession<<B as StreamBackend>::Registers>;

pub struct Ads8689<SPI, B: StreamBackend> {
    channel: CommandChannel<SPI>,
    backend: B,
    session: Option<Arc<Session<B>>>,
    range: InputRange,
}

impl<SPI: SpiDevice, B: StreamBackend> Ads8689<SPI, B> {
    pub fn new(channel: CommandChannel<SPI>, backend: B) -> Self {
        Self {
            channel,
            backend,
            session: None,
            range: InputRange::default(),
        }
    }

    /// Raw command transaction, see [`CommandChannel::transmit`].
    pub fn transmit(
        &mut self,
        opcode: Opcode,
        register: Register,
        data: u16,
        read_len: usize,
    ) -> Result<&[u8], TransportError> {
        self.channel_mut()?.transmit(opcode, register, data, read_len)
    }

    pub fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        self.channel_mut()?.read_register(register)
    }

    pub fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        self.channel_mut()?.write_register(register, value)
    }

    pub fn read_device_id(&mut self) -> Result<u16, TransportError> {
        self.channel_mut()?.read_device_id()
    }

    pub fn select_range(&mut self, range: InputRange) -> Result<(), TransportError> {
        self.channel_mut()?.select_range(range)?;
        self.range = range;
        Ok(())
    }

    /// Apply setup-time settings to the device (input range).
    pub fn configure(&mut self, settings: &DaqSettings) -> Result<(), Error> {
        settings.validate()?;
        self.select_range(settings.range)?;
        crate::rt_info!(
            ACQ_LOG_STREAM,
            timestamp_us(),
            "range {:?}, {} Hz planned",
            settings.range,
            settings.sample_freq_hz
        );
        Ok(())
    }

    /// Allocate a ring of `capacity` samples and start conversions at
    /// `sample_freq_hz`.
    ///
    /// Everything is validated before anything is allocated or attached.
    /// A running stream is stopped first and its ring released.
    pub fn start_stream(
        &mut self,
        capacity: usize,
        sample_freq_hz: u32,
    ) -> Result<Arc<Session<B>>, Error> {
        let plan = TimingPlan::new(sample_freq_hz, self.backend.tick_hz())?;
        if capacity == 0 {
            return Err(ConfigurationError::ZeroCapacity.into());
        }

        self.stop_stream();

        let session = Arc::new(AcquisitionSession::new(
            capacity,
            plan,
            self.backend.registers(),
            self.backend.now_us(),
        ));
        if let Err(e) = self.backend.attach(&session) {
            crate::rt_error!(ACQ_LOG_STREAM, timestamp_us(), "stream attach failed: {}", e);
            return Err(e.into());
        }

        crate::rt_info!(
            ACQ_LOG_STREAM,
            timestamp_us(),
            "stream started: {} samples, {} Hz ({} ticks)",
            capacity,
            sample_freq_hz,
            plan.alarm_ticks()
        );
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Detach the timer, then the completion interrupt, then release the ring.
    ///
    /// Other holders of the session (drain task) keep a valid but frozen ring.
    pub fn stop_stream(&mut self) {
        if let Some(session) = self.session.take() {
            self.backend.detach();
            let stats = session.stats();
            crate::rt_info!(
                ACQ_LOG_STREAM,
                timestamp_us(),
                "stream stopped: {} conversions, {} overruns",
                stats.conversions,
                stats.overruns
            );
        }
    }

    pub fn session(&self) -> Option<&Arc<Session<B>>> {
        self.session.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_some()
    }

    pub fn range(&self) -> InputRange {
        self.range
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn channel_mut(&mut self) -> Result<&mut CommandChannel<SPI>, TransportError> {
        if self.session.is_some() {
            return Err(TransportError::Busy);
        }
        Ok(&mut self.channel)
    }
}

impl<SPI, B: StreamBackend> Drop for Ads8689<SPI, B> {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            self.backend.detach();
        }
    }
}
