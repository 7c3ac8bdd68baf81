//! Hardware Abstraction Layer for the acquisition pipeline.
//!
//! Two seams keep the pipeline hardware-agnostic:
//! - [`HotRegisters`]: the raw SPI register pokes the interrupt handlers need
//! - [`StreamBackend`]: timer and interrupt plumbing for one stream
//!
//! Command transactions go through `embedded_hal::spi::SpiDevice` instead.

use alloc::sync::Arc;

use crate::error::TransportError;
use crate::session::AcquisitionSession;

pub mod sim;

#[cfg(target_os = "espidf")]
pub mod esp32;

pub use sim::{BackendEvent, SimBackend, SimBus, SimRegisters};

/// Latency-critical SPI register access used from interrupt context.
///
/// # Safety
///
/// Implementors guarantee every method:
/// - completes in bounded time, never blocks, never allocates
/// - is callable from interrupt context (IRAM resident on target)
/// - touches only the peripheral owned by the active stream
pub unsafe trait HotRegisters: Send + Sync {
    /// Assert the peripheral's start-transaction bit (starts a conversion read).
    fn start_conversion(&self);

    /// Clear the transaction-done status flag.
    fn clear_done(&self);

    /// Read the conversion word from the receive data register, byte-swapped
    /// from wire order.
    fn read_word(&self) -> u16;
}

/// Timer and interrupt plumbing for a stream.
pub trait StreamBackend {
    type Registers: HotRegisters + 'static;

    /// Acquisition timer tick rate.
    fn tick_hz(&self) -> u32;

    /// Free-running microsecond clock (wrapping).
    fn now_us(&self) -> u32;

    /// Register handle for a new session.
    fn registers(&self) -> Self::Registers;

    /// Hook the timer alarm and the SPI-completion interrupt to `session`
    /// and start the timer.
    ///
    /// On error nothing stays attached.
    fn attach(
        &mut self,
        session: &Arc<AcquisitionSession<Self::Registers>>,
    ) -> Result<(), TransportError>;

    /// Disable and detach the timer interrupt, then the SPI-completion
    /// interrupt, and release every reference to the session.
    fn detach(&mut self);
}
