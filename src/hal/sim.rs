//! Simulated register backend.
//!
//! Stands in for the SPI peripheral and the acquisition timer on the host,
//! so the whole pipeline can be exercised without hardware.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use super::{HotRegisters, StreamBackend};
use crate::error::TransportError;
use crate::session::AcquisitionSession;
use crate::timing::TIMER_TICK_HZ;

/// Simulated SPI peripheral state.
pub struct SimBus {
    word: AtomicU16,
    done: AtomicBool,
    starts: AtomicU32,
    clears: AtomicU32,
}

impl SimBus {
    pub const fn new() -> Self {
        Self {
            word: AtomicU16::new(0),
            done: AtomicBool::new(false),
            starts: AtomicU32::new(0),
            clears: AtomicU32::new(0),
        }
    }

    /// Conversion word the next read returns (already in host order).
    pub fn set_word(&self, raw: u16) {
        self.word.store(raw, Ordering::Relaxed);
    }

    /// Times the start bit was asserted.
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Times the done flag was cleared.
    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Transaction-done flag.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

/// [`HotRegisters`] over a [`SimBus`].
#[derive(Clone)]
pub struct SimRegisters {
    bus: Arc<SimBus>,
}

impl SimRegisters {
    pub fn new(bus: Arc<SimBus>) -> Self {
        Self { bus }
    }
}

// SAFETY: atomics only, never blocks or allocates.
unsafe impl HotRegisters for SimRegisters {
    fn start_conversion(&self) {
        self.bus.starts.fetch_add(1, Ordering::Relaxed);
        // Simulated conversions complete instantly.
        self.bus.done.store(true, Ordering::Release);
    }

    fn clear_done(&self) {
        self.bus.clears.fetch_add(1, Ordering::Relaxed);
        self.bus.done.store(false, Ordering::Release);
    }

    fn read_word(&self) -> u16 {
        self.bus.word.load(Ordering::Relaxed)
    }
}

/// Backend lifecycle steps, in the order they happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    Attached { alarm_ticks: u32 },
    TimerDetached,
    CompletionDetached,
}

/// Host backend: records lifecycle events and fires interrupts on demand.
pub struct SimBackend {
    bus: Arc<SimBus>,
    tick_hz: u32,
    clock_us: AtomicU32,
    fail_attach: bool,
    session: Option<Arc<AcquisitionSession<SimRegisters>>>,
    events: Vec<BackendEvent>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::with_tick_hz(TIMER_TICK_HZ)
    }

    pub fn with_tick_hz(tick_hz: u32) -> Self {
        Self {
            bus: Arc::new(SimBus::new()),
            tick_hz,
            clock_us: AtomicU32::new(0),
            fail_attach: false,
            session: None,
            events: Vec::new(),
        }
    }

    /// Make the next attach fail like a rejected interrupt allocation.
    pub fn fail_next_attach(&mut self) {
        self.fail_attach = true;
    }

    pub fn bus(&self) -> &Arc<SimBus> {
        &self.bus
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Set the simulated clock.
    pub fn set_clock_us(&self, now_us: u32) {
        self.clock_us.store(now_us, Ordering::Relaxed);
    }

    /// Simulate one sample period at `now_us`: timer alarm, then SPI
    /// completion delivering `raw`.
    ///
    /// Returns `false` when no stream is attached (interrupts disabled).
    pub fn fire(&self, now_us: u32, raw: u16) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        self.set_clock_us(now_us);
        session.on_timer_alarm(now_us);
        self.bus.set_word(raw);
        if self.bus.is_done() {
            session.on_conversion_complete(now_us);
        }
        true
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBackend for SimBackend {
    type Registers = SimRegisters;

    fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    fn now_us(&self) -> u32 {
        self.clock_us.load(Ordering::Relaxed)
    }

    fn registers(&self) -> SimRegisters {
        SimRegisters::new(self.bus.clone())
    }

    fn attach(
        &mut self,
        session: &Arc<AcquisitionSession<SimRegisters>>,
    ) -> Result<(), TransportError> {
        if core::mem::take(&mut self.fail_attach) {
            return Err(TransportError::Esp(-1));
        }
        self.events.push(BackendEvent::Attached {
            alarm_ticks: session.plan().alarm_ticks(),
        });
        self.session = Some(session.clone());
        Ok(())
    }

    fn detach(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.events.push(BackendEvent::TimerDetached);
        self.events.push(BackendEvent::CompletionDetached);
        self.session = None;
    }
}
