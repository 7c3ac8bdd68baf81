//! # ads8689-stream
//!
//! Timer-triggered acquisition for the ADS8689 16-bit ADC and streaming of
//! its samples to a network client.
//!
//! ## Architecture
//!
//! ```text
//! timer alarm ──SPI_USR──▶ ADS8689 ──SPI done IRQ──▶ SampleRing ──▶ Forwarder ──▶ TCP
//!  (ISR, core 0)                      (ISR, core 0)     lock-free    (task, core 1)
//! ```
//!
//! - Interrupt handlers never block, allocate or lock; they talk to the
//!   drain task only through the ring indices.
//! - Overrun (ring overwrote its oldest sample) and backpressure (transport
//!   refused a block) are counters, never errors.
//! - Hardware access sits behind [`hal::HotRegisters`] and
//!   [`hal::StreamBackend`]; [`hal::SimBackend`] runs the whole pipeline on
//!   the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod channel;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod forward;
pub mod hal;
pub mod log_globals;
pub mod logging;
pub mod ring;
pub mod session;
pub mod stats;
pub mod timing;
pub mod uart_logger;
pub mod wire;

pub use channel::CommandChannel;
pub use command::{decode_signed, CommandFrame, InputRange, Opcode, Register};
pub use config::{DaqSettings, CONFIG};
pub use device::Ads8689;
pub use error::{ConfigurationError, Error, TransportError};
pub use event::{LinkEvent, LinkState};
pub use forward::{ForwardPolicy, Forwarder, Poll, SampleSource, Transport};
pub use log_globals::{ACQ_LOG_STREAM, NET_LOG_STREAM};
pub use ring::{Drained, SampleRing};
pub use session::AcquisitionSession;
pub use stats::{AcquisitionSnapshot, ForwardHealth, ForwardHealthSnapshot, ForwardStats};
pub use timing::TimingPlan;
