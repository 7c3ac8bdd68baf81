//! Blocking command channel.
//!
//! Synchronous request/response transactions for device configuration.
//! `&mut self` keeps at most one transaction in flight; the device driver
//! refuses command traffic while a stream owns the peripheral.

use embedded_hal::spi::{Error as _, SpiDevice};

use crate::command::{encode, raw_from_wire, InputRange, Opcode, Register, FRAME_LEN};
use crate::error::TransportError;
use crate::log_globals::ACQ_LOG_STREAM;
use crate::logging::timestamp_us;

/// Largest transaction the SPI peripheral clocks without DMA (W0..W15).
pub const MAX_TRANSACTION_LEN: usize = 64;

/// Transmit/receive scratch size.
pub const SCRATCH_LEN: usize = MAX_TRANSACTION_LEN;

/// Largest `read_len` a single transaction can clock.
pub const MAX_READ_LEN: usize = SCRATCH_LEN - FRAME_LEN;

/// Fill byte for clocked read bytes.
const PAD: u8 = 0xFF;

pub struct CommandChannel<SPI> {
    spi: SPI,
    tx: [u8; SCRATCH_LEN],
    rx: [u8; SCRATCH_LEN],
}

impl<SPI: SpiDevice> CommandChannel<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            tx: [PAD; SCRATCH_LEN],
            rx: [PAD; SCRATCH_LEN],
        }
    }

    /// Clock one command frame plus `read_len` bytes; returns exactly
    /// `read_len` bytes from the start of the receive buffer.
    ///
    /// On error the receive buffer content is unspecified.
    pub fn transmit(
        &mut self,
        opcode: Opcode,
        register: Register,
        data: u16,
        read_len: usize,
    ) -> Result<&[u8], TransportError> {
        if read_len > MAX_READ_LEN {
            return Err(TransportError::ReadTooLong {
                requested: read_len,
                max: MAX_READ_LEN,
            });
        }

        let total = FRAME_LEN + read_len;
        self.tx[..FRAME_LEN].copy_from_slice(&encode(opcode, register, data));
        self.tx[FRAME_LEN..total].fill(PAD);

        if let Err(e) = self.spi.transfer(&mut self.rx[..total], &self.tx[..total]) {
            let err = TransportError::Spi(e.kind());
            crate::rt_error!(
                ACQ_LOG_STREAM,
                timestamp_us(),
                "{:?} {:?} failed: {}",
                opcode,
                register,
                err
            );
            return Err(err);
        }

        Ok(&self.rx[..read_len])
    }

    /// Read a 16-bit register.
    ///
    /// The ADS8689 answers in the frame that follows the read command, so
    /// a NOP frame clocks the value out in its first two bytes.
    pub fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        self.transmit(Opcode::ReadHalfword, register, 0, 0)?;
        let answer = self.transmit(Opcode::Nop, Register::DeviceId, 0, 2)?;
        Ok(raw_from_wire([answer[0], answer[1]]))
    }

    pub fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        self.transmit(Opcode::WriteFull, register, value, 0)?;
        Ok(())
    }

    /// Program RANGE_SEL (least significant half only).
    pub fn select_range(&mut self, range: InputRange) -> Result<(), TransportError> {
        self.transmit(
            Opcode::WriteLeastSignificant,
            Register::RangeSelect,
            range.bits() as u16,
            0,
        )?;
        Ok(())
    }

    /// Lower half of the DEVICE_ID register.
    pub fn read_device_id(&mut self) -> Result<u16, TransportError> {
        self.read_register(Register::DeviceId)
    }

    pub fn spi(&self) -> &SPI {
        &self.spi
    }

    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}
