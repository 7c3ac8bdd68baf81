//! Module: command
//!
//! Purpose: ADS8689 register protocol. Builds the 4-byte command frame
//! clocked on SDI and maps raw conversion words to signed samples.
//!
//! Frame layout (MSB first on the wire):
//! ```text
//! byte 0: [ opcode(7) | addr bit 8 ]
//! byte 1: [ addr bits 7..0 ]
//! byte 2: [ data bits 15..8 ]
//! byte 3: [ data bits 7..0 ]
//! then `read_len` clocked bytes
//! ```
//!
//! Safety: Safe. Pure functions over protocol constants.

/// Length of the fixed part of every command frame.
pub const FRAME_LEN: usize = 4;

/// Offset-binary midpoint: raw code that represents 0 V.
pub const MIDSCALE: u16 = 0x8000;

/// ADS8689 register map (byte addresses).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Register {
    DeviceId = 0x00,
    ResetPowerControl = 0x04,
    /// SDI_CTL: input protocol selection.
    InputConfig = 0x08,
    /// SDO_CTL: output protocol and SDO-1 configuration.
    OutputConfig = 0x0C,
    DataOutputConfig = 0x10,
    RangeSelect = 0x14,
    Alarm = 0x20,
    AlarmHighThreshold = 0x24,
    AlarmLowThreshold = 0x28,
}

impl Register {
    /// Numeric register address.
    pub const fn address(self) -> u16 {
        self as u16
    }
}

/// 7-bit command opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0b000_0000,
    Clear = 0b110_0000,
    ReadHalfword = 0b110_0100,
    Read = 0b010_0100,
    WriteFull = 0b110_1000,
    WriteMostSignificant = 0b110_1001,
    WriteLeastSignificant = 0b110_1010,
    SetHalfword = 0b110_1100,
}

impl Opcode {
    /// Raw 7-bit opcode value.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// One encoded command frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandFrame([u8; FRAME_LEN]);

impl CommandFrame {
    /// Encode `opcode` addressed to `register` carrying `data`.
    pub const fn encode(opcode: Opcode, register: Register, data: u16) -> Self {
        let addr = register.address();
        Self([
            (opcode.bits() << 1) | ((addr >> 8) & 1) as u8,
            (addr & 0xFF) as u8,
            (data >> 8) as u8,
            (data & 0xFF) as u8,
        ])
    }

    /// NOP frame, used to clock out the answer of the previous command.
    pub const NOP: Self = Self::encode(Opcode::Nop, Register::DeviceId, 0);

    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Total transaction length in bits for a frame followed by `read_len` bytes.
    pub const fn transaction_bits(read_len: usize) -> usize {
        (FRAME_LEN + read_len) * 8
    }
}

/// Shorthand for [`CommandFrame::encode`].
#[inline]
pub const fn encode(opcode: Opcode, register: Register, data: u16) -> [u8; FRAME_LEN] {
    *CommandFrame::encode(opcode, register, data).as_bytes()
}

/// Map an offset-binary conversion word to a signed sample.
///
/// `0x0000 -> -32768`, `0x8000 -> 0`, `0xFFFF -> 32767`.
#[inline(always)]
pub const fn decode_signed(raw: u16) -> i16 {
    (raw as i32 - MIDSCALE as i32) as i16
}

/// Assemble a conversion word from the two bytes in wire order (MSB first).
#[inline(always)]
pub const fn raw_from_wire(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// Internal reference voltage in microvolts.
pub const VREF_UV: u32 = 4_096_000;

/// Analog input range, RANGE_SEL[3:0].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InputRange {
    /// ±3 × VREF (±12.288 V)
    Bipolar3x = 0b0000,
    /// ±2.5 × VREF (±10.24 V)
    Bipolar2p5x = 0b0001,
    /// ±1.5 × VREF (±6.144 V)
    Bipolar1p5x = 0b0010,
    /// ±1.25 × VREF (±5.12 V)
    Bipolar1p25x = 0b0011,
    /// ±0.625 × VREF (±2.56 V)
    Bipolar0p625x = 0b0100,
    /// 0 to 3 × VREF
    Unipolar3x = 0b1000,
    /// 0 to 2.5 × VREF
    Unipolar2p5x = 0b1001,
    /// 0 to 1.5 × VREF
    Unipolar1p5x = 0b1010,
    /// 0 to 1.25 × VREF
    Unipolar1p25x = 0b1011,
}

impl InputRange {
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b0000 => Some(Self::Bipolar3x),
            0b0001 => Some(Self::Bipolar2p5x),
            0b0010 => Some(Self::Bipolar1p5x),
            0b0011 => Some(Self::Bipolar1p25x),
            0b0100 => Some(Self::Bipolar0p625x),
            0b1000 => Some(Self::Unipolar3x),
            0b1001 => Some(Self::Unipolar2p5x),
            0b1010 => Some(Self::Unipolar1p5x),
            0b1011 => Some(Self::Unipolar1p25x),
            _ => None,
        }
    }

    pub const fn is_bipolar(self) -> bool {
        (self as u8) & 0b1000 == 0
    }

    /// Full-scale span (max - min) in microvolts.
    pub const fn span_uv(self) -> u32 {
        // Multipliers are in eighths of VREF.
        let eighths: u32 = match self {
            Self::Bipolar3x => 48,
            Self::Bipolar2p5x => 40,
            Self::Bipolar1p5x => 24,
            Self::Bipolar1p25x => 20,
            Self::Bipolar0p625x => 10,
            Self::Unipolar3x => 24,
            Self::Unipolar2p5x => 20,
            Self::Unipolar1p5x => 12,
            Self::Unipolar1p25x => 10,
        };
        VREF_UV / 8 * eighths
    }

    /// Convert a signed sample to microvolts at the input pin.
    pub fn sample_to_uv(self, sample: i16) -> i32 {
        let span = self.span_uv() as i64;
        let code = if self.is_bipolar() {
            sample as i64
        } else {
            // Unipolar ranges start at 0 V for raw code 0.
            sample as i64 + MIDSCALE as i64
        };
        (code * span / 65_536) as i32
    }
}

impl Default for InputRange {
    fn default() -> Self {
        Self::Bipolar1p25x
    }
}
