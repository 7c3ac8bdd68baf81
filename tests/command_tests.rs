//! Command frame layout and sample decoding.

use ads8689_stream::command::{
    decode_signed, encode, raw_from_wire, CommandFrame, InputRange, Opcode, Register, FRAME_LEN,
};

#[test]
fn test_frame_layout_every_opcode() {
    let opcodes = [
        (Opcode::Nop, 0x00),
        (Opcode::Clear, 0xC0),
        (Opcode::ReadHalfword, 0xC8),
        (Opcode::Read, 0x48),
        (Opcode::WriteFull, 0xD0),
        (Opcode::WriteMostSignificant, 0xD2),
        (Opcode::WriteLeastSignificant, 0xD4),
        (Opcode::SetHalfword, 0xD8),
    ];
    for (opcode, first) in opcodes {
        let frame = encode(opcode, Register::AlarmLowThreshold, 0xBEEF);
        assert_eq!(frame, [first, 0x28, 0xBE, 0xEF], "{:?}", opcode);
    }
}

#[test]
fn test_frame_address_byte_every_register() {
    let registers = [
        (Register::DeviceId, 0x00),
        (Register::ResetPowerControl, 0x04),
        (Register::InputConfig, 0x08),
        (Register::OutputConfig, 0x0C),
        (Register::DataOutputConfig, 0x10),
        (Register::RangeSelect, 0x14),
        (Register::Alarm, 0x20),
        (Register::AlarmHighThreshold, 0x24),
        (Register::AlarmLowThreshold, 0x28),
    ];
    for (register, addr) in registers {
        let frame = CommandFrame::encode(Opcode::ReadHalfword, register, 0);
        assert_eq!(frame.as_bytes()[1], addr);
        // Address bit 8 never set on this register map.
        assert_eq!(frame.as_bytes()[0] & 1, 0);
    }
}

#[test]
fn test_range_select_frame() {
    let frame = encode(
        Opcode::WriteLeastSignificant,
        Register::RangeSelect,
        InputRange::Bipolar1p25x.bits() as u16,
    );
    assert_eq!(frame, [0xD4, 0x14, 0x00, 0x03]);
}

#[test]
fn test_nop_frame_is_zero() {
    assert_eq!(CommandFrame::NOP.as_bytes(), &[0u8; FRAME_LEN]);
    assert_eq!(CommandFrame::transaction_bits(0), 32);
    assert_eq!(CommandFrame::transaction_bits(2), 48);
}

#[test]
fn test_decode_signed_endpoints() {
    assert_eq!(decode_signed(0x0000), -32768);
    assert_eq!(decode_signed(0x8000), 0);
    assert_eq!(decode_signed(0xFFFF), 32767);
    assert_eq!(decode_signed(0x8001), 1);
    assert_eq!(decode_signed(0x7FFF), -1);
}

#[test]
fn test_raw_from_wire_is_msb_first() {
    assert_eq!(raw_from_wire([0x12, 0x34]), 0x1234);
    assert_eq!(decode_signed(raw_from_wire([0x80, 0x00])), 0);
}

#[test]
fn test_range_bits_roundtrip_and_span() {
    for bits in 0u8..16 {
        if let Some(range) = InputRange::from_bits(bits) {
            assert_eq!(range.bits(), bits);
            assert_eq!(range.is_bipolar(), bits & 0b1000 == 0);
        }
    }
    assert_eq!(InputRange::from_bits(0b0101), None);
    assert_eq!(InputRange::Bipolar3x.span_uv(), 24_576_000);
    assert_eq!(InputRange::Bipolar1p25x.sample_to_uv(0), 0);
    assert_eq!(InputRange::Unipolar1p25x.sample_to_uv(-32768), 0);
}
