//! Command channel transactions against a recording SPI double.

mod common;

use embedded_hal::spi::ErrorKind;

use ads8689_stream::channel::{CommandChannel, MAX_READ_LEN, MAX_TRANSACTION_LEN};
use ads8689_stream::command::{InputRange, Opcode, Register};
use ads8689_stream::error::TransportError;

use common::FakeSpi;

#[test]
fn test_transmit_without_read() {
    let mut channel = CommandChannel::new(FakeSpi::new());
    let rx = channel
        .transmit(Opcode::WriteFull, Register::Alarm, 0x0102, 0)
        .unwrap();
    assert!(rx.is_empty());
    assert_eq!(channel.spi().transactions, vec![vec![0xD0, 0x20, 0x01, 0x02]]);
}

#[test]
fn test_transmit_pads_and_returns_read_len_bytes() {
    let spi = FakeSpi::new().respond(&[0xAB, 0xCD, 0x11, 0x22, 0x33, 0x44]);
    let mut channel = CommandChannel::new(spi);

    let rx = channel
        .transmit(Opcode::Read, Register::DeviceId, 0, 2)
        .unwrap()
        .to_vec();
    assert_eq!(rx, [0xAB, 0xCD]);
    assert_eq!(
        channel.spi().transactions[0],
        [0x48, 0x00, 0x00, 0x00, 0xFF, 0xFF]
    );
}

#[test]
fn test_transmit_rejects_oversized_read() {
    let mut channel = CommandChannel::new(FakeSpi::new());
    let err = channel
        .transmit(Opcode::Read, Register::DeviceId, 0, MAX_READ_LEN + 1)
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::ReadTooLong {
            requested: MAX_READ_LEN + 1,
            max: MAX_READ_LEN
        }
    );
    // Nothing went out on the bus.
    assert!(channel.spi().transactions.is_empty());

    assert!(channel
        .transmit(Opcode::Read, Register::DeviceId, 0, MAX_READ_LEN)
        .is_ok());
}

#[test]
fn test_longest_read_fits_register_buffer() {
    // The bus runs without DMA, so nothing may exceed the 64-byte W0..W15 window.
    assert_eq!(MAX_TRANSACTION_LEN, 64);
    assert_eq!(MAX_READ_LEN, 60);

    let mut channel = CommandChannel::new(FakeSpi::new());
    let rx_len = channel
        .transmit(Opcode::Read, Register::DeviceId, 0, MAX_READ_LEN)
        .unwrap()
        .len();
    assert_eq!(rx_len, MAX_READ_LEN);
    assert_eq!(channel.spi().transactions[0].len(), MAX_TRANSACTION_LEN);
    assert!(channel
        .transmit(Opcode::Read, Register::DeviceId, 0, 61)
        .is_err());
}

#[test]
fn test_spi_failure_maps_to_transport_error() {
    let mut spi = FakeSpi::new();
    spi.fail = Some(ErrorKind::ModeFault);
    let mut channel = CommandChannel::new(spi);

    let err = channel
        .transmit(Opcode::Nop, Register::DeviceId, 0, 0)
        .unwrap_err();
    assert_eq!(err, TransportError::Spi(ErrorKind::ModeFault));
    assert_eq!(err.code(), "T01");
}

#[test]
fn test_read_register_clocks_answer_with_nop() {
    let spi = FakeSpi::new().respond(&[]).respond(&[0x04, 0x02, 0, 0, 0, 0]);
    let mut channel = CommandChannel::new(spi);

    assert_eq!(channel.read_device_id().unwrap(), 0x0402);
    let sent = &channel.spi().transactions;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], [0xC8, 0x00, 0x00, 0x00]);
    assert_eq!(sent[1], [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]);
}

#[test]
fn test_select_range_frame() {
    let mut channel = CommandChannel::new(FakeSpi::new());
    channel.select_range(InputRange::Bipolar1p25x).unwrap();
    channel.select_range(InputRange::Unipolar3x).unwrap();

    let spi = channel.release();
    assert_eq!(spi.transactions[0], [0xD4, 0x14, 0x00, 0x03]);
    assert_eq!(spi.transactions[1], [0xD4, 0x14, 0x00, 0x08]);
}
