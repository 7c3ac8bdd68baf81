//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;

use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};

use ads8689_stream::forward::Transport;

#[derive(Debug)]
pub struct FakeSpiError(pub ErrorKind);

impl spi::Error for FakeSpiError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Records every MOSI transaction and answers with scripted MISO bytes.
#[derive(Default)]
pub struct FakeSpi {
    pub transactions: Vec<Vec<u8>>,
    pub responses: VecDeque<Vec<u8>>,
    pub fail: Option<ErrorKind>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the MISO bytes of the next transaction (zero-padded).
    pub fn respond(mut self, miso: &[u8]) -> Self {
        self.responses.push_back(miso.to_vec());
        self
    }
}

impl ErrorType for FakeSpi {
    type Error = FakeSpiError;
}

impl SpiDevice for FakeSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), FakeSpiError> {
        if let Some(kind) = self.fail {
            return Err(FakeSpiError(kind));
        }
        let miso = self.responses.pop_front().unwrap_or_default();
        let mut mosi = Vec::new();
        for op in operations.iter_mut() {
            match op {
                Operation::Transfer(read, write) => {
                    mosi.extend_from_slice(write);
                    for (i, b) in read.iter_mut().enumerate() {
                        *b = miso.get(i).copied().unwrap_or(0);
                    }
                }
                Operation::Write(write) => mosi.extend_from_slice(write),
                Operation::TransferInPlace(buf) => {
                    mosi.extend_from_slice(buf);
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = miso.get(i).copied().unwrap_or(0);
                    }
                }
                Operation::Read(read) => {
                    for (i, b) in read.iter_mut().enumerate() {
                        *b = miso.get(i).copied().unwrap_or(0);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        self.transactions.push(mosi);
        Ok(())
    }
}

/// Transport that follows a script of accept/reject answers, then accepts.
#[derive(Default)]
pub struct ScriptedTransport {
    pub script: VecDeque<bool>,
    pub received: Vec<u8>,
    pub calls: usize,
}

impl ScriptedTransport {
    pub fn rejecting(n: usize) -> Self {
        Self {
            script: std::iter::repeat(false).take(n).collect(),
            ..Self::default()
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, bytes: &[u8]) -> bool {
        self.calls += 1;
        let accept = self.script.pop_front().unwrap_or(true);
        if accept {
            self.received.extend_from_slice(bytes);
        }
        accept
    }
}

/// Decode the little-endian wire format back into samples.
pub fn decode_wire(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}
