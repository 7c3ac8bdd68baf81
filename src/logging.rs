//! RT-safe logging.
//!
//! # Architecture
//!
//! ```text
//! Task / driver          LogStream            UART task
//! ─────────────          ─────────            ─────────
//!
//! rt_log!() ──────────▶ [L0][L1][L2] ──────▶ UART TX
//! non-blocking            lock-free           blocking ok
//!                         ring buffer         Core 1
//! ```
//!
//! # Rules
//!
//! - Interrupt handlers never log; they bump counters in [`crate::stats`].
//! - `println!` and `ESP_LOGx` are not used on the acquisition path.
//! - Messages are dropped (and counted) when the ring is full.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 120;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 256;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    pub timestamp_us: i64,
    pub level: LogLevel,
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: Self = Self {
        timestamp_us: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message as text (lossy on invalid UTF-8 cut by truncation).
    pub fn text(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct Slot {
    /// Sequence stamp: `== position` free for the producer claiming
    /// `position`, `== position + 1` holds an entry for the consumer.
    seq: AtomicU32,
    entry: UnsafeCell<LogEntry>,
}

/// Lock-free log stream: multiple producers, single consumer.
///
/// Each slot carries a sequence stamp, so a producer only claims a
/// position once it knows the slot is free, and the consumer only reads
/// slots whose write has completed.
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    slots: [Slot; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: slot payloads are only accessed by the producer that won the
// position via compare_exchange, then by the single consumer after the
// Release store of the sequence stamp.
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: u32 = N as u32 - 1;

    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        let mut slots = [const {
            Slot {
                seq: AtomicU32::new(0),
                entry: UnsafeCell::new(LogEntry::EMPTY),
            }
        }; N];
        let mut i = 0;
        while i < N {
            slots[i].seq = AtomicU32::new(i as u32);
            i += 1;
        }

        Self {
            slots,
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry (never blocks).
    ///
    /// Returns `false` if the ring was full and the message was dropped.
    #[inline]
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        let mut pos = self.write_idx.load(Ordering::Relaxed);
        let slot = loop {
            let slot = &self.slots[(pos & Self::MASK) as usize];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as i32;

            if diff == 0 {
                match self.write_idx.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break slot,
                    Err(actual) => pos = actual,
                }
            } else if diff < 0 {
                // Consumer has not released this slot yet.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                pos = self.write_idx.load(Ordering::Relaxed);
            }
        };

        let len = msg.len().min(MAX_MSG_LEN);
        // SAFETY: position `pos` is exclusively ours until the stamp below.
        unsafe {
            let entry = &mut *slot.entry.get();
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.len = len as u8;
            entry.msg[..len].copy_from_slice(&msg[..len]);
        }
        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
        true
    }

    /// Drain the next log entry (single consumer).
    #[inline]
    pub fn drain(&self) -> Option<LogEntry> {
        let pos = self.read_idx.load(Ordering::Relaxed);
        let slot = &self.slots[(pos & Self::MASK) as usize];
        if slot.seq.load(Ordering::Acquire) != pos.wrapping_add(1) {
            return None;
        }

        // SAFETY: the producer published this slot with the Release above.
        let entry = unsafe { *slot.entry.get() };

        slot.seq.store(pos.wrapping_add(N as u32), Ordering::Release);
        self.read_idx.store(pos.wrapping_add(1), Ordering::Relaxed);
        Some(entry)
    }

    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter after reporting.
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn has_entries(&self) -> bool {
        let pos = self.read_idx.load(Ordering::Relaxed);
        self.slots[(pos & Self::MASK) as usize].seq.load(Ordering::Acquire) == pos.wrapping_add(1)
    }

    /// Entries claimed but not yet drained (including ones being written).
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncating `fmt::Write` over a byte slice.
pub struct BufWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BufWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }
}

impl core::fmt::Write for BufWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let to_write = bytes.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
        self.pos += to_write;
        Ok(())
    }
}

/// Format a message into a buffer, truncating.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    let mut writer = BufWriter::new(buf);
    let _ = core::fmt::write(&mut writer, args);
    writer.len()
}

/// Microseconds since boot.
#[cfg(target_os = "espidf")]
#[inline]
pub fn timestamp_us() -> i64 {
    // SAFETY: reads the esp_timer counter, callable from any task.
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

#[cfg(not(target_os = "espidf"))]
#[inline]
pub fn timestamp_us() -> i64 {
    0
}

/// RT-safe log macro.
///
/// ```ignore
/// rt_log!(LogLevel::Info, ACQ_LOG_STREAM, timestamp_us(), "rate {} Hz", hz);
/// ```
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $stream:expr, $timestamp:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $stream.push($timestamp, $level, &buf[..len]);
    }};
}

#[macro_export]
macro_rules! rt_info {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_warn {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_error {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Error, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_debug {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_trace {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Trace, $stream, $timestamp, $($arg)*)
    };
}

/// Log stream for the current core.
///
/// - Core 0 → ACQ_LOG_STREAM (driver, stream lifecycle)
/// - Core 1 → NET_LOG_STREAM (forwarding, network)
#[cfg(target_os = "espidf")]
#[inline]
pub fn current_log_stream() -> &'static LogStream {
    // SAFETY: xTaskGetCoreID is always safe to call
    unsafe {
        let task = esp_idf_svc::sys::xTaskGetCurrentTaskHandle();
        if esp_idf_svc::sys::xTaskGetCoreID(task) == 0 {
            &crate::ACQ_LOG_STREAM
        } else {
            &crate::NET_LOG_STREAM
        }
    }
}

#[cfg(not(target_os = "espidf"))]
#[inline]
pub fn current_log_stream() -> &'static LogStream {
    &crate::ACQ_LOG_STREAM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, b"test message"));
        assert!(stream.has_entries());
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.text(), "test message");

        assert!(!stream.has_entries());
        assert!(stream.drain().is_none());
    }

    #[test]
    fn test_full_stream_drops_without_claiming() {
        let stream = LogStream::<4>::new();

        for i in 0..4 {
            assert!(stream.push(i, LogLevel::Info, b"x"));
        }
        assert!(!stream.push(5, LogLevel::Info, b"5"));
        assert!(!stream.push(6, LogLevel::Info, b"6"));
        assert_eq!(stream.dropped(), 2);
        assert_eq!(stream.pending(), 4);

        assert_eq!(stream.drain().unwrap().timestamp_us, 0);
        assert!(stream.push(7, LogLevel::Info, b"7"));

        let rest: std::vec::Vec<i64> =
            core::iter::from_fn(|| stream.drain()).map(|e| e.timestamp_us).collect();
        assert_eq!(rest, [1, 2, 3, 7]);
    }

    #[test]
    fn test_long_message_truncated() {
        let stream = LogStream::<4>::new();
        let long = [b'a'; 200];
        stream.push(0, LogLevel::Warn, &long);
        assert_eq!(stream.drain().unwrap().len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("Hello {}", 42));
        assert_eq!(&buf[..len], b"Hello 42");

        let mut small = [0u8; 4];
        let len = format_to_buffer(&mut small, format_args!("truncated"));
        assert_eq!(&small[..len], b"trun");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_concurrent_producers_keep_every_accepted_message() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<64>::new());
        let accepted = Arc::new(AtomicUsize::new(0));
        let handles: std::vec::Vec<_> = (0..4)
            .map(|i| {
                let stream = Arc::clone(&stream);
                let accepted = Arc::clone(&accepted);
                thread::spawn(move || {
                    for j in 0..10 {
                        let msg = std::format!("Thread {} msg {}", i, j);
                        if stream.push(j, LogLevel::Info, msg.as_bytes()) {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while let Some(entry) = stream.drain() {
            assert!(entry.text().starts_with("Thread "));
            count += 1;
        }
        assert_eq!(count, 40);
        assert_eq!(accepted.load(Ordering::Relaxed), 40);
    }
}
