//! UART log output.
//!
//! Drains both log streams and writes `[timestamp] LEVEL: message` lines
//! to a TX-only UART. Needs an external USB-UART adapter on the TX pin.
//!
//! ```text
//! ESP32 GPIO17 (UART1 TX) ──────▶ USB-UART RX ──▶ PC serial monitor
//! ```

use core::fmt::Write;

use crate::logging::{BufWriter, LogEntry, LogStream};

#[cfg(target_os = "espidf")]
use crate::{ACQ_LOG_STREAM, NET_LOG_STREAM};
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::gpio;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::peripheral::Peripheral;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::uart::{self, UartTxDriver};

/// Interval between dropped-message reports.
pub const DROPPED_REPORT_INTERVAL_US: i64 = 10_000_000;

/// Formatted line buffer size.
pub const LINE_LEN: usize = 256;

pub struct UartLoggerConfig {
    pub baud_rate: u32,
    pub tx_pin: u8,
}

impl Default for UartLoggerConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            tx_pin: 17,
        }
    }
}

/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut writer = BufWriter::new(buf);
    let _ = writeln!(
        writer,
        "[{:10}] {}: {}",
        entry.timestamp_us,
        entry.level.as_str(),
        entry.text()
    );
    writer.len()
}

/// Drain every entry of `streams` in order, handing each formatted line
/// to `sink`. Returns the number of lines written.
pub fn drain_streams<const N: usize>(
    streams: &[&LogStream<N>],
    mut sink: impl FnMut(&[u8]),
) -> usize {
    let mut line = [0u8; LINE_LEN];
    let mut lines = 0;
    for stream in streams {
        while let Some(entry) = stream.drain() {
            let len = format_log_entry(&entry, &mut line);
            sink(&line[..len]);
            lines += 1;
        }
    }
    lines
}

/// Format the dropped-message report and reset the counters.
///
/// Returns 0 (nothing to report) when no stream dropped anything.
pub fn format_dropped_report(acq: &LogStream, net: &LogStream, buf: &mut [u8]) -> usize {
    let (acq_dropped, net_dropped) = (acq.dropped(), net.dropped());
    if acq_dropped == 0 && net_dropped == 0 {
        return 0;
    }
    acq.reset_dropped();
    net.reset_dropped();

    let mut writer = BufWriter::new(buf);
    let _ = writeln!(writer, "[WARN] Dropped: ACQ={}, NET={}", acq_dropped, net_dropped);
    writer.len()
}

/// Initialize UART1 TX-only for logging output.
#[cfg(target_os = "espidf")]
pub fn init_uart_logger<'d>(
    uart: impl Peripheral<P = uart::UART1> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
    config: &UartLoggerConfig,
) -> Result<UartTxDriver<'d>, esp_idf_svc::sys::EspError> {
    let uart_config =
        uart::config::Config::default().baudrate(esp_idf_svc::hal::units::Hertz(config.baud_rate));

    UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None, // CTS
        Option::<gpio::AnyIOPin>::None, // RTS
        &uart_config,
    )
}

/// UART log consumer task (runs on Core 1).
#[cfg(target_os = "espidf")]
pub fn uart_logger_task(uart: &mut UartTxDriver<'_>) -> ! {
    let mut last_dropped_report = 0i64;
    let mut report = [0u8; 64];

    loop {
        // Acquisition stream first.
        let lines = drain_streams(&[&ACQ_LOG_STREAM, &NET_LOG_STREAM], |line| {
            let _ = uart.write(line);
        });

        let now = crate::logging::timestamp_us();
        if now - last_dropped_report > DROPPED_REPORT_INTERVAL_US {
            let len = format_dropped_report(&ACQ_LOG_STREAM, &NET_LOG_STREAM, &mut report);
            if len > 0 {
                let _ = uart.write(&report[..len]);
            }
            last_dropped_report = now;
        }

        if lines == 0 {
            esp_idf_svc::hal::delay::FreeRtos::delay_ms(10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_format_log_entry() {
        let mut msg = [0u8; 120];
        msg[..11].copy_from_slice(b"Hello world");
        let entry = LogEntry { timestamp_us: 1234567, level: LogLevel::Info, len: 11, msg };

        let mut buf = [0u8; LINE_LEN];
        let len = format_log_entry(&entry, &mut buf);

        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(formatted, "[   1234567] INFO: Hello world\n");
    }

    #[test]
    fn test_drain_streams_in_order() {
        let acq = LogStream::<8>::new();
        let net = LogStream::<8>::new();
        net.push(2, LogLevel::Warn, b"net");
        acq.push(1, LogLevel::Error, b"acq");

        let mut out = std::vec::Vec::new();
        let lines = drain_streams(&[&acq, &net], |line| out.push(std::string::String::from_utf8_lossy(line).into_owned()));
        assert_eq!(lines, 2);
        assert!(out[0].contains("ERROR: acq"));
        assert!(out[1].contains("WARN: net"));
        assert_eq!(drain_streams(&[&acq, &net], |_| {}), 0);
    }

    #[test]
    fn test_dropped_report_resets() {
        let acq = LogStream::new();
        let net = LogStream::new();
        let mut buf = [0u8; 64];
        assert_eq!(format_dropped_report(&acq, &net, &mut buf), 0);

        for _ in 0..300 {
            net.push(0, LogLevel::Info, b"x");
        }
        let len = format_dropped_report(&acq, &net, &mut buf);
        assert_eq!(&buf[..len], b"[WARN] Dropped: ACQ=0, NET=44\n");
        assert_eq!(net.dropped(), 0);
    }
}
