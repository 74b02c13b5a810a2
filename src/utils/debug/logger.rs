/*
 * Console Logging System
 *
 * This module implements the `log` backend of the I/O core. Every
 * `log::info!` and friends in the crate ends up here and is printed to the
 * console serial port as `[LEVEL] message\r\n`.
 *
 * Why this is important:
 * - Makes driver start-up and descriptor lifecycle visible on the wire
 * - `board::start` brings the console port up before installing the
 *   logger; until the stdio streams are attached, lines are sent by polling
 *   the data register
 * - A line for a port that was never started is dropped: an unclocked USART
 *   never reports an empty data register, so polling it would hang
 * - Once stdio is up, lines go through the driver so they never tear a
 *   transfer another task has in flight; a line that cannot get the port
 *   within `LOG_WRITE_TIMEOUT_TICKS` is dropped rather than stalling the
 *   caller
 *
 * Interrupt handlers never log.
 */

use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};
use spin::Once;

use crate::config::LOG_WRITE_TIMEOUT_TICKS;
use crate::drivers::serial::SerialPort;
use crate::io::stdio;
use crate::utils::timer::Timeout;
use crate::utils::writer::FmtBuffer;

/// Longest log line sent; longer lines are cut.
const LOG_LINE_SIZE: usize = 128;

/// Logger printing to the console port.
struct ConsoleLogger {
    port: Once<&'static SerialPort>,
}

impl ConsoleLogger {
    fn emit(&self, port: &SerialPort, line: &[u8]) {
        if !port.is_started() {
            return;
        }
        if stdio::is_started() {
            // Dropped if the port stays busy
            let _ = port.write_timeout(line, Timeout::Ticks(LOG_WRITE_TIMEOUT_TICKS));
        } else {
            port.write_polled(line);
        }
    }
}

impl log::Log for ConsoleLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    /// Logs the record by printing it to the console port.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(port) = self.port.get() {
            let line = format_line(record.level(), record.args());
            self.emit(port, line.as_bytes());
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The logger instance used for logging.
static LOGGER: ConsoleLogger = ConsoleLogger { port: Once::new() };

/// Render one log line, cut so the line ending always fits.
fn format_line(level: Level, args: &core::fmt::Arguments<'_>) -> FmtBuffer<LOG_LINE_SIZE> {
    let mut body: FmtBuffer<{ LOG_LINE_SIZE - 2 }> = FmtBuffer::new();
    // FmtBuffer never fails, it truncates
    let _ = write!(body, "[{}] {}", level, args);
    let mut line = FmtBuffer::new();
    line.push_bytes(body.as_bytes());
    line.push_bytes(b"\r\n");
    line
}

/// Install the console logger on `port`.
///
/// Lines are printed at `Info` and above. Fails if a logger is already
/// installed.
pub fn init(port: &'static SerialPort) -> Result<(), log::SetLoggerError> {
    LOGGER.port.call_once(|| port);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info))?;
    log::info!("Logger initialized on {:?}", port.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use log::Log;

    use crate::drivers::serial::PortId;
    use crate::tests::mock::{Board, MockUsart, leak};

    fn log_info(logger: &ConsoleLogger, message: &str) {
        logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(Level::Info)
                .build(),
        );
    }

    #[test]
    fn unstarted_console_drops_lines() {
        let usart = leak(MockUsart::unclocked());
        let port = leak(SerialPort::new(PortId::Usart1, usart, None));
        usart.attach(port);
        let logger = ConsoleLogger {
            port: Once::initialized(port),
        };

        // Returns although TXE never sets
        log_info(&logger, "too early");
        assert!(usart.take_wire().is_empty());
    }

    #[test]
    fn started_console_prints_lines() {
        let board = Board::new();
        let port = board.started_port(PortId::Usart2, false, 9600);
        let logger = ConsoleLogger {
            port: Once::initialized(port),
        };

        log_info(&logger, "up");
        assert_eq!(board.usart(PortId::Usart2).take_wire(), b"[INFO] up\r\n");
    }

    #[test]
    fn lines_carry_level_and_crlf() {
        let line = format_line(Level::Warn, &format_args!("port {}", 3));
        assert_eq!(line.as_bytes(), b"[WARN] port 3\r\n");
    }

    #[test]
    fn long_lines_keep_their_ending() {
        let long: String = core::iter::repeat('x').take(300).collect();
        let line = format_line(Level::Info, &format_args!("{}", long));
        assert_eq!(line.len(), LOG_LINE_SIZE);
        assert!(line.as_bytes().ends_with(b"x\r\n"));
    }
}
