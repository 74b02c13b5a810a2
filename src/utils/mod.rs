/*
 * Utility Modules
 *
 * Support code shared by the rest of the crate.
 *
 * Structure:
 * - timer: tick counter, pluggable clock and timeouts
 * - writer: fixed-size format buffer that truncates
 * - macros: serial_printf!
 * - debug: `log` backend on the console serial port
 */

pub mod debug;
#[macro_use]
pub mod macros;
pub mod timer;
pub mod writer;
