/// Formatted write to a `SerialPort` through its 64 byte buffer
#[macro_export]
macro_rules! serial_printf {
    ($port:expr, $($arg:tt)*) => (
        $crate::drivers::serial::SerialPort::write_fmt($port, format_args!($($arg)*))
    );
}
