use core::sync::atomic::{AtomicBool, Ordering};

use super::device::{Errno, OpenFlags};
use super::fd::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use super::posixio::Posixio;

/// Set once the standard streams are attached.
static STDIO_STARTED: AtomicBool = AtomicBool::new(false);

/// True once `attach` has succeeded.
pub fn is_started() -> bool {
    STDIO_STARTED.load(Ordering::Acquire)
}

/// Connect stdin, stdout and stderr to `console_path`.
///
/// Opens the path, duplicates it onto descriptors 0, 1 and 2, then closes
/// the temporary descriptor.
pub fn attach(posixio: &Posixio, console_path: &str) -> Result<(), Errno> {
    let fd = posixio.open(console_path, OpenFlags::RDWR)?;
    let mut result = Ok(());
    for target in [STDIN_FILENO, STDOUT_FILENO, STDERR_FILENO] {
        if let Err(e) = posixio.dup2(fd, target) {
            result = Err(e);
            break;
        }
    }
    posixio.close(fd)?;
    result?;

    STDIO_STARTED.store(true, Ordering::Release);
    log::info!("stdio: attached to {}", console_path);
    Ok(())
}
