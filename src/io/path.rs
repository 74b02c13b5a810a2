use super::Errno;

/// Split `"/<device>/<remainder>"` into its device name and remainder.
///
/// The path needs a leading separator and a second one ending the device
/// name; everything after that is handed to the device verbatim.
pub fn split_path(path: &str) -> Result<(&str, &str), Errno> {
    let rest = path.strip_prefix('/').ok_or(Errno::EINVAL)?;
    rest.split_once('/').ok_or(Errno::EINVAL)
}
