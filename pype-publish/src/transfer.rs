//! File-copy primitive used to materialise hero files.
//!
//! A hard link is tried first. Only when the filesystem cannot link the two
//! paths (different devices, or no link support) is the file copied byte
//! for byte. Any other OS error is fatal.

use std::io;
use std::path::Path;

use crate::error::{io_err, PublishError};

/// How a file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Hardlinked,
    Copied,
}

/// Puts a published file at its hero destination.
pub trait FileTransfer {
    fn transfer(&self, src: &Path, dst: &Path) -> Result<TransferMode, PublishError>;
}

/// Hard link with copy fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardlinkTransfer;

#[cfg(unix)]
fn cannot_link(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EXDEV || code == libc::ENOTSUP || code == libc::EOPNOTSUPP
    )
}

#[cfg(windows)]
fn cannot_link(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE, ERROR_NOT_SUPPORTED
    matches!(err.raw_os_error(), Some(17) | Some(50))
}

impl FileTransfer for HardlinkTransfer {
    fn transfer(&self, src: &Path, dst: &Path) -> Result<TransferMode, PublishError> {
        if let Some(dir) = dst.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        tracing::debug!("transferring {} to {}", src.display(), dst.display());
        match std::fs::hard_link(src, dst) {
            Ok(()) => Ok(TransferMode::Hardlinked),
            Err(err) if cannot_link(&err) => {
                tracing::debug!("hard link not possible ({err}), copying");
                std::fs::copy(src, dst).map_err(|source| PublishError::TransferFailed {
                    src: src.to_path_buf(),
                    dst: dst.to_path_buf(),
                    source,
                })?;
                Ok(TransferMode::Copied)
            }
            Err(source) => Err(PublishError::TransferFailed {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn links_into_new_directories() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.txt");
        std::fs::write(&src, "frame").unwrap();
        let dst = tmp.path().join("hero").join("nested").join("dst.txt");

        let mode = HardlinkTransfer.transfer(&src, &dst).unwrap();

        assert_eq!(mode, TransferMode::Hardlinked);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "frame");
    }

    #[test]
    fn existing_destination_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.txt");
        let dst = tmp.path().join("dst.txt");
        std::fs::write(&src, "a").unwrap();
        std::fs::write(&dst, "b").unwrap();

        let err = HardlinkTransfer.transfer(&src, &dst).unwrap_err();

        assert!(matches!(err, PublishError::TransferFailed { .. }));
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "b");
    }

    #[test]
    fn missing_source_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = HardlinkTransfer
            .transfer(&tmp.path().join("nope"), &tmp.path().join("dst"))
            .unwrap_err();
        assert!(matches!(err, PublishError::TransferFailed { .. }));
    }
}
