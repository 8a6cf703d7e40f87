use core::fmt;

use crate::SecurityMode;

/// Reason a MAC block read was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Corruption {
    /// The echoed address differs from the requested one.
    AddressMismatch,
    /// The checksum byte does not match the returned address and data.
    ChecksumMismatch,
    /// The length byte is outside of the 4..=36 window.
    InvalidLength,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoFailure {
    /// FLASHF was set after a data flash write.
    FlashWriteRejected,
    /// The security field did not reach the requested mode.
    SecurityVerification,
}

/// Payload-free classification of [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    Transport,
    InvalidArgument,
    InvalidState,
    PermissionDenied,
    DataCorruption(Corruption),
    Io(IoFailure),
    Timeout,
    DeviceNotReady,
    Unsupported,
    RestoreFailed,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus-level failure. Never retried by the driver.
    Transport(E),
    /// Address, length or property value out of range.
    InvalidArgument,
    /// Illegal security mode transition, or the session is not initialized.
    InvalidState,
    /// The chip could not be unsealed for an operation that needs it.
    PermissionDenied,
    DataCorruption(Corruption),
    Io(IoFailure),
    /// A status condition was not reached within the retry budget.
    Timeout,
    /// Session bring-up failed.
    DeviceNotReady,
    /// The property is not handled by this chip.
    Unsupported,
    /// Returning to `mode` after an operation failed.
    ///
    /// `primary` is the outcome of the operation itself, `None` if it succeeded.
    RestoreFailed {
        mode: SecurityMode,
        primary: Option<ErrorKind>,
        restore: ErrorKind,
    },
}

impl<E> Error<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::InvalidArgument => ErrorKind::InvalidArgument,
            Error::InvalidState => ErrorKind::InvalidState,
            Error::PermissionDenied => ErrorKind::PermissionDenied,
            Error::DataCorruption(c) => ErrorKind::DataCorruption(*c),
            Error::Io(failure) => ErrorKind::Io(*failure),
            Error::Timeout => ErrorKind::Timeout,
            Error::DeviceNotReady => ErrorKind::DeviceNotReady,
            Error::Unsupported => ErrorKind::Unsupported,
            Error::RestoreFailed { .. } => ErrorKind::RestoreFailed,
        }
    }

    /// Returns `true` for bus errors, which may succeed when repeated by the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Corruption::AddressMismatch => "address mismatch",
            Corruption::ChecksumMismatch => "checksum mismatch",
            Corruption::InvalidLength => "invalid length",
        })
    }
}

impl fmt::Display for IoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoFailure::FlashWriteRejected => "flash write rejected",
            IoFailure::SecurityVerification => "security mode verification failed",
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => f.write_str("transport error"),
            ErrorKind::InvalidArgument => f.write_str("invalid argument"),
            ErrorKind::InvalidState => f.write_str("invalid state"),
            ErrorKind::PermissionDenied => f.write_str("permission denied"),
            ErrorKind::DataCorruption(c) => write!(f, "data corruption: {c}"),
            ErrorKind::Io(failure) => write!(f, "I/O error: {failure}"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::DeviceNotReady => f.write_str("device not ready"),
            ErrorKind::Unsupported => f.write_str("unsupported"),
            ErrorKind::RestoreFailed => f.write_str("security mode restore failed"),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e:?}"),
            Error::RestoreFailed {
                mode,
                primary: Some(primary),
                restore,
            } => write!(f, "{primary}, then restoring {mode:?} failed: {restore}"),
            Error::RestoreFailed {
                mode,
                primary: None,
                restore,
            } => write!(f, "restoring {mode:?} failed: {restore}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_drops_payload() {
        let error: Error<()> = Error::DataCorruption(Corruption::ChecksumMismatch);
        assert_eq!(
            error.kind(),
            ErrorKind::DataCorruption(Corruption::ChecksumMismatch)
        );
        assert!(!error.is_transport());
        assert!(Error::Transport(()).is_transport());
    }

    #[test]
    fn restore_failure_reports_both_errors() {
        let error: Error<()> = Error::RestoreFailed {
            mode: SecurityMode::Sealed,
            primary: Some(ErrorKind::Io(IoFailure::FlashWriteRejected)),
            restore: ErrorKind::Transport,
        };

        assert_eq!(
            format!("{error}"),
            "I/O error: flash write rejected, then restoring Sealed failed: transport error"
        );
    }
}
