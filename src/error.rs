//! Error types for uleds sessions and the LED registry

use thiserror::Error;

/// Errors surfaced by an LED registry while registering or driving a device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("an LED named {0:?} is already registered")]
    AlreadyExists(String),

    #[error("invalid LED descriptor: {0}")]
    Invalid(String),

    #[error("no LED named {0:?}")]
    NotFound(String),
}

/// Errors returned by a [`DeviceSession`](crate::DeviceSession) operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UledsError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("device is already configured")]
    AlreadyConfigured,

    #[error("device is not ready")]
    NotReady,

    #[error("operation would block")]
    WouldBlock,

    #[error("interrupted while waiting")]
    Interrupted,

    #[error("payload could not be transferred")]
    TransferFault,

    #[error("unknown control command 0x{0:08x}")]
    UnknownCommand(u32),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl UledsError {
    /// errno the character device would hand back for this error
    pub fn errno(&self) -> i32 {
        match self {
            UledsError::InvalidArgument => libc::EINVAL,
            UledsError::AlreadyConfigured => libc::EBUSY,
            UledsError::NotReady => libc::ENODEV,
            UledsError::WouldBlock => libc::EAGAIN,
            UledsError::Interrupted => libc::EINTR,
            UledsError::TransferFault => libc::EFAULT,
            UledsError::UnknownCommand(_) => libc::ENOTTY,
            UledsError::Registry(RegistryError::AlreadyExists(_)) => libc::EEXIST,
            UledsError::Registry(RegistryError::Invalid(_)) => libc::EINVAL,
            UledsError::Registry(RegistryError::NotFound(_)) => libc::ENOENT,
        }
    }
}

impl From<UledsError> for std::io::Error {
    fn from(e: UledsError) -> Self {
        std::io::Error::from_raw_os_error(e.errno())
    }
}

pub type Result<T, E = UledsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_pass_through() {
        let e: UledsError = RegistryError::AlreadyExists("a::b".into()).into();
        assert_eq!(e.to_string(), "an LED named \"a::b\" is already registered");
        assert_eq!(e.errno(), libc::EEXIST);
    }

    #[test]
    fn io_error_keeps_errno() {
        let io: std::io::Error = UledsError::WouldBlock.into();
        assert_eq!(io.raw_os_error(), Some(libc::EAGAIN));
        assert_eq!(io.kind(), std::io::ErrorKind::WouldBlock);
    }
}
