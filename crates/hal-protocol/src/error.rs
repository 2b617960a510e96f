//! HAL Error Types

use thiserror::Error;

/// Status code for success at the ABI surface
pub const OK: i32 = 0;

/// Errors surfaced by the camera HAL shim
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Invalid or released handle, malformed parameter blob
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Camera id outside the platform-reported range
    #[error("Camera id {id} out of range (cameras available: {count})")]
    OutOfRange { id: i32, count: i32 },

    /// A session already exists for this camera id
    #[error("Camera {0} is already open")]
    AlreadyOpen(i32),

    /// Session table capacity reached
    #[error("Maximum number of open cameras reached ({0})")]
    ResourceExhausted(usize),

    /// Allocation of a session, op table or driver instance failed
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Vendor driver returned a negative status for a delegated call
    #[error("Driver rejected call with status {0}")]
    DriverRejected(i32),

    /// Deliberately unimplemented operation
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),
}

impl HalError {
    /// Negative errno value reported to the consumer for this error.
    ///
    /// Driver statuses are passed through unchanged.
    pub fn status(&self) -> i32 {
        match self {
            HalError::InvalidArgument(_) | HalError::OutOfRange { .. } => -libc::EINVAL,
            HalError::AlreadyOpen(_) => -libc::EBUSY,
            HalError::ResourceExhausted(_) => -libc::EUSERS,
            HalError::OutOfMemory(_) => -libc::ENOMEM,
            HalError::DriverRejected(code) => *code,
            HalError::NotSupported(_) => -libc::ENOSYS,
        }
    }

    /// Shorthand for the released/invalid handle error
    pub fn invalid(what: impl Into<String>) -> Self {
        HalError::InvalidArgument(what.into())
    }
}

/// Convert a raw driver status into a result, keeping the code intact.
///
/// Positive values are treated as success, matching drivers that return a
/// count or boolean on the success path.
pub fn check_status(code: i32) -> Result<(), HalError> {
    if code < 0 {
        Err(HalError::DriverRejected(code))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HalError::invalid("released").status(), -libc::EINVAL);
        assert_eq!(HalError::OutOfRange { id: 7, count: 2 }.status(), -libc::EINVAL);
        assert_eq!(HalError::AlreadyOpen(0).status(), -libc::EBUSY);
        assert_eq!(HalError::ResourceExhausted(2).status(), -libc::EUSERS);
        assert_eq!(HalError::OutOfMemory("driver".into()).status(), -libc::ENOMEM);
        assert_eq!(HalError::NotSupported("meta data").status(), -libc::ENOSYS);
    }

    #[test]
    fn test_driver_status_passthrough() {
        assert_eq!(check_status(0), Ok(()));
        assert_eq!(check_status(1), Ok(()));
        let err = check_status(-32).unwrap_err();
        assert_eq!(err, HalError::DriverRejected(-32));
        assert_eq!(err.status(), -32);
    }
}
