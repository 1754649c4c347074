use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal harness errors.
///
/// `Argument` is a violated precondition on shapes, buffers or configuration;
/// `Backend` is a vendor call that returned a non-success status. Neither is
/// recoverable: callers propagate them up to the harness binary, which reports
/// the error and exits non-zero.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("{call} failed: {detail}")]
    Backend { call: &'static str, detail: String },
}

impl Error {
    pub fn argument(detail: impl Into<String>) -> Self {
        Error::Argument(detail.into())
    }

    pub fn backend(call: &'static str, detail: impl Into<String>) -> Self {
        Error::Backend {
            call,
            detail: detail.into(),
        }
    }
}

/// Precondition guard returning `Error::Argument` on failure.
macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::error::Error::argument(format!($($arg)*)));
        }
    };
}

pub(crate) use ensure_arg;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_name_the_precondition() {
        let err = Error::argument("shape has no dimensions");
        assert_eq!(err.to_string(), "invalid argument: shape has no dimensions");
    }

    #[test]
    fn backend_errors_name_the_call() {
        let err = Error::backend("hipMalloc", "out of memory");
        assert_eq!(err.to_string(), "hipMalloc failed: out of memory");
    }

    #[test]
    fn ensure_arg_returns_early_on_failure() {
        fn guarded(value: usize) -> Result<usize> {
            ensure_arg!(value > 0, "value must be positive, got {value}");
            Ok(value)
        }
        assert_eq!(guarded(3).unwrap(), 3);
        assert!(matches!(guarded(0), Err(Error::Argument(_))));
    }
}
