use std::fmt;

/// Failure reported by a native windowing or GL call.
///
/// `code` is the platform's last-error value at the time of the failure
/// (`GetLastError` on Win32, `0` where the platform has none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: i64,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (error code {})", self.message, self.code)
    }
}

impl std::error::Error for NativeError {}

/// Construction failures of a [`GraphicsSurface`](crate::GraphicsSurface).
///
/// Every variant names the negotiation stage that failed and carries the
/// platform error code. None of them are retryable: the surface either comes
/// up fully or not at all.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("no compatible pixel format or visual found: {message} (error code {code})")]
    NoPixelFormat { code: i64, message: String },
    #[error("failed to assign pixel format to drawable: {message} (error code {code})")]
    PixelFormatAssignment { code: i64, message: String },
    #[error("failed to create rendering context: {message} (error code {code})")]
    ContextCreation { code: i64, message: String },
    #[error("failed to share context resources: {message} (error code {code})")]
    ContextSharing { code: i64, message: String },
    #[error("failed to prepare drawable: {message} (error code {code})")]
    Drawable { code: i64, message: String },
    #[error("backend rejected request: {message} (error code {code})")]
    Backend { code: i64, message: String },
}

impl SurfaceError {
    /// Platform error code attached to the failure.
    pub fn code(&self) -> i64 {
        match self {
            SurfaceError::NoPixelFormat { code, .. }
            | SurfaceError::PixelFormatAssignment { code, .. }
            | SurfaceError::ContextCreation { code, .. }
            | SurfaceError::ContextSharing { code, .. }
            | SurfaceError::Drawable { code, .. }
            | SurfaceError::Backend { code, .. } => *code,
        }
    }

    pub(crate) fn pixel_format_assignment(err: NativeError) -> Self {
        SurfaceError::PixelFormatAssignment {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn context_creation(err: NativeError) -> Self {
        SurfaceError::ContextCreation {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn context_sharing(err: NativeError) -> Self {
        SurfaceError::ContextSharing {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn drawable(err: NativeError) -> Self {
        SurfaceError::Drawable {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn backend(err: NativeError) -> Self {
        SurfaceError::Backend {
            code: err.code,
            message: err.message,
        }
    }
}
