/// Categories of errors for classification and handling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration, needs user fix
    Configuration,

    /// Invalid input, user error
    Validation,

    /// Credentials missing, expired or rejected
    Authentication,

    /// Resource missing
    NotFound,

    /// The backend rejected the request for good
    Rejected,

    /// Network/IO errors, throttling, retry possible
    Temporary,

    /// Bugs, system errors
    Internal,
}

impl ErrorKind {
    /// Whether this error is retryable.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Temporary)
    }

    /// Standard exit code for this error category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 78,  // EX_CONFIG
            Self::Validation => 64,     // EX_USAGE
            Self::Temporary => 75,      // EX_TEMPFAIL
            Self::NotFound => 66,       // EX_NOINPUT
            Self::Authentication => 77, // EX_NOPERM
            _ => 70,                    // EX_SOFTWARE
        }
    }
}
