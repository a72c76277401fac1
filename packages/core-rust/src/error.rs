//! Error taxonomy for registry operations.
//!
//! Every variant is a caller-visible precondition violation and is returned
//! synchronously from the call that caused it. Failures raised *inside* a
//! factory are never represented here; they are absorbed at the invocation
//! boundary.

/// Errors returned by registry catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A mode definition conflicts with an existing one, or a descriptor
    /// does not fit the modes it claims to support.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No mode with this name is defined in the registry.
    #[error("unknown registry mode: {mode}")]
    UnknownMode { mode: String },

    /// No descriptor declares the operation valid for the mode.
    #[error("no descriptor registered for operation \"{operation}\" in mode \"{mode}\"")]
    UnknownOperation { mode: String, operation: String },

    /// A required argument is missing or has the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The factory (or descriptor) is not registered under the given key.
    #[error("{what} is not registered under mode \"{mode}\", operation \"{operation}\"{}", namespace_suffix(.namespace.as_deref()))]
    NotRegistered {
        what: String,
        mode: String,
        operation: String,
        namespace: Option<String>,
    },

    /// A preference could not be recorded.
    #[error("invalid preference: {0}")]
    InvalidPreference(String),
}

fn namespace_suffix(namespace: Option<&str>) -> String {
    namespace.map_or_else(String::new, |ns| format!(", product \"{ns}\""))
}

impl RegistryError {
    /// Shorthand for [`RegistryError::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`RegistryError::InvalidPreference`].
    #[must_use]
    pub fn invalid_preference(msg: impl Into<String>) -> Self {
        Self::InvalidPreference(msg.into())
    }
}

/// Result alias used across the registry crates.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_message_includes_namespace_when_present() {
        let err = RegistryError::NotRegistered {
            what: "factory SharpBlur".to_string(),
            mode: "rendered".to_string(),
            operation: "Blur".to_string(),
            namespace: Some("com.vendor".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "factory SharpBlur is not registered under mode \"rendered\", \
             operation \"Blur\", product \"com.vendor\""
        );
    }

    #[test]
    fn not_registered_message_without_namespace() {
        let err = RegistryError::NotRegistered {
            what: "factory X".to_string(),
            mode: "renderable".to_string(),
            operation: "Scale".to_string(),
            namespace: None,
        };
        assert!(err.to_string().ends_with("operation \"Scale\""));
    }

    #[test]
    fn unknown_operation_message() {
        let err = RegistryError::UnknownOperation {
            mode: "rendered".to_string(),
            operation: "Sharpen".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no descriptor registered for operation \"Sharpen\" in mode \"rendered\""
        );
    }
}
