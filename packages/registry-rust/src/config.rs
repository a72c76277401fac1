/// Registry-level configuration.
///
/// Controls which modes exist at construction time and whether factory
/// failures are logged. Factory panics are always contained.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Define the seven built-in modes when the registry is created.
    pub builtin_modes: bool,
    /// Attach a [`TracingObserver`](crate::observer::TracingObserver) so
    /// catalog changes and factory failures are logged.
    pub log_events: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            builtin_modes: true,
            log_events: true,
        }
    }
}

impl RegistryConfig {
    /// Configuration for a registry with no modes defined.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            builtin_modes: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_config_defaults() {
        let config = RegistryConfig::default();
        assert!(config.builtin_modes);
        assert!(config.log_events);
    }

    #[test]
    fn bare_config_only_drops_builtin_modes() {
        let config = RegistryConfig::bare();
        assert!(!config.builtin_modes);
        assert!(config.log_events);
    }
}
