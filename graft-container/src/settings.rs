//! Injector configuration.

use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// Settings shared by an injector and every injector created beneath it.
///
/// Deserializes from partial input; missing fields take their defaults.
///
/// ```
/// use graft_container::scope::Scope;
/// use graft_container::settings::InjectorSettings;
///
/// let settings: InjectorSettings =
///     serde_json::from_str(r#"{ "default_scope": "Singleton", "allow_override": false }"#).unwrap();
/// assert_eq!(settings.default_scope, Scope::Singleton);
/// assert!(!settings.allow_override);
/// assert!(settings.auto_register);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorSettings {
    /// Register `auto_provide!` providers on the first lookup miss.
    pub auto_register: bool,
    /// Scope of descriptors that name none.
    pub default_scope: Scope,
    /// Let a registration replace an existing one in the same slot. When
    /// `false` the second registration fails with `AlreadyRegistered`.
    pub allow_override: bool,
    /// Deepest session chain before resolution is reported as circular.
    pub max_depth: usize,
}

impl Default for InjectorSettings {
    fn default() -> Self {
        Self {
            auto_register: true,
            default_scope: Scope::Default,
            allow_override: true,
            max_depth: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = InjectorSettings::default();
        assert!(settings.auto_register);
        assert!(settings.allow_override);
        assert_eq!(settings.default_scope, Scope::Default);
        assert_eq!(settings.max_depth, 256);
    }

    #[test]
    fn round_trips_through_json() {
        let settings = InjectorSettings {
            max_depth: 32,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: InjectorSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
