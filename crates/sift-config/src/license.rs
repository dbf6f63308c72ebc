//! License acceptance gate
//!
//! The engine ships under a limited-use license. Acceptance comes from the
//! config's license block or, for containerised deploys that cannot edit
//! the config, from an environment variable.

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Environment variable substituting for config-level acceptance
pub const LICENSE_ENV_VAR: &str = "ACCEPT_LIMITED_USE_LICENSE";

/// License block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LicenseConfig {
    /// Explicit acceptance of the limited-use license
    pub accept: bool,
}

/// Check acceptance from config or environment
///
/// Accepted env values are "1", "true" and "yes", case-insensitive.
pub fn license_accepted(config: &LicenseConfig) -> Result<()> {
    if config.accept {
        return Ok(());
    }

    let env_accepted = std::env::var(LICENSE_ENV_VAR)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false);

    if env_accepted {
        Ok(())
    } else {
        Err(ConfigError::LicenseNotAccepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_acceptance_wins() {
        let config = LicenseConfig { accept: true };
        assert!(license_accepted(&config).is_ok());
    }

    #[test]
    fn env_var_substitutes() {
        let config = LicenseConfig { accept: false };

        std::env::set_var(LICENSE_ENV_VAR, "1");
        assert!(license_accepted(&config).is_ok());

        std::env::set_var(LICENSE_ENV_VAR, "maybe");
        assert!(matches!(
            license_accepted(&config),
            Err(ConfigError::LicenseNotAccepted)
        ));

        std::env::remove_var(LICENSE_ENV_VAR);
        assert!(license_accepted(&config).is_err());
    }
}
