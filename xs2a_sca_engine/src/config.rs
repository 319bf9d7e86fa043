use std::env;

use chrono::Duration;
use log::*;
use xs2a_common::env_flag;

use crate::db_types::ScaApproach;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/xs2a_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SCA_APPROACH: ScaApproach = ScaApproach::Redirect;
const DEFAULT_AUTHORISATION_EXPIRY_SECS: i64 = 86_400;

/// Deployment-wide settings of the SCA engine.
#[derive(Clone, Debug)]
pub struct ScaConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// When true, embedded and decoupled payment authorisations must be concluded with a confirmation code, and
    /// account authorisations cannot be updated through the TPP endpoints while they are `RECEIVED`.
    pub authorisation_confirmation_mandated: bool,
    /// When true, confirmation codes are compared with the stored SCA authentication data. Otherwise the ASPSP checks
    /// them.
    pub confirmation_check_by_xs2a: bool,
    /// The approach used for new authorisations when the TPP does not ask for a specific one.
    pub default_sca_approach: ScaApproach,
    /// How long a new authorisation stays valid.
    pub authorisation_expiry: Duration,
}

impl Default for ScaConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            authorisation_confirmation_mandated: false,
            confirmation_check_by_xs2a: true,
            default_sca_approach: DEFAULT_SCA_APPROACH,
            authorisation_expiry: Duration::seconds(DEFAULT_AUTHORISATION_EXPIRY_SECS),
        }
    }
}

impl ScaConfig {
    pub fn with_confirmation_mandated(mut self, mandated: bool) -> Self {
        self.authorisation_confirmation_mandated = mandated;
        self
    }

    pub fn with_confirmation_check_by_xs2a(mut self, local: bool) -> Self {
        self.confirmation_check_by_xs2a = local;
        self
    }

    pub fn with_default_sca_approach(mut self, approach: ScaApproach) -> Self {
        self.default_sca_approach = approach;
        self
    }

    pub fn with_authorisation_expiry(mut self, expiry: Duration) -> Self {
        self.authorisation_expiry = expiry;
        self
    }

    pub fn from_env_or_default() -> Self {
        let database_url = env::var("XS2A_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ XS2A_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env::var("XS2A_DATABASE_MAX_CONNECTIONS")
            .map(|s| {
                s.parse::<u32>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for XS2A_DATABASE_MAX_CONNECTIONS. {e} Using the default, \
                         {DEFAULT_MAX_CONNECTIONS}, instead."
                    );
                    DEFAULT_MAX_CONNECTIONS
                })
            })
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let authorisation_confirmation_mandated = env_flag("XS2A_AUTHORISATION_CONFIRMATION_MANDATED", false);
        let confirmation_check_by_xs2a = env_flag("XS2A_CONFIRMATION_CHECK_BY_XS2A", true);
        let default_sca_approach = env::var("XS2A_DEFAULT_SCA_APPROACH")
            .map(|s| {
                s.parse::<ScaApproach>().unwrap_or_else(|e| {
                    warn!("🪛️ XS2A_DEFAULT_SCA_APPROACH is invalid. {e}. Using {DEFAULT_SCA_APPROACH} instead.");
                    DEFAULT_SCA_APPROACH
                })
            })
            .unwrap_or(DEFAULT_SCA_APPROACH);
        let authorisation_expiry = env::var("XS2A_AUTHORISATION_EXPIRY_SECS")
            .map(|s| match s.parse::<i64>() {
                Ok(secs) if secs > 0 => Duration::seconds(secs),
                _ => {
                    warn!(
                        "🪛️ {s} is not a valid number of seconds for XS2A_AUTHORISATION_EXPIRY_SECS. Using the \
                         default of {DEFAULT_AUTHORISATION_EXPIRY_SECS} seconds."
                    );
                    Duration::seconds(DEFAULT_AUTHORISATION_EXPIRY_SECS)
                },
            })
            .unwrap_or_else(|_| Duration::seconds(DEFAULT_AUTHORISATION_EXPIRY_SECS));
        if authorisation_confirmation_mandated {
            let mode = if confirmation_check_by_xs2a { "locally" } else { "by the ASPSP" };
            info!("🪛️ Authorisation confirmation is mandated. Confirmation codes are checked {mode}.");
        }
        Self {
            database_url,
            max_connections,
            authorisation_confirmation_mandated,
            confirmation_check_by_xs2a,
            default_sca_approach,
            authorisation_expiry,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // All environment manipulation lives in one test, since tests run in parallel.
    #[test]
    fn reads_environment_with_fallbacks() {
        env::set_var("XS2A_DATABASE_MAX_CONNECTIONS", "not-a-number");
        env::set_var("XS2A_AUTHORISATION_CONFIRMATION_MANDATED", "yes");
        env::set_var("XS2A_DEFAULT_SCA_APPROACH", "decoupled");
        env::set_var("XS2A_AUTHORISATION_EXPIRY_SECS", "-5");
        let config = ScaConfig::from_env_or_default();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.authorisation_confirmation_mandated);
        assert_eq!(config.default_sca_approach, ScaApproach::Decoupled);
        assert_eq!(config.authorisation_expiry, Duration::seconds(DEFAULT_AUTHORISATION_EXPIRY_SECS));

        env::set_var("XS2A_DEFAULT_SCA_APPROACH", "carrier-pigeon");
        env::set_var("XS2A_AUTHORISATION_EXPIRY_SECS", "600");
        let config = ScaConfig::from_env_or_default();
        assert_eq!(config.default_sca_approach, ScaApproach::Redirect);
        assert_eq!(config.authorisation_expiry, Duration::seconds(600));
        for var in [
            "XS2A_DATABASE_MAX_CONNECTIONS",
            "XS2A_AUTHORISATION_CONFIRMATION_MANDATED",
            "XS2A_DEFAULT_SCA_APPROACH",
            "XS2A_AUTHORISATION_EXPIRY_SECS",
        ] {
            env::remove_var(var);
        }
    }
}
