//! Process configuration.
//!
//! Built once at startup from environment-style `(name, value)` pairs and
//! validated before any component is constructed. Components receive the
//! already-parsed values.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kestrel_attest::{AppAttestConfig, IntegrityCredentials, PlayIntegrityPolicy, DEFAULT_BACKEND_TIMEOUT, DEFAULT_MAX_AGE};
use kestrel_geo::{DecoyPolicy, DEFAULT_ENDPOINT_LIMIT};
use kestrel_pack::KeyMaterial;
use kestrel_rollout::{RolloutError, RolloutGate};
use thiserror::Error;

pub const ENV_ENVIRONMENT: &str = "KESTREL_ENV";
pub const ENV_PRIVATE_KEY: &str = "KESTREL_CONFIG_SIGNING_PRIVATE_KEY";
pub const ENV_PUBLIC_KEY: &str = "KESTREL_CONFIG_SIGNING_PUBLIC_KEY";
pub const ENV_ALLOW_EPHEMERAL: &str = "KESTREL_ALLOW_EPHEMERAL_SIGNING_KEY";
pub const ENV_ALLOW_BYPASS: &str = "KESTREL_ALLOW_ATTESTATION_BYPASS";
pub const ENV_DECOY_POLICY: &str = "KESTREL_DECOY_POLICY";
pub const ENV_MAX_ENDPOINTS: &str = "KESTREL_MAX_ENDPOINTS";
pub const ENV_BACKEND_TIMEOUT: &str = "KESTREL_BACKEND_TIMEOUT_SECONDS";
pub const ENV_PLAY_PACKAGE: &str = "PLAY_INTEGRITY_PACKAGE_NAME";
pub const ENV_PLAY_ALLOW_BASIC: &str = "PLAY_INTEGRITY_ALLOW_BASIC";
pub const ENV_PLAY_REQUIRE_LICENSED: &str = "PLAY_INTEGRITY_REQUIRE_LICENSED";
pub const ENV_PLAY_MAX_AGE: &str = "PLAY_INTEGRITY_MAX_AGE_SECONDS";
pub const ENV_PLAY_CREDENTIALS_FILE: &str = "PLAY_INTEGRITY_CREDENTIALS_FILE";
pub const ENV_PLAY_CREDENTIALS_JSON: &str = "PLAY_INTEGRITY_CREDENTIALS_JSON";
pub const ENV_APPLE_TEAM: &str = "APPLE_TEAM_ID";
pub const ENV_APPLE_BUNDLE: &str = "APPLE_BUNDLE_ID";
pub const ENV_APPLE_PRODUCTION: &str = "APPLE_PRODUCTION";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error("attestation bypass must not be enabled in production")]
    BypassInProduction,

    #[error("ephemeral signing keys must not be used in production")]
    EphemeralKeyInProduction,

    #[error("a config signing private key is required in production")]
    MissingSigningKeyInProduction,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub production: bool,
    pub keys: KeyMaterial,
    pub allow_bypass: bool,
    pub play_integrity: PlayIntegrityPolicy,
    pub integrity_credentials: Option<IntegrityCredentials>,
    pub app_attest: AppAttestConfig,
    /// `None` when no rollout variable is set.
    pub rollout: Option<RolloutGate>,
    pub decoy_policy: DecoyPolicy,
    pub max_endpoints: usize,
    pub backend_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            production: false,
            keys: KeyMaterial::default(),
            allow_bypass: false,
            play_integrity: PlayIntegrityPolicy::default(),
            integrity_credentials: None,
            app_attest: AppAttestConfig::default(),
            rollout: None,
            decoy_policy: DecoyPolicy::default(),
            max_endpoints: DEFAULT_ENDPOINT_LIMIT,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

struct Vars(BTreeMap<String, String>);

impl Vars {
    /// Trimmed value; blank counts as unset.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }

    fn parsed<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|v| v.parse().map_err(|_| ConfigError::Invalid { key, value: v.to_owned() }))
            .transpose()
    }
}

impl Settings {
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = Vars(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());

        let production = vars.get(ENV_ENVIRONMENT).is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let allow_bypass = vars.flag(ENV_ALLOW_BYPASS, false);
        let backend_timeout = match vars.parsed::<u64>(ENV_BACKEND_TIMEOUT)? {
            Some(0) => {
                return Err(ConfigError::Invalid { key: ENV_BACKEND_TIMEOUT, value: "0".into() });
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_BACKEND_TIMEOUT,
        };

        let play_integrity = PlayIntegrityPolicy {
            package_name: vars.string(ENV_PLAY_PACKAGE),
            allow_basic: vars.flag(ENV_PLAY_ALLOW_BASIC, false),
            require_licensed: vars.flag(ENV_PLAY_REQUIRE_LICENSED, true),
            max_age: match vars.parsed::<u64>(ENV_PLAY_MAX_AGE)? {
                Some(0) => return Err(ConfigError::Invalid { key: ENV_PLAY_MAX_AGE, value: "0".into() }),
                Some(secs) => Duration::from_secs(secs),
                None => DEFAULT_MAX_AGE,
            },
            allow_bypass,
            timeout: backend_timeout,
        };
        let integrity_credentials = vars
            .string(ENV_PLAY_CREDENTIALS_JSON)
            .map(IntegrityCredentials::Json)
            .or_else(|| vars.get(ENV_PLAY_CREDENTIALS_FILE).map(|p| IntegrityCredentials::File(PathBuf::from(p))));

        let app_attest = AppAttestConfig {
            team_id: vars.string(ENV_APPLE_TEAM),
            bundle_id: vars.string(ENV_APPLE_BUNDLE),
            production: vars.flag(ENV_APPLE_PRODUCTION, true),
            allow_bypass,
            timeout: backend_timeout,
        };

        let rollout = RolloutGate::from_vars(vars.0.iter())?;
        let rollout = (!rollout.is_empty()).then_some(rollout);

        Ok(Self {
            production,
            keys: KeyMaterial {
                private_key: vars.string(ENV_PRIVATE_KEY),
                public_key: vars.string(ENV_PUBLIC_KEY),
                allow_ephemeral: vars.flag(ENV_ALLOW_EPHEMERAL, false),
            },
            allow_bypass,
            play_integrity,
            integrity_credentials,
            app_attest,
            rollout,
            decoy_policy: vars.parsed(ENV_DECOY_POLICY)?.unwrap_or_default(),
            max_endpoints: vars.parsed(ENV_MAX_ENDPOINTS)?.unwrap_or(DEFAULT_ENDPOINT_LIMIT),
            backend_timeout,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Refuse configurations that are unsafe in production.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.production {
            return Ok(());
        }
        if self.allow_bypass {
            return Err(ConfigError::BypassInProduction);
        }
        if self.keys.allow_ephemeral {
            return Err(ConfigError::EphemeralKeyInProduction);
        }
        if self.keys.private_key.is_none() {
            return Err(ConfigError::MissingSigningKeyInProduction);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        Settings::from_vars(vars.iter().copied())
    }

    #[test]
    fn defaults_from_empty_environment() {
        let s = settings(&[]).unwrap();
        assert!(!s.production);
        assert!(!s.allow_bypass);
        assert_eq!(s.play_integrity, PlayIntegrityPolicy::default());
        assert_eq!(s.decoy_policy, DecoyPolicy::Replace);
        assert_eq!(s.max_endpoints, 5);
        assert!(s.rollout.is_none());
        assert!(s.integrity_credentials.is_none());
        assert!(s.app_attest.production);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for truthy in ["1", "true", "TRUE", "Yes"] {
            assert!(settings(&[(ENV_ALLOW_BYPASS, truthy)]).unwrap().allow_bypass, "{truthy}");
        }
        for falsy in ["0", "no", "off", ""] {
            assert!(!settings(&[(ENV_ALLOW_BYPASS, falsy)]).unwrap().allow_bypass, "{falsy}");
        }
        let s = settings(&[(ENV_PLAY_REQUIRE_LICENSED, "false"), (ENV_APPLE_PRODUCTION, "false")]).unwrap();
        assert!(!s.play_integrity.require_licensed);
        assert!(!s.app_attest.production);
    }

    #[test]
    fn backend_settings_flow_into_policies() {
        let s = settings(&[
            (ENV_PLAY_PACKAGE, "net.kestrel.client"),
            (ENV_PLAY_ALLOW_BASIC, "yes"),
            (ENV_PLAY_MAX_AGE, "120"),
            (ENV_PLAY_CREDENTIALS_FILE, "/etc/kestrel/sa.json"),
            (ENV_APPLE_TEAM, "TEAM"),
            (ENV_APPLE_BUNDLE, "net.kestrel.ios"),
            (ENV_APPLE_PRODUCTION, "1"),
            (ENV_BACKEND_TIMEOUT, "3"),
            (ENV_ALLOW_BYPASS, "true"),
        ])
        .unwrap();
        assert_eq!(s.play_integrity.package_name.as_deref(), Some("net.kestrel.client"));
        assert!(s.play_integrity.allow_basic);
        assert!(s.play_integrity.allow_bypass);
        assert_eq!(s.play_integrity.max_age, Duration::from_secs(120));
        assert_eq!(s.play_integrity.timeout, Duration::from_secs(3));
        assert_eq!(s.integrity_credentials, Some(IntegrityCredentials::File("/etc/kestrel/sa.json".into())));
        assert_eq!(s.app_attest.app_id().as_deref(), Some("TEAM.net.kestrel.ios"));
        assert!(s.app_attest.production);
        assert!(s.app_attest.allow_bypass);
    }

    #[test]
    fn inline_credentials_win_over_file() {
        let s = settings(&[(ENV_PLAY_CREDENTIALS_FILE, "/x"), (ENV_PLAY_CREDENTIALS_JSON, "{\"k\":1}")]).unwrap();
        assert_eq!(s.integrity_credentials, Some(IntegrityCredentials::Json("{\"k\":1}".into())));
    }

    #[test]
    fn malformed_numbers_are_startup_errors() {
        assert_eq!(
            settings(&[(ENV_MAX_ENDPOINTS, "five")]).unwrap_err(),
            ConfigError::Invalid { key: ENV_MAX_ENDPOINTS, value: "five".into() }
        );
        assert!(settings(&[(ENV_PLAY_MAX_AGE, "-1")]).is_err());
        assert!(settings(&[(ENV_BACKEND_TIMEOUT, "0")]).is_err());
        assert_eq!(
            settings(&[(ENV_PLAY_MAX_AGE, "0")]).unwrap_err(),
            ConfigError::Invalid { key: ENV_PLAY_MAX_AGE, value: "0".into() }
        );
        assert!(settings(&[(ENV_DECOY_POLICY, "sometimes")]).is_err());
        assert!(matches!(
            settings(&[("KESTREL_ROLLOUT_PERCENTAGE", "x")]),
            Err(ConfigError::Rollout(_))
        ));
    }

    #[test]
    fn rollout_and_decoy_policy() {
        let s = settings(&[("KESTREL_ROLLOUT_PERCENTAGE_1_0", "25"), (ENV_DECOY_POLICY, "merge")]).unwrap();
        assert_eq!(s.rollout.unwrap().percentage_for("1.0", "us-east-1"), 25);
        assert_eq!(s.decoy_policy, DecoyPolicy::Merge);
    }

    #[test]
    fn production_guards() {
        let bypass = settings(&[(ENV_ENVIRONMENT, "production"), (ENV_ALLOW_BYPASS, "1"), (ENV_PRIVATE_KEY, "k")]);
        assert_eq!(bypass.unwrap().validate(), Err(ConfigError::BypassInProduction));

        let bypass_dev = settings(&[(ENV_ALLOW_BYPASS, "1")]).unwrap();
        assert!(bypass_dev.validate().is_ok());

        let ephemeral = settings(&[(ENV_ENVIRONMENT, "Production"), (ENV_ALLOW_EPHEMERAL, "true")]).unwrap();
        assert_eq!(ephemeral.validate(), Err(ConfigError::EphemeralKeyInProduction));

        let ephemeral_with_key =
            settings(&[(ENV_ENVIRONMENT, "production"), (ENV_PRIVATE_KEY, "k"), (ENV_ALLOW_EPHEMERAL, "1")]).unwrap();
        assert_eq!(ephemeral_with_key.validate(), Err(ConfigError::EphemeralKeyInProduction));

        let keyless = settings(&[(ENV_ENVIRONMENT, "production")]).unwrap();
        assert_eq!(keyless.validate(), Err(ConfigError::MissingSigningKeyInProduction));

        let ok = settings(&[(ENV_ENVIRONMENT, "production"), (ENV_PRIVATE_KEY, "k")]).unwrap();
        assert!(ok.validate().is_ok());
    }
}
