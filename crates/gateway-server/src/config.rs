//! Environment-driven configuration.
//!
//! A missing credential or assistant id is a startup failure, never a
//! runtime fault. Everything else has a default.

use std::net::SocketAddr;

use gateway_session::ContextPolicy;
use gateway_telemetry::LangfuseConfig;

/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Default telemetry host when only the keys are provided.
const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Configuration error: the process must not start serving.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub assistant_id: String,
    pub base_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub context_policy: ContextPolicy,
    pub langfuse: Option<LangfuseConfig>,
}

impl GatewayConfig {
    /// Read configuration from process environment variables.
    ///
    /// # Errors
    /// Fails when `OPENAI_API_KEY` or `ASSISTANT_ID` is absent, or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
        let assistant_id = lookup("ASSISTANT_ID").ok_or(ConfigError::MissingVar("ASSISTANT_ID"))?;

        let bind = lookup("GATEWAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind.parse().map_err(|_| ConfigError::InvalidVar {
            var: "GATEWAY_BIND",
            value: bind.clone(),
        })?;

        let context_policy = match lookup("GATEWAY_CONTEXT_POLICY").as_deref() {
            None | Some("per_connection") => ContextPolicy::PerConnection,
            Some("per_exchange") => ContextPolicy::PerExchange,
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    var: "GATEWAY_CONTEXT_POLICY",
                    value: other.to_string(),
                });
            }
        };

        // Telemetry is optional: both keys present enables it.
        let langfuse = match (
            lookup("LANGFUSE_PUBLIC_KEY"),
            lookup("LANGFUSE_SECRET_KEY"),
        ) {
            (Some(public_key), Some(secret_key)) => Some(LangfuseConfig::new(
                public_key,
                secret_key,
                lookup("LANGFUSE_HOST").unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.to_string()),
            )),
            _ => None,
        };

        Ok(Self {
            api_key,
            assistant_id,
            base_url: lookup("OPENAI_BASE_URL"),
            bind_addr,
            context_policy,
            langfuse,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn from(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map = env(vars);
        GatewayConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = from(&[("OPENAI_API_KEY", "sk-test"), ("ASSISTANT_ID", "asst_1")]).unwrap();
        assert_eq!(config.assistant_id, "asst_1");
        assert_eq!(config.bind_addr, DEFAULT_BIND.parse().unwrap());
        assert_eq!(config.context_policy, ContextPolicy::PerConnection);
        assert!(config.base_url.is_none());
        assert!(config.langfuse.is_none());
    }

    #[test]
    fn missing_credentials_are_fatal() {
        assert!(matches!(
            from(&[("ASSISTANT_ID", "asst_1")]),
            Err(ConfigError::MissingVar("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            from(&[("OPENAI_API_KEY", "sk-test")]),
            Err(ConfigError::MissingVar("ASSISTANT_ID"))
        ));
    }

    #[test]
    fn langfuse_enabled_only_with_both_keys() {
        let config = from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ASSISTANT_ID", "asst_1"),
            ("LANGFUSE_PUBLIC_KEY", "pk"),
        ])
        .unwrap();
        assert!(config.langfuse.is_none());

        let config = from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ASSISTANT_ID", "asst_1"),
            ("LANGFUSE_PUBLIC_KEY", "pk"),
            ("LANGFUSE_SECRET_KEY", "sk"),
            ("LANGFUSE_HOST", "https://lf.example"),
        ])
        .unwrap();
        let langfuse = config.langfuse.unwrap();
        assert_eq!(langfuse.host, "https://lf.example");
    }

    #[test]
    fn context_policy_parses() {
        let config = from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ASSISTANT_ID", "asst_1"),
            ("GATEWAY_CONTEXT_POLICY", "per_exchange"),
        ])
        .unwrap();
        assert_eq!(config.context_policy, ContextPolicy::PerExchange);

        assert!(matches!(
            from(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("ASSISTANT_ID", "asst_1"),
                ("GATEWAY_CONTEXT_POLICY", "sometimes"),
            ]),
            Err(ConfigError::InvalidVar { .. })
        ));
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        assert!(matches!(
            from(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("ASSISTANT_ID", "asst_1"),
                ("GATEWAY_BIND", "not-an-addr"),
            ]),
            Err(ConfigError::InvalidVar { .. })
        ));
    }
}
