use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use parley_gateway::config::GatewayConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = GatewayConfig::default();

        let gateway = GatewayConfig {
            max_name_chars: parse(&lookup, "PARLEY_MAX_NAME_CHARS", defaults.max_name_chars, "a positive integer")?,
            max_message_chars: parse(
                &lookup,
                "PARLEY_MAX_MESSAGE_CHARS",
                defaults.max_message_chars,
                "a positive integer",
            )?,
            max_attachment_bytes: parse(
                &lookup,
                "PARLEY_MAX_ATTACHMENT_BYTES",
                defaults.max_attachment_bytes,
                "a size in bytes",
            )?,
            history_limit: parse(&lookup, "PARLEY_HISTORY_LIMIT", defaults.history_limit, "a message count")?,
            dedup_reactions: parse_flag(&lookup, "PARLEY_DEDUP_REACTIONS", defaults.dedup_reactions)?,
            outbound_buffer: parse(&lookup, "PARLEY_OUTBOUND_BUFFER", defaults.outbound_buffer, "a positive integer")?,
            heartbeat_interval: Duration::from_secs(parse(
                &lookup,
                "PARLEY_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
                "a number of seconds",
            )?),
        };

        for (var, value) in [
            ("PARLEY_MAX_NAME_CHARS", gateway.max_name_chars),
            ("PARLEY_MAX_MESSAGE_CHARS", gateway.max_message_chars),
            ("PARLEY_OUTBOUND_BUFFER", gateway.outbound_buffer),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: value.to_string(),
                    expected: "a positive integer",
                });
            }
        }
        if gateway.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PARLEY_HEARTBEAT_SECS",
                value: "0".into(),
                expected: "a number of seconds",
            });
        }

        Ok(Self {
            host: lookup("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "PORT", 3000, "a port number")?,
            static_dir: lookup("PARLEY_STATIC_DIR")
                .unwrap_or_else(|| "public".into())
                .into(),
            gateway,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value, expected }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            expected: "true or false",
        }),
    }
}
