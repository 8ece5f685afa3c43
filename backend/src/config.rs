use std::env;
use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    /// Fixed seed for the draw RNG; `None` seeds from OS entropy.
    pub draw_seed: Option<u64>,
    /// Single allowed CORS origin; `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            draw_seed: None,
            cors_origin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let bind_addr = lookup("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = parse_var(&lookup, "PORT")?.unwrap_or(defaults.port);
        let draw_seed = parse_var(&lookup, "DRAW_SEED")?;
        let cors_origin = lookup("CORS_ORIGIN").filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr,
            port,
            draw_seed,
            cors_origin,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: raw,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
