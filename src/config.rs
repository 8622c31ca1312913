use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::dispatch::DispatchOptions;
use crate::registry::MethodNaming;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub expose_error_details: bool,
    pub method_naming: MethodNaming,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("RPC_EXPOSE_ERROR_DETAILS must be true or false")]
    InvalidExposeErrorDetails,
    #[error("RPC_METHOD_NAMING must be as-declared or camel-case")]
    InvalidMethodNaming,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = read("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = read("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let expose_error_details = read("RPC_EXPOSE_ERROR_DETAILS")
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidExposeErrorDetails),
            })
            .transpose()?
            .unwrap_or(false);
        let method_naming = read("RPC_METHOD_NAMING")
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "as-declared" => Ok(MethodNaming::AsDeclared),
                "camel-case" => Ok(MethodNaming::CamelCase),
                _ => Err(ConfigError::InvalidMethodNaming),
            })
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            bind_addr,
            bind_port,
            expose_error_details,
            method_naming,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            expose_error_details: self.expose_error_details,
        }
    }
}
