//! Server configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Default listen port.
const DEFAULT_PORT: u16 = 3847;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (`PORT`).
    pub port: u16,
    /// Workspace root (`ORG_ROOT`, default: current working directory).
    pub org_root: PathBuf,
    /// Optional TLS certificate path (`TLS_CERT`), for deployments that
    /// terminate TLS in front of the engine.
    pub tls_cert: Option<PathBuf>,
    /// Optional TLS key path (`TLS_KEY`).
    pub tls_key: Option<PathBuf>,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Config, String> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("invalid PORT value '{raw}'"))?,
            Err(_) => DEFAULT_PORT,
        };

        let org_root = match env::var("ORG_ROOT") {
            Ok(raw) if !raw.is_empty() => PathBuf::from(raw),
            _ => env::current_dir().map_err(|e| format!("cannot determine cwd: {e}"))?,
        };
        if !org_root.is_dir() {
            return Err(format!("ORG_ROOT {org_root:?} is not a directory"));
        }

        Ok(Config {
            port,
            org_root,
            tls_cert: env::var("TLS_CERT").ok().map(PathBuf::from),
            tls_key: env::var("TLS_KEY").ok().map(PathBuf::from),
        })
    }

    /// The bind address.
    pub fn server_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_addr() {
        let config = Config {
            port: 4000,
            org_root: PathBuf::from("."),
            tls_cert: None,
            tls_key: None,
        };
        assert_eq!(config.server_addr(), "0.0.0.0:4000");
    }
}
