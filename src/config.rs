use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    name = "signal-hub",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Config {
    /// listening:
    ///
    /// the address and port bound by the HTTP server. the bound address
    /// supports ipv4 and ipv6.
    #[clap(default_value = "0.0.0.0:8080", env = "PORT", value_parser = parse_listen)]
    pub listening: SocketAddr,

    /// allowed origins:
    ///
    /// comma-separated origin allow-list. if unset, any origin is
    /// accepted — intended for development only.
    #[clap(env = "ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,
}

/// `PORT` is conventionally just a port number (per platform-as-a-service
/// convention); accept either a bare port or a full `host:port` pair.
fn parse_listen(value: &str) -> Result<SocketAddr, String> {
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    value
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid listen address {value:?}: {e}"))
}

impl Config {
    /// # Examples
    ///
    /// ```
    /// use signal_hub::config::Config;
    ///
    /// let config = Config::new();
    /// assert_eq!(config.listening.port(), 8080);
    /// ```
    pub fn new() -> Arc<Self> {
        Arc::new(Self::parse())
    }

    /// origin allow-list, trimmed and split on commas; empty when unset.
    pub fn allow_list(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .map(|origins| origins.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_default()
    }
}

/// single canonicalization routine for origin checks, used by both the
/// upgrade-time origin check and the CORS layer so the two can't diverge.
/// exact match after trimming surrounding whitespace on both sides, per
/// the spec's resolution of the source's inconsistent trimming.
pub fn origin_allowed(allow_list: &[String], origin: &str) -> bool {
    if allow_list.is_empty() {
        return true; // development default: accept any origin.
    }

    let origin = origin.trim();
    allow_list.iter().any(|allowed| allowed.trim() == origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_accepts_any_origin() {
        assert!(origin_allowed(&[], "https://evil.example"));
    }

    #[test]
    fn exact_match_after_trimming_whitespace() {
        let list = vec![" https://example.com ".to_string()];
        assert!(origin_allowed(&list, "https://example.com"));
        assert!(!origin_allowed(&list, "https://example.com.evil.com"));
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let addr = parse_listen("8080").unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
