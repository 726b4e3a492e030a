use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::codec::MAX_LINE_BYTES;
use crate::error::{RelayError, Result};

pub const DEFAULT_LOCATION: &str = "http://127.0.0.1:8000/chat";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http | Scheme::Ws => 80,
            Scheme::Https | Scheme::Wss => 443,
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Https | Scheme::Wss)
    }
}

impl FromStr for Scheme {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(RelayError::InvalidLocation(format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        };
        f.write_str(name)
    }
}

/// Where the client connects. Injected rather than read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Derives the target the way a page derives it from its own location:
    /// same scheme, same host, same port. Path, query and fragment are
    /// ignored.
    pub fn from_location(location: &str) -> Result<Self> {
        let location = location.trim();
        let (scheme, rest) = location
            .split_once("://")
            .ok_or_else(|| RelayError::InvalidLocation(format!("missing scheme in '{location}'")))?;
        let scheme: Scheme = scheme.parse()?;

        let authority = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        // Drop any userinfo.
        let authority = authority.rsplit('@').next().unwrap_or_default();

        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            return Err(RelayError::InvalidLocation(format!("missing host in '{location}'")));
        }

        Ok(Self::new(scheme, host, port.unwrap_or(scheme.default_port())))
    }

    /// `host:port`, the pair handed to the socket layer.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u16>)> {
    // Bracketed IPv6 literal.
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| RelayError::InvalidLocation(format!("unterminated '[' in '{authority}'")))?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None => None,
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => Ok((host, Some(parse_port(port)?))),
        Some((host, _)) => Ok((host, None)),
        None => Ok((authority, None)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| RelayError::InvalidLocation(format!("invalid port '{port}'")))
}

/// What to do with an inbound payload lacking `sender` or `message`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Render nothing and report [`RelayError::MalformedPayload`].
    #[default]
    Reject,
    /// Render missing fields as `undefined`.
    RenderLiteral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
    pub malformed: MalformedPolicy,
    pub reject_empty_messages: bool,
}

/// On-disk configuration shared by the terminal client, the TUI and the
/// relay server. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub location: String,
    pub username: Option<String>,
    pub recipient: Option<String>,
    pub listen: String,
    pub message_buffer_size: usize,
    pub max_connections: usize,
    /// Longest envelope line the server accepts from a client.
    pub max_line_bytes: usize,
    /// Seconds a new connection has to send `identify`.
    pub identify_timeout_secs: u64,
    pub reject_empty_messages: bool,
    pub malformed: MalformedPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            username: None,
            recipient: None,
            listen: DEFAULT_LISTEN.to_string(),
            message_buffer_size: 100,
            max_connections: 256,
            max_line_bytes: MAX_LINE_BYTES,
            identify_timeout_secs: 10,
            reject_empty_messages: false,
            malformed: MalformedPolicy::default(),
        }
    }
}

impl RelayConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            malformed: self.malformed,
            reject_empty_messages: self.reject_empty_messages,
        }
    }

    pub fn target(&self) -> Result<ConnectionTarget> {
        ConnectionTarget::from_location(&self.location)
    }
}

/// Loads the JSON config at `path`, falling back to defaults when the file
/// is missing or unreadable.
pub fn load_config(path: impl AsRef<Path>) -> RelayConfig {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<RelayConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("failed to parse config file {}: {err}", path.display());
                RelayConfig::default()
            }
        },
        Err(err) => {
            info!("config file {} not loaded ({err}); using defaults", path.display());
            RelayConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_with_explicit_port() {
        let target = ConnectionTarget::from_location("http://example.com:8080/chat?x=1").unwrap();
        assert_eq!(target.scheme, Scheme::Http);
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8080);
        assert_eq!(target.authority(), "example.com:8080");
    }

    #[test]
    fn injected_host_and_port() {
        let target = ConnectionTarget::new(Scheme::Http, "example.com", 8080);
        assert_eq!(target.authority(), "example.com:8080");
        assert_eq!(target.to_string(), "http://example.com:8080");
    }

    #[test]
    fn port_defaults_from_scheme() {
        assert_eq!(ConnectionTarget::from_location("http://example.com").unwrap().port, 80);
        assert_eq!(ConnectionTarget::from_location("https://example.com/").unwrap().port, 443);
        assert_eq!(ConnectionTarget::from_location("wss://example.com:").unwrap().port, 443);
    }

    #[test]
    fn ipv6_and_userinfo() {
        let target = ConnectionTarget::from_location("http://user@[::1]:9000/").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.authority(), "[::1]:9000");
    }

    #[test]
    fn rejects_bad_locations() {
        for bad in ["example.com:8080", "ftp://example.com", "http://:8080", "http://host:99999"] {
            assert!(
                matches!(ConnectionTarget::from_location(bad), Err(RelayError::InvalidLocation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{ "username": "alice", "malformed": "render_literal" }"#).unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.location, DEFAULT_LOCATION);
        assert_eq!(config.client_options().malformed, MalformedPolicy::RenderLiteral);
        assert!(!config.client_options().reject_empty_messages);
    }

    #[test]
    fn unparsable_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, "{ \"username\": ").unwrap();

        assert_eq!(load_config(&path), RelayConfig::default());
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, r#"{ "listen": "127.0.0.1:9000", "max_line_bytes": 512 }"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.max_line_bytes, 512);
        assert_eq!(config.identify_timeout_secs, 10);
    }

    #[test]
    fn missing_config_file_gives_defaults() {
        let config = load_config("/definitely/not/here/relay.json");
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.target().unwrap().authority(), "127.0.0.1:8000");
    }
}
