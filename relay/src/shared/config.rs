use relay_core::config::{MalformedPolicy, RelayConfig, load_config};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub location: Option<String>,
    pub username: Option<String>,
    pub recipient: Option<String>,
    pub listen: Option<String>,
    pub reject_empty: bool,
    pub render_malformed: bool,
}

impl CliOverrides {
    pub fn apply(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(location) = self.location {
            config.location = location;
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.recipient.is_some() {
            config.recipient = self.recipient;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.reject_empty {
            config.reject_empty_messages = true;
        }
        if self.render_malformed {
            config.malformed = MalformedPolicy::RenderLiteral;
        }
        config
    }
}

pub fn resolve(path: &str, overrides: CliOverrides) -> RelayConfig {
    overrides.apply(load_config(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let file = RelayConfig {
            username: Some("from-file".into()),
            ..RelayConfig::default()
        };
        let config = CliOverrides {
            location: Some("http://example.com:8080/".into()),
            render_malformed: true,
            ..CliOverrides::default()
        }
        .apply(file);

        assert_eq!(config.username.as_deref(), Some("from-file"));
        assert_eq!(config.target().unwrap().authority(), "example.com:8080");
        assert_eq!(config.malformed, MalformedPolicy::RenderLiteral);
        assert!(!config.reject_empty_messages);
    }
}
