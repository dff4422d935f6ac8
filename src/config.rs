//! # Publisher Configuration Module
//!
//! Environment-driven knobs for how topics are matched and which channels are
//! loaded.
//!
//! ## Environment Variables
//!
//! | Variable                        | Default | Meaning                                         |
//! |---------------------------------|---------|-------------------------------------------------|
//! | `ASYNCAPI_PUB_TOPIC_SEPARATOR`  | `/`     | Segment separator a parameter capture cannot span |
//! | `ASYNCAPI_PUB_CASE_SENSITIVE`   | `false` | Match literal topic segments case-sensitively   |
//! | `ASYNCAPI_PUB_STRICT_TOPICS`    | `false` | Reject a trailing separator on published topics |
//! | `ASYNCAPI_PUB_TAG`              | unset   | Only load channels whose operation has this tag |
//!
//! ## Usage
//!
//! ```rust
//! use asyncapi_pub::config::PublisherConfig;
//!
//! let config = PublisherConfig::from_env();
//! println!("separator: {}", config.topic.separator);
//! ```

use std::env;

/// How channel names are compiled into topic matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicOptions {
    /// Separator a `{param}` capture never crosses
    pub separator: char,
    /// Literal segments must match case-sensitively
    pub case_sensitive: bool,
    /// When false, one trailing separator on the topic is tolerated
    pub strict: bool,
}

impl Default for TopicOptions {
    fn default() -> Self {
        Self {
            separator: '/',
            case_sensitive: false,
            strict: false,
        }
    }
}

/// Publisher-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherConfig {
    pub topic: TopicOptions,
    /// Tag filter applied when a load does not specify its own
    pub default_tag: Option<String>,
}

impl PublisherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = TopicOptions::default();
        let separator = env::var("ASYNCAPI_PUB_TOPIC_SEPARATOR")
            .ok()
            .and_then(|val| {
                let mut chars = val.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            })
            .unwrap_or(defaults.separator);

        PublisherConfig {
            topic: TopicOptions {
                separator,
                case_sensitive: parse_flag("ASYNCAPI_PUB_CASE_SENSITIVE", defaults.case_sensitive),
                strict: parse_flag("ASYNCAPI_PUB_STRICT_TOPICS", defaults.strict),
            },
            default_tag: env::var("ASYNCAPI_PUB_TAG")
                .ok()
                .filter(|tag| !tag.trim().is_empty()),
        }
    }
}

fn parse_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
