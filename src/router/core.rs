//! Router core - compiles channel names into topic matchers and resolves
//! published topics against them.

use crate::config::TopicOptions;
use crate::error::PublishError;
use regex::{Regex, RegexBuilder};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum number of topic parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Decoded topic parameters in first-capture order.
///
/// Names are `Arc<str>` shared with the compiled matcher; values are per-publish.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A compiled channel name, e.g. `events/{id}` → `^events/([^/]+?)(?:/)?$`.
#[derive(Debug, Clone)]
pub struct TopicMatcher {
    pattern: String,
    regex: Regex,
    /// Capture names in the order they appear in the pattern (may repeat)
    keys: Vec<Arc<str>>,
}

impl TopicMatcher {
    /// Compile a channel name into a matcher.
    ///
    /// `{name}` placeholders capture one or more characters other than the
    /// separator. Names may only contain ASCII letters, digits and `_`.
    pub fn compile(pattern: &str, options: &TopicOptions) -> Result<Self, PublishError> {
        let invalid = |reason: String| PublishError::InvalidTopicPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let sep = regex::escape(&options.separator.to_string());
        let mut source = String::with_capacity(pattern.len() + 16);
        source.push('^');
        let mut keys = Vec::with_capacity(pattern.matches('{').count());

        let mut rest = pattern;
        while let Some(start) = rest.find('{') {
            source.push_str(&regex::escape(&rest[..start]));
            let after = &rest[start + 1..];
            let end = after
                .find('}')
                .ok_or_else(|| invalid("unterminated '{' placeholder".to_string()))?;
            let name = &after[..end];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!(
                    "parameter name '{name}' must contain only letters, digits or '_'"
                )));
            }
            source.push_str(&format!("([^{sep}]+?)"));
            keys.push(Arc::from(name));
            rest = &after[end + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unmatched '}'".to_string()));
        }
        source.push_str(&regex::escape(rest));

        let ends_with_sep = pattern.ends_with(options.separator);
        if !options.strict && !ends_with_sep {
            source.push_str(&format!("(?:{sep})?"));
        }
        source.push('$');

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            keys,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in capture order (duplicates kept)
    #[must_use]
    pub fn keys(&self) -> &[Arc<str>] {
        &self.keys
    }

    /// Match a concrete topic and extract its decoded parameters.
    ///
    /// Returns `Ok(None)` when the topic does not match. Values are
    /// percent-decoded. When a name repeats, a later non-empty capture replaces
    /// the earlier value in place.
    pub fn match_topic(&self, topic: &str) -> Result<Option<ParamVec>, PublishError> {
        let Some(captures) = self.regex.captures(topic) else {
            return Ok(None);
        };

        let mut params = ParamVec::new();
        for (key, capture) in self.keys.iter().zip(captures.iter().skip(1)) {
            let raw = capture.map(|m| m.as_str()).unwrap_or_default();
            let value = decode_param(raw).ok_or_else(|| PublishError::MalformedParameter {
                topic: topic.to_string(),
                param: key.to_string(),
            })?;

            match params.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => {
                    if !value.is_empty() {
                        slot.1 = value;
                    }
                }
                None => params.push((Arc::clone(key), value)),
            }
        }
        Ok(Some(params))
    }
}

/// Percent-decode a capture; `None` for a bad `%XX` escape or non-UTF-8 bytes
fn decode_param(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return Some(String::new());
    }
    let bytes = raw.as_bytes();
    let well_formed = bytes.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || (bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }
    urlencoding::decode(raw).ok().map(|v| v.into_owned())
}

/// Result of resolving a topic to a loaded channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMatch {
    /// Index of the matched channel, in declaration order
    pub index: usize,
    pub params: ParamVec,
}

impl TopicMatch {
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered set of topic matchers; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    matchers: Vec<TopicMatcher>,
}

impl TopicRouter {
    pub fn new(matchers: Vec<TopicMatcher>) -> Self {
        info!(
            channels = matchers.len(),
            patterns = ?matchers.iter().take(10).map(TopicMatcher::pattern).collect::<Vec<_>>(),
            "Topic routing table loaded"
        );
        Self { matchers }
    }

    /// Compile every pattern, failing on the first invalid one
    pub fn from_patterns<'a>(
        patterns: impl IntoIterator<Item = &'a str>,
        options: &TopicOptions,
    ) -> Result<Self, PublishError> {
        let matchers = patterns
            .into_iter()
            .map(|p| TopicMatcher::compile(p, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(matchers))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matchers(&self) -> &[TopicMatcher] {
        &self.matchers
    }

    /// Resolve a topic to the first matching channel in declaration order
    pub fn route(&self, topic: &str) -> Result<Option<TopicMatch>, PublishError> {
        for (index, matcher) in self.matchers.iter().enumerate() {
            if let Some(params) = matcher.match_topic(topic)? {
                debug!(
                    topic = %topic,
                    pattern = %matcher.pattern(),
                    params = ?params,
                    "Topic matched"
                );
                return Ok(Some(TopicMatch { index, params }));
            }
        }
        debug!(topic = %topic, "No channel matched topic");
        Ok(None)
    }
}
