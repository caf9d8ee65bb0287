//! Topic name/filter validation and wildcard matching.
//!
//! A topic name and a topic filter are both `/`-delimited level sequences
//! that must start with `/`. A filter additionally allows `+` (single-level
//! wildcard) and a trailing `#` (multi-level wildcard); a topic name forbids
//! both. Every level must otherwise consist of printable ASCII (32–126), and
//! a level containing `+` or `#` must contain *only* that character. The
//! whole topic is capped at 64 bytes.

use crate::Error;

/// Maximum encoded length, in bytes, of a topic name or topic filter.
pub const TOPIC_MAX_LEN: usize = 64;

/// One level of a parsed topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    /// A literal level, matched byte-for-byte.
    Literal(String),
    /// `+`: matches exactly one level.
    Single,
    /// `#`: matches zero or more trailing levels; only legal as the last level.
    Multi,
}

/// A parsed, validated topic filter, ready for repeated matching against
/// inbound PUBLISH topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    raw: String,
    levels: Vec<Level>,
}

impl Filter {
    /// The original filter string, as given to `subscribe`/`unsubscribe`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Tests whether `topic` (a concrete PUBLISH topic name) satisfies this
    /// filter, per MQTT 3.1.1 topic-filter semantics.
    pub fn matches(&self, topic: &str) -> bool {
        let mut levels = self.levels.iter();
        let mut segments = topic.split('/');

        loop {
            match (levels.next(), segments.next()) {
                (Some(Level::Multi), _) => return true,
                (Some(Level::Single), Some(_)) => continue,
                (Some(Level::Literal(s)), Some(seg)) if s == seg => continue,
                (Some(_), _) => return false,
                (None, None) => return true,
                (None, Some(_)) => return false,
            }
        }
    }
}

fn is_valid_level_bytes(level: &str) -> bool {
    level.bytes().all(|b| (32..=126).contains(&b))
}

fn check_wildcard_isolation(level: &str) -> bool {
    if level.contains('+') || level.contains('#') {
        level == "+" || level == "#"
    } else {
        true
    }
}

/// Validates and parses a topic filter for SUBSCRIBE/UNSUBSCRIBE.
pub fn validate_topic_filter(filter: &str) -> Result<Filter, Error> {
    if filter.is_empty() || filter.len() > TOPIC_MAX_LEN || !filter.starts_with('/') {
        return Err(Error::TopicFormat);
    }

    let raw_levels: Vec<&str> = filter.split('/').collect();
    let last = raw_levels.len() - 1;
    let mut levels = Vec::with_capacity(raw_levels.len());

    for (i, level) in raw_levels.into_iter().enumerate() {
        if !check_wildcard_isolation(level) || !is_valid_level_bytes(level) {
            return Err(Error::TopicFormat);
        }

        levels.push(match level {
            "+" => Level::Single,
            "#" if i == last => Level::Multi,
            "#" => return Err(Error::TopicFormat),
            s => Level::Literal(s.to_owned()),
        });
    }

    Ok(Filter {
        raw: filter.to_owned(),
        levels,
    })
}

/// Validates a topic name for PUBLISH.
pub fn validate_topic_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() > TOPIC_MAX_LEN || !name.starts_with('/') {
        return Err(Error::TopicFormat);
    }

    for level in name.split('/') {
        if level.contains('+') || level.contains('#') || !is_valid_level_bytes(level) {
            return Err(Error::TopicFormat);
        }
    }

    Ok(())
}
