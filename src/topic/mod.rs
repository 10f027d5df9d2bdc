//! Topic pattern matching
//!
//! MQTT-style subscription patterns are `/`-delimited. Two wildcards are
//! understood:
//! - `+` matches exactly one segment (an empty segment counts)
//! - `#` matches any number of remaining segments, including none, and is only
//!   meaningful as the last segment
//!
//! Patterns are not validated; a `#` in the middle of a pattern simply matches
//! everything from that point on.

/// Returns `true` when `topic` is covered by the subscription `pattern`.
pub fn matches(pattern: &str, topic: &str) -> bool {
    if pattern == "#" {
        return true;
    }

    let mut topic_levels = topic.split('/');

    for level in pattern.split('/') {
        if level == "#" {
            return true;
        }

        match topic_levels.next() {
            Some(t) if level == "+" || level == t => continue,
            _ => return false,
        }
    }

    topic_levels.next().is_none()
}

/// Returns `true` when the pattern contains a wildcard segment.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('/').any(|level| level == "+" || level == "#")
}
