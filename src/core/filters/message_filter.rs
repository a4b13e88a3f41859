// Guild message filter - user-supplied regex patterns over message content.

use regex::Regex;

/// One filter hit: which stored pattern fired and what it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterMatch {
    pub pattern: String,
    pub matched: String,
}

/// Evaluates stored patterns against message content.
///
/// Patterns are searched (`Regex::find`), not full-matched, and evaluated in
/// stored order; the first hit short-circuits, so multiple matching patterns
/// never stack. Patterns come straight from guild moderators - there is no
/// timeout guard against catastrophic backtracking here, the `regex` crate's
/// linear-time engine is the only protection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFilter;

impl MessageFilter {
    pub fn new() -> Self {
        Self
    }

    /// First pattern in `patterns` that matches `content`, if any.
    ///
    /// A pattern that fails to compile is reported and skipped; a bad entry
    /// must not shield later patterns from being evaluated.
    pub fn first_match(&self, patterns: &[String], content: &str) -> Option<FilterMatch> {
        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(re) => {
                    if let Some(m) = re.find(content) {
                        return Some(FilterMatch {
                            pattern: pattern.clone(),
                            matched: m.as_str().to_string(),
                        });
                    }
                }
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "skipping invalid filter pattern");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_matching_pattern_wins() {
        let filter = MessageFilter::new();

        let hit = filter
            .first_match(&patterns(&["foo", "bar"]), "foobar")
            .unwrap();
        // "bar" also matches, but scanning stopped at the first hit.
        assert_eq!(hit.pattern, "foo");
        assert_eq!(hit.matched, "foo");
    }

    #[test]
    fn substring_search_not_full_match() {
        let filter = MessageFilter::new();

        let hit = filter
            .first_match(&patterns(&[r"spa+m"]), "some spaaam inside")
            .unwrap();
        assert_eq!(hit.matched, "spaaam");
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let filter = MessageFilter::new();

        let hit = filter
            .first_match(&patterns(&["(unclosed", "bar"]), "foobar")
            .unwrap();
        assert_eq!(hit.pattern, "bar");
    }

    #[test]
    fn no_patterns_no_match() {
        let filter = MessageFilter::new();

        assert_eq!(filter.first_match(&[], "anything"), None);
        assert_eq!(filter.first_match(&patterns(&["zzz"]), "anything"), None);
    }
}
