// canonical name extraction - ordered list of filename patterns, first match wins

use crate::error::ConfigError;
use regex::Regex;

/// prefix for the numbered pattern variables (PATTERN_1, PATTERN_2, ...)
pub const PATTERN_KEY_PREFIX: &str = "PATTERN_";

#[derive(Debug, Clone)]
struct NamedPattern {
    key: String,
    regex: Regex,
}

/// the configured naming patterns, in precedence order. immutable once built
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<NamedPattern>,
}

impl PatternList {
    /// compile `(key, source)` pairs in the order given. `key` is only used in error messages
    pub fn compile<I, K, S>(sources: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for (key, source) in sources {
            let key = key.into();
            let regex = Regex::new(source.as_ref()).map_err(|source| ConfigError::InvalidPattern {
                key: key.clone(),
                source,
            })?;
            // group 0 is the whole match
            if regex.captures_len() < 2 {
                return Err(ConfigError::PatternWithoutGroup { key });
            }
            patterns.push(NamedPattern { key, regex });
        }
        Ok(Self { patterns })
    }

    /// read PATTERN_1, PATTERN_2, ... through `lookup`, stopping at the first missing index
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources = Vec::new();
        for index in 1.. {
            let key = format!("{PATTERN_KEY_PREFIX}{index}");
            match lookup(&key).filter(|value| !value.is_empty()) {
                Some(source) => sources.push((key, source)),
                None => break,
            }
        }
        Self::compile(sources)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// the variable names the patterns were loaded from, in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.key.as_str())
    }

    /// return the first capture group of the first pattern matching `filename`.
    ///
    /// a pattern only counts as matching when the match begins at the start of the
    /// filename. the first such pattern decides the outcome: when its first group did not
    /// take part in the match, or captured nothing, there is no canonical name and later
    /// patterns are not consulted.
    pub fn extract_canonical_name(&self, filename: &str) -> Option<String> {
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(filename) else {
                continue;
            };
            // leftmost-first: if any match starts at 0, the reported one does
            if caps.get(0).map_or(true, |m| m.start() != 0) {
                continue;
            }
            return caps
                .get(1)
                .map(|group| group.as_str())
                .filter(|name| !name.is_empty())
                .map(str::to_string);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn list(sources: &[&str]) -> PatternList {
        PatternList::compile(
            sources
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("PATTERN_{}", i + 1), *s)),
        )
        .expect("patterns compile")
    }

    #[test]
    fn extracts_job_name_from_part_archive() {
        let patterns = list(&[r"^(job\d+)-part\d+\.zip$"]);
        assert_eq!(
            patterns.extract_canonical_name("job42-part3.zip").as_deref(),
            Some("job42")
        );
        assert_eq!(patterns.extract_canonical_name("randomfile.tmp"), None);
    }

    #[test]
    fn first_matching_pattern_wins() {
        let patterns = list(&[r"^(\w+)\.tar$", r"^(\w+)-\d+\.tar$", r"^(.+)$"]);
        assert_eq!(
            patterns.extract_canonical_name("nightly.tar").as_deref(),
            Some("nightly")
        );
        assert_eq!(
            patterns.extract_canonical_name("nightly-7.tar").as_deref(),
            Some("nightly")
        );
        // only the catch-all matches here
        assert_eq!(
            patterns.extract_canonical_name("nightly.7.tar").as_deref(),
            Some("nightly.7.tar")
        );
    }

    #[test]
    fn order_decides_between_overlapping_patterns() {
        let narrow_first = list(&[r"^(\w+)-\d+\.tar$", r"^(.+)\.tar$"]);
        let broad_first = list(&[r"^(.+)\.tar$", r"^(\w+)-\d+\.tar$"]);
        assert_eq!(
            narrow_first.extract_canonical_name("nightly-7.tar").as_deref(),
            Some("nightly")
        );
        assert_eq!(
            broad_first.extract_canonical_name("nightly-7.tar").as_deref(),
            Some("nightly-7")
        );
    }

    #[test]
    fn non_matching_pattern_does_not_change_result() {
        let base = list(&[r"^(db)_\d+\.sql$", r"^(web)-.*$"]);
        let padded = list(&[
            r"^never$(x)",
            r"^(db)_\d+\.sql$",
            r"^(nothing)-here$",
            r"^(web)-.*$",
            r"^(zzz)$",
        ]);
        for name in ["db_20240101.sql", "web-assets.tgz", "other.bin"] {
            assert_eq!(
                base.extract_canonical_name(name),
                padded.extract_canonical_name(name),
                "{name}"
            );
        }
    }

    #[test]
    fn matching_is_anchored_at_start_only() {
        let patterns = list(&[r"(backup)"]);
        assert_eq!(
            patterns.extract_canonical_name("backup-2024.zip").as_deref(),
            Some("backup")
        );
        assert_eq!(patterns.extract_canonical_name("old-backup.zip"), None);
    }

    #[test]
    fn empty_or_absent_group_yields_no_name() {
        let patterns = list(&[r"^(x*)data$", r"^(.+)$"]);
        assert_eq!(patterns.extract_canonical_name("data"), None);

        let optional = list(&[r"^(?:(a)|b)\.zip$", r"^(.+)$"]);
        assert_eq!(optional.extract_canonical_name("b.zip"), None);
        assert_eq!(
            optional.extract_canonical_name("a.zip").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn empty_list_never_matches() {
        let patterns = PatternList::default();
        assert!(patterns.is_empty());
        assert_eq!(patterns.extract_canonical_name("job1-part1.zip"), None);
    }

    #[test]
    fn malformed_pattern_is_config_error() {
        let err = PatternList::compile([("PATTERN_1", r"^(unclosed")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref key, .. } if key == "PATTERN_1"));
    }

    #[test]
    fn pattern_without_group_is_config_error() {
        let err = PatternList::compile([("PATTERN_2", r"^job\d+$")]).unwrap_err();
        assert!(matches!(err, ConfigError::PatternWithoutGroup { ref key } if key == "PATTERN_2"));
    }

    #[test]
    fn lookup_stops_at_first_gap() {
        let env: HashMap<&str, &str> = [
            ("PATTERN_1", r"^(a)"),
            ("PATTERN_2", r"^(b)"),
            ("PATTERN_4", r"^(d)"),
        ]
        .into_iter()
        .collect();
        let patterns =
            PatternList::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(patterns.keys().collect::<Vec<_>>(), ["PATTERN_1", "PATTERN_2"]);
        assert_eq!(patterns.extract_canonical_name("dog"), None);
    }

    #[test]
    fn empty_value_ends_the_list() {
        let env: HashMap<&str, &str> = [("PATTERN_1", ""), ("PATTERN_2", r"^(b)")]
            .into_iter()
            .collect();
        let patterns =
            PatternList::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert!(patterns.is_empty());
    }
}
