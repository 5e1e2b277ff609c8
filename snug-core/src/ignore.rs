//! Ignore matcher (C7): gitignore-style line-based glob/prefix/negation
//! matching over relative paths (spec.md §4.7).
//!
//! Rules, in the order a matcher reads them:
//! - blank lines and lines starting with `#` are comments
//! - a leading `!` negates the pattern (re-includes a path otherwise ignored)
//! - a trailing `/` restricts the pattern to directories
//! - `*` and `?` are glob wildcards within a path segment
//! - the last matching pattern in the file wins

#[derive(Clone, Debug)]
struct Rule {
    negated: bool,
    dir_only: bool,
    anchored: bool,
    segments: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ignore rules from `contents` (the text of an ignore file, one
    /// pattern per line).
    pub fn from_str(contents: &str) -> Self {
        let mut rules = Vec::new();
        for raw_line in contents.lines() {
            let line = raw_line.trim_end();
            if line.is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let (negated, rest) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, rest) = match rest.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            let anchored = rest.starts_with('/');
            let pattern = rest.trim_start_matches('/');
            let segments = pattern.split('/').map(|s| s.to_string()).collect();
            rules.push(Rule {
                negated,
                dir_only,
                anchored,
                segments,
            });
        }
        Self { rules }
    }

    /// `relative_path` uses `/` separators regardless of platform.
    /// Last-matching-rule-wins (spec.md §4.7).
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        let path_segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule_matches(rule, &path_segments) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

fn rule_matches(rule: &Rule, path_segments: &[&str]) -> bool {
    if rule.anchored || rule.segments.len() > 1 {
        if rule.segments.len() > path_segments.len() {
            return false;
        }
        // Anchored patterns match only at the root; unanchored multi-segment
        // patterns may match starting at any depth.
        let windows: Box<dyn Iterator<Item = &[&str]>> = if rule.anchored {
            Box::new(std::iter::once(path_segments))
        } else {
            Box::new(
                (0..=path_segments.len().saturating_sub(rule.segments.len()))
                    .map(move |start| &path_segments[start..]),
            )
        };
        for window in windows {
            if window.len() >= rule.segments.len()
                && window[..rule.segments.len()]
                    .iter()
                    .zip(&rule.segments)
                    .all(|(seg, pat)| glob_match(pat, seg))
            {
                return true;
            }
        }
        false
    } else {
        // Single-segment pattern: matches any path component by name.
        let pattern = &rule.segments[0];
        path_segments.iter().any(|seg| glob_match(pattern, seg))
    }
}

/// `*` matches any run of characters (not crossing `/`, which callers never
/// pass in since matching is per-segment); `?` matches exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_rec(&p, &t)
}

fn glob_match_rec(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => glob_match_rec(&p[1..], t) || (!t.is_empty() && glob_match_rec(p, &t[1..])),
        Some('?') => !t.is_empty() && glob_match_rec(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && glob_match_rec(&p[1..], &t[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let m = IgnoreMatcher::from_str("# comment\n\n*.log\n");
        assert!(m.is_ignored("debug.log", false));
        assert!(!m.is_ignored("readme.md", false));
    }

    #[test]
    fn trailing_slash_restricts_to_directories() {
        let m = IgnoreMatcher::from_str("build/\n");
        assert!(m.is_ignored("build", true));
        assert!(!m.is_ignored("build", false));
    }

    #[test]
    fn negation_re_includes_a_path() {
        let m = IgnoreMatcher::from_str("*.log\n!keep.log\n");
        assert!(m.is_ignored("debug.log", false));
        assert!(!m.is_ignored("keep.log", false));
    }

    #[test]
    fn last_matching_rule_wins() {
        let m = IgnoreMatcher::from_str("*.log\n!*.log\n*.log\n");
        assert!(m.is_ignored("debug.log", false));
    }

    #[test]
    fn anchored_pattern_only_matches_at_root() {
        let m = IgnoreMatcher::from_str("/build\n");
        assert!(m.is_ignored("build", true));
        assert!(!m.is_ignored("sub/build", true));
    }

    #[test]
    fn unanchored_multi_segment_pattern_matches_any_depth() {
        let m = IgnoreMatcher::from_str("target/debug\n");
        assert!(m.is_ignored("target/debug", true));
        assert!(m.is_ignored("nested/target/debug", true));
        assert!(!m.is_ignored("target/release", true));
    }

    #[test]
    fn wildcards_match_within_a_segment() {
        let m = IgnoreMatcher::from_str("*.tmp\nfile?.txt\n");
        assert!(m.is_ignored("a.tmp", false));
        assert!(m.is_ignored("dir/a.tmp", false));
        assert!(m.is_ignored("file1.txt", false));
        assert!(!m.is_ignored("file12.txt", false));
    }
}
