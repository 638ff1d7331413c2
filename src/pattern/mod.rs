//! Patterns that end a session call

mod matcher;

pub use matcher::{Match, Matcher};

use regex::Regex;

/// Pattern types for matching process output.
///
/// A pattern marks the end of a command's output, typically the shell prompt.
/// It is searched in everything the call has accumulated so far on a stream,
/// not just the latest chunk, so a prompt split across two reads still
/// matches.
///
/// # Examples
///
/// ```
/// use interactrust::Pattern;
///
/// // Exact string (fastest)
/// let p1 = Pattern::exact("password: ");
///
/// // Regular expression
/// let p2 = Pattern::regex(r"\][#$] $").unwrap();
///
/// // Glob pattern
/// let p3 = Pattern::glob("*@*> ");
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact string match.
    ///
    /// Uses the Boyer-Moore-Horspool algorithm.
    Exact(String),

    /// Regular expression match.
    ///
    /// Capture groups of the match are returned in
    /// [`Output::captures`](crate::Output::captures).
    Regex(Regex),

    /// Glob pattern match (shell-style wildcards).
    ///
    /// **Performance Note**: glob matching tries every substring of the
    /// accumulated output and is much slower than the other kinds.
    Glob(String),
}

impl Pattern {
    /// Create an exact string pattern.
    ///
    /// # Examples
    ///
    /// ```
    /// use interactrust::Pattern;
    ///
    /// let pattern = Pattern::exact("$ ");
    /// let pattern2 = Pattern::exact(String::from(">>> "));
    /// ```
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns a regex error if the pattern is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use interactrust::Pattern;
    ///
    /// // A user@host prompt
    /// let pattern = Pattern::regex(r"\w+@\w+ .+> ").unwrap();
    ///
    /// // Job id and pid reported by a shell
    /// let pattern = Pattern::regex(r"\[\d+\] +(\d+)").unwrap();
    /// ```
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Create a glob pattern.
    pub fn glob(pattern: &str) -> Self {
        Pattern::Glob(pattern.to_string())
    }

    /// Convert pattern to a matcher implementation
    pub fn to_matcher(&self) -> Result<Box<dyn Matcher>, crate::result::PatternError> {
        use matcher::{ExactMatcher, GlobMatcher, RegexMatcher};

        match self {
            Pattern::Exact(s) => Ok(Box::new(ExactMatcher::new(s.as_bytes())?)),
            Pattern::Regex(r) => Ok(Box::new(RegexMatcher::new(r.as_str())?)),
            Pattern::Glob(g) => Ok(Box::new(GlobMatcher::new(g)?)),
        }
    }

    /// Regex source text equivalent to this pattern.
    ///
    /// Used to build alternations such as "echoed command or prompt".
    pub fn to_regex_source(&self) -> Result<String, crate::result::PatternError> {
        match self {
            Pattern::Exact(s) => Ok(regex::escape(s)),
            Pattern::Regex(r) => Ok(r.as_str().to_string()),
            Pattern::Glob(g) => {
                let glob = globset::Glob::new(g)
                    .map_err(|e| crate::result::PatternError::InvalidGlob(e.to_string()))?;
                // globset anchors its regex; the session searches instead.
                let anchored = glob.regex();
                let body = anchored.strip_prefix("(?-u)").unwrap_or(anchored);
                let body = body.strip_prefix('^').unwrap_or(body);
                Ok(body.strip_suffix('$').unwrap_or(body).to_string())
            }
        }
    }

    /// Human readable form, used in warnings.
    pub fn describe(&self) -> &str {
        match self {
            Pattern::Exact(s) => s,
            Pattern::Regex(r) => r.as_str(),
            Pattern::Glob(g) => g,
        }
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_regex_source_is_escaped() {
        let pattern = Pattern::exact("a.b$ ");
        assert_eq!(pattern.to_regex_source().unwrap(), r"a\.b\$ ");
    }

    #[test]
    fn test_regex_source_roundtrip() {
        let pattern = Pattern::regex(r"\d+> ").unwrap();
        assert_eq!(pattern.to_regex_source().unwrap(), r"\d+> ");
    }

    #[test]
    fn test_glob_regex_source_searches() {
        let pattern = Pattern::glob("*.txt");
        let source = pattern.to_regex_source().unwrap();
        let re = regex::bytes::Regex::new(&source).unwrap();
        assert!(re.is_match(b"ls\nnotes.txt\n"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Pattern::exact("$ ").describe(), "$ ");
        assert_eq!(Pattern::regex("x+").unwrap().describe(), "x+");
    }

    #[test]
    fn test_empty_exact_pattern_rejected() {
        assert!(Pattern::exact("").to_matcher().is_err());
    }
}
