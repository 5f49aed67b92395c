//! Domain matcher using the Aho-Corasick algorithm
//!
//! A [`DomainMatcher`] answers one question: does the target domain match any
//! of the configured patterns? It supports four pattern kinds:
//!
//! - **Full** (`full:`): exact, case-insensitive, O(1) hash lookup
//! - **Subdomain** (`domain:`): the domain itself or any subdomain of it
//! - **Keyword** (`keyword:` or a bare string): substring search
//! - **Regex** (`regexp:`): regular expression
//!
//! Subdomain and keyword patterns are compiled into Aho-Corasick automata so
//! that matching cost grows with the domain length rather than the number of
//! patterns.
//!
//! # Example
//!
//! ```
//! use routing_engine::rules::domain::DomainMatcher;
//!
//! let matcher = DomainMatcher::builder()
//!     .add_full("example.com")
//!     .add_subdomain("google.com")
//!     .add_keyword("ads")
//!     .build()
//!     .unwrap();
//!
//! assert!(matcher.matches("example.com"));
//! assert!(matcher.matches("mail.google.com"));
//! assert!(matcher.matches("ads.example.org"));
//! assert!(!matcher.matches("www.example.com"));
//! ```

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::error::RuleError;

/// Kind of a parsed domain pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainPatternKind {
    /// Exact match
    Full,
    /// Domain or any of its subdomains
    Subdomain,
    /// Substring match
    Keyword,
    /// Regular expression
    Regex,
}

/// Parse one configured domain entry into its kind and value.
///
/// Bare strings are keywords. `geosite:` and `ext:` lists need external
/// data files and are rejected.
///
/// # Errors
///
/// Returns `RuleError::InvalidTarget` for empty values or unsupported prefixes.
///
/// # Example
///
/// ```
/// use routing_engine::rules::domain::{parse_domain_pattern, DomainPatternKind};
///
/// let (kind, value) = parse_domain_pattern("domain:Example.COM").unwrap();
/// assert_eq!(kind, DomainPatternKind::Subdomain);
/// assert_eq!(value, "example.com");
/// ```
pub fn parse_domain_pattern(entry: &str) -> Result<(DomainPatternKind, String), RuleError> {
    let entry = entry.trim();
    let (kind, value) = if let Some(v) = entry.strip_prefix("full:") {
        (DomainPatternKind::Full, v)
    } else if let Some(v) = entry.strip_prefix("domain:") {
        (DomainPatternKind::Subdomain, v)
    } else if let Some(v) = entry.strip_prefix("keyword:") {
        (DomainPatternKind::Keyword, v)
    } else if let Some(v) = entry.strip_prefix("regexp:") {
        (DomainPatternKind::Regex, v)
    } else if entry.starts_with("geosite:") || entry.starts_with("ext:") {
        return Err(RuleError::InvalidTarget(format!(
            "external domain lists are not supported: {entry}"
        )));
    } else {
        (DomainPatternKind::Keyword, entry)
    };

    if value.is_empty() {
        return Err(RuleError::InvalidTarget(format!(
            "empty domain pattern: {entry:?}"
        )));
    }

    // Regex keeps its case; everything else is normalized.
    let value = match kind {
        DomainPatternKind::Regex => value.to_string(),
        DomainPatternKind::Subdomain => value.trim_start_matches('.').to_ascii_lowercase(),
        _ => value.to_ascii_lowercase(),
    };
    Ok((kind, value))
}

/// Compiled domain matcher
#[derive(Debug)]
pub struct DomainMatcher {
    /// Exact domains (lowercase)
    full: HashSet<String>,

    /// Automaton over reversed subdomain patterns with a leading dot
    subdomain_automaton: Option<AhoCorasick>,
    /// Pattern lengths indexed by automaton pattern ID
    subdomain_lens: Vec<usize>,

    /// Automaton for keyword (substring) matching
    keyword_automaton: Option<AhoCorasick>,

    /// Compiled regex patterns
    regexes: Vec<Regex>,

    /// Total count of all patterns
    pattern_count: usize,
}

impl DomainMatcher {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> DomainMatcherBuilder {
        DomainMatcherBuilder::new()
    }

    /// Build a matcher from configured entries such as `"domain:example.com"`
    ///
    /// # Errors
    ///
    /// Returns `RuleError` on malformed entries or invalid regexes.
    pub fn from_patterns<S: AsRef<str>>(entries: &[S]) -> Result<Self, RuleError> {
        let mut builder = DomainMatcherBuilder::new();
        for entry in entries {
            builder = builder.add_pattern(entry.as_ref())?;
        }
        builder.build()
    }

    /// Match a domain against all patterns
    ///
    /// Order of checks: full, subdomain, keyword, regex. An empty domain never
    /// matches.
    #[must_use]
    pub fn matches(&self, domain: &str) -> bool {
        let domain = domain.trim_end_matches('.');
        if domain.is_empty() {
            return false;
        }
        let domain = domain.to_ascii_lowercase();

        self.full.contains(&domain)
            || self.match_subdomain(&domain)
            || self
                .keyword_automaton
                .as_ref()
                .is_some_and(|ac| ac.is_match(&domain))
            || self.regexes.iter().any(|re| re.is_match(&domain))
    }

    /// Subdomain match on the reversed domain.
    ///
    /// Pattern "google.com" is stored as ".moc.elgoog"; the domain
    /// "mail.google.com" is searched as ".moc.elgoog.liam". A hit must start at
    /// position 0 and end at a label boundary.
    fn match_subdomain(&self, domain: &str) -> bool {
        let Some(automaton) = self.subdomain_automaton.as_ref() else {
            return false;
        };

        let reversed: String = format!(".{}", domain.chars().rev().collect::<String>());
        let bytes = reversed.as_bytes();

        automaton.find_overlapping_iter(&reversed).any(|mat| {
            mat.start() == 0
                && mat.len() == self.subdomain_lens[mat.pattern().as_usize()]
                && (mat.end() == bytes.len() || bytes[mat.end()] == b'.')
        })
    }

    /// Check if the matcher has no patterns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern_count == 0
    }

    /// Total number of patterns
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }
}

/// Builder for [`DomainMatcher`]
#[derive(Debug, Default)]
pub struct DomainMatcherBuilder {
    full: Vec<String>,
    subdomain: Vec<String>,
    keyword: Vec<String>,
    regex: Vec<String>,
}

impl DomainMatcherBuilder {
    /// Create a new empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefixed entry (`full:`, `domain:`, `keyword:`, `regexp:`, bare)
    ///
    /// # Errors
    ///
    /// Returns `RuleError` on malformed entries or invalid regexes.
    pub fn add_pattern(self, entry: &str) -> Result<Self, RuleError> {
        let (kind, value) = parse_domain_pattern(entry)?;
        Ok(match kind {
            DomainPatternKind::Full => self.add_full(value),
            DomainPatternKind::Subdomain => self.add_subdomain(value),
            DomainPatternKind::Keyword => self.add_keyword(value),
            DomainPatternKind::Regex => self.add_regex(value)?,
        })
    }

    /// Add an exact domain
    #[must_use]
    pub fn add_full(mut self, domain: impl Into<String>) -> Self {
        self.full.push(domain.into().to_ascii_lowercase());
        self
    }

    /// Add a subdomain pattern
    ///
    /// "google.com" matches "google.com" and "www.google.com" but not
    /// "notgoogle.com".
    #[must_use]
    pub fn add_subdomain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into().to_ascii_lowercase();
        self.subdomain
            .push(domain.trim_start_matches('.').to_string());
        self
    }

    /// Add a keyword (substring) pattern
    #[must_use]
    pub fn add_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword.push(keyword.into().to_ascii_lowercase());
        self
    }

    /// Add a regex pattern
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidRegex` if the pattern does not compile.
    pub fn add_regex(mut self, pattern: impl Into<String>) -> Result<Self, RuleError> {
        let pattern = pattern.into();
        Regex::new(&pattern).map_err(|_| RuleError::InvalidRegex(pattern.clone()))?;
        self.regex.push(pattern);
        Ok(self)
    }

    /// Compile the collected patterns
    ///
    /// # Errors
    ///
    /// Returns `RuleError::CompilationError` if an automaton cannot be built.
    pub fn build(self) -> Result<DomainMatcher, RuleError> {
        let pattern_count =
            self.full.len() + self.subdomain.len() + self.keyword.len() + self.regex.len();

        let (subdomain_automaton, subdomain_lens) = if self.subdomain.is_empty() {
            (None, Vec::new())
        } else {
            let reversed: Vec<String> = self
                .subdomain
                .iter()
                .map(|s| format!(".{}", s.chars().rev().collect::<String>()))
                .collect();
            let lens = reversed.iter().map(String::len).collect();
            let automaton = AhoCorasick::new(&reversed)
                .map_err(|e| RuleError::CompilationError(format!("subdomain automaton: {e}")))?;
            (Some(automaton), lens)
        };

        let keyword_automaton = if self.keyword.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&self.keyword)
                    .map_err(|e| RuleError::CompilationError(format!("keyword automaton: {e}")))?,
            )
        };

        let regexes = self
            .regex
            .iter()
            .map(|p| Regex::new(p).map_err(|_| RuleError::InvalidRegex(p.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DomainMatcher {
            full: self.full.into_iter().collect(),
            subdomain_automaton,
            subdomain_lens,
            keyword_automaton,
            regexes,
            pattern_count,
        })
    }
}
