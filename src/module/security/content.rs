//! Static scan of module text for risky idioms
//!
//! Advisory only: a forced load proceeds past a match with a warning.

use regex::RegexSet;
use tracing::debug;

/// Risk patterns, paired with a short label used in rejection messages
const RISK_PATTERNS: &[(&str, &str)] = &[
    (
        "network fetch piped into an interpreter",
        r"(?i)\b(curl|wget|fetch)\b[^\n|]*\|\s*(sudo\s+)?(ba|z|k|da|fi)?sh\b",
    ),
    (
        "network fetch piped into a script runtime",
        r"(?i)\b(curl|wget|fetch)\b[^\n|]*\|\s*(sudo\s+)?(python[0-9.]*|perl|ruby|node|php)\b",
    ),
    (
        "dynamic evaluation of a command substitution",
        r#"\beval\s+["']?(\$\(|`)"#,
    ),
    (
        "dynamic evaluation of decoded data",
        r"\beval\b[^\n]*\b(base64|xxd|openssl\s+enc)\b",
    ),
    (
        "process substitution into a fresh interpreter",
        r"\b(ba|z|k|da)?sh\s+<\(",
    ),
    (
        "sourcing a process substitution",
        r"(^|[\s;&|])(source|\.)\s+<\(",
    ),
    (
        "base64 decode piped into an interpreter",
        r"(?i)\bbase64\s+(-d|--decode|-D)\b[^\n]*\|\s*(sudo\s+)?((ba|z|k|da)?sh|python[0-9.]*|perl)\b",
    ),
];

/// Compiled risk-pattern scanner
#[derive(Debug, Clone)]
pub struct ContentScanner {
    set: RegexSet,
}

impl ContentScanner {
    /// Compile the built-in pattern list
    ///
    /// # Panics
    ///
    /// If a built-in pattern does not compile.
    pub fn new() -> Self {
        let set = RegexSet::new(RISK_PATTERNS.iter().map(|(_, pattern)| *pattern))
            .expect("built-in risk patterns must compile");
        Self { set }
    }

    /// Labels of every risk pattern found in `text`
    pub fn scan(&self, text: &str) -> Vec<&'static str> {
        let matches: Vec<&'static str> = self
            .set
            .matches(text)
            .into_iter()
            .map(|idx| RISK_PATTERNS[idx].0)
            .collect();
        if !matches.is_empty() {
            debug!("Content scan matched: {:?}", matches);
        }
        matches
    }

    /// Number of compiled patterns
    pub fn pattern_count(&self) -> usize {
        self.set.len()
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new()
    }
}
