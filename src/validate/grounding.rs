//! Anti-hallucination check for free-text fields.
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Decides whether free text references only things the artifact contains.
pub trait GroundingStrategy: Send + Sync {
    /// First token of `text` that is neither in `artifact` nor in `allowed`
    /// (lowercased terms), or `None` when the text is grounded.
    fn first_ungrounded(
        &self,
        text: &str,
        artifact: &str,
        allowed: &BTreeSet<String>,
    ) -> Option<String>;
}

/// Pattern-based identifier detection, matched case-insensitively against
/// the artifact's whole identifier tokens.
///
/// Identifier-like means one of: a backtick span, a double-quoted
/// identifier, a snake_case name, a dotted `owner.object` name, or a
/// CamelCase word. Plain prose words never count.
pub struct IdentifierGrounding {
    patterns: &'static IdentifierPatterns,
}

struct IdentifierPatterns {
    backtick: Regex,
    quoted: Regex,
    snake: Regex,
    dotted: Regex,
    camel: Regex,
    word: Regex,
    chain: Regex,
}

fn patterns() -> &'static IdentifierPatterns {
    static PATTERNS: OnceLock<IdentifierPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| IdentifierPatterns {
        backtick: Regex::new(r"`([^`\n]+)`").expect("backtick pattern"),
        quoted: Regex::new(r#""([A-Za-z_][A-Za-z0-9_$#.]*)""#).expect("quoted pattern"),
        snake: Regex::new(r"\b[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+\b").expect("snake pattern"),
        dotted: Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]+\.[A-Za-z_][A-Za-z0-9_]+\b")
            .expect("dotted pattern"),
        camel: Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").expect("camel pattern"),
        word: Regex::new(r"[A-Za-z_][A-Za-z0-9_$#]+").expect("word pattern"),
        chain: Regex::new(r"[A-Za-z_][A-Za-z0-9_$#]*(?:\.[A-Za-z_][A-Za-z0-9_$#]*)+")
            .expect("chain pattern"),
    })
}

impl IdentifierGrounding {
    pub fn new() -> Self {
        Self {
            patterns: patterns(),
        }
    }

    /// Candidate tokens with their byte offsets, in text order.
    fn candidates<'t>(&self, text: &'t str) -> Vec<(usize, &'t str)> {
        let p = self.patterns;
        let mut found = Vec::new();
        // Backtick spans are code snippets; check the words inside them.
        let mut covered = Vec::new();
        for caps in p.backtick.captures_iter(text) {
            let Some(inner) = caps.get(1) else {
                continue;
            };
            covered.push(inner.start()..inner.end());
            for word in p.word.find_iter(inner.as_str()) {
                found.push((inner.start() + word.start(), word.as_str()));
            }
        }
        for caps in p.quoted.captures_iter(text) {
            if let Some(inner) = caps.get(1) {
                found.push((inner.start(), inner.as_str()));
            }
        }
        for pattern in [&p.dotted, &p.snake, &p.camel] {
            for m in pattern.find_iter(text) {
                if covered.iter().any(|range| range.contains(&m.start())) {
                    continue;
                }
                found.push((m.start(), m.as_str()));
            }
        }
        found.sort();
        found.dedup();
        found
    }

    /// Lowercased identifier tokens of the artifact. Dotted chains add every
    /// contiguous `a.b` run as well as their single parts.
    fn artifact_tokens(&self, artifact: &str) -> BTreeSet<String> {
        let lowered = artifact.to_lowercase();
        let mut tokens: BTreeSet<String> = self
            .patterns
            .word
            .find_iter(&lowered)
            .flat_map(|m| {
                let word = m.as_str();
                let bare = word.trim_end_matches(['$', '#']);
                [word.to_string(), bare.to_string()]
            })
            .collect();
        for chain in self.patterns.chain.find_iter(&lowered) {
            let parts: Vec<&str> = chain.as_str().split('.').collect();
            for len in 2..=parts.len() {
                tokens.extend(parts.windows(len).map(|run| run.join(".")));
            }
        }
        tokens
    }
}

impl Default for IdentifierGrounding {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundingStrategy for IdentifierGrounding {
    fn first_ungrounded(
        &self,
        text: &str,
        artifact: &str,
        allowed: &BTreeSet<String>,
    ) -> Option<String> {
        let candidates = self.candidates(text);
        if candidates.is_empty() {
            return None;
        }
        let tokens = self.artifact_tokens(artifact);
        candidates
            .into_iter()
            .map(|(_, token)| token)
            .find(|token| {
                let lowered = token.to_lowercase();
                !allowed.contains(&lowered) && !tokens.contains(&lowered)
            })
            .map(str::to_string)
    }
}
