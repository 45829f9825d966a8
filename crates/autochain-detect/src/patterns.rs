//! Regex-based context pattern matching.
//!
//! Provides the pattern library and scoring heuristics used to recognise
//! project lifecycle events in free-form text such as a terminal capture.

use regex::Regex;

use autochain_core::{clamp_confidence, ContextType};

/// Score every content match starts from.
pub const BASE_CONFIDENCE: f64 = 0.7;

const SPECIFICITY_BOOST: f64 = 0.2;
const SHORT_MATCH_PENALTY: f64 = 0.1;
const SHORT_MATCH_CHARS: usize = 10;

const TEST_RUNNER_WORDS: [&str; 4] = ["test", "spec", "jest", "pytest"];
const BUILD_TOOL_WORDS: [&str; 4] = ["build", "compile", "webpack", "tsc"];

/// A single compiled regex pattern linked to a context type.
pub struct ContextPattern {
    pub regex: Regex,
    pub context_type: ContextType,
    /// The pattern as written, without the case/multiline flags.
    pub source: String,
}

/// A scored match produced by [`PatternSet::detect`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub context_type: ContextType,
    pub confidence: f64,
    pub pattern: String,
    pub matched_text: String,
    /// Byte offsets of the match within the scanned text.
    pub start: usize,
    pub end: usize,
}

/// Collection of all context patterns, compiled once and reused.
pub struct PatternSet {
    patterns: Vec<ContextPattern>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternSet {
    /// Create a new PatternSet with the built-in pattern library.
    pub fn new() -> Self {
        let mut set = Self {
            patterns: Vec::new(),
        };

        // =====================================================================
        // Git commit
        // =====================================================================
        set.push_builtin(
            ContextType::GitCommit,
            &[
                r"committed.*files? changed",
                r"git commit.*successful",
                r"\[.*\] .*commit.*",
                r"Changes committed successfully",
            ],
            "Invalid git commit regex",
        );

        // =====================================================================
        // Test failure
        // =====================================================================
        set.push_builtin(
            ContextType::TestFailure,
            &[
                r"test.*failed",
                r"assertion.*error",
                r"FAILED.*test",
                r"pytest.*failed",
                r"jest.*failed",
                r"Error.*test",
                r"\d+ failed.*\d+ passed",
            ],
            "Invalid test failure regex",
        );

        // =====================================================================
        // Build failure
        // =====================================================================
        set.push_builtin(
            ContextType::BuildFailure,
            &[
                r"build.*failed",
                r"compilation.*error",
                r"npm.*error",
                r"yarn.*error",
                r"webpack.*error",
                r"tsc.*error",
                r"cargo.*error",
            ],
            "Invalid build failure regex",
        );

        // =====================================================================
        // Dependency update
        // =====================================================================
        set.push_builtin(
            ContextType::DependencyUpdate,
            &[
                r"package.*updated",
                r"npm.*install",
                r"yarn.*install",
                r"pip.*install",
                r"requirements.*updated",
                r"cargo.*update",
            ],
            "Invalid dependency update regex",
        );

        // =====================================================================
        // Generic errors
        // =====================================================================
        set.push_builtin(
            ContextType::ErrorDetected,
            &[
                r"error:|ERROR:",
                r"exception.*occurred",
                r"traceback.*most recent",
                r"fatal.*error",
                r"segmentation.*fault",
            ],
            "Invalid error regex",
        );

        // =====================================================================
        // Code review
        // =====================================================================
        set.push_builtin(
            ContextType::CodeReview,
            &[
                r"review.*requested",
                r"pull.*request",
                r"merge.*request",
                r"code.*review",
                r"pr.*created",
            ],
            "Invalid code review regex",
        );

        set
    }

    fn push_builtin(&mut self, context_type: ContextType, sources: &[&str], msg: &str) {
        for source in sources {
            self.patterns.push(ContextPattern {
                regex: Regex::new(&format!("(?im){}", source)).expect(msg),
                context_type,
                source: source.to_string(),
            });
        }
    }

    /// Add a custom pattern. Matching is case-insensitive and multiline.
    pub fn add_pattern(
        &mut self,
        context_type: ContextType,
        source: &str,
    ) -> Result<(), regex::Error> {
        let regex = Regex::new(&format!("(?im){}", source))?;
        self.patterns.push(ContextPattern {
            regex,
            context_type,
            source: source.to_string(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Find every match of every pattern in `text`, scored but unfiltered.
    ///
    /// Matches come back grouped by pattern, in library order, each group in
    /// text order. Overlapping matches from different patterns are all kept.
    pub fn detect(&self, text: &str) -> Vec<PatternMatch> {
        let text_lower = text.to_lowercase();
        let mut matches = Vec::new();

        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                matches.push(PatternMatch {
                    context_type: pattern.context_type,
                    confidence: score(pattern.context_type, m.as_str(), &text_lower),
                    pattern: pattern.source.clone(),
                    matched_text: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }

        matches
    }
}

/// Score a single match against the text it was found in.
///
/// `text_lower` is the full scanned text, lowercased.
pub fn score(context_type: ContextType, matched: &str, text_lower: &str) -> f64 {
    let matched_lower = matched.to_lowercase();
    let mut confidence = BASE_CONFIDENCE;

    let specific = match context_type {
        ContextType::TestFailure => {
            matched_lower.contains("failed") && contains_any(text_lower, &TEST_RUNNER_WORDS)
        }
        ContextType::GitCommit => {
            matched_lower.contains("commit") && text_lower.contains("success")
        }
        ContextType::BuildFailure => {
            matched_lower.contains("error") && contains_any(text_lower, &BUILD_TOOL_WORDS)
        }
        _ => false,
    };
    if specific {
        confidence += SPECIFICITY_BOOST;
    }

    if matched.chars().count() < SHORT_MATCH_CHARS {
        confidence -= SHORT_MATCH_PENALTY;
    }

    clamp_confidence(confidence)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Slice `radius` characters of context on either side of `start..end`.
///
/// Offsets are byte offsets on char boundaries, as returned by the regex
/// engine.
pub fn snippet(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = if radius == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .nth(radius - 1)
            .map_or(0, |(i, _)| i)
    };
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);
    &text[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn of_type(matches: &[PatternMatch], ct: ContextType) -> Vec<&PatternMatch> {
        matches.iter().filter(|m| m.context_type == ct).collect()
    }

    #[test]
    fn test_pattern_library_compiles() {
        let set = PatternSet::new();
        assert_eq!(set.len(), 34);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_git_commit_success_is_boosted() {
        let set = PatternSet::new();
        let matches = set.detect("Changes committed successfully");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context_type, ContextType::GitCommit);
        assert!((matches[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(matches[0].pattern, "Changes committed successfully");
    }

    #[test]
    fn test_test_failure_with_runner_keyword() {
        let set = PatternSet::new();
        let matches = set.detect("pytest run: 3 failed, 10 passed");
        let failures = of_type(&matches, ContextType::TestFailure);
        assert!(!failures.is_empty());
        assert!(failures.iter().all(|m| (m.confidence - 0.9).abs() < 1e-9));
    }

    #[test]
    fn test_build_failure_with_tool_keyword() {
        let set = PatternSet::new();
        let matches = set.detect("tsc: compilation error in src/main.ts");
        let builds = of_type(&matches, ContextType::BuildFailure);
        assert_eq!(builds.len(), 2);
        assert!(builds.iter().all(|m| (m.confidence - 0.9).abs() < 1e-9));
    }

    #[test]
    fn test_short_match_is_penalised() {
        let set = PatternSet::new();
        let matches = set.detect("error: boom");
        let errors = of_type(&matches, ContextType::ErrorDetected);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].matched_text, "error:");
        assert!((errors[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let set = PatternSet::new();
        let matches = set.detect("BUILD FAILED after 3 steps");
        assert_eq!(of_type(&matches, ContextType::BuildFailure).len(), 1);
    }

    #[test]
    fn test_each_line_matches_independently() {
        let set = PatternSet::new();
        let matches = set.detect("test a failed\ntest b failed");
        let lines: Vec<_> = matches
            .iter()
            .filter(|m| m.pattern == "test.*failed")
            .map(|m| m.matched_text.as_str())
            .collect();
        assert_eq!(lines, vec!["test a failed", "test b failed"]);
    }

    #[test]
    fn test_offsets_slice_back_to_match() {
        let set = PatternSet::new();
        let text = "ok\nnpm ERR! install error\n";
        for m in set.detect(text) {
            assert_eq!(&text[m.start..m.end], m.matched_text);
        }
    }

    #[test]
    fn test_benign_text_has_no_matches() {
        let set = PatternSet::new();
        assert!(set.detect("All good, nothing to see here.").is_empty());
    }

    #[test]
    fn test_add_custom_pattern() {
        let mut set = PatternSet::new();
        set.add_pattern(ContextType::DeploymentReady, r"ready to ship")
            .unwrap();
        let matches = set.detect("Release candidate READY TO SHIP");
        assert_eq!(of_type(&matches, ContextType::DeploymentReady).len(), 1);
        assert!(set.add_pattern(ContextType::Unknown, "(unclosed").is_err());
    }

    #[test]
    fn test_snippet_radius() {
        let text = "0123456789MATCH0123456789";
        assert_eq!(snippet(text, 10, 15, 3), "789MATCH012");
        assert_eq!(snippet(text, 10, 15, 50), text);
        assert_eq!(snippet(text, 10, 15, 0), "MATCH");
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = "ééééMATCHéééé";
        let start = text.find("MATCH").unwrap();
        let end = start + "MATCH".len();
        assert_eq!(snippet(text, start, end, 2), "ééMATCHéé");
    }
}
