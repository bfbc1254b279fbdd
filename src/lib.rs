//! Regular expression matching by Thompson NFA construction and
//! simulation.
//!
//! Based on Russ Cox's article <https://swtch.com/~rsc/regexp/regexp1.html>.
//! Matching never backtracks: every live automaton state advances in
//! lockstep over the subject, so the cost is linear in the subject length
//! for a fixed pattern.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern bytes ──postfix::compile──>  postfix tokens  ──Builder::build──>  Automaton
//!                                                                              │
//!                      MatchOutcome  <──Matcher::finish──  Matcher::step  <────┘
//! ```
//!
//! 1. [`postfix::compile`] converts the infix pattern into postfix tokens,
//!    making concatenation explicit.
//! 2. [`Builder`] turns the tokens into an [`Automaton`] by composing
//!    fragments whose dangling edges are patched once their successor is
//!    known.
//! 3. [`Matcher`] runs the automaton over the subject with two state sets
//!    and generation-stamped epsilon closures.
//!
//! [`Regex`] drives all three for callers that just want an answer.
//!
//! # Pattern language
//!
//! | syntax   | meaning                                    |
//! |----------|--------------------------------------------|
//! | `x`      | the literal byte `x`                       |
//! | `\x`     | the literal byte `x`, even if an operator  |
//! | `.`      | any byte                                   |
//! | `[a-z]`  | any byte in the inclusive range            |
//! | `^`, `$` | start, end of the subject                  |
//! | `ab`     | concatenation                              |
//! | `a\|b`   | alternation                                |
//! | `a*`, `a+`, `a?` | zero-or-more, one-or-more, zero-or-one |
//! | `(a)`    | grouping                                   |
//!
//! # Match semantics
//!
//! A match is anchored at both ends by construction: the pattern must
//! account for the whole subject.  Search for a substring by padding the
//! pattern with `.*`.
//!
//! ```
//! use regex_thompson::Regex;
//!
//! let re = Regex::new("a(b|c)*d").unwrap();
//! assert!(re.is_match("abcbd"));
//! assert!(!re.is_match("xabcbd"));
//!
//! let re = Regex::new(".*needle.*").unwrap();
//! assert!(re.is_match("haystack with a needle in it"));
//! ```

use log::debug;

pub mod matcher;
pub mod nfa;
pub mod postfix;

pub use matcher::{Matcher, MatcherMemory, StateSet};
pub use nfa::{AssertKind, Automaton, Builder, State, StateId};
pub use postfix::Token;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why a pattern could not be compiled or a subject could not be matched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A `(` with no matching `)`.
    #[error("unbalanced group: `(` at offset {offset} is never closed")]
    UnclosedGroup { offset: usize },

    /// A `)` with no matching `(`.
    #[error("unbalanced group: `)` at offset {offset} has no matching `(`")]
    UnopenedGroup { offset: usize },

    /// A `[` not followed by exactly `lo-hi]`.
    #[error("malformed character class at offset {offset}, expected `[x-y]`")]
    MalformedClass { offset: usize },

    /// A `[lo-hi]` class with `lo > hi`, which can match nothing.
    #[error("reversed character range `{}-{}`", .lo.escape_ascii(), .hi.escape_ascii())]
    ReversedRange { lo: u8, hi: u8 },

    /// The pattern ends with a lone `\`.
    #[error("dangling escape at end of pattern")]
    DanglingEscape,

    /// An operator found fewer operands than it needs (`a|`, `*a`, ...).
    #[error("operator `{op}` is missing an operand")]
    MissingOperand { op: Token },

    /// Construction did not end with exactly one fragment.
    #[error("malformed pattern: {fragments} fragments left after construction, expected 1")]
    Malformed { fragments: usize },

    #[error("pattern is {len} bytes long, limit is {limit}")]
    PatternTooLong { len: usize, limit: usize },

    #[error("subject is {len} bytes long, limit is {limit}")]
    SubjectTooLong { len: usize, limit: usize },

    /// The run visited more states than [`Config::fuel`] allows.
    #[error("match exceeded its budget of {limit} state visits")]
    FuelExhausted { limit: usize },
}

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pattern is not well formed.
    Syntax,
    /// An input exceeded a configured limit.
    ResourceExhausted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PatternTooLong { .. }
            | Error::SubjectTooLong { .. }
            | Error::FuelExhausted { .. } => ErrorKind::ResourceExhausted,
            _ => ErrorKind::Syntax,
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind() == ErrorKind::Syntax
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Longest pattern or subject accepted by default.
pub const DEFAULT_MAX_LEN: usize = 5000;

/// Limits applied while compiling and matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub(crate) max_pattern_len: usize,
    pub(crate) max_subject_len: usize,
    pub(crate) fuel: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pattern_len: DEFAULT_MAX_LEN,
            max_subject_len: DEFAULT_MAX_LEN,
            fuel: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the longest accepted pattern, in bytes.
    pub fn max_pattern_len(mut self, len: usize) -> Self {
        self.max_pattern_len = len;
        self
    }

    /// Set the longest accepted subject, in bytes.
    pub fn max_subject_len(mut self, len: usize) -> Self {
        self.max_subject_len = len;
        self
    }

    /// Bound the number of states a single match may visit.  `None`
    /// disables the check.
    pub fn fuel(mut self, fuel: Option<usize>) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn get_max_pattern_len(&self) -> usize {
        self.max_pattern_len
    }

    pub fn get_max_subject_len(&self) -> usize {
        self.max_subject_len
    }

    pub fn get_fuel(&self) -> Option<usize> {
        self.fuel
    }
}

// ---------------------------------------------------------------------------
// Match driver
// ---------------------------------------------------------------------------

/// The result of matching one subject.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Whether the pattern matched the whole subject.
    pub accepted: bool,
    /// Every byte that advanced at least one live thread, in order.
    ///
    /// This is an approximation, not a capture group: a byte is kept when
    /// any thread consumed it, even if that thread later died.  Bytes
    /// consumed before a failed match are kept too.
    pub captured: Vec<u8>,
}

/// A compiled pattern, ready to match any number of subjects.
#[derive(Debug, Clone)]
pub struct Regex {
    automaton: Automaton,
    config: Config,
}

impl Regex {
    /// Compile `pattern` with the default [`Config`].
    pub fn new(pattern: impl AsRef<[u8]>) -> Result<Self, Error> {
        Self::with_config(pattern, Config::default())
    }

    pub fn with_config(pattern: impl AsRef<[u8]>, config: Config) -> Result<Self, Error> {
        let pattern = pattern.as_ref();
        if pattern.len() > config.max_pattern_len {
            return Err(Error::PatternTooLong {
                len: pattern.len(),
                limit: config.max_pattern_len,
            });
        }

        let postfix = postfix::compile(pattern)?;
        debug!(
            "pattern `{}` -> postfix `{}`",
            pattern.escape_ascii(),
            postfix::render(&postfix)
        );

        let automaton = Builder::new().build(&postfix)?;
        debug!("built automaton with {} states", automaton.num_states());

        Ok(Self { automaton, config })
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Match `subject` using fresh matcher memory.
    pub fn run(&self, subject: impl AsRef<[u8]>) -> Result<MatchOutcome, Error> {
        let mut memory = MatcherMemory::default();
        self.run_with(&mut memory, subject)
    }

    /// Match `subject`, reusing the allocations in `memory`.
    ///
    /// Input is consumed until it runs out or no thread is left alive.
    pub fn run_with(
        &self,
        memory: &mut MatcherMemory,
        subject: impl AsRef<[u8]>,
    ) -> Result<MatchOutcome, Error> {
        let subject = subject.as_ref();
        if subject.len() > self.config.max_subject_len {
            return Err(Error::SubjectTooLong {
                len: subject.len(),
                limit: self.config.max_subject_len,
            });
        }

        let check_fuel = |matcher: &Matcher<'_>| match self.config.fuel {
            Some(limit) if matcher.visits() > limit => Err(Error::FuelExhausted { limit }),
            _ => Ok(()),
        };

        let mut matcher = memory.matcher(&self.automaton);
        check_fuel(&matcher)?;
        for &b in subject {
            if matcher.is_dead() {
                break;
            }
            matcher.step(b);
            check_fuel(&matcher)?;
        }
        Ok(matcher.finish())
    }

    /// Whether the pattern matches the whole `subject`.  Subjects over
    /// the configured limits never match.
    pub fn is_match(&self, subject: impl AsRef<[u8]>) -> bool {
        self.run(subject).is_ok_and(|outcome| outcome.accepted)
    }
}

/// Compile `pattern` and match it against `subject`, reporting why a
/// pattern or subject was rejected.
pub fn try_match(
    pattern: impl AsRef<[u8]>,
    subject: impl AsRef<[u8]>,
    config: Config,
) -> Result<MatchOutcome, Error> {
    Regex::with_config(pattern, config)?.run(subject)
}

/// Compile `pattern` and match it against `subject` with the default
/// [`Config`].
///
/// Invalid patterns and oversized inputs are reported as "no match"; the
/// reason is logged at debug level.  Use [`try_match`] to get it back.
pub fn match_pattern(pattern: impl AsRef<[u8]>, subject: impl AsRef<[u8]>) -> MatchOutcome {
    match try_match(pattern, subject, Config::default()) {
        Ok(outcome) => outcome,
        Err(err) => {
            debug!("reporting no match: {}", err);
            MatchOutcome::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(pattern: &str, subject: &str) -> bool {
        try_match(pattern, subject, Config::default())
            .expect("pattern should compile")
            .accepted
    }

    /// Assert that our matcher and the `regex` crate agree on whether
    /// `input` matches `pattern` in full.
    ///
    /// The pattern must stay inside the syntax both engines read the same
    /// way.  The `regex` crate runs in byte mode (`(?s-u)`) so `.` matches
    /// any byte, and is anchored with `^(?:...)$` to get our whole-subject
    /// semantics.
    fn assert_matches_regex_crate(pattern: &str, regex: &Regex, input: &str) {
        let full = format!("(?s-u)^(?:{})$", pattern);
        let re = regex::bytes::Regex::new(&full).expect("regex crate should parse pattern");
        let expected = re.is_match(input.as_bytes());

        let actual = regex.run(input).expect("input within limits").accepted;
        assert_eq!(
            actual, expected,
            "mismatch for pattern `{}` on input {:?}: ours={}, regex crate={}",
            pattern, input, actual, expected
        );

        // Same answer when reusing memory.
        let mut memory = MatcherMemory::default();
        let reused = regex.run_with(&mut memory, input).unwrap().accepted;
        assert_eq!(reused, expected);
    }

    // -- Concrete scenarios --------------------------------------------------

    #[test]
    fn test_literal_concatenation() {
        assert!(accepts("abc", "abc"));
        assert!(!accepts("abc", "abd"));
    }

    #[test]
    fn test_alternation() {
        assert!(accepts("a|b", "b"));
        assert!(accepts("a|b", "a"));
        assert!(!accepts("a|b", "c"));
    }

    #[test]
    fn test_zero_or_more() {
        assert!(accepts("a*", ""));
        assert!(accepts("a*", "aaaa"));
        assert!(!accepts("a*", "aab"));
    }

    #[test]
    fn test_one_or_more() {
        assert!(!accepts("a+", ""));
        assert!(accepts("a+", "a"));
        assert!(accepts("a+", "aaa"));
    }

    #[test]
    fn test_optional() {
        assert!(accepts("a?b", "b"));
        assert!(accepts("a?b", "ab"));
        assert!(!accepts("a?b", "aab"));
    }

    #[test]
    fn test_anchors() {
        assert!(accepts("^abc$", "abc"));
        assert!(!accepts("^abc$", "xabc"));
    }

    #[test]
    fn test_wildcard_and_class() {
        assert!(accepts("a.c", "abc"));
        assert!(accepts("a.c", "a\nc"));
        assert!(accepts("[0-9]+", "2024"));
        assert!(!accepts("[0-9]+", "20x4"));
        assert!(accepts("x[a-c]*y", "xabcbay"));
    }

    #[test]
    fn test_escapes() {
        assert!(accepts(r"a\*", "a*"));
        assert!(!accepts(r"a\*", "aa"));
        assert!(accepts(r"\(a\)", "(a)"));
        assert!(accepts(r"1\+1", "1+1"));
        assert!(accepts(r"\.", "."));
        assert!(!accepts(r"\.", "x"));
    }

    #[test]
    fn test_combined_pattern_lines() {
        // Batch mode joins pattern lines as `(p1)|(p2)|...`.
        let combined = "(ab+)|(c?d)|([x-z]*)";
        for subject in ["abbb", "d", "cd", "", "xyzzy"] {
            assert!(accepts(combined, subject), "{:?}", subject);
        }
        assert!(!accepts(combined, "ccd"));
    }

    // -- Error handling ------------------------------------------------------

    #[test]
    fn test_unbalanced_group_never_builds() {
        for p in ["(a|b", "((a)", "a)", "(a))(", ")("] {
            let err = Regex::new(p).unwrap_err();
            assert!(err.is_syntax(), "{}: {:?}", p, err);
        }
        assert_eq!(
            Regex::new("(a|b").unwrap_err(),
            Error::UnclosedGroup { offset: 0 }
        );
    }

    #[test]
    fn test_malformed_patterns_are_syntax_errors() {
        for p in ["", "a|", "|", "*", "a||b", "[a", "[z-a]", "a\\", "()", "(|a)"] {
            let err = Regex::new(p).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Syntax, "{}: {:?}", p, err);
        }
    }

    #[test]
    fn test_invalid_pattern_reports_no_match() {
        assert_eq!(match_pattern("(a|b", "a"), MatchOutcome::default());
        assert_eq!(
            match_pattern("a+", "aa"),
            MatchOutcome {
                accepted: true,
                captured: b"aa".to_vec(),
            }
        );
    }

    #[test]
    fn test_pattern_too_long() {
        let config = Config::new().max_pattern_len(3);
        assert_eq!(
            Regex::with_config("abcd", config).unwrap_err(),
            Error::PatternTooLong { len: 4, limit: 3 }
        );
        assert!(Regex::with_config("abc", config).is_ok());
        let long = "a".repeat(DEFAULT_MAX_LEN + 1);
        let err = Regex::new(&long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_subject_too_long() {
        let re = Regex::with_config("a*", Config::new().max_subject_len(4)).unwrap();
        assert!(re.run("aaaa").unwrap().accepted);
        assert_eq!(
            re.run("aaaaa").unwrap_err(),
            Error::SubjectTooLong { len: 5, limit: 4 }
        );
        assert!(!re.is_match("aaaaa"));
    }

    #[test]
    fn test_fuel() {
        let re = Regex::with_config("(a|b)*c", Config::new().fuel(Some(10))).unwrap();
        assert_eq!(
            re.run("ababababab").unwrap_err(),
            Error::FuelExhausted { limit: 10 }
        );
        let re = Regex::with_config("(a|b)*c", Config::new().fuel(Some(10_000))).unwrap();
        assert!(re.run("ababababc").unwrap().accepted);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::UnclosedGroup { offset: 2 }.to_string(),
            "unbalanced group: `(` at offset 2 is never closed"
        );
        assert_eq!(
            Error::MissingOperand { op: Token::Catenate }.to_string(),
            "operator `·` is missing an operand"
        );
        assert_eq!(
            Error::ReversedRange { lo: b'z', hi: b'a' }.to_string(),
            "reversed character range `z-a`"
        );
    }

    #[test]
    fn test_config_accessors() {
        let config = Config::new()
            .max_pattern_len(10)
            .max_subject_len(20)
            .fuel(Some(30));
        assert_eq!(config.get_max_pattern_len(), 10);
        assert_eq!(config.get_max_subject_len(), 20);
        assert_eq!(config.get_fuel(), Some(30));
        assert_eq!(Config::default().get_fuel(), None);
    }

    // -- Properties ----------------------------------------------------------

    #[test]
    fn test_idempotent() {
        let re = Regex::new("(a|b)*abb").unwrap();
        let mut memory = MatcherMemory::default();
        for subject in ["aabb", "abab", "babb", ""] {
            let first = re.run_with(&mut memory, subject).unwrap();
            let second = re.run_with(&mut memory, subject).unwrap();
            assert_eq!(first, second);
            assert_eq!(first, match_pattern("(a|b)*abb", subject));
        }
    }

    #[test]
    fn test_nested_stars_terminate() {
        assert!(accepts("((a*)*)*", ""));
        assert!(accepts("((a*)*)*", "aaaa"));
        assert!(accepts("(a*|b*)*", "abba"));
        assert!(accepts("(a?)*", "aaa"));
        assert!(accepts("(a*)+", ""));
    }

    #[test]
    fn test_raised_pattern_limit_deep_nesting() {
        let config = Config::new().max_pattern_len(200_001);
        let re = Regex::with_config(format!("a{}", "*".repeat(200_000)), config).unwrap();
        assert!(re.is_match("a"));
        assert!(re.is_match(""));
        assert!(!re.is_match("b"));

        let alternatives = vec!["a"; 50_000].join("|");
        let re = Regex::with_config(&alternatives, Config::new().max_pattern_len(100_000)).unwrap();
        assert!(re.is_match("a"));
    }

    #[test]
    fn test_balanced_patterns_build() {
        for p in [
            "a", "ab", "a|b", "(a)", "(a|b)*", "((a|b)(c|d))+", "a?b?c?", "(^a|b$)",
            ".*", "[a-z](x|y)*", "((((a))))",
        ] {
            assert!(Regex::new(p).is_ok(), "{}", p);
        }
    }

    // -- Cross-validation ----------------------------------------------------

    #[test]
    fn test_cross_validate_with_regex_crate() {
        let patterns = [
            "abc",
            "a|b",
            "a*",
            "a+",
            "a?b",
            "(a|b)*abb",
            "(ab|cd)+",
            "a(b|c)*d",
            "(a*)(b*)",
            "a.c",
            "[0-9]+(x|y)?",
            "(a|ab)(c|bcd)",
            ".*a.*",
            "((a|b)c)*",
            "^ab$",
            "(^a|b)c",
            "a(b$|c)",
        ];
        let inputs = [
            "", "a", "b", "c", "ab", "abb", "aabb", "abc", "abcd", "acd", "abbcd", "cdab",
            "abcbcd", "12x", "007", "9z", "bc", "ac", "acbc", "xax", "aaaa", "bbb",
        ];
        for p in patterns {
            let re = Regex::new(p).expect("pattern should build");
            for input in inputs {
                assert_matches_regex_crate(p, &re, input);
            }
        }
    }
}
