//! Compiled glob patterns.
//!
//! A pattern is split on `/` into segments. The segment `**` (globstar)
//! matches zero or more whole path segments; within a segment `*` matches
//! any run of characters, `?` exactly one, `[a-z]` / `[!a-z]` a character
//! class. Brace groups are expanded up front, so `src/**/*.{ts,tsx}`
//! compiles to two alternatives.
//!
//! Matching carries a per-call step budget: patterns come straight out of
//! user-written task configs, and star-heavy inputs like `a*a*a*...`
//! backtrack exponentially without one. Past the budget the path is
//! reported as non-matching.

use std::cell::Cell;

use thiserror::Error;

/// Hard cap on matcher steps per `matches` call.
const MAX_MATCH_STEPS: usize = 100_000;

/// A pattern that failed to compile.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty glob pattern")]
    Empty,
    #[error("unclosed character class in pattern: {0}")]
    UnclosedClass(String),
}

/// One compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**` — matches zero or more whole segments.
    Globstar,
    /// Anything else, matched character-wise.
    Glob(Vec<char>),
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    alternatives: Vec<Vec<Segment>>,
}

impl Pattern {
    /// Compile a pattern. Brace groups are expanded eagerly.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut alternatives = Vec::new();
        for expanded in expand_braces(trimmed) {
            let mut segments = Vec::new();
            for part in expanded.split('/') {
                if part == "**" {
                    segments.push(Segment::Globstar);
                } else {
                    validate_classes(part, pattern)?;
                    segments.push(Segment::Glob(part.chars().collect()));
                }
            }
            alternatives.push(segments);
        }

        Ok(Self { raw: pattern.to_string(), alternatives })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern carries no glob metacharacters and can only
    /// name one concrete path.
    pub fn is_literal(&self) -> bool {
        !contains_glob(&self.raw)
    }

    /// Match a `/`-separated relative path against the whole pattern.
    pub fn matches(&self, rel_path: &str) -> bool {
        let parts: Vec<&str> = rel_path.split('/').filter(|p| !p.is_empty()).collect();
        let steps = Cell::new(0usize);
        self.alternatives
            .iter()
            .any(|segments| match_segments(segments, &parts, &steps))
    }
}

/// True if the string contains any glob metacharacter.
pub fn contains_glob(pattern: &str) -> bool {
    pattern.chars().any(|c| matches!(c, '*' | '?' | '[' | '{'))
}

/// Expand brace groups: `a.{rs,go}` becomes `["a.rs", "a.go"]`. Nested
/// groups multiply out; a brace-free pattern expands to itself.
///
/// Single pass: the pattern is consumed left to right, appending literal
/// characters to every expansion built so far and cross-multiplying each
/// group's branches onto them as the group closes.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    expand_run(&chars, 0, false).0
}

/// Expand from `start` to the end of input, or (inside a group) to the
/// branch-terminating `,` or `}` at this nesting level. Returns the
/// expansions together with the index of the terminator.
fn expand_run(chars: &[char], start: usize, in_group: bool) -> (Vec<String>, usize) {
    let mut heads = vec![String::new()];
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                // Collect the group's branches, one expand_run per branch.
                let mut branches = Vec::new();
                let mut branch_start = i + 1;
                let after = loop {
                    let (expansions, terminator) = expand_run(chars, branch_start, true);
                    branches.extend(expansions);
                    match chars.get(terminator).copied() {
                        Some(',') => branch_start = terminator + 1,
                        // Closing brace, or an unterminated group at end
                        // of input, which is treated as closed.
                        _ => break terminator + 1,
                    }
                };
                heads = heads
                    .iter()
                    .flat_map(|head| {
                        branches.iter().map(move |branch| format!("{head}{branch}"))
                    })
                    .collect();
                i = after;
            }
            ',' | '}' if in_group => return (heads, i),
            c => {
                for head in &mut heads {
                    head.push(c);
                }
                i += 1;
            }
        }
    }

    (heads, i)
}

fn validate_classes(segment: &str, pattern: &str) -> Result<(), PatternError> {
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '[' {
            let mut closed = false;
            for c in chars.by_ref() {
                if c == ']' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(PatternError::UnclosedClass(pattern.to_string()));
            }
        }
    }
    Ok(())
}

/// One more matcher step; true once the budget is spent.
fn out_of_budget(steps: &Cell<usize>) -> bool {
    let spent = steps.get() + 1;
    steps.set(spent);
    spent > MAX_MATCH_STEPS
}

/// Match compiled segments against path parts, handling globstar by
/// trying every number of consumed parts.
fn match_segments(segments: &[Segment], parts: &[&str], steps: &Cell<usize>) -> bool {
    if out_of_budget(steps) {
        return false;
    }

    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::Globstar, rest)) => {
            // Zero or more parts mid-pattern; a *trailing* globstar matches
            // everything strictly inside the prefix, never the prefix itself.
            if rest.is_empty() {
                return !parts.is_empty();
            }
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..], steps))
        }
        Some((Segment::Glob(glob), rest)) => match parts.split_first() {
            Some((part, remaining)) => {
                match_chars(glob, 0, &part.chars().collect::<Vec<_>>(), 0, steps)
                    && match_segments(rest, remaining, steps)
            }
            None => false,
        },
    }
}

/// Character-level matching within one segment, with backtracking for `*`.
fn match_chars(
    pattern: &[char],
    pi: usize,
    input: &[char],
    ii: usize,
    steps: &Cell<usize>,
) -> bool {
    if out_of_budget(steps) {
        return false;
    }

    if pi >= pattern.len() {
        return ii >= input.len();
    }

    match pattern[pi] {
        '*' => {
            // Collapse star runs, then try every split point.
            let mut next = pi;
            while next < pattern.len() && pattern[next] == '*' {
                next += 1;
            }
            if next >= pattern.len() {
                return true;
            }
            (ii..=input.len()).any(|skip| match_chars(pattern, next, input, skip, steps))
        }
        '?' => ii < input.len() && match_chars(pattern, pi + 1, input, ii + 1, steps),
        '[' => {
            let Some(end) = pattern[pi + 1..].iter().position(|&c| c == ']') else {
                // Unclosed class survives only when compiled leniently;
                // treat the bracket literally.
                return ii < input.len()
                    && input[ii] == '['
                    && match_chars(pattern, pi + 1, input, ii + 1, steps);
            };
            let class = &pattern[pi + 1..pi + 1 + end];
            if ii >= input.len() {
                return false;
            }
            class_matches(class, input[ii])
                && match_chars(pattern, pi + 2 + end, input, ii + 1, steps)
        }
        literal => {
            ii < input.len()
                && input[ii] == literal
                && match_chars(pattern, pi + 1, input, ii + 1, steps)
        }
    }
}

/// `[abc]`, `[a-z]`, negation via leading `!` or `^`.
fn class_matches(class: &[char], c: char) -> bool {
    let (negated, body) = match class.first() {
        Some('!') | Some('^') => (true, &class[1..]),
        _ => (false, class),
    };

    let mut matched = false;
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i + 1] == '-' {
            if body[i] <= c && c <= body[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if body[i] == c {
                matched = true;
            }
            i += 1;
        }
    }

    matched != negated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        Pattern::new(pattern).unwrap().matches(path)
    }

    #[test]
    fn literal_segments() {
        assert!(matches("dist/file", "dist/file"));
        assert!(!matches("dist/file", "dist/other"));
        assert!(!matches("dist/file", "dist/file/nested"));
    }

    #[test]
    fn star_within_segment() {
        assert!(matches("*.rs", "main.rs"));
        assert!(!matches("*.rs", "src/main.rs"));
        assert!(matches("src/*.rs", "src/main.rs"));
    }

    #[test]
    fn question_mark() {
        assert!(matches("test?", "test1"));
        assert!(!matches("test?", "test12"));
    }

    #[test]
    fn character_classes() {
        assert!(matches("[abc].txt", "b.txt"));
        assert!(matches("[a-z].txt", "q.txt"));
        assert!(!matches("[a-z].txt", "Q.txt"));
        assert!(matches("[!abc].txt", "d.txt"));
        assert!(!matches("[!abc].txt", "a.txt"));
    }

    #[test]
    fn globstar_matches_any_depth() {
        assert!(matches("src/**", "src/main.rs"));
        assert!(matches("src/**", "src/a/b/c.rs"));
        assert!(!matches("src/**", "lib/main.rs"));
    }

    #[test]
    fn trailing_globstar_excludes_the_prefix_itself() {
        assert!(!matches("dist/**", "dist"));
        assert!(matches("dist/**", "dist/bundle.js"));
    }

    #[test]
    fn globstar_matches_zero_segments() {
        assert!(matches("**/*.rs", "main.rs"));
        assert!(matches("**/*.rs", "a/b/main.rs"));
    }

    #[test]
    fn default_input_pattern_matches_everything() {
        assert!(matches("**/*", "x"));
        assert!(matches("**/*", "a/b/c"));
    }

    #[test]
    fn braces_expand_to_alternatives() {
        assert!(matches("*.{rs,go}", "main.rs"));
        assert!(matches("*.{rs,go}", "main.go"));
        assert!(!matches("*.{rs,go}", "main.py"));
    }

    #[test]
    fn expand_braces_plain() {
        assert_eq!(expand_braces("simple"), vec!["simple"]);
        assert_eq!(expand_braces("{a,b}"), vec!["a", "b"]);
        assert_eq!(expand_braces("x{a,{b,c}}"), vec!["xa", "xb", "xc"]);
    }

    #[test]
    fn expand_braces_with_prefix_and_suffix() {
        assert_eq!(expand_braces("src/{a,b}.rs"), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(
            expand_braces("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }

    #[test]
    fn is_literal_detects_metacharacters() {
        assert!(Pattern::new("dist/file").unwrap().is_literal());
        assert!(!Pattern::new("dist/*").unwrap().is_literal());
        assert!(!Pattern::new("dist/{a,b}").unwrap().is_literal());
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(Pattern::new("").is_err());
        assert!(Pattern::new("/").is_err());
    }

    #[test]
    fn unclosed_class_is_rejected() {
        assert!(Pattern::new("src/[abc").is_err());
    }

    #[test]
    fn hidden_files_match_explicit_patterns() {
        assert!(matches(".env*", ".env.local"));
        assert!(matches("**/*", ".hidden"));
    }

    #[test]
    fn pathological_backtracking_is_bounded() {
        // Exponential without the step budget; with it, the match gives
        // up and returns false in bounded time.
        let pattern = Pattern::new(&format!("{}b", "a*".repeat(20))).unwrap();
        let input = "a".repeat(200);
        assert!(!pattern.matches(&input));
    }

    #[test]
    fn star_heavy_pattern_still_matches_within_budget() {
        assert!(matches("a*a*a*a*", "aaaaaaaa"));
        assert!(matches("*a*", "banana"));
    }
}
