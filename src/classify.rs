//! Lexical recognition of test declarations.
//!
//! Matching is textual, not syntax-aware: occurrences inside comments and
//! string literals are counted too. Counts must stay comparable with the
//! history already stored, so the patterns are kept as they are.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Classification;

/// `it(`, `test (`, `describe(` ...
const TEST_PATTERN: &str = r"(?-u:\b)(it|test|describe)\s*\(";
/// `it.skip(`, `test.flaky (` ...
const SKIP_PATTERN: &str = r"(?-u:\b)(it|test|describe)\.(skip|flaky)\s*\(";

fn test_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TEST_PATTERN).expect("test pattern is valid"))
}

fn skip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SKIP_PATTERN).expect("skip pattern is valid"))
}

pub fn classify(text: &str) -> Classification {
    Classification {
        test_count: test_regex().find_iter(text).count(),
        skip_count: skip_regex().find_iter(text).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_plain_declarations() {
        let source = r#"
describe('store', () => {
  it('upserts', () => {});
  test ('reads', () => {});
});
"#;
        let counts = classify(source);
        assert_eq!(counts.test_count, 3);
        assert_eq!(counts.skip_count, 0);
    }

    #[test]
    fn skip_qualified_calls_are_not_counted_as_plain_declarations() {
        let counts = classify(
            "describe('x', () => {}); it.skip('y', () => {}); test.flaky('z', () => {});",
        );
        assert_eq!(counts.skip_count, 2);
        // `it.skip(` has no `(` directly after the keyword.
        assert_eq!(counts.test_count, 1);
    }

    #[test]
    fn requires_word_boundary_before_keyword() {
        let counts = classify("submit('x'); latest(); split.skip(); contest.flaky()");
        assert_eq!(counts, Classification::default());
    }

    #[test]
    fn ignores_other_member_calls() {
        let counts = classify("it.only('x', fn); describe.each([1])('y', fn); test.todo('z')");
        assert_eq!(counts, Classification::default());
    }

    #[test]
    fn counts_matches_in_comments_and_strings() {
        let counts = classify("// it.skip('old')\nconst s = \"test.flaky(\";");
        assert_eq!(counts.skip_count, 2);
    }

    #[test]
    fn allows_whitespace_before_paren() {
        let counts = classify("it.skip  ('a')\ndescribe\n('b')");
        assert_eq!(counts.skip_count, 1);
        assert_eq!(counts.test_count, 1);
    }
}
