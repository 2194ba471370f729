// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use regex::Regex;

use crate::error::LexerBuildError;

/// A mode's rules compiled into one anchored alternation. Group names are
/// the rule names; alternatives keep declaration order so that earlier
/// rules win whenever two rules match the same prefix.
#[derive(Debug)]
pub(crate) struct MasterPattern {
    regex: Regex,
    group_names: Vec<String>,
}

impl MasterPattern {
    pub fn new(rules: &[(String, String)]) -> Result<MasterPattern, LexerBuildError> {
        let mut group_names = vec![];
        let mut alternatives = vec![];
        for (name, pattern) in rules.iter() {
            if pattern.is_empty() {
                return Err(LexerBuildError::EmptyPattern(name.to_string()));
            };
            alternatives.push(format!("(?P<{}>{})", name, pattern));
            group_names.push(name.to_string());
        }
        // The whole alternation is anchored so that matching a slice of the
        // input never skips ahead of the current index.
        let regex = Regex::new(&format!(r"\A(?:{})", alternatives.join("|")))?;
        Ok(Self { regex, group_names })
    }

    /// Match at the start of `text`. Returns the index (declaration order)
    /// of the winning rule and the length of the matched lexeme.
    pub fn match_at(&self, text: &str) -> Option<(usize, usize)> {
        let captures = self.regex.captures(text)?;
        for (index, name) in self.group_names.iter().enumerate() {
            if let Some(matched) = captures.name(name) {
                return Some((index, matched.end()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_order_wins() {
        let master = MasterPattern::new(&[
            ("EQ".to_string(), "==".to_string()),
            ("ASSIGN".to_string(), "=".to_string()),
        ])
        .unwrap();
        assert_eq!(master.match_at("=== x"), Some((0, 2)));
        assert_eq!(master.match_at("= x"), Some((1, 1)));
        assert_eq!(master.match_at("x"), None);
    }

    #[test]
    fn anchored_at_start() {
        let master =
            MasterPattern::new(&[("NUMBER".to_string(), r"\d+".to_string())]).unwrap();
        assert_eq!(master.match_at("a 42"), None);
        assert_eq!(master.match_at("42a"), Some((0, 2)));
    }

    #[test]
    fn empty_pattern_rejected() {
        match MasterPattern::new(&[("BAD".to_string(), "".to_string())]) {
            Err(LexerBuildError::EmptyPattern(name)) => assert_eq!(name, "BAD"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
