// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

//! A regex driven tokenizer. A `Lexer` is built from an ordered list of
//! named patterns (plus ignorable characters, single character literals and
//! discard rules) and turns text into a lazy stream of `Token`s with line
//! and byte position tracking. Rules may carry actions that rewrite the
//! token, maintain the line count or switch lexing modes.

use std::collections::{BTreeMap, BTreeSet};

pub mod error;
mod master;

pub use crate::error::LexerBuildError;

use crate::master::MasterPattern;

/// Name of the mode a lexer starts out in.
pub const INITIAL_MODE: &str = "INITIAL";

/// Kind assigned to tokens emitted by the error hook.
pub const ERROR_KIND: &str = "ERROR";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    pub kind: String,
    pub text: String,
    pub lineno: usize,
    /// Byte offset of the first byte of the lexeme.
    pub index: usize,
    /// Byte offset just past the last byte of the lexeme.
    pub end: usize,
}

impl Token {
    pub fn new(kind: &str, text: &str, lineno: usize, index: usize, end: usize) -> Self {
        Self {
            kind: kind.to_string(),
            text: text.to_string(),
            lineno,
            index,
            end,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}({:?})", self.kind, self.text)
    }
}

/// The mutable scanning position handed to rule actions and to the error
/// and end of input hooks.
#[derive(Debug)]
pub struct ScanState {
    text: String,
    index: usize,
    lineno: usize,
    mode_stack: Vec<String>,
}

impl ScanState {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            index: 0,
            lineno: 1,
            mode_stack: vec![INITIAL_MODE.to_string()],
        }
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    pub fn set_lineno(&mut self, lineno: usize) {
        self.lineno = lineno;
    }

    pub fn bump_lineno(&mut self, count: usize) {
        self.lineno += count;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Advance the scan position by `count` bytes, clamped to the end of
    /// the input and rounded up to a character boundary.
    pub fn advance(&mut self, count: usize) {
        self.index = (self.index + count).min(self.text.len());
        while !self.text.is_char_boundary(self.index) {
            self.index += 1;
        }
    }

    /// Text from the scan position to the end of the current input.
    pub fn remaining(&self) -> &str {
        &self.text[self.index..]
    }

    /// Replace the current mode.
    pub fn begin(&mut self, mode: &str) {
        if let Some(top) = self.mode_stack.last_mut() {
            *top = mode.to_string();
        }
    }

    /// Enter `mode`, remembering the current one.
    pub fn push_state(&mut self, mode: &str) {
        self.mode_stack.push(mode.to_string());
    }

    /// Return to the mode that was active before the last `push_state`.
    pub fn pop_state(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    fn current_mode(&self) -> &str {
        self.mode_stack.last().map(|s| s.as_str()).unwrap_or(INITIAL_MODE)
    }

    fn peek(&self) -> Option<char> {
        self.text[self.index..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.index >= self.text.len()
    }
}

/// Rule actions run after a pattern matches and before the token is
/// emitted. Returning `false` discards the token.
pub type TokenAction = Box<dyn Fn(&mut ScanState, &mut Token) -> bool>;

/// Called with a token whose `text` is the unmatchable remainder of the
/// input. The hook may `advance` the scan position; returning `true` emits
/// the (possibly rewritten) token.
pub type ErrorHook = Box<dyn Fn(&mut ScanState, &mut Token) -> bool>;

/// Called at end of input; returning more text continues the scan.
pub type EofHook = Box<dyn Fn(&mut ScanState) -> Option<String>>;

struct TokenRule {
    name: String,
    pattern: String,
    discard: bool,
    action: Option<TokenAction>,
    remap: BTreeMap<String, String>,
}

struct ModeSpec {
    rules: Vec<TokenRule>,
    ignore_chars: String,
    literals: BTreeSet<char>,
}

impl Default for ModeSpec {
    fn default() -> Self {
        Self {
            rules: vec![],
            ignore_chars: String::new(),
            literals: BTreeSet::new(),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Collects rules (in declaration order), hooks and modes, then compiles
/// them into a `Lexer`.
pub struct LexerBuilder {
    modes: BTreeMap<String, ModeSpec>,
    current: String,
    error_hook: Option<ErrorHook>,
    eof_hook: Option<EofHook>,
}

impl LexerBuilder {
    pub fn new() -> Self {
        let mut modes = BTreeMap::new();
        modes.insert(INITIAL_MODE.to_string(), ModeSpec::default());
        Self {
            modes,
            current: INITIAL_MODE.to_string(),
            error_hook: None,
            eof_hook: None,
        }
    }

    /// Select (creating if necessary) the mode subsequent rules belong to.
    pub fn mode(&mut self, name: &str) -> &mut Self {
        self.modes.entry(name.to_string()).or_default();
        self.current = name.to_string();
        self
    }

    fn push_rule(&mut self, rule: TokenRule) -> &mut Self {
        if let Some(mode) = self.modes.get_mut(&self.current) {
            mode.rules.push(rule);
        }
        self
    }

    pub fn token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.push_rule(TokenRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            discard: false,
            action: None,
            remap: BTreeMap::new(),
        })
    }

    /// A token rule with a keyword table: when the matched lexeme equals
    /// one of the keys the token kind is rewritten to the mapped name.
    pub fn token_with_remap(
        &mut self,
        name: &str,
        pattern: &str,
        remap: &[(&str, &str)],
    ) -> &mut Self {
        self.push_rule(TokenRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            discard: false,
            action: None,
            remap: remap
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    pub fn token_action<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut ScanState, &mut Token) -> bool + 'static,
    {
        self.push_rule(TokenRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            discard: false,
            action: Some(Box::new(action)),
            remap: BTreeMap::new(),
        })
    }

    /// A rule whose matches are skipped rather than emitted.
    pub fn ignore_pattern(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.push_rule(TokenRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            discard: true,
            action: None,
            remap: BTreeMap::new(),
        })
    }

    /// A skipped rule with an action, typically line counting.
    pub fn ignore_pattern_action<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut ScanState, &mut Token) -> bool + 'static,
    {
        self.push_rule(TokenRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            discard: true,
            action: Some(Box::new(action)),
            remap: BTreeMap::new(),
        })
    }

    /// Characters skipped between tokens without pattern matching.
    pub fn ignore(&mut self, chars: &str) -> &mut Self {
        if let Some(mode) = self.modes.get_mut(&self.current) {
            mode.ignore_chars = chars.to_string();
        }
        self
    }

    /// Single characters usable as tokens; the token kind is the character.
    pub fn literals(&mut self, chars: &str) -> &mut Self {
        if let Some(mode) = self.modes.get_mut(&self.current) {
            for c in chars.chars() {
                mode.literals.insert(c);
            }
        }
        self
    }

    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ScanState, &mut Token) -> bool + 'static,
    {
        self.error_hook = Some(Box::new(hook));
        self
    }

    pub fn on_eof<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ScanState) -> Option<String> + 'static,
    {
        self.eof_hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Lexer, LexerBuildError> {
        let mut modes = BTreeMap::new();
        for (mode_name, spec) in self.modes {
            if !is_valid_name(&mode_name) {
                return Err(LexerBuildError::InvalidModeName(mode_name));
            };
            let mut seen = BTreeSet::new();
            let mut patterns = vec![];
            for rule in spec.rules.iter() {
                if !is_valid_name(&rule.name) {
                    return Err(LexerBuildError::InvalidRuleName(rule.name.to_string()));
                };
                if !seen.insert(rule.name.to_string()) {
                    return Err(LexerBuildError::DuplicateRule(
                        mode_name.to_string(),
                        rule.name.to_string(),
                    ));
                };
                patterns.push((rule.name.to_string(), rule.pattern.to_string()));
            }
            let master = MasterPattern::new(&patterns)?;
            modes.insert(
                mode_name,
                Mode {
                    master,
                    rules: spec.rules,
                    ignore_chars: spec.ignore_chars,
                    literals: spec.literals,
                },
            );
        }
        Ok(Lexer {
            modes,
            error_hook: self.error_hook,
            eof_hook: self.eof_hook,
        })
    }
}

impl Default for LexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Mode {
    master: MasterPattern,
    rules: Vec<TokenRule>,
    ignore_chars: String,
    literals: BTreeSet<char>,
}

pub struct Lexer {
    modes: BTreeMap<String, Mode>,
    error_hook: Option<ErrorHook>,
    eof_hook: Option<EofHook>,
}

impl Lexer {
    pub fn tokenize(&self, text: &str) -> TokenStream<'_> {
        TokenStream {
            lexer: self,
            scan: ScanState::new(text),
            finished: false,
        }
    }

    fn mode(&self, name: &str) -> &Mode {
        match self.modes.get(name) {
            Some(mode) => mode,
            None => panic!("unknown lexer mode: {:?}", name),
        }
    }
}

/// Lazy token sequence over one input text.
pub struct TokenStream<'a> {
    lexer: &'a Lexer,
    scan: ScanState,
    finished: bool,
}

impl<'a> TokenStream<'a> {
    pub fn scan_state(&self) -> &ScanState {
        &self.scan
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if self.finished {
                return None;
            };
            let mode = self.lexer.mode(self.scan.current_mode());
            while let Some(c) = self.scan.peek() {
                if mode.ignore_chars.contains(c) {
                    self.scan.index += c.len_utf8();
                } else {
                    break;
                }
            }
            if self.scan.at_end() {
                if let Some(hook) = &self.lexer.eof_hook {
                    if let Some(more) = hook(&mut self.scan) {
                        if !more.is_empty() {
                            self.scan.text.push_str(&more);
                            continue;
                        }
                    }
                };
                self.finished = true;
                return None;
            };
            let start = self.scan.index;
            if let Some((rule_index, length)) = mode.master.match_at(&self.scan.text[start..]) {
                if length > 0 {
                    let rule = &mode.rules[rule_index];
                    self.scan.index = start + length;
                    let mut token = Token {
                        kind: rule.name.to_string(),
                        text: self.scan.text[start..start + length].to_string(),
                        lineno: self.scan.lineno,
                        index: start,
                        end: start + length,
                    };
                    let mut keep = !rule.discard;
                    if let Some(action) = &rule.action {
                        keep = action(&mut self.scan, &mut token) && !rule.discard;
                    };
                    if !keep {
                        continue;
                    };
                    if let Some(new_kind) = rule.remap.get(&token.text) {
                        token.kind = new_kind.to_string();
                    };
                    return Some(token);
                }
            };
            // NB: peek() cannot fail here as at_end() was false above
            let c = match self.scan.peek() {
                Some(c) => c,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            if mode.literals.contains(&c) {
                self.scan.index = start + c.len_utf8();
                let text = c.to_string();
                return Some(Token {
                    kind: text.to_string(),
                    text,
                    lineno: self.scan.lineno,
                    index: start,
                    end: self.scan.index,
                });
            };
            let mut token = Token {
                kind: ERROR_KIND.to_string(),
                text: self.scan.text[start..].to_string(),
                lineno: self.scan.lineno,
                index: start,
                end: self.scan.text.len(),
            };
            let emit = match &self.lexer.error_hook {
                Some(hook) => hook(&mut self.scan, &mut token),
                None => {
                    log::error!(
                        "lexor: illegal character {:?} at index {} (line {})",
                        c,
                        start,
                        self.scan.lineno
                    );
                    false
                }
            };
            if self.scan.index == start {
                // the hook did not advance; skip the offending character so
                // the scan cannot stall
                self.scan.index = start + c.len_utf8();
            };
            if emit {
                return Some(token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn kinds(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.kind.as_str()).collect()
    }

    #[test]
    fn declaration_order_beats_length() {
        let mut builder = LexerBuilder::new();
        builder.token("EQ", "==").token("ASSIGN", "=").ignore(" ");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("===").collect();
        assert_eq!(kinds(&tokens), ["EQ", "ASSIGN"]);
        assert_eq!(tokens[0].text, "==");
        assert_eq!(tokens[1].text, "=");
    }

    #[test]
    fn keyword_remap() {
        let mut builder = LexerBuilder::new();
        builder
            .token_with_remap(
                "ID",
                "[a-zA-Z_][a-zA-Z0-9_]*",
                &[("if", "IF"), ("else", "ELSE")],
            )
            .ignore(" \t");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("if ifx else").collect();
        assert_eq!(kinds(&tokens), ["IF", "ID", "ELSE"]);
        assert_eq!(tokens[1].text, "ifx");
    }

    #[test]
    fn literal_characters() {
        let mut builder = LexerBuilder::new();
        builder.token("NUMBER", r"\d+").literals("+-*/()").ignore(" ");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("3 + (4 * 5)").collect();
        assert_eq!(kinds(&tokens), ["NUMBER", "+", "(", "NUMBER", "*", "NUMBER", ")"]);
    }

    #[test]
    fn newline_action_tracks_lineno() {
        let mut builder = LexerBuilder::new();
        builder
            .token("WORD", "[a-z]+")
            .ignore_pattern_action("newline", r"\n+", |scan, token| {
                scan.bump_lineno(token.text.matches('\n').count());
                true
            })
            .ignore(" ");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("one\ntwo\n\nthree").collect();
        assert_eq!(kinds(&tokens), ["WORD", "WORD", "WORD"]);
        assert_eq!(tokens[0].lineno, 1);
        assert_eq!(tokens[1].lineno, 2);
        assert_eq!(tokens[2].lineno, 4);
    }

    #[test]
    fn discard_rule_skips_comments() {
        let mut builder = LexerBuilder::new();
        builder
            .token("WORD", "[a-z]+")
            .ignore_pattern("comment", "#[^\n]*")
            .ignore(" \n");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("abc # not seen\ndef").collect();
        assert_eq!(kinds(&tokens), ["WORD", "WORD"]);
        assert_eq!(tokens[1].text, "def");
    }

    #[test]
    fn error_hook_skips_and_reports() {
        let mut builder = LexerBuilder::new();
        builder.token("WORD", "[a-z]+").ignore(" ").on_error(|scan, token| {
            let bad: String = token.text.chars().take_while(|c| *c == '@').collect();
            scan.advance(bad.len());
            token.text = bad;
            true
        });
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("ab @@@ cd").collect();
        assert_eq!(kinds(&tokens), ["WORD", "ERROR", "WORD"]);
        assert_eq!(tokens[1].text, "@@@");
    }

    #[test]
    fn unhandled_errors_are_skipped() {
        let mut builder = LexerBuilder::new();
        builder.token("WORD", "[a-z]+").ignore(" ");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("ab ? cd").collect();
        assert_eq!(kinds(&tokens), ["WORD", "WORD"]);
    }

    #[test]
    fn spans_reconstruct_the_input() {
        let text = "if ifx == 42\nelse";
        let mut builder = LexerBuilder::new();
        builder
            .token("EQ", "==")
            .token("ASSIGN", "=")
            .token("NUMBER", r"\d+")
            .token_with_remap(
                "ID",
                "[a-zA-Z_][a-zA-Z0-9_]*",
                &[("if", "IF"), ("else", "ELSE")],
            )
            .ignore(" \n");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize(text).collect();
        let mut rebuilt = String::new();
        let mut cursor = 0;
        for token in tokens.iter() {
            rebuilt.push_str(&text[cursor..token.index]);
            rebuilt.push_str(&text[token.index..token.end]);
            assert_eq!(&text[token.index..token.end], token.text);
            cursor = token.end;
        }
        rebuilt.push_str(&text[cursor..]);
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn mode_stack_switches() {
        let mut builder = LexerBuilder::new();
        builder
            .token("WORD", "[a-z]+")
            .token_action("QUOTE", "\"", |scan, _| {
                scan.push_state("STRING");
                false
            })
            .ignore(" ");
        builder
            .mode("STRING")
            .token_action("STRING_END", "\"", |scan, _| {
                scan.pop_state();
                false
            })
            .token("TEXT", "[^\"]+");
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("abc \"x y\" def").collect();
        assert_eq!(kinds(&tokens), ["WORD", "TEXT", "WORD"]);
        assert_eq!(tokens[1].text, "x y");
    }

    #[test]
    fn eof_hook_appends_more_text() {
        let handed_out = Rc::new(Cell::new(false));
        let flag = Rc::clone(&handed_out);
        let mut builder = LexerBuilder::new();
        builder.token("WORD", "[a-z]+").ignore(" ").on_eof(move |_| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(" more".to_string())
            }
        });
        let lexer = builder.build().unwrap();
        let tokens: Vec<Token> = lexer.tokenize("start").collect();
        assert_eq!(kinds(&tokens), ["WORD", "WORD"]);
        assert_eq!(tokens[1].text, "more");
        assert!(handed_out.get());
    }

    #[test]
    fn duplicate_rule_rejected() {
        let mut builder = LexerBuilder::new();
        builder.token("WORD", "[a-z]+").token("WORD", "[A-Z]+");
        match builder.build() {
            Err(LexerBuildError::DuplicateRule(mode, name)) => {
                assert_eq!(mode, INITIAL_MODE);
                assert_eq!(name, "WORD");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
