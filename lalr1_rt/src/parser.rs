// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use crate::production::Production;
use crate::state::Automaton;
use crate::symbol::terminal::{Token, END_TOKEN_NAME, ERROR_TOKEN_NAME};
use crate::symbol::SymbolTable;
use crate::table::{Action, ParseTable};

/// How many tokens must be shifted after a syntax error before the error
/// hook will be invoked again.
const ERROR_SHIFT_COUNT: usize = 3;

/// Returned by reduction callbacks. `SyntaxError` forces error recovery
/// as if the last shift had been erroneous; `Fatal` aborts the parse.
#[derive(Debug)]
pub enum ActionError {
    SyntaxError,
    Fatal(String),
}

impl ActionError {
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        ActionError::Fatal(message.into())
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionError::SyntaxError => write!(f, "syntax error raised by action"),
            ActionError::Fatal(message) => write!(f, "{}", message),
        }
    }
}

/// A reduction callback: builds the left hand side's value from the
/// production view.
pub type ReduceAction<V> = Box<dyn Fn(&mut YaccProduction<V>) -> Result<V, ActionError>>;

#[derive(Debug)]
pub enum ParseError {
    ActionFailed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::ActionFailed(message) => {
                write!(f, "parse aborted by action: {}", message)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Source extent of a stack value: minimum line, minimum start index and
/// maximum end index of the contributing tokens. Values derived from an
/// empty production have no extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    lineno: Option<usize>,
    index: Option<usize>,
    end: Option<usize>,
}

impl Span {
    fn from_token(token: &lexor::Token) -> Self {
        Self {
            lineno: Some(token.lineno),
            index: Some(token.index),
            end: Some(token.end),
        }
    }

    fn merge(&mut self, other: &Span) {
        self.lineno = merge_min(self.lineno, other.lineno);
        self.index = merge_min(self.index, other.index);
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
    }

    pub fn lineno(&self) -> Option<usize> {
        self.lineno
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn end(&self) -> Option<usize> {
        self.end
    }
}

fn merge_min(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// A value on the parse stack: either a shifted token or the result of an
/// earlier reduction.
#[derive(Debug)]
pub enum Value<V> {
    Token(lexor::Token),
    Reduced(V),
}

impl<V> Value<V> {
    pub fn token(&self) -> Option<&lexor::Token> {
        match self {
            Value::Token(token) => Some(token),
            Value::Reduced(_) => None,
        }
    }

    pub fn reduced(&self) -> Option<&V> {
        match self {
            Value::Reduced(value) => Some(value),
            Value::Token(_) => None,
        }
    }

    pub fn into_reduced(self) -> Option<V> {
        match self {
            Value::Reduced(value) => Some(value),
            Value::Token(_) => None,
        }
    }
}

#[derive(Debug)]
struct Frame<V> {
    state: u32,
    value: Value<V>,
    span: Span,
}

/// The view of a matched production handed to its reduction callback:
/// one slot per right hand side symbol, addressable by position or by
/// symbol name. When a name occurs more than once on the right hand side
/// the occurrences are suffixed `0`, `1`, ... left to right.
pub struct YaccProduction<'a, V> {
    lhs: &'a str,
    names: &'a [String],
    slots: Vec<Option<Value<V>>>,
    spans: Vec<Span>,
    span: Span,
    below: &'a [Frame<V>],
}

impl<'a, V> YaccProduction<'a, V> {
    pub fn lhs(&self) -> &str {
        self.lhs
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The value at `position`. Panics if out of range or already taken.
    pub fn get(&self, position: usize) -> &Value<V> {
        match self.slots.get(position) {
            Some(Some(value)) => value,
            Some(None) => panic!("{}: value {} already taken", self.lhs, position),
            None => panic!("{}: no value at {}", self.lhs, position),
        }
    }

    /// Move the value at `position` out of the frame.
    pub fn take(&mut self, position: usize) -> Value<V> {
        match self.slots.get_mut(position) {
            Some(slot) => match slot.take() {
                Some(value) => value,
                None => panic!("{}: value {} already taken", self.lhs, position),
            },
            None => panic!("{}: no value at {}", self.lhs, position),
        }
    }

    pub fn named(&self, name: &str) -> Option<&Value<V>> {
        let position = self.names.iter().position(|n| n == name)?;
        self.slots.get(position)?.as_ref()
    }

    pub fn take_named(&mut self, name: &str) -> Option<Value<V>> {
        let position = self.names.iter().position(|n| n == name)?;
        self.slots.get_mut(position)?.take()
    }

    /// The token at `position`. Panics unless the slot holds a token.
    pub fn token(&self, position: usize) -> &lexor::Token {
        match self.get(position) {
            Value::Token(token) => token,
            Value::Reduced(_) => panic!("{}: value {} is not a token", self.lhs, position),
        }
    }

    /// Shorthand for the matched text of the token at `position`.
    pub fn text(&self, position: usize) -> &str {
        &self.token(position).text
    }

    /// The reduction result at `position`. Panics unless the slot holds
    /// one.
    pub fn value(&self, position: usize) -> &V {
        match self.get(position) {
            Value::Reduced(value) => value,
            Value::Token(_) => panic!("{}: value {} is a token", self.lhs, position),
        }
    }

    /// The stack value `count` places left of this production's first
    /// symbol. With `count == 1` this is the symbol immediately before an
    /// embedded (empty) production's insertion point.
    pub fn left(&self, count: usize) -> Option<&Value<V>> {
        if count == 0 || count > self.below.len() {
            None
        } else {
            Some(&self.below[self.below.len() - count].value)
        }
    }

    pub fn lineno(&self) -> Option<usize> {
        self.span.lineno
    }

    pub fn index(&self) -> Option<usize> {
        self.span.index
    }

    pub fn end(&self) -> Option<usize> {
        self.span.end
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn span_of(&self, position: usize) -> Option<Span> {
        self.spans.get(position).copied()
    }
}

/// Handed to the error hook; exposes the recovery controls and the rest
/// of the token stream.
pub struct ErrorControl<'a> {
    errok: bool,
    restart: bool,
    tokens: &'a mut dyn Iterator<Item = lexor::Token>,
}

impl<'a> ErrorControl<'a> {
    /// Reset the error counter: the next syntax error reports again
    /// immediately.
    pub fn errok(&mut self) {
        self.errok = true;
    }

    /// Throw away the parse so far and restart from the initial state.
    pub fn restart(&mut self) {
        self.restart = true;
    }

    /// Pull the next token off the input.
    pub fn next_token(&mut self) -> Option<lexor::Token> {
        self.tokens.next()
    }
}

pub type ErrorHook =
    Box<dyn Fn(&mut ErrorControl, Option<&lexor::Token>) -> Option<lexor::Token>>;

/// A table driven shift/reduce parser with yacc style error recovery.
/// Built from a `Specification`; immutable afterwards and reusable for
/// any number of sequential parses.
pub struct Parser<V> {
    symbol_table: SymbolTable,
    productions: Vec<Production>,
    actions: Vec<ReduceAction<V>>,
    rhs_names: Vec<Vec<String>>,
    automaton: Automaton,
    table: ParseTable,
    grammar_warnings: u32,
    error_hook: Option<ErrorHook>,
    identity_fn: Option<Box<dyn Fn(&V) -> Option<usize>>>,
    positions: RefCell<BTreeMap<usize, Span>>,
}

fn disambiguated_rhs_names(production: &Production) -> Vec<String> {
    let names: Vec<&str> = production
        .right_hand_side_symbols()
        .map(|s| s.name())
        .collect();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut result = vec![];
    for name in names.iter() {
        let total = names.iter().filter(|n| **n == *name).count();
        if total > 1 {
            let counter = seen.entry(name.to_string()).or_insert(0);
            result.push(format!("{}{}", name, counter));
            *counter += 1;
        } else {
            result.push(name.to_string());
        }
    }
    result
}

impl<V> Parser<V> {
    pub(crate) fn new(
        symbol_table: SymbolTable,
        productions: Vec<Production>,
        actions: Vec<ReduceAction<V>>,
        automaton: Automaton,
        table: ParseTable,
        grammar_warnings: u32,
    ) -> Self {
        let rhs_names = productions.iter().map(disambiguated_rhs_names).collect();
        Self {
            symbol_table,
            productions,
            actions,
            rhs_names,
            automaton,
            table,
            grammar_warnings,
            error_hook: None,
            identity_fn: None,
            positions: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn set_error_hook<F>(&mut self, hook: F)
    where
        F: Fn(&mut ErrorControl, Option<&lexor::Token>) -> Option<lexor::Token> + 'static,
    {
        self.error_hook = Some(Box::new(hook));
    }

    /// Install the identity used by the position map. Only values the
    /// function maps to a key are tracked; values without usable identity
    /// (plain numbers, say) are not.
    pub fn set_identity_fn<F>(&mut self, identity_fn: F)
    where
        F: Fn(&V) -> Option<usize> + 'static,
    {
        self.identity_fn = Some(Box::new(identity_fn));
    }

    pub fn line_position(&self, value: &V) -> Option<usize> {
        let identity_fn = self.identity_fn.as_ref()?;
        let key = identity_fn(value)?;
        self.positions.borrow().get(&key)?.lineno
    }

    pub fn index_position(&self, value: &V) -> Option<(usize, usize)> {
        let identity_fn = self.identity_fn.as_ref()?;
        let key = identity_fn(value)?;
        let span = *self.positions.borrow().get(&key)?;
        Some((span.index?, span.end?))
    }

    pub fn shift_reduce_conflicts(&self) -> u32 {
        self.table.shift_reduce_conflicts()
    }

    pub fn reduce_reduce_conflicts(&self) -> u32 {
        self.table.reduce_reduce_conflicts()
    }

    pub fn grammar_warnings(&self) -> u32 {
        self.grammar_warnings
    }

    pub fn state_count(&self) -> usize {
        self.automaton.len()
    }

    fn lookup_action(&self, state: u32, kind: &str) -> Option<Action> {
        if kind == END_TOKEN_NAME {
            return self.table.action(state, &Token::End);
        };
        if kind == ERROR_TOKEN_NAME {
            return self.table.action(state, &Token::Error);
        };
        let token = self.symbol_table.get_token(kind)?;
        self.table.action(state, token)
    }

    fn reduce(&self, stack: &mut Vec<Frame<V>>, production_ident: u32) -> Result<(), ActionError> {
        let production = &self.productions[production_ident as usize];
        let count = production.len();
        let split = stack.len() - count;
        let popped = stack.split_off(split);
        let mut span = Span::default();
        let mut slots = vec![];
        let mut spans = vec![];
        for frame in popped {
            span.merge(&frame.span);
            spans.push(frame.span);
            slots.push(Some(frame.value));
        }
        let value = {
            let mut view = YaccProduction {
                lhs: production.left_hand_side().name(),
                names: &self.rhs_names[production_ident as usize],
                slots,
                spans,
                span,
                below: &stack[..],
            };
            let action = &self.actions[(production_ident - 1) as usize];
            action(&mut view)?
        };
        if let Some(identity_fn) = &self.identity_fn {
            if let Some(key) = identity_fn(&value) {
                self.positions.borrow_mut().insert(key, span);
            }
        };
        let state_below = stack.last().expect("the start frame is never popped").state;
        let next_state = match self.table.goto(state_below, production.left_hand_side()) {
            Some(state) => state,
            None => panic!(
                "malformed goto table: ({}, {})",
                production.left_hand_side(),
                state_below
            ),
        };
        stack.push(Frame {
            state: next_state,
            value: Value::Reduced(value),
            span,
        });
        Ok(())
    }

    /// Run the shift/reduce loop over `tokens`. `Ok(None)` means the
    /// input was rejected and error recovery could not resynchronise;
    /// `Err` propagates a fatal failure from a reduction callback.
    pub fn parse<I>(&self, tokens: I) -> Result<Option<V>, ParseError>
    where
        I: IntoIterator<Item = lexor::Token>,
    {
        let mut tokens = tokens.into_iter();
        let mut stack: Vec<Frame<V>> = vec![Frame {
            state: 0,
            value: Value::Token(lexor::Token::default()),
            span: Span::default(),
        }];
        let mut pushed_back: Vec<lexor::Token> = vec![];
        let mut lookahead: Option<lexor::Token> = None;
        let mut error_count = 0_usize;
        let mut errok_flag = false;
        loop {
            let state = stack.last().expect("the start frame is never popped").state;
            // defaulted states reduce without consulting the input
            let action = if let Some(production) = self.table.default_reduction(state) {
                Some(Action::Reduce(production))
            } else {
                if lookahead.is_none() {
                    lookahead = Some(pushed_back.pop().or_else(|| tokens.next()).unwrap_or_else(
                        || lexor::Token::new(END_TOKEN_NAME, "", 0, 0, 0),
                    ));
                };
                let token = lookahead.as_ref().expect("lookahead was just filled");
                self.lookup_action(state, &token.kind)
            };
            let mut recover = false;
            match action {
                Some(Action::Shift(next_state)) => {
                    let token = lookahead.take().expect("shift consumes the lookahead");
                    let span = Span::from_token(&token);
                    stack.push(Frame {
                        state: next_state,
                        value: Value::Token(token),
                        span,
                    });
                    if error_count > 0 {
                        error_count -= 1;
                    }
                }
                Some(Action::Reduce(production_ident)) => {
                    match self.reduce(&mut stack, production_ident) {
                        Ok(()) => (),
                        Err(ActionError::SyntaxError) => {
                            error_count = 0;
                            errok_flag = false;
                            recover = true;
                        }
                        Err(ActionError::Fatal(message)) => {
                            return Err(ParseError::ActionFailed(message))
                        }
                    }
                }
                Some(Action::Accept) => {
                    let frame = stack.pop().expect("accept leaves the result on top");
                    return Ok(frame.value.into_reduced());
                }
                Some(Action::SyntaxError) | None => recover = true,
            };
            if !recover {
                continue;
            };
            // --- yacc style error recovery ---
            if error_count == 0 || errok_flag {
                error_count = ERROR_SHIFT_COUNT;
                errok_flag = false;
                let at_end = lookahead
                    .as_ref()
                    .map(|t| t.kind == END_TOKEN_NAME)
                    .unwrap_or(true);
                if let Some(hook) = &self.error_hook {
                    let mut control = ErrorControl {
                        errok: false,
                        restart: false,
                        tokens: &mut tokens,
                    };
                    let replacement = {
                        let error_token = if at_end { None } else { lookahead.as_ref() };
                        hook(&mut control, error_token)
                    };
                    if control.errok {
                        error_count = 0;
                        errok_flag = true;
                    };
                    if control.restart {
                        stack.truncate(1);
                        lookahead = None;
                        continue;
                    };
                    if let Some(token) = replacement {
                        // the hook resynchronised on its own
                        lookahead = Some(token);
                        continue;
                    }
                } else if let Some(token) = &lookahead {
                    if token.kind == END_TOKEN_NAME {
                        log::error!("syntax error at end of input");
                    } else {
                        log::error!(
                            "syntax error at line {}, token={} ({:?}); expected one of {}",
                            token.lineno,
                            token.kind,
                            token.text,
                            self.table.expected_tokens(state)
                        );
                    }
                }
            } else {
                error_count = ERROR_SHIFT_COUNT;
            };
            let at_end = lookahead
                .as_ref()
                .map(|t| t.kind == END_TOKEN_NAME)
                .unwrap_or(true);
            if stack.len() <= 1 && !at_end {
                // nothing to unwind: discard the offending token and start
                // over from the initial state
                lookahead = None;
                stack.truncate(1);
                continue;
            };
            if at_end {
                return Ok(None);
            };
            let lookahead_is_error = lookahead
                .as_ref()
                .map(|t| t.kind == ERROR_TOKEN_NAME)
                .unwrap_or(false);
            if lookahead_is_error {
                // still unable to shift the error terminal: unwind a state
                stack.pop();
                continue;
            };
            let token = lookahead.take().expect("non end lookahead present");
            let top_is_error = matches!(
                &stack.last().expect("the start frame is never popped").value,
                Value::Token(t) if t.kind == ERROR_TOKEN_NAME
            );
            if top_is_error {
                // the error terminal has been shifted: eat tokens until one
                // is acceptable again
                continue;
            };
            let error_token = lexor::Token::new(
                ERROR_TOKEN_NAME,
                &token.text,
                token.lineno,
                token.index,
                token.index,
            );
            pushed_back.push(token);
            lookahead = Some(error_token);
        }
    }

    /// Write the human readable grammar and automaton report: every rule,
    /// then every state with its items, actions and gotos. Alternatives
    /// suppressed during conflict resolution are listed with a `!` mark.
    pub fn write_description<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "Grammar")?;
        writeln!(writer)?;
        for production in self.productions.iter() {
            writeln!(writer, "Rule {:<4} {}", production.ident(), production)?;
        }
        let unused: Vec<&str> = self
            .symbol_table
            .tokens()
            .filter(|t| t.is_unused())
            .map(|t| t.name())
            .collect();
        if !unused.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Unused terminals:")?;
            for name in unused {
                writeln!(writer, "    {}", name)?;
            }
        };
        for state in self.automaton.states() {
            writeln!(writer)?;
            writeln!(writer, "state {}", state.ident())?;
            writeln!(writer)?;
            for item in state.items().iter() {
                writeln!(writer, "    ({}) {}", item.production().ident(), item)?;
            }
            writeln!(writer)?;
            for (token, action) in self.table.state_actions(state.ident()) {
                match action {
                    Action::Shift(target) => writeln!(
                        writer,
                        "    {:<12} shift and go to state {}",
                        token.name(),
                        target
                    )?,
                    Action::Reduce(production) => writeln!(
                        writer,
                        "    {:<12} reduce using rule {}",
                        token.name(),
                        production
                    )?,
                    Action::Accept => writeln!(writer, "    {:<12} accept", token.name())?,
                    Action::SyntaxError => writeln!(
                        writer,
                        "    {:<12} syntax error (nonassociative)",
                        token.name()
                    )?,
                }
            }
            let gotos = self.table.state_gotos(state.ident());
            if !gotos.is_empty() {
                writeln!(writer)?;
                for (non_terminal, target) in gotos {
                    writeln!(
                        writer,
                        "    {:<12} go to state {}",
                        non_terminal.name(),
                        target
                    )?;
                }
            };
            let notes = self.table.state_notes(state.ident());
            if !notes.is_empty() {
                writeln!(writer)?;
                for note in notes {
                    writeln!(writer, "    {}", note)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::Specification;

    fn token(kind: &str, text: &str, index: usize) -> lexor::Token {
        lexor::Token::new(kind, text, 1, index, index + text.len())
    }

    #[test]
    fn epsilon_start_accepts_empty_input() {
        let mut spec = Specification::<usize>::new();
        spec.production("unit", &[], |_| Ok(42));
        let parser = spec.build().unwrap();
        assert_eq!(parser.parse(vec![]).unwrap(), Some(42));
    }

    #[test]
    fn positional_and_named_access() {
        let mut spec = Specification::<String>::new();
        spec.token("A").token("B");
        spec.production("pair", &["A", "B"], |p| {
            assert_eq!(p.text(0), "a");
            let b = p.named("B").and_then(|v| v.token()).map(|t| t.text.to_string());
            assert_eq!(b.as_deref(), Some("b"));
            Ok(format!("{}{}", p.text(0), p.text(1)))
        });
        let parser = spec.build().unwrap();
        let result = parser
            .parse(vec![token("A", "a", 0), token("B", "b", 1)])
            .unwrap();
        assert_eq!(result, Some("ab".to_string()));
    }

    #[test]
    fn repeated_names_get_suffixes() {
        let mut spec = Specification::<String>::new();
        spec.token("DASH");
        spec.production("pair", &["word", "DASH", "word"], |p| {
            let first = p.named("word0").and_then(|v| v.reduced()).cloned();
            let second = p.named("word1").and_then(|v| v.reduced()).cloned();
            assert!(p.named("word").is_none());
            Ok(format!("{}/{}", first.unwrap(), second.unwrap()))
        });
        spec.token("W");
        spec.production("word", &["W"], |p| Ok(p.text(0).to_string()));
        spec.set_start("pair");
        let parser = spec.build().unwrap();
        let result = parser
            .parse(vec![
                token("W", "x", 0),
                token("DASH", "-", 1),
                token("W", "y", 2),
            ])
            .unwrap();
        assert_eq!(result, Some("x/y".to_string()));
    }

    #[test]
    fn left_reaches_below_an_embedded_production() {
        let mut spec = Specification::<String>::new();
        spec.token("A").token("B");
        spec.production("item", &["A", "marker", "B"], |p| {
            Ok(format!("{}{}{}", p.text(0), p.value(1), p.text(2)))
        });
        spec.production("marker", &[], |p| {
            let before = p
                .left(1)
                .and_then(|v| v.token())
                .map(|t| t.text.to_string())
                .unwrap_or_default();
            Ok(format!("[{}]", before))
        });
        spec.set_start("item");
        let parser = spec.build().unwrap();
        let result = parser
            .parse(vec![token("A", "a", 0), token("B", "b", 1)])
            .unwrap();
        assert_eq!(result, Some("a[a]b".to_string()));
    }

    #[test]
    fn spans_aggregate_on_reduce() {
        let mut spec = Specification::<(usize, usize)>::new();
        spec.token("A").token("B");
        spec.production("pair", &["A", "B"], |p| {
            Ok((p.index().unwrap(), p.end().unwrap()))
        });
        let parser = spec.build().unwrap();
        let result = parser
            .parse(vec![token("A", "aa", 3), token("B", "b", 6)])
            .unwrap();
        assert_eq!(result, Some((3, 7)));
    }

    #[test]
    fn fatal_action_aborts_the_parse() {
        let mut spec = Specification::<usize>::new();
        spec.token("A");
        spec.production("unit", &["A"], |_| {
            Err(ActionError::fatal("value out of range"))
        });
        let parser = spec.build().unwrap();
        match parser.parse(vec![token("A", "a", 0)]) {
            Err(ParseError::ActionFailed(message)) => {
                assert_eq!(message, "value out of range")
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unknown_token_kinds_are_syntax_errors() {
        let mut spec = Specification::<usize>::new();
        spec.token("A");
        spec.production("unit", &["A"], |_| Ok(1));
        let parser = spec.build().unwrap();
        assert_eq!(parser.parse(vec![token("ZZZ", "?", 0)]).unwrap(), None);
    }
}
