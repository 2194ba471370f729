// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;

use crate::lalr::LalrData;
use crate::parser::{ActionError, Parser, ReduceAction, YaccProduction};
use crate::production::Production;
use crate::state::Automaton;
use crate::symbol::terminal::END_TOKEN_NAME;
use crate::symbol::{Associativity, Symbol, SymbolTable, EMPTY_SYMBOL_NAME};
use crate::table::ParseTable;

/// One defect found while assembling or validating a grammar.
#[derive(Debug)]
pub enum Problem {
    Symbol(String),
    EndTokenInRhs(String),
    UndefinedNonTerminal(String),
    NonProductive(String),
    MissingStart,
    UnknownStart(String),
    UnusedToken(String),
    UnusedNonTerminal(String),
}

impl Problem {
    /// Warnings are reported and counted; they do not stop construction.
    pub fn is_warning(&self) -> bool {
        matches!(self, Problem::UnusedToken(_) | Problem::UnusedNonTerminal(_))
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Problem::Symbol(message) => write!(f, "{}", message),
            Problem::EndTokenInRhs(lhs) => write!(
                f,
                "production for \"{}\" uses the end marker on its right hand side",
                lhs
            ),
            Problem::UndefinedNonTerminal(name) => {
                write!(f, "non terminal \"{}\" is used but never defined", name)
            }
            Problem::NonProductive(name) => write!(
                f,
                "non terminal \"{}\" never derives a terminal string (infinite recursion)",
                name
            ),
            Problem::MissingStart => write!(f, "grammar has no productions"),
            Problem::UnknownStart(name) => {
                write!(f, "start symbol \"{}\" has no productions", name)
            }
            Problem::UnusedToken(name) => write!(f, "token \"{}\" is never used", name),
            Problem::UnusedNonTerminal(name) => {
                write!(f, "non terminal \"{}\" is never used", name)
            }
        }
    }
}

/// All (non warning) problems of an invalid grammar, aggregated.
#[derive(Debug)]
pub struct GrammarError {
    problems: Vec<Problem>,
}

impl GrammarError {
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid grammar:")?;
        for problem in self.problems.iter() {
            write!(f, "\n  {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for GrammarError {}

/// Declarative description of a grammar: terminals, precedence levels and
/// productions paired with their reduction callbacks. `build` validates
/// the grammar, constructs the LR(0) automaton, computes LALR(1)
/// lookaheads, resolves conflicts and returns the ready to run parser.
pub struct Specification<V> {
    symbol_table: SymbolTable,
    productions: Vec<Production>,
    actions: Vec<ReduceAction<V>>,
    start: Option<String>,
    problems: Vec<Problem>,
    use_default_reductions: bool,
}

impl<V> Specification<V> {
    pub fn new() -> Self {
        Self {
            symbol_table: SymbolTable::default(),
            productions: vec![],
            actions: vec![],
            start: None,
            problems: vec![],
            use_default_reductions: true,
        }
    }

    /// Declare a terminal.
    pub fn token(&mut self, name: &str) -> &mut Self {
        if let Err(error) = self.symbol_table.new_token(name) {
            self.problems.push(Problem::Symbol(error.to_string()));
        };
        self
    }

    pub fn tokens(&mut self, names: &[&str]) -> &mut Self {
        for name in names.iter() {
            self.token(name);
        }
        self
    }

    /// Declare single character terminals whose names are the characters
    /// themselves.
    pub fn literals(&mut self, characters: &str) -> &mut Self {
        for c in characters.chars() {
            self.symbol_table.new_literal_token(c);
        }
        self
    }

    /// Declare one precedence level, lowest first. Names that are not yet
    /// tokens become fictitious tokens usable with `production_with_prec`.
    pub fn precedence(&mut self, associativity: Associativity, names: &[&str]) -> &mut Self {
        if let Err(error) = self.symbol_table.set_precedences(associativity, names) {
            self.problems.push(Problem::Symbol(error.to_string()));
        };
        self
    }

    /// Add a production. An empty `rhs` (or the single name `empty`)
    /// derives the empty string.
    pub fn production<F>(&mut self, lhs: &str, rhs: &[&str], action: F) -> &mut Self
    where
        F: Fn(&mut YaccProduction<V>) -> Result<V, ActionError> + 'static,
    {
        self.add_production(lhs, rhs, None, Box::new(action))
    }

    /// Add a production whose conflict resolution precedence is taken
    /// from `precedence_name` instead of its rightmost terminal.
    pub fn production_with_prec<F>(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        precedence_name: &str,
        action: F,
    ) -> &mut Self
    where
        F: Fn(&mut YaccProduction<V>) -> Result<V, ActionError> + 'static,
    {
        self.add_production(lhs, rhs, Some(precedence_name), Box::new(action))
    }

    fn add_production(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        precedence_name: Option<&str>,
        action: ReduceAction<V>,
    ) -> &mut Self {
        let left_hand_side = match self.symbol_table.non_terminal_defined(lhs) {
            Ok(non_terminal) => non_terminal,
            Err(error) => {
                self.problems.push(Problem::Symbol(error.to_string()));
                return self;
            }
        };
        let mut right_hand_side = vec![];
        for name in rhs.iter() {
            if *name == EMPTY_SYMBOL_NAME {
                continue;
            };
            if *name == END_TOKEN_NAME {
                self.problems.push(Problem::EndTokenInRhs(lhs.to_string()));
                continue;
            };
            right_hand_side.push(self.symbol_table.symbol_used(name));
        }
        let precedence_override = match precedence_name {
            Some(name) => match self.symbol_table.precedence_token(name) {
                Ok(token) => {
                    token.mark_used();
                    Some(token)
                }
                Err(error) => {
                    self.problems.push(Problem::Symbol(error.to_string()));
                    None
                }
            },
            None => None,
        };
        let ident = self.productions.len() as u32 + 1;
        self.productions.push(Production::new(
            ident,
            left_hand_side,
            right_hand_side,
            precedence_override,
        ));
        self.actions.push(action);
        self
    }

    /// Select the start symbol; defaults to the first production's LHS.
    pub fn set_start(&mut self, name: &str) -> &mut Self {
        self.start = Some(name.to_string());
        self
    }

    /// Single reduction states normally apply their reduction regardless
    /// of lookahead; pass `false` to make every state consult the input.
    pub fn default_reductions(&mut self, on: bool) -> &mut Self {
        self.use_default_reductions = on;
        self
    }

    fn productivity_problems(&self) -> Vec<Problem> {
        let mut productive: BTreeSet<String> = BTreeSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.productions.iter() {
                let lhs = production.left_hand_side();
                if productive.contains(lhs.name()) {
                    continue;
                };
                let all_productive =
                    production.right_hand_side_symbols().all(|symbol| match symbol {
                        Symbol::Terminal(_) => true,
                        Symbol::NonTerminal(non_terminal) => {
                            productive.contains(non_terminal.name())
                        }
                    });
                if all_productive {
                    productive.insert(lhs.name().to_string());
                    changed = true;
                }
            }
        }
        self.symbol_table
            .non_terminals()
            .filter(|nt| !nt.is_undefined() && !productive.contains(nt.name()))
            .map(|nt| Problem::NonProductive(nt.name().to_string()))
            .collect()
    }

    /// Validate, then build automaton, lookaheads and tables.
    pub fn build(mut self) -> Result<Parser<V>, GrammarError> {
        let mut problems = std::mem::take(&mut self.problems);
        if self.productions.is_empty() {
            problems.push(Problem::MissingStart);
        };
        let start_non_terminal = if let Some(name) = &self.start {
            match self.symbol_table.get_non_terminal(name) {
                Some(non_terminal) if !non_terminal.is_undefined() => {
                    Some(non_terminal.clone())
                }
                _ => {
                    problems.push(Problem::UnknownStart(name.to_string()));
                    None
                }
            }
        } else {
            self.productions.first().map(|p| p.left_hand_side().clone())
        };
        for non_terminal in self.symbol_table.non_terminals() {
            if non_terminal.is_undefined() {
                problems.push(Problem::UndefinedNonTerminal(
                    non_terminal.name().to_string(),
                ));
            }
        }
        let have_undefined = problems
            .iter()
            .any(|p| matches!(p, Problem::UndefinedNonTerminal(_)));
        if !have_undefined {
            problems.extend(self.productivity_problems());
        };
        for token in self.symbol_table.tokens() {
            if token.is_unused() {
                problems.push(Problem::UnusedToken(token.name().to_string()));
            }
        }
        for non_terminal in self.symbol_table.non_terminals() {
            if non_terminal.is_unused() && Some(non_terminal) != start_non_terminal.as_ref() {
                problems.push(Problem::UnusedNonTerminal(non_terminal.name().to_string()));
            }
        }
        let mut warning_count = 0_u32;
        let mut errors = vec![];
        for problem in problems {
            if problem.is_warning() {
                warning_count += 1;
                log::warn!("{}", problem);
            } else {
                errors.push(problem);
            }
        }
        if !errors.is_empty() {
            return Err(GrammarError { problems: errors });
        };
        let start_non_terminal =
            start_non_terminal.expect("a missing start symbol is reported above");
        start_non_terminal.mark_used();

        let augmentation = Production::new(
            0,
            self.symbol_table.start_non_terminal().clone(),
            vec![Symbol::NonTerminal(start_non_terminal)],
            None,
        );
        let mut productions = vec![augmentation];
        productions.append(&mut self.productions);
        compute_firsts(&productions);
        let automaton = Automaton::build(&productions);
        let lalr = LalrData::build(&automaton, &productions);
        let table = ParseTable::build(&automaton, &lalr, self.use_default_reductions);
        let conflict_count =
            table.shift_reduce_conflicts() + table.reduce_reduce_conflicts();
        if conflict_count > 0 {
            log::warn!(
                "grammar has {} shift/reduce and {} reduce/reduce conflicts",
                table.shift_reduce_conflicts(),
                table.reduce_reduce_conflicts()
            );
        };
        Ok(Parser::new(
            self.symbol_table,
            productions,
            self.actions,
            automaton,
            table,
            warning_count + conflict_count,
        ))
    }
}

impl<V> Default for Specification<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TryFrom<Specification<V>> for Parser<V> {
    type Error = GrammarError;

    fn try_from(specification: Specification<V>) -> Result<Self, GrammarError> {
        specification.build()
    }
}

/// Fixed point computation of each non terminal's FIRST set and
/// transparency (derives the empty string), stored on the symbols.
pub(crate) fn compute_firsts(productions: &[Production]) {
    let mut changed = true;
    while changed {
        changed = false;
        for production in productions.iter() {
            let lhs = production.left_hand_side();
            let mut firsts = lhs.firsts_data_or_default();
            let before_len = firsts.token_set.len();
            let before_transparent = firsts.transparent;
            let mut transparent_through = true;
            for symbol in production.right_hand_side_symbols() {
                match symbol {
                    Symbol::Terminal(token) => {
                        firsts.token_set.insert(token);
                        transparent_through = false;
                        break;
                    }
                    Symbol::NonTerminal(non_terminal) => {
                        let inner = non_terminal.firsts_data_or_default();
                        firsts.token_set |= &inner.token_set;
                        if !inner.transparent {
                            transparent_through = false;
                            break;
                        }
                    }
                }
            }
            if transparent_through {
                firsts.transparent = true;
            };
            if firsts.token_set.len() != before_len || firsts.transparent != before_transparent
            {
                changed = true;
            };
            lhs.set_firsts_data(firsts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_non_terminal_is_an_error() {
        let mut spec = Specification::<()>::new();
        spec.token("A");
        spec.production("unit", &["A", "missing"], |_| Ok(()));
        match spec.build() {
            Err(error) => {
                assert!(error
                    .problems()
                    .iter()
                    .any(|p| matches!(p, Problem::UndefinedNonTerminal(name) if name == "missing")));
            }
            Ok(_) => panic!("expected a grammar error"),
        }
    }

    #[test]
    fn self_recursion_without_terminals_rejected() {
        let mut spec = Specification::<()>::new();
        spec.production("s", &["s"], |_| Ok(()));
        match spec.build() {
            Err(error) => {
                assert!(error
                    .problems()
                    .iter()
                    .any(|p| matches!(p, Problem::NonProductive(name) if name == "s")));
            }
            Ok(_) => panic!("expected a grammar error"),
        }
    }

    #[test]
    fn unused_symbols_warn_but_build() {
        let mut spec = Specification::<()>::new();
        spec.token("A").token("NEVER");
        spec.production("unit", &["A"], |_| Ok(()));
        spec.production("orphan", &["A"], |_| Ok(()));
        let parser = spec.build().unwrap();
        assert_eq!(parser.grammar_warnings(), 2);
    }

    #[test]
    fn duplicate_token_is_an_error() {
        let mut spec = Specification::<()>::new();
        spec.token("A").token("A");
        spec.production("unit", &["A"], |_| Ok(()));
        assert!(spec.build().is_err());
    }

    #[test]
    fn empty_marker_desugars_to_epsilon() {
        let mut spec = Specification::<()>::new();
        spec.token("A");
        spec.production("unit", &["opt", "A"], |_| Ok(()));
        spec.production("opt", &["empty"], |_| Ok(()));
        let parser = spec.build().unwrap();
        assert_eq!(parser.grammar_warnings(), 0);
        // opt : <empty> really is an epsilon production
        let tokens = vec![lexor::Token::new("A", "a", 1, 0, 1)];
        assert_eq!(parser.parse(tokens).unwrap(), Some(()));
    }

    #[test]
    fn firsts_fixed_point() {
        // S : A b ;  A : a | <empty>
        let mut table = SymbolTable::default();
        table.new_token("a").unwrap();
        table.new_token("b").unwrap();
        let s = table.non_terminal_defined("S").unwrap();
        let a = table.non_terminal_defined("A").unwrap();
        let start = table.start_non_terminal().clone();
        let productions = vec![
            Production::new(0, start.clone(), vec![Symbol::from(&s)], None),
            Production::new(
                1,
                s.clone(),
                vec![table.symbol_used("A"), table.symbol_used("b")],
                None,
            ),
            Production::new(2, a.clone(), vec![table.symbol_used("a")], None),
            Production::new(3, a.clone(), vec![], None),
        ];
        compute_firsts(&productions);
        assert!(a.is_transparent());
        assert!(!s.is_transparent());
        let s_firsts = s.firsts_data();
        let names: Vec<&str> = s_firsts.token_set.iter().map(|t| t.name()).collect();
        assert_eq!(names, ["a", "b"]);
        let a_firsts = a.firsts_data();
        let names: Vec<&str> = a_firsts.token_set.iter().map(|t| t.name()).collect();
        assert_eq!(names, ["a"]);
        assert!(start.firsts_data().token_set.contains(
            table.get_token("a").unwrap()
        ));
    }

    #[test]
    fn missing_grammar_reported() {
        let spec = Specification::<()>::new();
        match spec.build() {
            Err(error) => assert!(error
                .problems()
                .iter()
                .any(|p| matches!(p, Problem::MissingStart))),
            Ok(_) => panic!("expected a grammar error"),
        }
    }
}
