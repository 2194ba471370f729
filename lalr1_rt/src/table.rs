// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeMap;

use crate::lalr::LalrData;
use crate::state::Automaton;
use crate::symbol::non_terminal::NonTerminal;
use crate::symbol::terminal::{Token, TokenSet};
use crate::symbol::Associativity;

/// A parse action. `SyntaxError` entries are deliberate holes written by
/// nonassoc conflict resolution: the combination is forbidden rather than
/// undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(u32),
    Reduce(u32),
    Accept,
    SyntaxError,
}

#[derive(Debug, Default)]
struct StateTable {
    actions: BTreeMap<Token, Action>,
    gotos: BTreeMap<NonTerminal, u32>,
    default_reduction: Option<u32>,
    notes: Vec<String>,
}

/// ACTION and GOTO tables for the whole automaton plus conflict records.
#[derive(Debug)]
pub struct ParseTable {
    states: Vec<StateTable>,
    shift_reduce_conflicts: u32,
    reduce_reduce_conflicts: u32,
}

impl ParseTable {
    pub fn build(automaton: &Automaton, lalr: &LalrData, use_default_reductions: bool) -> Self {
        let mut states = vec![];
        let mut shift_reduce_conflicts = 0_u32;
        let mut reduce_reduce_conflicts = 0_u32;
        for state in automaton.states() {
            let mut table = StateTable::default();
            for (token, target) in state.shifts() {
                table.actions.insert(token, Action::Shift(target.ident()));
            }
            for (non_terminal, target) in state.gotos() {
                table.gotos.insert(non_terminal, target.ident());
            }
            // reducible items arrive sorted by production ident, so on a
            // reduce/reduce clash the earlier declaration is in place first
            for item in state.reducible_items() {
                let production = item.production();
                if production.ident() == 0 {
                    table.actions.insert(Token::End, Action::Accept);
                    continue;
                };
                let lookaheads = match lalr.lookahead_set(state.ident(), production.ident()) {
                    Some(lookaheads) => lookaheads.clone(),
                    None => TokenSet::new(),
                };
                for token in lookaheads.iter() {
                    let existing = table.actions.get(token).copied();
                    match existing {
                        None => {
                            table
                                .actions
                                .insert(token.clone(), Action::Reduce(production.ident()));
                        }
                        Some(Action::Shift(_)) => {
                            let token_precedence = token.precedence();
                            let rule_precedence = production.precedence();
                            if token_precedence == 0 || rule_precedence == 0 {
                                shift_reduce_conflicts += 1;
                                log::warn!(
                                    "state {}: shift/reduce conflict on {} (rule {}) resolved as shift",
                                    state.ident(),
                                    token.name(),
                                    production.ident()
                                );
                                table.notes.push(format!(
                                    "! {} [ reduce using rule {} ] (shift/reduce conflict)",
                                    token.name(),
                                    production.ident()
                                ));
                            } else if token_precedence > rule_precedence {
                                table.notes.push(format!(
                                    "! {} [ reduce using rule {} ]",
                                    token.name(),
                                    production.ident()
                                ));
                            } else if token_precedence < rule_precedence {
                                table.notes.push(format!(
                                    "! {} [ shift ]",
                                    token.name()
                                ));
                                table
                                    .actions
                                    .insert(token.clone(), Action::Reduce(production.ident()));
                            } else {
                                match token.associativity() {
                                    Associativity::Left => {
                                        table.notes.push(format!(
                                            "! {} [ shift ]",
                                            token.name()
                                        ));
                                        table.actions.insert(
                                            token.clone(),
                                            Action::Reduce(production.ident()),
                                        );
                                    }
                                    Associativity::Right => {
                                        table.notes.push(format!(
                                            "! {} [ reduce using rule {} ]",
                                            token.name(),
                                            production.ident()
                                        ));
                                    }
                                    Associativity::NonAssoc => {
                                        table.notes.push(format!(
                                            "! {} [ nonassociative: syntax error ]",
                                            token.name()
                                        ));
                                        table
                                            .actions
                                            .insert(token.clone(), Action::SyntaxError);
                                    }
                                }
                            }
                        }
                        Some(Action::Reduce(kept)) => {
                            reduce_reduce_conflicts += 1;
                            log::warn!(
                                "state {}: reduce/reduce conflict on {}: rule {} vs rule {}, using rule {}",
                                state.ident(),
                                token.name(),
                                kept,
                                production.ident(),
                                kept
                            );
                            table.notes.push(format!(
                                "! {} [ reduce using rule {} ] (reduce/reduce conflict)",
                                token.name(),
                                production.ident()
                            ));
                        }
                        Some(Action::Accept) => {
                            reduce_reduce_conflicts += 1;
                            log::warn!(
                                "state {}: reduce/reduce conflict on {}: rule 0 vs rule {}, using rule 0",
                                state.ident(),
                                token.name(),
                                production.ident()
                            );
                            table.notes.push(format!(
                                "! {} [ reduce using rule {} ] (reduce/reduce conflict)",
                                token.name(),
                                production.ident()
                            ));
                        }
                        Some(Action::SyntaxError) => (),
                    }
                }
            }
            if use_default_reductions {
                table.default_reduction = single_reduction(&table.actions);
            };
            states.push(table);
        }
        Self {
            states,
            shift_reduce_conflicts,
            reduce_reduce_conflicts,
        }
    }

    pub fn action(&self, state: u32, token: &Token) -> Option<Action> {
        self.states[state as usize].actions.get(token).copied()
    }

    pub fn goto(&self, state: u32, non_terminal: &NonTerminal) -> Option<u32> {
        self.states[state as usize].gotos.get(non_terminal).copied()
    }

    /// The single reduction a state applies regardless of lookahead, if
    /// the state qualifies.
    pub fn default_reduction(&self, state: u32) -> Option<u32> {
        self.states[state as usize].default_reduction
    }

    /// Terminals for which a state has any defined action.
    pub fn expected_tokens(&self, state: u32) -> TokenSet {
        let mut token_set = TokenSet::new();
        for (token, action) in self.states[state as usize].actions.iter() {
            if !matches!(action, Action::SyntaxError) {
                token_set.insert(token);
            }
        }
        token_set
    }

    pub fn state_actions(&self, state: u32) -> Vec<(Token, Action)> {
        self.states[state as usize]
            .actions
            .iter()
            .map(|(t, a)| (t.clone(), *a))
            .collect()
    }

    pub fn state_gotos(&self, state: u32) -> Vec<(NonTerminal, u32)> {
        self.states[state as usize]
            .gotos
            .iter()
            .map(|(n, s)| (n.clone(), *s))
            .collect()
    }

    pub fn state_notes(&self, state: u32) -> &[String] {
        &self.states[state as usize].notes
    }

    pub fn shift_reduce_conflicts(&self) -> u32 {
        self.shift_reduce_conflicts
    }

    pub fn reduce_reduce_conflicts(&self) -> u32 {
        self.reduce_reduce_conflicts
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn single_reduction(actions: &BTreeMap<Token, Action>) -> Option<u32> {
    let mut reduction = None;
    for action in actions.values() {
        match action {
            Action::Reduce(production) => match reduction {
                None => reduction = Some(*production),
                Some(kept) if kept == *production => (),
                _ => return None,
            },
            _ => return None,
        }
    }
    reduction
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn single_reduction_detection() {
        let mut actions = BTreeMap::new();
        assert_eq!(single_reduction(&actions), None);
        actions.insert(Token::new_token("A"), Action::Reduce(3));
        actions.insert(Token::new_token("B"), Action::Reduce(3));
        assert_eq!(single_reduction(&actions), Some(3));
        actions.insert(Token::new_token("C"), Action::Reduce(4));
        assert_eq!(single_reduction(&actions), None);
        let mut actions = BTreeMap::new();
        actions.insert(Token::new_token("A"), Action::Reduce(3));
        actions.insert(Token::new_token("B"), Action::Shift(1));
        assert_eq!(single_reduction(&actions), None);
    }
}
