// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::production::{GrammarItemKey, Production};
use crate::symbol::non_terminal::NonTerminal;
use crate::symbol::terminal::Token;
use crate::symbol::Symbol;

#[derive(Debug)]
pub struct ParserStateData {
    ident: u32,
    kernel: BTreeSet<GrammarItemKey>,
    items: BTreeSet<GrammarItemKey>,
    shifts: RefCell<BTreeMap<Token, ParserState>>,
    gotos: RefCell<BTreeMap<NonTerminal, ParserState>>,
}

/// One state of the LR(0) canonical collection. States are identified by
/// their kernel item set; `ident` gives the reproducible numbering.
#[derive(Debug, Clone)]
pub struct ParserState(Rc<ParserStateData>);

impl PartialEq for ParserState {
    fn eq(&self, other: &Self) -> bool {
        self.0.ident == other.0.ident
    }
}

impl Eq for ParserState {}

impl PartialOrd for ParserState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParserState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ident.cmp(&other.0.ident)
    }
}

impl ParserState {
    fn new(ident: u32, kernel: BTreeSet<GrammarItemKey>, items: BTreeSet<GrammarItemKey>) -> Self {
        Self(Rc::new(ParserStateData {
            ident,
            kernel,
            items,
            shifts: RefCell::new(BTreeMap::new()),
            gotos: RefCell::new(BTreeMap::new()),
        }))
    }

    pub fn ident(&self) -> u32 {
        self.0.ident
    }

    pub fn kernel(&self) -> &BTreeSet<GrammarItemKey> {
        &self.0.kernel
    }

    pub fn items(&self) -> &BTreeSet<GrammarItemKey> {
        &self.0.items
    }

    pub fn reducible_items(&self) -> Vec<GrammarItemKey> {
        self.0
            .items
            .iter()
            .filter(|i| i.is_reducible())
            .cloned()
            .collect()
    }

    pub fn has_accept_item(&self) -> bool {
        self.0
            .items
            .iter()
            .any(|i| i.is_reducible() && i.production().ident() == 0)
    }

    fn add_shift(&self, token: Token, state: ParserState) {
        self.0.shifts.borrow_mut().insert(token, state);
    }

    fn add_goto(&self, non_terminal: NonTerminal, state: ParserState) {
        self.0.gotos.borrow_mut().insert(non_terminal, state);
    }

    pub fn shifts(&self) -> Vec<(Token, ParserState)> {
        self.0
            .shifts
            .borrow()
            .iter()
            .map(|(t, s)| (t.clone(), s.clone()))
            .collect()
    }

    pub fn gotos(&self) -> Vec<(NonTerminal, ParserState)> {
        self.0
            .gotos
            .borrow()
            .iter()
            .map(|(n, s)| (n.clone(), s.clone()))
            .collect()
    }

    pub fn shift_target(&self, token: &Token) -> Option<ParserState> {
        self.0.shifts.borrow().get(token).cloned()
    }

    pub fn goto_target(&self, non_terminal: &NonTerminal) -> Option<ParserState> {
        self.0.gotos.borrow().get(non_terminal).cloned()
    }

    pub fn edge(&self, symbol: &Symbol) -> Option<ParserState> {
        match symbol {
            Symbol::Terminal(token) => self.shift_target(token),
            Symbol::NonTerminal(non_terminal) => self.goto_target(non_terminal),
        }
    }
}

/// The canonical collection of LR(0) states and the GOTO function over
/// the augmented grammar.
#[derive(Debug)]
pub struct Automaton {
    states: Vec<ParserState>,
}

impl Automaton {
    pub fn build(productions: &[Production]) -> Self {
        let mut by_lhs: BTreeMap<NonTerminal, Vec<Production>> = BTreeMap::new();
        for production in productions.iter() {
            by_lhs
                .entry(production.left_hand_side().clone())
                .or_default()
                .push(production.clone());
        }

        let closure = |kernel: &BTreeSet<GrammarItemKey>| -> BTreeSet<GrammarItemKey> {
            let mut items = kernel.clone();
            let mut pending: Vec<GrammarItemKey> = items.iter().cloned().collect();
            while let Some(item) = pending.pop() {
                if let Some(Symbol::NonTerminal(non_terminal)) = item.next_symbol() {
                    if let Some(lhs_productions) = by_lhs.get(non_terminal) {
                        for production in lhs_productions.iter() {
                            let key = GrammarItemKey::from(production);
                            if items.insert(key.clone()) {
                                pending.push(key);
                            }
                        }
                    }
                }
            }
            items
        };

        let start_kernel: BTreeSet<GrammarItemKey> =
            [GrammarItemKey::from(&productions[0])].into_iter().collect();
        let mut states = vec![ParserState::new(
            0,
            start_kernel.clone(),
            closure(&start_kernel),
        )];
        let mut kernel_idents: BTreeMap<BTreeSet<GrammarItemKey>, u32> = BTreeMap::new();
        kernel_idents.insert(start_kernel, 0);

        // Breadth first over states; successor symbols are visited in
        // sorted order so the numbering is reproducible.
        let mut index = 0;
        while index < states.len() {
            let state = states[index].clone();
            let mut symbols: BTreeSet<Symbol> = BTreeSet::new();
            for item in state.items().iter() {
                if let Some(symbol) = item.next_symbol() {
                    symbols.insert(symbol.clone());
                }
            }
            for symbol in symbols {
                let kernel: BTreeSet<GrammarItemKey> = state
                    .items()
                    .iter()
                    .filter(|i| i.next_symbol_is(&symbol))
                    .map(|i| i.shifted())
                    .collect();
                let target = if let Some(&ident) = kernel_idents.get(&kernel) {
                    states[ident as usize].clone()
                } else {
                    let ident = states.len() as u32;
                    let new_state = ParserState::new(ident, kernel.clone(), closure(&kernel));
                    kernel_idents.insert(kernel, ident);
                    states.push(new_state.clone());
                    new_state
                };
                match symbol {
                    Symbol::Terminal(token) => state.add_shift(token, target),
                    Symbol::NonTerminal(non_terminal) => state.add_goto(non_terminal, target),
                }
            }
            index += 1;
        }
        log::debug!("LR(0) automaton: {} states", states.len());
        Self { states }
    }

    pub fn states(&self) -> &[ParserState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    /// The canonical expression grammar:
    ///   E : E + T | T
    ///   T : T * F | F
    ///   F : ( E ) | id
    fn expression_grammar() -> (SymbolTable, Vec<Production>) {
        let mut table = SymbolTable::default();
        for name in ["PLUS", "TIMES", "LPAREN", "RPAREN", "ID"] {
            table.new_token(name).unwrap();
        }
        let e = table.non_terminal_defined("E").unwrap();
        let t = table.non_terminal_defined("T").unwrap();
        let f = table.non_terminal_defined("F").unwrap();
        let start = table.start_non_terminal().clone();
        let mut productions = vec![Production::new(
            0,
            start,
            vec![Symbol::from(&e)],
            None,
        )];
        let rules: Vec<(&NonTerminal, Vec<&str>)> = vec![
            (&e, vec!["E", "PLUS", "T"]),
            (&e, vec!["T"]),
            (&t, vec!["T", "TIMES", "F"]),
            (&t, vec!["F"]),
            (&f, vec!["LPAREN", "E", "RPAREN"]),
            (&f, vec!["ID"]),
        ];
        for (lhs, rhs_names) in rules {
            let ident = productions.len() as u32;
            let rhs = rhs_names.iter().map(|n| table.symbol_used(n)).collect();
            productions.push(Production::new(ident, (*lhs).clone(), rhs, None));
        }
        (table, productions)
    }

    #[test]
    fn canonical_collection_size() {
        let (_table, productions) = expression_grammar();
        let automaton = Automaton::build(&productions);
        // the textbook count for this grammar
        assert_eq!(automaton.len(), 12);
    }

    #[test]
    fn kernel_identity_is_state_identity() {
        let (_table, productions) = expression_grammar();
        let automaton = Automaton::build(&productions);
        for (i, a) in automaton.states().iter().enumerate() {
            for b in automaton.states().iter().skip(i + 1) {
                assert_ne!(a.kernel(), b.kernel());
            }
        }
    }

    #[test]
    fn numbering_is_reproducible() {
        let (_table, productions) = expression_grammar();
        let first = Automaton::build(&productions);
        let second = Automaton::build(&productions);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.states().iter().zip(second.states().iter()) {
            assert_eq!(a.kernel(), b.kernel());
            assert_eq!(
                a.shifts()
                    .iter()
                    .map(|(t, s)| (t.name().to_string(), s.ident()))
                    .collect::<Vec<_>>(),
                b.shifts()
                    .iter()
                    .map(|(t, s)| (t.name().to_string(), s.ident()))
                    .collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn start_state_closure() {
        let (_table, productions) = expression_grammar();
        let automaton = Automaton::build(&productions);
        // S' : . E plus every production of E, T and F with the dot at 0
        assert_eq!(automaton.states()[0].items().len(), 7);
        assert_eq!(automaton.states()[0].kernel().len(), 1);
    }

    #[test]
    fn goto_on_start_symbol_reaches_accept_item() {
        let (table, productions) = expression_grammar();
        let automaton = Automaton::build(&productions);
        let e = table.get_non_terminal("E").unwrap();
        let target = automaton.states()[0].goto_target(e).unwrap();
        assert!(target.has_accept_item());
    }
}
