// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cmp::Ordering;
use std::rc::Rc;

use crate::symbol::non_terminal::NonTerminal;
use crate::symbol::terminal::Token;
use crate::symbol::{Associativity, Symbol};

#[derive(Debug)]
pub struct ProductionData {
    ident: u32,
    left_hand_side: NonTerminal,
    right_hand_side: Vec<Symbol>,
    precedence_override: Option<Token>,
}

#[derive(Debug, Clone)]
pub struct Production(Rc<ProductionData>);

/// Precedence and associativity of the rightmost terminal, if any.
fn rhs_associated_precedence(symbols: &[Symbol]) -> Option<(Associativity, u16)> {
    for symbol in symbols.iter().rev() {
        if let Symbol::Terminal(token) = symbol {
            return Some((token.associativity(), token.precedence()));
        }
    }
    None
}

impl Production {
    pub fn new(
        ident: u32,
        left_hand_side: NonTerminal,
        right_hand_side: Vec<Symbol>,
        precedence_override: Option<Token>,
    ) -> Self {
        Self(Rc::new(ProductionData {
            ident,
            left_hand_side,
            right_hand_side,
            precedence_override,
        }))
    }

    pub fn ident(&self) -> u32 {
        self.0.ident
    }

    pub fn len(&self) -> usize {
        self.0.right_hand_side.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn left_hand_side(&self) -> &NonTerminal {
        &self.0.left_hand_side
    }

    pub fn right_hand_side(&self) -> &[Symbol] {
        &self.0.right_hand_side
    }

    pub fn right_hand_side_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.0.right_hand_side.iter()
    }

    pub fn associativity(&self) -> Associativity {
        if let Some(token) = &self.0.precedence_override {
            token.associativity()
        } else if let Some((associativity, _)) =
            rhs_associated_precedence(&self.0.right_hand_side)
        {
            associativity
        } else {
            Associativity::default()
        }
    }

    /// Precedence level used during conflict resolution: the override
    /// token's level when one was given, otherwise the rightmost RHS
    /// terminal's level. `0` means none.
    pub fn precedence(&self) -> u16 {
        if let Some(token) = &self.0.precedence_override {
            token.precedence()
        } else if let Some((_, precedence)) = rhs_associated_precedence(&self.0.right_hand_side)
        {
            precedence
        } else {
            0
        }
    }
}

impl PartialEq for Production {
    fn eq(&self, other: &Self) -> bool {
        self.0.ident == other.0.ident
    }
}

impl Eq for Production {}

impl PartialOrd for Production {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Production {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ident.cmp(&other.0.ident)
    }
}

impl std::fmt::Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut string = format!("{}:", self.left_hand_side().name());
        if self.0.right_hand_side.is_empty() {
            string += " <empty>";
        } else {
            for symbol in self.0.right_hand_side.iter() {
                string += &format!(" {}", symbol);
            }
        };
        write!(f, "{}", string)
    }
}

/// An LR(0) item: a production and a dot position within its RHS.
#[derive(Debug, PartialOrd, Ord, PartialEq, Eq, Clone)]
pub struct GrammarItemKey {
    production: Production,
    dot: usize,
}

impl From<&Production> for GrammarItemKey {
    fn from(production: &Production) -> Self {
        Self {
            production: production.clone(),
            dot: 0,
        }
    }
}

impl GrammarItemKey {
    pub fn production(&self) -> &Production {
        &self.production
    }

    pub fn dot(&self) -> usize {
        self.dot
    }

    pub fn shifted(&self) -> Self {
        debug_assert!(self.dot < self.production.len());
        Self {
            production: self.production.clone(),
            dot: self.dot + 1,
        }
    }

    pub fn is_reducible(&self) -> bool {
        self.dot >= self.production.len()
    }

    pub fn is_kernel_item(&self) -> bool {
        self.dot > 0 || self.production.left_hand_side().is_start()
    }

    pub fn is_closable(&self) -> bool {
        matches!(self.next_symbol(), Some(Symbol::NonTerminal(_)))
    }

    pub fn next_symbol(&self) -> Option<&Symbol> {
        self.production.right_hand_side().get(self.dot)
    }

    pub fn next_symbol_is(&self, symbol: &Symbol) -> bool {
        match self.next_symbol() {
            Some(next_symbol) => next_symbol == symbol,
            None => false,
        }
    }

    /// The symbols after the one at the dot; empty for a reduce item.
    pub fn rhs_tail(&self) -> &[Symbol] {
        let right_hand_side = self.production.right_hand_side();
        &right_hand_side[(self.dot + 1).min(right_hand_side.len())..]
    }
}

impl std::fmt::Display for GrammarItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut string = format!("{}:", self.production.left_hand_side().name());
        if self.production.right_hand_side().is_empty() {
            string += " . <empty>";
        } else {
            for (index, symbol) in self.production.right_hand_side().iter().enumerate() {
                if index == self.dot {
                    string += &format!(" . {}", symbol);
                } else {
                    string += &format!(" {}", symbol);
                }
            }
            if self.dot >= self.production.len() {
                string += " .";
            }
        };
        write!(f, "{}", string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn production(table: &mut SymbolTable) -> Production {
        table.new_token("NUMBER").unwrap();
        table
            .set_precedences(Associativity::Left, &["PLUS"])
            .unwrap();
        table
            .set_precedences(Associativity::Right, &["UMINUS"])
            .unwrap();
        let expr = table.non_terminal_defined("expr").unwrap();
        let rhs = vec![
            table.symbol_used("expr"),
            table.symbol_used("PLUS"),
            table.symbol_used("expr"),
        ];
        Production::new(1, expr, rhs, None)
    }

    #[test]
    fn rightmost_terminal_precedence() {
        let mut table = SymbolTable::default();
        let production = production(&mut table);
        let plus = table.get_token("PLUS").unwrap();
        assert_eq!(production.precedence(), plus.precedence());
        assert_eq!(production.associativity(), Associativity::Left);
    }

    #[test]
    fn precedence_override_wins() {
        let mut table = SymbolTable::default();
        table.new_token("MINUS").unwrap();
        table
            .set_precedences(Associativity::Left, &["MINUS"])
            .unwrap();
        table
            .set_precedences(Associativity::Right, &["UMINUS"])
            .unwrap();
        let expr = table.non_terminal_defined("expr").unwrap();
        let rhs = vec![table.symbol_used("MINUS"), table.symbol_used("expr")];
        let uminus = table.get_token("UMINUS").unwrap().clone();
        let production = Production::new(1, expr, rhs, Some(uminus.clone()));
        assert_eq!(production.precedence(), uminus.precedence());
        assert_eq!(production.associativity(), Associativity::Right);
    }

    #[test]
    fn item_dot_movement() {
        let mut table = SymbolTable::default();
        let production = production(&mut table);
        let item = GrammarItemKey::from(&production);
        assert!(item.is_kernel_item() == false);
        assert!(item.is_closable());
        assert_eq!(
            item.rhs_tail()
                .iter()
                .map(|s| s.name())
                .collect::<Vec<&str>>(),
            ["PLUS", "expr"]
        );
        let item = item.shifted();
        assert!(item.is_kernel_item());
        assert!(!item.is_closable());
        assert_eq!(item.rhs_tail().len(), 1);
        let item = item.shifted().shifted();
        assert!(item.is_reducible());
        assert!(item.rhs_tail().is_empty());
        assert_eq!(format!("{}", item), "expr: expr PLUS expr .");
    }

    #[test]
    fn display_formats() {
        let mut table = SymbolTable::default();
        let production = production(&mut table);
        assert_eq!(format!("{}", production), "expr: expr PLUS expr");
        let item = GrammarItemKey::from(&production).shifted();
        assert_eq!(format!("{}", item), "expr: expr . PLUS expr");
        let epsilon = Production::new(
            2,
            table.non_terminal_defined("opt").unwrap(),
            vec![],
            None,
        );
        assert_eq!(format!("{}", epsilon), "opt: <empty>");
    }
}
