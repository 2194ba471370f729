// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::{collections::BTreeMap, fmt};

use lazy_static::lazy_static;

pub mod non_terminal;
pub mod terminal;

use crate::symbol::non_terminal::NonTerminal;
use crate::symbol::terminal::{Token, ERROR_TOKEN_NAME};

/// Epsilon marker: a right hand side consisting of this name alone (or an
/// empty slice) stands for the empty string.
pub const EMPTY_SYMBOL_NAME: &str = "empty";

lazy_static! {
    static ref NAME_CRE: regex::Regex =
        regex::Regex::new(r"\A[a-zA-Z_][a-zA-Z0-9_]*\z").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    NonAssoc,
    Left,
    Right,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::NonAssoc
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Associativity::*;
        match self {
            NonAssoc => write!(f, "NonAssoc"),
            Left => write!(f, "Left"),
            Right => write!(f, "Right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(Token),
    NonTerminal(NonTerminal),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Terminal(token) => token.name(),
            Symbol::NonTerminal(non_terminal) => non_terminal.name(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_non_terminal(&self) -> bool {
        matches!(self, Symbol::NonTerminal(_))
    }
}

impl From<&Token> for Symbol {
    fn from(token: &Token) -> Self {
        Symbol::Terminal(token.clone())
    }
}

impl From<&NonTerminal> for Symbol {
    fn from(non_terminal: &NonTerminal) -> Self {
        Symbol::NonTerminal(non_terminal.clone())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug)]
pub enum Error {
    InvalidName(String),
    ReservedName(String),
    DuplicateToken(String),
    ConflictsWithToken(String),
    DuplicatePrecedence(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidName(name) => write!(f, "\"{}\" is not a valid symbol name", name),
            Error::ReservedName(name) => write!(f, "\"{}\" is a reserved symbol name", name),
            Error::DuplicateToken(name) => write!(f, "Token \"{}\" already defined", name),
            Error::ConflictsWithToken(name) => {
                write!(f, "Non terminal \"{}\" conflicts with a token", name)
            }
            Error::DuplicatePrecedence(name) => {
                write!(f, "Precedence of \"{}\" already set", name)
            }
        }
    }
}

/// Owns all terminals and non terminals of one grammar, keyed by name.
#[derive(Debug)]
pub struct SymbolTable {
    tokens: BTreeMap<String, Token>,
    non_terminals: BTreeMap<String, NonTerminal>,
    start_non_terminal: NonTerminal,
    next_precedence: u16,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self {
            tokens: BTreeMap::new(),
            non_terminals: BTreeMap::new(),
            start_non_terminal: NonTerminal::new_start(),
            next_precedence: 0,
        }
    }
}

impl SymbolTable {
    fn check_name(name: &str) -> Result<(), Error> {
        if !NAME_CRE.is_match(name) {
            Err(Error::InvalidName(name.to_string()))
        } else if name == ERROR_TOKEN_NAME || name == EMPTY_SYMBOL_NAME {
            Err(Error::ReservedName(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Declare a token. Tokens first seen in a precedence declaration may
    /// be declared later; declaring the same token twice is an error.
    pub fn new_token(&mut self, name: &str) -> Result<Token, Error> {
        Self::check_name(name)?;
        if let Some(token) = self.tokens.get(name) {
            if token.is_declared() {
                Err(Error::DuplicateToken(name.to_string()))
            } else {
                token.mark_declared();
                Ok(token.clone())
            }
        } else {
            let token = Token::new_token(name);
            token.mark_declared();
            self.tokens.insert(name.to_string(), token.clone());
            Ok(token)
        }
    }

    /// Declare a single character literal token whose name is the
    /// character itself. Idempotent.
    pub fn new_literal_token(&mut self, c: char) -> Token {
        let name = c.to_string();
        if let Some(token) = self.tokens.get(&name) {
            token.mark_declared();
            token.clone()
        } else {
            let token = Token::new_token(&name);
            token.mark_declared();
            self.tokens.insert(name, token.clone());
            token
        }
    }

    /// Look up or create a token for a precedence declaration or a
    /// production's precedence override. Fictitious tokens (those that
    /// never reach the lexer) need no separate declaration.
    pub fn precedence_token(&mut self, name: &str) -> Result<Token, Error> {
        if let Some(token) = self.tokens.get(name) {
            return Ok(token.clone());
        };
        let mut characters = name.chars();
        if let (Some(c), None) = (characters.next(), characters.next()) {
            if !NAME_CRE.is_match(name) {
                return Ok(self.new_literal_token(c));
            }
        };
        Self::check_name(name)?;
        let token = Token::new_token(name);
        self.tokens.insert(name.to_string(), token.clone());
        Ok(token)
    }

    /// Assign the next (higher) precedence level to `names`.
    pub fn set_precedences(
        &mut self,
        associativity: Associativity,
        names: &[&str],
    ) -> Result<(), Error> {
        self.next_precedence += 1;
        let precedence = self.next_precedence;
        for name in names.iter() {
            let token = self.precedence_token(name)?;
            if token.precedence_has_been_set() {
                return Err(Error::DuplicatePrecedence(name.to_string()));
            };
            token.set_associativity(associativity);
            token.set_precedence(precedence);
        }
        Ok(())
    }

    pub fn get_token(&self, name: &str) -> Option<&Token> {
        self.tokens.get(name)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn non_terminal_defined(&mut self, name: &str) -> Result<NonTerminal, Error> {
        if self.tokens.contains_key(name) {
            return Err(Error::ConflictsWithToken(name.to_string()));
        };
        if let Some(non_terminal) = self.non_terminals.get(name) {
            non_terminal.mark_defined();
            Ok(non_terminal.clone())
        } else {
            Self::check_name(name)?;
            let non_terminal = NonTerminal::new_defined(name);
            self.non_terminals
                .insert(name.to_string(), non_terminal.clone());
            Ok(non_terminal)
        }
    }

    pub fn get_non_terminal(&self, name: &str) -> Option<&NonTerminal> {
        self.non_terminals.get(name)
    }

    pub fn non_terminals(&self) -> impl Iterator<Item = &NonTerminal> {
        self.non_terminals.values()
    }

    pub fn start_non_terminal(&self) -> &NonTerminal {
        &self.start_non_terminal
    }

    /// Resolve a right hand side name, recording the use. Unknown names
    /// become (so far) undefined non terminals.
    pub fn symbol_used(&mut self, name: &str) -> Symbol {
        if name == ERROR_TOKEN_NAME {
            return Symbol::Terminal(Token::Error);
        };
        if let Some(token) = self.tokens.get(name) {
            token.mark_used();
            Symbol::Terminal(token.clone())
        } else if let Some(non_terminal) = self.non_terminals.get(name) {
            non_terminal.mark_used();
            Symbol::NonTerminal(non_terminal.clone())
        } else {
            let non_terminal = NonTerminal::new_used(name);
            self.non_terminals
                .insert(name.to_string(), non_terminal.clone());
            Symbol::NonTerminal(non_terminal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_levels_ascend() {
        let mut table = SymbolTable::default();
        table
            .set_precedences(Associativity::Left, &["PLUS", "MINUS"])
            .unwrap();
        table
            .set_precedences(Associativity::Left, &["TIMES"])
            .unwrap();
        table
            .set_precedences(Associativity::Right, &["UMINUS"])
            .unwrap();
        let plus = table.get_token("PLUS").unwrap();
        let times = table.get_token("TIMES").unwrap();
        let uminus = table.get_token("UMINUS").unwrap();
        assert!(plus.precedence() < times.precedence());
        assert!(times.precedence() < uminus.precedence());
        assert_eq!(plus.associativity(), Associativity::Left);
        assert_eq!(uminus.associativity(), Associativity::Right);
    }

    #[test]
    fn duplicate_tokens_rejected() {
        let mut table = SymbolTable::default();
        assert!(table.new_token("NUMBER").is_ok());
        match table.new_token("NUMBER") {
            Err(Error::DuplicateToken(name)) => assert_eq!(name, "NUMBER"),
            other => panic!("unexpected: {:?}", other),
        }
        // a precedence only token may be declared afterwards
        table
            .set_precedences(Associativity::Left, &["PLUS"])
            .unwrap();
        assert!(table.new_token("PLUS").is_ok());
    }

    #[test]
    fn reserved_names_rejected() {
        let mut table = SymbolTable::default();
        assert!(matches!(
            table.new_token("error"),
            Err(Error::ReservedName(_))
        ));
        assert!(matches!(
            table.new_token("$end"),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn error_symbol_is_a_terminal() {
        let mut table = SymbolTable::default();
        let symbol = table.symbol_used("error");
        assert!(symbol.is_terminal());
        assert_eq!(symbol.name(), "error");
    }

    #[test]
    fn rhs_names_become_non_terminals() {
        let mut table = SymbolTable::default();
        table.new_token("NUMBER").unwrap();
        assert!(table.symbol_used("NUMBER").is_terminal());
        let symbol = table.symbol_used("expr");
        assert!(symbol.is_non_terminal());
        let non_terminal = table.get_non_terminal("expr").unwrap();
        assert!(non_terminal.is_undefined());
        table.non_terminal_defined("expr").unwrap();
        assert!(!table.get_non_terminal("expr").unwrap().is_undefined());
    }
}
