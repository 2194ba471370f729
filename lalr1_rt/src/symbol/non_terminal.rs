// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    fmt,
    rc::Rc,
};

use crate::symbol::terminal::TokenSet;

/// Name of the augmented start symbol.
pub const START_NON_TERMINAL_NAME: &str = "S'";

/// FIRST set of a non terminal; `transparent` records that it derives the
/// empty string.
#[derive(Debug, Clone, Default)]
pub struct FirstsData {
    pub token_set: TokenSet,
    pub transparent: bool,
}

impl fmt::Display for FirstsData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:({})", self.token_set, self.transparent)
    }
}

#[derive(Debug, Default)]
pub struct NonTerminalData {
    name: String,
    defined: Cell<bool>,
    used: Cell<bool>,
    firsts_data: RefCell<Option<FirstsData>>,
}

#[derive(Debug, Clone)]
pub enum NonTerminal {
    Start(Rc<NonTerminalData>),
    UserDefined(Rc<NonTerminalData>),
}

impl NonTerminal {
    pub fn new_start() -> Self {
        let mut non_terminal_data = NonTerminalData::default();
        non_terminal_data.name = START_NON_TERMINAL_NAME.to_string();
        non_terminal_data.defined.set(true);
        NonTerminal::Start(Rc::new(non_terminal_data))
    }

    pub fn new_defined(name: &str) -> Self {
        let mut non_terminal_data = NonTerminalData::default();
        non_terminal_data.name = name.to_string();
        non_terminal_data.defined.set(true);
        NonTerminal::UserDefined(Rc::new(non_terminal_data))
    }

    pub fn new_used(name: &str) -> Self {
        let mut non_terminal_data = NonTerminalData::default();
        non_terminal_data.name = name.to_string();
        non_terminal_data.used.set(true);
        NonTerminal::UserDefined(Rc::new(non_terminal_data))
    }

    fn data(&self) -> &Rc<NonTerminalData> {
        match self {
            NonTerminal::Start(non_terminal_data)
            | NonTerminal::UserDefined(non_terminal_data) => non_terminal_data,
        }
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn is_start(&self) -> bool {
        matches!(self, NonTerminal::Start(_))
    }

    pub fn mark_defined(&self) {
        self.data().defined.set(true)
    }

    pub fn mark_used(&self) {
        self.data().used.set(true)
    }

    pub fn is_undefined(&self) -> bool {
        !self.data().defined.get()
    }

    pub fn is_unused(&self) -> bool {
        !self.data().used.get()
    }

    pub fn set_firsts_data(&self, firsts_data: FirstsData) {
        *self.data().firsts_data.borrow_mut() = Some(firsts_data)
    }

    pub fn firsts_data(&self) -> FirstsData {
        let msg = format!("{}: firsts data should be set", self.name());
        self.data().firsts_data.borrow().clone().expect(&msg)
    }

    pub fn firsts_data_or_default(&self) -> FirstsData {
        self.data().firsts_data.borrow().clone().unwrap_or_default()
    }

    /// `true` if this non terminal can derive the empty string.
    pub fn is_transparent(&self) -> bool {
        self.data()
            .firsts_data
            .borrow()
            .as_ref()
            .map(|f| f.transparent)
            .unwrap_or(false)
    }
}

impl PartialEq for NonTerminal {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for NonTerminal {}

impl PartialOrd for NonTerminal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NonTerminal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_and_use_flags() {
        let defined = NonTerminal::new_defined("expr");
        assert!(!defined.is_undefined());
        assert!(defined.is_unused());
        let used = NonTerminal::new_used("term");
        assert!(used.is_undefined());
        used.mark_defined();
        assert!(!used.is_undefined());
    }

    #[test]
    fn firsts_data_round_trip() {
        let non_terminal = NonTerminal::new_defined("expr");
        assert!(!non_terminal.is_transparent());
        let firsts_data = FirstsData {
            token_set: TokenSet::new(),
            transparent: true,
        };
        non_terminal.set_firsts_data(firsts_data);
        assert!(non_terminal.is_transparent());
        assert!(non_terminal.firsts_data().token_set.is_empty());
    }
}
