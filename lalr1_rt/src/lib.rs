// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

//! An LALR(1) parser generator whose tables are built in process: a
//! `Specification` collects terminals, precedence levels and productions
//! with reduction callbacks, and `build` turns it into a table driven
//! `Parser` (LR(0) canonical collection, DeRemer and Pennello lookahead
//! sets, precedence based conflict resolution, yacc style error
//! recovery). Tokens come from any iterator, typically a `lexor::Lexer`.
//!
//! ```
//! use lalr1_rt::{ActionError, Associativity, Specification};
//!
//! let mut spec = Specification::<i64>::new();
//! spec.token("NUMBER")
//!     .literals("+*")
//!     .precedence(Associativity::Left, &["+"])
//!     .precedence(Associativity::Left, &["*"]);
//! spec.production("expr", &["expr", "+", "expr"], |p| Ok(p.value(0) + p.value(2)));
//! spec.production("expr", &["expr", "*", "expr"], |p| Ok(p.value(0) * p.value(2)));
//! spec.production("expr", &["NUMBER"], |p| {
//!     p.text(0).parse().map_err(|e| ActionError::fatal(format!("{}", e)))
//! });
//! let parser = spec.build().unwrap();
//!
//! let mut lexer = lalr1_rt::lexor::LexerBuilder::new();
//! lexer.token("NUMBER", r"\d+").literals("+*").ignore(" ");
//! let lexer = lexer.build().unwrap();
//! let result = parser.parse(lexer.tokenize("2 + 3 * 4")).unwrap();
//! assert_eq!(result, Some(14));
//! ```

pub use lexor;

pub mod lalr;
pub mod parser;
pub mod production;
pub mod specification;
pub mod state;
pub mod symbol;
pub mod table;

pub use crate::parser::{
    ActionError, ErrorControl, ErrorHook, ParseError, Parser, ReduceAction, Span, Value,
    YaccProduction,
};
pub use crate::specification::{GrammarError, Problem, Specification};
pub use crate::symbol::Associativity;
pub use crate::table::Action;
