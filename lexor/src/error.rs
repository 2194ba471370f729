// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::convert::From;
use std::fmt;

#[derive(Debug)]
pub enum LexerBuildError {
    EmptyPattern(String),
    DuplicateRule(String, String),
    InvalidRuleName(String),
    InvalidModeName(String),
    RegexError(regex::Error),
}

impl From<regex::Error> for LexerBuildError {
    fn from(error: regex::Error) -> Self {
        LexerBuildError::RegexError(error)
    }
}

impl fmt::Display for LexerBuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexerBuildError::EmptyPattern(name) => {
                write!(f, "Rule \"{}\" has an empty pattern.", name)
            }
            LexerBuildError::DuplicateRule(mode, name) => {
                write!(f, "Rule \"{}\" already defined in mode \"{}\".", name, mode)
            }
            LexerBuildError::InvalidRuleName(name) => {
                write!(f, "\"{}\" is not a valid rule name.", name)
            }
            LexerBuildError::InvalidModeName(name) => {
                write!(f, "\"{}\" is not a valid mode name.", name)
            }
            LexerBuildError::RegexError(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for LexerBuildError {}
