// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

//! LALR(1) lookahead computation over the LR(0) automaton using the
//! DeRemer and Pennello relations: direct reads are extended along the
//! READS relation, then along INCLUDES, and the results are attached to
//! reduce items through LOOKBACK. Both closures are solved with the same
//! digraph traversal.

use std::collections::BTreeMap;

use crate::production::{GrammarItemKey, Production};
use crate::state::{Automaton, ParserState};
use crate::symbol::non_terminal::NonTerminal;
use crate::symbol::terminal::{Token, TokenSet};
use crate::symbol::Symbol;

/// Lookahead sets keyed by (state ident, production ident) for every
/// reduce item in the automaton.
#[derive(Debug)]
pub struct LalrData {
    lookaheads: BTreeMap<(u32, u32), TokenSet>,
}

impl LalrData {
    pub fn build(automaton: &Automaton, productions: &[Production]) -> Self {
        // Every goto edge (p, A) becomes a node of the two digraphs;
        // nodes are plain indexes into `transitions`.
        let mut transitions: Vec<(ParserState, NonTerminal, ParserState)> = vec![];
        let mut transition_idents: BTreeMap<(u32, NonTerminal), usize> = BTreeMap::new();
        for state in automaton.states() {
            for (non_terminal, target) in state.gotos() {
                transition_idents.insert(
                    (state.ident(), non_terminal.clone()),
                    transitions.len(),
                );
                transitions.push((state.clone(), non_terminal, target));
            }
        }

        // DR(p, A): terminals readable straight after traversing the edge.
        // The end marker is readable after the edge into the accept state.
        let mut direct_reads: Vec<TokenSet> = vec![];
        for (_, _, target) in transitions.iter() {
            let mut token_set = TokenSet::new();
            for (token, _) in target.shifts() {
                token_set.insert(&token);
            }
            if target.has_accept_item() {
                token_set.insert(&Token::End);
            };
            direct_reads.push(token_set);
        }

        // READS: (p, A) reads (q, C) when q = GOTO(p, A) and C is a
        // nullable non terminal leaving q.
        let mut reads: Vec<Vec<usize>> = vec![vec![]; transitions.len()];
        for (index, (_, _, target)) in transitions.iter().enumerate() {
            for (non_terminal, _) in target.gotos() {
                if non_terminal.is_transparent() {
                    if let Some(&successor) =
                        transition_idents.get(&(target.ident(), non_terminal.clone()))
                    {
                        reads[index].push(successor);
                    }
                }
            }
        }
        let read_sets = digraph(&reads, &direct_reads);

        // INCLUDES: (p', A) includes (q, B) when B : β A γ with γ
        // nullable and β traverses q to p'.
        let mut includes: Vec<Vec<usize>> = vec![vec![]; transitions.len()];
        for (index, (state, non_terminal, _)) in transitions.iter().enumerate() {
            for production in productions
                .iter()
                .filter(|p| p.left_hand_side() == non_terminal)
            {
                let mut item = GrammarItemKey::from(production);
                let mut current = Some(state.clone());
                while let Some(symbol) = item.next_symbol().cloned() {
                    let cursor = match &current {
                        Some(cursor) => cursor.clone(),
                        None => break,
                    };
                    if let Symbol::NonTerminal(inner) = &symbol {
                        let tail_nullable = item.rhs_tail().iter().all(|s| match s {
                            Symbol::NonTerminal(n) => n.is_transparent(),
                            Symbol::Terminal(_) => false,
                        });
                        if tail_nullable {
                            if let Some(&from) =
                                transition_idents.get(&(cursor.ident(), inner.clone()))
                            {
                                includes[from].push(index);
                            }
                        }
                    };
                    current = cursor.edge(&symbol);
                    item = item.shifted();
                }
            }
        }
        let follow_sets = digraph(&includes, &read_sets);

        // LOOKBACK: the reduce item for A : ω in the state reached by
        // spelling ω from p collects FOLLOW(p, A).
        let mut lookaheads: BTreeMap<(u32, u32), TokenSet> = BTreeMap::new();
        for (index, (state, non_terminal, _)) in transitions.iter().enumerate() {
            for production in productions
                .iter()
                .filter(|p| p.left_hand_side() == non_terminal)
            {
                let mut current = Some(state.clone());
                for symbol in production.right_hand_side() {
                    current = current.and_then(|s| s.edge(symbol));
                }
                if let Some(end_state) = current {
                    let entry = lookaheads
                        .entry((end_state.ident(), production.ident()))
                        .or_default();
                    *entry |= &follow_sets[index];
                }
            }
        }
        // No LOOKBACK reaches the augmentation's reduce item (nothing has
        // a dot before the start symbol); its lookahead is the end marker
        // alone.
        for state in automaton.states() {
            if state.has_accept_item() {
                let mut token_set = TokenSet::new();
                token_set.insert(&Token::End);
                lookaheads.insert((state.ident(), 0), token_set);
            }
        }
        Self { lookaheads }
    }

    pub fn lookahead_set(&self, state: u32, production: u32) -> Option<&TokenSet> {
        self.lookaheads.get(&(state, production))
    }
}

/// The DeRemer and Pennello digraph routine: each node's set becomes the
/// union of its base set and the sets of everything reachable from it,
/// with strongly connected components collapsed to a single value. The
/// traversal keeps an explicit frame stack.
fn digraph(edges: &[Vec<usize>], base: &[TokenSet]) -> Vec<TokenSet> {
    let node_count = edges.len();
    let mut marks = vec![0usize; node_count];
    let mut sets: Vec<TokenSet> = base.to_vec();
    let mut scc_stack: Vec<usize> = Vec::new();
    for root in 0..node_count {
        if marks[root] != 0 {
            continue;
        };
        scc_stack.push(root);
        marks[root] = scc_stack.len();
        // frame: (node, next edge offset, depth at entry)
        let mut frames: Vec<(usize, usize, usize)> = vec![(root, 0, scc_stack.len())];
        while let Some(&(node, edge_offset, depth)) = frames.last() {
            if edge_offset < edges[node].len() {
                frames.last_mut().expect("frames is not empty").1 += 1;
                let successor = edges[node][edge_offset];
                if marks[successor] == 0 {
                    scc_stack.push(successor);
                    marks[successor] = scc_stack.len();
                    frames.push((successor, 0, scc_stack.len()));
                } else {
                    if marks[successor] < marks[node] {
                        marks[node] = marks[successor];
                    };
                    let from_successor = sets[successor].clone();
                    sets[node] |= &from_successor;
                }
            } else {
                frames.pop();
                if marks[node] == depth {
                    // node is the root of its component: every member
                    // receives the component's final set
                    loop {
                        let member = scc_stack.pop().expect("component members are stacked");
                        marks[member] = usize::MAX;
                        if member == node {
                            break;
                        };
                        sets[member] = sets[node].clone();
                    }
                };
                if let Some(&(parent, _, _)) = frames.last() {
                    if marks[node] < marks[parent] {
                        marks[parent] = marks[node];
                    };
                    let from_child = sets[node].clone();
                    sets[parent] |= &from_child;
                }
            }
        }
    }
    sets
}
