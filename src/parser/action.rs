use std::cmp::{Ordering, Reverse};
use indexmap::IndexMap;
use log::{debug, warn};
use crate::bnf::*;
use crate::config::Config;
use super::state::States;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
  Shift(u32),
  Reduce(usize),
  Accept,
  Error,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConflictKind {
  ShiftReduce,
  ReduceReduce,
}

/// A conflict the precedence declarations did not settle. Shift won a
/// shift/reduce conflict, the lower-numbered rule a reduce/reduce one.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Conflict {
  /// automaton state, before table renumbering
  pub state: usize,
  pub symbol: String,
  pub kind: ConflictKind,
  /// the rule whose reduction was dropped
  pub rule: usize,
}

pub(crate) struct Row {
  /// terminal -> action, without the entries equal to `default`
  pub(crate) actions: IndexMap<SymbolId, Action>,
  /// nonterminal -> target state
  pub(crate) gotos: IndexMap<SymbolId, u32>,
  pub(crate) default: Action,
}

impl Row {
  #[cfg(test)]
  pub(crate) fn action(&self, terminal: SymbolId) -> Action {
    self.actions.get(&terminal).copied().unwrap_or(self.default)
  }

  /// Entering a leaf state always reduces, so it never needs a table row.
  pub(crate) fn is_leaf(&self) -> bool {
    self.actions.is_empty()
      && self.gotos.is_empty()
      && matches!(self.default, Action::Reduce(_) | Action::Accept)
  }
}

pub(crate) struct Decisions {
  pub(crate) rows: Vec<Row>,
  pub(crate) conflicts: Vec<Conflict>,
}

pub(super) fn resolve(
  bnf: &Bnf,
  states: &States,
  config: &Config,
) -> Decisions {
  let mut rows = Vec::with_capacity(states.states.len());
  let mut conflicts = vec![];

  for (s, state) in states.states.iter().enumerate() {
    let mut actions = IndexMap::new();
    let mut gotos = IndexMap::new();
    for (&g, &t) in &state.transitions {
      if bnf.ctx.is_terminal(g) {
        actions.insert(g, Action::Shift(t));
      } else {
        gotos.insert(g, t);
      }
    }

    let mut accept = false;
    let mut reduces = vec![];
    for item in state.items.iter().filter(|item| item.is_tail_item(bnf)) {
      let prod = item.core.prod as usize;
      if bnf.prods[prod].lhs == bnf.start_prime {
        accept = true;
      } else {
        reduces.push((prod, state.lookahead(item)));
      }
    }
    reduces.sort_by_key(|&(prod, _)| prod);

    for (prod, look) in reduces {
      for t in look.iter().map(|t| SymbolId(t as u32)) {
        let action = match actions.get(&t) {
          None => Action::Reduce(prod),
          Some(&existing) => {
            let (action, kind) = resolve_conflict(bnf, existing, prod, t);
            if let Some(kind) = kind {
              conflicts.push(Conflict {
                state: s,
                symbol: bnf.ctx.name(t).to_owned(),
                kind,
                rule: match existing {
                  Action::Reduce(kept) if kept > prod => kept,
                  _ => prod,
                },
              });
            }
            action
          }
        };
        actions.insert(t, action);
      }
    }

    let default = if accept {
      Action::Accept
    } else {
      default_reduction(&actions)
    };
    actions.retain(|_, action| *action != default);

    rows.push(Row {
      actions,
      gotos,
      default,
    });
  }

  if !conflicts.is_empty() {
    let sr = conflicts.iter().filter(|c| c.kind == ConflictKind::ShiftReduce).count();
    warn!(
      "{} shift/reduce, {} reduce/reduce conflicts",
      sr,
      conflicts.len() - sr,
    );
    if config.debug {
      for c in &conflicts {
        debug!("  state {} on {}: {:?}, rule {} dropped", c.state, c.symbol, c.kind, c.rule);
      }
    }
  }

  Decisions {
    rows,
    conflicts,
  }
}

/// Settles `existing` against a reduction by `prod` on `t`. The kind is
/// set when precedence could not decide.
fn resolve_conflict(
  bnf: &Bnf,
  existing: Action,
  prod: usize,
  t: SymbolId,
) -> (Action, Option<ConflictKind>) {
  match existing {
    Action::Shift(_) => {
      let rule_prec = bnf.prods[prod].prec;
      let token = &bnf.ctx[t];
      if rule_prec == 0 || token.prec == 0 {
        return (existing, Some(ConflictKind::ShiftReduce));
      }
      let action = match rule_prec.cmp(&token.prec) {
        Ordering::Greater => Action::Reduce(prod),
        Ordering::Less => existing,
        Ordering::Equal => {
          if token.assoc.contains(SymbolFlags::LEFT) {
            Action::Reduce(prod)
          } else if token.assoc.contains(SymbolFlags::RIGHT) {
            existing
          } else {
            Action::Error
          }
        }
      };
      (action, None)
    }
    Action::Reduce(kept) => {
      (Action::Reduce(kept.min(prod)), Some(ConflictKind::ReduceReduce))
    }
    Action::Accept | Action::Error => (existing, None),
  }
}

/// The most frequent reduction, the lowest rule on ties.
fn default_reduction(actions: &IndexMap<SymbolId, Action>) -> Action {
  let mut counts: IndexMap<usize, usize> = IndexMap::new();
  for action in actions.values() {
    if let Action::Reduce(prod) = *action {
      *counts.entry(prod).or_insert(0) += 1;
    }
  }
  counts.into_iter()
    .max_by_key(|&(prod, count)| (count, Reverse(prod)))
    .map_or(Action::Error, |(prod, _)| Action::Reduce(prod))
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::bnf::tests::expr;
  use crate::grammar::{Assoc, Grammar};
  use crate::parser::state::item_string;
  use crate::parser::state::tests::build;
  use pretty_assertions::assert_eq;

  pub(crate) fn decide(grammar: Grammar) -> (Bnf, States, Decisions) {
    let (bnf, states) = build(grammar);
    let decisions = resolve(&bnf, &states, &Config::default());
    (bnf, states, decisions)
  }

  pub(crate) fn arith(precedence: bool) -> Grammar {
    let mut g = Grammar::new();
    g.token("NUM");
    if precedence {
      g.precedence(Assoc::Left, &["'+'"]);
      g.precedence(Assoc::Left, &["'*'"]);
    }
    g.rule("E", &["E", "'+'", "E"]);
    g.rule("E", &["E", "'*'", "E"]);
    g.rule("E", &["NUM"]);
    g
  }

  fn sym(bnf: &Bnf, name: &str) -> SymbolId {
    bnf.ctx.get(name).unwrap()
  }

  #[test]
  fn expr_rows() {
    let (bnf, states, decisions) = decide(expr());
    let rows = &decisions.rows;

    assert!(decisions.conflicts.is_empty());
    assert_eq!(rows[0].action(sym(&bnf, "id")), Action::Shift(3));
    assert_eq!(rows[0].default, Action::Error);
    assert_eq!(rows[0].gotos.get(&sym(&bnf, "E")), Some(&1));
    assert_eq!(rows[1].action(sym(&bnf, "'+'")), Action::Shift(5));
    assert_eq!(rows[1].action(sym(&bnf, "$end")), Action::Shift(4));
    assert_eq!(rows[2].default, Action::Reduce(2));
    assert_eq!(rows[4].default, Action::Accept);

    let leaves = rows.iter().enumerate()
      .filter(|(_, row)| row.is_leaf())
      .map(|(s, _)| s)
      .collect::<Vec<_>>();
    assert_eq!(leaves, vec![2, 3, 4, 6]);
    assert_eq!(rows.len(), states.states.len());
  }

  #[test]
  fn unresolved_conflicts() {
    let (_, _, decisions) = decide(arith(false));

    assert_eq!(decisions.conflicts.len(), 4);
    assert!(decisions.conflicts.iter().all(|c| c.kind == ConflictKind::ShiftReduce));
    let mut symbols = decisions.conflicts.iter()
      .map(|c| c.symbol.as_str())
      .collect::<Vec<_>>();
    symbols.sort();
    assert_eq!(symbols, vec!["'*'", "'*'", "'+'", "'+'"]);
  }

  #[test]
  fn precedence_settles_conflicts() {
    let (bnf, states, decisions) = decide(arith(true));
    assert!(decisions.conflicts.is_empty());

    let plus = sym(&bnf, "'+'");
    let times = sym(&bnf, "'*'");
    let end = sym(&bnf, "$end");
    let state_with = |text: &str| {
      states.states.iter()
        .position(|s| s.kernel().iter().any(|item| {
          item_string(&bnf, item) == text
        }))
        .unwrap()
    };

    let sum = &decisions.rows[state_with("E : E '+' E .")];
    assert_eq!(sum.action(plus), Action::Reduce(1));
    assert_eq!(sum.action(end), Action::Reduce(1));
    assert!(matches!(sum.action(times), Action::Shift(_)));
    assert_eq!(sum.default, Action::Reduce(1));

    let product = &decisions.rows[state_with("E : E '*' E .")];
    assert_eq!(product.action(plus), Action::Reduce(2));
    assert_eq!(product.action(times), Action::Reduce(2));
    assert!(product.actions.is_empty());
  }

  #[test]
  fn nonassoc_makes_errors() {
    let mut g = Grammar::new();
    g.token("NUM");
    g.precedence(Assoc::NonAssoc, &["'<'"]);
    g.rule("E", &["E", "'<'", "E"]);
    g.rule("E", &["NUM"]);
    let (bnf, states, decisions) = decide(g);

    let s = states.states.iter()
      .position(|s| s.items.iter().any(|item| {
        item_string(&bnf, item) == "E : E '<' E ."
      }))
      .unwrap();
    let row = &decisions.rows[s];
    assert_eq!(row.action(sym(&bnf, "'<'")), Action::Error);
    assert_eq!(row.default, Action::Reduce(1));
    assert!(decisions.conflicts.is_empty());
  }

  #[test]
  fn reduce_reduce_keeps_lower_rule() {
    let mut g = Grammar::new();
    g.rule("S", &["A"]);
    g.rule("S", &["B"]);
    g.rule("A", &["'a'"]);
    g.rule("B", &["'a'"]);
    let (bnf, states, decisions) = decide(g);

    assert_eq!(decisions.conflicts, vec![Conflict {
      state: states.states.iter().position(|s| s.through == bnf.ctx.get("'a'")).unwrap(),
      symbol: "$end".to_owned(),
      kind: ConflictKind::ReduceReduce,
      rule: 4,
    }]);
    let after_a = decisions.conflicts[0].state;
    assert_eq!(decisions.rows[after_a].default, Action::Reduce(3));
  }

  #[test]
  fn default_is_most_frequent_reduction() {
    let mut actions = IndexMap::new();
    actions.insert(SymbolId(0), Action::Reduce(4));
    actions.insert(SymbolId(1), Action::Reduce(2));
    actions.insert(SymbolId(2), Action::Shift(7));
    actions.insert(SymbolId(3), Action::Reduce(4));
    assert_eq!(default_reduction(&actions), Action::Reduce(4));

    actions.insert(SymbolId(4), Action::Reduce(2));
    assert_eq!(default_reduction(&actions), Action::Reduce(2));

    let mut shifts = IndexMap::new();
    shifts.insert(SymbolId(1), Action::Shift(1));
    assert_eq!(default_reduction(&shifts), Action::Error);
  }
}
