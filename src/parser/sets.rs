use std::fmt::Write;
use log::debug;
use crate::bnf::*;
use crate::config::Config;
use super::bitset::{self, BitSet};

/// Nullability and FIRST sets, indexed by symbol code.
pub(crate) struct Sets {
  pub(crate) nullable: Vec<bool>,
  pub(crate) first: Vec<BitSet>,
}

/// Marks with EMPTY every nonterminal having a rule whose right-hand side
/// is empty or starts with an EMPTY nonterminal.
///
/// Only the first right-hand symbol is looked at, so EMPTY means "an
/// empty rule is reachable through leading symbols" rather than true
/// nullability; `first_nullable_precomp` computes the latter.
pub(super) fn compute_empty(
  bnf: &mut Bnf,
  config: &Config,
) {
  let Bnf { ctx, prods, .. } = bnf;

  loop {
    let mut changed = false;
    for prod in prods.iter() {
      let empty = match prod.rhs.first() {
        None => true,
        Some(&sym) => ctx[sym].is_empty(),
      };
      if empty && !ctx[prod.lhs].is_empty() {
        ctx[prod.lhs].assoc |= SymbolFlags::EMPTY;
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }

  if config.debug {
    debug!("EMPTY nonterminals:");
    for sym in ctx.nonterminals().iter().filter(|s| s.is_empty()) {
      debug!("  {}", sym.name);
    }
  }
}

pub(super) fn first_nullable_precomp(
  bnf: &Bnf,
  config: &Config,
) -> Sets {
  let n = bnf.ctx.n_symbols();
  let mut sets = Sets {
    nullable: vec![false; n],
    first: vec![BitSet::new(n); n],
  };

  let mut passes = 0;
  while first_nullable_pass(bnf, &mut sets) {
    passes += 1;
    debug_assert!(passes <= n * n + n, "FIRST/nullable fixed point diverged");
  }

  if config.debug {
    for line in dump_sets(bnf, &sets).lines() {
      debug!("{}", line);
    }
  }

  sets
}

/// One pass over every rule. Returns whether any FIRST bit or nullable
/// flag changed.
pub(super) fn first_nullable_pass(
  bnf: &Bnf,
  sets: &mut Sets,
) -> bool {
  let mut changed = false;
  for prod in &bnf.prods {
    let h = prod.lhs.index();
    if !add_first_of_symbols(bnf, sets, h, &prod.rhs, &mut changed) {
      continue;
    }
    if !sets.nullable[h] {
      sets.nullable[h] = true;
      changed = true;
    }
  }
  changed
}

/// Unions FIRST(symbols) into `first[h]`. Returns whether all the
/// symbols are nullable.
fn add_first_of_symbols(
  bnf: &Bnf,
  sets: &mut Sets,
  h: usize,
  symbols: &[SymbolId],
  changed: &mut bool,
) -> bool {
  for &g in symbols {
    if bnf.ctx.is_terminal(g) {
      *changed |= sets.first[h].insert(g.index());
      return false;
    }
    *changed |= bitset::union_at(&mut sets.first, h, g.index());
    if !sets.nullable[g.index()] {
      return false;
    }
  }
  true
}

/// Unions FIRST(symbols) into `result`. Returns whether all the symbols
/// are nullable.
pub(crate) fn compute_first_for_symbols(
  result: &mut BitSet,
  bnf: &Bnf,
  sets: &Sets,
  symbols: &[SymbolId],
) -> bool {
  for &sym in symbols {
    if bnf.ctx.is_terminal(sym) {
      result.insert(sym.index());
      return false;
    }
    result.union_with(&sets.first[sym.index()]);
    if !sets.nullable[sym.index()] {
      return false;
    }
  }
  true
}

pub(crate) fn dump_sets(
  bnf: &Bnf,
  sets: &Sets,
) -> String {
  let mut s = String::from("First:\n");
  for sym in bnf.ctx.nonterminals() {
    let _ = write!(s, "  {}\t[ ", sym.name);
    for t in sets.first[sym.code.index()].iter() {
      let _ = write!(s, "{} ", bnf.ctx.name(SymbolId(t as u32)));
    }
    if sets.nullable[sym.code.index()] {
      s.push_str("@ ");
    }
    s.push_str("]\n");
  }
  s
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bnf::tests::{bnf, expr};
  use crate::grammar::Grammar;
  use insta::assert_snapshot;
  use pretty_assertions::assert_eq;

  fn simple() -> Grammar {
    let mut g = Grammar::new();
    g.token("a");
    g.token("c");
    g.token("d");
    g.rule("Z", &["d"]);
    g.rule("Z", &["X", "Y", "Z"]);
    g.rule("Y", &[]);
    g.rule("Y", &["c"]);
    g.rule("X", &["Y"]);
    g.rule("X", &["a"]);
    g
  }

  fn analyze(bnf: &mut Bnf) -> Sets {
    let config = Config::default();
    compute_empty(bnf, &config);
    first_nullable_precomp(bnf, &config)
  }

  fn first_names(bnf: &Bnf, sets: &Sets, name: &str) -> Vec<String> {
    let id = bnf.ctx.get(name).unwrap();
    sets.first[id.index()].iter()
      .map(|t| bnf.ctx.name(SymbolId(t as u32)).to_owned())
      .collect()
  }

  fn nullable(bnf: &Bnf, sets: &Sets) -> Vec<(String, bool)> {
    bnf.ctx.nonterminals().iter()
      .map(|s| (s.name.clone(), sets.nullable[s.code.index()]))
      .collect()
  }

  #[test]
  fn simple_nullable() {
    let mut bnf = bnf(simple());
    let sets = analyze(&mut bnf);

    assert_eq!(nullable(&bnf, &sets), vec![
      ("$start".to_owned(), false),
      ("Z".to_owned(), false),
      ("Y".to_owned(), true),
      ("X".to_owned(), true),
    ]);
  }

  #[test]
  fn simple_first() {
    let mut bnf = bnf(simple());
    let sets = analyze(&mut bnf);

    assert_eq!(first_names(&bnf, &sets, "Z"), vec!["a", "c", "d"]);
    assert_eq!(first_names(&bnf, &sets, "Y"), vec!["c"]);
    assert_eq!(first_names(&bnf, &sets, "X"), vec!["a", "c"]);
    assert_eq!(first_names(&bnf, &sets, "$start"), vec!["a", "c", "d"]);
  }

  #[test]
  fn expr_sets() {
    let mut bnf = bnf(expr());
    let sets = analyze(&mut bnf);

    assert_eq!(first_names(&bnf, &sets, "E"), vec!["id"]);
    assert_eq!(first_names(&bnf, &sets, "T"), vec!["id"]);
    assert!(bnf.ctx.nonterminals().iter().all(|s| !s.is_empty()));
    assert_snapshot!(dump_sets(&bnf, &sets), @r###"
    First:
      $start	[ id ]
      E	[ id ]
      T	[ id ]
    "###);
  }

  #[test]
  fn empty_flag() {
    let mut g = Grammar::new();
    g.rule("S", &["A"]);
    g.rule("A", &[]);
    g.rule("A", &["'x'", "A"]);
    let mut bnf = bnf(g);
    let sets = analyze(&mut bnf);

    let s = bnf.ctx.get("S").unwrap();
    let a = bnf.ctx.get("A").unwrap();
    assert!(bnf.ctx[s].is_empty());
    assert!(bnf.ctx[a].is_empty());
    assert!(sets.nullable[s.index()]);
    assert!(sets.nullable[a.index()]);
    assert_eq!(first_names(&bnf, &sets, "S"), vec!["'x'"]);
  }

  #[test]
  fn empty_flag_only_follows_the_leading_symbol() {
    let mut g = Grammar::new();
    g.rule("S", &["B", "'x'"]);
    g.rule("B", &[]);
    let mut bnf = bnf(g);
    let sets = analyze(&mut bnf);

    let s = bnf.ctx.get("S").unwrap();
    assert!(bnf.ctx[s].is_empty());
    assert!(!sets.nullable[s.index()]);
    assert_eq!(first_names(&bnf, &sets, "S"), vec!["'x'"]);
  }

  #[test]
  fn converged_pass_is_idempotent() {
    let mut bnf = bnf(simple());
    let mut sets = analyze(&mut bnf);
    let nullable = sets.nullable.clone();
    let first = sets.first.clone();

    assert!(!first_nullable_pass(&bnf, &mut sets));
    assert_eq!(sets.nullable, nullable);
    assert_eq!(sets.first, first);
  }

  #[test]
  fn passes_are_monotonic() {
    let bnf = bnf(simple());
    let n = bnf.ctx.n_symbols();
    let mut sets = Sets {
      nullable: vec![false; n],
      first: vec![BitSet::new(n); n],
    };

    loop {
      let nullable = sets.nullable.clone();
      let first = sets.first.clone();
      let changed = first_nullable_pass(&bnf, &mut sets);
      for i in 0..n {
        assert!(!nullable[i] || sets.nullable[i]);
        assert!(first[i].iter().all(|t| sets.first[i].contains(t)));
      }
      if !changed {
        break;
      }
    }
  }

  #[test]
  fn first_of_sequence() {
    let mut bnf = bnf(simple());
    let sets = analyze(&mut bnf);
    let x = bnf.ctx.get("X").unwrap();
    let y = bnf.ctx.get("Y").unwrap();
    let d = bnf.ctx.get("d").unwrap();

    let mut result = BitSet::new(bnf.ctx.n_symbols());
    assert!(compute_first_for_symbols(&mut result, &bnf, &sets, &[x, y]));
    assert!(!compute_first_for_symbols(&mut result, &bnf, &sets, &[y, d]));
    let names = result.iter()
      .map(|t| bnf.ctx.name(SymbolId(t as u32)))
      .collect::<Vec<_>>();
    assert_eq!(names, vec!["a", "c", "d"]);
  }
}
