use std::cmp::Reverse;
use indexmap::IndexMap;
use log::{debug, trace};
use crate::bnf::*;
use crate::config::Config;
use crate::tables::{Tables, DEFAULT_ACTION, UNEXPECTED_TOKEN_RULE};
use super::action::{Action, Decisions, Row};

/// Sparse row: `(column, value)` pairs sorted by column.
type Entries = Vec<(i32, i32)>;

/// Order of the states in the tables: state 0, the two-table states, the
/// other non-leaf states, then the leaves.
pub(crate) struct Layout {
  /// table state -> automaton state
  pub(crate) order: Vec<usize>,
  /// automaton state -> table state
  pub(crate) number: Vec<usize>,
  pub(crate) n_non_leaf: usize,
  pub(crate) n_two_table: usize,
}

impl Layout {
  pub(crate) fn new(rows: &[Row]) -> Self {
    let leaf = |s: usize| s != 0 && rows[s].is_leaf();
    let split = |s: usize| !leaf(s) && is_two_table(&rows[s]);

    let mut order = vec![0];
    order.extend((1..rows.len()).filter(|&s| split(s)));
    let n_two_table = if split(0) || order.len() > 1 {
      order.len()
    } else {
      0
    };
    order.extend((1..rows.len()).filter(|&s| !leaf(s) && !split(s)));
    let n_non_leaf = order.len();
    order.extend((1..rows.len()).filter(|&s| leaf(s)));

    let mut number = vec![0; rows.len()];
    for (new, &old) in order.iter().enumerate() {
      number[old] = new;
    }

    Self {
      order,
      number,
      n_non_leaf,
      n_two_table,
    }
  }

  pub(crate) fn encode(&self, rows: &[Row], action: Action) -> i32 {
    match action {
      Action::Shift(t) => self.target(rows, t as usize),
      Action::Reduce(rule) => -(rule as i32),
      Action::Accept => 0,
      Action::Error => -UNEXPECTED_TOKEN_RULE,
    }
  }

  /// Entering a leaf state is folded into its reduction.
  pub(crate) fn target(&self, rows: &[Row], state: usize) -> i32 {
    let new = self.number[state];
    if new < self.n_non_leaf {
      new as i32
    } else {
      (self.n_non_leaf as i32) + default_rule(rows[state].default)
    }
  }
}

/// Both shifts and other explicit entries: the shifts get the primary row,
/// the rest a secondary one.
fn is_two_table(row: &Row) -> bool {
  let shifts = row.actions.values()
    .filter(|action| matches!(action, Action::Shift(_)))
    .count();
  shifts > 0 && shifts < row.actions.len()
}

fn default_rule(default: Action) -> i32 {
  match default {
    Action::Reduce(rule) => rule as i32,
    Action::Accept => 0,
    Action::Shift(_) | Action::Error => UNEXPECTED_TOKEN_RULE,
  }
}

#[derive(Clone, Copy)]
enum Check {
  /// check holds the column; rows need distinct bases
  Column,
  /// check holds the row id
  Row(i32),
}

/// First-fit packing of sparse rows into one table.
#[derive(Default)]
struct Packer {
  table: Vec<i32>,
  check: Vec<i32>,
  placed: IndexMap<Entries, i32>,
}

impl Packer {
  /// Returns the base of the row. Empty rows get base 0, which no
  /// non-empty row ever gets.
  fn place(&mut self, entries: &Entries, check: Check) -> i32 {
    if entries.is_empty() {
      return 0;
    }
    if let Check::Column = check {
      if let Some(&base) = self.placed.get(entries) {
        return base;
      }
    }

    let mut base = -entries[0].0;
    while !self.fits(base, entries, check) {
      base += 1;
    }

    for &(col, value) in entries {
      let i = (base + col) as usize;
      if i >= self.table.len() {
        self.table.resize(i + 1, 0);
        self.check.resize(i + 1, -1);
      }
      self.table[i] = value;
      self.check[i] = match check {
        Check::Column => col,
        Check::Row(row) => row,
      };
    }
    self.placed.insert(entries.clone(), base);
    base
  }

  fn fits(&self, base: i32, entries: &Entries, check: Check) -> bool {
    if base == 0 {
      return false;
    }
    if let Check::Column = check {
      if self.placed.values().any(|&b| b == base) {
        return false;
      }
    }
    entries.iter().all(|&(col, _)| {
      self.check.get((base + col) as usize).map_or(true, |&c| c == -1)
    })
  }
}

/// Places `rows` largest first. Returns the base of each row.
fn pack(
  packer: &mut Packer,
  rows: &[Entries],
  check: impl Fn(usize) -> Check,
  what: &str,
) -> Vec<i32> {
  let mut order = (0..rows.len()).collect::<Vec<_>>();
  order.sort_by_key(|&r| Reverse(rows[r].len()));

  let mut bases = vec![0; rows.len()];
  for r in order {
    bases[r] = packer.place(&rows[r], check(r));
    trace!("{} row {}: {} entries at base {}", what, r, rows[r].len(), bases[r]);
  }
  bases
}

pub(super) fn compress(
  bnf: &Bnf,
  decisions: &Decisions,
  config: &Config,
) -> Tables {
  let rows = &decisions.rows;
  let layout = Layout::new(rows);
  let nl = layout.n_non_leaf;

  let mut action_rows = vec![Entries::new(); nl + layout.n_two_table];
  for (new, &old) in layout.order[..nl].iter().enumerate() {
    let row = &rows[old];
    let split = is_two_table(row);
    for (&t, &action) in &row.actions {
      let r = if split && !matches!(action, Action::Shift(_)) {
        new + nl
      } else {
        new
      };
      action_rows[r].push((t.index() as i32, layout.encode(rows, action)));
    }
  }
  for entries in &mut action_rows {
    entries.sort_unstable();
  }
  let action_default = layout.order.iter()
    .map(|&old| default_rule(rows[old].default))
    .collect::<Vec<_>>();

  let mut action_packer = Packer::default();
  let action_base = pack(&mut action_packer, &action_rows, |_| Check::Column, "action");

  let mut goto_rows = vec![Entries::new(); bnf.ctx.n_nonterminals()];
  for (new, &old) in layout.order[..nl].iter().enumerate() {
    for (&nt, &t) in &rows[old].gotos {
      goto_rows[bnf.ctx.nonterm_index(nt)]
        .push((new as i32, layout.target(rows, t as usize)));
    }
  }
  let goto_default = goto_rows.iter_mut()
    .map(|entries| {
      let default = most_frequent(entries);
      entries.retain(|&(_, target)| target != default);
      default
    })
    .collect::<Vec<_>>();

  let mut goto_packer = Packer::default();
  let goto_base = pack(&mut goto_packer, &goto_rows, |r| Check::Row(r as i32), "goto");

  let invalid_symbol = bnf.ctx.n_terminals() as i32;
  let max_raw = bnf.ctx.terminals().iter()
    .filter_map(|t| t.raw)
    .max()
    .unwrap_or(0)
    .max(255);
  let mut token_to_symbol = vec![invalid_symbol; max_raw as usize + 1];
  for t in bnf.ctx.terminals() {
    if let Some(raw) = t.raw {
      token_to_symbol[raw as usize] = t.code.index() as i32;
    }
  }

  let tables = Tables {
    invalid_symbol,
    error_symbol: bnf.error.map_or(0, |e| e.index() as i32),
    unexpected_token_rule: UNEXPECTED_TOKEN_RULE,
    default_action: DEFAULT_ACTION,
    num_states: rows.len(),
    num_non_leaf_states: nl,
    two_table_states: layout.n_two_table,
    action_table: action_packer.table,
    action_check: action_packer.check,
    action_base,
    action_default,
    goto_table: goto_packer.table,
    goto_check: goto_packer.check,
    goto_base,
    goto_default,
    rule_to_non_terminal: bnf.prods.iter()
      .map(|p| bnf.ctx.nonterm_index(p.lhs) as i32)
      .collect(),
    rule_to_length: bnf.prods.iter()
      .map(|p| p.rhs.len() as i32)
      .collect(),
    token_to_symbol,
    symbol_to_name: bnf.ctx.terminals().iter()
      .map(|t| t.name.clone())
      .collect(),
    productions: (0..bnf.prods.len())
      .map(|r| bnf.production_string(r))
      .collect(),
    reduce_actions: bnf.prods.iter()
      .map(|p| match p.action.as_deref().map(str::trim) {
        Some(action) if !action.is_empty() => action.to_owned(),
        _ => config.default_action.clone(),
      })
      .collect(),
  };

  if config.debug {
    debug!(
      "{} states, {} non-leaf, {} with two action rows",
      tables.num_states,
      tables.num_non_leaf_states,
      tables.two_table_states,
    );
    debug!(
      "action table: {} entries in {} slots",
      action_rows.iter().map(Vec::len).sum::<usize>(),
      tables.action_table.len(),
    );
    debug!(
      "goto table: {} entries in {} slots",
      goto_rows.iter().map(Vec::len).sum::<usize>(),
      tables.goto_table.len(),
    );
  }

  tables
}

/// The most frequent value, the smallest on ties; 0 for an empty row.
fn most_frequent(entries: &Entries) -> i32 {
  let mut counts: IndexMap<i32, usize> = IndexMap::new();
  for &(_, value) in entries {
    *counts.entry(value).or_insert(0) += 1;
  }
  counts.into_iter()
    .max_by_key(|&(value, count)| (count, Reverse(value)))
    .map_or(0, |(value, _)| value)
}
