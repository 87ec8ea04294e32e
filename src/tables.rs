//! Compressed parse tables, in the layout the table-driven driver reads.
//!
//! Action values: `0 < v < num_non_leaf_states` shifts to state `v`,
//! `v >= num_non_leaf_states` shifts and reduces by rule
//! `v - num_non_leaf_states`, `v <= 0` reduces by rule `-v` (rule 0
//! accepts). A reduction by `unexpected_token_rule` is a syntax error.

/// Rule number standing for "no valid action".
pub const UNEXPECTED_TOKEN_RULE: i32 = 32767;

/// Action table entry meaning "use the state's default action".
pub const DEFAULT_ACTION: i32 = -32766;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
  /// internal symbol for raw tokens that are not terminals
  pub invalid_symbol: i32,
  /// code of the `error` token, 0 if the grammar has none
  pub error_symbol: i32,
  pub unexpected_token_rule: i32,
  pub default_action: i32,
  pub num_states: usize,
  /// `YYNLSTATES`
  pub num_non_leaf_states: usize,
  /// `YY2TBLSTATE`: states below this have a second action row at
  /// `action_base[state + num_non_leaf_states]`
  pub two_table_states: usize,

  pub action_table: Vec<i32>,
  pub action_check: Vec<i32>,
  pub action_base: Vec<i32>,
  pub action_default: Vec<i32>,

  pub goto_table: Vec<i32>,
  pub goto_check: Vec<i32>,
  pub goto_base: Vec<i32>,
  pub goto_default: Vec<i32>,

  /// rule -> nonterminal index of its left-hand side
  pub rule_to_non_terminal: Vec<i32>,
  pub rule_to_length: Vec<i32>,
  /// raw token code -> terminal code
  pub token_to_symbol: Vec<i32>,

  /// terminal names by code
  pub symbol_to_name: Vec<String>,
  /// `lhs : rhs...` by rule
  pub productions: Vec<String>,
  /// reduce snippets by rule
  pub reduce_actions: Vec<String>,
}

impl Tables {
  pub fn translate(&self, raw: u32) -> i32 {
    self.token_to_symbol.get(raw as usize)
      .copied()
      .unwrap_or(self.invalid_symbol)
  }

  /// The explicit entry for `symbol` in the action rows of `state`, if
  /// any.
  pub fn lookup_action(&self, state: usize, symbol: i32) -> Option<i32> {
    if state >= self.num_non_leaf_states {
      return None;
    }
    let secondary = (state < self.two_table_states)
      .then(|| state + self.num_non_leaf_states);
    std::iter::once(state)
      .chain(secondary)
      .find_map(|row| probe(
        &self.action_table,
        &self.action_check,
        self.action_base[row] + symbol,
        symbol,
      ))
      .filter(|&action| action != self.default_action)
  }

  /// The action of `state` on `symbol`, with the default folded in as a
  /// reduce value.
  pub fn action(&self, state: usize, symbol: i32) -> i32 {
    self.lookup_action(state, symbol)
      .unwrap_or(-self.action_default[state])
  }

  /// The state entered after reducing to `nonterm` on top of `state`.
  pub fn goto(&self, nonterm: usize, state: usize) -> i32 {
    probe(
      &self.goto_table,
      &self.goto_check,
      self.goto_base[nonterm] + state as i32,
      nonterm as i32,
    )
    .unwrap_or(self.goto_default[nonterm])
  }

  pub fn symbol_name(&self, symbol: i32) -> &str {
    usize::try_from(symbol).ok()
      .and_then(|s| self.symbol_to_name.get(s))
      .map_or("invalid token", |name| name.as_str())
  }
}

fn probe(
  table: &[i32],
  check: &[i32],
  index: i32,
  expected: i32,
) -> Option<i32> {
  let index = usize::try_from(index).ok()?;
  if check.get(index) == Some(&expected) {
    Some(table[index])
  } else {
    None
  }
}
