use log::{debug, trace};
use crate::bnf::Bnf;
use crate::config::Config;
use crate::error::Error;
use crate::grammar::Grammar;
use crate::tables::Tables;

mod action;
mod bitset;
mod compress;
mod sets;
mod state;

pub use action::{Action, Conflict, ConflictKind};

/// The generated tables of a grammar, along with the conflicts settled by
/// default while building them.
#[derive(Debug, Clone)]
pub struct Parser {
  tables: Tables,
  conflicts: Vec<Conflict>,
}

impl Parser {
  pub(crate) fn new(grammar: Grammar, config: &Config) -> Result<Self, Error> {
    let mut bnf = Bnf::try_from(grammar)?;
    if config.debug {
      debug!(
        "{} terminals, {} nonterminals, {} rules",
        bnf.ctx.n_terminals(),
        bnf.ctx.n_nonterminals(),
        bnf.prods.len(),
      );
    }

    sets::compute_empty(&mut bnf, config);
    let sets = sets::first_nullable_precomp(&bnf, config);
    let states = state::gen_states(&bnf, &sets, config);
    let decisions = action::resolve(&bnf, &states, config);
    let tables = compress::compress(&bnf, &decisions, config);

    Ok(Parser {
      tables,
      conflicts: decisions.conflicts,
    })
  }

  pub fn tables(&self) -> &Tables {
    &self.tables
  }

  pub fn into_tables(self) -> Tables {
    self.tables
  }

  pub fn conflicts(&self) -> &[Conflict] {
    &self.conflicts
  }

  /// Runs the tables over raw token codes and returns the rules reduced,
  /// in order. The input ends at the first 0 or when `tokens` runs out.
  pub fn parse<I>(&self, tokens: I) -> Result<Vec<usize>, Error>
    where I: IntoIterator<Item = u32>
  {
    let t = &self.tables;
    let nl = t.num_non_leaf_states as i32;
    let mut tokens = tokens.into_iter();
    let mut stack = vec![0usize];
    let mut symbol = None;
    let mut reduced = vec![];

    loop {
      let state = stack[stack.len() - 1];
      let sym = *symbol.get_or_insert_with(|| {
        t.translate(tokens.next().unwrap_or(0))
      });

      let mut rule = match t.lookup_action(state, sym) {
        Some(action) if action > 0 => {
          trace!("state {}: shift {}", state, t.symbol_name(sym));
          stack.push(action as usize);
          symbol = None;
          if action < nl {
            continue;
          }
          action - nl
        }
        Some(action) => -action,
        None => t.action_default[state],
      };

      loop {
        if rule == 0 {
          return Ok(reduced);
        }
        if rule == t.unexpected_token_rule {
          return Err(Error::UnexpectedToken {
            state,
            symbol: t.symbol_name(sym).to_owned(),
          });
        }

        trace!("reduce {}", t.productions[rule as usize]);
        reduced.push(rule as usize);
        let len = t.rule_to_length[rule as usize] as usize;
        stack.truncate(stack.len().saturating_sub(len));
        let nonterm = t.rule_to_non_terminal[rule as usize] as usize;
        let top = stack.last().copied().unwrap_or(0);
        let next = t.goto(nonterm, top);
        stack.push(next as usize);
        if next < nl {
          break;
        }
        rule = next - nl;
      }
    }
  }
}
