use std::collections::{HashMap, HashSet};
use std::ops::{Index, IndexMut};
use bitflags::bitflags;
use indexmap::IndexMap;
use crate::error::Error;
use crate::grammar::*;

pub(crate) const END: &str = "$end";
pub(crate) const START: &str = "$start";
pub(crate) const ERROR: &str = "error";

const ERROR_CODE: u32 = 256;
const FIRST_NAMED_CODE: u32 = 257;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct SymbolId(pub(crate) u32);

impl SymbolId {
  pub(crate) fn index(self) -> usize {
    self.0 as usize
  }
}

bitflags! {
  /// Associativity of a token, plus the EMPTY mark set on nonterminals
  /// during nullable analysis.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub(crate) struct SymbolFlags: u8 {
    const LEFT = 0b0001;
    const RIGHT = 0b0010;
    const NONASSOC = 0b0100;
    const EMPTY = 0b1000_0000;
  }
}

#[derive(Clone, Debug)]
pub(crate) struct Symbol {
  pub(crate) code: SymbolId,
  pub(crate) name: String,
  pub(crate) assoc: SymbolFlags,
  /// 0 = no precedence
  pub(crate) prec: u16,
  /// raw token code reported by the lexer
  pub(crate) raw: Option<u32>,
  /// first production of a nonterminal, the rest hang off
  /// `Production::link`
  pub(crate) value: Option<usize>,
}

impl Symbol {
  pub(crate) fn is_empty(&self) -> bool {
    self.assoc.contains(SymbolFlags::EMPTY)
  }
}

/// Symbol registry. Terminals occupy codes `0..n_terminals`,
/// nonterminals the rest.
#[derive(Clone, Debug, Default)]
pub(crate) struct Context {
  symbols: Vec<Symbol>,
  names: HashMap<String, SymbolId>,
  n_terminals: usize,
}

impl Context {
  fn intern(
    &mut self,
    name: &str,
    terminal: bool,
  ) -> SymbolId {
    let code = SymbolId(self.symbols.len() as u32);
    self.symbols.push(Symbol {
      code,
      name: name.to_owned(),
      assoc: SymbolFlags::empty(),
      prec: 0,
      raw: None,
      value: None,
    });
    self.names.insert(name.to_owned(), code);
    if terminal {
      self.n_terminals += 1;
    }
    code
  }

  pub(crate) fn n_symbols(&self) -> usize {
    self.symbols.len()
  }

  pub(crate) fn n_terminals(&self) -> usize {
    self.n_terminals
  }

  pub(crate) fn n_nonterminals(&self) -> usize {
    self.symbols.len() - self.n_terminals
  }

  #[cfg(test)]
  pub(crate) fn symbols(&self) -> &[Symbol] {
    &self.symbols
  }

  pub(crate) fn terminals(&self) -> &[Symbol] {
    &self.symbols[..self.n_terminals]
  }

  pub(crate) fn nonterminals(&self) -> &[Symbol] {
    &self.symbols[self.n_terminals..]
  }

  pub(crate) fn get(&self, name: &str) -> Option<SymbolId> {
    self.names.get(name).copied()
  }

  pub(crate) fn is_terminal(&self, id: SymbolId) -> bool {
    id.index() < self.n_terminals
  }

  /// Position of a nonterminal among the nonterminals; the goto tables
  /// are indexed by it.
  pub(crate) fn nonterm_index(&self, id: SymbolId) -> usize {
    id.index() - self.n_terminals
  }

  pub(crate) fn name(&self, id: SymbolId) -> &str {
    &self.symbols[id.index()].name
  }
}

impl Index<SymbolId> for Context {
  type Output = Symbol;

  fn index(&self, id: SymbolId) -> &Symbol {
    &self.symbols[id.index()]
  }
}

impl IndexMut<SymbolId> for Context {
  fn index_mut(&mut self, id: SymbolId) -> &mut Symbol {
    &mut self.symbols[id.index()]
  }
}

#[derive(Clone, Debug)]
pub(crate) struct Production {
  pub(crate) number: usize,
  pub(crate) lhs: SymbolId,
  pub(crate) rhs: Vec<SymbolId>,
  pub(crate) action: Option<String>,
  pub(crate) prec: u16,
  /// next production with the same left-hand side
  pub(crate) link: Option<usize>,
}

/// The grammar after symbol resolution. Production 0 is always
/// `$start -> start $end`.
#[derive(Clone, Debug)]
pub(crate) struct Bnf {
  pub(crate) ctx: Context,
  pub(crate) prods: Vec<Production>,
  /// `$start`
  pub(crate) start_prime: SymbolId,
  pub(crate) error: Option<SymbolId>,
}

impl Bnf {
  pub(crate) fn productions_of(&self, nonterm: SymbolId) -> Productions<'_> {
    Productions {
      bnf: self,
      next: self.ctx[nonterm].value,
    }
  }

  /// `lhs : rhs...`, as listed in the generated parser.
  pub(crate) fn production_string(&self, number: usize) -> String {
    let prod = &self.prods[number];
    let mut s = format!("{} :", self.ctx.name(prod.lhs));
    if prod.rhs.is_empty() {
      s.push_str(" /* empty */");
    }
    for &sym in &prod.rhs {
      s.push(' ');
      s.push_str(self.ctx.name(sym));
    }
    s
  }
}

pub(crate) struct Productions<'a> {
  bnf: &'a Bnf,
  next: Option<usize>,
}

impl<'a> Iterator for Productions<'a> {
  type Item = &'a Production;

  fn next(&mut self) -> Option<&'a Production> {
    let prod = &self.bnf.prods[self.next?];
    self.next = prod.link;
    Some(prod)
  }
}

fn is_reserved(name: &str) -> bool {
  name == END || name == START
}

impl TryFrom<Grammar> for Bnf {
  type Error = Error;

  fn try_from(grammar: Grammar) -> Result<Bnf, Error> {
    if grammar.rules.is_empty() {
      return Err(Error::NoRules);
    }

    let mut nonterm_names = IndexMap::new();
    for rule in &grammar.rules {
      nonterm_names.entry(rule.lhs.clone()).or_insert(());
    }

    let mentions_error = grammar.tokens.iter().any(|t| t.name == ERROR)
      || grammar.precedence.iter().any(|p| p.tokens.iter().any(|t| t == ERROR))
      || grammar.rules.iter().any(|r| {
        r.rhs.iter().any(|s| s == ERROR) || r.prec.as_deref() == Some(ERROR)
      });

    // terminals in code order, with their raw codes if already known
    let mut terms: IndexMap<String, Option<u32>> = IndexMap::new();
    terms.insert(END.to_owned(), Some(0));
    if mentions_error {
      terms.insert(ERROR.to_owned(), Some(ERROR_CODE));
    }
    for decl in &grammar.tokens {
      if decl.name == ERROR {
        continue;
      }
      let entry = terms.entry(decl.name.clone()).or_insert(None);
      if decl.code.is_some() {
        *entry = decl.code;
      }
    }
    for decl in &grammar.precedence {
      for name in &decl.tokens {
        if !terms.contains_key(name) && !nonterm_names.contains_key(name) {
          terms.insert(name.clone(), None);
        }
      }
    }
    for rule in &grammar.rules {
      for name in rule.rhs.iter().chain(rule.prec.iter()) {
        if !terms.contains_key(name) && char_literal(name).is_some() {
          terms.insert(name.clone(), None);
        }
      }
    }

    let mut taken: HashMap<u32, String> = HashMap::new();
    for (name, code) in terms.iter_mut() {
      if code.is_none() {
        *code = char_literal(name).map(|c| c as u32);
      }
      if let Some(code) = *code {
        if let Some(first) = taken.insert(code, name.clone()) {
          return Err(Error::DuplicateTokenCode {
            first,
            second: name.clone(),
            code,
          });
        }
      }
    }
    let mut next_code = FIRST_NAMED_CODE;
    for code in terms.values_mut().filter(|code| code.is_none()) {
      while taken.contains_key(&next_code) {
        next_code += 1;
      }
      *code = Some(next_code);
      next_code += 1;
    }

    for (i, rule) in grammar.rules.iter().enumerate() {
      if is_reserved(&rule.lhs) {
        return Err(Error::ReservedSymbol {
          production: i + 1,
          name: rule.lhs.clone(),
        });
      }
      if terms.contains_key(&rule.lhs) || char_literal(&rule.lhs).is_some() {
        return Err(Error::TerminalOnLeft {
          production: i + 1,
          name: rule.lhs.clone(),
        });
      }
    }

    let start_name = grammar.start.clone()
      .unwrap_or_else(|| grammar.rules[0].lhs.clone());
    if !nonterm_names.contains_key(&start_name) {
      return Err(Error::UndefinedStart(start_name));
    }

    let mut ctx = Context::default();
    for (name, code) in &terms {
      let id = ctx.intern(name, true);
      ctx[id].raw = *code;
    }
    let start_prime = ctx.intern(START, false);
    for name in nonterm_names.keys() {
      ctx.intern(name, false);
    }

    for (level, decl) in grammar.precedence.iter().enumerate() {
      let flags = match decl.assoc {
        Assoc::Left => SymbolFlags::LEFT,
        Assoc::Right => SymbolFlags::RIGHT,
        Assoc::NonAssoc => SymbolFlags::NONASSOC,
      };
      for name in &decl.tokens {
        if let Some(id) = ctx.get(name).filter(|&id| ctx.is_terminal(id)) {
          let sym = &mut ctx[id];
          sym.prec = level as u16 + 1;
          sym.assoc = flags;
        }
      }
    }

    let end = SymbolId(0);
    let start = ctx.get(&start_name).unwrap_or(start_prime);
    let error = ctx.get(ERROR).filter(|&id| ctx.is_terminal(id));

    let mut prods = vec![Production {
      number: 0,
      lhs: start_prime,
      rhs: vec![start, end],
      action: None,
      prec: 0,
      link: None,
    }];
    for (i, rule) in grammar.rules.into_iter().enumerate() {
      let number = i + 1;
      let lhs = ctx.get(&rule.lhs).unwrap_or(start_prime);
      let mut rhs = Vec::with_capacity(rule.rhs.len());
      for name in rule.rhs {
        if is_reserved(&name) {
          return Err(Error::ReservedSymbol {
            production: number,
            name,
          });
        }
        match ctx.get(&name) {
          Some(id) => rhs.push(id),
          None => {
            return Err(Error::UndefinedSymbol {
              production: number,
              name,
            })
          }
        }
      }

      let prec = match rule.prec {
        Some(name) => match ctx.get(&name).filter(|&id| ctx.is_terminal(id)) {
          Some(id) => ctx[id].prec,
          None => {
            return Err(Error::UndefinedPrecedence {
              production: number,
              name,
            })
          }
        },
        None => rhs.iter().rev()
          .find(|&&id| ctx.is_terminal(id) && ctx[id].prec > 0)
          .map_or(0, |&id| ctx[id].prec),
      };

      prods.push(Production {
        number,
        lhs,
        rhs,
        action: rule.action,
        prec,
        link: None,
      });
    }

    let mut last: Vec<Option<usize>> = vec![None; ctx.n_symbols()];
    for number in 0..prods.len() {
      let lhs = prods[number].lhs;
      match last[lhs.index()] {
        Some(prev) => prods[prev].link = Some(number),
        None => ctx[lhs].value = Some(number),
      }
      last[lhs.index()] = Some(number);
    }

    let unique: HashSet<u32> = ctx.terminals().iter().filter_map(|t| t.raw).collect();
    debug_assert_eq!(unique.len(), ctx.n_terminals());

    Ok(Bnf {
      ctx,
      prods,
      start_prime,
      error,
    })
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  pub(crate) fn bnf(grammar: Grammar) -> Bnf {
    Bnf::try_from(grammar).unwrap()
  }

  /// `E -> E '+' T | T`, `T -> id`
  pub(crate) fn expr() -> Grammar {
    let mut g = Grammar::new();
    g.token("id");
    g.rule("E", &["E", "'+'", "T"]);
    g.rule("E", &["T"]);
    g.rule("T", &["id"]);
    g
  }

  fn names(symbols: &[Symbol]) -> Vec<&str> {
    symbols.iter().map(|s| s.name.as_str()).collect()
  }

  #[test]
  fn symbol_codes() {
    let bnf = bnf(expr());

    assert_eq!(names(bnf.ctx.terminals()), vec!["$end", "id", "'+'"]);
    assert_eq!(names(bnf.ctx.nonterminals()), vec!["$start", "E", "T"]);
    assert_eq!(bnf.ctx.n_symbols(), 6);
    assert_eq!(bnf.error, None);

    let raw = bnf.ctx.terminals().iter().map(|t| t.raw).collect::<Vec<_>>();
    assert_eq!(raw, vec![Some(0), Some(257), Some('+' as u32)]);
    for (i, sym) in bnf.ctx.symbols().iter().enumerate() {
      assert_eq!(sym.code, SymbolId(i as u32));
    }
  }

  #[test]
  fn augmented_production() {
    let bnf = bnf(expr());
    let e = bnf.ctx.get("E").unwrap();

    assert_eq!(bnf.prods[0].lhs, bnf.start_prime);
    assert_eq!(bnf.ctx.name(bnf.start_prime), "$start");
    assert_eq!(bnf.prods[0].rhs, vec![e, SymbolId(0)]);
    assert_eq!(bnf.production_string(0), "$start : E $end");
    assert_eq!(bnf.production_string(1), "E : E '+' T");
  }

  #[test]
  fn production_links() {
    let mut g = expr();
    g.rule("E", &[]);
    let bnf = bnf(g);
    let e = bnf.ctx.get("E").unwrap();

    let numbers = bnf.productions_of(e).map(|p| p.number).collect::<Vec<_>>();
    assert_eq!(numbers, vec![1, 2, 4]);
    assert_eq!(bnf.production_string(4), "E : /* empty */");
  }

  #[test]
  fn error_token() {
    let mut g = Grammar::new();
    g.token_code("NUM", 300);
    g.token("IDENT");
    g.rule("S", &["NUM"]);
    g.rule("S", &["error", "IDENT"]);
    let bnf = bnf(g);

    assert_eq!(names(bnf.ctx.terminals()), vec!["$end", "error", "NUM", "IDENT"]);
    assert_eq!(bnf.error, Some(SymbolId(1)));
    let raw = bnf.ctx.terminals().iter().map(|t| t.raw).collect::<Vec<_>>();
    assert_eq!(raw, vec![Some(0), Some(256), Some(300), Some(257)]);
  }

  #[test]
  fn precedence() {
    let mut g = Grammar::new();
    g.token("NUM");
    g.precedence(Assoc::Left, &["'+'", "'-'"]);
    g.precedence(Assoc::Right, &["UMINUS"]);
    g.rule("E", &["E", "'+'", "E"]);
    g.rule("E", &["'-'", "E"]).prec("UMINUS");
    g.rule("E", &["NUM"]);
    let bnf = bnf(g);

    let plus = bnf.ctx.get("'+'").unwrap();
    let uminus = bnf.ctx.get("UMINUS").unwrap();
    assert_eq!(bnf.ctx[plus].prec, 1);
    assert_eq!(bnf.ctx[plus].assoc, SymbolFlags::LEFT);
    assert_eq!(bnf.ctx[uminus].prec, 2);
    assert_eq!(bnf.ctx[uminus].assoc, SymbolFlags::RIGHT);
    assert_eq!(
      bnf.prods.iter().map(|p| p.prec).collect::<Vec<_>>(),
      vec![0, 1, 2, 0],
    );
  }

  #[test]
  fn undefined_symbol() {
    let mut g = expr();
    g.rule("T", &["'('", "Expr", "')'"]);

    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::UndefinedSymbol {
        production: 4,
        name: "Expr".to_owned(),
      },
    );
  }

  #[test]
  fn invalid_grammars() {
    assert_eq!(Bnf::try_from(Grammar::new()).unwrap_err(), Error::NoRules);

    let mut g = expr();
    g.rule("id", &["T"]);
    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::TerminalOnLeft {
        production: 4,
        name: "id".to_owned(),
      },
    );

    let mut g = expr();
    g.rule("T", &["$end"]);
    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::ReservedSymbol {
        production: 4,
        name: "$end".to_owned(),
      },
    );

    let mut g = expr();
    g.start("S");
    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::UndefinedStart("S".to_owned()),
    );

    let mut g = expr();
    g.rule("T", &["'-'", "T"]).prec("T");
    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::UndefinedPrecedence {
        production: 4,
        name: "T".to_owned(),
      },
    );

    let mut g = expr();
    g.token_code("PLUS", '+' as u32);
    assert_eq!(
      Bnf::try_from(g).unwrap_err(),
      Error::DuplicateTokenCode {
        first: "PLUS".to_owned(),
        second: "'+'".to_owned(),
        code: '+' as u32,
      },
    );
  }
}
