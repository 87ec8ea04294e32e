use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("grammar has no rules")]
  NoRules,

  #[error("start symbol `{0}` has no rules")]
  UndefinedStart(String),

  #[error("rule {production}: undefined symbol `{name}`")]
  UndefinedSymbol {
    production: usize,
    name: String,
  },

  #[error("rule {production}: token `{name}` used as left-hand side")]
  TerminalOnLeft {
    production: usize,
    name: String,
  },

  #[error("rule {production}: `{name}` is reserved")]
  ReservedSymbol {
    production: usize,
    name: String,
  },

  #[error("rule {production}: %prec `{name}` is not a token")]
  UndefinedPrecedence {
    production: usize,
    name: String,
  },

  #[error("tokens `{first}` and `{second}` share the code {code}")]
  DuplicateTokenCode {
    first: String,
    second: String,
    code: u32,
  },

  #[error("syntax error in state {state}: unexpected {symbol}")]
  UnexpectedToken {
    state: usize,
    symbol: String,
  },
}
