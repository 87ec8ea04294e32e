/// A grammar as handed over by the grammar-file reader: token
/// declarations, precedence levels and rules, all by name.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
  pub(crate) tokens: Vec<TokenDecl>,
  pub(crate) precedence: Vec<PrecDecl>,
  pub(crate) start: Option<String>,
  pub(crate) rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenDecl {
  pub(crate) name: String,
  pub(crate) code: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct PrecDecl {
  pub(crate) assoc: Assoc,
  pub(crate) tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Rule {
  pub(crate) lhs: String,
  pub(crate) rhs: Vec<String>,
  pub(crate) action: Option<String>,
  pub(crate) prec: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
  /// `%nonassoc`
  NonAssoc,
  Left,
  Right,
}

impl Grammar {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn token(
    &mut self,
    name: impl Into<String>,
  ) -> &mut Self {
    self.tokens.push(TokenDecl {
      name: name.into(),
      code: None,
    });
    self
  }

  /// Declares a token with an explicit raw code, as reported by the lexer.
  pub fn token_code(
    &mut self,
    name: impl Into<String>,
    code: u32,
  ) -> &mut Self {
    self.tokens.push(TokenDecl {
      name: name.into(),
      code: Some(code),
    });
    self
  }

  /// Declares one precedence level, binding tighter than every level
  /// declared before it.
  pub fn precedence(
    &mut self,
    assoc: Assoc,
    tokens: &[&str],
  ) -> &mut Self {
    self.precedence.push(PrecDecl {
      assoc,
      tokens: tokens.iter().map(|&s| s.to_owned()).collect(),
    });
    self
  }

  pub fn start(
    &mut self,
    name: impl Into<String>,
  ) -> &mut Self {
    self.start = Some(name.into());
    self
  }

  pub fn rule(
    &mut self,
    lhs: impl Into<String>,
    rhs: &[&str],
  ) -> &mut Rule {
    let ix = self.rules.len();
    self.rules.push(Rule {
      lhs: lhs.into(),
      rhs: rhs.iter().map(|&s| s.to_owned()).collect(),
      action: None,
      prec: None,
    });
    &mut self.rules[ix]
  }
}

impl Rule {
  /// Source text run when the rule is reduced.
  pub fn action(
    &mut self,
    code: impl Into<String>,
  ) -> &mut Self {
    self.action = Some(code.into());
    self
  }

  /// `%prec`: take the precedence of `token` instead of the rule's last
  /// token.
  pub fn prec(
    &mut self,
    token: impl Into<String>,
  ) -> &mut Self {
    self.prec = Some(token.into());
    self
  }
}

/// Decodes a character literal such as `'+'` or `'\n'`.
pub(crate) fn char_literal(name: &str) -> Option<char> {
  let inner = name.strip_prefix('\'')?.strip_suffix('\'')?;
  let mut chars = inner.chars();
  let c = match chars.next()? {
    '\\' => match chars.next()? {
      'n' => '\n',
      't' => '\t',
      'r' => '\r',
      '0' => '\0',
      '\\' => '\\',
      '\'' => '\'',
      _ => return None,
    },
    c => c,
  };
  if chars.next().is_some() {
    return None;
  }
  Some(c)
}
