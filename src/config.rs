/// Knobs threaded through every generation phase.
#[derive(Debug, Clone)]
pub struct Config {
  /// Dump EMPTY nonterminals, FIRST sets, states and table statistics
  /// through `log::debug!`.
  pub debug: bool,

  /// Reduce snippet used for rules that declare no action.
  pub default_action: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      debug: false,
      default_action: "$$ = $1;".to_owned(),
    }
  }
}
