pub mod grammar;
pub mod parser;
pub mod tables;
mod bnf;
mod config;
mod error;

pub use config::Config;
pub use error::Error;
pub use grammar::{Assoc, Grammar};
pub use parser::Parser;
pub use tables::Tables;

pub fn build(grammar: Grammar) -> Result<Parser, Error> {
  build_with(grammar, &Config::default())
}

pub fn build_with(grammar: Grammar, config: &Config) -> Result<Parser, Error> {
  Parser::new(grammar, config)
}
