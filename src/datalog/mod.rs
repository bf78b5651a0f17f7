//! Datalog engine behind the program handles
//!
//! Parses programs with relation declarations and I/O directives, compiles
//! them into strata and evaluates them bottom-up to a fixpoint.
//!
//! # Example
//! ```ignore
//! .decl edge(src: symbol, dst: symbol)
//! .input edge
//! .decl path(src: symbol, dst: symbol)
//! .output path
//! path(X, Y) :- edge(X, Y).
//! path(X, Z) :- path(X, Y), edge(Y, Z).
//! ```

mod types;
mod parser;
mod compile;
mod eval;

pub use types::*;
pub use parser::*;
pub use compile::*;
pub use eval::*;
