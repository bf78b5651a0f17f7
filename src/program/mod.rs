//! Program handles and the registry that creates them
//!
//! A [`ProgramRegistry`] maps program names to [`ProgramFactory`]s. Each
//! factory produces a fresh [`LogicProgram`] (the evaluation unit) which the
//! caller drives through a [`ProgramHandle`]:
//!
//! ```text
//! Created --load_all--> Loaded --run--> Executed --dispose--> Disposed
//!            (reload)   Loaded          Executed (reprint)
//! ```

mod handle;
mod instance;
mod registry;

use std::io::Write;
use std::path::Path;

use crate::config::EngineConfig;
use crate::datalog::{RunStats, Tuple};
use crate::error::Result;

pub use handle::{HandleState, ProgramHandle};
pub use instance::{DatalogFactory, DatalogProgram};
pub use registry::ProgramRegistry;

/// An instantiated logic program: its relations plus the means to fill,
/// evaluate and print them
pub trait LogicProgram: Send {
    fn name(&self) -> &str;

    /// Read every input relation from `input_dir`, all or nothing
    fn load_all(&mut self, input_dir: &Path) -> Result<()>;

    /// Evaluate to fixpoint
    fn run(&mut self) -> Result<RunStats>;

    /// Write every output relation into `output_dir`
    fn print_all(&self, output_dir: &Path) -> Result<()>;

    fn relation_names(&self) -> Vec<String>;

    fn tuples(&self, relation: &str) -> Result<Vec<Tuple>>;

    fn contains(&self, relation: &str, tuple: &Tuple) -> Result<bool>;

    /// Add one tuple to an input relation. Returns true if it was new.
    fn insert(&mut self, relation: &str, tuple: Tuple) -> Result<bool>;

    fn dump_inputs(&self, out: &mut dyn Write) -> Result<()>;

    fn dump_outputs(&self, out: &mut dyn Write) -> Result<()>;
}

/// Creates instances of one named program
pub trait ProgramFactory: Send + Sync {
    fn name(&self) -> &str;

    fn instantiate(&self, config: &EngineConfig) -> Result<Box<dyn LogicProgram>>;
}
