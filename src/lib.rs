//! dlharness - lifecycle harness for named Datalog programs
//!
//! # Architecture
//!
//! - **Registry**: program name → factory, bundled programs embedded at build time
//! - **Handle**: `Created → Loaded → Executed → Disposed`, disposal explicit and sticky
//! - **Engine**: parser, compiler (type checks, stratification), semi-naive evaluator
//! - **Fact I/O**: one delimited file per input/output relation
//!
//! # Usage example
//!
//! ```no_run
//! use dlharness::ProgramRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProgramRegistry::builtin()?;
//! let mut movies = registry.instantiate("movies")?;
//!
//! movies.load_all("./data/in")?;
//! movies.run()?;
//! movies.print_all("./data/out")?; // ActedIn.csv
//! movies.dispose()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod datalog;
pub mod error;
pub mod program;
pub mod storage;

#[cfg(feature = "napi")]
pub mod ffi;

pub use config::EngineConfig;
pub use datalog::{RunStats, Tuple, Value};
pub use error::{HarnessError, Result};
pub use program::{
    DatalogFactory, HandleState, LogicProgram, ProgramFactory, ProgramHandle, ProgramRegistry,
};

// Re-export NAPI bindings when feature is enabled
#[cfg(feature = "napi")]
pub use ffi::*;
