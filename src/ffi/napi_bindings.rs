//! NAPI bindings for program handles
//!
//! Exposes the handle lifecycle to JavaScript:
//!
//! ```js
//! const prog = Program.instantiate("movies");
//! prog.loadAll("./data/in");
//! prog.run();
//! prog.printAll("./data/out");
//! prog.dispose();
//! ```

use napi::bindgen_prelude::*;
use napi_derive::napi;

use crate::config::EngineConfig;
use crate::error::HarnessError;
use crate::program::{HandleState, ProgramHandle, ProgramRegistry};

fn to_js_error(err: HarnessError) -> Error {
    Error::from_reason(format!("[exit {}] {}", err.exit_code(), err))
}

fn registry() -> Result<ProgramRegistry> {
    Ok(ProgramRegistry::builtin()
        .map_err(to_js_error)?
        .with_config(EngineConfig::from_env()))
}

/// Summary of one run
#[napi(object)]
pub struct JsRunStats {
    pub strata: u32,
    pub iterations: u32,
    pub derived_tuples: u32,
    pub elapsed_ms: i64,
}

/// Handle to one instantiated program
#[napi(js_name = "Program")]
pub struct JsProgram {
    handle: ProgramHandle,
}

#[napi]
impl JsProgram {
    /// Instantiate a bundled program by name
    #[napi(factory)]
    pub fn instantiate(name: String) -> Result<Self> {
        let handle = registry()?.instantiate(&name).map_err(to_js_error)?;
        Ok(JsProgram { handle })
    }

    #[napi]
    pub fn load_all(&mut self, input_dir: String) -> Result<()> {
        self.handle.load_all(input_dir).map_err(to_js_error)
    }

    #[napi]
    pub fn run(&mut self) -> Result<JsRunStats> {
        let stats = self.handle.run().map_err(to_js_error)?;
        Ok(JsRunStats {
            strata: stats.strata as u32,
            iterations: stats.iterations as u32,
            derived_tuples: stats.derived_tuples as u32,
            elapsed_ms: stats.elapsed_ms as i64,
        })
    }

    #[napi]
    pub fn print_all(&self, output_dir: String) -> Result<()> {
        self.handle.print_all(output_dir).map_err(to_js_error)
    }

    #[napi]
    pub fn dispose(&mut self) -> Result<()> {
        self.handle.dispose().map_err(to_js_error)
    }

    /// "created" | "loaded" | "executed" | "disposed"
    #[napi(getter)]
    pub fn state(&self) -> String {
        match self.handle.state() {
            HandleState::Created => "created",
            HandleState::Loaded => "loaded",
            HandleState::Executed => "executed",
            HandleState::Disposed => "disposed",
        }
        .to_string()
    }

    #[napi]
    pub fn relation_names(&self) -> Result<Vec<String>> {
        self.handle.relation_names().map_err(to_js_error)
    }

    /// Rows of a relation, every value stringified
    #[napi]
    pub fn tuples(&self, relation: String) -> Result<Vec<Vec<String>>> {
        let tuples = self.handle.tuples(&relation).map_err(to_js_error)?;
        Ok(tuples
            .into_iter()
            .map(|t| t.iter().map(|v| v.to_string()).collect())
            .collect())
    }
}

/// Names of the bundled programs
#[napi]
pub fn program_names() -> Result<Vec<String>> {
    Ok(registry()?.names().into_iter().map(String::from).collect())
}
