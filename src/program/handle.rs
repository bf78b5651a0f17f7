//! Program handle: the caller-owned lifecycle of one program instance

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::datalog::{RunStats, Tuple};
use crate::error::{HarnessError, Result};
use crate::program::LogicProgram;

/// Externally observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HandleState {
    Created,
    Loaded,
    Executed,
    Disposed,
}

/// Exclusive owner of one instantiated program.
///
/// Every operation fails with [`HarnessError::UseAfterDispose`] once
/// [`dispose`](ProgramHandle::dispose) has been called, including a second
/// `dispose`. A failed operation leaves the state as it was. A handle that is
/// dropped without being disposed releases its program anyway.
pub struct ProgramHandle {
    name: String,
    state: HandleState,
    program: Option<Box<dyn LogicProgram>>,
}

impl ProgramHandle {
    pub(crate) fn new(program: Box<dyn LogicProgram>) -> Self {
        ProgramHandle {
            name: program.name().to_string(),
            state: HandleState::Created,
            program: Some(program),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == HandleState::Disposed
    }

    fn live(&self, operation: &'static str) -> Result<&dyn LogicProgram> {
        self.program
            .as_deref()
            .ok_or(HarnessError::UseAfterDispose { operation })
    }

    fn live_mut(&mut self, operation: &'static str) -> Result<&mut (dyn LogicProgram + 'static)> {
        self.program
            .as_deref_mut()
            .ok_or(HarnessError::UseAfterDispose { operation })
    }

    /// Load every input relation from `input_dir`
    pub fn load_all(&mut self, input_dir: impl AsRef<Path>) -> Result<()> {
        self.live_mut("load_all")?.load_all(input_dir.as_ref())?;
        self.state = HandleState::Loaded;
        Ok(())
    }

    /// Evaluate the program to fixpoint
    pub fn run(&mut self) -> Result<RunStats> {
        let stats = self.live_mut("run")?.run()?;
        self.state = HandleState::Executed;
        Ok(stats)
    }

    /// Write every output relation into `output_dir`
    pub fn print_all(&self, output_dir: impl AsRef<Path>) -> Result<()> {
        self.live("print_all")?.print_all(output_dir.as_ref())
    }

    /// Release the program. Valid exactly once.
    pub fn dispose(&mut self) -> Result<()> {
        let program = self
            .program
            .take()
            .ok_or(HarnessError::UseAfterDispose { operation: "dispose" })?;
        drop(program);
        self.state = HandleState::Disposed;
        tracing::debug!("Disposed program handle {}", self.name);
        Ok(())
    }

    pub fn relation_names(&self) -> Result<Vec<String>> {
        Ok(self.live("relation_names")?.relation_names())
    }

    /// Current contents of a relation, sorted
    pub fn tuples(&self, relation: &str) -> Result<Vec<Tuple>> {
        self.live("tuples")?.tuples(relation)
    }

    pub fn contains(&self, relation: &str, tuple: &Tuple) -> Result<bool> {
        self.live("contains")?.contains(relation, tuple)
    }

    /// Add one tuple to an input relation; the handle counts as loaded
    /// afterwards
    pub fn insert(&mut self, relation: &str, tuple: Tuple) -> Result<bool> {
        let inserted = self.live_mut("insert")?.insert(relation, tuple)?;
        self.state = HandleState::Loaded;
        Ok(inserted)
    }

    pub fn dump_inputs(&self, out: &mut dyn Write) -> Result<()> {
        self.live("dump_inputs")?.dump_inputs(out)
    }

    pub fn dump_outputs(&self, out: &mut dyn Write) -> Result<()> {
        self.live("dump_outputs")?.dump_outputs(out)
    }
}

impl fmt::Debug for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramHandle")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for ProgramHandle {
    fn drop(&mut self) {
        if self.program.take().is_some() {
            tracing::warn!("Program handle {} dropped without dispose(); released implicitly", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::program::{DatalogFactory, ProgramFactory};
    use crate::datalog::Value;

    const SOURCE: &str = r#"
        .decl item(name: symbol)
        .input item
        .decl copy(name: symbol)
        .output copy
        copy(X) :- item(X).
    "#;

    fn handle() -> ProgramHandle {
        let factory = DatalogFactory::from_source("copy", SOURCE).unwrap();
        ProgramHandle::new(factory.instantiate(&EngineConfig::default()).unwrap())
    }

    #[test]
    fn test_new_handle_is_created() {
        let handle = handle();
        assert_eq!(handle.state(), HandleState::Created);
        assert_eq!(handle.name(), "copy");
    }

    #[test]
    fn test_insert_run_transitions() {
        let mut handle = handle();
        handle.insert("item", vec![Value::symbol("a")]).unwrap();
        assert_eq!(handle.state(), HandleState::Loaded);

        handle.run().unwrap();
        assert_eq!(handle.state(), HandleState::Executed);
        assert!(handle.contains("copy", &vec![Value::symbol("a")]).unwrap());

        // Reprint keeps the state
        let mut out = Vec::new();
        handle.dump_outputs(&mut out).unwrap();
        assert_eq!(handle.state(), HandleState::Executed);
    }

    #[test]
    fn test_failed_operation_keeps_state() {
        let mut handle = handle();
        assert!(handle.load_all("/definitely/not/here").is_err());
        assert_eq!(handle.state(), HandleState::Created);
        handle.dispose().unwrap();
    }

    #[test]
    fn test_disposed_is_sticky() {
        let mut handle = handle();
        handle.dispose().unwrap();
        assert_eq!(handle.state(), HandleState::Disposed);

        let err = handle.run().unwrap_err();
        assert!(matches!(err, HarnessError::UseAfterDispose { operation: "run" }));
        assert!(matches!(
            handle.dispose(),
            Err(HarnessError::UseAfterDispose { operation: "dispose" })
        ));
        assert!(matches!(
            handle.tuples("copy"),
            Err(HarnessError::UseAfterDispose { .. })
        ));
        assert_eq!(handle.state(), HandleState::Disposed);
    }
}
