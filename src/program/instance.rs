//! Datalog-backed evaluation unit

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::datalog::{CompiledProgram, Evaluator, IoDirective, RunStats, Tuple};
use crate::error::{HarnessError, Result};
use crate::program::{LogicProgram, ProgramFactory};
use crate::storage::{read_facts, write_relation, Database, FactFile, Relation};

const DUMP_RULE: &str = "---------------";
const DUMP_BAR: &str = "===============";

/// One instance of a compiled program with its own relation storage
pub struct DatalogProgram {
    program: Arc<CompiledProgram>,
    config: EngineConfig,
    db: Database,
}

impl DatalogProgram {
    pub fn new(program: Arc<CompiledProgram>, config: EngineConfig) -> Self {
        let db = Database::from_declarations(program.declarations());
        DatalogProgram { program, config, db }
    }

    pub fn compiled(&self) -> &CompiledProgram {
        &self.program
    }

    fn relation(&self, name: &str) -> Result<&Relation> {
        self.db.get(name).ok_or_else(|| HarnessError::UnknownRelation {
            program: self.program.name().to_string(),
            relation: name.to_string(),
        })
    }

    fn dump(&self, directives: &[IoDirective], out: &mut dyn Write) -> Result<()> {
        let dump_err = |e: std::io::Error| HarnessError::output_io("-", "cannot dump relations", e);

        for directive in directives {
            let relation = self.relation(&directive.relation)?;
            writeln!(out, "{}\n{}\n{}", DUMP_RULE, relation.name(), DUMP_BAR).map_err(dump_err)?;
            for tuple in relation.iter() {
                let row: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
                writeln!(out, "{}", row.join("\t")).map_err(dump_err)?;
            }
            writeln!(out, "{}", DUMP_BAR).map_err(dump_err)?;
        }
        Ok(())
    }
}

impl LogicProgram for DatalogProgram {
    fn name(&self) -> &str {
        self.program.name()
    }

    fn load_all(&mut self, input_dir: &Path) -> Result<()> {
        if !input_dir.is_dir() {
            let reason = if input_dir.exists() {
                "not a directory"
            } else {
                "directory does not exist"
            };
            return Err(HarnessError::input_load(input_dir, reason));
        }

        // Stage everything first so a bad file leaves the relations untouched
        let mut staged: Vec<(&str, Vec<Tuple>)> = Vec::new();
        for directive in self.program.inputs() {
            let file = FactFile::resolve(input_dir, directive);
            let tuples = read_facts(&file, self.relation(&directive.relation)?)?;
            tracing::debug!("Read {} tuples for {} from {:?}", tuples.len(), directive.relation, file.path);
            staged.push((&directive.relation, tuples));
        }

        let mut loaded = 0;
        for (relation, tuples) in staged {
            loaded += tuples.len();
            for tuple in tuples {
                self.db.insert(relation, tuple);
            }
        }

        tracing::info!(
            "Loaded {} tuples into {} input relation(s) of {} from {:?}",
            loaded,
            self.program.inputs().len(),
            self.program.name(),
            input_dir
        );
        Ok(())
    }

    fn run(&mut self) -> Result<RunStats> {
        let evaluator = Evaluator::new(&self.program, &self.config)?;
        let stats = evaluator.run(&mut self.db)?;
        tracing::info!(
            "Evaluated {}: {} strata, {} iterations, {} new tuples in {}ms",
            self.program.name(),
            stats.strata,
            stats.iterations,
            stats.derived_tuples,
            stats.elapsed_ms
        );
        Ok(stats)
    }

    fn print_all(&self, output_dir: &Path) -> Result<()> {
        fs::create_dir_all(output_dir)
            .map_err(|e| HarnessError::output_io(output_dir, "cannot create output directory", e))?;

        for directive in self.program.outputs() {
            let file = FactFile::resolve(output_dir, directive);
            write_relation(&file, self.relation(&directive.relation)?)?;
        }

        tracing::info!(
            "Printed {} output relation(s) of {} to {:?}",
            self.program.outputs().len(),
            self.program.name(),
            output_dir
        );
        Ok(())
    }

    fn relation_names(&self) -> Vec<String> {
        self.program
            .declarations()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    fn tuples(&self, relation: &str) -> Result<Vec<Tuple>> {
        Ok(self.relation(relation)?.iter().cloned().collect())
    }

    fn contains(&self, relation: &str, tuple: &Tuple) -> Result<bool> {
        Ok(self.relation(relation)?.contains(tuple))
    }

    fn insert(&mut self, relation: &str, tuple: Tuple) -> Result<bool> {
        self.relation(relation)?
            .check_tuple(&tuple)
            .map_err(|reason| HarnessError::InvalidTuple {
                relation: relation.to_string(),
                reason,
            })?;
        if !self.program.is_input(relation) {
            return Err(HarnessError::NotAnInput(relation.to_string()));
        }
        Ok(self.db.insert(relation, tuple))
    }

    fn dump_inputs(&self, out: &mut dyn Write) -> Result<()> {
        self.dump(self.program.inputs(), out)
    }

    fn dump_outputs(&self, out: &mut dyn Write) -> Result<()> {
        self.dump(self.program.outputs(), out)
    }
}

/// Factory sharing one compiled program between its instances
pub struct DatalogFactory {
    program: Arc<CompiledProgram>,
}

impl DatalogFactory {
    pub fn new(program: CompiledProgram) -> Self {
        DatalogFactory {
            program: Arc::new(program),
        }
    }

    pub fn from_source(name: &str, source: &str) -> Result<Self> {
        Ok(DatalogFactory::new(CompiledProgram::from_source(name, source)?))
    }
}

impl ProgramFactory for DatalogFactory {
    fn name(&self) -> &str {
        self.program.name()
    }

    fn instantiate(&self, config: &EngineConfig) -> Result<Box<dyn LogicProgram>> {
        Ok(Box::new(DatalogProgram::new(Arc::clone(&self.program), config.clone())))
    }
}
