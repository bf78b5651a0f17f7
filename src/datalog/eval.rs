//! Datalog evaluator
//!
//! Bottom-up, stratified, semi-naive evaluation of a [`CompiledProgram`]
//! against a [`Database`]. Within one iteration the rules of a stratum are
//! independent, so they may run on a rayon pool; their results are merged
//! into the sorted relations afterwards, which keeps the outcome identical to
//! a sequential run.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::datalog::compile::{CompiledProgram, Stratum};
use crate::datalog::types::*;
use crate::error::{HarnessError, Result};
use crate::storage::{Database, Relation};

/// Variable bindings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    map: HashMap<String, Value>,
}

impl Bindings {
    /// Create empty bindings
    pub fn new() -> Self {
        Bindings { map: HashMap::new() }
    }

    /// Get a binding
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.map.get(var)
    }

    /// Set a binding
    pub fn set(&mut self, var: &str, value: Value) {
        self.map.insert(var.to_string(), value);
    }

    /// Resolve a term to a value; wildcards and unbound variables give None
    fn resolve(&self, term: &Term) -> Option<Value> {
        match term {
            Term::Var(var) => self.get(var).cloned(),
            Term::Const(value) => Some(value.clone()),
            Term::Wildcard => None,
        }
    }
}

/// Summary of one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Strata evaluated
    pub strata: usize,
    /// Fixpoint iterations summed over all strata
    pub iterations: usize,
    /// Tuples derived by rules; inputs and program facts are not counted
    pub derived_tuples: usize,
    /// Size of every relation after the run
    pub relation_sizes: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

/// One rule evaluation: the rule and, in semi-naive rounds, the body
/// position that reads the delta
type Unit<'r> = (&'r Rule, Option<usize>);

/// Datalog evaluator
pub struct Evaluator<'a> {
    program: &'a CompiledProgram,
    pool: Option<rayon::ThreadPool>,
}

impl<'a> Evaluator<'a> {
    /// Create a new evaluator; builds a worker pool unless configured for
    /// a single thread
    pub fn new(program: &'a CompiledProgram, config: &EngineConfig) -> Result<Self> {
        let pool = if config.is_parallel() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("dl-eval-{}", i))
                .build()
                .map_err(|e| HarnessError::Evaluation(format!("cannot start worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Evaluator { program, pool })
    }

    /// Evaluate the program to fixpoint.
    ///
    /// Derived (non-input) relations are recomputed from scratch; input
    /// relations keep their contents and receive the program's own facts.
    pub fn run(&self, db: &mut Database) -> Result<RunStats> {
        let start = Instant::now();

        for decl in self.program.declarations() {
            if !self.program.is_input(&decl.name) {
                if let Some(relation) = db.get_mut(&decl.name) {
                    relation.clear();
                }
            }
        }

        for (relation, tuple) in self.program.facts() {
            db.insert(relation, tuple.clone());
        }
        let before = db.total_tuples();

        let mut stats = RunStats {
            strata: self.program.strata().len(),
            ..Default::default()
        };

        for (index, stratum) in self.program.strata().iter().enumerate() {
            let iterations = self.run_stratum(stratum, db)?;
            tracing::debug!(
                "Stratum {} ({}) reached fixpoint after {} iteration(s)",
                index,
                stratum.relations.join(", "),
                iterations
            );
            stats.iterations += iterations;
        }

        stats.derived_tuples = db.total_tuples().saturating_sub(before);
        stats.relation_sizes = db.iter().map(|r| (r.name().to_string(), r.len())).collect();
        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Run one stratum to fixpoint, returning the number of iterations
    fn run_stratum(&self, stratum: &Stratum, db: &mut Database) -> Result<usize> {
        let units: Vec<Unit> = stratum.rules.iter().map(|r| (r, None)).collect();
        let empty = Database::new();
        let derived = self.eval_units(&units, db, &empty)?;

        if !stratum.recursive {
            for (relation, tuples) in derived {
                for tuple in tuples {
                    db.insert(&relation, tuple);
                }
            }
            return Ok(1);
        }

        let mut delta = self.delta_for(stratum);
        merge(db, &mut delta, derived);
        let mut iterations = 1;

        // Semi-naive loop: every recursive body atom takes a turn reading
        // only the tuples that are new since the previous round
        let units: Vec<Unit> = stratum
            .rules
            .iter()
            .flat_map(|rule| {
                rule.body()
                    .iter()
                    .enumerate()
                    .filter(|(_, lit)| lit.is_positive())
                    .filter(move |(_, lit)| lit.atom().map_or(false, |a| stratum.defines(a.predicate())))
                    .map(move |(pos, _)| (rule, Some(pos)))
            })
            .collect();

        while delta.total_tuples() > 0 {
            let derived = self.eval_units(&units, db, &delta)?;
            let mut next = self.delta_for(stratum);
            merge(db, &mut next, derived);
            delta = next;
            iterations += 1;
        }

        Ok(iterations)
    }

    fn delta_for(&self, stratum: &Stratum) -> Database {
        Database::from_declarations(
            stratum
                .relations
                .iter()
                .filter_map(|name| self.program.declaration(name)),
        )
    }

    fn eval_units(
        &self,
        units: &[Unit],
        full: &Database,
        delta: &Database,
    ) -> Result<Vec<(String, Vec<Tuple>)>> {
        let eval = |(rule, pos): &Unit| {
            self.eval_rule(rule, full, pos.map(|p| (p, delta)))
                .map(|tuples| (rule.head().predicate().to_string(), tuples))
        };

        match &self.pool {
            Some(pool) => pool.install(|| units.par_iter().map(eval).collect()),
            None => units.iter().map(eval).collect(),
        }
    }

    /// Evaluate one rule, reading body position `delta.0` from `delta.1`
    /// and everything else from `full`
    pub fn eval_rule(
        &self,
        rule: &Rule,
        full: &Database,
        delta: Option<(usize, &Database)>,
    ) -> Result<Vec<Tuple>> {
        let mut current = vec![Bindings::new()];

        for (index, literal) in rule.body().iter().enumerate() {
            let mut next = vec![];

            match literal {
                Literal::Positive(atom) => {
                    let source = match delta {
                        Some((pos, delta_db)) if pos == index => delta_db,
                        _ => full,
                    };
                    let relation = lookup(source, atom)?;
                    for bindings in &current {
                        for tuple in candidates(relation, atom, bindings) {
                            if let Some(matched) = match_atom(atom, tuple, bindings) {
                                next.push(matched);
                            }
                        }
                    }
                }
                Literal::Negative(atom) => {
                    // Negation: keep bindings for which the atom has no match
                    let relation = lookup(full, atom)?;
                    for bindings in current {
                        let exists = candidates(relation, atom, &bindings)
                            .any(|tuple| match_atom(atom, tuple, &bindings).is_some());
                        if !exists {
                            next.push(bindings);
                        }
                    }
                }
                Literal::Constraint(constraint) => {
                    for bindings in current {
                        if eval_constraint(constraint, &bindings)? {
                            next.push(bindings);
                        }
                    }
                }
            }

            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
            .iter()
            .map(|bindings| project_head(rule.head(), bindings))
            .collect()
    }
}

/// Insert derived tuples into `db`, recording the new ones in `delta`
fn merge(db: &mut Database, delta: &mut Database, derived: Vec<(String, Vec<Tuple>)>) {
    for (relation, tuples) in derived {
        for tuple in tuples {
            if db.insert(&relation, tuple.clone()) {
                delta.insert(&relation, tuple);
            }
        }
    }
}

fn lookup<'d>(db: &'d Database, atom: &Atom) -> Result<&'d Relation> {
    db.get(atom.predicate()).ok_or_else(|| {
        HarnessError::Evaluation(format!("relation {} is missing from storage", atom.predicate()))
    })
}

/// Tuples that can match `atom`: a prefix range when the first column is
/// already known, the whole relation otherwise
fn candidates<'r>(
    relation: &'r Relation,
    atom: &Atom,
    bindings: &Bindings,
) -> Box<dyn Iterator<Item = &'r Tuple> + 'r> {
    match atom.args().first().and_then(|t| bindings.resolve(t)) {
        Some(first) => Box::new(relation.with_first(first)),
        None => Box::new(relation.iter()),
    }
}

/// Match an atom against a tuple, extending the bindings on success
fn match_atom(atom: &Atom, tuple: &Tuple, bindings: &Bindings) -> Option<Bindings> {
    let mut fresh: Vec<(&str, &Value)> = Vec::new();

    for (term, value) in atom.args().iter().zip(tuple) {
        match term {
            Term::Wildcard => {}
            Term::Const(expected) => {
                if expected != value {
                    return None;
                }
            }
            Term::Var(var) => {
                let bound = bindings
                    .get(var)
                    .or_else(|| fresh.iter().find(|(name, _)| *name == var.as_str()).map(|(_, v)| *v));
                match bound {
                    Some(existing) if existing != value => return None,
                    Some(_) => {}
                    None => fresh.push((var.as_str(), value)),
                }
            }
        }
    }

    let mut result = bindings.clone();
    for (var, value) in fresh {
        result.set(var, value.clone());
    }
    Some(result)
}

fn resolve_bound(term: &Term, bindings: &Bindings) -> Result<Value> {
    bindings.resolve(term).ok_or_else(|| {
        HarnessError::Evaluation(format!("unbound term {:?} in constraint", term))
    })
}

/// Evaluate a comparison or string builtin under the given bindings
fn eval_constraint(constraint: &Constraint, bindings: &Bindings) -> Result<bool> {
    let left = resolve_bound(&constraint.left, bindings)?;
    let right = resolve_bound(&constraint.right, bindings)?;

    let ordering = || match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => Ok(a.cmp(b)),
        (Value::Symbol(a), Value::Symbol(b)) => Ok(a.cmp(b)),
        _ => Err(HarnessError::Evaluation(format!(
            "cannot compare {} with {}",
            left, right
        ))),
    };
    let symbols = || match (&left, &right) {
        (Value::Symbol(a), Value::Symbol(b)) => Ok((a.as_str(), b.as_str())),
        _ => Err(HarnessError::Evaluation(format!(
            "{} expects symbols, got {} and {}",
            constraint.op, left, right
        ))),
    };

    Ok(match constraint.op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => ordering()? == Ordering::Less,
        CompareOp::Le => ordering()? != Ordering::Greater,
        CompareOp::Gt => ordering()? == Ordering::Greater,
        CompareOp::Ge => ordering()? != Ordering::Less,
        CompareOp::Contains => {
            let (needle, haystack) = symbols()?;
            haystack.contains(needle)
        }
        CompareOp::StartsWith => {
            let (value, prefix) = symbols()?;
            value.starts_with(prefix)
        }
        CompareOp::Match => {
            let (pattern, value) = symbols()?;
            let regex = regex_lite::Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                HarnessError::Evaluation(format!("invalid pattern {:?}: {}", pattern, e))
            })?;
            regex.is_match(value)
        }
    })
}

/// Build the head tuple from the body bindings
fn project_head(head: &Atom, bindings: &Bindings) -> Result<Tuple> {
    head.args()
        .iter()
        .map(|term| {
            bindings.resolve(term).ok_or_else(|| {
                HarnessError::Evaluation(format!(
                    "head of {} has unbound term {:?}",
                    head.predicate(),
                    term
                ))
            })
        })
        .collect()
}
