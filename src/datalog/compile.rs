//! Program compilation: validation, type checking and stratification
//!
//! A parsed [`Program`] becomes a [`CompiledProgram`] once every relation it
//! mentions is declared, all constants and variables agree with the declared
//! column types, every rule is safe and negation is stratified. Strata are the
//! strongly connected components of the predicate dependency graph, listed
//! dependencies first.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::datalog::types::*;
use crate::error::{HarnessError, Result};

/// Rules evaluated together to a fixpoint
#[derive(Debug, Clone)]
pub struct Stratum {
    /// Relations defined in this stratum
    pub relations: Vec<String>,
    /// Rules whose head is one of `relations` (body reordered, positives first)
    pub rules: Vec<Rule>,
    /// Whether any rule depends on a relation of the same stratum
    pub recursive: bool,
}

impl Stratum {
    pub fn defines(&self, relation: &str) -> bool {
        self.relations.iter().any(|r| r == relation)
    }
}

/// A validated program ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    name: String,
    declarations: Vec<Declaration>,
    inputs: Vec<IoDirective>,
    outputs: Vec<IoDirective>,
    facts: Vec<(String, Tuple)>,
    strata: Vec<Stratum>,
}

impl CompiledProgram {
    /// Parse and compile Datalog source
    pub fn from_source(name: &str, source: &str) -> Result<Self> {
        let program = crate::datalog::parse_program(source).map_err(|e| HarnessError::Compile {
            program: name.to_string(),
            reason: e.to_string(),
        })?;
        Self::compile(name, &program)
    }

    /// Validate `program` and compute its evaluation strata
    pub fn compile(name: &str, program: &Program) -> Result<Self> {
        let fail = |reason: String| HarnessError::Compile {
            program: name.to_string(),
            reason,
        };

        let mut seen = HashSet::new();
        for decl in program.declarations() {
            if !seen.insert(decl.name.as_str()) {
                return Err(fail(format!("relation {} declared twice", decl.name)));
            }
        }

        let (inputs, outputs) = check_directives(program).map_err(&fail)?;

        let mut facts = Vec::new();
        let mut rules = Vec::new();
        for rule in program.rules() {
            check_rule(program, rule).map_err(&fail)?;
            if rule.is_fact() {
                let tuple = rule
                    .head()
                    .args()
                    .iter()
                    .filter_map(|t| t.const_value().cloned())
                    .collect();
                facts.push((rule.head().predicate().to_string(), tuple));
            } else {
                rules.push(rule.positives_first());
            }
        }

        let strata = stratify(program.declarations(), &rules).map_err(&fail)?;

        tracing::debug!(
            "Compiled program {}: {} relations, {} rules, {} facts, {} strata",
            name,
            program.declarations().len(),
            rules.len(),
            facts.len(),
            strata.len()
        );

        Ok(CompiledProgram {
            name: name.to_string(),
            declarations: program.declarations().to_vec(),
            inputs,
            outputs,
            facts,
            strata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn declaration(&self, relation: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == relation)
    }

    /// `.input` directives in declaration order
    pub fn inputs(&self) -> &[IoDirective] {
        &self.inputs
    }

    /// `.output` directives in declaration order
    pub fn outputs(&self) -> &[IoDirective] {
        &self.outputs
    }

    pub fn is_input(&self, relation: &str) -> bool {
        self.inputs.iter().any(|d| d.relation == relation)
    }

    pub fn is_output(&self, relation: &str) -> bool {
        self.outputs.iter().any(|d| d.relation == relation)
    }

    /// Ground facts written in the program source
    pub fn facts(&self) -> &[(String, Tuple)] {
        &self.facts
    }

    pub fn strata(&self) -> &[Stratum] {
        &self.strata
    }
}

fn check_directives(program: &Program) -> std::result::Result<(Vec<IoDirective>, Vec<IoDirective>), String> {
    let mut inputs: Vec<IoDirective> = Vec::new();
    let mut outputs: Vec<IoDirective> = Vec::new();

    for directive in program.directives() {
        if program.declaration(&directive.relation).is_none() {
            return Err(format!("directive for undeclared relation {}", directive.relation));
        }
        let list = match directive.kind {
            IoKind::Input => &mut inputs,
            IoKind::Output => &mut outputs,
        };
        if list.iter().any(|d| d.relation == directive.relation) {
            return Err(format!("duplicate {:?} directive for {}", directive.kind, directive.relation));
        }
        list.push(directive.clone());
    }

    // Keep declaration order so loading and printing are deterministic
    let order = |d: &IoDirective| {
        program
            .declarations()
            .iter()
            .position(|decl| decl.name == d.relation)
    };
    inputs.sort_by_key(order);
    outputs.sort_by_key(order);

    Ok((inputs, outputs))
}

fn term_type(term: &Term, var_types: &HashMap<String, ColumnType>) -> Option<ColumnType> {
    match term {
        Term::Var(v) => var_types.get(v).copied(),
        Term::Const(value) => Some(value.column_type()),
        Term::Wildcard => None,
    }
}

/// Check an atom against its declaration; when `bind` is set, record the
/// types of its variables.
fn check_atom(
    program: &Program,
    atom: &Atom,
    var_types: &mut HashMap<String, ColumnType>,
    bind: bool,
) -> std::result::Result<(), String> {
    let decl = program
        .declaration(atom.predicate())
        .ok_or_else(|| format!("undeclared relation {}", atom.predicate()))?;

    if decl.arity() != atom.arity() {
        return Err(format!(
            "{} has arity {}, used with {} arguments",
            decl.name,
            decl.arity(),
            atom.arity()
        ));
    }

    for (term, attr) in atom.args().iter().zip(&decl.attributes) {
        match term {
            Term::Const(value) if value.column_type() != attr.ty => {
                return Err(format!(
                    "{}.{} is a {}, got constant {}",
                    decl.name,
                    attr.name,
                    attr.ty.name(),
                    value
                ));
            }
            Term::Var(v) => match var_types.get(v) {
                Some(ty) if *ty != attr.ty => {
                    return Err(format!(
                        "variable {} used as {} and as {} ({}.{})",
                        v,
                        ty.name(),
                        attr.ty.name(),
                        decl.name,
                        attr.name
                    ));
                }
                None if bind => {
                    var_types.insert(v.clone(), attr.ty);
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(())
}

fn check_constraint(
    constraint: &Constraint,
    var_types: &HashMap<String, ColumnType>,
) -> std::result::Result<(), String> {
    if constraint.left.is_wildcard() || constraint.right.is_wildcard() {
        return Err(format!("wildcard in constraint {}", constraint.op));
    }

    let left = term_type(&constraint.left, var_types);
    let right = term_type(&constraint.right, var_types);

    if constraint.op.is_string_op() {
        if left != Some(ColumnType::Symbol) || right != Some(ColumnType::Symbol) {
            return Err(format!("{} expects two symbols", constraint.op));
        }
    } else if left != right {
        return Err(format!("operands of {} have different types", constraint.op));
    }

    if constraint.op == CompareOp::Match {
        if let Term::Const(Value::Symbol(pattern)) = &constraint.left {
            regex_lite::Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| format!("invalid pattern {:?}: {}", pattern, e))?;
        }
    }

    Ok(())
}

fn check_rule(program: &Program, rule: &Rule) -> std::result::Result<(), String> {
    if !rule.is_safe() {
        return Err(format!(
            "unsafe rule for {}: every head, negated and constraint variable must appear in a positive body atom",
            rule.head().predicate()
        ));
    }

    let mut var_types = HashMap::new();
    for literal in rule.body() {
        if let Literal::Positive(atom) = literal {
            check_atom(program, atom, &mut var_types, true)?;
        }
    }
    for literal in rule.body() {
        match literal {
            Literal::Negative(atom) => check_atom(program, atom, &mut var_types, false)?,
            Literal::Constraint(c) => check_constraint(c, &var_types)?,
            Literal::Positive(_) => {}
        }
    }
    check_atom(program, rule.head(), &mut var_types, false)
}

/// Group rules into strata ordered so every stratum only reads relations
/// completed by earlier strata (or itself, positively).
fn stratify(declarations: &[Declaration], rules: &[Rule]) -> std::result::Result<Vec<Stratum>, String> {
    let mut graph: DiGraph<&str, bool> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = declarations
        .iter()
        .map(|d| (d.name.as_str(), graph.add_node(d.name.as_str())))
        .collect();

    // Edge body -> head, weighted with "negated"
    for rule in rules {
        let head = nodes[rule.head().predicate()];
        for literal in rule.body() {
            if let Some(atom) = literal.atom() {
                graph.add_edge(nodes[atom.predicate()], head, literal.is_negative());
            }
        }
    }

    // tarjan_scc yields components in reverse topological order
    let mut components = tarjan_scc(&graph);
    components.reverse();

    let mut strata = Vec::new();
    for component in components {
        let members: HashSet<NodeIndex> = component.iter().copied().collect();

        let mut recursive = false;
        for edge in graph.edge_indices() {
            let Some((src, dst)) = graph.edge_endpoints(edge) else {
                continue;
            };
            if members.contains(&src) && members.contains(&dst) {
                if graph[edge] {
                    return Err(format!(
                        "negation of {} inside a recursive cycle through {}",
                        graph[src], graph[dst]
                    ));
                }
                recursive = true;
            }
        }

        let mut relations: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
        relations.sort();
        let stratum_rules: Vec<Rule> = rules
            .iter()
            .filter(|r| relations.iter().any(|name| name == r.head().predicate()))
            .cloned()
            .collect();

        if !stratum_rules.is_empty() {
            strata.push(Stratum {
                relations,
                rules: stratum_rules,
                recursive,
            });
        }
    }

    Ok(strata)
}
