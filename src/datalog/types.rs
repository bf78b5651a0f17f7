//! Core Datalog types: Value, Term, Atom, Literal, Rule, Declaration, Program

use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Column type of a declared relation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Signed 64-bit integer
    Number,
    /// Interned-free string
    Symbol,
}

impl ColumnType {
    /// Resolve a type name used in `.decl`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(ColumnType::Number),
            "symbol" => Some(ColumnType::Symbol),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Number => "number",
            ColumnType::Symbol => "symbol",
        }
    }

    /// Parse a raw field (from a fact file) into a value of this type
    pub fn parse_value(&self, raw: &str) -> Option<Value> {
        match self {
            ColumnType::Number => raw.trim().parse::<i64>().ok().map(Value::Number),
            ColumnType::Symbol => Some(Value::Symbol(raw.to_string())),
        }
    }
}

/// A value stored in a relation
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Number(i64),
    Symbol(String),
}

impl Value {
    pub fn symbol(s: &str) -> Self {
        Value::Symbol(s.to_string())
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Number(_) => ColumnType::Number,
            Value::Symbol(_) => ColumnType::Symbol,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// A row of a relation
pub type Tuple = Vec<Value>;

/// A term in Datalog - variable, constant, or wildcard
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// Variable (starts with uppercase, e.g., X, Y, Movie)
    Var(String),
    /// Constant (symbol or number)
    Const(Value),
    /// Wildcard (_) - matches anything, not captured
    Wildcard,
}

impl Term {
    /// Create a variable term
    pub fn var(name: &str) -> Self {
        Term::Var(name.to_string())
    }

    /// Create a symbol constant term
    pub fn constant(value: &str) -> Self {
        Term::Const(Value::symbol(value))
    }

    /// Create a number constant term
    pub fn number(value: i64) -> Self {
        Term::Const(Value::Number(value))
    }

    /// Create a wildcard term
    pub fn wildcard() -> Self {
        Term::Wildcard
    }

    /// Check if this term is a variable
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// Check if this term is a constant
    pub fn is_const(&self) -> bool {
        matches!(self, Term::Const(_))
    }

    /// Check if this term is a wildcard
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Term::Wildcard)
    }

    /// Get variable name if this is a variable
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Get constant value if this is a constant
    pub fn const_value(&self) -> Option<&Value> {
        match self {
            Term::Const(value) => Some(value),
            _ => None,
        }
    }
}

/// An atom (predicate with arguments)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Atom {
    predicate: String,
    args: Vec<Term>,
}

impl Atom {
    /// Create a new atom
    pub fn new(predicate: &str, args: Vec<Term>) -> Self {
        Atom {
            predicate: predicate.to_string(),
            args,
        }
    }

    /// Get predicate name
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Get arguments
    pub fn args(&self) -> &[Term] {
        &self.args
    }

    /// Get arity (number of arguments)
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Get all variable names in this atom
    pub fn variables(&self) -> HashSet<String> {
        self.args
            .iter()
            .filter_map(|t| t.var_name().map(|s| s.to_string()))
            .collect()
    }

    /// Check if atom is ground (no variables or wildcards)
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| t.is_const())
    }
}

/// Binary constraint operator, including the string builtins
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// contains(Needle, Haystack)
    Contains,
    /// starts_with(String, Prefix)
    StartsWith,
    /// match(Pattern, String) - whole-string regex match
    Match,
}

impl CompareOp {
    /// Builtin predicate name, if this operator is written in call form
    pub fn from_builtin(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(CompareOp::Contains),
            "starts_with" => Some(CompareOp::StartsWith),
            "match" => Some(CompareOp::Match),
            _ => None,
        }
    }

    /// Whether both operands must be symbols
    pub fn is_string_op(&self) -> bool {
        matches!(self, CompareOp::Contains | CompareOp::StartsWith | CompareOp::Match)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Contains => "contains",
            CompareOp::StartsWith => "starts_with",
            CompareOp::Match => "match",
        };
        f.write_str(s)
    }
}

/// A constraint between two terms, e.g. `X != Y` or `contains("a", X)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub op: CompareOp,
    pub left: Term,
    pub right: Term,
}

impl Constraint {
    pub fn new(op: CompareOp, left: Term, right: Term) -> Self {
        Constraint { op, left, right }
    }

    pub fn variables(&self) -> HashSet<String> {
        [&self.left, &self.right]
            .iter()
            .filter_map(|t| t.var_name().map(|s| s.to_string()))
            .collect()
    }
}

/// A body literal - positive or negative atom, or a constraint
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Positive(Atom),
    Negative(Atom),
    Constraint(Constraint),
}

impl Literal {
    /// Create a positive literal
    pub fn positive(atom: Atom) -> Self {
        Literal::Positive(atom)
    }

    /// Create a negative literal
    pub fn negative(atom: Atom) -> Self {
        Literal::Negative(atom)
    }

    /// Check if positive
    pub fn is_positive(&self) -> bool {
        matches!(self, Literal::Positive(_))
    }

    /// Check if negative
    pub fn is_negative(&self) -> bool {
        matches!(self, Literal::Negative(_))
    }

    /// Get the underlying atom (None for constraints)
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Literal::Positive(a) | Literal::Negative(a) => Some(a),
            Literal::Constraint(_) => None,
        }
    }

    /// Get all variable names in this literal
    pub fn variables(&self) -> HashSet<String> {
        match self {
            Literal::Positive(a) | Literal::Negative(a) => a.variables(),
            Literal::Constraint(c) => c.variables(),
        }
    }
}

/// A Datalog rule: head :- body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    head: Atom,
    body: Vec<Literal>,
}

impl Rule {
    /// Create a new rule with head and body
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Rule { head, body }
    }

    /// Create a fact (rule with empty body)
    pub fn fact(head: Atom) -> Self {
        Rule {
            head,
            body: Vec::new(),
        }
    }

    /// Get the head atom
    pub fn head(&self) -> &Atom {
        &self.head
    }

    /// Get the body literals
    pub fn body(&self) -> &[Literal] {
        &self.body
    }

    /// Check if this is a fact (empty body)
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Get variables that appear in positive body literals
    pub fn positive_body_variables(&self) -> HashSet<String> {
        self.body
            .iter()
            .filter(|l| l.is_positive())
            .flat_map(|l| l.variables())
            .collect()
    }

    /// Check if rule is safe: head, negated and constraint variables all
    /// appear in positive body literals, and the head has no wildcards.
    /// Facts must be ground.
    pub fn is_safe(&self) -> bool {
        if self.is_fact() {
            return self.head.is_ground();
        }
        if self.head.args().iter().any(|t| t.is_wildcard()) {
            return false;
        }

        let positive_vars = self.positive_body_variables();

        self.head.variables().iter().all(|v| positive_vars.contains(v))
            && self
                .body
                .iter()
                .filter(|l| !l.is_positive())
                .flat_map(|l| l.variables())
                .all(|v| positive_vars.contains(&v))
    }

    /// Same rule with positive atoms moved in front of negations and
    /// constraints (relative order otherwise preserved)
    pub fn positives_first(&self) -> Rule {
        let (mut body, rest): (Vec<_>, Vec<_>) =
            self.body.iter().cloned().partition(|l| l.is_positive());
        body.extend(rest);
        Rule::new(self.head.clone(), body)
    }
}

/// A typed column of a relation declaration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub ty: ColumnType,
}

/// `.decl Name(col: type, ...)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Declaration {
    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.attributes.iter().map(|a| a.ty).collect()
    }
}

/// Direction of an I/O directive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoKind {
    Input,
    Output,
}

/// `.input Name(key="value", ...)` or `.output Name(...)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoDirective {
    pub kind: IoKind,
    pub relation: String,
    pub params: BTreeMap<String, String>,
}

impl IoDirective {
    pub fn new(kind: IoKind, relation: &str) -> Self {
        IoDirective {
            kind,
            relation: relation.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// File name inside the fact/output directory
    pub fn filename(&self) -> String {
        match self.params.get("filename") {
            Some(name) => name.clone(),
            None => match self.kind {
                IoKind::Input => format!("{}.facts", self.relation),
                IoKind::Output => format!("{}.csv", self.relation),
            },
        }
    }

    /// Column delimiter, tab unless overridden
    pub fn delimiter(&self) -> String {
        self.params
            .get("delimiter")
            .cloned()
            .unwrap_or_else(|| "\t".to_string())
    }
}

/// A Datalog program - declarations, I/O directives and rules
#[derive(Clone, Debug, Default)]
pub struct Program {
    declarations: Vec<Declaration>,
    directives: Vec<IoDirective>,
    rules: Vec<Rule>,
}

impl Program {
    pub fn with_parts(
        declarations: Vec<Declaration>,
        directives: Vec<IoDirective>,
        rules: Vec<Rule>,
    ) -> Self {
        Program {
            declarations,
            directives,
            rules,
        }
    }

    /// Get all rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn directives(&self) -> &[IoDirective] {
        &self.directives
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }
}
