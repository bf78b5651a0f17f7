//! In-memory relation storage and fact file I/O

pub mod facts;

use std::collections::{BTreeMap, BTreeSet};

use crate::datalog::{ColumnType, Declaration, Tuple, Value};

pub use facts::{read_facts, write_relation, FactFile};

/// A named set of tuples with typed columns
///
/// Tuples are kept sorted so printing is deterministic.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    types: Vec<ColumnType>,
    tuples: BTreeSet<Tuple>,
}

impl Relation {
    pub fn new(name: &str, types: Vec<ColumnType>) -> Self {
        Relation {
            name: name.to_string(),
            types,
            tuples: BTreeSet::new(),
        }
    }

    pub fn from_declaration(decl: &Declaration) -> Self {
        Relation::new(&decl.name, decl.column_types())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.types.len()
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Insert a tuple. Returns true if it was not present.
    pub fn insert(&mut self, tuple: Tuple) -> bool {
        debug_assert_eq!(tuple.len(), self.arity(), "tuple arity mismatch");
        self.tuples.insert(tuple)
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.tuples.contains(tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter()
    }

    /// Tuples whose first column equals `first`, in order
    pub fn with_first(&self, first: Value) -> impl Iterator<Item = &Tuple> + '_ {
        self.tuples
            .range(vec![first.clone()]..)
            .take_while(move |t| t.first() == Some(&first))
    }

    pub fn clear(&mut self) {
        self.tuples.clear();
    }

    /// Check that a tuple fits this relation's arity and column types
    pub fn check_tuple(&self, tuple: &Tuple) -> Result<(), String> {
        if tuple.len() != self.arity() {
            return Err(format!(
                "expected {} columns, got {}",
                self.arity(),
                tuple.len()
            ));
        }
        for (i, (value, ty)) in tuple.iter().zip(&self.types).enumerate() {
            if value.column_type() != *ty {
                return Err(format!(
                    "column {} expects {}, got {}",
                    i,
                    ty.name(),
                    value.column_type().name()
                ));
            }
        }
        Ok(())
    }
}

/// All relations of one program instance, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Database {
    relations: BTreeMap<String, Relation>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    /// Empty relations for every declaration
    pub fn from_declarations<'a>(decls: impl IntoIterator<Item = &'a Declaration>) -> Self {
        let relations = decls
            .into_iter()
            .map(|d| (d.name.clone(), Relation::from_declaration(d)))
            .collect();
        Database { relations }
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.name().to_string(), relation);
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations.get_mut(name)
    }

    /// Insert into a named relation. Returns true if the tuple was new.
    /// Unknown relations are ignored.
    pub fn insert(&mut self, name: &str, tuple: Tuple) -> bool {
        self.relations
            .get_mut(name)
            .map(|r| r.insert(tuple))
            .unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// Total number of tuples across all relations
    pub fn total_tuples(&self) -> usize {
        self.relations.values().map(|r| r.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Relation {
        Relation::new("pair", vec![ColumnType::Symbol, ColumnType::Number])
    }

    #[test]
    fn test_insert_deduplicates() {
        let mut rel = pair();
        assert!(rel.insert(vec![Value::symbol("a"), Value::Number(1)]));
        assert!(!rel.insert(vec![Value::symbol("a"), Value::Number(1)]));
        assert_eq!(rel.len(), 1);
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut rel = pair();
        rel.insert(vec![Value::symbol("b"), Value::Number(2)]);
        rel.insert(vec![Value::symbol("a"), Value::Number(10)]);
        rel.insert(vec![Value::symbol("a"), Value::Number(9)]);

        let firsts: Vec<String> = rel.iter().map(|t| format!("{}{}", t[0], t[1])).collect();
        assert_eq!(firsts, vec!["a9", "a10", "b2"]);
    }

    #[test]
    fn test_with_first_prefix_range() {
        let mut rel = pair();
        rel.insert(vec![Value::symbol("a"), Value::Number(1)]);
        rel.insert(vec![Value::symbol("b"), Value::Number(1)]);
        rel.insert(vec![Value::symbol("b"), Value::Number(2)]);
        rel.insert(vec![Value::symbol("c"), Value::Number(3)]);

        let hits: Vec<&Tuple> = rel.with_first(Value::symbol("b")).collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|t| t[0] == Value::symbol("b")));
        assert_eq!(rel.with_first(Value::symbol("z")).count(), 0);
    }

    #[test]
    fn test_check_tuple() {
        let rel = pair();
        assert!(rel.check_tuple(&vec![Value::symbol("a"), Value::Number(1)]).is_ok());
        assert!(rel.check_tuple(&vec![Value::symbol("a")]).is_err());
        assert!(rel.check_tuple(&vec![Value::Number(1), Value::Number(1)]).is_err());
    }

    #[test]
    fn test_database_ignores_unknown_relation() {
        let mut db = Database::new();
        db.add_relation(pair());
        assert!(!db.insert("missing", vec![]));
        assert!(db.insert("pair", vec![Value::symbol("x"), Value::Number(0)]));
        assert_eq!(db.total_tuples(), 1);
    }
}
