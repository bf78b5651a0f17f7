//! End-to-end handle lifecycle over the bundled programs

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dlharness::{
    EngineConfig, HandleState, HarnessError, LogicProgram, ProgramFactory, ProgramRegistry,
    Result, RunStats, Tuple, Value,
};
use tempfile::tempdir;

const ACTED_IN: &str = "\
Al Pacino\tHeat
Carrie-Anne Moss\tThe Matrix
Keanu Reeves\tSpeed
Keanu Reeves\tThe Matrix
Robert De Niro\tHeat
Sandra Bullock\tSpeed
";

fn movie_input() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join("in")
}

fn registry() -> ProgramRegistry {
    ProgramRegistry::builtin().unwrap()
}

fn sym(s: &str) -> Value {
    Value::symbol(s)
}

#[test]
fn test_instantiate_then_dispose() {
    let registry = registry();
    for name in registry.names() {
        let mut handle = registry.instantiate(name).unwrap();
        assert_eq!(handle.state(), HandleState::Created);
        handle.dispose().unwrap();
        assert_eq!(handle.state(), HandleState::Disposed);
    }
}

#[test]
fn test_unknown_program() {
    let err = registry().instantiate("does-not-exist").unwrap_err();
    assert!(matches!(err, HarnessError::UnknownProgram(ref name) if name == "does-not-exist"));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_movies_scenario() {
    let out = tempdir().unwrap();
    let registry = registry();

    let mut movies = registry.instantiate("movies").unwrap();
    movies.load_all(movie_input()).unwrap();
    assert_eq!(movies.state(), HandleState::Loaded);

    let stats = movies.run().unwrap();
    assert_eq!(movies.state(), HandleState::Executed);
    assert_eq!(stats.relation_sizes["ActedIn"], 6);

    movies.print_all(out.path()).unwrap();
    assert_eq!(fs::read_to_string(out.path().join("ActedIn.csv")).unwrap(), ACTED_IN);
    // Only output relations are printed
    assert!(!out.path().join("Movie.csv").exists());

    movies.dispose().unwrap();
    assert!(matches!(
        movies.load_all(movie_input()),
        Err(HarnessError::UseAfterDispose { operation: "load_all" })
    ));
    assert!(matches!(movies.run(), Err(HarnessError::UseAfterDispose { .. })));
    assert!(matches!(
        movies.print_all(out.path()),
        Err(HarnessError::UseAfterDispose { .. })
    ));
    assert!(matches!(movies.dispose(), Err(HarnessError::UseAfterDispose { .. })));
}

#[test]
fn test_round_trip_is_deterministic() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let registry = registry();

    for out in [first.path(), second.path()] {
        registry
            .with_program("movies", |handle| {
                handle.load_all(movie_input())?;
                handle.run()?;
                handle.print_all(out)
            })
            .unwrap();
    }

    let a = fs::read(first.path().join("ActedIn.csv")).unwrap();
    let b = fs::read(second.path().join("ActedIn.csv")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_double_load_is_idempotent() {
    let once = tempdir().unwrap();
    let twice = tempdir().unwrap();
    let registry = registry();

    registry
        .with_program("movies", |handle| {
            handle.load_all(movie_input())?;
            handle.run()?;
            handle.print_all(once.path())
        })
        .unwrap();
    registry
        .with_program("movies", |handle| {
            handle.load_all(movie_input())?;
            handle.load_all(movie_input())?;
            handle.run()?;
            handle.print_all(twice.path())
        })
        .unwrap();

    assert_eq!(
        fs::read(once.path().join("ActedIn.csv")).unwrap(),
        fs::read(twice.path().join("ActedIn.csv")).unwrap()
    );
}

#[test]
fn test_run_before_load() {
    let out = tempdir().unwrap();
    let mut handle = registry().instantiate("movies").unwrap();

    let stats = handle.run().unwrap();
    assert_eq!(stats.derived_tuples, 0);
    assert_eq!(handle.state(), HandleState::Executed);

    handle.print_all(out.path()).unwrap();
    assert_eq!(fs::read_to_string(out.path().join("ActedIn.csv")).unwrap(), "");
    handle.dispose().unwrap();
}

#[test]
fn test_print_before_run_writes_current_contents() {
    let out = tempdir().unwrap();
    let mut handle = registry().instantiate("movies").unwrap();
    handle.load_all(movie_input()).unwrap();

    handle.print_all(out.path()).unwrap();
    assert_eq!(fs::read_to_string(out.path().join("ActedIn.csv")).unwrap(), "");
    assert_eq!(handle.state(), HandleState::Loaded);
    handle.dispose().unwrap();
}

#[test]
fn test_load_after_run_returns_to_loaded() {
    let input = tempdir().unwrap();
    fs::write(input.path().join("edge.facts"), "a\tb\n").unwrap();

    let mut handle = registry().instantiate("reachability").unwrap();
    handle.load_all(input.path()).unwrap();
    handle.run().unwrap();
    assert_eq!(handle.tuples("path").unwrap().len(), 1);

    fs::write(input.path().join("edge.facts"), "b\tc\n").unwrap();
    handle.load_all(input.path()).unwrap();
    assert_eq!(handle.state(), HandleState::Loaded);

    // Reloading adds to the inputs, run recomputes the closure over both
    handle.run().unwrap();
    assert_eq!(
        handle.tuples("path").unwrap(),
        vec![
            vec![sym("a"), sym("b")],
            vec![sym("a"), sym("c")],
            vec![sym("b"), sym("c")],
        ]
    );
    handle.dispose().unwrap();
}

#[test]
fn test_missing_input_directory() {
    let mut handle = registry().instantiate("movies").unwrap();
    let err = handle.load_all("/no/such/input/dir").unwrap_err();
    assert!(matches!(err, HarnessError::InputLoad { .. }));
    assert_eq!(err.exit_code(), 3);
    // A faulted handle is still disposable
    assert_eq!(handle.state(), HandleState::Created);
    handle.dispose().unwrap();
}

#[test]
fn test_missing_fact_file() {
    let input = tempdir().unwrap();
    fs::write(input.path().join("Movie.facts"), "1\tHeat\n").unwrap();

    let mut handle = registry().instantiate("movies").unwrap();
    let err = handle.load_all(input.path()).unwrap_err();
    match err {
        HarnessError::InputLoad { path, .. } => assert!(path.ends_with("Actor.facts")),
        other => panic!("unexpected error {:?}", other),
    }
    // Nothing from Movie.facts was committed
    assert!(handle.tuples("Movie").unwrap().is_empty());
    handle.dispose().unwrap();
}

#[test]
fn test_malformed_number_column() {
    let input = tempdir().unwrap();
    fs::write(input.path().join("Movie.facts"), "one\tHeat\n").unwrap();
    fs::write(input.path().join("Actor.facts"), "").unwrap();

    let mut handle = registry().instantiate("movies").unwrap();
    let err = handle.load_all(input.path()).unwrap_err();
    assert!(err.to_string().contains("line 1"), "{}", err);
    handle.dispose().unwrap();
}

#[test]
fn test_unwritable_output() {
    let scratch = tempdir().unwrap();
    let blocker = scratch.path().join("file");
    fs::write(&blocker, "not a directory").unwrap();

    let mut handle = registry().instantiate("movies").unwrap();
    handle.run().unwrap();
    let err = handle.print_all(blocker.join("out")).unwrap_err();
    assert!(matches!(err, HarnessError::OutputWrite { .. }));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(handle.state(), HandleState::Executed);
    handle.dispose().unwrap();
}

#[test]
fn test_print_creates_output_directory() {
    let scratch = tempdir().unwrap();
    let out = scratch.path().join("nested").join("out");

    registry()
        .with_program("movies", |handle| {
            handle.load_all(movie_input())?;
            handle.run()?;
            handle.print_all(&out)
        })
        .unwrap();
    assert_eq!(fs::read_to_string(out.join("ActedIn.csv")).unwrap(), ACTED_IN);
}

#[test]
fn test_orphans_program() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(
        input.path().join("node.facts"),
        "root\t50\na\t20\nb\t1\nc\t3\nlonely\t12\n",
    )
    .unwrap();
    fs::write(input.path().join("edge.facts"), "root\ta\na\tb\nb\ta\n").unwrap();

    registry()
        .with_program("orphans", |handle| {
            handle.load_all(input.path())?;
            handle.run()?;
            handle.print_all(out.path())
        })
        .unwrap();

    let read = |name: &str| fs::read_to_string(out.path().join(name)).unwrap();
    assert_eq!(read("orphan.csv"), "c\nlonely\nroot\n");
    assert_eq!(read("cyclic.csv"), "a\nb\n");
    // Custom delimiter from the output directive
    assert_eq!(read("heavy_orphan.csv"), "lonely,12\n");
}

#[test]
fn test_dump_inputs() {
    let mut handle = registry().instantiate("movies").unwrap();
    handle.insert("Movie", vec![Value::Number(7), sym("Ronin")]).unwrap();
    assert_eq!(handle.state(), HandleState::Loaded);

    let mut out = Vec::new();
    handle.dump_inputs(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "---------------\nMovie\n===============\n7\tRonin\n===============\n\
         ---------------\nActor\n===============\n===============\n"
    );
    handle.dispose().unwrap();
}

#[test]
fn test_relation_access() {
    let mut handle = registry().instantiate("movies").unwrap();
    assert_eq!(handle.relation_names().unwrap(), vec!["Movie", "Actor", "ActedIn"]);

    handle.insert("Movie", vec![Value::Number(1), sym("Heat")]).unwrap();
    handle.insert("Actor", vec![sym("Al Pacino"), Value::Number(1)]).unwrap();
    handle.run().unwrap();
    assert!(handle
        .contains("ActedIn", &vec![sym("Al Pacino"), sym("Heat")])
        .unwrap());

    let err = handle.insert("ActedIn", vec![sym("x"), sym("y")]).unwrap_err();
    assert_eq!(err.exit_code(), 8);
    let err = handle.insert("Movie", vec![sym("1"), sym("Heat")]).unwrap_err();
    assert!(matches!(err, HarnessError::InvalidTuple { .. }));
    let err = handle.tuples("Director").unwrap_err();
    assert!(matches!(err, HarnessError::UnknownRelation { .. }));
    handle.dispose().unwrap();
}

#[test]
fn test_printed_symbols_load_back() {
    // Output file doubles as the input of the next instance
    const COPY: &str = r#"
        .decl item(name: symbol, n: number)
        .input item
        .decl copy(name: symbol, n: number)
        .output copy(filename="item.facts")
        item("from\tsource", 0).
        copy(X, N) :- item(X, N).
    "#;

    let mut registry = ProgramRegistry::new();
    registry.register_source("copy", COPY).unwrap();
    let out = tempdir().unwrap();

    let symbols = ["a\tb", "line1\nline2", "back\\slash", "plain"];
    let mut expected = vec![vec![sym("from\tsource"), Value::Number(0)]];
    registry
        .with_program("copy", |handle| {
            for (i, s) in symbols.iter().enumerate() {
                let tuple = vec![sym(s), Value::Number(i as i64 + 1)];
                handle.insert("item", tuple.clone())?;
                expected.push(tuple);
            }
            handle.run()?;
            handle.print_all(out.path())
        })
        .unwrap();
    expected.sort();

    let reloaded = registry
        .with_program("copy", |handle| {
            handle.load_all(out.path())?;
            handle.run()?;
            handle.tuples("copy")
        })
        .unwrap();
    assert_eq!(reloaded, expected);
}

#[test]
fn test_threads_do_not_change_results() {
    let sequential = tempdir().unwrap();
    let parallel = tempdir().unwrap();

    for (threads, out) in [(1, sequential.path()), (4, parallel.path())] {
        registry()
            .with_config(EngineConfig::default().with_threads(threads))
            .with_program("movies", |handle| {
                handle.load_all(movie_input())?;
                handle.run()?;
                handle.print_all(out)
            })
            .unwrap();
    }

    assert_eq!(
        fs::read(sequential.path().join("ActedIn.csv")).unwrap(),
        fs::read(parallel.path().join("ActedIn.csv")).unwrap()
    );
}

#[test]
fn test_with_program_propagates_closure_error() {
    let err = registry()
        .with_program("movies", |handle| handle.load_all("/no/such/dir"))
        .unwrap_err();
    assert!(matches!(err, HarnessError::InputLoad { .. }));
}

// ============================================================================
// Fake registry entries
// ============================================================================

/// Records calls and releases instead of evaluating anything
struct FakeProgram {
    calls: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl LogicProgram for FakeProgram {
    fn name(&self) -> &str {
        "fake"
    }

    fn load_all(&mut self, _input_dir: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run(&mut self) -> Result<RunStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HarnessError::Evaluation("fake failure".into()))
    }

    fn print_all(&self, _output_dir: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn relation_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn tuples(&self, relation: &str) -> Result<Vec<Tuple>> {
        Err(HarnessError::UnknownRelation {
            program: "fake".into(),
            relation: relation.into(),
        })
    }

    fn contains(&self, _relation: &str, _tuple: &Tuple) -> Result<bool> {
        Ok(false)
    }

    fn insert(&mut self, relation: &str, _tuple: Tuple) -> Result<bool> {
        Err(HarnessError::NotAnInput(relation.into()))
    }

    fn dump_inputs(&self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn dump_outputs(&self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

impl Drop for FakeProgram {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeFactory {
    instantiated: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ProgramFactory for FakeFactory {
    fn name(&self) -> &str {
        "fake"
    }

    fn instantiate(&self, _config: &EngineConfig) -> Result<Box<dyn LogicProgram>> {
        self.instantiated.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeProgram {
            calls: Arc::clone(&self.calls),
            released: Arc::clone(&self.released),
        }))
    }
}

#[test]
fn test_fake_factory_lifecycle() {
    let factory = Arc::new(FakeFactory::default());
    let mut registry = ProgramRegistry::new();
    registry.register(factory.clone());
    assert_eq!(registry.names(), vec!["fake"]);

    let mut handle = registry.instantiate("fake").unwrap();
    handle.load_all("/anywhere").unwrap();
    assert_eq!(handle.state(), HandleState::Loaded);

    // A failed run keeps the previous state
    assert!(matches!(handle.run(), Err(HarnessError::Evaluation(_))));
    assert_eq!(handle.state(), HandleState::Loaded);

    handle.dispose().unwrap();
    assert_eq!(factory.released.load(Ordering::SeqCst), 1);

    // Nothing reaches the program after disposal
    assert!(handle.print_all("/anywhere").is_err());
    assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_drop_releases_undisposed_handle() {
    let factory = Arc::new(FakeFactory::default());
    let mut registry = ProgramRegistry::new();
    registry.register(factory.clone());

    {
        let _handle = registry.instantiate("fake").unwrap();
    }
    assert_eq!(factory.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_with_program_disposes_after_error() {
    let factory = Arc::new(FakeFactory::default());
    let mut registry = ProgramRegistry::new();
    registry.register(factory.clone());

    let err = registry
        .with_program("fake", |handle| handle.run())
        .unwrap_err();
    assert!(matches!(err, HarnessError::Evaluation(_)));
    assert_eq!(factory.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_name_allocates_nothing() {
    let factory = Arc::new(FakeFactory::default());
    let mut registry = ProgramRegistry::new();
    registry.register(factory.clone());

    for name in ["nope", "", "FAKE"] {
        assert!(matches!(
            registry.instantiate(name),
            Err(HarnessError::UnknownProgram(_))
        ));
    }
    assert_eq!(factory.instantiated.load(Ordering::SeqCst), 0);
    assert_eq!(factory.released.load(Ordering::SeqCst), 0);

    let mut handle = registry.instantiate("fake").unwrap();
    assert_eq!(factory.instantiated.load(Ordering::SeqCst), 1);
    handle.dispose().unwrap();
}
