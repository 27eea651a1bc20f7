/// Reverse trace behaviour against an in-memory caller store:
/// depth bound, exclusion, entry points, rendering and parallel expansion.

use calltrace::domain::builder::{TraceBuilder, TraceOptions};
use calltrace::domain::calltree::CallTree;
use calltrace::domain::exclusion::ExclusionFilter;
use calltrace::domain::render::{render_path, ReportStyle, TraceReport, TraceSection};
use calltrace::domain::store::{CallerStore, MemoryCallerStore};
use calltrace::domain::symbol::SymbolRef;
use calltrace::error::TraceError;

fn sym(path: &str) -> SymbolRef {
    SymbolRef::from_path(path)
}

/// Store from (caller, callee) pairs.
fn graph(edges: &[(&str, &str)]) -> MemoryCallerStore {
    let store = MemoryCallerStore::default();
    for (caller, callee) in edges {
        store.record_call(&sym(caller), &sym(callee)).unwrap();
    }
    store
}

fn entry_names(tree: &CallTree) -> Vec<String> {
    tree.entry_points()
        .map(|id| tree.node(id).symbol().display_name().to_string())
        .collect()
}

fn render(tree: &CallTree, target: &str) -> String {
    let mut report = TraceReport::new();
    report.push(TraceSection::from_tree(sym(target), tree, ReportStyle::Paths, false));
    report.to_string()
}

#[test]
fn test_recursion_hits_depth_bound() {
    let store = graph(&[("app::recurse", "app::recurse")]);
    let builder = TraceBuilder::default();
    match builder.build(sym("app::recurse"), &store) {
        Err(TraceError::DepthExceeded { max_depth, symbol }) => {
            assert_eq!(max_depth, 20);
            assert_eq!(symbol, "app::recurse");
        }
        other => panic!("expected DepthExceeded, got {:?}", other),
    }
}

#[test]
fn test_excluded_caller_and_its_callers_disappear() {
    let store = graph(&[
        ("app::x", "app::root"),
        ("app::y", "app::x"),
        ("app::z", "app::root"),
    ]);
    let builder = TraceBuilder::new(TraceOptions {
        exclusions: ExclusionFilter::from_patterns(["app::x"]),
        ..TraceOptions::default()
    });
    let tree = builder.build(sym("app::root"), &store).unwrap();
    let all: Vec<&str> = tree.iter().map(|(_, n)| n.symbol().display_name()).collect();
    assert_eq!(all, ["app::root", "app::z"]);
}

#[test]
fn test_entry_points_are_the_leaves() {
    // root <- A <- B ; root <- C
    let store = graph(&[("app::a", "app::root"), ("app::b", "app::a"), ("app::c", "app::root")]);
    let tree = TraceBuilder::default().build(sym("app::root"), &store).unwrap();
    assert_eq!(entry_names(&tree), ["app::b", "app::c"]);
}

#[test]
fn test_rendering_is_deterministic() {
    let edges = [
        ("app::a", "app::root"),
        ("app::b", "app::a"),
        ("app::c", "app::root"),
        ("app::b", "app::c"),
    ];
    let first = render(&TraceBuilder::default().build(sym("app::root"), &graph(&edges)).unwrap(), "app::root");
    let second = render(&TraceBuilder::default().build(sym("app::root"), &graph(&edges)).unwrap(), "app::root");
    assert_eq!(first, second);
}

#[test]
fn test_root_without_callers_is_its_own_entry_point() {
    let tree = TraceBuilder::default()
        .build(sym("app::lonely"), &MemoryCallerStore::default())
        .unwrap();
    assert_eq!(tree.len(), 1);
    let entries: Vec<_> = tree.entry_points().collect();
    assert_eq!(entries, [tree.root()]);
    assert_eq!(render_path(&tree, entries[0]), "app::lonely");
}

#[test]
fn test_main_helper_target_path() {
    let store = graph(&[("app::main", "app::helper"), ("app::helper", "app::target")]);
    let tree = TraceBuilder::default().build(sym("app::target"), &store).unwrap();
    assert_eq!(
        render(&tree, "app::target"),
        "Traces of app::target\napp::main\n  app::helper\n    app::target\n"
    );
}

#[test]
fn test_parallel_matches_sequential() {
    // Three layers of fan-in, with shared callers
    let mut edges = Vec::new();
    let names: Vec<String> = (0..4).map(|i| format!("app::l1_{}", i)).collect();
    let upper: Vec<String> = (0..4).map(|i| format!("app::l2_{}", i)).collect();
    for l1 in &names {
        edges.push((l1.clone(), "app::target".to_string()));
        for l2 in &upper {
            edges.push((l2.clone(), l1.clone()));
        }
    }
    let store = MemoryCallerStore::default();
    for (caller, callee) in &edges {
        store.record_call(&sym(caller), &sym(callee)).unwrap();
    }

    let sequential = TraceBuilder::default().build(sym("app::target"), &store).unwrap();
    let parallel = TraceBuilder::new(TraceOptions {
        parallel: true,
        ..TraceOptions::default()
    })
    .build(sym("app::target"), &store)
    .unwrap();

    assert_eq!(parallel.len(), 21);
    assert_eq!(render(&sequential, "app::target"), render(&parallel, "app::target"));
}

#[test]
fn test_parallel_reports_same_error() {
    let store = graph(&[
        ("app::ok", "app::target"),
        ("app::loop", "app::target"),
        ("app::loop", "app::loop"),
    ]);
    let options = TraceOptions {
        max_depth: 4,
        ..TraceOptions::default()
    };
    let sequential = TraceBuilder::new(options.clone())
        .build(sym("app::target"), &store)
        .unwrap_err();
    let parallel = TraceBuilder::new(TraceOptions {
        parallel: true,
        ..options
    })
    .build(sym("app::target"), &store)
    .unwrap_err();
    assert_eq!(sequential.to_string(), parallel.to_string());
}
