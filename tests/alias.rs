// SPDX-License-Identifier: BSD-3-Clause

// To debug a test, run it with `--nocapture` and look at the `debug!` output,
// e.g. `eprintln!("{:#?}", results)`.

use std::time::Duration;

use spds::analysis::{BackwardResults, OneWeights, PathWeights, Status};
use spds::ir::{Arg, ConstDesc, Field, Local, MethodName, Program, ProgramBuilder, Statement};
use spds::nodes::{Node, State};
use spds::scope::{IncludeAll, RegexScope};
use spds::wpa::Transition;
use spds::{BackwardQuery, Boomerang, Error, ForwardQuery, Options};

// ------------------------------------------------------------------
// Helpers

fn stmt(program: &Program, method: &str, index: u32) -> Statement {
    program
        .method(&MethodName::new(method))
        .unwrap()
        .body()[index as usize]
        .clone()
}

fn local(method: &str, name: &str) -> Local {
    Local::new(MethodName::new(method), name)
}

fn query_for(program: &Program) -> BackwardQuery {
    let cs = program.calls_named("queryFor").next().unwrap().clone();
    BackwardQuery::for_invoke_arg(cs, 0).unwrap()
}

/// `Method:index` of each allocation site
fn sites(results: &BackwardResults) -> Vec<String> {
    results
        .allocation_sites
        .iter()
        .map(|q| format!("{:?}", q.node().stmt))
        .collect()
}

fn backward(program: &Program, options: Options) -> BackwardResults {
    let boomerang = Boomerang::new(program, &IncludeAll, &OneWeights, options);
    let results = boomerang.solve_backward(&query_for(program)).unwrap();
    assert!(!results.timed_out);
    results
}

fn check(program: &Program, expected: &[&str]) {
    let results = backward(program, Options::default());
    assert_eq!(sites(&results), expected);
}

// ------------------------------------------------------------------
// Tests

#[test]
fn direct_allocation() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.copy("b", "a");
    m.call(None, "Main.queryFor", &["b".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:0"]);
}

#[test]
fn field_sensitivity() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.new_object("b", "B");
    m.new_object("x", "X");
    m.new_object("y", "Y");
    m.store("x", "f", "a");
    m.store("y", "f", "b");
    m.load("t", "x", "f");
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:0"]);
}

#[test]
fn store_through_alias() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.new_object("x", "X");
    m.copy("y", "x");
    m.store("y", "f", "a");
    m.load("t", "x", "f");
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:0"]);
}

#[test]
fn context_sensitive_helper() {
    let mut p = ProgramBuilder::new();
    p.method("Main.wrap")
        .params(&["m", "v"])
        .vcall(None, "m", "put", &[Arg::str("key"), "v".into()]);
    let mut m = p.method("Main.main");
    m.new_object("m1", "HashMap");
    m.new_object("m2", "HashMap");
    m.new_object("a", "A");
    m.new_object("b", "B");
    m.call(None, "Main.wrap", &["m1".into(), "a".into()]);
    m.call(None, "Main.wrap", &["m2".into(), "b".into()]);
    m.vcall(Some("t"), "m1", "get", &[Arg::str("key")]);
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:2"]);
}

#[test]
fn map_keys() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("map", "HashMap");
    m.new_object("v", "A");
    m.new_object("w", "B");
    m.vcall(None, "map", "put", &[Arg::str("key"), "v".into()]);
    m.vcall(None, "map", "put", &[Arg::str("key2"), "w".into()]);
    m.vcall(Some("t"), "map", "get", &[Arg::str("key")]);
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:1"]);
}

#[test]
fn key_from_return() {
    let mut p = ProgramBuilder::new();
    {
        let mut k = p.method("Main.getKey");
        k.constant("k", ConstDesc::Str("KEY".into()));
        k.ret(Some("k".into()));
    }
    let mut m = p.method("Main.main");
    m.new_object("map", "HashMap");
    m.new_object("v", "A");
    m.new_object("w", "B");
    m.call(Some("k1"), "Main.getKey", &[]);
    m.vcall(None, "map", "put", &["k1".into(), "v".into()]);
    m.vcall(None, "map", "put", &[Arg::str("key2"), "w".into()]);
    m.call(Some("k2"), "Main.getKey", &[]);
    m.vcall(Some("t"), "map", "get", &["k2".into()]);
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:1"]);
}

#[test]
fn unknown_key_reads_every_entry() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.params(&["k"]);
    m.new_object("map", "HashMap");
    m.new_object("v", "A");
    m.new_object("w", "B");
    m.vcall(None, "map", "put", &[Arg::str("key"), "v".into()]);
    m.vcall(None, "map", "put", &[Arg::str("key2"), "w".into()]);
    m.vcall(Some("t"), "map", "get", &["k".into()]);
    m.call(None, "Main.queryFor", &["t".into()]);
    let program = p.build().unwrap();
    check(&program, &["Main.main:1", "Main.main:2"]);
}

#[test]
fn forward_field_write() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.new_object("x", "X");
    m.copy("y", "x");
    m.store("x", "f", "a");
    m.load("t", "y", "f");
    m.nop();
    let program = p.build().unwrap();

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.reaches(&Node::new(
        stmt(&program, "Main.main", 5),
        local("Main.main", "t")
    )));
    assert!(results.reaches(&Node::new(
        stmt(&program, "Main.main", 5),
        local("Main.main", "a")
    )));
    // Holds the object in a field only
    assert!(!results.reaches(&Node::new(
        stmt(&program, "Main.main", 5),
        local("Main.main", "x")
    )));
}

fn setter() -> Program {
    let mut p = ProgramBuilder::new();
    p.method("Box.set")
        .params(&["bx", "v"])
        .store("bx", "val", "v");
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.new_object("x", "X");
    m.copy("y", "x");
    m.call(None, "Box.set", &["x".into(), "a".into()]);
    m.load("t", "y", "val");
    m.call(None, "Main.queryFor", &["t".into()]);
    p.build().unwrap()
}

#[test]
fn field_write_in_callee() {
    let program = setter();
    check(&program, &["Main.main:0"]);

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.reaches(&Node::new(
        stmt(&program, "Main.main", 5),
        local("Main.main", "t")
    )));
}

#[test]
fn field_write_two_calls_deep() {
    let mut p = ProgramBuilder::new();
    p.method("Box.set")
        .params(&["bx", "v"])
        .store("bx", "val", "v");
    p.method("Box.wrap")
        .params(&["b", "w"])
        .call(None, "Box.set", &["b".into(), "w".into()]);
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.new_object("x", "X");
    m.copy("y", "x");
    m.call(None, "Box.wrap", &["x".into(), "a".into()]);
    m.load("t", "y", "val");
    m.nop();
    let program = p.build().unwrap();

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.reaches(&Node::new(
        stmt(&program, "Main.main", 5),
        local("Main.main", "t")
    )));
}

fn null_check() -> Program {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.if_eq("a", Arg::null(), 3);
    m.goto(5);
    m.copy("y", "a");
    m.nop();
    m.nop();
    p.build().unwrap()
}

#[test]
fn prunes_contradictory_paths() {
    let program = null_check();
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let y = Node::new(stmt(&program, "Main.main", 4), local("Main.main", "y"));
    let a = Node::new(stmt(&program, "Main.main", 2), local("Main.main", "a"));

    let options = Options {
        track_data_flow_path: true,
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &PathWeights, options);
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.reaches(&y));
    let path = results.data_flow_path(&y).unwrap();
    assert_eq!(path.last().map(|e| e.fact.clone()), Some(y.fact.clone()));

    let options = Options {
        track_data_flow_path: true,
        prune_contradictory_data_flow_path: true,
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &PathWeights, options);
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(!results.reaches(&y));
    assert!(results.reaches(&a));
}

#[test]
fn step_budget() {
    let program = null_check();
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let options = Options {
        max_steps: Some(1),
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, options);
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.timed_out);
    assert_eq!(results.status, Status::TimedOut);
    assert_eq!(results.stats.steps, 1);
}

#[test]
fn wall_clock_budget() {
    let program = null_check();
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let options = Options {
        timeout: Some(Duration::ZERO),
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, options);
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.timed_out);
    assert_eq!(results.status, Status::TimedOut);
    assert_eq!(results.stats.steps, 0);

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(!results.timed_out);
    assert_eq!(results.status, Status::Converged);
}

#[test]
fn automata_snapshot() {
    let program = null_check();
    let seed = Node::new(stmt(&program, "Main.main", 0), local("Main.main", "a"));
    let q = ForwardQuery::new(seed.stmt.clone(), seed.fact.clone()).unwrap();
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let results = boomerang.solve_forward(&q).unwrap();
    let automata = &results.automata;
    assert!(automata.reached.contains(&seed));
    assert!(automata.field_transitions.contains(&Transition::new(
        State::Located(seed.clone()),
        Field::Empty,
        automata.bottom.clone()
    )));

    // A late listener is told about every transition
    let mut calls = automata.call_automaton::<()>();
    calls.register_update_listener(());
    let mut seen = 0;
    while calls.poll().is_some() {
        seen += 1;
    }
    assert_eq!(seen, automata.call_transitions.len());
}

fn calls_dead_method() -> Program {
    let mut p = ProgramBuilder::new();
    p.method("Main.dead").params(&["p"]).nop();
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.call(None, "Main.dead", &["a".into()]);
    p.unreachable("Main.dead");
    p.build().unwrap()
}

#[test]
fn unsound() {
    let program = calls_dead_method();
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let err = boomerang.solve_forward(&q).unwrap_err();
    assert!(matches!(err, Error::Unsound { ref method, .. } if method.as_str() == "Main.dead"));

    let options = Options {
        check_assertions: false,
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, options);
    assert!(boomerang.solve_forward(&q).is_ok());
}

#[test]
fn malformed_queries() {
    let program = calls_dead_method();
    let call = stmt(&program, "Main.main", 1);
    assert!(matches!(
        ForwardQuery::new(call.clone(), local("Main.main", "a")),
        Err(Error::MalformedQuery(_))
    ));
    assert!(matches!(
        BackwardQuery::for_invoke_arg(call, 3),
        Err(Error::MalformedQuery(_))
    ));
}

#[test]
fn call_recursion() {
    let mut p = ProgramBuilder::new();
    p.method("Main.f")
        .params(&["p"])
        .call(None, "Main.g", &["p".into()]);
    p.method("Main.g")
        .params(&["q"])
        .call(None, "Main.f", &["q".into()]);
    let mut m = p.method("Main.main");
    m.new_object("a", "A");
    m.call(None, "Main.f", &["a".into()]);
    let program = p.build().unwrap();

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "a")).unwrap();
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.contains_call_recursion);
    assert!(!results.contains_field_loop);
    assert!(results.visited_methods.contains(&MethodName::new("Main.g")));
}

#[test]
fn field_loop() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("n", "N");
    let head = m.new_object("m", "N");
    m.store("m", "next", "n");
    m.copy("n", "m");
    m.if_ne("n", Arg::null(), head);
    let program = p.build().unwrap();

    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, Options::default());
    let q = ForwardQuery::new(stmt(&program, "Main.main", 0), local("Main.main", "n")).unwrap();
    let results = boomerang.solve_forward(&q).unwrap();
    assert!(results.contains_field_loop);
    assert!(!results.contains_call_recursion);
}

fn dispatch() -> Program {
    let mut p = ProgramBuilder::new();
    p.class("A", None)
        .class("B", None)
        .class("C", None)
        .class("D", None);
    p.method("A.id")
        .this("this")
        .params(&["p"])
        .ret(Some("p".into()));
    let mut b = p.method("B.id");
    b.this("this").params(&["p"]);
    b.new_object("q", "C");
    b.ret(Some("q".into()));
    let mut m = p.method("Main.main");
    m.new_object("o", "A");
    m.new_object("a", "D");
    m.vcall(Some("t"), "o", "id", &["a".into()]);
    m.call(None, "Main.queryFor", &["t".into()]);
    p.build().unwrap()
}

#[test]
fn on_the_fly_dispatch() {
    let program = dispatch();
    let options = Options {
        on_the_fly_call_graph: true,
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, options);
    let results = boomerang.solve_backward(&query_for(&program)).unwrap();
    assert_eq!(sites(&results), vec!["Main.main:1"]);
    let cs = stmt(&program, "Main.main", 2);
    assert_eq!(boomerang.callgraph().callees(&cs), vec![MethodName::new("A.id")]);
}

#[test]
fn class_hierarchy_dispatch() {
    let program = dispatch();
    check(&program, &["B.id:0", "Main.main:1"]);
}

fn library_call() -> Program {
    let mut p = ProgramBuilder::new();
    let mut l = p.method("Lib.make");
    l.new_object("r", "A");
    l.ret(Some("r".into()));
    let mut m = p.method("Main.main");
    m.call(Some("t"), "Lib.make", &[]);
    m.call(None, "Main.queryFor", &["t".into()]);
    p.build().unwrap()
}

#[test]
fn excluded_methods() {
    let program = library_call();
    check(&program, &["Lib.make:0"]);

    let scope = RegexScope::new([r"^Lib\."]).unwrap();
    let boomerang = Boomerang::new(&program, &scope, &OneWeights, Options::default());
    let results = boomerang.solve_backward(&query_for(&program)).unwrap();
    assert!(results.is_empty());
}

#[test]
fn aliases() {
    let mut p = ProgramBuilder::new();
    let mut m = p.method("Main.main");
    m.new_object("x", "A");
    m.copy("y", "x");
    m.new_object("h", "H");
    m.store("h", "g", "y");
    m.call(None, "Main.queryFor", &["x".into()]);
    let program = p.build().unwrap();

    let results = backward(&program, Options::default());
    let aliases: Vec<_> = results.aliases.iter().map(|a| a.to_string()).collect();
    assert_eq!(aliases, vec!["h.g", "x", "y"]);

    let options = Options {
        compute_aliases: false,
        ..Options::default()
    };
    assert!(backward(&program, options).aliases.is_empty());
}

#[test]
fn repeated_queries_agree() {
    let program = dispatch();
    let options = Options {
        on_the_fly_call_graph: true,
        ..Options::default()
    };
    let boomerang = Boomerang::new(&program, &IncludeAll, &OneWeights, options);
    let q = query_for(&program);
    let first = boomerang.solve_backward(&q).unwrap();
    let second = boomerang.solve_backward(&q).unwrap();
    assert_eq!(first.allocation_sites, second.allocation_sites);
    assert_eq!(first.aliases, second.aliases);
}
