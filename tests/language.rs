//! Source-level scenarios run through the full lexer → parser → evaluator
//! pipeline with captured output.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use indoc::indoc;
use runevm::{OutputSink, RuneVm, RuntimeError, Value, VmError};

fn capture_vm() -> (RuneVm, Rc<RefCell<Vec<u8>>>) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let sink: OutputSink = buffer.clone();
    (RuneVm::with_output(sink), buffer)
}

fn run(source: &str) -> String {
    let (mut vm, buffer) = capture_vm();
    vm.run(source, "main.rune").expect("run failed");
    let output = buffer.borrow().clone();
    String::from_utf8(output).expect("script output should be utf-8")
}

fn run_err(source: &str) -> VmError {
    let (mut vm, _) = capture_vm();
    vm.run(source, "main.rune").expect_err("expected failure")
}

#[test]
fn arithmetic_and_coercion() {
    let output = run("println(1 + 2) println(3 / 2) println(4 / 2)");
    assert_eq!(output, "3\n1.5\n2\n");
}

#[test]
fn closures_count_over_a_captured_variable() {
    let output = run(indoc! {r#"
        counter = fun() { n = 0 fun() { n = n + 1 n } }
        c = counter()
        println(c()) println(c()) println(c())
    "#});
    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn independent_closures_do_not_share_state() {
    let output = run(indoc! {r#"
        counter = fun() { n = 0 fun() { n = n + 1 n } }
        a = counter()
        b = counter()
        println(a()) println(a()) println(b())
    "#});
    assert_eq!(output, "1\n2\n1\n");
}

#[test]
fn table_field_assignment_and_method_call() {
    let output = run(indoc! {r#"
        person = table { "name": "Ada", "hello": fun(self) { println(self.name) } }
        person.hello()
        person.name = "Grace"
        person.hello()
    "#});
    assert_eq!(output, "Ada\nGrace\n");
}

#[test]
fn if_elif_else_chain() {
    let output =
        run(r#"x = 5 if x < 0 { println("neg") } elif x == 0 { println("zero") } else { println("pos") }"#);
    assert_eq!(output, "pos\n");
}

#[test]
fn break_and_continue() {
    let output = run(indoc! {r#"
        i = 0
        while i < 5 { i = i + 1 if i == 3 { continue } if i == 5 { break } println(i) }
    "#});
    assert_eq!(output, "1\n2\n4\n");
}

#[test]
fn array_aliasing_versus_new() {
    let output = run(indoc! {r#"
        a = array { 1, 2, 3 }
        b = a
        c = new(a)
        b = append(b, 4)
        c = append(c, 9)
        println(len(a)) println(len(b)) println(len(c))
    "#});
    assert_eq!(output, "3\n4\n4\n");
}

#[test]
fn containers_alias_until_copied() {
    let output = run(indoc! {r#"
        t = table { "x": 1 }
        alias = t
        copy = new(t)
        alias.x = 5
        copy.x = 9
        println(t.x) println(copy.x)

        a = array { 1 }
        b = a
        b[0] = 7
        println(a[0])
    "#});
    assert_eq!(output, "5\n9\n7\n");
}

#[test]
fn zero_and_empty_string_are_truthy_in_if() {
    let output = run(indoc! {r#"
        if 0 { println("zero is truthy") }
        if "" then println("empty is truthy")
        if false { println("unreachable") } else { println("false is falsy") }
    "#});
    assert_eq!(output, "zero is truthy\nempty is truthy\nfalse is falsy\n");
}

#[test]
fn double_negation_matches_boolean_coercion() {
    let output = run(indoc! {r#"
        println(not not 5)
        println(not not "false")
        println(not not true)
    "#});
    assert_eq!(output, "true\nfalse\ntrue\n");
}

#[test]
fn recursion_guard_reports_a_diagnostic() {
    let (mut vm, _) = capture_vm();
    vm.set_recursion_limit(48);
    let err = vm
        .run("f = fun() f() f()", "main.rune")
        .expect_err("expected depth failure");
    assert_eq!(
        err.to_string(),
        "maximum recursion depth exceeded"
    );
}

#[test]
fn diagnostics_carry_file_line_and_column() {
    let err = run_err("x = 1\nmissing");
    assert_eq!(err.render(), "error (main.rune:2:1): Undefined variable 'missing'");

    let err = run_err("x = §");
    assert!(err.render().starts_with("error [main.rune:1:5]:"));
}

#[test]
fn while_condition_must_be_a_boolean() {
    let err = run_err("while 1 { break }");
    assert!(matches!(
        err,
        VmError::Runtime(RuntimeError::ExpectedBool { .. })
    ));
}

#[test]
fn assert_builtin_fails_the_run() {
    let err = run_err(r#"assert(1 == 2, "math broke")"#);
    assert!(matches!(
        err,
        VmError::Runtime(RuntimeError::NativeCall { ref message, .. })
            if message == "assertion failed: math broke"
    ));
    assert_eq!(run(r#"println(assert(1 == 1))"#), "true\n");
}

#[test]
fn string_builtins_compose_in_scripts() {
    let output = run(indoc! {r#"
        parts = strsplit("a,b,c", ",")
        println(len(parts))
        println(parts[1])
        println(strupper(strtrim("  ada ")))
        println(typeof(parts), " ", typeof("x"), " ", typeof(1.5))
    "#});
    assert_eq!(output, "3\nb\nADA\narray string float\n");
}

#[test]
fn top_level_return_stops_the_program() {
    let output = run(indoc! {r#"
        println("before")
        return = 0
        println("after")
    "#});
    assert_eq!(output, "before\n");
}

struct ImportFixture {
    dir: PathBuf,
}

impl ImportFixture {
    fn new(tag: &str, files: &[(&str, &str)]) -> Self {
        let dir = std::env::temp_dir().join(format!("runevm-import-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create import fixture dir");
        for (name, source) in files {
            fs::write(dir.join(format!("{name}.rune")), source).expect("write import fixture");
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.join(name).to_string_lossy().into_owned()
    }
}

impl Drop for ImportFixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn import_extends_the_importing_scope() {
    let fixture = ImportFixture::new(
        "scope",
        &[("lib", "greet = fun(name) { println(\"hi \", name) } base = 40")],
    );
    let source = format!(
        "import \"{}\"\ngreet(\"ada\")\nprintln(base + 2)",
        fixture.path("lib")
    );
    let (mut vm, buffer) = capture_vm();
    vm.run(&source, "main.rune").expect("run failed");
    let output = buffer.borrow().clone();
    assert_eq!(String::from_utf8(output).expect("utf-8"), "hi ada\n42\n");
}

#[test]
fn duplicate_import_is_fatal() {
    let fixture = ImportFixture::new("dup", &[("lib", "x = 1")]);
    let source = format!(
        "import \"{0}\"\nimport \"{0}\"",
        fixture.path("lib")
    );
    let (mut vm, _) = capture_vm();
    let err = vm.run(&source, "main.rune").expect_err("expected failure");
    assert!(matches!(
        err,
        VmError::Runtime(RuntimeError::DuplicateImport { .. })
    ));
}

#[test]
fn missing_import_file_is_fatal() {
    let err = run_err("import \"definitely/not/here\"");
    assert!(matches!(
        err,
        VmError::Runtime(RuntimeError::ImportFailed { ref path, .. })
            if path == "definitely/not/here.rune"
    ));
}

#[test]
fn parse_errors_in_imported_files_point_at_the_imported_file() {
    let fixture = ImportFixture::new("bad", &[("broken", "x = ")]);
    let source = format!("import \"{}\"", fixture.path("broken"));
    let (mut vm, _) = capture_vm();
    let err = vm.run(&source, "main.rune").expect_err("expected failure");
    assert!(err.render().contains("broken.rune"));
}

#[test]
fn imported_state_is_shared_with_the_host() {
    let fixture = ImportFixture::new("host", &[("config", "answer = 42")]);
    let source = format!("import \"{}\"", fixture.path("config"));
    let (mut vm, _) = capture_vm();
    vm.run(&source, "main.rune").expect("run failed");
    assert_eq!(vm.get_int("answer").expect("int"), 42);
}

#[test]
fn method_calls_resolve_through_subscripts_too() {
    let output = run(indoc! {r#"
        obj = table { "n": 3, "bump": fun(self) { self.n = self.n + 1 self.n } }
        println(obj.bump())
        println(obj["bump"]())
        println(obj.n)
    "#});
    assert_eq!(output, "4\n5\n5\n");
}

#[test]
fn functions_are_first_class_values() {
    let output = run(indoc! {r#"
        twice = fun(f, x) f(f(x))
        println(twice(fun(n) n * 3, 2))
        add = fun(a, b) a + b
        ops = array { add }
        println(ops[0](1, 2))
    "#});
    assert_eq!(output, "18\n3\n");
}

#[test]
fn host_value_round_trip() {
    let (mut vm, _) = capture_vm();
    vm.define("flag", true);
    vm.define("seed", 21i64);
    vm.define("label", "total");
    vm.run(
        indoc! {r#"
            result = table { }
            result[label] = if flag then seed * 2 else 0
        "#},
        "main.rune",
    )
    .expect("run failed");

    let result = vm.get_table("result").expect("table");
    let total = result.borrow().get("total").cloned();
    assert_eq!(total, Some(Value::Int(42)));
}
