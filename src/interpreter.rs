//! The embedding surface of the interpreter.
//!
//! [`RuneVm`] owns the root environment (pre-seeded with the builtin
//! catalog), runs source through the lexer → parser → evaluator pipeline,
//! and lets the host define bindings, extract typed values, and invoke
//! extracted functions.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::builtins;
use crate::error::VmError;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::token::Span;

mod env;
mod error;
mod eval;
mod value;

pub use env::Env;
pub use error::RuntimeError;
pub use value::{ArrayRef, Closure, Function, NativeFn, TableRef, Value};

use eval::{Evaluator, DEFAULT_RECURSION_LIMIT};

/// Where `print`/`println` write. Defaults to stdout; tests and embedding
/// hosts can swap in any writer.
pub type OutputSink = Rc<RefCell<dyn io::Write>>;

pub struct RuneVm {
    env: Env,
    recursion_limit: usize,
}

impl RuneVm {
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(io::stdout())))
    }

    pub fn with_output(output: OutputSink) -> Self {
        let env = Env::root();
        builtins::install(&env, &output);
        Self {
            env,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Bound on evaluator nesting, counted per evaluated expression.
    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Lex, parse, and evaluate `source` against the root environment.
    /// `file` is used for diagnostics only.
    ///
    /// Every error is fatal to the run: evaluation stops at the first
    /// diagnostic, which is returned for the caller to report. There is no
    /// recovery path; the CLI prints the rendered diagnostic and exits
    /// nonzero.
    pub fn run(&mut self, source: &str, file: &str) -> Result<(), VmError> {
        let program = Parser::new(Lexer::new(source, file)).parse_program()?;
        let mut evaluator = Evaluator::new(self.recursion_limit);
        evaluator.run_program(&program, &self.env)?;
        Ok(())
    }

    /// Insert or overwrite a root-scope binding.
    pub fn define(&mut self, name: &str, value: impl Into<Value>) {
        self.env.define(name, value.into());
    }

    /// Install a host function under the uniform native-function contract.
    pub fn define_native(
        &mut self,
        name: &str,
        body: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.env.define(name, Value::native(name, body));
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, VmError> {
        match self.fetch(name)? {
            Value::Bool(value) => Ok(value),
            _ => Err(self.mismatch(name, "bool")),
        }
    }

    /// Also accepts a float (truncated) and a numeric string.
    pub fn get_int(&self, name: &str) -> Result<i64, VmError> {
        match self.fetch(name)? {
            Value::Int(value) => Ok(value),
            Value::Float(value) => Ok(value as i64),
            Value::Str(text) => text
                .parse::<i64>()
                .map_err(|_| self.mismatch(name, "int")),
            _ => Err(self.mismatch(name, "int")),
        }
    }

    /// Also accepts an int and a numeric string.
    pub fn get_float(&self, name: &str) -> Result<f64, VmError> {
        match self.fetch(name)? {
            Value::Float(value) => Ok(value),
            Value::Int(value) => Ok(value as f64),
            Value::Str(text) => text
                .parse::<f64>()
                .map_err(|_| self.mismatch(name, "float")),
            _ => Err(self.mismatch(name, "float")),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String, VmError> {
        match self.fetch(name)? {
            Value::Str(text) => Ok(text),
            _ => Err(self.mismatch(name, "string")),
        }
    }

    /// The returned handle shares the script's array: mutations through it
    /// are visible to the program on the next `run`.
    pub fn get_array(&self, name: &str) -> Result<ArrayRef, VmError> {
        match self.fetch(name)? {
            Value::Array(values) => Ok(values),
            _ => Err(self.mismatch(name, "array")),
        }
    }

    pub fn get_table(&self, name: &str) -> Result<TableRef, VmError> {
        match self.fetch(name)? {
            Value::Table(entries) => Ok(entries),
            _ => Err(self.mismatch(name, "table")),
        }
    }

    pub fn get_function(&self, name: &str) -> Result<Value, VmError> {
        match self.fetch(name)? {
            value @ Value::Function(_) => Ok(value),
            _ => Err(self.mismatch(name, "function")),
        }
    }

    /// Fetch a table and one of its function members, for receiver-style
    /// invocation from the host (`call` with the table as first argument).
    pub fn get_table_function(
        &self,
        table_name: &str,
        function_name: &str,
    ) -> Result<(Value, Value), VmError> {
        let entries = self.get_table(table_name)?;
        let member = entries.borrow().get(function_name).cloned();
        match member {
            Some(function @ Value::Function(_)) => Ok((Value::Table(entries), function)),
            _ => Err(VmError::TypeMismatch {
                name: function_name.to_string(),
                expected: "function",
            }),
        }
    }

    /// Invoke a function value extracted from the environment.
    pub fn call(&mut self, function: &Value, args: &[Value]) -> Result<Value, VmError> {
        let span = Span::new(Rc::from("<host>"), 0, 0, 0);
        let mut evaluator = Evaluator::new(self.recursion_limit);
        evaluator.call_value(function, args.to_vec(), &span)
    }

    fn fetch(&self, name: &str) -> Result<Value, VmError> {
        self.env.get(name).ok_or_else(|| VmError::Undefined {
            name: name.to_string(),
        })
    }

    fn mismatch(&self, name: &str, expected: &'static str) -> VmError {
        VmError::TypeMismatch {
            name: name.to_string(),
            expected,
        }
    }
}

impl Default for RuneVm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn capture_vm() -> (RuneVm, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let sink: OutputSink = buffer.clone();
        (RuneVm::with_output(sink), buffer)
    }

    fn run_capture(source: &str) -> String {
        let (mut vm, buffer) = capture_vm();
        vm.run(source, "test.rune").expect("run failed");
        let output = buffer.borrow().clone();
        String::from_utf8(output).expect("script output should be utf-8")
    }

    #[test]
    fn prints_arithmetic_results() {
        let output = run_capture("println(1 + 2) println(3 / 2) println(4 / 2)");
        assert_eq!(output, "3\n1.5\n2\n");
    }

    #[test]
    fn print_writes_without_separator_or_newline() {
        let output = run_capture(r#"print("a", 1, true) print("b")"#);
        assert_eq!(output, "a1trueb");
    }

    #[test]
    fn host_defines_are_visible_to_the_script() {
        let (mut vm, buffer) = capture_vm();
        vm.define("greeting", "hello");
        vm.define("count", 3i64);
        vm.run(
            indoc! {r#"
                i = 0
                while i < count {
                    println(greeting)
                    i = i + 1
                }
            "#},
            "test.rune",
        )
        .expect("run failed");
        let output = buffer.borrow().clone();
        assert_eq!(String::from_utf8(output).expect("utf-8"), "hello\nhello\nhello\n");
    }

    #[test]
    fn typed_getters_recover_script_bindings() {
        let (mut vm, _) = capture_vm();
        vm.run(
            indoc! {r#"
                b = true
                i = 7
                f = 1.5
                s = "hi"
                a = array { 1, 2 }
                t = table { "x": 1 }
                g = fun() 42
            "#},
            "test.rune",
        )
        .expect("run failed");

        assert!(vm.get_bool("b").expect("bool"));
        assert_eq!(vm.get_int("i").expect("int"), 7);
        assert_eq!(vm.get_float("f").expect("float"), 1.5);
        assert_eq!(vm.get_string("s").expect("string"), "hi");
        assert_eq!(vm.get_array("a").expect("array").borrow().len(), 2);
        assert!(vm.get_table("t").expect("table").borrow().contains_key("x"));
        let g = vm.get_function("g").expect("function");
        assert_eq!(vm.call(&g, &[]).expect("call"), Value::Int(42));
    }

    #[test]
    fn get_int_accepts_floats_and_numeric_strings() {
        let (mut vm, _) = capture_vm();
        vm.run("a = 2.9 b = \"42\" c = \"x\"", "test.rune")
            .expect("run failed");
        assert_eq!(vm.get_int("a").expect("from float"), 2);
        assert_eq!(vm.get_int("b").expect("from string"), 42);
        assert!(matches!(
            vm.get_int("c"),
            Err(VmError::TypeMismatch { expected: "int", .. })
        ));
        assert_eq!(vm.get_float("b").expect("float from string"), 42.0);
    }

    #[test]
    fn getters_surface_structured_errors() {
        let (mut vm, _) = capture_vm();
        vm.run("x = 1", "test.rune").expect("run failed");
        let err = vm.get_bool("x").expect_err("expected mismatch");
        assert_eq!(err.render(), "error: 'x' is not a bool");
        assert!(matches!(
            vm.get_string("missing"),
            Err(VmError::Undefined { .. })
        ));
    }

    #[test]
    fn native_functions_plug_into_the_script() {
        let (mut vm, _) = capture_vm();
        vm.define_native("double", |args| match args.first() {
            Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
            _ => Err("double: expected an int".to_string()),
        });
        vm.run("x = double(21)", "test.rune").expect("run failed");
        assert_eq!(vm.get_int("x").expect("int"), 42);
    }

    #[test]
    fn native_errors_become_diagnostics_at_the_call_site() {
        let (mut vm, _) = capture_vm();
        vm.define_native("boom", |_| Err("it broke".to_string()));
        let err = vm.run("boom()", "main.rune").expect_err("expected failure");
        assert!(matches!(
            err,
            VmError::Runtime(RuntimeError::NativeCall { ref message, .. }) if message == "it broke"
        ));
        assert_eq!(err.render(), "error (main.rune:1:5): it broke");
    }

    #[test]
    fn receiver_style_call_from_the_host() {
        let (mut vm, buffer) = capture_vm();
        vm.run(
            indoc! {r#"
                person = table {
                    "name": "Ada",
                    "hello": fun(self) { println(self.name) }
                }
            "#},
            "test.rune",
        )
        .expect("run failed");

        let (table, hello) = vm
            .get_table_function("person", "hello")
            .expect("table function");
        vm.call(&hello, &[table]).expect("call");
        let output = buffer.borrow().clone();
        assert_eq!(String::from_utf8(output).expect("utf-8"), "Ada\n");
    }

    #[test]
    fn get_table_function_rejects_non_functions() {
        let (mut vm, _) = capture_vm();
        vm.run("t = table { \"x\": 1 }", "test.rune").expect("run");
        assert!(matches!(
            vm.get_table_function("t", "x"),
            Err(VmError::TypeMismatch { expected: "function", .. })
        ));
        assert!(matches!(
            vm.get_table_function("t", "missing"),
            Err(VmError::TypeMismatch { expected: "function", .. })
        ));
    }

    #[test]
    fn state_persists_across_runs() {
        let (mut vm, buffer) = capture_vm();
        vm.run("x = 1", "first.rune").expect("first run");
        vm.run("println(x + 1)", "second.rune").expect("second run");
        let output = buffer.borrow().clone();
        assert_eq!(String::from_utf8(output).expect("utf-8"), "2\n");
    }

    #[test]
    fn configured_recursion_limit_applies() {
        let (mut vm, _) = capture_vm();
        vm.set_recursion_limit(32);
        let err = vm
            .run("f = fun() f() f()", "test.rune")
            .expect_err("expected depth failure");
        assert!(matches!(
            err,
            VmError::Runtime(RuntimeError::RecursionLimit { .. })
        ));
    }
}
