use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;

use super::env::Env;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type TableRef = Rc<RefCell<HashMap<String, Value>>>;

/// The uniform native-function contract: variadic arguments in, exactly one
/// value out. An `Err` surfaces as a fatal diagnostic at the call site,
/// carrying the message.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Runtime value universe.
///
/// Arrays and tables are reference-shared: aliasing a binding aliases the
/// container, and `new` is the only way to obtain an independent copy.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(ArrayRef),
    Table(TableRef),
    Function(Rc<Function>),
}

pub enum Function {
    Native { name: String, body: NativeFn },
    Closure(Closure),
}

/// A function literal plus the environment it closed over. Captures are by
/// reference, not snapshots: calls see later mutations of captured scopes.
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    pub env: Env,
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn table(entries: HashMap<String, Value>) -> Self {
        Value::Table(Rc::new(RefCell::new(entries)))
    }

    pub fn native(
        name: impl Into<String>,
        body: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        Value::Function(Rc::new(Function::Native {
            name: name.into(),
            body: Rc::new(body),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Anything other than the literal `false` is truthy, including `0` and
    /// the empty string.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Numeric view used by arithmetic and comparisons: ints, floats, and
    /// strings that parse as numbers.
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Str(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Boolean view used by `&&`, `||`, and `not`: bools pass through,
    /// numbers are nonzero-tests, and `"true"`/`"false"` parse.
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::Float(x) => Some(*x != 0.0),
            Value::Str(s) => s.parse::<bool>().ok(),
            _ => None,
        }
    }

    /// Structural deep copy; the backing store of every nested array and
    /// table is duplicated. Functions keep their identity.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(values) => {
                let copied = values.borrow().iter().map(Value::deep_copy).collect();
                Value::array(copied)
            }
            Value::Table(entries) => {
                let copied = entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.deep_copy()))
                    .collect();
                Value::table(copied)
            }
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    /// Scalars compare structurally; arrays, tables, and functions compare
    /// by reference identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(values) => {
                let rendered = values
                    .borrow()
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Table(entries) => {
                // Keys are sorted so printing is deterministic; the language
                // itself never observes table ordering.
                let entries = entries.borrow();
                let mut keys = entries.keys().collect::<Vec<_>>();
                keys.sort();
                let rendered = keys
                    .into_iter()
                    .map(|key| format!("\"{key}\": {}", entries[key]))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Value::Function(function) => match function.as_ref() {
                Function::Native { name, .. } => write!(f, "<native function {name}>"),
                Function::Closure(_) => write!(f, "<function>"),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Array(values) => write!(f, "Array({:?})", values.borrow()),
            Value::Table(entries) => write!(f, "Table({:?})", entries.borrow()),
            Value::Function(_) => write!(f, "Function({self})"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(entries: HashMap<String, Value>) -> Self {
        Value::table(entries)
    }
}
