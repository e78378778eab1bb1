use std::collections::HashSet;
use std::fs;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::VmError;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::token::Span;

use super::env::Env;
use super::error::RuntimeError;
use super::value::{Closure, Function, Value};

pub(crate) const DEFAULT_RECURSION_LIMIT: usize = 3000;

/// Evaluation outcome: either an ordinary value or an in-flight control-flow
/// signal unwinding towards its target construct (`Return` to the enclosing
/// call, `Break`/`Continue` to the enclosing loop).
pub(crate) enum Flow {
    Value(Value),
    Return(Value),
    Break(Span),
    Continue(Span),
}

/// Unwrap an ordinary value, or keep unwinding a signal.
macro_rules! propagate {
    ($flow:expr) => {
        match $flow {
            Flow::Value(value) => value,
            signal => return Ok(signal),
        }
    };
}

/// Tree-walking evaluator. One instance evaluates one program run and owns
/// the run's import registry and recursion accounting.
pub(crate) struct Evaluator {
    imported: HashSet<String>,
    depth: usize,
    limit: usize,
}

impl Evaluator {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            imported: HashSet::new(),
            depth: 0,
            limit,
        }
    }

    /// Evaluate a program `Block` to its final value. A `return` reaching
    /// the root ends the program; `break`/`continue` at the root are errors.
    pub(crate) fn run_program(&mut self, program: &Expr, env: &Env) -> Result<Value, VmError> {
        match self.evaluate(program, env)? {
            Flow::Value(value) | Flow::Return(value) => Ok(value),
            Flow::Break(span) => Err(RuntimeError::BreakOutsideLoop { span }.into()),
            Flow::Continue(span) => Err(RuntimeError::ContinueOutsideLoop { span }.into()),
        }
    }

    fn evaluate(&mut self, expr: &Expr, env: &Env) -> Result<Flow, VmError> {
        if self.depth >= self.limit {
            return Err(RuntimeError::RecursionLimit {
                span: expr.span.clone(),
            }
            .into());
        }
        self.depth += 1;
        let result = self.eval_inner(expr, env);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> Result<Flow, VmError> {
        match &expr.kind {
            ExprKind::Num(text) => Ok(Flow::Value(parse_number(text, &expr.span)?)),
            ExprKind::Str(text) => Ok(Flow::Value(Value::Str(text.clone()))),
            ExprKind::Bool(value) => Ok(Flow::Value(Value::Bool(*value))),
            ExprKind::Var(name) => match env.get(name) {
                Some(value) => Ok(Flow::Value(value)),
                None => Err(RuntimeError::UndefinedVariable {
                    name: name.clone(),
                    span: expr.span.clone(),
                }
                .into()),
            },
            ExprKind::Assign { target, value } => self.eval_assign(target, value, env),
            ExprKind::Binary { op, left, right } => {
                // A return signal embedded in an operand is unwrapped to its
                // payload rather than unwound further.
                let left_value = match self.evaluate(left, env)? {
                    Flow::Value(value) | Flow::Return(value) => value,
                    signal => return Ok(signal),
                };
                let right_value = match self.evaluate(right, env)? {
                    Flow::Value(value) | Flow::Return(value) => value,
                    signal => return Ok(signal),
                };
                Ok(Flow::Value(apply_binary(
                    *op,
                    &left_value,
                    &right_value,
                    &expr.span,
                )?))
            }
            ExprKind::Unary { op, operand } => {
                let value = propagate!(self.evaluate(operand, env)?);
                Ok(Flow::Value(apply_unary(*op, &value, &expr.span)?))
            }
            ExprKind::Fun { params, body } => {
                Ok(Flow::Value(Value::Function(Rc::new(Function::Closure(
                    Closure {
                        params: params.clone(),
                        body: Rc::clone(body),
                        env: env.clone(),
                    },
                )))))
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, &expr.span, env),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.eval_if(cond, then_branch, else_branch.as_deref(), env),
            ExprKind::While { cond, body } => self.eval_while(cond, body, env),
            ExprKind::Block(children) => {
                let mut last = Value::Bool(false);
                for child in children {
                    last = propagate!(self.evaluate(child, env)?);
                }
                Ok(Flow::Value(last))
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(propagate!(self.evaluate(element, env)?));
                }
                Ok(Flow::Value(Value::array(values)))
            }
            ExprKind::Table(pairs) => {
                let mut entries = std::collections::HashMap::new();
                for pair in pairs {
                    let key = propagate!(self.evaluate(&pair.key, env)?);
                    let value = propagate!(self.evaluate(&pair.value, env)?);
                    entries.insert(key.to_string(), value);
                }
                Ok(Flow::Value(Value::table(entries)))
            }
            ExprKind::Index { base, index } => {
                let base_value = propagate!(self.evaluate(base, env)?);
                let index_value = propagate!(self.evaluate(index, env)?);
                Ok(Flow::Value(index_container(
                    &base_value,
                    index_value,
                    &expr.span,
                )?))
            }
            ExprKind::Return(payload) => {
                let value = propagate!(self.evaluate(payload, env)?);
                Ok(Flow::Return(value))
            }
            ExprKind::Break => Ok(Flow::Break(expr.span.clone())),
            ExprKind::Continue => Ok(Flow::Continue(expr.span.clone())),
            ExprKind::Import(path) => self.eval_import(path, &expr.span, env),
        }
    }

    fn eval_assign(&mut self, target: &Expr, value: &Expr, env: &Env) -> Result<Flow, VmError> {
        match &target.kind {
            ExprKind::Index { base, index } => {
                let container = propagate!(self.evaluate(base, env)?);
                let index_value = propagate!(self.evaluate(index, env)?);
                let new_value = propagate!(self.evaluate(value, env)?);
                match (&container, index_value) {
                    (Value::Array(values), Value::Int(i)) => {
                        let mut values = values.borrow_mut();
                        let len = values.len();
                        if i < 0 || i as usize >= len {
                            return Err(RuntimeError::IndexOutOfBounds {
                                index: i,
                                len,
                                span: target.span.clone(),
                            }
                            .into());
                        }
                        values[i as usize] = new_value.clone();
                    }
                    (Value::Array(_), _) => {
                        return Err(RuntimeError::ArrayIndexType {
                            span: target.span.clone(),
                        }
                        .into());
                    }
                    (Value::Table(entries), Value::Str(key)) => {
                        entries.borrow_mut().insert(key, new_value.clone());
                    }
                    (Value::Table(_), _) => {
                        return Err(RuntimeError::TableKeyType {
                            span: target.span.clone(),
                        }
                        .into());
                    }
                    (other, Value::Str(field)) => {
                        return Err(RuntimeError::FieldOnNonTable {
                            field,
                            type_name: other.type_name(),
                            span: target.span.clone(),
                        }
                        .into());
                    }
                    (other, _) => {
                        return Err(RuntimeError::NotIndexable {
                            type_name: other.type_name(),
                            span: target.span.clone(),
                        }
                        .into());
                    }
                }
                Ok(Flow::Value(new_value))
            }
            ExprKind::Var(name) => {
                let new_value = propagate!(self.evaluate(value, env)?);
                env.set(name, new_value.clone());
                Ok(Flow::Value(new_value))
            }
            _ => Err(RuntimeError::InvalidAssignTarget {
                span: target.span.clone(),
            }
            .into()),
        }
    }

    fn eval_if(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        env: &Env,
    ) -> Result<Flow, VmError> {
        let cond_value = propagate!(self.evaluate(cond, env)?);
        if cond_value.is_truthy() {
            return self.evaluate(then_branch, env);
        }
        let Some(else_branch) = else_branch else {
            return Ok(Flow::Value(Value::Bool(false)));
        };
        match &else_branch.kind {
            // An elif chain: try each branch in order; a non-`if` element is
            // the final `else` payload.
            ExprKind::Block(children) => {
                for child in children {
                    if let ExprKind::If {
                        cond, then_branch, ..
                    } = &child.kind
                    {
                        let cond_value = propagate!(self.evaluate(cond, env)?);
                        if cond_value.is_truthy() {
                            return self.evaluate(then_branch, env);
                        }
                    } else {
                        return self.evaluate(child, env);
                    }
                }
                Ok(Flow::Value(Value::Bool(false)))
            }
            _ => self.evaluate(else_branch, env),
        }
    }

    fn eval_while(&mut self, cond: &Expr, body: &Expr, env: &Env) -> Result<Flow, VmError> {
        loop {
            let cond_value = propagate!(self.evaluate(cond, env)?);
            let keep_going = match cond_value {
                Value::Bool(value) => value,
                // Unlike `if`, the loop condition is not coerced.
                other => {
                    return Err(RuntimeError::ExpectedBool {
                        type_name: other.type_name(),
                        span: cond.span.clone(),
                    }
                    .into());
                }
            };
            if !keep_going {
                break;
            }
            match self.evaluate(body, env)? {
                Flow::Break(_) => break,
                Flow::Continue(_) => continue,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Value(_) => {}
            }
        }
        Ok(Flow::Value(Value::Bool(false)))
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: &Span,
        env: &Env,
    ) -> Result<Flow, VmError> {
        // Resolving a field or subscript access on a table injects the table
        // itself as the first argument, so `obj.method()` sees its receiver.
        // The base is evaluated once and shared between lookup and receiver.
        let (callee_value, mut arg_values) = match &callee.kind {
            ExprKind::Index { base, index } => {
                let base_value = propagate!(self.evaluate(base, env)?);
                let index_value = propagate!(self.evaluate(index, env)?);
                let member = index_container(&base_value, index_value, &callee.span)?;
                if matches!(base_value, Value::Table(_)) {
                    (member, vec![base_value])
                } else {
                    (member, Vec::new())
                }
            }
            _ => (propagate!(self.evaluate(callee, env)?), Vec::new()),
        };
        for arg in args {
            arg_values.push(propagate!(self.evaluate(arg, env)?));
        }
        let function = match callee_value {
            Value::Function(function) => function,
            other => {
                return Err(RuntimeError::NotAFunction {
                    callee: callee_name(callee, &other),
                    span: span.clone(),
                }
                .into());
            }
        };
        self.call_function(&function, arg_values, span)
            .map(Flow::Value)
    }

    /// Invoke a function value. Parameters bind in declaration order;
    /// missing arguments bind to `false`, extras are discarded.
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        span: &Span,
    ) -> Result<Value, VmError> {
        match function.as_ref() {
            Function::Native { body, .. } => body(&args).map_err(|message| {
                RuntimeError::NativeCall {
                    message,
                    span: span.clone(),
                }
                .into()
            }),
            Function::Closure(closure) => {
                let scope = closure.env.extend();
                for (position, name) in closure.params.iter().enumerate() {
                    let value = args.get(position).cloned().unwrap_or(Value::Bool(false));
                    scope.define(name.clone(), value);
                }
                match self.evaluate(&closure.body, &scope)? {
                    Flow::Value(value) | Flow::Return(value) => Ok(value),
                    Flow::Break(span) => Err(RuntimeError::BreakOutsideLoop { span }.into()),
                    Flow::Continue(span) => {
                        Err(RuntimeError::ContinueOutsideLoop { span }.into())
                    }
                }
            }
        }
    }

    /// Host-side entry point for invoking an extracted function value.
    pub(crate) fn call_value(
        &mut self,
        value: &Value,
        args: Vec<Value>,
        span: &Span,
    ) -> Result<Value, VmError> {
        let Value::Function(function) = value else {
            return Err(RuntimeError::NotAFunction {
                callee: value.type_name().to_string(),
                span: span.clone(),
            }
            .into());
        };
        self.call_function(function, args, span)
    }

    fn eval_import(&mut self, path: &Expr, span: &Span, env: &Env) -> Result<Flow, VmError> {
        let path_value = propagate!(self.evaluate(path, env)?);
        let stem = match path_value {
            Value::Str(stem) => stem,
            other => {
                return Err(RuntimeError::ImportPathType {
                    type_name: other.type_name(),
                    span: span.clone(),
                }
                .into());
            }
        };
        let file = format!("{stem}.rune");
        // Registered before evaluation, which also stops import cycles.
        if !self.imported.insert(file.clone()) {
            return Err(RuntimeError::DuplicateImport {
                path: file,
                span: span.clone(),
            }
            .into());
        }
        let source = fs::read_to_string(&file).map_err(|error| RuntimeError::ImportFailed {
            path: file.clone(),
            reason: error.to_string(),
            span: span.clone(),
        })?;
        let program = Parser::new(Lexer::new(&source, &file)).parse_program()?;
        // Imports share and extend the importing scope.
        self.run_program(&program, env)?;
        Ok(Flow::Value(Value::Bool(false)))
    }
}

fn parse_number(text: &str, span: &Span) -> Result<Value, RuntimeError> {
    let parsed = if text.contains('.') {
        text.parse::<f64>().map(Value::Float).ok()
    } else {
        text.parse::<i64>().map(Value::Int).ok()
    };
    parsed.ok_or_else(|| RuntimeError::InvalidNumber {
        literal: text.to_string(),
        span: span.clone(),
    })
}

/// Arithmetic results collapse to an integer when the value is whole.
fn round_if_whole(value: f64) -> Value {
    if (value - value.round()).abs() < 1e-9 {
        Value::Int(value.round() as i64)
    } else {
        Value::Float(value)
    }
}

fn number(value: &Value, span: &Span) -> Result<f64, RuntimeError> {
    value
        .coerce_number()
        .ok_or_else(|| RuntimeError::ExpectedNumber {
            type_name: value.type_name(),
            span: span.clone(),
        })
}

fn boolean(value: &Value, span: &Span) -> Result<bool, RuntimeError> {
    value
        .coerce_bool()
        .ok_or_else(|| RuntimeError::ExpectedBool {
            type_name: value.type_name(),
            span: span.clone(),
        })
}

fn apply_binary(op: BinaryOp, a: &Value, b: &Value, span: &Span) -> Result<Value, RuntimeError> {
    let value = match op {
        BinaryOp::Add => round_if_whole(number(a, span)? + number(b, span)?),
        BinaryOp::Sub => round_if_whole(number(a, span)? - number(b, span)?),
        BinaryOp::Mul => round_if_whole(number(a, span)? * number(b, span)?),
        BinaryOp::Div => {
            let divisor = number(b, span)?;
            if divisor == 0.0 {
                return Err(RuntimeError::DivideByZero { span: span.clone() });
            }
            round_if_whole(number(a, span)? / divisor)
        }
        BinaryOp::Rem => {
            let divisor = number(b, span)? as i64;
            if divisor == 0 {
                return Err(RuntimeError::DivideByZero { span: span.clone() });
            }
            Value::Int(number(a, span)? as i64 % divisor)
        }
        // Both operands are always evaluated before the operator applies;
        // there is no short-circuiting.
        BinaryOp::And => Value::Bool(boolean(a, span)? && boolean(b, span)?),
        BinaryOp::Or => Value::Bool(boolean(a, span)? || boolean(b, span)?),
        BinaryOp::Less => Value::Bool(number(a, span)? < number(b, span)?),
        BinaryOp::Greater => Value::Bool(number(a, span)? > number(b, span)?),
        BinaryOp::LessEqual => Value::Bool(number(a, span)? <= number(b, span)?),
        BinaryOp::GreaterEqual => Value::Bool(number(a, span)? >= number(b, span)?),
        BinaryOp::Equal => Value::Bool(values_equal(a, b, span)?),
        BinaryOp::NotEqual => Value::Bool(!values_equal(a, b, span)?),
    };
    Ok(value)
}

/// Container and function operands compare by identity, booleans by value;
/// everything else goes through the numeric view, so `"1" == 1` holds and
/// `"x" == 1` is a type error.
fn values_equal(a: &Value, b: &Value, span: &Span) -> Result<bool, RuntimeError> {
    match (a, b) {
        (Value::Array(_), Value::Array(_))
        | (Value::Table(_), Value::Table(_))
        | (Value::Function(_), Value::Function(_)) => Ok(a == b),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        _ => Ok(number(a, span)? == number(b, span)?),
    }
}

fn apply_unary(op: UnaryOp, value: &Value, span: &Span) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!boolean(value, span)?)),
    }
}

fn index_container(container: &Value, index: Value, span: &Span) -> Result<Value, RuntimeError> {
    match container {
        Value::Array(values) => {
            let Value::Int(i) = index else {
                return Err(RuntimeError::ArrayIndexType { span: span.clone() });
            };
            let values = values.borrow();
            if i < 0 || i as usize >= values.len() {
                return Err(RuntimeError::IndexOutOfBounds {
                    index: i,
                    len: values.len(),
                    span: span.clone(),
                });
            }
            Ok(values[i as usize].clone())
        }
        Value::Table(entries) => {
            let Value::Str(key) = index else {
                return Err(RuntimeError::TableKeyType { span: span.clone() });
            };
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or(RuntimeError::KeyNotFound {
                    key,
                    span: span.clone(),
                })
        }
        other => Err(RuntimeError::NotIndexable {
            type_name: other.type_name(),
            span: span.clone(),
        }),
    }
}

fn callee_name(callee: &Expr, value: &Value) -> String {
    match &callee.kind {
        ExprKind::Var(name) => name.clone(),
        ExprKind::Index { index, .. } => match &index.kind {
            ExprKind::Str(name) => name.clone(),
            _ => value.type_name().to_string(),
        },
        _ => value.type_name().to_string(),
    }
}
