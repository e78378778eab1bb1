//! Built-in function catalog.
//!
//! Every builtin is an ordinary native function: already-evaluated arguments
//! in, `Result<Value, String>` out. An `Err` surfaces as a fatal diagnostic
//! at the call site, so builtins never touch spans or the evaluator.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::interpreter::{ArrayRef, Env, OutputSink, TableRef, Value};

pub(crate) fn install(env: &Env, out: &OutputSink) {
    install_output(env, out);
    install_runtime(env, out);
    install_files(env);
    install_strings(env);
    install_containers(env);
}

fn install_output(env: &Env, out: &OutputSink) {
    let sink = Rc::clone(out);
    env.define(
        "print",
        Value::native("print", move |args| {
            let mut out = sink.borrow_mut();
            for arg in args {
                write!(out, "{arg}").map_err(|e| format!("print: {e}"))?;
            }
            Ok(Value::Bool(false))
        }),
    );

    let sink = Rc::clone(out);
    env.define(
        "println",
        Value::native("println", move |args| {
            let mut out = sink.borrow_mut();
            for arg in args {
                write!(out, "{arg}").map_err(|e| format!("println: {e}"))?;
            }
            writeln!(out).map_err(|e| format!("println: {e}"))?;
            Ok(Value::Bool(false))
        }),
    );
}

fn install_runtime(env: &Env, out: &OutputSink) {
    env.define(
        "version",
        Value::native("version", |_args| {
            Ok(Value::Str(env!("CARGO_PKG_VERSION").to_string()))
        }),
    );

    env.define(
        "typeof",
        Value::native("typeof", |args| {
            let value = get_arg(args, 0, "typeof")?;
            Ok(Value::Str(value.type_name().to_string()))
        }),
    );

    env.define(
        "assert",
        Value::native("assert", |args| {
            let Value::Bool(ok) = get_arg(args, 0, "assert")? else {
                return Err("assert: condition must be a bool".to_string());
            };
            if *ok {
                Ok(Value::Bool(true))
            } else {
                match args.get(1) {
                    Some(message) => Err(format!("assertion failed: {message}")),
                    None => Err("assertion failed".to_string()),
                }
            }
        }),
    );

    env.define(
        "millis",
        Value::native("millis", |_args| {
            let elapsed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| format!("millis: {e}"))?;
            Ok(Value::Int(elapsed.as_millis() as i64))
        }),
    );

    env.define(
        "wait",
        Value::native("wait", |args| {
            let ms = get_int(args, 0, "wait")?;
            if ms < 0 {
                return Err("wait: duration must not be negative".to_string());
            }
            thread::sleep(Duration::from_millis(ms as u64));
            Ok(Value::Bool(false))
        }),
    );

    let sink = Rc::clone(out);
    env.define(
        "exit",
        Value::native("exit", move |args| {
            let code = match args.first() {
                Some(_) => get_int(args, 0, "exit")?,
                None => 0,
            };
            let _ = sink.borrow_mut().flush();
            std::process::exit(code as i32);
        }),
    );

    env.define(
        "exec",
        Value::native("exec", |args| {
            let program = get_str(args, 0, "exec")?;
            let mut command = Command::new(program);
            for arg in &args[1..] {
                command.arg(arg.to_string());
            }
            let output = command.output().map_err(|e| format!("exec: {e}"))?;
            Ok(Value::Str(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ))
        }),
    );
}

fn install_files(env: &Env) {
    env.define(
        "readfile",
        Value::native("readfile", |args| {
            let path = get_str(args, 0, "readfile")?;
            fs::read_to_string(&path)
                .map(Value::Str)
                .map_err(|e| format!("readfile: '{path}': {e}"))
        }),
    );

    env.define(
        "writefile",
        Value::native("writefile", |args| {
            let path = get_str(args, 0, "writefile")?;
            let text = get_str(args, 1, "writefile")?;
            fs::write(&path, text).map_err(|e| format!("writefile: '{path}': {e}"))?;
            Ok(Value::Bool(false))
        }),
    );

    env.define(
        "fileexist",
        Value::native("fileexist", |args| {
            let path = get_str(args, 0, "fileexist")?;
            Ok(Value::Bool(Path::new(&path).is_file()))
        }),
    );

    env.define(
        "direxists",
        Value::native("direxists", |args| {
            let path = get_str(args, 0, "direxists")?;
            Ok(Value::Bool(Path::new(&path).is_dir()))
        }),
    );

    env.define(
        "isfileordir",
        Value::native("isfileordir", |args| {
            let path = get_str(args, 0, "isfileordir")?;
            let path = Path::new(&path);
            let kind = if path.is_file() {
                "file"
            } else if path.is_dir() {
                "dir"
            } else {
                "none"
            };
            Ok(Value::Str(kind.to_string()))
        }),
    );
}

fn install_strings(env: &Env) {
    env.define(
        "strsplit",
        Value::native("strsplit", |args| {
            let text = get_str(args, 0, "strsplit")?;
            let separator = get_str(args, 1, "strsplit")?;
            let parts = text
                .split(&separator)
                .map(Value::from)
                .collect::<Vec<_>>();
            Ok(Value::array(parts))
        }),
    );

    env.define(
        "strtrim",
        Value::native("strtrim", |args| {
            let text = get_str(args, 0, "strtrim")?;
            Ok(Value::Str(text.trim().to_string()))
        }),
    );

    env.define(
        "trimleft",
        Value::native("trimleft", |args| {
            let text = get_str(args, 0, "trimleft")?;
            let cutset = get_str(args, 1, "trimleft")?;
            Ok(Value::Str(
                text.trim_start_matches(|c| cutset.contains(c)).to_string(),
            ))
        }),
    );

    env.define(
        "trimright",
        Value::native("trimright", |args| {
            let text = get_str(args, 0, "trimright")?;
            let cutset = get_str(args, 1, "trimright")?;
            Ok(Value::Str(
                text.trim_end_matches(|c| cutset.contains(c)).to_string(),
            ))
        }),
    );

    env.define(
        "strreplace",
        Value::native("strreplace", |args| {
            let text = get_str(args, 0, "strreplace")?;
            let from = get_str(args, 1, "strreplace")?;
            let to = get_str(args, 2, "strreplace")?;
            Ok(Value::Str(text.replace(&from, &to)))
        }),
    );

    env.define(
        "strcontains",
        Value::native("strcontains", |args| {
            let text = get_str(args, 0, "strcontains")?;
            let needle = get_str(args, 1, "strcontains")?;
            Ok(Value::Bool(text.contains(&needle)))
        }),
    );

    env.define(
        "strhasprefix",
        Value::native("strhasprefix", |args| {
            let text = get_str(args, 0, "strhasprefix")?;
            let prefix = get_str(args, 1, "strhasprefix")?;
            Ok(Value::Bool(text.starts_with(&prefix)))
        }),
    );

    env.define(
        "strhassuffix",
        Value::native("strhassuffix", |args| {
            let text = get_str(args, 0, "strhassuffix")?;
            let suffix = get_str(args, 1, "strhassuffix")?;
            Ok(Value::Bool(text.ends_with(&suffix)))
        }),
    );

    env.define(
        "cutprefix",
        Value::native("cutprefix", |args| {
            let text = get_str(args, 0, "cutprefix")?;
            let prefix = get_str(args, 1, "cutprefix")?;
            let cut = text.strip_prefix(&prefix).unwrap_or(&text);
            Ok(Value::Str(cut.to_string()))
        }),
    );

    env.define(
        "cutsuffix",
        Value::native("cutsuffix", |args| {
            let text = get_str(args, 0, "cutsuffix")?;
            let suffix = get_str(args, 1, "cutsuffix")?;
            let cut = text.strip_suffix(&suffix).unwrap_or(&text);
            Ok(Value::Str(cut.to_string()))
        }),
    );

    env.define(
        "strlower",
        Value::native("strlower", |args| {
            Ok(Value::Str(get_str(args, 0, "strlower")?.to_lowercase()))
        }),
    );

    env.define(
        "strupper",
        Value::native("strupper", |args| {
            Ok(Value::Str(get_str(args, 0, "strupper")?.to_uppercase()))
        }),
    );

    env.define(
        "isdigit",
        Value::native("isdigit", |args| {
            let text = get_str(args, 0, "isdigit")?;
            Ok(Value::Bool(
                !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()),
            ))
        }),
    );

    env.define(
        "isalpha",
        Value::native("isalpha", |args| {
            let text = get_str(args, 0, "isalpha")?;
            Ok(Value::Bool(
                !text.is_empty() && text.chars().all(|c| c.is_alphabetic()),
            ))
        }),
    );

    env.define(
        "iswhite",
        Value::native("iswhite", |args| {
            let text = get_str(args, 0, "iswhite")?;
            Ok(Value::Bool(
                !text.is_empty() && text.chars().all(|c| c.is_whitespace()),
            ))
        }),
    );
}

fn install_containers(env: &Env) {
    env.define(
        "len",
        Value::native("len", |args| {
            let len = match get_arg(args, 0, "len")? {
                Value::Array(values) => values.borrow().len(),
                Value::Table(entries) => entries.borrow().len(),
                Value::Str(text) => text.chars().count(),
                other => {
                    return Err(format!(
                        "len: expected an array, table, or string, got {}",
                        other.type_name()
                    ));
                }
            };
            Ok(Value::Int(len as i64))
        }),
    );

    // Returns a new array; the argument is left untouched.
    env.define(
        "append",
        Value::native("append", |args| {
            let values = get_array(args, 0, "append")?;
            let mut appended = values.borrow().clone();
            appended.extend(args[1..].iter().cloned());
            Ok(Value::array(appended))
        }),
    );

    env.define(
        "remove",
        Value::native("remove", |args| {
            match get_arg(args, 0, "remove")? {
                Value::Array(values) => {
                    let index = get_int(args, 1, "remove")?;
                    let mut removed = values.borrow().clone();
                    if index < 0 || index as usize >= removed.len() {
                        return Err(format!(
                            "remove: index {index} out of bounds for array of length {}",
                            removed.len()
                        ));
                    }
                    removed.remove(index as usize);
                    Ok(Value::array(removed))
                }
                Value::Table(entries) => {
                    let key = get_str(args, 1, "remove")?;
                    let mut removed = entries.borrow().clone();
                    removed.remove(&key);
                    Ok(Value::table(removed))
                }
                other => Err(format!(
                    "remove: expected an array or table, got {}",
                    other.type_name()
                )),
            }
        }),
    );

    env.define(
        "haskey",
        Value::native("haskey", |args| {
            let entries = get_table(args, 0, "haskey")?;
            let key = get_str(args, 1, "haskey")?;
            let found = entries.borrow().contains_key(&key);
            Ok(Value::Bool(found))
        }),
    );

    env.define(
        "slice",
        Value::native("slice", |args| {
            let from = get_int(args, 1, "slice")?;
            let to = get_int(args, 2, "slice")?;
            slice_value(get_arg(args, 0, "slice")?, from, to, "slice")
        }),
    );

    env.define(
        "sliceleft",
        Value::native("sliceleft", |args| {
            let to = get_int(args, 1, "sliceleft")?;
            slice_value(get_arg(args, 0, "sliceleft")?, 0, to, "sliceleft")
        }),
    );

    env.define(
        "sliceright",
        Value::native("sliceright", |args| {
            let value = get_arg(args, 0, "sliceright")?;
            let from = get_int(args, 1, "sliceright")?;
            let len = match value {
                Value::Array(values) => values.borrow().len(),
                Value::Str(text) => text.chars().count(),
                other => {
                    return Err(format!(
                        "sliceright: expected an array or string, got {}",
                        other.type_name()
                    ));
                }
            };
            slice_value(value, from, len as i64, "sliceright")
        }),
    );

    env.define(
        "new",
        Value::native("new", |args| {
            Ok(get_arg(args, 0, "new")?.deep_copy())
        }),
    );
}

fn slice_value(value: &Value, from: i64, to: i64, name: &str) -> Result<Value, String> {
    let (len, kind) = match value {
        Value::Array(values) => (values.borrow().len(), "array"),
        Value::Str(text) => (text.chars().count(), "string"),
        other => {
            return Err(format!(
                "{name}: expected an array or string, got {}",
                other.type_name()
            ));
        }
    };
    if from < 0 || to < from || to as usize > len {
        return Err(format!(
            "{name}: range {from}..{to} out of bounds for {kind} of length {len}"
        ));
    }
    let (from, to) = (from as usize, to as usize);
    match value {
        Value::Array(values) => Ok(Value::array(values.borrow()[from..to].to_vec())),
        Value::Str(text) => Ok(Value::Str(
            text.chars().skip(from).take(to - from).collect(),
        )),
        _ => unreachable!("checked above"),
    }
}

fn get_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, String> {
    args.get(index)
        .ok_or_else(|| format!("{name}: argument {} missing", index + 1))
}

fn get_str(args: &[Value], index: usize, name: &str) -> Result<String, String> {
    match get_arg(args, index, name)? {
        Value::Str(text) => Ok(text.clone()),
        other => Err(format!(
            "{name}: argument {} must be a string, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

fn get_int(args: &[Value], index: usize, name: &str) -> Result<i64, String> {
    match get_arg(args, index, name)? {
        Value::Int(n) => Ok(*n),
        Value::Float(x) => Ok(*x as i64),
        other => Err(format!(
            "{name}: argument {} must be an int, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

fn get_array(args: &[Value], index: usize, name: &str) -> Result<ArrayRef, String> {
    match get_arg(args, index, name)? {
        Value::Array(values) => Ok(Rc::clone(values)),
        other => Err(format!(
            "{name}: argument {} must be an array, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

fn get_table(args: &[Value], index: usize, name: &str) -> Result<TableRef, String> {
    match get_arg(args, index, name)? {
        Value::Table(entries) => Ok(Rc::clone(entries)),
        other => Err(format!(
            "{name}: argument {} must be a table, got {}",
            index + 1,
            other.type_name()
        )),
    }
}
