//! PHP-style form flattening.
//!
//! The marketplace backend is PHP and expects nested structures as bracketed
//! keys: lists become numeric-indexed keys (`vars[options][0][id]`), maps
//! become named keys, recursively. The first path segment stays bare unless
//! it is a list index.

use serde_json::Value;

enum Seg<'a> {
    Key(&'a str),
    Index(usize),
}

/// Flatten a JSON tree into `(bracketed_key, scalar_value)` pairs, depth
/// first, preserving field order. The pairs feed straight into a
/// url-form-encoded POST body.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut path: Vec<Seg<'_>> = Vec::new();
    let mut pairs = Vec::new();
    walk(value, &mut path, &mut pairs);
    pairs
}

fn walk<'a>(value: &'a Value, path: &mut Vec<Seg<'a>>, out: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(Seg::Index(i));
                walk(item, path, out);
                path.pop();
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                path.push(Seg::Key(key));
                walk(item, path, out);
                path.pop();
            }
        }
        scalar => out.push((render_key(path), render_scalar(scalar))),
    }
}

fn render_key(path: &[Seg<'_>]) -> String {
    let mut key = String::new();
    for (depth, seg) in path.iter().enumerate() {
        match seg {
            // A bare leading name, everything after it bracketed. A leading
            // list index is bracketed too.
            Seg::Key(name) if depth == 0 => key.push_str(name),
            Seg::Key(name) => {
                key.push('[');
                key.push_str(name);
                key.push(']');
            }
            Seg::Index(i) => {
                key.push('[');
                key.push_str(&i.to_string());
                key.push(']');
            }
        }
    }
    key
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Null and anything else degrade to an empty field.
        _ => String::new(),
    }
}
