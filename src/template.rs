//! Resolves `{{ expr }}` placeholders against an [`ActivationContext`].
//!
//! A template consisting of exactly one expression with no surrounding text
//! evaluates to the referent itself, type preserved (`null` if missing).
//! A mixed template substitutes each expression in place, stringifying
//! non-string referents (numbers in decimal, objects as JSON); a missing
//! path stringifies to the empty string.
//!
//! The expression grammar additionally supports existence checks
//! (`$exists(path)`), boolean negation (`$not(expr)`), the comparison
//! operators `= != < > <= >=`, boolean `and`/`or`, and the ternary
//! `cond ? a : b`. Missing paths resolve to `null` without error;
//! comparisons against a missing value evaluate `false`.

use serde_json::Value;

use crate::agent::ActivationContext;

/// Find every `{{ ... }}` span in `template`, returning `(start, end, expr)`
/// triples where `start..end` is the byte range of the whole `{{ }}` span
/// (inclusive of the braces) and `expr` is the trimmed inner text.
fn find_expressions(template: &str) -> Vec<(usize, usize, &str)> {
    let mut spans = Vec::new();
    let mut rest = template;
    let mut offset = 0;
    while let Some(open) = rest.find("{{") {
        if let Some(close) = rest[open..].find("}}") {
            let start = offset + open;
            let end = offset + open + close + 2;
            let expr = rest[open + 2..open + close].trim();
            spans.push((start, end, expr));
            offset = end;
            rest = &template[offset..];
        } else {
            break;
        }
    }
    spans
}

/// Expand `template` against `ctx`.
///
/// If `template` is exactly one `{{ expr }}` with no surrounding text, the
/// referent's [`serde_json::Value`] is returned unchanged (type preserved).
/// Otherwise every expression is substituted and the whole thing returned
/// as [`Value::String`].
pub fn expand(template: &str, ctx: &ActivationContext) -> Value {
    let spans = find_expressions(template);

    if spans.len() == 1 {
        let (start, end, expr) = spans[0];
        if start == 0 && end == template.len() {
            return eval(expr, ctx);
        }
    }

    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for (start, end, expr) in spans {
        out.push_str(&template[cursor..start]);
        out.push_str(&stringify(&eval(expr, ctx)));
        cursor = end;
    }
    out.push_str(&template[cursor..]);
    Value::String(out)
}

/// Stringify a value for substitution into a mixed template: strings pass
/// through verbatim, `null` becomes empty, numbers render in decimal, and
/// everything else (objects, arrays, bools) renders as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Resolve a dotted path (`state.foo.bar`, `signal.payload.x`, `input`)
/// against the activation context. Returns `Value::Null` if any segment is
/// missing, matching the "missing paths resolve to undefined" rule.
fn resolve_path(path: &str, ctx: &ActivationContext) -> Value {
    let mut segments = path.split('.');
    let root = match segments.next() {
        Some(root) => root,
        None => return Value::Null,
    };

    let mut current = match root {
        "input" => ctx.input.clone(),
        "state" => ctx.state.clone(),
        "signal" => match segments.next() {
            Some("name") => return Value::String(ctx.signal.name.clone()),
            Some("payload") => ctx.signal.payload.clone(),
            Some(other) => {
                // `signal.<other>` beyond `name`/`payload` is not part of
                // the grammar; treat as missing rather than erroring.
                let _ = other;
                return Value::Null;
            }
            None => return serde_json::to_value(&ctx.signal).unwrap_or(Value::Null),
        },
        _ => return Value::Null,
    };

    for segment in segments {
        current = match current.get(segment) {
            Some(value) => value.clone(),
            None => return Value::Null,
        };
    }
    current
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare_numeric(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a = a.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

/// Evaluate a single expression (the trimmed text inside one `{{ }}` pair)
/// against `ctx`.
fn eval(expr: &str, ctx: &ActivationContext) -> Value {
    eval_ternary(expr.trim(), ctx)
}

fn eval_ternary(expr: &str, ctx: &ActivationContext) -> Value {
    if let Some((cond, rest)) = split_top_level(expr, '?') {
        if let Some((then_branch, else_branch)) = split_top_level(rest, ':') {
            return if truthy(&eval_or(cond.trim(), ctx)) {
                eval_ternary(then_branch.trim(), ctx)
            } else {
                eval_ternary(else_branch.trim(), ctx)
            };
        }
    }
    eval_or(expr, ctx)
}

fn eval_or(expr: &str, ctx: &ActivationContext) -> Value {
    if let Some(parts) = split_keyword(expr, "or") {
        let result = parts.iter().any(|part| truthy(&eval_and(part.trim(), ctx)));
        return Value::Bool(result);
    }
    eval_and(expr, ctx)
}

fn eval_and(expr: &str, ctx: &ActivationContext) -> Value {
    if let Some(parts) = split_keyword(expr, "and") {
        let result = parts.iter().all(|part| truthy(&eval_comparison(part.trim(), ctx)));
        return Value::Bool(result);
    }
    eval_comparison(expr, ctx)
}

const COMPARISON_OPERATORS: [&str; 6] = ["<=", ">=", "!=", "=", "<", ">"];

fn eval_comparison(expr: &str, ctx: &ActivationContext) -> Value {
    for op in COMPARISON_OPERATORS {
        if let Some((lhs, rhs)) = split_operator(expr, op) {
            let left = eval_unary(lhs.trim(), ctx);
            let right = eval_unary(rhs.trim(), ctx);
            let result = match op {
                "=" => values_equal(&left, &right),
                "!=" => !values_equal(&left, &right),
                "<" => compare_numeric(&left, &right).map(|o| o.is_lt()).unwrap_or(false),
                ">" => compare_numeric(&left, &right).map(|o| o.is_gt()).unwrap_or(false),
                "<=" => compare_numeric(&left, &right).map(|o| o.is_le()).unwrap_or(false),
                ">=" => compare_numeric(&left, &right).map(|o| o.is_ge()).unwrap_or(false),
                _ => unreachable!(),
            };
            return Value::Bool(result);
        }
    }
    eval_unary(expr, ctx)
}

fn eval_unary(expr: &str, ctx: &ActivationContext) -> Value {
    let expr = expr.trim();
    if let Some(inner) = strip_call(expr, "$not") {
        return Value::Bool(!truthy(&eval_ternary(inner, ctx)));
    }
    if let Some(inner) = strip_call(expr, "$exists") {
        return Value::Bool(!matches!(resolve_path(inner.trim(), ctx), Value::Null));
    }
    eval_literal(expr, ctx)
}

fn eval_literal(expr: &str, ctx: &ActivationContext) -> Value {
    let expr = expr.trim();
    if expr == "true" {
        return Value::Bool(true);
    }
    if expr == "false" {
        return Value::Bool(false);
    }
    if (expr.starts_with('"') && expr.ends_with('"') && expr.len() >= 2)
        || (expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2)
    {
        return Value::String(expr[1..expr.len() - 1].to_string());
    }
    if let Ok(n) = expr.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    resolve_path(expr, ctx)
}

/// `fn(...)`-shaped call stripping: returns the argument text if `expr` is
/// exactly `name(...)`.
fn strip_call<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    let expr = expr.trim();
    if !expr.starts_with(name) {
        return None;
    }
    let rest = expr[name.len()..].trim_start();
    let rest = rest.strip_prefix('(')?;
    let rest = rest.strip_suffix(')')?;
    Some(rest)
}

/// Split `expr` on the first top-level occurrence of `sep` (not nested
/// inside parentheses), returning `(before, after)`.
fn split_top_level(expr: &str, sep: char) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (index, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                return Some((&expr[..index], &expr[index + ch.len_utf8()..]));
            }
            _ => {}
        }
    }
    None
}

/// Split `expr` on every top-level occurrence of whitespace-delimited
/// keyword `kw` (e.g. `"and"`, `"or"`).
fn split_keyword<'a>(expr: &'a str, kw: &str) -> Option<Vec<&'a str>> {
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut last = 0;
    let bytes = expr.as_bytes();
    let kw_len = kw.len();
    let mut index = 0;
    let mut found = false;
    while index < bytes.len() {
        match bytes[index] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && index + kw_len <= bytes.len() && &expr[index..index + kw_len] == kw {
            let before_ok = index == 0 || !expr.as_bytes()[index - 1].is_ascii_alphanumeric();
            let after_ok = index + kw_len == bytes.len() || !bytes[index + kw_len].is_ascii_alphanumeric();
            if before_ok && after_ok && depth == 0 {
                parts.push(&expr[last..index]);
                last = index + kw_len;
                found = true;
                index += kw_len;
                continue;
            }
        }
        index += 1;
    }
    if !found {
        return None;
    }
    parts.push(&expr[last..]);
    Some(parts)
}

/// Split `expr` on the first top-level occurrence of operator `op`,
/// preferring the longest matching operator first (callers iterate `<=`
/// before `<`, etc.) so `<=` isn't mis-split as `<` followed by `=`.
fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let mut depth = 0i32;
    let bytes = expr.as_bytes();
    let op_len = op.len();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && index + op_len <= bytes.len() && &expr[index..index + op_len] == op {
            // avoid matching the `=` inside `!=`/`<=`/`>=` when scanning for
            // the bare operators `<`/`>`.
            let preceded_by_bang_or_cmp = index > 0 && matches!(bytes[index - 1], b'!' | b'<' | b'>');
            if op == "=" && preceded_by_bang_or_cmp {
                index += 1;
                continue;
            }
            return Some((&expr[..index], &expr[index + op_len..]));
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use serde_json::json;

    fn ctx(state: Value, payload: Value, input: Value) -> ActivationContext {
        ActivationContext {
            signal: Signal::new("task:ready", payload, None),
            state,
            input,
        }
    }

    #[test]
    fn single_expression_template_preserves_type() {
        let c = ctx(json!({"count": 3}), json!(null), json!(null));
        assert_eq!(expand("{{ state.count }}", &c), json!(3));
    }

    #[test]
    fn mixed_template_stringifies() {
        let c = ctx(json!({"count": 3}), json!(null), json!(null));
        assert_eq!(expand("count is {{ state.count }}!", &c), json!("count is 3!"));
    }

    #[test]
    fn missing_path_is_null_and_stringifies_empty() {
        let c = ctx(json!({}), json!(null), json!(null));
        assert_eq!(expand("{{ state.missing }}", &c), Value::Null);
        assert_eq!(expand("[{{ state.missing }}]", &c), json!("[]"));
    }

    #[test]
    fn exists_and_not() {
        let c = ctx(json!({"ready": true}), json!(null), json!(null));
        assert_eq!(expand("{{ $exists(state.ready) }}", &c), json!(true));
        assert_eq!(expand("{{ $exists(state.missing) }}", &c), json!(false));
        assert_eq!(expand("{{ $not(state.ready) }}", &c), json!(false));
    }

    #[test]
    fn comparisons_and_boolean_operators() {
        let c = ctx(json!({"count": 2}), json!(null), json!(null));
        assert_eq!(expand("{{ state.count >= 2 }}", &c), json!(true));
        assert_eq!(expand("{{ state.count < 2 }}", &c), json!(false));
        assert_eq!(expand("{{ state.count >= 2 and state.count <= 5 }}", &c), json!(true));
        assert_eq!(expand("{{ state.count = 9 or state.count = 2 }}", &c), json!(true));
    }

    #[test]
    fn ternary_selects_branch() {
        let c = ctx(json!({"ready": false}), json!(null), json!(null));
        assert_eq!(expand("{{ state.ready ? \"go\" : \"wait\" }}", &c), json!("wait"));
    }

    #[test]
    fn comparison_against_missing_is_false() {
        let c = ctx(json!({}), json!(null), json!(null));
        assert_eq!(expand("{{ state.missing = 1 }}", &c), json!(false));
    }

    #[test]
    fn signal_payload_path() {
        let c = ctx(json!(null), json!({"x": "y"}), json!(null));
        assert_eq!(expand("{{ signal.payload.x }}", &c), json!("y"));
        assert_eq!(expand("{{ signal.name }}", &c), json!("task:ready"));
    }

    #[test]
    fn input_reference() {
        let c = ctx(json!(null), json!(null), json!("hello"));
        assert_eq!(expand("{{ input }}", &c), json!("hello"));
    }
}
