// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

//! A JSONPath subset, as used by kubectl, for addressing fields of a node record.
//!
//! Supported: optional `{}` wrapping, leading `$`, `.field`, `field\.with\.dots`,
//! `['quoted key']`, `[0]`, `[*]`, `.*` and `[?(@.path=="value")]`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
    Filter(Vec<Segment>, String),
}

/// Evaluates `path` against `root`. Returns every matching value, possibly none.
pub fn evaluate<'a>(path: &str, root: &'a Value) -> Result<Vec<&'a Value>, String> {
    let segments = parse(path)?;
    Ok(apply(&segments, root))
}

fn apply<'a>(segments: &[Segment], root: &'a Value) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match segment {
                Segment::Field(name) => {
                    if let Some(v) = value.get(name.as_str()) {
                        next.push(v);
                    }
                }
                Segment::Index(i) => {
                    if let Some(v) = value.as_array().and_then(|a| a.get(*i)) {
                        next.push(v);
                    }
                }
                Segment::Wildcard => match value {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
                Segment::Filter(rel, expected) => {
                    if let Value::Array(items) = value {
                        next.extend(items.iter().filter(|item| {
                            apply(rel, item).into_iter().any(|v| scalar_eq(v, expected))
                        }));
                    }
                }
            }
        }
        current = next;
    }
    current
}

fn scalar_eq(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

fn parse(path: &str) -> Result<Vec<Segment>, String> {
    let mut body = path.trim();
    if let Some(inner) = body.strip_prefix('{') {
        body = inner
            .strip_suffix('}')
            .ok_or_else(|| "unbalanced braces".to_string())?
            .trim();
    }
    body = body.strip_prefix('$').unwrap_or(body);
    if body.is_empty() {
        return Err("empty path".to_string());
    }

    let chars: Vec<char> = body.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    // A bare leading name is treated like `.name`.
    let mut expect_name = !matches!(chars[0], '.' | '[');

    while i < chars.len() || expect_name {
        if expect_name {
            expect_name = false;
            if chars.get(i) == Some(&'*') {
                segments.push(Segment::Wildcard);
                i += 1;
                continue;
            }
            let (name, next) = read_name(&chars, i);
            if name.is_empty() {
                return Err(format!("expected field name at offset {}", i));
            }
            segments.push(Segment::Field(name));
            i = next;
            continue;
        }
        match chars[i] {
            '.' => {
                expect_name = true;
                i += 1;
            }
            '[' => {
                let close = find_bracket_end(&chars, i)?;
                let inner: String = chars[i + 1..close].iter().collect();
                segments.push(parse_bracket(inner.trim())?);
                i = close + 1;
            }
            c => return Err(format!("unexpected character {:?} at offset {}", c, i)),
        }
    }
    Ok(segments)
}

fn read_name(chars: &[char], mut i: usize) -> (String, usize) {
    let mut name = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                name.push(chars[i + 1]);
                i += 2;
            }
            '.' | '[' => break,
            c => {
                name.push(c);
                i += 1;
            }
        }
    }
    (name, i)
}

fn find_bracket_end(chars: &[char], open: usize) -> Result<usize, String> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for (offset, &c) in chars[open..].iter().enumerate() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + offset);
                }
            }
            _ => {}
        }
    }
    Err(format!("unterminated '[' at offset {}", open))
}

fn unquote(s: &str) -> Option<&str> {
    let s = s.trim();
    s.strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
}

fn parse_bracket(inner: &str) -> Result<Segment, String> {
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(key) = unquote(inner) {
        return Ok(Segment::Field(key.to_string()));
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Ok(Segment::Index(index));
    }
    if let Some(expr) = inner.strip_prefix("?(").and_then(|r| r.strip_suffix(')')) {
        let (lhs, rhs) = expr
            .split_once("==")
            .ok_or_else(|| format!("unsupported filter {:?}", expr))?;
        let rel = lhs
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| format!("filter must start with '@': {:?}", expr))?;
        let expected = unquote(rhs).unwrap_or(rhs.trim()).to_string();
        let rel_segments = if rel.is_empty() { Vec::new() } else { parse(rel)? };
        return Ok(Segment::Filter(rel_segments, expected));
    }
    Err(format!("unsupported subscript [{}]", inner))
}
