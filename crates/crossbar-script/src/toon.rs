//! TOON: a compact, indentation-based encoding for JSON-shaped values.
//!
//! Scripts return structured data through `return_toon`; the decoder is
//! symmetric, so `decode(encode(x)) == x` for any JSON value. Arrays of
//! uniform flat objects collapse into a tabular form with one header and
//! one row per element; primitive arrays inline onto a single line.
//!
//! ```text
//! users[2]{id,name}:
//!   1,ada
//!   2,grace
//! tags[3]: a,b,c
//! owner:
//!   name: ada
//! ```

use serde_json::{Map, Number, Value};
use thiserror::Error;

const INDENT: &str = "  ";

#[derive(Debug, Error)]
pub enum ToonError {
    #[error("toon parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl ToonError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line: line + 1,
            message: message.into(),
        }
    }
}

// -- Encoding --

/// Encode a JSON value as TOON text
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => encode_fields(map, 0, &mut out),
        Value::Array(items) => encode_array(None, items, 0, &mut out),
        primitive => out.push_str(&primitive_token(primitive)),
    }
    out
}

fn encode_fields(map: &Map<String, Value>, depth: usize, out: &mut String) {
    for (key, value) in map {
        match value {
            Value::Object(inner) if inner.is_empty() => {
                push_line(out, depth, &format!("{}: {{}}", key_token(key)));
            }
            Value::Object(inner) => {
                push_line(out, depth, &format!("{}:", key_token(key)));
                encode_fields(inner, depth + 1, out);
            }
            Value::Array(items) => encode_array(Some(key), items, depth, out),
            primitive => {
                push_line(
                    out,
                    depth,
                    &format!("{}: {}", key_token(key), primitive_token(primitive)),
                );
            }
        }
    }
}

fn encode_array(key: Option<&str>, items: &[Value], depth: usize, out: &mut String) {
    let prefix = key.map(|k| key_token(k)).unwrap_or_default();
    let count = items.len();

    if items.is_empty() {
        push_line(out, depth, &format!("{prefix}[0]:"));
        return;
    }

    if items.iter().all(is_primitive) {
        let tokens: Vec<String> = items.iter().map(primitive_token).collect();
        push_line(out, depth, &format!("{prefix}[{count}]: {}", tokens.join(",")));
        return;
    }

    if let Some(fields) = tabular_fields(items) {
        let header: Vec<String> = fields.iter().map(|f| key_token(f)).collect();
        push_line(out, depth, &format!("{prefix}[{count}]{{{}}}:", header.join(",")));
        for item in items {
            let Value::Object(map) = item else { continue };
            let row: Vec<String> = fields
                .iter()
                .map(|f| primitive_token(map.get(f).unwrap_or(&Value::Null)))
                .collect();
            push_line(out, depth + 1, &row.join(","));
        }
        return;
    }

    // General form: one `-` item per element
    push_line(out, depth, &format!("{prefix}[{count}]:"));
    for item in items {
        match item {
            Value::Object(map) if map.is_empty() => push_line(out, depth + 1, "- {}"),
            Value::Object(map) => {
                push_line(out, depth + 1, "-");
                encode_fields(map, depth + 2, out);
            }
            Value::Array(inner) => {
                let mut nested = String::new();
                encode_array(None, inner, depth + 1, &mut nested);
                // Splice the `-` marker onto the nested array's header line
                let header_end = nested.find('\n').unwrap_or(nested.len());
                push_line(out, depth + 1, &format!("- {}", nested[..header_end].trim_start()));
                out.push_str(nested[header_end..].trim_start_matches('\n'));
            }
            primitive => push_line(out, depth + 1, &format!("- {}", primitive_token(primitive))),
        }
    }
}

/// Field names for the tabular form: every element must be a flat object
/// with the same key set, bare-safe field names, and primitive values
fn tabular_fields(items: &[Value]) -> Option<Vec<String>> {
    let first = match items.first() {
        Some(Value::Object(map)) if !map.is_empty() => map,
        _ => return None,
    };

    let fields: Vec<String> = first.keys().cloned().collect();

    // Quoted field names would collide with the `{…}` header delimiters
    if fields.iter().any(|f| key_token(f) != *f) {
        return None;
    }

    for item in items {
        let Value::Object(map) = item else { return None };
        if map.len() != fields.len() {
            return None;
        }
        for field in &fields {
            match map.get(field) {
                Some(value) if is_primitive(value) => {}
                _ => return None,
            }
        }
    }

    Some(fields)
}

fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn push_line(out: &mut String, depth: usize, content: &str) {
    out.push_str(&INDENT.repeat(depth));
    out.push_str(content);
    out.push('\n');
}

fn primitive_token(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_token(s),
        _ => quote(&value.to_string()),
    }
}

/// A string may appear bare only when it cannot be mistaken for any other
/// token kind: it must start with a letter or underscore, contain only
/// word characters, spaces, and a few safe punctuation marks, not end in
/// a space, and not collide with a keyword.
fn string_token(s: &str) -> String {
    let bare = !s.is_empty()
        && !matches!(s, "true" | "false" | "null" | "{}")
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && !s.ends_with(' ')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '.' | '@' | '/' | '-'));

    if bare { s.to_owned() } else { quote(s) }
}

fn key_token(key: &str) -> String {
    let bare = !key.is_empty()
        && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));

    if bare { key.to_owned() } else { quote(key) }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// -- Decoding --

/// Decode TOON text back into a JSON value
pub fn decode(input: &str) -> Result<Value, ToonError> {
    let lines: Vec<(usize, &str)> = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let Some(&(first_number, first_line)) = lines.first() else {
        return Err(ToonError::at(0, "empty document"));
    };
    let first = first_line.trim();

    // Root array: `[N]...` header on the first line, body after it
    if first.starts_with('[') {
        let mut cursor = 0usize;
        let value = decode_array_at(first, &lines[1..], &mut cursor, 0, first_number)?;
        if cursor != lines.len() - 1 {
            return Err(ToonError::at(lines[cursor + 1].0, "trailing content"));
        }
        return Ok(value);
    }

    // Single-line roots that are not key/value fields
    if lines.len() == 1 {
        if first == "{}" {
            return Ok(Value::Object(Map::new()));
        }
        if let Some(rest) = first.strip_prefix('"') {
            // A quoted token is a root string unless a key separator follows
            let (_, consumed) = unquote_prefix(rest, first_number)?;
            if !rest[consumed..].trim_start().starts_with([':', '[']) {
                return parse_token(first, first_number);
            }
        } else if !first.contains(':') {
            return parse_token(first, first_number);
        }
    }

    let mut cursor = 0usize;
    let value = decode_object(&lines, &mut cursor, 0)?;
    if cursor != lines.len() {
        let (number, _) = lines[cursor];
        return Err(ToonError::at(number, "trailing content"));
    }
    Ok(value)
}

fn indent_of(line: &str) -> usize {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    spaces / INDENT.len()
}

fn decode_object(lines: &[(usize, &str)], cursor: &mut usize, depth: usize) -> Result<Value, ToonError> {
    let mut map = Map::new();

    while *cursor < lines.len() {
        let (number, line) = lines[*cursor];
        let indent = indent_of(line);
        if indent < depth {
            break;
        }
        if indent > depth {
            return Err(ToonError::at(number, "unexpected indentation"));
        }

        let content = line.trim_start();
        let (key, rest) = split_key(content, number)?;

        if let Some(array_rest) = rest.strip_prefix('[') {
            *cursor += 1;
            let value = decode_array_at(&format!("[{array_rest}"), lines, cursor, depth, number)?;
            map.insert(key, value);
            continue;
        }

        let Some(after_colon) = rest.strip_prefix(':') else {
            return Err(ToonError::at(number, "expected ':' after key"));
        };
        let payload = after_colon.trim();
        *cursor += 1;

        if payload.is_empty() {
            // Nested object follows, or nothing (empty object written bare)
            let value = if *cursor < lines.len() && indent_of(lines[*cursor].1) > depth {
                decode_object(lines, cursor, depth + 1)?
            } else {
                Value::Object(Map::new())
            };
            map.insert(key, value);
        } else if payload == "{}" {
            map.insert(key, Value::Object(Map::new()));
        } else {
            map.insert(key, parse_token(payload, number)?);
        }
    }

    Ok(Value::Object(map))
}

/// Parse an array whose header (starting at `[`) has been split off its
/// key. `header` is e.g. `[3]: a,b,c` or `[2]{id,name}:` or `[4]:`.
fn decode_array_at(
    header: &str,
    lines: &[(usize, &str)],
    cursor: &mut usize,
    depth: usize,
    number: usize,
) -> Result<Value, ToonError> {
    let rest = header
        .strip_prefix('[')
        .ok_or_else(|| ToonError::at(number, "expected array header"))?;
    let close = rest
        .find(']')
        .ok_or_else(|| ToonError::at(number, "unterminated array length"))?;
    let count: usize = rest[..close]
        .trim()
        .parse()
        .map_err(|_| ToonError::at(number, "invalid array length"))?;
    let after = &rest[close + 1..];

    // Tabular form: [N]{f1,f2}:
    if let Some(fields_part) = after.strip_prefix('{') {
        let fields_end = fields_part
            .find('}')
            .ok_or_else(|| ToonError::at(number, "unterminated field list"))?;
        // Field names are always bare in tabular headers
        let fields: Vec<String> = fields_part[..fields_end]
            .split(',')
            .map(|f| f.trim().to_owned())
            .collect();

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let (row_number, row_line) = *lines
                .get(*cursor)
                .ok_or_else(|| ToonError::at(number, "missing table row"))?;
            if indent_of(row_line) <= depth {
                return Err(ToonError::at(row_number, "missing table row"));
            }
            *cursor += 1;

            let tokens = split_tokens(row_line.trim(), row_number)?;
            if tokens.len() != fields.len() {
                return Err(ToonError::at(row_number, "row width does not match header"));
            }
            let mut object = Map::new();
            for (field, token) in fields.iter().zip(tokens) {
                object.insert(field.clone(), parse_token(&token, row_number)?);
            }
            items.push(Value::Object(object));
        }
        return Ok(Value::Array(items));
    }

    let after = after
        .strip_prefix(':')
        .ok_or_else(|| ToonError::at(number, "expected ':' after array length"))?;
    let inline = after.trim();

    // Inline primitive form: [N]: a,b,c
    if !inline.is_empty() {
        let tokens = split_tokens(inline, number)?;
        if tokens.len() != count {
            return Err(ToonError::at(number, "inline array length mismatch"));
        }
        return tokens
            .iter()
            .map(|token| parse_token(token, number))
            .collect::<Result<Vec<Value>, ToonError>>()
            .map(Value::Array);
    }

    if count == 0 {
        return Ok(Value::Array(Vec::new()));
    }

    // General form: `-` items at depth + 1
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let (item_number, item_line) = *lines
            .get(*cursor)
            .ok_or_else(|| ToonError::at(number, "missing array item"))?;
        if indent_of(item_line) != depth + 1 {
            return Err(ToonError::at(item_number, "missing array item"));
        }
        let content = item_line.trim_start();
        let Some(marker_rest) = content.strip_prefix('-') else {
            return Err(ToonError::at(item_number, "expected '-' item marker"));
        };
        let payload = marker_rest.trim_start();
        *cursor += 1;

        if payload.is_empty() {
            // Object item: fields at depth + 2
            items.push(decode_object(lines, cursor, depth + 2)?);
        } else if payload == "{}" {
            items.push(Value::Object(Map::new()));
        } else if payload.starts_with('[') {
            items.push(decode_array_at(payload, lines, cursor, depth + 1, item_number)?);
        } else {
            items.push(parse_token(payload, item_number)?);
        }
    }

    Ok(Value::Array(items))
}

/// Split a field line into its (possibly quoted) key and the remainder
/// starting at `:` or `[`
fn split_key(content: &str, number: usize) -> Result<(String, &str), ToonError> {
    if let Some(rest) = content.strip_prefix('"') {
        let (key, consumed) = unquote_prefix(rest, number)?;
        return Ok((key, &rest[consumed..]));
    }

    let end = content
        .find([':', '['])
        .ok_or_else(|| ToonError::at(number, "expected ':' after key"))?;
    Ok((content[..end].trim_end().to_owned(), &content[end..]))
}

/// Parse a quoted string starting after the opening quote; returns the
/// unescaped value and the number of bytes consumed including the close
fn unquote_prefix(rest: &str, number: usize) -> Result<(String, usize), ToonError> {
    let mut out = String::new();
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(ToonError::at(number, "dangling escape"));
                };
                match escaped {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            let Some((_, hex)) = chars.next() else {
                                return Err(ToonError::at(number, "truncated \\u escape"));
                            };
                            code.push(hex);
                        }
                        let point = u32::from_str_radix(&code, 16)
                            .map_err(|_| ToonError::at(number, "invalid \\u escape"))?;
                        out.push(
                            char::from_u32(point)
                                .ok_or_else(|| ToonError::at(number, "invalid \\u code point"))?,
                        );
                    }
                    other => return Err(ToonError::at(number, format!("unknown escape '\\{other}'"))),
                }
            }
            c => out.push(c),
        }
    }

    Err(ToonError::at(number, "unterminated string"))
}

/// Split a comma-separated token list, honoring quoted strings
fn split_tokens(input: &str, number: usize) -> Result<Vec<String>, ToonError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
        } else if c == '"' {
            in_quotes = true;
            current.push(c);
        } else if c == ',' {
            tokens.push(current.trim().to_owned());
            current.clear();
        } else {
            current.push(c);
        }
    }

    if in_quotes {
        return Err(ToonError::at(number, "unterminated string in list"));
    }
    tokens.push(current.trim().to_owned());
    Ok(tokens)
}

/// Parse one primitive token
fn parse_token(token: &str, number: usize) -> Result<Value, ToonError> {
    if let Some(rest) = token.strip_prefix('"') {
        let (value, consumed) = unquote_prefix(rest, number)?;
        if rest[consumed..].trim().is_empty() {
            return Ok(Value::String(value));
        }
        return Err(ToonError::at(number, "trailing content after string"));
    }

    match token {
        "null" => return Ok(Value::Null),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Ok(n) = token.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = token.parse::<u64>() {
        return Ok(Value::Number(n.into()));
    }
    if token.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+') {
        if let Ok(f) = token.parse::<f64>() {
            if let Some(n) = Number::from_f64(f) {
                return Ok(Value::Number(n));
            }
        }
    }

    Ok(Value::String(token.to_owned()))
}
