//! Python string literals: decoding what the page object declares and encoding
//! replacement selectors.

/// Decode a plain Python string literal (optionally `r`/`u` prefixed).
///
/// Returns `None` for f-strings, byte strings and anything that is not a
/// single complete literal.
pub fn decode_string_literal(text: &str) -> Option<String> {
    let prefix_len = text.find(['\'', '"'])?;
    let prefix = text[..prefix_len].to_ascii_lowercase();
    if !prefix.chars().all(|c| c == 'r' || c == 'u') {
        return None;
    }

    let body = &text[prefix_len..];
    let quote = ["'''", "\"\"\"", "'", "\""]
        .into_iter()
        .find(|q| body.starts_with(q) && body.ends_with(q) && body.len() >= 2 * q.len())?;
    let inner = &body[quote.len()..body.len() - quote.len()];

    Some(if prefix.contains('r') { inner.to_string() } else { unescape(inner) })
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            // line continuation
            Some('\n') => {}
            // unknown escapes keep their backslash, as Python does
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Encode `value` as a Python literal that decodes back to exactly `value`.
///
/// Selectors routinely contain both quote kinds, so the triple-single-quoted
/// form is used whenever it is unambiguous; otherwise an escaped double-quoted
/// literal.
pub fn python_string_literal(value: &str) -> String {
    let triple_safe = !value.contains("'''")
        && !value.ends_with('\'')
        && !value.contains(['\\', '\n', '\r']);

    if triple_safe {
        return format!("'''{}'''", value);
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
