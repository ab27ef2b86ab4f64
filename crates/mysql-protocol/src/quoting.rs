//! Identifier quoting helpers.

/// Quote an identifier with backticks, doubling embedded backticks.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for c in name.chars() {
        if c == '`' {
            quoted.push('`');
        }
        quoted.push(c);
    }
    quoted.push('`');
    quoted
}

/// Strip a matching pair of quote characters and undouble embedded quotes.
///
/// Accepts backtick, single-quote, and double-quote delimiters. Text that is
/// not wrapped in a matching pair is returned unchanged, so the operation is
/// idempotent.
#[must_use]
pub fn unquote_identifier(name: &str) -> String {
    let bytes = name.as_bytes();
    let delim = match bytes.first() {
        Some(&c @ (b'`' | b'\'' | b'"')) if bytes.len() >= 2 && bytes[bytes.len() - 1] == c => c,
        _ => return name.to_string(),
    };
    let inner = &name[1..name.len() - 1];
    let delim = delim as char;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == delim && chars.peek() == Some(&delim) {
            chars.next();
        }
        out.push(c);
    }
    out
}

/// Escape a string literal for inlining into a text-protocol statement.
///
/// The value is wrapped in single quotes; quote characters, backslashes, NUL
/// and the line separators are escaped so the literal cannot terminate early.
#[must_use]
pub fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_quote_simple() {
        assert_eq!(quote_identifier("orders"), "`orders`");
    }

    #[test]
    fn test_quote_embedded_backtick() {
        assert_eq!(quote_identifier("bo`o"), "`bo``o`");
    }

    #[test]
    fn test_unquote_backtick() {
        assert_eq!(unquote_identifier("`bo``o`"), "bo`o");
        assert_eq!(unquote_identifier("`orders`"), "orders");
    }

    #[test]
    fn test_unquote_unquoted_passthrough() {
        assert_eq!(unquote_identifier("orders"), "orders");
        assert_eq!(unquote_identifier("`mismatch'"), "`mismatch'");
    }

    #[test]
    fn test_unquote_other_delimiters() {
        assert_eq!(unquote_identifier("'it''s'"), "it's");
        assert_eq!(unquote_identifier("\"col\""), "col");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_string_literal("it's"), "'it''s'");
        assert_eq!(escape_string_literal("a\\b"), "'a\\\\b'");
        assert_eq!(escape_string_literal("line\nbreak"), "'line\\nbreak'");
    }

    proptest! {
        #[test]
        fn prop_quote_unquote_roundtrip(name in "[a-zA-Z0-9`_ ]{0,24}") {
            prop_assert_eq!(unquote_identifier(&quote_identifier(&name)), name);
        }

        #[test]
        fn prop_unquote_idempotent(name in "`?[a-zA-Z0-9_]{0,16}`?") {
            let once = unquote_identifier(&name);
            prop_assert_eq!(unquote_identifier(&once.clone()), once);
        }
    }
}
