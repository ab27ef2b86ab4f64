//! Lexical scanner over SQL text.
//!
//! The tokenizer does not understand SQL; it only classifies enough lexical
//! structure to split statements, skip comments, and locate bound-parameter
//! markers. Scanning is forward-only: already-consumed input is never
//! re-read, though the position can be reset explicitly by callers that own
//! the text.

/// Classification of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A recognized SQL keyword.
    Keyword,
    /// An identifier (bare or quoted).
    Identifier,
    /// A string literal.
    Literal,
    /// A comment (only produced when `return_comments` is set).
    Comment,
    /// A bound-parameter marker (`@name` or `?name`).
    Parameter,
    /// A single punctuation character.
    Punctuation,
}

/// One scanned token with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan<'a> {
    /// Exact token text, including any quote characters.
    pub text: &'a str,
    /// Lexical classification.
    pub kind: TokenKind,
    /// Whether the token came from a quoted span.
    pub quoted: bool,
}

const KEYWORDS: &[&str] = &[
    "AND", "AS", "BEGIN", "BY", "CALL", "CREATE", "DELETE", "DELIMITER", "DROP", "END", "FROM",
    "GROUP", "INSERT", "INTO", "LIMIT", "NOT", "NULL", "OR", "ORDER", "PROCEDURE", "REPLACE",
    "SELECT", "SET", "TABLE", "UPDATE", "VALUES", "WHERE",
];

/// Lexical scanner over a SQL statement.
#[derive(Debug, Clone)]
pub struct SqlTokenizer<'a> {
    sql: &'a str,
    bytes: &'a [u8],
    position: usize,
    start: usize,
    stop: usize,
    quoted: bool,
    is_comment: bool,
    /// Include comment tokens in the stream instead of skipping them.
    pub return_comments: bool,
    /// Treat `"` as an identifier quote rather than a string quote.
    pub ansi_quotes: bool,
    /// Also recognize `[bracketed]` identifiers.
    pub sql_server_mode: bool,
    /// Honor backslash escapes inside quoted spans.
    pub backslash_escapes: bool,
}

impl<'a> SqlTokenizer<'a> {
    /// Create a tokenizer over the given SQL text.
    #[must_use]
    pub fn new(sql: &'a str) -> Self {
        Self {
            sql,
            bytes: sql.as_bytes(),
            position: 0,
            start: 0,
            stop: 0,
            quoted: false,
            is_comment: false,
            return_comments: false,
            ansi_quotes: false,
            sql_server_mode: false,
            backslash_escapes: true,
        }
    }

    /// Whether the last token came from a quoted span.
    #[must_use]
    pub fn quoted(&self) -> bool {
        self.quoted
    }

    /// Whether the last token is a comment.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    /// Byte offset of the last token's first character.
    #[must_use]
    pub fn start_index(&self) -> usize {
        self.start
    }

    /// Byte offset one past the last token's final character.
    #[must_use]
    pub fn stop_index(&self) -> usize {
        self.stop
    }

    /// Current scan position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the scan position (used by statement splitting when a token is
    /// re-interpreted as part of a longer delimiter).
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.bytes.len());
    }

    /// Override the last token's stop index.
    pub fn set_stop_index(&mut self, stop: usize) {
        self.stop = stop.min(self.bytes.len());
    }

    /// Check whether a token is a bound-parameter marker.
    ///
    /// `?x` is always a parameter; `@x` is, unless it starts with `@@`
    /// (a system variable).
    #[must_use]
    pub fn is_parameter(token: &str) -> bool {
        let bytes = token.as_bytes();
        match bytes.first() {
            Some(b'?') => true,
            Some(b'@') => bytes.len() > 1 && bytes[1] != b'@',
            _ => false,
        }
    }

    /// Return the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<&'a str> {
        if self.find_token() {
            Some(&self.sql[self.start..self.stop])
        } else {
            None
        }
    }

    /// Skip ahead to the next bound-parameter token.
    pub fn next_parameter(&mut self) -> Option<&'a str> {
        while self.find_token() {
            let token = &self.sql[self.start..self.stop];
            if !self.quoted && Self::is_parameter(token) {
                return Some(token);
            }
        }
        None
    }

    /// Return the next token with its classification.
    pub fn next_span(&mut self) -> Option<TokenSpan<'a>> {
        let text = self.next_token()?;
        let kind = self.classify(text);
        Some(TokenSpan {
            text,
            kind,
            quoted: self.quoted,
        })
    }

    /// Collect all remaining tokens.
    #[must_use]
    pub fn collect_tokens(mut self) -> Vec<&'a str> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }

    fn classify(&self, text: &str) -> TokenKind {
        if self.is_comment {
            return TokenKind::Comment;
        }
        if self.quoted {
            let first = text.as_bytes().first().copied();
            return match first {
                Some(b'\'') => TokenKind::Literal,
                Some(b'"') if !self.ansi_quotes => TokenKind::Literal,
                _ => TokenKind::Identifier,
            };
        }
        if Self::is_parameter(text) {
            return TokenKind::Parameter;
        }
        if text.len() == 1 && is_special(text.as_bytes()[0]) {
            return TokenKind::Punctuation;
        }
        if KEYWORDS
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(text))
        {
            return TokenKind::Keyword;
        }
        TokenKind::Identifier
    }

    fn find_token(&mut self) -> bool {
        self.quoted = false;
        self.is_comment = false;

        while self.position < self.bytes.len() {
            let c = self.bytes[self.position];
            self.position += 1;
            if c.is_ascii_whitespace() {
                continue;
            }

            if c == b'`' || c == b'\'' || c == b'"' || (c == b'[' && self.sql_server_mode) {
                self.read_quoted_token(c);
            } else if c == b'#' || c == b'-' || c == b'/' {
                if !self.read_comment(c) {
                    self.read_special_token();
                }
                if !self.is_comment && !self.return_comments && self.start == self.stop {
                    continue; // skipped comment
                }
            } else {
                self.read_unquoted_token();
            }

            if self.stop > self.start || self.is_comment {
                return true;
            }
        }
        false
    }

    fn read_comment(&mut self, c: u8) -> bool {
        // `/` only opens a comment before `*`; `--` needs trailing whitespace.
        if c == b'/' && self.bytes.get(self.position) != Some(&b'*') {
            return false;
        }
        if c == b'-' {
            let next = self.bytes.get(self.position);
            let after = self.bytes.get(self.position + 1);
            if next != Some(&b'-') || !after.is_some_and(|b| b.is_ascii_whitespace()) {
                return false;
            }
        }

        let starting = self.position - 1;
        let end = if self.bytes.get(self.position) == Some(&b'*') {
            match find_subslice(self.bytes, b"*/", self.position) {
                Some(index) => index + 2,
                None => self.bytes.len(),
            }
        } else {
            match self.bytes[self.position..].iter().position(|&b| b == b'\n') {
                Some(offset) => self.position + offset + 1,
                None => self.bytes.len(),
            }
        };

        self.position = end;
        // Mark an empty span so find_token knows the comment was consumed.
        self.start = end;
        self.stop = end;
        if self.return_comments {
            self.start = starting;
            self.is_comment = true;
        }
        true
    }

    fn read_unquoted_token(&mut self) {
        self.start = self.position - 1;
        if !is_special(self.bytes[self.start]) {
            while self.position < self.bytes.len() {
                let c = self.bytes[self.position];
                if c.is_ascii_whitespace() || is_special(c) {
                    break;
                }
                self.position += 1;
            }
        }
        self.stop = self.position;
    }

    fn read_special_token(&mut self) {
        self.start = self.position - 1;
        self.stop = self.position;
    }

    fn read_quoted_token(&mut self, open: u8) {
        let close = if open == b'[' { b']' } else { open };
        self.start = self.position - 1;
        let mut escaped = false;
        let mut found = false;

        while self.position < self.bytes.len() {
            let c = self.bytes[self.position];
            if c == close && !escaped {
                // A doubled quote character is a literal occurrence, not a
                // terminator.
                if open != b'[' && self.bytes.get(self.position + 1) == Some(&close) {
                    self.position += 2;
                    continue;
                }
                found = true;
                break;
            }
            if escaped {
                escaped = false;
            } else if c == b'\\' && self.backslash_escapes {
                escaped = true;
            }
            self.position += 1;
        }
        if found {
            self.position += 1;
        }
        self.quoted = found;
        self.stop = self.position;
    }
}

fn is_special(c: u8) -> bool {
    if c.is_ascii_alphanumeric() || c == b'$' || c == b'_' || c == b'.' || c >= 0x80 {
        return false;
    }
    c != b'@' && c != b'?'
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_simple() {
        let mut tokenizer = SqlTokenizer::new("SELECT * FROM Test");
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some("*"));
        assert_eq!(tokenizer.next_token(), Some("FROM"));
        assert_eq!(tokenizer.next_token(), Some("Test"));
        assert_eq!(tokenizer.next_token(), None);
    }

    #[test]
    fn test_dash_comment_returned_and_skipped() {
        let comment = "-- this is my comment\n";
        let sql = format!("SELECT {comment} * FROM Test");

        let mut tokenizer = SqlTokenizer::new(&sql);
        tokenizer.return_comments = true;
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some(comment));
        assert!(tokenizer.is_comment());
        assert_eq!(tokenizer.next_token(), Some("*"));

        let mut tokenizer = SqlTokenizer::new(&sql);
        tokenizer.return_comments = false;
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some("*"));
        assert_eq!(tokenizer.next_token(), Some("FROM"));
        assert_eq!(tokenizer.next_token(), Some("Test"));
        assert_eq!(tokenizer.next_token(), None);
    }

    #[test]
    fn test_dash_without_space_is_not_comment() {
        let mut tokenizer = SqlTokenizer::new("a--b");
        assert_eq!(tokenizer.next_token(), Some("a"));
        assert_eq!(tokenizer.next_token(), Some("-"));
        assert_eq!(tokenizer.next_token(), Some("-"));
        assert_eq!(tokenizer.next_token(), Some("b"));
    }

    #[test]
    fn test_hash_comment() {
        let sql = "SELECT #this is my comment\n * FROM Test";
        let mut tokenizer = SqlTokenizer::new(sql);
        tokenizer.return_comments = true;
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some("#this is my comment\n"));
        assert_eq!(tokenizer.next_token(), Some("*"));
    }

    #[test]
    fn test_block_comment() {
        let comment = "/* this is my comment \n lines 2 \n line 3*/";
        let sql = format!("SELECT{comment} * FROM Test");
        let mut tokenizer = SqlTokenizer::new(&sql);
        tokenizer.return_comments = true;
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some(comment));
        assert_eq!(tokenizer.next_token(), Some("*"));
        assert_eq!(tokenizer.next_token(), Some("FROM"));
        assert_eq!(tokenizer.next_token(), Some("Test"));
        assert_eq!(tokenizer.next_token(), None);
    }

    #[test]
    fn test_parameters() {
        let mut tokenizer = SqlTokenizer::new("SELECT * FROM Test WHERE id=@id AND id2=?id2");
        let tokens = tokenizer.clone().collect_tokens();
        assert_eq!(
            tokens,
            vec![
                "SELECT", "*", "FROM", "Test", "WHERE", "id", "=", "@id", "AND", "id2", "=",
                "?id2"
            ]
        );
        assert_eq!(tokenizer.next_parameter(), Some("@id"));
        assert_eq!(tokenizer.next_parameter(), Some("?id2"));
        assert_eq!(tokenizer.next_parameter(), None);
    }

    #[test]
    fn test_parameter_with_special_characters() {
        let mut tokenizer = SqlTokenizer::new("WHERE id=@id_$123");
        assert_eq!(tokenizer.next_parameter(), Some("@id_$123"));
    }

    #[test]
    fn test_system_variable_is_not_parameter() {
        let mut tokenizer = SqlTokenizer::new("SELECT 'a', 1, @@myVar");
        let tokens = tokenizer.clone().collect_tokens();
        assert_eq!(tokens, vec!["SELECT", "'a'", ",", "1", ",", "@@myVar"]);
        assert_eq!(tokenizer.next_parameter(), None);
    }

    #[test]
    fn test_quote_characters() {
        let mut tokenizer = SqlTokenizer::new("SELECT 'a', \"a\", `a`");
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some("'a'"));
        assert!(tokenizer.quoted());
        assert_eq!(tokenizer.next_token(), Some(","));
        assert!(!tokenizer.quoted());
        assert_eq!(tokenizer.next_token(), Some("\"a\""));
        assert!(tokenizer.quoted());
        assert_eq!(tokenizer.next_token(), Some(","));
        assert_eq!(tokenizer.next_token(), Some("`a`"));
        assert!(tokenizer.quoted());
        assert_eq!(tokenizer.next_token(), None);
    }

    #[test]
    fn test_doubled_quote_is_escape() {
        let mut tokenizer = SqlTokenizer::new("SELECT `bo``o`, 'it''s'");
        assert_eq!(tokenizer.next_token(), Some("SELECT"));
        assert_eq!(tokenizer.next_token(), Some("`bo``o`"));
        assert!(tokenizer.quoted());
        assert_eq!(tokenizer.next_token(), Some(","));
        assert_eq!(tokenizer.next_token(), Some("'it''s'"));
        assert!(tokenizer.quoted());
    }

    #[test]
    fn test_proc_body_punctuation() {
        let sql = "CREATE PROCEDURE spTest(testid INT, testname VARCHAR(20)) BEGIN SELECT 1; END";
        let tokens = SqlTokenizer::new(sql).collect_tokens();
        assert_eq!(
            tokens,
            vec![
                "CREATE", "PROCEDURE", "spTest", "(", "testid", "INT", ",", "testname",
                "VARCHAR", "(", "20", ")", ")", "BEGIN", "SELECT", "1", ";", "END"
            ]
        );
    }

    #[test]
    fn test_slash_tokens() {
        let tokens = SqlTokenizer::new("AND // OR").collect_tokens();
        assert_eq!(tokens, vec!["AND", "/", "/", "OR"]);
    }

    #[test]
    fn test_sql_server_mode() {
        let mut tokenizer = SqlTokenizer::new("SELECT `a`, [id] FROM [test]");
        tokenizer.sql_server_mode = true;
        tokenizer.next_token();
        assert_eq!(tokenizer.next_token(), Some("`a`"));
        assert!(tokenizer.quoted());
        tokenizer.next_token();
        assert_eq!(tokenizer.next_token(), Some("[id]"));
        assert!(tokenizer.quoted());
        tokenizer.next_token();
        assert_eq!(tokenizer.next_token(), Some("[test]"));
        assert!(tokenizer.quoted());
    }

    #[test]
    fn test_token_reassembly_loses_nothing() {
        let sql = "INSERT INTO t (a, b) VALUES ('x;y', -- note\n 2.5); SELECT 1;";
        let mut tokenizer = SqlTokenizer::new(sql);
        tokenizer.return_comments = true;
        let mut pieces = Vec::new();
        while let Some(token) = tokenizer.next_token() {
            pieces.push(token);
        }
        let reassembled: String = pieces.join("");
        let stripped: String = sql.chars().filter(|c| !c.is_whitespace()).collect();
        let reassembled_stripped: String =
            reassembled.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(reassembled_stripped, stripped);
    }

    #[test]
    fn test_spans() {
        let mut tokenizer = SqlTokenizer::new("SELECT name FROM t WHERE id = @id");
        let span = tokenizer.next_span().unwrap();
        assert_eq!(span.kind, TokenKind::Keyword);
        let span = tokenizer.next_span().unwrap();
        assert_eq!(span.kind, TokenKind::Identifier);
        tokenizer.next_span(); // FROM
        tokenizer.next_span(); // t
        tokenizer.next_span(); // WHERE
        tokenizer.next_span(); // id
        let eq = tokenizer.next_span().unwrap();
        assert_eq!(eq.kind, TokenKind::Punctuation);
        let param = tokenizer.next_span().unwrap();
        assert_eq!(param.kind, TokenKind::Parameter);
    }
}
