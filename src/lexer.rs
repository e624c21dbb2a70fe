//! Conservative KQL tokenizer
//!
//! The worker never needs a full parse tree. It needs to know, for every
//! character, whether it sits inside a string literal, a comment, or a
//! bracketed sub-expression. This lexer provides exactly that and nothing
//! more. It never fails: malformed input produces unterminated string
//! tokens or single-character punctuation.
//!
//! All offsets are byte offsets into the source text.

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of spaces, tabs and line breaks
    Whitespace,
    /// A `//` comment up to (not including) the end of the line
    Comment,
    /// A string literal in any of the KQL quoting styles
    String {
        /// `false` when the closing delimiter is missing
        terminated: bool,
    },
    /// An identifier or keyword
    Identifier,
    /// A numeric literal, including timespan suffixes such as `1d`
    Number,
    /// A multi-character operator such as `==` or `<|`
    Operator,
    /// Any other single character
    Punctuation(char),
}

/// A token with its byte span in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl Token {
    /// Source text covered by this token
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Whitespace and comments
    #[must_use]
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Check for a specific punctuation character
    #[must_use]
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punctuation(ch)
    }

    /// Check for a specific identifier (case-sensitive, as KQL keywords are)
    #[must_use]
    pub fn is_word(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text(source) == word
    }

    /// Opening bracket: `(`, `[` or `{`
    #[must_use]
    pub fn opens_bracket(&self) -> bool {
        matches!(self.kind, TokenKind::Punctuation('(' | '[' | '{'))
    }

    /// Closing bracket: `)`, `]` or `}`
    #[must_use]
    pub fn closes_bracket(&self) -> bool {
        matches!(self.kind, TokenKind::Punctuation(')' | ']' | '}'))
    }

    /// Number of line breaks inside a whitespace token
    #[must_use]
    pub fn line_breaks(&self, source: &str) -> usize {
        match self.kind {
            TokenKind::Whitespace => self.text(source).bytes().filter(|b| *b == b'\n').count(),
            _ => 0,
        }
    }
}

/// Operators the lexer keeps together so `==` is never read as two `=`
const OPERATORS: [&str; 9] = ["==", "!=", "<=", ">=", "=~", "!~", "=>", "<|", ".."];

/// Streaming tokenizer over a source string
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at the start of `source`
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.source.as_bytes().get(self.pos + ahead).copied()
    }

    fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() && pred(bytes[self.pos]) {
            self.pos += 1;
        }
    }

    /// `'...'` or `"..."` with backslash escapes; cannot span lines
    fn quoted(&mut self, quote: u8) -> TokenKind {
        self.pos += 1;
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => break,
                b'\\' if matches!(self.peek(1), Some(b) if b != b'\n') => self.pos += 2,
                b if b == quote => {
                    self.pos += 1;
                    return TokenKind::String { terminated: true };
                }
                _ => self.pos += 1,
            }
        }
        TokenKind::String { terminated: false }
    }

    /// `@'...'` style literal: no escapes, a doubled quote stands for itself
    fn verbatim(&mut self, quote: u8) -> TokenKind {
        self.pos += 1;
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => break,
                b if b == quote && self.peek(1) == Some(quote) => self.pos += 2,
                b if b == quote => {
                    self.pos += 1;
                    return TokenKind::String { terminated: true };
                }
                _ => self.pos += 1,
            }
        }
        TokenKind::String { terminated: false }
    }

    /// ```` ``` ```` or `~~~` block, may span lines
    fn multi_line(&mut self, fence: &str) -> TokenKind {
        let body = self.pos + fence.len();
        match self.source[body..].find(fence) {
            Some(idx) => {
                self.pos = body + idx + fence.len();
                TokenKind::String { terminated: true }
            }
            None => {
                self.pos = self.source.len();
                TokenKind::String { terminated: false }
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        loop {
            self.eat_while(|b| b.is_ascii_alphanumeric() || b == b'_');
            let fraction = self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit());
            if !fraction {
                return TokenKind::Number;
            }
            self.pos += 1;
        }
    }

    fn operator_or_punctuation(&mut self) -> TokenKind {
        let rest = &self.source[self.pos..];
        if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            self.pos += op.len();
            return TokenKind::Operator;
        }
        // Non-empty: callers only get here while `pos < len`
        let ch = rest.chars().next().unwrap_or('\0');
        self.pos += ch.len_utf8().max(1);
        TokenKind::Punctuation(ch)
    }
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let start = self.pos;
        let first = self.peek(0)?;
        let kind = match (first, self.peek(1), self.peek(2)) {
            (b' ' | b'\t' | b'\r' | b'\n', _, _) => {
                self.eat_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
                TokenKind::Whitespace
            }
            (b'/', Some(b'/'), _) => {
                self.eat_while(|b| b != b'\n');
                TokenKind::Comment
            }
            (b'\'' | b'"', _, _) => self.quoted(first),
            (b'@', Some(q @ (b'\'' | b'"')), _) => {
                self.pos += 1;
                self.verbatim(q)
            }
            (b'h' | b'H', Some(q @ (b'\'' | b'"')), _) => {
                self.pos += 1;
                self.quoted(q)
            }
            (b'h' | b'H', Some(b'@'), Some(q @ (b'\'' | b'"'))) => {
                self.pos += 2;
                self.verbatim(q)
            }
            (b'`', Some(b'`'), Some(b'`')) => self.multi_line("```"),
            (b'~', Some(b'~'), Some(b'~')) => self.multi_line("~~~"),
            (b, _, _) if is_identifier_start(b) => {
                self.eat_while(is_identifier_continue);
                TokenKind::Identifier
            }
            (b'0'..=b'9', _, _) => self.number(),
            _ => self.operator_or_punctuation(),
        };
        Some(Token {
            kind,
            start,
            end: self.pos,
        })
    }
}

/// Tokenize the whole source, trivia included
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).collect()
}

/// Tokenize the source, dropping whitespace and comments
#[must_use]
pub fn significant_tokens(source: &str) -> Vec<Token> {
    Lexer::new(source).filter(|t| !t.is_trivia()).collect()
}

/// Decode the value of a string literal token
///
/// Escapes are resolved for regular literals, doubled quotes for verbatim
/// literals. Unterminated literals decode up to the end of the token.
#[must_use]
pub fn unquote(literal: &str) -> String {
    let body = literal.strip_prefix(['h', 'H']).unwrap_or(literal);
    for fence in ["```", "~~~"] {
        if let Some(inner) = body.strip_prefix(fence) {
            return inner.strip_suffix(fence).unwrap_or(inner).to_string();
        }
    }
    let (verbatim, body) = match body.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let mut chars = body.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let mut out = String::with_capacity(body.len());
    while let Some(ch) = chars.next() {
        if ch == quote {
            if verbatim && chars.clone().next() == Some(quote) {
                chars.next();
                out.push(quote);
                continue;
            }
            break;
        }
        if ch == '\\' && !verbatim {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => break,
            }
            continue;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        significant_tokens(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_pipe_inside_string_is_not_punctuation() {
        let source = "T | where Name == 'a | b; c'";
        let tokens = significant_tokens(source);
        let pipes = tokens.iter().filter(|t| t.is_punct('|')).count();
        assert_eq!(pipes, 1);
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::String { terminated: true });
        assert_eq!(last.text(source), "'a | b; c'");
    }

    #[test]
    fn test_tokens_cover_source() {
        let source = "let x = 1; // note\nT | take x";
        let tokens = tokenize(source);
        let rebuilt: String = tokens.iter().map(|t| t.text(source)).collect();
        assert_eq!(rebuilt, source);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Comment));
    }

    #[test]
    fn test_unterminated_string_stops_at_line_end() {
        let source = "print 'abc\nT";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[1].kind, TokenKind::String { terminated: false });
        assert_eq!(tokens[1].text(source), "'abc");
        assert!(tokens[2].is_word(source, "T"));
    }

    #[test]
    fn test_escaped_quote() {
        let source = r#"print "a\"b" "#;
        let tokens = significant_tokens(source);
        assert_eq!(tokens[1].text(source), r#""a\"b""#);
        assert_eq!(unquote(tokens[1].text(source)), "a\"b");
    }

    #[test]
    fn test_verbatim_string_doubled_quote() {
        let source = r"print @'c:\dir''s' | take 1";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[1].text(source), r"@'c:\dir''s'");
        assert_eq!(unquote(tokens[1].text(source)), r"c:\dir's");
        assert!(tokens[2].is_punct('|'));
    }

    #[test]
    fn test_obfuscated_string() {
        let source = "print h'secret'";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[1].kind, TokenKind::String { terminated: true });
        assert_eq!(unquote(tokens[1].text(source)), "secret");
    }

    #[test]
    fn test_multi_line_string() {
        let source = "print ```a\n\nb```\n| take 1";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[1].kind, TokenKind::String { terminated: true });
        assert_eq!(unquote(tokens[1].text(source)), "a\n\nb");
        assert!(tokens[2].is_punct('|'));
    }

    #[test]
    fn test_unterminated_multi_line_string_runs_to_end() {
        let source = "print ~~~abc\n\nT";
        let tokens = significant_tokens(source);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].end, source.len());
        assert_eq!(tokens[1].kind, TokenKind::String { terminated: false });
    }

    #[test]
    fn test_operators_and_numbers() {
        assert_eq!(
            kinds("x == 1.5 and y != 10ms"),
            vec![
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Number,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Number,
            ]
        );
        assert_eq!(
            kinds(".set T <| print 1"),
            vec![
                TokenKind::Punctuation('.'),
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_non_ascii_punctuation() {
        let source = "print 'ü' ß";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[2].kind, TokenKind::Punctuation('ß'));
        assert_eq!(tokens[2].end, source.len());
    }

    #[test]
    fn test_line_breaks() {
        let source = "a\n  \nb";
        let tokens = tokenize(source);
        assert_eq!(tokens[1].line_breaks(source), 2);
        assert_eq!(tokens[0].line_breaks(source), 0);
    }
}
