#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// Lowercase identifier: locals, parameters, method names.
    Ident,
    /// Uppercase identifier: a constant reference or definition.
    Const,
    LiteralInt,
    LiteralString,
    KwDef,
    KwEnd,
    KwNil,
    LParen,
    RParen,
    Comma,
    Assign,
    Newline,
    /// A byte sequence the lexer does not understand.
    Unknown,
    Eof,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub end: u32,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start as usize..self.end as usize]
    }
}

/// Tokenize a whole file. Whitespace and `#` comments are skipped; line ends
/// are kept because the grammar is line oriented. The final token is always
/// `Eof`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let start = pos;
        let b = bytes[pos];
        let kind = match b {
            b'\n' => {
                pos += 1;
                TokenKind::Newline
            }
            b' ' | b'\t' | b'\r' => {
                pos += 1;
                continue;
            }
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'=' => {
                pos += 1;
                TokenKind::Assign
            }
            b'"' => {
                pos += 1;
                while pos < bytes.len() && bytes[pos] != b'"' && bytes[pos] != b'\n' {
                    if bytes[pos] == b'\\' && pos + 1 < bytes.len() {
                        pos += 1;
                    }
                    pos += 1;
                }
                if pos < bytes.len() && bytes[pos] == b'"' {
                    pos += 1;
                }
                TokenKind::LiteralString
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                TokenKind::LiteralInt
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                match &source[start..pos] {
                    "def" => TokenKind::KwDef,
                    "end" => TokenKind::KwEnd,
                    "nil" => TokenKind::KwNil,
                    text => {
                        if text.starts_with(|c: char| c.is_ascii_uppercase()) {
                            TokenKind::Const
                        } else {
                            TokenKind::Ident
                        }
                    }
                }
            }
            _ => {
                pos += 1;
                TokenKind::Unknown
            }
        };

        tokens.push(Token {
            kind,
            start: start as u32,
            end: pos as u32,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        start: bytes.len() as u32,
        end: bytes.len() as u32,
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::TokenKind::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> Vec<(TokenKind, &str)> {
        tokenize(source)
            .into_iter()
            .map(|t| (t.kind, t.text(source)))
            .collect()
    }

    #[test]
    fn statements_and_keywords() {
        assert_eq!(
            lex("def greet(name)\nend\n"),
            vec![
                (KwDef, "def"),
                (Ident, "greet"),
                (LParen, "("),
                (Ident, "name"),
                (RParen, ")"),
                (Newline, "\n"),
                (KwEnd, "end"),
                (Newline, "\n"),
                (Eof, ""),
            ]
        );
    }

    #[test]
    fn constants_and_literals() {
        assert_eq!(
            lex("MAX = 10 # limit\ns = \"hi\\\"\""),
            vec![
                (Const, "MAX"),
                (Assign, "="),
                (LiteralInt, "10"),
                (Newline, "\n"),
                (Ident, "s"),
                (Assign, "="),
                (LiteralString, "\"hi\\\"\""),
                (Eof, ""),
            ]
        );
    }

    #[test]
    fn unterminated_string_stops_at_line_end() {
        assert_eq!(
            lex("s = \"oops\nx"),
            vec![
                (Ident, "s"),
                (Assign, "="),
                (LiteralString, "\"oops"),
                (Newline, "\n"),
                (Ident, "x"),
                (Eof, ""),
            ]
        );
    }
}
