use crate::ast::{ConstDef, Expr, Item, MethodDef, Param, ParsedFile, Stmt};
use crate::lexer::{tokenize, Token, TokenKind};
use moss_core::{Diagnostic, FileRef, Loc};

/// Parse one file into its indexed form. Recovery is at statement
/// granularity: a malformed line is diagnosed and skipped, and parsing
/// resumes at the next line.
pub fn parse_file(file: FileRef, source: &str) -> ParsedFile {
    let tokens = tokenize(source);
    let mut parser = Parser {
        file,
        source,
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
    };

    let items = parser.items(true);
    ParsedFile {
        file,
        items,
        diagnostics: parser.diagnostics,
    }
}

struct Parser<'src> {
    file: FileRef,
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser<'_> {
    fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos];
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn text(&self, token: Token) -> String {
        token.text(self.source).to_string()
    }

    fn token_loc(&self, token: Token) -> Loc {
        Loc::new(self.file, token.start, token.end)
    }

    fn error_at(&mut self, token: Token, message: String) {
        self.diagnostics
            .push(Diagnostic::error(self.token_loc(token), message));
    }

    /// Skip to the start of the next line so one bad statement cannot poison
    /// the rest of the file.
    fn recover_to_line_end(&mut self) {
        while !self.at(TokenKind::Newline) && !self.at(TokenKind::Eof) {
            self.bump();
        }
        self.eat(TokenKind::Newline);
    }

    fn skip_blank_lines(&mut self) {
        while self.eat(TokenKind::Newline).is_some() {}
    }

    fn items(&mut self, top_level: bool) -> Vec<Item> {
        let mut items = Vec::new();
        loop {
            self.skip_blank_lines();
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::KwEnd if !top_level => break,
                TokenKind::KwEnd => {
                    let token = self.bump();
                    self.error_at(token, "`end` without a matching `def`".to_string());
                    self.recover_to_line_end();
                }
                TokenKind::KwDef if top_level => {
                    if let Some(def) = self.method_def() {
                        items.push(Item::MethodDef(def));
                    }
                }
                TokenKind::KwDef => {
                    let token = self.bump();
                    self.error_at(
                        token,
                        "nested method definitions are not allowed".to_string(),
                    );
                    self.recover_to_line_end();
                }
                _ => match self.statement(top_level) {
                    Some(item) => items.push(item),
                    None => self.recover_to_line_end(),
                },
            }
        }
        items
    }

    fn method_def(&mut self) -> Option<MethodDef> {
        let def_token = self.bump();

        let name_token = match self.eat(TokenKind::Ident) {
            Some(token) => token,
            None => {
                let token = self.peek();
                self.error_at(token, "expected a method name after `def`".to_string());
                self.recover_to_line_end();
                return None;
            }
        };

        let mut params = Vec::new();
        if self.eat(TokenKind::LParen).is_some() {
            loop {
                if self.eat(TokenKind::RParen).is_some() {
                    break;
                }
                match self.eat(TokenKind::Ident) {
                    Some(param) => {
                        params.push(Param {
                            name: self.text(param),
                            loc: self.token_loc(param),
                        });
                        if self.eat(TokenKind::Comma).is_none() && !self.at(TokenKind::RParen) {
                            let token = self.peek();
                            self.error_at(
                                token,
                                "expected `,` or `)` in parameter list".to_string(),
                            );
                            self.recover_to_line_end();
                            return None;
                        }
                    }
                    None => {
                        let token = self.peek();
                        self.error_at(token, "expected a parameter name".to_string());
                        self.recover_to_line_end();
                        return None;
                    }
                }
            }
        }
        self.eat(TokenKind::Newline);

        let body_items = self.items(false);
        let body = body_items
            .into_iter()
            .filter_map(|item| match item {
                Item::Stmt(stmt) => Some(stmt),
                // items() only produces statements below the top level
                _ => None,
            })
            .collect();

        let end_token = match self.eat(TokenKind::KwEnd) {
            Some(token) => token,
            None => {
                let token = self.peek();
                self.error_at(token, "expected `end` to close `def`".to_string());
                token
            }
        };

        Some(MethodDef {
            name: self.text(name_token),
            name_loc: self.token_loc(name_token),
            params,
            body,
            loc: Loc::new(self.file, def_token.start, end_token.end),
        })
    }

    fn statement(&mut self, top_level: bool) -> Option<Item> {
        let first = self.peek();
        match first.kind {
            // `CONST = expr` is a definition at the top level, an error in a
            // method body.
            TokenKind::Const if self.next_is_assign() => {
                let name_token = self.bump();
                self.bump();
                let value = self.expression()?;
                self.end_of_statement()?;
                if !top_level {
                    self.error_at(
                        name_token,
                        "constants may only be defined at the top level".to_string(),
                    );
                    return Some(Item::Stmt(Stmt::Expr(value)));
                }
                let loc = Loc::new(self.file, name_token.start, value.loc().end);
                Some(Item::ConstDef(ConstDef {
                    name: self.text(name_token),
                    name_loc: self.token_loc(name_token),
                    value,
                    loc,
                }))
            }
            TokenKind::Ident if self.next_is_assign() => {
                let target_token = self.bump();
                self.bump();
                let value = self.expression()?;
                self.end_of_statement()?;
                let loc = Loc::new(self.file, target_token.start, value.loc().end);
                Some(Item::Stmt(Stmt::Assign {
                    target: self.text(target_token),
                    target_loc: self.token_loc(target_token),
                    value,
                    loc,
                }))
            }
            _ => {
                let expr = self.expression()?;
                self.end_of_statement()?;
                Some(Item::Stmt(Stmt::Expr(expr)))
            }
        }
    }

    fn next_is_assign(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind == TokenKind::Assign)
            .unwrap_or(false)
    }

    fn end_of_statement(&mut self) -> Option<()> {
        if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) || self.at(TokenKind::KwEnd) {
            self.eat(TokenKind::Newline);
            Some(())
        } else {
            let token = self.peek();
            self.error_at(
                token,
                format!("unexpected `{}` after expression", self.text(token)),
            );
            None
        }
    }

    fn expression(&mut self) -> Option<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::LiteralInt => {
                let token = self.bump();
                Some(Expr::IntLit {
                    loc: self.token_loc(token),
                })
            }
            TokenKind::LiteralString => {
                let token = self.bump();
                Some(Expr::StrLit {
                    loc: self.token_loc(token),
                })
            }
            TokenKind::KwNil => {
                let token = self.bump();
                Some(Expr::NilLit {
                    loc: self.token_loc(token),
                })
            }
            TokenKind::Const => {
                let token = self.bump();
                Some(Expr::ConstRef {
                    name: self.text(token),
                    loc: self.token_loc(token),
                })
            }
            TokenKind::Ident => {
                let name_token = self.bump();
                if self.at(TokenKind::LParen) {
                    self.call_tail(name_token)
                } else {
                    Some(Expr::Ident {
                        name: self.text(name_token),
                        loc: self.token_loc(name_token),
                    })
                }
            }
            _ => {
                self.error_at(
                    token,
                    format!("expected an expression, found `{}`", self.text(token)),
                );
                None
            }
        }
    }

    fn call_tail(&mut self, name_token: Token) -> Option<Expr> {
        self.bump();

        let mut args = Vec::new();
        let close = loop {
            if let Some(close) = self.eat(TokenKind::RParen) {
                break close;
            }
            args.push(self.expression()?);
            if self.eat(TokenKind::Comma).is_none() && !self.at(TokenKind::RParen) {
                let token = self.peek();
                self.error_at(token, "expected `,` or `)` in argument list".to_string());
                return None;
            }
        };

        Some(Expr::Call {
            name: self.text(name_token),
            name_loc: self.token_loc(name_token),
            args,
            loc: Loc::new(self.file, name_token.start, close.end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moss_core::FileTable;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParsedFile {
        let mut files = FileTable::default();
        let file = files.enter("/w/test.moss", source.to_string());
        parse_file(file, source)
    }

    #[test]
    fn method_def_with_params_and_body() {
        let parsed = parse("def greet(name, prefix)\n  x = 1\n  puts(name)\nend\n");
        assert_eq!(parsed.diagnostics, vec![]);
        assert_eq!(parsed.items.len(), 1);

        match &parsed.items[0] {
            Item::MethodDef(def) => {
                assert_eq!(def.name, "greet");
                assert_eq!(
                    def.params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                    vec!["name", "prefix"]
                );
                assert_eq!(def.body.len(), 2);
            }
            other => panic!("expected a method definition, got {other:?}"),
        }
    }

    #[test]
    fn const_def_and_top_level_statements() {
        let parsed = parse("MAX = 10\nx = \"hi\"\nreport(x, MAX)\n");
        assert_eq!(parsed.diagnostics, vec![]);
        assert_eq!(parsed.items.len(), 3);
        assert!(matches!(parsed.items[0], Item::ConstDef(_)));
        assert!(matches!(parsed.items[1], Item::Stmt(Stmt::Assign { .. })));
        match &parsed.items[2] {
            Item::Stmt(Stmt::Expr(Expr::Call { name, args, .. })) => {
                assert_eq!(name, "report");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a call statement, got {other:?}"),
        }
    }

    #[test]
    fn bad_line_recovers_and_keeps_the_rest() {
        let parsed = parse(") )\ny = 2\n");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.items.len(), 1);
        assert!(matches!(parsed.items[0], Item::Stmt(Stmt::Assign { .. })));
    }

    #[test]
    fn missing_end_is_diagnosed() {
        let parsed = parse("def broken(a)\n  a\n");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(parsed.diagnostics[0].message.contains("expected `end`"));
        assert_eq!(parsed.items.len(), 1);
    }
}
