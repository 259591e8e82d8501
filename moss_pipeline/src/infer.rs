use crate::ast::{Expr, Item, ParsedFile, Stmt};
use moss_core::{
    Diagnostic, ErrorQueue, GlobalState, Loc, Query, QueryResponse, SymbolKind, Type,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Analyze the bodies of `files` against the state's symbol table.
///
/// Diagnostics go to the shared error queue. When `query` is present,
/// responses are recorded only for nodes intersecting the query location or
/// referencing the query symbol; everything else is checked but stays silent.
pub fn infer_files(
    gs: &mut GlobalState,
    files: &[&ParsedFile],
    query: Option<&Query>,
) -> Vec<QueryResponse> {
    let errors = gs.error_queue().clone();
    let mut infer = Infer {
        gs,
        errors,
        query,
        responses: Vec::new(),
    };

    for parsed in files {
        infer.check_file(parsed);
    }
    infer.responses
}

struct Infer<'a> {
    gs: &'a mut GlobalState,
    errors: Arc<ErrorQueue>,
    query: Option<&'a Query>,
    responses: Vec<QueryResponse>,
}

type Scope = FxHashMap<String, Type>;

impl Infer<'_> {
    fn check_file(&mut self, parsed: &ParsedFile) {
        // Top-level statements share one scope that accumulates through the
        // file; each method body gets its own.
        let mut top_scope = Scope::default();

        for item in &parsed.items {
            match item {
                Item::MethodDef(def) => {
                    self.record_def(&def.name, def.name_loc);

                    let mut scope = Scope::default();
                    for param in &def.params {
                        scope.insert(param.name.clone(), Type::Untyped);
                        if self.query_matches(param.loc) {
                            let name = self.gs.names.intern(&param.name);
                            self.responses.push(QueryResponse::Ident {
                                loc: param.loc,
                                name,
                                symbol: None,
                                ty: Type::Untyped,
                            });
                        }
                    }
                    for stmt in &def.body {
                        self.check_stmt(&mut scope, stmt);
                    }
                }
                Item::ConstDef(def) => {
                    self.record_def(&def.name, def.name_loc);
                    self.check_expr(&mut top_scope, &def.value);
                }
                Item::Stmt(stmt) => self.check_stmt(&mut top_scope, stmt),
            }
        }
    }

    fn record_def(&mut self, name_str: &str, name_loc: Loc) {
        let name = self.gs.names.intern(name_str);
        let symbol = match self.gs.symbols.lookup(name) {
            Some(sym) => sym,
            None => return,
        };

        let wanted = self.query_matches(name_loc)
            || self.query.map(|q| q.matches_symbol(symbol)).unwrap_or(false);
        if wanted {
            self.responses.push(QueryResponse::Def {
                loc: name_loc,
                name,
                symbol,
            });
        }
    }

    fn check_stmt(&mut self, scope: &mut Scope, stmt: &Stmt) {
        match stmt {
            Stmt::Assign {
                target,
                target_loc,
                value,
                ..
            } => {
                let ty = self.check_expr(scope, value);
                scope.insert(target.clone(), ty);
                if self.query_matches(*target_loc) {
                    let name = self.gs.names.intern(target);
                    self.responses.push(QueryResponse::Ident {
                        loc: *target_loc,
                        name,
                        symbol: None,
                        ty,
                    });
                }
            }
            Stmt::Expr(expr) => {
                self.check_expr(scope, expr);
            }
        }
    }

    fn check_expr(&mut self, scope: &mut Scope, expr: &Expr) -> Type {
        match expr {
            Expr::IntLit { .. } => Type::Integer,
            Expr::StrLit { .. } => Type::Str,
            Expr::NilLit { .. } => Type::Nil,
            Expr::Ident { name, loc } => self.check_ident(scope, name, *loc),
            Expr::ConstRef { name, loc } => self.check_const_ref(name, *loc),
            Expr::Call {
                name,
                name_loc,
                args,
                loc,
            } => self.check_call(scope, name, *name_loc, args, *loc),
        }
    }

    fn check_ident(&mut self, scope: &Scope, name_str: &str, loc: Loc) -> Type {
        if let Some(ty) = scope.get(name_str) {
            let ty = *ty;
            if self.query_matches(loc) {
                let name = self.gs.names.intern(name_str);
                self.responses.push(QueryResponse::Ident {
                    loc,
                    name,
                    symbol: None,
                    ty,
                });
            }
            return ty;
        }

        // Not a local: a bare lowercase name is a zero-argument call.
        let name = self.gs.names.intern(name_str);
        let symbol = self.gs.symbols.lookup(name);
        let ty = match symbol {
            Some(sym) => {
                let data = self.gs.symbols.get(sym).unwrap();
                if let SymbolKind::Method { params } = &data.kind {
                    if !params.is_empty() {
                        let expected = params.len();
                        self.errors.push(Diagnostic::error(
                            loc,
                            format!(
                                "Wrong number of arguments for method `{name_str}`: expected {expected}, got 0"
                            ),
                        ));
                    }
                }
                Type::Untyped
            }
            None => {
                self.errors.push(Diagnostic::error(
                    loc,
                    format!("Unable to resolve identifier `{name_str}`"),
                ));
                Type::Untyped
            }
        };

        let wanted = self.query_matches(loc)
            || symbol
                .map(|sym| self.query.map(|q| q.matches_symbol(sym)).unwrap_or(false))
                .unwrap_or(false);
        if wanted {
            self.responses.push(QueryResponse::Ident {
                loc,
                name,
                symbol,
                ty,
            });
        }
        ty
    }

    fn check_const_ref(&mut self, name_str: &str, loc: Loc) -> Type {
        let name = self.gs.names.intern(name_str);
        let symbol = self.gs.symbols.lookup(name);
        if symbol.is_none() {
            self.errors.push(Diagnostic::error(
                loc,
                format!("Unable to resolve constant `{name_str}`"),
            ));
        }

        let wanted = self.query_matches(loc)
            || symbol
                .map(|sym| self.query.map(|q| q.matches_symbol(sym)).unwrap_or(false))
                .unwrap_or(false);
        if wanted {
            self.responses.push(QueryResponse::Const {
                loc,
                name,
                symbol,
                ty: Type::Untyped,
            });
        }
        Type::Untyped
    }

    fn check_call(
        &mut self,
        scope: &mut Scope,
        name_str: &str,
        name_loc: Loc,
        args: &[Expr],
        loc: Loc,
    ) -> Type {
        for arg in args {
            self.check_expr(scope, arg);
        }

        let name = self.gs.names.intern(name_str);
        let symbol = self.gs.symbols.lookup(name);
        match symbol {
            Some(sym) => {
                let data = self.gs.symbols.get(sym).unwrap();
                match &data.kind {
                    SymbolKind::Method { params } => {
                        if params.len() != args.len() {
                            let expected = params.len();
                            let got = args.len();
                            self.errors.push(Diagnostic::error(
                                loc,
                                format!(
                                    "Wrong number of arguments for method `{name_str}`: expected {expected}, got {got}"
                                ),
                            ));
                        }
                    }
                    SymbolKind::Constant => {
                        self.errors.push(Diagnostic::error(
                            name_loc,
                            format!("`{name_str}` is a constant, not a method"),
                        ));
                    }
                }
            }
            None => {
                self.errors.push(Diagnostic::error(
                    name_loc,
                    format!("Unable to resolve method `{name_str}`"),
                ));
            }
        }

        let wanted = self.query_matches(loc)
            || symbol
                .map(|sym| self.query.map(|q| q.matches_symbol(sym)).unwrap_or(false))
                .unwrap_or(false);
        if wanted {
            self.responses.push(QueryResponse::Send {
                loc,
                name,
                symbol,
                active_arg: self.active_arg(args),
                ty: Type::Untyped,
            });
        }
        Type::Untyped
    }

    /// Zero-based index of the argument the query offset falls inside, for
    /// positional queries over this call.
    fn active_arg(&self, args: &[Expr]) -> usize {
        let offset = match self.query {
            Some(Query::ByLoc { offset, .. }) => *offset,
            _ => return 0,
        };

        let mut active = 0;
        for (idx, arg) in args.iter().enumerate() {
            if offset > arg.loc().end {
                active = idx + 1;
            } else {
                active = idx;
                break;
            }
        }
        active.min(args.len().saturating_sub(1))
    }

    fn query_matches(&self, loc: Loc) -> bool {
        self.query.map(|q| q.matches_loc(loc)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::resolve::resolve_files;
    use pretty_assertions::assert_eq;

    /// Run the pipeline end to end. `query_at` names a (path, byte offset)
    /// pair to turn into a positional query against the entered file table.
    fn analyze(
        sources: &[(&str, &str)],
        query_at: Option<(&str, u32)>,
    ) -> (GlobalState, Vec<QueryResponse>, Vec<Diagnostic>) {
        let mut gs = GlobalState::new();
        let parsed: Vec<ParsedFile> = sources
            .iter()
            .map(|(path, src)| {
                let file = gs.enter_file(path, src.to_string());
                parse_file(file, src)
            })
            .collect();
        let refs: Vec<&ParsedFile> = parsed.iter().collect();
        resolve_files(&mut gs, &refs);
        let query = query_at.map(|(path, offset)| Query::ByLoc {
            file: gs.find_file_by_path(path).unwrap(),
            offset,
        });
        let responses = infer_files(&mut gs, &refs, query.as_ref());
        let diagnostics = gs.error_queue().drain();
        (gs, responses, diagnostics)
    }

    #[test]
    fn unresolved_call_is_diagnosed() {
        let (_, _, diagnostics) = analyze(&[("/w/a.moss", "x = 1\nbad_call()\n")], None);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Unable to resolve method `bad_call`"
        );
    }

    #[test]
    fn arity_mismatch_is_diagnosed() {
        let (_, _, diagnostics) = analyze(
            &[("/w/a.moss", "def greet(name, prefix)\nend\ngreet(1)\n")],
            None,
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0]
            .message
            .contains("expected 2, got 1"));
    }

    #[test]
    fn cross_file_resolution_is_clean() {
        let (_, _, diagnostics) = analyze(
            &[
                ("/w/lib.moss", "def greet(name)\n  name\nend\n"),
                ("/w/app.moss", "greet(\"hi\")\n"),
            ],
            None,
        );
        assert_eq!(diagnostics, vec![]);
    }

    #[test]
    fn locals_shadow_methods_and_carry_literal_types() {
        let source = "def probe()\nend\nprobe = 1\nx = probe\n";
        let offset = source.rfind("probe").unwrap() as u32;
        let (_, responses, diagnostics) = analyze(&[("/w/a.moss", source)], Some(("/w/a.moss", offset)));
        assert_eq!(diagnostics, vec![]);
        match &responses[..] {
            [QueryResponse::Ident { ty, symbol, .. }] => {
                assert_eq!(*ty, Type::Integer);
                assert_eq!(*symbol, None);
            }
            other => panic!("expected one identifier response, got {other:?}"),
        }
    }

    #[test]
    fn constant_reads_record_const_responses() {
        let source = "MAX = 10\nx = MAX\n";
        let offset = source.rfind("MAX").unwrap() as u32;
        let (_, responses, diagnostics) =
            analyze(&[("/w/a.moss", source)], Some(("/w/a.moss", offset)));
        assert_eq!(diagnostics, vec![]);
        match &responses[..] {
            [QueryResponse::Const { symbol, ty, .. }] => {
                assert!(symbol.is_some());
                assert_eq!(*ty, Type::Untyped);
            }
            other => panic!("expected one constant response, got {other:?}"),
        }
    }

    #[test]
    fn query_only_records_intersecting_nodes() {
        let source = "def greet(name)\n  name\nend\ngreet(1)\ngreet(2)\n";
        let offset = source.find("greet(1)").unwrap() as u32;
        let (_, responses, _) = analyze(&[("/w/a.moss", source)], Some(("/w/a.moss", offset)));
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], QueryResponse::Send { .. }));
    }

    #[test]
    fn by_symbol_query_finds_every_use() {
        let sources: &[(&str, &str)] = &[
            ("/w/lib.moss", "def greet(name)\nend\n"),
            ("/w/app.moss", "greet(1)\ngreet(2)\n"),
        ];
        let (mut gs, _, _) = analyze(sources, None);
        let name = gs.names.lookup("greet").unwrap();
        let symbol = gs.symbols.lookup(name).unwrap();

        let parsed: Vec<ParsedFile> = sources
            .iter()
            .map(|(path, src)| {
                let file = gs.find_file_by_path(path).unwrap();
                parse_file(file, src)
            })
            .collect();
        let refs: Vec<&ParsedFile> = parsed.iter().collect();
        let query = Query::BySymbol(symbol);
        let responses = infer_files(&mut gs, &refs, Some(&query));
        gs.error_queue().drain();

        // One definition response plus two sends.
        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], QueryResponse::Def { .. }));
        assert!(responses[1..]
            .iter()
            .all(|r| matches!(r, QueryResponse::Send { .. })));
    }
}
