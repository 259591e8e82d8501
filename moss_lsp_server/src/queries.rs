//! Ad-hoc analysis requests. Each handler translates its params into a
//! targeted typecheck, shapes the recorded responses into protocol payloads,
//! and answers `null` when nothing matched. Handlers never fail the request
//! pipeline; they consume and return the canonical state.

use crate::convert::{loc_to_location, loc_to_range, position_to_offset};
use crate::server::LspLoop;
use crate::typecheck::TypecheckRun;
use lsp_server::{RequestId, Response};
use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, Documentation,
    GotoDefinitionResponse, Hover, HoverContents, Location, MarkupContent, MarkupKind,
    ParameterInformation, ParameterLabel, Position, SignatureHelp, SignatureInformation,
    SymbolInformation, Uri,
};
use moss_core::{GlobalState, Query, QueryResponse, Symbol, SymbolKind, SymbolRef};

impl LspLoop {
    /// Targeted typecheck of the file under `uri` with a positional query
    /// attached. `Err` hands the state back untouched when the URI is not a
    /// workspace file we know about.
    fn run_lsp_query_by_loc(
        &mut self,
        gs: GlobalState,
        uri: &Uri,
        position: Position,
        all_files: bool,
    ) -> Result<TypecheckRun, GlobalState> {
        let local = match self.remote_to_local_checked(uri.as_str()) {
            Some(local) => local,
            None => return Err(gs),
        };
        let file = match self.initial_gs.find_file_by_path(&local) {
            Some(file) => file,
            None => return Err(gs),
        };

        let (source, offset) = {
            let entry = self.initial_gs.file(file);
            (
                entry.source().to_string(),
                position_to_offset(entry, position),
            )
        };
        let query = Query::ByLoc { file, offset };
        Ok(self.try_fast_path(gs, vec![(local, source)], all_files, Some(query)))
    }

    /// Workspace-wide sweep recording every mention of `symbol`.
    fn run_lsp_query_by_symbol(&mut self, gs: GlobalState, symbol: SymbolRef) -> TypecheckRun {
        self.try_fast_path(gs, Vec::new(), true, Some(Query::BySymbol(symbol)))
    }

    fn respond_null(&self, id: RequestId) {
        self.respond(Response::new_ok(id, serde_json::Value::Null));
    }

    pub(crate) fn handle_definition(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::GotoDefinitionParams,
    ) -> anyhow::Result<GlobalState> {
        let position = params.text_document_position_params;
        let run = match self.run_lsp_query_by_loc(
            gs,
            &position.text_document.uri,
            position.position,
            false,
        ) {
            Ok(run) => run,
            Err(gs) => {
                self.respond_null(id);
                return Ok(gs);
            }
        };

        let gs = run.gs;
        let location = run
            .responses
            .iter()
            .find_map(QueryResponse::symbol)
            .and_then(|sym| gs.symbols.get(sym))
            .and_then(|symbol| {
                loc_to_location(&gs, &self.root_uri, &self.root_path, symbol.def_loc)
            });

        match location {
            Some(location) => {
                self.respond(Response::new_ok(id, GotoDefinitionResponse::Scalar(location)));
            }
            None => self.respond_null(id),
        }
        Ok(gs)
    }

    pub(crate) fn handle_hover(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::HoverParams,
    ) -> anyhow::Result<GlobalState> {
        let position = params.text_document_position_params;
        let run = match self.run_lsp_query_by_loc(
            gs,
            &position.text_document.uri,
            position.position,
            false,
        ) {
            Ok(run) => run,
            Err(gs) => {
                self.respond_null(id);
                return Ok(gs);
            }
        };

        let gs = run.gs;
        // The first response is the innermost node under the cursor.
        let hover = run.responses.first().map(|response| {
            let line = match response.symbol().and_then(|sym| gs.symbols.get(sym)) {
                Some(symbol) => {
                    format!("({}) {}", symbol_kind_name(symbol), symbol_signature(&gs, symbol))
                }
                None => match response {
                    QueryResponse::Ident { name, ty, .. }
                    | QueryResponse::Const { name, ty, .. } => {
                        format!("{}: {}", gs.names.resolve(*name), ty)
                    }
                    _ => format!("{}: untyped", gs.names.resolve(response.name())),
                },
            };
            let value = format!("```moss\n{line}\n```");

            Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value,
                }),
                range: Some(loc_to_range(gs.file(response.loc().file), response.loc())),
            }
        });

        match hover {
            Some(hover) => self.respond(Response::new_ok(id, hover)),
            None => self.respond_null(id),
        }
        Ok(gs)
    }

    pub(crate) fn handle_references(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::ReferenceParams,
    ) -> anyhow::Result<GlobalState> {
        let include_declaration = params.context.include_declaration;
        let position = params.text_document_position;
        let run = match self.run_lsp_query_by_loc(
            gs,
            &position.text_document.uri,
            position.position,
            false,
        ) {
            Ok(run) => run,
            Err(gs) => {
                self.respond_null(id);
                return Ok(gs);
            }
        };

        let symbol = run.responses.iter().find_map(QueryResponse::symbol);
        let gs = run.gs;
        let symbol = match symbol {
            Some(symbol) => symbol,
            None => {
                self.respond_null(id);
                return Ok(gs);
            }
        };

        let sweep = self.run_lsp_query_by_symbol(gs, symbol);
        let gs = sweep.gs;
        let mut locations: Vec<Location> = sweep
            .responses
            .iter()
            .filter(|response| {
                include_declaration || !matches!(response, QueryResponse::Def { .. })
            })
            .filter_map(|response| {
                loc_to_location(&gs, &self.root_uri, &self.root_path, response.loc())
            })
            .collect();
        locations.sort_by_key(|location| {
            (
                location.uri.as_str().to_string(),
                location.range.start.line,
                location.range.start.character,
            )
        });

        self.respond(Response::new_ok(id, locations));
        Ok(gs)
    }

    pub(crate) fn handle_completion(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::CompletionParams,
    ) -> anyhow::Result<GlobalState> {
        let position = params.text_document_position;
        let uri = position.text_document.uri.clone();
        let run =
            match self.run_lsp_query_by_loc(gs, &uri, position.position, false) {
                Ok(run) => run,
                Err(gs) => {
                    self.respond(Response::new_ok(id, CompletionResponse::Array(Vec::new())));
                    return Ok(gs);
                }
            };
        let gs = run.gs;

        // The word being typed, read back from the document text.
        let prefix = {
            let local = self.remote_to_local_checked(uri.as_str());
            let file = local.and_then(|l| self.initial_gs.find_file_by_path(&l));
            match file {
                Some(file) => {
                    let entry = self.initial_gs.file(file);
                    let offset = position_to_offset(entry, position.position) as usize;
                    identifier_prefix(entry.source(), offset)
                }
                None => String::new(),
            }
        };

        let mut items: Vec<CompletionItem> = Vec::new();
        if !prefix.is_empty() {
            // Expand with any constant or identifier of a similar name.
            for (_, symbol) in gs.symbols.iter() {
                let name = gs.names.resolve(symbol.name);
                if name.starts_with(&prefix) {
                    items.push(self.symbol_to_completion_item(&gs, symbol));
                }
            }
            items.sort_by(|a, b| a.label.cmp(&b.label));
        }

        self.respond(Response::new_ok(id, CompletionResponse::Array(items)));
        Ok(gs)
    }

    pub(crate) fn handle_signature_help(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::SignatureHelpParams,
    ) -> anyhow::Result<GlobalState> {
        let position = params.text_document_position_params;
        let run = match self.run_lsp_query_by_loc(
            gs,
            &position.text_document.uri,
            position.position,
            false,
        ) {
            Ok(run) => run,
            Err(gs) => {
                self.respond_null(id);
                return Ok(gs);
            }
        };
        let gs = run.gs;

        let send = run.responses.iter().find_map(|response| match response {
            QueryResponse::Send {
                symbol: Some(symbol),
                active_arg,
                ..
            } => gs.symbols.get(*symbol).map(|data| (data, *active_arg)),
            _ => None,
        });

        let help = send.and_then(|(symbol, active_arg)| match &symbol.kind {
            SymbolKind::Method { params } => {
                let param_names: Vec<&str> =
                    params.iter().map(|p| gs.names.resolve(*p)).collect();
                let signature = SignatureInformation {
                    label: symbol_signature(&gs, symbol),
                    documentation: None,
                    parameters: Some(
                        param_names
                            .iter()
                            .map(|name| ParameterInformation {
                                label: ParameterLabel::Simple(name.to_string()),
                                documentation: None,
                            })
                            .collect(),
                    ),
                    active_parameter: None,
                };
                Some(SignatureHelp {
                    signatures: vec![signature],
                    active_signature: Some(0),
                    active_parameter: Some(active_arg as u32),
                })
            }
            SymbolKind::Constant => None,
        });

        match help {
            Some(help) => self.respond(Response::new_ok(id, help)),
            None => self.respond_null(id),
        }
        Ok(gs)
    }

    pub(crate) fn handle_document_symbol(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::DocumentSymbolParams,
    ) -> anyhow::Result<GlobalState> {
        let local = match self.remote_to_local_checked(params.text_document.uri.as_str()) {
            Some(local) => local,
            None => {
                self.respond_null(id);
                return Ok(gs);
            }
        };
        let file = match gs.find_file_by_path(&local) {
            Some(file) => file,
            None => {
                self.respond_null(id);
                return Ok(gs);
            }
        };

        let mut symbols: Vec<(u32, SymbolInformation)> = gs
            .symbols
            .iter()
            .filter(|(_, symbol)| symbol.file == file)
            .filter_map(|(_, symbol)| {
                self.symbol_information(&gs, symbol)
                    .map(|info| (symbol.def_loc.start, info))
            })
            .collect();
        symbols.sort_by_key(|(start, _)| *start);
        let symbols: Vec<SymbolInformation> = symbols.into_iter().map(|(_, info)| info).collect();

        self.respond(Response::new_ok(
            id,
            lsp_types::DocumentSymbolResponse::Flat(symbols),
        ));
        Ok(gs)
    }

    pub(crate) fn handle_workspace_symbol(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: lsp_types::WorkspaceSymbolParams,
    ) -> anyhow::Result<GlobalState> {
        let needle = params.query.to_lowercase();
        let mut symbols: Vec<SymbolInformation> = gs
            .symbols
            .iter()
            .filter(|(_, symbol)| {
                needle.is_empty()
                    || gs
                        .names
                        .resolve(symbol.name)
                        .to_lowercase()
                        .contains(&needle)
            })
            .filter_map(|(_, symbol)| self.symbol_information(&gs, symbol))
            .collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));

        self.respond(Response::new_ok(
            id,
            lsp_types::WorkspaceSymbolResponse::Flat(symbols),
        ));
        Ok(gs)
    }

    fn symbol_information(&self, gs: &GlobalState, symbol: &Symbol) -> Option<SymbolInformation> {
        let location = loc_to_location(gs, &self.root_uri, &self.root_path, symbol.def_loc)?;
        let kind = match symbol.kind {
            SymbolKind::Method { .. } => lsp_types::SymbolKind::METHOD,
            SymbolKind::Constant => lsp_types::SymbolKind::CONSTANT,
        };

        #[allow(deprecated)]
        Some(SymbolInformation {
            name: gs.names.resolve(symbol.name).to_string(),
            kind,
            tags: None,
            deprecated: None,
            location,
            container_name: None,
        })
    }

    fn symbol_to_completion_item(&self, gs: &GlobalState, symbol: &Symbol) -> CompletionItem {
        let name = gs.names.resolve(symbol.name).to_string();
        let (kind, detail) = match &symbol.kind {
            SymbolKind::Method { .. } => (CompletionItemKind::FUNCTION, "Method"),
            SymbolKind::Constant => (CompletionItemKind::CONSTANT, "Constant"),
        };

        // Snippet placeholders only when the client said it understands them.
        let (insert_text, insert_text_format) = match &symbol.kind {
            SymbolKind::Method { params }
                if self.client_snippet_support && !params.is_empty() =>
            {
                let placeholders: Vec<String> = params
                    .iter()
                    .enumerate()
                    .map(|(idx, param)| {
                        format!("${{{}:{}}}", idx + 1, gs.names.resolve(*param))
                    })
                    .collect();
                (
                    Some(format!("{}({})", name, placeholders.join(", "))),
                    Some(lsp_types::InsertTextFormat::SNIPPET),
                )
            }
            _ => (None, None),
        };

        CompletionItem {
            label: name,
            kind: Some(kind),
            detail: Some(detail.to_string()),
            documentation: Some(Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```moss\n({detail}) {}\n```", symbol_signature(gs, symbol)),
            })),
            insert_text,
            insert_text_format,
            ..Default::default()
        }
    }
}

fn symbol_kind_name(symbol: &Symbol) -> &'static str {
    match symbol.kind {
        SymbolKind::Method { .. } => "Method",
        SymbolKind::Constant => "Constant",
    }
}

fn symbol_signature(gs: &GlobalState, symbol: &Symbol) -> String {
    let name = gs.names.resolve(symbol.name);
    match &symbol.kind {
        SymbolKind::Method { params } => {
            let params: Vec<&str> = params.iter().map(|p| gs.names.resolve(*p)).collect();
            format!("{}({})", name, params.join(", "))
        }
        SymbolKind::Constant => name.to_string(),
    }
}

/// The identifier fragment ending at `offset`, used as the completion
/// prefix.
fn identifier_prefix(source: &str, offset: usize) -> String {
    let bytes = source.as_bytes();
    let end = offset.min(bytes.len());
    let mut start = end;
    while start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_') {
        start -= 1;
    }
    source[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::identifier_prefix;
    use pretty_assertions::assert_eq;

    #[test]
    fn prefix_is_the_word_ending_at_the_cursor() {
        let source = "x = gre";
        assert_eq!(identifier_prefix(source, source.len()), "gre");
        assert_eq!(identifier_prefix("x = ", 4), "");
        assert_eq!(identifier_prefix("gre", 1), "g");
    }
}
