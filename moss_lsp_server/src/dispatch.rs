//! Central message routing: replies, the method-tag gate, the state machine
//! checks, and the per-method handler calls.

use crate::convert::from_json;
use crate::lsp_ext::MossInitializationOptions;
use crate::method::{Initiator, LspMethod};
use crate::server::LspLoop;
use lsp_server::{ErrorCode, Message, Request, RequestId, Response};
use moss_core::{counter_inc, GlobalState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

impl LspLoop {
    /// Process one message, catching deserialization failures centrally:
    /// those answer `InvalidParams` and then run an empty slow path so the
    /// caller still holds a valid state.
    pub(crate) fn process_request(
        &mut self,
        gs: GlobalState,
        msg: Message,
        canceled: Arc<AtomicBool>,
    ) -> GlobalState {
        let id = match &msg {
            Message::Request(req) => Some(req.id.clone()),
            _ => None,
        };

        match self.process_request_internal(gs, msg, canceled) {
            Ok(gs) => gs,
            Err(err) => {
                tracing::error!(err = %err, "failed to dispatch message");
                if let Some(id) = id {
                    self.send_error(id, ErrorCode::InvalidParams, err.to_string());
                }
                self.run_slow_path(Vec::new()).gs
            }
        }
    }

    fn process_request_internal(
        &mut self,
        gs: GlobalState,
        msg: Message,
        canceled: Arc<AtomicBool>,
    ) -> anyhow::Result<GlobalState> {
        match msg {
            Message::Response(response) => {
                self.handle_reply(response);
                Ok(gs)
            }
            Message::Notification(not) => {
                let method = match LspMethod::from_name(&not.method) {
                    Some(method) => method,
                    None => {
                        // Nobody is waiting on an answer; drop it.
                        tracing::debug!(method = %not.method, "ignoring unknown notification");
                        return Ok(gs);
                    }
                };
                self.dispatch_notification(gs, method, not)
            }
            Message::Request(req) => self.dispatch_request_message(gs, req, canceled),
        }
    }

    /// Consult the response-handler registry for a client reply to one of our
    /// own requests.
    fn handle_reply(&mut self, response: Response) {
        match self.awaiting_response.remove(&response.id) {
            Some(handler) => match response.error {
                Some(err) => (handler.on_error)(self, err),
                None => {
                    (handler.on_result)(self, response.result.unwrap_or(serde_json::Value::Null))
                }
            },
            None => {
                tracing::warn!(id = %response.id, "received a reply to a request we never sent");
            }
        }
    }

    fn dispatch_notification(
        &mut self,
        gs: GlobalState,
        method: LspMethod,
        not: lsp_server::Notification,
    ) -> anyhow::Result<GlobalState> {
        let _guard = tracing::debug_span!("notification", method = method.name()).entered();

        if !method.is_notification() {
            tracing::warn!("request method arrived without an id, dropping");
            return Ok(gs);
        }

        // Before initialization only the lifecycle notifications and watcher
        // events (which defer) get through; everything else is dropped.
        let allowed_before_init = matches!(
            method,
            LspMethod::Initialized | LspMethod::Exit | LspMethod::WatchmanFileChange
        );
        if !self.initialized && !allowed_before_init {
            tracing::debug!("dropping notification before initialization");
            return Ok(gs);
        }

        match method {
            LspMethod::Initialized => {
                counter_inc("lsp.messages.processed.initialized");
                self.handle_initialized(gs)
            }
            LspMethod::Exit => {
                self.exit_requested = true;
                Ok(gs)
            }
            LspMethod::DidOpen => {
                counter_inc("lsp.messages.processed.didOpen");
                let params = from_json("DidOpenTextDocumentParams", &not.params)?;
                self.handle_did_open(gs, params)
            }
            LspMethod::DidChange => {
                counter_inc("lsp.messages.processed.didChange");
                let params = from_json("DidChangeTextDocumentParams", &not.params)?;
                self.handle_did_change(gs, params)
            }
            LspMethod::DidClose => {
                counter_inc("lsp.messages.processed.didClose");
                let params = from_json("DidCloseTextDocumentParams", &not.params)?;
                self.handle_did_close(gs, params)
            }
            LspMethod::WatchmanFileChange => {
                counter_inc("lsp.messages.processed.watchmanFileChange");
                let params = from_json("WatchmanQueryResponse", &not.params)?;
                self.handle_watchman_file_change(gs, params)
            }
            LspMethod::DidChangeWatchedFiles => {
                counter_inc("lsp.messages.processed.didChangeWatchedFiles");
                let params = from_json("DidChangeWatchedFilesParams", &not.params)?;
                self.handle_did_change_watched_files(gs, params)
            }
            LspMethod::WatchmanExit => {
                self.handle_watchman_exit(gs)
            }
            // Handled during pre-processing; a straggler is harmless.
            LspMethod::CancelRequest | LspMethod::Pause | LspMethod::Resume => Ok(gs),
            _ => {
                tracing::warn!(method = method.name(), "unexpected notification");
                Ok(gs)
            }
        }
    }

    fn dispatch_request_message(
        &mut self,
        gs: GlobalState,
        req: Request,
        canceled: Arc<AtomicBool>,
    ) -> anyhow::Result<GlobalState> {
        let _guard =
            tracing::debug_span!("request", method = %req.method, id = %req.id).entered();

        let method = match LspMethod::from_name(&req.method) {
            Some(method) if method.is_supported() => method,
            _ => {
                self.send_error(
                    req.id,
                    ErrorCode::MethodNotFound,
                    format!("Unknown method: {}", req.method),
                );
                return Ok(gs);
            }
        };

        if method.is_notification() || method.initiator() == Initiator::Server {
            self.send_error(
                req.id,
                ErrorCode::MethodNotFound,
                format!("'{}' is not a client request", method.name()),
            );
            return Ok(gs);
        }

        if canceled.load(Ordering::SeqCst) {
            counter_inc("lsp.messages.canceled");
            self.send_error(
                req.id,
                ErrorCode::RequestCanceled,
                "Request was canceled".to_string(),
            );
            return Ok(gs);
        }

        if self.shutdown_requested {
            self.send_error(
                req.id,
                ErrorCode::InvalidRequest,
                "Shutdown already requested.".to_string(),
            );
            return Ok(gs);
        }

        if !self.initialized && method != LspMethod::Initialize {
            self.send_error(
                req.id,
                ErrorCode::ServerNotInitialized,
                "Server is not initialized".to_string(),
            );
            return Ok(gs);
        }

        match method {
            LspMethod::Initialize => {
                counter_inc("lsp.messages.processed.initialize");
                self.handle_initialize(gs, req.id, &req.params)
            }
            LspMethod::Shutdown => {
                counter_inc("lsp.messages.processed.shutdown");
                self.handle_shutdown(gs, req.id)
            }
            _ => {
                if req.params.is_null() {
                    self.send_error(
                        req.id,
                        ErrorCode::InternalError,
                        "Expected parameters, but found none.".to_string(),
                    );
                    return Ok(gs);
                }
                self.dispatch_query(gs, method, req.id, &req.params)
            }
        }
    }

    fn dispatch_query(
        &mut self,
        gs: GlobalState,
        method: LspMethod,
        id: RequestId,
        params: &serde_json::Value,
    ) -> anyhow::Result<GlobalState> {
        match method {
            LspMethod::DocumentSymbol => {
                let params = from_json("DocumentSymbolParams", params)?;
                self.handle_document_symbol(gs, id, params)
            }
            LspMethod::WorkspaceSymbol => {
                let params = from_json("WorkspaceSymbolParams", params)?;
                self.handle_workspace_symbol(gs, id, params)
            }
            LspMethod::Definition => {
                let params = from_json("GotoDefinitionParams", params)?;
                self.handle_definition(gs, id, params)
            }
            LspMethod::Hover => {
                let params = from_json("HoverParams", params)?;
                self.handle_hover(gs, id, params)
            }
            LspMethod::Completion => {
                let params = from_json("CompletionParams", params)?;
                self.handle_completion(gs, id, params)
            }
            LspMethod::References => {
                let params = from_json("ReferenceParams", params)?;
                self.handle_references(gs, id, params)
            }
            LspMethod::SignatureHelp => {
                let params = from_json("SignatureHelpParams", params)?;
                self.handle_signature_help(gs, id, params)
            }
            _ => {
                self.send_error(
                    id,
                    ErrorCode::MethodNotFound,
                    format!("Unknown method: {}", method.name()),
                );
                Ok(gs)
            }
        }
    }

    fn handle_initialize(
        &mut self,
        gs: GlobalState,
        id: RequestId,
        params: &serde_json::Value,
    ) -> anyhow::Result<GlobalState> {
        let params: lsp_types::InitializeParams = from_json("InitializeParams", params)?;

        #[allow(deprecated)]
        {
            if let Some(root_uri) = &params.root_uri {
                self.root_uri = root_uri.as_str().trim_end_matches('/').to_string();
            }
            self.root_path = match &params.root_path {
                Some(root_path) if !root_path.is_empty() => {
                    root_path.trim_end_matches('/').to_string()
                }
                _ => self
                    .root_uri
                    .strip_prefix("file://")
                    .unwrap_or(&self.root_uri)
                    .to_string(),
            };
        }

        self.client_snippet_support = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|doc| doc.completion.as_ref())
            .and_then(|completion| completion.completion_item.as_ref())
            .and_then(|item| item.snippet_support)
            .unwrap_or(false);

        if let Some(init_options) = &params.initialization_options {
            match serde_json::from_value::<MossInitializationOptions>(init_options.clone()) {
                Ok(options) => {
                    self.enable_operation_notifications = options.supports_operation_notifications;
                }
                Err(err) => {
                    tracing::warn!(err = %err, "malformed initializationOptions");
                }
            }
        }

        let result = lsp_types::InitializeResult {
            capabilities: self.server_capabilities(),
            server_info: Some(lsp_types::ServerInfo {
                name: "moss-lsp".to_string(),
                version: None,
            }),
        };
        self.respond(Response::new_ok(id, result));
        Ok(gs)
    }

    fn handle_shutdown(&mut self, gs: GlobalState, id: RequestId) -> anyhow::Result<GlobalState> {
        self.shutdown_requested = true;
        self.respond(Response::new_ok(id, serde_json::Value::Null));
        self.unregister_watched_files();
        Ok(gs)
    }

    fn server_capabilities(&self) -> lsp_types::ServerCapabilities {
        let features = &self.options.features;
        lsp_types::ServerCapabilities {
            text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Kind(
                lsp_types::TextDocumentSyncKind::FULL,
            )),
            definition_provider: features
                .definition
                .then_some(lsp_types::OneOf::Left(true)),
            document_symbol_provider: features
                .document_symbol
                .then_some(lsp_types::OneOf::Left(true)),
            workspace_symbol_provider: features
                .workspace_symbol
                .then_some(lsp_types::OneOf::Left(true)),
            hover_provider: features
                .hover
                .then_some(lsp_types::HoverProviderCapability::Simple(true)),
            references_provider: features
                .references
                .then_some(lsp_types::OneOf::Left(true)),
            signature_help_provider: features.signature_help.then(|| {
                lsp_types::SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: Default::default(),
                }
            }),
            completion_provider: features.completion.then(|| lsp_types::CompletionOptions {
                trigger_characters: Some(vec![".".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
