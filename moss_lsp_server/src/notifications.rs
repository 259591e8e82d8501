//! Notification handlers: lifecycle, document synchronization, and watcher
//! events. Every handler consumes and returns the canonical state.

use crate::convert::{apply_content_change, remote_name_to_local};
use crate::lsp_ext::WatchmanQueryResponse;
use crate::server::{LspLoop, ResponseHandler};
use lsp_types::notification::Notification as _;
use moss_core::GlobalState;

impl LspLoop {
    /// Translate a client URI to a local path, dropping anything outside the
    /// workspace or matching an ignore pattern.
    pub(crate) fn remote_to_local_checked(&self, uri: &str) -> Option<String> {
        let local = remote_name_to_local(&self.root_uri, &self.root_path, uri)?;
        if moss_fs::is_file_ignored(
            &self.root_path,
            &local,
            &self.options.absolute_ignore_patterns,
            &self.options.relative_ignore_patterns,
        ) {
            return None;
        }
        Some(local)
    }

    /// Initialization proper: index from disk, run one slow path, compute
    /// the initial hashes, then flush the deferred watcher updates as one
    /// coalesced batch.
    pub(crate) fn handle_initialized(&mut self, gs: GlobalState) -> anyhow::Result<GlobalState> {
        // The incoming state was only ever a placeholder; the first real
        // canonical state is the slow path's clone.
        drop(gs);

        let operation = self.show_operation("Indexing", "Indexing files...");
        self.re_index_from_file_system();
        let run = self.run_slow_path(Vec::new());
        let new_gs = self.push_diagnostics(run);
        if !self.options.disable_fast_path {
            self.state_hashes = self.compute_state_hashes();
        }
        self.initialized = true;
        drop(operation);

        self.register_watched_files();

        let mut deferred: Vec<String> = self.deferred_watchman_updates.drain().collect();
        deferred.sort_unstable();
        Ok(self.handle_watchman_updates(new_gs, deferred))
    }

    pub(crate) fn handle_did_open(
        &mut self,
        gs: GlobalState,
        params: lsp_types::DidOpenTextDocumentParams,
    ) -> anyhow::Result<GlobalState> {
        tracing::info!(uri = %params.text_document.uri.as_str(), "DidOpenTextDocument");
        let local = match self.remote_to_local_checked(params.text_document.uri.as_str()) {
            Some(local) => local,
            None => return Ok(gs),
        };

        self.open_files.insert(local.clone());
        let run = self.try_fast_path(gs, vec![(local, params.text_document.text)], false, None);
        Ok(self.push_diagnostics(run))
    }

    pub(crate) fn handle_did_change(
        &mut self,
        gs: GlobalState,
        params: lsp_types::DidChangeTextDocumentParams,
    ) -> anyhow::Result<GlobalState> {
        tracing::info!(uri = %params.text_document.uri.as_str(), "DidChangeTextDocument");
        let local = match self.remote_to_local_checked(params.text_document.uri.as_str()) {
            Some(local) => local,
            None => return Ok(gs),
        };

        // Base text is the file as we currently know it; a file the editor
        // never opened starts from empty.
        let mut text = self
            .initial_gs
            .find_file_by_path(&local)
            .map(|file| self.initial_gs.file(file).source().to_string())
            .unwrap_or_default();
        for change in &params.content_changes {
            text = apply_content_change(&text, change);
        }

        let run = self.try_fast_path(gs, vec![(local, text)], false, None);
        Ok(self.push_diagnostics(run))
    }

    /// Closing reverts to disk contents: the editor may have discarded its
    /// changes, so treat it exactly like a watcher update.
    pub(crate) fn handle_did_close(
        &mut self,
        gs: GlobalState,
        params: lsp_types::DidCloseTextDocumentParams,
    ) -> anyhow::Result<GlobalState> {
        tracing::info!(uri = %params.text_document.uri.as_str(), "DidCloseTextDocument");
        let local = match self.remote_to_local_checked(params.text_document.uri.as_str()) {
            Some(local) => local,
            None => return Ok(gs),
        };

        self.open_files.remove(&local);
        Ok(self.handle_watchman_updates(gs, vec![local]))
    }

    pub(crate) fn handle_watchman_file_change(
        &mut self,
        gs: GlobalState,
        params: WatchmanQueryResponse,
    ) -> anyhow::Result<GlobalState> {
        // The watcher reports paths relative to the workspace root.
        let absolute: Vec<String> = params
            .files
            .iter()
            .map(|path| {
                if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("{}/{}", self.root_path, path)
                }
            })
            .collect();

        if !self.initialized {
            self.deferred_watchman_updates.extend(absolute);
            return Ok(gs);
        }
        Ok(self.handle_watchman_updates(gs, absolute))
    }

    pub(crate) fn handle_did_change_watched_files(
        &mut self,
        gs: GlobalState,
        params: lsp_types::DidChangeWatchedFilesParams,
    ) -> anyhow::Result<GlobalState> {
        let paths: Vec<String> = params
            .changes
            .iter()
            .filter_map(|event| {
                remote_name_to_local(&self.root_uri, &self.root_path, event.uri.as_str())
            })
            .collect();
        Ok(self.handle_watchman_updates(gs, paths))
    }

    pub(crate) fn handle_watchman_exit(&mut self, gs: GlobalState) -> anyhow::Result<GlobalState> {
        tracing::error!("file watcher exited");
        self.send_show_message(
            lsp_types::MessageType::ERROR,
            "The file watcher has exited; changes on disk will no longer be picked up.",
        );
        Ok(gs)
    }

    pub(crate) fn register_watched_files(&mut self) {
        let watcher_options = lsp_types::DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![lsp_types::FileSystemWatcher {
                glob_pattern: lsp_types::GlobPattern::String(format!(
                    "{}/**/*.moss",
                    self.root_path
                )),
                kind: None,
            }],
        };
        self.send_request::<lsp_types::request::RegisterCapability>(
            lsp_types::RegistrationParams {
                registrations: vec![lsp_types::Registration {
                    id: lsp_types::notification::DidChangeWatchedFiles::METHOD.to_string(),
                    method: lsp_types::notification::DidChangeWatchedFiles::METHOD.to_string(),
                    register_options: Some(
                        serde_json::to_value(watcher_options)
                            .expect("registration options serialize"),
                    ),
                }],
            },
            ResponseHandler::log_errors("client/registerCapability"),
        );
    }

    pub(crate) fn unregister_watched_files(&mut self) {
        self.send_request::<lsp_types::request::UnregisterCapability>(
            lsp_types::UnregistrationParams {
                unregisterations: vec![lsp_types::Unregistration {
                    id: lsp_types::notification::DidChangeWatchedFiles::METHOD.to_string(),
                    method: lsp_types::notification::DidChangeWatchedFiles::METHOD.to_string(),
                }],
            },
            ResponseHandler::log_errors("client/unregisterCapability"),
        );
    }
}
