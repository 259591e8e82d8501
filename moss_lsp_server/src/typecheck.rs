//! The incremental typecheck engine: the slow path, the fast path with its
//! hash-based admission check, and diagnostic publication.

use crate::convert::{diagnostic_to_lsp, local_name_to_remote};
use crate::server::LspLoop;
use lsp_types::Uri;
use moss_core::{counter_inc, Diagnostic, FileRef, GlobalState, Query, QueryResponse};
use moss_fs::FsReader;
use moss_core::FileReader;
use moss_pipeline::{isolated_symbol_hash, parse_file, resolve_files, infer_files, ParsedFile};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// The value of one engine run: findings, the files actually re-analyzed,
/// responses for an attached query, and the mutated working state.
pub(crate) struct TypecheckRun {
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) files_typechecked: Vec<FileRef>,
    pub(crate) responses: Vec<QueryResponse>,
    pub(crate) gs: GlobalState,
}

impl LspLoop {
    /// Replace `path` in the initial state and refresh its cached tree.
    pub(crate) fn update_file(&mut self, path: &str, source: String) -> FileRef {
        let file = self.initial_gs.enter_file(path, source);
        let parsed = {
            let entry = self.initial_gs.file(file);
            parse_file(file, entry.source())
        };
        self.indexed.insert(file, Arc::new(parsed));
        file
    }

    /// Drop every cached tree and rebuild the index from disk. Reads happen
    /// on this thread; parsing fans out over the worker pool.
    pub(crate) fn re_index_from_file_system(&mut self) {
        self.indexed.clear();

        let reader = FsReader {};
        let mut entered = Vec::new();
        for path in moss_fs::walk_workspace(Path::new(&self.root_path)) {
            let path = path.to_string_lossy().to_string();
            if moss_fs::is_file_ignored(
                &self.root_path,
                &path,
                &self.options.absolute_ignore_patterns,
                &self.options.relative_ignore_patterns,
            ) {
                continue;
            }
            let source = match reader.read(&path) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(path = %path, err = %err, "skipping unreadable file");
                    continue;
                }
            };
            entered.push(self.initial_gs.enter_file(&path, source));
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        for file in &entered {
            let file = *file;
            let source = self.initial_gs.file(file).source_arc();
            let tx = tx.clone();
            self.workers.execute(move || {
                let parsed = parse_file(file, &source);
                let _ = tx.send((file, parsed));
            });
        }
        drop(tx);
        for (file, parsed) in rx {
            self.indexed.insert(file, Arc::new(parsed));
        }

        tracing::info!(files = self.indexed.len(), "re-indexed workspace");
    }

    /// Isolated-resolution digests for every indexed file, computed on the
    /// worker pool.
    pub(crate) fn compute_state_hashes(&self) -> FxHashMap<FileRef, u32> {
        let (tx, rx) = crossbeam_channel::unbounded();
        for (file, tree) in &self.indexed {
            let file = *file;
            let tree = tree.clone();
            let tx = tx.clone();
            self.workers.execute(move || {
                let _ = tx.send((file, isolated_symbol_hash(&tree)));
            });
        }
        drop(tx);
        rx.iter().collect()
    }

    /// Conservative full re-analysis: replace the changed files, clone the
    /// initial state, and run resolution and inference over every cached
    /// tree.
    pub(crate) fn run_slow_path(&mut self, changed_files: Vec<(String, String)>) -> TypecheckRun {
        counter_inc("lsp.typecheck.slow_path");
        let operation = self.show_operation("SlowPath", "Typechecking in the background");

        for (path, source) in changed_files {
            self.update_file(&path, source);
        }

        let mut gs = self.initial_gs.clone();
        gs.symbols.clear();

        let trees = self.all_trees_ordered();
        for tree in &trees {
            for diagnostic in &tree.diagnostics {
                gs.error_queue().push(diagnostic.clone());
            }
        }

        let refs: Vec<&ParsedFile> = trees.iter().map(|tree| tree.as_ref()).collect();
        resolve_files(&mut gs, &refs);
        let responses = infer_files(&mut gs, &refs, None);
        let diagnostics = gs.error_queue().drain();

        drop(operation);
        TypecheckRun {
            diagnostics,
            files_typechecked: trees.iter().map(|tree| tree.file).collect(),
            responses,
            gs,
        }
    }

    /// Incremental re-analysis. Admitted only when every changed file's
    /// isolated-resolution hash is unchanged; otherwise the stored hashes are
    /// refreshed and the run is promoted to the slow path.
    pub(crate) fn try_fast_path(
        &mut self,
        gs: GlobalState,
        changed_files: Vec<(String, String)>,
        all_files: bool,
        query: Option<Query>,
    ) -> TypecheckRun {
        if self.options.disable_fast_path {
            return self.run_slow_path(changed_files);
        }

        let mut changed = Vec::new();
        let mut hashes_match = true;
        for (path, source) in changed_files {
            let file = self.update_file(&path, source);
            let new_hash = isolated_symbol_hash(&self.indexed[&file]);
            match self.state_hashes.insert(file, new_hash) {
                Some(old_hash) if old_hash == new_hash => {}
                _ => hashes_match = false,
            }
            changed.push(file);
        }

        if !hashes_match {
            counter_inc("lsp.typecheck.slow_path.forced");
            // Files are already replaced above; the promotion re-analyzes
            // everything against them.
            return self.run_slow_path(Vec::new());
        }

        counter_inc("lsp.typecheck.fast_path");
        let mut gs = gs;

        let changed_trees: Vec<Arc<ParsedFile>> = changed
            .iter()
            .map(|file| self.indexed[file].clone())
            .collect();
        let target_trees = if all_files {
            self.all_trees_ordered()
        } else {
            changed_trees.clone()
        };

        for tree in &target_trees {
            for diagnostic in &tree.diagnostics {
                gs.error_queue().push(diagnostic.clone());
            }
        }

        let changed_refs: Vec<&ParsedFile> = changed_trees.iter().map(|t| t.as_ref()).collect();
        resolve_files(&mut gs, &changed_refs);

        let target_refs: Vec<&ParsedFile> = target_trees.iter().map(|t| t.as_ref()).collect();
        let responses = infer_files(&mut gs, &target_refs, query.as_ref());
        let diagnostics = gs.error_queue().drain();

        TypecheckRun {
            diagnostics,
            files_typechecked: target_trees.iter().map(|tree| tree.file).collect(),
            responses,
            gs,
        }
    }

    /// Publish the run's findings. Every file the run re-analyzed is
    /// published, so a file that had findings last run and none in this one
    /// gets an explicit empty-list clear. Files the run did not touch keep
    /// their remembered findings. Returns the run's state as the new
    /// canonical state.
    pub(crate) fn push_diagnostics(&mut self, run: TypecheckRun) -> GlobalState {
        let TypecheckRun {
            diagnostics,
            mut files_typechecked,
            gs,
            ..
        } = run;

        let mut by_file: FxHashMap<FileRef, Vec<lsp_types::Diagnostic>> = FxHashMap::default();
        for diagnostic in &diagnostics {
            by_file
                .entry(diagnostic.loc.file)
                .or_default()
                .push(diagnostic_to_lsp(&gs, diagnostic));
        }

        files_typechecked.sort_unstable();
        files_typechecked.dedup();

        for file in files_typechecked {
            let items = by_file.remove(&file).unwrap_or_default();
            if items.is_empty() {
                self.files_that_have_errors.remove(&file);
            } else {
                self.files_that_have_errors.insert(file);
            }

            let uri = local_name_to_remote(&self.root_uri, &self.root_path, gs.file(file).path());
            let uri = match Uri::from_str(&uri) {
                Ok(uri) => uri,
                Err(err) => {
                    tracing::error!(uri = %uri, err = %err, "cannot publish diagnostics");
                    continue;
                }
            };
            self.send_notification::<lsp_types::notification::PublishDiagnostics>(
                lsp_types::PublishDiagnosticsParams {
                    uri,
                    diagnostics: items,
                    version: None,
                },
            );
        }

        gs
    }

    /// Re-read `changed_paths` from disk and typecheck them. Paths that are
    /// ignored, outside the workspace, or editor-authoritative (open in the
    /// editor) are dropped. A path that no longer exists on disk is treated
    /// as emptied.
    pub(crate) fn handle_watchman_updates(
        &mut self,
        gs: GlobalState,
        changed_paths: Vec<String>,
    ) -> GlobalState {
        let reader = FsReader {};
        let mut changed = Vec::new();
        for path in changed_paths {
            if !path.starts_with(&self.root_path) {
                continue;
            }
            if moss_fs::is_file_ignored(
                &self.root_path,
                &path,
                &self.options.absolute_ignore_patterns,
                &self.options.relative_ignore_patterns,
            ) {
                continue;
            }
            if self.open_files.contains(&path) {
                continue;
            }
            let source = match reader.read(&path) {
                Ok(source) => source,
                Err(err) => {
                    tracing::debug!(path = %path, err = %err, "watched file vanished, treating as empty");
                    String::new()
                }
            };
            changed.push((path, source));
        }

        if changed.is_empty() {
            return gs;
        }
        let run = self.try_fast_path(gs, changed, false, None);
        self.push_diagnostics(run)
    }

    fn all_trees_ordered(&self) -> Vec<Arc<ParsedFile>> {
        let mut trees: Vec<Arc<ParsedFile>> = self.indexed.values().cloned().collect();
        trees.sort_unstable_by_key(|tree| tree.file);
        trees
    }
}
