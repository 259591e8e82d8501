use crate::errors::ErrorQueue;
use crate::files::{File, FileRef, FileTable};
use crate::names::NameTable;
use crate::symbols::SymbolTable;
use std::sync::Arc;

/// The accumulated analysis state of one workspace: interned names, the file
/// table, and the resolved top-level symbols.
///
/// The server keeps one *initial* state for indexing and clones it before
/// every typecheck; the clone is what resolution and inference mutate, and it
/// is returned as the new canonical state. The error queue is the one
/// component shared between a state and its clones, so diagnostics emitted by
/// any of them land in a single sink.
pub struct GlobalState {
    pub names: NameTable,
    pub files: FileTable,
    pub symbols: SymbolTable,
    error_queue: Arc<ErrorQueue>,
}

impl GlobalState {
    pub fn new() -> GlobalState {
        GlobalState {
            names: NameTable::default(),
            files: FileTable::default(),
            symbols: SymbolTable::default(),
            error_queue: Arc::new(ErrorQueue::default()),
        }
    }

    pub fn error_queue(&self) -> &Arc<ErrorQueue> {
        &self.error_queue
    }

    /// Insert or replace a file by path. The handle is stable across
    /// replacements.
    pub fn enter_file(&mut self, path: &str, source: String) -> FileRef {
        self.files.enter(path, source)
    }

    pub fn find_file_by_path(&self, path: &str) -> Option<FileRef> {
        self.files.find_by_path(path)
    }

    pub fn file(&self, file: FileRef) -> &File {
        self.files.get(file)
    }

    pub fn get_files(&self) -> Vec<FileRef> {
        self.files.all().collect()
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        GlobalState::new()
    }
}

impl Clone for GlobalState {
    /// Deep copy of every table; the error queue is shared by design.
    fn clone(&self) -> GlobalState {
        GlobalState {
            names: self.names.clone(),
            files: self.files.clone(),
            symbols: self.symbols.clone(),
            error_queue: self.error_queue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Diagnostic;
    use crate::loc::Loc;
    use pretty_assertions::assert_eq;

    #[test]
    fn clones_are_independent_except_for_the_error_queue() {
        let mut gs = GlobalState::new();
        let file = gs.enter_file("/w/a.moss", "x = 1\n".to_string());

        let mut working = gs.clone();
        working.enter_file("/w/b.moss", "y = 2\n".to_string());
        working
            .error_queue()
            .push(Diagnostic::error(Loc::new(file, 0, 1), "from the clone"));

        // The clone grew a file; the original did not.
        assert_eq!(working.files.len(), 2);
        assert_eq!(gs.files.len(), 1);

        // But the finding emitted through the clone drains from the original.
        let drained = gs.error_queue().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message, "from the clone");
    }
}
