use line_index::LineIndex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Stable handle into the file table. A path keeps the same `FileRef` for the
/// life of the state, including across content replacements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FileRef(pub(crate) u32);

impl FileRef {
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn from_index(idx: usize) -> FileRef {
        FileRef(idx as u32)
    }
}

/// A single workspace file: absolute path, current source text, and a cached
/// line index for position translation.
#[derive(Clone)]
pub struct File {
    path: String,
    source: Arc<str>,
    lines: Arc<LineIndex>,
    /// Bumped every time the content is replaced.
    epoch: u32,
}

impl File {
    fn new(path: String, source: String) -> File {
        let lines = Arc::new(LineIndex::new(&source));
        File {
            path,
            source: source.into(),
            lines,
            epoch: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A cheap owning handle to the text, for handing to worker threads.
    pub fn source_arc(&self) -> Arc<str> {
        self.source.clone()
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

/// Path-keyed file storage. Entries are appended for new paths and replaced
/// in place for known ones; a `FileRef` is never invalidated.
#[derive(Clone, Default)]
pub struct FileTable {
    files: Vec<File>,
    by_path: FxHashMap<String, FileRef>,
}

impl FileTable {
    /// Insert `path` with `source`, or replace the stored content if the path
    /// is already known. Returns the stable handle either way.
    pub fn enter(&mut self, path: &str, source: String) -> FileRef {
        match self.by_path.get(path) {
            Some(existing) => {
                let slot = &mut self.files[existing.0 as usize];
                let epoch = slot.epoch + 1;
                *slot = File::new(path.to_string(), source);
                slot.epoch = epoch;
                *existing
            }
            None => {
                let file = FileRef::from_index(self.files.len());
                self.files.push(File::new(path.to_string(), source));
                self.by_path.insert(path.to_string(), file);
                file
            }
        }
    }

    pub fn find_by_path(&self, path: &str) -> Option<FileRef> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, file: FileRef) -> &File {
        &self.files[file.0 as usize]
    }

    /// All known handles, ordered by entry index. The ordering is what the
    /// per-file hash table in the server is keyed against.
    pub fn all(&self) -> impl Iterator<Item = FileRef> + '_ {
        (0..self.files.len()).map(FileRef::from_index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replace_keeps_handle_and_path() {
        let mut files = FileTable::default();
        let a = files.enter("/w/a.moss", "x = 1\n".to_string());
        let b = files.enter("/w/b.moss", "y = 2\n".to_string());

        let a2 = files.enter("/w/a.moss", "x = 3\n".to_string());
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(files.get(a).path(), "/w/a.moss");
        assert_eq!(files.get(a).source(), "x = 3\n");
        assert_eq!(files.get(a).epoch(), 1);
        assert_eq!(files.len(), 2);
    }
}
