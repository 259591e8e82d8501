use crate::error::Error;

/// Source of file contents for the pipeline. The server implements this over
/// its virtual file table; the command line implements it over the real
/// filesystem.
pub trait FileReader {
    fn read(&self, path: &str) -> Result<String, Error>;
}
