use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {action} {path}: {source}")]
    IoAt {
        action: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {message}")]
    TomlParse { path: PathBuf, message: String },

    #[error("JSON parse error in {path}: {message}")]
    JsonParse { path: PathBuf, message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Directory walk error in {path}: {message}")]
    WalkDir { path: PathBuf, message: String },

    #[error("Failed to compile {path}: {message}")]
    Compile { path: PathBuf, message: String },

    #[error("Image processing error in {path}: {message}")]
    ImageProcessing { path: PathBuf, message: String },

    #[error("Invalid date '{value}' in {path}")]
    InvalidDate { path: PathBuf, value: String },

    #[error("Catalog {path} must contain a JSON array")]
    CatalogNotArray { path: PathBuf },

    #[error("Missing required field '{field}' in catalog record at index {index}")]
    MissingField { field: String, index: usize },

    #[error("Duplicate catalog id '{id}' at index {index} (first seen at index {first_index})")]
    DuplicateId {
        id: String,
        index: usize,
        first_index: usize,
    },

    #[error("Price '{value}' at index {index} is not numeric")]
    InvalidPrice { value: String, index: usize },

    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, QuireError>;

pub trait IoContext<T> {
    fn io_context(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|source| QuireError::IoAt {
            action: action.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_context_names_action_and_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let error = result
            .io_context("reading catalog", Path::new("public/books.json"))
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("reading catalog"));
        assert!(message.contains("public/books.json"));
        assert!(message.contains("gone"));
    }
}
