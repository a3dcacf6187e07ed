use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{QuireError, Result};

/// Every file under `root`, as absolute paths. Nothing is skipped; callers
/// apply their own directory policy.
pub fn list_all_files(root: &Path) -> Result<Vec<PathBuf>> {
    list_files_skipping(root, &[])
}

/// Like [`list_all_files`], but never descends into directories whose name is
/// in `skip_dirs`.
pub fn list_files_skipping(root: &Path, skip_dirs: &[String]) -> Result<Vec<PathBuf>> {
    let root = std::path::absolute(root).map_err(|error| QuireError::WalkDir {
        path: root.to_path_buf(),
        message: error.to_string(),
    })?;

    let mut files = Vec::new();
    let walker = WalkDir::new(&root).min_depth(1).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| skip_dirs.iter().any(|skip| skip == name)))
    });

    for entry in walker {
        let entry = entry.map_err(|error| QuireError::WalkDir {
            path: root.clone(),
            message: error.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            let lowered = extension.to_ascii_lowercase();
            extensions.contains(&lowered.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_list_all_files_recurses() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), "1").unwrap();
        fs::write(dir.path().join("a/mid.txt"), "2").unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), "3").unwrap();

        let mut files = list_all_files(dir.path()).unwrap();
        files.sort();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|file| file.is_absolute()));
        assert!(files.iter().any(|file| file.ends_with("a/b/deep.txt")));
    }

    #[test]
    fn test_list_all_files_is_restartable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.js"), "x").unwrap();
        let first = list_all_files(dir.path()).unwrap();
        fs::write(dir.path().join("two.js"), "y").unwrap();
        let second = list_all_files(dir.path()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_list_files_skipping_templates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(dir.path().join("templates/partial.html"), "p").unwrap();
        fs::write(dir.path().join("page.html"), "p").unwrap();

        let files = list_files_skipping(dir.path(), &["templates".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("page.html"));
    }

    #[test]
    fn test_list_all_files_missing_root_errors() {
        let dir = TempDir::new().unwrap();
        assert!(list_all_files(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_has_extension_is_case_insensitive() {
        assert!(has_extension(Path::new("cover.JPG"), &["jpg", "png"]));
        assert!(!has_extension(Path::new("notes.txt"), &["jpg"]));
        assert!(!has_extension(Path::new("Makefile"), &["jpg"]));
    }
}
