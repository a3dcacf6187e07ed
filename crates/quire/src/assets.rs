use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::config::HashingConfig;
use crate::error::{IoContext, QuireError, Result};
use crate::paths::{PatternEscaper, digest_file, relative_portable};
use crate::types::{AssetManifest, BuildVersion};
use crate::walk::{has_extension, list_all_files};

pub const HASHABLE_EXTENSIONS: &[&str] = &["js", "css", "png", "jpg", "jpeg", "webp", "svg", "ico"];
pub const TEXT_EXTENSIONS: &[&str] = &["html", "js", "css", "json", "xml"];

const VERSION_PARAMETER: &str = "?v=";

/// Renames every hashable file under `output_dir` to
/// `<stem>.<digest>.<ext>` and returns the original to hashed mapping.
pub fn hash_assets(output_dir: &Path, config: &HashingConfig) -> Result<AssetManifest> {
    let output_dir = std::path::absolute(output_dir)?;
    let mut files = list_all_files(&output_dir)?;
    files.sort();

    let mut entries = Vec::new();
    for file_path in files {
        if !has_extension(&file_path, HASHABLE_EXTENSIONS) {
            continue;
        }
        let original_relative = relative_portable(&file_path, &output_dir);
        if config.exclude.contains(&original_relative) {
            tracing::debug!(path = %original_relative, "keeping stable name");
            continue;
        }

        let digest = digest_file(&file_path, config.digest_length)?;
        let hashed_path = hashed_path(&file_path, &digest)?;
        fs::rename(&file_path, &hashed_path).io_context("renaming", &file_path)?;

        let hashed_relative = relative_portable(&hashed_path, &output_dir);
        tracing::debug!(from = %original_relative, to = %hashed_relative, "hashed asset");
        entries.push((original_relative, hashed_relative));
    }

    let manifest = AssetManifest::from_entries(entries);
    tracing::info!(assets = manifest.len(), "hashed assets");
    Ok(manifest)
}

fn hashed_path(file_path: &Path, digest: &str) -> Result<PathBuf> {
    let invalid = || QuireError::InvalidPath {
        path: file_path.to_path_buf(),
    };
    let stem = file_path.file_stem().and_then(|stem| stem.to_str()).ok_or_else(invalid)?;
    let extension = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .ok_or_else(invalid)?;
    Ok(file_path.with_file_name(format!("{stem}.{digest}.{extension}")))
}

struct EntryPatterns {
    hashed: String,
    quoted_absolute: Regex,
    dot_relative: Regex,
    quoted_bare: Regex,
    css_url: Regex,
    stamped_absolute: Regex,
    stamped_bare: Regex,
}

/// Points references to original asset paths at their hashed names, and in
/// HTML appends the build version to every hashed reference.
pub struct ReferenceRewriter {
    entries: Vec<EntryPatterns>,
    version: BuildVersion,
}

impl ReferenceRewriter {
    pub fn new(manifest: &AssetManifest, version: BuildVersion) -> Result<Self> {
        let mut escaper = PatternEscaper::new();
        let mut entries = Vec::with_capacity(manifest.len());

        for (original, hashed) in manifest.entries() {
            let original_pattern = escaper.escape(original).to_string();
            let hashed_pattern = escaper.escape(hashed).to_string();

            entries.push(EntryPatterns {
                hashed: hashed.clone(),
                quoted_absolute: Regex::new(&format!("(['\"`])/{original_pattern}"))?,
                dot_relative: Regex::new(&format!(r"\./{original_pattern}"))?,
                quoted_bare: Regex::new(&format!("(['\"`]){original_pattern}"))?,
                css_url: Regex::new(&format!(r"url\({original_pattern}\)"))?,
                stamped_absolute: Regex::new(&format!("/{hashed_pattern}"))?,
                stamped_bare: Regex::new(&hashed_pattern)?,
            });
        }

        tracing::debug!(patterns = escaper.len(), "compiled reference patterns");
        Ok(Self { entries, version })
    }

    pub fn rewrite_text(&self, text: &str, is_html: bool) -> String {
        let mut updated = text.to_string();

        for entry in &self.entries {
            let hashed = entry.hashed.as_str();
            updated = replace_guarded(&updated, &entry.quoted_absolute, ends_path, |captures| {
                format!("{}/{hashed}", &captures[1])
            });
            updated = replace_guarded(&updated, &entry.dot_relative, ends_path, |_| {
                format!("./{hashed}")
            });
            updated = replace_guarded(&updated, &entry.quoted_bare, ends_path, |captures| {
                format!("{}{hashed}", &captures[1])
            });
            updated = replace_guarded(&updated, &entry.css_url, |_| true, |_| {
                format!("url({hashed})")
            });
        }

        if is_html {
            let version = self.version.as_str();
            for entry in &self.entries {
                let hashed = entry.hashed.as_str();
                updated = replace_guarded(&updated, &entry.stamped_absolute, unstamped, |_| {
                    format!("/{hashed}{VERSION_PARAMETER}{version}")
                });
                updated = replace_guarded(&updated, &entry.stamped_bare, unstamped, |_| {
                    format!("{hashed}{VERSION_PARAMETER}{version}")
                });
            }
        }

        updated
    }

    /// Returns whether the file was written. Non-text files and files with
    /// nothing to rewrite are left untouched.
    pub fn rewrite_file(&self, path: &Path) -> Result<bool> {
        if !has_extension(path, TEXT_EXTENSIONS) {
            return Ok(false);
        }

        let bytes = fs::read(path).io_context("reading", path)?;
        let Ok(content) = String::from_utf8(bytes) else {
            tracing::warn!(path = %path.display(), "skipping non UTF-8 file");
            return Ok(false);
        };

        let updated = self.rewrite_text(&content, has_extension(path, &["html"]));
        if updated == content {
            return Ok(false);
        }
        fs::write(path, updated).io_context("writing", path)?;
        Ok(true)
    }

    pub fn rewrite_tree(&self, output_dir: &Path) -> Result<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }

        let mut files = list_all_files(output_dir)?;
        files.sort();

        let mut rewritten = 0;
        for file in files {
            if self.rewrite_file(&file)? {
                tracing::debug!(path = %file.display(), "rewrote references");
                rewritten += 1;
            }
        }

        tracing::info!(files = rewritten, version = %self.version, "rewrote references");
        Ok(rewritten)
    }
}

fn is_path_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '-')
}

/// The match ends the path: `app.js` never matches inside `app.json`.
fn ends_path(rest: &str) -> bool {
    !rest.chars().next().is_some_and(is_path_char)
}

fn unstamped(rest: &str) -> bool {
    !rest.starts_with(VERSION_PARAMETER) && ends_path(rest)
}

/// Replaces every match of `pattern` whose following text passes `accept`.
fn replace_guarded(
    text: &str,
    pattern: &Regex,
    accept: impl Fn(&str) -> bool,
    replacement: impl Fn(&Captures) -> String,
) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last_end = 0;

    for captures in pattern.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if !accept(&text[whole.end()..]) {
            continue;
        }
        output.push_str(&text[last_end..whole.start()]);
        output.push_str(&replacement(&captures));
        last_end = whole.end();
    }

    output.push_str(&text[last_end..]);
    output
}
