use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Template,
    Markup,
    Script,
    Stylesheet,
    Other,
}

impl SourceKind {
    pub fn of(path: &Path, template_extension: &str) -> Self {
        let Some(extension) = path.extension().and_then(|extension| extension.to_str()) else {
            return Self::Other;
        };
        if extension == template_extension {
            return Self::Template;
        }
        match extension {
            "html" => Self::Markup,
            "js" => Self::Script,
            "css" => Self::Stylesheet,
            _ => Self::Other,
        }
    }
}

/// Original output-relative path to hashed output-relative path, longest
/// original first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    entries: Vec<(String, String)>,
}

impl AssetManifest {
    /// Later duplicates of a key replace earlier ones, keeping keys unique.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut unique: HashMap<String, String> = HashMap::new();
        for (original, hashed) in entries {
            unique.insert(original, hashed);
        }
        let mut entries: Vec<(String, String)> = unique.into_iter().collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == original)
            .map(|(_, hashed)| hashed.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output-relative paths of the generated renditions of one cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub webp_small: Option<String>,
    pub webp_large: Option<String>,
    pub jpeg_small: Option<String>,
    pub jpeg_large: Option<String>,
}

/// Keyed by `<covers.output>/<relative path without extension>`.
pub type VariantTable = HashMap<String, VariantRecord>;

/// Cache-busting token shared by every HTML file of one build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BuildVersion(String);

impl BuildVersion {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis().to_string())
    }

    pub fn fixed(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub version: String,
    pub static_files: usize,
    pub image_variants: usize,
    pub sources_processed: usize,
    pub data_pages: usize,
    pub catalog_records: usize,
    pub hashed_assets: usize,
    pub rewritten_files: usize,
    pub sitemap_urls: Option<usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_of() {
        assert_eq!(SourceKind::of(Path::new("index.tera"), "tera"), SourceKind::Template);
        assert_eq!(SourceKind::of(Path::new("about.html"), "tera"), SourceKind::Markup);
        assert_eq!(SourceKind::of(Path::new("cart.js"), "tera"), SourceKind::Script);
        assert_eq!(SourceKind::of(Path::new("main.css"), "tera"), SourceKind::Stylesheet);
        assert_eq!(SourceKind::of(Path::new("notes.md"), "tera"), SourceKind::Other);
        assert_eq!(SourceKind::of(Path::new("LICENSE"), "tera"), SourceKind::Other);
    }

    #[test]
    fn test_manifest_is_longest_first() {
        let manifest = AssetManifest::from_entries(vec![
            ("app.js".to_string(), "app.11111111.js".to_string()),
            ("legacy-app.js".to_string(), "legacy-app.22222222.js".to_string()),
            ("a.css".to_string(), "a.33333333.css".to_string()),
        ]);
        let keys: Vec<&str> = manifest.entries().iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["legacy-app.js", "app.js", "a.css"]);
        assert_eq!(manifest.get("app.js"), Some("app.11111111.js"));
        assert_eq!(manifest.get("missing.js"), None);
    }

    #[test]
    fn test_manifest_keys_are_unique() {
        let manifest = AssetManifest::from_entries(vec![
            ("app.js".to_string(), "app.1.js".to_string()),
            ("app.js".to_string(), "app.2.js".to_string()),
        ]);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("app.js"), Some("app.2.js"));
    }

    #[test]
    fn test_build_versions_increase() {
        let first = BuildVersion::now();
        std::thread::sleep(Duration::from_millis(5));
        let second = BuildVersion::now();
        assert_ne!(first, second);
        let first_value: i64 = first.as_str().parse().unwrap();
        let second_value: i64 = second.as_str().parse().unwrap();
        assert!(second_value > first_value);
    }
}
