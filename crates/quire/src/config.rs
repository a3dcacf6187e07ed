use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, QuireError, Result};
use crate::paths::DEFAULT_DIGEST_LENGTH;

pub const CONFIG_FILE_NAME: &str = "quire.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub source_dir: PathBuf,
    pub static_dir: PathBuf,
    pub output_dir: PathBuf,
    pub base_url: String,
    pub source: SourceConfig,
    pub scripts: ScriptConfig,
    pub navigation: NavigationConfig,
    pub static_files: StaticConfig,
    pub covers: CoverConfig,
    pub catalog: CatalogConfig,
    pub events: EventsConfig,
    pub hashing: HashingConfig,
    pub sitemap: SitemapConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            static_dir: PathBuf::from("public"),
            output_dir: PathBuf::from("dist"),
            base_url: "https://morfemalibreria.com.ar".to_string(),
            source: SourceConfig::default(),
            scripts: ScriptConfig::default(),
            navigation: NavigationConfig::default(),
            static_files: StaticConfig::default(),
            covers: CoverConfig::default(),
            catalog: CatalogConfig::default(),
            events: EventsConfig::default(),
            hashing: HashingConfig::default(),
            sitemap: SitemapConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Every processed file lands in the output root under its base name.
    Flatten,
    /// The directory structure below the mount is mirrored in the output.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceMount {
    pub dir: PathBuf,
    pub mode: MountMode,
    #[serde(default)]
    pub recursive: bool,
}

impl SourceMount {
    fn flat(dir: &str, recursive: bool) -> Self {
        Self {
            dir: PathBuf::from(dir),
            mode: MountMode::Flatten,
            recursive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub mounts: Vec<SourceMount>,
    pub skip_dirs: Vec<String>,
    pub template_extension: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mounts: vec![
                SourceMount::flat("pages", false),
                SourceMount::flat("components", false),
                SourceMount::flat("js", true),
                SourceMount::flat("styles", false),
                SourceMount {
                    dir: PathBuf::from("content"),
                    mode: MountMode::Preserve,
                    recursive: true,
                },
            ],
            skip_dirs: vec!["templates".to_string()],
            template_extension: "tera".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    /// Hand-authored ES module entry points that are copied verbatim.
    pub passthrough: BTreeSet<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        let passthrough = [
            "comments-esm.js",
            "analytics-esm.js",
            "analytics-dashboard.js",
            "firebase-app.js",
            "firebase-config.js",
            "auth-esm.js",
            "user-profile.js",
            "login-controller.js",
            "registro-controller.js",
            "password-reset-controller.js",
            "verifica-email-controller.js",
            "auth-action-controller.js",
            "session-listener.js",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self { passthrough }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavigationConfig {
    /// Relative to the source dir.
    pub fragment: PathBuf,
    pub container_id: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            fragment: PathBuf::from("components/navbar.html"),
            container_id: "navbar".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Subdirectories of the static dir whose entries are copied into the
    /// output root rather than under their own name.
    pub flatten: Vec<String>,
    /// Static-dir-relative files never copied.
    pub exclude: Vec<String>,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            flatten: vec!["images".to_string()],
            exclude: vec!["firebase-config.js".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverConfig {
    /// Relative to the static dir.
    pub dir: PathBuf,
    /// Output-relative directory the variants are written to.
    pub output: String,
    pub small_width: u32,
    pub large_width: u32,
    pub quality: u8,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("images/fotos"),
            output: "fotos".to_string(),
            small_width: 480,
            large_width: 900,
            quality: 82,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Relative to the static dir; emitted under the same name in the output.
    pub file: PathBuf,
    pub validate: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("books.json"),
            validate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Relative to the source dir.
    pub template: PathBuf,
    /// Relative to the static dir.
    pub data: PathBuf,
    pub output: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("pages/talleres.tera"),
            data: PathBuf::from("talleres.json"),
            output: PathBuf::from("talleres.html"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashingConfig {
    pub digest_length: usize,
    /// Output-relative paths fetched by fixed URL at runtime.
    pub exclude: BTreeSet<String>,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            digest_length: DEFAULT_DIGEST_LENGTH,
            exclude: BTreeSet::from(["comments-esm.js".to_string()]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SitemapConfig {
    pub enabled: bool,
    pub exclude: BTreeSet<String>,
    pub mirror_to_static: bool,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: ["404.html", "navbar.html", "gtm.html"]
                .into_iter()
                .map(String::from)
                .collect(),
            mirror_to_static: true,
        }
    }
}

impl BuildConfig {
    /// Reads `quire.toml` from `project_dir`, falling back to defaults when the
    /// file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).io_context("reading config", &config_path)?;
        Self::parse(&content, &config_path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|error| QuireError::TomlParse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }
}
