use chrono::{Local, NaiveDate};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::assets::{ReferenceRewriter, hash_assets};
use crate::catalog::emit_catalog;
use crate::compile::{Compiler, NativeCompiler};
use crate::config::{BuildConfig, StaticConfig};
use crate::error::{IoContext, QuireError, Result};
use crate::events::{load_events, partition_events};
use crate::images::{ImageCodec, RasterCodec, generate_variants};
use crate::paths::relative_portable;
use crate::process::{Navigation, SourceProcessor, copy_verbatim};
use crate::render::{Renderer, TeraRenderer};
use crate::sitemap::{resolve_base_url, write_sitemap};
use crate::types::{BuildReport, BuildVersion, VariantTable};
use crate::walk::list_all_files;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clean,
    CopyStatic,
    GenerateImageVariants,
    ProcessSourceTree,
    RenderDataPages,
    EmitCatalog,
    HashAssets,
    RewriteReferences,
    EmitSitemap,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clean => "CLEAN",
            Self::CopyStatic => "COPY_STATIC",
            Self::GenerateImageVariants => "GENERATE_IMAGE_VARIANTS",
            Self::ProcessSourceTree => "PROCESS_SOURCE_TREE",
            Self::RenderDataPages => "RENDER_DATA_PAGES",
            Self::EmitCatalog => "EMIT_CATALOG",
            Self::HashAssets => "HASH_ASSETS",
            Self::RewriteReferences => "REWRITE_REFERENCES",
            Self::EmitSitemap => "EMIT_SITEMAP",
            Self::Done => "DONE",
        };
        formatter.write_str(name)
    }
}

/// Absolute locations of one build's inputs and output.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    pub project_dir: PathBuf,
    pub source_dir: PathBuf,
    pub static_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cover_dir: PathBuf,
}

impl BuildPaths {
    pub fn resolve(project_dir: &Path, config: &BuildConfig) -> Result<Self> {
        let project_dir = std::path::absolute(project_dir)?;
        let static_dir = project_dir.join(&config.static_dir);
        let paths = Self {
            source_dir: project_dir.join(&config.source_dir),
            cover_dir: static_dir.join(&config.covers.dir),
            output_dir: project_dir.join(&config.output_dir),
            static_dir,
            project_dir,
        };

        // The output dir is wiped on every build.
        let protected = [&paths.project_dir, &paths.source_dir, &paths.static_dir];
        if protected
            .iter()
            .any(|dir| paths.output_dir == **dir || dir.starts_with(&paths.output_dir))
        {
            return Err(QuireError::InvalidPath {
                path: paths.output_dir.clone(),
            });
        }
        Ok(paths)
    }
}

pub struct SiteBuilder {
    project_dir: PathBuf,
    config: BuildConfig,
    base_url_override: Option<String>,
    version: Option<BuildVersion>,
    today: Option<NaiveDate>,
    renderer: Option<Box<dyn Renderer>>,
    compiler: Box<dyn Compiler>,
    codec: Box<dyn ImageCodec>,
}

impl SiteBuilder {
    /// Loads `quire.toml` from `project_dir` when present.
    pub fn new(project_dir: impl AsRef<Path>) -> Result<Self> {
        let project_dir = project_dir.as_ref();
        let config = BuildConfig::load(project_dir)?;
        Ok(Self::with_config(project_dir, config))
    }

    pub fn with_config(project_dir: impl AsRef<Path>, config: BuildConfig) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            config,
            base_url_override: None,
            version: None,
            today: None,
            renderer: None,
            compiler: Box::new(NativeCompiler::new()),
            codec: Box::new(RasterCodec),
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Takes precedence over `SITEMAP_BASE_URL` and the configured base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url_override = Some(url.into());
        self
    }

    pub fn sitemap(mut self, enabled: bool) -> Self {
        self.config.sitemap.enabled = enabled;
        self
    }

    /// Pins the cache-busting stamp instead of taking the current time.
    pub fn version(mut self, version: BuildVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Pins the date used to split upcoming and past events.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn compiler(mut self, compiler: Box<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn codec(mut self, codec: Box<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn paths(&self) -> Result<BuildPaths> {
        BuildPaths::resolve(&self.project_dir, &self.config)
    }

    /// Runs every stage in order. The first failure aborts the build and
    /// leaves the output dir in an unspecified state.
    pub fn build(&self) -> Result<BuildReport> {
        let started = Instant::now();
        let paths = self.paths()?;
        let config = &self.config;
        let version = self.version.clone().unwrap_or_else(BuildVersion::now);
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let mut report = BuildReport {
            version: version.to_string(),
            ..BuildReport::default()
        };

        enter(Stage::Clean);
        clean_output_dir(&paths.output_dir)?;

        enter(Stage::CopyStatic);
        report.static_files = copy_static(
            &paths.static_dir,
            &paths.output_dir,
            &config.static_files,
            &paths.cover_dir,
        )?;

        enter(Stage::GenerateImageVariants);
        let variants = generate_variants(
            &paths.cover_dir,
            &paths.output_dir,
            &config.covers,
            self.codec.as_ref(),
        )?;
        report.image_variants = variants.files_written;

        enter(Stage::ProcessSourceTree);
        let default_renderer;
        let renderer: &dyn Renderer = match &self.renderer {
            Some(renderer) => renderer.as_ref(),
            None => {
                default_renderer =
                    TeraRenderer::new(&paths.source_dir, &config.source.template_extension)?;
                &default_renderer
            }
        };
        let navigation = Navigation::load(
            &paths.source_dir.join(&config.navigation.fragment),
            &config.navigation.container_id,
        )?;
        let processor = SourceProcessor::new(
            renderer,
            self.compiler.as_ref(),
            &navigation,
            &config.scripts.passthrough,
            &config.source.template_extension,
        );
        let events_template = std::path::absolute(paths.source_dir.join(&config.events.template))?;
        report.sources_processed = processor.process_tree(
            &paths.source_dir,
            &config.source.mounts,
            &config.source.skip_dirs,
            std::slice::from_ref(&events_template),
            &paths.output_dir,
        )?;
        tracing::info!(files = report.sources_processed, "processed sources");

        enter(Stage::RenderDataPages);
        report.data_pages =
            self.render_data_pages(&processor, &paths, &events_template, today)?;

        enter(Stage::EmitCatalog);
        report.catalog_records = self.emit_catalog(&paths, &variants.table)?;

        enter(Stage::HashAssets);
        let manifest = hash_assets(&paths.output_dir, &config.hashing)?;
        report.hashed_assets = manifest.len();

        enter(Stage::RewriteReferences);
        let rewriter = ReferenceRewriter::new(&manifest, version)?;
        report.rewritten_files = rewriter.rewrite_tree(&paths.output_dir)?;

        if config.sitemap.enabled {
            enter(Stage::EmitSitemap);
            let base_url = self
                .base_url_override
                .clone()
                .unwrap_or_else(|| resolve_base_url(&config.base_url));
            report.sitemap_urls = Some(write_sitemap(
                &paths.output_dir,
                &base_url,
                &config.sitemap,
                Some(&paths.static_dir),
            )?);
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            stage = %Stage::Done,
            version = %report.version,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build finished"
        );
        Ok(report)
    }

    fn render_data_pages(
        &self,
        processor: &SourceProcessor<'_>,
        paths: &BuildPaths,
        template: &Path,
        today: NaiveDate,
    ) -> Result<usize> {
        let events = &self.config.events;
        let data = paths.static_dir.join(&events.data);

        if !template.is_file() || !data.is_file() {
            tracing::warn!(
                template = %template.display(),
                data = %data.display(),
                "events template or data missing, skipping data pages"
            );
            return Ok(0);
        }

        let partition = partition_events(load_events(&data)?, today, &data)?;
        tracing::info!(
            upcoming = partition.upcoming.len(),
            past = partition.past.len(),
            "partitioned events"
        );
        processor.render_page(
            template,
            &partition.into_context(),
            &paths.output_dir.join(&events.output),
        )?;
        Ok(1)
    }

    fn emit_catalog(&self, paths: &BuildPaths, variants: &VariantTable) -> Result<usize> {
        let catalog = &self.config.catalog;
        let source = paths.static_dir.join(&catalog.file);
        if !source.is_file() {
            tracing::warn!(path = %source.display(), "catalog not found, skipping");
            return Ok(0);
        }
        emit_catalog(
            &source,
            &paths.output_dir.join(&catalog.file),
            variants,
            catalog.validate,
        )
    }
}

fn enter(stage: Stage) {
    tracing::info!(%stage, "entering stage");
}

pub fn clean_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir).io_context("removing", output_dir)?;
    }
    fs::create_dir_all(output_dir).io_context("creating directory", output_dir)
}

/// Copies the static dir into the output dir. Entries of the `flatten`
/// subdirectories land in the output root; the cover subtree and the
/// `exclude` files are skipped.
pub fn copy_static(
    static_dir: &Path,
    output_dir: &Path,
    config: &StaticConfig,
    cover_dir: &Path,
) -> Result<usize> {
    if !static_dir.is_dir() {
        tracing::warn!(dir = %static_dir.display(), "static directory not found");
        return Ok(0);
    }

    let static_root = std::path::absolute(static_dir)?;
    let cover_root = std::path::absolute(cover_dir)?;
    let mut files = list_all_files(&static_root)?;
    files.sort();

    let mut copied = 0;
    for file in files {
        if file.starts_with(&cover_root) {
            continue;
        }
        let relative = relative_portable(&file, &static_root);
        if config.exclude.contains(&relative) {
            tracing::debug!(path = %relative, "skipping excluded static file");
            continue;
        }

        let destination = match relative.split_once('/') {
            Some((top, rest)) if config.flatten.iter().any(|dir| dir == top) => {
                output_dir.join(rest)
            }
            _ => output_dir.join(&relative),
        };
        copy_verbatim(&file, &destination)?;
        copied += 1;
    }

    tracing::info!(files = copied, "copied static files");
    Ok(copied)
}
