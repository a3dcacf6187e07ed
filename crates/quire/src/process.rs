use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::compile::{CodeKind, Compiler};
use crate::config::{MountMode, SourceMount};
use crate::error::{IoContext, QuireError, Result};
use crate::render::Renderer;
use crate::types::SourceKind;
use crate::walk::list_files_skipping;

/// The shared navigation fragment and the empty container it is injected
/// into. Loaded once per build.
#[derive(Debug)]
pub struct Navigation {
    fragment: Option<String>,
    fragment_name: Option<OsString>,
    container: Regex,
}

impl Navigation {
    pub fn load(fragment_path: &Path, container_id: &str) -> Result<Self> {
        let fragment = if fragment_path.is_file() {
            let content = fs::read_to_string(fragment_path)
                .io_context("reading navigation fragment", fragment_path)?;
            Some(content.trim().to_string()).filter(|content| !content.is_empty())
        } else {
            tracing::warn!(
                path = %fragment_path.display(),
                "navigation fragment not found, pages will not get a navbar"
            );
            None
        };

        Ok(Self {
            fragment,
            fragment_name: fragment_path.file_name().map(OsString::from),
            container: container_pattern(container_id)?,
        })
    }

    pub fn from_fragment(fragment: Option<&str>, container_id: &str) -> Result<Self> {
        Ok(Self {
            fragment: fragment.map(String::from),
            fragment_name: None,
            container: container_pattern(container_id)?,
        })
    }

    pub fn is_fragment(&self, path: &Path) -> bool {
        self.fragment_name.is_some() && path.file_name() == self.fragment_name.as_deref()
    }

    /// Fills every empty container with the fragment. Pages without a
    /// container, or builds without a fragment, pass through unchanged.
    pub fn inject(&self, html: &str) -> String {
        let Some(fragment) = self.fragment.as_deref() else {
            return html.to_string();
        };
        self.container
            .replace_all(html, |captures: &Captures| {
                format!("{}\n{}\n  {}", &captures[1], fragment, &captures[2])
            })
            .into_owned()
    }
}

fn container_pattern(container_id: &str) -> Result<Regex> {
    let pattern = format!(
        r#"(?i)(<div\s+id="{}"[^>]*>)(\s*</div>)"#,
        regex::escape(container_id)
    );
    Ok(Regex::new(&pattern)?)
}

/// Maps one source file to its output according to its kind.
pub struct SourceProcessor<'a> {
    renderer: &'a dyn Renderer,
    compiler: &'a dyn Compiler,
    navigation: &'a Navigation,
    passthrough: &'a BTreeSet<String>,
    template_extension: &'a str,
}

impl<'a> SourceProcessor<'a> {
    pub fn new(
        renderer: &'a dyn Renderer,
        compiler: &'a dyn Compiler,
        navigation: &'a Navigation,
        passthrough: &'a BTreeSet<String>,
        template_extension: &'a str,
    ) -> Self {
        Self {
            renderer,
            compiler,
            navigation,
            passthrough,
            template_extension,
        }
    }

    /// Returns the path written, or `None` when the kind is not handled here.
    pub fn process_file(&self, source: &Path, destination: &Path) -> Result<Option<PathBuf>> {
        let kind = SourceKind::of(source, self.template_extension);
        let written = match kind {
            SourceKind::Template => {
                let output = destination.with_extension("html");
                self.render_page(source, &Value::Null, &output)?;
                output
            }
            SourceKind::Markup if self.navigation.is_fragment(source) => {
                copy_verbatim(source, destination)?;
                destination.to_path_buf()
            }
            SourceKind::Markup => {
                let html = fs::read_to_string(source).io_context("reading page", source)?;
                write_output(destination, self.navigation.inject(&html))?;
                destination.to_path_buf()
            }
            SourceKind::Script if self.is_passthrough(source) => {
                copy_verbatim(source, destination)?;
                destination.to_path_buf()
            }
            SourceKind::Script => {
                let bundled = self.compiler.bundle_entry(source)?;
                write_output(destination, bundled)?;
                destination.to_path_buf()
            }
            SourceKind::Stylesheet => {
                let css = fs::read_to_string(source).io_context("reading stylesheet", source)?;
                let minified = self.compiler.minify(&css, CodeKind::Stylesheet, source)?;
                write_output(destination, minified)?;
                destination.to_path_buf()
            }
            SourceKind::Other => return Ok(None),
        };

        tracing::debug!(
            source = %source.display(),
            output = %written.display(),
            ?kind,
            "processed source"
        );
        Ok(Some(written))
    }

    pub fn render_page(&self, template: &Path, context: &Value, output: &Path) -> Result<()> {
        let html = self.renderer.render(template, context)?;
        write_output(output, self.navigation.inject(&html))
    }

    /// Processes every mount under `source_dir`, skipping the files in
    /// `exclude`. Returns how many outputs were written.
    pub fn process_tree(
        &self,
        source_dir: &Path,
        mounts: &[SourceMount],
        skip_dirs: &[String],
        exclude: &[PathBuf],
        output_dir: &Path,
    ) -> Result<usize> {
        let mut written = 0;

        for mount in mounts {
            let mount_dir = source_dir.join(&mount.dir);
            if !mount_dir.is_dir() {
                tracing::debug!(dir = %mount_dir.display(), "source mount absent, skipping");
                continue;
            }

            let mut files = if mount.recursive {
                list_files_skipping(&mount_dir, skip_dirs)?
            } else {
                top_level_files(&mount_dir)?
            };
            files.sort();

            for file in files {
                if exclude.iter().any(|excluded| file.ends_with(excluded)) {
                    continue;
                }
                let destination = match mount.mode {
                    MountMode::Flatten => match file.file_name() {
                        Some(name) => output_dir.join(name),
                        None => return Err(QuireError::InvalidPath { path: file.clone() }),
                    },
                    MountMode::Preserve => {
                        let mount_root = std::path::absolute(&mount_dir)?;
                        let relative = file
                            .strip_prefix(&mount_root)
                            .map_err(|_| QuireError::InvalidPath { path: file.clone() })?;
                        output_dir.join(relative)
                    }
                };
                if self.process_file(&file, &destination)?.is_some() {
                    written += 1;
                }
            }
        }

        Ok(written)
    }

    fn is_passthrough(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.passthrough.contains(name))
    }
}

fn top_level_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let directory = std::path::absolute(directory)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(&directory).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| QuireError::WalkDir {
            path: directory.clone(),
            message: error.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub(crate) fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    fs::write(path, contents).io_context("writing", path)
}

pub(crate) fn copy_verbatim(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    fs::copy(source, destination).io_context("copying", source)?;
    Ok(())
}
