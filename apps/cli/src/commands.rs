use quire_build::catalog::{load_catalog, validate_catalog};
use quire_build::sitemap::resolve_base_url;
use quire_build::{BuildConfig, SiteBuilder};
use std::path::{Path, PathBuf};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn project_dir(input: Option<&Path>) -> &Path {
    input.unwrap_or(Path::new("."))
}

fn absolute_output(output: &Path) -> std::io::Result<PathBuf> {
    std::path::absolute(output)
}

pub fn build_site(
    input: Option<&Path>,
    output: Option<&Path>,
    base_url: Option<&str>,
    sitemap: bool,
) -> CommandResult {
    let mut builder = SiteBuilder::new(project_dir(input))?;
    if !sitemap {
        builder = builder.sitemap(false);
    }
    if let Some(output) = output {
        builder = builder.output_dir(absolute_output(output)?);
    }
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }

    println!("Building site...");
    let report = builder.build()?;
    let output_dir = builder.paths()?.output_dir;
    tracing::debug!(?report, output = %output_dir.display(), "build report");

    println!(
        "Built {} sources, {} cover variants, {} catalog records; hashed {} assets and rewrote {} files to {} in {:.2?} (version {})",
        report.sources_processed + report.data_pages,
        report.image_variants,
        report.catalog_records,
        report.hashed_assets,
        report.rewritten_files,
        output_dir.display(),
        report.elapsed,
        report.version
    );
    if let Some(urls) = report.sitemap_urls {
        println!("Sitemap lists {urls} pages");
    }

    Ok(())
}

pub fn check_catalog(input: Option<&Path>) -> CommandResult {
    let project = project_dir(input);
    let config = BuildConfig::load(project)?;
    let catalog_path = project.join(&config.static_dir).join(&config.catalog.file);

    tracing::debug!(catalog = %catalog_path.display(), "validating catalog");
    let document = load_catalog(&catalog_path)?;
    let count = validate_catalog(&document, &catalog_path)?;

    println!("{} parsed successfully: {count} records, all checks passed", catalog_path.display());
    Ok(())
}

pub fn write_sitemap(
    input: Option<&Path>,
    output: Option<&Path>,
    base_url: Option<&str>,
) -> CommandResult {
    let project = project_dir(input);
    let config = BuildConfig::load(project)?;
    let output_dir = match output {
        Some(output) => absolute_output(output)?,
        None => project.join(&config.output_dir),
    };
    if !output_dir.is_dir() {
        return Err(format!(
            "output directory {} does not exist, run `quire build` first",
            output_dir.display()
        )
        .into());
    }

    let base_url = match base_url {
        Some(url) => url.to_string(),
        None => resolve_base_url(&config.base_url),
    };
    tracing::debug!(output = %output_dir.display(), base_url = %base_url, "writing sitemap");
    let static_dir = project.join(&config.static_dir);
    let count = quire_build::sitemap::write_sitemap(
        &output_dir,
        &base_url,
        &config.sitemap,
        Some(&static_dir),
    )?;

    println!("Wrote sitemap with {count} pages to {}", output_dir.display());
    Ok(())
}
