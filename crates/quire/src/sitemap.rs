use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::config::SitemapConfig;
use crate::error::{IoContext, Result};
use crate::paths::relative_portable;
use crate::walk::{has_extension, list_all_files};
use crate::xml::escape;

pub const SITEMAP_FILE_NAME: &str = "sitemap.xml";
pub const BASE_URL_ENV: &str = "SITEMAP_BASE_URL";

const INDEX_PAGE: &str = "index.html";

/// `SITEMAP_BASE_URL` wins over the configured base URL when set.
pub fn resolve_base_url(configured: &str) -> String {
    match std::env::var(BASE_URL_ENV) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => configured.to_string(),
    }
}

/// Output-relative HTML pages, index first, then alphabetical. Files whose
/// name is in `exclude` are left out wherever they live.
pub fn collect_pages(output_dir: &Path, exclude: &BTreeSet<String>) -> Result<Vec<String>> {
    let output_dir = std::path::absolute(output_dir)?;
    let mut pages: Vec<String> = list_all_files(&output_dir)?
        .into_iter()
        .filter(|path| has_extension(path, &["html"]))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !exclude.contains(name))
        })
        .map(|path| relative_portable(&path, &output_dir))
        .collect();

    pages.sort_by(|a, b| match (a == INDEX_PAGE, b == INDEX_PAGE) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.cmp(b),
    });
    Ok(pages)
}

/// `index.html` maps to the site root and `dir/index.html` to `dir/`.
pub fn page_url(base_url: &str, page: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    if page == INDEX_PAGE {
        return format!("{base_url}/");
    }
    match page.strip_suffix(INDEX_PAGE) {
        Some(directory) if directory.ends_with('/') => format!("{base_url}/{directory}"),
        _ => format!("{base_url}/{page}"),
    }
}

pub fn render_sitemap(base_url: &str, pages: &[String]) -> String {
    let urls: Vec<String> = pages
        .iter()
        .map(|page| format!("  <url><loc>{}</loc></url>", escape(&page_url(base_url, page))))
        .collect();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}\n</urlset>\n",
        urls.join("\n")
    )
}

pub fn generate_sitemap(
    output_dir: &Path,
    base_url: &str,
    exclude: &BTreeSet<String>,
) -> Result<(String, usize)> {
    let pages = collect_pages(output_dir, exclude)?;
    Ok((render_sitemap(base_url, &pages), pages.len()))
}

/// Writes `sitemap.xml` into the output dir and, when given, mirrors it into
/// `mirror_dir`. Returns the number of URLs listed.
pub fn write_sitemap(
    output_dir: &Path,
    base_url: &str,
    config: &SitemapConfig,
    mirror_dir: Option<&Path>,
) -> Result<usize> {
    let (sitemap, count) = generate_sitemap(output_dir, base_url, &config.exclude)?;

    let destination = output_dir.join(SITEMAP_FILE_NAME);
    fs::write(&destination, &sitemap).io_context("writing sitemap", &destination)?;

    if let Some(mirror_dir) = mirror_dir.filter(|_| config.mirror_to_static) {
        fs::create_dir_all(mirror_dir).io_context("creating directory", mirror_dir)?;
        let mirrored = mirror_dir.join(SITEMAP_FILE_NAME);
        fs::write(&mirrored, &sitemap).io_context("writing sitemap", &mirrored)?;
    }

    tracing::info!(urls = count, base_url, "wrote sitemap");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let out = dir.path();
        fs::create_dir_all(out.join("blog")).unwrap();
        for page in [
            "index.html",
            "catalogo.html",
            "404.html",
            "navbar.html",
            "gtm.html",
            "blog/index.html",
            "blog/resenas.html",
            "app.js",
        ] {
            fs::write(out.join(page), "<html></html>").unwrap();
        }
        dir
    }

    #[test]
    fn test_page_url() {
        let base = "https://morfemalibreria.com.ar";
        assert_eq!(page_url(base, "index.html"), "https://morfemalibreria.com.ar/");
        assert_eq!(page_url(base, "blog/index.html"), "https://morfemalibreria.com.ar/blog/");
        assert_eq!(
            page_url("https://morfemalibreria.com.ar/", "catalogo.html"),
            "https://morfemalibreria.com.ar/catalogo.html"
        );
        assert_eq!(page_url(base, "myindex.html"), "https://morfemalibreria.com.ar/myindex.html");
    }

    #[test]
    fn test_collect_pages_orders_and_excludes() {
        let dir = site_tree();
        let pages = collect_pages(dir.path(), &SitemapConfig::default().exclude).unwrap();
        assert_eq!(
            pages,
            vec!["index.html", "blog/index.html", "blog/resenas.html", "catalogo.html"]
        );
    }

    #[test]
    fn test_render_sitemap_exact_format() {
        let pages = vec!["index.html".to_string(), "catalogo.html".to_string()];
        assert_eq!(
            render_sitemap("https://example.com", &pages),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n  \
<url><loc>https://example.com/</loc></url>\n  \
<url><loc>https://example.com/catalogo.html</loc></url>\n\
</urlset>\n"
        );
    }

    #[test]
    fn test_render_sitemap_escapes_locations() {
        let pages = vec!["a&b.html".to_string()];
        assert!(render_sitemap("https://example.com", &pages).contains("/a&amp;b.html"));
    }

    #[test]
    fn test_write_sitemap_mirrors() {
        let dir = site_tree();
        let mirror = TempDir::new().unwrap();
        let count = write_sitemap(
            dir.path(),
            "https://example.com",
            &SitemapConfig::default(),
            Some(mirror.path()),
        )
        .unwrap();

        assert_eq!(count, 4);
        let written = fs::read_to_string(dir.path().join(SITEMAP_FILE_NAME)).unwrap();
        let mirrored = fs::read_to_string(mirror.path().join(SITEMAP_FILE_NAME)).unwrap();
        assert_eq!(written, mirrored);
        assert!(written.contains("<loc>https://example.com/blog/</loc>"));
        assert!(!written.contains("404"));
    }

    #[test]
    fn test_write_sitemap_without_mirroring() {
        let dir = site_tree();
        let mirror = TempDir::new().unwrap();
        let config = SitemapConfig {
            mirror_to_static: false,
            ..SitemapConfig::default()
        };
        write_sitemap(dir.path(), "https://example.com", &config, Some(mirror.path())).unwrap();
        assert!(!mirror.path().join(SITEMAP_FILE_NAME).exists());
    }
}
