use anyhow::{anyhow, Context};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::path::Path;
use uuid::Uuid;

// 15mm margins expressed in inches, A4 paper.
const MARGIN_IN: f64 = 0.59;
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;

/// Renders an HTML string to a PDF byte buffer through a headless Chromium.
/// One browser instance per call; the `Browser` guard kills the child
/// process when it goes out of scope, on error paths included.
pub fn render_html(html: &str) -> anyhow::Result<Vec<u8>> {
    let tmp = std::env::temp_dir().join(format!("libroclases-{}.html", Uuid::new_v4()));
    std::fs::write(&tmp, html)
        .with_context(|| format!("failed to stage render input {}", tmp.to_string_lossy()))?;
    let result = render_html_file(&tmp);
    let _ = std::fs::remove_file(&tmp);
    result
}

pub fn render_html_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .build()
        .map_err(|e| anyhow!("failed to assemble browser launch options: {}", e))?;

    let browser = Browser::new(options).context("failed to launch headless browser")?;
    let tab = browser.new_tab().context("failed to open browser tab")?;

    let url = format!("file://{}", path.display());
    tab.navigate_to(&url)
        .and_then(|t| t.wait_until_navigated())
        .with_context(|| format!("failed to load {}", url))?;

    let pdf = tab
        .print_to_pdf(Some(PrintToPdfOptions {
            print_background: Some(true),
            paper_width: Some(A4_WIDTH_IN),
            paper_height: Some(A4_HEIGHT_IN),
            margin_top: Some(MARGIN_IN),
            margin_bottom: Some(MARGIN_IN),
            margin_left: Some(MARGIN_IN),
            margin_right: Some(MARGIN_IN),
            prefer_css_page_size: Some(false),
            ..Default::default()
        }))
        .context("pdf render failed")?;

    tracing::debug!(bytes = pdf.len(), "rendered pdf");
    Ok(pdf)
}
