pub mod html;
pub mod text;

pub use html::{html_document, render_html, HtmlOptions};
pub use text::render_text;

use crate::persist::read_json;
use anyhow::Context;
use console::style;
use std::path::PathBuf;

/// Re-render a saved JSON run as HTML without touching the API.
pub fn exec(input: PathBuf, output: PathBuf, curated_only: bool) -> anyhow::Result<()> {
    let records = read_json(&input).with_context(|| format!("Failed to read records from {}", input.display()))?;

    render_html(&records, &output, HtmlOptions { raw_fields: !curated_only })
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {} repositories to {}",
        style("Rendered").bold(),
        style(records.len()).cyan(),
        style(output.display()).green()
    );
    Ok(())
}
