//! Self-contained HTML report of one archived URL.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use archivist_core::{ArchiveItem, Formatter, StageError, StageResult};
use archivist_shared::{Media, Metadata, PluginConfig, Result, Value};

use crate::html::escape;

const STYLE: &str = "body{font-family:sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\
table{border-collapse:collapse;width:100%}td,th{border:1px solid #ccc;padding:.3rem;text-align:left;vertical-align:top}\
code{word-break:break-all}img,video{max-width:20rem;max-height:15rem}";

pub struct HtmlFormatter;

impl HtmlFormatter {
    pub const NAME: &'static str = "html_formatter";

    /// Media label of the produced report.
    pub const KEY: &'static str = "html_report";

    pub fn from_config(_config: &PluginConfig) -> Result<Arc<dyn Formatter>> {
        Ok(Arc::new(Self))
    }

    pub fn render(metadata: &Metadata) -> String {
        let url = escape(metadata.url());
        let title = escape(metadata.title().unwrap_or(metadata.url()));

        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
             <style>{STYLE}</style></head><body>\n<h1>{title}</h1>\n\
             <p><a href=\"{url}\">{url}</a></p>\n"
        );

        out.push_str("<h2>Media</h2>\n<table><tr><th>File</th><th>Type</th><th>SHA-256</th><th>Preview</th></tr>\n");
        for media in metadata.media() {
            render_media_row(&mut out, media);
        }
        out.push_str("</table>\n");

        out.push_str("<h2>Metadata</h2>\n");
        render_properties(&mut out, metadata.clean_properties());

        let failures = metadata.failures();
        if !failures.is_empty() {
            out.push_str("<h2>Failures</h2>\n<ul>\n");
            for (plugin, message) in failures {
                let _ = writeln!(out, "<li><b>{}</b>: {}</li>", escape(&plugin), escape(&message));
            }
            out.push_str("</ul>\n");
        }

        let _ = writeln!(
            out,
            "<footer><small>archivist {}</small></footer></body></html>",
            env!("CARGO_PKG_VERSION")
        );
        out
    }
}

fn render_media_row(out: &mut String, media: &Media) {
    let name = media.file_name().unwrap_or_default();
    let label = match media.key() {
        Some(key) => format!("{} ({})", escape(&name), escape(key)),
        None => escape(&name),
    };
    let _ = writeln!(
        out,
        "<tr><td>{label}</td><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
        escape(media.mime_type().unwrap_or("unknown")),
        escape(media.content_hash()),
        preview(media)
    );
}

/// Inline player or image for the file, pointing at its stored location when
/// a storage already holds it, else at the file name next to the report.
fn preview(media: &Media) -> String {
    let Some(src) = media
        .remote_location()
        .map(str::to_string)
        .or_else(|| media.file_name())
    else {
        return String::new();
    };
    let src = escape(&src);

    if media.is_image() {
        format!("<img src=\"{src}\" alt=\"\" loading=\"lazy\">")
    } else if media.is_video() {
        format!("<video src=\"{src}\" controls preload=\"metadata\"></video>")
    } else if media.is_audio() {
        format!("<audio src=\"{src}\" controls></audio>")
    } else {
        format!("<a href=\"{src}\">open</a>")
    }
}

fn render_properties<'a>(out: &mut String, properties: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push_str("<table>\n");
    for (key, value) in properties {
        let _ = write!(out, "<tr><th>{}</th><td>", escape(key));
        match value {
            Value::Nested(nested) => render_properties(out, nested.properties().iter()),
            other => out.push_str(&escape(&other.display())),
        }
        out.push_str("</td></tr>\n");
    }
    out.push_str("</table>\n");
}

#[async_trait]
impl Formatter for HtmlFormatter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn format(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Media> {
        if metadata.is_empty() {
            debug!(url = metadata.url(), "no media or metadata to format");
            return Err(StageError::failed("nothing to format: no media or metadata"));
        }
        let content = Self::render(metadata);
        super::write_artifact(
            &item.scratch_dir,
            format!("report-{}.html", Uuid::now_v7()),
            &content,
            Self::KEY,
        )
        .await
    }
}
