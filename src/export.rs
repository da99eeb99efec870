// ABOUTME: Standalone HTML export of a deck
// ABOUTME: Emits impress.js markup, links remote fonts, inlines small stored images and embeds the runtime

use crate::errors::{DeckError, Result};
use crate::html::{self, ImageRef};
use crate::models::{ordered_steps, Deck, Step};
use crate::repository::DeckRepository;
use crate::resources::{remote_resources, AssetFetcher, FetchOutcome, RemoteResource};
use crate::utils;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use comrak::{markdown_to_html, ComrakOptions};
use futures::future::join_all;
use log::{debug, info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const LARGE_IMAGE_NOTE: &str = "<!-- Large image, copy to /assets folder -->";

/// RFC 5987 `attr-char`: everything else in an extended header value is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Configuration for deck export
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Images strictly smaller than this are inlined as data URIs
    pub inline_threshold_bytes: usize,
    pub asset_fetch_timeout: Duration,
    pub runtime_fetch_timeout: Duration,
    /// Presentation runtime to embed. `None` skips the download.
    pub runtime_script_url: Option<String>,
    /// Substrings identifying URLs served by the asset store (case-insensitive)
    pub storage_markers: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: 100 * 1024,
            asset_fetch_timeout: Duration::from_secs(5),
            runtime_fetch_timeout: Duration::from_secs(10),
            runtime_script_url: Some(crate::config::DEFAULT_RUNTIME_SCRIPT_URL.to_string()),
            storage_markers: vec!["minio".to_string(), "decks/".to_string()],
        }
    }
}

impl ExportConfig {
    pub fn is_storage_url(&self, src: &str) -> bool {
        let src = src.to_lowercase();
        self.storage_markers
            .iter()
            .any(|marker| !marker.is_empty() && src.contains(&marker.to_lowercase()))
    }
}

/// A rendered export ready to be served as a download
#[derive(Debug, Clone)]
pub struct ExportedDeck {
    pub filename: String,
    pub html: String,
}

impl ExportedDeck {
    pub const CONTENT_TYPE: &'static str = "text/html; charset=utf-8";

    /// Header value with a plain ASCII `filename` for old clients and the
    /// exact UTF-8 name in `filename*`.
    pub fn content_disposition(&self) -> String {
        let fallback: String = self
            .filename
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii() && !c.is_ascii_control() => c,
                _ => '_',
            })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(&self.filename, ATTR_CHAR)
        )
    }
}

/// The CSS family a step's font reference names. Stylesheet URLs carry it in
/// their `family` query parameter (Google Fonts style).
pub fn font_family_name(font: &str) -> Option<String> {
    let font = font.trim();
    if font.is_empty() {
        return None;
    }
    if RemoteResource::new(font).is_none() {
        return Some(font.to_string());
    }

    let url = Url::parse(font).ok()?;
    let family = url
        .query_pairs()
        .find(|(k, _)| k == "family")
        .map(|(_, v)| v.into_owned())?;
    let name = family.split([':', '|']).next().unwrap_or("").trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn render_notes(notes: &str) -> Option<String> {
    if notes.trim().is_empty() {
        return None;
    }
    // Raw HTML in notes is omitted
    let options = ComrakOptions::default();
    Some(format!(
        "<div class=\"notes\">{}</div>",
        markdown_to_html(notes, &options)
    ))
}

/// Renders a deck into a single HTML document for offline viewing.
pub struct ExportRenderer {
    repo: Arc<dyn DeckRepository>,
    fetcher: Arc<dyn AssetFetcher>,
    config: ExportConfig,
}

impl ExportRenderer {
    pub fn new(
        repo: Arc<dyn DeckRepository>,
        fetcher: Arc<dyn AssetFetcher>,
        config: ExportConfig,
    ) -> Self {
        Self {
            repo,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export `deck_id`. Individual assets that cannot be fetched degrade the
    /// document but never fail the export.
    pub async fn export(&self, deck_id: &str) -> Result<ExportedDeck> {
        let deck = self
            .repo
            .get_deck(deck_id)
            .await?
            .ok_or_else(|| DeckError::DeckNotFound(deck_id.to_string()))?;
        let steps = ordered_steps(&deck.order, self.repo.find_steps(deck_id).await?);
        info!("Exporting deck {} with {} steps", deck_id, steps.len());

        let mut step_blocks = Vec::with_capacity(steps.len());
        for step in &steps {
            let content = self.inline_images(&step.inner_html).await;
            step_blocks.push(step_block(step, &content));
        }

        let runtime = self.runtime_script().await;
        let html = render_document(&deck, &steps, &step_blocks, &runtime);

        Ok(ExportedDeck {
            filename: utils::export_filename(&deck.title),
            html,
        })
    }

    /// Replace stored images in `content` with data URIs where small enough.
    pub async fn inline_images(&self, content: &str) -> String {
        let refs = html::image_refs(content);
        if refs.is_empty() {
            return content.to_string();
        }
        let replacements = join_all(refs.iter().map(|image| self.resolve_image(image))).await;
        html::replace_image_refs(content, &refs, &replacements)
    }

    async fn resolve_image(&self, image: &ImageRef) -> Option<String> {
        if !self.config.is_storage_url(&image.src) {
            return None;
        }

        // src was attribute-escaped by the sanitizer
        let url = html::unescape_text(&image.src);
        match self.fetcher.fetch(&url, self.config.asset_fetch_timeout).await {
            FetchOutcome::Fetched {
                bytes,
                content_type,
            } if bytes.len() < self.config.inline_threshold_bytes => {
                debug!("Inlining {} ({} bytes)", url, bytes.len());
                let data_uri = format!("data:{};base64,{}", content_type, BASE64.encode(&bytes));
                Some(image.with_src(&data_uri))
            }
            FetchOutcome::Fetched { bytes, .. } => {
                debug!("Keeping large image {} ({} bytes) as a link", url, bytes.len());
                Some(format!("{}{}", image.with_src(&image.src), LARGE_IMAGE_NOTE))
            }
            FetchOutcome::Unavailable(reason) => {
                warn!("Leaving image {} as is: {}", url, reason);
                None
            }
        }
    }

    async fn runtime_script(&self) -> String {
        let Some(url) = &self.config.runtime_script_url else {
            return String::new();
        };
        match self.fetcher.fetch(url, self.config.runtime_fetch_timeout).await {
            outcome @ FetchOutcome::Fetched { .. } => outcome.text().unwrap_or_default(),
            FetchOutcome::Unavailable(reason) => {
                warn!("Presentation runtime unavailable, exporting without it: {}", reason);
                String::new()
            }
        }
    }
}

fn optional_attr(name: &str, value: Option<u32>) -> String {
    value
        .map(|v| format!(" {}=\"{}\"", name, v))
        .unwrap_or_default()
}

fn step_block(step: &Step, content: &str) -> String {
    let class = if step.is_slide { "step slide" } else { "step" };
    let style = step
        .font_family
        .as_deref()
        .and_then(font_family_name)
        .map(|family| format!("font-family: {};", html::escape(&family)))
        .unwrap_or_default();
    let notes = render_notes(&step.notes).unwrap_or_default();

    format!(
        r#"
    <div class="{class}"
         data-x="{x}"
         data-y="{y}"
         data-z="{z}"
         data-rotate="{rotate}"
         data-rotate-x="{rotate_x}"
         data-rotate-y="{rotate_y}"
         data-rotate-z="{rotate_z}"
         data-scale="{scale}"
         data-transition-duration="{duration}"{autoplay}
         style="{style}">
        {content}
        {notes}
    </div>
"#,
        class = class,
        x = step.x,
        y = step.y,
        z = step.z,
        rotate = step.rotate,
        rotate_x = step.rotate_x,
        rotate_y = step.rotate_y,
        rotate_z = step.rotate_z,
        scale = step.scale,
        duration = step.transition_duration,
        autoplay = optional_attr("data-autoplay", step.autoplay),
        style = style,
        content = content,
        notes = notes,
    )
}

fn overview_block(deck: &Deck) -> String {
    if !deck.has_overview {
        return String::new();
    }
    format!(
        r#"
    <div id="overview" class="step"
         data-x="{}"
         data-y="{}"
         data-z="{}"
         data-scale="{}">
    </div>
"#,
        deck.overview_x, deck.overview_y, deck.overview_z, deck.overview_scale
    )
}

fn render_document(deck: &Deck, steps: &[Step], step_blocks: &[String], runtime: &str) -> String {
    let font_links = remote_resources(steps.iter().filter_map(|s| s.font_family.as_deref()))
        .iter()
        .map(|font| format!("    {}", font.stylesheet_link()))
        .collect::<Vec<_>>()
        .join("\n");
    let background = utils::color_or(&deck.background_color, crate::models::DEFAULT_BACKGROUND_COLOR);
    let scale_attr = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>

{font_links}

    <style>
        body {{
            font-family: sans-serif;
            min-height: 740px;
            background: {background};
        }}

        .step {{
            position: relative;
            width: {width}px;
            height: {height}px;
            padding: 40px;
            box-sizing: border-box;
        }}

        .notes {{
            display: none;
        }}

        .impress-enabled .step {{
            margin: 0;
            opacity: 0.3;
            transition: opacity 1s;
        }}

        .impress-enabled .step.active {{
            opacity: 1;
        }}
    </style>
</head>
<body>
    <div id="impress"
         data-width="{width}"
         data-height="{height}"
         data-max-scale="{max_scale}"
         data-min-scale="{min_scale}"
         data-perspective="{perspective}"
         data-transition-duration="{duration}"{autoplay}>
{steps}
{overview}
    </div>

    <script>
{runtime}
        impress().init();
    </script>
</body>
</html>"#,
        title = html::escape(&deck.title),
        font_links = font_links,
        background = background,
        width = deck.width,
        height = deck.height,
        max_scale = scale_attr(deck.max_scale),
        min_scale = scale_attr(deck.min_scale),
        perspective = deck.perspective,
        duration = deck.transition_duration,
        autoplay = optional_attr("data-autoplay", deck.autoplay),
        steps = step_blocks.concat(),
        overview = overview_block(deck),
        runtime = runtime,
    )
}
