// ABOUTME: Deck thumbnail generation
// ABOUTME: Rasterizes a deck's first step into a small JPEG, stores it and records the presigned URL

use crate::errors::{DeckError, Result};
use crate::html;
use crate::imaging;
use crate::models::{ordered_steps, thumbnail_key, Deck, Step};
use crate::repository::DeckRepository;
use crate::scheduler::Regenerate;
use crate::storage::AssetStore;
use crate::utils;
use async_trait::async_trait;
use image::RgbImage;
use log::{debug, info, warn};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use std::sync::Arc;

pub const FALLBACK_COLOR: &str = "#6366f1";
const SCENE_SIZE: f32 = 200.0;

/// Families tried, in order, for the generic `sans-serif` used by the scene.
const SANS_SERIF_CANDIDATES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
];

/// Configuration for thumbnail rendering
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Width and height of the square output in pixels
    pub size: u32,
    pub quality: u8,
    pub presign_ttl_days: u32,
    pub title_chars: usize,
    pub excerpt_chars: usize,
    pub fallback_color: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: 200,
            quality: 85,
            presign_ttl_days: 7,
            title_chars: 30,
            excerpt_chars: 50,
            fallback_color: FALLBACK_COLOR.to_string(),
        }
    }
}

/// Text and colors drawn on a thumbnail
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailScene {
    pub background: String,
    pub title: String,
    pub excerpt: String,
}

impl ThumbnailScene {
    pub fn new(deck: &Deck, first_step: &Step, config: &ThumbnailConfig) -> Self {
        Self {
            background: utils::color_or(&deck.background_color, &config.fallback_color)
                .to_string(),
            title: html::truncate_chars(&deck.title, config.title_chars),
            excerpt: html::excerpt(&first_step.inner_html, config.excerpt_chars),
        }
    }

    pub fn to_svg(&self) -> String {
        let mut svg = format!(
            r#"<svg width="200" height="200" viewBox="0 0 200 200" xmlns="http://www.w3.org/2000/svg">
<rect width="200" height="200" fill="{}"/>
<text x="10" y="26" font-family="sans-serif" font-size="16" fill="white">{}</text>
"#,
            self.background,
            html::escape(&self.title)
        );
        if !self.excerpt.is_empty() {
            svg.push_str(&format!(
                "<text x=\"10\" y=\"56\" font-family=\"sans-serif\" font-size=\"16\" fill=\"white\">{}</text>\n",
                html::escape(&self.excerpt)
            ));
        }
        svg.push_str("</svg>");
        svg
    }

    /// Rasterize into a `size`×`size` RGB image.
    pub fn render(&self, fonts: Arc<fontdb::Database>, size: u32) -> Result<RgbImage> {
        let mut options = usvg::Options::default();
        options.fontdb = fonts;

        let tree = usvg::Tree::from_str(&self.to_svg(), &options)
            .map_err(|e| DeckError::EncodingError(format!("Invalid thumbnail scene: {}", e)))?;

        let size = size.max(1);
        let mut pixmap = Pixmap::new(size, size).ok_or_else(|| {
            DeckError::EncodingError(format!("Cannot allocate {}x{} canvas", size, size))
        })?;
        let scale = size as f32 / SCENE_SIZE;
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        // Premultiplied pixels composited over white
        let raw: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let under = 255 - p.alpha();
                [
                    p.red().saturating_add(under),
                    p.green().saturating_add(under),
                    p.blue().saturating_add(under),
                ]
            })
            .collect();

        RgbImage::from_raw(size, size, raw)
            .ok_or_else(|| DeckError::EncodingError("Canvas size mismatch".to_string()))
    }

    pub fn render_jpeg(&self, fonts: Arc<fontdb::Database>, size: u32, quality: u8) -> Result<Vec<u8>> {
        let canvas = self.render(fonts, size)?;
        imaging::encode_jpeg(&canvas, quality)
    }
}

/// Load the host's fonts and point `sans-serif` at a family that is installed.
///
/// fontdb maps `sans-serif` to Arial, which many Linux hosts lack; without a
/// matching face the scene's text would be dropped silently.
pub fn system_fonts() -> fontdb::Database {
    let mut fonts = fontdb::Database::new();
    fonts.load_system_fonts();

    let family = {
        let installed: Vec<&str> = fonts
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.as_str()))
            .collect();
        SANS_SERIF_CANDIDATES
            .iter()
            .copied()
            .find(|candidate| installed.contains(candidate))
            .or_else(|| installed.first().copied())
            .map(str::to_string)
    };

    match family {
        Some(family) => {
            debug!(
                "Loaded {} font faces for thumbnails, sans-serif is {:?}",
                fonts.len(),
                family
            );
            fonts.set_sans_serif_family(family);
        }
        None => warn!("No system fonts found, thumbnail text will not be drawn"),
    }
    fonts
}

/// Vector placeholder served when a deck has no stored thumbnail.
pub fn placeholder_svg(deck: &Deck) -> String {
    let color = utils::color_or(&deck.background_color, FALLBACK_COLOR);
    format!(
        r#"<svg width="200" height="200" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:{color};stop-opacity:1" />
      <stop offset="100%" style="stop-color:{color};stop-opacity:0.7" />
    </linearGradient>
  </defs>
  <rect width="200" height="200" fill="url(#grad)"/>
  <text x="50%" y="50%" font-family="Arial, sans-serif" font-size="18" fill="white" text-anchor="middle" dominant-baseline="central" font-weight="bold">{title}</text>
</svg>"#,
        color = color,
        title = html::escape(&deck.title)
    )
}

/// Renders deck thumbnails and records them on the deck.
///
/// Stateless between calls apart from the font database, which is loaded once.
pub struct ThumbnailGenerator {
    repo: Arc<dyn DeckRepository>,
    store: Arc<dyn AssetStore>,
    config: ThumbnailConfig,
    fonts: Arc<fontdb::Database>,
}

impl ThumbnailGenerator {
    pub fn new(
        repo: Arc<dyn DeckRepository>,
        store: Arc<dyn AssetStore>,
        config: ThumbnailConfig,
    ) -> Self {
        Self::with_fonts(repo, store, config, Arc::new(system_fonts()))
    }

    pub fn with_fonts(
        repo: Arc<dyn DeckRepository>,
        store: Arc<dyn AssetStore>,
        config: ThumbnailConfig,
        fonts: Arc<fontdb::Database>,
    ) -> Self {
        Self {
            repo,
            store,
            config,
            fonts,
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    /// Render, upload and record the thumbnail of `deck_id`.
    ///
    /// Returns `Ok(None)` when the deck does not exist or has no resolvable
    /// step. Rendering and storage errors propagate; the previous reference
    /// on the deck is left untouched in that case.
    pub async fn generate(&self, deck_id: &str) -> Result<Option<String>> {
        let Some(deck) = self.repo.get_deck(deck_id).await? else {
            debug!("Deck {} vanished before thumbnail generation", deck_id);
            return Ok(None);
        };

        let steps = ordered_steps(&deck.order, self.repo.find_steps(deck_id).await?);
        let Some(first_step) = steps.first() else {
            debug!("Deck {} has no ordered steps, no thumbnail", deck_id);
            return Ok(None);
        };

        let scene = ThumbnailScene::new(&deck, first_step, &self.config);
        let fonts = Arc::clone(&self.fonts);
        let (size, quality) = (self.config.size, self.config.quality);
        let jpeg =
            tokio::task::spawn_blocking(move || scene.render_jpeg(fonts, size, quality)).await??;

        let key = deck.thumbnail_key();
        self.store.put(jpeg, &key, "image/jpeg").await?;
        let url = self.store.presign(&key, self.config.presign_ttl_days).await?;

        // Re-read so edits made while rendering are not overwritten
        let Some(mut current) = self.repo.get_deck(deck_id).await? else {
            debug!("Deck {} deleted during thumbnail generation", deck_id);
            self.store.delete(&key).await;
            return Ok(None);
        };
        let remaining = ordered_steps(&current.order, self.repo.find_steps(deck_id).await?);
        if remaining.is_empty() {
            debug!("Deck {} lost its steps during thumbnail generation", deck_id);
            self.clear(deck_id).await?;
            return Ok(None);
        }
        current.thumbnail_url = Some(url.clone());
        self.repo.save_deck(&current).await?;

        info!("Generated thumbnail for deck {}", deck_id);
        Ok(Some(url))
    }

    /// Drop the stored thumbnail and the deck's reference to it.
    pub async fn clear(&self, deck_id: &str) -> Result<()> {
        if let Some(mut deck) = self.repo.get_deck(deck_id).await? {
            if deck.thumbnail_url.take().is_some() {
                self.repo.save_deck(&deck).await?;
            }
        }
        self.store.delete(&thumbnail_key(deck_id)).await;
        Ok(())
    }
}

#[async_trait]
impl Regenerate for ThumbnailGenerator {
    async fn regenerate(&self, deck_id: &str) -> Result<Option<String>> {
        let url = self.generate(deck_id).await?;
        if url.is_none() {
            self.clear(deck_id).await?;
        }
        Ok(url)
    }
}
