// ABOUTME: Deck and step operations that keep thumbnails and exports in sync
// ABOUTME: Mutations sanitize input, maintain deck order and trigger debounced regeneration

use crate::config::Config;
use crate::errors::{DeckError, Result};
use crate::export::{ExportRenderer, ExportedDeck};
use crate::html;
use crate::imaging::{self, ThumbnailFormat};
use crate::models::{
    ordered_steps, thumbnail_key, Deck, Preview, PreviewDeck, PreviewStep, Step, UploadedFile,
    DEFAULT_STEP_HTML,
};
use crate::repository::{DeckFilter, DeckRepository};
use crate::scheduler::RegenerationScheduler;
use crate::storage::AssetStore;
use crate::thumbnail::{placeholder_svg, ThumbnailGenerator};
use crate::utils;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const UPLOAD_MAX_DIMENSION: u32 = 2048;
const UPLOAD_THUMBNAIL_SIZE: (u32, u32) = (200, 200);

/// Fields accepted when creating a step. Unset fields take the step defaults.
#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rotate: Option<f64>,
    pub rotate_x: Option<f64>,
    pub rotate_y: Option<f64>,
    pub rotate_z: Option<f64>,
    pub scale: Option<f64>,
    pub transition_duration: Option<u32>,
    pub autoplay: Option<u32>,
    pub is_slide: Option<bool>,
    pub inner_html: Option<String>,
    pub notes: Option<String>,
    pub font_family: Option<String>,
}

/// Partial update of a step's placement and timing
#[derive(Debug, Clone, Default)]
pub struct StepSettings {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rotate: Option<f64>,
    pub rotate_x: Option<f64>,
    pub rotate_y: Option<f64>,
    pub rotate_z: Option<f64>,
    pub scale: Option<f64>,
    pub transition_duration: Option<u32>,
    pub autoplay: Option<u32>,
    pub is_slide: Option<bool>,
}

/// Partial update of a step's content
#[derive(Debug, Clone, Default)]
pub struct StepData {
    pub inner_html: Option<String>,
    pub notes: Option<String>,
    pub font_family: Option<String>,
}

/// What the thumbnail endpoint serves
#[derive(Debug, Clone, PartialEq)]
pub enum DeckThumbnail {
    Raster { bytes: Vec<u8>, content_type: String },
    Placeholder(String),
}

impl DeckThumbnail {
    pub fn content_type(&self) -> &str {
        match self {
            DeckThumbnail::Raster { content_type, .. } => content_type,
            DeckThumbnail::Placeholder(_) => "image/svg+xml",
        }
    }
}

/// Application-level operations over decks and steps.
///
/// Authorization and request validation belong to the caller.
pub struct DeckService {
    repo: Arc<dyn DeckRepository>,
    store: Arc<dyn AssetStore>,
    thumbnails: Arc<ThumbnailGenerator>,
    scheduler: Arc<RegenerationScheduler>,
    exporter: ExportRenderer,
    debounce: Duration,
}

impl DeckService {
    pub fn new(
        repo: Arc<dyn DeckRepository>,
        store: Arc<dyn AssetStore>,
        thumbnails: Arc<ThumbnailGenerator>,
        scheduler: Arc<RegenerationScheduler>,
        exporter: ExportRenderer,
        debounce: Duration,
    ) -> Self {
        Self {
            repo,
            store,
            thumbnails,
            scheduler,
            exporter,
            debounce,
        }
    }

    /// Wire the service from configuration, sharing one generator between the
    /// scheduler and direct callers.
    pub fn from_config(
        config: &Config,
        repo: Arc<dyn DeckRepository>,
        store: Arc<dyn AssetStore>,
        fetcher: Arc<dyn crate::resources::AssetFetcher>,
    ) -> Self {
        let thumbnails = Arc::new(ThumbnailGenerator::new(
            Arc::clone(&repo),
            Arc::clone(&store),
            config.thumbnail_config(),
        ));
        let scheduler = Arc::new(RegenerationScheduler::new(thumbnails.clone()));
        let exporter = ExportRenderer::new(Arc::clone(&repo), fetcher, config.export_config());
        Self::new(
            repo,
            store,
            thumbnails,
            scheduler,
            exporter,
            config.debounce_delay(),
        )
    }

    pub fn scheduler(&self) -> &Arc<RegenerationScheduler> {
        &self.scheduler
    }

    pub fn thumbnails(&self) -> &Arc<ThumbnailGenerator> {
        &self.thumbnails
    }

    async fn deck(&self, deck_id: &str) -> Result<Deck> {
        self.repo
            .get_deck(deck_id)
            .await?
            .ok_or_else(|| DeckError::DeckNotFound(deck_id.to_string()))
    }

    async fn step(&self, step_id: &str) -> Result<Step> {
        self.repo
            .get_step(step_id)
            .await?
            .ok_or_else(|| DeckError::StepNotFound(step_id.to_string()))
    }

    fn schedule_thumbnail(&self, deck_id: &str) {
        self.scheduler.schedule(deck_id, self.debounce);
    }

    pub async fn create_deck(&self, title: &str, owner_id: &str) -> Result<Deck> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DeckError::ValidationError("Deck title is required".to_string()));
        }
        let deck = Deck::new(title, owner_id);
        self.repo.save_deck(&deck).await?;
        info!("Created deck {}", deck.id);
        Ok(deck)
    }

    pub async fn list_decks(&self, filter: &DeckFilter) -> Result<Vec<Deck>> {
        self.repo.find_decks(filter).await
    }

    /// Validate and persist changes to a deck's settings. Changes to the
    /// background or title are reflected in the thumbnail after the debounce.
    pub async fn update_deck(&self, deck: Deck) -> Result<Deck> {
        utils::validate_hex_color(&deck.background_color)?;
        utils::validate_dimension(deck.width, "width")?;
        utils::validate_dimension(deck.height, "height")?;

        let previous = self.deck(&deck.id).await?;
        let order = self.valid_order(&deck.id, &deck.order).await?;
        let mut deck = Deck { order, ..deck };
        deck.created_at = previous.created_at;
        deck.thumbnail_url = previous.thumbnail_url.clone();
        deck.touch();
        self.repo.save_deck(&deck).await?;

        let visual_change = previous.title != deck.title
            || previous.background_color != deck.background_color
            || previous.order != deck.order;
        if visual_change && !deck.order.is_empty() {
            self.schedule_thumbnail(&deck.id);
        }
        Ok(deck)
    }

    /// Add a step at the end of the deck. The first step of a deck renders the
    /// thumbnail immediately; later steps go through the debounce.
    pub async fn create_step(&self, deck_id: &str, user_id: &str, input: NewStep) -> Result<Step> {
        let mut deck = self.deck(deck_id).await?;

        let defaults = Step::default();
        let step = Step {
            x: utils::clamp_position(input.x.unwrap_or(defaults.x)),
            y: utils::clamp_position(input.y.unwrap_or(defaults.y)),
            z: utils::clamp_position(input.z.unwrap_or(defaults.z)),
            rotate: input.rotate.unwrap_or(defaults.rotate),
            rotate_x: input.rotate_x.unwrap_or(defaults.rotate_x),
            rotate_y: input.rotate_y.unwrap_or(defaults.rotate_y),
            rotate_z: input.rotate_z.unwrap_or(defaults.rotate_z),
            scale: input.scale.unwrap_or(defaults.scale),
            transition_duration: input
                .transition_duration
                .unwrap_or(defaults.transition_duration),
            autoplay: input.autoplay,
            is_slide: input.is_slide.unwrap_or(defaults.is_slide),
            inner_html: html::sanitize_html(input.inner_html.as_deref().unwrap_or(DEFAULT_STEP_HTML)),
            notes: input.notes.unwrap_or_default(),
            font_family: input.font_family,
            ..Step::new(deck_id, user_id)
        };
        self.repo.save_step(&step).await?;

        deck.order.push(step.id.clone());
        deck.touch();
        self.repo.save_deck(&deck).await?;

        if deck.order.len() == 1 {
            if let Err(e) = self.thumbnails.generate(deck_id).await {
                error!("Initial thumbnail for deck {} failed: {}", deck_id, e);
            }
        } else {
            self.schedule_thumbnail(deck_id);
        }
        Ok(step)
    }

    pub async fn update_step_settings(&self, step_id: &str, settings: StepSettings) -> Result<Step> {
        let mut step = self.step(step_id).await?;

        if let Some(x) = settings.x {
            step.x = utils::clamp_position(x);
        }
        if let Some(y) = settings.y {
            step.y = utils::clamp_position(y);
        }
        if let Some(z) = settings.z {
            step.z = utils::clamp_position(z);
        }
        step.rotate = settings.rotate.unwrap_or(step.rotate);
        step.rotate_x = settings.rotate_x.unwrap_or(step.rotate_x);
        step.rotate_y = settings.rotate_y.unwrap_or(step.rotate_y);
        step.rotate_z = settings.rotate_z.unwrap_or(step.rotate_z);
        step.scale = settings.scale.unwrap_or(step.scale);
        step.transition_duration = settings
            .transition_duration
            .unwrap_or(step.transition_duration);
        if settings.autoplay.is_some() {
            step.autoplay = settings.autoplay;
        }
        step.is_slide = settings.is_slide.unwrap_or(step.is_slide);

        self.repo.save_step(&step).await?;
        Ok(step)
    }

    pub async fn update_step_data(&self, step_id: &str, data: StepData) -> Result<Step> {
        let mut step = self.step(step_id).await?;

        if let Some(inner_html) = data.inner_html {
            step.inner_html = html::sanitize_html(&inner_html);
        }
        if let Some(notes) = data.notes {
            step.notes = notes;
        }
        if data.font_family.is_some() {
            step.font_family = data.font_family;
        }

        self.repo.save_step(&step).await?;
        self.schedule_thumbnail(&step.deck_id);
        Ok(step)
    }

    /// Ids of `requested` that name steps of `deck_id`, deduplicated, in order.
    async fn valid_order(&self, deck_id: &str, requested: &[String]) -> Result<Vec<String>> {
        let known: HashSet<String> = self
            .repo
            .find_steps(deck_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let mut seen = HashSet::new();
        Ok(requested
            .iter()
            .filter(|id| known.contains(*id) && seen.insert((*id).clone()))
            .cloned()
            .collect())
    }

    pub async fn reorder_steps(&self, deck_id: &str, step_ids: &[String]) -> Result<Deck> {
        let mut deck = self.deck(deck_id).await?;
        let order = self.valid_order(deck_id, step_ids).await?;
        if order.len() != step_ids.len() {
            warn!(
                "Reorder of deck {} dropped {} unknown or repeated ids",
                deck_id,
                step_ids.len() - order.len()
            );
        }
        deck.order = order;
        deck.touch();
        self.repo.save_deck(&deck).await?;
        self.schedule_thumbnail(deck_id);
        Ok(deck)
    }

    /// Remove a step. Deleting the last step clears the thumbnail right away.
    pub async fn delete_step(&self, step_id: &str) -> Result<()> {
        let step = self.step(step_id).await?;
        let mut deck = self.deck(&step.deck_id).await?;

        if let Some(pos) = deck.order.iter().position(|id| id == step_id) {
            deck.order.remove(pos);
            deck.touch();
            if deck.order.is_empty() {
                self.scheduler.cancel(&deck.id);
                deck.thumbnail_url = None;
                self.repo.save_deck(&deck).await?;
                self.store.delete(&deck.thumbnail_key()).await;
            } else {
                self.repo.save_deck(&deck).await?;
                self.schedule_thumbnail(&deck.id);
            }
        }

        self.repo.delete_step(step_id).await?;
        debug!("Deleted step {} of deck {}", step_id, step.deck_id);
        Ok(())
    }

    pub async fn duplicate_step(&self, step_id: &str, user_id: &str) -> Result<Step> {
        let step = self.step(step_id).await?;
        let mut deck = self.deck(&step.deck_id).await?;

        let copy = step.duplicate(&step.deck_id, user_id);
        self.repo.save_step(&copy).await?;

        deck.order.push(copy.id.clone());
        deck.touch();
        self.repo.save_deck(&deck).await?;
        Ok(copy)
    }

    /// Copy a deck with all its steps. The copy is private, owned by
    /// `owner_id` and gets its own thumbnail.
    pub async fn clone_deck(&self, deck_id: &str, owner_id: &str) -> Result<Deck> {
        let source = self.deck(deck_id).await?;
        let mut copy = Deck {
            id: Uuid::new_v4().to_string(),
            title: format!("{} (Copy)", source.title),
            order: Vec::new(),
            is_public: false,
            preview_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            thumbnail_url: None,
            ..source.clone()
        };
        copy.created_at = chrono::Utc::now();
        copy.updated_at = copy.created_at;

        for step in ordered_steps(&source.order, self.repo.find_steps(deck_id).await?) {
            let new_step = step.duplicate(&copy.id, owner_id);
            self.repo.save_step(&new_step).await?;
            copy.order.push(new_step.id);
        }
        self.repo.save_deck(&copy).await?;

        if !copy.order.is_empty() {
            self.schedule_thumbnail(&copy.id);
        }
        info!("Cloned deck {} into {}", deck_id, copy.id);
        Ok(copy)
    }

    /// Delete a deck and everything it owns, one document at a time.
    pub async fn delete_deck(&self, deck_id: &str) -> Result<()> {
        let deck = self.deck(deck_id).await?;
        self.scheduler.cancel(deck_id);

        for step in self.repo.find_steps(deck_id).await? {
            self.repo.delete_step(&step.id).await?;
        }
        self.store.delete(&thumbnail_key(deck_id)).await;
        self.repo.delete_deck(&deck.id).await?;
        info!("Deleted deck {}", deck_id);
        Ok(())
    }

    pub async fn preview(&self, deck_id: &str) -> Result<Preview> {
        let deck = self.deck(deck_id).await?;
        self.build_preview(&deck).await
    }

    /// Preview by public token. Private decks are not returned.
    pub async fn public_preview(&self, preview_id: &str) -> Result<Option<Preview>> {
        let filter = DeckFilter {
            preview_id: Some(preview_id.to_string()),
            is_public: Some(true),
            ..DeckFilter::default()
        };
        match self.repo.find_decks(&filter).await?.first() {
            Some(deck) => Ok(Some(self.build_preview(deck).await?)),
            None => Ok(None),
        }
    }

    async fn build_preview(&self, deck: &Deck) -> Result<Preview> {
        let steps = ordered_steps(&deck.order, self.repo.find_steps(&deck.id).await?);
        Ok(Preview {
            deck: PreviewDeck::from(deck),
            steps: steps.into_iter().map(PreviewStep::from).collect(),
        })
    }

    pub async fn export(&self, deck_id: &str) -> Result<ExportedDeck> {
        self.exporter.export(deck_id).await
    }

    /// The stored thumbnail, or a generated placeholder when there is none.
    pub async fn thumbnail(&self, deck_id: &str) -> Result<DeckThumbnail> {
        let deck = self.deck(deck_id).await?;
        if deck.thumbnail_url.is_some() {
            match self.store.get(&deck.thumbnail_key()).await {
                Ok(bytes) => {
                    return Ok(DeckThumbnail::Raster {
                        bytes,
                        content_type: "image/jpeg".to_string(),
                    })
                }
                Err(e) => warn!("Stored thumbnail of deck {} unreadable: {}", deck_id, e),
            }
        }
        Ok(DeckThumbnail::Placeholder(placeholder_svg(&deck)))
    }

    /// Store a media file for a deck. Images are optimized and get a 200×200
    /// JPEG thumbnail; a failing thumbnail does not fail the upload.
    pub async fn upload_file(
        &self,
        deck_id: &str,
        bytes: Vec<u8>,
        original_name: &str,
        content_type: &str,
    ) -> Result<UploadedFile> {
        self.deck(deck_id).await?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(DeckError::ValidationError(format!(
                "File exceeds {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }

        let file_id = Uuid::new_v4().to_string();
        let object_key = match utils::file_extension(original_name) {
            Some(ext) => format!("decks/{}/{}.{}", deck_id, file_id, ext.to_ascii_lowercase()),
            None => format!("decks/{}/{}", deck_id, file_id),
        };

        if !imaging::is_image_type(content_type) {
            let size = bytes.len();
            self.store.put(bytes, &object_key, content_type).await?;
            return Ok(UploadedFile {
                deck_id: deck_id.to_string(),
                original_name: original_name.to_string(),
                object_key,
                thumbnail_key: None,
                size,
                content_type: content_type.to_string(),
            });
        }

        let (optimized, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumbnail =
                imaging::create_thumbnail(&bytes, UPLOAD_THUMBNAIL_SIZE, ThumbnailFormat::Jpeg);
            let optimized =
                imaging::optimize_image(&bytes, Some(UPLOAD_MAX_DIMENSION), imaging::DEFAULT_QUALITY);
            (optimized, thumbnail)
        })
        .await?;

        let size = optimized.len();
        self.store.put(optimized, &object_key, content_type).await?;

        let thumbnail_key = match thumbnail {
            Ok(data) => {
                let key = format!("decks/{}/thumb_{}.jpg", deck_id, file_id);
                self.store
                    .put(data, &key, ThumbnailFormat::Jpeg.content_type())
                    .await?;
                Some(key)
            }
            Err(e) => {
                warn!("No thumbnail for upload {}: {}", original_name, e);
                None
            }
        };

        Ok(UploadedFile {
            deck_id: deck_id.to_string(),
            original_name: original_name.to_string(),
            object_key,
            thumbnail_key,
            size,
            content_type: content_type.to_string(),
        })
    }

    /// Remove an uploaded file and its thumbnail. Reports whether the file existed.
    pub async fn delete_file(&self, file: &UploadedFile) -> bool {
        let removed = self.store.delete(&file.object_key).await;
        if let Some(key) = &file.thumbnail_key {
            self.store.delete(key).await;
        }
        removed
    }
}
