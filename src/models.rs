// ABOUTME: Document model for decks and steps
// ABOUTME: Holds the persisted shapes plus order resolution shared by thumbnail, export and preview

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_BACKGROUND_COLOR: &str = "#ffffff";
pub const DEFAULT_STEP_HTML: &str = "<h1>New Slide</h1>";

/// A presentation: ordered steps plus shared canvas and camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deck {
    pub id: String,
    pub title: String,
    /// Step ids in presentation order. May contain stale ids.
    pub order: Vec<String>,
    pub is_public: bool,
    pub preview_id: String,

    pub background_color: String,
    pub transition_duration: u32,
    pub width: u32,
    pub height: u32,
    pub max_scale: Option<u32>,
    pub min_scale: Option<u32>,
    pub perspective: u32,
    pub autoplay: Option<u32>,

    pub has_overview: bool,
    pub overview_x: f64,
    pub overview_y: f64,
    pub overview_z: f64,
    pub overview_scale: f64,

    pub owner_id: String,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Deck {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            order: Vec::new(),
            is_public: false,
            preview_id: Uuid::new_v4().to_string(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            transition_duration: 1000,
            width: 1024,
            height: 768,
            max_scale: None,
            min_scale: None,
            perspective: 1000,
            autoplay: None,
            has_overview: true,
            overview_x: 0.0,
            overview_y: 0.0,
            overview_z: 0.0,
            overview_scale: 1.0,
            owner_id: String::new(),
            thumbnail_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Deck {
    pub fn new(title: &str, owner_id: &str) -> Self {
        Self {
            title: title.to_string(),
            owner_id: owner_id.to_string(),
            ..Self::default()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Object key of the generated thumbnail. Deterministic so regeneration overwrites.
    pub fn thumbnail_key(&self) -> String {
        thumbnail_key(&self.id)
    }
}

pub fn thumbnail_key(deck_id: &str) -> String {
    format!("decks/{}/thumbnail.jpg", deck_id)
}

/// One positioned slide within a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub id: String,
    pub deck_id: String,
    pub user_id: String,

    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotate: f64,
    pub rotate_x: f64,
    pub rotate_y: f64,
    pub rotate_z: f64,
    pub scale: f64,

    pub transition_duration: u32,
    pub autoplay: Option<u32>,
    pub is_slide: bool,

    pub inner_html: String,
    pub notes: String,
    pub font_family: Option<String>,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deck_id: String::new(),
            user_id: String::new(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rotate: 0.0,
            rotate_x: 0.0,
            rotate_y: 0.0,
            rotate_z: 0.0,
            scale: 1.0,
            transition_duration: 1000,
            autoplay: None,
            is_slide: true,
            inner_html: DEFAULT_STEP_HTML.to_string(),
            notes: String::new(),
            font_family: None,
        }
    }
}

impl Step {
    pub fn new(deck_id: &str, user_id: &str) -> Self {
        Self {
            deck_id: deck_id.to_string(),
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    /// Copy of this step under a fresh id, optionally moved to another deck.
    pub fn duplicate(&self, deck_id: &str, user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deck_id: deck_id.to_string(),
            user_id: user_id.to_string(),
            ..self.clone()
        }
    }
}

/// Arrange `steps` by `order`, dropping ids with no matching step.
///
/// Steps missing from `order` are not included.
pub fn ordered_steps(order: &[String], steps: Vec<Step>) -> Vec<Step> {
    let mut by_id: HashMap<String, Step> =
        steps.into_iter().map(|s| (s.id.clone(), s)).collect();

    order.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Metadata of a media file uploaded into a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub deck_id: String,
    pub original_name: String,
    pub object_key: String,
    pub thumbnail_key: Option<String>,
    pub size: usize,
    pub content_type: String,
}

/// Public projection of a deck for the presentation runtime.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewDeck {
    pub title: String,
    pub background_color: String,
    pub width: u32,
    pub height: u32,
    pub max_scale: Option<u32>,
    pub min_scale: Option<u32>,
    pub perspective: u32,
    pub autoplay: Option<u32>,
    pub has_overview: bool,
    pub overview_x: f64,
    pub overview_y: f64,
    pub overview_z: f64,
    pub overview_scale: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewStep {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotate: f64,
    pub rotate_x: f64,
    pub rotate_y: f64,
    pub rotate_z: f64,
    pub scale: f64,
    pub transition_duration: u32,
    pub autoplay: Option<u32>,
    pub is_slide: bool,
    pub inner_html: String,
    pub font_family: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub deck: PreviewDeck,
    pub steps: Vec<PreviewStep>,
}

impl From<&Deck> for PreviewDeck {
    fn from(deck: &Deck) -> Self {
        Self {
            title: deck.title.clone(),
            background_color: deck.background_color.clone(),
            width: deck.width,
            height: deck.height,
            max_scale: deck.max_scale,
            min_scale: deck.min_scale,
            perspective: deck.perspective,
            autoplay: deck.autoplay,
            has_overview: deck.has_overview,
            overview_x: deck.overview_x,
            overview_y: deck.overview_y,
            overview_z: deck.overview_z,
            overview_scale: deck.overview_scale,
        }
    }
}

impl From<Step> for PreviewStep {
    fn from(step: Step) -> Self {
        Self {
            id: step.id,
            x: step.x,
            y: step.y,
            z: step.z,
            rotate: step.rotate,
            rotate_x: step.rotate_x,
            rotate_y: step.rotate_y,
            rotate_z: step.rotate_z,
            scale: step.scale,
            transition_duration: step.transition_duration,
            autoplay: step.autoplay,
            is_slide: step.is_slide,
            inner_html: step.inner_html,
            font_family: step.font_family,
        }
    }
}
