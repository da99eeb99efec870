// ABOUTME: Document repository contract for decks and steps
// ABOUTME: Ships an in-memory store and a JSON-per-document store on disk

use crate::errors::{DeckError, Result};
use crate::models::{Deck, Step};
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

/// Filter for listing decks
#[derive(Debug, Clone, Default)]
pub struct DeckFilter {
    pub owner_id: Option<String>,
    pub is_public: Option<bool>,
    pub preview_id: Option<String>,
}

impl DeckFilter {
    pub fn matches(&self, deck: &Deck) -> bool {
        self.owner_id.as_ref().map_or(true, |o| &deck.owner_id == o)
            && self.is_public.map_or(true, |p| deck.is_public == p)
            && self.preview_id.as_ref().map_or(true, |p| &deck.preview_id == p)
    }
}

/// Per-entity document access. There are no transactions across collections;
/// cascades are performed by callers as independent deletes.
#[async_trait]
pub trait DeckRepository: Send + Sync {
    async fn get_deck(&self, id: &str) -> Result<Option<Deck>>;
    async fn find_decks(&self, filter: &DeckFilter) -> Result<Vec<Deck>>;
    async fn save_deck(&self, deck: &Deck) -> Result<()>;
    async fn delete_deck(&self, id: &str) -> Result<bool>;

    async fn get_step(&self, id: &str) -> Result<Option<Step>>;
    async fn find_steps(&self, deck_id: &str) -> Result<Vec<Step>>;
    async fn save_step(&self, step: &Step) -> Result<()>;
    async fn delete_step(&self, id: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryRepository {
    decks: RwLock<HashMap<String, Deck>>,
    steps: RwLock<HashMap<String, Step>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeckRepository for MemoryRepository {
    async fn get_deck(&self, id: &str) -> Result<Option<Deck>> {
        Ok(self.decks.read().get(id).cloned())
    }

    async fn find_decks(&self, filter: &DeckFilter) -> Result<Vec<Deck>> {
        let mut decks: Vec<Deck> = self
            .decks
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        decks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(decks)
    }

    async fn save_deck(&self, deck: &Deck) -> Result<()> {
        self.decks.write().insert(deck.id.clone(), deck.clone());
        Ok(())
    }

    async fn delete_deck(&self, id: &str) -> Result<bool> {
        Ok(self.decks.write().remove(id).is_some())
    }

    async fn get_step(&self, id: &str) -> Result<Option<Step>> {
        Ok(self.steps.read().get(id).cloned())
    }

    async fn find_steps(&self, deck_id: &str) -> Result<Vec<Step>> {
        Ok(self
            .steps
            .read()
            .values()
            .filter(|s| s.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn save_step(&self, step: &Step) -> Result<()> {
        self.steps.write().insert(step.id.clone(), step.clone());
        Ok(())
    }

    async fn delete_step(&self, id: &str) -> Result<bool> {
        Ok(self.steps.write().remove(id).is_some())
    }
}

/// Stores every document as `<root>/<collection>/<id>.json`.
pub struct JsonRepository {
    root: PathBuf,
}

const DECKS: &str = "decks";
const STEPS: &str = "steps";

impl JsonRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(DeckError::ValidationError(format!(
                "Invalid document id: {:?}",
                id
            )));
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let path = self.document_path(collection, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: serde::Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        let path = self.document_path(collection, id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&path, json).await?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_all<T: serde::de::DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.root.join(collection);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice(&bytes) {
                Ok(doc) => docs.push(doc),
                // One corrupt document must not hide the rest of the collection
                Err(e) => warn!("Skipping unreadable document {:?}: {}", path, e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl DeckRepository for JsonRepository {
    async fn get_deck(&self, id: &str) -> Result<Option<Deck>> {
        self.read(DECKS, id).await
    }

    async fn find_decks(&self, filter: &DeckFilter) -> Result<Vec<Deck>> {
        let mut decks: Vec<Deck> = self
            .read_all::<Deck>(DECKS)
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        decks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(decks)
    }

    async fn save_deck(&self, deck: &Deck) -> Result<()> {
        self.write(DECKS, &deck.id, deck).await
    }

    async fn delete_deck(&self, id: &str) -> Result<bool> {
        self.remove(DECKS, id).await
    }

    async fn get_step(&self, id: &str) -> Result<Option<Step>> {
        self.read(STEPS, id).await
    }

    async fn find_steps(&self, deck_id: &str) -> Result<Vec<Step>> {
        Ok(self
            .read_all::<Step>(STEPS)
            .await?
            .into_iter()
            .filter(|s| s.deck_id == deck_id)
            .collect())
    }

    async fn save_step(&self, step: &Step) -> Result<()> {
        self.write(STEPS, &step.id, step).await
    }

    async fn delete_step(&self, id: &str) -> Result<bool> {
        self.remove(STEPS, id).await
    }
}
