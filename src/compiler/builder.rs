//! Access to raw cards and previously compiled cards

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::card::{CompiledCard, RawCard};

/// Errors a builder can report
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuilderError {
    #[error("no card at '{url}'")]
    NotFound { url: String },

    #[error("failed to load '{url}': {message}")]
    Unavailable { url: String, message: String },
}

/// Source of raw cards for the compiler
#[async_trait]
pub trait Builder: Send + Sync {
    /// Fetch the raw definition of the card at `url`
    async fn get_raw_card(&self, url: &str) -> Result<RawCard, BuilderError>;

    /// A cached compiled card for `url`, if the caller keeps one.
    /// `None` means the card is compiled from its raw definition.
    async fn get_compiled_card(
        &self,
        _url: &str,
    ) -> Result<Option<Arc<CompiledCard>>, BuilderError> {
        Ok(None)
    }
}

/// In-memory builder over a fixed set of raw cards
#[derive(Debug, Default)]
pub struct MemoryBuilder {
    cards: HashMap<String, RawCard>,
    compiled: HashMap<String, Arc<CompiledCard>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw cards, keyed by their urls
    pub fn from_cards(cards: impl IntoIterator<Item = RawCard>) -> Self {
        let mut builder = Self::new();
        for card in cards {
            builder.insert(card);
        }
        builder
    }

    /// Load a bundle: a JSON array of raw cards
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let cards: Vec<RawCard> = serde_json::from_str(json)?;
        Ok(Self::from_cards(cards))
    }

    pub fn insert(&mut self, card: RawCard) {
        self.cards.insert(card.url(), card);
    }

    /// Serve `card` from the compiled cache instead of compiling it
    pub fn with_compiled(mut self, card: Arc<CompiledCard>) -> Self {
        self.compiled.insert(card.url.clone(), card);
        self
    }

    pub fn raw_card(&self, url: &str) -> Option<&RawCard> {
        self.cards.get(url)
    }

    /// Number of times `url` was fetched through [`Builder::get_raw_card`]
    pub fn fetch_count(&self, url: &str) -> usize {
        self.lock_fetches().get(url).copied().unwrap_or(0)
    }

    fn lock_fetches(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        match self.fetches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Builder for MemoryBuilder {
    async fn get_raw_card(&self, url: &str) -> Result<RawCard, BuilderError> {
        *self.lock_fetches().entry(url.to_string()).or_default() += 1;
        self.cards
            .get(url)
            .cloned()
            .ok_or_else(|| BuilderError::NotFound {
                url: url.to_string(),
            })
    }

    async fn get_compiled_card(
        &self,
        url: &str,
    ) -> Result<Option<Arc<CompiledCard>>, BuilderError> {
        Ok(self.compiled.get(url).cloned())
    }
}
