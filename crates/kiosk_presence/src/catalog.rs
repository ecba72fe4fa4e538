//! Display-name lookup from the product catalog.
//!
//! The catalog is a JSON array of articles exported by the back office:
//!
//! ```json
//! [{ "id": 1, "tagCode": "E2000017221101441890", "addedAt": "2024-05-01T10:00:00",
//!    "product": { "id": 7, "name": "Cola 0.5l", "price": 150 },
//!    "category": { "id": 2, "name": "Drinks" } }]
//! ```
//!
//! It is read once at startup into an in-memory index; lookups never touch
//! the filesystem and never fail.

use crate::error::CatalogError;
use kiosk_protocol::TagId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Resolves a tag id to a human-readable name. A miss is `None`, never an error.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, id: &TagId) -> Option<String>;
}

/// Resolver used when no catalog is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

impl NameResolver for NoCatalog {
    fn resolve(&self, _id: &TagId) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub id: i64,
    /// Absent or null for articles not yet labelled.
    #[serde(default)]
    pub tag_code: Option<String>,
    /// As written by the exporter; not interpreted.
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub subcategory: Option<Category>,
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Minor currency units.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// In-memory tag code -> product name index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    names: HashMap<TagId, String>,
}

impl Catalog {
    /// Index articles by tag code. The first article for a code wins; articles
    /// without a tag code or a product name are skipped.
    pub fn from_articles(articles: Vec<Article>) -> Self {
        let mut names = HashMap::with_capacity(articles.len());
        for article in articles {
            let Some(tag_code) = article.tag_code.filter(|code| !code.trim().is_empty()) else {
                continue;
            };
            let Some(name) = article
                .product
                .map(|p| p.name)
                .filter(|name| !name.trim().is_empty())
            else {
                continue;
            };
            names.entry(TagId::new(tag_code)).or_insert(name);
        }
        Self { names }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let articles: Vec<Article> = serde_json::from_str(json)?;
        Ok(Self::from_articles(articles))
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Load the catalog, or fall back to an empty one so tags still track without names.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(catalog) => {
                info!("Loaded catalog {}: {} named tags", path.display(), catalog.len());
                catalog
            }
            Err(e) => {
                warn!("Catalog unavailable, tags will have no display names: {}", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Tag codes in the catalog, in no particular order.
    pub fn tag_ids(&self) -> impl Iterator<Item = &TagId> {
        self.names.keys()
    }
}

impl NameResolver for Catalog {
    fn resolve(&self, id: &TagId) -> Option<String> {
        self.names.get(id).cloned()
    }
}
