//! Book catalog seam
//!
//! The relational store behind the marketplace is an external collaborator;
//! the checkout flow only needs a lookup by id, so the store is hidden behind
//! a trait. The in-memory implementation backs the binary (seeded from a JSON
//! file) and the tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Stored as the decimal string the marketplace records. May be absent or
    /// malformed for exchange-only listings; checkout validates before any
    /// money moves.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn find_by_id(&self, book_id: &str) -> Result<Option<Book>, CatalogError>;
}

#[derive(Default)]
pub struct InMemoryBookCatalog {
    books: RwLock<HashMap<String, Book>>,
}

impl InMemoryBookCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the inventory from a JSON array of books.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CatalogError::Backend(format!("failed to read catalog file: {}", e)))?;
        let books: Vec<Book> = serde_json::from_str(&raw)
            .map_err(|e| CatalogError::Backend(format!("invalid catalog JSON: {}", e)))?;

        let map: HashMap<String, Book> = books
            .into_iter()
            .map(|book| (book.id.clone(), book))
            .collect();
        Ok(Self {
            books: RwLock::new(map),
        })
    }

    pub async fn insert(&self, book: Book) {
        self.books.write().await.insert(book.id.clone(), book);
    }

    pub async fn len(&self) -> usize {
        self.books.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.books.read().await.is_empty()
    }
}

#[async_trait]
impl BookCatalog for InMemoryBookCatalog {
    async fn find_by_id(&self, book_id: &str) -> Result<Option<Book>, CatalogError> {
        Ok(self.books.read().await.get(book_id).cloned())
    }
}
