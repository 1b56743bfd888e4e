//! Storage abstraction for pages and blocks.
//!
//! This module defines the [`BlockStorage`] trait which abstracts over the
//! backing store (in-memory, JSON files, SQLite) holding the two record
//! collections, pages and blocks.
//!
//! ## Object safety
//!
//! `BlockStorage` is used behind `Arc<dyn BlockStorage>` by the save
//! coordinator and the editor session, so every method returns a boxed future.
//! Storage calls are the only suspension points of the editor: between issuing
//! a call and its completion, further edits or a page switch may be processed.
//!
//! ## Semantics shared by all backends
//!
//! - Every mutating call has durably committed when its future resolves.
//! - Reads against a missing page yield an empty list or `None`, never an error.
//! - `delete_page` cascades to the page's blocks.
//! - `replace_blocks_for_page` is an atomic full replace and fails with
//!   [`BlockpadError::PageNotFound`] when the page is gone.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};

use crate::config::StorageConfig;
use crate::error::BlockpadError;
use crate::model::{Block, BlockUpdate, NewBlock, Page, PageUpdate};

mod json_file;
mod memory;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite::SqliteStorage;

/// A boxed future for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, BlockpadError>;

/// Trait for page/block storage backends.
pub trait BlockStorage: Send + Sync {
    /// List all pages in creation order.
    fn list_pages(&self) -> BoxFuture<'_, StorageResult<Vec<Page>>>;

    /// Get a page by id.
    ///
    /// Returns `None` if the page doesn't exist.
    fn get_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<Option<Page>>>;

    /// Create a page with a fresh id and both timestamps set to now.
    fn create_page<'a>(
        &'a self,
        title: &'a str,
        icon: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Page>>;

    /// Merge partial fields into a page and re-stamp `updated_at`.
    ///
    /// Returns `None` if the page doesn't exist.
    fn update_page<'a>(
        &'a self,
        id: &'a str,
        update: PageUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Page>>>;

    /// Delete a page and all of its blocks.
    ///
    /// Returns whether a page was actually removed.
    fn delete_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>>;

    /// List the blocks of a page sorted ascending by `order`.
    fn list_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<Vec<Block>>>;

    /// Atomically replace every block of a page with `blocks`.
    ///
    /// This is the write path used by autosave.
    fn replace_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
        blocks: Vec<Block>,
    ) -> BoxFuture<'a, StorageResult<()>>;

    /// Insert a single block with a fresh id.
    fn create_block(&self, block: NewBlock) -> BoxFuture<'_, StorageResult<Block>>;

    /// Apply a partial update to a block.
    ///
    /// Returns `None` if the block doesn't exist.
    fn update_block<'a>(
        &'a self,
        id: &'a str,
        update: BlockUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Block>>>;

    /// Delete a single block. Returns whether a block was removed.
    fn delete_block<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>>;

    /// Whether the backing store is currently reachable.
    ///
    /// Advisory only: it feeds the connection indicator and never gates the
    /// other operations.
    fn is_available(&self) -> BoxFuture<'_, bool>;
}

/// Open the backend selected in the configuration.
pub fn open_storage(config: &StorageConfig) -> StorageResult<Arc<dyn BlockStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageConfig::Json { dir } => Ok(Arc::new(JsonFileStorage::open(dir)?)),
        #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
        StorageConfig::Sqlite { path } => Ok(Arc::new(SqliteStorage::open(path)?)),
        #[cfg(not(all(not(target_arch = "wasm32"), feature = "sqlite")))]
        StorageConfig::Sqlite { .. } => Err(BlockpadError::StorageUnavailable(
            "built without the `sqlite` feature".to_string(),
        )),
    }
}

/// Reject blocks that claim to belong to another page.
pub(crate) fn ensure_owned_by(page_id: &str, blocks: &[Block]) -> StorageResult<()> {
    match blocks.iter().find(|b| b.page_id != page_id) {
        Some(block) => Err(BlockpadError::ForeignBlock {
            block_id: block.id.clone(),
            block_page: block.page_id.clone(),
            target_page: page_id.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> BlockpadError {
    BlockpadError::StorageUnavailable("storage lock poisoned".to_string())
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share, run against each implementation.

    use super::*;
    use crate::model::BlockType;
    use futures_lite::future::block_on;

    fn block(page_id: &str, id: &str, order: i64, content: &str) -> Block {
        let now = chrono::Utc::now();
        Block {
            id: id.to_string(),
            block_type: BlockType::Paragraph,
            content: content.to_string(),
            order,
            page_id: page_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn run_all(storage: &dyn BlockStorage) {
        create_and_list_pages(storage);
        update_page_merges_fields(storage);
        blocks_sorted_by_order(storage);
        replace_is_full_replace(storage);
        cascade_delete(storage);
        missing_page_reads_are_empty(storage);
        foreign_blocks_rejected(storage);
        block_primitives(storage);
        assert!(block_on(storage.is_available()));
    }

    fn create_and_list_pages(storage: &dyn BlockStorage) {
        block_on(async {
            let before = storage.list_pages().await.unwrap().len();
            let a = storage.create_page("First", Some("📄")).await.unwrap();
            let b = storage.create_page("Second", None).await.unwrap();
            assert_ne!(a.id, b.id);
            assert_eq!(a.created_at, a.updated_at);
            assert_eq!(a.icon.as_deref(), Some("📄"));

            let pages = storage.list_pages().await.unwrap();
            assert_eq!(pages.len(), before + 2);
            assert_eq!(pages[before].id, a.id);
            assert_eq!(pages[before + 1].id, b.id);

            let fetched = storage.get_page(&b.id).await.unwrap().unwrap();
            assert_eq!(fetched.title, "Second");
        });
    }

    fn update_page_merges_fields(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Draft", Some("✏️")).await.unwrap();
            let updated = storage
                .update_page(&page.id, PageUpdate::title("Final"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.title, "Final");
            assert_eq!(updated.icon.as_deref(), Some("✏️"));
            assert!(updated.updated_at >= page.updated_at);

            let missing = storage
                .update_page("no-such-page", PageUpdate::title("x"))
                .await
                .unwrap();
            assert!(missing.is_none());
        });
    }

    fn blocks_sorted_by_order(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Sorted", None).await.unwrap();
            storage
                .replace_blocks_for_page(
                    &page.id,
                    vec![
                        block(&page.id, "c", 9, "third"),
                        block(&page.id, "a", 1, "first"),
                        block(&page.id, "b", 4, "second"),
                    ],
                )
                .await
                .unwrap();
            let contents: Vec<_> = storage
                .list_blocks_for_page(&page.id)
                .await
                .unwrap()
                .into_iter()
                .map(|b| b.content)
                .collect();
            assert_eq!(contents, vec!["first", "second", "third"]);
        });
    }

    fn replace_is_full_replace(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Replace", None).await.unwrap();
            let other = storage.create_page("Other", None).await.unwrap();
            storage
                .replace_blocks_for_page(&other.id, vec![block(&other.id, "o1", 0, "keep")])
                .await
                .unwrap();
            storage
                .replace_blocks_for_page(
                    &page.id,
                    vec![block(&page.id, "x", 0, "old"), block(&page.id, "y", 1, "old")],
                )
                .await
                .unwrap();
            storage
                .replace_blocks_for_page(&page.id, vec![block(&page.id, "z", 0, "new")])
                .await
                .unwrap();

            let blocks = storage.list_blocks_for_page(&page.id).await.unwrap();
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].id, "z");
            assert_eq!(storage.list_blocks_for_page(&other.id).await.unwrap().len(), 1);

            let err = storage
                .replace_blocks_for_page("no-such-page", vec![])
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        });
    }

    fn cascade_delete(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Doomed", None).await.unwrap();
            storage
                .replace_blocks_for_page(
                    &page.id,
                    vec![
                        block(&page.id, "b1", 0, "one"),
                        block(&page.id, "b2", 1, "two"),
                        block(&page.id, "b3", 2, "three"),
                    ],
                )
                .await
                .unwrap();

            assert!(storage.delete_page(&page.id).await.unwrap());
            assert!(!storage.delete_page(&page.id).await.unwrap());
            assert!(storage.get_page(&page.id).await.unwrap().is_none());
            assert!(
                storage
                    .list_pages()
                    .await
                    .unwrap()
                    .iter()
                    .all(|p| p.id != page.id)
            );
            assert!(storage.list_blocks_for_page(&page.id).await.unwrap().is_empty());
            assert!(!storage.delete_block("b1").await.unwrap());
        });
    }

    fn missing_page_reads_are_empty(storage: &dyn BlockStorage) {
        block_on(async {
            assert!(storage.get_page("missing").await.unwrap().is_none());
            assert!(storage.list_blocks_for_page("missing").await.unwrap().is_empty());
            assert!(!storage.delete_page("missing").await.unwrap());
        });
    }

    fn foreign_blocks_rejected(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Mine", None).await.unwrap();
            let err = storage
                .replace_blocks_for_page(&page.id, vec![block("someone-else", "f", 0, "x")])
                .await
                .unwrap_err();
            assert!(matches!(err, BlockpadError::ForeignBlock { .. }));
        });
    }

    fn block_primitives(storage: &dyn BlockStorage) {
        block_on(async {
            let page = storage.create_page("Primitives", None).await.unwrap();
            let created = storage
                .create_block(NewBlock {
                    page_id: page.id.clone(),
                    block_type: BlockType::Quote,
                    content: "quoted".to_string(),
                    order: 0,
                })
                .await
                .unwrap();
            assert_eq!(created.page_id, page.id);

            let updated = storage
                .update_block(
                    &created.id,
                    BlockUpdate {
                        content: Some("requoted".to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.content, "requoted");
            assert_eq!(updated.block_type, BlockType::Quote);

            let listed = storage.list_blocks_for_page(&page.id).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id, updated.id);
            assert_eq!(listed[0].content, "requoted");

            assert!(storage.delete_block(&created.id).await.unwrap());
            assert!(storage.list_blocks_for_page(&page.id).await.unwrap().is_empty());
            assert!(
                storage
                    .update_block(&created.id, BlockUpdate::default())
                    .await
                    .unwrap()
                    .is_none()
            );

            let err = storage
                .create_block(NewBlock {
                    page_id: "missing".to_string(),
                    block_type: BlockType::Paragraph,
                    content: String::new(),
                    order: 0,
                })
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        });
    }
}
