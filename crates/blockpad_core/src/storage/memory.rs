//! In-memory storage implementation.
//!
//! Backs the `memory` storage config and most unit tests. Data is lost when
//! the storage is dropped.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use indexmap::IndexMap;

use super::{BlockStorage, BoxFuture, StorageResult, ensure_owned_by, poisoned};
use crate::error::BlockpadError;
use crate::model::{Block, BlockUpdate, NewBlock, Page, PageUpdate, sort_blocks};

/// In-memory page/block storage.
///
/// Pages keep insertion order. Blocks are grouped by page id. Thread-safe via
/// `RwLock`.
#[derive(Debug)]
pub struct MemoryStorage {
    /// Pages by id, in creation order
    pages: RwLock<IndexMap<String, Page>>,

    /// Blocks grouped by owning page id
    blocks: RwLock<HashMap<String, Vec<Block>>>,

    available: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            pages: RwLock::default(),
            blocks: RwLock::default(),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away or coming back.
    ///
    /// While unavailable every operation fails with
    /// [`BlockpadError::StorageUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BlockpadError::StorageUnavailable(
                "memory storage is offline".to_string(),
            ))
        }
    }

    fn list_pages_sync(&self) -> StorageResult<Vec<Page>> {
        self.ensure_available()?;
        let pages = self.pages.read().map_err(poisoned)?;
        Ok(pages.values().cloned().collect())
    }

    fn get_page_sync(&self, id: &str) -> StorageResult<Option<Page>> {
        self.ensure_available()?;
        let pages = self.pages.read().map_err(poisoned)?;
        Ok(pages.get(id).cloned())
    }

    fn create_page_sync(&self, title: &str, icon: Option<&str>) -> StorageResult<Page> {
        self.ensure_available()?;
        let page = Page::new(title, icon.map(str::to_string), Utc::now());
        let mut pages = self.pages.write().map_err(poisoned)?;
        pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    fn update_page_sync(&self, id: &str, update: PageUpdate) -> StorageResult<Option<Page>> {
        self.ensure_available()?;
        let mut pages = self.pages.write().map_err(poisoned)?;
        Ok(pages.get_mut(id).map(|page| {
            page.apply(update, Utc::now());
            page.clone()
        }))
    }

    fn delete_page_sync(&self, id: &str) -> StorageResult<bool> {
        self.ensure_available()?;
        let mut pages = self.pages.write().map_err(poisoned)?;
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        if pages.shift_remove(id).is_none() {
            return Ok(false);
        }
        blocks.remove(id);
        Ok(true)
    }

    fn list_blocks_sync(&self, page_id: &str) -> StorageResult<Vec<Block>> {
        self.ensure_available()?;
        let blocks = self.blocks.read().map_err(poisoned)?;
        let mut page_blocks = blocks.get(page_id).cloned().unwrap_or_default();
        sort_blocks(&mut page_blocks);
        Ok(page_blocks)
    }

    fn replace_blocks_sync(&self, page_id: &str, new_blocks: Vec<Block>) -> StorageResult<()> {
        self.ensure_available()?;
        ensure_owned_by(page_id, &new_blocks)?;
        // Holding the pages lock keeps a concurrent delete from orphaning the insert
        let pages = self.pages.read().map_err(poisoned)?;
        if !pages.contains_key(page_id) {
            return Err(BlockpadError::PageNotFound(page_id.to_string()));
        }
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        blocks.insert(page_id.to_string(), new_blocks);
        Ok(())
    }

    fn create_block_sync(&self, block: NewBlock) -> StorageResult<Block> {
        self.ensure_available()?;
        let pages = self.pages.read().map_err(poisoned)?;
        if !pages.contains_key(&block.page_id) {
            return Err(BlockpadError::PageNotFound(block.page_id));
        }
        let block = block.into_block(Utc::now());
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        blocks
            .entry(block.page_id.clone())
            .or_default()
            .push(block.clone());
        Ok(block)
    }

    fn update_block_sync(&self, id: &str, update: BlockUpdate) -> StorageResult<Option<Block>> {
        self.ensure_available()?;
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        Ok(blocks
            .values_mut()
            .flat_map(|page_blocks| page_blocks.iter_mut())
            .find(|b| b.id == id)
            .map(|block| {
                block.apply(update, Utc::now());
                block.clone()
            }))
    }

    fn delete_block_sync(&self, id: &str) -> StorageResult<bool> {
        self.ensure_available()?;
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        for page_blocks in blocks.values_mut() {
            if let Some(pos) = page_blocks.iter().position(|b| b.id == id) {
                page_blocks.remove(pos);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl BlockStorage for MemoryStorage {
    fn list_pages(&self) -> BoxFuture<'_, StorageResult<Vec<Page>>> {
        Box::pin(async move { self.list_pages_sync() })
    }

    fn get_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<Option<Page>>> {
        Box::pin(async move { self.get_page_sync(id) })
    }

    fn create_page<'a>(
        &'a self,
        title: &'a str,
        icon: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Page>> {
        Box::pin(async move { self.create_page_sync(title, icon) })
    }

    fn update_page<'a>(
        &'a self,
        id: &'a str,
        update: PageUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Page>>> {
        Box::pin(async move { self.update_page_sync(id, update) })
    }

    fn delete_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move { self.delete_page_sync(id) })
    }

    fn list_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<Vec<Block>>> {
        Box::pin(async move { self.list_blocks_sync(page_id) })
    }

    fn replace_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
        blocks: Vec<Block>,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move { self.replace_blocks_sync(page_id, blocks) })
    }

    fn create_block(&self, block: NewBlock) -> BoxFuture<'_, StorageResult<Block>> {
        Box::pin(async move { self.create_block_sync(block) })
    }

    fn update_block<'a>(
        &'a self,
        id: &'a str,
        update: BlockUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Block>>> {
        Box::pin(async move { self.update_block_sync(id, update) })
    }

    fn delete_block<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move { self.delete_block_sync(id) })
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.available.load(Ordering::SeqCst) })
    }
}
