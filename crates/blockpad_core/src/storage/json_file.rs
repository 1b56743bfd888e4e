//! JSON-file storage: the reference textual encoding.
//!
//! A data directory holds `pages.json` and `blocks.json`, each an array of
//! flat records read back by field name. Every mutation rewrites the affected
//! collection through a temp file and a rename, so a reader sees either the
//! old or the new collection, never a torn one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{BlockStorage, BoxFuture, StorageResult, ensure_owned_by, poisoned};
use crate::error::BlockpadError;
use crate::model::{Block, BlockUpdate, NewBlock, Page, PageUpdate, sort_blocks};

const PAGES_FILE: &str = "pages.json";
const BLOCKS_FILE: &str = "blocks.json";

/// File-backed storage using one JSON document per collection.
///
/// Writers are serialized through a mutex, so writes to the same page are
/// applied in the order they were issued.
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Open (creating if needed) a data directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| BlockpadError::FileWrite {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// The data directory this storage reads and writes.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_collection<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Vec<T>> {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BlockpadError::FileRead { path, source }),
        }
    }

    fn write_collection<T: Serialize>(&self, name: &str, records: &[T]) -> StorageResult<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        let contents = serde_json::to_string_pretty(records)?;
        fs::write(&tmp, contents).map_err(|source| BlockpadError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| BlockpadError::FileWrite { path, source })?;
        Ok(())
    }

    fn read_pages(&self) -> StorageResult<Vec<Page>> {
        self.read_collection(PAGES_FILE)
    }

    fn read_blocks(&self) -> StorageResult<Vec<Block>> {
        self.read_collection(BLOCKS_FILE)
    }

    fn create_page_sync(&self, title: &str, icon: Option<&str>) -> StorageResult<Page> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut pages = self.read_pages()?;
        let page = Page::new(title, icon.map(str::to_string), Utc::now());
        pages.push(page.clone());
        self.write_collection(PAGES_FILE, &pages)?;
        Ok(page)
    }

    fn update_page_sync(&self, id: &str, update: PageUpdate) -> StorageResult<Option<Page>> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut pages = self.read_pages()?;
        let Some(page) = pages.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        page.apply(update, Utc::now());
        let updated = page.clone();
        self.write_collection(PAGES_FILE, &pages)?;
        Ok(Some(updated))
    }

    fn delete_page_sync(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut pages = self.read_pages()?;
        let before = pages.len();
        pages.retain(|p| p.id != id);
        if pages.len() == before {
            return Ok(false);
        }
        // Page first: orphaned blocks left by a crash are unreachable, never visible
        self.write_collection(PAGES_FILE, &pages)?;

        let mut blocks = self.read_blocks()?;
        blocks.retain(|b| b.page_id != id);
        self.write_collection(BLOCKS_FILE, &blocks)?;
        Ok(true)
    }

    fn list_blocks_sync(&self, page_id: &str) -> StorageResult<Vec<Block>> {
        let mut blocks: Vec<Block> = self
            .read_blocks()?
            .into_iter()
            .filter(|b| b.page_id == page_id)
            .collect();
        sort_blocks(&mut blocks);
        Ok(blocks)
    }

    fn replace_blocks_sync(&self, page_id: &str, new_blocks: Vec<Block>) -> StorageResult<()> {
        ensure_owned_by(page_id, &new_blocks)?;
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        if !self.read_pages()?.iter().any(|p| p.id == page_id) {
            return Err(BlockpadError::PageNotFound(page_id.to_string()));
        }
        let mut blocks = self.read_blocks()?;
        blocks.retain(|b| b.page_id != page_id);
        blocks.extend(new_blocks);
        self.write_collection(BLOCKS_FILE, &blocks)
    }

    fn create_block_sync(&self, block: NewBlock) -> StorageResult<Block> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        if !self.read_pages()?.iter().any(|p| p.id == block.page_id) {
            return Err(BlockpadError::PageNotFound(block.page_id));
        }
        let block = block.into_block(Utc::now());
        let mut blocks = self.read_blocks()?;
        blocks.push(block.clone());
        self.write_collection(BLOCKS_FILE, &blocks)?;
        Ok(block)
    }

    fn update_block_sync(&self, id: &str, update: BlockUpdate) -> StorageResult<Option<Block>> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut blocks = self.read_blocks()?;
        let Some(block) = blocks.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        block.apply(update, Utc::now());
        let updated = block.clone();
        self.write_collection(BLOCKS_FILE, &blocks)?;
        Ok(Some(updated))
    }

    fn delete_block_sync(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut blocks = self.read_blocks()?;
        let Some(pos) = blocks.iter().position(|b| b.id == id) else {
            return Ok(false);
        };
        blocks.remove(pos);
        self.write_collection(BLOCKS_FILE, &blocks)?;
        Ok(true)
    }
}

impl BlockStorage for JsonFileStorage {
    fn list_pages(&self) -> BoxFuture<'_, StorageResult<Vec<Page>>> {
        Box::pin(async move { self.read_pages() })
    }

    fn get_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<Option<Page>>> {
        Box::pin(async move { Ok(self.read_pages()?.into_iter().find(|p| p.id == id)) })
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
        Box::pin(async move { self.dir.is_dir() })
    }
}
