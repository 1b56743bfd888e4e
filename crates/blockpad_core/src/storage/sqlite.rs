//! SQLite-backed storage implementation.
//!
//! Pages and blocks live in two tables joined by a foreign key with
//! `ON DELETE CASCADE`. A full block replace runs in a single transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{BlockStorage, BoxFuture, StorageResult, ensure_owned_by, poisoned};
use crate::error::BlockpadError;
use crate::model::{Block, BlockType, BlockUpdate, NewBlock, Page, PageUpdate};

const PAGE_COLUMNS: &str = "id, title, icon, cover_image, created_at, updated_at";
const BLOCK_COLUMNS: &str = "id, type, content, position, page_id, created_at, updated_at";

/// SQLite-backed page/block storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex`; every call holds it for its whole
/// duration, which also serializes writes to the same page.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS pages (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                icon TEXT,
                cover_image TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Block ids are unique within their page
            CREATE TABLE IF NOT EXISTS blocks (
                id TEXT NOT NULL,
                page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (page_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_blocks_page_position ON blocks(page_id, position);
            "#,
        )?;
        Ok(())
    }

    fn page_exists(conn: &Connection, id: &str) -> StorageResult<bool> {
        Ok(conn
            .query_row("SELECT 1 FROM pages WHERE id = ?", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn get_page_sync(&self, id: &str) -> StorageResult<Option<Page>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS),
                params![id],
                page_from_row,
            )
            .optional()?)
    }

    fn find_block(conn: &Connection, id: &str) -> StorageResult<Option<Block>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM blocks WHERE id = ? LIMIT 1", BLOCK_COLUMNS),
                params![id],
                block_from_row,
            )
            .optional()?)
    }

    fn list_pages_sync(&self) -> StorageResult<Vec<Page>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pages ORDER BY rowid ASC",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map([], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn create_page_sync(&self, title: &str, icon: Option<&str>) -> StorageResult<Page> {
        let conn = self.conn()?;
        let page = Page::new(title, icon.map(str::to_string), Utc::now());
        conn.execute(
            "INSERT INTO pages (id, title, icon, cover_image, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                page.id,
                page.title,
                page.icon,
                page.cover_image,
                page.created_at,
                page.updated_at
            ],
        )?;
        Ok(page)
    }

    fn update_page_sync(&self, id: &str, update: PageUpdate) -> StorageResult<Option<Page>> {
        let Some(mut page) = self.get_page_sync(id)? else {
            return Ok(None);
        };
        page.apply(update, Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "UPDATE pages SET title = ?, icon = ?, cover_image = ?, updated_at = ? WHERE id = ?",
            params![page.title, page.icon, page.cover_image, page.updated_at, page.id],
        )?;
        Ok(Some(page))
    }

    fn delete_page_sync(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM pages WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    fn list_blocks_sync(&self, page_id: &str) -> StorageResult<Vec<Block>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM blocks WHERE page_id = ? ORDER BY position ASC, id ASC",
            BLOCK_COLUMNS
        ))?;
        let blocks = stmt
            .query_map(params![page_id], block_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn replace_blocks_sync(&self, page_id: &str, blocks: Vec<Block>) -> StorageResult<()> {
        ensure_owned_by(page_id, &blocks)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if !Self::page_exists(&tx, page_id)? {
            return Err(BlockpadError::PageNotFound(page_id.to_string()));
        }
        tx.execute("DELETE FROM blocks WHERE page_id = ?", params![page_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO blocks (id, page_id, type, content, position, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for block in &blocks {
                insert.execute(params![
                    block.id,
                    block.page_id,
                    block.block_type.as_str(),
                    block.content,
                    block.order,
                    block.created_at,
                    block.updated_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn create_block_sync(&self, block: NewBlock) -> StorageResult<Block> {
        let conn = self.conn()?;
        if !Self::page_exists(&conn, &block.page_id)? {
            return Err(BlockpadError::PageNotFound(block.page_id));
        }
        let block = block.into_block(Utc::now());
        conn.execute(
            "INSERT INTO blocks (id, page_id, type, content, position, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                block.id,
                block.page_id,
                block.block_type.as_str(),
                block.content,
                block.order,
                block.created_at,
                block.updated_at
            ],
        )?;
        Ok(block)
    }

    fn update_block_sync(&self, id: &str, update: BlockUpdate) -> StorageResult<Option<Block>> {
        let conn = self.conn()?;
        let Some(mut block) = Self::find_block(&conn, id)? else {
            return Ok(None);
        };
        block.apply(update, Utc::now());
        conn.execute(
            "UPDATE blocks SET type = ?, content = ?, position = ?, updated_at = ?
             WHERE page_id = ? AND id = ?",
            params![
                block.block_type.as_str(),
                block.content,
                block.order,
                block.updated_at,
                block.page_id,
                block.id
            ],
        )?;
        Ok(Some(block))
    }

    fn delete_block_sync(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let Some(block) = Self::find_block(&conn, id)? else {
            return Ok(false);
        };
        let removed = conn.execute(
            "DELETE FROM blocks WHERE page_id = ? AND id = ?",
            params![block.page_id, block.id],
        )?;
        Ok(removed > 0)
    }

    fn ping(&self) -> bool {
        self.conn()
            .map(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok())
            .unwrap_or(false)
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        title: row.get(1)?,
        icon: row.get(2)?,
        cover_image: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    let type_name: String = row.get(1)?;
    let block_type = type_name
        .parse::<BlockType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Block {
        id: row.get(0)?,
        block_type,
        content: row.get(2)?,
        order: row.get(3)?,
        page_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl BlockStorage for SqliteStorage {
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
        Box::pin(async move { self.ping() })
    }
}
