//! Test utilities for blockpad_core
//!
//! This module provides a storage wrapper that records autosave writes against
//! the virtual clock and can be told to fail or to be slow.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::BlockpadError;
use crate::model::{Block, BlockUpdate, NewBlock, Page, PageUpdate};
use crate::scheduler::ManualScheduler;
use crate::storage::{BlockStorage, BoxFuture, MemoryStorage, StorageResult};

/// One observed `replace_blocks_for_page` call.
#[derive(Debug, Clone)]
pub struct ReplaceCall {
    /// Virtual time of the call (zero without a clock)
    pub at: Duration,
    pub page_id: String,
    pub blocks: Vec<Block>,
}

/// A `MemoryStorage` that records every full-replace write.
pub struct RecordingStorage {
    inner: MemoryStorage,
    clock: Option<Arc<ManualScheduler>>,
    calls: Mutex<Vec<ReplaceCall>>,
    completed: AtomicUsize,
    fail_replace: AtomicBool,
    replace_delay: Option<Duration>,
    list_delay: Option<Duration>,
}

impl RecordingStorage {
    /// Record calls stamped with the virtual clock's time.
    pub fn new(clock: Arc<ManualScheduler>) -> Self {
        Self::build(Some(clock), None, None)
    }

    /// Make every replace take `delay` of tokio time. Requires a tokio runtime.
    pub fn with_replace_delay(delay: Duration) -> Self {
        Self::build(None, Some(delay), None)
    }

    /// Make every block listing take `delay` of tokio time. Requires a tokio runtime.
    pub fn with_list_delay(delay: Duration) -> Self {
        Self::build(None, None, Some(delay))
    }

    fn build(
        clock: Option<Arc<ManualScheduler>>,
        replace_delay: Option<Duration>,
        list_delay: Option<Duration>,
    ) -> Self {
        Self {
            inner: MemoryStorage::new(),
            clock,
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            fail_replace: AtomicBool::new(false),
            replace_delay,
            list_delay,
        }
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    /// Make subsequent replace calls fail (they are still recorded).
    pub fn set_fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    pub fn replace_calls(&self) -> Vec<ReplaceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Replace calls that finished successfully.
    pub fn completed_replaces(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl BlockStorage for RecordingStorage {
    fn list_pages(&self) -> BoxFuture<'_, StorageResult<Vec<Page>>> {
        self.inner.list_pages()
    }

    fn get_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<Option<Page>>> {
        self.inner.get_page(id)
    }

    fn create_page<'a>(
        &'a self,
        title: &'a str,
        icon: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<Page>> {
        self.inner.create_page(title, icon)
    }

    fn update_page<'a>(
        &'a self,
        id: &'a str,
        update: PageUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Page>>> {
        self.inner.update_page(id, update)
    }

    fn delete_page<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        self.inner.delete_page(id)
    }

    fn list_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<Vec<Block>>> {
        Box::pin(async move {
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.list_blocks_for_page(page_id).await
        })
    }

    fn replace_blocks_for_page<'a>(
        &'a self,
        page_id: &'a str,
        blocks: Vec<Block>,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let at = self.clock.as_ref().map(|c| c.now()).unwrap_or_default();
            self.calls.lock().unwrap().push(ReplaceCall {
                at,
                page_id: page_id.to_string(),
                blocks: blocks.clone(),
            });

            if let Some(delay) = self.replace_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_replace.load(Ordering::SeqCst) {
                return Err(BlockpadError::StorageUnavailable(
                    "injected replace failure".to_string(),
                ));
            }

            self.inner.replace_blocks_for_page(page_id, blocks).await?;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn create_block(&self, block: NewBlock) -> BoxFuture<'_, StorageResult<Block>> {
        self.inner.create_block(block)
    }

    fn update_block<'a>(
        &'a self,
        id: &'a str,
        update: BlockUpdate,
    ) -> BoxFuture<'a, StorageResult<Option<Block>>> {
        self.inner.update_block(id, update)
    }

    fn delete_block<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        self.inner.delete_block(id)
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        self.inner.is_available()
    }
}
