//! Editor session: the active page, its tree, and page switching.
//!
//! An [`EditorSession`] is the explicit context the editing surface talks to.
//! It owns the page list, the active page and the current [`DocTree`], and
//! drives the [`SaveCoordinator`] with every change.
//!
//! Switching pages (or dropping the session) discards a pending, not yet
//! fired save for the previous page. That edit is lost; a save already in
//! flight is allowed to finish.
//!
//! # Example
//!
//! ```ignore
//! let mut session = EditorSession::open(storage, scheduler, AutosaveConfig::default()).await?;
//! let page = session.create_page(Some("Ideas"), None).await?;
//!
//! let mut tree = session.current_tree().clone();
//! tree.set_text(0, "First idea");
//! session.edit(tree);
//! ```

use std::sync::Arc;

use crate::error::{BlockpadError, Result};
use crate::model::{DEFAULT_PAGE_TITLE, Page, PageUpdate};
use crate::projection::{DocTree, to_tree};
use crate::save::{AutosaveConfig, SaveCoordinator, SaveStatus};
use crate::scheduler::Scheduler;
use crate::storage::BlockStorage;

/// Callback told about every wholesale tree replacement (page load/switch).
pub type ResetListener = Arc<dyn Fn(&DocTree) + Send + Sync>;

/// One editor instance bound to a storage backend.
pub struct EditorSession {
    storage: Arc<dyn BlockStorage>,
    coordinator: SaveCoordinator,
    pages: Vec<Page>,
    active: Option<Page>,
    tree: DocTree,
    default_title: String,
    reset_listener: Option<ResetListener>,
}

impl EditorSession {
    /// Create a session with no page loaded yet.
    pub fn new(
        storage: Arc<dyn BlockStorage>,
        scheduler: Arc<dyn Scheduler>,
        config: AutosaveConfig,
    ) -> Self {
        let coordinator = SaveCoordinator::new(Arc::clone(&storage), scheduler, config);
        Self {
            storage,
            coordinator,
            pages: Vec::new(),
            active: None,
            tree: DocTree::empty(),
            default_title: DEFAULT_PAGE_TITLE.to_string(),
            reset_listener: None,
        }
    }

    /// Create a session and load the workspace.
    ///
    /// Loads the page list, creates a default page if there is none, and
    /// switches to the first page.
    pub async fn open(
        storage: Arc<dyn BlockStorage>,
        scheduler: Arc<dyn Scheduler>,
        config: AutosaveConfig,
    ) -> Result<Self> {
        let mut session = Self::new(storage, scheduler, config);
        session.load().await?;
        Ok(session)
    }

    /// Title for pages created without one.
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    /// (Re)load the page list and activate the first page.
    pub async fn load(&mut self) -> Result<()> {
        self.coordinator.refresh_connection().await;
        self.reload_pages().await?;

        if self.pages.is_empty() {
            let title = self.default_title.clone();
            self.create_page(Some(&title), None).await?;
            return Ok(());
        }

        let first = self.pages[0].clone();
        self.switch_to_page(first).await
    }

    /// Refresh the in-memory page list from storage.
    pub async fn reload_pages(&mut self) -> Result<&[Page]> {
        self.pages = self.storage.list_pages().await?;
        Ok(&self.pages)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn active_page(&self) -> Option<&Page> {
        self.active.as_ref()
    }

    pub fn current_tree(&self) -> &DocTree {
        &self.tree
    }

    pub fn coordinator(&self) -> &SaveCoordinator {
        &self.coordinator
    }

    pub fn storage(&self) -> &Arc<dyn BlockStorage> {
        &self.storage
    }

    pub fn status(&self) -> SaveStatus {
        self.coordinator.status()
    }

    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<SaveStatus> {
        self.coordinator.subscribe()
    }

    pub fn set_reset_listener(&mut self, listener: ResetListener) {
        self.reset_listener = Some(listener);
    }

    /// The editing surface's change callback.
    ///
    /// Nodes new to the document are keyed here, so a block keeps the id it
    /// was first saved under. Read the keyed tree back with
    /// [`EditorSession::current_tree`].
    pub fn edit(&mut self, mut tree: DocTree) {
        tree.assign_keys();
        self.tree = tree;
        self.coordinator
            .on_document_changed(&self.tree, self.active.as_ref());
    }

    /// Switch to the page with the given id.
    pub async fn switch_to(&mut self, page_id: &str) -> Result<()> {
        self.discard_pending("switch");
        let page = match self.pages.iter().find(|p| p.id == page_id) {
            Some(page) => page.clone(),
            None => self
                .storage
                .get_page(page_id)
                .await?
                .ok_or_else(|| BlockpadError::PageNotFound(page_id.to_string()))?,
        };
        self.switch_to_page(page).await
    }

    /// Make `page` active and load its blocks into the tree.
    ///
    /// The pending save for the previous page is dropped before the load
    /// starts, so its timer cannot fire while the load is awaited. If the load
    /// fails the previous page stays active, without that edit.
    pub async fn switch_to_page(&mut self, page: Page) -> Result<()> {
        self.discard_pending("switch");
        let blocks = self.storage.list_blocks_for_page(&page.id).await?;

        log::info!(
            "[EditorSession] Switched to page {} ({} blocks)",
            page.id,
            blocks.len()
        );
        if !self.pages.iter().any(|p| p.id == page.id) {
            self.pages.push(page.clone());
        }
        self.active = Some(page);
        self.reset_tree(to_tree(&blocks));
        Ok(())
    }

    /// Create a page and switch to it with an empty document.
    ///
    /// Nothing is written for the new page's blocks until the first edit's
    /// debounce elapses.
    pub async fn create_page(&mut self, title: Option<&str>, icon: Option<&str>) -> Result<Page> {
        self.discard_pending("page creation");
        let title = title.unwrap_or(&self.default_title);
        let page = self.storage.create_page(title, icon).await?;
        log::info!("[EditorSession] Created page {} '{}'", page.id, page.title);

        self.pages.push(page.clone());
        self.active = Some(page.clone());
        self.reset_tree(DocTree::empty());
        Ok(page)
    }

    /// Update page fields in storage and in the page list.
    pub async fn rename_page(&mut self, page_id: &str, update: PageUpdate) -> Result<Page> {
        let page = self
            .storage
            .update_page(page_id, update)
            .await?
            .ok_or_else(|| BlockpadError::PageNotFound(page_id.to_string()))?;

        if let Some(entry) = self.pages.iter_mut().find(|p| p.id == page.id) {
            *entry = page.clone();
        }
        if let Some(active) = self.active.as_mut().filter(|a| a.id == page.id) {
            *active = page.clone();
        }
        Ok(page)
    }

    /// Delete a page and its blocks.
    ///
    /// Deleting the active page moves the session to the first remaining page,
    /// or to no active page when none is left.
    pub async fn delete_page(&mut self, page_id: &str) -> Result<bool> {
        let was_active = self.active.as_ref().is_some_and(|a| a.id == page_id);
        if was_active {
            self.coordinator.cancel_pending();
        }

        let removed = self.storage.delete_page(page_id).await?;
        self.pages.retain(|p| p.id != page_id);
        if removed {
            log::info!("[EditorSession] Deleted page {}", page_id);
        }

        if was_active {
            match self.pages.first().cloned() {
                Some(next) => self.switch_to_page(next).await?,
                None => {
                    self.active = None;
                    self.reset_tree(DocTree::empty());
                }
            }
        }
        Ok(removed)
    }

    /// Write any pending edit now.
    pub async fn flush(&self) -> Result<bool> {
        self.coordinator.flush().await
    }

    /// Unmount: drop the pending save. A save in flight still completes.
    pub fn close(&mut self) {
        if self.coordinator.cancel_pending() {
            log::debug!("[EditorSession] Closed with a pending save discarded");
        }
    }

    /// Drop the pending save ahead of anything that replaces the active page.
    fn discard_pending(&self, reason: &str) {
        if self.coordinator.cancel_pending()
            && let Some(previous) = &self.active
        {
            log::warn!(
                "[EditorSession] Discarding unsaved edits to page {} on {}",
                previous.id,
                reason
            );
        }
    }

    fn reset_tree(&mut self, tree: DocTree) {
        self.tree = tree;
        if let Some(listener) = &self.reset_listener {
            listener(&self.tree);
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("pages", &self.pages.len())
            .field("active", &self.active.as_ref().map(|p| &p.id))
            .field("nodes", &self.tree.len())
            .finish_non_exhaustive()
    }
}
