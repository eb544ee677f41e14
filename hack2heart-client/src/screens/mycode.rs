use hack2heart_core::{
    CodeSnippet, SnippetKey,
    pinned::{DropTarget, PinnedBoard, SlotId},
};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};

/// Pinned-code board backed by the caller's snippets.
///
/// Gestures apply to the local board first. When a gesture changes which
/// snippet sits at which slot index, the full order is pushed to the server
/// in one call.
#[derive(Debug)]
pub struct MyCodeScreen {
    api: ApiClient,
    board: PinnedBoard,
}

impl MyCodeScreen {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            board: PinnedBoard::new(),
        }
    }

    pub fn board(&self) -> &PinnedBoard {
        &self.board
    }

    /// Fetch the caller's snippets and rebuild the board from their indices.
    pub async fn load(&mut self, pinned: Option<bool>) -> Result<(), ApiError> {
        let codes = self.api.my_codes(pinned).await?;
        self.board = PinnedBoard::hydrate(codes);
        info!(
            snippets = self.board.snippet_count(),
            slots = self.board.slots().len(),
            pooled = self.board.pool().len(),
            "my code loaded"
        );
        Ok(())
    }

    /// An empty slot changes no index, so nothing is pushed.
    pub fn add_slot(&mut self) -> bool {
        self.board.add_slot()
    }

    pub async fn remove_slot(&mut self, slot: SlotId) -> Result<bool, ApiError> {
        self.apply(|board| board.remove_slot(slot)).await
    }

    pub async fn move_snippet(&mut self, key: SnippetKey, target: DropTarget) -> Result<bool, ApiError> {
        self.apply(|board| board.move_snippet(key, target)).await
    }

    pub fn begin_drag(&mut self, key: SnippetKey) -> bool {
        self.board.begin_drag(key)
    }

    pub fn cancel_drag(&mut self) {
        self.board.cancel_drag();
    }

    /// Drop the dragged snippet. `None` ends the drag outside any zone.
    pub async fn drop_dragged(&mut self, target: Option<DropTarget>) -> Result<bool, ApiError> {
        self.apply(|board| board.end_drag(target)).await
    }

    /// Remove a snippet locally, then ask the server to delete it.
    ///
    /// The local removal stands even if the server call fails.
    pub async fn delete(&mut self, key: SnippetKey) -> Option<CodeSnippet> {
        let removed = self.board.delete_snippet(key)?;
        if let Err(err) = self.api.delete_code(key.code_id()).await {
            warn!(%key, "delete failed remotely, keeping local removal: {err}");
        }
        Some(removed)
    }

    async fn apply(&mut self, gesture: impl FnOnce(&mut PinnedBoard) -> bool) -> Result<bool, ApiError> {
        let before = self.board.serialize();
        if !gesture(&mut self.board) {
            return Ok(false);
        }
        if self.board.serialize() == before {
            debug!("pinned order unchanged");
            return Ok(true);
        }

        let update = self.board.index_update();
        debug!(pinned = update.code_ids.len(), "pushing pinned order");
        self.api.update_code_indices(&update).await?;
        Ok(true)
    }
}
