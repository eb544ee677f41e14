use std::collections::VecDeque;

use hack2heart_core::{CodeSnippet, ReactionType, Recommendation, UserId};
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};

/// Walks the recommendation list one candidate at a time.
#[derive(Debug)]
pub struct ExploreScreen {
    api: ApiClient,
    queue: VecDeque<Recommendation>,
    current: Option<Recommendation>,
}

impl ExploreScreen {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            queue: VecDeque::new(),
            current: None,
        }
    }

    pub async fn load(&mut self) -> Result<Option<&Recommendation>, ApiError> {
        let users = self.api.recommendations().await?;
        info!(candidates = users.len(), "recommendations loaded");
        self.queue = users.into();
        self.current = self.queue.pop_front();
        Ok(self.current.as_ref())
    }

    pub fn current(&self) -> Option<&Recommendation> {
        self.current.as_ref()
    }

    /// Candidates still queued behind the current one.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// The shown candidate's unpinned snippets.
    pub async fn candidate_codes(&self) -> Result<Vec<CodeSnippet>, ApiError> {
        match &self.current {
            Some(candidate) => self.api.user_codes(candidate.user.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// React to the shown candidate and move on.
    ///
    /// The next candidate is shown before the server answers; a failed
    /// reaction is only logged. Returns the id reacted to.
    pub async fn react(&mut self, reaction: ReactionType) -> Option<UserId> {
        let target = self.current.take()?;
        self.current = self.queue.pop_front();

        let user_id = target.user.id;
        if let Err(err) = self.api.react(user_id, reaction).await {
            warn!(user_id, reaction = reaction.as_str(), "reaction failed: {err}");
        }
        Some(user_id)
    }
}
