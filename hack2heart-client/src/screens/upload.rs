use tracing::info;

use crate::api::{ApiClient, ApiError, UploadReceipt};

#[derive(Debug)]
pub struct UploadScreen {
    api: ApiClient,
    draft: String,
    analysis: Option<String>,
}

impl UploadScreen {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            draft: String::new(),
            analysis: None,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, content: impl Into<String>) {
        self.draft = content.into();
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    /// Ask the server to describe the current draft.
    pub async fn analyze(&mut self) -> Result<&str, ApiError> {
        let analysis = self.api.analyze_code(&self.draft).await?;
        Ok(self.analysis.insert(analysis).as_str())
    }

    /// Upload the draft. A `201 Created` clears the draft and its analysis.
    pub async fn upload(&mut self) -> Result<UploadReceipt, ApiError> {
        let receipt = self.api.upload_code(&self.draft).await?;
        if receipt.created {
            info!(
                code_id = receipt.code.as_ref().map(|code| code.id),
                "code uploaded"
            );
            self.draft.clear();
            self.analysis = None;
        }
        Ok(receipt)
    }
}
