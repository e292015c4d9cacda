use log::info;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::data_url::UploadedImage;
use crate::error::EditError;
use crate::image_gen::{generate_edits, ImageProvider};
use crate::prompts::{get_preset, AspectPreference, EditMode};
use crate::session::{CompletionOutcome, Download, Drafts, EditSession, Rejected};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Completed(CompletionOutcome),
    Rejected(Rejected),
}

/// Serializable snapshot of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub file_name: String,
    pub history_len: usize,
    pub current_index: usize,
    pub is_original: bool,
    pub label: String,
    pub current_image: String,
    pub aspect: AspectPreference,
    pub drafts: Drafts,
    pub is_pending: bool,
    pub last_error: Option<String>,
}

impl From<&EditSession> for SessionView {
    fn from(session: &EditSession) -> Self {
        SessionView {
            file_name: session.source().file_name.clone(),
            history_len: session.history().len(),
            current_index: session.current_index(),
            is_original: session.is_original(),
            label: session.position_label(),
            current_image: session.current().to_string(),
            aspect: session.aspect(),
            drafts: session.drafts().clone(),
            is_pending: session.is_pending(),
            last_error: session.last_error().map(String::from),
        }
    }
}

/// Shared handle driving an [`EditSession`] against an image provider.
///
/// The lock is only held to start and finish a submission, never across the
/// remote call, so navigation and resets stay responsive while a request runs.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<EditSession>>,
    provider: Arc<dyn ImageProvider>,
}

impl SessionHandle {
    pub fn new(image: UploadedImage, provider: Arc<dyn ImageProvider>) -> Self {
        SessionHandle {
            session: Arc::new(Mutex::new(EditSession::new(image))),
            provider,
        }
    }

    pub async fn submit(&self, instruction: &str, mode: EditMode) -> SubmitOutcome {
        self.submit_with_aspect(instruction, mode, None).await
    }

    /// Switches the aspect preference only if the submission is accepted.
    pub async fn submit_with_aspect(
        &self,
        instruction: &str,
        mode: EditMode,
        aspect: Option<AspectPreference>,
    ) -> SubmitOutcome {
        let ticket = {
            let mut session = self.session.lock().await;
            match session.begin_submit_with_aspect(instruction, mode, aspect) {
                Ok(ticket) => ticket,
                Err(rejected) => return SubmitOutcome::Rejected(rejected),
            }
        };

        info!("Submitting {:?} | {} image(s) | generation {}", mode, ticket.count, ticket.generation);
        let result = generate_edits(self.provider.as_ref(), &ticket.image, &ticket.instruction, ticket.count).await;

        let mut session = self.session.lock().await;
        SubmitOutcome::Completed(session.complete(&ticket, result))
    }

    /// Presets always run as a direct edit. `None` for an unknown preset id.
    pub async fn submit_preset(&self, preset_id: &str, aspect: Option<AspectPreference>) -> Option<SubmitOutcome> {
        let preset = get_preset(preset_id)?;
        Some(self.submit_with_aspect(preset.prompt, EditMode::DirectEdit, aspect).await)
    }

    pub async fn change_image(&self, image: UploadedImage) {
        self.session.lock().await.reset(image);
    }

    pub async fn prev(&self) {
        self.session.lock().await.prev();
    }

    pub async fn next(&self) {
        self.session.lock().await.next();
    }

    pub async fn set_aspect(&self, aspect: AspectPreference) {
        self.session.lock().await.set_aspect(aspect);
    }

    pub async fn set_draft(&self, mode: EditMode, text: String) {
        self.session.lock().await.set_draft(mode, text);
    }

    pub async fn snapshot(&self) -> SessionView {
        SessionView::from(&*self.session.lock().await)
    }

    pub async fn download(&self) -> Result<Download, EditError> {
        self.session.lock().await.download()
    }
}
