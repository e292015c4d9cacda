//! # Feature: Edit Session
//!
//! Linear edit history for one uploaded image. Each successful generation
//! appends its results after the entry it was made from, discarding any
//! entries that were ahead of it.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.0.0: Initial release with truncate-on-edit history and generation tagging

use log::{debug, info, warn};
use serde::Serialize;

use crate::data_url::{self, InlineImage, UploadedImage};
use crate::error::EditError;
use crate::prompts::{build_instruction, AspectPreference, EditMode};

/// Why a submission never left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejected {
    EmptyInstruction,
    Pending,
}

/// Everything a generation needs, captured at submit time.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub generation: u64,
    pub base_index: usize,
    pub image: InlineImage,
    pub instruction: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Appended { added: usize, current_index: usize },
    Failed { message: String },
    /// The session was reset after the request was issued.
    Stale,
}

/// The entry on screen, ready to be written out as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Drafts {
    pub edit: String,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    source: UploadedImage,
    history: Vec<String>,
    current_index: usize,
    aspect: AspectPreference,
    drafts: Drafts,
    is_pending: bool,
    last_error: Option<String>,
    generation: u64,
}

impl EditSession {
    pub fn new(source: UploadedImage) -> Self {
        let history = vec![source.data_url.clone()];
        EditSession {
            source,
            history,
            current_index: 0,
            aspect: AspectPreference::default(),
            drafts: Drafts::default(),
            is_pending: false,
            last_error: None,
            generation: 0,
        }
    }

    pub fn source(&self) -> &UploadedImage {
        &self.source
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &str {
        &self.history[self.current_index]
    }

    pub fn is_original(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_pending(&self) -> bool {
        self.is_pending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn aspect(&self) -> AspectPreference {
        self.aspect
    }

    pub fn drafts(&self) -> &Drafts {
        &self.drafts
    }

    /// Ignored while a generation is in flight, like navigation.
    pub fn set_aspect(&mut self, aspect: AspectPreference) {
        if self.is_pending {
            return;
        }
        self.aspect = aspect;
    }

    pub fn set_draft(&mut self, mode: EditMode, text: impl Into<String>) {
        match mode {
            EditMode::DirectEdit => self.drafts.edit = text.into(),
            EditMode::ContextPlacement => self.drafts.context = text.into(),
        }
    }

    /// "Original" for the upload itself, "Edit i / n" otherwise.
    pub fn position_label(&self) -> String {
        if self.is_original() {
            "Original".to_string()
        } else {
            format!("Edit {} / {}", self.current_index, self.history.len() - 1)
        }
    }

    pub fn download(&self) -> Result<Download, EditError> {
        let inline = data_url::decode(self.current());
        Ok(Download {
            file_name: format!("edited-image-{}.png", self.current_index),
            bytes: inline.bytes()?,
            mime_type: inline.mime_type,
        })
    }

    pub fn prev(&mut self) {
        if self.is_pending {
            return;
        }
        self.current_index = self.current_index.saturating_sub(1);
    }

    pub fn next(&mut self) {
        if self.is_pending {
            return;
        }
        self.current_index = (self.current_index + 1).min(self.history.len() - 1);
    }

    /// Starts over with a new source image. Responses to requests issued
    /// before this call are ignored by [`EditSession::complete`].
    pub fn reset(&mut self, source: UploadedImage) {
        info!("Resetting session with new image '{}' ({})", source.file_name, source.mime_type);
        self.history = vec![source.data_url.clone()];
        self.source = source;
        self.current_index = 0;
        self.drafts = Drafts::default();
        self.is_pending = false;
        self.last_error = None;
        self.generation += 1;
    }

    pub fn begin_submit(&mut self, instruction: &str, mode: EditMode) -> Result<SubmitTicket, Rejected> {
        self.begin_submit_with_aspect(instruction, mode, None)
    }

    /// Like [`EditSession::begin_submit`], switching to `aspect` first. A
    /// rejected submission leaves the aspect untouched.
    pub fn begin_submit_with_aspect(
        &mut self,
        instruction: &str,
        mode: EditMode,
        aspect: Option<AspectPreference>,
    ) -> Result<SubmitTicket, Rejected> {
        if instruction.trim().is_empty() {
            return Err(Rejected::EmptyInstruction);
        }
        if self.is_pending {
            debug!("Ignoring submission while a generation is in flight");
            return Err(Rejected::Pending);
        }

        if let Some(aspect) = aspect {
            self.aspect = aspect;
        }
        self.is_pending = true;
        self.last_error = None;

        Ok(SubmitTicket {
            generation: self.generation,
            base_index: self.current_index,
            image: data_url::decode(self.current()),
            instruction: build_instruction(instruction, mode, self.aspect),
            count: mode.image_count(),
        })
    }

    pub fn complete(&mut self, ticket: &SubmitTicket, result: Result<Vec<String>, EditError>) -> CompletionOutcome {
        if ticket.generation != self.generation {
            warn!("Discarding response from generation {} (session is at {})", ticket.generation, self.generation);
            return CompletionOutcome::Stale;
        }
        self.is_pending = false;

        match result {
            Ok(images) if !images.is_empty() => {
                let added = images.len();
                self.history.truncate(ticket.base_index + 1);
                self.history.extend(images);
                self.current_index = ticket.base_index + 1;
                self.drafts = Drafts::default();
                info!("Appended {} image(s) | History length: {}", added, self.history.len());
                CompletionOutcome::Appended {
                    added,
                    current_index: self.current_index,
                }
            }
            Ok(_) => self.fail(EditError::NoImageProduced),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: EditError) -> CompletionOutcome {
        let message = error.to_string();
        warn!("Generation failed: {}", message);
        self.last_error = Some(message.clone());
        CompletionOutcome::Failed { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(tag: &str) -> UploadedImage {
        UploadedImage::from_bytes(format!("{}.png", tag), "image/png", tag.as_bytes()).unwrap()
    }

    fn url(tag: &str) -> String {
        data_url::encode("image/png", tag.as_bytes())
    }

    fn succeed(session: &mut EditSession, instruction: &str, mode: EditMode, results: &[&str]) -> CompletionOutcome {
        let ticket = session.begin_submit(instruction, mode).unwrap();
        session.complete(&ticket, Ok(results.iter().map(|r| url(r)).collect()))
    }

    #[test]
    fn test_new_session_starts_at_original() {
        let session = EditSession::new(upload("A"));
        assert_eq!(session.history(), &[url("A")]);
        assert_eq!(session.current_index(), 0);
        assert!(session.is_original());
        assert_eq!(session.position_label(), "Original");
    }

    #[test]
    fn test_walkthrough_truncates_and_lands_on_first_result() {
        let mut session = EditSession::new(upload("A"));

        succeed(&mut session, "make it red", EditMode::DirectEdit, &["B"]);
        assert_eq!(session.history(), &[url("A"), url("B")]);
        assert_eq!(session.current_index(), 1);

        session.prev();
        assert_eq!(session.current_index(), 0);

        session.set_aspect(AspectPreference::Landscape);
        let ticket = session.begin_submit("on a beach", EditMode::ContextPlacement).unwrap();
        assert_eq!(ticket.count, 2);
        assert!(ticket.instruction.contains("on a beach"));
        assert!(ticket.instruction.contains("16:9"));

        let outcome = session.complete(&ticket, Ok(vec![url("C"), url("D")]));
        assert_eq!(outcome, CompletionOutcome::Appended { added: 2, current_index: 1 });
        assert_eq!(session.history(), &[url("A"), url("C"), url("D")]);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.position_label(), "Edit 1 / 2");
    }

    #[test]
    fn test_original_survives_and_history_grows() {
        let mut session = EditSession::new(upload("A"));
        let mut expected_len = 1;
        for (i, batch) in [vec!["B"], vec!["C", "D"], vec!["E"]].iter().enumerate() {
            let mode = if batch.len() > 1 { EditMode::ContextPlacement } else { EditMode::DirectEdit };
            succeed(&mut session, &format!("edit {}", i), mode, batch);
            expected_len += batch.len();
            // Landing on the first result means the tip is only reached for single results.
            while session.current_index() < session.history().len() - 1 {
                session.next();
            }
            assert_eq!(session.history().len(), expected_len);
            assert_eq!(session.history()[0], url("A"));
        }
    }

    #[test]
    fn test_submit_while_pending_is_rejected_without_changes() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("first", EditMode::DirectEdit).unwrap();
        session.complete(&ticket, Err(EditError::NoImageProduced));
        let _in_flight = session.begin_submit("second", EditMode::DirectEdit).unwrap();

        let before = (session.history().to_vec(), session.current_index(), session.last_error().map(String::from));
        assert_eq!(session.begin_submit("third", EditMode::DirectEdit).unwrap_err(), Rejected::Pending);
        let after = (session.history().to_vec(), session.current_index(), session.last_error().map(String::from));
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_instruction_is_rejected() {
        let mut session = EditSession::new(upload("A"));
        assert_eq!(session.begin_submit("   ", EditMode::DirectEdit).unwrap_err(), Rejected::EmptyInstruction);
        assert!(!session.is_pending());
    }

    #[test]
    fn test_navigation_clamps_at_both_ends() {
        let mut session = EditSession::new(upload("A"));
        session.prev();
        assert_eq!(session.current_index(), 0);
        session.next();
        assert_eq!(session.current_index(), 0);

        succeed(&mut session, "edit", EditMode::DirectEdit, &["B"]);
        session.next();
        assert_eq!(session.current_index(), 1);
        session.prev();
        session.prev();
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn test_navigation_ignored_while_pending() {
        let mut session = EditSession::new(upload("A"));
        succeed(&mut session, "edit", EditMode::DirectEdit, &["B"]);
        let _ticket = session.begin_submit("again", EditMode::DirectEdit).unwrap();
        session.prev();
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn test_edit_from_middle_discards_redo_branch() {
        let mut session = EditSession::new(upload("A"));
        succeed(&mut session, "one", EditMode::DirectEdit, &["B"]);
        succeed(&mut session, "two", EditMode::DirectEdit, &["C"]);
        session.prev();
        succeed(&mut session, "three", EditMode::DirectEdit, &["D"]);
        assert_eq!(session.history(), &[url("A"), url("B"), url("D")]);
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn test_no_image_sets_error_and_allows_retry() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("make it red", EditMode::DirectEdit).unwrap();
        let outcome = session.complete(&ticket, Err(EditError::NoImageProduced));

        assert_eq!(
            outcome,
            CompletionOutcome::Failed { message: EditError::NoImageProduced.to_string() }
        );
        assert_eq!(session.history(), &[url("A")]);
        assert!(!session.is_pending());
        assert!(session.last_error().is_some());

        let ticket = session.begin_submit("make it blue", EditMode::DirectEdit).unwrap();
        assert!(session.last_error().is_none());
        session.complete(&ticket, Ok(vec![url("B")]));
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_empty_success_counts_as_no_image() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("x", EditMode::DirectEdit).unwrap();
        session.complete(&ticket, Ok(vec![]));
        assert_eq!(session.last_error(), Some(EditError::NoImageProduced.to_string().as_str()));
    }

    #[test]
    fn test_generation_failure_keeps_history() {
        let mut session = EditSession::new(upload("A"));
        succeed(&mut session, "one", EditMode::DirectEdit, &["B"]);
        let ticket = session.begin_submit("on a beach", EditMode::ContextPlacement).unwrap();
        session.complete(&ticket, Err(EditError::GenerationFailed("boom".into())));

        assert_eq!(session.history(), &[url("A"), url("B")]);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.last_error(), Some("Failed to generate image: boom"));
    }

    #[test]
    fn test_stale_response_after_reset_is_discarded() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("make it red", EditMode::DirectEdit).unwrap();

        session.reset(upload("Z"));
        assert!(!session.is_pending());

        let outcome = session.complete(&ticket, Ok(vec![url("B")]));
        assert_eq!(outcome, CompletionOutcome::Stale);
        assert_eq!(session.history(), &[url("Z")]);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn test_success_clears_drafts() {
        let mut session = EditSession::new(upload("A"));
        session.set_draft(EditMode::DirectEdit, "make it red");
        session.set_draft(EditMode::ContextPlacement, "on a beach");
        succeed(&mut session, "make it red", EditMode::DirectEdit, &["B"]);
        assert_eq!(session.drafts(), &Drafts::default());
    }

    #[test]
    fn test_download_names_current_entry() {
        let mut session = EditSession::new(upload("A"));
        succeed(&mut session, "one", EditMode::DirectEdit, &["B"]);
        let download = session.download().unwrap();
        assert_eq!(download.file_name, "edited-image-1.png");
        assert_eq!(download.mime_type, "image/png");
        assert_eq!(download.bytes, b"B".to_vec());
    }

    #[test]
    fn test_ticket_carries_current_image() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("one", EditMode::DirectEdit).unwrap();
        assert_eq!(ticket.image.mime_type, "image/png");
        assert_eq!(ticket.image.bytes().unwrap(), b"A".to_vec());
        assert_eq!(ticket.base_index, 0);
        assert_eq!(ticket.instruction, "one");
    }

    #[test]
    fn test_rejected_submission_keeps_aspect() {
        let mut session = EditSession::new(upload("A"));
        let result = session.begin_submit_with_aspect("  ", EditMode::ContextPlacement, Some(AspectPreference::Portrait));
        assert_eq!(result.unwrap_err(), Rejected::EmptyInstruction);
        assert_eq!(session.aspect(), AspectPreference::Auto);

        let _in_flight = session.begin_submit("first", EditMode::DirectEdit).unwrap();
        let result = session.begin_submit_with_aspect("second", EditMode::ContextPlacement, Some(AspectPreference::Landscape));
        assert_eq!(result.unwrap_err(), Rejected::Pending);
        assert_eq!(session.aspect(), AspectPreference::Auto);
    }

    #[test]
    fn test_accepted_submission_applies_aspect() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session
            .begin_submit_with_aspect("on a beach", EditMode::ContextPlacement, Some(AspectPreference::Portrait))
            .unwrap();
        assert_eq!(session.aspect(), AspectPreference::Portrait);
        assert!(ticket.instruction.contains("9:16"));
    }

    #[test]
    fn test_aspect_change_ignored_while_pending() {
        let mut session = EditSession::new(upload("A"));
        let ticket = session.begin_submit("make it red", EditMode::DirectEdit).unwrap();
        session.set_aspect(AspectPreference::Landscape);
        assert_eq!(session.aspect(), AspectPreference::Auto);

        session.complete(&ticket, Ok(vec![url("B")]));
        session.set_aspect(AspectPreference::Landscape);
        assert_eq!(session.aspect(), AspectPreference::Landscape);
    }

    #[test]
    fn test_stale_response_leaves_newer_submission_pending() {
        let mut session = EditSession::new(upload("A"));
        let old_ticket = session.begin_submit("make it red", EditMode::DirectEdit).unwrap();

        session.reset(upload("Z"));
        let new_ticket = session.begin_submit("make it blue", EditMode::DirectEdit).unwrap();

        let outcome = session.complete(&old_ticket, Ok(vec![url("B")]));
        assert_eq!(outcome, CompletionOutcome::Stale);
        assert!(session.is_pending());
        assert_eq!(session.history(), &[url("Z")]);
        assert_eq!(session.begin_submit("third", EditMode::DirectEdit).unwrap_err(), Rejected::Pending);

        session.complete(&new_ticket, Ok(vec![url("C")]));
        assert!(!session.is_pending());
        assert_eq!(session.history(), &[url("Z"), url("C")]);
    }
}
