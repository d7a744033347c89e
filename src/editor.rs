// ============================================================================
// Editor state: image / selection / text / in-flight request / result
// ============================================================================
//
// Drives the select → submit → result → continue-editing loop. At most one
// request is in flight; each carries a token so a response that arrives after
// Start Over or a new image is dropped instead of clobbering the workspace.

use std::time::SystemTime;

use crate::gemini::{GeminiClient, InpaintError};
use crate::io::{GeneratedImage, LoadError, SourceImage, edited_file_name};
use crate::ops::guide::GuideMode;
use crate::selection::BoundingBox;

/// Why a submit was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    NoImage,
    NoSelection,
    EmptyText,
    Busy,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::NoImage => write!(f, "Open an image first"),
            SubmitError::NoSelection => write!(f, "Drag to select the text area"),
            SubmitError::EmptyText => write!(f, "Enter the replacement text"),
            SubmitError::Busy => write!(f, "A request is already in progress"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Everything the worker needs; detached from the editor so it can cross threads.
#[derive(Clone, Debug)]
pub struct InpaintJob {
    pub token: u64,
    pub image: SourceImage,
    pub selection: BoundingBox,
    pub text: String,
}

impl InpaintJob {
    pub fn run(&self, client: &GeminiClient, mode: GuideMode) -> Result<GeneratedImage, InpaintError> {
        client.inpaint_text(&self.image, &self.selection, &self.text, mode)
    }
}

/// What `complete` did with a response.
#[derive(Debug)]
pub enum Completion {
    Applied,
    Failed(InpaintError),
    /// Token no longer matches the in-flight request; ignored.
    Stale,
}

#[derive(Debug, Default)]
pub struct EditorState {
    pub image: Option<SourceImage>,
    pub selection: Option<BoundingBox>,
    pub input_text: String,
    pub result: Option<GeneratedImage>,
    /// Bumped whenever the canvas must drop its drag state.
    selection_epoch: u64,
    next_token: u64,
    in_flight: Option<u64>,
}

impl EditorState {
    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn selection_epoch(&self) -> u64 {
        self.selection_epoch
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn load_image(&mut self, image: SourceImage) {
        self.image = Some(image);
        self.clear_workspace();
        self.in_flight = None;
    }

    pub fn set_selection(&mut self, selection: Option<BoundingBox>) {
        self.selection = selection.map(|b| b.clamped()).filter(|b| !b.is_empty());
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    fn check_ready(&self) -> Result<(), SubmitError> {
        if self.is_processing() {
            return Err(SubmitError::Busy);
        }
        if self.image.is_none() {
            return Err(SubmitError::NoImage);
        }
        if self.selection.is_none() {
            return Err(SubmitError::NoSelection);
        }
        if self.input_text.trim().is_empty() {
            return Err(SubmitError::EmptyText);
        }
        Ok(())
    }

    /// The text field only takes input once a region is picked and nothing is in flight.
    pub fn can_edit_text(&self) -> bool {
        !self.is_processing() && self.selection.is_some()
    }

    pub fn is_ready_to_submit(&self) -> bool {
        self.check_ready().is_ok()
    }

    /// Mark a request in flight and hand back the job to run.
    pub fn begin_submit(&mut self) -> Result<InpaintJob, SubmitError> {
        self.check_ready()?;
        let (Some(image), Some(selection)) = (self.image.clone(), self.selection) else {
            return Err(SubmitError::NoImage);
        };
        self.next_token = self.next_token.wrapping_add(1);
        let token = self.next_token;
        self.in_flight = Some(token);
        Ok(InpaintJob {
            token,
            image,
            selection,
            text: self.input_text.trim().to_string(),
        })
    }

    pub fn complete(&mut self, token: u64, outcome: Result<GeneratedImage, InpaintError>) -> Completion {
        if self.in_flight != Some(token) {
            return Completion::Stale;
        }
        self.in_flight = None;
        match outcome {
            Ok(image) => {
                self.result = Some(image);
                Completion::Applied
            }
            Err(e) => Completion::Failed(e),
        }
    }

    pub fn discard_result(&mut self) {
        self.result = None;
    }

    /// Promote the result to the workspace image for another round.
    pub fn continue_editing(&mut self) -> Result<(), LoadError> {
        let Some(result) = self.result.as_ref() else {
            return Err(LoadError::Decode("no result to continue from".to_string()));
        };
        let next = result.clone().into_source(edited_file_name(SystemTime::now()))?;
        self.image = Some(next);
        self.clear_workspace();
        Ok(())
    }

    /// Start Over: back to the landing state.
    pub fn reset(&mut self) {
        self.image = None;
        self.clear_workspace();
        self.in_flight = None;
    }

    fn clear_workspace(&mut self) {
        self.selection = None;
        self.input_text.clear();
        self.result = None;
        self.selection_epoch = self.selection_epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::guide::encode_png;
    use image::{Rgba, RgbaImage};

    fn image(w: u32, h: u32) -> SourceImage {
        let bytes = encode_png(&RgbaImage::from_pixel(w, h, Rgba([50, 60, 70, 255]))).unwrap();
        SourceImage::from_bytes("test.png", bytes).unwrap()
    }

    fn generated(w: u32, h: u32) -> GeneratedImage {
        GeneratedImage {
            bytes: encode_png(&RgbaImage::from_pixel(w, h, Rgba([1, 1, 1, 255]))).unwrap(),
            mime_type: "image/png".into(),
        }
    }

    fn ready() -> EditorState {
        let mut ed = EditorState::default();
        ed.load_image(image(4, 4));
        ed.set_selection(Some(BoundingBox::new(10.0, 10.0, 20.0, 20.0)));
        ed.set_text("  Hello ");
        ed
    }

    #[test]
    fn text_field_waits_for_a_selection() {
        let mut ed = EditorState::default();
        assert!(!ed.can_edit_text());
        ed.load_image(image(4, 4));
        assert!(!ed.can_edit_text());
        ed.set_selection(Some(BoundingBox::new(10.0, 10.0, 20.0, 20.0)));
        assert!(ed.can_edit_text());
        ed.set_text("Hi");
        let _job = ed.begin_submit().unwrap();
        assert!(!ed.can_edit_text());
    }

    #[test]
    fn readiness_requires_everything() {
        let mut ed = EditorState::default();
        assert_eq!(ed.begin_submit().unwrap_err(), SubmitError::NoImage);
        ed.load_image(image(2, 2));
        assert_eq!(ed.begin_submit().unwrap_err(), SubmitError::NoSelection);
        ed.set_selection(Some(BoundingBox::new(0.0, 0.0, 50.0, 50.0)));
        ed.set_text("   ");
        assert_eq!(ed.begin_submit().unwrap_err(), SubmitError::EmptyText);
        ed.set_text("x");
        assert!(ed.is_ready_to_submit());
    }

    #[test]
    fn empty_selection_is_no_selection() {
        let mut ed = ready();
        ed.set_selection(Some(BoundingBox::new(30.0, 30.0, 0.0, 0.0)));
        assert_eq!(ed.selection, None);
    }

    #[test]
    fn only_one_request_in_flight() {
        let mut ed = ready();
        let job = ed.begin_submit().unwrap();
        assert_eq!(job.text, "Hello");
        assert!(ed.is_processing());
        assert!(!ed.is_ready_to_submit());
        assert_eq!(ed.begin_submit().unwrap_err(), SubmitError::Busy);

        assert!(matches!(ed.complete(job.token, Ok(generated(4, 4))), Completion::Applied));
        assert!(!ed.is_processing());
        assert!(ed.result.is_some());
    }

    #[test]
    fn failure_clears_processing_and_keeps_inputs() {
        let mut ed = ready();
        let job = ed.begin_submit().unwrap();
        match ed.complete(job.token, Err(InpaintError::NoImage)) {
            Completion::Failed(InpaintError::NoImage) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!ed.is_processing());
        assert!(ed.result.is_none());
        assert!(ed.is_ready_to_submit());
    }

    #[test]
    fn response_after_reset_is_stale() {
        let mut ed = ready();
        let job = ed.begin_submit().unwrap();
        ed.reset();
        assert!(matches!(ed.complete(job.token, Ok(generated(4, 4))), Completion::Stale));
        assert!(ed.result.is_none());
        assert!(!ed.has_image());
    }

    #[test]
    fn response_after_new_image_is_stale() {
        let mut ed = ready();
        let old = ed.begin_submit().unwrap();
        ed.load_image(image(8, 8));
        ed.set_selection(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        ed.set_text("again");
        let new = ed.begin_submit().unwrap();
        assert_ne!(old.token, new.token);
        assert!(matches!(ed.complete(old.token, Ok(generated(1, 1))), Completion::Stale));
        assert!(ed.is_processing());
        assert!(matches!(ed.complete(new.token, Ok(generated(8, 8))), Completion::Applied));
    }

    #[test]
    fn continue_editing_promotes_result() {
        let mut ed = ready();
        let epoch = ed.selection_epoch();
        let job = ed.begin_submit().unwrap();
        ed.complete(job.token, Ok(generated(6, 3)));
        ed.continue_editing().unwrap();

        let img = ed.image.as_ref().unwrap();
        assert_eq!((img.width(), img.height()), (6, 3));
        assert!(img.name.starts_with("edited_"));
        assert!(ed.selection.is_none());
        assert!(ed.input_text.is_empty());
        assert!(ed.result.is_none());
        assert!(ed.selection_epoch() > epoch);
    }

    #[test]
    fn continue_without_result_fails() {
        let mut ed = ready();
        assert!(ed.continue_editing().is_err());
        assert!(ed.has_image());
    }

    #[test]
    fn discard_keeps_workspace() {
        let mut ed = ready();
        let job = ed.begin_submit().unwrap();
        ed.complete(job.token, Ok(generated(4, 4)));
        ed.discard_result();
        assert!(ed.result.is_none());
        assert!(ed.selection.is_some());
        assert_eq!(ed.input_text, "  Hello ");
    }

    #[test]
    fn load_image_clears_previous_round() {
        let mut ed = ready();
        let epoch = ed.selection_epoch();
        ed.load_image(image(3, 3));
        assert!(ed.selection.is_none());
        assert!(ed.input_text.is_empty());
        assert_eq!(ed.selection_epoch(), epoch + 1);
    }
}
