use crate::canvas::{SelectionCanvas, display_image, fit_rect};
use crate::components::dialogs::{
    ApiKeyDialog, ConfirmResult, SettingsWindow, show_alert, show_reset_confirmation,
};
use crate::editor::{Completion, EditorState, SubmitError};
use crate::gemini::{GeminiClient, InpaintError};
use crate::io::{GeneratedImage, SourceImage, load_image_sync, result_file_name, write_png};
use crate::ops::guide::GuideMode;
use crate::settings::AppSettings;
use crate::{log_err, log_info, log_warn};
use eframe::egui;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::SystemTime;

// ============================================================================
// ASYNC INPAINT PIPELINE: one request on a worker thread, result over a channel
// ============================================================================

/// Result delivered from the request thread.
pub struct InpaintOutcome {
    /// Token of the request that produced this; stale tokens are ignored.
    pub token: u64,
    pub result: Result<GeneratedImage, InpaintError>,
}

// ============================================================================
// ASYNC IO PIPELINE: background image loading / saving
// ============================================================================

pub enum IoResult {
    ImageLoaded(SourceImage),
    LoadFailed(String),
    Saved(PathBuf),
    SaveFailed(String),
}

pub struct TextInpaintApp {
    settings: AppSettings,
    editor: EditorState,
    canvas: SelectionCanvas,
    /// Guide flavour for the next request (starts from settings).
    guide_mode: GuideMode,

    /// Decoded result for display and clipboard, built lazily from `editor.result`.
    result_texture: Option<egui::TextureHandle>,
    result_rgba: Option<image::RgbaImage>,

    inpaint_sender: mpsc::Sender<InpaintOutcome>,
    inpaint_receiver: mpsc::Receiver<InpaintOutcome>,
    /// ctx time when the current request started (for the elapsed label).
    processing_started: Option<f64>,

    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    pending_io_ops: usize,

    api_key_dialog: ApiKeyDialog,
    settings_window: SettingsWindow,
    show_reset_confirm: bool,
    alert: Option<String>,
    /// Re-open the key dialog once the current alert is dismissed.
    reopen_key_after_alert: bool,
    status: String,

    pending_startup_files: Vec<PathBuf>,
}

impl TextInpaintApp {
    pub fn new(cc: &eframe::CreationContext<'_>, startup_files: Vec<PathBuf>) -> Self {
        let settings = AppSettings::load();
        apply_theme(&cc.egui_ctx, settings.dark_mode);

        let (inpaint_sender, inpaint_receiver) = mpsc::channel();
        let (io_sender, io_receiver) = mpsc::channel();

        let mut api_key_dialog = ApiKeyDialog::default();
        if settings.resolve_api_key(None).is_none() {
            log_info!("No API key configured; prompting");
            api_key_dialog.open_with_reason(None);
        }

        Self {
            guide_mode: settings.guide_mode,
            settings,
            editor: EditorState::default(),
            canvas: SelectionCanvas::default(),
            result_texture: None,
            result_rgba: None,
            inpaint_sender,
            inpaint_receiver,
            processing_started: None,
            io_sender,
            io_receiver,
            pending_io_ops: 0,
            api_key_dialog,
            settings_window: SettingsWindow::default(),
            show_reset_confirm: false,
            alert: None,
            reopen_key_after_alert: false,
            status: String::new(),
            pending_startup_files: startup_files,
        }
    }

    // -- Loading / saving -------------------------------------------------

    fn spawn_load(&mut self, ctx: &egui::Context, path: PathBuf) {
        let sender = self.io_sender.clone();
        let ctx = ctx.clone();
        self.pending_io_ops += 1;
        self.status = format!("Loading {}…", path.display());
        std::thread::spawn(move || {
            let msg = match load_image_sync(&path) {
                Ok(img) => IoResult::ImageLoaded(img),
                Err(e) => IoResult::LoadFailed(format!("{}: {}", path.display(), e)),
            };
            let _ = sender.send(msg);
            ctx.request_repaint();
        });
    }

    fn open_image_dialog(&mut self, ctx: &egui::Context) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "gif", "bmp"])
            .pick_file()
        {
            self.spawn_load(ctx, path);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else { return };
        if self.editor.is_processing() {
            self.status = "Wait for the current request to finish".to_string();
            return;
        }
        if let Some(path) = file.path {
            self.spawn_load(ctx, path);
        } else if let Some(bytes) = file.bytes {
            match SourceImage::from_bytes(file.name.clone(), bytes.to_vec()) {
                Ok(img) => self.set_workspace_image(img),
                Err(e) => self.alert = Some(format!("Failed to load image. {}", e)),
            }
        }
    }

    fn set_workspace_image(&mut self, img: SourceImage) {
        log_info!("Loaded {} ({}x{}, {})", img.name, img.width(), img.height(), img.mime_type);
        self.status = format!("{} — {}×{}", img.name, img.width(), img.height());
        self.editor.load_image(img);
        self.clear_result_cache();
    }

    fn download_result(&mut self, ctx: &egui::Context) {
        let Some(rgba) = self.result_rgba.clone() else { return };
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(result_file_name(SystemTime::now()))
            .add_filter("PNG", &["png"])
            .save_file()
        else {
            return;
        };
        let sender = self.io_sender.clone();
        let ctx = ctx.clone();
        self.pending_io_ops += 1;
        std::thread::spawn(move || {
            let msg = match write_png(&rgba, &path) {
                Ok(()) => IoResult::Saved(path),
                Err(e) => IoResult::SaveFailed(e.to_string()),
            };
            let _ = sender.send(msg);
            ctx.request_repaint();
        });
    }

    fn copy_result(&mut self) {
        let Some(rgba) = self.result_rgba.as_ref() else { return };
        let data = arboard::ImageData {
            width: rgba.width() as usize,
            height: rgba.height() as usize,
            bytes: std::borrow::Cow::Borrowed(rgba.as_raw()),
        };
        match arboard::Clipboard::new().and_then(|mut cb| cb.set_image(data)) {
            Ok(()) => self.status = "Result copied to clipboard".to_string(),
            Err(e) => {
                log_warn!("Clipboard copy failed: {}", e);
                self.alert = Some(format!("Could not copy to clipboard: {}", e));
            }
        }
    }

    // -- Inpaint request ----------------------------------------------------

    fn submit(&mut self, ctx: &egui::Context) {
        let Some(api_key) = self.settings.resolve_api_key(None) else {
            self.api_key_dialog.open_with_reason(None);
            return;
        };
        let job = match self.editor.begin_submit() {
            Ok(job) => job,
            Err(SubmitError::Busy) => return,
            Err(e) => {
                self.status = e.to_string();
                return;
            }
        };
        let config = self.settings.client_config(api_key);
        let mode = self.guide_mode;
        let sender = self.inpaint_sender.clone();
        let ctx_bg = ctx.clone();
        self.processing_started = Some(ctx.input(|i| i.time));
        log_info!(
            "Submitting request {} ({} chars, mode {})",
            job.token,
            job.text.chars().count(),
            mode.key()
        );
        std::thread::spawn(move || {
            let result = GeminiClient::new(config).and_then(|client| job.run(&client, mode));
            let _ = sender.send(InpaintOutcome { token: job.token, result });
            ctx_bg.request_repaint();
        });
    }

    fn poll_jobs(&mut self, ctx: &egui::Context) {
        while let Ok(outcome) = self.inpaint_receiver.try_recv() {
            match self.editor.complete(outcome.token, outcome.result) {
                Completion::Applied => {
                    self.processing_started = None;
                    self.clear_result_cache();
                    self.status = "Done".to_string();
                }
                Completion::Failed(e) => {
                    self.processing_started = None;
                    log_err!("Processing failed: {}", e);
                    if matches!(e, InpaintError::InvalidApiKey(_)) {
                        self.reopen_key_after_alert = true;
                    }
                    self.alert = Some(format!("Error: {}", e));
                    self.status.clear();
                }
                Completion::Stale => {
                    log_info!("Dropped stale response for request {}", outcome.token);
                }
            }
        }

        while let Ok(msg) = self.io_receiver.try_recv() {
            self.pending_io_ops = self.pending_io_ops.saturating_sub(1);
            match msg {
                IoResult::ImageLoaded(img) => self.set_workspace_image(img),
                IoResult::LoadFailed(e) => {
                    log_err!("Error reading file: {}", e);
                    self.alert = Some(format!("Failed to load image. {}", e));
                    self.status.clear();
                }
                IoResult::Saved(path) => {
                    log_info!("Saved result to {}", path.display());
                    self.status = format!("Saved {}", path.display());
                }
                IoResult::SaveFailed(e) => {
                    log_err!("Save failed: {}", e);
                    self.alert = Some(format!("Could not save image: {}", e));
                }
            }
        }

        if self.editor.is_processing() || self.pending_io_ops > 0 {
            ctx.request_repaint();
        }
    }

    fn clear_result_cache(&mut self) {
        self.result_texture = None;
        self.result_rgba = None;
    }

    /// Decode and upload the result once. A result that cannot be decoded is dropped.
    fn ensure_result_texture(&mut self, ctx: &egui::Context) {
        if self.result_texture.is_some() {
            return;
        }
        let Some(result) = self.editor.result.as_ref() else { return };
        match result.decode() {
            Ok(rgba) => {
                self.result_texture = Some(ctx.load_texture(
                    "inpaint_result",
                    display_image(&rgba),
                    egui::TextureOptions::LINEAR,
                ));
                self.result_rgba = Some(rgba);
            }
            Err(e) => {
                log_err!("Result decode failed: {}", e);
                self.editor.discard_result();
                self.alert = Some(format!("Error: {}", e));
            }
        }
    }

    fn continue_editing(&mut self) {
        match self.editor.continue_editing() {
            Ok(()) => {
                self.clear_result_cache();
                self.status = "Editing the result".to_string();
            }
            Err(e) => {
                log_err!("Failed to continue editing: {}", e);
                self.alert = Some("Could not load the edited image for next round.".to_string());
            }
        }
    }

    fn start_over(&mut self) {
        log_info!("Start over");
        self.editor.reset();
        self.clear_result_cache();
        self.processing_started = None;
        self.status.clear();
    }

    // -- UI -------------------------------------------------------------------

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("TextInpaint");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Settings").clicked() {
                        self.settings_window.open(&self.settings);
                    }
                    if self.editor.has_image() && ui.button("Start Over").clicked() {
                        if self.settings.confirm_on_reset {
                            self.show_reset_confirm = true;
                        } else {
                            self.start_over();
                        }
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.editor.is_processing() {
                    ui.spinner();
                    let elapsed = self
                        .processing_started
                        .map(|t| ctx.input(|i| i.time) - t)
                        .unwrap_or(0.0);
                    ui.label(format!("Generating… {:.0}s", elapsed));
                } else if self.pending_io_ops > 0 {
                    ui.spinner();
                }
                ui.label(egui::RichText::new(&self.status).weak());
            });
        });
    }

    fn landing(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.25);
                ui.heading("Seamless Text Replacement");
                ui.label("Replace text in images while preserving background textures and lighting.");
                ui.add_space(16.0);
                if ui
                    .add_sized([200.0, 40.0], egui::Button::new("Open Image…"))
                    .clicked()
                {
                    self.open_image_dialog(ctx);
                }
                ui.add_space(8.0);
                ui.label(egui::RichText::new("or drop an image onto the window").weak());
            });
        });
    }

    fn controls(&mut self, ctx: &egui::Context) {
        let processing = self.editor.is_processing();
        egui::SidePanel::right("controls")
            .resizable(false)
            .exact_width(300.0)
            .show(ctx, |ui| {
                ui.add_space(8.0);
                ui.label(egui::RichText::new("1. Select the text area").strong());
                let sel_text = match self.editor.selection {
                    Some(s) => format!("{:.1}%, {:.1}% — {:.1}% × {:.1}%", s.x, s.y, s.width, s.height),
                    None => "Drag on the image".to_string(),
                };
                ui.label(egui::RichText::new(sel_text).weak());

                ui.add_space(12.0);
                ui.label(egui::RichText::new("2. New text").strong());
                let has_selection = self.editor.selection.is_some();
                let hint = if has_selection {
                    "Replacement text"
                } else {
                    "Select a region first..."
                };
                let mut text = self.editor.input_text.clone();
                let edit = ui.add_enabled(
                    self.editor.can_edit_text(),
                    egui::TextEdit::multiline(&mut text)
                        .hint_text(hint)
                        .desired_rows(3)
                        .desired_width(f32::INFINITY),
                );
                if edit.changed() {
                    self.editor.set_text(text);
                }

                ui.add_space(12.0);
                ui.label(egui::RichText::new("3. Location guide").strong());
                ui.add_enabled_ui(!processing, |ui| {
                    for mode in GuideMode::all() {
                        ui.radio_value(&mut self.guide_mode, *mode, mode.label());
                    }
                });

                ui.add_space(16.0);
                let label = if processing { "Generating…" } else { "Generate" };
                let button = egui::Button::new(label).min_size(egui::vec2(ui.available_width(), 36.0));
                if ui.add_enabled(self.editor.is_ready_to_submit(), button).clicked() {
                    self.submit(ctx);
                }
                if processing {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Waiting for the model…");
                    });
                }
            });
    }

    fn workspace(&mut self, ctx: &egui::Context) {
        self.ensure_result_texture(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = self.result_texture.clone() {
                ui.horizontal(|ui| {
                    if ui.button("Download").clicked() {
                        self.download_result(ctx);
                    }
                    if ui.button("Copy").clicked() {
                        self.copy_result();
                    }
                    if ui.button("Discard").clicked() {
                        self.editor.discard_result();
                        self.clear_result_cache();
                    }
                    if ui.button("Continue Editing").clicked() {
                        self.continue_editing();
                    }
                });
                ui.separator();
                let (rect, _) = ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());
                let shown = fit_rect(rect, texture.size_vec2());
                ui.painter().image(
                    texture.id(),
                    shown,
                    egui::Rect::from_min_max(egui::Pos2::ZERO, egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
                return;
            }

            self.canvas.sync(self.editor.selection_epoch());
            let enabled = !self.editor.is_processing();
            if let Some(image) = self.editor.image.as_ref() {
                let committed = self.canvas.show(ui, &image.rgba, enabled);
                if committed.is_some() {
                    self.editor.set_selection(committed);
                }
            }
        });
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        if let Some(message) = self.alert.clone() {
            if show_alert(ctx, &message) {
                self.alert = None;
                if self.reopen_key_after_alert {
                    self.reopen_key_after_alert = false;
                    self.api_key_dialog.open_with_reason(Some(
                        "API key session expired or invalid. Please reconnect.".to_string(),
                    ));
                }
            }
            return;
        }

        if self.show_reset_confirm {
            match show_reset_confirmation(ctx) {
                ConfirmResult::Confirmed => {
                    self.show_reset_confirm = false;
                    self.start_over();
                }
                ConfirmResult::Cancelled => self.show_reset_confirm = false,
                ConfirmResult::Pending => {}
            }
        }

        if let Some(key) = self.api_key_dialog.show(ctx) {
            self.settings.api_key = key;
            self.settings.save();
            log_info!("API key updated");
        }

        if let Some(updated) = self.settings_window.show(ctx) {
            if updated.dark_mode != self.settings.dark_mode {
                apply_theme(ctx, updated.dark_mode);
            }
            if updated.guide_mode != self.settings.guide_mode {
                self.guide_mode = updated.guide_mode;
            }
            self.settings = updated;
            self.settings.save();
        }
    }
}

fn apply_theme(ctx: &egui::Context, dark: bool) {
    ctx.set_visuals(if dark {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    });
}

impl eframe::App for TextInpaintApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for path in std::mem::take(&mut self.pending_startup_files) {
            self.spawn_load(ctx, path);
        }

        self.poll_jobs(ctx);
        self.handle_dropped_files(ctx);

        self.top_bar(ctx);
        if self.editor.has_image() {
            self.controls(ctx);
            self.workspace(ctx);
        } else {
            self.landing(ctx);
        }
        self.dialogs(ctx);
    }
}
