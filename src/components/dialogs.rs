
use crate::gemini::ImageSize;
use crate::ops::guide::GuideMode;
use crate::settings::AppSettings;

// ============================================================================
// API KEY DIALOG
// ============================================================================

/// Asks for a Gemini API key when none resolves, or after the API rejected one.
#[derive(Default)]
pub struct ApiKeyDialog {
    pub open: bool,
    key_input: String,
    /// Shown above the field after an invalid-key failure.
    pub reason: Option<String>,
}

impl ApiKeyDialog {
    pub fn open_with_reason(&mut self, reason: Option<String>) {
        self.open = true;
        self.reason = reason;
        self.key_input.clear();
    }

    /// Returns the entered key when the user confirms.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<String> {
        if !self.open {
            return None;
        }
        let mut submitted = None;
        let mut close = false;
        egui::Window::new("Connect API Key")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .min_width(360.0)
            .show(ctx, |ui| {
                if let Some(reason) = &self.reason {
                    ui.colored_label(ui.visuals().warn_fg_color, reason);
                    ui.add_space(4.0);
                }
                ui.label("TextInpaint needs a Gemini API key with access to the image model.");
                ui.label(
                    egui::RichText::new("You can also set GEMINI_API_KEY in the environment.")
                        .weak()
                        .italics(),
                );
                ui.add_space(8.0);
                let edit = ui.add(
                    egui::TextEdit::singleline(&mut self.key_input)
                        .password(true)
                        .hint_text("API key")
                        .desired_width(f32::INFINITY),
                );
                let enter = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let has_key = !self.key_input.trim().is_empty();
                    if ui.add_enabled(has_key, egui::Button::new("Save key")).clicked()
                        || (enter && has_key)
                    {
                        submitted = Some(self.key_input.trim().to_string());
                    }
                    if ui.button("Later").clicked() {
                        close = true;
                    }
                });
            });
        if submitted.is_some() || close {
            self.open = false;
            self.key_input.clear();
            self.reason = None;
        }
        submitted
    }
}

// ============================================================================
// CONFIRM / ALERT WINDOWS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmResult {
    Pending,
    Confirmed,
    Cancelled,
}

/// "Start Over?" confirmation.
pub fn show_reset_confirmation(ctx: &egui::Context) -> ConfirmResult {
    let mut result = ConfirmResult::Pending;
    egui::Window::new("Start Over")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("Discard the current image and any unsaved result?");
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Start Over").clicked() {
                    result = ConfirmResult::Confirmed;
                }
                if ui.button("Cancel").clicked() {
                    result = ConfirmResult::Cancelled;
                }
            });
        });
    result
}

/// Modal-style error message. Returns true when dismissed.
pub fn show_alert(ctx: &egui::Context, message: &str) -> bool {
    let mut dismissed = false;
    egui::Window::new("Error")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .max_width(420.0)
        .show(ctx, |ui| {
            ui.label(message);
            ui.add_space(8.0);
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
    dismissed
}

// ============================================================================
// SETTINGS WINDOW
// ============================================================================

/// Edits a staged copy of the settings; "Apply" hands it back.
#[derive(Default)]
pub struct SettingsWindow {
    pub open: bool,
    staged: Option<AppSettings>,
}

impl SettingsWindow {
    pub fn open(&mut self, current: &AppSettings) {
        self.open = true;
        self.staged = Some(current.clone());
    }

    pub fn show(&mut self, ctx: &egui::Context) -> Option<AppSettings> {
        if !self.open {
            return None;
        }
        let Some(staged) = self.staged.as_mut() else {
            self.open = false;
            return None;
        };
        let mut apply = false;
        let mut cancel = false;
        egui::Window::new("Settings")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .min_width(420.0)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid")
                    .num_columns(2)
                    .spacing([12.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("API key");
                        ui.add(egui::TextEdit::singleline(&mut staged.api_key).password(true));
                        ui.end_row();

                        ui.label("Model");
                        ui.text_edit_singleline(&mut staged.model);
                        ui.end_row();

                        ui.label("Endpoint");
                        ui.text_edit_singleline(&mut staged.endpoint);
                        ui.end_row();

                        ui.label("Output size");
                        egui::ComboBox::from_id_source("settings_image_size")
                            .selected_text(staged.image_size.as_str())
                            .show_ui(ui, |ui| {
                                for size in ImageSize::all() {
                                    ui.selectable_value(&mut staged.image_size, *size, size.as_str());
                                }
                            });
                        ui.end_row();

                        ui.label("Location guide");
                        egui::ComboBox::from_id_source("settings_guide_mode")
                            .selected_text(staged.guide_mode.label())
                            .show_ui(ui, |ui| {
                                for mode in GuideMode::all() {
                                    ui.selectable_value(&mut staged.guide_mode, *mode, mode.label());
                                }
                            });
                        ui.end_row();

                        ui.label("Timeout (s)");
                        ui.add(egui::DragValue::new(&mut staged.timeout_secs).clamp_range(5..=900));
                        ui.end_row();

                        ui.label("Confirm Start Over");
                        ui.checkbox(&mut staged.confirm_on_reset, "");
                        ui.end_row();

                        ui.label("Dark theme");
                        ui.checkbox(&mut staged.dark_mode, "");
                        ui.end_row();
                    });
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        apply = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                });
            });
        if apply {
            self.open = false;
            return self.staged.take();
        }
        if cancel {
            self.open = false;
            self.staged = None;
        }
        None
    }
}
