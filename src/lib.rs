//! TextInpaint: replace text inside a selected region of an image with a
//! hosted multimodal image model, from an egui window or the command line.

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod editor;
pub mod gemini;
pub mod io;
pub mod ops;
pub mod selection;
pub mod settings;
