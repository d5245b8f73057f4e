//! Item worker and its render collaborator
//!
//! # Components
//!
//! - `Renderer` / `RenderedPage`: script-capable page rendering
//! - `ChromiumRenderer`: headless Chromium implementation (feature `browser`)
//! - `extract`: static field queries and bounded polling for the track list
//! - `format`: text template and artifact key sanitizing
//! - `ItemWorker`: render, extract, store and record one item

mod browser;
pub mod extract;
pub mod format;
mod item;
mod render;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "browser")]
pub use browser::ChromiumRenderer;
pub use browser::default_renderer;
pub use extract::{poll_until_defined, MixRecord, PollPolicy, Track};
pub use item::{item_blob_key, ItemWorker};
pub use render::{RenderError, RenderedPage, Renderer};
