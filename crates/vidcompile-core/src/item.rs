//! The resolved form of a [`crate::model::JobItem`] once local copies, probed
//! durations, and synthesized subtitles are available — the shape the
//! Transcoder Command Builder (C10) consumes.

use crate::model::ItemType;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub item_type: ItemType,
    pub position: u32,
    /// Local (copied-in) path to the source media, ready for the transcoder.
    pub local_path: String,
    pub duration_s: f64,
    /// Local path to a copied-in logo image, `video` items only.
    pub logo_local_path: Option<String>,
    /// Local path to a synthesized `.ass` subtitle file, `video` items only.
    pub subtitle_path: Option<String>,
}

impl ProcessedItem {
    pub fn new(item_type: ItemType, position: u32, local_path: impl Into<String>, duration_s: f64) -> Self {
        Self {
            item_type,
            position,
            local_path: local_path.into(),
            duration_s,
            logo_local_path: None,
            subtitle_path: None,
        }
    }
}
