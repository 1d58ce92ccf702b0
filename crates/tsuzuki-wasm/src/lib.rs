//! Browser bindings. The page keeps the persisted blob in `localStorage`,
//! passes it in, and writes back whatever comes out.

use wasm_bindgen::prelude::*;

use tsuzuki_core::episodes::{self, EpisodeRange, EpisodeState};
use tsuzuki_core::store::{self, ProgressStore};

/// Run `op` against the list in `blob` and return the new blob.
///
/// An unreadable blob is returned untouched rather than replaced with an empty list.
fn apply(blob: &str, op: impl FnOnce(&mut ProgressStore)) -> String {
    let records = if blob.trim().is_empty() {
        Vec::new()
    } else {
        match store::decode(blob) {
            Ok(records) => records,
            Err(_) => return blob.to_string(),
        }
    };
    let mut list = ProgressStore::from_records(records);
    op(&mut list);
    list.to_blob().unwrap_or_else(|_| blob.to_string())
}

#[wasm_bindgen]
pub fn add_to_list(blob: &str, id: &str, title: &str, image: &str, total_episodes: u32) -> String {
    apply(blob, |list| {
        list.add_to_list(id, title, image, total_episodes);
    })
}

#[wasm_bindgen]
pub fn remove_from_list(blob: &str, id: &str) -> String {
    apply(blob, |list| {
        list.remove_from_list(id);
    })
}

#[wasm_bindgen]
pub fn save_data(blob: &str, id: &str, episode: u32) -> String {
    apply(blob, |list| {
        list.save_data(id, episode);
    })
}

/// JSON array of `"start-end"` labels for the range picker.
#[wasm_bindgen]
pub fn episode_ranges(total: u32, page_size: u32) -> String {
    let labels: Vec<String> = episodes::ranges(total, page_size)
        .iter()
        .map(ToString::to_string)
        .collect();
    serde_json::to_string(&labels).unwrap_or_else(|_| "[]".to_string())
}

/// Most tiles returned for an anime that is not on the list, where the
/// episode count is unknown.
const MAX_UNTRACKED_TILES: u32 = 100;

/// JSON array of `[episode, state]` pairs for episodes `start..=end`, stopping
/// at the anime's last episode.
#[wasm_bindgen]
pub fn episode_states(blob: &str, id: &str, start: u32, end: u32) -> String {
    let Ok(range) = EpisodeRange::new(start, end) else {
        return "[]".to_string();
    };
    let records = store::decode(blob).unwrap_or_default();
    let record = records.iter().find(|r| r.anime_id == id);
    let last = match record {
        Some(r) => r.total_episodes,
        None => range.start.saturating_add(MAX_UNTRACKED_TILES - 1),
    };
    let Some(page) = range.clamp_to(last) else {
        return "[]".to_string();
    };
    let grid: Vec<(u32, EpisodeState)> =
        episodes::episode_grid(record, page.start..=page.end, page);
    serde_json::to_string(&grid).unwrap_or_else(|_| "[]".to_string())
}
