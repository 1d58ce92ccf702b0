use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One anime's bookmark plus watch progress.
///
/// Field names follow the persisted blob written by the web front end, so the
/// same JSON can be shared between the browser and the native tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeProgressRecord {
    pub anime_id: String,
    pub title: String,
    pub image: String,
    pub total_episodes: u32,
    /// Episodes in viewing order, without duplicates. The last one is "last watched".
    #[serde(default)]
    pub watched_episode: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnimeProgressRecord {
    pub fn new(
        anime_id: impl Into<String>,
        title: impl Into<String>,
        image: impl Into<String>,
        total_episodes: u32,
    ) -> Self {
        Self {
            anime_id: anime_id.into(),
            title: title.into(),
            image: image.into(),
            total_episodes,
            watched_episode: Vec::new(),
            updated_at: Some(Utc::now()),
        }
    }

    /// Most recently opened episode.
    pub fn last_watched(&self) -> Option<u32> {
        self.watched_episode.last().copied()
    }

    pub fn has_watched(&self, episode: u32) -> bool {
        self.watched_episode.contains(&episode)
    }

    /// "1 episode" / "N episodes", as shown on list cards.
    pub fn episode_label(&self) -> String {
        match self.total_episodes {
            1 => "1 episode".to_string(),
            n => format!("{n} episodes"),
        }
    }

    /// Cover image, or `placeholder` when none was recorded.
    pub fn image_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        if self.image.trim().is_empty() {
            placeholder
        } else {
            &self.image
        }
    }
}
