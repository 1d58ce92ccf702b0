//! Episode-range pagination and per-episode watch state for episode grids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TsuzukiError;
use crate::models::AnimeProgressRecord;

/// Inclusive range of episode numbers shown on one page of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRange {
    pub start: u32,
    pub end: u32,
}

impl EpisodeRange {
    pub fn new(start: u32, end: u32) -> Result<Self, TsuzukiError> {
        if start == 0 {
            return Err(TsuzukiError::InvalidRange(
                "episodes are numbered from 1".into(),
            ));
        }
        if start > end {
            return Err(TsuzukiError::InvalidRange(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The page shown before a range is picked.
    pub fn first_page(page_size: u32) -> Self {
        Self {
            start: 1,
            end: page_size.max(1),
        }
    }

    pub fn contains(&self, episode: u32) -> bool {
        self.start <= episode && episode <= self.end
    }

    /// Number of episodes covered. A reversed range (only reachable through
    /// deserialization) covers nothing.
    pub fn count(&self) -> u32 {
        if self.start > self.end {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    /// The part of this range at or below `last`, or `None` if nothing is left.
    pub fn clamp_to(&self, last: u32) -> Option<Self> {
        let end = self.end.min(last);
        (self.start <= end).then_some(Self {
            start: self.start,
            end,
        })
    }
}

impl fmt::Display for EpisodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for EpisodeRange {
    type Err = TsuzukiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| TsuzukiError::InvalidRange(format!("expected `start-end`, got `{s}`")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| TsuzukiError::InvalidRange(format!("`{part}`: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

/// Split `total` episodes into pages of `page_size`. The last page is clamped to `total`.
pub fn ranges(total: u32, page_size: u32) -> Vec<EpisodeRange> {
    if total == 0 || page_size == 0 {
        return Vec::new();
    }
    let pages = total.div_ceil(page_size);
    (0..pages)
        .map(|i| EpisodeRange {
            start: i * page_size + 1,
            end: (i + 1).saturating_mul(page_size).min(total),
        })
        .collect()
}

/// Whether the grid offers a range picker at all.
pub fn needs_range_picker(total: u32, page_size: u32) -> bool {
    page_size > 0 && total >= page_size
}

/// How an episode tile is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeState {
    NotWatched,
    Watched,
    LastWatched,
}

impl EpisodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotWatched => "Not watched",
            Self::Watched => "Already watched",
            Self::LastWatched => "Last watched",
        }
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of `episode` given the anime's record, if it is on the list.
pub fn classify(record: Option<&AnimeProgressRecord>, episode: u32) -> EpisodeState {
    match record {
        Some(r) if r.last_watched() == Some(episode) => EpisodeState::LastWatched,
        Some(r) if r.has_watched(episode) => EpisodeState::Watched,
        _ => EpisodeState::NotWatched,
    }
}

/// Classify each episode number inside `range`, preserving input order.
pub fn episode_grid(
    record: Option<&AnimeProgressRecord>,
    episodes: impl IntoIterator<Item = u32>,
    range: EpisodeRange,
) -> Vec<(u32, EpisodeState)> {
    episodes
        .into_iter()
        .filter(|&ep| range.contains(ep))
        .map(|ep| (ep, classify(record, ep)))
        .collect()
}
