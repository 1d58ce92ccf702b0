use std::path::Path;

use tsuzuki_core::backend::open_backend;
use tsuzuki_core::config::AppConfig;
use tsuzuki_core::episodes::{self, EpisodeRange, EpisodeState};
use tsuzuki_core::error::TsuzukiError;
use tsuzuki_core::models::AnimeProgressRecord;
use tsuzuki_core::store::{AddOutcome, ProgressStore, WatchOutcome};

use crate::Command;

pub fn run(command: Command, config: &AppConfig, config_path: &Path) -> Result<(), TsuzukiError> {
    match command {
        Command::Ranges { total } => {
            print_ranges(total, config.episodes.page_size);
            Ok(())
        }
        Command::Config { init } => {
            if init {
                if config_path.exists() {
                    println!("{} already exists", config_path.display());
                } else {
                    config.save_to(config_path)?;
                    println!("Wrote {}", config_path.display());
                }
            }
            print_config(config, config_path);
            Ok(())
        }
        command => run_with_store(command, config),
    }
}

/// Commands that read or write the persisted list.
fn run_with_store(command: Command, config: &AppConfig) -> Result<(), TsuzukiError> {
    let backend = open_backend(config)?;
    let mut store = ProgressStore::open(backend, config.storage.namespace.clone());

    match command {
        Command::Add {
            id,
            title,
            image,
            episodes,
        } => match store.add_to_list(&id, &title, &image, episodes) {
            AddOutcome::Added => println!("Added {title} to your list"),
            AddOutcome::Refreshed => println!("{title} is already on your list (details updated)"),
        },
        Command::Remove { id } => {
            if store.remove_from_list(&id) {
                println!("Removed {id} from your list");
            } else {
                println!("{id} is not on your list");
            }
        }
        Command::Watch { id, episode } => match store.save_data(&id, episode) {
            WatchOutcome::Untracked => {
                return Err(TsuzukiError::NotFound(format!(
                    "`{id}` is not on your list, add it first"
                )));
            }
            WatchOutcome::AlreadyLast => println!("EP {episode} is already your last watched"),
            WatchOutcome::Appended | WatchOutcome::Rewatched => {
                println!("Watched EP {episode}");
            }
        },
        Command::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(store.records())?);
            } else if store.is_empty() {
                println!("Your list is empty");
            } else {
                for record in store.records() {
                    println!("{}", list_line(record, &config.display.placeholder_image));
                }
            }
        }
        Command::Recent { limit } => {
            for record in store.recent(limit) {
                println!("{}", list_line(record, &config.display.placeholder_image));
            }
        }
        Command::Episodes { id, range } => {
            let record = store
                .get(&id)
                .ok_or_else(|| TsuzukiError::NotFound(format!("`{id}` is not on your list")))?;
            print_grid(record, range, config.episodes.page_size);
        }
        Command::Clear => {
            let removed = store.clear();
            println!("Removed {removed} anime from your list");
        }
        Command::Repair => {
            if !store.load_failed() {
                println!("Your saved list is readable, nothing to repair");
                return Ok(());
            }
            match store.repair()? {
                Some(key) => println!("Saved the unreadable list as `{key}` and started a fresh one"),
                None => println!("Started a fresh list"),
            }
            return Ok(());
        }
        Command::Ranges { .. } | Command::Config { .. } => {}
    }

    let backend = store.backend().name();
    if store.load_failed() {
        eprintln!(
            "warning: could not read your saved list from {backend} storage; \
             it was left untouched and changes were not saved (run `tsuzuki repair` to start over)"
        );
    } else if store.is_degraded() {
        eprintln!("warning: could not write to {backend} storage, changes were not saved");
    }
    Ok(())
}

fn list_line(record: &AnimeProgressRecord, placeholder: &str) -> String {
    let last = match record.last_watched() {
        Some(ep) => format!("last watched EP {ep}"),
        None => "not started".to_string(),
    };
    format!(
        "{}\t{}\t• {}\t{}\t{}",
        record.anime_id,
        record.title,
        record.episode_label(),
        last,
        record.image_or(placeholder)
    )
}

fn print_ranges(total: u32, page_size: u32) {
    for range in episodes::ranges(total, page_size) {
        println!("{range}");
    }
}

fn print_grid(record: &AnimeProgressRecord, range: Option<EpisodeRange>, page_size: u32) {
    println!("{} ({})", record.title, record.episode_label());
    if episodes::needs_range_picker(record.total_episodes, page_size) {
        let pages: Vec<String> = episodes::ranges(record.total_episodes, page_size)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("Pages: {}", pages.join(", "));
    }

    let range = range.unwrap_or_else(|| EpisodeRange::first_page(page_size));
    let Some(page) = range.clamp_to(record.total_episodes) else {
        println!("No episodes in {range}");
        return;
    };
    let grid = episodes::episode_grid(Some(record), page.start..=page.end, page);
    for (episode, state) in grid {
        let marker = match state {
            EpisodeState::NotWatched => ' ',
            EpisodeState::Watched => 'x',
            EpisodeState::LastWatched => '>',
        };
        println!("[{marker}] EP {episode:<5} {state}");
    }
}

fn print_config(config: &AppConfig, config_path: &Path) {
    println!("config:    {}", config_path.display());
    println!("data dir:  {}", config.data_dir().display());
    println!("backend:   {}", config.storage.backend);
    println!("namespace: {}", config.storage.namespace);
    println!("page size: {}", config.episodes.page_size);
}
