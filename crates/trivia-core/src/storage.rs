//! Best-effort local persistence: settings, leaderboard and game history in Sled.
//!
//! Read at round start, written at round end. Never touched mid-round.

use crate::error::CoreResult;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use tracing::warn;

const DEFAULT_STORE_PATH: &str = "./data/trivia_store";
const SETTINGS_KEY: &str = "settings";
const LEADERBOARD_KEY: &str = "leaderboard";
const HISTORY_KEY: &str = "history";

/// How many leaderboard entries are kept.
pub const LEADERBOARD_SIZE: usize = 5;

fn default_host_volume() -> f32 {
    0.8
}

fn default_sfx_volume() -> f32 {
    0.5
}

fn default_host_id() -> String {
    "professor".to_string()
}

fn default_true() -> bool {
    true
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Playback gain for the host voice, 0.0 to 1.0.
    #[serde(default = "default_host_volume")]
    pub host_volume: f32,
    #[serde(default = "default_sfx_volume")]
    pub sfx_volume: f32,
    #[serde(default = "default_host_id")]
    pub default_host_id: String,
    #[serde(default)]
    pub has_seen_tutorial: bool,
    #[serde(default = "default_true")]
    pub show_in_game_stats: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host_volume: default_host_volume(),
            sfx_volume: default_sfx_volume(),
            default_host_id: default_host_id(),
            has_seen_tutorial: false,
            show_in_game_stats: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub topic: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameHistoryEntry {
    pub id: String,
    pub date: String,
    pub topic: String,
    pub difficulty: String,
    pub score: i64,
    pub host_name: String,
}

impl GameHistoryEntry {
    /// New entry stamped with the current time.
    pub fn now(topic: &str, difficulty: &str, score: i64, host_name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: Utc::now().to_rfc3339(),
            topic: topic.to_string(),
            difficulty: difficulty.to_string(),
            score,
            host_name: host_name.to_string(),
        }
    }
}

/// Key-value store for everything that outlives a round.
pub struct GameStore {
    db: Db,
}

impl GameStore {
    /// Opens or creates the store at `./data/trivia_store`.
    pub fn new() -> CoreResult<Self> {
        Self::open_path(DEFAULT_STORE_PATH)
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Settings, or defaults when none were saved or the record is unreadable.
    pub fn settings(&self) -> AppSettings {
        match self.get_json(SETTINGS_KEY) {
            Ok(Some(s)) => s,
            Ok(None) => AppSettings::default(),
            Err(e) => {
                warn!("settings unreadable, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    pub fn save_settings(&self, settings: &AppSettings) -> CoreResult<()> {
        self.put_json(SETTINGS_KEY, settings)
    }

    /// Top entries, highest score first.
    pub fn leaderboard(&self) -> CoreResult<Vec<LeaderboardEntry>> {
        Ok(self.get_json(LEADERBOARD_KEY)?.unwrap_or_default())
    }

    /// Insert an entry, keep the best [`LEADERBOARD_SIZE`] and return the new board.
    pub fn submit_score(&self, entry: LeaderboardEntry) -> CoreResult<Vec<LeaderboardEntry>> {
        let mut board = self.leaderboard()?;
        board.push(entry);
        // stable sort: earlier entries win ties
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board.truncate(LEADERBOARD_SIZE);
        self.put_json(LEADERBOARD_KEY, &board)?;
        Ok(board)
    }

    /// Whether a score would make it onto the current board.
    pub fn qualifies(&self, score: i64) -> CoreResult<bool> {
        let board = self.leaderboard()?;
        Ok(board.len() < LEADERBOARD_SIZE || board.iter().any(|e| score > e.score))
    }

    /// Game history in the order rounds were played.
    pub fn history(&self) -> CoreResult<Vec<GameHistoryEntry>> {
        Ok(self.get_json(HISTORY_KEY)?.unwrap_or_default())
    }

    pub fn append_history(&self, entry: GameHistoryEntry) -> CoreResult<()> {
        let mut history = self.history()?;
        history.push(entry);
        self.put_json(HISTORY_KEY, &history)
    }

    pub fn clear_history(&self) -> CoreResult<()> {
        self.db.remove(HISTORY_KEY.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, score: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            name: name.to_string(),
            score,
            topic: "Music".to_string(),
            date: "2025-01-01".to_string(),
        }
    }

    #[test]
    fn settings_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = GameStore::open_path(dir.path().join("store")).unwrap();
        assert_eq!(store.settings(), AppSettings::default());

        let mut s = AppSettings::default();
        s.host_volume = 0.3;
        s.has_seen_tutorial = true;
        store.save_settings(&s).unwrap();
        assert_eq!(store.settings(), s);
    }

    #[test]
    fn leaderboard_keeps_top_five_by_score() {
        let dir = tempfile::tempdir().unwrap();
        let store = GameStore::open_path(dir.path().join("store")).unwrap();
        for (i, score) in [3, 1, 5, 2, 4, 0].into_iter().enumerate() {
            store.submit_score(entry(&format!("p{}", i), score)).unwrap();
        }
        let board = store.leaderboard().unwrap();
        assert_eq!(board.len(), LEADERBOARD_SIZE);
        let scores: Vec<i64> = board.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![5, 4, 3, 2, 1]);
        assert!(!store.qualifies(1).unwrap());
        assert!(store.qualifies(2).unwrap());
    }

    #[test]
    fn history_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = GameStore::open_path(dir.path().join("store")).unwrap();
        store.append_history(GameHistoryEntry::now("Music", "Easy", 3, "Joy Ryder")).unwrap();
        store.append_history(GameHistoryEntry::now("Sports", "Hard", 1, "Ms. Penelope")).unwrap();
        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].topic, "Music");
        assert_eq!(history[1].host_name, "Ms. Penelope");

        store.clear_history().unwrap();
        assert!(store.history().unwrap().is_empty());
    }
}
