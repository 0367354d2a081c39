use chrono::Local;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{OptionalExtension, Row, params};

use crate::decision::StatusUpdates;
use crate::error::StoreError;
use crate::status::CharacterStatus;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now_text() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Persistent scene state for one session.
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    pub chat_id: String,
    pub enabled: bool,
    pub location: String,
    pub clothing: String,
    pub scene_description: String,
    pub last_activity: String,
    pub last_update_time: String,
    pub init_time: String,
    pub user_id: String,
}

/// One archived turn.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub location: String,
    pub clothing: String,
    pub scene_description: String,
    pub user_message: String,
    pub bot_reply: String,
}

/// Fields of the scene row that a turn may rewrite. `None` leaves the stored
/// value alone.
#[derive(Debug, Clone, Default)]
pub struct SceneStateUpdate {
    pub location: Option<String>,
    pub clothing: Option<String>,
    pub scene_description: Option<String>,
    pub last_activity: Option<String>,
}

/// SQLite-backed store for scene state, character status, turn history and
/// per-session image preferences.
#[derive(Clone)]
pub struct SceneStore {
    conn: Connection,
}

impl SceneStore {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .await
            .map_err(tokio_rusqlite::Error::from)?;
        let store = SceneStore { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(tokio_rusqlite::Error::from)?;
        let store = SceneStore { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS scene_states (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        chat_id TEXT NOT NULL UNIQUE,
                        enabled INTEGER DEFAULT 0,
                        location TEXT DEFAULT '',
                        clothing TEXT DEFAULT '',
                        scene_description TEXT DEFAULT '',
                        last_activity TEXT DEFAULT '',
                        last_update_time TEXT DEFAULT '',
                        init_time TEXT DEFAULT '',
                        user_id TEXT DEFAULT ''
                    );
                    CREATE TABLE IF NOT EXISTS scene_history (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        chat_id TEXT NOT NULL,
                        timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                        location TEXT DEFAULT '',
                        clothing TEXT DEFAULT '',
                        scene_description TEXT DEFAULT '',
                        user_message TEXT DEFAULT '',
                        bot_reply TEXT DEFAULT ''
                    );
                    CREATE TABLE IF NOT EXISTS character_status (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        chat_id TEXT NOT NULL UNIQUE,
                        body_condition TEXT DEFAULT '{}',
                        physiological_state TEXT DEFAULT '呼吸平稳',
                        vaginal_state TEXT DEFAULT '放松',
                        vaginal_wetness TEXT DEFAULT '正常',
                        vaginal_capacity INTEGER DEFAULT 100,
                        anal_development INTEGER DEFAULT 0,
                        pregnancy_status TEXT DEFAULT '未受孕',
                        pregnancy_source TEXT,
                        pregnancy_counter INTEGER DEFAULT 0,
                        semen_volume INTEGER DEFAULT 0,
                        semen_sources TEXT DEFAULT '[]',
                        vaginal_foreign TEXT DEFAULT '[]',
                        pleasure_value INTEGER DEFAULT 0,
                        pleasure_threshold INTEGER DEFAULT 100,
                        corruption_level INTEGER DEFAULT 0,
                        fetishes TEXT DEFAULT '{}',
                        permanent_mods TEXT DEFAULT '{}',
                        inventory TEXT DEFAULT '[]',
                        updated_at TEXT DEFAULT ''
                    );
                    CREATE TABLE IF NOT EXISTS image_prefs (
                        chat_id TEXT PRIMARY KEY,
                        nai_enabled INTEGER DEFAULT 0
                    );",
                )?;
                Ok(())
            })
            .await?;
        log::info!("[Store] Database schema ready");
        Ok(())
    }

    // ---- scene state ----

    pub async fn get_scene_state(&self, chat_id: &str) -> Result<Option<SceneState>, StoreError> {
        let chat_id = chat_id.to_string();
        let state = self
            .conn
            .call(move |conn| {
                let state = conn
                    .query_row(
                        "SELECT chat_id, enabled, location, clothing, scene_description,
                                last_activity, last_update_time, init_time, user_id
                         FROM scene_states WHERE chat_id = ?1",
                        params![chat_id],
                        scene_state_from_row,
                    )
                    .optional()?;
                Ok(state)
            })
            .await?;
        Ok(state)
    }

    pub async fn is_scene_enabled(&self, chat_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .get_scene_state(chat_id)
            .await?
            .is_some_and(|state| state.enabled))
    }

    /// Creates (or fully replaces) the scene row and enables the scene.
    pub async fn create_scene_state(&self, state: &SceneState) -> Result<(), StoreError> {
        let state = state.clone();
        self.conn
            .call(move |conn| {
                let now = now_text();
                conn.execute(
                    "INSERT OR REPLACE INTO scene_states
                     (chat_id, enabled, location, clothing, scene_description,
                      last_activity, last_update_time, init_time, user_id)
                     VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
                    params![
                        state.chat_id,
                        state.location,
                        state.clothing,
                        state.scene_description,
                        state.last_activity,
                        now,
                        state.user_id
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Rewrites the supplied fields and refreshes the last-update timestamp.
    pub async fn update_scene_state(
        &self,
        chat_id: &str,
        update: SceneStateUpdate,
    ) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if let Some(location) = &update.location {
                    tx.execute(
                        "UPDATE scene_states SET location = ?1 WHERE chat_id = ?2",
                        params![location, chat_id],
                    )?;
                }
                if let Some(clothing) = &update.clothing {
                    tx.execute(
                        "UPDATE scene_states SET clothing = ?1 WHERE chat_id = ?2",
                        params![clothing, chat_id],
                    )?;
                }
                if let Some(scene) = &update.scene_description {
                    tx.execute(
                        "UPDATE scene_states SET scene_description = ?1 WHERE chat_id = ?2",
                        params![scene, chat_id],
                    )?;
                }
                if let Some(activity) = &update.last_activity {
                    tx.execute(
                        "UPDATE scene_states SET last_activity = ?1 WHERE chat_id = ?2",
                        params![activity, chat_id],
                    )?;
                }
                tx.execute(
                    "UPDATE scene_states SET last_update_time = ?1 WHERE chat_id = ?2",
                    params![now_text(), chat_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn enable_scene(&self, chat_id: &str) -> Result<(), StoreError> {
        self.set_scene_enabled(chat_id, true).await
    }

    /// Disables the scene but keeps its state for a later re-enable.
    pub async fn disable_scene(&self, chat_id: &str) -> Result<(), StoreError> {
        self.set_scene_enabled(chat_id, false).await
    }

    async fn set_scene_enabled(&self, chat_id: &str, enabled: bool) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE scene_states SET enabled = ?1 WHERE chat_id = ?2",
                    params![enabled as i64, chat_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Removes the scene row so the session can be re-initialized. Image
    /// preferences live in their own table and survive this.
    pub async fn clear_scene_state(&self, chat_id: &str) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM scene_states WHERE chat_id = ?1",
                    params![chat_id],
                )?;
                Ok(())
            })
            .await?;
        log::info!("[Store] Scene state cleared");
        Ok(())
    }

    // ---- history ----

    pub async fn add_history(
        &self,
        chat_id: &str,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO scene_history
                     (chat_id, timestamp, location, clothing, scene_description,
                      user_message, bot_reply)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        chat_id,
                        if entry.timestamp.is_empty() {
                            now_text()
                        } else {
                            entry.timestamp
                        },
                        entry.location,
                        entry.clothing,
                        entry.scene_description,
                        entry.user_message,
                        entry.bot_reply
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// The most recent `limit` turns, ordered oldest first.
    pub async fn get_recent_history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let chat_id = chat_id.to_string();
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, location, clothing, scene_description,
                            user_message, bot_reply
                     FROM scene_history
                     WHERE chat_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                )?;
                let mut entries = stmt
                    .query_map(params![chat_id, limit as i64], |row| {
                        Ok(HistoryEntry {
                            timestamp: row.get(0)?,
                            location: row.get(1)?,
                            clothing: row.get(2)?,
                            scene_description: row.get(3)?,
                            user_message: row.get(4)?,
                            bot_reply: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                entries.reverse();
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    // ---- character status ----

    pub async fn get_status(
        &self,
        chat_id: &str,
    ) -> Result<Option<CharacterStatus>, StoreError> {
        let chat_id = chat_id.to_string();
        let status = self
            .conn
            .call(move |conn| {
                let status = conn
                    .query_row(
                        "SELECT body_condition, physiological_state, vaginal_state,
                                vaginal_wetness, vaginal_capacity, anal_development,
                                pregnancy_status, pregnancy_source, pregnancy_counter,
                                semen_volume, semen_sources, vaginal_foreign,
                                pleasure_value, pleasure_threshold, corruption_level,
                                fetishes, permanent_mods, inventory
                         FROM character_status WHERE chat_id = ?1",
                        params![chat_id],
                        status_from_row,
                    )
                    .optional()?;
                Ok(status)
            })
            .await?;
        Ok(status)
    }

    /// Seeds the default status row unless one already exists.
    pub async fn init_status_if_absent(&self, chat_id: &str) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO character_status (chat_id, updated_at)
                     VALUES (?1, ?2)",
                    params![chat_id, now_text()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Commits validated updates in one transaction. Numeric fields are
    /// merged additively (pleasure floored at zero), everything else is
    /// replaced.
    pub async fn merge_status(
        &self,
        chat_id: &str,
        updates: &StatusUpdates,
    ) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let chat_id = chat_id.to_string();
        let field_names = updates.field_names();
        let updates = updates.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO character_status (chat_id) VALUES (?1)",
                    params![chat_id],
                )?;

                if let Some(delta) = updates.pleasure_delta {
                    tx.execute(
                        "UPDATE character_status
                         SET pleasure_value = MAX(0, pleasure_value + ?1)
                         WHERE chat_id = ?2",
                        params![delta, chat_id],
                    )?;
                }
                if let Some(delta) = updates.corruption_delta {
                    tx.execute(
                        "UPDATE character_status
                         SET corruption_level = corruption_level + ?1
                         WHERE chat_id = ?2",
                        params![delta, chat_id],
                    )?;
                }
                if let Some(delta) = updates.semen_delta {
                    tx.execute(
                        "UPDATE character_status
                         SET semen_volume = semen_volume + ?1
                         WHERE chat_id = ?2",
                        params![delta, chat_id],
                    )?;
                }
                if let Some(delta) = updates.anal_delta {
                    tx.execute(
                        "UPDATE character_status
                         SET anal_development = anal_development + ?1
                         WHERE chat_id = ?2",
                        params![delta, chat_id],
                    )?;
                }
                if let Some(delta) = updates.capacity_delta {
                    tx.execute(
                        "UPDATE character_status
                         SET vaginal_capacity = vaginal_capacity + ?1
                         WHERE chat_id = ?2",
                        params![delta, chat_id],
                    )?;
                }
                if let Some(text) = &updates.physiological_state {
                    tx.execute(
                        "UPDATE character_status SET physiological_state = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(state) = updates.vaginal_state {
                    tx.execute(
                        "UPDATE character_status SET vaginal_state = ?1 WHERE chat_id = ?2",
                        params![state.to_string(), chat_id],
                    )?;
                }
                if let Some(level) = updates.vaginal_wetness {
                    tx.execute(
                        "UPDATE character_status SET vaginal_wetness = ?1 WHERE chat_id = ?2",
                        params![level.to_string(), chat_id],
                    )?;
                }
                if let Some(status) = updates.pregnancy_status {
                    tx.execute(
                        "UPDATE character_status SET pregnancy_status = ?1 WHERE chat_id = ?2",
                        params![status.to_string(), chat_id],
                    )?;
                }
                if let Some(source) = &updates.pregnancy_source {
                    tx.execute(
                        "UPDATE character_status SET pregnancy_source = ?1 WHERE chat_id = ?2",
                        params![source, chat_id],
                    )?;
                }
                if let Some(counter) = updates.pregnancy_counter {
                    tx.execute(
                        "UPDATE character_status SET pregnancy_counter = ?1 WHERE chat_id = ?2",
                        params![counter, chat_id],
                    )?;
                }
                if let Some(text) = &updates.semen_sources {
                    tx.execute(
                        "UPDATE character_status SET semen_sources = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(text) = &updates.vaginal_foreign {
                    tx.execute(
                        "UPDATE character_status SET vaginal_foreign = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(text) = &updates.inventory {
                    tx.execute(
                        "UPDATE character_status SET inventory = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(text) = &updates.fetishes {
                    tx.execute(
                        "UPDATE character_status SET fetishes = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(text) = &updates.permanent_mods {
                    tx.execute(
                        "UPDATE character_status SET permanent_mods = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }
                if let Some(text) = &updates.body_condition {
                    tx.execute(
                        "UPDATE character_status SET body_condition = ?1 WHERE chat_id = ?2",
                        params![text, chat_id],
                    )?;
                }

                tx.execute(
                    "UPDATE character_status SET updated_at = ?1 WHERE chat_id = ?2",
                    params![now_text(), chat_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        log::debug!("[Store] Status merged: {:?}", field_names);
        Ok(())
    }

    /// Overwrites the absolute pleasure value. Used by idle decay, which
    /// commits outside the per-turn merge.
    pub async fn set_pleasure_value(
        &self,
        chat_id: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE character_status
                     SET pleasure_value = ?1, updated_at = ?2
                     WHERE chat_id = ?3",
                    params![value, now_text(), chat_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Drops the status row; the next init re-seeds the defaults.
    pub async fn clear_status(&self, chat_id: &str) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM character_status WHERE chat_id = ?1",
                    params![chat_id],
                )?;
                Ok(())
            })
            .await?;
        log::info!("[Store] Character status cleared");
        Ok(())
    }

    // ---- image preferences ----

    pub async fn set_nai_enabled(&self, chat_id: &str, enabled: bool) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO image_prefs (chat_id, nai_enabled) VALUES (?1, ?2)
                     ON CONFLICT(chat_id) DO UPDATE SET nai_enabled = ?2",
                    params![chat_id, enabled as i64],
                )?;
                Ok(())
            })
            .await?;
        log::info!("[Store] Image generation set to {}", enabled);
        Ok(())
    }

    pub async fn get_nai_enabled(&self, chat_id: &str) -> Result<bool, StoreError> {
        let chat_id = chat_id.to_string();
        let enabled = self
            .conn
            .call(move |conn| {
                let enabled = conn
                    .query_row(
                        "SELECT nai_enabled FROM image_prefs WHERE chat_id = ?1",
                        params![chat_id],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(enabled.unwrap_or(0) != 0)
            })
            .await?;
        Ok(enabled)
    }
}

fn scene_state_from_row(row: &Row<'_>) -> Result<SceneState, tokio_rusqlite::rusqlite::Error> {
    Ok(SceneState {
        chat_id: row.get(0)?,
        enabled: row.get::<_, i64>(1)? != 0,
        location: row.get(2)?,
        clothing: row.get(3)?,
        scene_description: row.get(4)?,
        last_activity: row.get(5)?,
        last_update_time: row.get(6)?,
        init_time: row.get(7)?,
        user_id: row.get(8)?,
    })
}

// Enum columns fall back to their defaults if a row carries an unknown label.
fn status_from_row(row: &Row<'_>) -> Result<CharacterStatus, tokio_rusqlite::rusqlite::Error> {
    Ok(CharacterStatus {
        body_condition: row.get(0)?,
        physiological_state: row.get(1)?,
        vaginal_state: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or_default(),
        vaginal_wetness: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or_default(),
        vaginal_capacity: row.get(4)?,
        anal_development: row.get(5)?,
        pregnancy_status: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or_default(),
        pregnancy_source: row.get(7)?,
        pregnancy_counter: row.get(8)?,
        semen_volume: row.get(9)?,
        semen_sources: row.get(10)?,
        vaginal_foreign: row.get(11)?,
        pleasure_value: row.get(12)?,
        pleasure_threshold: row.get(13)?,
        corruption_level: row.get(14)?,
        fetishes: row.get(15)?,
        permanent_mods: row.get(16)?,
        inventory: row.get(17)?,
    })
}
