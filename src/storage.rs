use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// Fixed keys for the persisted session values. The access token's presence
/// is the logged-in signal.
pub const KEY_ACCESS_TOKEN: &str = "cinefyra-token";
pub const KEY_REFRESH_TOKEN: &str = "cinefyra-refresh";
pub const KEY_USER_EMAIL: &str = "cinefyra-user";

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// The persisted session triple. Either all three values are present or the
/// session is absent; partial rows never survive a write.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM session_values WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("storage: query session value")
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            bail!("storage: key required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO session_values (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, now_timestamp()],
        )?;
        Ok(())
    }

    /// Writes all three session values in one transaction so a crash never
    /// leaves a partial session behind.
    pub fn save_session(&self, record: &SessionRecord) -> Result<()> {
        if record.access_token.is_empty() || record.refresh_token.is_empty() {
            bail!("storage: session tokens required");
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_timestamp();
        for (key, value) in [
            (KEY_ACCESS_TOKEN, record.access_token.as_str()),
            (KEY_REFRESH_TOKEN, record.refresh_token.as_str()),
            (KEY_USER_EMAIL, record.email.as_str()),
        ] {
            tx.execute(
                r#"
INSERT INTO session_values (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
                params![key, value, now],
            )?;
        }
        tx.commit().context("storage: commit session")
    }

    pub fn load_session(&self) -> Result<Option<SessionRecord>> {
        let access = self.get_value(KEY_ACCESS_TOKEN)?;
        let refresh = self.get_value(KEY_REFRESH_TOKEN)?;
        let email = self.get_value(KEY_USER_EMAIL)?;
        match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Ok(Some(SessionRecord {
                access_token,
                refresh_token,
                email: email.unwrap_or_default(),
            })),
            _ => Ok(None),
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM session_values WHERE key IN (?1, ?2, ?3)",
            params![KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_EMAIL],
        )?;
        Ok(())
    }
}

fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_timestamp()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS session_values (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cinefyra").join("state.db"))
}
