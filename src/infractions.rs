//! # Infraction Ledger
//!
//! Append-only record of moderation actions, backed by a single SQLite
//! connection. Every infraction gets a short random id that is unique across
//! the whole ledger.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: `close()` for orderly shutdown, pluggable id generator
//! - 1.0.0: Initial ledger with scoped queries

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use sqlite::{Connection, State, Statement};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Length of generated infraction ids
pub const INFRACTION_ID_LEN: usize = 8;

/// Primary result code SQLite reports for constraint violations
const SQLITE_CONSTRAINT: isize = 19;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("infraction store is closed")]
    Closed,
    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlite::Error),
    #[error("corrupt infraction row: {0}")]
    CorruptRow(String),
}

/// The closed set of moderation actions the ledger records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfractionKind {
    Warn,
    Mute,
    Kick,
    Ban,
    Timeout,
}

impl InfractionKind {
    pub const ALL: [InfractionKind; 5] = [
        InfractionKind::Warn,
        InfractionKind::Mute,
        InfractionKind::Kick,
        InfractionKind::Ban,
        InfractionKind::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InfractionKind::Warn => "WARN",
            InfractionKind::Mute => "MUTE",
            InfractionKind::Kick => "KICK",
            InfractionKind::Ban => "BAN",
            InfractionKind::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for InfractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InfractionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown infraction type '{}'", s))
    }
}

/// A single recorded moderation action. Values handed out by the store are
/// owned copies of the persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infraction {
    pub id: String,
    pub user_id: String,
    pub guild_id: String,
    pub moderator_id: String,
    pub kind: InfractionKind,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Generate a random `[A-Za-z0-9]{8}` infraction id
pub fn generate_infraction_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INFRACTION_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct InfractionStore {
    // `None` once closed
    connection: Arc<Mutex<Option<Connection>>>,
    id_generator: IdGenerator,
}

impl InfractionStore {
    /// Open (or create) the ledger at `database_path`, creating the parent
    /// directory when it does not exist yet.
    pub async fn open(database_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("📁 Created data directory: {}", parent.display());
            }
        }

        let connection = sqlite::open(database_path)?;
        let store = Self::from_connection(connection);
        store.init_tables().await?;
        info!("🗃️ Infraction store initialized at: {}", database_path);
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::from_connection(sqlite::open(":memory:")?);
        store.init_tables().await?;
        Ok(store)
    }

    fn from_connection(connection: Connection) -> Self {
        InfractionStore {
            connection: Arc::new(Mutex::new(Some(connection))),
            id_generator: Arc::new(generate_infraction_id),
        }
    }

    /// Replace the id generator. Useful for forcing collisions in tests.
    pub fn with_id_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        conn.execute("PRAGMA synchronous = FULL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS infractions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                guild_id TEXT NOT NULL,
                moderator_id TEXT NOT NULL,
                type TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_infractions_user_guild
             ON infractions(user_id, guild_id)",
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_infractions_type
             ON infractions(type)",
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_infractions_created_at
             ON infractions(created_at)",
        )?;

        Ok(())
    }

    /// Record a new infraction and return its id.
    ///
    /// The existence check is only a fast path; the `PRIMARY KEY` constraint
    /// on `id` is what guarantees uniqueness, and a violation just means
    /// another candidate gets drawn.
    pub async fn add_infraction(
        &self,
        user_id: &str,
        guild_id: &str,
        moderator_id: &str,
        kind: InfractionKind,
        reason: &str,
    ) -> Result<String, StoreError> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let created_at = Utc::now().timestamp_millis();

        loop {
            let id = (self.id_generator)();

            if id_exists(conn, &id)? {
                debug!("Infraction id {} already taken, regenerating", id);
                continue;
            }

            let mut statement = conn.prepare(
                "INSERT INTO infractions (id, user_id, guild_id, moderator_id, type, reason, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, id.as_str()))?;
            statement.bind((2, user_id))?;
            statement.bind((3, guild_id))?;
            statement.bind((4, moderator_id))?;
            statement.bind((5, kind.as_str()))?;
            statement.bind((6, reason))?;
            statement.bind((7, created_at))?;

            match statement.next() {
                Ok(_) => {
                    info!(
                        "Recorded {} infraction {} for user {} in guild {}",
                        kind, id, user_id, guild_id
                    );
                    return Ok(id);
                }
                Err(e) if is_constraint_violation(&e) => {
                    warn!("Infraction id {} rejected by unique constraint, regenerating", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All infractions for a subject within a guild, newest first.
    pub async fn get_user_infractions(
        &self,
        user_id: &str,
        guild_id: &str,
        kind: Option<InfractionKind>,
    ) -> Result<Vec<Infraction>, StoreError> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut statement = conn.prepare(
            "SELECT id, user_id, guild_id, moderator_id, type, reason, created_at
             FROM infractions
             WHERE user_id = ? AND guild_id = ? AND (? = '' OR type = ?)
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let kind_filter = kind.map(|k| k.as_str()).unwrap_or("");
        statement.bind((1, user_id))?;
        statement.bind((2, guild_id))?;
        statement.bind((3, kind_filter))?;
        statement.bind((4, kind_filter))?;

        let mut infractions = Vec::new();
        while let State::Row = statement.next()? {
            infractions.push(read_infraction(&statement)?);
        }
        Ok(infractions)
    }

    pub async fn get_infraction_count(
        &self,
        user_id: &str,
        guild_id: &str,
        kind: Option<InfractionKind>,
    ) -> Result<i64, StoreError> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut statement = conn.prepare(
            "SELECT COUNT(*) FROM infractions
             WHERE user_id = ? AND guild_id = ? AND (? = '' OR type = ?)",
        )?;
        let kind_filter = kind.map(|k| k.as_str()).unwrap_or("");
        statement.bind((1, user_id))?;
        statement.bind((2, guild_id))?;
        statement.bind((3, kind_filter))?;
        statement.bind((4, kind_filter))?;

        match statement.next()? {
            State::Row => Ok(statement.read::<i64, _>(0)?),
            State::Done => Ok(0),
        }
    }

    pub async fn get_infraction_by_id(&self, id: &str) -> Result<Option<Infraction>, StoreError> {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut statement = conn.prepare(
            "SELECT id, user_id, guild_id, moderator_id, type, reason, created_at
             FROM infractions WHERE id = ?",
        )?;
        statement.bind((1, id))?;

        match statement.next()? {
            State::Row => Ok(Some(read_infraction(&statement)?)),
            State::Done => Ok(None),
        }
    }

    /// Release the underlying connection. Safe to call more than once; every
    /// later operation fails with [`StoreError::Closed`].
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        if guard.take().is_some() {
            info!("🗃️ Infraction store closed");
        } else {
            debug!("Infraction store already closed");
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.connection.lock().await.is_none()
    }
}

fn id_exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let mut statement = conn.prepare("SELECT 1 FROM infractions WHERE id = ?")?;
    statement.bind((1, id))?;
    Ok(matches!(statement.next()?, State::Row))
}

fn is_constraint_violation(error: &sqlite::Error) -> bool {
    // extended codes carry the primary code in the low byte
    error.code.map(|code| code & 0xff) == Some(SQLITE_CONSTRAINT)
}

fn read_infraction(statement: &Statement<'_>) -> Result<Infraction, StoreError> {
    let id = statement.read::<String, _>("id")?;
    let kind_text = statement.read::<String, _>("type")?;
    let kind = kind_text
        .parse::<InfractionKind>()
        .map_err(|e| StoreError::CorruptRow(format!("{}: {}", id, e)))?;
    let created_millis = statement.read::<i64, _>("created_at")?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_millis)
        .ok_or_else(|| StoreError::CorruptRow(format!("{}: bad timestamp {}", id, created_millis)))?;

    Ok(Infraction {
        user_id: statement.read::<String, _>("user_id")?,
        guild_id: statement.read::<String, _>("guild_id")?,
        moderator_id: statement.read::<String, _>("moderator_id")?,
        reason: statement.read::<String, _>("reason")?,
        id,
        kind,
        created_at,
    })
}
