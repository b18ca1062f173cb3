//! In-memory storage for tests and local demos.
//!
//! A [`MemoryDatabase`] holds named tables of values keyed by string. Writes
//! made through a [`MemorySession`] are staged and only become visible to
//! other sessions on commit; rollback discards them.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::SessionError;
use crate::repository::Store;
use crate::session::Session;

type Value = Arc<dyn Any + Send + Sync>;
type Tables = HashMap<String, BTreeMap<String, Value>>;

static DATABASES: LazyLock<Mutex<HashMap<String, Arc<MemoryDatabase>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn poisoned<T>(_: PoisonError<T>) -> SessionError {
    SessionError::Storage("mutex poisoned".into())
}

pub struct MemoryDatabase {
    name: String,
    url: String,
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
}

impl MemoryDatabase {
    /// A database not shared through the process-wide directory.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            url: format!("memory://{name}"),
            name,
            tables: Mutex::new(HashMap::new()),
            fail_commits: AtomicBool::new(false),
        })
    }

    /// The process-wide database called `name`, created on first use.
    pub fn named(name: &str) -> Arc<Self> {
        let mut databases = DATABASES.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            databases
                .entry(name.to_string())
                .or_insert_with(|| Self::new(name)),
        )
    }

    /// Forget the process-wide database called `name`.
    pub fn drop_named(name: &str) {
        let mut databases = DATABASES.lock().unwrap_or_else(PoisonError::into_inner);
        databases.remove(name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make every following commit fail (until switched off again).
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn start_session(self: &Arc<Self>) -> MemorySession {
        MemorySession {
            db: Arc::clone(self),
            staged: Mutex::new(Vec::new()),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, SessionError> {
        self.tables.lock().map_err(poisoned)
    }

    /// Committed value of `table[key]`.
    pub fn get<T: Clone + 'static>(&self, table: &str, key: &str) -> Result<Option<T>, SessionError> {
        let tables = self.tables()?;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .and_then(|value| value.downcast_ref::<T>())
            .cloned())
    }

    /// Number of committed rows in `table`.
    pub fn count(&self, table: &str) -> Result<usize, SessionError> {
        Ok(self.tables()?.get(table).map_or(0, BTreeMap::len))
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase").field("url", &self.url).finish()
    }
}

/// A transaction over a [`MemoryDatabase`].
pub struct MemorySession {
    db: Arc<MemoryDatabase>,
    staged: Mutex<Vec<(String, String, Value)>>,
}

impl MemorySession {
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    fn staged(&self) -> Result<MutexGuard<'_, Vec<(String, String, Value)>>, SessionError> {
        self.staged.lock().map_err(poisoned)
    }

    /// Stage `table[key] = value`.
    pub fn put<T: Send + Sync + 'static>(&self, table: &str, key: &str, value: T) -> Result<(), SessionError> {
        let value: Value = Arc::new(value);
        self.staged()?.push((table.to_string(), key.to_string(), value));
        Ok(())
    }

    /// Value of `table[key]` as seen by this session: the latest staged write,
    /// else the committed value.
    pub fn get<T: Clone + 'static>(&self, table: &str, key: &str) -> Result<Option<T>, SessionError> {
        let staged = self
            .staged()?
            .iter()
            .rev()
            .find(|(t, k, _)| t == table && k == key)
            .map(|(_, _, value)| Arc::clone(value));
        match staged {
            Some(value) => Ok(value.downcast_ref::<T>().cloned()),
            None => self.db.get(table, key),
        }
    }

    pub fn contains(&self, table: &str, key: &str) -> Result<bool, SessionError> {
        let staged = self.staged()?.iter().any(|(t, k, _)| t == table && k == key);
        if staged {
            return Ok(true);
        }
        Ok(self
            .db
            .tables()?
            .get(table)
            .is_some_and(|rows| rows.contains_key(key)))
    }

    /// Number of writes waiting for commit.
    pub fn staged_writes(&self) -> usize {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Session for MemorySession {
    fn url(&self) -> &str {
        self.db.url()
    }

    fn commit(&self) -> Result<(), SessionError> {
        if self.db.fail_commits.load(Ordering::SeqCst) {
            return Err(SessionError::Commit(format!("{} refused the commit", self.db.url)));
        }
        let writes = std::mem::take(&mut *self.staged()?);
        let count = writes.len();
        let mut tables = self.db.tables()?;
        for (table, key, value) in writes {
            tables.entry(table).or_default().insert(key, value);
        }
        debug!(url = self.db.url(), writes = count, "memory session committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), SessionError> {
        let discarded = std::mem::take(&mut *self.staged()?).len();
        debug!(url = self.db.url(), writes = discarded, "memory session rolled back");
        Ok(())
    }
}

/// [`Store`] backed by a [`MemoryDatabase`].
#[derive(Clone, Debug)]
pub struct MemoryStore {
    db: Arc<MemoryDatabase>,
}

impl MemoryStore {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self { db }
    }

    pub fn named(name: &str) -> Self {
        Self::new(MemoryDatabase::named(name))
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }
}

impl Store for MemoryStore {
    type Session = MemorySession;

    fn start_session(&self) -> Result<MemorySession, SessionError> {
        Ok(self.db.start_session())
    }
}
