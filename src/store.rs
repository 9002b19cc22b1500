use crate::editor::TableEditor;
use crate::saving;
use crate::table::Table;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifies one browser session; travels in the `session` cookie.
pub type SessionId = Uuid;

/// Sessions untouched for this long are dropped from memory.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    editor: TableEditor,
    touched: Instant,
}

/// Owns one [`TableEditor`] per session.
///
/// When a snapshot directory is set, every mutation rewrites
/// `<dir>/<session>.bin.gz` and sessions missing from memory are restored
/// from there on first use. Sessions idle for longer than the TTL are
/// evicted from memory; their snapshot stays on disk.
///
/// Snapshot files are read and written without holding the session map
/// lock. Writes for one session never go back to an older state.
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Entry>>,
    /// Generation of the newest snapshot written per session.
    written: Mutex<HashMap<SessionId, u64>>,
    generation: AtomicU64,
    snapshot_dir: Option<PathBuf>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(snapshot_dir: Option<PathBuf>, idle_ttl: Duration) -> Self {
        if let Some(dir) = &snapshot_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::error!("Cannot create snapshot directory {}: {}", dir.display(), e);
            }
        }
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            written: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            snapshot_dir,
            idle_ttl,
        }
    }

    pub fn in_memory() -> Self {
        SessionStore::new(None, DEFAULT_IDLE_TTL)
    }

    pub fn new_session_id() -> SessionId {
        Uuid::new_v4()
    }

    /// Number of sessions currently held in memory.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace whatever `session` held with a fresh editor over `table`.
    pub fn begin(&self, session: SessionId, table: Table) {
        let editor = TableEditor::from_table(table);
        let snapshot = self.snapshot_dir.as_ref().map(|_| editor.to_table());
        let generation = {
            let mut sessions = self.sessions();
            sessions.insert(
                session,
                Entry {
                    editor,
                    touched: Instant::now(),
                },
            );
            self.next_generation()
        };
        if let Some(table) = snapshot {
            self.persist(session, generation, &table);
        }
    }

    /// Drop the session's table and its snapshot.
    pub fn clear(&self, session: SessionId) -> bool {
        let removed = self.sessions().remove(&session).is_some();
        let mut deleted = false;
        if let Some(path) = self.snapshot_path(session) {
            let mut written = lock(&self.written);
            written.remove(&session);
            match std::fs::remove_file(&path) {
                Ok(()) => deleted = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::error!("Cannot delete snapshot {}: {}", path.display(), e),
            }
        }
        removed || deleted
    }

    /// Read access to the session's editor.
    pub fn read<R>(&self, session: SessionId, f: impl FnOnce(&TableEditor) -> R) -> Option<R> {
        self.restore(session);
        let mut sessions = self.sessions();
        let entry = sessions.get_mut(&session)?;
        entry.touched = Instant::now();
        Some(f(&entry.editor))
    }

    /// Mutate the session's editor, then snapshot the result.
    pub fn update<R>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut TableEditor) -> R,
    ) -> Option<R> {
        self.restore(session);
        let (result, snapshot, generation) = {
            let mut sessions = self.sessions();
            let entry = sessions.get_mut(&session)?;
            entry.touched = Instant::now();
            let result = f(&mut entry.editor);
            let snapshot = self.snapshot_dir.as_ref().map(|_| entry.editor.to_table());
            (result, snapshot, self.next_generation())
        };
        if let Some(table) = snapshot {
            self.persist(session, generation, &table);
        }
        Some(result)
    }

    pub fn table(&self, session: SessionId) -> Option<Table> {
        self.read(session, TableEditor::to_table)
    }

    /// Drop every session idle for longer than the TTL and return how many
    /// went. Runs on every access; exposed for housekeeping and tests.
    pub fn evict_idle(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        self.evict_locked(&mut sessions)
    }

    fn evict_locked(&self, sessions: &mut HashMap<SessionId, Entry>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.touched.elapsed() <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            log::info!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    /// The session map with idle entries already pruned.
    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        let mut sessions = lock(&self.sessions);
        self.evict_locked(&mut sessions);
        sessions
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot_path(&self, session: SessionId) -> Option<PathBuf> {
        self.snapshot_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.bin.gz", session)))
    }

    /// Load the session's snapshot if it is not in memory.
    fn restore(&self, session: SessionId) {
        if self.sessions().contains_key(&session) {
            return;
        }
        let Some(path) = self.snapshot_path(session) else {
            return;
        };
        if !path.exists() {
            return;
        }
        match saving::load_table(&path) {
            Ok(table) => {
                let editor = TableEditor::from_table(table);
                self.sessions().entry(session).or_insert_with(|| {
                    log::info!("Restored session {} from {}", session, path.display());
                    Entry {
                        editor,
                        touched: Instant::now(),
                    }
                });
            }
            Err(e) => log::error!("Cannot restore snapshot {}: {}", path.display(), e),
        }
    }

    fn persist(&self, session: SessionId, generation: u64, table: &Table) {
        let Some(path) = self.snapshot_path(session) else {
            return;
        };
        let mut written = lock(&self.written);
        if written.get(&session).is_some_and(|&newest| newest >= generation) {
            return;
        }
        match saving::save_table(table, &path) {
            Ok(()) => {
                written.insert(session, generation);
            }
            Err(e) => log::error!("Cannot write snapshot {}: {}", path.display(), e),
        }
        // Only sessions still in memory can produce newer writes.
        let live = lock(&self.sessions);
        written.retain(|id, _| live.contains_key(id));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic mid-edit leaves at worst one half-edited table behind.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;

    fn sample() -> Table {
        table_of(&[&["Date", "Desc"], &["1/1/2024", "coffee"], &["1/2/2024", "bus"]])
    }

    #[test]
    fn unknown_session_has_no_table() {
        let store = SessionStore::in_memory();
        let session = SessionStore::new_session_id();
        assert!(store.table(session).is_none());
        assert!(store.update(session, |editor| editor.delete_row(0)).is_none());
    }

    #[test]
    fn updates_apply_to_owning_session_only() {
        let store = SessionStore::in_memory();
        let first = SessionStore::new_session_id();
        let second = SessionStore::new_session_id();
        store.begin(first, sample());
        store.begin(second, sample());

        assert_eq!(store.update(first, |editor| editor.delete_row(0)), Some(true));

        assert_eq!(store.table(first).unwrap().data_row_count(), 1);
        assert_eq!(store.table(second).unwrap(), sample());
    }

    #[test]
    fn begin_replaces_previous_table() {
        let store = SessionStore::in_memory();
        let session = SessionStore::new_session_id();
        store.begin(session, sample());
        store.update(session, |editor| editor.select_all());

        store.begin(session, table_of(&[&["Other"]]));

        assert_eq!(store.table(session).unwrap(), table_of(&[&["Other"]]));
        assert_eq!(store.read(session, |editor| editor.selection_len()), Some(0));
    }

    #[test]
    fn snapshots_survive_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new_session_id();

        let store = SessionStore::new(Some(dir.path().to_path_buf()), DEFAULT_IDLE_TTL);
        store.begin(session, sample());
        store.update(session, |editor| editor.edit_cell(0, 1, "latte"));
        drop(store);

        let restored = SessionStore::new(Some(dir.path().to_path_buf()), DEFAULT_IDLE_TTL);
        let table = restored.table(session).unwrap();
        assert_eq!(table.data_rows()[0][1], "latte");
    }

    #[test]
    fn clear_removes_table_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new_session_id();
        let store = SessionStore::new(Some(dir.path().to_path_buf()), DEFAULT_IDLE_TTL);
        store.begin(session, sample());

        assert!(store.clear(session));
        assert!(store.table(session).is_none());
        assert!(!dir.path().join(format!("{}.bin.gz", session)).exists());
        assert!(!store.clear(session));
    }

    #[test]
    fn idle_sessions_are_evicted_then_restored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Some(dir.path().to_path_buf()), Duration::from_millis(20));
        let session = SessionStore::new_session_id();
        store.begin(session, sample());
        store.update(session, |editor| editor.delete_row(1));
        assert_eq!(store.len(), 1);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.evict_idle(), 1);
        assert!(store.is_empty());

        let table = store.table(session).unwrap();
        assert_eq!(table.data_row_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn idle_sessions_without_snapshots_are_gone() {
        let store = SessionStore::new(None, Duration::from_millis(20));
        let stale = SessionStore::new_session_id();
        store.begin(stale, sample());

        std::thread::sleep(Duration::from_millis(60));
        let fresh = SessionStore::new_session_id();
        store.begin(fresh, sample());

        assert_eq!(store.len(), 1);
        assert!(store.table(stale).is_none());
        assert!(store.table(fresh).is_some());
    }

    #[test]
    fn older_snapshot_never_overwrites_newer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Some(dir.path().to_path_buf()), DEFAULT_IDLE_TTL);
        let session = SessionStore::new_session_id();
        store.begin(session, sample());
        store.update(session, |editor| editor.edit_cell(0, 1, "latte"));

        store.persist(session, 1, &sample());

        let path = dir.path().join(format!("{}.bin.gz", session));
        let on_disk = saving::load_table(&path).unwrap();
        assert_eq!(on_disk.data_rows()[0][1], "latte");
    }
}
