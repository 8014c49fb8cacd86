//! File-backed task store.
//!
//! Records live in a single JSON-lines file. Every call re-reads the file
//! under an advisory lock on a sibling `.lock` file, so schedulers holding
//! separate handles (or running in separate processes) see each other's
//! `state` and `running` updates. Writes hold the lock exclusively for the
//! whole read-modify-write and replace the file through a fresh temporary
//! file in the same directory.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fd_lock::RwLock as FileLock;
use tempfile::NamedTempFile;

use crate::core::{Task, TaskField, TaskId, TaskSelector, TaskStore, TaskerError};

type Records = BTreeMap<TaskId, Task>;

/// JSON-lines task store.
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    lock_path: PathBuf,
}

fn backend(e: impl std::fmt::Display) -> TaskerError {
    TaskerError::Backend(e.to_string())
}

impl JsonFileTaskStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TaskerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(backend)?;
        }
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        let store = Self {
            path,
            lock_path: PathBuf::from(lock_path),
        };
        // Fail early on an unreadable file.
        store.read(drop)?;
        Ok(store)
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<FileLock<File>, TaskerError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(backend)?;
        Ok(FileLock::new(file))
    }

    fn read<T>(&self, f: impl FnOnce(Records) -> T) -> Result<T, TaskerError> {
        let lock = self.lock_file()?;
        let _shared = lock.read().map_err(backend)?;
        Ok(f(self.load()?))
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut Records) -> Result<T, TaskerError>,
    ) -> Result<T, TaskerError> {
        let mut lock = self.lock_file()?;
        let _exclusive = lock.write().map_err(backend)?;
        let mut tasks = self.load()?;
        let out = f(&mut tasks)?;
        self.persist(&tasks)?;
        Ok(out)
    }

    fn load(&self) -> Result<Records, TaskerError> {
        let mut tasks = BTreeMap::new();
        if !self.path.exists() {
            return Ok(tasks);
        }
        let file = File::open(&self.path).map_err(backend)?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(backend)?;
            if line.trim().is_empty() {
                continue;
            }
            let task: Task = serde_json::from_str(&line)?;
            tasks.insert(task.id, task);
        }
        Ok(tasks)
    }

    fn persist(&self, tasks: &Records) -> Result<(), TaskerError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(backend)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for task in tasks.values() {
                serde_json::to_writer(&mut out, task)?;
                out.write_all(b"\n").map_err(backend)?;
            }
            out.flush().map_err(backend)?;
        }
        tmp.as_file().sync_all().map_err(backend)?;
        tmp.persist(&self.path).map_err(|e| {
            TaskerError::Backend(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

impl TaskStore for JsonFileTaskStore {
    fn insert(&self, mut task: Task) -> Result<Task, TaskerError> {
        self.update(|tasks| {
            task.id = tasks.keys().next_back().map_or(1, |last| last + 1);
            tasks.insert(task.id, task.clone());
            Ok(task)
        })
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskerError> {
        self.read(|mut tasks| tasks.remove(&id))
    }

    fn find(&self, selector: &TaskSelector) -> Result<Vec<Task>, TaskerError> {
        self.read(|tasks| {
            tasks
                .into_values()
                .filter(|t| selector.matches(t))
                .collect()
        })
    }

    fn save(&self, task: &Task, fields: Option<&[TaskField]>) -> Result<(), TaskerError> {
        self.update(|tasks| {
            let stored = tasks.get_mut(&task.id).ok_or(TaskerError::NotFound(task.id))?;
            match fields {
                Some(fields) => stored.copy_fields(task, fields),
                None => *stored = task.clone(),
            }
            Ok(())
        })
    }
}
