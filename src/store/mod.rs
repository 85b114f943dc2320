//! Persistence of machine records under `<root>/machines/<name>/config.json`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::driver::MachineRecord;

const MACHINES_DIR: &str = "machines";
const RECORD_FILE_NAME: &str = "config.json";

/// Errors raised while reading or writing machine records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when the machine name cannot be used as a directory name.
    #[error("invalid machine name `{0}`")]
    InvalidName(String),
    /// Raised when no record exists for the machine.
    #[error("machine {name} does not exist in {root}")]
    NotFound {
        /// Machine name.
        name: String,
        /// Storage root searched.
        root: Utf8PathBuf,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a record cannot be encoded or decoded.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Record path.
        path: Utf8PathBuf,
        /// Decoder error text.
        message: String,
    },
}

/// Abstraction over record storage.
pub trait MachineStore {
    /// Returns the directory holding the machine's record and keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for names that are not a single
    /// path component.
    fn machine_dir(&self, name: &str) -> Result<Utf8PathBuf, StoreError>;

    /// Returns `true` when a record exists for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the storage root cannot be inspected.
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Loads the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or an I/O or parse
    /// error.
    fn load(&self, name: &str) -> Result<MachineRecord, StoreError>;

    /// Writes `record`, returning the file path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when encoding or writing fails.
    fn save(&self, record: &MachineRecord) -> Result<Utf8PathBuf, StoreError>;

    /// Deletes the machine directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when deletion fails.
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

/// JSON-file store rooted at a storage directory.
#[derive(Clone, Debug)]
pub struct FileMachineStore {
    root: Utf8PathBuf,
}

impl FileMachineStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn machines_root(&self) -> Utf8PathBuf {
        self.root.join(MACHINES_DIR)
    }

    fn record_path(&self, name: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.machine_dir(name)?.join(RECORD_FILE_NAME))
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
    {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

impl MachineStore for FileMachineStore {
    fn machine_dir(&self, name: &str) -> Result<Utf8PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.machines_root().join(name))
    }

    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let dir_path = self.machine_dir(name)?;
        let dir = match Dir::open_ambient_dir(&dir_path, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(io_error(&dir_path, &err)),
        };
        dir.try_exists(RECORD_FILE_NAME)
            .map_err(|err| io_error(&dir_path.join(RECORD_FILE_NAME), &err))
    }

    fn load(&self, name: &str) -> Result<MachineRecord, StoreError> {
        if !self.exists(name)? {
            return Err(StoreError::NotFound {
                name: name.to_owned(),
                root: self.root.clone(),
            });
        }
        let dir_path = self.machine_dir(name)?;
        let path = dir_path.join(RECORD_FILE_NAME);
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let contents = dir
            .read_to_string(RECORD_FILE_NAME)
            .map_err(|err| io_error(&path, &err))?;
        serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    fn save(&self, record: &MachineRecord) -> Result<Utf8PathBuf, StoreError> {
        let dir_path = self.machine_dir(&record.machine_name)?;
        let path = self.record_path(&record.machine_name)?;
        let contents = serde_json::to_string_pretty(record).map_err(|err| StoreError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;

        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        dir.write(RECORD_FILE_NAME, contents)
            .map_err(|err| io_error(&path, &err))?;
        Ok(path)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let machines = self.machines_root();
        let dir = match Dir::open_ambient_dir(&machines, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(&machines, &err)),
        };
        match dir.remove_dir_all(name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&machines.join(name), &err)),
        }
    }
}
