//! Local SSH key material for machines.
//!
//! Keys live beside the machine record at `<machine dir>/id_rsa` and
//! `id_rsa.pub`. Generation shells out to `ssh-keygen`; reads and writes go
//! through `cap-std` so the key files can be restricted to the owner.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::command::{CommandRunner, ProcessCommandRunner, SpawnError};

const KEYGEN_PROGRAM: &str = "ssh-keygen";
const KEY_BITS: &str = "2048";

/// Errors raised while generating, reading or writing key files.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyStoreError {
    /// Raised when a file operation fails.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Operating system error text.
        message: String,
    },
    /// Raised when a key path has no file name.
    #[error("invalid key path {0}")]
    InvalidPath(Utf8PathBuf),
    /// Raised when the key generator cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when the key generator exits unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    Generator {
        /// Program name.
        program: String,
        /// Exit status, or `unknown` when killed by a signal.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Key material operations the driver needs.
pub trait KeyStore {
    /// Generates a fresh RSA key pair at `private_key_path` and returns the
    /// public key in OpenSSH format. A complete pair already at that path is
    /// reused instead, so an interrupted creation can resume.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError`] when generation or reading the public key
    /// fails.
    fn generate(&self, private_key_path: &Utf8Path) -> Result<String, KeyStoreError>;

    /// Reads a private key file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Io`] when the file cannot be read.
    fn read_private_key(&self, path: &Utf8Path) -> Result<Vec<u8>, KeyStoreError>;

    /// Writes both halves of a key pair, owner-readable only.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Io`] when either file cannot be written.
    fn write_key_pair(
        &self,
        private_key_path: &Utf8Path,
        private_key: &[u8],
        public_key: &[u8],
    ) -> Result<(), KeyStoreError>;
}

/// Returns the public key path that accompanies `private_key_path`.
#[must_use]
pub fn public_key_path(private_key_path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{private_key_path}.pub"))
}

/// [`KeyStore`] backed by the filesystem and `ssh-keygen`.
#[derive(Clone, Debug, Default)]
pub struct SshKeygenStore<R: CommandRunner> {
    runner: R,
}

impl SshKeygenStore<ProcessCommandRunner> {
    /// Creates a store that spawns the real `ssh-keygen`.
    #[must_use]
    pub const fn with_process_runner() -> Self {
        Self::new(ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshKeygenStore<R> {
    /// Creates a store using the supplied runner.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> KeyStore for SshKeygenStore<R> {
    fn generate(&self, private_key_path: &Utf8Path) -> Result<String, KeyStoreError> {
        let (parent, _) = split_path(private_key_path)?;
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| io_error(parent, &err))?;
        if let Some(public) = existing_public_key(private_key_path)? {
            return Ok(public);
        }

        let args: Vec<OsString> = [
            "-t",
            "rsa",
            "-b",
            KEY_BITS,
            "-N",
            "",
            "-q",
            "-f",
            private_key_path.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        let output = self.runner.run(KEYGEN_PROGRAM, &args)?;
        if !output.is_success() {
            return Err(KeyStoreError::Generator {
                program: KEYGEN_PROGRAM.to_owned(),
                status: output
                    .code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                stderr: output.stderr,
            });
        }

        let public = read_file(&public_key_path(private_key_path))?;
        Ok(decode_public_key(&public))
    }

    fn read_private_key(&self, path: &Utf8Path) -> Result<Vec<u8>, KeyStoreError> {
        read_file(path)
    }

    fn write_key_pair(
        &self,
        private_key_path: &Utf8Path,
        private_key: &[u8],
        public_key: &[u8],
    ) -> Result<(), KeyStoreError> {
        write_private_file(private_key_path, private_key)?;
        write_private_file(&public_key_path(private_key_path), public_key)
    }
}

fn io_error(path: &Utf8Path, err: &std::io::Error) -> KeyStoreError {
    KeyStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), KeyStoreError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| KeyStoreError::InvalidPath(path.to_path_buf()))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, file_name))
}

fn decode_public_key(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

/// Returns the public half of a pair left by an earlier run, if both files
/// are present. `ssh-keygen` would otherwise prompt to overwrite them.
fn existing_public_key(private_key_path: &Utf8Path) -> Result<Option<String>, KeyStoreError> {
    let (parent, file_name) = split_path(private_key_path)?;
    let public_path = public_key_path(private_key_path);
    let (_, public_name) = split_path(&public_path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    if !(dir.is_file(file_name) && dir.is_file(public_name)) {
        return Ok(None);
    }
    let public = dir
        .read(public_name)
        .map_err(|err| io_error(&public_path, &err))?;
    Ok(Some(decode_public_key(&public)))
}

fn read_file(path: &Utf8Path) -> Result<Vec<u8>, KeyStoreError> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(path, &err))?;
    dir.read(file_name).map_err(|err| io_error(path, &err))
}

fn write_private_file(path: &Utf8Path, contents: &[u8]) -> Result<(), KeyStoreError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(path, &err))?;
    dir.write(file_name, contents)
        .map_err(|err| io_error(path, &err))?;
    restrict_to_owner(&dir, file_name).map_err(|err| io_error(path, &err))
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Dir, file_name: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = cap_std::fs::Permissions::from_std(std::fs::Permissions::from_mode(0o600));
    dir.set_permissions(file_name, permissions)
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Dir, _file_name: &str) -> std::io::Result<()> {
    Ok(())
}
