//! File-backed secret store.
//!
//! The whole store is one YAML document mapping secret names to value lists.
//! Writes replace the file through a temp-file-then-rename sequence, so a
//! crash mid-write never leaves a mix of old and new bytes; at worst the new
//! write is lost. There is no cross-process locking — concurrent writers
//! race and the last rename wins.

pub mod sort;

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use common::record::{EntryMap, Key, ValueList, KEY_TEMPLATE_NAME};
use common::{Error, NotFound, Result};

/// Stores an [`EntryMap`] in a YAML file on local disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// A store reading and writing `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing filename.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in the file.
    ///
    /// # Errors
    ///
    /// A missing file is [`NotFound::Store`] — distinct from [`Error::Format`],
    /// which reports a file that exists but cannot be parsed.
    pub fn get_all(&self) -> Result<EntryMap> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(NotFound::Store(self.path.clone()).into());
            }
            Err(err) => return Err(err.into()),
        };
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(EntryMap::new());
        }
        serde_yaml::from_slice(&contents).map_err(|err| Error::Format(err.to_string()))
    }

    /// The values stored under `name`.
    pub fn get(&self, name: &str) -> Result<ValueList> {
        self.get_all()?
            .remove(name)
            .ok_or_else(|| NotFound::Name(name.to_string()).into())
    }

    /// Store `values` under `name`, replacing any previous entry.
    ///
    /// Read-modify-write of the entire map: the new document is written to a
    /// sibling temp file, flushed, and renamed over the original.
    pub fn put(&self, name: &str, values: ValueList) -> Result<()> {
        let mut entries = match self.get_all() {
            Ok(entries) => entries,
            Err(err) if err.is_store_missing() => EntryMap::new(),
            Err(err) => return Err(err),
        };
        entries.insert(name.to_string(), values);

        let output =
            serde_yaml::to_string(&entries).map_err(|err| Error::Format(err.to_string()))?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)?;
        file.write_all(output.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// The keys named by the template entry.
    ///
    /// # Errors
    ///
    /// [`NotFound::Template`] when the file exists but has no template entry.
    pub fn get_key_ids(&self) -> Result<Vec<Key>> {
        let mut entries = self.get_all()?;
        let template = entries
            .remove(KEY_TEMPLATE_NAME)
            .ok_or(NotFound::Template)?;
        Ok(template.into_iter().map(|value| value.key).collect())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
