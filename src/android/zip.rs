use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Component, Path};
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

/// Result alias for APK (ZIP) operations.
pub type ApkZipResult<T> = Result<T, ApkZipError>;

/// Errors surfaced by the APK packing/unpacking helpers.
#[derive(Debug)]
pub enum ApkZipError {
    Io(io::Error),
    Zip(zip::result::ZipError),
    InvalidInput(String),
    /// The archive has no entry with this name.
    MissingEntry(String),
}

impl std::fmt::Display for ApkZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApkZipError::Io(err) => write!(f, "I/O error: {err}"),
            ApkZipError::Zip(err) => write!(f, "ZIP error: {err}"),
            ApkZipError::InvalidInput(msg) => write!(f, "{msg}"),
            ApkZipError::MissingEntry(name) => write!(f, "no entry named {name}"),
        }
    }
}

impl std::error::Error for ApkZipError {}

impl From<io::Error> for ApkZipError {
    fn from(value: io::Error) -> Self {
        ApkZipError::Io(value)
    }
}

impl From<zip::result::ZipError> for ApkZipError {
    fn from(value: zip::result::ZipError) -> Self {
        ApkZipError::Zip(value)
    }
}

/// Read access to the files of an archive.
///
/// [`crate::android::apk::Apk`] only needs these two operations, so tests and
/// callers holding the entries in memory can skip the ZIP layer entirely.
pub trait ArchiveReader {
    /// Names of all file entries.
    fn list_files(&self) -> Vec<String>;

    fn read_file(&self, name: &str) -> ApkZipResult<Vec<u8>>;
}

impl ArchiveReader for BTreeMap<String, Vec<u8>> {
    fn list_files(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn read_file(&self, name: &str) -> ApkZipResult<Vec<u8>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ApkZipError::MissingEntry(name.to_string()))
    }
}

/// Compression preference for an APK entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApkCompression {
    Stored,
    Deflated,
}

/// A single file entry stored in [`ApkFile`].
#[derive(Clone, Debug)]
pub struct ApkEntry {
    pub data: Vec<u8>,
    pub unix_mode: Option<u32>,
    pub compression: Option<ApkCompression>,
}

impl ApkEntry {
    pub fn new(data: Vec<u8>) -> Self {
        ApkEntry {
            data,
            unix_mode: None,
            compression: None,
        }
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.unix_mode = mode;
        self
    }

    pub fn with_compression(mut self, compression: Option<ApkCompression>) -> Self {
        self.compression = compression;
        self
    }
}

/// An in-memory APK.
///
/// Entries live in a `BTreeMap` so listing and re-writing are deterministic.
#[derive(Clone, Debug, Default)]
pub struct ApkFile {
    entries: BTreeMap<String, ApkEntry>,
}

impl ApkFile {
    pub fn new() -> Self {
        ApkFile {
            entries: BTreeMap::new(),
        }
    }

    /// Load an APK from disk into memory.
    pub fn from_file(path: impl AsRef<Path>) -> ApkZipResult<Self> {
        let path = path.as_ref();
        debug!("loading apk {}", path.display());
        Self::from_reader(File::open(path)?)
    }

    pub fn from_bytes(data: &[u8]) -> ApkZipResult<Self> {
        Self::from_reader(Cursor::new(data))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> ApkZipResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = BTreeMap::new();
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            if entry.is_dir() {
                continue;
            }
            let Some(enclosed) = entry.enclosed_name() else {
                warn!("skipping entry with unsafe name [{}]", entry.name());
                continue;
            };
            let name = path_to_entry_name(&enclosed)?;
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            let compression = match entry.compression() {
                CompressionMethod::Stored => Some(ApkCompression::Stored),
                CompressionMethod::Deflated => Some(ApkCompression::Deflated),
                _ => None,
            };
            let apk_entry = ApkEntry::new(data)
                .with_mode(entry.unix_mode())
                .with_compression(compression);
            entries.insert(name, apk_entry);
        }
        debug!("loaded {} apk entries", entries.len());
        Ok(ApkFile { entries })
    }

    /// Serialize the APK into a ZIP byte buffer.
    pub fn to_bytes(&self) -> ApkZipResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, entry) in &self.entries {
            writer.start_file(name.as_str(), entry_options(name, entry))?;
            writer.write_all(&entry.data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Serialize the APK back to disk as a ZIP/APK file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> ApkZipResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Iterate over entry names.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Borrow an entry by name (e.g., `AndroidManifest.xml`).
    pub fn entry(&self, name: &str) -> Option<&ApkEntry> {
        self.entries.get(name)
    }

    /// Replace the contents of an entry (or add a new entry).
    ///
    /// An existing entry keeps its mode and compression.
    pub fn replace_entry(&mut self, name: impl AsRef<str>, data: Vec<u8>) -> ApkZipResult<()> {
        let normalized = normalize_entry_name(name.as_ref())?;
        match self.entries.get_mut(&normalized) {
            Some(entry) => entry.data = data,
            None => {
                self.entries.insert(normalized, ApkEntry::new(data));
            }
        }
        Ok(())
    }

    /// Remove an entry by name.
    pub fn remove_entry(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }
}

impl ArchiveReader for ApkFile {
    fn list_files(&self) -> Vec<String> {
        self.entry_names().map(str::to_string).collect()
    }

    fn read_file(&self, name: &str) -> ApkZipResult<Vec<u8>> {
        self.entry(name)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| ApkZipError::MissingEntry(name.to_string()))
    }
}

fn entry_options(name: &str, entry: &ApkEntry) -> SimpleFileOptions {
    let compression = entry.compression.unwrap_or_else(|| default_compression(name));
    let options = match compression {
        ApkCompression::Stored => SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .with_alignment(4),
        ApkCompression::Deflated => {
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
        }
    };
    match entry.unix_mode {
        Some(mode) => options.unix_permissions(mode),
        None => options,
    }
}

fn default_compression(name: &str) -> ApkCompression {
    let lower = name.to_ascii_lowercase();
    let stored = lower.ends_with(".arsc")
        || lower.ends_with(".so")
        || matches!(
            lower.rsplit('.').next(),
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "mp3" | "ogg" | "wav" | "mp4")
        );
    if stored {
        ApkCompression::Stored
    } else {
        ApkCompression::Deflated
    }
}

fn path_to_entry_name(path: &Path) -> ApkZipResult<String> {
    let mut components = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(part) => components.push(part.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ApkZipError::InvalidInput(format!(
                    "invalid entry path component in {}",
                    path.display()
                )));
            }
            Component::ParentDir => {
                return Err(ApkZipError::InvalidInput(
                    "entry paths may not contain parent components".to_string(),
                ));
            }
        }
    }
    if components.is_empty() {
        return Err(ApkZipError::InvalidInput(
            "entry name must not be empty".to_string(),
        ));
    }
    Ok(components.join("/"))
}

fn normalize_entry_name(name: &str) -> ApkZipResult<String> {
    path_to_entry_name(Path::new(name))
}
