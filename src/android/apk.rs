//! Manifest-level queries and patches on an APK.
//!
//! [`Apk`] reads `AndroidManifest.xml` through an [`ArchiveReader`] on every
//! call and answers questions about it with the binary XML helpers.

use crate::android::binary_xml::{
    self, BinaryXmlError, APPLICATION_TAG, MANIFEST_TAG,
};
use crate::android::zip::{ApkFile, ApkZipError, ArchiveReader};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ANDROID_MANIFEST: &str = "AndroidManifest.xml";

const DEBUGGABLE_ATTRIBUTE: &str = "debuggable";
const PACKAGE_ATTRIBUTE: &str = "package";
const VERSION_CODE_ATTRIBUTE: &str = "versionCode";
const VERSION_NAME_ATTRIBUTE: &str = "versionName";

/// Result alias for manifest-level operations.
pub type ApkResult<T> = Result<T, ApkError>;

#[derive(Debug)]
pub enum ApkError {
    /// The archive could not be read, or has no (or an empty) manifest.
    MissingManifest(String),
    /// The manifest is not a readable binary XML document.
    InvalidManifest(BinaryXmlError),
    /// The manifest lacks an element the operation needs.
    MalformedManifest(String),
    Archive(ApkZipError),
    Io(io::Error),
}

impl std::fmt::Display for ApkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApkError::MissingManifest(apk) => write!(f, "No {ANDROID_MANIFEST} in {apk}"),
            ApkError::InvalidManifest(err) => write!(f, "{err}"),
            ApkError::MalformedManifest(msg) => write!(f, "Malformed manifest: {msg}"),
            ApkError::Archive(err) => write!(f, "{err}"),
            ApkError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for ApkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApkError::InvalidManifest(err) => Some(err),
            ApkError::Archive(err) => Some(err),
            ApkError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BinaryXmlError> for ApkError {
    fn from(value: BinaryXmlError) -> Self {
        match value {
            BinaryXmlError::MalformedManifest(msg) => ApkError::MalformedManifest(msg),
            invalid @ BinaryXmlError::InvalidDocument(_) => ApkError::InvalidManifest(invalid),
        }
    }
}

impl From<ApkZipError> for ApkError {
    fn from(value: ApkZipError) -> Self {
        ApkError::Archive(value)
    }
}

impl From<io::Error> for ApkError {
    fn from(value: io::Error) -> Self {
        ApkError::Io(value)
    }
}

/// Summary handed to front ends. Only `valid` is set for invalid APKs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkProperties {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debuggable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
}

pub struct Apk<A: ArchiveReader> {
    archive: A,
    label: String,
}

impl Apk<ApkFile> {
    /// Opens an APK from disk. An unreadable archive is reported as a
    /// missing manifest.
    pub fn open(path: impl AsRef<Path>) -> ApkResult<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();
        match ApkFile::from_file(path) {
            Ok(archive) => Ok(Apk::new(archive, label)),
            Err(err) => {
                warn!("unable to read [{label}]: {err}");
                Err(ApkError::MissingManifest(label))
            }
        }
    }

    /// Writes a copy of the APK whose manifest has `debuggable="true"`.
    pub fn write_debuggable(&self, output: impl AsRef<Path>) -> ApkResult<()> {
        let manifest = self.make_debuggable()?;
        let mut patched = self.archive.clone();
        patched.replace_entry(ANDROID_MANIFEST, manifest)?;
        patched.write_to_file(output.as_ref())?;
        info!("wrote debuggable apk to {}", output.as_ref().display());
        Ok(())
    }
}

impl<A: ArchiveReader> Apk<A> {
    /// `label` names the APK in logs and errors, usually its path.
    pub fn new(archive: A, label: impl Into<String>) -> Self {
        Apk {
            archive,
            label: label.into(),
        }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn manifest(&self) -> ApkResult<Vec<u8>> {
        let contents = match self.archive.read_file(ANDROID_MANIFEST) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("unable to find manifest in [{}]: {err}", self.label);
                return Err(ApkError::MissingManifest(self.label.clone()));
            }
        };
        if contents.is_empty() {
            warn!("unable to read manifest of [{}]", self.label);
            return Err(ApkError::MissingManifest(self.label.clone()));
        }
        Ok(contents)
    }

    fn manifest_with_application(&self) -> ApkResult<Vec<u8>> {
        let manifest = self.manifest()?;
        if !binary_xml::has_element(&manifest, APPLICATION_TAG)? {
            warn!("unable to find application tag in [{}]", self.label);
            return Err(ApkError::MalformedManifest(format!(
                "no <{APPLICATION_TAG}> in {}",
                self.label
            )));
        }
        Ok(manifest)
    }

    /// An APK is valid when its manifest declares `<application>`.
    pub fn is_valid(&self) -> ApkResult<bool> {
        let manifest = self.manifest()?;
        Ok(binary_xml::is_valid_manifest(&manifest)?)
    }

    pub fn is_debuggable(&self) -> ApkResult<bool> {
        let manifest = self.manifest_with_application()?;
        let attributes = binary_xml::get_element_attributes(&manifest, &[APPLICATION_TAG])?;
        Ok(attributes
            .get(DEBUGGABLE_ATTRIBUTE)
            .is_some_and(|value| value == "true"))
    }

    /// Returns the manifest with `debuggable="true"` set on `<application>`.
    /// The archive itself is left untouched.
    pub fn make_debuggable(&self) -> ApkResult<Vec<u8>> {
        let manifest = self.manifest_with_application()?;
        let patched =
            binary_xml::set_attribute(&manifest, &[APPLICATION_TAG], DEBUGGABLE_ATTRIBUTE, "true")?;
        info!("made [{}] debuggable", self.label);
        Ok(patched)
    }

    /// The manifest rendered as XML text.
    pub fn android_manifest(&self) -> ApkResult<String> {
        let manifest = self.manifest()?;
        Ok(binary_xml::render_as_xml_text(&manifest)?)
    }

    fn manifest_attribute(&self, name: &str) -> ApkResult<String> {
        let manifest = self.manifest()?;
        let attributes = binary_xml::get_element_attributes(&manifest, &[MANIFEST_TAG])?;
        Ok(attributes.get(name).cloned().unwrap_or_default())
    }

    /// Empty when `<manifest>` has no `package`.
    pub fn package_name(&self) -> ApkResult<String> {
        self.manifest_attribute(PACKAGE_ATTRIBUTE)
    }

    pub fn version_name(&self) -> ApkResult<String> {
        self.manifest_attribute(VERSION_NAME_ATTRIBUTE)
    }

    pub fn version_code(&self) -> ApkResult<String> {
        self.manifest_attribute(VERSION_CODE_ATTRIBUTE)
    }

    pub fn files(&self) -> Vec<String> {
        self.archive.list_files()
    }

    pub fn file_content(&self, name: &str) -> ApkResult<Vec<u8>> {
        Ok(self.archive.read_file(name)?)
    }

    /// Collects everything a front end shows about the APK.
    ///
    /// A manifest that cannot be decoded yields `valid: false`; a missing one
    /// is still an error.
    pub fn properties(&self) -> ApkResult<ApkProperties> {
        let valid = match self.is_valid() {
            Ok(valid) => valid,
            Err(ApkError::InvalidManifest(err)) => {
                warn!("[{}] has an unreadable manifest: {err}", self.label);
                false
            }
            Err(err) => return Err(err),
        };
        if !valid {
            return Ok(ApkProperties::default());
        }

        Ok(ApkProperties {
            valid,
            debuggable: Some(self.is_debuggable()?),
            manifest: Some(self.android_manifest()?),
            package_name: Some(self.package_name()?),
            version_code: Some(self.version_code()?),
            version_name: Some(self.version_name()?),
        })
    }

    /// Writes the rendered manifest to `directory/AndroidManifest.xml`,
    /// creating the directory as needed.
    pub fn dump(&self, directory: impl AsRef<Path>) -> ApkResult<PathBuf> {
        let text = self.android_manifest()?;
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let target = directory.join(ANDROID_MANIFEST);
        fs::write(&target, text)?;
        info!("dumped manifest of [{}] to {}", self.label, target.display());
        Ok(target)
    }
}
