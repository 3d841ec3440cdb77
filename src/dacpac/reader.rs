//! Read dacpac ZIP entries

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use zip::ZipArchive;

use crate::error::DacpacDiffError;

/// Every entry of a dacpac, loaded into memory
pub struct DacpacContents {
    path: PathBuf,
    files: HashMap<String, Vec<u8>>,
}

impl DacpacContents {
    pub fn from_path(path: &Path) -> Result<Self, DacpacDiffError> {
        let file = File::open(path).map_err(|e| DacpacDiffError::DacpacReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut archive = ZipArchive::new(file).map_err(|e| DacpacDiffError::ZipError {
            message: format!("Failed to read dacpac {}: {}", path.display(), e),
        })?;

        let mut files = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| DacpacDiffError::ZipError {
                message: format!("Failed to read entry {} in {}: {}", i, path.display(), e),
            })?;

            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| DacpacDiffError::DacpacReadError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            files.insert(name, data);
        }

        tracing::debug!(path = %path.display(), entries = files.len(), "Read dacpac");
        Ok(Self {
            path: path.to_path_buf(),
            files,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|v| v.as_slice())
    }

    /// Entry decoded as text.
    ///
    /// A byte order mark selects the encoding; without one UTF-8 is tried
    /// first, then Windows-1252.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get_bytes(name).map(decode_text)
    }
}

fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return text.into_owned();
    }

    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => {
            tracing::warn!("Entry is not valid UTF-8, decoding as Windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}
