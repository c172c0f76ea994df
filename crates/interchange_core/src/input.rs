use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::FeedError;

/// The raw source of a GTFS feed: a directory of `.txt` tables, a `.zip`
/// archive on disk, or an in-memory `.zip`. Zip bytes are held whole; each
/// table access re-opens the central directory and inflates one entry.
#[derive(Debug, Clone)]
pub struct GtfsInput {
    kind: InputKind,
}

#[derive(Debug, Clone)]
enum InputKind {
    Directory(PathBuf),
    Zip {
        path: Option<PathBuf>,
        bytes: Vec<u8>,
    },
}

impl GtfsInput {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeedError::MissingPath(path.to_path_buf()));
        }
        if path.is_dir() {
            return Ok(Self {
                kind: InputKind::Directory(path.to_path_buf()),
            });
        }
        if path.is_file() {
            let bytes = std::fs::read(path).map_err(|source| FeedError::Io {
                file: path.display().to_string(),
                source,
            })?;
            ZipArchive::new(Cursor::new(&bytes)).map_err(|source| FeedError::Zip {
                file: path.display().to_string(),
                source,
            })?;
            return Ok(Self {
                kind: InputKind::Zip {
                    path: Some(path.to_path_buf()),
                    bytes,
                },
            });
        }
        Err(FeedError::InvalidPath(path.to_path_buf()))
    }

    pub fn from_zip_bytes(bytes: Vec<u8>) -> Result<Self, FeedError> {
        ZipArchive::new(Cursor::new(&bytes)).map_err(|source| FeedError::Zip {
            file: "<bytes>".to_string(),
            source,
        })?;
        Ok(Self {
            kind: InputKind::Zip { path: None, bytes },
        })
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            InputKind::Directory(path) => Some(path),
            InputKind::Zip { path, .. } => path.as_deref(),
        }
    }

    pub fn is_zip(&self) -> bool {
        matches!(self.kind, InputKind::Zip { .. })
    }

    pub fn has_file(&self, name: &str) -> bool {
        match &self.kind {
            InputKind::Directory(dir) => dir.join(name).is_file(),
            InputKind::Zip { bytes, .. } => match ZipArchive::new(Cursor::new(bytes.as_slice())) {
                Ok(archive) => resolve_entry_name(&archive, name).is_some(),
                Err(_) => false,
            },
        }
    }

    /// Open one table for streaming. `Ok(None)` means the file is absent.
    pub fn open(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>, FeedError> {
        match &self.kind {
            InputKind::Directory(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    return Ok(None);
                }
                let file = std::fs::File::open(&path).map_err(|source| FeedError::Io {
                    file: name.to_string(),
                    source,
                })?;
                Ok(Some(Box::new(std::io::BufReader::new(file))))
            }
            InputKind::Zip { bytes, .. } => match self.read_zip_entry(bytes, name)? {
                Some(contents) => Ok(Some(Box::new(Cursor::new(contents)))),
                None => Ok(None),
            },
        }
    }

    /// Read one table's raw bytes, used for lazy byte-for-byte passthrough.
    pub fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, FeedError> {
        match &self.kind {
            InputKind::Directory(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    return Ok(None);
                }
                std::fs::read(&path)
                    .map(Some)
                    .map_err(|source| FeedError::Io {
                        file: name.to_string(),
                        source,
                    })
            }
            InputKind::Zip { bytes, .. } => self.read_zip_entry(bytes, name),
        }
    }

    fn read_zip_entry(&self, bytes: &[u8], name: &str) -> Result<Option<Vec<u8>>, FeedError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|source| FeedError::Zip {
                file: name.to_string(),
                source,
            })?;
        let Some(entry_name) = resolve_entry_name(&archive, name) else {
            return Ok(None);
        };
        let mut entry = archive
            .by_name(&entry_name)
            .map_err(|source| FeedError::Zip {
                file: name.to_string(),
                source,
            })?;
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|source| FeedError::Io {
                file: name.to_string(),
                source,
            })?;
        Ok(Some(contents))
    }
}

/// Feeds are sometimes zipped inside a top-level folder; accept an exact
/// match first, then a unique `*/name` suffix match.
fn resolve_entry_name<R: Read + std::io::Seek>(
    archive: &ZipArchive<R>,
    name: &str,
) -> Option<String> {
    let mut suffix_match = None;
    for entry in archive.file_names() {
        if entry == name {
            return Some(entry.to_string());
        }
        if entry.ends_with(&format!("/{name}")) && suffix_match.is_none() {
            suffix_match = Some(entry.to_string());
        }
    }
    suffix_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
    }

    fn zip_with(name: &str, contents: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn missing_path_is_an_error() {
        let missing = temp_dir("gtfs_input_missing");
        match GtfsInput::from_path(&missing) {
            Err(FeedError::MissingPath(path)) => assert_eq!(path, missing),
            other => panic!("expected MissingPath, got {other:?}"),
        }
    }

    #[test]
    fn opens_directory_tables() {
        let dir = temp_dir("gtfs_input_dir");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("agency.txt"), "agency_name\nAcme\n").unwrap();

        let input = GtfsInput::from_path(&dir).unwrap();
        assert!(input.has_file("agency.txt"));
        assert!(!input.has_file("stops.txt"));
        let mut contents = String::new();
        input
            .open("agency.txt")
            .unwrap()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("Acme"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn resolves_nested_zip_entries() {
        let bytes = zip_with("feed/agency.txt", "agency_name\nAcme\n");
        let input = GtfsInput::from_zip_bytes(bytes).unwrap();
        assert!(input.has_file("agency.txt"));
        let contents = input.read_file("agency.txt").unwrap().unwrap();
        assert!(String::from_utf8(contents).unwrap().contains("Acme"));
    }

    #[test]
    fn rejects_non_zip_bytes() {
        assert!(GtfsInput::from_zip_bytes(b"not a zip".to_vec()).is_err());
    }
}
