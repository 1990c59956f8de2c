//! Sandboxed extraction of wanted executables from tool archives.
//!
//! Extraction runs in two phases. Screening walks every entry, rejects the
//! whole archive on the first entry that tries to escape, and buffers the
//! wanted executables in memory. Only when screening succeeds are the files
//! committed to disk, each through a temporary file that is renamed into
//! place, so a rejected archive never leaves anything behind.

use flate2::read::GzDecoder;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

use super::error::ProvisionError;
use crate::safety::{guard_within, is_escaping_entry};

/// Container formats recognized by content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarXz,
    TarGz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Detects the container format from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if infer::archive::is_xz(bytes) {
            Some(Self::TarXz)
        } else if infer::archive::is_gz(bytes) {
            Some(Self::TarGz)
        } else if infer::archive::is_zip(bytes) {
            Some(Self::Zip)
        } else if infer::archive::is_tar(bytes) {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Opens a reader for this format over `bytes`.
    pub fn open<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn ArchiveReader + 'a>, ProvisionError> {
        Ok(match self {
            Self::TarXz => Box::new(TarReader::new(XzDecoder::new(bytes))),
            Self::TarGz => Box::new(TarReader::new(GzDecoder::new(bytes))),
            Self::Tar => Box::new(TarReader::new(bytes)),
            Self::Zip => Box::new(ZipReader::new(bytes)?),
        })
    }
}

/// One entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path as recorded in the archive.
    pub path: String,
    /// Final path segment.
    pub base_name: String,
    /// Base name without its extension.
    pub stem: String,
    /// Extension without the dot, if any.
    pub extension: Option<String>,
}

impl ArchiveMember {
    /// Parses an archive path. Both `/` and `\` count as separators since
    /// Windows-built zips may use either.
    pub fn from_archive_path(path: &str) -> Option<Self> {
        let base_name = path
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())?;

        let base = Path::new(base_name);
        let stem = base.file_stem()?.to_string_lossy().into_owned();
        let extension = base.extension().map(|e| e.to_string_lossy().into_owned());

        Some(Self {
            path: path.to_string(),
            base_name: base_name.to_string(),
            stem,
            extension,
        })
    }

    /// True if the stem is wanted and the extension is empty or executable.
    pub fn is_wanted(&self, wanted: &[&str]) -> bool {
        let executable = match &self.extension {
            None => true,
            Some(ext) => ext.eq_ignore_ascii_case("exe"),
        };
        executable && wanted.contains(&self.stem.as_str())
    }
}

/// Callback invoked for each entry: raw path, whether it is a regular file,
/// and a reader over its contents.
pub type EntryVisitor<'v> =
    dyn FnMut(&str, bool, &mut dyn Read) -> Result<(), ProvisionError> + 'v;

/// A format-specific archive reader.
pub trait ArchiveReader {
    /// Visits every entry in archive order.
    fn visit(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<(), ProvisionError>;
}

/// Reader for plain and compressed tarballs.
pub struct TarReader<R: Read> {
    archive: tar::Archive<R>,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            archive: tar::Archive::new(inner),
        }
    }
}

impl<R: Read> ArchiveReader for TarReader<R> {
    fn visit(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<(), ProvisionError> {
        let entries = self.archive.entries().map_err(ProvisionError::archive)?;
        for entry in entries {
            let mut entry = entry.map_err(ProvisionError::archive)?;
            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let is_file = entry.header().entry_type().is_file();
            visitor(&path, is_file, &mut entry)?;
        }
        Ok(())
    }
}

/// Reader for zip archives.
pub struct ZipReader<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> ZipReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ProvisionError> {
        Ok(Self {
            archive: zip::ZipArchive::new(Cursor::new(bytes))?,
        })
    }
}

impl ArchiveReader for ZipReader<'_> {
    fn visit(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<(), ProvisionError> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;
            let path = file.name().to_string();
            let is_file = file.is_file();
            visitor(&path, is_file, &mut file)?;
        }
        Ok(())
    }
}

/// A wanted executable buffered during screening.
#[derive(Debug)]
struct StagedFile {
    target: PathBuf,
    contents: Vec<u8>,
}

/// Extracts the executables named by `wanted` (stems) into `destination`.
///
/// Returns `Ok(None)` when the container format is not recognized, leaving
/// the caller to fall back to manual installation. Otherwise returns the
/// files written, which may be empty if nothing in the archive was wanted.
pub fn extract(
    archive: &[u8],
    destination: &Path,
    wanted: &[&str],
) -> Result<Option<Vec<PathBuf>>, ProvisionError> {
    let Some(format) = ArchiveFormat::detect(archive) else {
        return Ok(None);
    };
    debug!(?format, "Detected archive format");

    let mut reader = format.open(archive)?;
    let staged = screen(reader.as_mut(), destination, wanted)?;
    commit(destination, staged).map(Some)
}

fn screen(
    reader: &mut dyn ArchiveReader,
    destination: &Path,
    wanted: &[&str],
) -> Result<Vec<StagedFile>, ProvisionError> {
    let mut staged = Vec::new();

    reader.visit(&mut |path, is_file, contents| {
        if is_escaping_entry(Path::new(path)) {
            return Err(ProvisionError::PathTraversal {
                entry: path.to_string(),
                target: destination.join(path),
            });
        }

        if !is_file {
            return Ok(());
        }

        let Some(member) = ArchiveMember::from_archive_path(path) else {
            return Ok(());
        };
        if !member.is_wanted(wanted) {
            return Ok(());
        }

        let candidate = destination.join(&member.base_name);
        let target = guard_within(destination, &candidate).ok_or_else(|| {
            ProvisionError::PathTraversal {
                entry: path.to_string(),
                target: candidate.clone(),
            }
        })?;

        let mut buffer = Vec::new();
        contents.read_to_end(&mut buffer)?;
        debug!(entry = path, target = %target.display(), "Staged archive member");
        staged.push(StagedFile {
            target,
            contents: buffer,
        });
        Ok(())
    })?;

    Ok(staged)
}

fn commit(destination: &Path, staged: Vec<StagedFile>) -> Result<Vec<PathBuf>, ProvisionError> {
    std::fs::create_dir_all(destination)?;

    let mut prepared = Vec::with_capacity(staged.len());
    for file in staged {
        let mut temp = tempfile::NamedTempFile::new_in(destination)?;
        temp.write_all(&file.contents)?;
        mark_executable(temp.as_file())?;
        prepared.push((temp, file.target));
    }

    // Either every executable lands or none does.
    let mut written = Vec::with_capacity(prepared.len());
    for (temp, target) in prepared {
        if let Err(e) = temp.persist(&target) {
            rollback(&written);
            return Err(e.error.into());
        }
        info!(path = %target.display(), "Installed executable");
        written.push(target);
    }

    Ok(written)
}

fn rollback(written: &[PathBuf]) {
    for path in written {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove installed executable");
        }
    }
}

#[cfg(unix)]
fn mark_executable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}
