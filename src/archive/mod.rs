//! Archive detection, extraction and repacking.
//!
//! Each supported container format is an [`ArchiveHandler`]. The
//! [`ArchiveAdapter`] asks the handlers in a fixed priority order (zip, tar,
//! gzip, 7z, external archiver) and the first one that recognizes the file
//! wins.
//! File names are never used to decide *whether* something is an archive,
//! only to name the extraction directory and the gzip member.

mod external;
mod gzip_stream;
mod seven_zip;
mod tar_archive;
mod zip_archive;

pub use external::{ExternalArchiver, CANDIDATES as EXTERNAL_CANDIDATES};

use crate::error::ArchiveError;
use ignore::WalkBuilder;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use external::ExternalHandler;
use gzip_stream::GzipHandler;
use seven_zip::SevenZipHandler;
use tar_archive::TarHandler;
use zip_archive::ZipHandler;

/// Container format of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    /// Tar inside a legacy `.lzma` stream
    TarLzma,
    Gzip,
    SevenZip,
    /// Anything the external archiver can open; `format` is its type name
    External { format: Option<String> },
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::Tar => write!(f, "tar"),
            ArchiveKind::TarGz => write!(f, "tar.gz"),
            ArchiveKind::TarBz2 => write!(f, "tar.bz2"),
            ArchiveKind::TarXz => write!(f, "tar.xz"),
            ArchiveKind::TarLzma => write!(f, "tar.lzma"),
            ArchiveKind::Gzip => write!(f, "gzip"),
            ArchiveKind::SevenZip => write!(f, "7z"),
            ArchiveKind::External { format: Some(format) } => write!(f, "{format}"),
            ArchiveKind::External { format: None } => write!(f, "external"),
        }
    }
}

impl ArchiveKind {
    /// Suffixes conventionally used by this kind, longest first
    fn suffixes(&self) -> &'static [&'static str] {
        match self {
            ArchiveKind::Zip => &[".zip"],
            ArchiveKind::Tar => &[".tar"],
            ArchiveKind::TarGz => &[".tar.gz", ".tgz"],
            ArchiveKind::TarBz2 => &[".tar.bz2", ".tar.bz", ".tbz2", ".tbz"],
            ArchiveKind::TarXz => &[".tar.xz", ".txz"],
            ArchiveKind::TarLzma => &[".tar.lzma", ".tlz"],
            ArchiveKind::Gzip => &[".gz"],
            ArchiveKind::SevenZip => &[".7z"],
            ArchiveKind::External { .. } => &[],
        }
    }

    /// Archive file name without its format suffix
    ///
    /// Returns `None` when the name carries no recognizable suffix.
    pub fn strip_suffix(&self, file_name: &str) -> Option<String> {
        let lower = file_name.to_ascii_lowercase();
        let suffixes = self.suffixes();
        let stripped = if suffixes.is_empty() {
            // Generic formats: drop whatever the last extension is
            Path::new(file_name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .filter(|stem| stem != file_name)
        } else {
            suffixes
                .iter()
                .find(|suffix| lower.ends_with(*suffix))
                .map(|suffix| file_name[..file_name.len() - suffix.len()].to_string())
        };
        stripped.filter(|name| !name.is_empty())
    }
}

/// One container format: recognize it, unpack it, pack it again
pub trait ArchiveHandler {
    /// Inspect the file contents and report the kind if this handler owns it
    ///
    /// `Err` means the format was recognized but the archive is damaged.
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError>;

    /// Whether this handler extracts and repacks `kind`
    fn handles(&self, kind: &ArchiveKind) -> bool;

    /// Unpack `archive` into the empty directory `dest`
    fn extract(&self, archive: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError>;

    /// Write every entry under `src_dir` into a new archive at `dest`
    fn repack(&self, src_dir: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError>;
}

/// An archive unpacked into its own working directory
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct Extraction {
    dir: TempDir,
    kind: ArchiveKind,
}

impl Extraction {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Priority-ordered dispatch over the available archive handlers
pub struct ArchiveAdapter {
    handlers: Vec<Box<dyn ArchiveHandler>>,
    work_root: PathBuf,
}

impl ArchiveAdapter {
    /// Build the adapter
    ///
    /// # Arguments
    /// * `work_root` - Directory that receives extraction and staging directories
    /// * `archiver` - External archiver for formats without a native handler
    pub fn new(work_root: &Path, archiver: Option<ExternalArchiver>) -> Self {
        let mut handlers: Vec<Box<dyn ArchiveHandler>> = vec![
            Box::new(ZipHandler),
            Box::new(TarHandler),
            Box::new(GzipHandler),
            Box::new(SevenZipHandler),
        ];
        if let Some(archiver) = archiver {
            handlers.push(Box::new(ExternalHandler::new(archiver)));
        }

        Self {
            handlers,
            work_root: work_root.to_path_buf(),
        }
    }

    /// Decide whether `path` is an archive
    ///
    /// # Returns
    /// * `Ok(Some(kind))` - The first handler that accepted the file
    /// * `Ok(None)` - An ordinary file
    /// * `Err(_)` - A recognized archive that cannot be opened
    pub fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(None),
        }

        for handler in &self.handlers {
            if let Some(kind) = handler.probe(path)? {
                log::debug!("{} probed as {}", path.display(), kind);
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    /// Unpack an archive into a fresh, uniquely named directory
    pub fn extract(&self, path: &Path, kind: ArchiveKind) -> Result<Extraction, ArchiveError> {
        let handler = self.handler_for(&kind)?;

        let file_name = file_name_of(path);
        let stem = kind.strip_suffix(&file_name).unwrap_or(file_name);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{stem}_"))
            .tempdir_in(&self.work_root)?;

        // On failure `dir` is dropped and the partial extraction goes with it
        handler.extract(path, &kind, dir.path())?;
        log::info!("Extracted {} ({}) to {}", path.display(), kind, dir.path().display());

        Ok(Extraction { dir, kind })
    }

    /// Replace `original` with a new archive built from the extraction
    ///
    /// The archive is built in a staging directory first, so a failure leaves
    /// `original` as it was. The extraction directory is discarded either way.
    pub fn repack(&self, extraction: Extraction, original: &Path) -> Result<(), ArchiveError> {
        let handler = self.handler_for(&extraction.kind)?;

        let staging = tempfile::Builder::new()
            .prefix("repack_")
            .tempdir_in(&self.work_root)?;
        let staged = staging.path().join(file_name_of(original));

        handler.repack(extraction.path(), &extraction.kind, &staged)?;
        fs::rename(&staged, original)?;
        log::info!("Repacked {} as {}", original.display(), extraction.kind);

        Ok(())
    }

    fn handler_for(&self, kind: &ArchiveKind) -> Result<&dyn ArchiveHandler, ArchiveError> {
        self.handlers
            .iter()
            .find(|handler| handler.handles(kind))
            .map(|handler| handler.as_ref())
            .ok_or_else(|| ArchiveError::Unsupported(kind.to_string()))
    }
}

/// An entry found under a directory that is about to be packed
#[derive(Debug)]
pub(crate) struct PackEntry {
    pub path: PathBuf,
    /// Path inside the archive, `/` separated
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// List everything under `dir` in a stable order, parents before children
pub(crate) fn pack_entries(dir: &Path) -> Result<Vec<PackEntry>, ArchiveError> {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = result.map_err(|err| ArchiveError::Io(std::io::Error::other(err)))?;
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = path
            .strip_prefix(dir)
            .map_err(|err| ArchiveError::Io(std::io::Error::other(err)))?;
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let kind = match entry.file_type() {
            Some(file_type) if file_type.is_symlink() => EntryKind::Symlink,
            Some(file_type) if file_type.is_dir() => EntryKind::Dir,
            _ => EntryKind::File,
        };
        entries.push(PackEntry { path, name, kind });
    }

    Ok(entries)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_strip_suffix() {
        assert_eq!(ArchiveKind::Zip.strip_suffix("bundle.ZIP"), Some("bundle".into()));
        assert_eq!(ArchiveKind::TarGz.strip_suffix("src.tar.gz"), Some("src".into()));
        assert_eq!(ArchiveKind::TarGz.strip_suffix("src.tgz"), Some("src".into()));
        assert_eq!(ArchiveKind::Gzip.strip_suffix("log.txt.gz"), Some("log.txt".into()));
        assert_eq!(ArchiveKind::Gzip.strip_suffix("noext"), None);
        assert_eq!(ArchiveKind::Zip.strip_suffix(".zip"), None);
        assert_eq!(ArchiveKind::TarBz2.strip_suffix("src.tar.bz2"), Some("src".into()));
        assert_eq!(ArchiveKind::TarXz.strip_suffix("src.txz"), Some("src".into()));
        assert_eq!(ArchiveKind::SevenZip.strip_suffix("pack.7z"), Some("pack".into()));
        let seven = ArchiveKind::External { format: Some("7z".into()) };
        assert_eq!(seven.strip_suffix("pack.7z"), Some("pack".into()));
        assert_eq!(seven.strip_suffix("pack"), None);
    }

    #[test]
    fn test_probe_priority_and_plain_files() {
        let dir = TempDir::new().unwrap();
        let adapter = ArchiveAdapter::new(dir.path(), None);

        let zip = create_zip(dir.path(), "a.bin", &[("x.txt", b"x")]);
        assert_eq!(adapter.probe(&zip).unwrap(), Some(ArchiveKind::Zip));

        let tar = dir.path().join("b.bin");
        fs::write(&tar, tar_bytes(&[("x.txt", b"x")])).unwrap();
        assert_eq!(adapter.probe(&tar).unwrap(), Some(ArchiveKind::Tar));

        let tgz = dir.path().join("c.bin");
        fs::write(&tgz, gzip_bytes(&tar_bytes(&[("x.txt", b"x")]))).unwrap();
        assert_eq!(adapter.probe(&tgz).unwrap(), Some(ArchiveKind::TarGz));

        let gz = dir.path().join("d.bin");
        fs::write(&gz, gzip_bytes(b"just text")).unwrap();
        assert_eq!(adapter.probe(&gz).unwrap(), Some(ArchiveKind::Gzip));

        let tbz = dir.path().join("g.bin");
        fs::write(&tbz, bzip2_bytes(&tar_bytes(&[("x.txt", b"x")]))).unwrap();
        assert_eq!(adapter.probe(&tbz).unwrap(), Some(ArchiveKind::TarBz2));

        let txz = dir.path().join("h.bin");
        fs::write(&txz, xz_bytes(&tar_bytes(&[("x.txt", b"x")]))).unwrap();
        assert_eq!(adapter.probe(&txz).unwrap(), Some(ArchiveKind::TarXz));

        let tlz = dir.path().join("i.bin");
        fs::write(&tlz, lzma_bytes(&tar_bytes(&[("x.txt", b"x")]))).unwrap();
        assert_eq!(adapter.probe(&tlz).unwrap(), Some(ArchiveKind::TarLzma));

        let seven = create_7z(dir.path(), "j.bin", &[("x.txt", b"x")]);
        assert_eq!(adapter.probe(&seven).unwrap(), Some(ArchiveKind::SevenZip));

        // Compressed data that is not a tar stays an ordinary file
        let bz = dir.path().join("k.bz2");
        fs::write(&bz, bzip2_bytes(b"just text")).unwrap();
        assert_eq!(adapter.probe(&bz).unwrap(), None);

        // A misleading suffix does not make an archive
        let fake = dir.path().join("e.zip");
        fs::write(&fake, "not an archive at all").unwrap();
        assert_eq!(adapter.probe(&fake).unwrap(), None);

        let empty = dir.path().join("f.tar");
        fs::write(&empty, "").unwrap();
        assert_eq!(adapter.probe(&empty).unwrap(), None);

        assert_eq!(adapter.probe(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_zip_roundtrip_without_changes() {
        let dir = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let adapter = ArchiveAdapter::new(work.path(), None);
        let files: &[(&str, &[u8])] = &[
            ("notes.txt", b"secret"),
            ("nested/deeper/data.bin", &[0, 1, 2, 3, 255]),
        ];
        let zip = create_zip(dir.path(), "bundle.zip", files);

        let extraction = adapter.extract(&zip, ArchiveKind::Zip).unwrap();
        let extracted_at = extraction.path().to_path_buf();
        assert!(extracted_at.starts_with(work.path()));
        assert_eq!(fs::read(extracted_at.join("notes.txt")).unwrap(), b"secret");

        adapter.repack(extraction, &zip).unwrap();
        assert!(!extracted_at.exists());

        let entries = read_zip(&zip);
        assert_eq!(
            entries,
            vec![
                ("nested/deeper/data.bin".to_string(), vec![0, 1, 2, 3, 255]),
                ("notes.txt".to_string(), b"secret".to_vec()),
            ]
        );
    }

    #[test]
    fn test_repack_reflects_mutations() {
        let dir = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let adapter = ArchiveAdapter::new(work.path(), None);
        let zip = create_zip(dir.path(), "bundle.zip", &[("old.txt", b"a"), ("keep.txt", b"b")]);

        let extraction = adapter.extract(&zip, ArchiveKind::Zip).unwrap();
        fs::rename(extraction.path().join("old.txt"), extraction.path().join("new.txt")).unwrap();
        fs::write(extraction.path().join("added.txt"), "c").unwrap();
        adapter.repack(extraction, &zip).unwrap();

        let names: Vec<String> = read_zip(&zip).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["added.txt", "keep.txt", "new.txt"]);
    }

    #[test]
    fn test_failed_extraction_cleans_up() {
        let dir = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let adapter = ArchiveAdapter::new(work.path(), None);

        // gzip magic followed by garbage
        let broken = dir.path().join("broken.gz");
        let bytes = [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0x42];
        fs::write(&broken, bytes).unwrap();

        let kind = adapter.probe(&broken).unwrap().unwrap();
        assert_eq!(kind, ArchiveKind::Gzip);
        assert!(adapter.extract(&broken, kind).is_err());
        assert_eq!(fs::read(&broken).unwrap(), bytes);
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_external_kind_without_archiver_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let adapter = ArchiveAdapter::new(dir.path(), None);
        let path = dir.path().join("x.7z");
        fs::write(&path, "x").unwrap();

        let result = adapter.extract(&path, ArchiveKind::External { format: None });
        assert!(matches!(result, Err(ArchiveError::Unsupported(_))));
    }
}
