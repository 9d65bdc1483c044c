use super::{pack_entries, ArchiveHandler, ArchiveKind, EntryKind};
use crate::error::ArchiveError;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub struct ZipHandler;

impl ArchiveHandler for ZipHandler {
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        let Ok(file) = File::open(path) else {
            return Ok(None);
        };
        // Opening parses the central directory, which is all a zip needs
        Ok(ZipArchive::new(file).ok().map(|_| ArchiveKind::Zip))
    }

    fn handles(&self, kind: &ArchiveKind) -> bool {
        *kind == ArchiveKind::Zip
    }

    fn extract(&self, archive: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let mut zip = ZipArchive::new(File::open(archive)?)?;
        // Rejects encrypted entries and paths escaping `dest`
        zip.extract(dest)?;
        Ok(())
    }

    fn repack(&self, src_dir: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let mut writer = ZipWriter::new(File::create(dest)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in pack_entries(src_dir)? {
            match entry.kind {
                EntryKind::Dir => {
                    let meta = fs::metadata(&entry.path)?;
                    writer.add_directory(entry.name, with_permissions(options, &meta))?;
                }
                EntryKind::Symlink => {
                    let target = fs::read_link(&entry.path)?;
                    writer.add_symlink(entry.name, target.to_string_lossy(), options)?;
                }
                EntryKind::File => {
                    let meta = fs::metadata(&entry.path)?;
                    let options = with_permissions(options, &meta)
                        .large_file(meta.len() >= u32::MAX as u64);
                    writer.start_file(entry.name, options)?;
                    io::copy(&mut File::open(&entry.path)?, &mut writer)?;
                }
            }
        }

        writer.finish()?;
        Ok(())
    }
}

/// Carry the on-disk permission bits into the entry
#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, meta: &fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    options.unix_permissions(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _meta: &fs::Metadata) -> SimpleFileOptions {
    options
}
