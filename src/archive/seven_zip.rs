//! Native 7z support, used before falling back to an external archiver.

use super::{pack_entries, ArchiveHandler, ArchiveKind, EntryKind};
use crate::error::ArchiveError;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zesven::{Archive, ArchivePath, ExtractOptions, Writer};

const SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

pub struct SevenZipHandler;

impl ArchiveHandler for SevenZipHandler {
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        let Ok(mut file) = File::open(path) else {
            return Ok(None);
        };
        let mut magic = [0u8; SIGNATURE.len()];
        if file.read_exact(&mut magic).is_err() || magic != SIGNATURE {
            return Ok(None);
        }

        // The signature matched, so a header that will not parse is damage
        Archive::open_path(path)?;
        Ok(Some(ArchiveKind::SevenZip))
    }

    fn handles(&self, kind: &ArchiveKind) -> bool {
        *kind == ArchiveKind::SevenZip
    }

    fn extract(&self, archive: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let mut archive = Archive::open_path(archive)?;
        let result = archive.extract(dest, (), &ExtractOptions::default())?;

        if let Some((entry, reason)) = result.failures.first() {
            return Err(ArchiveError::Corrupted {
                tool: "7z".to_string(),
                detail: format!("{entry}: {reason}"),
            });
        }
        Ok(())
    }

    fn repack(&self, src_dir: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let mut writer = Writer::create_path(dest)?;

        for entry in pack_entries(src_dir)? {
            match entry.kind {
                EntryKind::Dir | EntryKind::File => {
                    writer.add_path(&entry.path, ArchivePath::new(&entry.name)?)?
                }
                EntryKind::Symlink => {
                    log::warn!("Skipping symbolic link {} in 7z archive", entry.name);
                }
            }
        }

        writer.finish()?;
        Ok(())
    }
}
