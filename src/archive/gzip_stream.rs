//! Bare gzip streams.
//!
//! A gzip wraps exactly one file, so extraction writes a single member into
//! the working directory and repacking expects to find exactly one file there
//! again (its name may have been changed by the rename pass).

use super::{pack_entries, ArchiveHandler, ArchiveKind, EntryKind};
use crate::error::ArchiveError;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// gzip magic bytes (RFC 1952)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(header: &[u8]) -> bool {
    header.len() >= 2 && header[..2] == GZIP_MAGIC
}

pub struct GzipHandler;

impl ArchiveHandler for GzipHandler {
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        let Ok(mut file) = File::open(path) else {
            return Ok(None);
        };
        let mut magic = [0u8; 2];
        if file.read_exact(&mut magic).is_err() {
            return Ok(None);
        }
        Ok(is_gzip(&magic).then_some(ArchiveKind::Gzip))
    }

    fn handles(&self, kind: &ArchiveKind) -> bool {
        *kind == ArchiveKind::Gzip
    }

    fn extract(&self, archive: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(archive)?));

        // Reading the first chunk parses the header, which may carry a name
        let mut buf = vec![0u8; 64 * 1024];
        let first = decoder.read(&mut buf)?;
        let header_name = decoder
            .header()
            .and_then(|header| header.filename())
            .map(|name| String::from_utf8_lossy(name).into_owned());

        let name = member_name(archive, kind, header_name.as_deref());
        let mut out = BufWriter::new(File::create(dest.join(name))?);
        out.write_all(&buf[..first])?;
        io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        Ok(())
    }

    fn repack(&self, src_dir: &Path, _kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let entries = pack_entries(src_dir)?;
        let member = match entries.as_slice() {
            [only] if only.kind == EntryKind::File => only,
            _ => return Err(ArchiveError::GzipMembers { found: entries.len() }),
        };

        let mut encoder = GzEncoder::new(BufWriter::new(File::create(dest)?), Compression::default());
        io::copy(&mut File::open(&member.path)?, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(())
    }
}

/// Name for the single file inside a gzip
///
/// The archive name without `.gz` wins, then the name recorded in the gzip
/// header, then the archive name with `.out` appended.
fn member_name(archive: &Path, kind: &ArchiveKind, header_name: Option<&str>) -> String {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(stripped) = kind.strip_suffix(&file_name) {
        return stripped;
    }

    // Header names are untrusted: keep only the final component
    let from_header = header_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty());

    from_header.unwrap_or_else(|| format!("{file_name}.out"))
}
