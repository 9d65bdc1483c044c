//! Tar archives, plain or wrapped in gzip, bzip2, xz or legacy lzma.
//!
//! A file is a tar when its first 512-byte block carries a valid header
//! checksum. For compressed tars the magic bytes pick the decoder and the
//! same check runs on the decompressed stream.

use super::gzip_stream::is_gzip;
use super::{pack_entries, ArchiveHandler, ArchiveKind, EntryKind};
use crate::error::ArchiveError;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};
use xz2::read::XzDecoder;
use xz2::stream::{LzmaOptions, Stream};
use xz2::write::XzEncoder;

const BLOCK_SIZE: usize = 512;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
/// Properties byte of an lzma_alone header written with default settings
const LZMA_PROPERTIES: u8 = 0x5D;
const MAGIC_LEN: u64 = 6;

/// Compression level for xz and lzma output
const XZ_PRESET: u32 = 6;
/// Dictionary memory an lzma header may ask for
const LZMA_MEMLIMIT: u64 = 256 * 1024 * 1024;

pub struct TarHandler;

impl ArchiveHandler for TarHandler {
    fn probe(&self, path: &Path) -> Result<Option<ArchiveKind>, ArchiveError> {
        let Ok(mut file) = File::open(path) else {
            return Ok(None);
        };

        let mut magic = Vec::new();
        if (&mut file).take(MAGIC_LEN).read_to_end(&mut magic).is_err() {
            return Ok(None);
        }

        // The compressed guess first, then the raw bytes
        let mut candidates = Vec::with_capacity(2);
        if let Some(kind) = compression_of(&magic) {
            candidates.push(kind);
        }
        candidates.push(ArchiveKind::Tar);

        for kind in candidates {
            if file.seek(SeekFrom::Start(0)).is_err() {
                return Ok(None);
            }
            let Ok(reader) = decoder(&kind, BufReader::new(&mut file)) else {
                continue;
            };
            if starts_with_tar_header(reader) {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    fn handles(&self, kind: &ArchiveKind) -> bool {
        matches!(
            kind,
            ArchiveKind::Tar
                | ArchiveKind::TarGz
                | ArchiveKind::TarBz2
                | ArchiveKind::TarXz
                | ArchiveKind::TarLzma
        )
    }

    fn extract(&self, archive: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let file = BufReader::new(File::open(archive)?);
        Archive::new(decoder(kind, file)?).unpack(dest)?;
        Ok(())
    }

    fn repack(&self, src_dir: &Path, kind: &ArchiveKind, dest: &Path) -> Result<(), ArchiveError> {
        let file = BufWriter::new(File::create(dest)?);
        let file = match kind {
            ArchiveKind::TarGz => {
                let encoder = GzEncoder::new(file, flate2::Compression::default());
                write_tar(src_dir, encoder)?.finish()?
            }
            ArchiveKind::TarBz2 => {
                let encoder = BzEncoder::new(file, bzip2::Compression::default());
                write_tar(src_dir, encoder)?.finish()?
            }
            ArchiveKind::TarXz => {
                let encoder = XzEncoder::new(file, XZ_PRESET);
                write_tar(src_dir, encoder)?.finish()?
            }
            ArchiveKind::TarLzma => {
                let stream = Stream::new_lzma_encoder(&LzmaOptions::new_preset(XZ_PRESET)?)?;
                write_tar(src_dir, XzEncoder::new_stream(file, stream))?.finish()?
            }
            _ => write_tar(src_dir, file)?,
        };
        file.into_inner().map_err(|err| err.into_error())?;
        Ok(())
    }
}

/// Compressed tar kind suggested by the leading bytes
fn compression_of(magic: &[u8]) -> Option<ArchiveKind> {
    if is_gzip(magic) {
        Some(ArchiveKind::TarGz)
    } else if magic.starts_with(BZIP2_MAGIC) {
        Some(ArchiveKind::TarBz2)
    } else if magic.starts_with(XZ_MAGIC) {
        Some(ArchiveKind::TarXz)
    } else if magic.first() == Some(&LZMA_PROPERTIES) {
        Some(ArchiveKind::TarLzma)
    } else {
        None
    }
}

/// Reader yielding the raw tar stream of `kind`
fn decoder<'a, R: Read + 'a>(kind: &ArchiveKind, reader: R) -> Result<Box<dyn Read + 'a>, ArchiveError> {
    let reader: Box<dyn Read + 'a> = match kind {
        ArchiveKind::TarGz => Box::new(MultiGzDecoder::new(reader)),
        ArchiveKind::TarBz2 => Box::new(MultiBzDecoder::new(reader)),
        ArchiveKind::TarXz => Box::new(XzDecoder::new_multi_decoder(reader)),
        ArchiveKind::TarLzma => {
            Box::new(XzDecoder::new_stream(reader, Stream::new_lzma_decoder(LZMA_MEMLIMIT)?))
        }
        _ => Box::new(reader),
    };
    Ok(reader)
}

/// Append every entry under `src_dir` to a tar stream and finish it
fn write_tar<W: Write>(src_dir: &Path, writer: W) -> Result<W, ArchiveError> {
    let mut builder = Builder::new(writer);
    // Store links as links, never the files they point at
    builder.follow_symlinks(false);

    for entry in pack_entries(src_dir)? {
        match entry.kind {
            EntryKind::Dir => builder.append_dir(&entry.name, &entry.path)?,
            EntryKind::File | EntryKind::Symlink => {
                builder.append_path_with_name(&entry.path, &entry.name)?
            }
        }
    }

    Ok(builder.into_inner()?)
}

/// Whether the stream begins with a tar header block
fn starts_with_tar_header<R: Read>(mut reader: R) -> bool {
    let mut block = [0u8; BLOCK_SIZE];
    if reader.read_exact(&mut block).is_err() {
        return false;
    }
    is_tar_header(&block)
}

/// Verify the header checksum the way tar readers do
fn is_tar_header(block: &[u8; BLOCK_SIZE]) -> bool {
    let Ok(stored) = Header::from_byte_slice(block).cksum() else {
        return false;
    };

    // The checksum field itself counts as eight spaces
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, byte)| {
            if CHECKSUM_FIELD.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(*byte)
            }
        })
        .sum();

    stored == computed
}
