//! Text encoding detection.
//!
//! A BOM is authoritative. Without one, `chardetng` scores the bytes against
//! the legacy encodings and the winner must decode the whole file without a
//! single malformed sequence, otherwise the file is treated as unreadable.

use crate::error::ContentError;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// File text together with what is needed to write it back byte-compatibly
#[derive(Debug)]
pub struct DecodedText {
    pub encoding: &'static Encoding,
    pub has_bom: bool,
    pub text: String,
}

/// Detect the encoding of `bytes` and decode them
pub fn decode(bytes: &[u8]) -> Result<DecodedText, ContentError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let text = strict_decode(encoding, &bytes[bom_len..])?;
        return Ok(DecodedText {
            encoding,
            has_bom: true,
            text,
        });
    }

    // Without a BOM a NUL byte means binary data
    if bytes.contains(&0) {
        return Err(ContentError::Binary);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let text = strict_decode(encoding, bytes)?;
    Ok(DecodedText {
        encoding,
        has_bom: false,
        text,
    })
}

/// Encode `text` in the encoding `original` was read with
pub fn encode(original: &DecodedText, text: &str) -> Result<Vec<u8>, ContentError> {
    let encoding = original.encoding;

    // encoding_rs never encodes to UTF-16, so those are done by hand
    if encoding == UTF_16LE || encoding == UTF_16BE {
        let mut out = Vec::with_capacity(text.len() * 2 + 2);
        let little = encoding == UTF_16LE;
        if original.has_bom {
            out.extend_from_slice(if little { &[0xFF, 0xFE] } else { &[0xFE, 0xFF] });
        }
        for unit in text.encode_utf16() {
            let bytes = if little {
                unit.to_le_bytes()
            } else {
                unit.to_be_bytes()
            };
            out.extend_from_slice(&bytes);
        }
        return Ok(out);
    }

    let (encoded, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(ContentError::Unencodable {
            encoding: encoding.name(),
        });
    }

    let mut out = Vec::with_capacity(encoded.len() + 3);
    if original.has_bom && encoding == UTF_8 {
        out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
    }
    out.extend_from_slice(&encoded);
    Ok(out)
}

fn strict_decode(encoding: &'static Encoding, bytes: &[u8]) -> Result<String, ContentError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or(ContentError::Undecodable {
            encoding: encoding.name(),
        })
}
