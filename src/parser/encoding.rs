//! Character-set normalization for extracted dumps.
//!
//! Stealer logs arrive in whatever encoding the victim machine used, so each
//! file's bytes are sniffed once with chardetng and decoded with the detected
//! encoding. Decoding is never fatal: undecodable sequences degrade to
//! replacement characters and the parser still sees the rest of the file.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

/// Read a dump file as UTF-8 text, rewriting the file in the canonical
/// encoding when it arrived in anything else.
pub fn read_normalized(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read dump {}", path.display()))?;
    let text = decode_bytes(&bytes, path);
    if text.as_bytes() != bytes.as_slice() {
        fs::write(path, text.as_bytes())
            .with_context(|| format!("failed to transcode {}", path.display()))?;
    }
    Ok(text.into_owned())
}

fn decode_bytes<'a>(bytes: &'a [u8], path: &Path) -> Cow<'a, str> {
    let encoding = detect_encoding(bytes);
    if encoding != UTF_8 {
        debug!("Decoding {} as {}", path.display(), encoding.name());
    }
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Lossy decode of {}", path.display());
    }
    text
}

fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}
