use std::borrow::Cow;
use std::io::{self, Read};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

const CHUNK: usize = 64 * 1024;

/// Guesses the text encoding of `bytes`.
///
/// A byte-order mark wins outright. Pure ASCII yields `None` since any
/// default decodes it.
pub fn detect_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Some(encoding);
    }
    let mut detector = EncodingDetector::new();
    let mut non_ascii = false;
    for chunk in bytes.chunks(CHUNK) {
        non_ascii |= detector.feed(chunk, false);
    }
    detector.feed(&[], true);
    non_ascii.then(|| detector.guess(None, true))
}

pub fn detect_reader_encoding<R: Read>(mut reader: R) -> io::Result<Option<&'static Encoding>> {
    let mut detector = EncodingDetector::new();
    let mut non_ascii = false;
    let mut buffer = vec![0u8; CHUNK];
    let mut first = true;
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        if first {
            if let Some((encoding, _)) = Encoding::for_bom(&buffer[..read]) {
                return Ok(Some(encoding));
            }
            first = false;
        }
        non_ascii |= detector.feed(&buffer[..read], false);
    }
    detector.feed(&[], true);
    Ok(non_ascii.then(|| detector.guess(None, true)))
}

/// Decodes with the detected encoding, UTF-8 when nothing was detected.
/// The detected encoding is handed back alongside the text.
pub fn decode(bytes: &[u8]) -> (Cow<'_, str>, Option<&'static Encoding>) {
    let detected = detect_encoding(bytes);
    let (text, _, _) = detected.unwrap_or(UTF_8).decode(bytes);
    (text, detected)
}

pub fn decode_field(bytes: &[u8], encoding: &'static Encoding) -> String {
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}
