use std::io::Read;

use encoding_rs::{Decoder, Encoding, GBK, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1251, WINDOWS_1252};

/// Resolves an encoding label from configuration, tolerating case and
/// underscore/hyphen differences. Empty or unknown labels yield `None`.
#[must_use]
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    let trimmed = label.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        return None;
    }
    Encoding::for_label(trimmed.as_bytes()).or_else(|| {
        let lower = trimmed.to_ascii_lowercase().replace('_', "-");
        Encoding::for_label(lower.as_bytes())
    })
}

/// Guesses the character set of an input file from its first few KiB.
///
/// Order of evidence: byte-order mark, UTF-8 validity, then a weighted
/// score over Latin-1 accent bytes, CJK double-byte pairs, and Cyrillic
/// letter runs. UTF-8 wins ties and empty input.
#[must_use]
pub fn detect_charset(sample: &[u8]) -> &'static Encoding {
    if sample.is_empty() {
        return UTF_8;
    }
    if let Some(encoding) = bom_encoding(sample) {
        return encoding;
    }
    if simdutf8::basic::from_utf8(sample).is_ok() {
        return UTF_8;
    }

    let mut latin: u64 = 0;
    let mut cjk: u64 = 0;
    let mut cyrillic: u64 = 0;

    let mut i = 0;
    while i < sample.len() {
        if sample[i] < 0x80 {
            i += 1;
            continue;
        }
        let start = i;
        while i < sample.len() && sample[i] >= 0x80 {
            i += 1;
        }
        let run = i - start;
        match run {
            1 => {
                // An isolated high byte amid ASCII reads like an accented
                // Latin letter or Latin-1 punctuation.
                latin += 2;
            }
            2 => {
                let lead = sample[start];
                let trail = sample[start + 1];
                if (0x81..=0xFE).contains(&lead) && (0xA1..=0xFE).contains(&trail) {
                    cjk += 3;
                } else {
                    latin += 1;
                }
            }
            _ => {
                // Whole words of high bytes: typical of single-byte
                // Cyrillic text, where every letter is >= 0xC0.
                if sample[start..i].iter().all(|b| *b >= 0xC0) {
                    cyrillic += run as u64;
                } else {
                    cjk += run as u64;
                }
            }
        }
    }

    let best = latin.max(cjk).max(cyrillic);
    if best == 0 {
        UTF_8
    } else if best == cjk {
        GBK
    } else if best == cyrillic {
        WINDOWS_1251
    } else {
        WINDOWS_1252
    }
}

fn bom_encoding(sample: &[u8]) -> Option<&'static Encoding> {
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(UTF_8)
    } else if sample.starts_with(&[0xFF, 0xFE]) {
        Some(UTF_16LE)
    } else if sample.starts_with(&[0xFE, 0xFF]) {
        Some(UTF_16BE)
    } else {
        None
    }
}

const IN_CAPACITY: usize = 16 * 1024;
const OUT_CAPACITY: usize = 4 * IN_CAPACITY;

/// Adapts a byte stream in any supported encoding into a UTF-8 `Read`.
///
/// Malformed sequences are replaced rather than rejected, matching how
/// the rest of the pipeline treats dirty input files.
pub struct DecodingReader<R: Read> {
    inner: R,
    decoder: Decoder,
    in_buf: Box<[u8]>,
    in_start: usize,
    in_end: usize,
    out_buf: Box<[u8]>,
    out_start: usize,
    out_end: usize,
    saw_eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder(),
            in_buf: vec![0; IN_CAPACITY].into_boxed_slice(),
            in_start: 0,
            in_end: 0,
            out_buf: vec![0; OUT_CAPACITY].into_boxed_slice(),
            out_start: 0,
            out_end: 0,
            saw_eof: false,
            finished: false,
        }
    }

    fn refill(&mut self) -> std::io::Result<()> {
        if self.in_start == self.in_end && !self.saw_eof {
            self.in_start = 0;
            self.in_end = self.inner.read(&mut self.in_buf)?;
            if self.in_end == 0 {
                self.saw_eof = true;
            }
        }
        Ok(())
    }

    fn decode_some(&mut self) -> std::io::Result<()> {
        self.refill()?;
        let (result, read, written, _had_errors) = self.decoder.decode_to_utf8(
            &self.in_buf[self.in_start..self.in_end],
            &mut self.out_buf,
            self.saw_eof,
        );
        self.in_start += read;
        self.out_start = 0;
        self.out_end = written;
        if self.saw_eof
            && self.in_start == self.in_end
            && result == encoding_rs::CoderResult::InputEmpty
        {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.out_start == self.out_end {
            if self.finished {
                return Ok(0);
            }
            self.decode_some()?;
        }
        let n = (self.out_end - self.out_start).min(buf.len());
        buf[..n].copy_from_slice(&self.out_buf[self.out_start..self.out_start + n]);
        self.out_start += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_defaults_to_utf8() {
        assert_eq!(detect_charset(b""), UTF_8);
    }

    #[test]
    fn bom_wins() {
        assert_eq!(detect_charset(&[0xEF, 0xBB, 0xBF, b'a']), UTF_8);
        assert_eq!(detect_charset(&[0xFF, 0xFE, 0x41, 0x00]), UTF_16LE);
        assert_eq!(detect_charset(&[0xFE, 0xFF, 0x00, 0x41]), UTF_16BE);
    }

    #[test]
    fn valid_utf8_detected() {
        assert_eq!(detect_charset("héllo, wörld".as_bytes()), UTF_8);
    }

    #[test]
    fn isolated_high_bytes_read_as_latin1() {
        // "caf<E9> cr<E8>me" in windows-1252
        let bytes = b"caf\xE9 cr\xE8me br\xFBl\xE9e";
        assert_eq!(detect_charset(bytes), WINDOWS_1252);
    }

    #[test]
    fn cyrillic_runs_read_as_windows_1251() {
        // "привет мир" in windows-1251: letters are all >= 0xC0
        let bytes = b"\xEF\xF0\xE8\xE2\xE5\xF2 \xEC\xE8\xF0";
        assert_eq!(detect_charset(bytes), WINDOWS_1251);
    }

    #[test]
    fn gbk_pairs_read_as_cjk() {
        // "你好" in GBK plus ASCII filler between pairs
        let bytes = b"a\xC4\xE3b\xBA\xC3c\xC4\xE3d\xBA\xC3";
        assert_eq!(detect_charset(bytes), GBK);
    }

    #[test]
    fn decoding_reader_transcodes_latin1() {
        let input: &[u8] = b"caf\xE9";
        let mut reader = DecodingReader::new(input, WINDOWS_1252);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "café");
    }

    #[test]
    fn resolve_label_variants() {
        assert!(resolve_encoding("auto").is_none());
        assert!(resolve_encoding("").is_none());
        assert_eq!(resolve_encoding("UTF_8"), Some(UTF_8));
        assert_eq!(resolve_encoding("windows-1252"), Some(WINDOWS_1252));
    }
}
