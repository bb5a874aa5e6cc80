//! G record: the tamper-evidence digest appended to a flight log.
//!
//! Four MD5 accumulators, each started from its own fixed key, consume the
//! signed part of the file character by character. The concatenated hex
//! digests form the signature, which is written as `G` lines of 16
//! characters. Anyone holding the keys can recompute the digest from the
//! file body and compare it with the embedded lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use super::md5::Md5;
use super::{is_valid_char, VENDOR_CODE};
use crate::error::{Error, Result};

/// Chaining-value keys of the four accumulators.
const KEYS: [[u32; 4]; 4] = [
    [0x1C80_A301, 0x9EB3_0B89, 0x39CB_2AFE, 0x0D0F_EA76],
    [0x4832_7203, 0x3948_EBEA, 0x9A9B_9C9E, 0xB3BE_D89A],
    [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476],
    [0xC8E8_99E8, 0x9321_C28A, 0x438E_BA12, 0x8CBE_0AEE],
];

/// Characters per `G` line, not counting the `G`.
const CHARS_PER_LINE: usize = 16;

/// Outcome of checking a flight log's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The embedded signature matches the body.
    Valid,
    /// The file has a signature but it does not match.
    Invalid,
    /// The file has no `G` lines.
    Unsigned,
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unsigned => write!(f, "unsigned"),
        }
    }
}

/// Running G record digest for one flight log.
#[derive(Debug, Clone)]
pub struct GRecord {
    contexts: [Md5; 4],
    ignore_comma: bool,
}

impl GRecord {
    /// Start a new digest.
    ///
    /// With `ignore_comma`, commas are left out of the digest, matching
    /// files written by one historical release that did the same.
    #[must_use]
    pub fn new(ignore_comma: bool) -> Self {
        Self {
            contexts: KEYS.map(Md5::with_seed),
            ignore_comma,
        }
    }

    /// Check if a record takes part in the digest.
    ///
    /// `L` records count only with our own manufacturer code, `G` records
    /// never, `H` records unless they start with `HOP`.
    #[must_use]
    pub fn include_line(line: &str) -> bool {
        match line.as_bytes().first() {
            None | Some(b'G') => false,
            Some(b'L') => line[1..].starts_with(VENDOR_CODE),
            Some(b'H') => !line.starts_with("HOP"),
            Some(_) => true,
        }
    }

    /// Feed one record line (terminator optional).
    pub fn append_line(&mut self, line: &str) {
        if !Self::include_line(line) {
            return;
        }

        for c in line.chars() {
            if !is_valid_char(c) || (self.ignore_comma && c == ',') {
                continue;
            }
            let byte = [u8::try_from(c).unwrap_or(b' ')];
            for ctx in &mut self.contexts {
                ctx.update(&byte);
            }
        }
    }

    /// Feed every line of a text block.
    pub fn append_text(&mut self, text: &str) {
        for line in text.lines() {
            self.append_line(line);
        }
    }

    /// The 128 hex digit signature of everything fed so far.
    #[must_use]
    pub fn digest(&self) -> String {
        self.contexts
            .iter()
            .cloned()
            .flat_map(Md5::finalize)
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// The signature split into `G` records.
    #[must_use]
    pub fn signature_lines(&self) -> Vec<String> {
        self.digest()
            .as_bytes()
            .chunks(CHARS_PER_LINE)
            .map(|chunk| format!("G{}", String::from_utf8_lossy(chunk)))
            .collect()
    }
}

/// Compute the digest of a file body, skipping its `G` lines.
#[must_use]
pub fn digest_text(text: &str, ignore_comma: bool) -> String {
    let mut grecord = GRecord::new(ignore_comma);
    grecord.append_text(text);
    grecord.digest()
}

/// Check the embedded signature of a flight log held in memory.
#[must_use]
pub fn verify_text(text: &str, ignore_comma: bool) -> SignatureStatus {
    let embedded: String = text
        .lines()
        .filter(|line| line.starts_with('G'))
        .map(|line| line[1..].trim())
        .collect();

    if embedded.is_empty() {
        return SignatureStatus::Unsigned;
    }
    if embedded.eq_ignore_ascii_case(&digest_text(text, ignore_comma)) {
        SignatureStatus::Valid
    } else {
        SignatureStatus::Invalid
    }
}

fn read_log(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Check the signature of a flight log on disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn verify_file(path: &Path, ignore_comma: bool) -> Result<SignatureStatus> {
    let status = verify_text(&read_log(path)?, ignore_comma);
    debug!(path = %path.display(), status = %status, "Verified signature");
    Ok(status)
}

/// Append a G record to an unsigned flight log.
///
/// # Errors
///
/// Returns [`Error::Signature`] if the file already carries `G` lines, or an
/// I/O error if it cannot be read or appended to.
pub fn sign_file(path: &Path, ignore_comma: bool) -> Result<()> {
    let text = read_log(path)?;
    if text.lines().any(|line| line.starts_with('G')) {
        return Err(Error::Signature {
            path: path.to_path_buf(),
            message: "file is already signed".to_string(),
        });
    }

    let mut grecord = GRecord::new(ignore_comma);
    grecord.append_text(&text);
    append_signature(path, &grecord, !text.is_empty() && !text.ends_with('\n'))?;

    info!(path = %path.display(), "Signed flight log");
    Ok(())
}

/// Append the signature lines of `grecord` to the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_signature(path: &Path, grecord: &GRecord, needs_newline: bool) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

    let mut out = String::new();
    if needs_newline {
        out.push_str("\r\n");
    }
    for line in grecord.signature_lines() {
        out.push_str(&line);
        out.push_str("\r\n");
    }
    file.write_all(out.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const BODY: &str = "AXIRAAA\r\n\
        HFDTE010524\r\n\
        HFPLTPILOT:Jane Doe\r\n\
        HOPOPERATOR:someone\r\n\
        I023638FXA3940SIU\r\n\
        B1200005000000N00800000EA0010000120000008\r\n\
        LXIRcomment,with,commas\r\n\
        LOTHforeign comment\r\n";

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("igcrecorder_grecord_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_include_line() {
        assert!(GRecord::include_line("B1200005000000N00800000EA0010000120"));
        assert!(GRecord::include_line("HFDTE010524"));
        assert!(!GRecord::include_line("HOPOPERATOR:x"));
        assert!(GRecord::include_line("LXIRanything"));
        assert!(!GRecord::include_line("LXCSanything"));
        assert!(!GRecord::include_line("G0123456789abcdef"));
        assert!(!GRecord::include_line(""));
    }

    #[test]
    fn test_digest_length_and_lines() {
        let mut grecord = GRecord::new(false);
        grecord.append_text(BODY);
        assert_eq!(grecord.digest().len(), 128);

        let lines = grecord.signature_lines();
        assert_eq!(lines.len(), 8);
        assert!(lines.iter().all(|l| l.len() == 17 && l.starts_with('G')));
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest_text(BODY, false), digest_text(BODY, false));
    }

    #[test]
    fn test_empty_digest_uses_all_four_keys() {
        let digest = GRecord::new(false).digest();
        // third key is the standard MD5 initial state
        assert_eq!(&digest[64..96], "d41d8cd98f00b204e9800998ecf8427e");
        assert_ne!(&digest[0..32], &digest[64..96]);
    }

    #[test]
    fn test_included_character_change_is_detected() {
        let tampered = BODY.replace("EA00100", "EA00101");
        assert_ne!(digest_text(BODY, false), digest_text(&tampered, false));

        let tampered = BODY.replace("Jane", "John");
        assert_ne!(digest_text(BODY, false), digest_text(&tampered, false));
    }

    #[test]
    fn test_excluded_lines_do_not_matter() {
        let original = digest_text(BODY, false);

        let edited = BODY.replace("HOPOPERATOR:someone", "HOPOPERATOR:somebody else");
        assert_eq!(digest_text(&edited, false), original);

        let edited = BODY.replace("LOTHforeign comment", "LOTHchanged");
        assert_eq!(digest_text(&edited, false), original);

        let edited = format!("{BODY}G0000000000000000\r\n");
        assert_eq!(digest_text(&edited, false), original);
    }

    #[test]
    fn test_ignore_comma_flag() {
        let without = BODY.replace("comment,with,commas", "commentwithcommas");
        assert_eq!(digest_text(BODY, true), digest_text(&without, true));
        assert_ne!(digest_text(BODY, false), digest_text(&without, false));
    }

    #[test]
    fn test_reserved_characters_are_skipped() {
        let noisy = BODY.replace("Jane Doe", "Jane$ Doe~");
        assert_eq!(digest_text(BODY, false), digest_text(&noisy, false));
    }

    #[test]
    fn test_verify_text() {
        let mut grecord = GRecord::new(false);
        grecord.append_text(BODY);
        let signed = format!("{BODY}{}\r\n", grecord.signature_lines().join("\r\n"));

        assert_eq!(verify_text(&signed, false), SignatureStatus::Valid);
        assert_eq!(verify_text(BODY, false), SignatureStatus::Unsigned);

        let tampered = signed.replace("Jane", "Joan");
        assert_eq!(verify_text(&tampered, false), SignatureStatus::Invalid);
    }

    #[test]
    fn test_sign_and_verify_file() {
        let path = temp_path("sign.igc");
        fs::write(&path, BODY).unwrap();

        sign_file(&path, false).unwrap();
        assert_eq!(verify_file(&path, false).unwrap(), SignatureStatus::Valid);

        let err = sign_file(&path, false).unwrap_err();
        assert!(matches!(err, Error::Signature { .. }));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_sign_file_without_trailing_newline() {
        let path = temp_path("no_newline.igc");
        fs::write(&path, BODY.trim_end()).unwrap();

        sign_file(&path, false).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("LOTHforeign comment\r\nG"));
        assert_eq!(verify_text(&text, false), SignatureStatus::Valid);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_verify_missing_file() {
        let err = verify_file(&temp_path("missing.igc"), false).unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));
    }

    #[test]
    fn test_signature_status_display() {
        assert_eq!(SignatureStatus::Valid.to_string(), "valid");
        assert_eq!(SignatureStatus::Unsigned.to_string(), "unsigned");
    }
}
