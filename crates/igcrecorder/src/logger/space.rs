//! Free space checks and cleanup of old flight logs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::igc::{FileNameCodec, LogFileName};

/// Maximum number of logs deleted while reclaiming space.
pub const MAX_DELETE_ATTEMPTS: usize = 100;

/// Reports free space in a directory.
pub trait SpaceProbe: Send + Sync + fmt::Debug {
    /// Free space available to this process, in kB.
    ///
    /// # Errors
    ///
    /// Returns an error if the file system cannot be queried.
    fn free_kb(&self, directory: &Path) -> Result<u64>;
}

/// [`SpaceProbe`] backed by the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn free_kb(&self, directory: &Path) -> Result<u64> {
        Ok(fs2::available_space(directory)? / 1024)
    }
}

/// Flight logs in `directory` whose names the codec understands, oldest
/// first.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_logs(
    directory: &Path,
    codec: &FileNameCodec,
    reference_year: i32,
) -> Result<Vec<(LogFileName, PathBuf)>> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_igc = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("igc"));
        if !is_igc {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(key) = codec.parse(name, reference_year) {
            logs.push((key, path));
        }
    }
    logs.sort();
    Ok(logs)
}

/// Delete the oldest flight logs until `required_kb` are free.
///
/// At most [`MAX_DELETE_ATTEMPTS`] deletions are tried. Files whose names
/// the codec does not understand are never touched. Returns the free space
/// reached.
///
/// # Errors
///
/// Returns [`Error::InsufficientStorage`] if not enough space could be
/// freed, or an error if the directory cannot be read.
pub fn reclaim_space(
    directory: &Path,
    probe: &dyn SpaceProbe,
    required_kb: u64,
    codec: &FileNameCodec,
    reference_year: i32,
) -> Result<u64> {
    let mut free_kb = probe.free_kb(directory)?;
    if free_kb >= required_kb {
        return Ok(free_kb);
    }

    let mut candidates = list_logs(directory, codec, reference_year)?.into_iter();
    for _ in 0..MAX_DELETE_ATTEMPTS {
        if free_kb >= required_kb {
            break;
        }
        let Some((key, path)) = candidates.next() else {
            break;
        };

        match fs::remove_file(&path) {
            Ok(()) => info!(
                path = %path.display(),
                date = %key.date,
                sequence = key.sequence,
                "Deleted old flight log"
            ),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete flight log"),
        }
        free_kb = probe.free_kb(directory)?;
        debug!(free_kb, required_kb, "Free space after cleanup step");
    }

    if free_kb < required_kb {
        return Err(Error::InsufficientStorage {
            path: directory.to_path_buf(),
            free_kb,
            required_kb,
        });
    }
    Ok(free_kb)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;

    use super::*;

    /// Reports the same free space every time.
    #[derive(Debug)]
    pub(crate) struct FixedProbe(pub u64);

    impl SpaceProbe for FixedProbe {
        fn free_kb(&self, _: &Path) -> Result<u64> {
            Ok(self.0)
        }
    }

    /// Free space shrinks by `file_kb` for every IGC file in the directory.
    #[derive(Debug)]
    struct CountingProbe {
        total_kb: u64,
        file_kb: u64,
    }

    impl SpaceProbe for CountingProbe {
        fn free_kb(&self, directory: &Path) -> Result<u64> {
            let files = fs::read_dir(directory)?
                .filter_map(std::result::Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == "IGC"))
                .count() as u64;
            Ok(self.total_kb.saturating_sub(files * self.file_kb))
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("igcrecorder-space-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"AXIRAAA\r\n").unwrap();
    }

    #[test]
    fn test_list_logs_orders_by_date_and_sequence() {
        let dir = temp_dir("list");
        touch(&dir, "2024-05-02-XIR-AAA-01.IGC");
        touch(&dir, "2024-05-01-XIR-AAA-02.IGC");
        touch(&dir, "2024-05-01-XIR-AAA-01.IGC");
        touch(&dir, "notes.txt");
        touch(&dir, "random.igc");

        let codec = FileNameCodec::new();
        let logs = list_logs(&dir, &codec, 2024).unwrap();
        fs::remove_dir_all(&dir).ok();

        let keys: Vec<_> = logs.iter().map(|(k, _)| (k.date, k.sequence)).collect();
        let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        assert_eq!(keys, vec![(day(1), 1), (day(1), 2), (day(2), 1)]);
    }

    #[test]
    fn test_enough_space_deletes_nothing() {
        let dir = temp_dir("enough");
        touch(&dir, "2024-05-01-XIR-AAA-01.IGC");

        let free = reclaim_space(&dir, &FixedProbe(1000), 750, &FileNameCodec::new(), 2024).unwrap();
        let still_there = dir.join("2024-05-01-XIR-AAA-01.IGC").exists();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(free, 1000);
        assert!(still_there);
    }

    #[test]
    fn test_deletes_oldest_first() {
        let dir = temp_dir("oldest");
        touch(&dir, "2024-05-01-XIR-AAA-01.IGC");
        touch(&dir, "2024-05-01-XIR-AAA-02.IGC");
        touch(&dir, "2024-05-03-XIR-AAA-01.IGC");

        let probe = CountingProbe {
            total_kb: 1000,
            file_kb: 200,
        };
        let free = reclaim_space(&dir, &probe, 750, &FileNameCodec::new(), 2024).unwrap();
        let remaining: Vec<bool> = [
            "2024-05-01-XIR-AAA-01.IGC",
            "2024-05-01-XIR-AAA-02.IGC",
            "2024-05-03-XIR-AAA-01.IGC",
        ]
        .iter()
        .map(|n| dir.join(n).exists())
        .collect();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(free, 800);
        assert_eq!(remaining, vec![false, false, true]);
    }

    #[test]
    fn test_insufficient_after_cleanup() {
        let dir = temp_dir("insufficient");
        touch(&dir, "2024-05-01-XIR-AAA-01.IGC");

        let result = reclaim_space(&dir, &FixedProbe(100), 750, &FileNameCodec::new(), 2024);
        let deleted = !dir.join("2024-05-01-XIR-AAA-01.IGC").exists();
        fs::remove_dir_all(&dir).ok();

        assert!(deleted);
        assert!(matches!(
            result,
            Err(Error::InsufficientStorage {
                free_kb: 100,
                required_kb: 750,
                ..
            })
        ));
    }

    #[test]
    fn test_cleanup_stops_after_max_attempts() {
        let dir = temp_dir("cap");
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let names: Vec<String> = (0..MAX_DELETE_ATTEMPTS as u64 + 5)
            .map(|day| {
                let date = first + chrono::Days::new(day);
                format!("{}-XIR-AAA-01.IGC", date.format("%Y-%m-%d"))
            })
            .collect();
        for name in &names {
            touch(&dir, name);
        }

        let result = reclaim_space(&dir, &FixedProbe(100), 750, &FileNameCodec::new(), 2024);
        let remaining: Vec<bool> = names.iter().map(|n| dir.join(n).exists()).collect();
        fs::remove_dir_all(&dir).ok();

        assert!(matches!(result, Err(Error::InsufficientStorage { .. })));
        assert_eq!(remaining.iter().filter(|kept| !**kept).count(), MAX_DELETE_ATTEMPTS);
        assert!(remaining[..MAX_DELETE_ATTEMPTS].iter().all(|kept| !kept));
        assert!(remaining[MAX_DELETE_ATTEMPTS..].iter().all(|kept| *kept));
    }

    #[test]
    fn test_fs_probe_reports_space() {
        let dir = std::env::temp_dir();
        assert!(FsSpaceProbe.free_kb(&dir).is_ok());
    }
}
