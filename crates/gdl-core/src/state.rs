//! Per-download state and the JSON sidecar that persists it.
//!
//! The sidecar lives at `<output>.gdl.json` next to the destination file and
//! holds per-chunk byte counters so an interrupted download resumes without
//! redoing completed work. It is an optimization, never a source of truth:
//! an unreadable sidecar is treated as absent and overwritten on the next
//! checkpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

/// Suffix appended to the output path to form the sidecar path.
pub const SIDECAR_SUFFIX: &str = ".gdl.json";

/// Sidecar path for an output file: `file.iso` → `file.iso.gdl.json`.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_owned();
    os.push(SIDECAR_SUFFIX);
    PathBuf::from(os)
}

/// One contiguous byte range `[start, end]` of the target file, owned by a
/// single fetcher. `downloaded` only ever grows and is read atomically by
/// the checkpointer while the owning fetcher adds to it.
#[derive(Debug)]
pub struct Chunk {
    pub id: u32,
    /// First byte offset (inclusive).
    pub start: i64,
    /// Last byte offset (inclusive). `start - 1` for a zero-length chunk.
    pub end: i64,
    /// Bytes of this chunk already on disk.
    pub downloaded: AtomicI64,
}

impl Chunk {
    pub fn new(id: u32, start: i64, end: i64) -> Self {
        Self {
            id,
            start,
            end,
            downloaded: AtomicI64::new(0),
        }
    }

    /// Total bytes this chunk covers.
    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn downloaded(&self) -> i64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded() >= self.len()
    }
}

/// State of one active download: the resolved URL, destination, total size,
/// and the chunk partition of `[0, size)`.
///
/// `url` may be rewritten once on resume (origins hand out fresh signed
/// links) before any fetcher starts; everything except the chunk counters is
/// immutable after that.
#[derive(Debug)]
pub struct DownloadState {
    pub url: String,
    pub file: PathBuf,
    pub size: i64,
    pub concurrency: usize,
    pub chunks: Vec<Chunk>,
}

impl DownloadState {
    pub fn new(
        url: String,
        file: PathBuf,
        size: i64,
        concurrency: usize,
        chunks: Vec<Chunk>,
    ) -> Self {
        Self {
            url,
            file,
            size,
            concurrency,
            chunks,
        }
    }

    /// Sum of chunk counters; the progress sink is seeded with this on resume.
    pub fn total_downloaded(&self) -> i64 {
        self.chunks.iter().map(|c| c.downloaded()).sum()
    }

    pub fn all_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.is_complete())
    }
}

/// A loaded sidecar is only usable when it matches what we are about to
/// download; the stored URL is always discarded for the freshly resolved one.
pub fn is_compatible(state: &DownloadState, probed_size: i64, output: &Path) -> bool {
    state.size == probed_size && state.file == output
}

/// Wire form of the sidecar. Field names are stable; unknown fields are
/// ignored on load and missing fields are parse errors.
#[derive(Debug, Serialize, Deserialize)]
struct SidecarFile {
    url: String,
    file: String,
    size: i64,
    concurrency: usize,
    chunks: Vec<SidecarChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SidecarChunk {
    id: u32,
    start: i64,
    end: i64,
    downloaded: i64,
}

impl From<SidecarFile> for DownloadState {
    fn from(s: SidecarFile) -> Self {
        DownloadState {
            url: s.url,
            file: PathBuf::from(s.file),
            size: s.size,
            concurrency: s.concurrency,
            chunks: s
                .chunks
                .into_iter()
                .map(|c| Chunk {
                    id: c.id,
                    start: c.start,
                    end: c.end,
                    downloaded: AtomicI64::new(c.downloaded),
                })
                .collect(),
        }
    }
}

/// Outcome of reading the sidecar. Malformed is reported separately so the
/// caller can log it, but both non-State cases mean "plan from scratch".
#[derive(Debug)]
pub enum SidecarLoad {
    State(DownloadState),
    Absent,
    Malformed,
}

/// Reads and decodes the sidecar. Never deletes a malformed file; it gets
/// overwritten by the next checkpoint.
pub fn load_sidecar(path: &Path) -> SidecarLoad {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SidecarLoad::Absent,
        Err(_) => return SidecarLoad::Malformed,
    };
    match serde_json::from_slice::<SidecarFile>(&data) {
        Ok(s) => SidecarLoad::State(s.into()),
        Err(_) => SidecarLoad::Malformed,
    }
}

/// Serializes a snapshot of `state` and replaces the sidecar.
///
/// Scalar fields are copied and each chunk counter is read with an atomic
/// load, so a save racing active fetchers never tears a value; each
/// persisted counter is a value that was really reached.
pub fn save_sidecar(path: &Path, state: &DownloadState) -> Result<()> {
    let snapshot = SidecarFile {
        url: state.url.clone(),
        file: state.file.to_string_lossy().into_owned(),
        size: state.size,
        concurrency: state.concurrency,
        chunks: state
            .chunks
            .iter()
            .map(|c| SidecarChunk {
                id: c.id,
                start: c.start,
                end: c.end,
                downloaded: c.downloaded.load(Ordering::Relaxed),
            })
            .collect(),
    };
    let data = serde_json::to_vec_pretty(&snapshot).context("failed to serialize sidecar")?;
    fs::write(path, data).with_context(|| format!("failed to write sidecar {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state(file: PathBuf) -> DownloadState {
        let chunks = vec![Chunk::new(0, 0, 499), Chunk::new(1, 500, 999)];
        chunks[0].downloaded.store(120, Ordering::Relaxed);
        DownloadState::new("https://example.com/a.bin".to_string(), file, 1000, 2, chunks)
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/a.bin")).to_string_lossy(),
            "/tmp/a.bin.gdl.json"
        );
    }

    #[test]
    fn chunk_completion() {
        let c = Chunk::new(0, 0, 9);
        assert_eq!(c.len(), 10);
        assert!(!c.is_complete());
        c.downloaded.store(10, Ordering::Relaxed);
        assert!(c.is_complete());
    }

    #[test]
    fn zero_length_chunk_is_born_complete() {
        let c = Chunk::new(0, 0, -1);
        assert_eq!(c.len(), 0);
        assert!(c.is_complete());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("a.bin");
        let sc = sidecar_path(&output);
        let state = sample_state(output.clone());
        save_sidecar(&sc, &state).unwrap();

        match load_sidecar(&sc) {
            SidecarLoad::State(loaded) => {
                assert_eq!(loaded.url, state.url);
                assert_eq!(loaded.file, output);
                assert_eq!(loaded.size, 1000);
                assert_eq!(loaded.concurrency, 2);
                assert_eq!(loaded.chunks.len(), 2);
                assert_eq!(loaded.chunks[0].downloaded(), 120);
                assert_eq!(loaded.chunks[1].downloaded(), 0);
            }
            other => panic!("expected loaded state, got {:?}", other),
        }
    }

    #[test]
    fn saved_sidecar_is_two_space_indented_json() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("a.bin");
        let sc = sidecar_path(&output);
        save_sidecar(&sc, &sample_state(output)).unwrap();
        let text = fs::read_to_string(&sc).unwrap();
        assert!(text.contains("\n  \"url\""));
        assert!(text.contains("\"chunks\""));
        assert!(text.contains("\"downloaded\""));
    }

    #[test]
    fn missing_sidecar_is_absent() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_sidecar(&dir.path().join("nope.gdl.json")),
            SidecarLoad::Absent
        ));
    }

    #[test]
    fn malformed_sidecar_reported_and_left_in_place() {
        let dir = tempdir().unwrap();
        let sc = dir.path().join("a.bin.gdl.json");
        fs::write(&sc, b"{ not json").unwrap();
        assert!(matches!(load_sidecar(&sc), SidecarLoad::Malformed));
        assert!(sc.exists());
    }

    #[test]
    fn missing_field_is_malformed() {
        let dir = tempdir().unwrap();
        let sc = dir.path().join("a.bin.gdl.json");
        // no "size"
        fs::write(
            &sc,
            br#"{ "url": "u", "file": "f", "concurrency": 1, "chunks": [] }"#,
        )
        .unwrap();
        assert!(matches!(load_sidecar(&sc), SidecarLoad::Malformed));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = tempdir().unwrap();
        let sc = dir.path().join("a.bin.gdl.json");
        fs::write(
            &sc,
            br#"{ "url": "u", "file": "f", "size": 10, "concurrency": 1, "extra": true,
                 "chunks": [ { "id": 0, "start": 0, "end": 9, "downloaded": 4, "note": "x" } ] }"#,
        )
        .unwrap();
        match load_sidecar(&sc) {
            SidecarLoad::State(s) => {
                assert_eq!(s.size, 10);
                assert_eq!(s.chunks[0].downloaded(), 4);
            }
            other => panic!("expected loaded state, got {:?}", other),
        }
    }

    #[test]
    fn compatibility_requires_size_and_path() {
        let state = sample_state(PathBuf::from("/tmp/a.bin"));
        assert!(is_compatible(&state, 1000, Path::new("/tmp/a.bin")));
        assert!(!is_compatible(&state, 999, Path::new("/tmp/a.bin")));
        assert!(!is_compatible(&state, 1000, Path::new("/tmp/b.bin")));
    }
}
