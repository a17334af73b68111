use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod bytes;
pub mod commit;
pub mod condition;
pub mod graphics;
pub mod item_get;
pub mod layout;
pub mod location;
pub mod messages;
pub mod npc;
pub mod objects;
pub mod rom;
pub mod table;
pub mod trigger;
pub mod writer;

#[cfg(test)]
mod testing;

pub use rom::{Integrity, Rom};
pub use writer::Writer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepackSettings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default = "default_true")]
    pub verify_crc: bool,
    #[serde(default)]
    pub verify_round_trip: bool,
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

impl RepackSettings {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Error)]
pub enum RepackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("image rejected: expected CRC32 {expected:#010x}, found {actual:#010x}")]
    Integrity { expected: u32, actual: u32 },
    #[error("inconsistent {what}: {detail}")]
    DecodeInconsistency { what: String, detail: String },
    #[error(
        "{region} region exhausted placing {label}: {len} bytes do not fit in \
         [{start:#x}, {end:#x}) at {position:#x}"
    )]
    AllocationExhausted {
        region: &'static str,
        label: String,
        start: usize,
        end: usize,
        position: usize,
        len: usize,
    },
    #[error("no {kind} matches {id:#x}")]
    MissingLookup { kind: &'static str, id: usize },
    #[error("cannot encode {what}: {detail}")]
    Encode { what: String, detail: String },
    #[error("{kind} {id:#x} changed size: expected {expected} bytes, found {actual}")]
    FixedSizeChanged {
        kind: &'static str,
        id: usize,
        expected: usize,
        actual: usize,
    },
    #[error("tileset {tileset:#x}: tile {tile:#x} and its alternate disagree on the alternate flag")]
    AlternateMismatch { tileset: usize, tile: usize },
}

pub type Result<T> = std::result::Result<T, RepackError>;

impl RepackError {
    pub(crate) fn decode(what: impl Into<String>, detail: impl Into<String>) -> Self {
        RepackError::DecodeInconsistency {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn encode(what: impl Into<String>, detail: impl Into<String>) -> Self {
        RepackError::Encode {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

pub fn run(settings: RepackSettings) -> Result<()> {
    if !settings.input_path.exists() {
        return Err(RepackError::Config(format!(
            "Input path does not exist: {}",
            settings.input_path.display()
        )));
    }

    debug!("{settings:?}");
    let original = fs::read(&settings.input_path)?;
    let integrity = if settings.verify_crc {
        Integrity::Expect(layout::EXPECTED_CRC32)
    } else {
        Integrity::Skip
    };

    let mut rom = Rom::load(original, integrity)?;
    info!(
        "decoded {} locations ({} used), {} objects, {} npcs, {} triggers",
        rom.locations.len(),
        rom.locations.iter().filter(|l| l.used).count(),
        rom.objects.len(),
        rom.npcs.len(),
        rom.triggers.len()
    );

    if let Some(dump_path) = settings.dump_path.as_ref() {
        fs::write(dump_path, rom.dump_json()?)?;
        info!("wrote record dump to {}", dump_path.display());
    }

    let report = rom.commit()?;
    for region in &report.regions {
        debug!(
            "{}: {} requests, {:#x} of {:#x} bytes used",
            region.name,
            region.requests,
            region.used,
            region.capacity
        );
    }

    if settings.verify_round_trip {
        let reloaded = Rom::load(rom.image().to_vec(), Integrity::Skip)?;
        let diffs = rom.diff_records(&reloaded);
        if !diffs.is_empty() {
            return Err(RepackError::decode("round trip", diffs.join(", ")));
        }
        info!("round trip verified");
    }

    if let Some(parent) = settings.output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&settings.output_path, rom.image())?;
    info!("wrote {}", settings.output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_image;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("repacker-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn settings_defaults_from_json() {
        let dir = scratch("settings");
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"input_path": "in.nes", "output_path": "out/out.nes"}"#).unwrap();
        let settings = RepackSettings::from_json_file(&path).unwrap();
        assert!(settings.verify_crc);
        assert!(!settings.verify_round_trip);
        assert_eq!(settings.dump_path, None);
        assert_eq!(settings.output_path, PathBuf::from("out/out.nes"));
    }

    #[test]
    fn run_repacks_and_verifies() {
        let dir = scratch("run");
        let input_path = dir.join("in.nes");
        fs::write(&input_path, sample_image().build()).unwrap();
        let settings = RepackSettings {
            input_path,
            output_path: dir.join("nested").join("out.nes"),
            verify_crc: false,
            verify_round_trip: true,
            dump_path: Some(dir.join("dump.json")),
            debug: false,
        };
        run(settings.clone()).unwrap();

        let output = fs::read(&settings.output_path).unwrap();
        assert_eq!(output.len(), layout::IMAGE_LEN);
        assert!(fs::read_to_string(dir.join("dump.json")).unwrap().contains("\"locations\""));
    }

    #[test]
    fn run_rejects_unknown_image() {
        let dir = scratch("crc");
        let input_path = dir.join("in.nes");
        fs::write(&input_path, sample_image().build()).unwrap();
        let err = run(RepackSettings {
            input_path,
            output_path: dir.join("out.nes"),
            verify_crc: true,
            verify_round_trip: false,
            dump_path: None,
            debug: false,
        })
        .unwrap_err();
        assert!(matches!(err, RepackError::Integrity { .. }));

        let missing = run(RepackSettings {
            input_path: dir.join("missing.nes"),
            output_path: dir.join("out.nes"),
            verify_crc: false,
            verify_round_trip: false,
            dump_path: None,
            debug: false,
        });
        assert!(matches!(missing, Err(RepackError::Config(_))));
    }
}
