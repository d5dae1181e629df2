//! INI configuration file.
//!
//! ```ini
//! [sections]
//! count = 5
//! width = 3.0
//! ; or explicit per-section widths, left to right
//! widths = 3.0,3.0,3.0,3.0,3.0
//! turn_on_delay = 1.0
//! turn_off_delay = 1.0
//! overlap_tolerance = 0.1
//! look_ahead_distance = 1.0
//! minimum_speed = 0.5
//!
//! [control]
//! cycle_interval_ms = 100
//!
//! [coverage]
//! cell_size = 10.0
//! ```
//!
//! Missing keys take their defaults. Malformed values are reported with
//! their section and key; values out of range are rejected, never clamped.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::control_loop::DEFAULT_CYCLE_INTERVAL;
use crate::coverage::DEFAULT_CELL_SIZE;
use crate::sections::{delay_from_secs, ConfigError, SectionConfiguration};

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "swathe";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Allowed control period in milliseconds.
pub const MIN_CYCLE_INTERVAL_MS: u64 = 5;
pub const MAX_CYCLE_INTERVAL_MS: u64 = 1000;

/// Largest accepted coverage grid cell (meters).
pub const MAX_CELL_SIZE: f64 = 1000.0;

const SECTIONS: &str = "sections";
const CONTROL: &str = "control";
const COVERAGE: &str = "coverage";

/// Errors loading or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid INI syntax: {0}")]
    Syntax(String),

    #[error("Invalid value for [{section}] {key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("[{section}] {key} = {value} is out of range ({expected})")]
    OutOfRange {
        section: &'static str,
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Section(#[from] ConfigError),

    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

/// Default location of the config file: `<config dir>/swathe/config.ini`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Control-loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub cycle_interval: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
        }
    }
}

/// Coverage map settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageSettings {
    pub cell_size: f64,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

/// Parsed and validated configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub sections: SectionConfiguration,
    pub control: ControlSettings,
    pub coverage: CoverageSettings,
}

impl ConfigFile {
    /// Load from the default location, or defaults when no file exists there.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path().ok_or(ConfigFileError::NoConfigDir)?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            sections = config.sections.section_count(),
            "Loaded configuration file"
        );
        Ok(config)
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigFileError::Syntax(e.to_string()))?;

        for name in ini.sections().flatten() {
            if ![SECTIONS, CONTROL, COVERAGE].contains(&name) {
                tracing::warn!(section = name, "Ignoring unknown config section");
            }
        }

        let sections = match ini.section(Some(SECTIONS)) {
            Some(props) => parse_sections(props)?,
            None => SectionConfiguration::default(),
        };

        let mut control = ControlSettings::default();
        if let Some(props) = ini.section(Some(CONTROL)) {
            if let Some(ms) = parse_value::<u64>(props, CONTROL, "cycle_interval_ms")? {
                if !(MIN_CYCLE_INTERVAL_MS..=MAX_CYCLE_INTERVAL_MS).contains(&ms) {
                    return Err(ConfigFileError::OutOfRange {
                        section: CONTROL,
                        key: "cycle_interval_ms",
                        value: ms.to_string(),
                        expected: "5..=1000",
                    });
                }
                control.cycle_interval = Duration::from_millis(ms);
            }
        }

        let mut coverage = CoverageSettings::default();
        if let Some(props) = ini.section(Some(COVERAGE)) {
            if let Some(cell_size) = parse_value::<f64>(props, COVERAGE, "cell_size")? {
                if !(cell_size > 0.0 && cell_size <= MAX_CELL_SIZE) {
                    return Err(ConfigFileError::OutOfRange {
                        section: COVERAGE,
                        key: "cell_size",
                        value: cell_size.to_string(),
                        expected: "greater than 0, at most 1000",
                    });
                }
                coverage.cell_size = cell_size;
            }
        }

        Ok(Self {
            sections,
            control,
            coverage,
        })
    }

    /// Render as INI text that [`ConfigFile::parse`] accepts.
    pub fn to_ini_string(&self) -> String {
        let s = &self.sections;
        let widths = s
            .section_widths()
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut out = String::new();
        let _ = writeln!(out, "[{}]", SECTIONS);
        let _ = writeln!(out, "count = {}", s.section_count());
        let _ = writeln!(out, "widths = {}", widths);
        let _ = writeln!(out, "turn_on_delay = {}", s.turn_on_delay().as_secs_f64());
        let _ = writeln!(out, "turn_off_delay = {}", s.turn_off_delay().as_secs_f64());
        let _ = writeln!(out, "overlap_tolerance = {}", s.overlap_tolerance());
        let _ = writeln!(out, "look_ahead_distance = {}", s.look_ahead_distance());
        let _ = writeln!(out, "minimum_speed = {}", s.minimum_speed());
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", CONTROL);
        let _ = writeln!(
            out,
            "cycle_interval_ms = {}",
            self.control.cycle_interval.as_millis()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", COVERAGE);
        let _ = writeln!(out, "cell_size = {}", self.coverage.cell_size);
        out
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ini_string())?;
        tracing::info!(path = %path.display(), "Saved configuration file");
        Ok(())
    }
}

fn parse_sections(props: &Properties) -> Result<SectionConfiguration, ConfigFileError> {
    let count = parse_value::<usize>(props, SECTIONS, "count")?;
    let width = parse_value::<f64>(props, SECTIONS, "width")?;

    let widths = match raw_value(props, "widths") {
        Some(list) => {
            let widths = list
                .split(',')
                .map(|w| w.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigFileError::InvalidValue {
                    section: SECTIONS,
                    key: "widths",
                    value: list.to_string(),
                })?;
            if let Some(count) = count {
                if count != widths.len() {
                    return Err(ConfigError::WidthCountMismatch {
                        count,
                        widths: widths.len(),
                    }
                    .into());
                }
            }
            if width.is_some() {
                tracing::warn!("Both width and widths given, using widths");
            }
            widths
        }
        None => {
            let defaults = SectionConfiguration::default();
            let count = count.unwrap_or(defaults.section_count());
            let width = width.unwrap_or(defaults.section_widths()[0]);
            return build_sections(props, SectionConfiguration::uniform(count, width)?);
        }
    };

    let mut config = SectionConfiguration::default();
    config.set_section_widths(widths)?;
    build_sections(props, config)
}

/// Apply the timing and tolerance keys on top of a configuration with widths set.
fn build_sections(
    props: &Properties,
    mut config: SectionConfiguration,
) -> Result<SectionConfiguration, ConfigFileError> {
    if let Some(secs) = parse_value::<f64>(props, SECTIONS, "turn_on_delay")? {
        config.set_turn_on_delay(delay_from_secs("turn-on delay", secs)?)?;
    }
    if let Some(secs) = parse_value::<f64>(props, SECTIONS, "turn_off_delay")? {
        config.set_turn_off_delay(delay_from_secs("turn-off delay", secs)?)?;
    }
    if let Some(meters) = parse_value::<f64>(props, SECTIONS, "overlap_tolerance")? {
        config.set_overlap_tolerance(meters)?;
    }
    if let Some(meters) = parse_value::<f64>(props, SECTIONS, "look_ahead_distance")? {
        config.set_look_ahead_distance(meters)?;
    }
    if let Some(speed) = parse_value::<f64>(props, SECTIONS, "minimum_speed")? {
        config.set_minimum_speed(speed)?;
    }
    Ok(config)
}

/// Value with any trailing `;`/`#` comment removed, `None` when absent or empty.
fn raw_value<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props
        .get(key)
        .map(|v| v.split([';', '#']).next().unwrap_or("").trim())
        .filter(|v| !v.is_empty())
}

fn parse_value<T: std::str::FromStr>(
    props: &Properties,
    section: &'static str,
    key: &'static str,
) -> Result<Option<T>, ConfigFileError> {
    raw_value(props, key)
        .map(|v| {
            v.parse::<T>().map_err(|_| ConfigFileError::InvalidValue {
                section,
                key,
                value: v.to_string(),
            })
        })
        .transpose()
}
