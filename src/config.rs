use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

/// Marker left in a sheet URL that has not been filled in yet. Sheets whose
/// URL still contains it are skipped without ever being fetched.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_SHEET_ID";

/// One published sheet tab to sync. `name` doubles as the output filename
/// stem and the checksum-store key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSource {
    pub name: String,
    pub url: String,
}

impl SheetSource {
    pub fn is_configured(&self) -> bool {
        !self.url.contains(PLACEHOLDER_TOKEN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the generated .2da files are written to, typically the game
    /// server's override folder.
    pub output_dir: PathBuf,
    /// JSON file tracking checksums of the last-synced sheets.
    #[serde(default = "Config::default_state_file")]
    pub state_file: PathBuf,
    /// Optional log file; log output is mirrored here as well as stdout.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Seconds between passes in watch mode.
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-request timeout for sheet downloads.
    #[serde(default = "Config::default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Sheets to sync, processed in listed order.
    pub sheets: Vec<SheetSource>,
    /// Minimum column widths, keyed by sheet name then column label. Widths
    /// are auto-detected; entries here only set a floor.
    #[serde(default)]
    pub forced_widths: HashMap<String, HashMap<String, usize>>,
}

impl Config {
    fn default_state_file() -> PathBuf {
        PathBuf::from("sync_state.json")
    }

    fn default_poll_interval() -> u64 {
        300
    }

    fn default_fetch_timeout() -> u64 {
        30
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sheets.is_empty() {
            bail!("config lists no sheets");
        }
        let mut seen = HashSet::new();
        for sheet in &self.sheets {
            if sheet.name.trim().is_empty() {
                bail!("sheet with empty name");
            }
            if !seen.insert(sheet.name.as_str()) {
                bail!("duplicate sheet name: {}", sheet.name);
            }
        }
        Ok(())
    }

    /// Starter config for a typical five-tab setup. The URLs carry
    /// [`PLACEHOLDER_TOKEN`] and must be replaced with real published-CSV
    /// links before anything will sync.
    pub fn example() -> Self {
        let sheet = |name: &str, gid: &str| SheetSource {
            name: name.to_string(),
            url: format!(
                "https://docs.google.com/spreadsheets/d/{PLACEHOLDER_TOKEN}/pub?gid={gid}&single=true&output=csv"
            ),
        };
        let widths = |entries: &[(&str, usize)]| -> HashMap<String, usize> {
            entries.iter().map(|(c, w)| (c.to_string(), *w)).collect()
        };
        Self {
            output_dir: PathBuf::from("override"),
            state_file: Self::default_state_file(),
            log_file: Some(PathBuf::from("sync.log")),
            poll_interval_secs: Self::default_poll_interval(),
            fetch_timeout_secs: Self::default_fetch_timeout(),
            sheets: vec![
                sheet("core_package", "0"),
                sheet("enc_dynamic", "123456789"),
                sheet("enc_hub", "987654321"),
                sheet("ai_hub", "111222333"),
                sheet("core_admin", "444555666"),
            ],
            forced_widths: HashMap::from([
                (
                    "core_package".to_string(),
                    widths(&[
                        ("PACKAGE", 20),
                        ("SCRIPT", 20),
                        ("BOOT_SCRIPT", 20),
                        ("SHUTDOWN_SCRIPT", 20),
                        ("DEBUG_VAR", 18),
                    ]),
                ),
                (
                    "enc_dynamic".to_string(),
                    widths(&[("LABEL", 16), ("MOB_TABLE", 20)]),
                ),
                (
                    "ai_hub".to_string(),
                    widths(&[("SYSTEM", 16), ("SCRIPT", 20), ("DEBUG_VAR", 24)]),
                ),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_sheet_names_are_rejected() {
        let mut config = Config::example();
        let dup = config.sheets[0].clone();
        config.sheets.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_sheet_list_is_rejected() {
        let mut config = Config::example();
        config.sheets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_round_trips_through_json() {
        let text = serde_json::to_string_pretty(&Config::example()).unwrap();
        let parsed: Config = serde_json::from_str(&text).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.sheets.len(), 5);
        assert!(parsed.sheets.iter().all(|s| !s.is_configured()));
    }

    #[test]
    fn test_placeholder_detection() {
        let unconfigured = SheetSource {
            name: "enc_hub".into(),
            url: format!("https://docs.google.com/spreadsheets/d/{PLACEHOLDER_TOKEN}/pub"),
        };
        let configured = SheetSource {
            name: "enc_hub".into(),
            url: "https://docs.google.com/spreadsheets/d/abc123/pub".into(),
        };
        assert!(!unconfigured.is_configured());
        assert!(configured.is_configured());
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let parsed: Config = serde_json::from_str(
            r#"{"output_dir": "override", "sheets": [{"name": "enc_hub", "url": "https://example.test/pub"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.state_file, PathBuf::from("sync_state.json"));
        assert_eq!(parsed.poll_interval_secs, 300);
        assert_eq!(parsed.fetch_timeout_secs, 30);
        assert!(parsed.log_file.is_none());
        assert!(parsed.forced_widths.is_empty());
    }
}
