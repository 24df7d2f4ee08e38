use crate::{
    config::{Config, SheetSource},
    fetch::{FetchError, Fetcher},
    state::{StateStore, SyncState},
    twoda::{self, ConvertError},
};
use anyhow::{Context, Result};
use chrono::Local;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

/// Extension given to every generated table file.
const OUTPUT_EXT: &str = "2da";

/// What happened to one sheet during a pass.
#[derive(Debug)]
pub enum SheetOutcome {
    /// Converted output (re)generated; the file was written unless the pass
    /// was a dry run.
    Updated,
    /// Remote content identical to the last synced copy; nothing touched.
    Unchanged,
    /// URL still carries the placeholder token; never fetched.
    NotConfigured,
    FetchFailed(FetchError),
    ConversionFailed(ConvertError),
    WriteFailed(std::io::Error),
}

impl SheetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SheetOutcome::FetchFailed(_)
                | SheetOutcome::ConversionFailed(_)
                | SheetOutcome::WriteFailed(_)
        )
    }
}

#[derive(Debug)]
pub struct SheetReport {
    pub name: String,
    pub outcome: SheetOutcome,
}

/// Summary of one full pass over the configured sheets, in configured order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub reports: Vec<SheetReport>,
}

impl SyncReport {
    /// Names of the sheets whose output changed this pass.
    pub fn updated(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, SheetOutcome::Updated))
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failure()).count()
    }
}

/// Options scoped to a single pass, never process-wide state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would change without touching the output directory.
    pub dry_run: bool,
    /// Discard the persisted state first, treating every sheet as changed.
    pub force: bool,
}

/// Drives one pass: fetch each sheet, gate on the checksum of the raw CSV,
/// convert, write atomically, record the new checksum. Generic over the
/// fetch and state collaborators so tests inject stubs.
pub struct SyncEngine<F: Fetcher, S: StateStore> {
    fetcher: F,
    store: S,
    output_dir: PathBuf,
    sheets: Vec<SheetSource>,
    forced_widths: HashMap<String, HashMap<String, usize>>,
}

impl<F: Fetcher, S: StateStore> SyncEngine<F, S> {
    pub fn new(fetcher: F, store: S, config: &Config) -> Self {
        Self {
            fetcher,
            store,
            output_dir: config.output_dir.clone(),
            sheets: config.sheets.clone(),
            forced_widths: config.forced_widths.clone(),
        }
    }

    /// Run one full pass. Per-sheet failures are recorded and skipped over;
    /// only a failure to persist the state at the end is an error.
    pub async fn run(&self, opts: SyncOptions) -> Result<SyncReport> {
        let mut state = if opts.force {
            info!("force mode: discarding cached checksums");
            SyncState::new()
        } else {
            self.store.load()
        };

        let mut report = SyncReport::default();
        for sheet in &self.sheets {
            let outcome = self.sync_sheet(sheet, &mut state, opts).await;
            log_outcome(&sheet.name, &outcome);
            report.reports.push(SheetReport {
                name: sheet.name.clone(),
                outcome,
            });
        }

        self.store.save(&state).context("saving sync state")?;
        Ok(report)
    }

    async fn sync_sheet(
        &self,
        sheet: &SheetSource,
        state: &mut SyncState,
        opts: SyncOptions,
    ) -> SheetOutcome {
        if !sheet.is_configured() {
            return SheetOutcome::NotConfigured;
        }

        let csv_text = match self.fetcher.fetch(&sheet.url).await {
            Ok(text) => text,
            Err(err) => return SheetOutcome::FetchFailed(err),
        };

        // gate on the raw download, never on the converted output
        let checksum = checksum(&csv_text);
        if state.get(&sheet.name) == Some(&checksum) {
            return SheetOutcome::Unchanged;
        }

        let no_widths = HashMap::new();
        let forced = self.forced_widths.get(&sheet.name).unwrap_or(&no_widths);
        let table_text = match twoda::convert(&csv_text, &sheet.name, forced, Local::now()) {
            Ok(text) => text,
            Err(err) => return SheetOutcome::ConversionFailed(err),
        };

        let out_path = self
            .output_dir
            .join(format!("{}.{}", sheet.name, OUTPUT_EXT));
        if opts.dry_run {
            preview(&out_path, &table_text);
        } else {
            match write_atomic(&out_path, &table_text) {
                Ok(()) => info!(
                    path = %out_path.display(),
                    lines = table_text.lines().count(),
                    "wrote table"
                ),
                Err(err) => return SheetOutcome::WriteFailed(err),
            }
        }

        // a dry run advances the checksum baseline exactly like a real write
        state.insert(sheet.name.clone(), checksum);
        SheetOutcome::Updated
    }
}

/// Checksum of the raw CSV text, used only for change detection.
pub fn checksum(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Write via a sibling temp file and atomic rename so a reader never sees a
/// partially-written table.
fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn preview(path: &Path, text: &str) {
    info!("dry run: would write {}", path.display());
    for line in text.lines().take(10) {
        info!("  | {line}");
    }
}

fn log_outcome(name: &str, outcome: &SheetOutcome) {
    match outcome {
        SheetOutcome::Updated => info!(sheet = %name, "updated"),
        SheetOutcome::Unchanged => info!(sheet = %name, "unchanged (skipped)"),
        SheetOutcome::NotConfigured => {
            warn!(sheet = %name, "url not configured yet, skipping")
        }
        SheetOutcome::FetchFailed(err) => error!(sheet = %name, %err, "download failed"),
        SheetOutcome::ConversionFailed(err) => error!(sheet = %name, %err, "conversion failed"),
        SheetOutcome::WriteFailed(err) => error!(sheet = %name, %err, "write failed"),
    }
}
