use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::client::ResoApi;
use crate::config::ReplicationConfig;
use crate::error::{Error, Result};
use crate::helpers::watermark;
use crate::listing_structs::ListingsContainer;
use crate::reso::{fetch_all, fetch_metadata, ListingQuery};
use crate::substitution::LabelSubstitution;

pub(crate) const SNAPSHOT_FILE: &str = "listings.json";
pub(crate) const WATERMARK_FILE: &str = "last_updated.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunMode {
    InitialReplication,
    /// Listings modified after `since`, the previous run's watermark.
    IncrementalUpdate { since: String },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::InitialReplication => write!(f, "initial_replication"),
            RunMode::IncrementalUpdate { .. } => write!(f, "update_recent"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RunReport {
    pub(crate) mode: RunMode,
    pub(crate) records: usize,
    pub(crate) output: PathBuf,
    pub(crate) watermark: String,
}

pub(crate) struct Replicator<'a, C: ResoApi + ?Sized> {
    client: &'a C,
    config: &'a ReplicationConfig,
    page_size: u32,
    force_initial: bool,
}

impl<'a, C: ResoApi + ?Sized> Replicator<'a, C> {
    pub(crate) fn new(client: &'a C, config: &'a ReplicationConfig, page_size: u32) -> Self {
        Self {
            client,
            config,
            page_size,
            force_initial: false,
        }
    }

    /// Re-replicate everything even when a snapshot already exists.
    pub(crate) fn force_initial(mut self, force: bool) -> Self {
        self.force_initial = force;
        self
    }

    pub(crate) async fn run(&self) -> Result<RunReport> {
        self.run_at(Utc::now()).await
    }

    pub(crate) async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let index = fetch_metadata(self.client).await?;

        let data_dir = &self.config.data_dir;
        let watermark_path = data_dir.join(WATERMARK_FILE);
        let mode = self.detect_mode(data_dir, &watermark_path)?;
        info!("run mode: {}", mode);

        // advance before fetching so nothing modified mid-run is skipped next time
        let new_watermark = watermark(now, self.config.watermark_skew_minutes)?;
        write_watermark(&watermark_path, &new_watermark)?;

        let filter = match &mode {
            RunMode::InitialReplication => None,
            RunMode::IncrementalUpdate { since } => {
                Some(format!("{} gt {}", self.config.timestamp_field, since))
            }
        };
        let query = ListingQuery {
            filter: filter.as_deref(),
            page_size: self.page_size,
            expand: &self.config.expand,
            count_select: &self.config.count_select,
        };
        let engine = LabelSubstitution::new(&index, &self.config.coded_prefix);

        let records = fetch_all(self.client, &query, &engine).await?;

        let output = match &mode {
            RunMode::InitialReplication => data_dir.join(SNAPSHOT_FILE),
            RunMode::IncrementalUpdate { .. } => {
                data_dir.join(format!("updated_listings_{}.json", new_watermark))
            }
        };
        let container = ListingsContainer { records };
        container.to_json(&output, self.config.pretty)?;

        Ok(RunReport {
            mode,
            records: container.len(),
            output,
            watermark: new_watermark,
        })
    }

    fn detect_mode(&self, data_dir: &Path, watermark_path: &Path) -> Result<RunMode> {
        if self.force_initial || !data_dir.join(SNAPSHOT_FILE).is_file() {
            return Ok(RunMode::InitialReplication);
        }

        match read_watermark(watermark_path)? {
            Some(since) => Ok(RunMode::IncrementalUpdate { since }),
            None => Err(Error::MissingWatermark(watermark_path.to_path_buf())),
        }
    }
}

/// Last non-empty line of the watermark file, if there is one.
pub(crate) fn read_watermark(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string))
}

pub(crate) fn write_watermark(path: &Path, watermark: &str) -> Result<()> {
    fs::write(path, format!("{}\n", watermark))?;
    Ok(())
}
