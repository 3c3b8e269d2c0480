//! Alert ledger: the persisted set of fingerprints that were already alerted.
//!
//! Loading fails open (missing or malformed file ⇒ empty ledger + warning).
//! Saving is stage-then-rename, so a crash mid-write leaves the previous file intact.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::{fs, io::AsyncWriteExt};

use crate::fingerprint::Fingerprint;

/// Suffix appended to the ledger path for the staged copy.
const STAGING_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertLedger {
    #[serde(rename = "reddit_hashes", default)]
    hashes: BTreeSet<Fingerprint>,
    /// Last successful fetch per source name.
    #[serde(
        default,
        deserialize_with = "lenient_last_checked",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    last_checked: BTreeMap<String, DateTime<Utc>>,
    /// Keys we do not own; written back untouched.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// A bad `last_checked` must not cost us the hashes; it is rebuilt on the next cycle.
fn lenient_last_checked<'de, D>(de: D) -> Result<BTreeMap<String, DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(de)?;
    Ok(serde_json::from_value(raw).unwrap_or_else(|e| {
        tracing::warn!(target: "ledger", error = %e, "ignoring malformed last_checked");
        BTreeMap::new()
    }))
}

// Older runs wrote a bare JSON array of hex digests.
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerFile {
    Legacy(Vec<Fingerprint>),
    Current(AlertLedger),
}

impl AlertLedger {
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.hashes.contains(fp)
    }

    /// Adds `fp`. Returns `false` when it was already present.
    pub fn record(&mut self, fp: Fingerprint) -> bool {
        self.hashes.insert(fp)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn mark_checked(&mut self, source: &str, at: DateTime<Utc>) {
        self.last_checked.insert(source.to_string(), at);
    }

    pub fn last_checked(&self, source: &str) -> Option<DateTime<Utc>> {
        self.last_checked.get(source).copied()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Parses either the object form or the legacy bare array.
    pub fn from_json(s: &str) -> Result<Self> {
        let file: LedgerFile = serde_json::from_str(s).context("parsing alert ledger")?;
        Ok(match file {
            LedgerFile::Legacy(hashes) => AlertLedger {
                hashes: hashes.into_iter().collect(),
                ..AlertLedger::default()
            },
            LedgerFile::Current(ledger) => ledger,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("serializing alert ledger")
    }
}

/// Owns the ledger file. One poll cycle at a time loads, mutates and saves it.
#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn staging_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(STAGING_SUFFIX);
        PathBuf::from(p)
    }

    /// Never fails: problems degrade to an empty ledger, which may re-alert old items.
    pub async fn load(&self) -> AlertLedger {
        let content = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "ledger",
                    path = %self.path.display(),
                    "ledger file missing, starting empty"
                );
                return AlertLedger::default();
            }
            Err(e) => {
                tracing::warn!(
                    target: "ledger",
                    path = %self.path.display(),
                    error = %e,
                    "ledger unreadable, starting empty"
                );
                return AlertLedger::default();
            }
        };

        match AlertLedger::from_json(&content) {
            Ok(ledger) => {
                tracing::debug!(target: "ledger", entries = ledger.len(), "ledger loaded");
                ledger
            }
            Err(e) => {
                tracing::warn!(
                    target: "ledger",
                    path = %self.path.display(),
                    error = format!("{e:#}"),
                    "ledger malformed, starting empty"
                );
                AlertLedger::default()
            }
        }
    }

    /// Atomically replaces the ledger file.
    pub async fn save(&self, ledger: &AlertLedger) -> Result<()> {
        self.write_staged(ledger).await?;
        self.commit_staged().await
    }

    /// First half of `save`: writes and fsyncs the staged copy. The live file is untouched.
    pub async fn write_staged(&self, ledger: &AlertLedger) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let staged = self.staging_path();
        let bytes = ledger.to_json()?;
        let mut file = fs::File::create(&staged)
            .await
            .with_context(|| format!("creating {}", staged.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing {}", staged.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing {}", staged.display()))?;
        Ok(staged)
    }

    /// Second half of `save`: renames the staged copy over the live file.
    pub async fn commit_staged(&self) -> Result<()> {
        let staged = self.staging_path();
        fs::rename(&staged, &self.path).await.with_context(|| {
            format!("renaming {} -> {}", staged.display(), self.path.display())
        })
    }
}
