//! Canonical feature identity shared with the attribute editor.
//!
//! A feature may be known by an explicit id, a foreign-key field or a plain
//! `id` property, and the attribute editor may namespace ids
//! (`layer.42`). Everything on the bus speaks the canonical form, resolved
//! against the editor's latest row snapshot.

use crate::feature::Feature;
use serde::{Deserialize, Serialize};

/// Canonical identifier used on the bus.
pub type CanonicalId = String;

/// One row of the attribute editor's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
}

impl SnapshotRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fid: None }
    }

    pub fn with_fid(mut self, fid: impl Into<String>) -> Self {
        self.fid = Some(fid.into());
        self
    }
}

/// Locally cached copy of the attribute editor's rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSnapshot {
    rows: Vec<SnapshotRow>,
}

impl AttributeSnapshot {
    pub fn new(rows: Vec<SnapshotRow>) -> Self {
        Self { rows }
    }

    pub fn replace(&mut self, rows: Vec<SnapshotRow>) {
        self.rows = rows;
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    /// Resolve `raw` to a snapshot row id, if any row claims it.
    ///
    /// Tried in order: exact row id, exact fid, then the part after the
    /// last `.` against row ids.
    pub fn resolve(&self, raw: &str) -> Option<CanonicalId> {
        if let Some(row) = self.rows.iter().find(|r| r.id == raw) {
            return Some(row.id.clone());
        }
        if let Some(row) = self.rows.iter().find(|r| r.fid.as_deref() == Some(raw)) {
            return Some(row.id.clone());
        }
        let (_, suffix) = raw.rsplit_once('.')?;
        self.rows.iter().find(|r| r.id == suffix).map(|r| r.id.clone())
    }

    /// Canonical form of `raw`. Unknown values (drafts) pass through.
    pub fn canonicalize(&self, raw: &str) -> CanonicalId {
        self.resolve(raw).unwrap_or_else(|| raw.to_string())
    }

    /// Canonical id of a feature.
    ///
    /// The first identity value the snapshot knows wins; otherwise the
    /// feature's most specific raw identity is used as-is.
    pub fn feature_id(&self, feature: &Feature) -> Option<CanonicalId> {
        let values = feature.identity_values();
        if let Some(id) = values.iter().find_map(|v| self.resolve(v)) {
            return Some(id);
        }
        values.into_iter().next()
    }

    /// Whether `feature` is the one `id` refers to.
    pub fn feature_matches(&self, feature: &Feature, id: &str) -> bool {
        feature.id.as_deref() == Some(id)
            || self.feature_id(feature).as_deref() == Some(id)
            || matches_suffix(feature, id)
    }
}

/// Whether any identity value of `feature` equals `id` or ends in `.id`.
pub fn matches_suffix(feature: &Feature, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    feature.identity_values().iter().any(|value| {
        value == id
            || value
                .strip_suffix(id)
                .is_some_and(|head| head.ends_with('.'))
    })
}
