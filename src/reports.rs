//! Report store abstraction.
//!
//! The production deployment keeps reports in an external managed database;
//! this crate only needs the narrow interface below. [`MemoryReportStore`]
//! backs tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Fields accepted when a report is created.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Evidence attached to an existing report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub url: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Public identifier, also the upload token subject.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub evidence: Vec<Evidence>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Durably create a report and return it with its public id.
    async fn create(&self, report: NewReport) -> Result<Report, StoreError>;

    /// Attach evidence. Returns the report's evidence count afterwards.
    async fn attach_evidence(&self, id: &str, evidence: Evidence) -> Result<usize, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Report>, StoreError>;
}

/// In-process report store.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: DashMap<String, Report>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id() -> String {
        format!("R-{}", uuid::Uuid::new_v4().simple())
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn create(&self, report: NewReport) -> Result<Report, StoreError> {
        let report = Report {
            id: Self::next_id(),
            title: report.title,
            description: report.description,
            evidence: Vec::new(),
            created_at: Utc::now(),
        };
        self.reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    async fn attach_evidence(&self, id: &str, evidence: Evidence) -> Result<usize, StoreError> {
        let mut report = self
            .reports
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        report.evidence.push(evidence);
        Ok(report.evidence.len())
    }

    async fn get(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(id).map(|r| r.clone()))
    }
}
