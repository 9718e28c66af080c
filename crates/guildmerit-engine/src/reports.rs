use async_trait::async_trait;
use guildmerit_core::ports::ReportSink;
use guildmerit_core::{AdapterError, AdapterResult, RenderedAudit, StateSnapshot};
use std::path::{Path, PathBuf};
use tracing::info;

pub const AUDIT_JSON_FILE: &str = "audit.json";
pub const AUDIT_MARKDOWN_FILE: &str = "audit.md";
pub const ACTIVITY_MARKDOWN_FILE: &str = "activity.md";

/// Writes reports under `<data_dir>/reports` and snapshots under `<data_dir>/snapshots`
#[derive(Debug, Clone)]
pub struct FileReportSink {
    reports_dir: PathBuf,
    snapshots_dir: PathBuf,
}

async fn write_file(path: &Path, contents: &str) -> AdapterResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| AdapterError::Report(format!("Failed to write {}: {}", path.display(), e)))
}

async fn ensure_dir(dir: &Path) -> AdapterResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AdapterError::Report(format!("Failed to create {}: {}", dir.display(), e)))
}

impl FileReportSink {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            reports_dir: data_dir.as_ref().join("reports"),
            snapshots_dir: data_dir.as_ref().join("snapshots"),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn write_report(&self, report: &RenderedAudit) -> AdapterResult<()> {
        ensure_dir(&self.reports_dir).await?;

        let json = self.reports_dir.join(AUDIT_JSON_FILE);
        let markdown = self.reports_dir.join(AUDIT_MARKDOWN_FILE);
        write_file(&json, &report.json).await?;
        write_file(&markdown, &report.markdown).await?;
        info!("Audit report written to {} and {}", json.display(), markdown.display());
        Ok(())
    }

    async fn write_activity(&self, markdown: &str) -> AdapterResult<()> {
        ensure_dir(&self.reports_dir).await?;

        let path = self.reports_dir.join(ACTIVITY_MARKDOWN_FILE);
        write_file(&path, markdown).await?;
        info!("Activity report written to {}", path.display());
        Ok(())
    }

    async fn write_snapshot(&self, snapshot: &StateSnapshot) -> AdapterResult<()> {
        let documents = snapshot
            .documents()
            .map_err(|e| AdapterError::Report(e.to_string()))?;

        ensure_dir(&self.snapshots_dir).await?;
        let dir = self.snapshots_dir.join(snapshot.dir_name());
        // fails when the directory already exists
        tokio::fs::create_dir(&dir).await.map_err(|e| {
            AdapterError::Report(format!("Failed to create snapshot {}: {}", dir.display(), e))
        })?;

        for (name, contents) in &documents {
            write_file(&dir.join(name), contents).await?;
        }
        info!("Snapshot with {} documents written to {}", documents.len(), dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());
        let report = RenderedAudit {
            json: "{}".to_string(),
            markdown: "# Audit\n".to_string(),
        };

        sink.write_report(&report).await.unwrap();

        let reports = dir.path().join("reports");
        assert_eq!(std::fs::read_to_string(reports.join("audit.json")).unwrap(), "{}");
        assert_eq!(std::fs::read_to_string(reports.join("audit.md")).unwrap(), "# Audit\n");
    }

    #[tokio::test]
    async fn test_unwritable_location_is_a_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let sink = FileReportSink::new(&blocker);
        let report = RenderedAudit {
            json: String::new(),
            markdown: String::new(),
        };
        assert!(matches!(
            sink.write_report(&report).await,
            Err(AdapterError::Report(_))
        ));
        assert!(matches!(
            sink.write_activity("# Activity").await,
            Err(AdapterError::Report(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_activity_next_to_audit() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());

        sink.write_activity("# Activity Feed (read-only)\n").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("reports").join("activity.md"));
        assert_eq!(written.unwrap(), "# Activity Feed (read-only)\n");
    }

    fn state(run_id: &str) -> StateSnapshot {
        let at = Utc.with_ymd_and_hms(2024, 3, 31, 8, 0, 0).unwrap();
        StateSnapshot {
            generated_at: at,
            org: "acme".to_string(),
            run_id: run_id.to_string(),
            period_start: at - chrono::Duration::days(30),
            period_end: at,
            identities: Vec::new(),
            scores: Vec::new(),
            contributors: Vec::new(),
            member_roles: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_snapshots_are_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());

        sink.write_snapshot(&state("aaaa0001")).await.unwrap();
        sink.write_snapshot(&state("aaaa0002")).await.unwrap();

        let snapshots = dir.path().join("snapshots");
        let mut dirs: Vec<String> = std::fs::read_dir(&snapshots)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        assert_eq!(
            dirs,
            vec!["2024-03-31T08-00-00-aaaa0001", "2024-03-31T08-00-00-aaaa0002"]
        );
        assert!(snapshots.join(&dirs[0]).join("meta.json").exists());
        assert!(snapshots.join(&dirs[0]).join("roles.json").exists());

        // same run id again must not overwrite
        assert!(matches!(
            sink.write_snapshot(&state("aaaa0001")).await,
            Err(AdapterError::Report(_))
        ));
    }
}
