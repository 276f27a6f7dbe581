//! Metrics from periodic CSV exports.
//!
//! An exporter drops `container_metrics_<timestamp>.csv` files into a
//! directory; the newest file by name wins. Each row is one container with
//! its averaged utilization over the export window.

use std::path::{Path, PathBuf};

use scalewatch_core::{BoxFuture, MetricSample, ResourceReadings, Window};
use tracing::debug;

use crate::source::{MetricsError, MetricsSource, aggregate};

const FILE_PREFIX: &str = "container_metrics_";
const FILE_SUFFIX: &str = ".csv";

pub struct CsvSource {
    dir: PathBuf,
}

/// One parsed export row.
#[derive(Debug, Clone, PartialEq)]
struct Row {
    container_id: Option<String>,
    container_name: String,
    readings: ResourceReadings,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest export file in the directory, if any.
    pub async fn latest_export(&self) -> Result<Option<PathBuf>, MetricsError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| unavailable(&self.dir, e))?;

        let mut newest: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            if newest.as_ref().is_none_or(|(n, _)| name > *n) {
                newest = Some((name, entry.path()));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    async fn rows_for(&self, service_id: &str, window: Window) -> Result<Vec<Row>, MetricsError> {
        let Some(path) = self.latest_export().await? else {
            return Err(MetricsError::Unavailable(format!(
                "no {FILE_PREFIX}*{FILE_SUFFIX} export in {}",
                self.dir.display()
            )));
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(&path, e))?;
        let rows: Vec<Row> = parse(&content)?
            .into_iter()
            .filter(|r| r.container_name == service_id)
            .collect();

        debug!(path = %path.display(), service = %service_id, rows = rows.len(), "csv export read");
        if rows.is_empty() {
            return Err(MetricsError::NoData {
                service_id: service_id.to_string(),
                start: window.start,
                end: window.end,
            });
        }
        Ok(rows)
    }
}

impl MetricsSource for CsvSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn fetch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<MetricSample, MetricsError>> {
        Box::pin(async move {
            let rows = self.rows_for(service_id, window).await?;
            aggregate(service_id, window, rows.iter().map(|r| &r.readings))
        })
    }

    fn fetch_batch<'a>(
        &'a self,
        service_id: &'a str,
        window: Window,
    ) -> BoxFuture<'a, Result<Vec<MetricSample>, MetricsError>> {
        Box::pin(async move {
            let rows = self.rows_for(service_id, window).await?;
            rows.into_iter()
                .map(|row| {
                    let sample = MetricSample::new(service_id, window, row.readings)?;
                    Ok(match row.container_id {
                        Some(id) => sample.with_instance(id),
                        None => sample,
                    })
                })
                .collect()
        })
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> MetricsError {
    MetricsError::Unavailable(format!("{}: {e}", path.display()))
}

/// Column positions resolved from the header line.
struct Columns {
    container_id: Option<usize>,
    container_name: usize,
    cpu: usize,
    memory: usize,
    disk: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, MetricsError> {
        let names = split(header);
        let find = |name: &str| names.iter().position(|n| n == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                MetricsError::Unavailable(format!("csv export missing column {name}"))
            })
        };
        Ok(Self {
            container_id: find("container_id"),
            container_name: require("container_name")?,
            cpu: require("avg_cpu")?,
            memory: require("avg_memory")?,
            disk: find("avg_disk"),
        })
    }
}

fn parse(content: &str) -> Result<Vec<Row>, MetricsError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(header)?;

    lines
        .enumerate()
        .map(|(i, line)| {
            let fields = split(line);
            let text = |idx: usize| {
                fields
                    .get(idx)
                    .map(String::as_str)
                    .filter(|v| !v.is_empty())
            };
            let number = |idx: Option<usize>| -> Result<Option<f64>, MetricsError> {
                match idx.and_then(text) {
                    Some(v) => v.parse::<f64>().map(Some).map_err(|_| {
                        MetricsError::Unavailable(format!("csv line {}: bad number {v:?}", i + 2))
                    }),
                    None => Ok(None),
                }
            };

            let container_name = text(columns.container_name)
                .ok_or_else(|| {
                    MetricsError::Unavailable(format!("csv line {}: empty container_name", i + 2))
                })?
                .to_string();

            Ok(Row {
                container_id: columns.container_id.and_then(text).map(str::to_string),
                container_name,
                readings: ResourceReadings {
                    cpu: number(Some(columns.cpu))?,
                    memory: number(Some(columns.memory))?,
                    disk: number(columns.disk)?,
                },
            })
        })
        .collect()
}

/// Split one line into fields. Double-quoted fields may contain commas and
/// `""` escapes; whitespace around each field is trimmed.
fn split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
