//! Sample source abstraction for the hardware bridge feed.
//!
//! Provides a unified trait for reading samples from different sources:
//! pre-loaded vectors (replay and tests) and JSON lines (stdin or a file).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::clock::Clock;
use crate::types::{Reading, Sample};

/// Events produced by a sample source.
pub enum SampleEvent {
    /// A valid sample was read.
    Sample(Sample),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where samples come from.
///
/// Implementations handle format parsing and pacing internally.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Read the next sample from the source.
    ///
    /// Returns `SampleEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable errors (e.g. the reader failed).
    async fn next_sample(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging (e.g. "replay", "stdin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Vec Source (replay)
// ============================================================================

/// Replays pre-loaded samples with optional inter-sample delay.
pub struct VecSource {
    samples: std::vec::IntoIter<Sample>,
    delay_ms: u64,
    yielded_first: bool,
}

impl VecSource {
    pub fn new(samples: Vec<Sample>, delay_ms: u64) -> Self {
        Self {
            samples: samples.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl SampleSource for VecSource {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.samples.next() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SampleEvent::Sample(s))
            }
            None => Ok(SampleEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Lines Source (stdin / file)
// ============================================================================

/// One line of the bridge feed.
///
/// ```json
/// {"device":"gs1_rpm","kind":"measurement","instant":1500,"average":1480}
/// {"device":"pmp_clp_switch","kind":"switch","on":true,"timestamp":"2024-05-01T06:00:00Z"}
/// ```
///
/// A missing timestamp is stamped with the service clock on arrival. The
/// equipment workers restamp every sample on receipt, so the field only
/// matters to callers reading the source directly.
#[derive(Debug, Deserialize)]
struct WireSample {
    device: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    reading: Reading,
}

/// Reads JSON-formatted samples, one per line.
///
/// Used with the bridge or a recorded feed:
/// `bridge-dump | ./engine-room --stdin`
pub struct JsonLinesSource<R> {
    reader: R,
    name: String,
    clock: Clock,
    delay_ms: u64,
    yielded_first: bool,
    line_buffer: String,
    line_number: u64,
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin(clock: Clock) -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()), "stdin", clock)
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    /// Open a recorded feed. `delay_ms` paces the replay.
    pub async fn open(path: &Path, clock: Clock, delay_ms: u64) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open sample feed {}", path.display()))?;
        let mut source = Self::from_reader(BufReader::new(file), path.display().to_string(), clock);
        source.delay_ms = delay_ms;
        Ok(source)
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn from_reader(reader: R, name: impl Into<String>, clock: Clock) -> Self {
        Self {
            reader,
            name: name.into(),
            clock,
            delay_ms: 0,
            yielded_first: false,
            line_buffer: String::with_capacity(256),
            line_number: 0,
        }
    }

    fn parse_line(&self, line: &str) -> Result<Sample, serde_json::Error> {
        let wire: WireSample = serde_json::from_str(line)?;
        Ok(Sample::new(
            wire.device,
            wire.timestamp.unwrap_or_else(|| self.clock.now()),
            wire.reading,
        ))
    }
}

#[async_trait]
impl<R> SampleSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SampleEvent::Eof);
            }
            self.line_number += 1;
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match self.parse_line(line) {
                Ok(sample) => {
                    self.yielded_first = true;
                    return Ok(SampleEvent::Sample(sample));
                }
                Err(e) => {
                    // Skip malformed lines and keep reading
                    tracing::warn!(source = %self.name, line = self.line_number, "Failed to parse sample: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
