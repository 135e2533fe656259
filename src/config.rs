use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::{Error, Result};
use crate::retention::{
    DiskSpaceRetentionPolicy, FileCountRetentionPolicy, FreeDiskSpaceRetentionPolicy,
    RetentionPolicy,
};
use crate::rotation::{
    FixedTimeRotationPolicy, IntervalRotationPolicy, RotationPolicy, SizeRotationPolicy,
};

/// Parse a size string with optional units (K/M/G, case-insensitive), defaulting to KB if no unit.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, unit) = if s.chars().last().unwrap().is_alphabetic() {
        let len = s.len();
        let num_part = &s[..len - 1];
        let unit_char = s.chars().last().unwrap().to_ascii_uppercase();
        (num_part, unit_char)
    } else {
        (s, 'K') // Default to KB
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier = match unit {
        'K' => 1024,
        'M' => 1024 * 1024,
        'G' => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid unit: {}, supported: K/M/G", unit)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Size value that can be a number or string with units.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(u64),
    String(String),
}

impl SizeValue {
    fn to_bytes(&self) -> std::result::Result<u64, String> {
        match self {
            SizeValue::Number(n) => parse_size(&n.to_string()),
            SizeValue::String(s) => parse_size(s),
        }
    }
}

fn de_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    SizeValue::deserialize(deserializer)?
        .to_bytes()
        .map_err(de::Error::custom)
}

/// Parse a "HH:MM" time of day into a minute-of-day offset.
fn parse_time_of_day(s: &str) -> Result<u16> {
    let (hour, minute) = s
        .split_once(':')
        .ok_or_else(|| Error::Config(format!("invalid time of day: {s}, expected HH:MM")))?;
    let hour: u16 = hour
        .parse()
        .map_err(|_| Error::Config(format!("invalid hour in time of day: {s}")))?;
    let minute: u16 = minute
        .parse()
        .map_err(|_| Error::Config(format!("invalid minute in time of day: {s}")))?;
    if hour >= 24 || minute >= 60 {
        return Err(Error::Config(format!("time of day out of range: {s}")));
    }
    Ok(hour * 60 + minute)
}

mod duration_ms {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Configuration for a [`MultifileTextWriter`](crate::MultifileTextWriter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Append to an existing live file instead of truncating it
    #[serde(default = "default_append")]
    pub append: bool,
    /// Flush after every record
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,
    /// Buffer size of the text encoder, in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// How often the background checker evaluates rotation and retention
    #[serde(
        default = "default_check_interval",
        rename = "check_interval_ms",
        with = "duration_ms"
    )]
    pub check_interval: Duration,
}

impl WriterConfig {
    /// Create a WriterConfig with defaults
    pub fn new() -> Self {
        Self {
            append: default_append(),
            auto_flush: default_auto_flush(),
            buffer_size: default_buffer_size(),
            check_interval: default_check_interval(),
        }
    }

    /// Set append mode
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Set per-record flushing
    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    /// Set the encoder buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the background check interval
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_append() -> bool {
    true
}

fn default_auto_flush() -> bool {
    true
}

fn default_buffer_size() -> usize {
    8192
}

fn default_check_interval() -> Duration {
    Duration::from_secs(5)
}

/// Rotation policy configuration, validated when built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationConfig {
    /// Rotate at a byte limit.
    /// Can be specified as a number (defaults to KB) or string with units (K/M/G, case-insensitive).
    Size {
        /// Maximum file size in bytes before rotation.
        #[serde(deserialize_with = "de_size")]
        max_size: u64,
    },
    /// Rotate at fixed times of day.
    FixedTime {
        /// Times of day as "HH:MM" strings.
        times: Vec<String>,
    },
    /// Rotate once a fixed interval has elapsed since the last rotation.
    Interval {
        /// Interval in seconds.
        seconds: u64,
    },
}

impl RotationConfig {
    /// Build the configured policy; all validation happens here, before any
    /// writer state is touched.
    pub fn build(&self) -> Result<Arc<dyn RotationPolicy>> {
        match self {
            Self::Size { max_size } => Ok(Arc::new(SizeRotationPolicy::new(*max_size)?)),
            Self::FixedTime { times } => {
                let offsets = times
                    .iter()
                    .map(|t| parse_time_of_day(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(FixedTimeRotationPolicy::new(offsets)?))
            }
            Self::Interval { seconds } => Ok(Arc::new(IntervalRotationPolicy::new(
                Duration::from_secs(*seconds),
            )?)),
        }
    }
}

/// Retention policy configuration, validated when built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetentionConfig {
    /// Keep the newest N rotated files.
    FileCount {
        /// Number of rotated files to keep.
        number_of_files: usize,
    },
    /// Cap the total bytes the stream occupies.
    DiskSpace {
        /// Cap in bytes; numbers default to KB, strings take K/M/G units.
        #[serde(deserialize_with = "de_size")]
        limit: u64,
    },
    /// Keep a minimum amount of free space on the volume.
    FreeDiskSpace {
        /// Floor in bytes; numbers default to KB, strings take K/M/G units.
        #[serde(deserialize_with = "de_size")]
        floor: u64,
    },
}

impl RetentionConfig {
    /// Build the configured policy; all validation happens here.
    pub fn build(&self) -> Result<Arc<dyn RetentionPolicy>> {
        match self {
            Self::FileCount { number_of_files } => {
                Ok(Arc::new(FileCountRetentionPolicy::new(*number_of_files)?))
            }
            Self::DiskSpace { limit } => Ok(Arc::new(DiskSpaceRetentionPolicy::new(*limit)?)),
            Self::FreeDiskSpace { floor } => {
                Ok(Arc::new(FreeDiskSpaceRetentionPolicy::new(*floor)?))
            }
        }
    }
}

/// How records travel from producers to the file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliveryConfig {
    /// Producers write to the file directly, under the writer's lock.
    #[default]
    Synchronous,
    /// One consumer thread drains a queue in global FIFO order.
    Asynchronous {
        /// Queue capacity; 0 means unbounded.
        #[serde(default)]
        queue_size: usize,
    },
    /// A fixed pool of consumer threads; only per-producer ordering is kept.
    Parallel {
        /// Per-worker queue capacity; 0 means unbounded.
        #[serde(default)]
        queue_size: usize,
        /// Number of consumer threads.
        workers: usize,
    },
}

/// Configuration for a file-backed log publisher
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublisherConfig {
    /// Path of the live log file
    pub path: PathBuf,
    /// Writer settings
    #[serde(default)]
    pub writer: WriterConfig,
    /// Rotation policies to attach
    #[serde(default)]
    pub rotation: Vec<RotationConfig>,
    /// Retention policies to attach
    #[serde(default)]
    pub retention: Vec<RetentionConfig>,
    /// Record delivery strategy
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl PublisherConfig {
    /// Create a PublisherConfig for `path` with defaults
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            writer: WriterConfig::new(),
            rotation: Vec::new(),
            retention: Vec::new(),
            delivery: DeliveryConfig::default(),
        }
    }

    /// Set writer settings
    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Add a rotation policy
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation.push(rotation);
        self
    }

    /// Add a retention policy
    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention.push(retention);
        self
    }

    /// Set the delivery strategy
    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }
}
