//! # Rotolog
//!
//! A multi-file text log writer with rotation, retention and asynchronous
//! delivery.
//!
//! ## Features
//!
//! - Size, fixed-time-of-day and elapsed-interval rotation policies
//! - File-count, disk-space and free-space retention policies
//! - Single-consumer and pooled asynchronous delivery with bounded
//!   backpressure
//! - An explicit publisher registry for server-lifecycle integration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rotolog::{
//!     MultifileTextWriter, SizeRotationPolicy, TextWriter, TimestampNaming,
//!     TracingErrorHandler, WriterConfig,
//! };
//!
//! let writer = MultifileTextWriter::new(
//!     Arc::new(TimestampNaming::new("logs/access.log")),
//!     &WriterConfig::new(),
//!     Arc::new(TracingErrorHandler),
//! )?;
//! writer.add_rotation_policy(Arc::new(SizeRotationPolicy::new(10 * 1024 * 1024)?));
//!
//! writer.write_record("cn=admin BIND");
//! writer.shutdown();
//! # Ok::<(), rotolog::Error>(())
//! ```

pub mod async_writer;
pub mod config;
pub mod error;
pub mod meter;
pub mod naming;
pub mod publisher;
pub mod retention;
pub mod rotation;
pub mod writer;

pub use async_writer::{AsynchronousTextWriter, ParallelTextWriter};
pub use config::{DeliveryConfig, PublisherConfig, RetentionConfig, RotationConfig, WriterConfig};
pub use error::{Error, ErrorHandler, Result, TracingErrorHandler, WriterFailure};
pub use meter::{ByteCount, MeteredStream};
pub use naming::{FileNamingPolicy, TimestampNaming};
pub use publisher::{LogPublisher, PublisherRegistry, TextLogPublisher, standard_registry};
pub use retention::{
    DiskSpaceRetentionPolicy, FileCountRetentionPolicy, FreeDiskSpaceRetentionPolicy, LogFile,
    RetentionPolicy,
};
pub use rotation::{
    FixedTimeRotationPolicy, IntervalRotationPolicy, RotationPolicy, RotationView,
    SizeRotationPolicy,
};
pub use writer::{MultifileTextWriter, TextWriter};
