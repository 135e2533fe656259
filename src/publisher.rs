use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::async_writer::{AsynchronousTextWriter, ParallelTextWriter};
use crate::config::{DeliveryConfig, PublisherConfig};
use crate::error::{Error, ErrorHandler, Result};
use crate::naming::TimestampNaming;
use crate::writer::{MultifileTextWriter, TextWriter};

/// A named destination for pre-formatted log records.
///
/// One interface with no-op defaults — publishers implement only the
/// methods they care about. No format is imposed on records; every call is
/// one opaque line.
pub trait LogPublisher: Send + Sync {
    /// Unique identifier within a registry.
    fn id(&self) -> &str;

    /// Publish one pre-formatted line.
    fn log_record(&self, _record: &str) {}

    /// Flush buffered output.
    fn flush(&self) {}

    /// Release resources; called once on deregistration or registry
    /// shutdown.
    fn close(&self) {}
}

/// The standard file-backed publisher: forwards records to a
/// [`TextWriter`], synchronous or decorated, as configured.
pub struct TextLogPublisher {
    id: String,
    writer: Box<dyn TextWriter>,
}

fn capacity_of(queue_size: usize) -> Option<usize> {
    if queue_size == 0 { None } else { Some(queue_size) }
}

impl TextLogPublisher {
    /// Wrap an already-built writer.
    pub fn new<S: Into<String>>(id: S, writer: Box<dyn TextWriter>) -> Self {
        Self {
            id: id.into(),
            writer,
        }
    }

    /// Assemble naming policy → core writer → optional async decorator from
    /// configuration. All validation happens before anything is mutated.
    pub fn from_config<S: Into<String>>(
        id: S,
        config: &PublisherConfig,
        handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self> {
        let naming = Arc::new(TimestampNaming::new(&config.path));

        // a delivering decorator owns the auto-flush; the inner writer must
        // not also flush per record
        let decorated = !matches!(config.delivery, DeliveryConfig::Synchronous);
        let mut writer_config = config.writer.clone();
        let auto_flush = writer_config.auto_flush;
        if decorated {
            writer_config.auto_flush = false;
        }

        let writer = MultifileTextWriter::new(naming, &writer_config, handler.clone())?;
        for rotation in &config.rotation {
            writer.add_rotation_policy(rotation.build()?);
        }
        for retention in &config.retention {
            writer.add_retention_policy(retention.build()?);
        }

        let writer: Box<dyn TextWriter> = match &config.delivery {
            DeliveryConfig::Synchronous => Box::new(writer),
            DeliveryConfig::Asynchronous { queue_size } => Box::new(AsynchronousTextWriter::new(
                writer,
                capacity_of(*queue_size),
                auto_flush,
                handler,
            )?),
            DeliveryConfig::Parallel {
                queue_size,
                workers,
            } => Box::new(ParallelTextWriter::new(
                writer,
                *workers,
                capacity_of(*queue_size),
                auto_flush,
                handler,
            )?),
        };

        Ok(Self::new(id, writer))
    }

    /// The underlying writer.
    pub fn writer(&self) -> &dyn TextWriter {
        self.writer.as_ref()
    }
}

impl LogPublisher for TextLogPublisher {
    fn id(&self) -> &str {
        &self.id
    }

    fn log_record(&self, record: &str) {
        self.writer.write_record(record);
    }

    fn flush(&self) {
        self.writer.flush();
    }

    fn close(&self) {
        self.writer.shutdown();
    }
}

/// Constructor for a configuration-selected publisher kind.
pub type PublisherFactory =
    Box<dyn Fn(&str, &PublisherConfig) -> Result<Arc<dyn LogPublisher>> + Send + Sync>;

/// An explicit registry of live publishers.
///
/// Owned by the server's lifecycle context and passed to the components
/// that register and deregister publishers — never reached for globally.
/// Publisher kinds map to registered factories, so an unknown kind is a
/// configuration error caught at acceptance time, not a runtime probe.
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: RwLock<HashMap<String, Arc<dyn LogPublisher>>>,
    factories: RwLock<HashMap<String, PublisherFactory>>,
}

impl PublisherRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a configuration-selected kind string.
    pub fn register_factory<S: Into<String>>(&self, kind: S, factory: PublisherFactory) {
        self.factories.write().unwrap().insert(kind.into(), factory);
    }

    /// Build a publisher of `kind` from `config` and register it.
    pub fn create(
        &self,
        kind: &str,
        id: &str,
        config: &PublisherConfig,
    ) -> Result<Arc<dyn LogPublisher>> {
        let factories = self.factories.read().unwrap();
        let factory = factories
            .get(kind)
            .ok_or_else(|| Error::Config(format!("unknown publisher kind: {kind}")))?;
        let publisher = factory(id, config)?;
        drop(factories);
        self.register(publisher.clone())?;
        Ok(publisher)
    }

    /// Register a live publisher. Duplicate ids are rejected.
    pub fn register(&self, publisher: Arc<dyn LogPublisher>) -> Result<()> {
        let mut publishers = self.publishers.write().unwrap();
        let id = publisher.id().to_string();
        if publishers.contains_key(&id) {
            return Err(Error::Config(format!(
                "a publisher with id {id} is already registered"
            )));
        }
        tracing::debug!(target: "rotolog", id = %id, "publisher registered");
        publishers.insert(id, publisher);
        Ok(())
    }

    /// Deregister and close the publisher with `id`.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.publishers.write().unwrap().remove(id);
        match removed {
            Some(publisher) => {
                publisher.close();
                tracing::debug!(target: "rotolog", id, "publisher deregistered");
                true
            }
            None => false,
        }
    }

    /// Look up a publisher by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LogPublisher>> {
        self.publishers.read().unwrap().get(id).cloned()
    }

    /// Ids of every registered publisher.
    pub fn ids(&self) -> Vec<String> {
        self.publishers.read().unwrap().keys().cloned().collect()
    }

    /// Number of registered publishers.
    pub fn len(&self) -> usize {
        self.publishers.read().unwrap().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.publishers.read().unwrap().is_empty()
    }

    /// Flush every registered publisher.
    pub fn flush_all(&self) {
        for publisher in self.publishers.read().unwrap().values() {
            publisher.flush();
        }
    }

    /// Close every publisher and empty the registry. Called at server
    /// shutdown.
    pub fn close_all(&self) {
        let drained: Vec<_> = {
            let mut publishers = self.publishers.write().unwrap();
            publishers.drain().map(|(_, p)| p).collect()
        };
        for publisher in drained {
            publisher.close();
        }
    }
}

/// A registry preloaded with the standard `text_file` publisher factory.
pub fn standard_registry(handler: Arc<dyn ErrorHandler>) -> PublisherRegistry {
    let registry = PublisherRegistry::new();
    registry.register_factory(
        "text_file",
        Box::new(move |id, config| {
            Ok(Arc::new(TextLogPublisher::from_config(
                id,
                config,
                handler.clone(),
            )?))
        }),
    );
    registry
}
