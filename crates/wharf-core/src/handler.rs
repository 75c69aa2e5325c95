//! Topic -> handler lookup. Built once at construction; lookups are pure,
//! with no runtime registration, modeled as a plain map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WharfError;
use crate::queue::QueueRecord;

#[async_trait]
pub trait Handler<Id>: Send + Sync {
    /// The topic string this handler serves.
    fn topic(&self) -> &str;

    /// Throwing a transient error retries (until `max_attempts`); throwing a
    /// permanent one still goes through the same retry budget, since the
    /// dispatcher does not distinguish handler error kinds, only count.
    /// Returning `Ok` acks the message.
    async fn handle(
        &self,
        message: &QueueRecord<Id>,
        cancellation: CancellationToken,
    ) -> Result<(), WharfError>;
}

pub struct HandlerResolver<Id> {
    handlers: HashMap<String, Arc<dyn Handler<Id>>>,
}

impl<Id> Default for HandlerResolver<Id> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<Id> HandlerResolver<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn Handler<Id>>) -> Self {
        self.handlers.insert(handler.topic().to_string(), handler);
        self
    }

    pub fn resolve(&self, topic: &str) -> Option<Arc<dyn Handler<Id>>> {
        self.handlers.get(topic).cloned()
    }
}
