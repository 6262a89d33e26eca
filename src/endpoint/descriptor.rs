//! Closure-backed endpoints
//!
//! Collaborators that assemble their callbacks at runtime (rather than
//! implementing the traits on a type of their own) can fill in a descriptor.
//! Slots left empty report `provides(..) == false`.

use crate::registry::Token;

use super::callback::{Callback, CallbackError};
use super::consumer::IrqBypassConsumer;
use super::producer::IrqBypassProducer;

type Hook = Box<dyn Fn() + Send + Sync>;
type AttachConsumer =
    Box<dyn Fn(&dyn IrqBypassConsumer) -> Result<(), CallbackError> + Send + Sync>;
type DetachConsumer = Box<dyn Fn(&dyn IrqBypassConsumer) + Send + Sync>;
type AttachProducer =
    Box<dyn Fn(&dyn IrqBypassProducer) -> Result<(), CallbackError> + Send + Sync>;
type DetachProducer = Box<dyn Fn(&dyn IrqBypassProducer) + Send + Sync>;

/// Producer built from optional callback slots
pub struct ProducerDescriptor {
    token: Token,
    irq: Option<u32>,
    stop: Option<Hook>,
    start: Option<Hook>,
    add_consumer: Option<AttachConsumer>,
    del_consumer: Option<DetachConsumer>,
}

impl ProducerDescriptor {
    /// Create a descriptor with no callbacks
    pub fn new(token: Token) -> Self {
        Self {
            token,
            irq: None,
            stop: None,
            start: None,
            add_consumer: None,
            del_consumer: None,
        }
    }

    /// Set the host interrupt line
    pub fn host_irq(mut self, irq: u32) -> Self {
        self.irq = Some(irq);
        self
    }

    /// Set the stop callback
    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop = Some(Box::new(f));
        self
    }

    /// Set the start callback
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start = Some(Box::new(f));
        self
    }

    /// Set the add_consumer callback
    pub fn on_add_consumer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn IrqBypassConsumer) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.add_consumer = Some(Box::new(f));
        self
    }

    /// Set the del_consumer callback
    pub fn on_del_consumer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn IrqBypassConsumer) + Send + Sync + 'static,
    {
        self.del_consumer = Some(Box::new(f));
        self
    }
}

impl IrqBypassProducer for ProducerDescriptor {
    fn token(&self) -> Token {
        self.token
    }

    fn irq(&self) -> Option<u32> {
        self.irq
    }

    fn stop(&self) {
        if let Some(ref stop) = self.stop {
            stop();
        }
    }

    fn start(&self) {
        if let Some(ref start) = self.start {
            start();
        }
    }

    fn add_consumer(&self, consumer: &dyn IrqBypassConsumer) -> Result<(), CallbackError> {
        match self.add_consumer {
            Some(ref add) => add(consumer),
            None => Ok(()),
        }
    }

    fn del_consumer(&self, consumer: &dyn IrqBypassConsumer) {
        if let Some(ref del) = self.del_consumer {
            del(consumer);
        }
    }

    fn provides(&self, callback: Callback) -> bool {
        match callback {
            Callback::Stop => self.stop.is_some(),
            Callback::Start => self.start.is_some(),
            Callback::AddConsumer => self.add_consumer.is_some(),
            Callback::DelConsumer => self.del_consumer.is_some(),
            Callback::AddProducer | Callback::DelProducer => false,
        }
    }
}

impl std::fmt::Debug for ProducerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerDescriptor")
            .field("token", &self.token)
            .field("irq", &self.irq)
            .field("stop", &self.stop.is_some())
            .field("start", &self.start.is_some())
            .field("add_consumer", &self.add_consumer.is_some())
            .field("del_consumer", &self.del_consumer.is_some())
            .finish()
    }
}

/// Consumer built from callback slots
///
/// `add_producer` and `del_producer` must both be set or registration fails.
pub struct ConsumerDescriptor {
    token: Token,
    stop: Option<Hook>,
    start: Option<Hook>,
    add_producer: Option<AttachProducer>,
    del_producer: Option<DetachProducer>,
}

impl ConsumerDescriptor {
    /// Create a descriptor with no callbacks
    pub fn new(token: Token) -> Self {
        Self {
            token,
            stop: None,
            start: None,
            add_producer: None,
            del_producer: None,
        }
    }

    /// Set the stop callback
    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop = Some(Box::new(f));
        self
    }

    /// Set the start callback
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start = Some(Box::new(f));
        self
    }

    /// Set the add_producer callback
    pub fn on_add_producer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn IrqBypassProducer) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.add_producer = Some(Box::new(f));
        self
    }

    /// Set the del_producer callback
    pub fn on_del_producer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn IrqBypassProducer) + Send + Sync + 'static,
    {
        self.del_producer = Some(Box::new(f));
        self
    }
}

impl IrqBypassConsumer for ConsumerDescriptor {
    fn token(&self) -> Token {
        self.token
    }

    fn add_producer(&self, producer: &dyn IrqBypassProducer) -> Result<(), CallbackError> {
        // Registration refuses descriptors without this slot, so None is unreachable
        // through the registry.
        match self.add_producer {
            Some(ref add) => add(producer),
            None => Err(CallbackError::new(-22, "add_producer not provided")),
        }
    }

    fn del_producer(&self, producer: &dyn IrqBypassProducer) {
        if let Some(ref del) = self.del_producer {
            del(producer);
        }
    }

    fn stop(&self) {
        if let Some(ref stop) = self.stop {
            stop();
        }
    }

    fn start(&self) {
        if let Some(ref start) = self.start {
            start();
        }
    }

    fn provides(&self, callback: Callback) -> bool {
        match callback {
            Callback::Stop => self.stop.is_some(),
            Callback::Start => self.start.is_some(),
            Callback::AddProducer => self.add_producer.is_some(),
            Callback::DelProducer => self.del_producer.is_some(),
            Callback::AddConsumer | Callback::DelConsumer => false,
        }
    }
}

impl std::fmt::Debug for ConsumerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerDescriptor")
            .field("token", &self.token)
            .field("stop", &self.stop.is_some())
            .field("start", &self.start.is_some())
            .field("add_producer", &self.add_producer.is_some())
            .field("del_producer", &self.del_producer.is_some())
            .finish()
    }
}
