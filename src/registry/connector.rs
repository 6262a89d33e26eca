//! Connect/disconnect protocol
//!
//! Both sides are stopped while their wiring changes and are always started
//! again afterwards, whether or not the change succeeded.

use crate::endpoint::{Callback, CallbackError, IrqBypassConsumer, IrqBypassProducer};

/// Wire `producer` and `consumer` together
///
/// Returns the first callback error. On error neither side is left wired.
pub(super) fn connect(
    producer: &dyn IrqBypassProducer,
    consumer: &dyn IrqBypassConsumer,
) -> Result<(), CallbackError> {
    let token = producer.token();

    quiesce(producer, consumer);

    let result = wire(producer, consumer);
    if let Err(ref e) = result {
        tracing::trace!(token = %token, error = %e, "Connect aborted");
    }

    resume(producer, consumer);

    result
}

fn wire(
    producer: &dyn IrqBypassProducer,
    consumer: &dyn IrqBypassConsumer,
) -> Result<(), CallbackError> {
    let token = producer.token();

    let producer_wired = producer.provides(Callback::AddConsumer);
    if producer_wired {
        tracing::trace!(token = %token, "add_consumer");
        producer.add_consumer(consumer)?;
    }

    tracing::trace!(token = %token, "add_producer");
    if let Err(e) = consumer.add_producer(producer) {
        if producer_wired && producer.provides(Callback::DelConsumer) {
            tracing::trace!(token = %token, "del_consumer (rollback)");
            producer.del_consumer(consumer);
        }
        return Err(e);
    }

    Ok(())
}

/// Unwire a connected pair
pub(super) fn disconnect(producer: &dyn IrqBypassProducer, consumer: &dyn IrqBypassConsumer) {
    let token = producer.token();

    quiesce(producer, consumer);

    tracing::trace!(token = %token, "del_producer");
    consumer.del_producer(producer);

    if producer.provides(Callback::DelConsumer) {
        tracing::trace!(token = %token, "del_consumer");
        producer.del_consumer(consumer);
    }

    resume(producer, consumer);
}

fn quiesce(producer: &dyn IrqBypassProducer, consumer: &dyn IrqBypassConsumer) {
    if producer.provides(Callback::Stop) {
        producer.stop();
    }
    if consumer.provides(Callback::Stop) {
        consumer.stop();
    }
}

// Consumer first, the reverse of quiesce().
fn resume(producer: &dyn IrqBypassProducer, consumer: &dyn IrqBypassConsumer) {
    if consumer.provides(Callback::Start) {
        consumer.start();
    }
    if producer.provides(Callback::Start) {
        producer.start();
    }
}
