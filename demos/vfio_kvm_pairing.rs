//! Bypass manager walkthrough
//!
//! Simulates a VFIO-style producer (host MSI vector) and a KVM-style consumer
//! (irqfd routing to a guest vCPU) meeting in the bypass manager.
//!
//! Run with: RUST_LOG=irq_bypass=trace cargo run --example vfio_kvm_pairing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use irq_bypass::{
    BypassConfig, CallbackError, IrqBypassConsumer, IrqBypassManager, IrqBypassProducer, Token,
};
use tracing_subscriber::EnvFilter;

/// Host side of a passthrough device interrupt
struct VfioMsiVector {
    token: Token,
    host_irq: u32,
    masked: AtomicBool,
}

impl IrqBypassProducer for VfioMsiVector {
    fn token(&self) -> Token {
        self.token
    }

    fn irq(&self) -> Option<u32> {
        Some(self.host_irq)
    }

    fn stop(&self) {
        self.masked.store(true, Ordering::SeqCst);
        tracing::info!(irq = self.host_irq, "vfio: vector masked");
    }

    fn start(&self) {
        self.masked.store(false, Ordering::SeqCst);
        tracing::info!(irq = self.host_irq, "vfio: vector unmasked");
    }
}

/// Guest side: an irqfd that can be switched to posted delivery
struct KvmIrqfd {
    token: Token,
    gsi: u32,
    posted: AtomicBool,
    supports_posting: bool,
}

impl IrqBypassConsumer for KvmIrqfd {
    fn token(&self) -> Token {
        self.token
    }

    fn add_producer(&self, producer: &dyn IrqBypassProducer) -> Result<(), CallbackError> {
        if !self.supports_posting {
            return Err(CallbackError::new(-95, "posted interrupts not supported"));
        }
        self.posted.store(true, Ordering::SeqCst);
        tracing::info!(gsi = self.gsi, host_irq = ?producer.irq(), "kvm: irqfd now posted");
        Ok(())
    }

    fn del_producer(&self, producer: &dyn IrqBypassProducer) {
        self.posted.store(false, Ordering::SeqCst);
        tracing::info!(gsi = self.gsi, host_irq = ?producer.irq(), "kvm: irqfd back to remapped delivery");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = IrqBypassManager::with_config(
        BypassConfig::default().shutdown_timeout(Duration::from_millis(500)),
    );

    // Device attach: the host vector shows up first.
    let vector: Arc<dyn IrqBypassProducer> = Arc::new(VfioMsiVector {
        token: Token::new(0xfeed_0001),
        host_irq: 137,
        masked: AtomicBool::new(false),
    });
    manager.register_producer(Arc::clone(&vector)).await?;

    // Guest wires its irqfd; the pair connects here.
    let irqfd: Arc<dyn IrqBypassConsumer> = Arc::new(KvmIrqfd {
        token: Token::new(0xfeed_0001),
        gsi: 24,
        posted: AtomicBool::new(false),
        supports_posting: true,
    });
    manager.register_consumer(Arc::clone(&irqfd)).await?;
    tracing::info!(stats = ?manager.stats().await, "after pairing");

    // A second guest on hardware without posting support is refused.
    manager
        .register_producer(Arc::new(VfioMsiVector {
            token: Token::new(0xfeed_0002),
            host_irq: 138,
            masked: AtomicBool::new(false),
        }))
        .await?;
    let refused = manager
        .register_consumer(Arc::new(KvmIrqfd {
            token: Token::new(0xfeed_0002),
            gsi: 25,
            posted: AtomicBool::new(false),
            supports_posting: false,
        }))
        .await;
    if let Err(e) = refused {
        tracing::warn!(error = %e, kind = ?e.kind(), "consumer refused");
    }

    // Device detach.
    manager.unregister_consumer(&irqfd).await;
    manager.unregister_producer(&vector).await;

    // The second producer is never unregistered, so shutdown forces it out.
    let report = manager.shutdown().await?;
    tracing::info!(
        forced_producers = ?report.forced_producers,
        metrics = ?manager.metrics(),
        "manager shut down"
    );

    Ok(())
}
