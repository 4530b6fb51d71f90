pub mod metrics;
#[allow(clippy::module_inception)]
pub mod queue;

pub use metrics::QueueMetrics;
pub use queue::{OperationQueue, QueueError, QueueReceiver, bounded};
