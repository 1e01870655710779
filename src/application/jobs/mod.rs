mod reconcile;
mod warmup;

pub use reconcile::ReconciliationService;
pub use warmup::{WarmupSummary, warm_up};
