// Ticker core: configuration entity, scheduling engine, and registry

pub mod configuration;
pub mod plan;
pub mod registry;

pub use configuration::{TickerConfiguration, TickerUpdate};
pub use plan::{fire_plan, FirePlan, WakeKind};
pub use registry::{Clock, TickerRegistry, TickerSink};
