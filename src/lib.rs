pub mod actors;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod fanout;
pub mod incidents;
pub mod monitors;
pub mod probe;
pub mod storage;
pub mod util;

pub use dedup::{DedupKey, normalize_url};
pub use engine::Engine;
pub use monitors::{MonitorError, MonitorService, NewMonitor};
pub use probe::{HttpProber, ProbeResult};
