pub mod ingest;
pub mod orchestrator;
pub mod stitch;

pub use ingest::{spawn_api_consumers, spawn_asset_consumers, IngestService};
pub use orchestrator::ScanOrchestrator;
pub use stitch::{ResultStitcher, StitchSummary};
