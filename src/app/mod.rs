// Application layer - Use case interactors

pub mod clean_interactor;
pub mod consolidate_interactor;
pub mod container;
pub mod probe_interactor;
pub mod render_interactor;
pub mod scan_interactor;

// Re-export interactors
pub use clean_interactor::CleanInteractor;
pub use consolidate_interactor::ConsolidateInteractor;
pub use container::{AppContainer, DefaultAppContainer};
pub use probe_interactor::{ProbeInteractor, ProbeRequest, ProbeSummary};
pub use render_interactor::{JobFailure, JobRunner, RunReport, RunnerOptions};
pub use scan_interactor::{ScanInteractor, ScanRow};
