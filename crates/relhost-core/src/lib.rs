pub mod artifact;
pub mod cache;
pub mod environment;
pub mod error;
pub mod launcher;
pub mod metrics;
pub mod supervisor;

pub mod prelude {
    pub use crate::artifact::{ArtifactStore, ArtifactStoreHandle, ExtractOptions, FetchError};
    pub use crate::cache::ReleaseCache;
    pub use crate::environment::{EnvironmentResolver, ResolveError, ResolverHandle};
    pub use crate::error::SupervisorError;
    pub use crate::launcher::{
        ExitInfo, LaunchError, LaunchSpec, LaunchedWorker, LauncherHandle, WorkerLauncher,
    };
    pub use crate::metrics::{MetricsBackend, MetricsHandle};
    pub use crate::supervisor::{SupervisorConfig, WorkerHandle, WorkerInfo, WorkerSupervisor};
}
