mod backend;
mod backends;
mod registry;

pub use backend::{DetectorSettings, PoseBackend};
pub use backends::FixtureBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
