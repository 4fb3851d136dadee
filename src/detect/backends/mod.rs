pub mod fixture;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use fixture::FixtureBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
