//! External registry clients: package indexes, the container registry, and
//! the wheel-tester archive, plus the shared cache and version-range helpers
//! they all use.

pub mod cache;
pub mod container;
pub mod npm;
pub mod pypi;
pub mod version;
pub mod wheel_tester;

pub use cache::ResultCache;
pub use container::ContainerRegistryClient;
pub use npm::NpmClient;
pub use pypi::PypiClient;
pub use wheel_tester::WheelTesterClient;
