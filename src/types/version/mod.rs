mod dependency;
mod version;

pub use dependency::{DepOperator, DependencySpec};
pub use version::PkgVersion;
