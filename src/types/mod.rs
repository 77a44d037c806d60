pub mod config;
mod error;
mod package;
mod version;

pub use error::ArchitectError;
pub use package::{BinaryPackage, SourcePackage};
pub use version::{DepOperator, DependencySpec, PkgVersion};
