pub mod config;
pub mod error;
pub mod fileset;
pub mod handle;
pub mod library;
pub mod manifest;
pub mod package;
pub mod path_safety;
pub mod resolve;

pub use config::ResolverConfig;
pub use error::{Error, Result, Warning, WarningKind};
pub use fileset::{VirtualFile, VirtualFileSet};
pub use handle::{Handle, HandleKind, HandleStore, MintScope};
pub use library::{Library, LoadOutcome};
pub use package::{Package, PackageId};
pub use resolve::{locate_entry, resolve_package, Resolver};
