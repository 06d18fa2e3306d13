// Public API
pub mod cli;
pub mod commands;

// Core domain types
pub mod cache;
pub mod compat;
pub mod config;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod platform;
pub mod resolver;
pub mod session;
pub mod shims;
pub mod ui;
pub mod version;
pub mod version_file;

// Re-export main types
pub use config::{Config, RootPath};
pub use error::{Error, Result};
pub use platform::Platform;
pub use resolver::{ResolvedVersion, Resolver, VersionSource};
pub use session::Session;
pub use shims::ShimManager;
pub use version::{GoVersion, Inventory, Matcher};
