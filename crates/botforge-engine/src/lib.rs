//! Bot template engine: renders ready-to-run bot source trees from a
//! static template catalog, packages them into zip archives, and
//! supervises running instances as child processes.

pub mod archive;
pub mod commands;
pub mod error;
pub mod generator;
pub mod paths;
pub mod service;
pub mod supervisor;
pub mod templates;

pub use error::{Error, Result};
pub use generator::{GeneratedArtifact, GenerationRequest};
pub use service::{BotForge, GenerateOutcome};
pub use supervisor::Supervisor;
pub use templates::{BotTemplate, RuntimeSpec};
