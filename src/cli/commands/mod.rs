//! CLI command implementations

pub mod edit;
pub mod import;
pub mod init;
pub mod list;
pub mod template;
pub mod undo;
