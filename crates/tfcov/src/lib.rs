//! tfcov library - Acceptance test coverage for Terraform providers
//!
//! This library exposes the analysis run and report rendering of the `tfcov`
//! command for testing and embedding purposes.

pub mod analysis;
pub mod output;

pub use analysis::{Analysis, DEFAULT_SETTINGS_FILE, load_settings};
pub use output::{OutputFormat, RenderOptions, render};
