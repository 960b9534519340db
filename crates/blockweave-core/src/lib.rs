//! Blockweave Core Library
//!
//! Core types, configuration, and error handling for the blockweave site generator.

pub mod config;
pub mod error;
pub mod schema;
pub mod site;
pub mod usage;

pub use config::Config;
pub use error::{CoreError, Result};
pub use schema::{BLOCK_ID_PLACEHOLDER, BlockPackage, FieldKind, FieldSchema, FieldSpec};
pub use site::{
    BlockConfig, LayoutSlot, PageConfig, PlannedPage, RedactedBlock, RedactedPage, SeoMetadata,
    SiteDetails, SiteRecord, SiteTemplate, TemplateGlobals, TemplatePage, generation_id,
    page_filename,
};
pub use usage::{CostReport, Usage};
