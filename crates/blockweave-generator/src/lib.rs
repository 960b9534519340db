//! Blockweave Generator Library
//!
//! Block composition, rendering and archive synchronization for blockweave.
//!
//! # Modules
//!
//! - [`store`] - Block catalog and site record persistence
//! - [`gateway`] - Content gateway abstraction for completions and images
//! - [`expand`] - Nested block expansion into a flat field schema
//! - [`content`] - Field filling through the content gateway
//! - [`theme`] - Theme variable synthesis
//! - [`pages`] - Page planning and SEO metadata
//! - [`anchors`] - In-page anchor targets
//! - [`render`] - Block markup and style rendering
//! - [`document`] - Full page documents
//! - [`sitemap`] - XML sitemap generation
//! - [`proxy`] - Reverse-proxy configuration
//! - [`archive`] - Site archives and their object storage
//! - [`saga`] - Compensating actions for multi-step writes
//! - [`sync`] - Full and scoped archive rebuilds
//! - [`assemble`] - Site assembly and block regeneration
//! - [`pipeline`] - Request orchestration

pub mod anchors;
pub mod archive;
pub mod assemble;
pub mod content;
pub mod document;
pub mod expand;
pub mod gateway;
pub mod pages;
pub mod pipeline;
pub mod proxy;
pub mod render;
pub mod saga;
pub mod sitemap;
pub mod store;
pub mod sync;
pub mod theme;

pub use archive::{ArchiveStore, SiteArchive};
pub use assemble::{AssembledSite, GenerationInput, GenerationStage, SiteAssembler};
pub use document::RenderedPage;
pub use expand::Expansion;
pub use gateway::{Completion, CompletionRequest, ContentGateway, GeneratedImage, Purpose};
pub use pipeline::{
    GenerateError, GenerateRequest, GenerationOutput, PagePreview, Pipeline,
    RegenerateBlockRequest,
};
pub use sitemap::SitemapGenerator;
pub use store::{BlockCatalog, BlockStore, FsSiteRepository, SiteRepository, StoreError};
pub use sync::ArchiveSynchronizer;
pub use theme::ThemeSynthesizer;
