pub mod assets;
pub mod catalog;
pub mod compile;
pub mod config;
pub mod error;
pub mod events;
pub mod images;
pub mod paths;
pub mod process;
pub mod render;
pub mod site;
pub mod sitemap;
pub mod types;
pub mod walk;
pub mod xml;

pub use assets::{ReferenceRewriter, hash_assets};
pub use catalog::{emit_catalog, enhance, load_catalog, validate_catalog};
pub use compile::{CodeKind, Compiler, NativeCompiler};
pub use config::{BuildConfig, CONFIG_FILE_NAME};
pub use error::*;
pub use images::{ImageCodec, RasterCodec, VariantFormat, generate_variants};
pub use process::{Navigation, SourceProcessor};
pub use render::{Renderer, TeraRenderer};
pub use site::*;
pub use types::*;
