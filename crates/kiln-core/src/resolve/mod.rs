//! Resource reference resolution
//!
//! Reference sites are extracted from parsed units ([`gather_source_info`]),
//! resolved to output identities in a first pass, then written back into the
//! units during emission through a [`RewriteScope`](crate::rewrite::RewriteScope).

pub mod atlas;
mod info;
mod pipeline;
mod resolver;
pub mod styledef;
pub mod translation;

pub use atlas::{
    png_dimensions, AtlasBuilder, AtlasEncoder, AtlasImage, ShelfAtlas, SpriteKey, SpritePlacement,
};
pub use info::{
    gather_source_info, AssetSite, ReferenceInfo, ReferenceSite, SpriteColor, SpriteSite,
    StyleDefSite, TranslationSite,
};
pub use pipeline::ResourceResolutionPipeline;
pub use resolver::{fold_resolvers, AssetResolver, AssetValue, Resolution, ResolverOutcome};
pub use styledef::StyleDefPolicy;
pub use translation::{MessageTable, TranslationCompiler, UntranslatedReporter};
