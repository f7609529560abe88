use std::fmt;
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::shorten::FileNameShortener;

/// Resolved output name, or the failure message a resolver reported
pub type AssetValue = Result<String, String>;

/// A resolver's answer, available now or after the first pass settles.
pub enum Resolution {
    Ready(AssetValue),
    Deferred(Box<dyn FnOnce() -> AssetValue + Send>),
}

impl Resolution {
    pub fn settle(self) -> AssetValue {
        match self {
            Resolution::Ready(value) => value,
            Resolution::Deferred(pending) => pending(),
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Resolution::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Resolution::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Plugin that may claim asset references.
pub trait AssetResolver: Send + Sync {
    fn name(&self) -> &str;

    /// `None` leaves the asset to other resolvers or the default mapping.
    fn resolve_asset(
        &self,
        name: &str,
        shortener: &mut FileNameShortener,
        config: &ProjectConfig,
    ) -> Option<Resolution>;
}

#[derive(Debug)]
pub enum ResolverOutcome {
    NoMatch,
    Resolved { resolver: String, resolution: Resolution },
    /// Names of every resolver that claimed the asset
    Conflict(Vec<String>),
}

/// Ask every resolver about `name` and fold the answers by count.
pub fn fold_resolvers(
    resolvers: &[Arc<dyn AssetResolver>],
    name: &str,
    shortener: &mut FileNameShortener,
    config: &ProjectConfig,
) -> ResolverOutcome {
    let mut claims: Vec<(String, Resolution)> = resolvers
        .iter()
        .filter_map(|resolver| {
            resolver
                .resolve_asset(name, shortener, config)
                .map(|resolution| (resolver.name().to_string(), resolution))
        })
        .collect();

    match claims.len() {
        0 => ResolverOutcome::NoMatch,
        1 => {
            let (resolver, resolution) = claims.remove(0);
            ResolverOutcome::Resolved {
                resolver,
                resolution,
            }
        }
        _ => ResolverOutcome::Conflict(claims.into_iter().map(|(name, _)| name).collect()),
    }
}
