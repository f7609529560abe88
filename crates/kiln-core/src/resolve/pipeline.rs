use tracing::debug;

use crate::diagnostics::{codes, CompilationResult, Diagnostic};
use crate::frontend::{Expr, ParsedUnit};
use crate::paths;
use crate::project::Project;
use crate::rewrite::RewriteScope;
use crate::span::Span;

use super::resolver::{fold_resolvers, Resolution, ResolverOutcome};
use super::{styledef, ReferenceInfo, SpriteColor, SpriteKey, SpriteSite};

/// A resolver claim whose value is read at the settle barrier
struct PendingAsset {
    file: String,
    span: Span,
    name: String,
    resolver: String,
    resolution: Resolution,
}

fn sprite_key(site: &SpriteSite, name: &str) -> SpriteKey {
    SpriteKey {
        name: name.to_string(),
        color: match &site.color {
            SpriteColor::Constant(color) => Some(color.clone()),
            SpriteColor::None | SpriteColor::Dynamic => None,
        },
        width: site.width,
        height: site.height,
        x: site.x,
        y: site.y,
    }
}

/// Two-pass resolution of asset, sprite, translation and style references.
///
/// [`collect`](Self::collect) runs over every unit of the program before
/// anything is emitted, [`settle`](Self::settle) waits for deferred resolver
/// answers, and [`apply`](Self::apply) rewrites one unit right before it is
/// emitted.
#[derive(Default)]
pub struct ResourceResolutionPipeline {
    pending: Vec<PendingAsset>,
}

impl ResourceResolutionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver claims not yet settled
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// First pass over one unit
    pub fn collect(
        &mut self,
        file: &str,
        unit: &ParsedUnit,
        info: &ReferenceInfo,
        project: &mut Project,
        result: &mut CompilationResult,
    ) {
        if project.config.sprite_merge {
            for site in &info.sprites {
                if let Some(name) = &site.name {
                    project.atlas.add(sprite_key(site, name));
                }
            }
        }

        let reporter = project
            .untranslated_reporter
            .as_ref()
            .filter(|_| project.config.report_untranslated);
        if let Some(reporter) = reporter {
            for site in &info.translations {
                if let Some(message) = &site.message {
                    reporter(message, site.hint.as_deref(), file);
                }
            }
        }

        for site in &info.assets {
            let span = unit.call(site.call).span;
            let Some(name) = &site.name else {
                result.add(Diagnostic::warning(
                    file,
                    span,
                    codes::DYNAMIC_ASSET,
                    "Used b.asset without compile time constant - ignoring",
                ));
                continue;
            };

            match fold_resolvers(
                &project.resolvers,
                name,
                &mut project.shortener,
                &project.config,
            ) {
                ResolverOutcome::NoMatch => {
                    let output = if paths::is_css(name) || paths::is_js(name) {
                        name.clone()
                    } else {
                        project.shortener.shorten(name)
                    };
                    project.asset_map.insert(name.clone(), output.clone());
                    project.dep_asset_files.insert(name.clone(), output);
                }
                ResolverOutcome::Resolved {
                    resolver,
                    resolution,
                } => self.pending.push(PendingAsset {
                    file: file.to_string(),
                    span,
                    name: name.clone(),
                    resolver,
                    resolution,
                }),
                ResolverOutcome::Conflict(resolvers) => {
                    debug!("Asset {} claimed by {}", name, resolvers.join(", "));
                    result.add(Diagnostic::error(
                        file,
                        span,
                        codes::MULTIPLE_RESOLVERS,
                        format!("Multiple plugins handled asset {}", name),
                    ));
                    project.asset_map.insert(name.clone(), name.clone());
                }
            }
        }
    }

    /// Wait for every queued resolver answer
    pub fn settle(&mut self, project: &mut Project, result: &mut CompilationResult) {
        for pending in self.pending.drain(..) {
            match pending.resolution.settle() {
                Ok(value) => {
                    debug!("{} resolved {} to {}", pending.resolver, pending.name, value);
                    project.asset_map.insert(pending.name, value);
                }
                Err(message) => result.add(Diagnostic::error(
                    pending.file,
                    pending.span,
                    codes::RESOLVER_FAILED,
                    message,
                )),
            }
        }
    }

    /// Second pass: rewrite the reference sites of one unit inside `scope`
    pub fn apply(
        &self,
        scope: &mut RewriteScope,
        file: &str,
        info: &ReferenceInfo,
        project: &mut Project,
    ) {
        for site in &info.sprites {
            let Some(name) = &site.name else { continue };
            if project.config.sprite_merge {
                let Some(placement) = project.atlas.query(&sprite_key(site, name)) else {
                    continue;
                };
                let call = scope.unit().call(site.call);
                let numbers = [placement.width, placement.height, placement.x, placement.y]
                    .map(|n| Expr::Num(f64::from(n)));
                if call.args.len() >= 2 && site.color == SpriteColor::Dynamic {
                    let color = call.args[1].clone();
                    scope.set_method(site.call, "spritebc");
                    scope.set_argument(site.call, 0, color);
                    for (index, number) in numbers.into_iter().enumerate() {
                        scope.set_argument(site.call, index + 1, number);
                    }
                    scope.set_argument_count(site.call, 5);
                } else {
                    scope.set_method(site.call, "spriteb");
                    for (index, number) in numbers.into_iter().enumerate() {
                        scope.set_argument(site.call, index, number);
                    }
                    scope.set_argument_count(site.call, 4);
                }
            } else {
                let output = project.shortener.shorten(name);
                project.dep_asset_files.insert(name.clone(), output.clone());
                scope.set_argument(site.call, 0, Expr::Str(output));
            }
        }

        for site in &info.assets {
            let Some(name) = &site.name else { continue };
            if let Some(value) = project.asset_map.get(name) {
                scope.set_argument(site.call, 0, Expr::Str(value.clone()));
            }
        }

        let compiler = project
            .translation
            .as_mut()
            .filter(|_| project.config.compile_translations);
        if let Some(compiler) = compiler {
            compiler.start_file(file);
            for site in &info.translations {
                let Some(message) = &site.message else { continue };
                if site.just_format {
                    continue;
                }
                let id = compiler.add_usage(message, site.with_params, site.hint.as_deref());
                scope.set_argument(site.call, 0, Expr::Num(f64::from(id)));
                if scope.unit().call(site.call).args.len() > 2 {
                    scope.set_argument_count(site.call, 2);
                }
            }
            compiler.finish_file();
        }

        let policy = project.config.style_policy();
        for site in &info.style_defs {
            styledef::apply(site, scope, &policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BundleMode, ProjectConfig};
    use crate::frontend::{FrontEnd, ScanFrontEnd};
    use crate::output::MemorySink;
    use crate::resolve::{gather_source_info, AssetResolver, AssetValue, MessageTable};
    use crate::shorten::FileNameShortener;
    use std::sync::Arc;

    struct Claim(&'static str, Option<AssetValue>, bool);

    impl AssetResolver for Claim {
        fn name(&self) -> &str {
            self.0
        }

        fn resolve_asset(
            &self,
            _name: &str,
            _shortener: &mut FileNameShortener,
            _config: &ProjectConfig,
        ) -> Option<Resolution> {
            let value = self.1.clone()?;
            Some(if self.2 {
                Resolution::Deferred(Box::new(move || value))
            } else {
                Resolution::Ready(value)
            })
        }
    }

    fn project(config: ProjectConfig) -> Project {
        Project::new(config, "/p", Arc::new(MemorySink::new()))
    }

    fn unit(text: &str) -> (ParsedUnit, ReferenceInfo) {
        let (unit, _) = ScanFrontEnd::new().parse("src/app.ts", text);
        let info = gather_source_info(&unit, Vec::new(), |name| format!("src/{}", name));
        (unit, info)
    }

    fn run(project: &mut Project, text: &str) -> (Vec<String>, CompilationResult) {
        let (mut unit, info) = unit(text);
        let mut result = CompilationResult::new();
        let mut pipeline = ResourceResolutionPipeline::new();
        pipeline.collect("src/app.ts", &unit, &info, project, &mut result);
        pipeline.settle(project, &mut result);
        let mut scope = RewriteScope::new(&mut unit);
        pipeline.apply(&mut scope, "src/app.ts", &info, project);
        let rendered = scope
            .unit()
            .calls
            .iter()
            .map(|call| call.render())
            .collect();
        (rendered, result)
    }

    #[test]
    fn test_unclaimed_asset_maps_to_shortened_name() {
        let mut project = project(ProjectConfig {
            bundle: BundleMode::Merged,
            ..Default::default()
        });
        let (calls, result) = run(&mut project, "var a = b.asset(\"logo.png\");\n");
        assert_eq!(calls, vec!["b.asset(\"a.png\")"]);
        assert!(!result.has_errors());
        assert_eq!(project.dep_asset_files.get("src/logo.png").map(String::as_str), Some("a.png"));
    }

    #[test]
    fn test_css_asset_keeps_its_name() {
        let mut project = project(ProjectConfig {
            bundle: BundleMode::Merged,
            ..Default::default()
        });
        let (calls, _) = run(&mut project, "b.asset(\"style.css\");\n");
        assert_eq!(calls, vec!["b.asset(\"src/style.css\")"]);
    }

    #[test]
    fn test_dynamic_asset_is_a_warning() {
        let mut project = project(ProjectConfig::default());
        let (calls, result) = run(&mut project, "b.asset(name);\n");
        assert_eq!(calls, vec!["b.asset(name)"]);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.messages()[0].code, codes::DYNAMIC_ASSET);
    }

    #[test]
    fn test_resolver_arity() {
        let mut single = project(ProjectConfig::default())
            .with_resolver(Arc::new(Claim("cdn", Some(Ok("https://cdn/x.png".into())), true)));
        let (calls, result) = run(&mut single, "b.asset(\"x.png\");\n");
        assert_eq!(calls, vec!["b.asset(\"https://cdn/x.png\")"]);
        assert!(!result.has_errors());

        let mut both = project(ProjectConfig::default())
            .with_resolver(Arc::new(Claim("one", Some(Ok("1".into())), false)))
            .with_resolver(Arc::new(Claim("two", Some(Ok("2".into())), false)));
        let (calls, result) = run(&mut both, "b.asset(\"x.png\");\n");
        assert_eq!(calls, vec!["b.asset(\"src/x.png\")"]);
        assert_eq!(result.messages()[0].code, codes::MULTIPLE_RESOLVERS);
        assert_eq!(result.messages()[0].message, "Multiple plugins handled asset src/x.png");
    }

    #[test]
    fn test_failed_resolution_is_reported_at_the_call() {
        let mut project = project(ProjectConfig::default())
            .with_resolver(Arc::new(Claim("bad", Some(Err("no such file".into())), true)));
        let (calls, result) = run(&mut project, "\n  b.asset(\"x.png\");\n");
        assert_eq!(calls, vec!["b.asset(\"x.png\")"]);
        let error = &result.messages()[0];
        assert_eq!(error.code, codes::RESOLVER_FAILED);
        assert_eq!(error.message, "no such file");
        assert_eq!(error.span.line, 2);
    }

    #[test]
    fn test_sprites_without_merge_are_shortened_and_recorded() {
        let mut project = project(ProjectConfig::default());
        let (calls, _) = run(&mut project, "b.sprite(\"icon.png\", \"red\");\n");
        assert_eq!(calls, vec!["b.sprite(\"src/icon.png\", \"red\")"]);
        assert!(project.dep_asset_files.contains_key("src/icon.png"));
    }

    #[test]
    fn test_translations_are_compiled() {
        let mut project = project(ProjectConfig {
            compile_translations: true,
            ..Default::default()
        })
        .with_translation(Box::new(MessageTable::new()));
        let (calls, _) = run(
            &mut project,
            "t(\"Hello\");\nt(\"Bye\", null, \"farewell\");\nf(\"{0}\", [1]);\n",
        );
        assert_eq!(calls, vec!["t(0)", "t(1, null)", "f(\"{0}\", [1])"]);
    }
}
