use crate::frontend::{CallId, Expr, ParsedUnit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSite {
    pub call: CallId,
    /// Project-relative asset path, `None` when not a build-time constant
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpriteColor {
    None,
    Constant(String),
    /// Color computed at runtime
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSite {
    pub call: CallId,
    pub name: Option<String>,
    pub color: SpriteColor,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub x: Option<u32>,
    pub y: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSite {
    pub call: CallId,
    /// Message text, `None` when not a literal
    pub message: Option<String>,
    pub hint: Option<String>,
    /// `f(...)` only formats and is never looked up
    pub just_format: bool,
    pub with_params: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDefSite {
    pub call: CallId,
    /// Explicit name argument, or else the variable the style is bound to
    pub name: Option<String>,
    pub user_named: bool,
    /// `styleDefEx` takes the parent style as an extra leading argument
    pub is_ex: bool,
}

/// Reference sites and source dependencies of one parsed unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceInfo {
    /// `(specifier, resolved absolute path)` of every resolvable import
    pub source_deps: Vec<(String, String)>,
    pub assets: Vec<AssetSite>,
    pub sprites: Vec<SpriteSite>,
    pub translations: Vec<TranslationSite>,
    pub style_defs: Vec<StyleDefSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSite<'a> {
    Asset(&'a AssetSite),
    Sprite(&'a SpriteSite),
    Translation(&'a TranslationSite),
    StyleDef(&'a StyleDefSite),
}

impl ReferenceSite<'_> {
    pub fn call(&self) -> CallId {
        match self {
            ReferenceSite::Asset(site) => site.call,
            ReferenceSite::Sprite(site) => site.call,
            ReferenceSite::Translation(site) => site.call,
            ReferenceSite::StyleDef(site) => site.call,
        }
    }
}

impl ReferenceInfo {
    /// All sites in source order
    pub fn sites(&self) -> Vec<ReferenceSite<'_>> {
        let mut sites: Vec<ReferenceSite<'_>> = self
            .assets
            .iter()
            .map(ReferenceSite::Asset)
            .chain(self.sprites.iter().map(ReferenceSite::Sprite))
            .chain(self.translations.iter().map(ReferenceSite::Translation))
            .chain(self.style_defs.iter().map(ReferenceSite::StyleDef))
            .collect();
        sites.sort_by_key(|site| site.call().0);
        sites
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
            && self.sprites.is_empty()
            && self.translations.is_empty()
            && self.style_defs.is_empty()
    }
}

fn const_u32(expr: Option<&Expr>) -> Option<u32> {
    expr.and_then(Expr::as_number)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as u32)
}

fn const_string(expr: Option<&Expr>) -> Option<String> {
    expr.and_then(Expr::as_str).map(str::to_string)
}

/// Extract reference sites from `unit`.
///
/// `resolve_path` maps an asset or sprite path as written in the source to
/// its project-relative name.
pub fn gather_source_info(
    unit: &ParsedUnit,
    source_deps: Vec<(String, String)>,
    resolve_path: impl Fn(&str) -> String,
) -> ReferenceInfo {
    let mut info = ReferenceInfo {
        source_deps,
        ..Default::default()
    };

    for id in unit.call_ids() {
        let call = unit.call(id);
        match (call.object.as_deref(), call.method.as_str()) {
            (Some("b"), "asset") => info.assets.push(AssetSite {
                call: id,
                name: call.args.first().and_then(Expr::as_str).map(&resolve_path),
            }),
            (Some("b"), "sprite") => {
                let color = match call.args.get(1) {
                    None | Some(Expr::Null) => SpriteColor::None,
                    Some(Expr::Raw(raw)) if raw == "undefined" => SpriteColor::None,
                    Some(Expr::Str(color)) => SpriteColor::Constant(color.clone()),
                    Some(_) => SpriteColor::Dynamic,
                };
                info.sprites.push(SpriteSite {
                    call: id,
                    name: call.args.first().and_then(Expr::as_str).map(&resolve_path),
                    color,
                    width: const_u32(call.args.get(2)),
                    height: const_u32(call.args.get(3)),
                    x: const_u32(call.args.get(4)),
                    y: const_u32(call.args.get(5)),
                });
            }
            (Some("b"), method @ ("styleDef" | "styleDefEx")) => {
                let is_ex = method == "styleDefEx";
                let name_index = if is_ex { 3 } else { 2 };
                let explicit = const_string(call.args.get(name_index));
                let user_named = explicit.is_some();
                info.style_defs.push(StyleDefSite {
                    call: id,
                    name: explicit.or_else(|| call.binding.clone()),
                    user_named,
                    is_ex,
                });
            }
            (None, function @ ("t" | "f")) => info.translations.push(TranslationSite {
                call: id,
                message: const_string(call.args.first()),
                hint: const_string(call.args.get(2)),
                just_format: function == "f",
                with_params: matches!(call.args.get(1), Some(arg) if *arg != Expr::Null),
            }),
            _ => {}
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{FrontEnd, ScanFrontEnd};
    use indoc::indoc;

    fn gather(text: &str) -> ReferenceInfo {
        let (unit, _) = ScanFrontEnd::new().parse("src/app.js", text);
        gather_source_info(&unit, Vec::new(), |p| format!("src/{}", p))
    }

    #[test]
    fn test_asset_sites() {
        let info = gather("b.asset('logo.png');\nb.asset(name);\n");
        assert_eq!(info.assets.len(), 2);
        assert_eq!(info.assets[0].name.as_deref(), Some("src/logo.png"));
        assert_eq!(info.assets[1].name, None);
    }

    #[test]
    fn test_sprite_sites() {
        let info = gather(indoc! {r##"
            b.sprite("a.png");
            b.sprite("a.png", "#fff", 10, 20, 1, 2);
            b.sprite("a.png", color());
        "##});
        assert_eq!(info.sprites[0].color, SpriteColor::None);
        assert_eq!(info.sprites[1].color, SpriteColor::Constant("#fff".to_string()));
        assert_eq!(info.sprites[1].width, Some(10));
        assert_eq!(info.sprites[1].y, Some(2));
        assert_eq!(info.sprites[2].color, SpriteColor::Dynamic);
    }

    #[test]
    fn test_translation_and_style_sites() {
        let info = gather(indoc! {r#"
            t("Hello", null, "hint");
            f("{a}", { a: 1 });
            t(dynamic);
            var card = b.styleDef({}, null);
            b.styleDefEx(card, {}, null, "explicit");
            b.styleDef({});
        "#});
        assert_eq!(info.translations.len(), 3);
        assert_eq!(info.translations[0].hint.as_deref(), Some("hint"));
        assert!(!info.translations[0].with_params);
        assert!(info.translations[1].just_format);
        assert!(info.translations[1].with_params);
        assert_eq!(info.translations[2].message, None);

        assert_eq!(info.style_defs[0].name.as_deref(), Some("card"));
        assert!(!info.style_defs[0].user_named);
        assert!(info.style_defs[1].is_ex);
        assert!(info.style_defs[1].user_named);
        assert_eq!(info.style_defs[1].name.as_deref(), Some("explicit"));
        assert_eq!(info.style_defs[2].name, None);
    }

    #[test]
    fn test_sites_are_in_source_order() {
        let info = gather("t('x');\nb.asset('a.png');\nb.sprite('s.png');\n");
        let calls: Vec<usize> = info.sites().iter().map(|s| s.call().0).collect();
        assert_eq!(calls, vec![0, 1, 2]);
    }
}
