use indoc::indoc;
use kiln_core::config::{BundleMode, ProjectConfig};
use kiln_core::BundlePhase;
use kiln_test_helpers::fixtures::ProjectFixture;

fn bundled(mode: BundleMode, files: &[(&str, &str)]) -> ProjectFixture {
    let config = ProjectConfig {
        main: vec!["app.ts".to_string()],
        bundle: mode,
        ..Default::default()
    };
    let fixture = ProjectFixture::new(config);
    for (path, content) in files {
        fixture.write(path, content);
    }
    fixture
}

const APP: &str = indoc! {r#"
    import * as b from "bobril";
    import { helper } from "./lib";
    export const run = helper;
"#};

fn runtime_project(mode: BundleMode) -> ProjectFixture {
    bundled(
        mode,
        &[
            ("app.ts", APP),
            ("lib.ts", "export function helper() { return 1; }\n"),
            ("node_modules/bobril/package.json", "{ \"main\": \"index.js\" }"),
            ("node_modules/bobril/index.ts", "export const version = \"1\";\n"),
        ],
    )
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("{} not found in bundle", needle))
}

// ============================================================================
// Merged bundles
// ============================================================================

#[test]
fn test_merged_bundle_orders_runtime_first() {
    let mut fixture = runtime_project(BundleMode::Merged);
    fixture.compile();

    assert_eq!(fixture.written(), vec!["bundle.js"]);
    assert_eq!(fixture.session.phase(), BundlePhase::Done);
    let js = fixture.output("bundle.js").unwrap();

    let runtime = position(&js, "R(\"node_modules/bobril/index\",function(");
    let lib = position(&js, "R(\"lib\",function(");
    let app = position(&js, "R(\"app\",function(");
    assert!(runtime < lib && lib < app);

    let start_runtime = position(&js, "R.r(\"node_modules/bobril/index\");");
    let start_app = position(&js, "R.r(\"app\");");
    assert!(app < start_runtime && start_runtime < start_app);

    assert!(js.contains("var b = require(\"node_modules/bobril/index\");"));
    assert!(js.contains("require(\"lib\")"));
    assert!(js.starts_with("(function(){\n"));
    assert!(js.trim_end().ends_with("})();"));
}

#[test]
fn test_merged_bundle_without_runtime_has_no_shim() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[("app.ts", "export const a = 1;\n")],
    );
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(!js.contains("bobril"));
    assert!(js.contains("R.r(\"app\");"));
}

#[test]
fn test_mangled_bundle_uses_short_module_names() {
    let mut fixture = runtime_project(BundleMode::Merged);
    fixture.project.config.mangle = true;
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("R(\"0\",function("));
    assert!(js.contains("R(\"1\",function("));
    assert!(js.contains("R(\"2\",function("));
    assert!(js.contains("require(\"1\")"));
    assert!(js.contains("R.r(\"0\");"));
    assert!(js.contains("R.r(\"2\");"));
    assert!(!js.contains("R(\"lib\""));
}

#[test]
fn test_defines_are_substituted() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[("app.ts", "export const mode = DEBUG ? \"dev\" : \"prod\";\n")],
    );
    fixture
        .project
        .config
        .defines
        .insert("DEBUG".to_string(), serde_json::json!(false));
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("var mode = false ? \"dev\" : \"prod\";"));
}

#[test]
fn test_compressed_bundle_drops_comments() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[("app.ts", "// note\nexport const a = \"// kept\";\n")],
    );
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(!js.contains("// note"));
    assert!(js.contains("\"// kept\""));
}

#[test]
fn test_unchanged_bundle_is_not_rewritten() {
    let mut fixture = runtime_project(BundleMode::Merged);
    fixture.compile();
    fixture.written();

    assert!(fixture.compile().is_up_to_date());
    assert!(fixture.written().is_empty());
}

#[test]
fn test_rebundle_keeps_unchanged_modules() {
    let mut fixture = runtime_project(BundleMode::Merged);
    fixture.compile();
    fixture.written();

    fixture.write("lib.ts", "export function helper() { return 2; }\n");
    let report = fixture.compile();

    assert_eq!(report.emitted, vec!["lib.ts", "app.ts"]);
    assert_eq!(fixture.written(), vec!["bundle.js"]);
    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("R(\"node_modules/bobril/index\",function("));
    assert!(js.contains("return 2;"));
}

#[test]
fn test_js_assets_are_prepended() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[
            ("app.ts", "var v = b.asset(\"vendor.js\");\n"),
            ("vendor.js", "var VENDOR = 1;"),
        ],
    );
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(js.starts_with("var VENDOR = 1;\n(function(){\n"));
}

#[test]
fn test_dependency_js_becomes_a_bundle_module() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[
            ("app.ts", "import \"./legacy\";\n"),
            ("legacy.d.ts", "export {};\n"),
            ("legacy.js", "exports.legacy = true;\n"),
        ],
    );
    fixture.compile();

    assert_eq!(fixture.written(), vec!["bundle.js"]);
    let js = fixture.output("bundle.js").unwrap();
    let legacy = position(&js, "R(\"legacy\",function(");
    let app = position(&js, "R(\"app\",function(");
    assert!(legacy < app);
    assert!(js.contains("exports.legacy = true;"));
}

// ============================================================================
// Fast bundles
// ============================================================================

#[test]
fn test_fast_bundle_writes_source_map() {
    let mut fixture = runtime_project(BundleMode::Fast);
    fixture.compile();

    assert_eq!(fixture.written(), vec!["bundle.js", "bundle.js.map"]);
    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("R('app',function(require, module, exports, global){"));
    assert!(js.contains("R.r(\"app\");"));
    assert!(js
        .trim_end()
        .ends_with("//# sourceMappingURL=bundle.js.map"));

    let map: serde_json::Value =
        serde_json::from_str(&fixture.output("bundle.js.map").unwrap()).unwrap();
    assert_eq!(map["version"], 3);
    let sources: Vec<&str> = map["sources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_str())
        .collect();
    assert!(sources.contains(&"app.ts"));
    assert!(sources.contains(&"lib.ts"));
}

#[test]
fn test_fast_bundle_forgets_dropped_modules() {
    let mut fixture = bundled(
        BundleMode::Fast,
        &[
            ("app.ts", "import { old } from \"./old\";\nexport const run = old;\n"),
            ("old.ts", "export const old = 1;\n"),
        ],
    );
    fixture.compile();
    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("R('old',function(require, module, exports, global){"));

    fixture.write("app.ts", "export const run = 2;\n");
    fixture.remove("old.ts");
    fixture.compile();

    let js = fixture.output("bundle.js").unwrap();
    assert!(js.contains("R('app',function(require, module, exports, global){"));
    assert!(!js.contains("R('old'"));
}

// ============================================================================
// Stylesheets
// ============================================================================

const STYLED_APP: &str = "var css = b.asset(\"style.css\");\n";
const STYLE: &str = "body {\n  background: url(img/bg.png);\n}\n";

#[test]
fn test_stylesheets_are_copied_and_linked() {
    let mut fixture = ProjectFixture::with_files(
        &["app.ts"],
        &[("app.ts", STYLED_APP), ("style.css", STYLE), ("img/bg.png", "png")],
    );
    fixture.compile();

    assert_eq!(
        fixture.written(),
        vec!["app.js", "img/bg.png", "style.css"]
    );
    assert_eq!(fixture.project.css_to_link, vec!["style.css"]);
    assert_eq!(fixture.output("style.css").as_deref(), Some(STYLE));
}

#[test]
fn test_merged_stylesheets_become_one_minified_bundle() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[("app.ts", STYLED_APP), ("style.css", STYLE), ("img/bg.png", "png")],
    );
    fixture.compile();

    assert_eq!(
        fixture.written(),
        vec!["a.png", "bundle.css", "bundle.js"]
    );
    assert_eq!(fixture.project.css_to_link, vec!["bundle.css"]);
    assert_eq!(
        fixture.output("bundle.css").as_deref(),
        Some("body{background:url(a.png)}")
    );
}

#[test]
fn test_output_sub_dir_prefixes_shortened_names() {
    let mut fixture = bundled(
        BundleMode::Merged,
        &[("app.ts", "var i = b.asset(\"logo.png\");\n"), ("logo.png", "png")],
    );
    fixture.project.config.output_sub_dir = Some("static".to_string());
    fixture.project.shortener = kiln_core::FileNameShortener::new(&fixture.project.config);
    fixture.compile();

    assert_eq!(
        fixture.written(),
        vec!["static/a.png", "static/bundle.js"]
    );
    assert!(fixture
        .output("static/bundle.js")
        .unwrap()
        .contains("b.asset(\"static/a.png\")"));
}
