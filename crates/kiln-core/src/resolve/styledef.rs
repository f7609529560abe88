use crate::frontend::Expr;
use crate::rewrite::RewriteScope;

use super::StyleDefSite;

/// How style definitions are rewritten for one build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StyleDefPolicy {
    #[default]
    None,
    /// Wrap the style in a lambda so it can be re-registered
    LiveReload,
    /// Inject the generated name, optionally prefixed
    Debug { prefix: Option<String> },
    /// Drop the name argument
    Release,
    /// Prefix explicit and generated names
    Prefix(String),
}

fn prefixed(prefix: &str, scope: &mut RewriteScope, site: &StyleDefSite, name_index: usize) {
    let call = scope.unit().call(site.call);
    match &site.name {
        Some(name) => {
            let value = Expr::Str(format!("{}{}", prefix, name));
            scope.set_argument(site.call, name_index, value);
        }
        None => {
            if let Some(arg) = call.args.get(name_index).cloned() {
                let value = Expr::Concat(Box::new(Expr::Str(prefix.to_string())), Box::new(arg));
                scope.set_argument(site.call, name_index, value);
            }
        }
    }
}

/// Rewrite one style definition call under `policy`.
pub fn apply(site: &StyleDefSite, scope: &mut RewriteScope, policy: &StyleDefPolicy) {
    let skip = usize::from(site.is_ex);
    let name_index = 2 + skip;
    let arg_count = scope.unit().call(site.call).args.len();

    match policy {
        StyleDefPolicy::None => {}
        StyleDefPolicy::LiveReload => {
            let call = scope.unit().call(site.call);
            let captured: Vec<Expr> = call
                .args
                .iter()
                .skip(skip)
                .take(2)
                .cloned()
                .collect();
            scope.set_argument(site.call, skip, Expr::Lambda(captured));
            scope.set_argument(site.call, 1 + skip, Expr::Null);
        }
        StyleDefPolicy::Debug { prefix } => {
            let name = match (prefix, &site.name) {
                (Some(prefix), None) => {
                    prefixed(prefix, scope, site, name_index);
                    return;
                }
                (Some(prefix), Some(name)) => format!("{}{}", prefix, name),
                (None, Some(name)) if !site.user_named => name.clone(),
                (None, _) => return,
            };
            scope.set_argument_count(site.call, name_index + 1);
            scope.set_argument(site.call, name_index, Expr::Str(name));
        }
        StyleDefPolicy::Release => {
            if arg_count > name_index {
                scope.set_argument_count(site.call, name_index);
            }
        }
        StyleDefPolicy::Prefix(prefix) => prefixed(prefix, scope, site, name_index),
    }
}
