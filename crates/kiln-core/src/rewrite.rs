//! Reversible edits of parsed units
//!
//! Every edit made through a [`RewriteScope`] first records the node's
//! previous state. Dropping the scope replays those records in reverse, so
//! the cached unit is left exactly as it was parsed whichever way the
//! emitting code exits.

use crate::frontend::{CallExpr, CallId, DeclId, Expr, ParsedUnit};

enum Undo {
    Call { id: CallId, snapshot: CallExpr },
    Declaration { id: DeclId, init: Expr, edited: bool },
}

pub struct RewriteScope<'u> {
    unit: &'u mut ParsedUnit,
    log: Vec<Undo>,
}

impl<'u> RewriteScope<'u> {
    pub fn new(unit: &'u mut ParsedUnit) -> Self {
        Self {
            unit,
            log: Vec::new(),
        }
    }

    pub fn unit(&self) -> &ParsedUnit {
        self.unit
    }

    /// Number of recorded undo actions
    pub fn pending(&self) -> usize {
        self.log.len()
    }

    fn remember_call(&mut self, id: CallId) -> &mut CallExpr {
        let snapshot = self.unit.calls[id.0].clone();
        self.log.push(Undo::Call { id, snapshot });
        let call = &mut self.unit.calls[id.0];
        call.edited = true;
        call
    }

    pub fn set_method(&mut self, id: CallId, method: &str) {
        self.remember_call(id).method = method.to_string();
    }

    /// Replace argument `index`, padding missing arguments with `null`
    pub fn set_argument(&mut self, id: CallId, index: usize, value: Expr) {
        let call = self.remember_call(id);
        if call.args.len() <= index {
            call.args.resize(index + 1, Expr::Null);
        }
        call.args[index] = value;
    }

    /// Truncate or pad (with `null`) the argument list to `count`
    pub fn set_argument_count(&mut self, id: CallId, count: usize) {
        self.remember_call(id).args.resize(count, Expr::Null);
    }

    pub fn set_initializer(&mut self, id: DeclId, value: Expr) {
        let decl = &mut self.unit.declarations[id.0];
        self.log.push(Undo::Declaration {
            id,
            init: decl.init.clone(),
            edited: decl.edited,
        });
        decl.init = value;
        decl.edited = true;
    }

    /// Undo every edit, newest first
    pub fn restore(&mut self) {
        while let Some(undo) = self.log.pop() {
            match undo {
                Undo::Call { id, snapshot } => self.unit.calls[id.0] = snapshot,
                Undo::Declaration { id, init, edited } => {
                    let decl = &mut self.unit.declarations[id.0];
                    decl.init = init;
                    decl.edited = edited;
                }
            }
        }
    }
}

impl Drop for RewriteScope<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{FrontEnd, ScanFrontEnd};

    fn unit() -> ParsedUnit {
        ScanFrontEnd::new()
            .parse(
                "a.js",
                "var s = b.sprite('a.png', c, 1, 2);\nexport const DEBUG = true;\n",
            )
            .0
    }

    #[test]
    fn test_edits_apply_in_scope() {
        let mut unit = unit();
        let mut scope = RewriteScope::new(&mut unit);
        scope.set_method(CallId(0), "spritebc");
        scope.set_argument(CallId(0), 5, Expr::Num(3.0));
        scope.set_initializer(DeclId(0), Expr::Bool(false));

        let call = scope.unit().call(CallId(0));
        assert_eq!(call.method, "spritebc");
        assert_eq!(call.args.len(), 6);
        assert_eq!(call.args[4], Expr::Null);
        assert!(call.is_edited());
        assert_eq!(scope.pending(), 3);
    }

    #[test]
    fn test_drop_restores_everything() {
        let mut unit = unit();
        let pristine = unit.clone();
        {
            let mut scope = RewriteScope::new(&mut unit);
            scope.set_argument(CallId(0), 0, Expr::Str("x".to_string()));
            scope.set_argument_count(CallId(0), 1);
            scope.set_method(CallId(0), "spriteb");
            scope.set_initializer(DeclId(0), Expr::Null);
            scope.set_initializer(DeclId(0), Expr::Num(1.0));
        }
        assert_eq!(unit, pristine);
    }

    #[test]
    fn test_restore_on_early_return() {
        fn rewrite_then_fail(unit: &mut ParsedUnit) -> Result<(), String> {
            let mut scope = RewriteScope::new(unit);
            scope.set_argument_count(CallId(0), 0);
            Err("emit failed".to_string())
        }

        let mut unit = unit();
        let pristine = unit.clone();
        assert!(rewrite_then_fail(&mut unit).is_err());
        assert_eq!(unit, pristine);
    }
}
