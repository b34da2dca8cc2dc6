//! Global String Interner
//!
//! Converts static-parameter names and enum option names into integer
//! [`Symbol`]s so parameter sets compare and hash as plain integers.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns a string, returning its existing symbol if already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up a string without interning it.
#[inline]
#[must_use]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
#[must_use]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{StaticParameterSet, StaticValue};

    #[test]
    fn options_shared_between_parameters_share_a_symbol() {
        let shadow_off = StaticValue::option("OFF");
        let fog_off = StaticValue::option("OFF");

        assert_eq!(shadow_off, fog_off);
        assert_eq!(shadow_off.as_option(), Some("OFF"));
    }

    #[test]
    fn parameter_and_option_names_do_not_collide() {
        let param = intern("SHADOW");
        let option = intern("PCF");
        let define = intern("SHADOW_PCF");

        assert_ne!(param, option);
        assert_ne!(param, define);
        assert_ne!(option, define);
        assert_eq!(resolve(define), "SHADOW_PCF");
    }

    #[test]
    fn unknown_names_are_not_interned_by_lookups() {
        let mut params = StaticParameterSet::new();
        assert!(!params.set("INTERNER_TEST_UNDECLARED", StaticValue::Int(1)));
        assert!(params.get("INTERNER_TEST_UNDECLARED").is_none());

        assert!(get("INTERNER_TEST_UNDECLARED").is_none());
    }
}
