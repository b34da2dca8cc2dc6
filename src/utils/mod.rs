//! Utility Module
//!
//! - [`interner`]: String interning for static-parameter names and values
//!
//! ```rust,ignore
//! use myth_shading::utils::interner;
//!
//! let sym1 = interner::intern("SHADOW_MODE");
//! let sym2 = interner::intern("SHADOW_MODE");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;
