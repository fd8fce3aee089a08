//! Page-object patching
//!
//! [`LocatorTable`] reads the named selectors declared in a `Locators` class by
//! walking the Python syntax tree; [`SelectorPatcher`] rewrites the selector
//! literals of those assignments and nothing else.

pub mod apply;
pub mod literal;
pub mod locators;

pub use apply::{versioned_path, PatchOutcome, SelectorPatcher};
pub use literal::{decode_string_literal, python_string_literal};
pub use locators::{LocatedAssignment, LocatorTable, LOCATOR_CLASS};
