// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Function slugs and project references are checked at construction.

mod function_slug;
mod project_ref;

pub use function_slug::{FunctionSlug, FunctionSlugError};
pub use project_ref::{ProjectRef, ProjectRefError};
