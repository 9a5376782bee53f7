//! Route pattern matching for endpoint resolution.
//!
//! A route is compiled once into one of three strategies, chosen in priority
//! order:
//!
//! 1. **Regex override**: the endpoint's raw regex, anchored and case-insensitive
//! 2. **Wildcard**: `**` (any number of segments), `*` (within one segment) and
//!    `{name}` captures, translated to a regex
//! 3. **Segments**: segment-by-segment comparison with `{name}`,
//!    `{name:constraint}` and `:name` parameters
//!
//! A pattern that fails to compile never matches and never errors.
//!
//! ## Module Structure
//!
//! - `constraint` - Parameter constraints (`int`, `guid`, `alpha`, ...)
//! - `path_matcher` - `CompiledRoute` and the strategies

mod constraint;
mod path_matcher;

pub use constraint::Constraint;
pub use path_matcher::{
    match_route, normalize_path, CompiledRoute, RouteMatch, RouteStrategy, Segment, WildcardParam,
};
