//! Design Rule Check (DRC) engine
//!
//! Builds a per-layer R-tree over the board once, then runs the registered
//! test providers in sequence. Rule-area / copper-zone collisions are
//! precomputed in parallel with Rayon.
//!
//! # Submodules
//! - `types` - Error kinds, violations and run results
//! - `config` - Run configuration
//! - `error` - Library error type
//! - `distance` - Distance calculation algorithms
//! - `geometry` - Polygon booleans via `geo`
//! - `spatial` - Layer-aware spatial index
//! - `condition` - Rule condition language
//! - `rules` - Rule model and constraint resolution
//! - `progress` - Progress reporting and cancellation
//! - `reporter` - Violation sink
//! - `cache` - Parallel rule-area / zone collision cache
//! - `engine` - Provider orchestration
//! - `providers` - Keepout, disallow, text dimension and LVS tests

mod cache;
mod condition;
mod config;
mod distance;
mod engine;
mod error;
mod geometry;
mod progress;
mod providers;
mod reporter;
mod rules;
mod spatial;
mod types;

pub use cache::{build_area_cache, candidate_pairs, zone_collides_area, AreaCache};
pub use condition::{AreaTest, Condition, ConditionContext, ConditionError, Property, Side};
pub use config::DrcConfig;
pub use engine::{DrcContext, DrcEngine};
pub use error::{DrcError, Result};
pub use progress::{CancellationToken, LogProgress, NullProgress, ProgressReporter};
pub use providers::{
    DisallowProvider, KeepoutProvider, LvsProvider, ProviderFactory, ProviderRegistry, TestProvider,
    TextDimensionProvider,
};
pub use reporter::ViolationReporter;
pub use rules::{CompiledRule, Constraint, ConstraintType, Rule, RuleSet, RuleValue};
pub use spatial::{DrcRtree, IndexEntry};
pub use types::{DrcResult, ErrorKind, ProviderState, ProviderStatus, Severity, Violation};
