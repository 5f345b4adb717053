//! Test providers
//!
//! Each provider checks one family of constraints. The engine runs them in
//! registration order; a registry maps provider names to factories so the
//! roster is explicit and can be trimmed by configuration.
//!
//! # Submodules
//! - `keepout` - Items inside rule areas
//! - `disallow` - Edge-cut texts, disallow rules, zones inside keepouts
//! - `text_dimension` - Text height and stroke thickness
//! - `lvs` - Board footprints against the netlist

mod disallow;
mod keepout;
mod lvs;
mod text_dimension;

pub use disallow::DisallowProvider;
pub use keepout::KeepoutProvider;
pub use lvs::LvsProvider;
pub use text_dimension::TextDimensionProvider;

use super::config::DrcConfig;
use super::engine::DrcContext;
use super::rules::ConstraintType;
use super::types::ProviderState;

pub trait TestProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Constraint types this provider resolves through rules
    fn matching_constraints(&self) -> &'static [ConstraintType];

    fn run(&self, ctx: &mut DrcContext<'_>) -> ProviderState;
}

pub type ProviderFactory = fn() -> Box<dyn TestProvider>;

/// Named provider factories in run order
#[derive(Default)]
pub struct ProviderRegistry {
    factories: Vec<(&'static str, ProviderFactory)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// keepout, disallow, text_dimensions, lvs
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register(KeepoutProvider::NAME, || Box::new(KeepoutProvider))
            .register(DisallowProvider::NAME, || Box::new(DisallowProvider))
            .register(TextDimensionProvider::NAME, || Box::new(TextDimensionProvider))
            .register(LvsProvider::NAME, || Box::new(LvsProvider));
        registry
    }

    /// Add a factory; registering an existing name replaces it in place
    pub fn register(&mut self, name: &'static str, factory: ProviderFactory) -> &mut Self {
        match self.factories.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = factory,
            None => self.factories.push((name, factory)),
        }
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(n, _)| *n).collect()
    }

    /// Providers not disabled by `config`, in registration order
    pub fn instantiate(&self, config: &DrcConfig) -> Vec<Box<dyn TestProvider>> {
        self.factories
            .iter()
            .filter(|(name, _)| {
                let enabled = config.is_provider_enabled(name);
                if !enabled {
                    tracing::debug!("[DRC] Provider {} disabled by configuration", name);
                }
                enabled
            })
            .map(|(_, factory)| factory())
            .collect()
    }
}
