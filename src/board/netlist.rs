//! Netlist components consumed by the layout-versus-schematic check

use serde::Deserialize;

/// Component as listed by the schematic netlist
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetlistComponent {
    pub reference: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub footprint: String,
}

/// Ordered list of schematic components
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Netlist {
    pub components: Vec<NetlistComponent>,
}

impl Netlist {
    pub fn from_references<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: references
                .into_iter()
                .map(|r| NetlistComponent {
                    reference: r.into(),
                    value: String::new(),
                    footprint: String::new(),
                })
                .collect(),
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.components.iter().any(|c| c.reference == reference)
    }
}
