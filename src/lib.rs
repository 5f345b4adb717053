//! Board design rule checking
//!
//! - `board` - Board model: items, layers, shapes and netlist
//! - `drc` - Spatial index, rules, test providers and the engine that runs them

pub mod board;
pub mod drc;

pub use board::{Board, BoardItem, ItemId, Layer, LayerSet, Netlist};
pub use drc::{DrcConfig, DrcEngine, DrcResult, ErrorKind, ProviderRegistry, Rule, Violation};
