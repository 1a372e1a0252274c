// Provider selection: model slug -> ordered upstream candidates.

pub mod selector;

pub use selector::{Candidate, ProviderSelector, ResolvedEdge};
