//! Component dependency graph.
//!
//! Three concerns live here:
//!
//! 1. **Tree** - the decomposition tree produced by breaking a spec into
//!    components: ordering, leaf detection, subtree queries
//! 2. **Resolve** - fuzzy resolution of free-text dependency names against
//!    the known component id set
//! 3. **Contracts** - incremental structural validation of component
//!    contracts: type references, completeness, dependency cycles

mod contracts;
mod resolve;
mod tree;

pub use contracts::{
    ComponentContract, FieldSpec, FunctionContract, TypeSpec, validate_contract_incremental,
    validate_dependency_graph,
};
pub use resolve::normalize_dependency_name;
pub use tree::{DecompositionNode, DecompositionTree, ImplementationStatus};
