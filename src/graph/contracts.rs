//! Contract structural validation - mechanical gates, no LLM.
//!
//! Checks are collected into a list of descriptive strings rather than raised
//! one at a time, so a caller can report every problem at once. An empty list
//! means valid.
//!
//! Validation runs incrementally: one proposed contract is checked against
//! the already-accepted set, keeping the cost linear in dependency count.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::tree::DecompositionTree;

/// Type names every contract may reference without declaring.
const PRIMITIVES: [&str; 9] = [
    "str", "int", "float", "bool", "none", "bytes", "dict", "list", "any",
];

/// A typed field within a struct or function signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub type_ref: String,
    #[serde(default)]
    pub description: String,
}

/// A type declared by a contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub description: String,
}

/// Contract for a single function: inputs and output type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionContract {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<FieldSpec>,
    #[serde(default)]
    pub output_type: String,
}

/// The interface contract for a single component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentContract {
    pub component_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionContract>,
    /// Component ids this contract depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub invariants: Vec<String>,
}

/// Validate one proposed contract against the accepted set.
///
/// Checks: non-empty name, every referenced type resolves to a primitive or
/// declared type, and no dependency cycle exists when the proposed contract
/// joins the accepted set.
pub fn validate_contract_incremental(
    contract: &ComponentContract,
    existing: &BTreeMap<String, ComponentContract>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if contract.name.trim().is_empty() {
        errors.push(format!(
            "Contract '{}' missing name",
            contract.component_id
        ));
    }

    errors.extend(validate_type_references(contract));
    errors.extend(detect_dependency_cycle(contract, existing));
    errors
}

/// Check that every type_ref in inputs, outputs, and declared struct fields
/// resolves to a known primitive or a type declared by this contract.
fn validate_type_references(contract: &ComponentContract) -> Vec<String> {
    let mut defined: BTreeSet<String> = PRIMITIVES.iter().map(|p| p.to_string()).collect();
    defined.extend(contract.types.iter().map(|t| t.name.to_lowercase()));

    let known = |type_ref: &str| defined.contains(&type_ref.to_lowercase());
    let mut errors = Vec::new();

    for func in &contract.functions {
        if !func.output_type.is_empty() && !known(&func.output_type) {
            errors.push(format!(
                "Unknown type reference: function '{}' output_type '{}' not defined in component '{}'",
                func.name, func.output_type, contract.component_id
            ));
        }
        for input in &func.inputs {
            if !known(&input.type_ref) {
                errors.push(format!(
                    "Unknown type reference: function '{}' input '{}' type_ref '{}' not defined in component '{}'",
                    func.name, input.name, input.type_ref, contract.component_id
                ));
            }
        }
    }

    for type_spec in &contract.types {
        for field in &type_spec.fields {
            if !known(&field.type_ref) {
                errors.push(format!(
                    "Unknown type reference: type '{}' field '{}' type_ref '{}' not defined in component '{}'",
                    type_spec.name, field.name, field.type_ref, contract.component_id
                ));
            }
        }
    }

    errors
}

/// Look for a dependency cycle in `existing ∪ {contract}`.
///
/// DFS from the proposed contract over declared-dependency edges; if the walk
/// comes back to the proposed component the cycle path is reported by name.
fn detect_dependency_cycle(
    contract: &ComponentContract,
    existing: &BTreeMap<String, ComponentContract>,
) -> Vec<String> {
    fn deps<'a>(
        id: &str,
        contract: &'a ComponentContract,
        existing: &'a BTreeMap<String, ComponentContract>,
    ) -> &'a [String] {
        if id == contract.component_id {
            &contract.dependencies
        } else {
            existing
                .get(id)
                .map(|c| c.dependencies.as_slice())
                .unwrap_or(&[])
        }
    }

    let mut errors = Vec::new();
    let mut stack = vec![(contract.component_id.clone(), vec![contract.component_id.clone()])];
    let mut seen = BTreeSet::new();

    while let Some((id, path)) = stack.pop() {
        for dep in deps(&id, contract, existing) {
            if *dep == contract.component_id {
                let mut cycle = path.clone();
                cycle.push(dep.clone());
                errors.push(format!("Circular dependency: {}", cycle.join(" -> ")));
                continue;
            }
            if seen.insert(dep.clone()) {
                let mut next_path = path.clone();
                next_path.push(dep.clone());
                stack.push((dep.clone(), next_path));
            }
        }
    }
    errors
}

/// Check that the tree's child edges are acyclic and resolve to known nodes.
///
/// This guards the tree invariant itself, separate from contract dependency
/// edges which [`validate_contract_incremental`] covers.
pub fn validate_dependency_graph(tree: &DecompositionTree) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut errors = Vec::new();
    let mut color: BTreeMap<String, Color> =
        tree.nodes.keys().map(|k| (k.clone(), Color::White)).collect();

    fn dfs(
        tree: &DecompositionTree,
        id: &str,
        path: &mut Vec<String>,
        color: &mut BTreeMap<String, Color>,
        errors: &mut Vec<String>,
    ) {
        color.insert(id.to_string(), Color::Gray);
        if let Some(node) = tree.nodes.get(id) {
            for child in &node.children {
                match color.get(child) {
                    None => {
                        errors.push(format!("Child '{child}' of '{id}' not found in tree"));
                    }
                    Some(Color::Gray) => {
                        path.push(child.clone());
                        errors.push(format!("Dependency cycle detected: {}", path.join(" -> ")));
                        path.pop();
                    }
                    Some(Color::White) => {
                        path.push(child.clone());
                        dfs(tree, child, path, color, errors);
                        path.pop();
                    }
                    Some(Color::Black) => {}
                }
            }
        }
        color.insert(id.to_string(), Color::Black);
    }

    let ids: Vec<String> = tree.nodes.keys().cloned().collect();
    for id in ids {
        if color.get(&id) == Some(&Color::White) {
            let mut path = vec![id.clone()];
            dfs(tree, &id, &mut path, &mut color, &mut errors);
        }
    }
    errors
}
