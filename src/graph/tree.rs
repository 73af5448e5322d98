//! Decomposition tree: an arena of component nodes indexed by id.
//!
//! Parent/child relations are expressed as ids rather than owning pointers in
//! both directions, so child lookups and the distinguished root stay cheap
//! without cyclic ownership.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resolution::TestResults;

/// Where a component stands in the contract/implement/test pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationStatus {
    #[default]
    Pending,
    Contracted,
    Implemented,
    Tested,
    Failed,
}

/// A node in the decomposition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionNode {
    pub component_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub depth: u32,
    /// Empty for the root.
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub implementation_status: ImplementationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestResults>,
}

impl DecompositionNode {
    pub fn new(component_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            name: name.into(),
            description: String::new(),
            depth: 0,
            parent_id: String::new(),
            children: Vec::new(),
            implementation_status: ImplementationStatus::default(),
            test_results: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Full decomposition tree - all nodes indexed by component id.
///
/// Invariant: single root, no cycles, every non-root node reachable from the
/// root. The orchestration layer only violates this transiently while a new
/// contract is being validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecompositionTree {
    pub root_id: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, DecompositionNode>,
}

impl DecompositionTree {
    pub fn new(root: DecompositionNode) -> Self {
        let root_id = root.component_id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), root);
        Self { root_id, nodes }
    }

    /// Insert a node and register it with its parent's child list.
    pub fn insert(&mut self, node: DecompositionNode) {
        let id = node.component_id.clone();
        let parent_id = node.parent_id.clone();
        self.nodes.insert(id.clone(), node);
        if !parent_id.is_empty() {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                if !parent.children.contains(&id) {
                    parent.children.push(id);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&DecompositionNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DecompositionNode> {
        self.nodes.get_mut(id)
    }

    /// Leaf nodes - the independently implementable units.
    pub fn leaves(&self) -> Vec<&DecompositionNode> {
        self.nodes.values().filter(|n| n.is_leaf()).collect()
    }

    pub fn children_of(&self, id: &str) -> Vec<&DecompositionNode> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .collect()
    }

    pub fn parent_of(&self, id: &str) -> Option<&DecompositionNode> {
        let node = self.nodes.get(id)?;
        if node.parent_id.is_empty() {
            return None;
        }
        self.nodes.get(&node.parent_id)
    }

    /// Component ids in dependency order: every node appears after all of its
    /// descendants, since a parent can only be integrated once its children
    /// are implemented.
    ///
    /// Visits ALL nodes, not just those reachable from the root, so trees
    /// with orphaned subtrees still order every id.
    pub fn topological_order(&self) -> Vec<String> {
        let mut visited = std::collections::BTreeSet::new();
        let mut order = Vec::new();

        fn visit(
            tree: &DecompositionTree,
            id: &str,
            visited: &mut std::collections::BTreeSet<String>,
            order: &mut Vec<String>,
        ) {
            if !visited.insert(id.to_string()) {
                return;
            }
            if let Some(node) = tree.nodes.get(id) {
                for child in &node.children {
                    visit(tree, child, visited, order);
                }
                order.push(id.to_string());
            }
        }

        visit(self, &self.root_id, &mut visited, &mut order);
        let remaining: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !visited.contains(*id))
            .cloned()
            .collect();
        for id in remaining {
            visit(self, &id, &mut visited, &mut order);
        }
        order
    }

    /// All leaves can run simultaneously - they are independent in a tree.
    pub fn leaf_parallel_groups(&self) -> Vec<Vec<String>> {
        let leaf_ids: Vec<String> = self
            .leaves()
            .iter()
            .map(|n| n.component_id.clone())
            .collect();
        if leaf_ids.is_empty() {
            Vec::new()
        } else {
            vec![leaf_ids]
        }
    }

    /// Non-leaves grouped by depth, deepest first, so children integrate
    /// before their parents.
    pub fn non_leaf_parallel_groups(&self) -> Vec<Vec<String>> {
        let mut depth_map: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for node in self.nodes.values() {
            if !node.is_leaf() {
                depth_map
                    .entry(node.depth)
                    .or_default()
                    .push(node.component_id.clone());
            }
        }
        depth_map.into_values().rev().collect()
    }

    /// All node ids in the subtree rooted at `id`, inclusive.
    pub fn subtree(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                result.push(current);
                for child in node.children.iter().rev() {
                    stack.push(child.clone());
                }
            }
        }
        result
    }
}
