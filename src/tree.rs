//! Category forest projection and structural validation.
//!
//! Everything here is a pure function of a node snapshot. The forest is a
//! view rebuilt on demand; validation never keeps state between calls.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::anyhow;

use crate::error::{ErrorDetails, LibError, Result};
use crate::models::{
    CategoryDefinition, CategoryId, CategoryInvariantViolation, CategoryNode, CategoryTreeNode,
    DeletePlan, DeletePolicy,
};

/// Lookup tables over one snapshot, built in a single pass.
#[derive(Debug, Clone)]
pub struct CategoryIndex<'a> {
    nodes: HashMap<CategoryId, &'a CategoryNode>,
    children: HashMap<CategoryId, Vec<CategoryId>>,
    slugs: HashMap<&'a str, CategoryId>,
}

impl<'a> CategoryIndex<'a> {
    pub fn new(nodes: &'a [CategoryNode]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        let mut slugs = HashMap::with_capacity(nodes.len());
        for node in nodes {
            by_id.insert(node.id, node);
            slugs.entry(node.slug.as_str()).or_insert(node.id);
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(node.id);
            }
        }

        Self {
            nodes: by_id,
            children,
            slugs,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&'a CategoryNode> {
        self.nodes.get(&id).copied()
    }

    pub fn children_of(&self, id: CategoryId) -> &[CategoryId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn slug_owner(&self, slug: &str) -> Option<CategoryId> {
        self.slugs.get(slug).copied()
    }

    /// Ancestor chain of `id`, nearest parent first.
    ///
    /// The walk is bounded by the node count; exceeding it, revisiting a
    /// node, or stepping onto a missing parent means the snapshot is already
    /// corrupt.
    pub fn ancestors(&self, id: CategoryId) -> Result<Vec<CategoryId>> {
        let Some(start) = self.get(id) else {
            return Err(LibError::not_found(
                "Category not found",
                anyhow!("category {} not found", id),
            ));
        };

        let bound = self.nodes.len();
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut current = start.parent_id;
        while let Some(parent_id) = current {
            if chain.len() >= bound || !seen.insert(parent_id) {
                return Err(corrupt_walk(id, &chain));
            }
            let Some(parent) = self.get(parent_id) else {
                return Err(LibError::internal_consistency(
                    "Category hierarchy is inconsistent",
                    anyhow!(
                        "ancestor walk from {} reached missing parent {}",
                        id,
                        parent_id
                    ),
                ));
            };
            chain.push(parent_id);
            current = parent.parent_id;
        }

        Ok(chain)
    }

    /// All descendants of `id`, breadth-first.
    pub fn descendants(&self, id: CategoryId) -> Result<Vec<CategoryId>> {
        if !self.contains(id) {
            return Err(LibError::not_found(
                "Category not found",
                anyhow!("category {} not found", id),
            ));
        }

        let mut output = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut queue = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if !seen.insert(*child) {
                    return Err(LibError::internal_consistency(
                        "Category hierarchy is inconsistent",
                        anyhow!("descendant walk from {} revisited {}", id, child),
                    ));
                }
                output.push(*child);
                queue.push_back(*child);
            }
        }

        Ok(output)
    }

    /// Admits or rejects `proposed_parent` as the parent of `node_id`
    /// (`None` for a node that does not exist yet).
    pub fn validate_parent(
        &self,
        node_id: Option<CategoryId>,
        proposed_parent: Option<CategoryId>,
    ) -> Result<()> {
        let Some(parent_id) = proposed_parent else {
            return Ok(());
        };

        if node_id == Some(parent_id) {
            return Err(LibError::cycle(
                "Cannot be own parent",
                anyhow!("category {} proposed as its own parent", parent_id),
            )
            .with_details(ErrorDetails::CyclePath {
                node_id: parent_id,
                ancestors: vec![],
            }));
        }

        if !self.contains(parent_id) {
            return Err(LibError::not_found(
                "Parent category not found",
                anyhow!("parent category {} not found", parent_id),
            ));
        }

        let Some(node_id) = node_id else {
            // A node being created has no descendants, but the parent's
            // chain must still be sound.
            self.ancestors(parent_id)?;
            return Ok(());
        };

        let mut chain = vec![parent_id];
        chain.extend(self.ancestors(parent_id)?);
        if let Some(position) = chain.iter().position(|ancestor| *ancestor == node_id) {
            chain.truncate(position + 1);
            return Err(LibError::cycle(
                "Cannot move a category under one of its descendants",
                anyhow!(
                    "category {} is an ancestor of proposed parent {}",
                    node_id,
                    parent_id
                ),
            )
            .with_details(ErrorDetails::CyclePath {
                node_id,
                ancestors: chain,
            }));
        }

        Ok(())
    }

    /// Fails with a duplicate-slug error when `slug` belongs to a node other
    /// than `except`.
    pub fn ensure_slug_available(&self, slug: &str, except: Option<CategoryId>) -> Result<()> {
        match self.slug_owner(slug) {
            Some(owner) if Some(owner) != except => Err(LibError::duplicate_slug(slug)),
            _ => Ok(()),
        }
    }

    pub fn plan_delete(&self, id: CategoryId, policy: DeletePolicy) -> Result<DeletePlan> {
        let Some(target) = self.get(id) else {
            return Err(LibError::not_found(
                "Category not found",
                anyhow!("category {} not found", id),
            ));
        };

        match policy {
            DeletePolicy::PromoteChildren => Ok(DeletePlan {
                target: id,
                policy,
                removed: vec![id],
                reparented: self
                    .children_of(id)
                    .iter()
                    .map(|child| (*child, target.parent_id))
                    .collect(),
            }),
            DeletePolicy::Cascade => {
                let mut removed = self.descendants(id)?;
                removed.reverse();
                removed.push(id);
                Ok(DeletePlan {
                    target: id,
                    policy,
                    removed,
                    reparented: vec![],
                })
            }
        }
    }
}

fn corrupt_walk(start: CategoryId, chain: &[CategoryId]) -> LibError {
    LibError::internal_consistency(
        "Category hierarchy is inconsistent",
        anyhow!(
            "ancestor walk from {} exceeded node bound or revisited a node: {:?}",
            start,
            chain
        ),
    )
}

/// Forest of root nodes with children attached in input order.
pub fn build_forest(nodes: &[CategoryNode]) -> Vec<CategoryTreeNode> {
    let mut children: HashMap<CategoryId, Vec<&CategoryNode>> = HashMap::new();
    let mut roots = Vec::new();
    for node in nodes {
        match node.parent_id {
            Some(parent_id) => children.entry(parent_id).or_default().push(node),
            None => roots.push(node),
        }
    }

    // Pre-order from the roots; reversing it guarantees every child is
    // finished before its parent.
    let mut order = Vec::with_capacity(nodes.len());
    let mut seen = HashSet::with_capacity(nodes.len());
    let mut stack: Vec<&CategoryNode> = roots.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id) {
            continue;
        }
        order.push(node);
        if let Some(kids) = children.get(&node.id) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    let mut built: HashMap<CategoryId, CategoryTreeNode> = HashMap::with_capacity(order.len());
    for node in order.into_iter().rev() {
        let attached = children
            .get(&node.id)
            .map(|kids| {
                kids.iter()
                    .filter_map(|kid| built.remove(&kid.id))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        built.insert(
            node.id,
            CategoryTreeNode {
                id: node.id,
                name: node.name.clone(),
                slug: node.slug.clone(),
                parent_id: node.parent_id,
                children: attached,
            },
        );
    }

    roots
        .into_iter()
        .filter_map(|root| built.remove(&root.id))
        .collect()
}

/// Display variant of [`build_forest`] with siblings sorted by name.
pub fn build_forest_sorted(nodes: &[CategoryNode]) -> Vec<CategoryTreeNode> {
    let mut sorted = nodes.to_vec();
    sorted.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
    build_forest(&sorted)
}

/// Pre-order flattening of a forest back into flat nodes.
pub fn flatten_forest(forest: &[CategoryTreeNode]) -> Vec<CategoryNode> {
    let mut output = Vec::new();
    let mut stack: Vec<&CategoryTreeNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        output.push(CategoryNode {
            id: node.id,
            name: node.name.clone(),
            slug: node.slug.clone(),
            parent_id: node.parent_id,
        });
        stack.extend(node.children.iter().rev());
    }
    output
}

pub fn validate_parent(
    nodes: &[CategoryNode],
    node_id: Option<CategoryId>,
    proposed_parent: Option<CategoryId>,
) -> Result<()> {
    CategoryIndex::new(nodes).validate_parent(node_id, proposed_parent)
}

pub fn ancestors(nodes: &[CategoryNode], id: CategoryId) -> Result<Vec<CategoryId>> {
    CategoryIndex::new(nodes).ancestors(id)
}

pub fn descendants(nodes: &[CategoryNode], id: CategoryId) -> Result<Vec<CategoryId>> {
    CategoryIndex::new(nodes).descendants(id)
}

pub fn plan_delete(
    nodes: &[CategoryNode],
    id: CategoryId,
    policy: DeletePolicy,
) -> Result<DeletePlan> {
    CategoryIndex::new(nodes).plan_delete(id, policy)
}

/// Validates a new node against the snapshot: parent exists and slug is free.
pub fn check_create(nodes: &[CategoryNode], definition: &CategoryDefinition) -> Result<()> {
    let index = CategoryIndex::new(nodes);
    index.validate_parent(None, definition.parent_id)?;
    index.ensure_slug_available(&definition.slug, None)
}

/// Validates an update of `id` against the snapshot: the node exists, the
/// new parent keeps the forest acyclic, and the slug is free.
pub fn check_update(
    nodes: &[CategoryNode],
    id: CategoryId,
    definition: &CategoryDefinition,
) -> Result<()> {
    let index = CategoryIndex::new(nodes);
    if !index.contains(id) {
        return Err(LibError::not_found(
            "Category not found",
            anyhow!("category {} not found", id),
        ));
    }
    index.validate_parent(Some(id), definition.parent_id)?;
    index.ensure_slug_available(&definition.slug, Some(id))
}

/// Applies a delete plan to an owned node set: re-link first, then remove.
pub fn apply_delete_plan(nodes: &mut Vec<CategoryNode>, plan: &DeletePlan) {
    let reparented: HashMap<CategoryId, Option<CategoryId>> =
        plan.reparented.iter().copied().collect();
    for node in nodes.iter_mut() {
        if let Some(new_parent) = reparented.get(&node.id) {
            node.parent_id = *new_parent;
        }
    }
    let removed: HashSet<CategoryId> = plan.removed.iter().copied().collect();
    nodes.retain(|node| !removed.contains(&node.id));
}

/// Full audit of a node set against every forest invariant.
pub fn category_invariant_violations(nodes: &[CategoryNode]) -> Vec<CategoryInvariantViolation> {
    let mut violations = Vec::new();

    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(node.id) {
            violations.push(CategoryInvariantViolation::DuplicateId { node_id: node.id });
        }
    }

    let mut slug_owners: HashMap<&str, Vec<CategoryId>> = HashMap::new();
    for node in nodes {
        slug_owners.entry(node.slug.as_str()).or_default().push(node.id);
    }
    let mut duplicate_slugs = slug_owners
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .collect::<Vec<_>>();
    duplicate_slugs.sort_by(|a, b| a.0.cmp(b.0));
    for (slug, node_ids) in duplicate_slugs {
        violations.push(CategoryInvariantViolation::DuplicateSlug {
            slug: slug.to_string(),
            node_ids,
        });
    }

    let parent_of: HashMap<CategoryId, Option<CategoryId>> =
        nodes.iter().map(|node| (node.id, node.parent_id)).collect();
    for node in nodes {
        match node.parent_id {
            Some(parent_id) if parent_id == node.id => {
                violations.push(CategoryInvariantViolation::SelfParent { node_id: node.id });
            }
            Some(parent_id) if !parent_of.contains_key(&parent_id) => {
                violations.push(CategoryInvariantViolation::DanglingParent {
                    node_id: node.id,
                    parent_id,
                });
            }
            _ => {}
        }
    }

    for cycle in find_cycles(nodes, &parent_of) {
        violations.push(CategoryInvariantViolation::Cycle { node_ids: cycle });
    }

    violations
}

pub fn ensure_category_invariants(nodes: &[CategoryNode]) -> Result<()> {
    let violations = category_invariant_violations(nodes);
    let Some(first) = violations.first() else {
        return Ok(());
    };

    if let CategoryInvariantViolation::DuplicateSlug { slug, .. } = first {
        return Err(LibError::duplicate_slug(slug));
    }

    Err(LibError::internal_consistency(
        first.public_message(),
        anyhow!(
            "category invariant validation failed ({}): {:?}",
            first.error_code(),
            violations
        ),
    ))
}

/// Cycles of length two or more in the parent relation. Self-parents are
/// reported separately.
fn find_cycles(
    nodes: &[CategoryNode],
    parent_of: &HashMap<CategoryId, Option<CategoryId>>,
) -> Vec<Vec<CategoryId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: HashMap<CategoryId, Mark> = HashMap::with_capacity(nodes.len());
    let mut cycles = Vec::new();

    for node in nodes {
        if marks.contains_key(&node.id) {
            continue;
        }

        let mut path = Vec::new();
        let mut current = Some(node.id);
        while let Some(id) = current {
            match marks.get(&id) {
                Some(Mark::Done) => break,
                Some(Mark::InProgress) => {
                    if let Some(start) = path.iter().position(|entry| *entry == id) {
                        let cycle = path[start..].to_vec();
                        if cycle.len() > 1 {
                            cycles.push(cycle);
                        }
                    }
                    break;
                }
                None => {}
            }
            if !parent_of.contains_key(&id) {
                break;
            }
            marks.insert(id, Mark::InProgress);
            path.push(id);
            current = parent_of.get(&id).copied().flatten();
        }

        for id in path {
            marks.insert(id, Mark::Done);
        }
    }

    cycles
}
