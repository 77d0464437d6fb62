//! Static dependency graph between resource categories.
//!
//! An edge `A → B` means a resource of category `A` references one of
//! category `B`, so `B` must exist before `A` is created and `A` must be
//! gone before `B` can be deleted.

use crate::types::ResourceCategory;

/// Compile-time partial order over resource categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyGraph;

impl DependencyGraph {
    pub const fn new() -> Self {
        Self
    }

    /// Categories that `category` directly depends on.
    pub fn dependencies(&self, category: ResourceCategory) -> &'static [ResourceCategory] {
        use ResourceCategory::*;
        match category {
            NetworkRuleSet => &[],
            ComputeInstance => &[NetworkRuleSet],
            TargetGroup => &[],
            // The listener binds the balancer to its target group.
            LoadBalancer => &[NetworkRuleSet, TargetGroup],
            LaunchTemplate => &[NetworkRuleSet],
            ScalingGroup => &[LaunchTemplate, TargetGroup],
            ScalingPolicy => &[ScalingGroup],
            MetricAlarm => &[ScalingPolicy, ScalingGroup],
        }
    }

    /// Whether `dependent` directly depends on `dependency`.
    pub fn depends_on(&self, dependent: ResourceCategory, dependency: ResourceCategory) -> bool {
        self.dependencies(dependent).contains(&dependency)
    }

    /// Categories in deletion order: a category only appears after every
    /// category that depends on it.
    ///
    /// Ties are broken by declaration order, later categories first, so
    /// the order is deterministic:
    /// alarm → policy → group → template → balancer → target group →
    /// instance → rule set.
    pub fn teardown_order(&self) -> Vec<ResourceCategory> {
        let all = ResourceCategory::ALL;
        let mut removed = [false; ResourceCategory::ALL.len()];
        let mut order = Vec::with_capacity(all.len());

        while order.len() < all.len() {
            // A category is free once no remaining category depends on it.
            let next = all
                .iter()
                .rev()
                .copied()
                .filter(|c| !removed[c.index()])
                .find(|&candidate| {
                    !all.iter()
                        .any(|&other| !removed[other.index()] && self.depends_on(other, candidate))
                });

            match next {
                Some(category) => {
                    removed[category.index()] = true;
                    order.push(category);
                }
                // The edge table is acyclic; this arm only guards edits to it.
                None => break,
            }
        }

        order
    }

    /// Categories in creation order (reverse of teardown order).
    pub fn creation_order(&self) -> Vec<ResourceCategory> {
        let mut order = self.teardown_order();
        order.reverse();
        order
    }
}
