//! Dependency-ordered sync plans.
//!
//! A plan is the list of entity kinds a run walks, in an order where every
//! kind appears strictly after the kinds it references. The order is derived
//! from [`EntityKind::dependencies`], so a new kind only has to declare its
//! parents to be scheduled correctly.

use crate::entity::EntityKind;
use crate::error::{ProtocolError, ProtocolResult};
use std::collections::BTreeSet;

/// An ordered, dependency-respecting list of entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    order: Vec<EntityKind>,
}

impl SyncPlan {
    /// The plan covering every entity kind.
    ///
    /// Kinds are grouped by dependency depth and, within a depth, kept in
    /// declaration order: `users`, then `budgets`, `savings_goals`,
    /// `user_preferences`, then `expenses`, `savings_transactions`.
    pub fn full() -> Self {
        let mut order = EntityKind::ALL.to_vec();
        order.sort_by_key(|kind| (depth(*kind), declaration_index(*kind)));
        Self { order }
    }

    /// The plan for the given kinds plus everything they depend on.
    pub fn for_entities(kinds: &[EntityKind]) -> Self {
        let mut wanted = BTreeSet::new();
        let mut stack: Vec<EntityKind> = kinds.to_vec();
        while let Some(kind) = stack.pop() {
            if wanted.insert(kind) {
                stack.extend_from_slice(kind.dependencies());
            }
        }

        let order = Self::full()
            .order
            .into_iter()
            .filter(|kind| wanted.contains(kind))
            .collect();
        Self { order }
    }

    /// Validates a caller-supplied order.
    ///
    /// Every dependency of a listed kind must also be listed, earlier.
    pub fn from_order(order: Vec<EntityKind>) -> ProtocolResult<Self> {
        let mut seen = BTreeSet::new();
        for kind in &order {
            if !seen.insert(*kind) {
                return Err(ProtocolError::DuplicateEntity(*kind));
            }
            for dependency in kind.dependencies() {
                if !seen.contains(dependency) {
                    return Err(ProtocolError::InvalidOrder {
                        entity: *kind,
                        dependency: *dependency,
                    });
                }
            }
        }
        Ok(Self { order })
    }

    /// Kinds in execution order.
    pub fn entities(&self) -> &[EntityKind] {
        &self.order
    }

    /// Iterates kinds in execution order.
    pub fn iter(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.order.iter().copied()
    }

    /// Number of kinds in the plan.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns true if the plan covers `kind`.
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.order.contains(&kind)
    }

    /// Position of `kind` in the plan.
    pub fn position(&self, kind: EntityKind) -> Option<usize> {
        self.order.iter().position(|k| *k == kind)
    }

    /// Kinds grouped by dependency depth.
    ///
    /// Kinds within one layer never reference each other.
    pub fn layers(&self) -> Vec<Vec<EntityKind>> {
        let mut layers: Vec<Vec<EntityKind>> = Vec::new();
        for kind in &self.order {
            let d = depth(*kind);
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(*kind);
        }
        layers.retain(|layer| !layer.is_empty());
        layers
    }
}

impl Default for SyncPlan {
    fn default() -> Self {
        Self::full()
    }
}

impl<'a> IntoIterator for &'a SyncPlan {
    type Item = &'a EntityKind;
    type IntoIter = std::slice::Iter<'a, EntityKind>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

/// Length of the longest dependency chain below `kind`.
fn depth(kind: EntityKind) -> usize {
    kind.dependencies()
        .iter()
        .map(|dependency| depth(*dependency) + 1)
        .max()
        .unwrap_or(0)
}

fn declaration_index(kind: EntityKind) -> usize {
    EntityKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_respects_dependencies(plan: &SyncPlan) {
        for kind in plan.iter() {
            let at = plan.position(kind).unwrap();
            for dependency in kind.dependencies() {
                let dep_at = plan
                    .position(*dependency)
                    .unwrap_or_else(|| panic!("{kind} missing dependency {dependency}"));
                assert!(dep_at < at, "{dependency} must precede {kind}");
            }
        }
    }

    #[test]
    fn full_plan_order() {
        let plan = SyncPlan::full();
        assert_eq!(
            plan.entities(),
            &[
                EntityKind::User,
                EntityKind::Budget,
                EntityKind::SavingsGoal,
                EntityKind::UserPreferences,
                EntityKind::Expense,
                EntityKind::SavingsTransaction,
            ]
        );
        assert_respects_dependencies(&plan);
    }

    #[test]
    fn layers_group_independent_kinds() {
        let layers = SyncPlan::full().layers();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec![EntityKind::User]);
        assert_eq!(
            layers[1],
            vec![
                EntityKind::Budget,
                EntityKind::SavingsGoal,
                EntityKind::UserPreferences
            ]
        );
        assert_eq!(
            layers[2],
            vec![EntityKind::Expense, EntityKind::SavingsTransaction]
        );
    }

    #[test]
    fn subset_pulls_in_dependencies() {
        let plan = SyncPlan::for_entities(&[EntityKind::Expense]);
        assert_eq!(
            plan.entities(),
            &[EntityKind::User, EntityKind::Budget, EntityKind::Expense]
        );

        let plan = SyncPlan::for_entities(&[EntityKind::UserPreferences]);
        assert_eq!(
            plan.entities(),
            &[EntityKind::User, EntityKind::UserPreferences]
        );
    }

    #[test]
    fn from_order_rejects_child_before_parent() {
        let err = SyncPlan::from_order(vec![
            EntityKind::User,
            EntityKind::Expense,
            EntityKind::Budget,
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidOrder {
                entity: EntityKind::Expense,
                dependency: EntityKind::Budget,
            }
        );
    }

    #[test]
    fn from_order_rejects_duplicates_and_missing_parents() {
        assert_eq!(
            SyncPlan::from_order(vec![EntityKind::User, EntityKind::User]).unwrap_err(),
            ProtocolError::DuplicateEntity(EntityKind::User)
        );
        assert!(SyncPlan::from_order(vec![EntityKind::Budget]).is_err());
    }

    #[test]
    fn from_order_accepts_declaration_order() {
        let plan = SyncPlan::from_order(EntityKind::ALL.to_vec()).unwrap();
        assert_eq!(plan.len(), 6);
        assert_respects_dependencies(&plan);
    }

    proptest! {
        #[test]
        fn any_subset_is_dependency_ordered(mask in 0u8..64) {
            let kinds: Vec<EntityKind> = EntityKind::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, k)| *k)
                .collect();
            let plan = SyncPlan::for_entities(&kinds);
            for kind in &kinds {
                prop_assert!(plan.contains(*kind));
            }
            assert_respects_dependencies(&plan);
        }
    }
}
