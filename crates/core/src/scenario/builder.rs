use std::sync::Arc;

use super::action::{ActionCore, ConformanceAction};
use super::context::ContextLayer;
use super::instance::ConformanceScenario;

/// Constructs an action once its predecessor in the scenario is known.
pub type ActionFactory<C> =
    Arc<dyn Fn(Option<&ActionCore<C>>) -> Box<dyn ConformanceAction<C>> + Send + Sync>;

/// A tree of action factories. Every root-to-leaf path is one scenario.
///
/// `then` and `then_either` append to every current leaf, so the number of
/// scenarios is the product of the branch counts along the way.
pub struct ScenarioListBuilder<C> {
    factory: Option<ActionFactory<C>>,
    children: Vec<ScenarioListBuilder<C>>,
}

impl<C> Clone for ScenarioListBuilder<C> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            children: self.children.clone(),
        }
    }
}

impl<C: ContextLayer> ScenarioListBuilder<C> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Option<&ActionCore<C>>) -> Box<dyn ConformanceAction<C>> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Arc::new(factory)),
            children: Vec::new(),
        }
    }

    /// A node that contributes structure but no action.
    pub fn no_action() -> Self {
        Self {
            factory: None,
            children: Vec::new(),
        }
    }

    pub fn then(self, next: ScenarioListBuilder<C>) -> Self {
        self.then_either(vec![next])
    }

    pub fn then_either(mut self, branches: Vec<ScenarioListBuilder<C>>) -> Self {
        if branches.is_empty() {
            return self;
        }
        if self.children.is_empty() {
            self.children = branches;
        } else {
            self.children = self
                .children
                .into_iter()
                .map(|child| child.then_either(branches.clone()))
                .collect();
        }
        self
    }

    pub fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(Self::leaf_count).sum()
        }
    }

    /// Instantiate one scenario per root-to-leaf path.
    pub fn build_scenario_list(&self, module_index: usize) -> Vec<ConformanceScenario<C>> {
        let mut paths = Vec::new();
        self.collect_paths(&mut Vec::new(), &mut paths);
        paths
            .into_iter()
            .enumerate()
            .map(|(scenario_index, path)| {
                let mut actions: Vec<Box<dyn ConformanceAction<C>>> =
                    Vec::with_capacity(path.len());
                for factory in path {
                    let action = factory(actions.last().map(|a| a.core()));
                    actions.push(action);
                }
                ConformanceScenario::new(module_index, scenario_index, actions)
            })
            .collect()
    }

    fn collect_paths(
        &self,
        prefix: &mut Vec<ActionFactory<C>>,
        out: &mut Vec<Vec<ActionFactory<C>>>,
    ) {
        let pushed = match &self.factory {
            Some(factory) => {
                prefix.push(factory.clone());
                true
            }
            None => false,
        };
        if self.children.is_empty() {
            out.push(prefix.clone());
        } else {
            for child in &self.children {
                child.collect_paths(prefix, out);
            }
        }
        if pushed {
            prefix.pop();
        }
    }
}

/// A titled group of scenarios.
pub struct ScenarioModule<C> {
    pub title: String,
    pub builder: ScenarioListBuilder<C>,
}

impl<C: ContextLayer> ScenarioModule<C> {
    pub fn new(title: impl Into<String>, builder: ScenarioListBuilder<C>) -> Self {
        Self {
            title: title.into(),
            builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::scenario::action::tests::{DocContext, SendDocument, SupplyReference};
    use crate::scenario::action::Capabilities;

    fn supply() -> ScenarioListBuilder<DocContext> {
        ScenarioListBuilder::new(|prev| {
            Box::new(SupplyReference {
                core: ActionCore::new(prev, "Supply", "S1", "R1", Capabilities::INPUT),
            })
        })
    }

    fn send(title: &'static str) -> ScenarioListBuilder<DocContext> {
        ScenarioListBuilder::new(move |prev| {
            Box::new(SendDocument {
                core: ActionCore::new(prev, title, "S1", "R1", Capabilities::EXCHANGE),
                notification: false,
            })
        })
    }

    #[test]
    fn leaf_count_is_the_product_of_branch_counts() {
        let builder = supply()
            .then_either(vec![send("A"), send("B")])
            .then_either(vec![send("X"), send("Y"), send("Z")])
            .then(send("Done"));
        assert_eq!(builder.leaf_count(), 6);

        let scenarios = builder.build_scenario_list(0);
        assert_eq!(scenarios.len(), 6);
        for scenario in &scenarios {
            assert_eq!(scenario.actions().len(), 4);
        }
        let titles: Vec<String> = scenarios.iter().map(|s| s.title()).collect();
        assert_eq!(titles[0], "Supply - A - X - Done");
        assert_eq!(titles[5], "Supply - B - Z - Done");
    }

    #[test]
    fn every_leaf_gets_distinct_action_objects() {
        let scenarios = supply()
            .then_either(vec![send("A"), send("B")])
            .build_scenario_list(3);
        let ids: HashSet<_> = scenarios
            .iter()
            .flat_map(|s| s.actions().iter().map(|a| a.core().id()))
            .collect();
        assert_eq!(ids.len(), 4);
        assert!(scenarios.iter().all(|s| s.module_index() == 3));
    }

    #[test]
    fn empty_then_either_leaves_graph_unchanged() {
        let builder = supply().then_either(Vec::new());
        assert_eq!(builder.leaf_count(), 1);
        assert_eq!(builder.build_scenario_list(0)[0].actions().len(), 1);
    }

    #[test]
    fn no_action_nodes_add_structure_only() {
        let builder = supply().then_either(vec![
            ScenarioListBuilder::no_action(),
            send("Extra"),
        ]);
        let scenarios = builder.build_scenario_list(0);
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].actions().len(), 1);
        assert_eq!(scenarios[1].actions().len(), 2);
    }
}
