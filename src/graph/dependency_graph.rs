use super::GraphError;
use crate::task::Task;
use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed dependency graph over the task set.
///
/// Edges run predecessor -> dependent. The graph must stay acyclic; edits
/// are vetted with [`DependencyGraph::would_create_cycle`] before they are
/// committed, so the scheduling run itself can assume acyclicity.
pub struct DependencyGraph {
    graph: DiGraph<i32, ()>,
    id_to_index: HashMap<i32, NodeIndex>,
}

impl DependencyGraph {
    pub fn build(tasks: &[Task]) -> Self {
        let mut graph: DiGraph<i32, ()> = DiGraph::new();
        let mut id_to_index: HashMap<i32, NodeIndex> = HashMap::new();

        for task in tasks {
            let node_ix = graph.add_node(task.id);
            id_to_index.insert(task.id, node_ix);
        }

        // Dependency ids without a matching task are ignored, same as
        // unknown predecessor ids in an imported table.
        for task in tasks {
            for dep_id in &task.dependencies {
                if let (Some(&u), Some(&v)) = (id_to_index.get(dep_id), id_to_index.get(&task.id))
                {
                    graph.add_edge(u, v, ());
                }
            }
        }

        Self { graph, id_to_index }
    }

    pub fn contains(&self, task_id: i32) -> bool {
        self.id_to_index.contains_key(&task_id)
    }

    /// Reject a dependency edit that would close a cycle.
    ///
    /// For each newly added predecessor, a depth-first walk checks whether
    /// the edited task already reaches that predecessor; if it does, the
    /// new edge would complete a loop. The graph itself is left untouched.
    pub fn would_create_cycle(&self, task_id: i32, new_deps: &[i32]) -> Result<(), GraphError> {
        let Some(&task_ix) = self.id_to_index.get(&task_id) else {
            return Ok(());
        };
        for dep_id in new_deps {
            if *dep_id == task_id {
                return Err(GraphError::WouldCycle {
                    task_id,
                    through: *dep_id,
                });
            }
            if let Some(&dep_ix) = self.id_to_index.get(dep_id) {
                if has_path_connecting(&self.graph, task_ix, dep_ix, None) {
                    return Err(GraphError::WouldCycle {
                        task_id,
                        through: *dep_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// The full connected chain containing `task_id`: breadth-first over
    /// both predecessors and dependents, in discovery order.
    pub fn connected_chain(&self, task_id: i32) -> Vec<i32> {
        let Some(&start) = self.id_to_index.get(&task_id) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);
        let mut chain = Vec::new();

        while let Some(node) = queue.pop_front() {
            chain.push(self.graph[node]);
            for direction in [Direction::Incoming, Direction::Outgoing] {
                for neighbour in self.graph.neighbors_directed(node, direction) {
                    if seen.insert(neighbour) {
                        queue.push_back(neighbour);
                    }
                }
            }
        }
        chain
    }

    /// Task ids that depend on `task_id` directly.
    pub fn dependents_of(&self, task_id: i32) -> Vec<i32> {
        let Some(&node) = self.id_to_index.get(&task_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|ix| self.graph[ix])
            .collect()
    }

    /// Task ids in topological order (predecessors before dependents).
    /// A cycle in the input is a graph-integrity error, not a truncation.
    pub fn topological_ids(&self) -> Result<Vec<i32>, GraphError> {
        let order = toposort(&self.graph, None).map_err(|_| GraphError::Cyclic)?;
        Ok(order.into_iter().map(|ix| self.graph[ix]).collect())
    }
}
