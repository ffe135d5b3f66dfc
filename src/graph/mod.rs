use std::fmt;

pub mod dependency_graph;

pub use dependency_graph::DependencyGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Adding these predecessors would close a dependency cycle.
    WouldCycle { task_id: i32, through: i32 },
    /// The task set already contains a cycle; scheduling cannot proceed.
    Cyclic,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::WouldCycle { task_id, through } => write!(
                f,
                "adding dependency {through} to task {task_id} would create a cycle"
            ),
            GraphError::Cyclic => write!(f, "dependency graph contains a cycle"),
        }
    }
}

impl std::error::Error for GraphError {}
