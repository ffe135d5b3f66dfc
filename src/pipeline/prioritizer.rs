use super::{PipelineContext, Stage};
use crate::graph::GraphError;

/// Stable ordering of the task set ahead of placement.
///
/// Due-dated tasks come first (ascending due date); within a tied bucket
/// the harder item (higher complexity) is addressed earlier.
pub struct Prioritizer;

impl Stage for Prioritizer {
    fn name(&self) -> &'static str {
        "prioritizer"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        if ctx.tasks.is_empty() {
            ctx.trace("no tasks to prioritize");
            return Ok(());
        }

        ctx.tasks.sort_by(|a, b| {
            match (a.due, b.due) {
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| {
                b.complexity
                    .partial_cmp(&a.complexity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        ctx.trace(format!("prioritized {} tasks", ctx.tasks.len()));
        Ok(())
    }
}
