use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    context::Context,
    error::{GraphError, Result},
    task::{NextAction, Task, TaskResult},
};

/// Upper bound on task runs per execution; linear workflows never get close.
pub const DEFAULT_MAX_STEPS: usize = 64;

/// Edge between tasks in the graph
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A graph of tasks that can be executed
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
    max_steps: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Walk the graph from its start task until a task ends the workflow.
    ///
    /// The first task error aborts the walk and is returned as is.
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let mut task_id = self
            .start_task_id
            .clone()
            .ok_or_else(|| GraphError::MissingStartTask(self.id.clone()))?;
        let mut trail = Vec::new();

        loop {
            if trail.len() >= self.max_steps {
                return Err(GraphError::StepLimitExceeded(self.max_steps));
            }

            let result = self.execute_single_task(&task_id, context.clone()).await?;
            trail.push(result.task_id.clone());

            if let Some(status) = &result.status_message {
                debug!(graph = %self.id, task_id = %result.task_id, "{}", status);
            }

            match &result.next_action {
                NextAction::Continue => match self.find_next_task(&result.task_id) {
                    Some(next_task_id) => task_id = next_task_id,
                    None => return Ok(ExecutionResult::completed(result, trail)),
                },
                NextAction::GoTo(target_id) => {
                    if !self.tasks.contains_key(target_id) {
                        return Err(GraphError::TaskNotFound(target_id.clone()));
                    }
                    task_id = target_id.clone();
                }
                NextAction::End => return Ok(ExecutionResult::completed(result, trail)),
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await.inspect_err(|e| {
            warn!(graph = %self.id, task_id = %task_id, error = %e, "Task failed");
        })?;
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Find the task reached by the first edge leaving `current_task_id`
    pub fn find_next_task(&self, current_task_id: &str) -> Option<String> {
        self.edges
            .iter()
            .find(|edge| edge.from == current_task_id)
            .map(|edge| edge.to.clone())
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task; the first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.tasks.is_empty() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.graph.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of a completed graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status_message: Option<String>,
    /// Ids of the tasks that ran, in order
    pub trail: Vec<String>,
}

impl ExecutionResult {
    fn completed(result: TaskResult, trail: Vec<String>) -> Self {
        Self {
            response: result.response,
            status_message: result.status_message,
            trail,
        }
    }

    pub fn last_task(&self) -> Option<&str> {
        self.trail.last().map(String::as_str)
    }
}
