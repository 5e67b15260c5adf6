use serde::{Deserialize, Serialize};

/// The kind of computation requested for the current batch.
///
/// `GraphEval` is the generic graph-evaluation task: it drives the
/// training kernel block-wise like `Train` but reports no output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Train,
    Eval,
    GraphEval,
    Forward,
    Classify,
    Analyze,
}

impl TaskKind {
    /// Whether this task runs block-wise over the batch dimension.
    pub fn is_batched(self) -> bool {
        matches!(self, TaskKind::Train | TaskKind::Eval | TaskKind::GraphEval)
    }

    /// Whether results of this task carry a positional label list.
    pub fn has_labels(self) -> bool {
        matches!(self, TaskKind::Train | TaskKind::Eval)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Train => "train",
            TaskKind::Eval => "eval",
            TaskKind::GraphEval => "graph_eval",
            TaskKind::Forward => "forward",
            TaskKind::Classify => "classify",
            TaskKind::Analyze => "analyze",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
