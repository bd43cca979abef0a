#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start `count` workers pulling from the frontier.
    DispatchWorkers { count: usize },
    /// Ask workers to finish their current task and exit.
    CancelWorkers,
    /// Build and hand out the result documents.
    EmitReport,
}
