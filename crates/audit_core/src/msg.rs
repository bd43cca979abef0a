#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Seed has been fetched and merged; the pool may start.
    Start { workers: usize },
    /// A worker finished one task.
    TaskFinished,
    /// Frontier is empty and nothing is in flight.
    FrontierExhausted,
    /// Global stop signal (e.g. Ctrl-C).
    StopRequested,
    /// Every worker has exited.
    WorkersJoined,
}
