#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlPhase {
    #[default]
    Idle,
    Running,
    Draining,
    Done,
}

/// Lifecycle of one crawl, driven by [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrawlSession {
    phase: CrawlPhase,
    workers: usize,
    tasks_finished: usize,
    stopped_early: bool,
}

impl CrawlSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn tasks_finished(&self) -> usize {
        self.tasks_finished
    }

    /// True when the crawl drained because of a stop signal rather than an
    /// empty frontier.
    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    pub(crate) fn start(&mut self, workers: usize) {
        self.phase = CrawlPhase::Running;
        self.workers = workers;
    }

    pub(crate) fn record_task(&mut self) {
        self.tasks_finished += 1;
    }

    pub(crate) fn drain(&mut self, stopped_early: bool) {
        self.phase = CrawlPhase::Draining;
        self.stopped_early = stopped_early;
    }

    pub(crate) fn finish(&mut self) {
        self.phase = CrawlPhase::Done;
    }
}
