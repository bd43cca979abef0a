use crate::{CrawlPhase, CrawlSession, Effect, Msg};

/// Pure update function: applies a message to the session and returns any effects.
///
/// `Idle -> Running -> Draining -> Done`; messages that do not fit the
/// current phase are ignored.
pub fn update(mut session: CrawlSession, msg: Msg) -> (CrawlSession, Vec<Effect>) {
    let effects = match (session.phase(), msg) {
        (CrawlPhase::Idle, Msg::Start { workers }) => {
            let count = workers.max(1);
            session.start(count);
            vec![Effect::DispatchWorkers { count }]
        }
        (CrawlPhase::Running | CrawlPhase::Draining, Msg::TaskFinished) => {
            session.record_task();
            Vec::new()
        }
        (CrawlPhase::Running, Msg::FrontierExhausted) => {
            session.drain(false);
            Vec::new()
        }
        (CrawlPhase::Running, Msg::StopRequested) => {
            session.drain(true);
            vec![Effect::CancelWorkers]
        }
        (CrawlPhase::Draining, Msg::WorkersJoined) => {
            session.finish();
            vec![Effect::EmitReport]
        }
        // Workers may all exit before the exhaustion message is observed.
        (CrawlPhase::Running, Msg::WorkersJoined) => {
            session.drain(false);
            session.finish();
            vec![Effect::EmitReport]
        }
        _ => Vec::new(),
    };

    (session, effects)
}
