use std::sync::Once;

use audit_core::{update, CrawlPhase, CrawlSession, Effect, Msg};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(audit_logging::initialize_for_tests);
}

fn running(workers: usize) -> CrawlSession {
    let (session, _) = update(CrawlSession::new(), Msg::Start { workers });
    session
}

#[test]
fn start_moves_idle_to_running_and_dispatches_workers() {
    init_logging();
    let (session, effects) = update(CrawlSession::new(), Msg::Start { workers: 8 });

    assert_eq!(session.phase(), CrawlPhase::Running);
    assert_eq!(session.workers(), 8);
    assert_eq!(effects, vec![Effect::DispatchWorkers { count: 8 }]);
}

#[test]
fn start_dispatches_at_least_one_worker() {
    init_logging();
    let (_, effects) = update(CrawlSession::new(), Msg::Start { workers: 0 });
    assert_eq!(effects, vec![Effect::DispatchWorkers { count: 1 }]);
}

#[test]
fn second_start_is_ignored() {
    init_logging();
    let session = running(2);
    let (next, effects) = update(session.clone(), Msg::Start { workers: 4 });
    assert_eq!(next, session);
    assert!(effects.is_empty());
}

#[test]
fn exhaustion_then_join_finishes_with_report() {
    init_logging();
    let (session, effects) = update(running(2), Msg::FrontierExhausted);
    assert_eq!(session.phase(), CrawlPhase::Draining);
    assert!(effects.is_empty());
    assert!(!session.stopped_early());

    let (session, effects) = update(session, Msg::WorkersJoined);
    assert_eq!(session.phase(), CrawlPhase::Done);
    assert_eq!(effects, vec![Effect::EmitReport]);
}

#[test]
fn stop_request_cancels_workers_and_drains() {
    init_logging();
    let (session, effects) = update(running(2), Msg::StopRequested);

    assert_eq!(session.phase(), CrawlPhase::Draining);
    assert!(session.stopped_early());
    assert_eq!(effects, vec![Effect::CancelWorkers]);

    // A second stop while draining does nothing.
    let (session, effects) = update(session, Msg::StopRequested);
    assert!(effects.is_empty());

    let (session, effects) = update(session, Msg::WorkersJoined);
    assert_eq!(session.phase(), CrawlPhase::Done);
    assert_eq!(effects, vec![Effect::EmitReport]);
}

#[test]
fn workers_joining_while_running_completes_the_crawl() {
    init_logging();
    let (session, effects) = update(running(1), Msg::WorkersJoined);
    assert_eq!(session.phase(), CrawlPhase::Done);
    assert_eq!(effects, vec![Effect::EmitReport]);
}

#[test]
fn finished_tasks_are_counted_until_done() {
    init_logging();
    let (session, _) = update(running(2), Msg::TaskFinished);
    let (session, _) = update(session, Msg::TaskFinished);
    let (session, _) = update(session, Msg::FrontierExhausted);
    let (session, _) = update(session, Msg::TaskFinished);
    assert_eq!(session.tasks_finished(), 3);

    let (session, _) = update(session, Msg::WorkersJoined);
    let (session, effects) = update(session, Msg::TaskFinished);
    assert_eq!(session.tasks_finished(), 3);
    assert!(effects.is_empty());
}
