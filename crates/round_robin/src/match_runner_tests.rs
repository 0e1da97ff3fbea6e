use super::*;
use crate::competitor::EntryPoint;
use crate::outcome::{Reason, Winner};
use crate::outcome_log::OutcomeRecord;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;

// =============================================================================
// Fake collaborators
// =============================================================================

/// Competitors whose name starts with "broken" fail to load, "panicky" panic
struct FakeLoader;

struct FakeFactory(String);

impl PlayerFactory for FakeFactory {
    type Player = String;

    fn create(&self) -> Result<String, Fault> {
        Ok(self.0.clone())
    }
}

impl Loader for FakeLoader {
    type Factory = FakeFactory;

    fn load(&self, competitor: &Competitor) -> Result<FakeFactory, Fault> {
        if competitor.name.starts_with("broken") {
            return Err(Fault::new(format!(
                "ModuleNotFoundError while importing {}",
                competitor.name
            )));
        }
        if competitor.name.starts_with("panicky") {
            panic!("loader exploded on {}", competitor.name);
        }
        Ok(FakeFactory(competitor.name.clone()))
    }
}

/// Replays a canned result regardless of who plays
enum Script {
    Report(GameReport),
    Fault(String),
    Panic,
}

struct FakeSimulator(Script);

impl Simulator<String> for FakeSimulator {
    fn simulate(&self, _white: String, _black: String, _limits: &MatchLimits) -> Result<GameReport, Fault> {
        match &self.0 {
            Script::Report(report) => Ok(report.clone()),
            Script::Fault(text) => Err(Fault::new(text.clone())),
            Script::Panic => panic!("simulator crashed"),
        }
    }
}

fn competitor(name: &str) -> Competitor {
    Competitor {
        id: 0,
        name: name.to_string(),
        entry_point: Some(EntryPoint::File(format!("/subs/{name}/bot.py").into())),
        source: None,
        is_builtin: false,
    }
}

fn runner(script: Script) -> MatchRunner<FakeLoader, FakeSimulator> {
    MatchRunner::new(FakeLoader, FakeSimulator(script), MatchLimits::default())
}

fn report(winner: Option<Color>, termination: Termination) -> Script {
    Script::Report(GameReport {
        winner,
        termination,
        transcript: json!({"moves": ["e2e4", "e7e5"]}),
    })
}

fn assert_forward_only(trail: &[Phase]) {
    let unique: HashSet<_> = trail.iter().collect();
    assert_eq!(unique.len(), trail.len(), "phase re-entered: {trail:?}");
    assert_eq!(trail.first(), Some(&Phase::NotStarted));
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_normal_win() {
    let r = runner(report(Some(Color::Black), Termination::Decisive))
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::B);
    assert_eq!(r.outcome.reason(), Reason::NormalWin);
    assert!(r.outcome.game_record().is_some());
    assert_eq!(
        r.trail,
        vec![Phase::NotStarted, Phase::Loading, Phase::InGame, Phase::Decided]
    );
}

#[test]
fn test_turn_limit_is_a_draw_with_transcript() {
    let r = runner(report(None, Termination::TurnLimit)).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::Draw);
    assert_eq!(r.outcome.reason(), Reason::TurnLimitDraw);
    assert_eq!(
        r.outcome.game_record(),
        Some(&json!({"moves": ["e2e4", "e7e5"]}))
    );
    assert!(r.outcome.error_detail().is_none());
}

#[test]
fn test_reported_timeout_credits_the_other_side() {
    let r = runner(report(Some(Color::White), Termination::Timeout))
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::A);
    assert_eq!(r.outcome.reason(), Reason::Timeout);
    let detail = r.outcome.error_detail().unwrap();
    assert!(detail.contains("TIMEOUT") && detail.contains("Bob"), "{detail}");
}

#[test]
fn test_decisive_without_winner_is_a_fault() {
    let r = runner(report(None, Termination::Decisive)).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome, MatchOutcome::both_failed());
    assert_eq!(r.trail.last(), Some(&Phase::Faulted));
}

#[test]
fn test_one_side_fails_to_load() {
    let r = runner(report(Some(Color::White), Termination::Decisive))
        .run(&competitor("broken1"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::B);
    assert_eq!(r.outcome.reason(), Reason::LoadError);
    assert!(r.outcome.error_detail().unwrap().contains("broken1"));
    assert_eq!(
        r.trail,
        vec![Phase::NotStarted, Phase::Loading, Phase::LoadFailed]
    );

    let r = runner(report(None, Termination::TurnLimit))
        .run(&competitor("Ann"), &competitor("broken2"));
    assert_eq!(r.outcome.winner(), Winner::A);
    assert_eq!(r.outcome.reason(), Reason::LoadError);
}

#[test]
fn test_both_fail_to_load() {
    let r = runner(report(Some(Color::White), Termination::Decisive))
        .run(&competitor("broken1"), &competitor("broken2"));
    assert_eq!(r.outcome.winner(), Winner::Unknown);
    assert_eq!(r.outcome.reason(), Reason::BothFailed);
    assert!(r.outcome.game_record().is_none());
}

#[test]
fn test_loader_panic_is_a_load_error() {
    let r = runner(report(Some(Color::White), Termination::Decisive))
        .run(&competitor("Ann"), &competitor("panicky"));
    assert_eq!(r.outcome.winner(), Winner::A);
    assert_eq!(r.outcome.reason(), Reason::LoadError);
    assert!(r.outcome.error_detail().unwrap().contains("loader exploded"));
}

#[test]
fn test_runtime_fault_blames_named_side() {
    let tb = "Traceback:\n  File \"/subs/Ann_1/bot.py\", line 9, in choose_move\nIndexError";
    let r = runner(Script::Fault(tb.to_string())).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::B);
    assert_eq!(r.outcome.reason(), Reason::RuntimeError);
    assert_eq!(r.outcome.error_detail(), Some(tb));
    assert_eq!(r.trail.last(), Some(&Phase::Faulted));
}

#[test]
fn test_fault_naming_both_sides_blames_white() {
    let tb = "File \"/subs/Ann/bot.py\", line 12, in handle_move\n  calling Bob";
    let r = runner(Script::Fault(tb.to_string())).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::B);
    assert_eq!(r.outcome.reason(), Reason::RuntimeError);
}

#[test]
fn test_ambiguous_blame_is_unknown() {
    struct Undecided;
    impl BlameResolver for Undecided {
        fn resolve(&self, _a: &Competitor, _b: &Competitor, _diagnostic: &str) -> Blame {
            Blame::Ambiguous
        }
    }

    let r = runner(Script::Fault("Ann and Bob".to_string()))
        .with_blame(Undecided)
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome, MatchOutcome::both_failed());
}

#[test]
fn test_unattributable_fault_is_unknown() {
    let r = runner(Script::Fault("Segmentation fault".to_string()))
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome, MatchOutcome::both_failed());

    let r = runner(Script::Panic).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome, MatchOutcome::both_failed());
}

#[test]
fn test_timeout_token_takes_precedence_over_runtime_blame() {
    let tb = "Bob: TIMEOUT while waiting for choose_move";
    let r = runner(Script::Fault(tb.to_string())).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.reason(), Reason::Timeout);
    assert_eq!(r.outcome.winner(), Winner::A);

    let r = runner(Script::Fault("TIMEOUT".to_string())).run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.reason(), Reason::Timeout);
    assert_eq!(r.outcome.winner(), Winner::Draw);
}

#[test]
fn test_custom_blame_resolver() {
    struct AlwaysA;
    impl BlameResolver for AlwaysA {
        fn resolve(&self, _a: &Competitor, _b: &Competitor, _diagnostic: &str) -> Blame {
            Blame::Side(Side::A)
        }
    }

    let r = runner(Script::Fault("opaque".to_string()))
        .with_blame(AlwaysA)
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.winner(), Winner::B);
    assert_eq!(r.outcome.reason(), Reason::RuntimeError);
}

// =============================================================================
// Recording
// =============================================================================

#[test]
fn test_every_outcome_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = OutcomeLog::open(dir.path()).unwrap();

    let scripts = [
        report(Some(Color::Black), Termination::Decisive),
        report(None, Termination::TurnLimit),
        Script::Fault("Segmentation fault".to_string()),
        Script::Fault("in /subs/Ann/bot.py".to_string()),
    ];
    for script in scripts {
        let r = runner(script)
            .with_log(log.clone())
            .run(&competitor("Ann"), &competitor("Bob"));
        assert_forward_only(&r.trail);
        assert_eq!(r.trail.last(), Some(&Phase::Recorded));
        assert!(r.record.as_ref().unwrap().exists());
        assert_eq!(log.scan().unwrap().len(), 1);
    }
}

#[test]
fn test_both_failed_load_writes_diagnostic_not_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let log = OutcomeLog::open(dir.path()).unwrap();

    let r = runner(report(Some(Color::White), Termination::Decisive))
        .with_log(log.clone())
        .run(&competitor("broken1"), &competitor("broken2"));

    let path = r.record.unwrap();
    assert_eq!(path, dir.path().join("broken1_broken2-ERROR.json"));
    let body = std::fs::read_to_string(&path).unwrap();
    assert!(body.contains("importing broken1") && body.contains("importing broken2"));
    assert!(serde_json::from_str::<serde_json::Value>(&body).is_err());
}

#[test]
fn test_unwritable_log_does_not_fail_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let log = OutcomeLog::open(dir.path().join("replays")).unwrap();
    std::fs::remove_dir(log.dir()).unwrap();

    let r = runner(report(Some(Color::White), Termination::Decisive))
        .with_log(log)
        .run(&competitor("Ann"), &competitor("Bob"));
    assert_eq!(r.outcome.reason(), Reason::NormalWin);
    assert!(r.record.is_none());
    assert_eq!(r.trail.last(), Some(&Phase::Decided));
}

#[test]
fn test_recorded_file_matches_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let log = OutcomeLog::open(dir.path()).unwrap();

    let r = runner(report(Some(Color::White), Termination::Timeout))
        .with_log(log)
        .run(&competitor("Ann"), &competitor("Bob"));
    let path = r.record.unwrap();
    let record = OutcomeRecord {
        name: path.file_name().unwrap().to_str().unwrap().parse().unwrap(),
        path,
    };
    assert_eq!(record.file_name(), "ANN_bob.json");
    assert!(record.timed_out().unwrap());
    assert_eq!(record.recover_outcome().unwrap(), r.outcome);
}
