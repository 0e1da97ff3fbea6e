use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;

fn sh_config(script: &Path) -> RefereeConfig {
    RefereeConfig {
        program: PathBuf::from("sh"),
        args: vec![script.display().to_string()],
        probe_args: None,
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn seat(name: &str, file: &str) -> Seat {
    Seat {
        name: name.to_string(),
        entry_point: EntryPoint::File(PathBuf::from(file)),
    }
}

fn competitor(name: &str, entry_point: Option<EntryPoint>) -> Competitor {
    Competitor {
        id: 0,
        name: name.to_string(),
        entry_point,
        source: None,
        is_builtin: false,
    }
}

const LIMITS: MatchLimits = MatchLimits {
    seconds_per_player: 3,
    turn_limit: 7,
};

// =============================================================================
// Loader
// =============================================================================

#[test]
fn test_builtin_always_loads() {
    let loader = FileLoader::new(&RefereeConfig::default());
    let builtin = EntryPoint::Builtin("reconchess.bots.random_bot".to_string());
    let loaded = loader
        .load(&competitor("random bot", Some(builtin.clone())))
        .unwrap();
    assert_eq!(loaded.create().unwrap().entry_point, builtin);
}

#[test]
fn test_missing_entry_point_fails_to_load() {
    let loader = FileLoader::new(&RefereeConfig::default());

    let fault = loader.load(&competitor("Ann", None)).unwrap_err();
    assert!(fault.detail.contains("Ann"));

    let gone = EntryPoint::File(PathBuf::from("/definitely/not/here.py"));
    let fault = loader.load(&competitor("Bob", Some(gone))).unwrap_err();
    assert!(fault.detail.contains("does not exist"), "{}", fault.detail);
}

#[cfg(unix)]
#[test]
fn test_probe_rejects_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_script(dir.path(), "good.py", "ok\n");
    let bad = write_script(dir.path(), "bad.py", "SyntaxError\n");

    let config = RefereeConfig {
        program: PathBuf::from("sh"),
        args: Vec::new(),
        probe_args: Some(vec![
            "-c".to_string(),
            "if grep -q SyntaxError \"$1\"; then echo 'SyntaxError: invalid syntax' >&2; exit 1; fi"
                .to_string(),
            "probe".to_string(),
        ]),
    };
    let loader = FileLoader::new(&config);

    assert!(loader
        .load(&competitor("Ann", Some(EntryPoint::File(good))))
        .is_ok());
    let fault = loader
        .load(&competitor("Bob", Some(EntryPoint::File(bad))))
        .unwrap_err();
    assert!(fault.detail.contains("SyntaxError: invalid syntax"), "{}", fault.detail);
}

// =============================================================================
// Referee
// =============================================================================

#[cfg(unix)]
#[test]
fn test_referee_receives_entry_points_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "referee.sh",
        r#"case "$*" in
  *"--white a.py --black b.py --seconds-per-player 3 --turn-limit 7"*) ;;
  *) echo "bad args: $*" >&2; exit 2 ;;
esac
echo '{"winner": "black", "termination": "decisive", "transcript": {"moves": 4}}'
"#,
    );

    let referee = ExternalReferee::new(&sh_config(&script));
    let report = referee
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap();
    assert_eq!(
        report,
        GameReport {
            winner: Some(Color::Black),
            termination: Termination::Decisive,
            transcript: json!({"moves": 4}),
        }
    );
}

#[cfg(unix)]
#[test]
fn test_turn_limit_verdict_without_winner() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "referee.sh",
        "echo '{\"winner\": null, \"termination\": \"turn_limit\", \"transcript\": []}'\n",
    );

    let report = ExternalReferee::new(&sh_config(&script))
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap();
    assert_eq!(report.winner, None);
    assert_eq!(report.termination, Termination::TurnLimit);
}

#[cfg(unix)]
#[test]
fn test_failed_referee_yields_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "referee.sh",
        "echo 'Traceback: File \"/subs/Ann_3/bot.py\", line 4' >&2\nexit 1\n",
    );

    let fault = ExternalReferee::new(&sh_config(&script))
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap_err();
    assert!(fault.detail.contains("/subs/Ann_3/bot.py"), "{}", fault.detail);
    assert!(!fault.mentions_timeout());
}

#[cfg(unix)]
#[test]
fn test_unreadable_verdict_is_a_fault() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "referee.sh", "echo 'game over'\n");

    let fault = ExternalReferee::new(&sh_config(&script))
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap_err();
    assert!(fault.detail.contains("game over"));
}

#[test]
fn test_missing_referee_program_is_a_fault() {
    let config = RefereeConfig {
        program: PathBuf::from("/no/such/referee-binary"),
        ..RefereeConfig::default()
    };
    let fault = ExternalReferee::new(&config)
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap_err();
    assert!(fault.detail.contains("could not start referee"));
}

#[cfg(unix)]
#[test]
fn test_unlisted_termination_is_decisive() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "referee.sh",
        "echo '{\"winner\": \"white\", \"termination\": \"king_capture\"}'\n",
    );

    let report = ExternalReferee::new(&sh_config(&script))
        .simulate(seat("Ann", "a.py"), seat("Bob", "b.py"), &LIMITS)
        .unwrap();
    assert_eq!(report.termination, Termination::Decisive);
    assert_eq!(report.winner, Some(Color::White));
    assert_eq!(report.transcript, serde_json::Value::Null);
}
