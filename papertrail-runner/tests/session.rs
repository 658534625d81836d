//! End-to-end bar loops through the paper backend.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use papertrail_core::{
    ExecutionError, ExecutionMode, FileKillSwitch, FixedClock, Journal, JournalEvent, KillSwitch,
    OrderStatus, RiskParams, RiskRejection,
};
use papertrail_runner::{BarInput, RunConfig, Session, SessionError};

fn bar(day: u32, price: f64, direction: i8) -> BarInput {
    BarInput {
        date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        price,
        volatility: 2.0,
        spread: 0.05,
        direction,
    }
}

fn paper_config(dir: &Path) -> RunConfig {
    let mut config = RunConfig {
        execution_mode: ExecutionMode::Paper,
        kill_switch_path: dir.join("killswitch.flag"),
        ..RunConfig::default()
    };
    config.paper.journal_path = dir.join("journal.jsonl");
    config
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_date(
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    ))
}

#[test]
fn filled_orders_are_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let config = paper_config(dir.path());
    let mut session = Session::from_config(&config, clock()).unwrap();

    let outcomes = session
        .run(&[bar(1, 100.0, 1), bar(4, 101.0, -1), bar(5, 99.0, 0)])
        .unwrap();
    assert_eq!(outcomes[0].order.as_ref().unwrap().status, OrderStatus::Filled);
    assert_eq!(outcomes[1].order.as_ref().unwrap().status, OrderStatus::Filled);
    assert!(outcomes[2].order.is_none());

    let records = Journal::read_records(&config.paper.journal_path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.event == JournalEvent::OrderFilled));
    assert_eq!(
        records[0].plan.as_ref().unwrap().strategy_id,
        config.strategy_id
    );
}

#[test]
fn kill_switch_flattens_the_bar() {
    let dir = tempfile::tempdir().unwrap();
    let config = paper_config(dir.path());
    let mut session = Session::from_config(&config, clock()).unwrap();

    let switch = FileKillSwitch::new(&config.kill_switch_path);
    switch.engage(true, Some("drill")).unwrap();
    let halted = session.step(&bar(1, 100.0, 1)).unwrap();
    let order = halted.order.unwrap();
    assert!(order.is_rejected());
    assert_eq!(order.reason(), Some("drill"));
    assert_eq!(halted.direction, 0);
    assert_eq!(halted.size, 0.0);

    switch.engage(false, None).unwrap();
    let resumed = session.step(&bar(4, 110.0, 1)).unwrap();
    assert!(resumed.order.unwrap().is_filled());
    // nothing was held through the halted bar
    assert_eq!(resumed.pnl, 0.0);

    let records = Journal::read_records(&config.paper.journal_path).unwrap();
    assert_eq!(records[0].event, JournalEvent::RiskReject);
    assert_eq!(records[0].reason.as_deref(), Some("drill"));
    assert_eq!(records[1].event, JournalEvent::OrderFilled);
}

#[test]
fn loss_breach_triggers_cooldown() {
    let config = RunConfig {
        risk: RiskParams {
            max_daily_loss: 100.0,
            cooldown_bars: 2,
            ..RiskParams::default()
        },
        ..RunConfig::default()
    };
    let mut session = Session::from_config(&config, clock()).unwrap();
    assert!(session.backend().is_none());

    session.step(&bar(1, 100.0, 1)).unwrap();
    // 5_000 notional long, 10% drop
    let breach = session.step(&bar(4, 90.0, 1)).unwrap();
    assert!(breach.pnl < -100.0);
    assert_eq!(session.risk_state().cooldown_bars_remaining(), 2);

    let cooled = session.step(&bar(5, 90.0, 1)).unwrap();
    assert_eq!(cooled.risk_rejection, Some(RiskRejection::Cooldown));
    assert_eq!(cooled.direction, 0);

    let resumed = session.step(&bar(6, 90.0, 1)).unwrap();
    assert_eq!(resumed.risk_rejection, None);
    assert_eq!(resumed.direction, 1);
}

#[test]
fn identical_runs_write_identical_journals() {
    let bars = [bar(1, 100.0, 1), bar(4, 102.0, -1), bar(5, 101.0, 1)];
    let mut journals = Vec::new();
    let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
    for dir in &dirs {
        let config = paper_config(dir.path());
        let mut session = Session::from_config(&config, clock()).unwrap();
        session.run(&bars).unwrap();
        journals.push(std::fs::read(&config.paper.journal_path).unwrap());
    }
    assert!(!journals[0].is_empty());
    assert_eq!(journals[0], journals[1]);
}

#[test]
fn live_backends_surface_not_supported() {
    let config = RunConfig {
        execution_mode: ExecutionMode::Ccxt,
        ..RunConfig::default()
    };
    let mut session = Session::from_config(&config, clock()).unwrap();
    let err = session.step(&bar(1, 100.0, 1)).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Execution(ExecutionError::NotSupported { .. })
    ));
    // the failed bar's exposure is not left behind
    assert_eq!(session.risk_state().total_exposure(), 0.0);
    assert!(session.risk_state().symbol_exposures().is_empty());
}

#[test]
fn session_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal.jsonl");
    let path = dir.path().join("run.toml");
    let content = format!(
        "symbol = \"ETH-USD\"\nexecution_mode = \"paper\"\nkill_switch_path = {:?}\n\n[paper]\nseed = 9\njournal_path = {:?}\n",
        dir.path().join("ks.flag").display().to_string(),
        journal.display().to_string(),
    );
    std::fs::write(&path, content).unwrap();

    let mut session = Session::from_config_file(&path).unwrap();
    assert_eq!(
        session.backend().map(|b| b.mode()),
        Some(ExecutionMode::Paper)
    );
    session.step(&bar(1, 2_000.0, 1)).unwrap();

    let records = Journal::read_records(&journal).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].plan.as_ref().unwrap().symbol, "ETH-USD");
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Session::from_config_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn bars_deserialize_from_json() {
    let raw = r#"[
        {"date": "2024-03-01", "price": 0.0, "volatility": 0.0, "spread": 0.0, "direction": 0},
        {"date": "2024-03-04", "price": 100.0, "volatility": 2.0, "spread": 0.05, "direction": 1}
    ]"#;
    let bars: Vec<BarInput> = serde_json::from_str(raw).unwrap();
    assert_eq!(bars[1], bar(4, 100.0, 1));

    let mut session = Session::from_config(&RunConfig::default(), clock()).unwrap();
    let outcomes = session.run(&bars).unwrap();
    // zero previous price is never divided by
    assert_eq!(outcomes[1].pnl, 0.0);
}
