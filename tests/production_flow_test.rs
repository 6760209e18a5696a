// ==========================================
// 生产入库集成测试
// ==========================================
// 覆盖: 会话生命周期 / 暂停扣减 / 入库对账 / 容量封顶 / 产品规则
// ==========================================

mod test_helpers;

use plant_silo_ledger::config::config_keys;
use plant_silo_ledger::engine::inflow::SESSION_STARTED_NOTE;
use plant_silo_ledger::engine::LedgerError;
use plant_silo_ledger::{LevelSource, ProductionStatus};
use test_helpers::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ==========================================
// 开始
// ==========================================

#[test]
fn test_start_session_writes_marker_only() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();

    assert_eq!(session.status, ProductionStatus::Active);
    assert_eq!(session.started_at, ts(4, 8, 0));
    assert!(session.ended_at.is_none());
    assert_eq!(session.paused_seconds, 0);

    let logs = env.repos.level_log_repo.find_by_session(&session.id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].source, LevelSource::Calculated);
    assert_eq!(logs[0].level_percent, 0.0);
    assert!(logs[0].level_tons.is_none());
    assert_eq!(logs[0].notes.as_deref(), Some(SESSION_STARTED_NOTE));

    // 标记条目不改变筒仓
    let silo = env.silo(SILO_1);
    assert_eq!(silo.current_level_tons, 10.0);
    assert_eq!(silo.revision, 0);
}

#[test]
fn test_start_session_validation() {
    let env = setup_env();

    for rate in [0.0, -3.0, f64::INFINITY] {
        assert!(matches!(
            env.production
                .start_session(session_request(SILO_1, rate), ts(4, 8, 0)),
            Err(LedgerError::Validation(_))
        ));
    }

    let mut req = session_request(SILO_1, 12.0);
    req.mill_id = "NOPE".to_string();
    assert!(matches!(
        env.production.start_session(req, ts(4, 8, 0)),
        Err(LedgerError::NotFound { .. })
    ));

    let mut req = session_request(SILO_1, 12.0);
    req.product_id = "NOPE".to_string();
    assert!(matches!(
        env.production.start_session(req, ts(4, 8, 0)),
        Err(LedgerError::NotFound { .. })
    ));

    assert!(matches!(
        env.production
            .start_session(session_request("NOPE", 12.0), ts(4, 8, 0)),
        Err(LedgerError::NotFound { .. })
    ));

    assert_eq!(env.count_rows("production_sessions"), 0);
}

#[test]
fn test_start_session_rejects_inactive_silo() {
    let env = setup_env();
    let mut silo = test_silo("S9", "9DU09", Some(30.0), 0.0, 0.0, ts(1, 0, 0));
    silo.is_active = false;
    env.repos.silo_repo.insert(&silo).unwrap();

    assert!(matches!(
        env.production
            .start_session(session_request("S9", 12.0), ts(4, 8, 0)),
        Err(LedgerError::Validation(_))
    ));
}

// ==========================================
// 结束与对账
// ==========================================

#[test]
fn test_completed_session_reconciles_into_silo() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    let ended = env
        .production
        .end_session(&session.id, ProductionStatus::Completed, Some(OPERATOR), ts(4, 10, 30))
        .unwrap();

    assert_eq!(ended.status, ProductionStatus::Completed);
    assert_eq!(ended.ended_at, Some(ts(4, 10, 30)));
    assert_eq!(ended.produced_tons(), Some(30.0));

    // 结束本身不改变料位
    assert_eq!(env.silo(SILO_1).current_level_tons, 10.0);
    assert!(env.production.get_reconciliation(&session.id).unwrap().is_none());

    let rec = env
        .production
        .reconcile_session(&session.id, Some(OPERATOR), ts(4, 10, 35))
        .unwrap();
    assert!(approx(rec.quantity_tons, 30.0));
    assert!(approx(rec.applied_tons, 30.0));
    assert_eq!(rec.overflow_tons, 0.0);
    assert_eq!(rec.reconciled_by.as_deref(), Some(OPERATOR));

    let silo = env.silo(SILO_1);
    assert!(approx(silo.current_level_tons, 40.0));
    assert!(approx(silo.current_level_percent, 80.0));

    let logs = env.repos.level_log_repo.find_by_session(&session.id).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].id, rec.level_log_id);
    assert_eq!(logs[1].level_tons.map(|t| approx(t, 40.0)), Some(true));

    let stored = env.production.get_reconciliation(&session.id).unwrap().unwrap();
    assert_eq!(stored, rec);
}

#[test]
fn test_reconcile_only_once() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 4.0), ts(4, 8, 0))
        .unwrap();
    env.production
        .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 9, 0))
        .unwrap();
    env.production
        .reconcile_session(&session.id, None, ts(4, 9, 0))
        .unwrap();

    let err = env
        .production
        .reconcile_session(&session.id, None, ts(4, 9, 5))
        .unwrap_err();
    assert!(matches!(err, LedgerError::BusinessRule(_)));
    assert!(approx(env.silo(SILO_1).current_level_tons, 14.0));
}

#[test]
fn test_reconcile_caps_at_capacity_and_records_overflow() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_2, 20.0), ts(4, 8, 0))
        .unwrap();
    env.production
        .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 11, 0))
        .unwrap();
    let rec = env
        .production
        .reconcile_session(&session.id, Some(OPERATOR), ts(4, 11, 0))
        .unwrap();

    assert!(approx(rec.quantity_tons, 60.0));
    assert!(approx(rec.applied_tons, 40.0));
    assert!(approx(rec.overflow_tons, 20.0));

    let silo = env.silo(SILO_2);
    assert!(approx(silo.current_level_tons, 40.0));
    assert!(approx(silo.current_level_percent, 100.0));
}

#[test]
fn test_cancelled_session_cannot_reconcile() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    env.production
        .end_session(&session.id, ProductionStatus::Cancelled, Some(OPERATOR), ts(4, 9, 0))
        .unwrap();

    assert!(matches!(
        env.production.reconcile_session(&session.id, None, ts(4, 9, 0)),
        Err(LedgerError::BusinessRule(_))
    ));
    assert_eq!(env.silo(SILO_1).current_level_tons, 10.0);
}

#[test]
fn test_open_session_cannot_reconcile() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    assert!(matches!(
        env.production.reconcile_session(&session.id, None, ts(4, 9, 0)),
        Err(LedgerError::BusinessRule(_))
    ));
    assert!(matches!(
        env.production.reconcile_session("missing", None, ts(4, 9, 0)),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn test_auto_reconcile_on_complete() {
    let env = setup_env();
    env.set_config(config_keys::AUTO_RECONCILE_ON_COMPLETE, "true");

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    env.production
        .end_session(&session.id, ProductionStatus::Completed, Some(OPERATOR), ts(4, 9, 0))
        .unwrap();

    let rec = env.production.get_reconciliation(&session.id).unwrap().unwrap();
    assert!(approx(rec.quantity_tons, 12.0));
    assert!(approx(env.silo(SILO_1).current_level_tons, 22.0));

    // 已自动入库, 不能再次对账
    assert!(matches!(
        env.production.reconcile_session(&session.id, None, ts(4, 9, 1)),
        Err(LedgerError::BusinessRule(_))
    ));
}

// ==========================================
// 暂停 / 恢复
// ==========================================

#[test]
fn test_paused_time_is_deducted() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();

    let paused = env.production.pause_session(&session.id, ts(4, 9, 0)).unwrap();
    assert_eq!(paused.status, ProductionStatus::Paused);
    assert_eq!(paused.paused_at, Some(ts(4, 9, 0)));

    let resumed = env.production.resume_session(&session.id, ts(4, 9, 30)).unwrap();
    assert_eq!(resumed.status, ProductionStatus::Active);
    assert!(resumed.paused_at.is_none());
    assert_eq!(resumed.paused_seconds, 1800);

    let ended = env
        .production
        .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 10, 30))
        .unwrap();
    assert_eq!(ended.effective_hours(), Some(2.0));
    assert_eq!(ended.produced_tons(), Some(24.0));
}

#[test]
fn test_end_while_paused_closes_pause_interval() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    env.production.pause_session(&session.id, ts(4, 9, 0)).unwrap();
    let ended = env
        .production
        .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 9, 30))
        .unwrap();

    assert_eq!(ended.paused_seconds, 1800);
    assert!(ended.paused_at.is_none());
    assert_eq!(ended.produced_tons(), Some(12.0));
}

// ==========================================
// 状态转换
// ==========================================

#[test]
fn test_invalid_transitions_rejected() {
    let env = setup_env();

    let session = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();

    // 非终态不能作为结束状态
    assert!(matches!(
        env.production
            .end_session(&session.id, ProductionStatus::Paused, None, ts(4, 9, 0)),
        Err(LedgerError::Validation(_))
    ));
    // active 不能恢复
    assert!(matches!(
        env.production.resume_session(&session.id, ts(4, 9, 0)),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    // 结束时间早于开始时间
    assert!(matches!(
        env.production
            .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 7, 0)),
        Err(LedgerError::Validation(_))
    ));

    env.production
        .end_session(&session.id, ProductionStatus::Completed, None, ts(4, 9, 0))
        .unwrap();

    assert!(matches!(
        env.production
            .end_session(&session.id, ProductionStatus::Cancelled, None, ts(4, 9, 5)),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        env.production.pause_session(&session.id, ts(4, 9, 5)),
        Err(LedgerError::InvalidStateTransition { .. })
    ));

    let stored = env.production.get_session(&session.id).unwrap();
    assert_eq!(stored.status, ProductionStatus::Completed);
    assert_eq!(stored.ended_at, Some(ts(4, 9, 0)));
}

// ==========================================
// 产品规则
// ==========================================

#[test]
fn test_product_rules_enforced_when_enabled() {
    let env = setup_env();
    env.projector
        .add_product_rule(SILO_2, PRODUCT_2, ts(4, 7, 0))
        .unwrap();

    // 未开启时不校验
    env.production
        .start_session(session_request(SILO_2, 12.0), ts(4, 8, 0))
        .unwrap();

    env.set_config(config_keys::ENFORCE_PRODUCT_RULES, "true");
    assert!(matches!(
        env.production
            .start_session(session_request(SILO_2, 12.0), ts(4, 8, 10)),
        Err(LedgerError::BusinessRule(_))
    ));

    let mut allowed = session_request(SILO_2, 12.0);
    allowed.product_id = PRODUCT_2.to_string();
    env.production.start_session(allowed, ts(4, 8, 20)).unwrap();

    // 未配置规则的筒仓不受限制
    env.production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 30))
        .unwrap();
}

// ==========================================
// 查询
// ==========================================

#[test]
fn test_list_sessions_and_active_sessions() {
    let env = setup_env();

    let first = env
        .production
        .start_session(session_request(SILO_1, 12.0), ts(4, 8, 0))
        .unwrap();
    let second = env
        .production
        .start_session(session_request(SILO_2, 10.0), ts(4, 9, 0))
        .unwrap();
    env.production
        .end_session(&first.id, ProductionStatus::Completed, None, ts(4, 10, 0))
        .unwrap();

    let all = env.production.list_sessions(None, None).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);

    let limited = env.production.list_sessions(Some(MILL_1), Some(1)).unwrap();
    assert_eq!(limited.len(), 1);

    // 未指定 limit 时取 query.session_list_limit
    env.set_config(config_keys::SESSION_LIST_LIMIT, "1");
    let by_config = env.production.list_sessions(None, None).unwrap();
    assert_eq!(by_config.len(), 1);
    assert_eq!(by_config[0].id, second.id);

    let open = env.production.list_active_sessions(None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.id);

    assert!(env.production.list_active_sessions(Some("M9")).unwrap().is_empty());
}
