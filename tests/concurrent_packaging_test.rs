// ==========================================
// 并发控制测试
// ==========================================
// 测试目标: 验证并发包装出库不丢失扣减、不出现负库存
// 场景:
// 1. 同一连接上多线程出库
// 2. 同一数据库文件上两个独立连接并发出库 (IMMEDIATE 事务串行)
// 3. 并发人工校正的乐观锁冲突
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_packaging_tests {
    use crate::test_helpers::*;
    use plant_silo_ledger::api::ApiError;
    use plant_silo_ledger::app::AppState;
    use plant_silo_ledger::engine::{LedgerError, SetLevelRequest};
    use plant_silo_ledger::repository::RepositoryError;
    use std::thread;

    // ==========================================
    // 测试1: 同一连接多线程出库
    // ==========================================

    #[test]
    fn test_concurrent_packaging_shared_connection() {
        let env = setup_env();

        let results: Vec<bool> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let packaging = &env.packaging;
                    s.spawn(move || {
                        packaging
                            .create_entry(packaging_request(SILO_1, WORKER_1, 1.0), ts(4, 9, i))
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|ok| *ok), "库存充足时全部应成功");

        let silo = env.silo(SILO_1);
        assert!((silo.current_level_tons - 2.0).abs() < 1e-9);
        assert_eq!(silo.revision, 8);
        assert_eq!(env.log_count(SILO_1), 8);
        assert_eq!(env.count_rows("packaging_entries"), 8);
    }

    // ==========================================
    // 测试2: 两个独立连接并发出库
    // ==========================================

    #[test]
    fn test_concurrent_packaging_two_connections() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let state_a = AppState::new(db_path.clone()).unwrap();
        let state_b = AppState::new(db_path.clone()).unwrap();
        seed_basic(&state_a.repos).unwrap();

        // 10 吨库存, 12 次各 1 吨
        let results: Vec<Result<(), ApiError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..12)
                .map(|i| {
                    let api = if i % 2 == 0 {
                        state_a.packaging_api.clone()
                    } else {
                        state_b.packaging_api.clone()
                    };
                    s.spawn(move || {
                        api.create_entry(packaging_request(SILO_1, WORKER_1, 1.0))
                            .map(|_| ())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(ApiError::InsufficientStock { .. })))
            .count();
        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 2);

        let silo = state_b.silo_api.get_silo(SILO_1).unwrap();
        assert_eq!(silo.current_level_tons, 0.0);
        assert_eq!(silo.revision, 10);
        assert_eq!(state_a.silo_api.recent_logs(SILO_1, Some(100)).unwrap().len(), 10);
    }

    // ==========================================
    // 测试3: 并发人工校正, 同一 revision 只有一个成功
    // ==========================================

    #[test]
    fn test_concurrent_set_level_optimistic_lock() {
        let env = setup_env();
        let revision = env.silo(SILO_2).revision;

        let results: Vec<Result<(), LedgerError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let projector = &env.projector;
                    s.spawn(move || {
                        projector
                            .set_level(
                                SetLevelRequest {
                                    silo_id: SILO_2.to_string(),
                                    level_percent: 10.0 * (i + 1) as f64,
                                    level_tons: 4.0 * (i + 1) as f64,
                                    recorded_by: OPERATOR.to_string(),
                                    notes: None,
                                    expected_revision: Some(revision),
                                },
                                ts(4, 8, i),
                            )
                            .map(|_| ())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(
                    r,
                    Err(LedgerError::Repository(
                        RepositoryError::OptimisticLockFailure { .. }
                    ))
                ))
                .count(),
            3
        );
        assert_eq!(env.silo(SILO_2).revision, revision + 1);
        assert_eq!(env.log_count(SILO_2), 1);
    }
}
