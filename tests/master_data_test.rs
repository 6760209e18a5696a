// ==========================================
// 主数据维护集成测试
// ==========================================
// 覆盖: 磨机/筒仓新建与删除 / 流程图节点联动 / 容量约束 / 人员维护
// ==========================================

mod test_helpers;

use plant_silo_ledger::api::ApiError;
use plant_silo_ledger::app::AppState;
use plant_silo_ledger::domain::{
    FlowEntityType, NewFlowConnection, NewMill, NewSilo, SiloUpdate, UserUpdate,
};
use plant_silo_ledger::engine::{ChangeKind, ChangeTable};
use plant_silo_ledger::{SiloType, UserRole};
use tempfile::NamedTempFile;
use test_helpers::*;

fn setup_state() -> (NamedTempFile, AppState) {
    let (temp_file, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    seed_basic(&state.repos).unwrap();
    (temp_file, state)
}

fn new_mill(code: &str) -> NewMill {
    NewMill {
        code: code.to_string(),
        name: format!("{}立磨", code),
        mill_type: "vertical".to_string(),
        feed_source: None,
        separator_count: 2,
        default_hourly_rate: Some(10.0),
        sends_to_coating: false,
        notes: None,
    }
}

fn new_silo(code: &str, mill_id: Option<&str>, capacity_tons: Option<f64>) -> NewSilo {
    NewSilo {
        code: code.to_string(),
        name: format!("{} 仓", code),
        silo_type: SiloType::MillProduct,
        capacity_meters: None,
        capacity_tons,
        mill_id: mill_id.map(str::to_string),
        notes: None,
        created_by: Some(OPERATOR.to_string()),
    }
}

fn connect(state: &AppState, mill_id: &str, silo_id: &str) -> String {
    state
        .flow_api
        .create_connection(NewFlowConnection {
            source_id: mill_id.to_string(),
            source_type: FlowEntityType::Mill,
            source_handle: None,
            target_id: silo_id.to_string(),
            target_type: FlowEntityType::Silo,
            target_handle: None,
            connection_rules: None,
            created_by: Some(OPERATOR.to_string()),
        })
        .unwrap()
        .id
}

// ==========================================
// 新建
// ==========================================

#[test]
fn test_create_mill_and_silo_place_flow_nodes() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;
    let mut feed = state
        .change_feed
        .subscribe(&[ChangeTable::Mills, ChangeTable::Silos, ChangeTable::FlowNodes]);

    let mill = api.create_mill(new_mill("2#")).unwrap();
    assert!(mill.is_active);
    assert_eq!(api.list_mills().unwrap().len(), 2);

    let silo = api
        .create_silo(new_silo("2DU01", Some(&mill.id), Some(60.0)))
        .unwrap();
    assert_eq!(silo.current_level_tons, 0.0);
    assert_eq!(silo.current_level_percent, 0.0);
    assert_eq!(api.get_mill_detail(&mill.id).unwrap().silos.len(), 1);

    let nodes = state.flow_api.list_nodes().unwrap();
    assert_eq!(nodes.len(), 2);
    let mill_node = nodes.iter().find(|n| n.entity_id == mill.id).unwrap();
    assert_eq!(mill_node.entity_type, FlowEntityType::Mill);
    assert_eq!((mill_node.position_x, mill_node.position_y), (100.0, 100.0));
    let silo_node = nodes.iter().find(|n| n.entity_id == silo.id).unwrap();
    assert_eq!((silo_node.position_x, silo_node.position_y), (100.0, 400.0));

    let tables: Vec<_> = std::iter::from_fn(|| feed.try_recv().unwrap())
        .map(|e| (e.table, e.kind))
        .collect();
    assert_eq!(
        tables,
        vec![
            (ChangeTable::Mills, ChangeKind::Insert),
            (ChangeTable::FlowNodes, ChangeKind::Insert),
            (ChangeTable::Silos, ChangeKind::Insert),
            (ChangeTable::FlowNodes, ChangeKind::Insert),
        ]
    );
}

#[test]
fn test_create_silo_rejects_bad_input() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    assert!(matches!(
        api.create_silo(new_silo("", None, None)),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        api.create_silo(new_silo("9DU01", None, Some(0.0))),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.create_silo(new_silo("9DU01", Some("NOPE"), None)),
        Err(ApiError::NotFound(_))
    ));
    // 编码重复
    assert!(api.create_silo(new_silo("1DU01", None, None)).is_err());

    assert_eq!(state.silo_api.list_silos(None).unwrap().len(), 3);
    assert!(state.flow_api.list_nodes().unwrap().is_empty());
}

// ==========================================
// 更新
// ==========================================

#[test]
fn test_update_silo_keeps_stock_within_capacity() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    assert!(matches!(
        api.update_silo(SILO_1, SiloUpdate::default()),
        Err(ApiError::InvalidInput(_))
    ));

    // SILO_1 当前 10 吨
    let shrink = SiloUpdate {
        capacity_tons: Some(Some(8.0)),
        ..Default::default()
    };
    assert!(matches!(
        api.update_silo(SILO_1, shrink),
        Err(ApiError::ValidationError(_))
    ));
    assert_eq!(state.silo_api.get_silo(SILO_1).unwrap().capacity_tons, Some(50.0));

    let mut feed = state.change_feed.subscribe(&[ChangeTable::Silos]);
    let updated = api
        .update_silo(
            SILO_1,
            SiloUpdate {
                capacity_tons: Some(Some(10.0)),
                silo_type: Some(SiloType::CoatingRaw),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.capacity_tons, Some(10.0));
    assert_eq!(updated.silo_type, SiloType::CoatingRaw);
    assert_eq!(updated.current_level_tons, 10.0);
    assert!(state
        .silo_api
        .list_active_silos(None)
        .unwrap()
        .iter()
        .all(|s| s.id != SILO_1));
    let event = feed.try_recv().unwrap().unwrap();
    assert_eq!((event.kind, event.row_id.as_str()), (ChangeKind::Update, SILO_1));

    // 基础信息更新不推进料位 revision
    assert_eq!(state.silo_api.get_silo(SILO_1).unwrap().revision, 0);
}

// ==========================================
// 删除
// ==========================================

#[test]
fn test_delete_silo_removes_node_and_connections() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    state
        .flow_api
        .create_node(MILL_1, FlowEntityType::Mill, 0.0, 0.0, None)
        .unwrap();
    state
        .flow_api
        .create_node(SILO_2, FlowEntityType::Silo, 0.0, 300.0, None)
        .unwrap();
    let kept = connect(&state, MILL_1, SILO_3);
    let dropped = connect(&state, MILL_1, SILO_2);

    let mut feed = state.change_feed.subscribe(&[
        ChangeTable::Silos,
        ChangeTable::FlowNodes,
        ChangeTable::FlowConnections,
    ]);
    api.delete_silo(SILO_2).unwrap();

    assert!(matches!(
        state.silo_api.get_silo(SILO_2),
        Err(ApiError::NotFound(_))
    ));
    let connections = state.flow_api.list_connections().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].id, kept);
    assert!(state
        .flow_api
        .list_nodes()
        .unwrap()
        .iter()
        .all(|n| n.entity_id != SILO_2));

    let events: Vec<_> = std::iter::from_fn(|| feed.try_recv().unwrap()).collect();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.kind == ChangeKind::Delete));
    assert_eq!(events[0].table, ChangeTable::Silos);
    assert!(events
        .iter()
        .any(|e| e.table == ChangeTable::FlowConnections && e.row_id == dropped));

    assert!(matches!(api.delete_silo(SILO_2), Err(ApiError::NotFound(_))));
}

#[test]
fn test_delete_silo_with_history_rejected() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    state
        .packaging_api
        .create_entry(packaging_request(SILO_1, WORKER_1, 2.0))
        .unwrap();
    assert!(matches!(
        api.delete_silo(SILO_1),
        Err(ApiError::BusinessRuleViolation(_))
    ));
    assert_eq!(state.silo_api.get_silo(SILO_1).unwrap().current_level_tons, 8.0);

    // 停用仍然可以
    let silo = api
        .update_silo(
            SILO_1,
            SiloUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!silo.is_active);
}

#[test]
fn test_delete_mill_only_without_references() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    // 种子筒仓都挂在 MILL_1 下
    assert!(matches!(
        api.delete_mill(MILL_1),
        Err(ApiError::BusinessRuleViolation(_))
    ));

    let mill = api.create_mill(new_mill("3#")).unwrap();
    let edge = connect(&state, &mill.id, SILO_3);
    let mut feed = state
        .change_feed
        .subscribe(&[ChangeTable::Mills, ChangeTable::FlowConnections]);

    api.delete_mill(&mill.id).unwrap();
    assert_eq!(api.list_mills().unwrap().len(), 1);
    assert!(state.flow_api.list_nodes().unwrap().is_empty());
    assert!(state.flow_api.list_connections().unwrap().is_empty());

    let first = feed.try_recv().unwrap().unwrap();
    assert_eq!((first.table, first.kind), (ChangeTable::Mills, ChangeKind::Delete));
    let second = feed.try_recv().unwrap().unwrap();
    assert_eq!(second.row_id, edge);

    assert!(matches!(api.delete_mill(&mill.id), Err(ApiError::NotFound(_))));
}

// ==========================================
// 人员
// ==========================================

#[test]
fn test_user_update_deactivate_and_stats() {
    let (_tmp, state) = setup_state();
    let api = &state.master_data_api;

    assert_eq!(api.get_user(WORKER_1).unwrap().full_name, "包装-李");
    assert!(matches!(api.get_user("NOPE"), Err(ApiError::NotFound(_))));
    assert!(matches!(
        api.update_user(WORKER_1, UserUpdate::default()),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        api.update_user(
            "NOPE",
            UserUpdate {
                phone: Some("123".to_string()),
                ..Default::default()
            }
        ),
        Err(ApiError::NotFound(_))
    ));

    let user = api
        .update_user(
            WORKER_1,
            UserUpdate {
                full_name: Some(" 班长-李 ".to_string()),
                role: Some(UserRole::Operator),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(user.full_name, "班长-李");
    assert_eq!(user.role, UserRole::Operator);
    assert!(user.is_active);

    let mut users = state.change_feed.subscribe(&[ChangeTable::Users]);
    let user = api.deactivate_user(WORKER_2).unwrap();
    assert!(!user.is_active);
    assert_eq!(users.try_recv().unwrap().unwrap().row_id, WORKER_2);

    assert!(api.list_active_workers().unwrap().is_empty());
    assert_eq!(api.list_active_users().unwrap().len(), 2);
    assert_eq!(api.list_users().unwrap().len(), 3);

    let stats = api.user_stats().unwrap();
    assert_eq!((stats.total, stats.active, stats.inactive), (3, 2, 1));
    assert_eq!(stats.by_role.get(&UserRole::Operator), Some(&2));
    assert_eq!(stats.by_role.get(&UserRole::Worker), Some(&1));
    assert_eq!(stats.by_role.get(&UserRole::Admin), None);
}
