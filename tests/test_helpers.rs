// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// 约定: 台账 recorded_by / created_by 外键指向 users, 测试必须使用种子人员
// ==========================================

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

use plant_silo_ledger::config::{config_keys, ConfigManager};
use plant_silo_ledger::db::{init_schema, open_sqlite_connection};
use plant_silo_ledger::domain::{
    CreatePackagingRequest, Mill, PackageType, Product, Silo, SiloType, StartSessionRequest, User,
    UserRole,
};
use plant_silo_ledger::engine::{
    ChangeFeed, LedgerRecorder, LedgerRepositories, OptionalEventPublisher, PackagingProcessor,
    ProductionProcessor, ReportEngine, SiloStateProjector,
};

pub const OPERATOR: &str = "U-OP";
pub const WORKER_1: &str = "U-W1";
pub const WORKER_2: &str = "U-W2";

pub const MILL_1: &str = "M1";
pub const PRODUCT_1: &str = "P1";
pub const PRODUCT_2: &str = "P2";

/// 容量 50 吨, 初始 10 吨 / 20%
pub const SILO_1: &str = "S1";
/// 容量 40 吨, 空仓
pub const SILO_2: &str = "S2";
/// 容量未知, 空仓
pub const SILO_3: &str = "S3";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 固定测试时间
pub fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

// ==========================================
// 测试环境
// ==========================================

pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub repos: LedgerRepositories,
    pub config: Arc<ConfigManager>,
    pub feed: ChangeFeed,
    pub recorder: LedgerRecorder,
    pub projector: SiloStateProjector,
    pub production: ProductionProcessor,
    pub packaging: PackagingProcessor,
    pub reports: ReportEngine,
}

/// 创建带种子数据的测试环境
pub fn setup_env() -> TestEnv {
    plant_silo_ledger::logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_sqlite_connection(&db_path).expect("打开测试数据库失败");
    let conn = Arc::new(Mutex::new(conn));

    let repos = LedgerRepositories::from_connection(conn.clone());
    let config = Arc::new(ConfigManager::from_connection(conn).expect("初始化配置失败"));
    let feed = ChangeFeed::default();
    let events = OptionalEventPublisher::with_publisher(Arc::new(feed.clone()));

    seed_basic(&repos).expect("写入种子数据失败");

    TestEnv {
        _temp_file: temp_file,
        db_path,
        recorder: LedgerRecorder::new(repos.clone(), events.clone()),
        projector: SiloStateProjector::new(repos.clone(), config.clone(), events.clone()),
        production: ProductionProcessor::new(repos.clone(), config.clone(), events.clone()),
        packaging: PackagingProcessor::new(repos.clone(), config.clone(), events),
        reports: ReportEngine::new(repos.clone()),
        repos,
        config,
        feed,
    }
}

impl TestEnv {
    pub fn set_config(&self, key: &str, value: &str) {
        self.config
            .set_global_config_value(key, value)
            .expect("写入配置失败");
    }

    pub fn use_auto_fix(&self) {
        self.set_config(config_keys::STOCK_CHECK_MODE, "AUTO_FIX");
    }

    pub fn silo(&self, silo_id: &str) -> Silo {
        self.projector.get_silo(silo_id).expect("筒仓不存在")
    }

    pub fn log_count(&self, silo_id: &str) -> i64 {
        self.recorder.count(silo_id).expect("统计台账失败")
    }

    /// 独立连接上计数, 不经过共享连接
    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = Connection::open(&self.db_path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }
}

// ==========================================
// 种子数据
// ==========================================

pub fn seed_basic(repos: &LedgerRepositories) -> Result<(), Box<dyn Error>> {
    let t0 = ts(1, 0, 0);

    for (id, name, role) in [
        (OPERATOR, "中控-张", UserRole::Operator),
        (WORKER_1, "包装-李", UserRole::Worker),
        (WORKER_2, "包装-王", UserRole::Worker),
    ] {
        repos.user_repo.insert(&User {
            id: id.to_string(),
            email: format!("{}@plant.test", id.to_lowercase()),
            full_name: name.to_string(),
            role,
            phone: None,
            is_active: true,
            created_at: t0,
        })?;
    }

    for (id, code, micron) in [(PRODUCT_1, "800目", 18.0), (PRODUCT_2, "325目", 45.0)] {
        repos.product_repo.insert(&Product {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("重钙粉 {}", code),
            micron: Some(micron),
            variant: None,
            description: None,
            is_active: true,
            created_at: t0,
        })?;
    }

    repos.mill_repo.insert(&Mill {
        id: MILL_1.to_string(),
        code: "1#".to_string(),
        name: "1#立磨".to_string(),
        mill_type: "vertical".to_string(),
        feed_source: None,
        separator_count: 0,
        default_hourly_rate: Some(12.0),
        sends_to_coating: false,
        is_active: true,
        notes: None,
        created_at: t0,
        updated_at: t0,
    })?;

    for (id, code, capacity, percent, tons) in [
        (SILO_1, "1DU01", Some(50.0), 20.0, 10.0),
        (SILO_2, "1DU02", Some(40.0), 0.0, 0.0),
        (SILO_3, "GX01", None, 0.0, 0.0),
    ] {
        repos.silo_repo.insert(&test_silo(id, code, capacity, percent, tons, t0))?;
    }
    Ok(())
}

pub fn test_silo(
    id: &str,
    code: &str,
    capacity_tons: Option<f64>,
    percent: f64,
    tons: f64,
    at: NaiveDateTime,
) -> Silo {
    Silo {
        id: id.to_string(),
        code: code.to_string(),
        name: format!("{} 仓", code),
        silo_type: SiloType::MillProduct,
        capacity_meters: None,
        capacity_tons,
        current_level_percent: percent,
        current_level_tons: tons,
        mill_id: Some(MILL_1.to_string()),
        is_active: true,
        notes: None,
        revision: 0,
        created_at: at,
        updated_at: at,
        created_by: Some(OPERATOR.to_string()),
    }
}

// ==========================================
// 请求构造
// ==========================================

pub fn packaging_request(silo_id: &str, worker_id: &str, tons: f64) -> CreatePackagingRequest {
    CreatePackagingRequest {
        silo_id: silo_id.to_string(),
        product_id: PRODUCT_1.to_string(),
        worker_id: worker_id.to_string(),
        package_type: PackageType::Bb,
        quantity_tons: tons,
        quantity_bags: Some(3),
        shift: Some("白班".to_string()),
        notes: None,
        created_by: worker_id.to_string(),
    }
}

pub fn session_request(silo_id: &str, hourly_rate_tons: f64) -> StartSessionRequest {
    StartSessionRequest {
        mill_id: MILL_1.to_string(),
        product_id: PRODUCT_1.to_string(),
        target_silo_id: silo_id.to_string(),
        hourly_rate_tons,
        notes: None,
        created_by: OPERATOR.to_string(),
    }
}
