// ==========================================
// 磨粉厂筒仓台账系统 - 演示数据库生成
// ==========================================
// 用法: seed_demo_db [db_path]
// 说明: 已存在的数据库会先备份再重建
// 数据: 2 台磨机 / 4 个筒仓 / 3 个产品 / 3 名人员, 以及最近两天的生产与包装记录
// ==========================================

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use plant_silo_ledger::app::get_default_db_path;
use plant_silo_ledger::config::ConfigManager;
use plant_silo_ledger::db::{init_schema, open_sqlite_connection};
use plant_silo_ledger::domain::{
    CreatePackagingRequest, Mill, PackageType, Product, ProductionStatus, Separator, Silo,
    SiloType, StartSessionRequest, User, UserRole,
};
use plant_silo_ledger::engine::{
    LedgerRepositories, OptionalEventPublisher, PackagingProcessor, ProductionProcessor,
    SetLevelRequest, SiloStateProjector,
};
use plant_silo_ledger::logging;

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);
    backup_and_reset_db(&db_path)?;

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let repos = LedgerRepositories::from_connection(conn.clone());
    let config = Arc::new(ConfigManager::from_connection(conn)?);

    let now = Local::now().naive_local();
    let now = now.with_nanosecond(0).unwrap_or(now);

    seed_master_data(&repos, now - Duration::days(3))?;
    seed_activity(&repos, config, now)?;

    let silos = repos.silo_repo.list(None, false)?;
    println!("数据库已生成: {}", db_path);
    for s in silos {
        println!(
            "  {:<8} {:>6.1}%  {:>7.2} 吨",
            s.code, s.current_level_percent, s.current_level_tons
        );
    }
    Ok(())
}

fn backup_and_reset_db(db_path: &str) -> Result<(), Box<dyn Error>> {
    let path = Path::new(db_path);
    if !path.exists() {
        return Ok(());
    }

    let ts = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let backup_path = format!("{}.bak.{}", db_path, ts);
    fs::copy(path, &backup_path)?;
    fs::remove_file(path)?;

    eprintln!("已备份 {} -> {}", db_path, backup_path);
    Ok(())
}

fn seed_master_data(repos: &LedgerRepositories, ts: NaiveDateTime) -> Result<(), Box<dyn Error>> {
    for (id, email, name, role) in [
        ("U-ADMIN", "admin@plant.local", "管理员", UserRole::Admin),
        ("U-OP1", "op1@plant.local", "中控-张", UserRole::Operator),
        ("U-W1", "w1@plant.local", "包装-李", UserRole::Worker),
        ("U-W2", "w2@plant.local", "包装-王", UserRole::Worker),
    ] {
        repos.user_repo.insert(&User {
            id: id.to_string(),
            email: email.to_string(),
            full_name: name.to_string(),
            role,
            phone: None,
            is_active: true,
            created_at: ts,
        })?;
    }

    for (id, code, micron) in [("P-325", "325目", 45.0), ("P-800", "800目", 18.0), ("P-1250", "1250目", 10.0)] {
        repos.product_repo.insert(&Product {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("重钙粉 {}", code),
            micron: Some(micron),
            variant: None,
            description: None,
            is_active: true,
            created_at: ts,
        })?;
    }

    for (id, code, rate, separators) in [("M1", "1#", 12.0, 2), ("M2", "2#", 8.0, 1)] {
        repos.mill_repo.insert(&Mill {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("{}立磨", code),
            mill_type: "vertical".to_string(),
            feed_source: Some("原料库".to_string()),
            separator_count: separators,
            default_hourly_rate: Some(rate),
            sends_to_coating: id == "M1",
            is_active: true,
            notes: None,
            created_at: ts,
            updated_at: ts,
        })?;
        for number in 1..=separators {
            repos.mill_repo.insert_separator(&Separator {
                id: format!("{}-SEP{}", id, number),
                mill_id: id.to_string(),
                number,
                name: Some(format!("{}号分级机", number)),
                default_product: None,
                default_micron: None,
                is_active: true,
            })?;
        }
    }

    for (id, code, mill, capacity, silo_type) in [
        ("S1", "1DU01", Some("M1"), Some(50.0), SiloType::MillProduct),
        ("S2", "1DU02", Some("M1"), Some(40.0), SiloType::MillProduct),
        ("S3", "2DU01", Some("M2"), Some(80.0), SiloType::MillProduct),
        ("S4", "GX01", None, None, SiloType::CoatingRaw),
    ] {
        repos.silo_repo.insert(&Silo {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("{} 仓", code),
            silo_type,
            capacity_meters: None,
            capacity_tons: capacity,
            current_level_percent: 0.0,
            current_level_tons: 0.0,
            mill_id: mill.map(str::to_string),
            is_active: true,
            notes: None,
            revision: 0,
            created_at: ts,
            updated_at: ts,
            created_by: Some("U-ADMIN".to_string()),
        })?;
    }
    Ok(())
}

fn seed_activity(
    repos: &LedgerRepositories,
    config: Arc<ConfigManager>,
    now: NaiveDateTime,
) -> Result<(), Box<dyn Error>> {
    let events = OptionalEventPublisher::none();
    let projector = SiloStateProjector::new(repos.clone(), config.clone(), events.clone());
    let production = ProductionProcessor::new(repos.clone(), config.clone(), events.clone());
    let packaging = PackagingProcessor::new(repos.clone(), config, events);

    let day_start = now - Duration::days(2);

    // 盘点: 人工校正初始料位
    for (silo_id, percent, tons) in [("S1", 20.0, 10.0), ("S2", 62.5, 25.0), ("S3", 10.0, 8.0)] {
        projector.set_level(
            SetLevelRequest {
                silo_id: silo_id.to_string(),
                level_percent: percent,
                level_tons: tons,
                recorded_by: "U-OP1".to_string(),
                notes: Some("期初盘点".to_string()),
                expected_revision: None,
            },
            day_start,
        )?;
    }

    // 生产: 1# 磨 12 t/h 运行 2.5 小时后入库
    let session = production.start_session(
        StartSessionRequest {
            mill_id: "M1".to_string(),
            product_id: "P-800".to_string(),
            target_silo_id: "S1".to_string(),
            hourly_rate_tons: 12.0,
            notes: None,
            created_by: "U-OP1".to_string(),
        },
        day_start + Duration::hours(1),
    )?;
    production.end_session(
        &session.id,
        ProductionStatus::Completed,
        Some("U-OP1"),
        day_start + Duration::hours(3) + Duration::minutes(30),
    )?;
    production.reconcile_session(&session.id, Some("U-OP1"), day_start + Duration::hours(4))?;

    // 2# 磨正在生产
    production.start_session(
        StartSessionRequest {
            mill_id: "M2".to_string(),
            product_id: "P-325".to_string(),
            target_silo_id: "S3".to_string(),
            hourly_rate_tons: 8.0,
            notes: Some("夜班".to_string()),
            created_by: "U-OP1".to_string(),
        },
        now - Duration::hours(2),
    )?;

    // 包装
    for (hours, silo_id, worker, package_type, tons, bags) in [
        (5, "S1", "U-W1", PackageType::Bb, 3.0, Some(3)),
        (6, "S1", "U-W2", PackageType::Pp, 1.25, Some(50)),
        (26, "S2", "U-W1", PackageType::Kraft, 2.0, Some(80)),
        (30, "S3", "U-W2", PackageType::Bb, 4.0, Some(4)),
    ] {
        packaging.create_entry(
            CreatePackagingRequest {
                silo_id: silo_id.to_string(),
                product_id: "P-800".to_string(),
                worker_id: worker.to_string(),
                package_type,
                quantity_tons: tons,
                quantity_bags: bags,
                shift: Some(if hours % 24 < 12 { "白班" } else { "夜班" }.to_string()),
                notes: None,
                created_by: worker.to_string(),
            },
            day_start + Duration::hours(hours),
        )?;
    }
    Ok(())
}
