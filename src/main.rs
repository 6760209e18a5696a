// ==========================================
// 磨粉厂筒仓台账系统 - 命令行入口
// ==========================================
// 用法:
//   plant-silo-ledger [status]          筒仓总览
//   plant-silo-ledger logs <筒仓编码>   最近台账
//   plant-silo-ledger sessions          进行中的生产会话
// 数据库: PLANT_SILO_LEDGER_DB_PATH 或用户数据目录
// 日志: RUST_LOG 过滤, PLANT_SILO_LEDGER_LOG_JSON 切换 JSON 格式
// ==========================================

use std::error::Error;

use plant_silo_ledger::app::{get_default_db_path, AppState};
use plant_silo_ledger::domain::capacity::{display_percent, round1};
use plant_silo_ledger::logging;

/// 设置后日志输出为 JSON 行
const LOG_JSON_ENV: &str = "PLANT_SILO_LEDGER_LOG_JSON";

fn main() -> Result<(), Box<dyn Error>> {
    if std::env::var_os(LOG_JSON_ENV).is_some() {
        logging::init_json();
    } else {
        logging::init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)?;

    match args.first().map(String::as_str) {
        None | Some("status") => print_status(&state)?,
        Some("logs") => {
            let code = args.get(1).ok_or("用法: plant-silo-ledger logs <筒仓编码>")?;
            print_logs(&state, code)?;
        }
        Some("sessions") => print_sessions(&state)?,
        Some(other) => {
            eprintln!("未知命令: {}", other);
            eprintln!("可用命令: status | logs <筒仓编码> | sessions");
            std::process::exit(2);
        }
    }
    Ok(())
}

fn print_status(state: &AppState) -> Result<(), Box<dyn Error>> {
    println!("==================================================");
    println!("{} v{}", plant_silo_ledger::APP_NAME, plant_silo_ledger::VERSION);
    println!("==================================================");

    let summary = state.silo_api.fleet_summary()?;
    println!(
        "筒仓 {} 个 (启用 {}), 平均料位 {}%, 总库存 {} 吨",
        summary.silo_count,
        summary.active_count,
        round1(summary.average_level_percent),
        round1(summary.total_level_tons)
    );
    println!();

    for view in state.silo_api.list_level_views(None)? {
        let capacity = view
            .capacity_tons
            .map(|c| format!("{}", round1(c)))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:>6}% {:>8} / {:>8} 吨  {:?}",
            view.silo_code,
            round1(display_percent(view.level_percent)),
            round1(view.level_tons),
            capacity,
            view.band
        );
    }
    Ok(())
}

fn print_logs(state: &AppState, silo_code: &str) -> Result<(), Box<dyn Error>> {
    let silo = state
        .repos
        .silo_repo
        .find_by_code(silo_code)?
        .ok_or_else(|| format!("筒仓不存在: {}", silo_code))?;

    for log in state.silo_api.recent_logs(&silo.id, Some(20))? {
        println!(
            "{}  {:<10} {:>6}%  {:>8}  {}",
            log.recorded_at,
            log.source.as_str(),
            round1(log.level_percent),
            log.level_tons
                .map(|t| format!("{}t", round1(t)))
                .unwrap_or_default(),
            log.notes.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_sessions(state: &AppState) -> Result<(), Box<dyn Error>> {
    let sessions = state.production_api.list_active_sessions(None)?;
    if sessions.is_empty() {
        println!("没有进行中的生产会话");
    }
    for s in sessions {
        println!(
            "{}  mill={} silo={} {} t/h  {}  since {}",
            s.id, s.mill_id, s.target_silo_id, s.hourly_rate_tons, s.status, s.started_at
        );
    }
    Ok(())
}
