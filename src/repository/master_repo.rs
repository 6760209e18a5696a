// ==========================================
// 磨粉厂筒仓台账系统 - 主数据仓储
// ==========================================
// 磨机 / 分级机 / 产品 / 人员
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::master::{Mill, MillUpdate, Product, Separator, User, UserUpdate};
use crate::domain::types::UserRole;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const MILL_COLUMNS: &str = r#"
    id, code, name, mill_type, feed_source, separator_count, default_hourly_rate,
    sends_to_coating, is_active, notes, created_at, updated_at
"#;

const PRODUCT_COLUMNS: &str =
    "id, code, name, micron, variant, description, is_active, created_at";

const USER_COLUMNS: &str = "id, email, full_name, role, phone, is_active, created_at";

// ==========================================
// MillRepository - 磨机仓储
// ==========================================
pub struct MillRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MillRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<Mill> {
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;
        Ok(Mill {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            mill_type: row.get(3)?,
            feed_source: row.get(4)?,
            separator_count: row.get(5)?,
            default_hourly_rate: row.get(6)?,
            sends_to_coating: row.get(7)?,
            is_active: row.get(8)?,
            notes: row.get(9)?,
            created_at: parse_ts(&created_at, 10)?,
            updated_at: parse_ts(&updated_at, 11)?,
        })
    }

    pub fn find_by_id_tx(conn: &Connection, mill_id: &str) -> RepositoryResult<Option<Mill>> {
        let sql = format!("SELECT {} FROM mills WHERE id = ?1", MILL_COLUMNS);
        let mill = conn
            .query_row(&sql, params![mill_id], Self::map_row)
            .optional()?;
        Ok(mill)
    }

    pub fn insert(&self, mill: &Mill) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, mill)
    }

    pub fn insert_tx(conn: &Connection, mill: &Mill) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO mills (
                id, code, name, mill_type, feed_source, separator_count, default_hourly_rate,
                sends_to_coating, is_active, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                mill.id,
                mill.code,
                mill.name,
                mill.mill_type,
                mill.feed_source,
                mill.separator_count,
                mill.default_hourly_rate,
                mill.sends_to_coating,
                mill.is_active,
                mill.notes,
                format_ts(&mill.created_at),
                format_ts(&mill.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_separator(&self, separator: &Separator) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO separators (
                id, mill_id, number, name, default_product, default_micron, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                separator.id,
                separator.mill_id,
                separator.number,
                separator.name,
                separator.default_product,
                separator.default_micron,
                separator.is_active,
            ],
        )?;
        Ok(())
    }

    /// 部分字段更新 (COALESCE 保留未传字段)
    pub fn update_tx(
        conn: &Connection,
        mill_id: &str,
        update: &MillUpdate,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE mills
               SET name = COALESCE(?1, name),
                   mill_type = COALESCE(?2, mill_type),
                   feed_source = COALESCE(?3, feed_source),
                   separator_count = COALESCE(?4, separator_count),
                   default_hourly_rate = COALESCE(?5, default_hourly_rate),
                   notes = COALESCE(?6, notes),
                   is_active = COALESCE(?7, is_active),
                   sends_to_coating = COALESCE(?8, sends_to_coating),
                   updated_at = ?9
               WHERE id = ?10"#,
            params![
                update.name,
                update.mill_type,
                update.feed_source,
                update.separator_count,
                update.default_hourly_rate,
                update.notes,
                update.is_active,
                update.sends_to_coating,
                format_ts(&now),
                mill_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Mill", mill_id));
        }
        Ok(())
    }

    /// 引用该磨机的生产记录与筒仓数
    pub fn count_references_tx(conn: &Connection, mill_id: &str) -> RepositoryResult<i64> {
        let count = conn.query_row(
            r#"SELECT
                 (SELECT COUNT(*) FROM production_sessions WHERE mill_id = ?1)
               + (SELECT COUNT(*) FROM silos WHERE mill_id = ?1)"#,
            params![mill_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 删除磨机及其分级机
    pub fn delete_tx(conn: &Connection, mill_id: &str) -> RepositoryResult<()> {
        conn.execute("DELETE FROM separators WHERE mill_id = ?1", params![mill_id])?;
        let rows = conn.execute("DELETE FROM mills WHERE id = ?1", params![mill_id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Mill", mill_id));
        }
        Ok(())
    }

    pub fn find_by_id(&self, mill_id: &str) -> RepositoryResult<Option<Mill>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, mill_id)
    }

    /// 磨机列表 (按编码排序)
    pub fn list(&self, active_only: bool) -> RepositoryResult<Vec<Mill>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM mills WHERE (?1 = 0 OR is_active = 1) ORDER BY code",
            MILL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mills = stmt
            .query_map(params![active_only], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(mills)
    }

    pub fn list_separators(&self, mill_id: &str) -> RepositoryResult<Vec<Separator>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, mill_id, number, name, default_product, default_micron, is_active
               FROM separators
               WHERE mill_id = ?1
               ORDER BY number"#,
        )?;
        let separators = stmt
            .query_map(params![mill_id], |row| {
                Ok(Separator {
                    id: row.get(0)?,
                    mill_id: row.get(1)?,
                    number: row.get(2)?,
                    name: row.get(3)?,
                    default_product: row.get(4)?,
                    default_micron: row.get(5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(separators)
    }
}

// ==========================================
// ProductRepository - 产品仓储
// ==========================================
pub struct ProductRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<Product> {
        let created_at: String = row.get(7)?;
        Ok(Product {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            micron: row.get(3)?,
            variant: row.get(4)?,
            description: row.get(5)?,
            is_active: row.get(6)?,
            created_at: parse_ts(&created_at, 7)?,
        })
    }

    pub fn find_by_id_tx(conn: &Connection, product_id: &str) -> RepositoryResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = conn
            .query_row(&sql, params![product_id], Self::map_row)
            .optional()?;
        Ok(product)
    }

    pub fn insert(&self, product: &Product) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO products (id, code, name, micron, variant, description, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                product.id,
                product.code,
                product.name,
                product.micron,
                product.variant,
                product.description,
                product.is_active,
                format_ts(&product.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, product_id: &str) -> RepositoryResult<Option<Product>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, product_id)
    }

    /// 启用的产品 (按细度排序, 未知细度排在最后)
    pub fn list_active(&self) -> RepositoryResult<Vec<Product>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY micron IS NULL, micron, code",
            PRODUCT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let products = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(products)
    }
}

// ==========================================
// UserRepository - 人员仓储
// ==========================================
pub struct UserRepository {
    conn: Arc<Mutex<Connection>>,
}

impl UserRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<User> {
        let role: String = row.get(3)?;
        let created_at: String = row.get(6)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            role: enum_column(UserRole::from_db_str(&role), 3)?,
            phone: row.get(4)?,
            is_active: row.get(5)?,
            created_at: parse_ts(&created_at, 6)?,
        })
    }

    pub fn insert(&self, user: &User) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO users (id, email, full_name, role, phone, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                user.id,
                user.email,
                user.full_name,
                user.role.as_str(),
                user.phone,
                user.is_active,
                format_ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, user_id: &str) -> RepositoryResult<Option<User>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, user_id)
    }

    pub fn find_by_id_tx(conn: &Connection, user_id: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let user = conn
            .query_row(&sql, params![user_id], Self::map_row)
            .optional()?;
        Ok(user)
    }

    /// 部分字段更新 (COALESCE 保留未传字段)
    pub fn update_tx(conn: &Connection, user_id: &str, update: &UserUpdate) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE users
               SET full_name = COALESCE(?1, full_name),
                   role = COALESCE(?2, role),
                   phone = COALESCE(?3, phone),
                   is_active = COALESCE(?4, is_active)
               WHERE id = ?5"#,
            params![
                update.full_name,
                update.role.map(|r| r.as_str()),
                update.phone,
                update.is_active,
                user_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("User", user_id));
        }
        Ok(())
    }

    /// 全部人员, 含停用 (按姓名排序)
    pub fn list_all(&self) -> RepositoryResult<Vec<User>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM users ORDER BY full_name", USER_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(users)
    }

    /// 启用的人员 (按姓名排序)
    pub fn list_active_by_role(&self, role: Option<UserRole>) -> RepositoryResult<Vec<User>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM users
               WHERE is_active = 1 AND (?1 IS NULL OR role = ?1)
               ORDER BY full_name"#,
            USER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params![role.map(|r| r.as_str())], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(users)
    }
}
