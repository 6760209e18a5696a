// ==========================================
// 磨粉厂筒仓台账系统 - 主数据 API
// ==========================================
// 职责: 磨机 / 筒仓 / 产品 / 人员
// ==========================================

use std::sync::Arc;

use uuid::Uuid;

use crate::api::current_time;
use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::domain::master::{
    Mill, MillDetail, MillUpdate, NewMill, Product, User, UserStats, UserUpdate,
};
use crate::domain::silo::{NewSilo, Silo, SiloUpdate};
use crate::domain::types::UserRole;
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::master_data::MasterDataManager;
use crate::engine::repositories::LedgerRepositories;

/// 主数据API
pub struct MasterDataApi {
    repos: LedgerRepositories,
    manager: Arc<MasterDataManager>,
    events: OptionalEventPublisher,
}

impl MasterDataApi {
    pub fn new(
        repos: LedgerRepositories,
        manager: Arc<MasterDataManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            repos,
            manager,
            events,
        }
    }

    // ==========================================
    // 磨机
    // ==========================================

    /// 全部磨机 (按编码)
    pub fn list_mills(&self) -> ApiResult<Vec<Mill>> {
        Ok(self.repos.mill_repo.list(false)?)
    }

    pub fn list_active_mills(&self) -> ApiResult<Vec<Mill>> {
        Ok(self.repos.mill_repo.list(true)?)
    }

    /// 磨机详情 (含分级机与所属筒仓)
    pub fn get_mill_detail(&self, mill_id: &str) -> ApiResult<MillDetail> {
        require_non_empty("磨机ID", mill_id)?;
        let mill = self
            .repos
            .mill_repo
            .find_by_id(mill_id)?
            .ok_or_else(|| ApiError::NotFound(format!("磨机(id={})不存在", mill_id)))?;
        let separators = self.repos.mill_repo.list_separators(mill_id)?;
        let silos = self.repos.silo_repo.list(Some(mill_id), false)?;
        Ok(MillDetail {
            mill,
            separators,
            silos,
        })
    }

    /// 新建磨机 (流程图上同时出现默认节点)
    pub fn create_mill(&self, req: NewMill) -> ApiResult<Mill> {
        require_non_empty("磨机编码", &req.code)?;
        require_non_empty("磨机名称", &req.name)?;
        Ok(self.manager.create_mill(req, current_time())?)
    }

    /// 更新磨机
    ///
    /// # 参数
    /// - update: 仅更新 Some 字段
    pub fn update_mill(&self, mill_id: &str, update: MillUpdate) -> ApiResult<Mill> {
        require_non_empty("磨机ID", mill_id)?;
        if update.is_empty() {
            return Err(ApiError::InvalidInput("没有需要更新的字段".to_string()));
        }
        if let Some(name) = &update.name {
            require_non_empty("磨机名称", name)?;
        }
        Ok(self.manager.update_mill(mill_id, update, current_time())?)
    }

    /// 删除磨机 (已有生产记录或所属筒仓时拒绝, 应改为停用)
    pub fn delete_mill(&self, mill_id: &str) -> ApiResult<()> {
        require_non_empty("磨机ID", mill_id)?;
        Ok(self.manager.delete_mill(mill_id, current_time())?)
    }

    // ==========================================
    // 筒仓
    // ==========================================

    /// 新建空筒仓 (流程图上同时出现默认节点)
    pub fn create_silo(&self, req: NewSilo) -> ApiResult<Silo> {
        require_non_empty("筒仓编码", &req.code)?;
        require_non_empty("筒仓名称", &req.name)?;
        Ok(self.manager.create_silo(req, current_time())?)
    }

    /// 更新筒仓基础信息 (容量 / 类型 / 启用等, 不改料位)
    pub fn update_silo(&self, silo_id: &str, update: SiloUpdate) -> ApiResult<Silo> {
        require_non_empty("筒仓ID", silo_id)?;
        if update.is_empty() {
            return Err(ApiError::InvalidInput("没有需要更新的字段".to_string()));
        }
        Ok(self.manager.update_silo(silo_id, update, current_time())?)
    }

    /// 删除筒仓 (已有历史记录时拒绝, 应改为停用)
    pub fn delete_silo(&self, silo_id: &str) -> ApiResult<()> {
        require_non_empty("筒仓ID", silo_id)?;
        Ok(self.manager.delete_silo(silo_id, current_time())?)
    }

    // ==========================================
    // 产品
    // ==========================================

    /// 启用的产品 (按细度)
    pub fn list_products(&self) -> ApiResult<Vec<Product>> {
        Ok(self.repos.product_repo.list_active()?)
    }

    pub fn get_product(&self, product_id: &str) -> ApiResult<Product> {
        require_non_empty("产品ID", product_id)?;
        self.repos
            .product_repo
            .find_by_id(product_id)?
            .ok_or_else(|| ApiError::NotFound(format!("产品(id={})不存在", product_id)))
    }

    // ==========================================
    // 人员
    // ==========================================

    pub fn create_user(
        &self,
        email: &str,
        full_name: &str,
        role: UserRole,
        phone: Option<String>,
    ) -> ApiResult<User> {
        require_non_empty("邮箱", email)?;
        require_non_empty("姓名", full_name)?;
        if !email.contains('@') {
            return Err(ApiError::InvalidInput(format!("邮箱格式不正确: {}", email)));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            full_name: full_name.trim().to_string(),
            role,
            phone,
            is_active: true,
            created_at: current_time(),
        };
        self.repos.user_repo.insert(&user)?;
        tracing::info!(user_id = %user.id, role = role.as_str(), "创建人员");
        self.events
            .publish(ChangeEvent::insert(ChangeTable::Users, &user.id, user.created_at));
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> ApiResult<User> {
        require_non_empty("人员ID", user_id)?;
        self.repos
            .user_repo
            .find_by_id(user_id)?
            .ok_or_else(|| ApiError::NotFound(format!("人员(id={})不存在", user_id)))
    }

    /// 全部人员, 含停用 (按姓名)
    pub fn list_users(&self) -> ApiResult<Vec<User>> {
        Ok(self.repos.user_repo.list_all()?)
    }

    pub fn update_user(&self, user_id: &str, update: UserUpdate) -> ApiResult<User> {
        require_non_empty("人员ID", user_id)?;
        if update.is_empty() {
            return Err(ApiError::InvalidInput("没有需要更新的字段".to_string()));
        }
        Ok(self.manager.update_user(user_id, update, current_time())?)
    }

    /// 停用人员 (软删除)
    pub fn deactivate_user(&self, user_id: &str) -> ApiResult<User> {
        require_non_empty("人员ID", user_id)?;
        Ok(self.manager.deactivate_user(user_id, current_time())?)
    }

    pub fn user_stats(&self) -> ApiResult<UserStats> {
        Ok(self.manager.user_stats()?)
    }

    /// 启用的包装工人
    pub fn list_active_workers(&self) -> ApiResult<Vec<User>> {
        Ok(self.repos.user_repo.list_active_by_role(Some(UserRole::Worker))?)
    }

    pub fn list_active_users(&self) -> ApiResult<Vec<User>> {
        Ok(self.repos.user_repo.list_active_by_role(None)?)
    }
}
