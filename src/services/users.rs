use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthError, AuthService, TokenResponse},
    entities::{user, Role},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: user::Model,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    /// Self-service sign-up; the account always starts as CUSTOMER
    pub async fn register(&self, input: RegisterUser) -> Result<user::Model, ServiceError> {
        self.create_user(input, Role::Customer).await
    }

    #[instrument(skip(self, input), fields(role = %role))]
    pub async fn create_user(
        &self,
        input: RegisterUser,
        role: Role,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let email = normalize_email(&input.email);

        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!(
                "An account with email {} already exists",
                email
            )));
        }

        let password_hash = self.auth.hash_password(&input.password)?;
        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(role),
            phone: Set(input.phone),
            address: Set(input.address),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(user_id = %created.id, "User account created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn login(&self, input: LoginRequest) -> Result<LoginResponse, ServiceError> {
        input.validate()?;
        let email = normalize_email(&input.email);
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.auth.verify_password(&input.password, &found.password_hash)?;
        if !found.is_active {
            warn!(user_id = %found.id, "Login attempt on disabled account");
            return Err(ServiceError::Forbidden);
        }

        let token = self.auth.generate_token(&found)?;
        Ok(LoginResponse { token, user: found })
    }

    pub async fn get(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        input: UpdateProfile,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let found = self.get(id).await?;

        let mut active: user::ActiveModel = found.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }
        if let Some(password) = input.password {
            active.password_hash = Set(self.auth.hash_password(&password)?);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn list(
        &self,
        filter: UserFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<user::Model>, u64), ServiceError> {
        let mut query = user::Entity::find().order_by_asc(user::Column::Email);
        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                user::Column::Name
                    .contains(search)
                    .or(user::Column::Email.contains(search)),
            );
        }
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Admin operation; an admin cannot change their own role
    #[instrument(skip(self), fields(target = %target_id, role = %role))]
    pub async fn change_role(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        role: Role,
    ) -> Result<user::Model, ServiceError> {
        if actor_id == target_id {
            return Err(ServiceError::BadRequest(
                "Administrators cannot change their own role".to_string(),
            ));
        }
        let found = self.get(target_id).await?;
        let mut active: user::ActiveModel = found.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Admin operation; an admin cannot deactivate themselves
    #[instrument(skip(self), fields(target = %target_id, active = is_active))]
    pub async fn set_active(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        is_active: bool,
    ) -> Result<user::Model, ServiceError> {
        if actor_id == target_id && !is_active {
            return Err(ServiceError::BadRequest(
                "Administrators cannot deactivate their own account".to_string(),
            ));
        }
        let found = self.get(target_id).await?;
        let mut active: user::ActiveModel = found.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}
