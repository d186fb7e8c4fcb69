//! In-process harness: the real router over in-memory repositories.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

use school_admin_api::auth::{PasswordHasher, TokenService};
use school_admin_api::config::{AppConfig, PasswordConfig};
use school_admin_api::database::models::{
    Class, ClassChanges, MemberChanges, NewClass, NewMember, NewStudent, NewUser, Role, Student,
    StudentChanges, Tenant, TenantMember, TenantUser, User, UserTenant,
};
use school_admin_api::database::{
    ClassRepository, CrudRepository, DbError, ListQuery, MembershipRepository, Repositories, StoreHealth,
    StudentRepository, TenantContext, UserRepository,
};
use school_admin_api::{app, AppState};

pub const SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "correct-horse-battery";

pub fn cheap_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = SECRET.to_string();
    config.app.password = cheap_password_config();
    config
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Tables {
    pub tenants: Vec<Tenant>,
    pub users: Vec<User>,
    pub memberships: Vec<TenantUser>,
    pub roles: Vec<Role>,
    pub member_roles: Vec<(Uuid, Uuid)>,
    pub classes: Vec<Class>,
    pub students: Vec<Student>,
}

impl Tables {
    fn role_names(&self, tenant_user_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .member_roles
            .iter()
            .filter(|(member, _)| *member == tenant_user_id)
            .filter_map(|(_, role)| self.roles.iter().find(|r| r.id == *role))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }

    fn member_view(&self, membership: &TenantUser) -> Option<TenantMember> {
        let user = self.users.iter().find(|u| u.id == membership.user_id)?;
        Some(TenantMember {
            id: membership.id,
            tenant_id: membership.tenant_id,
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            phone: user.phone.clone(),
            is_active: membership.is_active,
            roles: self.role_names(membership.id),
            created_at: membership.created_at,
        })
    }

    fn remove_membership(&mut self, id: Uuid) -> Option<TenantUser> {
        let index = self.memberships.iter().position(|m| m.id == id)?;
        let membership = self.memberships.remove(index);
        self.member_roles.retain(|(member, _)| *member != id);
        self.students.retain(|s| s.tenant_user_id != id);
        let orphaned = !self.memberships.iter().any(|m| m.user_id == membership.user_id);
        if orphaned {
            self.users.retain(|u| u.id != membership.user_id);
        }
        Some(membership)
    }

    fn check_user_unique(&self, username: &str, email: &str) -> Result<(), DbError> {
        if self.users.iter().any(|u| u.username.eq_ignore_ascii_case(username)) {
            return Err(DbError::Conflict("unique constraint users_username_key violated".into()));
        }
        if self.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(DbError::Conflict("unique constraint users_email_key violated".into()));
        }
        Ok(())
    }

    fn insert_user(&mut self, input: &NewUser) -> Result<User, DbError> {
        self.check_user_unique(&input.username, &input.email)?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            full_name: input.full_name.clone(),
            phone: input.phone.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.push(user.clone());
        Ok(user)
    }
}

/// Sort, count and slice like the SQL list queries do.
fn paginate<T, F>(mut items: Vec<T>, query: &ListQuery, default_sort: &str, key: F, id: fn(&T) -> Uuid) -> (Vec<T>, i64)
where
    F: Fn(&T, &str) -> String,
{
    let column = query.sort_by.clone().unwrap_or_else(|| default_sort.to_string());
    items.sort_by(|a, b| key(a, &column).cmp(&key(b, &column)).then(id(a).cmp(&id(b))));
    if query.sort_dir == school_admin_api::database::query_builder::SortDirection::Desc {
        items.reverse();
    }
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.limit as usize)
        .collect();
    (page, total)
}

fn matches_search(query: &ListQuery, fields: &[&str]) -> bool {
    match &query.search {
        None => true,
        Some(search) => {
            let needle = search.to_lowercase();
            fields.iter().any(|field| field.to_lowercase().contains(&needle))
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unhealthy: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            users: Arc::new(self.clone()),
            members: Arc::new(self.clone()),
            students: Arc::new(self.clone()),
            classes: Arc::new(self.clone()),
            health: Arc::new(self.clone()),
        }
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(DbError::Query("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, input: &NewUser) -> Result<User, DbError> {
        self.tables().insert_user(input)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, DbError> {
        self.tables()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(DbError::NotFound("user"))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self.tables().users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let mut tables = self.tables();
        let user = tables.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound("user"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CrudRepository<TenantMember, NewMember, MemberChanges> for MemoryStore {
    /// All-or-nothing, like the transactional implementation.
    async fn create(&self, tenant_id: Uuid, input: &NewMember) -> Result<TenantMember, DbError> {
        let mut tables = self.tables();
        if let Some(role_id) = input.role_id {
            if !tables.roles.iter().any(|r| r.id == role_id && r.tenant_id == tenant_id) {
                return Err(DbError::InvalidReference(format!("role {} not found in tenant", role_id)));
            }
        }
        let user = tables.insert_user(&NewUser {
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            full_name: input.full_name.clone(),
            phone: input.phone.clone(),
        })?;
        let membership = TenantUser {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: user.id,
            is_active: input.is_active,
            created_at: Utc::now(),
        };
        tables.memberships.push(membership.clone());
        if let Some(role_id) = input.role_id {
            tables.member_roles.push((membership.id, role_id));
        }
        tables.member_view(&membership).ok_or(DbError::NotFound("user"))
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<TenantMember, DbError> {
        let tables = self.tables();
        tables
            .memberships
            .iter()
            .find(|m| m.id == id && m.tenant_id == tenant_id)
            .and_then(|m| tables.member_view(m))
            .ok_or(DbError::NotFound("user"))
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &MemberChanges) -> Result<TenantMember, DbError> {
        let mut tables = self.tables();
        if let Some(role_id) = changes.role_id {
            if !tables.roles.iter().any(|r| r.id == role_id && r.tenant_id == tenant_id) {
                return Err(DbError::InvalidReference(format!("role {} not found in tenant", role_id)));
            }
        }
        let index = tables
            .memberships
            .iter()
            .position(|m| m.id == id && m.tenant_id == tenant_id)
            .ok_or(DbError::NotFound("user"))?;
        let user_id = tables.memberships[index].user_id;
        if let Some(is_active) = changes.is_active {
            tables.memberships[index].is_active = is_active;
        }
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            if let Some(full_name) = &changes.full_name {
                user.full_name = full_name.clone();
            }
            if let Some(phone) = &changes.phone {
                user.phone = Some(phone.clone());
            }
        }
        if let Some(role_id) = changes.role_id {
            tables.member_roles.retain(|(member, _)| *member != id);
            tables.member_roles.push((id, role_id));
        }
        let membership = tables.memberships[index].clone();
        tables.member_view(&membership).ok_or(DbError::NotFound("user"))
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        if !tables.memberships.iter().any(|m| m.id == id && m.tenant_id == tenant_id) {
            return Err(DbError::NotFound("user"));
        }
        tables.remove_membership(id);
        Ok(())
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<TenantMember>, i64), DbError> {
        let tables = self.tables();
        let members: Vec<TenantMember> = tables
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .filter_map(|m| tables.member_view(m))
            .filter(|m| matches_search(query, &[&m.username, &m.email, &m.full_name]))
            .collect();
        Ok(paginate(
            members,
            query,
            "created_at",
            |m, column| match column {
                "username" => m.username.clone(),
                "email" => m.email.clone(),
                "full_name" => m.full_name.clone(),
                _ => m.created_at.to_rfc3339(),
            },
            |m| m.id,
        ))
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        Ok(self
            .tables()
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id && ids.contains(&m.id))
            .map(|m| m.id)
            .collect())
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let mut tables = self.tables();
        let targets: Vec<Uuid> = tables
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id && ids.contains(&m.id))
            .map(|m| m.id)
            .collect();
        for id in &targets {
            tables.remove_membership(*id);
        }
        Ok(targets.len() as u64)
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, DbError> {
        let tables = self.tables();
        let mut result: Vec<UserTenant> = tables
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                let tenant = tables.tenants.iter().find(|t| t.id == m.tenant_id)?;
                Some(UserTenant {
                    membership: m.clone(),
                    tenant: tenant.clone(),
                })
            })
            .collect();
        result.sort_by(|a, b| a.tenant.name.cmp(&b.tenant.name));
        Ok(result)
    }

    async fn link_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        is_active: bool,
        role_id: Option<Uuid>,
    ) -> Result<TenantMember, DbError> {
        let mut tables = self.tables();
        if let Some(role_id) = role_id {
            if !tables.roles.iter().any(|r| r.id == role_id && r.tenant_id == tenant_id) {
                return Err(DbError::InvalidReference(format!("role {} not found in tenant", role_id)));
            }
        }
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(DbError::InvalidReference(format!("user {} does not exist", user_id)));
        }
        if tables.memberships.iter().any(|m| m.tenant_id == tenant_id && m.user_id == user_id) {
            return Err(DbError::Conflict("unique constraint tenant_users_tenant_id_user_id_key violated".into()));
        }
        let membership = TenantUser {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            is_active,
            created_at: Utc::now(),
        };
        tables.memberships.push(membership.clone());
        if let Some(role_id) = role_id {
            tables.member_roles.push((membership.id, role_id));
        }
        tables.member_view(&membership).ok_or(DbError::NotFound("user"))
    }

    async fn find_membership(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TenantUser>, DbError> {
        Ok(self
            .tables()
            .memberships
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_membership_by_id(
        &self,
        tenant_id: Uuid,
        tenant_user_id: Uuid,
    ) -> Result<Option<TenantUser>, DbError> {
        Ok(self
            .tables()
            .memberships
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.id == tenant_user_id)
            .cloned())
    }

    async fn role_names(&self, tenant_id: Uuid, tenant_user_id: Uuid) -> Result<Vec<String>, DbError> {
        let tables = self.tables();
        let mut names: Vec<String> = tables
            .member_roles
            .iter()
            .filter(|(member, _)| *member == tenant_user_id)
            .filter_map(|(_, role)| tables.roles.iter().find(|r| r.id == *role && r.tenant_id == tenant_id))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn find_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Option<Role>, DbError> {
        Ok(self
            .tables()
            .roles
            .iter()
            .find(|r| r.id == role_id && r.tenant_id == tenant_id)
            .cloned())
    }
}

#[async_trait]
impl CrudRepository<Student, NewStudent, StudentChanges> for MemoryStore {
    async fn create(&self, tenant_id: Uuid, input: &NewStudent) -> Result<Student, DbError> {
        let mut tables = self.tables();
        if tables
            .students
            .iter()
            .any(|s| s.tenant_id == tenant_id && s.student_number == input.student_number)
        {
            return Err(DbError::Conflict("unique constraint students_tenant_id_student_number_key violated".into()));
        }
        let now = Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            tenant_id,
            tenant_user_id: input.tenant_user_id,
            class_id: input.class_id,
            student_number: input.student_number.clone(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            date_of_birth: input.date_of_birth,
            created_at: now,
            updated_at: now,
        };
        tables.students.push(student.clone());
        Ok(student)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Student, DbError> {
        self.tables()
            .students
            .iter()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
            .cloned()
            .ok_or(DbError::NotFound("student"))
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &StudentChanges) -> Result<Student, DbError> {
        let mut tables = self.tables();
        let student = tables
            .students
            .iter_mut()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
            .ok_or(DbError::NotFound("student"))?;
        if let Some(class_id) = changes.class_id {
            student.class_id = class_id;
        }
        if let Some(number) = &changes.student_number {
            student.student_number = number.clone();
        }
        if let Some(first_name) = &changes.first_name {
            student.first_name = first_name.clone();
        }
        if let Some(last_name) = &changes.last_name {
            student.last_name = last_name.clone();
        }
        if let Some(date_of_birth) = changes.date_of_birth {
            student.date_of_birth = Some(date_of_birth);
        }
        student.updated_at = Utc::now();
        Ok(student.clone())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        let before = tables.students.len();
        tables.students.retain(|s| !(s.id == id && s.tenant_id == tenant_id));
        if tables.students.len() == before {
            return Err(DbError::NotFound("student"));
        }
        Ok(())
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<Student>, i64), DbError> {
        self.list_filtered(tenant_id, query, None).await
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        Ok(self
            .tables()
            .students
            .iter()
            .filter(|s| s.tenant_id == tenant_id && ids.contains(&s.id))
            .map(|s| s.id)
            .collect())
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let mut tables = self.tables();
        let before = tables.students.len();
        tables.students.retain(|s| !(s.tenant_id == tenant_id && ids.contains(&s.id)));
        Ok((before - tables.students.len()) as u64)
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn find_by_student_number(&self, tenant_id: Uuid, student_number: &str) -> Result<Option<Student>, DbError> {
        Ok(self
            .tables()
            .students
            .iter()
            .find(|s| s.tenant_id == tenant_id && s.student_number == student_number)
            .cloned())
    }

    async fn list_by_class(&self, tenant_id: Uuid, class_id: Uuid) -> Result<Vec<Student>, DbError> {
        let mut students: Vec<Student> = self
            .tables()
            .students
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.class_id == Some(class_id))
            .cloned()
            .collect();
        students.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(students)
    }

    async fn list_filtered(
        &self,
        tenant_id: Uuid,
        query: &ListQuery,
        class_id: Option<Uuid>,
    ) -> Result<(Vec<Student>, i64), DbError> {
        let students: Vec<Student> = self
            .tables()
            .students
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| class_id.map_or(true, |c| s.class_id == Some(c)))
            .filter(|s| matches_search(query, &[&s.student_number, &s.first_name, &s.last_name]))
            .cloned()
            .collect();
        Ok(paginate(
            students,
            query,
            "created_at",
            |s, column| match column {
                "student_number" => s.student_number.clone(),
                "first_name" => s.first_name.clone(),
                "last_name" => s.last_name.clone(),
                _ => s.created_at.to_rfc3339(),
            },
            |s| s.id,
        ))
    }
}

#[async_trait]
impl CrudRepository<Class, NewClass, ClassChanges> for MemoryStore {
    async fn create(&self, tenant_id: Uuid, input: &NewClass) -> Result<Class, DbError> {
        let now = Utc::now();
        let class = Class {
            id: Uuid::new_v4(),
            tenant_id,
            code: input.code.clone(),
            name: input.name.clone(),
            grade_level: input.grade_level,
            academic_year: input.academic_year.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables().classes.push(class.clone());
        Ok(class)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Class, DbError> {
        self.tables()
            .classes
            .iter()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
            .cloned()
            .ok_or(DbError::NotFound("class"))
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &ClassChanges) -> Result<Class, DbError> {
        let mut tables = self.tables();
        let class = tables
            .classes
            .iter_mut()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
            .ok_or(DbError::NotFound("class"))?;
        if let Some(code) = &changes.code {
            class.code = code.clone();
        }
        if let Some(name) = &changes.name {
            class.name = name.clone();
        }
        if let Some(grade_level) = changes.grade_level {
            class.grade_level = Some(grade_level);
        }
        if let Some(year) = &changes.academic_year {
            class.academic_year = Some(year.clone());
        }
        class.updated_at = Utc::now();
        Ok(class.clone())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        let before = tables.classes.len();
        tables.classes.retain(|c| !(c.id == id && c.tenant_id == tenant_id));
        if tables.classes.len() == before {
            return Err(DbError::NotFound("class"));
        }
        for student in tables.students.iter_mut().filter(|s| s.class_id == Some(id)) {
            student.class_id = None;
        }
        Ok(())
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<Class>, i64), DbError> {
        let classes: Vec<Class> = self
            .tables()
            .classes
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| matches_search(query, &[&c.code, &c.name]))
            .cloned()
            .collect();
        Ok(paginate(
            classes,
            query,
            "code",
            |c, column| match column {
                "name" => c.name.clone(),
                "grade_level" => format!("{:04}", c.grade_level.unwrap_or(0)),
                "created_at" => c.created_at.to_rfc3339(),
                _ => c.code.clone(),
            },
            |c| c.id,
        ))
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        Ok(self
            .tables()
            .classes
            .iter()
            .filter(|c| c.tenant_id == tenant_id && ids.contains(&c.id))
            .map(|c| c.id)
            .collect())
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let mut tables = self.tables();
        let before = tables.classes.len();
        tables.classes.retain(|c| !(c.tenant_id == tenant_id && ids.contains(&c.id)));
        Ok((before - tables.classes.len()) as u64)
    }
}

#[async_trait]
impl ClassRepository for MemoryStore {
    async fn find_by_code(&self, tenant_id: Uuid, code: &str) -> Result<Option<Class>, DbError> {
        Ok(self
            .tables()
            .classes
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.code.eq_ignore_ascii_case(code))
            .cloned())
    }
}

/// Records set/clear calls; can be told to fail.
#[derive(Default)]
pub struct RecordingTenantContext {
    pub sets: Mutex<Vec<Uuid>>,
    pub clears: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl TenantContext for RecordingTenantContext {
    async fn set(&self, tenant_id: Uuid) -> Result<(), DbError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DbError::TenantContext("connection reset".into()));
        }
        self.sets.lock().unwrap().push(tenant_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), DbError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Application under test
// ---------------------------------------------------------------------------

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: Vec<u8>,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub tenant_context: Arc<RecordingTenantContext>,
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = MemoryStore::default();
        let tenant_context = Arc::new(RecordingTenantContext::default());
        let tokens = TokenService::from_config(&config.jwt).unwrap();
        let hasher = PasswordHasher::new(&config.app.password).unwrap();
        let state = AppState::new(config, store.repositories(), tenant_context.clone()).unwrap();
        Self {
            router: app(state),
            store,
            tenant_context,
            tokens,
            hasher,
        }
    }

    // -- seeding ----------------------------------------------------------

    pub fn add_tenant(&self, name: &str) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: None,
            plan_id: None,
            subscription_status: "active".to_string(),
            created_at: Utc::now(),
            created_by: None,
        };
        self.store.tables().tenants.push(tenant.clone());
        tenant
    }

    pub fn add_user(&self, username: &str, email: &str, password: &str, is_active: bool) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: self.hasher.hash(password).unwrap(),
            full_name: format!("{} Example", username),
            phone: None,
            is_active,
            created_at: now,
            updated_at: now,
        };
        self.store.tables().users.push(user.clone());
        user
    }

    pub fn add_member(&self, tenant: &Tenant, user: &User) -> TenantUser {
        let membership = TenantUser {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            user_id: user.id,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.tables().memberships.push(membership.clone());
        membership
    }

    pub fn add_role(&self, tenant: &Tenant, name: &str) -> Role {
        let role = Role {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            name: name.to_string(),
            description: None,
        };
        self.store.tables().roles.push(role.clone());
        role
    }

    pub fn assign_role(&self, membership: &TenantUser, role: &Role) {
        self.store.tables().member_roles.push((membership.id, role.id));
    }

    /// User + membership + role in one go.
    pub fn add_member_with_role(&self, tenant: &Tenant, username: &str, role: &str) -> (User, TenantUser) {
        let user = self.add_user(username, &format!("{}@{}.test", username, tenant.name), PASSWORD, true);
        let membership = self.add_member(tenant, &user);
        let role = self.add_role(tenant, role);
        self.assign_role(&membership, &role);
        (user, membership)
    }

    pub fn add_class(&self, tenant: &Tenant, code: &str) -> Class {
        let now = Utc::now();
        let class = Class {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            code: code.to_string(),
            name: format!("Class {}", code),
            grade_level: Some(7),
            academic_year: Some("2025/2026".to_string()),
            created_at: now,
            updated_at: now,
        };
        self.store.tables().classes.push(class.clone());
        class
    }

    pub fn add_student(&self, tenant: &Tenant, membership: &TenantUser, number: &str, class: Option<&Class>) -> Student {
        let now = Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            tenant_user_id: membership.id,
            class_id: class.map(|c| c.id),
            student_number: number.to_string(),
            first_name: "Sam".to_string(),
            last_name: format!("Student{}", number),
            date_of_birth: NaiveDate::from_ymd_opt(2012, 5, 17),
            created_at: now,
            updated_at: now,
        };
        self.store.tables().students.push(student.clone());
        student
    }

    // -- tokens -----------------------------------------------------------

    pub fn token(&self, user: &User, tenant: Option<&Tenant>, role: Option<&str>) -> String {
        self.tokens
            .generate(user.id, tenant.map(|t| t.id), &user.username, &user.email, role)
            .unwrap()
            .token
    }

    // -- requests ---------------------------------------------------------

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap_or(Value::Null)
        };
        Ok(TestResponse {
            status,
            headers,
            raw,
            body,
        })
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::GET, uri, token, &[], None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
        self.call(Method::POST, uri, token, &[], Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
        self.call(Method::PUT, uri, token, &[], Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::DELETE, uri, token, &[], None).await
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string())))
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// JSON logs, like production, captured for the current thread.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(buffer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
