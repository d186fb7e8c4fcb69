use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::crud::{self, check_sort, BulkDeleteResult};
use crate::context::TenantScope;
use crate::database::models::{Class, ClassChanges, NewClass, Student, CLASS_COLUMNS};
use crate::database::query_builder::{ListQuery, Page};
use crate::database::repository::{ClassRepository, StudentRepository};
use crate::error::ApiError;

#[derive(Clone)]
pub struct ClassService {
    classes: Arc<dyn ClassRepository>,
    students: Arc<dyn StudentRepository>,
}

impl ClassService {
    pub fn new(classes: Arc<dyn ClassRepository>, students: Arc<dyn StudentRepository>) -> Self {
        Self { classes, students }
    }

    pub async fn list(&self, scope: &TenantScope, query: &ListQuery) -> Result<Page<Class>, ApiError> {
        check_sort(&CLASS_COLUMNS, query)?;
        let (items, total) = self.classes.list(scope.tenant_id(), query).await?;
        Ok(Page::new(items, query, total))
    }

    pub async fn get(&self, scope: &TenantScope, id: Uuid) -> Result<Class, ApiError> {
        Ok(self.classes.get_by_id(scope.tenant_id(), id).await?)
    }

    /// Students assigned to one class, by name.
    pub async fn students(&self, scope: &TenantScope, id: Uuid) -> Result<Vec<Student>, ApiError> {
        let class = self.classes.get_by_id(scope.tenant_id(), id).await?;
        Ok(self.students.list_by_class(scope.tenant_id(), class.id).await?)
    }

    pub async fn create(&self, scope: &TenantScope, input: NewClass) -> Result<Class, ApiError> {
        let tenant_id = scope.tenant_id();
        let input = NewClass {
            code: input.code.trim().to_string(),
            ..input
        };
        self.require_unique_code(scope, &input.code, None).await?;

        let class = self.classes.create(tenant_id, &input).await?;
        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            class_id = %class.id,
            code = %class.code,
            "class created"
        );
        Ok(class)
    }

    pub async fn update(&self, scope: &TenantScope, id: Uuid, changes: ClassChanges) -> Result<Class, ApiError> {
        let tenant_id = scope.tenant_id();
        let changes = ClassChanges {
            code: changes.code.map(|c| c.trim().to_string()),
            ..changes
        };

        let current = self.classes.get_by_id(tenant_id, id).await?;
        if let Some(code) = changes.code.as_deref().filter(|c| !c.eq_ignore_ascii_case(&current.code)) {
            self.require_unique_code(scope, code, Some(id)).await?;
        }

        let class = self.classes.update(tenant_id, id, &changes).await?;
        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            class_id = %id,
            "class updated"
        );
        Ok(class)
    }

    /// Students of a deleted class become unassigned.
    pub async fn delete(&self, scope: &TenantScope, id: Uuid) -> Result<(), ApiError> {
        self.classes.delete(scope.tenant_id(), id).await?;
        info!(
            request_id = %scope.request_id(),
            tenant_id = %scope.tenant_id(),
            user_id = %scope.user_id(),
            class_id = %id,
            "class deleted"
        );
        Ok(())
    }

    pub async fn bulk_delete(&self, scope: &TenantScope, ids: &[Uuid]) -> Result<BulkDeleteResult, ApiError> {
        crud::bulk_delete::<_, Class, NewClass, ClassChanges>(&*self.classes, scope, "classes", ids).await
    }

    async fn require_unique_code(&self, scope: &TenantScope, code: &str, except: Option<Uuid>) -> Result<(), ApiError> {
        match self.classes.find_by_code(scope.tenant_id(), code).await? {
            Some(class) if Some(class.id) != except => {
                warn!(
                    request_id = %scope.request_id(),
                    tenant_id = %scope.tenant_id(),
                    %code,
                    "duplicate class code"
                );
                Err(ApiError::conflict(format!("class code {} already exists", code)))
            }
            _ => Ok(()),
        }
    }
}
