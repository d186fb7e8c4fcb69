use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::crud::{self, check_sort, field_error, BulkDeleteResult};
use crate::context::TenantScope;
use crate::database::models::{NewStudent, Student, StudentChanges, StudentFilter, STUDENT_COLUMNS};
use crate::database::query_builder::{ListQuery, Page};
use crate::database::repository::{ClassRepository, MembershipRepository, StudentRepository};
use crate::database::DbError;
use crate::error::ApiError;

#[derive(Clone)]
pub struct StudentService {
    students: Arc<dyn StudentRepository>,
    members: Arc<dyn MembershipRepository>,
    classes: Arc<dyn ClassRepository>,
}

impl StudentService {
    pub fn new(
        students: Arc<dyn StudentRepository>,
        members: Arc<dyn MembershipRepository>,
        classes: Arc<dyn ClassRepository>,
    ) -> Self {
        Self {
            students,
            members,
            classes,
        }
    }

    pub async fn list(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
        filter: &StudentFilter,
    ) -> Result<Page<Student>, ApiError> {
        check_sort(&STUDENT_COLUMNS, query)?;
        let (items, total) = self
            .students
            .list_filtered(scope.tenant_id(), query, filter.class_id)
            .await?;
        Ok(Page::new(items, query, total))
    }

    pub async fn get(&self, scope: &TenantScope, id: Uuid) -> Result<Student, ApiError> {
        Ok(self.students.get_by_id(scope.tenant_id(), id).await?)
    }

    pub async fn get_by_student_number(&self, scope: &TenantScope, student_number: &str) -> Result<Student, ApiError> {
        self.students
            .find_by_student_number(scope.tenant_id(), student_number)
            .await?
            .ok_or_else(|| ApiError::not_found("student not found"))
    }

    pub async fn create(&self, scope: &TenantScope, input: NewStudent) -> Result<Student, ApiError> {
        let tenant_id = scope.tenant_id();
        let input = NewStudent {
            student_number: input.student_number.trim().to_string(),
            ..input
        };

        self.require_member(scope, input.tenant_user_id).await?;
        if let Some(class_id) = input.class_id {
            self.require_class(scope, class_id).await?;
        }
        self.require_unique_number(scope, &input.student_number, None).await?;

        let student = self.students.create(tenant_id, &input).await?;
        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            student_id = %student.id,
            student_number = %student.student_number,
            "student created"
        );
        Ok(student)
    }

    pub async fn update(&self, scope: &TenantScope, id: Uuid, changes: StudentChanges) -> Result<Student, ApiError> {
        let tenant_id = scope.tenant_id();
        let changes = StudentChanges {
            student_number: changes.student_number.map(|n| n.trim().to_string()),
            ..changes
        };

        let current = self.students.get_by_id(tenant_id, id).await?;
        if let Some(class_id) = changes.class_id.flatten().filter(|c| Some(*c) != current.class_id) {
            self.require_class(scope, class_id).await?;
        }
        if let Some(number) = changes
            .student_number
            .as_deref()
            .filter(|n| *n != current.student_number)
        {
            self.require_unique_number(scope, number, Some(id)).await?;
        }

        let student = self.students.update(tenant_id, id, &changes).await?;
        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            student_id = %id,
            "student updated"
        );
        Ok(student)
    }

    pub async fn delete(&self, scope: &TenantScope, id: Uuid) -> Result<(), ApiError> {
        self.students.delete(scope.tenant_id(), id).await?;
        info!(
            request_id = %scope.request_id(),
            tenant_id = %scope.tenant_id(),
            user_id = %scope.user_id(),
            student_id = %id,
            "student deleted"
        );
        Ok(())
    }

    pub async fn bulk_delete(&self, scope: &TenantScope, ids: &[Uuid]) -> Result<BulkDeleteResult, ApiError> {
        crud::bulk_delete::<_, Student, NewStudent, StudentChanges>(&*self.students, scope, "students", ids).await
    }

    /// The student's account must be an active member of this tenant.
    async fn require_member(&self, scope: &TenantScope, tenant_user_id: Uuid) -> Result<(), ApiError> {
        match self
            .members
            .find_membership_by_id(scope.tenant_id(), tenant_user_id)
            .await?
        {
            Some(member) if member.is_active => Ok(()),
            Some(_) => {
                warn!(
                    request_id = %scope.request_id(),
                    tenant_id = %scope.tenant_id(),
                    %tenant_user_id,
                    "student references an inactive member"
                );
                Err(field_error("tenant_user_id", "member is inactive"))
            }
            None => {
                warn!(
                    request_id = %scope.request_id(),
                    tenant_id = %scope.tenant_id(),
                    %tenant_user_id,
                    "student references a member outside the tenant"
                );
                Err(field_error("tenant_user_id", "not a member of this tenant"))
            }
        }
    }

    async fn require_class(&self, scope: &TenantScope, class_id: Uuid) -> Result<(), ApiError> {
        match self.classes.get_by_id(scope.tenant_id(), class_id).await {
            Ok(_) => Ok(()),
            Err(DbError::NotFound(_)) => {
                warn!(
                    request_id = %scope.request_id(),
                    tenant_id = %scope.tenant_id(),
                    %class_id,
                    "student references an unknown class"
                );
                Err(field_error("class_id", "class not found in this tenant"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn require_unique_number(
        &self,
        scope: &TenantScope,
        student_number: &str,
        except: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let existing = self
            .students
            .find_by_student_number(scope.tenant_id(), student_number)
            .await?;
        match existing {
            Some(student) if Some(student.id) != except => {
                warn!(
                    request_id = %scope.request_id(),
                    tenant_id = %scope.tenant_id(),
                    %student_number,
                    "duplicate student number"
                );
                Err(ApiError::conflict(format!("student number {} already exists", student_number)))
            }
            _ => Ok(()),
        }
    }
}
