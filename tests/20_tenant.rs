mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn tenants_never_see_each_others_rows() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let south = app.add_tenant("south");
    let (north_admin, north_member) = app.add_member_with_role(&north, "north_admin", "admin");
    let (south_admin, south_member) = app.add_member_with_role(&south, "south_admin", "admin");
    let north_student = app.add_student(&north, &north_member, "N-001", None);
    let south_student = app.add_student(&south, &south_member, "S-001", None);

    let north_token = app.token(&north_admin, Some(&north), Some("admin"));
    let south_token = app.token(&south_admin, Some(&south), Some("admin"));

    let list = app.get("/v1/students", Some(&north_token)).await?;
    assert_eq!(list.status, StatusCode::OK);
    let ids: Vec<&str> = list.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![north_student.id.to_string()]);

    let cross_get = app
        .get(&format!("/v1/students/{}", south_student.id), Some(&north_token))
        .await?;
    assert_eq!(cross_get.status, StatusCode::NOT_FOUND);

    let cross_delete = app
        .delete(&format!("/v1/students/{}", north_student.id), Some(&south_token))
        .await?;
    assert_eq!(cross_delete.status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.tables().students.len(), 2);

    let members = app.get("/v1/users", Some(&north_token)).await?;
    assert_eq!(members.status, StatusCode::OK);
    let member_tenants: Vec<&str> = members.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["tenant_id"].as_str().unwrap())
        .collect();
    assert_eq!(member_tenants, vec![north.id.to_string()]);

    let cross_member = app
        .get(&format!("/v1/users/{}", south_member.id), Some(&north_token))
        .await?;
    assert_eq!(cross_member.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn request_tenant_must_match_token_tenant() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let south = app.add_tenant("south");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));

    let header = app
        .call(
            Method::GET,
            "/v1/students",
            Some(&token),
            &[("x-tenant-id", south.id.to_string().as_str())],
            None,
        )
        .await?;
    assert_eq!(header.status, StatusCode::FORBIDDEN);
    assert_eq!(header.body["success"], false);

    let query = app
        .get(&format!("/v1/students?tenant_id={}", south.id), Some(&token))
        .await?;
    assert_eq!(query.status, StatusCode::FORBIDDEN);

    let matching = app
        .call(
            Method::GET,
            "/v1/students",
            Some(&token),
            &[("x-tenant-id", north.id.to_string().as_str())],
            None,
        )
        .await?;
    assert_eq!(matching.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn no_tenant_token_is_turned_away_from_tenant_endpoints() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, None, None);

    for uri in ["/v1/users", "/v1/students", "/v1/classes"] {
        let bare = app.get(uri, Some(&token)).await?;
        assert_eq!(bare.status, StatusCode::BAD_REQUEST, "{}", uri);

        let with_header = app
            .call(Method::GET, uri, Some(&token), &[("x-tenant-id", north.id.to_string().as_str())], None)
            .await?;
        assert_eq!(with_header.status, StatusCode::BAD_REQUEST, "{}", uri);
    }
    Ok(())
}

#[tokio::test]
async fn malformed_tenant_ids_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));

    for bad in ["not-a-uuid", "00000000-0000-0000-0000-000000000000"] {
        let response = app
            .call(Method::GET, "/v1/students", Some(&token), &[("x-tenant-id", bad)], None)
            .await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", bad);
        assert_eq!(response.body["message"], "Invalid tenant");
    }
    Ok(())
}

#[tokio::test]
async fn tenant_can_come_from_the_subdomain() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let south = app.add_tenant("south");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));

    let own = app
        .call(
            Method::GET,
            "/v1/classes",
            Some(&token),
            &[("host", format!("{}.school.example:8080", north.id).as_str())],
            None,
        )
        .await?;
    assert_eq!(own.status, StatusCode::OK);

    let other = app
        .call(
            Method::GET,
            "/v1/classes",
            Some(&token),
            &[("host", format!("{}.school.example", south.id).as_str())],
            None,
        )
        .await?;
    assert_eq!(other.status, StatusCode::FORBIDDEN);

    let www = app
        .call(Method::GET, "/v1/classes", Some(&token), &[("host", "www.school.example")], None)
        .await?;
    assert_eq!(www.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tenant_context_is_set_and_cleared_per_request() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));

    let response = app.get("/v1/classes", Some(&token)).await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(*app.tenant_context.sets.lock().unwrap(), vec![north.id]);
    assert_eq!(app.tenant_context.clears.load(Ordering::SeqCst), 1);

    // Public routes never touch it.
    app.get("/v1/health", None).await?;
    assert_eq!(app.tenant_context.sets.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn tenant_context_failure_is_a_server_error() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));
    app.tenant_context.fail.store(true, Ordering::SeqCst);

    let response = app.get("/v1/classes", Some(&token)).await?;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["success"], false);
    Ok(())
}

#[tokio::test]
async fn token_for_a_tenant_without_membership_is_forbidden() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, member) = app.add_member_with_role(&north, "admin", "admin");
    app.add_student(&north, &member, "N-1", None);

    let ghost = app
        .tokens
        .generate(admin.id, Some(Uuid::new_v4()), &admin.username, &admin.email, Some("admin"))?
        .token;
    let response = app.get("/v1/students", Some(&ghost)).await?;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body.get("data").is_none());
    Ok(())
}

#[tokio::test]
async fn deactivated_membership_loses_access_with_an_existing_token() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let (kim, kim_member) = app.add_member_with_role(&north, "kim", "teacher");
    let admin_token = app.token(&admin, Some(&north), Some("admin"));
    let kim_token = app.token(&kim, Some(&north), Some("teacher"));

    let response = app.get("/v1/classes", Some(&kim_token)).await?;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .put(
            &format!("/v1/users/{}", kim_member.id),
            Some(&admin_token),
            json!({"is_active": false}),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/v1/classes", Some(&kim_token)).await?;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "no active membership in this tenant");

    // Self-service still works; only the tenant is closed.
    let response = app.get("/v1/auth/me", Some(&kim_token)).await?;
    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn deactivated_user_loses_access_with_an_existing_token() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let token = app.token(&admin, Some(&north), Some("admin"));

    let response = app.get("/v1/users", Some(&token)).await?;
    assert_eq!(response.status, StatusCode::OK);

    app.store
        .tables()
        .users
        .iter_mut()
        .filter(|u| u.id == admin.id)
        .for_each(|u| u.is_active = false);

    let response = app.get("/v1/users", Some(&token)).await?;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["success"], false);
    Ok(())
}

#[tokio::test]
async fn removed_membership_loses_access_with_an_existing_token() -> Result<()> {
    let app = TestApp::new();
    let north = app.add_tenant("north");
    let (admin, _) = app.add_member_with_role(&north, "admin", "admin");
    let (kim, kim_member) = app.add_member_with_role(&north, "kim", "teacher");
    // A second tenant keeps kim's account alive after the north membership goes.
    let south = app.add_tenant("south");
    app.add_member(&south, &kim);
    let admin_token = app.token(&admin, Some(&north), Some("admin"));
    let kim_token = app.token(&kim, Some(&north), Some("teacher"));

    let response = app.delete(&format!("/v1/users/{}", kim_member.id), Some(&admin_token)).await?;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/v1/students", Some(&kim_token)).await?;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    Ok(())
}
