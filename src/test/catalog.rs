#[cfg(test)]
mod tests {
    use crate::db::{
        count_courses, create_course, delete_course, get_course, list_courses, update_course,
    };
    use crate::error::AppError;
    use crate::models::Program;
    use crate::test::utils::test_client::{
        create_standard_test_db, login_test_user, setup_test_client,
    };
    use rocket::http::{ContentType, Status};
    use rocket::tokio;
    use serde_json::json;

    #[rocket::async_test]
    async fn test_delete_course_requires_correct_password() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let course_id = test_db
            .course_id("Electrical Installation and Maintenance")
            .expect("Course not found");

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        let response = client
            .delete(format!("/api/courses/regular/{}", course_id))
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(json!({ "password": "wrong_password" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);

        // No row removed on a password mismatch
        let count = count_courses(&test_db.pool, Program::Regular, None, true)
            .await
            .expect("Count should load");
        assert_eq!(count, 1);

        let response = client
            .delete(format!("/api/courses/regular/{}", course_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(json!({ "password": "password123" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let count = count_courses(&test_db.pool, Program::Regular, None, true)
            .await
            .expect("Count should load");
        assert_eq!(count, 0);
    }

    #[rocket::async_test]
    async fn test_delete_checklist_item_requires_correct_password() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let item_id = test_db
            .checklist_item_id("Birth Certificate")
            .expect("Checklist item not found");

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        let response = client
            .delete(format!("/api/checklist/{}", item_id))
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(json!({ "password": "wrong_password" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);

        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checklist_items WHERE id = ?")
                .bind(item_id)
                .fetch_one(&test_db.pool)
                .await
                .expect("Count should load");
        assert_eq!(count, 1, "Row must survive a failed password check");

        let response = client
            .delete(format!("/api/checklist/{}", item_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(json!({ "password": "password123" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checklist_items WHERE id = ?")
                .bind(item_id)
                .fetch_one(&test_db.pool)
                .await
                .expect("Count should load");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_course_crud_roundtrip() {
        let test_db = crate::test::utils::test_db::TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");

        let course_id = create_course(
            &test_db.pool,
            Program::Regular,
            "Plumbing",
            Some("NC I"),
            "Basic plumbing qualification",
            true,
        )
        .await
        .expect("Create should succeed");

        let course = get_course(&test_db.pool, Program::Regular, course_id)
            .await
            .expect("Course should exist");
        assert_eq!(course.name, "Plumbing");
        assert_eq!(course.nc_level.as_deref(), Some("NC I"));
        assert!(course.is_active);

        update_course(
            &test_db.pool,
            Program::Regular,
            course_id,
            "Plumbing",
            Some("NC II"),
            "Upgraded qualification",
            false,
        )
        .await
        .expect("Update should succeed");

        let course = get_course(&test_db.pool, Program::Regular, course_id)
            .await
            .expect("Course should exist");
        assert_eq!(course.nc_level.as_deref(), Some("NC II"));
        assert!(!course.is_active);

        delete_course(&test_db.pool, Program::Regular, course_id)
            .await
            .expect("Delete should succeed");

        let result = get_course(&test_db.pool, Program::Regular, course_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = delete_course(&test_db.pool, Program::Regular, course_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_inactive_courses_hidden_by_default() {
        let test_db = crate::test::utils::test_db::TestDbBuilder::new()
            .course(Program::Regular, "Carpentry", Some("NC II"))
            .inactive_course(Program::Regular, "Typewriting")
            .build()
            .await
            .expect("Failed to build test database");

        let visible = list_courses(&test_db.pool, Program::Regular, None, false, 1, 10)
            .await
            .expect("List should load");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Carpentry");

        let all = list_courses(&test_db.pool, Program::Regular, None, true, 1, 10)
            .await
            .expect("List should load");
        assert_eq!(all.len(), 2);
    }

    #[rocket::async_test]
    async fn test_registrar_cannot_manage_catalog() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let course_id = test_db
            .course_id("Electrical Installation and Maintenance")
            .expect("Course not found");

        let cookies = login_test_user(&client, "registrar_user", "password123").await;

        let response = client
            .post("/api/courses/regular")
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(json!({ "name": "Cookery" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .delete(format!("/api/courses/regular/{}", course_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(json!({ "password": "password123" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Forbidden);
    }
}
