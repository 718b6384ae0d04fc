#[cfg(test)]
mod tests {
    use crate::auth::{Role, User};
    use crate::db::{
        approve_student, complete_student, get_student, get_student_applications, reject_student,
    };
    use crate::error::AppError;
    use crate::models::{CourseAssignment, EnrollmentStatus, Program};
    use crate::test::utils::test_client::{
        create_standard_test_db, login_test_user, setup_test_client,
    };
    use crate::test::utils::test_db::TestDbBuilder;
    use chrono::NaiveDate;
    use rocket::http::{ContentType, Status};
    use rocket::tokio;
    use serde_json::json;

    fn reviewer() -> User {
        User {
            id: 0,
            username: "reviewer".to_string(),
            role: Role::Admin,
            display_name: "Reviewer".to_string(),
            archived: false,
        }
    }

    fn assignment(course: &str) -> CourseAssignment {
        CourseAssignment {
            course: course.to_string(),
            nc_level: "NC II".to_string(),
            adviser: "R. Santos".to_string(),
            training_start: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            training_end: NaiveDate::from_ymd_opt(2025, 6, 27).unwrap(),
        }
    }

    async fn pending_student_db(program: Program) -> (crate::test::utils::test_db::TestDb, i64) {
        let test_db = TestDbBuilder::new()
            .course(program, "Electrical Installation and Maintenance", Some("NC II"))
            .student_with_status(
                program,
                "ABC-23-016-03114-010",
                "Juan",
                "Dela Cruz",
                EnrollmentStatus::Pending,
                Some("Electrical Installation and Maintenance"),
            )
            .build()
            .await
            .expect("Failed to build test database");

        let student_id = test_db
            .student_id("ABC-23-016-03114-010")
            .expect("Student not found");

        (test_db, student_id)
    }

    #[tokio::test]
    async fn test_approve_pending_student() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("Approval should succeed");

        let student = get_student(&test_db.pool, Program::Regular, student_id)
            .await
            .expect("Student should exist");

        assert_eq!(student.status, EnrollmentStatus::Approved);
        assert_eq!(
            student.course.as_deref(),
            Some("Electrical Installation and Maintenance")
        );
        assert_eq!(student.nc_level.as_deref(), Some("NC II"));
        assert_eq!(student.adviser.as_deref(), Some("R. Santos"));
        assert!(student.training_start.is_some());
        assert!(student.training_end.is_some());
        assert_eq!(student.approved_by.as_deref(), Some("reviewer"));
        assert!(student.approved_at.is_some());

        // The pending application row is mirrored in the same transaction
        let applications = get_student_applications(&test_db.pool, Program::Regular, student_id)
            .await
            .expect("Applications should load");
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0].status, EnrollmentStatus::Approved);
        assert_eq!(applications[0].reviewed_by.as_deref(), Some("reviewer"));
        assert!(applications[0].reviewed_at.is_some());
    }

    #[tokio::test]
    async fn test_approve_rejects_non_pending_status() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("First approval should succeed");

        let result = approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await;

        match result {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("approved"), "Unexpected message: {}", msg)
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cannot_complete_pending_student() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        let result =
            complete_student(&test_db.pool, Program::Regular, student_id, &reviewer()).await;

        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "Pending registrations must not be completable"
        );

        let status = test_db
            .student_status(Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "pending", "Failed completion must not write");
    }

    #[tokio::test]
    async fn test_complete_approved_student() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("Approval should succeed");

        complete_student(&test_db.pool, Program::Regular, student_id, &reviewer())
            .await
            .expect("Completion should succeed");

        let status = test_db
            .student_status(Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "completed");

        let app_statuses = test_db
            .application_statuses(Program::Regular, student_id)
            .await
            .expect("Applications should load");
        assert_eq!(app_statuses, vec!["completed".to_string()]);
    }

    #[tokio::test]
    async fn test_reject_approved_student_rejects_applications() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("Approval should succeed");

        reject_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            Some("Incomplete documents"),
            &reviewer(),
        )
        .await
        .expect("Rejection should succeed");

        let student = get_student(&test_db.pool, Program::Regular, student_id)
            .await
            .expect("Student should exist");
        assert_eq!(student.status, EnrollmentStatus::Rejected);
        assert_eq!(student.remarks.as_deref(), Some("Incomplete documents"));

        let app_statuses = test_db
            .application_statuses(Program::Regular, student_id)
            .await
            .expect("Applications should load");
        assert_eq!(
            app_statuses,
            vec!["rejected".to_string()],
            "The approved application row must be rejected in the same transaction"
        );
    }

    #[tokio::test]
    async fn test_reject_completed_student_fails() {
        let (test_db, student_id) = pending_student_db(Program::Regular).await;

        approve_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("Approval should succeed");
        complete_student(&test_db.pool, Program::Regular, student_id, &reviewer())
            .await
            .expect("Completion should succeed");

        let result = reject_student(
            &test_db.pool,
            Program::Regular,
            student_id,
            None,
            &reviewer(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));

        let status = test_db
            .student_status(Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn test_shortcourse_family_uses_same_state_machine() {
        let (test_db, student_id) = pending_student_db(Program::ShortCourse).await;

        let result =
            complete_student(&test_db.pool, Program::ShortCourse, student_id, &reviewer()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        approve_student(
            &test_db.pool,
            Program::ShortCourse,
            student_id,
            &assignment("Electrical Installation and Maintenance"),
            &reviewer(),
        )
        .await
        .expect("Approval should succeed");

        complete_student(&test_db.pool, Program::ShortCourse, student_id, &reviewer())
            .await
            .expect("Completion should succeed");

        // The regular-family table is untouched
        let regular_count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
                .fetch_one(&test_db.pool)
                .await
                .expect("Count should load");
        assert_eq!(regular_count, 0);
    }

    #[rocket::async_test]
    async fn test_approve_endpoint_success() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let student_id = test_db
            .student_id("ABC-23-016-03114-001")
            .expect("Student not found");

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        let response = client
            .post(format!("/api/enrollment/regular/{}/approve", student_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(
                json!({
                    "course": "Electrical Installation and Maintenance",
                    "nc_level": "NC II",
                    "adviser": "R. Santos",
                    "training_start": "2025-01-06",
                    "training_end": "2025-06-27"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let status = test_db
            .student_status(crate::models::Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "approved");
    }

    #[rocket::async_test]
    async fn test_approve_endpoint_requires_assignment_fields() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let student_id = test_db
            .student_id("ABC-23-016-03114-001")
            .expect("Student not found");

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        // Empty course and adviser, malformed NC level
        let response = client
            .post(format!("/api/enrollment/regular/{}/approve", student_id))
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(
                json!({
                    "course": "",
                    "nc_level": "NC 2",
                    "adviser": "",
                    "training_start": "2025-01-06",
                    "training_end": "2025-06-27"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        // Missing fields entirely
        let response = client
            .post(format!("/api/enrollment/regular/{}/approve", student_id))
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(json!({ "course": "Electrical Installation and Maintenance" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        // End date before start date
        let response = client
            .post(format!("/api/enrollment/regular/{}/approve", student_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(
                json!({
                    "course": "Electrical Installation and Maintenance",
                    "nc_level": "NC II",
                    "adviser": "R. Santos",
                    "training_start": "2025-06-27",
                    "training_end": "2025-01-06"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        // None of the failed attempts may have written anything
        let status = test_db
            .student_status(crate::models::Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "pending");
    }

    #[rocket::async_test]
    async fn test_reject_endpoint() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let student_id = test_db
            .student_id("ABC-23-016-03114-002")
            .expect("Student not found");

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        let response = client
            .post(format!("/api/enrollment/regular/{}/reject", student_id))
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(json!({ "remarks": "Did not show up" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let status = test_db
            .student_status(crate::models::Program::Regular, student_id)
            .await
            .expect("Status should load");
        assert_eq!(status, "rejected");

        let app_statuses = test_db
            .application_statuses(crate::models::Program::Regular, student_id)
            .await
            .expect("Applications should load");
        assert!(app_statuses.iter().all(|s| s == "rejected"));
    }

    #[rocket::async_test]
    async fn test_walk_in_registration_endpoint() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let cookies = login_test_user(&client, "admin_user", "password123").await;

        let response = client
            .post("/api/enrollment/regular")
            .header(ContentType::JSON)
            .cookies(cookies.clone())
            .body(
                json!({
                    "uli": "XYZ-25-016-03114-009",
                    "first_name": "Ana",
                    "last_name": "Lim",
                    "email": "ana@example.com",
                    "course_name": "Electrical Installation and Maintenance"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        // Malformed ULI is refused
        let response = client
            .post("/api/enrollment/regular")
            .header(ContentType::JSON)
            .cookies(cookies)
            .body(
                json!({
                    "uli": "not-a-uli",
                    "first_name": "Ana",
                    "last_name": "Lim"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM students WHERE uli = 'XYZ-25-016-03114-009'",
        )
        .fetch_one(&test_db.pool)
        .await
        .expect("Count should load");
        assert_eq!(count, 1);
    }
}
