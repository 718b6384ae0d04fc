#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::auth::User;
    use crate::db::{
        approve_student, complete_student, create_checklist_item, create_course, create_user,
        insert_course_application, insert_student, reject_student,
    };
    use crate::error::AppError;
    use crate::models::{CourseAssignment, EnrollmentStatus, Program};
    use chrono::NaiveDate;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        students: Vec<TestStudent>,
        courses: Vec<TestCourse>,
        checklist_items: Vec<TestChecklistItem>,
    }

    pub struct TestUser {
        pub username: String,
        pub display_name: Option<String>,
        pub role: Role,
        pub password: String,
    }

    pub struct TestStudent {
        pub program: Program,
        pub uli: String,
        pub first_name: String,
        pub last_name: String,
        pub email: String,
        pub status: EnrollmentStatus,
        pub applied_course: Option<String>,
    }

    pub struct TestCourse {
        pub program: Program,
        pub name: String,
        pub nc_level: Option<String>,
        pub is_active: bool,
    }

    pub struct TestChecklistItem {
        pub name: String,
        pub is_required: bool,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn registrar(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Registrar,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn admin(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn student(mut self, program: Program, uli: &str, first_name: &str, last_name: &str) -> Self {
            self.students.push(TestStudent {
                program,
                uli: uli.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: format!("{}@example.com", first_name.to_lowercase()),
                status: EnrollmentStatus::Pending,
                applied_course: None,
            });
            self
        }

        pub fn student_with_status(
            mut self,
            program: Program,
            uli: &str,
            first_name: &str,
            last_name: &str,
            status: EnrollmentStatus,
            applied_course: Option<&str>,
        ) -> Self {
            self.students.push(TestStudent {
                program,
                uli: uli.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: format!("{}@example.com", first_name.to_lowercase()),
                status,
                applied_course: applied_course.map(String::from),
            });
            self
        }

        pub fn course(mut self, program: Program, name: &str, nc_level: Option<&str>) -> Self {
            self.courses.push(TestCourse {
                program,
                name: name.to_string(),
                nc_level: nc_level.map(String::from),
                is_active: true,
            });
            self
        }

        pub fn inactive_course(mut self, program: Program, name: &str) -> Self {
            self.courses.push(TestCourse {
                program,
                name: name.to_string(),
                nc_level: None,
                is_active: false,
            });
            self
        }

        pub fn checklist_item(mut self, name: &str, is_required: bool) -> Self {
            self.checklist_items.push(TestChecklistItem {
                name: name.to_string(),
                is_required,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut student_id_map: HashMap<String, i64> = HashMap::new();
            let mut course_id_map: HashMap<String, i64> = HashMap::new();
            let mut checklist_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    &user.username,
                    &user.password,
                    user.role.as_str(),
                    user.display_name.as_deref(),
                )
                .await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for course in &self.courses {
                let course_id = create_course(
                    &pool,
                    course.program,
                    &course.name,
                    course.nc_level.as_deref(),
                    "",
                    course.is_active,
                )
                .await?;

                course_id_map.insert(course.name.clone(), course_id);
            }

            for item in &self.checklist_items {
                let item_id = create_checklist_item(&pool, &item.name, "", item.is_required).await?;

                checklist_id_map.insert(item.name.clone(), item_id);
            }

            let reviewer = User {
                id: 0,
                username: "system".to_string(),
                role: Role::Admin,
                display_name: "System".to_string(),
                archived: false,
            };

            for student in &self.students {
                let student_id = insert_student(
                    &pool,
                    student.program,
                    &student.uli,
                    &student.first_name,
                    &student.last_name,
                    &student.email,
                    "",
                    "",
                    None,
                )
                .await?;

                if let Some(course_name) = &student.applied_course {
                    let course_id = course_id_map.get(course_name).copied();
                    insert_course_application(
                        &pool,
                        student.program,
                        student_id,
                        course_id,
                        course_name,
                    )
                    .await?;
                }

                let assignment = CourseAssignment {
                    course: student
                        .applied_course
                        .clone()
                        .unwrap_or_else(|| "Electrical Installation and Maintenance".to_string()),
                    nc_level: "NC II".to_string(),
                    adviser: "R. Santos".to_string(),
                    training_start: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
                    training_end: NaiveDate::from_ymd_opt(2025, 6, 27).unwrap(),
                };

                match student.status {
                    EnrollmentStatus::Pending => {}
                    EnrollmentStatus::Approved => {
                        approve_student(&pool, student.program, student_id, &assignment, &reviewer)
                            .await?;
                    }
                    EnrollmentStatus::Completed => {
                        approve_student(&pool, student.program, student_id, &assignment, &reviewer)
                            .await?;
                        complete_student(&pool, student.program, student_id, &reviewer).await?;
                    }
                    EnrollmentStatus::Rejected => {
                        reject_student(&pool, student.program, student_id, None, &reviewer).await?;
                    }
                }

                student_id_map.insert(student.uli.clone(), student_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                student_id_map,
                course_id_map,
                checklist_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub student_id_map: HashMap<String, i64>,
        pub course_id_map: HashMap<String, i64>,
        pub checklist_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn student_id(&self, uli: &str) -> Option<i64> {
            self.student_id_map.get(uli).copied()
        }

        pub fn course_id(&self, name: &str) -> Option<i64> {
            self.course_id_map.get(name).copied()
        }

        pub fn checklist_item_id(&self, name: &str) -> Option<i64> {
            self.checklist_id_map.get(name).copied()
        }

        pub async fn student_status(
            &self,
            program: Program,
            student_id: i64,
        ) -> Result<String, sqlx::Error> {
            let sql = format!(
                "SELECT status FROM {} WHERE id = ?",
                program.students_table()
            );
            sqlx::query_scalar::<_, String>(&sql)
                .bind(student_id)
                .fetch_one(&self.pool)
                .await
        }

        pub async fn application_statuses(
            &self,
            program: Program,
            student_id: i64,
        ) -> Result<Vec<String>, sqlx::Error> {
            let sql = format!(
                "SELECT status FROM {} WHERE student_id = ? ORDER BY id",
                program.applications_table()
            );
            sqlx::query_scalar::<_, String>(&sql)
                .bind(student_id)
                .fetch_all(&self.pool)
                .await
        }
    }
}

#[cfg(test)]
pub mod test_client {
    use super::test_db::{TestDb, TestDbBuilder};
    use crate::models::{EnrollmentStatus, Program};
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user", Some("Admin User"))
            .registrar("registrar_user", Some("Registrar User"))
            .course(Program::Regular, "Electrical Installation and Maintenance", Some("NC II"))
            .course(Program::ShortCourse, "Basic Welding", None)
            .checklist_item("Birth Certificate", true)
            .student_with_status(
                Program::Regular,
                "ABC-23-016-03114-001",
                "Juan",
                "Dela Cruz",
                EnrollmentStatus::Pending,
                Some("Electrical Installation and Maintenance"),
            )
            .student_with_status(
                Program::Regular,
                "ABC-23-016-03114-002",
                "Maria",
                "Santos",
                EnrollmentStatus::Approved,
                Some("Electrical Installation and Maintenance"),
            )
            .student_with_status(
                Program::ShortCourse,
                "ABC-24-016-03114-003",
                "Pedro",
                "Reyes",
                EnrollmentStatus::Pending,
                Some("Basic Welding"),
            )
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.pool.clone()).await;
        let client = Client::untracked(rocket)
            .await
            .expect("Failed to build test client");

        (client, test_db)
    }

    pub async fn login_test_user(
        client: &Client,
        username: &str,
        password: &str,
    ) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": password
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        response
            .cookies()
            .iter()
            .map(|cookie| cookie.clone().into_owned())
            .collect()
    }
}
