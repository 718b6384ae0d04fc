use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::models::{
    ActivityEntry, ActivityKind, ChecklistItem, Course, CourseApplication, CourseAssignment,
    DbActivityEntry, DbChecklistItem, DbCourse, DbCourseApplication, DbStudent, EnrollmentStatus,
    Program, Student,
};

const USER_COLUMNS: &str = "id, username, role, display_name, archived";

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query_as::<_, DbUser>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Looking up user by username");
    let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
    let row = sqlx::query_as::<_, DbUser>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn get_user_by_username(pool: &Pool<Sqlite>, username: &str) -> Result<User, AppError> {
    info!("Getting user by username");
    match find_user_by_username(pool, username).await? {
        Some(user) => Ok(user),
        _ => Err(AppError::NotFound(format!(
            "User with username {} not found in database",
            username
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct DbCredentials {
    id: Option<i64>,
    password: Option<String>,
    archived: Option<bool>,
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let creds = sqlx::query_as::<_, DbCredentials>(
        "SELECT id, password, archived FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match creds {
        Some(creds) => {
            if creds.archived.unwrap_or_default() {
                warn!("Archived account attempted login");
                return Ok(None);
            }

            let valid = bcrypt::verify(password, &creds.password.unwrap_or_default())
                .unwrap_or(false);
            if valid {
                Ok(Some(get_user(pool, creds.id.unwrap_or_default()).await?))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

/// Re-checks the acting user's own password. Destructive catalog deletes are
/// gated on this, not on the session alone.
#[instrument(skip_all, fields(user_id))]
pub async fn verify_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    password: &str,
) -> Result<bool, AppError> {
    info!("Verifying user password");
    let creds = sqlx::query_as::<_, DbCredentials>(
        "SELECT id, password, archived FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match creds {
        Some(creds) => Ok(bcrypt::verify(password, &creds.password.unwrap_or_default())
            .unwrap_or(false)),
        _ => Ok(false),
    }
}

#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    if find_user_by_username(pool, username).await?.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password, role, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(role)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn update_user_display_name(
    pool: &Pool<Sqlite>,
    user_id: i64,
    display_name: &str,
) -> Result<(), AppError> {
    info!("Updating user display name");
    sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(display_name)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn update_username(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_username: &str,
) -> Result<(), AppError> {
    info!("Updating user username");
    let existing = sqlx::query("SELECT id FROM users WHERE username = ? AND id != ?")
        .bind(new_username)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }

    sqlx::query("UPDATE users SET username = ? WHERE id = ?")
        .bind(new_username)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn update_user_role(
    pool: &Pool<Sqlite>,
    user_id: i64,
    role: &str,
) -> Result<(), AppError> {
    info!("Updating user role");
    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn set_user_archived(
    pool: &Pool<Sqlite>,
    user_id: i64,
    archive: bool,
) -> Result<bool, AppError> {
    info!("Toggling user archived status");

    sqlx::query("UPDATE users SET archived = ? WHERE id = ?")
        .bind(archive)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(archive)
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Enrollments
// ---------------------------------------------------------------------------

#[instrument]
pub async fn get_student(
    pool: &Pool<Sqlite>,
    program: Program,
    id: i64,
) -> Result<Student, AppError> {
    info!("Fetching student registration");
    let sql = format!("SELECT * FROM {} WHERE id = ?", program.students_table());
    let row = sqlx::query_as::<_, DbStudent>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(student) => Ok(Student::from(student)),
        _ => Err(AppError::NotFound(format!(
            "Student with id {} not found in {}",
            id,
            program.students_table()
        ))),
    }
}

fn student_filter(
    search: Option<&str>,
    status: Option<EnrollmentStatus>,
) -> (String, Option<String>) {
    let mut clauses = Vec::new();
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));

    if pattern.is_some() {
        clauses.push(
            "(uli LIKE ? OR first_name LIKE ? OR last_name LIKE ? OR email LIKE ? OR course LIKE ?)",
        );
    }
    if status.is_some() {
        clauses.push("status = ?");
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    (where_sql, pattern)
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &Pool<Sqlite>,
    program: Program,
    search: Option<&str>,
    status: Option<EnrollmentStatus>,
    page: i64,
    per_page: i64,
) -> Result<Vec<Student>, AppError> {
    info!("Listing student registrations");
    let (where_sql, pattern) = student_filter(search, status);
    let sql = format!(
        "SELECT * FROM {}{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        program.students_table(),
        where_sql
    );

    let mut query = sqlx::query_as::<_, DbStudent>(&sql);
    if let Some(pattern) = &pattern {
        for _ in 0..5 {
            query = query.bind(pattern.as_str());
        }
    }
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }
    query = query.bind(per_page).bind((page - 1) * per_page);

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Student::from).collect())
}

#[instrument(skip(pool))]
pub async fn count_students(
    pool: &Pool<Sqlite>,
    program: Program,
    search: Option<&str>,
    status: Option<EnrollmentStatus>,
) -> Result<i64, AppError> {
    let (where_sql, pattern) = student_filter(search, status);
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        program.students_table(),
        where_sql
    );

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(pattern) = &pattern {
        for _ in 0..5 {
            query = query.bind(pattern.as_str());
        }
    }
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }

    Ok(query.fetch_one(pool).await?)
}

#[instrument(skip_all, fields(program, uli))]
pub async fn insert_student(
    pool: &Pool<Sqlite>,
    program: Program,
    uli: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    address: &str,
    profile_picture: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating student registration");
    let sql = format!(
        "INSERT INTO {} (uli, first_name, last_name, email, phone, address, profile_picture, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')",
        program.students_table()
    );

    let res = sqlx::query(&sql)
        .bind(uli)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone)
        .bind(address)
        .bind(profile_picture)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn insert_course_application(
    pool: &Pool<Sqlite>,
    program: Program,
    student_id: i64,
    course_id: Option<i64>,
    course_name: &str,
) -> Result<i64, AppError> {
    info!("Creating course application");
    let sql = format!(
        "INSERT INTO {} (student_id, course_id, course_name, status) VALUES (?, ?, ?, 'pending')",
        program.applications_table()
    );

    let res = sqlx::query(&sql)
        .bind(student_id)
        .bind(course_id)
        .bind(course_name)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_student_applications(
    pool: &Pool<Sqlite>,
    program: Program,
    student_id: i64,
) -> Result<Vec<CourseApplication>, AppError> {
    info!("Getting student course applications");
    let sql = format!(
        "SELECT * FROM {} WHERE student_id = ? ORDER BY created_at DESC, id DESC",
        program.applications_table()
    );
    let rows = sqlx::query_as::<_, DbCourseApplication>(&sql)
        .bind(student_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(CourseApplication::from).collect())
}

/// Reads the current status inside the caller's transaction so the legality
/// check and the update cannot race with another reviewer.
async fn current_status_for_update(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    program: Program,
    student_id: i64,
) -> Result<EnrollmentStatus, AppError> {
    let sql = format!(
        "SELECT status FROM {} WHERE id = ?",
        program.students_table()
    );
    let row = sqlx::query_scalar::<_, String>(&sql)
        .bind(student_id)
        .fetch_optional(&mut **tx)
        .await?;

    match row {
        Some(status) => Ok(EnrollmentStatus::from_str(&status).unwrap_or_default()),
        _ => Err(AppError::NotFound(format!(
            "Student with id {} not found in {}",
            student_id,
            program.students_table()
        ))),
    }
}

#[instrument(skip(pool, assignment))]
pub async fn approve_student(
    pool: &Pool<Sqlite>,
    program: Program,
    student_id: i64,
    assignment: &CourseAssignment,
    reviewer: &User,
) -> Result<(), AppError> {
    info!("Approving student registration");

    let mut tx = pool.begin().await?;

    let current = current_status_for_update(&mut tx, program, student_id).await?;
    if !current.can_approve() {
        return Err(AppError::Validation(format!(
            "Cannot approve a registration with status '{}'",
            current
        )));
    }

    let now = Utc::now().naive_utc();

    let sql = format!(
        "UPDATE {} SET status = ?, course = ?, nc_level = ?, adviser = ?,
                training_start = ?, training_end = ?, approved_by = ?, approved_at = ?
         WHERE id = ?",
        program.students_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Approved.as_str())
        .bind(assignment.course.as_str())
        .bind(assignment.nc_level.as_str())
        .bind(assignment.adviser.as_str())
        .bind(assignment.training_start)
        .bind(assignment.training_end)
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        "UPDATE {} SET status = ?, reviewed_by = ?, reviewed_at = ?
         WHERE student_id = ? AND status = ?",
        program.applications_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Approved.as_str())
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(student_id)
        .bind(EnrollmentStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn complete_student(
    pool: &Pool<Sqlite>,
    program: Program,
    student_id: i64,
    reviewer: &User,
) -> Result<(), AppError> {
    info!("Marking student registration completed");

    let mut tx = pool.begin().await?;

    let current = current_status_for_update(&mut tx, program, student_id).await?;
    if !current.can_complete() {
        return Err(AppError::Validation(format!(
            "Cannot complete a registration with status '{}'",
            current
        )));
    }

    let now = Utc::now().naive_utc();

    let sql = format!(
        "UPDATE {} SET status = ?, approved_by = ?, approved_at = ? WHERE id = ?",
        program.students_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Completed.as_str())
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        "UPDATE {} SET status = ?, reviewed_by = ?, reviewed_at = ?
         WHERE student_id = ? AND status = ?",
        program.applications_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Completed.as_str())
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(student_id)
        .bind(EnrollmentStatus::Approved.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool, remarks))]
pub async fn reject_student(
    pool: &Pool<Sqlite>,
    program: Program,
    student_id: i64,
    remarks: Option<&str>,
    reviewer: &User,
) -> Result<(), AppError> {
    info!("Rejecting student registration");

    let mut tx = pool.begin().await?;

    let current = current_status_for_update(&mut tx, program, student_id).await?;
    if !current.can_reject() {
        return Err(AppError::Validation(format!(
            "Cannot reject a registration with status '{}'",
            current
        )));
    }

    let now = Utc::now().naive_utc();

    let sql = format!(
        "UPDATE {} SET status = ?, approved_by = ?, approved_at = ?, remarks = ? WHERE id = ?",
        program.students_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Rejected.as_str())
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(remarks)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        "UPDATE {} SET status = ?, reviewed_by = ?, reviewed_at = ?, remarks = ?
         WHERE student_id = ? AND status IN (?, ?)",
        program.applications_table()
    );
    sqlx::query(&sql)
        .bind(EnrollmentStatus::Rejected.as_str())
        .bind(reviewer.username.as_str())
        .bind(now)
        .bind(remarks)
        .bind(student_id)
        .bind(EnrollmentStatus::Pending.as_str())
        .bind(EnrollmentStatus::Approved.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Course catalog
// ---------------------------------------------------------------------------

fn course_filter(search: Option<&str>, include_inactive: bool) -> (String, Option<String>) {
    let mut clauses = Vec::new();
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));

    if pattern.is_some() {
        clauses.push("(name LIKE ? OR description LIKE ?)");
    }
    if !include_inactive {
        clauses.push("is_active IS NOT 0");
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    (where_sql, pattern)
}

#[instrument(skip(pool))]
pub async fn list_courses(
    pool: &Pool<Sqlite>,
    program: Program,
    search: Option<&str>,
    include_inactive: bool,
    page: i64,
    per_page: i64,
) -> Result<Vec<Course>, AppError> {
    info!("Listing courses");
    let (where_sql, pattern) = course_filter(search, include_inactive);
    let sql = format!(
        "SELECT * FROM {}{} ORDER BY name, id LIMIT ? OFFSET ?",
        program.courses_table(),
        where_sql
    );

    let mut query = sqlx::query_as::<_, DbCourse>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }
    query = query.bind(per_page).bind((page - 1) * per_page);

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument(skip(pool))]
pub async fn count_courses(
    pool: &Pool<Sqlite>,
    program: Program,
    search: Option<&str>,
    include_inactive: bool,
) -> Result<i64, AppError> {
    let (where_sql, pattern) = course_filter(search, include_inactive);
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        program.courses_table(),
        where_sql
    );

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }

    Ok(query.fetch_one(pool).await?)
}

#[instrument]
pub async fn get_course(
    pool: &Pool<Sqlite>,
    program: Program,
    id: i64,
) -> Result<Course, AppError> {
    info!("Fetching course");
    let sql = format!("SELECT * FROM {} WHERE id = ?", program.courses_table());
    let row = sqlx::query_as::<_, DbCourse>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(course) => Ok(Course::from(course)),
        _ => Err(AppError::NotFound(format!(
            "Course with id {} not found in {}",
            id,
            program.courses_table()
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn create_course(
    pool: &Pool<Sqlite>,
    program: Program,
    name: &str,
    nc_level: Option<&str>,
    description: &str,
    is_active: bool,
) -> Result<i64, AppError> {
    info!("Creating course");
    let sql = format!(
        "INSERT INTO {} (name, nc_level, description, is_active) VALUES (?, ?, ?, ?)",
        program.courses_table()
    );

    let res = sqlx::query(&sql)
        .bind(name)
        .bind(nc_level)
        .bind(description)
        .bind(is_active)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_course(
    pool: &Pool<Sqlite>,
    program: Program,
    id: i64,
    name: &str,
    nc_level: Option<&str>,
    description: &str,
    is_active: bool,
) -> Result<(), AppError> {
    info!("Updating course");
    let sql = format!(
        "UPDATE {} SET name = ?, nc_level = ?, description = ?, is_active = ? WHERE id = ?",
        program.courses_table()
    );

    let res = sqlx::query(&sql)
        .bind(name)
        .bind(nc_level)
        .bind(description)
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found in {}",
            id,
            program.courses_table()
        )));
    }

    Ok(())
}

#[instrument]
pub async fn delete_course(
    pool: &Pool<Sqlite>,
    program: Program,
    id: i64,
) -> Result<(), AppError> {
    info!("Deleting course");
    let sql = format!("DELETE FROM {} WHERE id = ?", program.courses_table());
    let res = sqlx::query(&sql).bind(id).execute(pool).await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found in {}",
            id,
            program.courses_table()
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Checklist items
// ---------------------------------------------------------------------------

fn checklist_filter(search: Option<&str>) -> (String, Option<String>) {
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));

    let where_sql = if pattern.is_some() {
        " WHERE (name LIKE ? OR description LIKE ?)".to_string()
    } else {
        String::new()
    };

    (where_sql, pattern)
}

#[instrument(skip(pool))]
pub async fn list_checklist_items(
    pool: &Pool<Sqlite>,
    search: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Vec<ChecklistItem>, AppError> {
    info!("Listing checklist items");
    let (where_sql, pattern) = checklist_filter(search);
    let sql = format!(
        "SELECT * FROM checklist_items{} ORDER BY name, id LIMIT ? OFFSET ?",
        where_sql
    );

    let mut query = sqlx::query_as::<_, DbChecklistItem>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }
    query = query.bind(per_page).bind((page - 1) * per_page);

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(ChecklistItem::from).collect())
}

#[instrument(skip(pool))]
pub async fn count_checklist_items(
    pool: &Pool<Sqlite>,
    search: Option<&str>,
) -> Result<i64, AppError> {
    let (where_sql, pattern) = checklist_filter(search);
    let sql = format!("SELECT COUNT(*) FROM checklist_items{}", where_sql);

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }

    Ok(query.fetch_one(pool).await?)
}

#[instrument(skip(pool))]
pub async fn create_checklist_item(
    pool: &Pool<Sqlite>,
    name: &str,
    description: &str,
    is_required: bool,
) -> Result<i64, AppError> {
    info!("Creating checklist item");
    let res = sqlx::query(
        "INSERT INTO checklist_items (name, description, is_required) VALUES (?, ?, ?)",
    )
    .bind(name)
    .bind(description)
    .bind(is_required)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_checklist_item(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    description: &str,
    is_required: bool,
) -> Result<(), AppError> {
    info!("Updating checklist item");
    let res = sqlx::query(
        "UPDATE checklist_items SET name = ?, description = ?, is_required = ? WHERE id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(is_required)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Checklist item with id {} not found",
            id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn delete_checklist_item(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting checklist item");
    let res = sqlx::query("DELETE FROM checklist_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Checklist item with id {} not found",
            id
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

#[instrument(skip(pool, actor, description))]
pub async fn record_activity(
    pool: &Pool<Sqlite>,
    actor: Option<&User>,
    kind: ActivityKind,
    description: &str,
    entity_type: Option<&str>,
    entity_id: Option<i64>,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO activity_log (user_id, username, action, description, entity_type, entity_id)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(actor.map(|u| u.id))
    .bind(actor.map(|u| u.username.as_str()))
    .bind(kind.as_str())
    .bind(description)
    .bind(entity_type)
    .bind(entity_id)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Fire-and-forget variant used by handlers: a failed log write is reported
/// at WARN and never fails or rolls back the primary action.
pub async fn log_activity(
    pool: &Pool<Sqlite>,
    actor: Option<&User>,
    kind: ActivityKind,
    description: &str,
    entity_type: Option<&str>,
    entity_id: Option<i64>,
) {
    if let Err(err) =
        record_activity(pool, actor, kind, description, entity_type, entity_id).await
    {
        warn!(error = %err, action = %kind, "Failed to record activity log entry");
    }
}

fn activity_filter(search: Option<&str>, action: Option<&str>) -> (String, Option<String>, bool) {
    let mut clauses = Vec::new();
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));
    let has_action = action.filter(|a| !a.trim().is_empty()).is_some();

    if pattern.is_some() {
        clauses.push("(description LIKE ? OR username LIKE ?)");
    }
    if has_action {
        clauses.push("action = ?");
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    (where_sql, pattern, has_action)
}

#[instrument(skip(pool))]
pub async fn list_activity(
    pool: &Pool<Sqlite>,
    search: Option<&str>,
    action: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Vec<ActivityEntry>, AppError> {
    info!("Listing activity log");
    let (where_sql, pattern, has_action) = activity_filter(search, action);
    let sql = format!(
        "SELECT * FROM activity_log{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        where_sql
    );

    let mut query = sqlx::query_as::<_, DbActivityEntry>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }
    if has_action {
        query = query.bind(action.map(|a| a.trim().to_string()).unwrap_or_default());
    }
    query = query.bind(per_page).bind((page - 1) * per_page);

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(ActivityEntry::from).collect())
}

#[instrument(skip(pool))]
pub async fn count_activity(
    pool: &Pool<Sqlite>,
    search: Option<&str>,
    action: Option<&str>,
) -> Result<i64, AppError> {
    let (where_sql, pattern, has_action) = activity_filter(search, action);
    let sql = format!("SELECT COUNT(*) FROM activity_log{}", where_sql);

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern.as_str()).bind(pattern.as_str());
    }
    if has_action {
        query = query.bind(action.map(|a| a.trim().to_string()).unwrap_or_default());
    }

    Ok(query.fetch_one(pool).await?)
}
