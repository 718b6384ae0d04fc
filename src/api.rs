use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::UserSession;
use crate::auth::{Permission, User};
use crate::db::{
    approve_student, authenticate_user, complete_student, count_activity, count_checklist_items,
    count_courses, count_students, create_checklist_item, create_course, create_user,
    create_user_session, delete_checklist_item, delete_course, find_user_by_username, get_course,
    get_student, get_student_applications, get_user, insert_course_application, insert_student,
    invalidate_session, list_activity, list_checklist_items, list_courses, list_students,
    log_activity, reject_student, set_user_archived, update_checklist_item, update_course,
    update_user_display_name, update_user_password, update_user_role, update_username,
    verify_user_password,
};
use crate::models::{
    ActivityEntry, ActivityKind, ChecklistItem, Course, CourseApplication, CourseAssignment,
    EnrollmentStatus, Page, Program, Student, clamp_paging,
};
use crate::uploads::resolve_profile_picture;
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::PermissionCheckExt;
use crate::validation::{ValidationResponse, validate_nc_level, validate_uli};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub archived: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role.to_string(),
            archived: user.archived,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use chrono::Utc;
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("logged_in", validated.username))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("user_role", user.role.to_string()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
                redirect_url: Some("/ui/enrollments".to_string()),
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
            redirect_url: None,
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("logged_in"));
    cookies.remove_private(rocket::http::Cookie::build("user_role"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// ---------------------------------------------------------------------------
// Enrollments
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct StudentData {
    pub id: i64,
    pub uli: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub profile_picture_url: Option<String>,
    pub status: String,
    pub course: Option<String>,
    pub nc_level: Option<String>,
    pub adviser: Option<String>,
    pub training_start: Option<String>,
    pub training_end: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub remarks: Option<String>,
    pub created_at: String,
}

impl From<Student> for StudentData {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            uli: s.uli,
            first_name: s.first_name,
            last_name: s.last_name,
            email: s.email,
            phone: s.phone,
            address: s.address,
            profile_picture_url: resolve_profile_picture(&s.profile_picture),
            status: s.status.to_string(),
            course: s.course,
            nc_level: s.nc_level,
            adviser: s.adviser,
            training_start: s.training_start.map(|d| d.to_string()),
            training_end: s.training_end.map(|d| d.to_string()),
            approved_by: s.approved_by,
            approved_at: s.approved_at.map(|t| t.to_rfc3339()),
            remarks: s.remarks,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApplicationData {
    pub id: i64,
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub course_name: String,
    pub status: String,
    pub remarks: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl From<CourseApplication> for ApplicationData {
    fn from(a: CourseApplication) -> Self {
        Self {
            id: a.id,
            student_id: a.student_id,
            course_id: a.course_id,
            course_name: a.course_name,
            status: a.status.to_string(),
            remarks: a.remarks,
            reviewed_by: a.reviewed_by,
            reviewed_at: a.reviewed_at.map(|t| t.to_rfc3339()),
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

#[derive(FromForm)]
pub struct EnrollmentQueryParams {
    search: Option<String>,
    status: Option<EnrollmentStatus>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[get("/enrollments/<program>?<params..>")]
pub async fn api_list_enrollments(
    program: Program,
    params: EnrollmentQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Page<StudentData>>, Status> {
    user.require_permission(Permission::ViewEnrollments)?;

    let (page, per_page) = clamp_paging(params.page, params.per_page);
    let search = params.search.as_deref();

    let total_count = count_students(db, program, search, params.status).await?;
    let students = list_students(db, program, search, params.status, page, per_page).await?;

    let items: Vec<StudentData> = students.into_iter().map(StudentData::from).collect();

    Ok(Json(Page::new(items, page, per_page, total_count)))
}

#[derive(Serialize, Deserialize)]
pub struct EnrollmentDetailResponse {
    pub student: StudentData,
    pub applications: Vec<ApplicationData>,
    pub can_review: bool,
    pub can_manage_courses: bool,
}

#[get("/enrollment/<program>/<id>")]
pub async fn api_get_enrollment(
    program: Program,
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<EnrollmentDetailResponse>, Status> {
    user.require_permission(Permission::ViewEnrollments)?;

    let student = get_student(db, program, id).await?;
    let applications = get_student_applications(db, program, id).await?;

    Ok(Json(EnrollmentDetailResponse {
        student: StudentData::from(student),
        applications: applications
            .into_iter()
            .map(ApplicationData::from)
            .collect(),
        can_review: user.has_permission(Permission::ReviewApplications),
        can_manage_courses: user.has_permission(Permission::ManageCourses),
    }))
}

#[derive(Deserialize, Validate, Clone)]
pub struct EnrollmentCreateRequest {
    #[validate(custom(function = validate_uli))]
    uli: String,
    #[validate(length(min = 1, message = "First name is required"))]
    first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    profile_picture: Option<String>,
    // Desired course for the initial application row, if known at the desk
    course_name: Option<String>,
    course_id: Option<i64>,
}

#[post("/enrollment/<program>", data = "<registration>")]
pub async fn api_create_enrollment(
    program: Program,
    registration: Json<EnrollmentCreateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ReviewApplications)
        .validate_custom()?;

    let validated = registration.validate_custom()?;

    let student_id = insert_student(
        db,
        program,
        &validated.uli,
        &validated.first_name,
        &validated.last_name,
        validated.email.as_deref().unwrap_or_default(),
        validated.phone.as_deref().unwrap_or_default(),
        validated.address.as_deref().unwrap_or_default(),
        validated.profile_picture.as_deref(),
    )
    .await
    .validate_custom()?;

    if let Some(course_name) = validated
        .course_name
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        insert_course_application(db, program, student_id, validated.course_id, course_name)
            .await
            .validate_custom()?;
    }

    log_activity(
        db,
        Some(&user),
        ActivityKind::EnrollmentCreated,
        &format!(
            "Registered walk-in student {} {} ({})",
            validated.first_name, validated.last_name, validated.uli
        ),
        Some(program.students_table()),
        Some(student_id),
    )
    .await;

    Ok(Status::Created)
}

#[derive(Deserialize, Validate, Clone)]
pub struct ApproveRequest {
    #[validate(length(min = 1, message = "Course is required"))]
    course: String,
    #[validate(custom(function = validate_nc_level))]
    nc_level: String,
    #[validate(length(min = 1, message = "Adviser is required"))]
    adviser: String,
    training_start: chrono::NaiveDate,
    training_end: chrono::NaiveDate,
}

#[post("/enrollment/<program>/<id>/approve", data = "<request>")]
pub async fn api_approve_enrollment(
    program: Program,
    id: i64,
    request: Json<ApproveRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ReviewApplications)
        .validate_custom()?;

    let validated = request.validate_custom()?;

    if validated.training_end < validated.training_start {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "training_end",
                "Training end date must not be before the start date",
            )),
        ));
    }

    let student = get_student(db, program, id).await.validate_custom()?;

    let assignment = CourseAssignment {
        course: validated.course,
        nc_level: validated.nc_level,
        adviser: validated.adviser,
        training_start: validated.training_start,
        training_end: validated.training_end,
    };

    approve_student(db, program, id, &assignment, &user)
        .await
        .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::EnrollmentApproved,
        &format!(
            "Approved {} {} for {} ({})",
            student.first_name, student.last_name, assignment.course, assignment.nc_level
        ),
        Some(program.students_table()),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

#[post("/enrollment/<program>/<id>/complete")]
pub async fn api_complete_enrollment(
    program: Program,
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ReviewApplications)
        .validate_custom()?;

    let student = get_student(db, program, id).await.validate_custom()?;

    complete_student(db, program, id, &user)
        .await
        .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::EnrollmentCompleted,
        &format!(
            "Marked {} {} as completed{}",
            student.first_name,
            student.last_name,
            student
                .course
                .map(|c| format!(" for {}", c))
                .unwrap_or_default()
        ),
        Some(program.students_table()),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

#[derive(Deserialize, Clone)]
pub struct RejectRequest {
    remarks: Option<String>,
}

#[post("/enrollment/<program>/<id>/reject", data = "<request>")]
pub async fn api_reject_enrollment(
    program: Program,
    id: i64,
    request: Json<RejectRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ReviewApplications)
        .validate_custom()?;

    let student = get_student(db, program, id).await.validate_custom()?;

    reject_student(db, program, id, request.remarks.as_deref(), &user)
        .await
        .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::EnrollmentRejected,
        &format!("Rejected {} {}", student.first_name, student.last_name),
        Some(program.students_table()),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

// ---------------------------------------------------------------------------
// Course catalog
// ---------------------------------------------------------------------------

#[derive(FromForm)]
pub struct CourseQueryParams {
    search: Option<String>,
    include_inactive: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[get("/courses/<program>?<params..>")]
pub async fn api_list_courses(
    program: Program,
    params: CourseQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Page<Course>>, Status> {
    user.require_permission(Permission::ViewEnrollments)?;

    let (page, per_page) = clamp_paging(params.page, params.per_page);
    let search = params.search.as_deref();
    let include_inactive = params.include_inactive.unwrap_or(false);

    let total_count = count_courses(db, program, search, include_inactive).await?;
    let courses = list_courses(db, program, search, include_inactive, page, per_page).await?;

    Ok(Json(Page::new(courses, page, per_page, total_count)))
}

#[derive(Deserialize, Validate, Clone)]
pub struct CourseRequest {
    #[validate(length(min = 1, message = "Course name is required"))]
    name: String,
    nc_level: Option<String>,
    description: Option<String>,
    is_active: Option<bool>,
}

fn check_optional_nc_level(
    nc_level: Option<&str>,
) -> Result<(), Custom<Json<ValidationResponse>>> {
    if let Some(level) = nc_level.filter(|l| !l.trim().is_empty()) {
        if validate_nc_level(level).is_err() {
            return Err(Custom(
                Status::UnprocessableEntity,
                Json(ValidationResponse::with_error(
                    "nc_level",
                    "NC level must be one of NC I, NC II, NC III, NC IV",
                )),
            ));
        }
    }
    Ok(())
}

#[post("/courses/<program>", data = "<course>")]
pub async fn api_create_course(
    program: Program,
    course: Json<CourseRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;

    let validated = course.validate_custom()?;
    check_optional_nc_level(validated.nc_level.as_deref())?;

    let course_id = create_course(
        db,
        program,
        &validated.name,
        validated.nc_level.as_deref(),
        validated.description.as_deref().unwrap_or_default(),
        validated.is_active.unwrap_or(true),
    )
    .await
    .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::CourseCreated,
        &format!("Added course {}", validated.name),
        Some(program.courses_table()),
        Some(course_id),
    )
    .await;

    Ok(Status::Created)
}

#[put("/courses/<program>/<id>", data = "<course>")]
pub async fn api_update_course(
    program: Program,
    id: i64,
    course: Json<CourseRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;

    let validated = course.validate_custom()?;
    check_optional_nc_level(validated.nc_level.as_deref())?;

    update_course(
        db,
        program,
        id,
        &validated.name,
        validated.nc_level.as_deref(),
        validated.description.as_deref().unwrap_or_default(),
        validated.is_active.unwrap_or(true),
    )
    .await
    .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::CourseUpdated,
        &format!("Updated course {}", validated.name),
        Some(program.courses_table()),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

/// Destructive actions re-check the acting admin's own password.
#[derive(Deserialize, Validate, Clone)]
pub struct DeleteRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[delete("/courses/<program>/<id>", data = "<request>")]
pub async fn api_delete_course(
    program: Program,
    id: i64,
    request: Json<DeleteRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::DeleteCatalogRecords)
        .validate_custom()?;

    let validated = request.validate_custom()?;

    if !verify_user_password(db, user.id, &validated.password)
        .await
        .validate_custom()?
    {
        return Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "password",
                "Password is incorrect",
            )),
        ));
    }

    let course = get_course(db, program, id).await.validate_custom()?;

    delete_course(db, program, id).await.validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::CourseDeleted,
        &format!("Deleted course {}", course.name),
        Some(program.courses_table()),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

// ---------------------------------------------------------------------------
// Checklist items
// ---------------------------------------------------------------------------

#[derive(FromForm)]
pub struct ChecklistQueryParams {
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[get("/checklist?<params..>")]
pub async fn api_list_checklist(
    params: ChecklistQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Page<ChecklistItem>>, Status> {
    user.require_permission(Permission::ViewEnrollments)?;

    let (page, per_page) = clamp_paging(params.page, params.per_page);
    let search = params.search.as_deref();

    let total_count = count_checklist_items(db, search).await?;
    let items = list_checklist_items(db, search, page, per_page).await?;

    Ok(Json(Page::new(items, page, per_page, total_count)))
}

#[derive(Deserialize, Validate, Clone)]
pub struct ChecklistItemRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    description: Option<String>,
    is_required: Option<bool>,
}

#[post("/checklist", data = "<item>")]
pub async fn api_create_checklist_item(
    item: Json<ChecklistItemRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ManageChecklist)
        .validate_custom()?;

    let validated = item.validate_custom()?;

    let item_id = create_checklist_item(
        db,
        &validated.name,
        validated.description.as_deref().unwrap_or_default(),
        validated.is_required.unwrap_or(true),
    )
    .await
    .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::ChecklistItemCreated,
        &format!("Added checklist item {}", validated.name),
        Some("checklist_items"),
        Some(item_id),
    )
    .await;

    Ok(Status::Created)
}

#[put("/checklist/<id>", data = "<item>")]
pub async fn api_update_checklist_item(
    id: i64,
    item: Json<ChecklistItemRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::ManageChecklist)
        .validate_custom()?;

    let validated = item.validate_custom()?;

    update_checklist_item(
        db,
        id,
        &validated.name,
        validated.description.as_deref().unwrap_or_default(),
        validated.is_required.unwrap_or(true),
    )
    .await
    .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::ChecklistItemUpdated,
        &format!("Updated checklist item {}", validated.name),
        Some("checklist_items"),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

#[delete("/checklist/<id>", data = "<request>")]
pub async fn api_delete_checklist_item(
    id: i64,
    request: Json<DeleteRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::DeleteCatalogRecords)
        .validate_custom()?;

    let validated = request.validate_custom()?;

    if !verify_user_password(db, user.id, &validated.password)
        .await
        .validate_custom()?
    {
        return Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "password",
                "Password is incorrect",
            )),
        ));
    }

    delete_checklist_item(db, id).await.validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::ChecklistItemDeleted,
        &format!("Deleted checklist item #{}", id),
        Some("checklist_items"),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

#[derive(FromForm)]
pub struct ActivityQueryParams {
    search: Option<String>,
    action: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[get("/activity?<params..>")]
pub async fn api_list_activity(
    params: ActivityQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Page<ActivityEntry>>, Status> {
    user.require_permission(Permission::ViewActivityLog)?;

    let (page, per_page) = clamp_paging(params.page, params.per_page);
    let search = params.search.as_deref();
    let action = params.action.as_deref();

    let total_count = count_activity(db, search, action).await?;
    let entries = list_activity(db, search, action, page, per_page).await?;

    Ok(Json(Page::new(entries, page, per_page, total_count)))
}

// ---------------------------------------------------------------------------
// Account management
// ---------------------------------------------------------------------------

#[derive(Deserialize, Validate, Clone)]
pub struct ProfileUpdateRequest {
    #[validate(length(min = 1, message = "Display name is required"))]
    display_name: String,
}

#[put("/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Json<ProfileUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = profile.validate_custom()?;

    update_user_display_name(db, user.id, &validated.display_name)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[derive(Deserialize, Validate)]
pub struct PasswordChangeRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    new_password: String,
}

#[post("/change-password", data = "<password>")]
pub async fn api_change_password(
    password: Json<PasswordChangeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = password.validate_custom()?;

    let is_valid = authenticate_user(db, &user.username, &validated.current_password)
        .await
        .validate_custom()?;

    match is_valid {
        Some(_) => {
            update_user_password(db, user.id, &validated.new_password)
                .await
                .validate_custom()?;

            log_activity(
                db,
                Some(&user),
                ActivityKind::PasswordChanged,
                &format!("{} changed their password", user.username),
                Some("users"),
                Some(user.id),
            )
            .await;

            Ok(Status::Ok)
        }
        _ => Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "current_password",
                "Current password is incorrect",
            )),
        )),
    }
}

#[derive(Deserialize, Validate, Clone)]
pub struct UserRegistrationRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Display name is required"))]
    display_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    #[validate(length(min = 1, message = "Role is required"))]
    role: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: Json<UserRegistrationRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    match validated.role.as_str() {
        "admin" => user
            .require_all_permissions(&[Permission::EditUserRoles, Permission::RegisterUsers])
            .validate_custom()?,
        _ => user
            .require_permission(Permission::RegisterUsers)
            .validate_custom()?,
    };

    if crate::auth::Role::from_str(&validated.role).is_err() {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "role",
                "Role must be registrar or admin",
            )),
        ));
    }

    let existing_user = find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?;

    if existing_user.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    let new_user_id = create_user(
        db,
        &validated.username,
        &validated.password,
        &validated.role,
        Some(&validated.display_name),
    )
    .await
    .validate_custom()?;

    log_activity(
        db,
        Some(&user),
        ActivityKind::UserRegistered,
        &format!(
            "Registered {} account for {}",
            validated.role, validated.username
        ),
        Some("users"),
        Some(new_user_id),
    )
    .await;

    Ok(Status::Created)
}

#[derive(Deserialize)]
pub struct UserUpdateRequest {
    username: Option<String>,
    display_name: Option<String>,
    password: Option<String>,
    archived: Option<bool>,
    role: Option<String>,
}

#[put("/admin/users/<id>", data = "<update>")]
pub async fn api_update_user(
    id: i64,
    update: Json<UserUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::EditUserCredentials)?;

    // Role changes additionally require EditUserRoles
    if update.role.is_some() {
        user.require_permission(Permission::EditUserRoles)?;
    }

    let target = get_user(db, id).await?;

    if let Some(username) = &update.username {
        update_username(db, id, username).await?;
    }

    if let Some(display_name) = &update.display_name {
        update_user_display_name(db, id, display_name).await?;
    }

    if let Some(password) = &update.password {
        update_user_password(db, id, password).await?;
    }

    if let Some(archived) = update.archived {
        set_user_archived(db, id, archived).await?;
    }

    if let Some(role) = &update.role {
        if crate::auth::Role::from_str(role).is_err() {
            return Err(Status::UnprocessableEntity);
        }
        update_user_role(db, id, role).await?;
    }

    log_activity(
        db,
        Some(&user),
        ActivityKind::UserUpdated,
        &format!("Updated account {}", target.username),
        Some("users"),
        Some(id),
    )
    .await;

    Ok(Status::Ok)
}
