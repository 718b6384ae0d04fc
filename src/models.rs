use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

/// Lifecycle of a student registration and of each course application row.
/// `Completed` is only reachable from `Approved`; `Rejected` from `Pending`
/// or `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, rocket::FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    #[field(value = "pending")]
    Pending,
    #[field(value = "approved")]
    Approved,
    #[field(value = "rejected")]
    Rejected,
    #[field(value = "completed")]
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
            EnrollmentStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EnrollmentStatus::Pending),
            "approved" => Some(EnrollmentStatus::Approved),
            "rejected" => Some(EnrollmentStatus::Rejected),
            "completed" => Some(EnrollmentStatus::Completed),
            _ => None,
        }
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, EnrollmentStatus::Pending)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, EnrollmentStatus::Approved)
    }

    pub fn can_reject(&self) -> bool {
        matches!(self, EnrollmentStatus::Pending | EnrollmentStatus::Approved)
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Selects which of the two parallel table families a request operates on.
/// The table names are static strings owned by this enum; nothing user
/// supplied is ever spliced into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, rocket::FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum Program {
    #[field(value = "regular")]
    Regular,
    #[field(value = "shortcourse")]
    ShortCourse,
}

impl Program {
    pub fn students_table(&self) -> &'static str {
        match self {
            Program::Regular => "students",
            Program::ShortCourse => "shortcourse_students",
        }
    }

    pub fn applications_table(&self) -> &'static str {
        match self {
            Program::Regular => "course_applications",
            Program::ShortCourse => "shortcourse_course_applications",
        }
    }

    pub fn courses_table(&self) -> &'static str {
        match self {
            Program::Regular => "courses",
            Program::ShortCourse => "shortcourse_courses",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Regular => "regular",
            Program::ShortCourse => "shortcourse",
        }
    }
}

impl<'r> FromParam<'r> for Program {
    type Error = &'r str;

    fn from_param(param: &'r str) -> Result<Self, Self::Error> {
        match param {
            "regular" => Ok(Program::Regular),
            "shortcourse" => Ok(Program::ShortCourse),
            _ => Err(param),
        }
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Assignment fields captured at first approval. Only populated when a
/// registration leaves `pending`.
#[derive(Debug, Clone)]
pub struct CourseAssignment {
    pub course: String,
    pub nc_level: String,
    pub adviser: String,
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
}

#[derive(Serialize)]
pub struct Student {
    pub id: i64,
    pub uli: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub profile_picture: String,
    pub status: EnrollmentStatus,
    pub course: Option<String>,
    pub nc_level: Option<String>,
    pub adviser: Option<String>,
    pub training_start: Option<NaiveDate>,
    pub training_end: Option<NaiveDate>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbStudent {
    pub id: Option<i64>,
    pub uli: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub status: Option<String>,
    pub course: Option<String>,
    pub nc_level: Option<String>,
    pub adviser: Option<String>,
    pub training_start: Option<NaiveDate>,
    pub training_end: Option<NaiveDate>,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbStudent> for Student {
    fn from(db: DbStudent) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            uli: db.uli.unwrap_or_default(),
            first_name: db.first_name.unwrap_or_default(),
            last_name: db.last_name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            phone: db.phone.unwrap_or_default(),
            address: db.address.unwrap_or_default(),
            profile_picture: db.profile_picture.unwrap_or_default(),
            status: db
                .status
                .as_deref()
                .and_then(EnrollmentStatus::from_str)
                .unwrap_or_default(),
            course: db.course,
            nc_level: db.nc_level,
            adviser: db.adviser,
            training_start: db.training_start,
            training_end: db.training_end,
            approved_by: db.approved_by,
            approved_at: db.approved_at.map(to_utc),
            remarks: db.remarks,
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize)]
pub struct CourseApplication {
    pub id: i64,
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub course_name: String, // Denormalized for convenience
    pub status: EnrollmentStatus,
    pub remarks: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCourseApplication {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    pub status: Option<String>,
    pub remarks: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCourseApplication> for CourseApplication {
    fn from(db: DbCourseApplication) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            student_id: db.student_id.unwrap_or_default(),
            course_id: db.course_id,
            course_name: db.course_name.unwrap_or_default(),
            status: db
                .status
                .as_deref()
                .and_then(EnrollmentStatus::from_str)
                .unwrap_or_default(),
            remarks: db.remarks,
            reviewed_by: db.reviewed_by,
            reviewed_at: db.reviewed_at.map(to_utc),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub nc_level: Option<String>,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCourse {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub nc_level: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCourse> for Course {
    fn from(db: DbCourse) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            nc_level: db.nc_level,
            description: db.description.unwrap_or_default(),
            is_active: db.is_active.unwrap_or(true),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize)]
pub struct ChecklistItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_required: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbChecklistItem {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_required: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbChecklistItem> for ChecklistItem {
    fn from(db: DbChecklistItem) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            is_required: db.is_required.unwrap_or(true),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

/// What an activity row records. Stored as its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    EnrollmentCreated,
    EnrollmentApproved,
    EnrollmentCompleted,
    EnrollmentRejected,
    CourseCreated,
    CourseUpdated,
    CourseDeleted,
    ChecklistItemCreated,
    ChecklistItemUpdated,
    ChecklistItemDeleted,
    UserRegistered,
    UserUpdated,
    PasswordChanged,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::EnrollmentCreated => "enrollment_created",
            ActivityKind::EnrollmentApproved => "enrollment_approved",
            ActivityKind::EnrollmentCompleted => "enrollment_completed",
            ActivityKind::EnrollmentRejected => "enrollment_rejected",
            ActivityKind::CourseCreated => "course_created",
            ActivityKind::CourseUpdated => "course_updated",
            ActivityKind::CourseDeleted => "course_deleted",
            ActivityKind::ChecklistItemCreated => "checklist_item_created",
            ActivityKind::ChecklistItemUpdated => "checklist_item_updated",
            ActivityKind::ChecklistItemDeleted => "checklist_item_deleted",
            ActivityKind::UserRegistered => "user_registered",
            ActivityKind::UserUpdated => "user_updated",
            ActivityKind::PasswordChanged => "password_changed",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: String,
    pub action: String,
    pub description: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbActivityEntry {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbActivityEntry> for ActivityEntry {
    fn from(db: DbActivityEntry) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id,
            username: db.username.unwrap_or_default(),
            action: db.action.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            entity_type: db.entity_type,
            entity_id: db.entity_id,
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

/// One page of a filtered listing. `total_count` is the COUNT(*) under the
/// same filter, so `total_pages == ceil(total_count / per_page)` holds.
#[derive(Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total_count: i64) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + per_page - 1) / per_page
        };

        Self {
            items,
            page,
            per_page,
            total_count,
            total_pages,
        }
    }
}

/// Normalizes raw paging params: page is 1-based, per_page clamped.
pub fn clamp_paging(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page)
}

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}
