#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
mod uploads;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_approve_enrollment, api_change_password, api_complete_enrollment, api_create_checklist_item,
    api_create_course, api_create_enrollment, api_delete_checklist_item, api_delete_course,
    api_get_enrollment, api_list_activity, api_list_checklist, api_list_courses,
    api_list_enrollments, api_login, api_logout, api_me, api_me_unauthorized,
    api_register_user, api_reject_enrollment, api_update_checklist_item, api_update_course,
    api_update_profile, api_update_user, health,
};
use auth::{forbidden_api, unauthorized_api};
use db::clean_expired_sessions;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use std::sync::Mutex;
use telemetry::{OtelGuard, TelemetryFairing, init_tracing};

use sqlx::SqlitePool;
use tracing::{error, info};

pub static TELEMETRY_GUARD: Mutex<Option<OtelGuard>> = Mutex::new(None);

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting enrollment tracker");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_list_enrollments,
                api_get_enrollment,
                api_create_enrollment,
                api_approve_enrollment,
                api_complete_enrollment,
                api_reject_enrollment,
                api_list_courses,
                api_create_course,
                api_update_course,
                api_delete_course,
                api_list_checklist,
                api_create_checklist_item,
                api_update_checklist_item,
                api_delete_checklist_item,
                api_list_activity,
                api_update_profile,
                api_change_password,
                api_register_user,
                api_update_user,
                health,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                telemetry::shutdown_telemetry();
            })
        }))
}
