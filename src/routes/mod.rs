pub mod admin;
pub mod health;
pub mod tasks;
pub mod users;

use actix_web::web;

use crate::config::ServiceKind;

/// Registers the route groups selected by `services` under the current scope.
pub fn config(cfg: &mut web::ServiceConfig, services: &[ServiceKind]) {
    for service in services {
        match service {
            ServiceKind::Users => {
                cfg.service(
                    web::scope("/users")
                        .service(users::register)
                        .service(users::login)
                        .service(users::admin_login)
                        .service(users::logout)
                        .service(users::me),
                );
            }
            ServiceKind::Tasks => {
                cfg.service(
                    web::scope("/tasks")
                        .service(tasks::list_tasks)
                        .service(tasks::create_task)
                        .service(tasks::patch_task)
                        .service(tasks::delete_task),
                );
            }
            ServiceKind::Admin => {
                cfg.service(
                    web::scope("/admin")
                        .service(admin::count_users)
                        .service(admin::count_tasks)
                        .service(admin::users_by_ids)
                        .service(admin::tasks_by_ids)
                        .service(admin::save_status),
                );
            }
        }
    }
}
