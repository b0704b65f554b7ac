use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/photos", photo_routes())
        .nest("/merchant", merchant_routes())
        .nest("/admin", admin_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn photo_routes() -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::photo::upload_photos))
        .layer(handlers::photo::upload_body_limit());

    OpenApiRouter::new()
        .routes(routes!(handlers::photo::duplicate_check))
        .routes(routes!(handlers::photo::list_my_photos))
        .routes(routes!(handlers::photo::delete_photo))
        .routes(routes!(handlers::photo::restore_photo))
        .routes(routes!(handlers::photo::edit_remarks))
        .merge(upload)
}

fn merchant_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::merchant::list_received))
        .routes(routes!(handlers::merchant::set_process_status))
        .routes(routes!(handlers::merchant::download_photo))
        .routes(routes!(handlers::merchant::download_customer_batch))
        .routes(routes!(handlers::merchant::download_selected))
}

fn admin_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::admin::list_all_photos))
        .routes(routes!(
            handlers::admin::list_users,
            handlers::admin::create_user
        ))
        .routes(routes!(handlers::admin::set_user_status))
        .routes(routes!(handlers::admin::reset_password))
        .routes(routes!(handlers::admin::list_operation_logs))
        .routes(routes!(handlers::admin::list_download_records))
}
