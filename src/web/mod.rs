use std::convert::Infallible;

use warp::{
    http::{Method, StatusCode},
    reject::Rejection,
    Filter,
};

use crate::Services;

use filters::api_filters;

pub mod filters;
pub mod handlers;

/// The whole surface is GET and POST with Json bodies, so only those
/// rejections get a tailored reply; anything else is a server error.
async fn handle_rejection(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, msg) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        log::warn!("Undecodable request body: {}", err);
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed".to_string(),
        )
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&msg), code))
}

pub async fn run_http_server(services: Services) -> anyhow::Result<()> {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["User-Agent", "Referer", "Origin", "Content-Type"])
        .allow_methods(&[Method::GET, Method::POST, Method::OPTIONS]);

    let port = services.settings.web_port.unwrap_or(8080);
    let routes = api_filters(services).recover(handle_rejection);

    log::info!("Serving on port {}", port);
    warp::serve(routes.with(cors)).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
