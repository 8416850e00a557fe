use std::{collections::HashMap, convert::Infallible};

use serde_json::Value;
use warp::{reject::Rejection, Filter};

use crate::Services;

use super::handlers::{club_state, receive_webhook, run_club_websocket, verify_webhook};

pub fn with_services(
    services: Services,
) -> impl Filter<Extract = (Services,), Error = Infallible> + Clone {
    warp::any().map(move || services.clone())
}

fn webhook_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let verify = warp::path!("webhook")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_services(services.clone()))
        .and_then(verify_webhook);

    let receive = warp::path!("webhook")
        .and(warp::post())
        .and(warp::body::json::<Value>())
        .and(with_services(services))
        .and_then(receive_webhook);

    verify.or(receive)
}

fn live_view_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let state = warp::path!("club" / i64)
        .and(warp::get())
        .and(with_services(services.clone()))
        .and_then(club_state);

    let socket = warp::path!("ws" / i64)
        .and(warp::ws())
        .and(with_services(services))
        .map(|club_id: i64, ws: warp::ws::Ws, services: Services| {
            ws.on_upgrade(move |socket| run_club_websocket(socket, club_id, services))
        });

    state.or(socket)
}

pub fn api_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let home = warp::path::end()
        .and(warp::get())
        .map(|| "The club director is alive. Fetch /club/1 for the demo ranking.");

    home.or(webhook_filters(services.clone()))
        .or(live_view_filters(services))
}
