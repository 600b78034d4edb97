use crate::connection::ws_index;
use actix_web::web;

pub fn root(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/{room_id}").route(web::get().to(ws_index)));
}
