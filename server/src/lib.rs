pub extern crate actix_web;

pub mod connection;
mod connection_tx_storage;
pub mod handlers;
pub mod room_state;
pub mod server;

use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

/// Starts the relay on an already bound listener. Must be called from
/// within the actix runtime.
pub fn serve(listener: TcpListener) -> std::io::Result<actix_web::dev::Server> {
    let srv_tx = server::spawn_server();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(srv_tx.clone()))
            .configure(handlers::root)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
