use clap::Parser;
use std::net::TcpListener;

#[derive(Debug, Parser)]
#[command(
    name = "sketchpair-server",
    about = "Signaling relay for two-participant whiteboard rooms"
)]
struct Args {
    /// Address to listen on. Clients connect to ws://<bind>/<room_id>.
    #[arg(long, env = "SKETCHPAIR_BIND", default_value = "127.0.0.1:8080")]
    bind: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.bind)?;
    log::info!("Relay listening on {}", listener.local_addr()?);

    sketchpair_server::serve(listener)?.await
}
