use std::sync::Arc;

use clap::Parser;
use log::info;

use judge_engine::config::{CliArgs, ServerConfig};
use judge_engine::dispatcher::Dispatcher;
use judge_engine::endpoint::judge_ws;
use judge_engine::sandbox::{GoJudgeClient, SandboxClient, SandboxInitConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.read_config().expect("failed to load configuration");

    let sandbox = GoJudgeClient::load(&config.sandbox.library_path)
        .expect("failed to load sandbox library");
    sandbox
        .init(&SandboxInitConfig {
            cinit_path: config.sandbox.cinit_path.clone(),
            parallelism: config.sandbox.parallelism,
        })
        .expect("failed to initialize sandbox");
    let sandbox: Arc<dyn SandboxClient> = Arc::new(sandbox);

    let dispatcher = Dispatcher::new(sandbox, cli.max_concurrent);
    tokio::spawn(Arc::clone(&dispatcher).run());

    let bind_address = config
        .server
        .bind_address
        .clone()
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let bind_port = config.server.bind_port.unwrap_or(ServerConfig::DEFAULT_PORT);

    info!("listening on {bind_address}:{bind_port}/judge");

    actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(actix_web::web::Data::new(Arc::clone(&dispatcher)))
            .route("/judge", actix_web::web::get().to(judge_ws))
    })
    .bind((bind_address, bind_port))?
    .run()
    .await
}
