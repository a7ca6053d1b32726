use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use controller::health::UnconfiguredProbe;
use controller::providers::ProviderRegistry;
use controller::shell::{ControllerShell, State};
use controller::util::config::Config;
use controller::util::telemetry;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&metrics, &mut buffer).unwrap();
    HttpResponse::Ok().body(buffer)
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await;

    let client = kube::Client::try_default().await?;
    let config = Config::from_env();
    let state = State::default();
    let stop = CancellationToken::new();

    let shell = ControllerShell::new(
        client,
        config.clone(),
        ProviderRegistry::with_defaults(),
        Arc::new(UnconfiguredProbe),
        &state,
        stop.clone(),
    );

    let controller_stop = stop.clone();
    let controller = tokio::spawn(async move {
        if let Err(e) = shell.run(config.workers, controller_stop).await {
            tracing::error!(error = %e, "controller shell exited with an error");
        }
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind("0.0.0.0:8080")?
    .shutdown_timeout(5)
    .run();

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        signal_stop.cancel();
    });

    tokio::select! {
        result = server => result?,
        _ = stop.cancelled() => {}
    }
    stop.cancel();
    controller.await?;
    Ok(())
}
