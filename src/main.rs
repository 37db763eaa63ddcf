// --- Motor de correlativas - servidor HTTP ---

use std::io;

use correlativas::malla::{Plan, RawPlan};
use correlativas::{run_server, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    info!(bind = %config.bind, estudiante = %config.estudiante, estricto = config.validacion_estricta, "=== Motor de correlativas (API) ===");

    let plan = match &config.plan_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await?;
            Plan::from_json_str(&text).map_err(io::Error::other)?
        }
        // sin plan inicial: se carga después con POST /malla
        None => Plan::from_raw(RawPlan { slug: "sin-plan".to_string(), nombre: String::new(), cursos: Vec::new(), correlativas: None }),
    };

    let gate = config.iniciar(plan).map_err(io::Error::other)?;

    info!("Iniciando servidor en http://{}", config.bind);
    run_server(&config.bind, gate).await
}
