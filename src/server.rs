use actix_web::{web, App, HttpServer};

use crate::gate::GateHandle;
use crate::server_handlers::*;

/// Registra las rutas sobre una app de actix. Separado de `run_server` para poder
/// montar la misma app en los tests.
pub fn configurar(cfg: &mut web::ServiceConfig) {
    cfg.route("/malla", web::post().to(cargar_malla_handler))
        .route("/malla/validacion", web::get().to(validacion_handler))
        .route("/elegibilidad", web::get().to(elegibilidad_handler))
        .route("/prerequisitos/{curso}", web::get().to(prerequisitos_handler))
        .route("/estados", web::get().to(estados_handler))
        .route("/estados", web::delete().to(reset_handler))
        .route("/estado", web::post().to(cambio_estado_handler))
        .route("/help", web::get().to(help_handler));
}

pub async fn run_server(bind_addr: &str, gate: GateHandle) -> std::io::Result<()> {
    let data = web::Data::new(gate);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(configurar))
        .bind(bind_addr)?
        .run()
        .await
}
