use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::algorithm::elegibilidad::{avance, resumen_elegibilidad};
use crate::api_json::{CambioEstadoRequest, ElegibilidadResponse, EstadosResponse};
use crate::gate::{Cambio, GateHandle};
use crate::server_handlers::respuesta_error;

/// GET /estados
pub async fn estados_handler(gate: web::Data<GateHandle>) -> impl Responder {
    let plan = gate.plan();
    let estados = gate.estados();
    let (completados, pct) = avance(&plan, &estados);
    HttpResponse::Ok().json(EstadosResponse { plan: plan.slug.clone(), completados, avance: pct, estados })
}

/// GET /elegibilidad
pub async fn elegibilidad_handler(gate: web::Data<GateHandle>) -> impl Responder {
    let cursos = gate.elegibilidad();
    let resumen = resumen_elegibilidad(&cursos);
    HttpResponse::Ok().json(ElegibilidadResponse { plan: gate.plan().slug.clone(), resumen, cursos })
}

/// POST /estado
/// 200 con el cambio aplicado, 409 si faltan correlativas, 503 si el remoto lo rechazó.
pub async fn cambio_estado_handler(gate: web::Data<GateHandle>, body: web::Json<CambioEstadoRequest>) -> impl Responder {
    let req = body.into_inner();
    let cambio = match Cambio::desde_texto(req.estado.as_deref()) {
        Ok(c) => c,
        Err(e) => return respuesta_error(&e),
    };
    match gate.apply_status(&req.curso, cambio).await {
        Ok(aplicado) => HttpResponse::Ok().json(aplicado),
        Err(e) => respuesta_error(&e),
    }
}

/// DELETE /estados
pub async fn reset_handler(gate: web::Data<GateHandle>) -> impl Responder {
    match gate.reset_all().await {
        Ok(()) => HttpResponse::Ok().json(json!({"status": "ok"})),
        Err(e) => respuesta_error(&e),
    }
}
