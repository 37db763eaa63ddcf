use actix_web::{web, HttpResponse, Responder};

use crate::api_json::PrerequisitosResponse;
use crate::error::CorrelativasError;
use crate::gate::GateHandle;
use crate::malla::{Plan, RawPlan};
use crate::models::MissingPrereq;
use crate::server_handlers::respuesta_error;

/// POST /malla
/// Carga un plan crudo y lo deja activo. Devuelve el reporte de validación.
pub async fn cargar_malla_handler(gate: web::Data<GateHandle>, body: web::Json<serde_json::Value>) -> impl Responder {
    let raw: RawPlan = match serde_json::from_value(body.into_inner()) {
        Ok(r) => r,
        Err(e) => return respuesta_error(&CorrelativasError::from(e)),
    };
    match gate.cambiar_plan(Plan::from_raw(raw)).await {
        Ok(reporte) => HttpResponse::Ok().json(reporte),
        Err(e) => respuesta_error(&e),
    }
}

/// GET /malla/validacion
pub async fn validacion_handler(gate: web::Data<GateHandle>) -> impl Responder {
    HttpResponse::Ok().json(gate.validacion())
}

/// GET /prerequisitos/{curso}
pub async fn prerequisitos_handler(gate: web::Data<GateHandle>, path: web::Path<String>) -> impl Responder {
    let consulta = path.into_inner();
    let plan = gate.plan();
    let prerequisitos = gate
        .prerequisitos(&consulta)
        .into_iter()
        .map(|slug| MissingPrereq { nombre: plan.display_name(&slug), slug })
        .collect();
    let curso = plan.course(&consulta).map(|c| c.slug.clone());
    HttpResponse::Ok().json(PrerequisitosResponse { consulta, curso, prerequisitos })
}
