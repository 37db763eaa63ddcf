use actix_web::{HttpResponse, Responder};
use serde_json::json;

use crate::api_json::CambioEstadoRequest;

pub async fn help_handler() -> impl Responder {
    let ejemplo = CambioEstadoRequest { curso: "Álgebra I".to_string(), estado: Some("regular".to_string()) };

    let help = json!({
        "description": "API de correlativas. Lleva el estado de cursada por curso y bloquea marcar como completado un curso con correlativas pendientes.",
        "rutas": {
            "POST /malla": "carga un plan {slug, nombre, cursos: [...]} y lo deja activo; devuelve el reporte de validación",
            "GET /malla/validacion": "referencias desconocidas, autorreferencias, ciclos y entradas omitidas del plan activo",
            "GET /elegibilidad": "veredicto por curso: can_take, can_change_state, visible_in_planner, missing_prereqs",
            "GET /prerequisitos/{curso}": "correlativas directas del curso (acepta slug, código o nombre)",
            "GET /estados": "estados registrados y avance",
            "POST /estado": "cambia el estado de un curso (ver 'post_example'); estado null lo quita",
            "DELETE /estados": "borra todos los estados del plan activo"
        },
        "post_example": ejemplo,
        "estados_validos": ["promocionada", "regular", "aprobada", "libre", "en_curso"],
        "note": "409 = faltan correlativas (ver 'faltantes'); 503 = el cambio no se guardó y se revirtió."
    });

    HttpResponse::Ok().json(help)
}
