//! Motor de elegibilidad: combina el modelo de estados con el resolver de
//! correlativas para decidir, por curso, si se puede cursar, si está bloqueado
//! o si se oculta del selector por estar ya completado.
//!
//! Todo es derivado: se recalcula cada vez que cambia el plan o los estados.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::malla::{resolve_prerequisites, Plan};
use crate::models::{CourseSlug, EligibilityRecord, PlanCourse, SubjectStatesMap};

/// Contadores de diagnóstico; no afectan ningún veredicto.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResumenElegibilidad {
    pub total: usize,
    pub habilitados: usize,
    pub bloqueados: usize,
    pub completados_excluidos: usize,
}

/// Avance del estudiante sobre el plan: (cursos completados, porcentaje 0-100).
/// Sólo cuentan los cursos que pertenecen al plan.
pub fn avance(plan: &Plan, states: &SubjectStatesMap) -> (u32, f64) {
    let completados = plan
        .cursos
        .iter()
        .filter(|c| states.get(&c.slug).map(|e| e.completed).unwrap_or(false))
        .count() as u32;
    let total = plan.total_cursos();
    let pct = if total == 0 { 0.0 } else { completados as f64 * 100.0 / total as f64 };
    (completados, pct)
}

/// Correlativas del curso que no están completadas. Una correlativa sin estado
/// registrado cuenta como faltante. Las referencias que no apuntan a ningún
/// curso del plan se dan por cumplidas.
pub fn missing_prereqs(curso: &str, plan: &Plan, states: &SubjectStatesMap) -> Vec<CourseSlug> {
    resolve_prerequisites(curso, plan)
        .into_iter()
        .filter(|p| plan.course(p).is_some())
        .filter(|p| !states.get(p).map(|e| e.completed).unwrap_or(false))
        .collect()
}

fn evaluar(curso: &PlanCourse, plan: &Plan, states: &SubjectStatesMap, completados: u32, pct: f64) -> EligibilityRecord {
    let entry = states.get(&curso.slug);
    let completed = entry.map(|e| e.completed).unwrap_or(false);
    let missing = missing_prereqs(&curso.slug, plan, states);

    let cumple_minimo = curso.min_aprobadas.map(|m| completados >= m).unwrap_or(true);
    let cumple_avance = curso.min_avance.map(|m| pct >= m).unwrap_or(true);
    let can_take = missing.is_empty() && cumple_minimo && cumple_avance;

    EligibilityRecord {
        status: entry.map(|e| e.status),
        completed,
        can_take,
        can_change_state: can_take && !completed,
        visible_in_planner: can_take && !completed,
        missing_prereqs: missing,
    }
}

/// Veredicto de un solo curso con el estado actual. Lo usa el controlador para
/// volver a chequear justo antes de aplicar un cambio.
pub fn eligibility_for(plan: &Plan, states: &SubjectStatesMap, course_key: &str) -> Option<EligibilityRecord> {
    let curso = plan.course(course_key)?;
    let (completados, pct) = avance(plan, states);
    Some(evaluar(curso, plan, states, completados, pct))
}

pub fn build_eligibility_map(plan: &Plan, states: &SubjectStatesMap) -> BTreeMap<CourseSlug, EligibilityRecord> {
    let (completados, pct) = avance(plan, states);
    let map: BTreeMap<CourseSlug, EligibilityRecord> = plan
        .cursos
        .iter()
        .map(|c| (c.slug.clone(), evaluar(c, plan, states, completados, pct)))
        .collect();

    let r = resumen_elegibilidad(&map);
    debug!(
        plan = %plan.slug,
        total = r.total,
        bloqueados = r.bloqueados,
        completados_excluidos = r.completados_excluidos,
        "elegibilidad calculada"
    );
    map
}

pub fn resumen_elegibilidad(map: &BTreeMap<CourseSlug, EligibilityRecord>) -> ResumenElegibilidad {
    let mut r = ResumenElegibilidad { total: map.len(), ..Default::default() };
    for rec in map.values() {
        if rec.completed {
            r.completados_excluidos += 1;
        } else if rec.can_take {
            r.habilitados += 1;
        } else {
            r.bloqueados += 1;
        }
    }
    r
}
