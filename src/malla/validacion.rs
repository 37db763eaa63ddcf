//! Reporte de problemas de un plan cargado.
//!
//! El motor es permisivo: una correlativa que no apunta a ningún curso se
//! considera cumplida y una entrada sin identificador se omite. Este reporte
//! deja esos casos a la vista y, en modo estricto, permite rechazar el plan.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use strsim::jaro_winkler;

use crate::malla::{resolve_prerequisites, Plan};
use crate::models::CourseSlug;

/// Similitud mínima para sugerir un curso parecido.
const UMBRAL_SUGERENCIA: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenciaDesconocida {
    pub curso: CourseSlug,
    pub referencia: CourseSlug,
    pub sugerencia: Option<CourseSlug>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReporteValidacion {
    pub plan: String,
    pub cursos: usize,
    pub omitidos: usize,
    pub duplicados: Vec<CourseSlug>,
    pub referencias_desconocidas: Vec<ReferenciaDesconocida>,
    pub autorreferencias: Vec<CourseSlug>,
    pub ciclos: Vec<Vec<CourseSlug>>,
}

impl ReporteValidacion {
    /// Sin referencias colgantes, autorreferencias ni ciclos.
    pub fn es_valido_estricto(&self) -> bool {
        self.referencias_desconocidas.is_empty() && self.autorreferencias.is_empty() && self.ciclos.is_empty()
    }

    pub fn resumen(&self) -> String {
        format!(
            "PLAN {}: {} cursos | {} omitidos | {} duplicados | {} referencias desconocidas | {} autorreferencias | {} ciclos",
            self.plan,
            self.cursos,
            self.omitidos,
            self.duplicados.len(),
            self.referencias_desconocidas.len(),
            self.autorreferencias.len(),
            self.ciclos.len()
        )
    }
}

fn sugerir(referencia: &str, plan: &Plan) -> Option<CourseSlug> {
    let mut mejor: Option<(f64, &CourseSlug)> = None;
    for curso in plan.cursos.iter() {
        for id in curso.identificadores.iter() {
            let score = jaro_winkler(referencia, id);
            if score >= UMBRAL_SUGERENCIA && mejor.map(|(s, _)| score > s).unwrap_or(true) {
                mejor = Some((score, &curso.slug));
            }
        }
    }
    mejor.map(|(_, slug)| slug.clone())
}

pub fn validar_plan(plan: &Plan) -> ReporteValidacion {
    let mut grafo: DiGraph<CourseSlug, ()> = DiGraph::new();
    let mut nodos: HashMap<&str, NodeIndex> = HashMap::new();
    for curso in plan.cursos.iter() {
        let idx = grafo.add_node(curso.slug.clone());
        nodos.insert(curso.slug.as_str(), idx);
    }

    let mut reporte = ReporteValidacion {
        plan: plan.slug.clone(),
        cursos: plan.total_cursos(),
        omitidos: plan.omitidos,
        duplicados: plan.duplicados.clone(),
        ..Default::default()
    };

    for curso in plan.cursos.iter() {
        for prereq in resolve_prerequisites(&curso.slug, plan) {
            if prereq == curso.slug {
                reporte.autorreferencias.push(curso.slug.clone());
                continue;
            }
            match (nodos.get(prereq.as_str()), nodos.get(curso.slug.as_str())) {
                (Some(&from), Some(&to)) => {
                    grafo.update_edge(from, to, ());
                }
                _ => reporte.referencias_desconocidas.push(ReferenciaDesconocida {
                    curso: curso.slug.clone(),
                    sugerencia: sugerir(&prereq, plan),
                    referencia: prereq,
                }),
            }
        }
    }

    for componente in tarjan_scc(&grafo) {
        if componente.len() > 1 {
            let mut ciclo: Vec<CourseSlug> = componente.iter().map(|i| grafo[*i].clone()).collect();
            ciclo.sort();
            reporte.ciclos.push(ciclo);
        }
    }
    reporte.ciclos.sort();

    reporte
}
