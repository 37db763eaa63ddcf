// Algoritmos derivados sobre el plan y los estados del estudiante
pub mod elegibilidad;

pub use elegibilidad::{avance, build_eligibility_map, eligibility_for, missing_prereqs, resumen_elegibilidad, ResumenElegibilidad};
