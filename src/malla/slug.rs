use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::CourseSlug;

/// Minúsculas sin diacríticos: descompone (NFD) y descarta las marcas
/// combinantes, así "Á" precompuesta y "A\u{301}" dan lo mismo.
pub(crate) fn plegar(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase).nfd().filter(|c| !is_combining_mark(*c))
}

/// Normaliza cualquier identificador de curso a un `CourseSlug`:
/// recorta, pasa a minúsculas, quita acentos, colapsa todo lo que no sea
/// [a-z0-9] en un solo guión y elimina guiones al inicio/final.
///
/// Idempotente. Una entrada vacía (o sólo espacios/puntuación) devuelve "",
/// que los llamadores deben tratar como "sin identificador".
pub fn normalize_key(s: &str) -> CourseSlug {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in plegar(s.trim()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normaliza_acentos_y_espacios() {
        assert_eq!(normalize_key("  Álgebra I "), "algebra-i");
        assert_eq!(normalize_key("ALGEBRA I"), "algebra-i");
        assert_eq!(normalize_key("Análisis Matemático II"), "analisis-matematico-ii");
        assert_eq!(normalize_key("Física (Mecánica) -- 1"), "fisica-mecanica-1");
        assert_eq!(normalize_key("Diseño Ñandú"), "diseno-nandu");
    }

    #[test]
    fn acentos_descompuestos() {
        // NFD: letra base + acento combinante
        assert_eq!(normalize_key("A\u{0301}lgebra I"), "algebra-i");
        assert_eq!(normalize_key("Disen\u{0303}o"), normalize_key("Diseño"));
        assert_eq!(normalize_key("  \u{0301} "), "");
    }

    #[test]
    fn vacio_y_puntuacion() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key("   "), "");
        assert_eq!(normalize_key("--//--"), "");
    }

    #[test]
    fn idempotente() {
        for raw in ["Álgebra I", "CBM-1000", "  inglés técnico  ", "x__y", "7"] {
            let once = normalize_key(raw);
            assert_eq!(normalize_key(&once), once);
        }
    }
}
