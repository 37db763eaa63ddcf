/// Motor de elegibilidad: escenarios básicos y propiedades sobre el mapa completo.
use correlativas::malla::{Plan, RawPlan};
use correlativas::models::{Estado, StatusEntry, SubjectStatesMap};
use correlativas::{build_eligibility_map, check_transition, resumen_elegibilidad, Cambio, Veredicto};
use serde_json::{json, Value};

fn plan(cursos: Vec<Value>) -> Plan {
    Plan::from_raw(RawPlan { slug: "p".into(), nombre: String::new(), cursos, correlativas: None })
}

fn estados(pares: &[(&str, Estado)]) -> SubjectStatesMap {
    pares.iter().map(|(k, e)| (k.to_string(), StatusEntry::new(*e))).collect()
}

fn plan_ab() -> Plan {
    plan(vec![json!({"slug": "a", "nombre": "Curso A"}), json!({"slug": "b", "nombre": "Curso B", "correlativas": ["a"]})])
}

#[test]
fn test_escenario_sin_estados() {
    let m = build_eligibility_map(&plan_ab(), &SubjectStatesMap::new());
    assert!(m["a"].can_take);
    assert!(m["a"].missing_prereqs.is_empty());
    assert!(!m["b"].can_take);
    assert_eq!(m["b"].missing_prereqs, vec!["a".to_string()]);
}

#[test]
fn test_escenario_correlativa_regular_habilita() {
    let p = plan_ab();
    let st = estados(&[("a", Estado::Regular)]);
    let m = build_eligibility_map(&p, &st);
    assert!(m["a"].completed);
    assert!(!m["a"].visible_in_planner);
    assert!(m["b"].can_take);
    assert!(m["b"].missing_prereqs.is_empty());
    assert_eq!(check_transition(&p, &st, "b", &Cambio::Estado(Estado::Promocionada)), Veredicto::Permitido);
}

#[test]
fn test_escenario_minimo_de_aprobadas() {
    let p = plan(vec![
        json!({"slug": "x"}),
        json!({"slug": "y"}),
        json!({"slug": "z"}),
        json!({"slug": "c", "min_aprobadas": 2}),
    ]);
    let st = estados(&[("x", Estado::Aprobada), ("y", Estado::Regular), ("z", Estado::Promocionada)]);
    let m = build_eligibility_map(&p, &st);
    assert!(m["c"].can_take);

    let st = estados(&[("x", Estado::Aprobada), ("y", Estado::Libre)]);
    let m = build_eligibility_map(&p, &st);
    assert!(!m["c"].can_take);
    assert!(m["c"].missing_prereqs.is_empty());
}

#[test]
fn test_cualquier_compuerta_bloquea() {
    let p = plan(vec![
        json!({"slug": "a"}),
        json!({"slug": "b"}),
        json!({"slug": "final", "correlativas": ["a"], "min_aprobadas": 1, "min_avance": "60%"}),
    ]);
    // correlativa ok, mínimo ok, avance 1/3 < 60
    let m = build_eligibility_map(&p, &estados(&[("a", Estado::Aprobada)]));
    assert!(!m["final"].can_take);

    // avance 2/3 >= 60
    let m = build_eligibility_map(&p, &estados(&[("a", Estado::Aprobada), ("b", Estado::Regular)]));
    assert!(m["final"].can_take);

    // avance ok pero falta la correlativa
    let m = build_eligibility_map(&p, &estados(&[("b", Estado::Regular), ("final", Estado::EnCurso)]));
    assert!(!m["final"].can_take);
}

fn plan_grande() -> Plan {
    plan(vec![
        json!({"slug": "a"}),
        json!({"slug": "b", "correlativas": ["a"]}),
        json!({"slug": "c", "correlativas": ["a", "b"]}),
        json!({"slug": "d", "correlativas": ["c"], "min_aprobadas": 1}),
        json!({"slug": "e", "min_avance": 40}),
        json!({"slug": "f", "correlativas": ["e", "a"]}),
    ])
}

fn combinaciones() -> Vec<SubjectStatesMap> {
    let opciones = [None, Some(Estado::EnCurso), Some(Estado::Libre), Some(Estado::Regular), Some(Estado::Promocionada)];
    let cursos = ["a", "b", "c", "e"];
    let mut out = Vec::new();
    for i in 0..opciones.len().pow(cursos.len() as u32) {
        let mut st = SubjectStatesMap::new();
        let mut n = i;
        for c in cursos.iter() {
            if let Some(e) = opciones[n % opciones.len()] {
                st.insert(c.to_string(), StatusEntry::new(e));
            }
            n /= opciones.len();
        }
        out.push(st);
    }
    out
}

#[test]
fn test_propiedades_del_mapa() {
    let p = plan_grande();
    for st in combinaciones() {
        let m = build_eligibility_map(&p, &st);
        assert_eq!(m.len(), p.total_cursos());
        for (slug, rec) in m.iter() {
            // bloqueo monótono
            if !rec.missing_prereqs.is_empty() {
                assert!(!rec.can_take && !rec.can_change_state, "{} con {:?}", slug, st);
            }
            // completados fuera del selector
            if rec.completed {
                assert!(!rec.visible_in_planner);
                assert!(!rec.can_change_state);
            }
            // ausencia = faltante
            for prereq in correlativas::resolve_prerequisites(slug, &p) {
                if !st.contains_key(&prereq) {
                    assert!(rec.missing_prereqs.contains(&prereq), "{} debería faltar en {}", prereq, slug);
                }
            }
        }
        let r = resumen_elegibilidad(&m);
        assert_eq!(r.total, r.habilitados + r.bloqueados + r.completados_excluidos);
    }
}

#[test]
fn test_bloqueo_con_nombres_y_sin_efectos() {
    let p = plan(vec![
        json!({"codigo": "MAT101", "nombre": "Álgebra I"}),
        json!({"codigo": "MAT102", "nombre": "Álgebra II", "correlativas": ["Álgebra I"]}),
    ]);
    let st = estados(&[("mat101", Estado::EnCurso)]);
    match check_transition(&p, &st, "mat102", &Cambio::Estado(Estado::Aprobada)) {
        Veredicto::Bloqueado(faltantes) => {
            assert_eq!(faltantes.len(), 1);
            assert_eq!(faltantes[0].slug, "mat101");
            assert_eq!(faltantes[0].nombre, "Álgebra I");
        }
        Veredicto::Permitido => panic!("debería estar bloqueado"),
    }
    // libre y en curso no pasan por la compuerta
    assert_eq!(check_transition(&p, &st, "mat102", &Cambio::Estado(Estado::Libre)), Veredicto::Permitido);
}
