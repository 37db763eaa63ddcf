//! Controlador de cambios de estado.
//!
//! Un único dueño del estado (`Controlador`) corre como tarea de tokio y recibe
//! tres flujos: comandos del usuario, snapshots del remoto y la confirmación o
//! rechazo de sus propias escrituras. La regla de transición se vuelve a evaluar
//! dentro de la tarea, contra el estado vigente, justo antes de aplicar.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::algorithm::elegibilidad::{build_eligibility_map, eligibility_for};
use crate::error::{CorrelativasError, Result};
use crate::estado::normalize_status;
use crate::malla::{normalize_key, resolve_prerequisites, validar_plan, Plan, ReporteValidacion};
use crate::models::{CourseSlug, EligibilityRecord, Estado, MissingPrereq, StatusEntry, SubjectStatesMap};
use crate::sync::{DocKey, LocalCache, RemoteDocument, RemoteStore, Sincronizador};

/// Cambio pedido para un curso: un estado nuevo o quitar el que tenga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cambio {
    Estado(Estado),
    Quitar,
}

impl Cambio {
    /// `None`, vacío o "ninguno" significan quitar el estado.
    pub fn desde_texto(raw: Option<&str>) -> Result<Cambio> {
        let texto = match raw.map(str::trim) {
            None | Some("") => return Ok(Cambio::Quitar),
            Some(t) => t,
        };
        if matches!(texto.to_lowercase().as_str(), "ninguno" | "none" | "sin_estado") {
            return Ok(Cambio::Quitar);
        }
        normalize_status(texto)
            .map(Cambio::Estado)
            .ok_or_else(|| CorrelativasError::EstadoInvalido(texto.to_string()))
    }

    fn estado(&self) -> Option<Estado> {
        match self {
            Cambio::Estado(e) => Some(*e),
            Cambio::Quitar => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Veredicto {
    Permitido,
    Bloqueado(Vec<MissingPrereq>),
}

/// Regla de transición. Entrar a un estado completado exige que no falte
/// ninguna correlativa; pasar a libre, en curso o quitar el estado siempre se permite.
pub fn check_transition(plan: &Plan, states: &SubjectStatesMap, slug: &str, cambio: &Cambio) -> Veredicto {
    let destino = match cambio {
        Cambio::Estado(e) if e.es_completado() => e,
        _ => return Veredicto::Permitido,
    };
    match eligibility_for(plan, states, slug) {
        Some(rec) if !rec.missing_prereqs.is_empty() => {
            let faltantes = rec
                .missing_prereqs
                .iter()
                .map(|p| MissingPrereq { slug: p.clone(), nombre: plan.display_name(p) })
                .collect();
            debug!(curso = slug, destino = %destino, "transición bloqueada por correlativas");
            Veredicto::Bloqueado(faltantes)
        }
        _ => Veredicto::Permitido,
    }
}

/// Resultado de un cambio confirmado por el remoto.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aplicado {
    pub curso: CourseSlug,
    pub estado: Option<Estado>,
}

enum Comando {
    Aplicar {
        curso: String,
        cambio: Cambio,
        resp: oneshot::Sender<Result<Aplicado>>,
    },
    Reset {
        resp: oneshot::Sender<Result<()>>,
    },
    CambiarPlan {
        plan: Plan,
        resp: oneshot::Sender<Result<ReporteValidacion>>,
    },
}

enum Interno {
    Escrito {
        generacion: u64,
        secuencia: u64,
        aplicado: Aplicado,
        resultado: Result<()>,
        resp: oneshot::Sender<Result<Aplicado>>,
    },
    Reseteado {
        generacion: u64,
        secuencia: u64,
        version_remota: u64,
        previo: SubjectStatesMap,
        bases: HashMap<CourseSlug, Option<StatusEntry>>,
        resultado: Result<()>,
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Snapshot remoto etiquetado con la generación de la suscripción que lo trajo.
struct Evento {
    generacion: u64,
    doc: RemoteDocument,
}

/// Escrituras de un curso todavía sin respuesta del remoto.
struct EnVuelo {
    /// la más reciente emitida para el curso
    secuencia: u64,
    /// último valor que el remoto confirmó (o trajo en un snapshot)
    confirmado: Option<StatusEntry>,
}

pub struct Controlador<R: RemoteStore> {
    plan: Arc<Plan>,
    estudiante: String,
    sync: Sincronizador,
    remoto: R,
    estricto: bool,
    generacion: u64,
    secuencia: u64,
    pendientes: HashMap<CourseSlug, EnVuelo>,
    suscripcion: Option<JoinHandle<()>>,
    eventos_tx: mpsc::UnboundedSender<Evento>,
    internos_tx: mpsc::UnboundedSender<Interno>,
    plan_tx: watch::Sender<Arc<Plan>>,
    sincronizado_tx: watch::Sender<bool>,
}

fn verificar_plan(plan: &Plan, estricto: bool) -> Result<ReporteValidacion> {
    let reporte = validar_plan(plan);
    if estricto && !reporte.es_valido_estricto() {
        return Err(CorrelativasError::PlanInvalido(reporte.resumen()));
    }
    if !reporte.es_valido_estricto() {
        info!(plan = %plan.slug, "{}", reporte.resumen());
    }
    Ok(reporte)
}

impl<R: RemoteStore> Controlador<R> {
    /// Arranca la tarea dueña del estado y devuelve el handle para hablarle.
    /// Debe llamarse dentro de un runtime de tokio.
    pub fn spawn(plan: Plan, estudiante: &str, cache: Box<dyn LocalCache>, remoto: R, estricto: bool) -> Result<GateHandle> {
        verificar_plan(&plan, estricto)?;
        let sync = Sincronizador::abrir(DocKey::new(estudiante, plan.slug.clone()), cache, &plan)?;
        let estados_rx = sync.subscribe();

        let plan = Arc::new(plan);
        let (plan_tx, plan_rx) = watch::channel(plan.clone());
        let (sincronizado_tx, sincronizado_rx) = watch::channel(false);
        let (comandos_tx, comandos_rx) = mpsc::channel(64);
        let (eventos_tx, eventos_rx) = mpsc::unbounded_channel();
        let (internos_tx, internos_rx) = mpsc::unbounded_channel();

        let mut controlador = Controlador {
            plan,
            estudiante: estudiante.to_string(),
            sync,
            remoto,
            estricto,
            generacion: 0,
            secuencia: 0,
            pendientes: HashMap::new(),
            suscripcion: None,
            eventos_tx,
            internos_tx,
            plan_tx,
            sincronizado_tx,
        };
        controlador.suscribir();
        tokio::spawn(controlador.run(comandos_rx, internos_rx, eventos_rx));

        Ok(GateHandle { comandos: comandos_tx, plan: plan_rx, estados: estados_rx, sincronizado: sincronizado_rx })
    }

    fn suscribir(&mut self) {
        if let Some(anterior) = self.suscripcion.take() {
            anterior.abort();
        }
        let mut feed = self.remoto.subscribe(self.sync.key());
        let eventos = self.eventos_tx.clone();
        let generacion = self.generacion;
        self.suscripcion = Some(tokio::spawn(async move {
            while let Some(doc) = feed.recv().await {
                if eventos.send(Evento { generacion, doc }).is_err() {
                    break;
                }
            }
        }));
    }

    async fn run(
        mut self,
        mut comandos: mpsc::Receiver<Comando>,
        mut internos: mpsc::UnboundedReceiver<Interno>,
        mut eventos: mpsc::UnboundedReceiver<Evento>,
    ) {
        loop {
            tokio::select! {
                cmd = comandos.recv() => match cmd {
                    Some(cmd) => self.on_comando(cmd),
                    None => break,
                },
                Some(interno) = internos.recv() => self.on_interno(interno),
                Some(evento) = eventos.recv() => self.on_evento(evento),
            }
        }
        if let Some(h) = self.suscripcion.take() {
            h.abort();
        }
        debug!(estudiante = %self.estudiante, "controlador detenido");
    }

    fn on_comando(&mut self, cmd: Comando) {
        match cmd {
            Comando::Aplicar { curso, cambio, resp } => self.aplicar(&curso, cambio, resp),
            Comando::Reset { resp } => self.reset(resp),
            Comando::CambiarPlan { plan, resp } => {
                let _ = resp.send(self.cambiar_plan(plan));
            }
        }
    }

    fn aplicar(&mut self, curso: &str, cambio: Cambio, resp: oneshot::Sender<Result<Aplicado>>) {
        let slug = match self.validar_curso(curso) {
            Ok(slug) => slug,
            Err(e) => {
                let _ = resp.send(Err(e));
                return;
            }
        };

        if let Veredicto::Bloqueado(faltantes) = check_transition(&self.plan, self.sync.estados(), &slug, &cambio) {
            info!(
                curso = %slug,
                faltantes = ?faltantes.iter().map(|f| f.slug.as_str()).collect::<Vec<_>>(),
                "cambio bloqueado"
            );
            let _ = resp.send(Err(CorrelativasError::ValidacionBloqueada { curso: slug, faltantes }));
            return;
        }

        let estado = cambio.estado();
        let previo = match self.sync.aplicar_optimista(&slug, estado) {
            Ok(previo) => previo,
            Err(e) => {
                let _ = resp.send(Err(e));
                return;
            }
        };

        self.secuencia += 1;
        let secuencia = self.secuencia;
        self.pendientes
            .entry(slug.clone())
            .and_modify(|p| p.secuencia = secuencia)
            .or_insert(EnVuelo { secuencia, confirmado: previo });

        let remoto = self.remoto.clone();
        let key = self.sync.key().clone();
        let internos = self.internos_tx.clone();
        let generacion = self.generacion;
        tokio::spawn(async move {
            let resultado = match estado {
                Some(e) => remoto.put_entry(&key, &slug, &StatusEntry::new(e)).await,
                None => remoto.delete_entry(&key, &slug).await,
            };
            let aplicado = Aplicado { curso: slug, estado };
            let _ = internos.send(Interno::Escrito { generacion, secuencia, aplicado, resultado, resp });
        });
    }

    fn validar_curso(&self, curso: &str) -> Result<CourseSlug> {
        if normalize_key(curso).is_empty() {
            return Err(CorrelativasError::ClaveVacia);
        }
        let slug = self.plan.canonical(curso);
        if self.plan.course(&slug).is_none() {
            return Err(CorrelativasError::CursoDesconocido(slug));
        }
        Ok(slug)
    }

    fn reset(&mut self, resp: oneshot::Sender<Result<()>>) {
        let previo = match self.sync.limpiar() {
            Ok(previo) => previo,
            Err(e) => {
                let _ = resp.send(Err(e));
                return;
            }
        };
        // todos los cursos del plan más cualquier clave que ya tuviera estado
        let slugs: BTreeSet<CourseSlug> =
            self.plan.cursos.iter().map(|c| c.slug.clone()).chain(previo.keys().cloned()).collect();
        // si el reset se confirma, la base de las escrituras en vuelo pasa a ser "sin estado"
        let bases: HashMap<CourseSlug, Option<StatusEntry>> =
            self.pendientes.iter_mut().map(|(k, p)| (k.clone(), p.confirmado.take())).collect();

        let remoto = self.remoto.clone();
        let key = self.sync.key().clone();
        let internos = self.internos_tx.clone();
        let generacion = self.generacion;
        let secuencia = self.secuencia;
        let version_remota = self.sync.version_remota();
        tokio::spawn(async move {
            let mut resultado = Ok(());
            for slug in slugs.iter() {
                if let Err(e) = remoto.delete_entry(&key, slug).await {
                    resultado = Err(e);
                    break;
                }
            }
            let _ = internos.send(Interno::Reseteado { generacion, secuencia, version_remota, previo, bases, resultado, resp });
        });
    }

    fn cambiar_plan(&mut self, plan: Plan) -> Result<ReporteValidacion> {
        let reporte = verificar_plan(&plan, self.estricto)?;
        // la suscripción vieja se corta antes de abrir la nueva
        if let Some(anterior) = self.suscripcion.take() {
            anterior.abort();
        }
        self.generacion += 1;
        self.pendientes.clear();
        self.sincronizado_tx.send_replace(false);
        self.sync.cambiar_clave(DocKey::new(self.estudiante.clone(), plan.slug.clone()), &plan)?;
        self.plan = Arc::new(plan);
        self.plan_tx.send_replace(self.plan.clone());
        self.suscribir();
        info!(plan = %self.plan.slug, generacion = self.generacion, "plan activo cambiado");
        Ok(reporte)
    }

    fn on_interno(&mut self, interno: Interno) {
        match interno {
            Interno::Escrito { generacion, secuencia, aplicado, resultado, resp } => {
                if generacion == self.generacion {
                    self.cerrar_escritura(secuencia, &aplicado, &resultado);
                }
                let _ = resp.send(resultado.map(|()| aplicado));
            }
            Interno::Reseteado { generacion, secuencia, version_remota, previo, bases, resultado, resp } => {
                if let Err(e) = &resultado {
                    if generacion != self.generacion {
                        warn!(error = %e, "falló el borrado remoto de un plan anterior");
                    } else if version_remota != self.sync.version_remota() {
                        // un snapshot remoto ya reemplazó el mapa y manda sobre el previo
                        warn!(error = %e, "falló el borrado remoto; se conserva el último snapshot");
                    } else {
                        warn!(error = %e, "falló el borrado remoto, se restauran los estados");
                        self.restaurar_reset(secuencia, previo, bases);
                    }
                }
                let _ = resp.send(resultado);
            }
        }
    }

    /// Un rechazo sólo deshace su propio curso, y sólo si es la última escritura
    /// emitida para él; vuelve al último valor confirmado por el remoto.
    fn cerrar_escritura(&mut self, secuencia: u64, aplicado: &Aplicado, resultado: &Result<()>) {
        let Some(pendiente) = self.pendientes.get_mut(&aplicado.curso) else { return };
        let ultima = pendiente.secuencia == secuencia;
        match resultado {
            Ok(()) if ultima => {
                self.pendientes.remove(&aplicado.curso);
            }
            Ok(()) => {
                pendiente.confirmado = aplicado.estado.map(StatusEntry::new);
            }
            Err(e) if ultima => {
                warn!(curso = %aplicado.curso, error = %e, "el remoto rechazó el cambio, se revierte");
                let confirmado = pendiente.confirmado.take();
                self.pendientes.remove(&aplicado.curso);
                self.sync.revertir_curso(&aplicado.curso, confirmado);
            }
            Err(e) => {
                debug!(curso = %aplicado.curso, error = %e, "rechazo de una escritura ya superada");
            }
        }
    }

    /// Vuelve al mapa previo al reset sin pisar los cursos escritos después.
    fn restaurar_reset(
        &mut self,
        secuencia_reset: u64,
        previo: SubjectStatesMap,
        mut bases: HashMap<CourseSlug, Option<StatusEntry>>,
    ) {
        let mut restaurado = previo;
        for (slug, pendiente) in self.pendientes.iter_mut() {
            if pendiente.secuencia <= secuencia_reset {
                pendiente.confirmado = bases.remove(slug).flatten();
                continue;
            }
            pendiente.confirmado = match bases.remove(slug) {
                Some(base) => base,
                None => restaurado.get(slug).cloned(),
            };
            match self.sync.estados().get(slug) {
                Some(actual) => {
                    restaurado.insert(slug.clone(), actual.clone());
                }
                None => {
                    restaurado.remove(slug);
                }
            }
        }
        self.sync.revertir(restaurado);
    }

    fn on_evento(&mut self, evento: Evento) {
        if evento.generacion != self.generacion {
            debug!(generacion = evento.generacion, actual = self.generacion, "snapshot de una suscripción anterior, ignorado");
            return;
        }
        self.sync.reemplazar_desde_remoto(&evento.doc, &self.plan);
        // el snapshot pasa a ser la base de cualquier reversión pendiente
        for (slug, pendiente) in self.pendientes.iter_mut() {
            pendiente.confirmado = self.sync.estados().get(slug).cloned();
        }
        self.sincronizado_tx.send_replace(true);
    }
}

/// Handle clonable hacia el controlador. Las lecturas no pasan por la tarea:
/// salen de los últimos valores publicados.
#[derive(Clone)]
pub struct GateHandle {
    comandos: mpsc::Sender<Comando>,
    plan: watch::Receiver<Arc<Plan>>,
    estados: watch::Receiver<SubjectStatesMap>,
    sincronizado: watch::Receiver<bool>,
}

impl GateHandle {
    async fn pedir<T>(&self, cmd: Comando, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.comandos.send(cmd).await.map_err(|_| CorrelativasError::ControladorCerrado)?;
        rx.await.map_err(|_| CorrelativasError::ControladorCerrado)?
    }

    /// Aplica un cambio de estado. Resuelve cuando el remoto confirma o rechaza.
    pub async fn apply_status(&self, curso: &str, cambio: Cambio) -> Result<Aplicado> {
        let (resp, rx) = oneshot::channel();
        self.pedir(Comando::Aplicar { curso: curso.to_string(), cambio, resp }, rx).await
    }

    pub async fn reset_all(&self) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        self.pedir(Comando::Reset { resp }, rx).await
    }

    pub async fn cambiar_plan(&self, plan: Plan) -> Result<ReporteValidacion> {
        let (resp, rx) = oneshot::channel();
        self.pedir(Comando::CambiarPlan { plan, resp }, rx).await
    }

    pub fn plan(&self) -> Arc<Plan> {
        self.plan.borrow().clone()
    }

    pub fn estados(&self) -> SubjectStatesMap {
        self.estados.borrow().clone()
    }

    pub fn elegibilidad(&self) -> BTreeMap<CourseSlug, EligibilityRecord> {
        build_eligibility_map(&self.plan(), &self.estados())
    }

    pub fn prerequisitos(&self, curso: &str) -> Vec<CourseSlug> {
        resolve_prerequisites(curso, &self.plan())
    }

    pub fn validacion(&self) -> ReporteValidacion {
        validar_plan(&self.plan())
    }

    pub fn subscribe(&self) -> watch::Receiver<SubjectStatesMap> {
        self.estados.clone()
    }

    /// Espera al primer snapshot remoto del plan activo.
    pub async fn esperar_sincronizacion(&self) -> Result<()> {
        let mut rx = self.sincronizado.clone();
        rx.wait_for(|listo| *listo).await.map_err(|_| CorrelativasError::ControladorCerrado)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malla::RawPlan;
    use serde_json::json;

    fn plan() -> Plan {
        Plan::from_raw(RawPlan {
            slug: "p".into(),
            nombre: String::new(),
            cursos: vec![json!({"nombre": "Análisis I"}), json!({"slug": "b", "correlativas": ["Análisis I"]})],
            correlativas: None,
        })
    }

    #[test]
    fn cambio_desde_texto() {
        assert_eq!(Cambio::desde_texto(None).unwrap(), Cambio::Quitar);
        assert_eq!(Cambio::desde_texto(Some(" ")).unwrap(), Cambio::Quitar);
        assert_eq!(Cambio::desde_texto(Some("Promoción")).unwrap(), Cambio::Estado(Estado::Promocionada));
        assert!(matches!(Cambio::desde_texto(Some("recursando")), Err(CorrelativasError::EstadoInvalido(_))));
    }

    #[test]
    fn bloqueo_informa_nombres() {
        let p = plan();
        let st = SubjectStatesMap::new();
        let v = check_transition(&p, &st, "b", &Cambio::Estado(Estado::Regular));
        assert_eq!(
            v,
            Veredicto::Bloqueado(vec![MissingPrereq { slug: "analisis-i".into(), nombre: "Análisis I".into() }])
        );
    }

    #[test]
    fn estados_no_completados_siempre_permitidos() {
        let p = plan();
        let st = SubjectStatesMap::new();
        assert_eq!(check_transition(&p, &st, "b", &Cambio::Estado(Estado::EnCurso)), Veredicto::Permitido);
        assert_eq!(check_transition(&p, &st, "b", &Cambio::Estado(Estado::Libre)), Veredicto::Permitido);
        assert_eq!(check_transition(&p, &st, "b", &Cambio::Quitar), Veredicto::Permitido);
    }
}
