use std::fmt;

use super::entities::{
    Cardapio, Curso, Disciplina, DisciplinaMatriz, Local, MatrizCurricular, Oferta, Periodo,
    Professor,
};
use super::reference::Ref;
use super::registry::{Registered, Registry};
use super::{Entity, Handle, Kind};

/// One reference cell that failed to bind: which root owns it, the field path
/// down to the cell, and the key that never materialized.
#[derive(Debug)]
pub struct Dangling {
    pub root: String,
    pub path: String,
    pub kind: Kind,
    pub key: String,
}

impl fmt::Display for Dangling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} '{}'",
            self.root, self.path, self.kind, self.key
        )
    }
}

/// Aggregated outcome of a resolution pass. All failures are collected rather
/// than aborting on the first, so one run reports every dangling key at once.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub unresolved: Vec<Dangling>,
}

impl ResolutionReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }

    fn check<T: Registered>(
        &mut self,
        reg: &Registry,
        root: &str,
        path: String,
        cell: &mut Ref<T>,
    ) {
        if !cell.resolve(reg) {
            self.unresolved.push(Dangling {
                root: root.to_string(),
                path,
                kind: T::kind(),
                key: cell.key().to_string(),
            });
        }
    }
}

/// Walk of an entity's tree of reference cells, binding each and recording the
/// ones that fail.
pub trait ResolveRefs {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    );
}

impl ResolveRefs for Curso {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    ) {
        for (i, m) in self.matrizes.iter_mut().enumerate() {
            m.resolve_refs(reg, root, &format!("{prefix}matrizes[{i}]."), report);
        }
    }
}

impl ResolveRefs for MatrizCurricular {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    ) {
        for (periodo, discs) in &mut self.obrigatorias {
            for (j, dm) in discs.iter_mut().enumerate() {
                dm.resolve_refs(reg, root, &format!("{prefix}obrigatorias[{periodo}][{j}]"), report);
            }
        }
        for (categoria, discs) in &mut self.eletivas {
            for (j, dm) in discs.iter_mut().enumerate() {
                dm.resolve_refs(reg, root, &format!("{prefix}eletivas[{categoria}][{j}]"), report);
            }
        }
    }
}

impl ResolveRefs for DisciplinaMatriz {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    ) {
        report.check(reg, root, format!("{prefix}.disc"), &mut self.disc);
        for (k, r) in self.reqs_fortes.iter_mut().enumerate() {
            report.check(reg, root, format!("{prefix}.reqs_fortes[{k}]"), r);
        }
        for (k, r) in self.reqs_minimos.iter_mut().enumerate() {
            report.check(reg, root, format!("{prefix}.reqs_minimos[{k}]"), r);
        }
        for (k, r) in self.coreqs.iter_mut().enumerate() {
            report.check(reg, root, format!("{prefix}.coreqs[{k}]"), r);
        }
    }
}

impl ResolveRefs for Disciplina {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    ) {
        for (periodo, ofertas) in &mut self.ofertas {
            for (j, o) in ofertas.iter_mut().enumerate() {
                o.resolve_refs(reg, root, &format!("{prefix}ofertas[{periodo}][{j}]"), report);
            }
        }
    }
}

impl ResolveRefs for Oferta {
    fn resolve_refs(
        &mut self,
        reg: &Registry,
        root: &str,
        prefix: &str,
        report: &mut ResolutionReport,
    ) {
        report.check(reg, root, format!("{prefix}.curso"), &mut self.curso);
        if let Some(p) = &mut self.professor_principal {
            report.check(reg, root, format!("{prefix}.professor_principal"), p);
        }
        for (k, p) in self.professores_alocados.iter_mut().enumerate() {
            report.check(reg, root, format!("{prefix}.professores_alocados[{k}]"), p);
        }
        for (k, h) in self.horarios.iter_mut().enumerate() {
            report.check(reg, root, format!("{prefix}.horarios[{k}].local"), &mut h.local);
        }
    }
}

// Leaf kinds hold no reference cells.
impl ResolveRefs for Local {
    fn resolve_refs(&mut self, _: &Registry, _: &str, _: &str, _: &mut ResolutionReport) {}
}

impl ResolveRefs for Professor {
    fn resolve_refs(&mut self, _: &Registry, _: &str, _: &str, _: &mut ResolutionReport) {}
}

impl ResolveRefs for Periodo {
    fn resolve_refs(&mut self, _: &Registry, _: &str, _: &str, _: &mut ResolutionReport) {}
}

impl ResolveRefs for Cardapio {
    fn resolve_refs(&mut self, _: &Registry, _: &str, _: &str, _: &mut ResolutionReport) {}
}

/// Resolve every reference cell reachable from the given roots, collecting all
/// failures into one report.
pub fn ensure_resolved<T>(reg: &Registry, roots: &[Handle<T>]) -> ResolutionReport
where
    T: Registered + ResolveRefs,
{
    let mut report = ResolutionReport::default();
    for root in roots {
        let label = format!("{} {}", T::kind(), root.borrow().key());
        root.borrow_mut().resolve_refs(reg, &label, "", &mut report);
    }
    report
}

/// Resolution pass over every entity of every kind in the registry. A clean
/// report is the precondition for SQL export.
pub fn ensure_all_resolved(reg: &Registry) -> ResolutionReport {
    let mut report = ResolutionReport::default();
    for h in reg.values::<Curso>() {
        let label = format!("{} {}", Kind::Curso, h.borrow().key());
        h.borrow_mut().resolve_refs(reg, &label, "", &mut report);
    }
    for h in reg.values::<Disciplina>() {
        let label = format!("{} {}", Kind::Disciplina, h.borrow().key());
        h.borrow_mut().resolve_refs(reg, &label, "", &mut report);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curso_with_matriz(reqs: Vec<&str>) -> Curso {
        let dms: Vec<DisciplinaMatriz> = reqs
            .into_iter()
            .map(|cod| DisciplinaMatriz {
                disc: Ref::of(cod),
                percentual: 0.0,
                reqs_fortes: Vec::new(),
                reqs_minimos: Vec::new(),
                coreqs: Vec::new(),
            })
            .collect();
        let mut obrigatorias = std::collections::BTreeMap::new();
        obrigatorias.insert(1, dms);
        Curso {
            cod: "G010".into(),
            sig_cod_int: 12,
            nome: "Ciência da Computação".into(),
            matrizes: vec![MatrizCurricular {
                cod: "2023-1".into(),
                obrigatorias,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn dangling_reference_reported_then_cleared_after_scrape() {
        let mut reg = Registry::new();
        reg.get_or_create(Disciplina {
            cod: "GEX101".into(),
            ..Default::default()
        });
        let curso = reg.get_or_create(curso_with_matriz(vec!["GCC123", "GEX101"]));

        // "GCC123" was referenced by the curriculum before being scraped.
        let report = ensure_resolved(&reg, &[curso.clone()]);
        assert_eq!(report.unresolved.len(), 1);
        let d = &report.unresolved[0];
        assert_eq!(d.path, "matrizes[0].obrigatorias[1][0].disc");
        assert_eq!(d.key, "GCC123");
        assert_eq!(d.kind, Kind::Disciplina);

        // Scraping the subject later makes the same pass come back clean.
        reg.get_or_create(Disciplina {
            cod: "GCC123".into(),
            nome: "Estruturas de Dados".into(),
            creditos: 4,
            ..Default::default()
        });
        let report = ensure_resolved(&reg, &[curso]);
        assert!(report.is_clean());
    }

    #[test]
    fn all_failures_collected_in_one_pass() {
        let mut reg = Registry::new();
        let curso = reg.get_or_create(curso_with_matriz(vec!["GCC123", "GCC124", "GCC125"]));
        let report = ensure_resolved(&reg, &[curso]);
        assert_eq!(report.unresolved.len(), 3);
    }

    #[test]
    fn registry_wide_pass_covers_ofertas() {
        let mut reg = Registry::new();
        let mut ofertas = std::collections::BTreeMap::new();
        ofertas.insert(
            "2024/1".to_string(),
            vec![Oferta {
                turma: "01".into(),
                situacao: String::new(),
                curso: Ref::of("G010"),
                professor_principal: Some(Ref::of("Ana Souza")),
                professores_alocados: Vec::new(),
                normal: None,
                especial: None,
                horarios: Vec::new(),
                semestre: None,
                bimestre: None,
            }],
        );
        reg.get_or_create(Disciplina {
            cod: "GCC125".into(),
            ofertas,
            ..Default::default()
        });

        let report = ensure_all_resolved(&reg);
        // Neither the curso nor the professor exists yet.
        assert_eq!(report.unresolved.len(), 2);

        reg.get_or_create(Curso {
            cod: "G010".into(),
            ..Default::default()
        });
        reg.get_or_create(Professor {
            nome: "Ana Souza".into(),
            departamento: None,
        });
        assert!(ensure_all_resolved(&reg).is_clean());
    }
}
