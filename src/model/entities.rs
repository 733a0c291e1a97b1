use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::reference::Ref;
use super::{Entity, Kind};

// ── Merge helpers ──
//
// The generic merge rule: a field still at its not-yet-set default is filled
// from the incoming candidate; a populated scalar is never overwritten (first
// value wins). Empty collections are replaced wholesale; non-empty lists of
// sub-records are matched by a secondary sub-key with one-level field fill,
// and unmatched candidate entries are appended.

fn fill_string(dst: &mut String, src: String) {
    if dst.is_empty() {
        *dst = src;
    }
}

fn fill_opt<T>(dst: &mut Option<T>, src: Option<T>) {
    if dst.is_none() {
        *dst = src;
    }
}

fn fill_num(dst: &mut i64, src: i64) {
    if *dst == 0 {
        *dst = src;
    }
}

fn fill_vec<T>(dst: &mut Vec<T>, src: Vec<T>) {
    if dst.is_empty() {
        *dst = src;
    }
}

// ── Curso ──

/// A course program. Key: course code (e.g. "G010").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curso {
    pub cod: String,
    /// Internal SIG id, used as a form value when listing curricula.
    #[serde(default)]
    pub sig_cod_int: i64,
    pub nome: String,
    #[serde(default)]
    pub matrizes: Vec<MatrizCurricular>,
}

/// One curriculum revision of a course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrizCurricular {
    pub cod: String,
    #[serde(default)]
    pub sig_cod_int: i64,
    pub nome: String,
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub periodos: i64,
    #[serde(default)]
    pub min_periodos: i64,
    #[serde(default)]
    pub max_periodos: i64,
    #[serde(default)]
    pub vagas: i64,
    /// Mandatory subjects, grouped by period number.
    #[serde(default)]
    pub obrigatorias: BTreeMap<u32, Vec<DisciplinaMatriz>>,
    /// Elective subjects, grouped by category name.
    #[serde(default)]
    pub eletivas: BTreeMap<String, Vec<DisciplinaMatriz>>,
}

/// A subject's slot in a curriculum, with its requirement lists. All subject
/// links are reference cells: the curriculum page lists codes for subjects
/// that may not have been scraped yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisciplinaMatriz {
    pub disc: Ref<Disciplina>,
    /// Minimum completion percentage required; the page shows a dash when not
    /// applicable, which parses to 0 by convention.
    #[serde(default)]
    pub percentual: f64,
    #[serde(default)]
    pub reqs_fortes: Vec<Ref<Disciplina>>,
    #[serde(default)]
    pub reqs_minimos: Vec<Ref<Disciplina>>,
    #[serde(default)]
    pub coreqs: Vec<Ref<Disciplina>>,
}

impl Entity for Curso {
    type Key = String;

    fn kind() -> Kind {
        Kind::Curso
    }

    fn key(&self) -> String {
        self.cod.clone()
    }

    fn merge_from(&mut self, other: Self) {
        fill_num(&mut self.sig_cod_int, other.sig_cod_int);
        fill_string(&mut self.nome, other.nome);
        if self.matrizes.is_empty() {
            self.matrizes = other.matrizes;
        } else {
            for m in other.matrizes {
                match self.matrizes.iter_mut().find(|x| x.cod == m.cod) {
                    Some(existing) => existing.fill_from(m),
                    None => self.matrizes.push(m),
                }
            }
        }
    }
}

impl MatrizCurricular {
    /// One-level field fill against a second sighting of the same matriz.
    fn fill_from(&mut self, other: Self) {
        fill_num(&mut self.sig_cod_int, other.sig_cod_int);
        fill_string(&mut self.nome, other.nome);
        fill_string(&mut self.descricao, other.descricao);
        fill_num(&mut self.periodos, other.periodos);
        fill_num(&mut self.min_periodos, other.min_periodos);
        fill_num(&mut self.max_periodos, other.max_periodos);
        fill_num(&mut self.vagas, other.vagas);
        for (periodo, discs) in other.obrigatorias {
            self.obrigatorias.entry(periodo).or_insert(discs);
        }
        for (categoria, discs) in other.eletivas {
            self.eletivas.entry(categoria).or_insert(discs);
        }
    }
}

// ── Disciplina ──

/// A subject. Key: subject code (e.g. "GCC123").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Disciplina {
    pub cod: String,
    pub nome: String,
    #[serde(default)]
    pub creditos: i64,
    /// Offerings, keyed by the academic term they belong to.
    #[serde(default)]
    pub ofertas: BTreeMap<String, Vec<Oferta>>,
}

/// A scheduled offering of a subject in one term. Sub-keyed by `turma` within
/// the owning disciplina's per-term list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Oferta {
    pub turma: String,
    #[serde(default)]
    pub situacao: String,
    pub curso: Ref<Curso>,
    #[serde(default)]
    pub professor_principal: Option<Ref<Professor>>,
    #[serde(default)]
    pub professores_alocados: Vec<Ref<Professor>>,
    #[serde(default)]
    pub normal: Option<Vagas>,
    #[serde(default)]
    pub especial: Option<Vagas>,
    #[serde(default)]
    pub horarios: Vec<HorarioLocal>,
    /// Set when the offering runs the whole semester.
    #[serde(default)]
    pub semestre: Option<i64>,
    /// Set when the offering runs a single bimester ("1" or "2").
    #[serde(default)]
    pub bimestre: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Vagas {
    pub oferecidas: i64,
    pub ocupadas: i64,
    pub restantes: i64,
    pub pendentes: i64,
}

/// One weekly class slot of an offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorarioLocal {
    /// Day of week: 0 = domingo .. 6 = sábado.
    pub dia: u8,
    pub inicio: Horario,
    pub fim: Horario,
    pub local: Ref<Local>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horario {
    pub hora: u8,
    pub minuto: u8,
}

impl Entity for Disciplina {
    type Key = String;

    fn kind() -> Kind {
        Kind::Disciplina
    }

    fn key(&self) -> String {
        self.cod.clone()
    }

    fn merge_from(&mut self, other: Self) {
        fill_string(&mut self.nome, other.nome);
        fill_num(&mut self.creditos, other.creditos);
        for (periodo, ofertas) in other.ofertas {
            match self.ofertas.get_mut(&periodo) {
                None => {
                    self.ofertas.insert(periodo, ofertas);
                }
                Some(existing) => {
                    for o in ofertas {
                        match existing.iter_mut().find(|x| x.turma == o.turma) {
                            Some(canonical) => canonical.fill_from(o),
                            // A turma not seen before in this term is taken as
                            // a genuinely new offering, not a duplicate.
                            None => existing.push(o),
                        }
                    }
                }
            }
        }
    }
}

impl Oferta {
    /// One-level field fill against a second sighting of the same turma.
    fn fill_from(&mut self, other: Self) {
        fill_string(&mut self.situacao, other.situacao);
        fill_opt(&mut self.professor_principal, other.professor_principal);
        fill_opt(&mut self.normal, other.normal);
        fill_opt(&mut self.especial, other.especial);
        fill_opt(&mut self.semestre, other.semestre);
        fill_opt(&mut self.bimestre, other.bimestre);
        fill_vec(&mut self.horarios, other.horarios);
        for p in other.professores_alocados {
            if !self.professores_alocados.contains(&p) {
                self.professores_alocados.push(p);
            }
        }
    }
}

// ── Local ──

/// A room. Key: room abbreviation (e.g. "PV1-201").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Local {
    pub abbr: String,
    #[serde(default)]
    pub local: String,
    /// Room capacity; 0 when the page did not state one.
    #[serde(default)]
    pub ocupacao: i64,
}

impl Entity for Local {
    type Key = String;

    fn kind() -> Kind {
        Kind::Local
    }

    fn key(&self) -> String {
        self.abbr.clone()
    }

    fn merge_from(&mut self, other: Self) {
        fill_string(&mut self.local, other.local);
        fill_num(&mut self.ocupacao, other.ocupacao);
    }
}

// ── Professor ──

/// Key: the professor's name as printed by the portal (no normalization, so
/// the key space stays consistent between sightings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Professor {
    pub nome: String,
    #[serde(default)]
    pub departamento: Option<String>,
}

impl Entity for Professor {
    type Key = String;

    fn kind() -> Kind {
        Kind::Professor
    }

    fn key(&self) -> String {
        self.nome.clone()
    }

    fn merge_from(&mut self, other: Self) {
        fill_opt(&mut self.departamento, other.departamento);
    }
}

// ── Periodo ──

/// An academic term. Key: term code (e.g. "2024/1").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Periodo {
    pub cod: String,
    #[serde(default)]
    pub sig_cod_int: i64,
}

impl Entity for Periodo {
    type Key = String;

    fn kind() -> Kind {
        Kind::Periodo
    }

    fn key(&self) -> String {
        self.cod.clone()
    }

    fn merge_from(&mut self, other: Self) {
        fill_num(&mut self.sig_cod_int, other.sig_cod_int);
    }
}

// ── Cardapio ──

/// A cafeteria menu. Key: the menu date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cardapio {
    pub data: NaiveDate,
    #[serde(default)]
    pub almoco: Vec<String>,
    #[serde(default)]
    pub jantar: Vec<String>,
    #[serde(default)]
    pub observacao: Option<String>,
}

impl Entity for Cardapio {
    type Key = NaiveDate;

    fn kind() -> Kind {
        Kind::Cardapio
    }

    fn key(&self) -> NaiveDate {
        self.data
    }

    fn merge_from(&mut self, other: Self) {
        fill_vec(&mut self.almoco, other.almoco);
        fill_vec(&mut self.jantar, other.jantar);
        fill_opt(&mut self.observacao, other.observacao);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Registry;

    fn oferta(turma: &str) -> Oferta {
        Oferta {
            turma: turma.into(),
            situacao: String::new(),
            curso: Ref::of("G010"),
            professor_principal: None,
            professores_alocados: Vec::new(),
            normal: None,
            especial: None,
            horarios: Vec::new(),
            semestre: None,
            bimestre: None,
        }
    }

    fn with_oferta(cod: &str, periodo: &str, o: Oferta) -> Disciplina {
        let mut ofertas = BTreeMap::new();
        ofertas.insert(periodo.to_string(), vec![o]);
        Disciplina {
            cod: cod.into(),
            nome: String::new(),
            creditos: 0,
            ofertas,
        }
    }

    #[test]
    fn complementary_sightings_of_same_turma_combine() {
        let mut reg = Registry::new();

        // First sighting: horarios known, professor not yet.
        let mut first = oferta("01");
        first.horarios.push(HorarioLocal {
            dia: 1,
            inicio: Horario { hora: 7, minuto: 0 },
            fim: Horario { hora: 9, minuto: 0 },
            local: Ref::of("PV1-201"),
        });
        reg.get_or_create(with_oferta("GCC125", "2024/1", first));

        // Second sighting: professor known, horarios not.
        let mut second = oferta("01");
        second.professor_principal = Some(Ref::of("Ana Souza"));
        reg.get_or_create(with_oferta("GCC125", "2024/1", second));

        let d = reg.lookup::<Disciplina>(&"GCC125".to_string()).unwrap();
        let d = d.borrow();
        let ofertas = &d.ofertas["2024/1"];
        assert_eq!(ofertas.len(), 1);
        assert!(ofertas[0].professor_principal.is_some());
        assert_eq!(ofertas[0].horarios.len(), 1);
    }

    #[test]
    fn unknown_turma_is_appended_not_merged() {
        let mut reg = Registry::new();
        reg.get_or_create(with_oferta("GCC125", "2024/1", oferta("01")));
        reg.get_or_create(with_oferta("GCC125", "2024/1", oferta("02")));

        let d = reg.lookup::<Disciplina>(&"GCC125".to_string()).unwrap();
        let d = d.borrow();
        let turmas: Vec<&str> = d.ofertas["2024/1"].iter().map(|o| o.turma.as_str()).collect();
        assert_eq!(turmas, ["01", "02"]);
    }

    #[test]
    fn populated_scalar_survives_conflicting_merge() {
        let mut a = Local {
            abbr: "PV1-201".into(),
            local: "Pavilhão 1, sala 201".into(),
            ocupacao: 0,
        };
        a.merge_from(Local {
            abbr: "PV1-201".into(),
            local: "Outro nome".into(),
            ocupacao: 60,
        });
        assert_eq!(a.local, "Pavilhão 1, sala 201");
        assert_eq!(a.ocupacao, 60);
    }

    #[test]
    fn alocados_union_dedups_by_key() {
        let mut a = oferta("01");
        a.professores_alocados.push(Ref::of("Ana Souza"));
        let mut b = oferta("01");
        b.professores_alocados.push(Ref::of("Ana Souza"));
        b.professores_alocados.push(Ref::of("Bruno Lima"));
        a.fill_from(b);
        assert_eq!(a.professores_alocados.len(), 2);
    }

    #[test]
    fn matriz_merge_keeps_existing_revision() {
        let mut curso = Curso {
            cod: "G010".into(),
            nome: "Ciência da Computação".into(),
            sig_cod_int: 12,
            matrizes: vec![MatrizCurricular {
                cod: "2019-1".into(),
                nome: "2019/1".into(),
                vagas: 50,
                ..Default::default()
            }],
        };
        curso.merge_from(Curso {
            cod: "G010".into(),
            nome: String::new(),
            sig_cod_int: 0,
            matrizes: vec![
                MatrizCurricular {
                    cod: "2019-1".into(),
                    nome: "2019/1".into(),
                    descricao: "Matriz vigente".into(),
                    ..Default::default()
                },
                MatrizCurricular {
                    cod: "2023-1".into(),
                    nome: "2023/1".into(),
                    ..Default::default()
                },
            ],
        });
        assert_eq!(curso.matrizes.len(), 2);
        assert_eq!(curso.matrizes[0].vagas, 50);
        assert_eq!(curso.matrizes[0].descricao, "Matriz vigente");
    }
}
