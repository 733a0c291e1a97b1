//! Relational projection of the entity graph: one transaction of INSERT
//! statements over a fixed schema. A pure read-only walk; the caller must run
//! a resolution pass first, so a key that still fails to bind here is
//! surfaced as an error rather than skipped.

use std::collections::{BTreeSet, HashMap};

use crate::error::Error;
use crate::model::{Curso, Disciplina, Kind, Professor, Registry};

const SCHEMA: &str = r#"PRAGMA encoding="UTF-8";
CREATE TABLE IF NOT EXISTS Cursos (
    id_curso VARCHAR(8) PRIMARY KEY,
    nome_curso VARCHAR(255) NOT NULL
);

CREATE TABLE IF NOT EXISTS Disciplinas (
    id_disc VARCHAR(8) PRIMARY KEY,
    nome_disc VARCHAR(255) NOT NULL,
    creditos INT NOT NULL
);

CREATE TABLE IF NOT EXISTS DisciplinasMatriz (
    id_disc VARCHAR(8) NOT NULL,
    id_curso VARCHAR(8) NOT NULL,
    periodo INT,
    cat_eletiva VARCHAR(255),

    PRIMARY KEY (id_disc, id_curso),
    FOREIGN KEY (id_disc) REFERENCES Disciplinas(id_disc),
    FOREIGN KEY (id_curso) REFERENCES Cursos(id_curso)
);

CREATE TABLE IF NOT EXISTS Professores (
    id_prof INT PRIMARY KEY,
    nome_prof VARCHAR(255) NOT NULL,
    departamento VARCHAR(255) NOT NULL
);

CREATE TABLE IF NOT EXISTS OfertasDisciplina (
    id_oferta INT PRIMARY KEY,
    id_curso VARCHAR(8) NOT NULL,
    id_disc VARCHAR(8) NOT NULL,
    turma VARCHAR(8) NOT NULL,
    vagas_restantes INT NOT NULL,
    vagas_ocupadas INT NOT NULL,

    FOREIGN KEY (id_curso) REFERENCES Cursos(id_curso),
    FOREIGN KEY (id_disc) REFERENCES Disciplinas(id_disc)
);

CREATE TABLE IF NOT EXISTS Aulas (
    id_oferta INT NOT NULL,
    nome_local VARCHAR(16) NOT NULL,
    dia_semana VARCHAR(8) NOT NULL,
    hora_inicio INT NOT NULL,
    hora_fim INT NOT NULL,

    FOREIGN KEY (id_oferta) REFERENCES OfertasDisciplina(id_oferta)
);

CREATE TABLE IF NOT EXISTS Leciona (
    id_prof INT NOT NULL,
    id_oferta INT NOT NULL,
    eh_principal INT NOT NULL,

    PRIMARY KEY (id_prof, id_oferta),
    FOREIGN KEY (id_prof) REFERENCES Professores(id_prof),
    FOREIGN KEY (id_oferta) REFERENCES OfertasDisciplina(id_oferta)
);
"#;

const DIAS: [&str; 7] = [
    "domingo", "segunda", "terça", "quarta", "quinta", "sexta", "sábado",
];

/// SQL string literal with doubled single quotes.
fn q(s: &str) -> String {
    s.replace('\'', "''")
}

/// Build the full export script (schema + data) for one academic term.
pub fn build(reg: &Registry, periodo: &str) -> Result<String, Error> {
    let mut out = String::from(SCHEMA);
    out.push_str(&build_data(reg, periodo)?);
    Ok(out)
}

fn build_data(reg: &Registry, periodo: &str) -> Result<String, Error> {
    let mut out = String::new();
    out.push_str("BEGIN TRANSACTION;\n");

    for curso in reg.values::<Curso>() {
        let curso = curso.borrow();
        out.push_str(&format!(
            "INSERT INTO Cursos VALUES ('{}', '{}');\n",
            q(&curso.cod),
            q(&curso.nome)
        ));
    }

    for disc in reg.values::<Disciplina>() {
        let disc = disc.borrow();
        out.push_str(&format!(
            "INSERT INTO Disciplinas VALUES ('{}', '{}', {});\n",
            q(&disc.cod),
            q(&disc.nome),
            disc.creditos
        ));
    }

    // Curriculum membership, taken from each course's latest curriculum.
    for curso in reg.values::<Curso>() {
        let curso = curso.borrow();
        let Some(matriz) = curso.matrizes.last() else {
            continue;
        };
        for (per, discs) in &matriz.obrigatorias {
            for dm in discs {
                out.push_str(&format!(
                    "INSERT INTO DisciplinasMatriz VALUES ('{}', '{}', {}, NULL);\n",
                    q(&dm.disc.key()),
                    q(&curso.cod),
                    per
                ));
            }
        }
        for (cat, discs) in &matriz.eletivas {
            for dm in discs {
                out.push_str(&format!(
                    "INSERT INTO DisciplinasMatriz VALUES ('{}', '{}', NULL, '{}');\n",
                    q(&dm.disc.key()),
                    q(&curso.cod),
                    q(cat)
                ));
            }
        }
    }

    // Professors get dense generated ids in registry insertion order.
    let mut prof_ids: HashMap<String, usize> = HashMap::new();
    for prof in reg.values::<Professor>() {
        let prof = prof.borrow();
        let id = prof_ids.len();
        prof_ids.insert(prof.nome.clone(), id);
        out.push_str(&format!(
            "INSERT INTO Professores VALUES ({}, '{}', '{}');\n",
            id,
            q(&prof.nome),
            q(prof.departamento.as_deref().unwrap_or_default())
        ));
    }
    let prof_id = |key: &str| -> Result<usize, Error> {
        prof_ids.get(key).copied().ok_or_else(|| Error::UnresolvedReference {
            kind: Kind::Professor,
            key: key.to_string(),
        })
    };

    let mut id_oferta = 0usize;
    for disc in reg.values::<Disciplina>() {
        let disc = disc.borrow();
        let Some(ofertas) = disc.ofertas.get(periodo) else {
            continue;
        };
        for oferta in ofertas {
            id_oferta += 1;
            let principal = oferta.professor_principal.as_ref().map(|p| p.key());
            let (restantes, ocupadas) = match &oferta.normal {
                Some(v) => (v.restantes, v.ocupadas),
                None => (-1, -1),
            };
            out.push_str(&format!(
                "INSERT INTO OfertasDisciplina VALUES ({}, '{}', '{}', '{}', {}, {});\n",
                id_oferta,
                q(&oferta.curso.key()),
                q(&disc.cod),
                q(&oferta.turma),
                restantes,
                ocupadas
            ));

            let mut lecionam: BTreeSet<String> =
                oferta.professores_alocados.iter().map(|p| p.key()).collect();
            if let Some(p) = &principal {
                lecionam.insert(p.clone());
            }
            for nome in &lecionam {
                let eh_principal = principal.as_deref() == Some(nome.as_str());
                out.push_str(&format!(
                    "INSERT INTO Leciona VALUES ({}, {}, {});\n",
                    prof_id(nome)?,
                    id_oferta,
                    eh_principal as u8
                ));
            }

            for aula in &oferta.horarios {
                let local = aula.local.require()?;
                let dia = DIAS
                    .get(aula.dia as usize)
                    .copied()
                    .unwrap_or("N/A");
                let hora_fim = aula.fim.hora + u8::from(aula.fim.minuto > 0);
                out.push_str(&format!(
                    "INSERT INTO Aulas VALUES ({}, '{}', '{}', {}, {});\n",
                    id_oferta,
                    q(&local.borrow().abbr),
                    dia,
                    aula.inicio.hora,
                    hora_fim
                ));
            }
        }
    }

    out.push_str("END TRANSACTION;\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ensure_all_resolved, Horario, HorarioLocal, Local, Oferta, Ref, Vagas};
    use std::collections::BTreeMap;

    fn sample_registry() -> Registry {
        let mut reg = Registry::new();
        reg.get_or_create(Curso {
            cod: "G010".into(),
            nome: "Ciência da Computação".into(),
            ..Default::default()
        });
        reg.get_or_create(Local {
            abbr: "PV1-201".into(),
            local: "Pavilhão 1, sala 201".into(),
            ocupacao: 60,
        });
        reg.get_or_create(Professor {
            nome: "Ana D'Ávila".into(),
            departamento: Some("DCC".into()),
        });
        let oferta = Oferta {
            turma: "10A".into(),
            situacao: "Normal".into(),
            curso: Ref::of("G010"),
            professor_principal: Some(Ref::of("Ana D'Ávila")),
            professores_alocados: Vec::new(),
            normal: Some(Vagas {
                oferecidas: 40,
                ocupadas: 30,
                restantes: 10,
                pendentes: 0,
            }),
            especial: None,
            horarios: vec![HorarioLocal {
                dia: 1,
                inicio: Horario { hora: 7, minuto: 0 },
                fim: Horario { hora: 8, minuto: 50 },
                local: Ref::of("PV1-201"),
            }],
            semestre: Some(1),
            bimestre: None,
        };
        let mut ofertas = BTreeMap::new();
        ofertas.insert("2024/1".to_string(), vec![oferta]);
        reg.get_or_create(Disciplina {
            cod: "GCC125".into(),
            nome: "Redes de Computadores".into(),
            creditos: 4,
            ofertas,
        });
        // Exports run after a clean resolution pass.
        assert!(ensure_all_resolved(&reg).is_clean());
        reg
    }

    #[test]
    fn script_is_one_transaction_over_the_schema() {
        let script = build(&sample_registry(), "2024/1").unwrap();
        assert!(script.starts_with("PRAGMA encoding=\"UTF-8\";"));
        let begin = script.find("BEGIN TRANSACTION;").unwrap();
        let end = script.find("END TRANSACTION;").unwrap();
        assert!(begin < end);
        assert!(script.contains("INSERT INTO Cursos VALUES ('G010', 'Ciência da Computação');"));
        assert!(script.contains("INSERT INTO Disciplinas VALUES ('GCC125', 'Redes de Computadores', 4);"));
        assert!(script.contains("INSERT INTO OfertasDisciplina VALUES (1, 'G010', 'GCC125', '10A', 10, 30);"));
    }

    #[test]
    fn quotes_are_doubled() {
        let script = build(&sample_registry(), "2024/1").unwrap();
        assert!(script.contains("'Ana D''Ávila'"));
    }

    #[test]
    fn principal_professor_teaches_the_offering() {
        let script = build(&sample_registry(), "2024/1").unwrap();
        assert!(script.contains("INSERT INTO Leciona VALUES (0, 1, 1);"));
    }

    #[test]
    fn partial_end_hour_rounds_up() {
        let script = build(&sample_registry(), "2024/1").unwrap();
        assert!(script.contains("INSERT INTO Aulas VALUES (1, 'PV1-201', 'segunda', 7, 9);"));
    }

    #[test]
    fn offerings_of_other_terms_are_skipped() {
        let script = build(&sample_registry(), "2023/2").unwrap();
        assert!(!script.contains("INSERT INTO OfertasDisciplina"));
    }

    #[test]
    fn unknown_professor_key_is_an_unresolved_reference() {
        let mut reg = sample_registry();
        let mut ofertas = BTreeMap::new();
        ofertas.insert(
            "2024/1".to_string(),
            vec![Oferta {
                turma: "01".into(),
                curso: Ref::of("G010"),
                professor_principal: Some(Ref::of("Fantasma")),
                ..sample_oferta()
            }],
        );
        reg.get_or_create(Disciplina {
            cod: "GCC999".into(),
            nome: "Tópicos".into(),
            creditos: 2,
            ofertas,
        });
        assert!(matches!(
            build(&reg, "2024/1"),
            Err(Error::UnresolvedReference { kind: Kind::Professor, .. })
        ));
    }

    fn sample_oferta() -> Oferta {
        Oferta {
            turma: String::new(),
            situacao: "Normal".into(),
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
}
