use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::model::{Curso, Horario, HorarioLocal, Local, Oferta, Professor, Ref, Registry, Vagas};
use crate::sig::html::Tag;

use super::{parse_int, parse_table, require_field, sig_fields};

const PAGE: &str = "oferta";

static OFERTA_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<disc>\w+) - (?P<nome>.*?) - (?P<turma>\w+)( \(((?P<bimestre>\d)º Bimestre|(?P<semestral>Semestral))\))?\s*$",
    )
    .unwrap()
});

static OFERTA_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*?cod_oferta_disciplina=(?P<extract>.*?)&.*?op=(abrir|fechar)").unwrap()
});

static LOCAL_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<nome>.*?)( \(Capacidade Original:? (?P<capacidade>\d+)\))?$").unwrap()
});

/// What the offerings listing page says about one offering, before its detail
/// row is opened.
#[derive(Debug, Clone)]
pub struct OfertaHead {
    pub cod: i64,
    pub disc: String,
    pub nome: String,
    pub turma: String,
    pub bimestre: Option<String>,
    pub semestral: bool,
}

impl OfertaHead {
    /// Parse a listing anchor: title "GCC123 - Nome - 10A (Semestral)" plus an
    /// href carrying the internal offering id.
    pub fn parse(href: &str, title: &str) -> Result<Self, Error> {
        let caps = OFERTA_TITLE_RE
            .captures(title)
            .ok_or_else(|| Error::malformed(PAGE, "title", format!("not an offering title: '{title}'")))?;
        let link = OFERTA_LINK_RE
            .captures(href)
            .ok_or_else(|| Error::malformed(PAGE, "href", format!("not an offering link: '{href}'")))?;
        Ok(OfertaHead {
            cod: parse_int(&link["extract"], PAGE, "cod_oferta_disciplina")?,
            disc: caps["disc"].to_string(),
            nome: caps["nome"].to_string(),
            turma: caps["turma"].to_string(),
            bimestre: caps.name("bimestre").map(|m| m.as_str().to_string()),
            semestral: caps.name("semestral").is_some(),
        })
    }
}

/// All offering heads on a listing page.
pub fn heads(root: &Tag) -> Result<Vec<OfertaHead>, Error> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for a in root.find_by_name("a") {
        let (Some(href), Some(title)) = (a.attr("href"), a.attr("title")) else {
            continue;
        };
        if !href.contains("cod_oferta_disciplina") {
            continue;
        }
        let head = OfertaHead::parse(href, title)?;
        // The page links each offering twice (abrir/fechar).
        if seen.insert(head.cod) {
            out.push(head);
        }
    }
    Ok(out)
}

/// The hidden CSRF token the consult form echoes back.
pub fn csrf_token(root: &Tag) -> Option<String> {
    root.find_by_name("input")
        .into_iter()
        .find(|i| i.attr("name") == Some("token_csrf"))
        .and_then(|i| i.attr("value"))
        .map(String::from)
}

fn parse_vagas(fields: &HashMap<String, String>) -> Result<Vagas, Error> {
    Ok(Vagas {
        oferecidas: parse_int(
            require_field(fields, "vagas oferecidas", PAGE)?,
            PAGE,
            "vagas oferecidas",
        )?,
        ocupadas: parse_int(
            require_field(fields, "vagas ocupadas", PAGE)?,
            PAGE,
            "vagas ocupadas",
        )?,
        // An asterisk marks overbooked offerings.
        restantes: parse_int(
            require_field(fields, "vagas restantes", PAGE)?.trim_matches('*'),
            PAGE,
            "vagas restantes",
        )?,
        pendentes: parse_int(
            require_field(fields, "solicitações pendentes", PAGE)?,
            PAGE,
            "solicitações pendentes",
        )?,
    })
}

fn vagas_fieldset(
    root: &Tag,
    class: &str,
) -> Result<Option<Vagas>, Error> {
    match root.find_by_class(class).first() {
        Some(fieldset) => parse_vagas(&sig_fields(fieldset)).map(Some),
        None => Ok(None),
    }
}

/// Parse the weekly schedule grid: one column per day (domingo..sábado), one
/// row per hour starting at 07:00. Contiguous occupied cells of a day
/// collapse into a single class slot; each occupied cell names the room,
/// which is registered on sight.
fn parse_horarios(reg: &mut Registry, table: &Tag) -> Result<Vec<HorarioLocal>, Error> {
    let groups = parse_table(table);
    let rows = groups.first().cloned().unwrap_or_default();
    let mut horarios = Vec::new();

    for dia in 1..=7u8 {
        let mut run_start: Option<u8> = None;
        let mut last_hora = 0u8;
        let mut local: Option<String> = None;

        let mut flush = |start: Option<u8>, end: u8, local: &Option<String>, out: &mut Vec<HorarioLocal>| {
            if let (Some(inicio), Some(abbr)) = (start, local.as_ref()) {
                out.push(HorarioLocal {
                    dia: dia - 1,
                    inicio: Horario { hora: inicio, minuto: 0 },
                    fim: Horario { hora: end + 1, minuto: 0 },
                    local: Ref::of(abbr.clone()),
                });
            }
        };

        for (i, row) in rows.iter().enumerate() {
            let hora = i as u8 + 7;
            let occupied = row
                .get(dia as usize)
                .map(|cell| cell.find_by_class("ocupado"))
                .unwrap_or_default();
            let Some(div) = occupied.first() else {
                flush(run_start, last_hora, &local, &mut horarios);
                run_start = None;
                local = None;
                continue;
            };

            let abbrs = div.find_by_name("abbr");
            let abbr = abbrs
                .first()
                .ok_or_else(|| Error::malformed(PAGE, "horario", "occupied cell without abbr"))?;
            let title = abbr
                .attr("title")
                .ok_or_else(|| Error::malformed(PAGE, "horario", "abbr without title"))?;
            let caps = LOCAL_TITLE_RE
                .captures(title)
                .ok_or_else(|| Error::malformed(PAGE, "horario", format!("bad room title '{title}'")))?;
            let capacidade = caps
                .name("capacidade")
                .map(|m| parse_int(m.as_str(), PAGE, "capacidade"))
                .transpose()?
                .unwrap_or(0);

            reg.get_or_create(Local {
                abbr: abbr.text().to_string(),
                local: caps["nome"].trim().to_string(),
                ocupacao: capacidade,
            });

            if run_start.is_none() {
                run_start = Some(hora);
            }
            last_hora = hora;
            local = Some(abbr.text().to_string());
        }
        flush(run_start, last_hora, &local, &mut horarios);
    }
    Ok(horarios)
}

/// Parse an opened offering detail view. The caller folds the result into the
/// owning disciplina for the ambient term.
pub fn extract(
    reg: &mut Registry,
    root: &Tag,
    head: &OfertaHead,
    periodo: &str,
) -> Result<Oferta, Error> {
    let fields = sig_fields(root);

    let turma = require_field(&fields, "turma", PAGE)?.to_string();
    let situacao = require_field(&fields, "situação", PAGE)?.to_string();
    let oferta_curso = require_field(&fields, "oferta de curso", PAGE)?;
    let (curso_cod, curso_nome) = oferta_curso
        .split_once(" - ")
        .map(|(c, n)| (c.trim().to_string(), n.trim().to_string()))
        .unwrap_or_else(|| (oferta_curso.trim().to_string(), String::new()));
    // "Nome Sobrenome (responsável)" — keep the name exactly as printed.
    let professor = require_field(&fields, "docente principal", PAGE)?
        .split(" (")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    // Partial sightings still register, so the references below can bind.
    reg.get_or_create(Curso {
        cod: curso_cod.clone(),
        nome: curso_nome,
        ..Default::default()
    });
    reg.get_or_create(Professor {
        nome: professor.clone(),
        departamento: None,
    });

    let normal = vagas_fieldset(root, "vagas_normais")?;
    let especial = vagas_fieldset(root, "vagas_especiais")?;

    let horarios = match root.find_by_name("table").first() {
        Some(table) => parse_horarios(reg, table)?,
        None => Vec::new(),
    };

    // For semester-long offerings the current semester comes from the ambient
    // term code ("2024/1" -> 1).
    let semestre = head
        .semestral
        .then(|| periodo.rsplit('/').next().and_then(|s| s.parse().ok()))
        .flatten();

    Ok(Oferta {
        turma,
        situacao,
        curso: Ref::of(curso_cod),
        professor_principal: Some(Ref::of(professor)),
        professores_alocados: Vec::new(),
        normal,
        especial,
        horarios,
        semestre,
        bimestre: head.bimestre.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::html::parse_html;

    #[test]
    fn head_parses_listing_title() {
        let head = OfertaHead::parse(
            "consultar.php?cod_oferta_disciplina=991&x=1&op=abrir",
            "GCC125 - Redes de Computadores - 10A (Semestral)",
        )
        .unwrap();
        assert_eq!(head.cod, 991);
        assert_eq!(head.disc, "GCC125");
        assert_eq!(head.nome, "Redes de Computadores");
        assert_eq!(head.turma, "10A");
        assert!(head.semestral);
        assert_eq!(head.bimestre, None);
    }

    #[test]
    fn head_parses_bimestral_variant() {
        let head = OfertaHead::parse(
            "x?cod_oferta_disciplina=3&y=0&op=fechar",
            "GAC103 - Algoritmos - 01 (2º Bimestre)",
        )
        .unwrap();
        assert_eq!(head.bimestre.as_deref(), Some("2"));
        assert!(!head.semestral);
    }

    #[test]
    fn heads_dedup_abrir_fechar_pairs() {
        let html = "<div>\
            <a href=\"c.php?cod_oferta_disciplina=1&a=b&op=abrir\" title=\"GCC125 - Redes - 01\">x</a>\
            <a href=\"c.php?cod_oferta_disciplina=1&a=b&op=fechar\" title=\"GCC125 - Redes - 01\">x</a>\
            <a href=\"c.php?cod_oferta_disciplina=2&a=b&op=abrir\" title=\"GCC125 - Redes - 02\">x</a>\
            </div>";
        let heads = heads(&parse_html(html)).unwrap();
        assert_eq!(heads.len(), 2);
    }

    fn detail_fixture() -> String {
        let ocupado = "<div class=\"ocupado\">\
            <abbr title=\"Pavilhão 1, sala 201 (Capacidade Original: 60)\">PV1-201</abbr></div>";
        let empty_row = "<tr><td>h</td><td></td><td></td><td></td><td></td><td></td><td></td><td></td></tr>";
        // Monday (column 2) occupied 07:00 and 08:00, then a gap.
        let row_occupied =
            format!("<tr><td>h</td><td></td><td>{ocupado}</td><td></td><td></td><td></td><td></td><td></td></tr>");
        format!(
            "<html><div>\
             <p><strong>Turma:</strong> 10A</p>\
             <p><strong>Situação:</strong> Normal</p>\
             <p><strong>Oferta de Curso:</strong> G010 - Ciência da Computação</p>\
             <p><strong>Docente Principal:</strong> Ana Souza (responsável)</p>\
             </div>\
             <fieldset class=\"vagas_normais\">\
             <p><strong>Vagas oferecidas:</strong> 40</p>\
             <p><strong>Vagas ocupadas:</strong> 30</p>\
             <p><strong>Vagas restantes:</strong> 10*</p>\
             <p><strong>Solicitações Pendentes:</strong> 0</p>\
             </fieldset>\
             <table><thead><tr><th>Horário</th></tr></thead>\
             <tbody>{row_occupied}{row_occupied}{empty_row}</tbody></table>\
             </html>"
        )
    }

    fn semestral_head() -> OfertaHead {
        OfertaHead {
            cod: 991,
            disc: "GCC125".into(),
            nome: "Redes".into(),
            turma: "10A".into(),
            bimestre: None,
            semestral: true,
        }
    }

    #[test]
    fn extracts_detail_fields_and_vagas() {
        let mut reg = Registry::new();
        let root = parse_html(&detail_fixture());
        let oferta = extract(&mut reg, &root, &semestral_head(), "2024/2").unwrap();

        assert_eq!(oferta.turma, "10A");
        assert_eq!(oferta.situacao, "Normal");
        assert_eq!(oferta.curso.key(), "G010");
        assert_eq!(oferta.professor_principal.as_ref().unwrap().key(), "Ana Souza");
        let normal = oferta.normal.unwrap();
        assert_eq!(normal.oferecidas, 40);
        assert_eq!(normal.restantes, 10);
        assert!(oferta.especial.is_none());
        assert_eq!(oferta.semestre, Some(2));

        // Both sides of the reference were registered on sight.
        assert!(reg.lookup::<crate::model::Curso>(&"G010".to_string()).is_some());
        assert!(reg.lookup::<Professor>(&"Ana Souza".to_string()).is_some());
    }

    #[test]
    fn contiguous_grid_cells_collapse_into_one_slot() {
        let mut reg = Registry::new();
        let root = parse_html(&detail_fixture());
        let oferta = extract(&mut reg, &root, &semestral_head(), "2024/2").unwrap();

        assert_eq!(oferta.horarios.len(), 1);
        let h = &oferta.horarios[0];
        assert_eq!(h.dia, 1); // segunda-feira
        assert_eq!(h.inicio, Horario { hora: 7, minuto: 0 });
        assert_eq!(h.fim, Horario { hora: 9, minuto: 0 });
        assert_eq!(h.local.key(), "PV1-201");

        // The room was registered on sight.
        let local = reg.lookup::<Local>(&"PV1-201".to_string()).unwrap();
        assert_eq!(local.borrow().ocupacao, 60);
        assert_eq!(local.borrow().local, "Pavilhão 1, sala 201");
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut reg = Registry::new();
        let root = parse_html("<html><p><strong>Turma:</strong> 10A</p></html>");
        assert!(matches!(
            extract(&mut reg, &root, &semestral_head(), "2024/2"),
            Err(Error::MalformedPage { .. })
        ));
    }
}
