use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::model::{Disciplina, DisciplinaMatriz, MatrizCurricular, Ref, Registry};
use crate::sig::html::Tag;

use super::{parse_int, parse_table, require_field, sig_fields, Group, Row};

const PAGE: &str = "matriz";

static MATRIZ_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*?cod_matriz_curricular=(?P<extract>.*?)&op=(abrir|fechar)").unwrap()
});

/// Internal SIG ids of every curriculum linked from a course's listing page.
/// The page links each curriculum twice (abrir/fechar), so ids are deduped.
pub fn list_matrizes(root: &Tag) -> Result<Vec<i64>, Error> {
    let mut seen = std::collections::HashSet::new();
    super::extract_links_re(root, &MATRIZ_LINK_RE)
        .into_iter()
        .map(|cod| parse_int(&cod, PAGE, "cod_matriz_curricular"))
        .filter(|cod| match cod {
            Ok(cod) => seen.insert(*cod),
            Err(_) => true,
        })
        .collect()
}

/// One parsed subject row of a curriculum table (8 columns: code, name,
/// credits, percentage, strong reqs, minimum reqs, co-reqs, syllabus link).
struct DisciplinaRow {
    cod: String,
    nome: String,
    creditos: i64,
    percentual: f64,
    forte: Vec<String>,
    minimo: Vec<String>,
    coreq: Vec<String>,
}

fn parse_reqs(cell: &Tag) -> Vec<String> {
    cell.find_by_name("abbr")
        .into_iter()
        .map(|abbr| abbr.text().to_string())
        .collect()
}

fn parse_percent(s: &str) -> Result<f64, Error> {
    // The page shows a dash when no minimum percentage applies.
    if s.contains('-') {
        return Ok(0.0);
    }
    s.trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| Error::malformed(PAGE, "percentual", format!("not a number: '{s}'")))
}

fn parse_disciplina_row(row: &Row) -> Result<DisciplinaRow, Error> {
    let [cod, nome, creds, percent, forte, minimo, coreq, _ementa] = row.as_slice() else {
        return Err(Error::malformed(
            PAGE,
            "disciplina row",
            format!("expected 8 cells, got {}", row.len()),
        ));
    };
    Ok(DisciplinaRow {
        cod: cod.text().to_string(),
        nome: nome.text().to_string(),
        creditos: parse_int(creds.text(), PAGE, "creditos")?,
        percentual: parse_percent(percent.text())?,
        forte: parse_reqs(forte),
        minimo: parse_reqs(minimo),
        coreq: parse_reqs(coreq),
    })
}

/// Parse one opened curriculum page into a `MatrizCurricular`, registering
/// every listed subject along the way. Requirement references keep the code
/// exactly as scraped; subjects only mentioned as requirements may not exist
/// yet and stay unresolved until a later resolution pass.
pub fn extract(
    reg: &mut Registry,
    root: &Tag,
    sig_cod_int: i64,
) -> Result<MatrizCurricular, Error> {
    let dados = root
        .find_by_class("dados")
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed(PAGE, "dados", "field block not found"))?;
    let fields = sig_fields(dados);

    let nome = require_field(&fields, "nome", PAGE)?.to_string();
    // Descriptive text is auxiliary; its absence is not a page failure.
    let descricao = fields.get("descrição").cloned().unwrap_or_default();
    let periodos = parse_int(
        require_field(&fields, "quantidade de períodos", PAGE)?,
        PAGE,
        "quantidade de períodos",
    )?;
    let min_periodos = parse_int(
        require_field(&fields, "mínimo de períodos letivos", PAGE)?,
        PAGE,
        "mínimo de períodos letivos",
    )?;
    let max_periodos = parse_int(
        require_field(&fields, "máximo de períodos letivos", PAGE)?,
        PAGE,
        "máximo de períodos letivos",
    )?;
    let vagas = parse_int(
        require_field(&fields, "quantidade de vagas semestrais", PAGE)?,
        PAGE,
        "quantidade de vagas semestrais",
    )?;

    let tables = root.find_by_name("table");
    if tables.len() < 3 {
        return Err(Error::malformed(
            PAGE,
            "tables",
            format!("expected at least 3 tables, got {}", tables.len()),
        ));
    }

    // Elective groups are labelled by full-width header cells.
    let categorias: Vec<String> = match tables.get(3) {
        Some(eletivas_raw) => eletivas_raw
            .find_by_name("th")
            .into_iter()
            .filter(|th| th.attr("colspan") == Some("8"))
            .map(|th| th.text().to_string())
            .collect(),
        None => Vec::new(),
    };

    let obrigatorias_groups = parse_table(tables[2]);
    let eletivas_groups = tables.get(3).map(|t| parse_table(t)).unwrap_or_default();

    let mut parse_groups = |groups: &[Group]| -> Result<Vec<Vec<DisciplinaMatriz>>, Error> {
        // The leading group is the table's own header section.
        groups
            .iter()
            .skip(1)
            .map(|group| {
                group
                    .iter()
                    .filter(|row| row.len() == 8)
                    .map(|row| {
                        let parsed = parse_disciplina_row(row)?;
                        // First sighting of a subject may be this curriculum row.
                        reg.get_or_create(Disciplina {
                            cod: parsed.cod.clone(),
                            nome: parsed.nome.clone(),
                            creditos: parsed.creditos,
                            ..Default::default()
                        });
                        Ok(DisciplinaMatriz {
                            disc: Ref::of(parsed.cod),
                            percentual: parsed.percentual,
                            reqs_fortes: parsed.forte.into_iter().map(Ref::of).collect(),
                            reqs_minimos: parsed.minimo.into_iter().map(Ref::of).collect(),
                            coreqs: parsed.coreq.into_iter().map(Ref::of).collect(),
                        })
                    })
                    .collect()
            })
            .collect()
    };

    let obrigatorias_parsed = parse_groups(&obrigatorias_groups)?;
    let eletivas_parsed = parse_groups(&eletivas_groups)?;

    let mut matriz = MatrizCurricular {
        cod: nome.replace('/', ""),
        sig_cod_int,
        nome,
        descricao,
        periodos,
        min_periodos,
        max_periodos,
        vagas,
        ..Default::default()
    };
    for (i, group) in obrigatorias_parsed.into_iter().enumerate() {
        matriz.obrigatorias.insert(i as u32 + 1, group);
    }
    for (i, group) in eletivas_parsed.into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let categoria = categorias
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("categoria {i}"));
        matriz.eletivas.insert(categoria, group);
    }
    Ok(matriz)
}
