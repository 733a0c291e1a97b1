pub mod cardapio;
pub mod cursos;
pub mod matriz;
pub mod ofertas;
pub mod periodos;

use std::collections::HashMap;

use regex::Regex;

use crate::error::Error;
use crate::sig::html::Tag;

pub type Row<'a> = Vec<&'a Tag>;
pub type Group<'a> = Vec<Row<'a>>;

/// Read a SIG labelled field block: a run of `<p><strong>Label:</strong>
/// value</p>` paragraphs. Labels are lowercased with the trailing colon
/// stripped; values come back trimmed.
pub fn sig_fields(dados: &Tag) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for p in dados.find_by_name("p") {
        if p.text().is_empty() {
            continue;
        }
        let strongs = p.find_by_name("strong");
        let Some(strong) = strongs.first() else {
            continue;
        };
        if strong.text().is_empty() {
            continue;
        }
        let key = strong.text().trim_matches(':').to_lowercase();
        fields.insert(key, p.text().to_string());
    }
    fields
}

/// Collect the `extract` capture of every anchor href matching `re`.
pub fn extract_links_re(root: &Tag, re: &Regex) -> Vec<String> {
    root.find_by_name("a")
        .into_iter()
        .filter_map(|a| a.attr("href"))
        .filter_map(|href| re.captures(href))
        .filter_map(|c| c.name("extract").map(|m| m.as_str().to_string()))
        .collect()
}

/// Split a SIG table into thead-delimited groups of rows, each row its `<td>`
/// cells. The portal uses repeated thead/tbody pairs inside one `<table>` to
/// separate logical sections.
pub fn parse_table(table: &Tag) -> Vec<Group<'_>> {
    let mut groups: Vec<Group> = vec![Vec::new()];
    let mut first = true;
    for child in &table.children {
        match child.name.as_str() {
            "thead" => {
                if !first {
                    groups.push(Vec::new());
                }
                first = false;
            }
            "tbody" => {
                // Direct children only; a nested table inside a cell must not
                // contribute rows.
                for tr in child.children_named("tr") {
                    groups.last_mut().unwrap().push(tr.children_named("td"));
                }
            }
            _ => {}
        }
    }
    groups
}

/// Look up a required labelled field; absence is a hard `MalformedPage` error.
pub fn require_field<'a>(
    fields: &'a HashMap<String, String>,
    key: &'static str,
    page: &'static str,
) -> Result<&'a str, Error> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::malformed(page, key, "field not present"))
}

/// Parse a required integer field. Non-numeric content is a hard error, never
/// a silent zero.
pub fn parse_int(s: &str, page: &'static str, field: &'static str) -> Result<i64, Error> {
    s.trim()
        .parse()
        .map_err(|_| Error::malformed(page, field, format!("not an integer: '{s}'")))
}
