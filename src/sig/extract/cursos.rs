use crate::error::Error;
use crate::model::{Curso, Handle, Registry};
use crate::sig::html::Tag;

use super::parse_int;

const PAGE: &str = "matrizes";

/// Parse the course `<select>` on the public curricula page. Each option's
/// title carries "COD - Nome" and its value the internal SIG id.
pub fn extract(reg: &mut Registry, root: &Tag) -> Result<Vec<Handle<Curso>>, Error> {
    let select = root
        .find_by_id("cod_oferta_curso")
        .ok_or_else(|| Error::malformed(PAGE, "cod_oferta_curso", "select not found"))?;

    let mut cursos = Vec::new();
    for option in select.find_by_name("option") {
        let title = option
            .attr("title")
            .ok_or_else(|| Error::malformed(PAGE, "option.title", "missing title attribute"))?;
        let (cod, nome) = title
            .split_once(" - ")
            .ok_or_else(|| Error::malformed(PAGE, "option.title", format!("no 'COD - Nome' in '{title}'")))?;
        // A missing value attribute means the option is a placeholder; the id
        // stays unset and a later sighting can fill it.
        let sig_cod_int = match option.attr("value") {
            Some(v) if !v.trim().is_empty() => parse_int(v, PAGE, "option.value")?,
            _ => 0,
        };
        cursos.push(reg.get_or_create(Curso {
            cod: cod.trim().to_string(),
            sig_cod_int,
            nome: nome.trim().to_string(),
            matrizes: Vec::new(),
        }));
    }
    Ok(cursos)
}
