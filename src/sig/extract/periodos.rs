use crate::error::Error;
use crate::model::{Handle, Periodo, Registry};
use crate::sig::html::Tag;

use super::parse_int;

const PAGE: &str = "ofertas";

/// Parse the term `<select>` on the public offerings page. Option text is the
/// term code ("2024/1"), the value its internal SIG id.
pub fn extract(reg: &mut Registry, root: &Tag) -> Result<Vec<Handle<Periodo>>, Error> {
    let select = root
        .find_by_id("cod_periodo_letivo")
        .ok_or_else(|| Error::malformed(PAGE, "cod_periodo_letivo", "select not found"))?;

    let mut periodos = Vec::new();
    for option in select.find_by_name("option") {
        // The "Selecione..." placeholder carries no value.
        let Some(value) = option.attr("value").filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let cod = option.text().trim().to_string();
        if cod.is_empty() {
            continue;
        }
        let sig_cod_int = parse_int(value, PAGE, "option.value")?;
        periodos.push(reg.get_or_create(Periodo { cod, sig_cod_int }));
    }
    Ok(periodos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::html::parse_html;

    const SELECT: &str = "<select id=\"cod_periodo_letivo\">\
        <option value=\"\">Selecione...</option>\
        <option value=\"87\">2024/1</option>\
        <option value=\"88\">2024/2</option>\
        </select>";

    #[test]
    fn extracts_terms_from_select() {
        let mut reg = Registry::new();
        let periodos = extract(&mut reg, &parse_html(SELECT)).unwrap();
        // The placeholder option is skipped.
        assert_eq!(periodos.len(), 2);
        assert_eq!(periodos[0].borrow().cod, "2024/1");
        assert_eq!(periodos[0].borrow().sig_cod_int, 87);
        assert_eq!(periodos[1].borrow().cod, "2024/2");
    }

    #[test]
    fn missing_select_is_malformed_page() {
        let mut reg = Registry::new();
        let err = extract(&mut reg, &parse_html("<html></html>")).unwrap_err();
        assert!(matches!(err, Error::MalformedPage { field: "cod_periodo_letivo", .. }));
    }
}
