use chrono::NaiveDate;

use crate::error::Error;
use crate::model::{Cardapio, Handle, Registry};
use crate::sig::html::Tag;

use super::{require_field, sig_fields};

const PAGE: &str = "cardapio";

fn meal_items(root: &Tag, class: &str) -> Vec<String> {
    let Some(section) = root.find_by_class(class).into_iter().next() else {
        return Vec::new();
    };
    section
        .find_by_name("li")
        .into_iter()
        .map(|li| li.text().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse one day's cafeteria menu. Only the date is load-bearing; the meal
/// sections and observation degrade to empty when the cafeteria published
/// nothing for that day.
pub fn extract(reg: &mut Registry, root: &Tag) -> Result<Handle<Cardapio>, Error> {
    let fields = sig_fields(root);
    let raw = require_field(&fields, "data", PAGE)?;
    let data = NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .map_err(|e| Error::malformed(PAGE, "data", format!("'{raw}': {e}")))?;

    let observacao = root
        .find_by_class("observacao")
        .into_iter()
        .next()
        .map(|t| t.text().trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(reg.get_or_create(Cardapio {
        data,
        almoco: meal_items(root, "almoco"),
        jantar: meal_items(root, "jantar"),
        observacao,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::html::parse_html;

    const MENU: &str = "<html>\
        <p><strong>Data:</strong> 05/03/2024</p>\
        <div class=\"almoco\"><ul><li>Arroz</li><li>Feijão</li><li>Frango grelhado</li></ul></div>\
        <div class=\"jantar\"><ul><li>Sopa de legumes</li></ul></div>\
        <div class=\"observacao\">Sujeito a alterações.</div>\
        </html>";

    #[test]
    fn extracts_full_menu() {
        let mut reg = Registry::new();
        let menu = extract(&mut reg, &parse_html(MENU)).unwrap();
        let menu = menu.borrow();
        assert_eq!(menu.data, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(menu.almoco, vec!["Arroz", "Feijão", "Frango grelhado"]);
        assert_eq!(menu.jantar, vec!["Sopa de legumes"]);
        assert_eq!(menu.observacao.as_deref(), Some("Sujeito a alterações."));
    }

    #[test]
    fn missing_sections_degrade_to_empty() {
        let mut reg = Registry::new();
        let html = "<html><p><strong>Data:</strong> 06/03/2024</p></html>";
        let menu = extract(&mut reg, &parse_html(html)).unwrap();
        assert!(menu.borrow().almoco.is_empty());
        assert!(menu.borrow().jantar.is_empty());
        assert!(menu.borrow().observacao.is_none());
    }

    #[test]
    fn missing_date_is_malformed_page() {
        let mut reg = Registry::new();
        let err = extract(&mut reg, &parse_html("<html><div class=\"almoco\"></div></html>")).unwrap_err();
        assert!(matches!(err, Error::MalformedPage { field: "data", .. }));
    }

    #[test]
    fn same_day_scrape_merges_into_one_entity() {
        let mut reg = Registry::new();
        extract(&mut reg, &parse_html(MENU)).unwrap();
        extract(&mut reg, &parse_html(MENU)).unwrap();
        assert_eq!(reg.len::<Cardapio>(), 1);
    }
}
