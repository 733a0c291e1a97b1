use std::collections::HashMap;

/// A queryable HTML node. The extraction routines only ever consume this
/// interface (find by tag name / id / class, read attributes and own text);
/// they never look at raw markup.
#[derive(Debug, Default)]
pub struct Tag {
    pub name: String,
    pub children: Vec<Tag>,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub content: Option<String>,
    pub attrs: HashMap<String, String>,
}

impl Tag {
    fn new(name: &str) -> Self {
        Tag {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// The node's own text content, trimmed (empty when the node held none).
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn find_by_name(&self, name: &str) -> Vec<&Tag> {
        let mut out = Vec::new();
        self.collect(&|t| t.name == name, &mut out);
        out
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Tag> {
        let mut out = Vec::new();
        self.collect(&|t| t.id.as_deref() == Some(id), &mut out);
        out.into_iter().next()
    }

    pub fn find_by_class(&self, class: &str) -> Vec<&Tag> {
        let mut out = Vec::new();
        self.collect(&|t| t.has_class(class), &mut out);
        out
    }

    /// Direct children with the given tag name, no recursion.
    pub fn children_named(&self, name: &str) -> Vec<&Tag> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    fn collect<'a>(&'a self, filter: &dyn Fn(&Tag) -> bool, out: &mut Vec<&'a Tag>) {
        for child in &self.children {
            if filter(child) {
                out.push(child);
            }
            child.collect(filter, out);
        }
    }
}

const SELF_CLOSING: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr", "frame",
];

const RAWTEXT: &[&str] = &["script", "style"];

/// Parse server-rendered HTML into a tag tree rooted at a synthetic `#root`
/// node. Lenient by design: stray end tags are dropped and unclosed tags are
/// closed at end of input, since the portal's markup is not always well formed.
pub fn parse_html(input: &str) -> Tag {
    let mut stack: Vec<Tag> = vec![Tag::new("#root")];
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(lt) = rest.find('<') else {
            handle_text(&mut stack, rest);
            break;
        };
        handle_text(&mut stack, &rest[..lt]);
        pos += lt;
        let rest = &input[pos..];

        if rest.starts_with("<!--") {
            pos += rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
        } else if let Some(end_rest) = rest.strip_prefix("</") {
            let gt = end_rest.find('>').unwrap_or(end_rest.len());
            let name = end_rest[..gt].trim().to_ascii_lowercase();
            close_tag(&mut stack, &name);
            pos += 2 + gt + usize::from(gt < end_rest.len());
        } else if rest.len() > 1 {
            let gt = find_tag_end(rest);
            let inner = rest[1..gt].trim_end().trim_end_matches('/').trim_end();
            pos += gt + usize::from(gt < rest.len());

            let name_end = inner
                .find(|c: char| c.is_whitespace())
                .unwrap_or(inner.len());
            let name = inner[..name_end].to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            let mut tag = Tag::new(&name);
            parse_attrs(&inner[name_end..], &mut tag);

            let explicit_self_close = rest[1..gt].trim_end().ends_with('/');
            if RAWTEXT.contains(&name.as_str()) {
                // Skip raw content up to the matching end tag.
                let close = format!("</{name}");
                let lower = input[pos..].to_ascii_lowercase();
                if let Some(i) = lower.find(&close) {
                    pos += i;
                    pos += input[pos..].find('>').map(|j| j + 1).unwrap_or(0);
                }
                attach(&mut stack, tag);
            } else if explicit_self_close || SELF_CLOSING.contains(&name.as_str()) {
                attach(&mut stack, tag);
            } else {
                stack.push(tag);
            }
        } else {
            break;
        }
    }

    // Close anything left open.
    while stack.len() > 1 {
        let tag = stack.pop().unwrap();
        stack.last_mut().unwrap().children.push(tag);
    }
    stack.pop().unwrap()
}

fn handle_text(stack: &mut [Tag], raw: &str) {
    let text = decode_entities(raw);
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match &mut stack.last_mut().unwrap().content {
        Some(existing) => {
            existing.push(' ');
            existing.push_str(text);
        }
        slot => *slot = Some(text.to_string()),
    }
}

fn attach(stack: &mut [Tag], tag: Tag) {
    stack.last_mut().unwrap().children.push(tag);
}

fn close_tag(stack: &mut Vec<Tag>, name: &str) {
    // Ignore a stray end tag with no matching open tag.
    let Some(open_at) = stack.iter().rposition(|t| t.name == name) else {
        return;
    };
    if open_at == 0 {
        return;
    }
    while stack.len() > open_at {
        let tag = stack.pop().unwrap();
        stack.last_mut().unwrap().children.push(tag);
    }
}

/// Index of the tag-closing `>`, skipping quoted attribute values.
fn find_tag_end(s: &str) -> usize {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return i,
            _ => {}
        }
    }
    s.len()
}

fn parse_attrs(mut s: &str, tag: &mut Tag) {
    loop {
        s = s.trim_start();
        if s.is_empty() {
            return;
        }
        let name_end = s
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(s.len());
        let name = s[..name_end].to_ascii_lowercase();
        s = s[name_end..].trim_start();

        let mut value = String::new();
        if let Some(rest) = s.strip_prefix('=') {
            let rest = rest.trim_start();
            match rest.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &rest[1..];
                    let end = inner.find(q).unwrap_or(inner.len());
                    value = decode_entities(&inner[..end]);
                    s = &inner[(end + 1).min(inner.len())..];
                }
                _ => {
                    let end = rest
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(rest.len());
                    value = decode_entities(&rest[..end]);
                    s = &rest[end..];
                }
            }
        }

        match name.as_str() {
            "" => {}
            "class" => tag.classes.extend(value.split_whitespace().map(String::from)),
            "id" => tag.id = Some(value),
            _ => {
                tag.attrs.insert(name, value);
            }
        }
    }
}

/// Decode the entities the portal actually emits: the XML five, `&nbsp;`, a
/// numeric form, and the Latin-1 accents common in Portuguese text.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        // Entity names are short; look at most a few chars ahead.
        let semi = rest
            .char_indices()
            .take(10)
            .find(|&(_, c)| c == ';')
            .map(|(i, _)| i);
        match semi {
            Some(semi) if semi > 1 => {
                let entity = &rest[1..semi];
                match decode_one(entity) {
                    Some(c) => {
                        out.push(c);
                        rest = &rest[semi + 1..];
                    }
                    None => {
                        out.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_one(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "aacute" => 'á',
        "agrave" => 'à',
        "acirc" => 'â',
        "atilde" => 'ã',
        "ccedil" => 'ç',
        "eacute" => 'é',
        "ecirc" => 'ê',
        "iacute" => 'í',
        "oacute" => 'ó',
        "ocirc" => 'ô',
        "otilde" => 'õ',
        "uacute" => 'ú',
        "uuml" => 'ü',
        "Aacute" => 'Á',
        "Ccedil" => 'Ç',
        "Eacute" => 'É',
        "Oacute" => 'Ó',
        _ => return None,
    };
    Some(c)
}
