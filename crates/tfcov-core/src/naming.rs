//! Identifier case conversion

/// `WidgetResource` -> `widget_resource`, `HTTPServer` -> `http_server`.
///
/// An underscore goes before an uppercase char when the previous char is
/// lowercase, or when it ends an acronym (previous upper, next lower).
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// `example_widget` -> `ExampleWidget`
pub fn to_title_case(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Text after the first underscore, when there is any: `example_widget` -> `widget`
pub fn strip_provider_prefix(name: &str) -> Option<&str> {
    name.split_once('_')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}
