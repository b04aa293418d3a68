use catalog_core::{Category, CategoryId};

/// Categories inserted on first startup.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["General", "Urgent", "Archived", "Favorites", "Upcoming"];

/// Fresh category records for [`DEFAULT_CATEGORIES`].
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|name| Category {
            id: CategoryId::new(),
            name: (*name).to_string(),
        })
        .collect()
}

/// Escapes `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
