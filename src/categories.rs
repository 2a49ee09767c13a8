#![forbid(unsafe_code)]

//! Fixed mapping from YouTube category ids to the labels shown on the
//! dashboard.

/// Bucket for every id missing from [`CATEGORIES`].
pub const OTHER_CATEGORY: &str = "Other";

pub const CATEGORIES: &[(&str, &str)] = &[
    ("1", "Film"),
    ("2", "Autos"),
    ("10", "Music"),
    ("15", "Pets"),
    ("17", "Sports"),
    ("20", "Gaming"),
    ("22", "People"),
    ("23", "Comedy"),
    ("24", "Entertainment"),
    ("25", "News"),
    ("26", "Howto"),
    ("27", "Education"),
    ("28", "Science"),
    ("29", "Technology"),
    ("43", "Shows"),
];

/// Resolves a category id, falling back to [`OTHER_CATEGORY`] for unknown or
/// missing ids.
pub fn category_name(code: Option<&str>) -> &'static str {
    let Some(code) = code else {
        return OTHER_CATEGORY;
    };
    CATEGORIES
        .iter()
        .find(|(id, _)| *id == code.trim())
        .map(|(_, name)| *name)
        .unwrap_or(OTHER_CATEGORY)
}
