/// Derives a URL slug from free text.
///
/// Lowercases and trims, drops anything that is not a word character,
/// whitespace or hyphen, collapses runs of whitespace, underscores and
/// hyphens into one hyphen, then trims hyphens from both ends.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;

    for ch in lowered.chars() {
        if is_separator(ch) {
            pending_separator = true;
            continue;
        }
        if !is_word_char(ch) {
            continue;
        }
        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(ch);
    }

    slug
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || ch == '_' || ch == '-'
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_slug_from_name() {
        assert_eq!(slugify("Tech News"), "tech-news");
        assert_eq!(slugify("  Rust & Go!  "), "rust-go");
        assert_eq!(slugify("snake_case  and--dashes"), "snake-case-and-dashes");
        assert_eq!(slugify("--Leading and trailing--"), "leading-and-trailing");
    }

    #[test]
    fn punctuation_only_yields_empty_slug() {
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(" - _ "), "");
    }

    #[test]
    fn slugify_is_idempotent() {
        for input in ["Tech News", "a_b-c d", "Año 2024"] {
            let once = slugify(input);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn normalized_slugs_are_fixed_points() {
        assert_eq!(slugify("tech-news"), "tech-news");
        assert_ne!(slugify("Tech-News"), "Tech-News");
        assert_ne!(slugify("tech--news"), "tech--news");
    }
}
