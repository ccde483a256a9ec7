/// Turn a stored image reference into a URL the storefront can load.
///
/// Absolute and protocol-relative URLs are kept as they are; bare file
/// names resolve under `{base}/uploads/`.
pub fn resolve_image_url(base: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("//") {
        return Some(raw.to_string());
    }
    let file = raw.trim_start_matches('/');
    let file = file.strip_prefix("uploads/").unwrap_or(file);
    Some(format!("{}/uploads/{}", base.trim_end_matches('/'), file))
}

pub fn resolve_images(base: &str, raw: &[String]) -> Vec<String> {
    raw.iter()
        .filter_map(|item| resolve_image_url(base, item))
        .collect()
}

/// Extensions accepted for uploaded product images.
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = std::path::Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_IMAGE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://shop.example.com";

    #[test]
    fn keeps_absolute_urls() {
        assert_eq!(
            resolve_image_url(BASE, "https://cdn.test/a.png").as_deref(),
            Some("https://cdn.test/a.png")
        );
        assert_eq!(
            resolve_image_url(BASE, "//cdn.test/a.png").as_deref(),
            Some("//cdn.test/a.png")
        );
    }

    #[test]
    fn resolves_file_names_under_uploads() {
        let expected = Some("https://shop.example.com/uploads/a.png".to_string());
        assert_eq!(resolve_image_url(BASE, "a.png"), expected);
        assert_eq!(resolve_image_url(BASE, "/uploads/a.png"), expected);
        assert_eq!(resolve_image_url("https://shop.example.com/", "uploads/a.png"), expected);
    }

    #[test]
    fn drops_blank_entries() {
        let raw = vec![" ".to_string(), "b.webp".to_string()];
        assert_eq!(
            resolve_images(BASE, &raw),
            vec!["https://shop.example.com/uploads/b.webp".to_string()]
        );
    }

    #[test]
    fn accepts_only_image_extensions() {
        assert_eq!(image_extension("Photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(image_extension("x.webp").as_deref(), Some("webp"));
        assert_eq!(image_extension("script.sh"), None);
        assert_eq!(image_extension("noext"), None);
    }
}
