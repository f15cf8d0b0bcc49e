//! Upload filename helpers

/// Lowercased extension after the last '.', if any
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether the filename carries one of the allowed extensions
pub fn is_allowed_file(filename: &str, allowed: &[String]) -> bool {
    match file_extension(filename) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Strip directory components and anything outside [A-Za-z0-9._-]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ["png", "jpg", "jpeg", "bmp", "tiff"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("slide.PNG").as_deref(), Some("png"));
        assert_eq!(file_extension("a.b.tiff").as_deref(), Some("tiff"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_is_allowed_file() {
        assert!(is_allowed_file("cell_01.jpeg", &allowed()));
        assert!(is_allowed_file("SCAN.Bmp", &allowed()));
        assert!(!is_allowed_file("notes.txt", &allowed()));
        assert!(!is_allowed_file("image", &allowed()));
        assert!(!is_allowed_file("archive.png.gz", &allowed()));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\slides\\my cell.png"), "my_cell.png");
        assert_eq!(sanitize_filename(".hidden.jpg"), "hidden.jpg");
    }
}
