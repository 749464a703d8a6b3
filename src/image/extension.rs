/// Map a response `Content-Type` to the extension used for local storage.
///
/// Parameters such as `; charset=binary` are ignored and the media type is
/// compared case-insensitively. Returns `None` when nothing maps, which the
/// fetcher reports as an unresolvable content type.
pub fn resolve_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let extension = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/avif" => ".avif",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/svg+xml" => ".svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => ".ico",
        _ => return None,
    };

    Some(extension)
}
