//! File-extension to MIME type mapping for file responses.

/// Fallback when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

#[rustfmt::skip]
const TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),              ("htm", "text/html"),
    ("html", "text/html"),              ("css", "text/css"),
    ("csv", "text/comma-separated-values"),
    ("js", "application/javascript"),   ("json", "application/json"),
    ("xml", "application/xml"),         ("pdf", "application/pdf"),
    ("ico", "image/x-icon"),            ("png", "image/png"),
    ("webp", "image/webp"),             ("gif", "image/gif"),
    ("mng", "image/mng"),               ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),             ("svg", "image/svg+xml"),
    // served with `content-encoding: gzip`
    ("svgz", "image/svg+xml"),
    ("gz", "application/x-gzip"),       ("bz2", "application/x-bzip2"),
    ("zip", "application/zip"),
    ("ogg", "audio/ogg"),               ("mp3", "audio/mpeg"),
    ("wav", "audio/x-wav"),
    ("ttf", "application/x-font-ttf"),  ("ttc", "application/x-font-ttf"),
    ("otf", "application/x-font-opentype"),
    ("woff", "application/font-woff"),  ("woff2", "application/font-woff2"),
    ("eot", "application/vnd.ms-fontobject"),
    ("sfnt", "application/font-sfnt"),
];

const FONTS: &[&str] = &["ttf", "ttc", "otf", "woff", "woff2", "eot", "sfnt"];

/// Lowercased extension of the last path component, if any.
#[inline]
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    match stem.is_empty() || ext.is_empty() {
        true => None,
        false => Some(ext.to_ascii_lowercase()),
    }
}

/// MIME type for an extension (without the dot, any case).
#[inline]
pub fn from_extension(ext: &str) -> Option<&'static str> {
    TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|&(_, mime)| mime)
}

/// Text types get an explicit UTF-8 charset parameter.
#[inline]
pub fn with_charset(mime: &'static str) -> String {
    match mime.starts_with("text/") {
        true => format!("{mime};charset=utf-8"),
        false => mime.to_owned(),
    }
}

/// Font files are fetched cross-origin by browsers and need CORS.
#[inline]
pub fn is_font(ext: &str) -> bool {
    FONTS.iter().any(|f| f.eq_ignore_ascii_case(ext))
}

/// Pre-compressed resources that must carry `content-encoding: gzip`.
#[inline]
pub fn is_gzipped(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("svgz")
}
