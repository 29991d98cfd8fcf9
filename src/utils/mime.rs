use std::path::Path;

use crate::utils::fs;

pub fn mime_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",

        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "webp" => "image/webp",

        "txt" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",

        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "webm" => "video/webm",

        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",

        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",

        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",

        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",

        "php" => "application/x-httpd-php",
        "py" => "text/x-python",
        "pl" => "text/x-perl",
        "rb" => "text/x-ruby",

        _ => "application/octet-stream",
    }
}

pub fn mime_type_for_path(path: &Path) -> &'static str {
    path.to_str()
        .and_then(fs::extension)
        .map(mime_type_for_extension)
        .unwrap_or("application/octet-stream")
}

/// Families the browser may render in place; everything else is offered as
/// a download.
pub fn is_inline(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.starts_with("image/")
        || mime == "application/pdf"
        || mime == "application/json"
        || mime == "application/javascript"
}
