use urlblob::BlobMetadata;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// `13 (13 bytes)`, `2048 (2.00 KB)` ...
pub fn human_size(size: u64) -> String {
    let scaled = if size < KB {
        format!("{} bytes", size)
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size as f64 / GB as f64)
    };
    format!("{} ({})", size, scaled)
}

/// Property/value rows for `stat`; absent fields are omitted
pub fn metadata_rows(meta: &BlobMetadata) -> Vec<(&'static str, String)> {
    let mut rows = Vec::new();
    if let Some(size) = meta.size() {
        rows.push(("size", human_size(size)));
    }
    if let Some(content_type) = meta.content_type() {
        rows.push(("content_type", content_type.to_string()));
    }
    if let Some(last_modified) = meta.last_modified() {
        rows.push(("last_modified", last_modified.to_rfc3339()));
    }
    rows
}

/// Two-column table with a header rule
pub fn render_table(rows: &[(&str, String)]) -> String {
    let key_width = rows
        .iter()
        .map(|(key, _)| key.len())
        .chain(std::iter::once("Property".len()))
        .max()
        .unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.len())
        .chain(std::iter::once("Value".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!("{:<kw$}  {}\n", "Property", "Value", kw = key_width);
    out.push_str(&format!("{}  {}\n", "-".repeat(key_width), "-".repeat(value_width)));
    for (key, value) in rows {
        out.push_str(&format!("{:<kw$}  {}\n", key, value, kw = key_width));
    }
    out
}

/// URL without its query string, for messages
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
