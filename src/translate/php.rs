use std::fmt::Write as _;

use super::RenderCtx;

/// Managed body of a PHP-FPM pool for the site.
pub(super) fn render_pool(ctx: &RenderCtx<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", ctx.site.id);
    let _ = writeln!(out, "listen = {}", ctx.socket.display());
    out.push_str("listen.mode = 0660\n");
    out.push_str("pm = dynamic\n");
    out.push_str("pm.max_children = 5\n");
    out.push_str("pm.start_servers = 2\n");
    out.push_str("pm.min_spare_servers = 1\n");
    out.push_str("pm.max_spare_servers = 3\n");
    let _ = writeln!(out, "chdir = {}", ctx.site.doc_root.display());
    let _ = writeln!(out, "php_admin_value[error_log] = {}", ctx.error_log.display());
    out
}

/// Managed body of the per-version ini; `extensions` are already normalized and sorted.
pub(super) fn render_ini(ctx: &RenderCtx<'_>, version: &str, extensions: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; php {version} for {}", ctx.site.domain);
    out.push_str("memory_limit = 256M\n");
    out.push_str("upload_max_filesize = 64M\n");
    out.push_str("post_max_size = 64M\n");
    out.push_str("max_execution_time = 300\n");
    out.push_str("date.timezone = UTC\n");
    for ext in extensions {
        out.push_str(ext);
        out.push('\n');
    }
    out
}

/// Normalize an `extension=`/`zend_extension=` line; `None` for anything else.
#[must_use]
pub fn parse_extension_line(line: &str) -> Option<String> {
    let t = line.trim();
    let (key, value) = t.split_once('=')?;
    let key = key.trim();
    let value = value.trim().trim_matches('"');
    if value.is_empty() || !(key == "extension" || key == "zend_extension") {
        return None;
    }
    Some(format!("{key}={value}"))
}

/// Extension lines found in `ini`, normalized, sorted and de-duplicated.
#[must_use]
pub fn extract_extensions(ini: &str) -> Vec<String> {
    let mut exts: Vec<String> = ini.lines().filter_map(parse_extension_line).collect();
    exts.sort();
    exts.dedup();
    exts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lines_are_normalized() {
        let ini = "; comment\nextension = redis\nzend_extension=\"opcache\"\nmemory_limit=1G\nextension=redis\n;extension=xdebug\n";
        assert_eq!(
            extract_extensions(ini),
            vec!["extension=redis".to_string(), "zend_extension=opcache".to_string()]
        );
    }
}
