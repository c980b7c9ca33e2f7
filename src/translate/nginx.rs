use std::fmt::Write as _;

use super::RenderCtx;

const PHP_LOCATIONS: &str = r"    location / {
        try_files $uri $uri/ /index.php?$args;
    }

    location ~ \.php$ {
        include fastcgi_params;
        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
";

fn server_block(out: &mut String, ctx: &RenderCtx<'_>, listen: &str, tls: bool) {
    out.push_str("server {\n");
    let _ = writeln!(out, "    listen {listen};");
    let _ = writeln!(out, "    server_name {};", ctx.site.domain);
    let _ = writeln!(out, "    root {};", ctx.site.doc_root.display());
    out.push_str("    index index.php index.html;\n");
    let _ = writeln!(out, "    access_log {};", ctx.access_log.display());
    let _ = writeln!(out, "    error_log {};", ctx.error_log.display());
    if tls {
        if let Some((crt, key)) = &ctx.tls {
            let _ = writeln!(out, "    ssl_certificate {};", crt.display());
            let _ = writeln!(out, "    ssl_certificate_key {};", key.display());
        }
    }
    out.push('\n');
    out.push_str(PHP_LOCATIONS);
    let _ = writeln!(out, "        fastcgi_pass unix:{};", ctx.socket.display());
    out.push_str("    }\n}\n");
}

/// Render the managed body of an nginx site config.
pub(super) fn render(ctx: &RenderCtx<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# site: {}", ctx.site.id);
    server_block(&mut out, ctx, &ctx.http_port.to_string(), false);
    if ctx.tls.is_some() {
        out.push('\n');
        server_block(&mut out, ctx, &format!("{} ssl", ctx.https_port), true);
    }
    out
}
