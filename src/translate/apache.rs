use std::fmt::Write as _;

use super::RenderCtx;

fn vhost(out: &mut String, ctx: &RenderCtx<'_>, port: u16, tls: bool) {
    let root = ctx.site.doc_root.display();
    let _ = writeln!(out, "<VirtualHost *:{port}>");
    let _ = writeln!(out, "    ServerName {}", ctx.site.domain);
    let _ = writeln!(out, "    DocumentRoot \"{root}\"");
    out.push_str("    DirectoryIndex index.php index.html\n");
    let _ = writeln!(out, "    <Directory \"{root}\">");
    out.push_str("        AllowOverride All\n        Require all granted\n    </Directory>\n");
    out.push_str("    <FilesMatch \\.php$>\n");
    let _ = writeln!(
        out,
        "        SetHandler \"proxy:unix:{}|fcgi://localhost\"",
        ctx.socket.display()
    );
    out.push_str("    </FilesMatch>\n");
    let _ = writeln!(out, "    CustomLog \"{}\" combined", ctx.access_log.display());
    let _ = writeln!(out, "    ErrorLog \"{}\"", ctx.error_log.display());
    if tls {
        if let Some((crt, key)) = &ctx.tls {
            out.push_str("    SSLEngine on\n");
            let _ = writeln!(out, "    SSLCertificateFile \"{}\"", crt.display());
            let _ = writeln!(out, "    SSLCertificateKeyFile \"{}\"", key.display());
        }
    }
    out.push_str("</VirtualHost>\n");
}

/// Render the managed body of an Apache site config.
pub(super) fn render(ctx: &RenderCtx<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# site: {}", ctx.site.id);
    let _ = writeln!(out, "Listen {}", ctx.http_port);
    if ctx.tls.is_some() {
        let _ = writeln!(out, "Listen {}", ctx.https_port);
    }
    out.push('\n');
    vhost(&mut out, ctx, ctx.http_port, false);
    if ctx.tls.is_some() {
        out.push('\n');
        vhost(&mut out, ctx, ctx.https_port, true);
    }
    out
}
