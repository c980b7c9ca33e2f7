//! Process-backed `ServiceController`.
//!
//! Each site runs at most one web-server process and one PHP-FPM process, both spawned
//! in the foreground from a `LaunchSpec` and tracked by pid. Stop sends SIGTERM, waits
//! up to the timeout, then SIGKILLs. Health probes are single bounded attempts: an HTTP
//! GET for web servers, a FastCGI request over the pool socket for PHP-FPM.
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rustix::process::{kill_process, Pid, Signal};

use crate::config::{EngineConfig, Ports};
use crate::constants::{PHP_PROBE_MARKER, START_SETTLE_MS, STOP_POLL_MS};
use crate::fs::{write_atomic, SiteLayout};
use crate::types::errors::{Result, SwapError};
use crate::types::{ServiceStats, ServiceTarget, Site, TargetKind, WebServer};

use super::fastcgi;
use super::service::{ServiceController, StopOutcome};

/// Program and arguments for one kind of service.
///
/// Arguments may contain placeholders expanded per site and target:
/// `{conf}`, `{pool}`, `{ini}`, `{socket}`, `{docroot}`, `{site_dir}`, `{error_log}`, `{version}`.
/// The program itself may contain `{version}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchSpec {
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpecs {
    pub nginx: LaunchSpec,
    pub apache: LaunchSpec,
    pub php_fpm: LaunchSpec,
}

impl Default for LaunchSpecs {
    fn default() -> Self {
        Self {
            nginx: LaunchSpec::new("nginx", &["-g", "daemon off;", "-p", "{site_dir}", "-c", "{conf}"]),
            apache: LaunchSpec::new("httpd", &["-DFOREGROUND", "-d", "{site_dir}", "-f", "{conf}"]),
            php_fpm: LaunchSpec::new(
                "php-fpm{version}",
                &["--nodaemonize", "--fpm-config", "{pool}", "-c", "{ini}"],
            ),
        }
    }
}

struct ProcessRef {
    target: ServiceTarget,
    child: Child,
    started: Instant,
}

#[derive(Clone, Debug)]
struct ProbeSettings {
    ports: Ports,
    connect_timeout: Duration,
}

pub struct ProcessServiceController {
    root: PathBuf,
    probe: ProbeSettings,
    specs: LaunchSpecs,
    running: Mutex<HashMap<(String, TargetKind), ProcessRef>>,
}

impl std::fmt::Debug for ProcessServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessServiceController")
            .field("root", &self.root)
            .field("specs", &self.specs)
            .finish_non_exhaustive()
    }
}

impl ProcessServiceController {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root: config.root.clone(),
            probe: ProbeSettings {
                ports: config.ports.clone(),
                connect_timeout: Duration::from_millis(config.health.connect_timeout_ms),
            },
            specs: LaunchSpecs::default(),
            running: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_launch_specs(mut self, specs: LaunchSpecs) -> Self {
        self.specs = specs;
        self
    }

    fn spec_for(&self, target: &ServiceTarget) -> Result<&LaunchSpec> {
        match target.kind {
            TargetKind::PhpRuntime => Ok(&self.specs.php_fpm),
            TargetKind::WebServer => match target.web_server() {
                Some(WebServer::Nginx) => Ok(&self.specs.nginx),
                Some(WebServer::Apache) => Ok(&self.specs.apache),
                None => Err(SwapError::ServiceControl(format!("unknown web server '{target}'"))),
            },
        }
    }

    fn expand(&self, raw: &str, site: &Site, target: &ServiceTarget) -> String {
        let layout = SiteLayout::new(&self.root, &site.id);
        let (conf, version) = match target.kind {
            TargetKind::WebServer => {
                let conf = target
                    .web_server()
                    .map(|s| layout.web_config(s))
                    .unwrap_or_default();
                (conf, site.php_version.clone())
            }
            TargetKind::PhpRuntime => (PathBuf::new(), target.identifier.clone()),
        };
        raw.replace("{conf}", &conf.to_string_lossy())
            .replace("{pool}", &layout.php_pool(&version).to_string_lossy())
            .replace("{ini}", &layout.php_ini(&version).to_string_lossy())
            .replace("{socket}", &layout.fpm_socket().to_string_lossy())
            .replace("{docroot}", &site.doc_root.to_string_lossy())
            .replace("{site_dir}", &layout.site_dir().to_string_lossy())
            .replace("{error_log}", &layout.error_log().to_string_lossy())
            .replace("{version}", &version)
    }

    fn command_for(&self, spec: &LaunchSpec, site: &Site, target: &ServiceTarget) -> Command {
        let mut cmd = Command::new(self.expand(&spec.program, site, target));
        cmd.args(spec.args.iter().map(|a| self.expand(a, site, target)));
        cmd
    }

    fn ports_for(&self, site: &Site) -> Vec<u16> {
        let (http, https) = self.probe.ports.for_site(site);
        if site.ssl {
            vec![http, https]
        } else {
            vec![http]
        }
    }

    fn check_endpoint_free(&self, site: &Site, target: &ServiceTarget) -> Result<()> {
        match target.kind {
            TargetKind::WebServer => {
                for port in self.ports_for(site) {
                    if let Err(e) = TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
                        if e.kind() == ErrorKind::AddrInUse {
                            return Err(SwapError::ServiceControl(format!(
                                "{target} failed to start: port in use"
                            )));
                        }
                    }
                }
            }
            TargetKind::PhpRuntime => {
                let socket = SiteLayout::new(&self.root, &site.id).fpm_socket();
                if socket.exists() {
                    if UnixStream::connect(&socket).is_ok() {
                        return Err(SwapError::ServiceControl(format!(
                            "{target} failed to start: socket in use"
                        )));
                    }
                    let _ = std::fs::remove_file(&socket);
                }
            }
        }
        Ok(())
    }

    fn lock_running(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, TargetKind), ProcessRef>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn probe_http(&self, site: &Site) -> bool {
        let (http, _) = self.probe.ports.for_site(site);
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, http));
        let Ok(mut stream) = TcpStream::connect_timeout(&addr, self.probe.connect_timeout) else {
            return false;
        };
        let _ = stream.set_read_timeout(Some(self.probe.connect_timeout));
        let _ = stream.set_write_timeout(Some(self.probe.connect_timeout));
        let req = format!(
            "GET / HTTP/1.0\r\nHost: {}\r\nUser-Agent: stackswap-probe\r\n\r\n",
            site.domain
        );
        if stream.write_all(req.as_bytes()).is_err() {
            return false;
        }
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).unwrap_or(0);
        http_status_ok(&buf[..n])
    }

    /// Run a one-line script through the pool over FastCGI, so the probe exercises FPM itself.
    fn probe_php(&self, site: &Site) -> bool {
        let layout = SiteLayout::new(&self.root, &site.id);
        let Ok(mut stream) = UnixStream::connect(layout.fpm_socket()) else {
            return false;
        };
        let _ = stream.set_read_timeout(Some(self.probe.connect_timeout));
        let _ = stream.set_write_timeout(Some(self.probe.connect_timeout));
        let script = layout.probe_script();
        let body = format!("<?php echo '{PHP_PROBE_MARKER}';\n");
        if let Err(e) = write_atomic(&script, body.as_bytes(), 0o644) {
            log::debug!(target: "stackswap", "cannot write {}: {e}", script.display());
            return false;
        }
        let script_path = script.to_string_lossy();
        let doc_root = site.doc_root.to_string_lossy();
        let params = [
            ("GATEWAY_INTERFACE", "CGI/1.1"),
            ("REQUEST_METHOD", "GET"),
            ("SCRIPT_FILENAME", &*script_path),
            ("SCRIPT_NAME", "/health.php"),
            ("REQUEST_URI", "/health.php"),
            ("QUERY_STRING", ""),
            ("DOCUMENT_ROOT", &*doc_root),
            ("SERVER_NAME", site.domain.as_str()),
            ("SERVER_PROTOCOL", "HTTP/1.1"),
        ];
        match fastcgi::request(&mut stream, &params) {
            Ok(resp) => {
                let ok = resp.protocol_status == 0
                    && resp.status() == 200
                    && String::from_utf8_lossy(resp.body()).contains(PHP_PROBE_MARKER);
                if !ok {
                    log::debug!(
                        target: "stackswap",
                        "php probe for {} got status {} (exit {}): {}",
                        site.id,
                        resp.status(),
                        resp.app_status,
                        String::from_utf8_lossy(&resp.stderr).trim()
                    );
                }
                ok
            }
            Err(e) => {
                log::debug!(target: "stackswap", "fastcgi probe for {}: {e}", site.id);
                false
            }
        }
    }
}

/// Accept any 2xx or 3xx status line; WordPress redirects to its canonical URL.
fn http_status_ok(head: &[u8]) -> bool {
    let line = String::from_utf8_lossy(head);
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(proto), Some(code)) if proto.starts_with("HTTP/") => {
            code.parse::<u16>().is_ok_and(|c| (200..400).contains(&c))
        }
        _ => false,
    }
}

fn format_uptime(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn read_rss(pid: u32) -> Option<String> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .map(|v| v.trim().to_string())
}

fn read_cpu_percent(pid: u32, alive_for: Duration) -> Option<f64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // fields after the parenthesized comm; utime and stime are fields 14 and 15
    let rest = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let ticks = rustix::param::clock_ticks_per_second();
    let wall = alive_for.as_secs_f64();
    if ticks == 0 || wall <= 0.0 {
        return Some(0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let busy = (utime + stime) as f64 / ticks as f64;
    Some(busy / wall * 100.0)
}

fn count_lines(path: &Path) -> u64 {
    std::fs::read(path)
        .map(|b| b.iter().filter(|&&c| c == b'\n').count() as u64)
        .unwrap_or(0)
}

impl ServiceController for ProcessServiceController {
    fn stop(&self, site: &Site, target: &ServiceTarget, timeout_ms: u64) -> Result<StopOutcome> {
        let key = (site.id.clone(), target.kind);
        let entry = {
            let mut running = self.lock_running();
            let ours = running.get(&key).is_some_and(|p| p.target == *target);
            if ours {
                running.remove(&key)
            } else {
                None
            }
        };
        let Some(mut proc_) = entry else {
            return Ok(StopOutcome::NotRunning);
        };
        if matches!(proc_.child.try_wait(), Ok(Some(_))) {
            return Ok(StopOutcome::NotRunning);
        }

        if let Err(e) = kill_process(Pid::from_child(&proc_.child), Signal::Term) {
            log::debug!(target: "stackswap", "SIGTERM to {target} for {}: {e}", site.id);
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            match proc_.child.try_wait() {
                Ok(Some(_)) => return Ok(StopOutcome::Graceful),
                Ok(None) => thread::sleep(Duration::from_millis(STOP_POLL_MS)),
                Err(e) => {
                    log::warn!(target: "stackswap", "cannot poll {target} for {}: {e}", site.id);
                    break;
                }
            }
        }
        log::warn!(
            target: "stackswap",
            "{target} for {} did not exit after SIGTERM within {timeout_ms}ms; killing",
            site.id
        );
        if let Err(e) = proc_.child.kill().and_then(|()| proc_.child.wait().map(|_| ())) {
            // Keep tracking the child so a later stop or drop can still reach it.
            self.lock_running().insert(key, proc_);
            return Err(SwapError::ServiceControl(format!("{target} failed to stop: {e}")));
        }
        Ok(StopOutcome::Forced)
    }

    fn start(&self, site: &Site, target: &ServiceTarget, timeout_ms: u64) -> Result<()> {
        let key = (site.id.clone(), target.kind);
        {
            let mut running = self.lock_running();
            if let Some(p) = running.get_mut(&key) {
                let alive = matches!(p.child.try_wait(), Ok(None));
                if alive && p.target == *target {
                    return Ok(());
                }
                if alive {
                    return Err(SwapError::ServiceControl(format!(
                        "{target} failed to start: {} is still running",
                        p.target
                    )));
                }
                running.remove(&key);
            }
        }

        let spec = self.spec_for(target)?;
        self.check_endpoint_free(site, target)?;

        let layout = SiteLayout::new(&self.root, &site.id);
        let err_log = layout.error_log();
        if let Some(dir) = err_log.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let stderr = OpenOptions::new().create(true).append(true).open(&err_log)?;
        let mut cmd = self.command_for(spec, site, target);
        cmd.current_dir(layout.site_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        let mut child = cmd
            .spawn()
            .map_err(|e| SwapError::ServiceControl(format!("{target} failed to start: {e}")))?;

        let settle = Duration::from_millis(START_SETTLE_MS.min(timeout_ms));
        let deadline = Instant::now() + settle;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(SwapError::ServiceControl(format!(
                    "{target} failed to start: exited with {status}"
                )));
            }
            thread::sleep(Duration::from_millis(STOP_POLL_MS));
        }
        log::info!(target: "stackswap", "started {target} for {} (pid {})", site.id, child.id());
        self.lock_running().insert(
            key,
            ProcessRef {
                target: target.clone(),
                child,
                started: Instant::now(),
            },
        );
        Ok(())
    }

    fn health_check(&self, site: &Site, target: &ServiceTarget) -> bool {
        if !self.is_running(site, target) {
            return false;
        }
        match target.kind {
            TargetKind::WebServer => self.probe_http(site),
            TargetKind::PhpRuntime => self.probe_php(site),
        }
    }

    fn is_running(&self, site: &Site, target: &ServiceTarget) -> bool {
        let mut running = self.lock_running();
        running
            .get_mut(&(site.id.clone(), target.kind))
            .is_some_and(|p| p.target == *target && matches!(p.child.try_wait(), Ok(None)))
    }

    fn stats(&self, site: &Site, target: &ServiceTarget) -> Result<ServiceStats> {
        let (pid, alive_for) = {
            let mut running = self.lock_running();
            let live = running
                .get_mut(&(site.id.clone(), target.kind))
                .filter(|p| p.target == *target)
                .and_then(|p| {
                    let alive = matches!(p.child.try_wait(), Ok(None));
                    alive.then(|| (p.child.id(), p.started.elapsed()))
                });
            match live {
                Some(found) => found,
                None => {
                    return Err(SwapError::ServiceControl(format!("{target} is not running")))
                }
            }
        };
        let requests = match target.kind {
            TargetKind::WebServer => count_lines(&SiteLayout::new(&self.root, &site.id).access_log()),
            TargetKind::PhpRuntime => 0,
        };
        Ok(ServiceStats {
            uptime: format_uptime(alive_for),
            memory: read_rss(pid).unwrap_or_else(|| "unknown".to_string()),
            cpu: read_cpu_percent(pid, alive_for)
                .map_or_else(|| "unknown".to_string(), |p| format!("{p:.1}%")),
            requests,
        })
    }
}

impl Drop for ProcessServiceController {
    fn drop(&mut self) {
        let mut running = self.lock_running();
        for (_, mut p) in running.drain() {
            let _ = p.child.kill();
            let _ = p.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fastcgi::tests::{read_request, respond};
    use std::os::unix::net::UnixListener;

    fn site(id: &str) -> Site {
        Site {
            id: id.into(),
            domain: "blog.test".into(),
            web_server: WebServer::Nginx,
            php_version: "8.1".into(),
            ssl: false,
            doc_root: PathBuf::from("/srv/blog"),
            http_port: None,
            https_port: None,
        }
    }

    #[test]
    fn status_line_parsing() {
        assert!(http_status_ok(b"HTTP/1.1 200 OK\r\n"));
        assert!(http_status_ok(b"HTTP/1.0 301 Moved Permanently\r\n"));
        assert!(!http_status_ok(b"HTTP/1.1 502 Bad Gateway\r\n"));
        assert!(!http_status_ok(b"garbage"));
        assert!(!http_status_ok(b""));
    }

    #[test]
    fn uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn placeholders_expand_per_target() {
        let ctl = ProcessServiceController::new(&EngineConfig::with_root("/r"));
        let site = site("s1");
        assert_eq!(
            ctl.expand("{conf}", &site, &ServiceTarget::web(WebServer::Apache)),
            "/r/sites/s1/conf/apache/site.conf"
        );
        assert_eq!(
            ctl.expand("php-fpm{version} {pool}", &site, &ServiceTarget::php("8.3")),
            "php-fpm8.3 /r/sites/s1/php/8.3/pool.conf"
        );
    }

    #[test]
    fn site_ports_override_engine_defaults() {
        let ctl = ProcessServiceController::new(&EngineConfig::with_root("/r"));
        let mut s = site("s1");
        assert_eq!(ctl.ports_for(&s), vec![8080]);
        s.ssl = true;
        s.http_port = Some(9080);
        s.https_port = Some(9443);
        assert_eq!(ctl.ports_for(&s), vec![9080, 9443]);
    }

    #[test]
    fn php_health_check_runs_the_script_through_fastcgi() {
        let td = tempfile::tempdir().unwrap();
        let ctl = ProcessServiceController::new(&EngineConfig::with_root(td.path()));
        let s = site("blog");
        let layout = SiteLayout::new(td.path(), "blog");
        assert!(!ctl.probe_php(&s), "no pool socket yet");

        std::fs::create_dir_all(layout.fpm_socket().parent().unwrap()).unwrap();
        let listener = UnixListener::bind(layout.fpm_socket()).unwrap();
        let fpm = thread::spawn(move || {
            let replies: [&[u8]; 2] = [
                b"Content-type: text/html\r\n\r\nstackswap-php-ok",
                b"Status: 500 Internal Server Error\r\n\r\n",
            ];
            let mut seen = Vec::new();
            for reply in replies {
                let (mut conn, _) = listener.accept().unwrap();
                seen.push(read_request(&mut conn));
                respond(&mut conn, reply);
            }
            seen
        });
        assert!(ctl.probe_php(&s));
        assert!(!ctl.probe_php(&s), "a 500 from the pool is unhealthy");

        let seen = fpm.join().unwrap();
        let script = layout.probe_script().to_string_lossy().into_owned();
        assert!(seen[0].contains(&("SCRIPT_FILENAME".to_string(), script.clone())));
        assert!(std::fs::read_to_string(&script).unwrap().contains(PHP_PROBE_MARKER));
    }
}
