mod common;

use serde_json::json;
use stackswap::types::{PhpVersionChangeOptions, TargetKind, TxState, WebServer};

use common::*;

#[test]
fn runtime_swap_carries_extensions_and_restarts_the_web_server() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &["extension=redis", "extension=imagick"]);
    let (api, facts) = engine(root, &fake);

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("8.3"));

    assert!(res.success, "errors: {:?}", res.errors);
    assert_eq!(res.php_version.as_deref(), Some("8.3"));
    assert_eq!(res.web_server, Some(WebServer::Nginx));
    assert_eq!(fake.running(&s, TargetKind::PhpRuntime).as_deref(), Some("php-fpm 8.3"));
    assert_eq!(fake.running(&s, TargetKind::WebServer).as_deref(), Some("nginx"));

    let calls = fake.calls();
    let started = calls.iter().position(|c| c == "start php-fpm 8.3").unwrap();
    assert_eq!(calls[..started], ["stop php-fpm 8.1".to_string()]);
    assert_eq!(calls[started + 1..], ["stop nginx".to_string(), "start nginx".to_string()]);

    let ini = read(&layout(root, &s).php_ini("8.3")).unwrap();
    assert!(ini.contains("extension=imagick"));
    assert!(ini.contains("extension=redis"));
    assert!(layout(root, &s).php_pool("8.3").exists());

    let verified: Vec<String> = facts
        .named("swap.verify")
        .into_iter()
        .map(|(_, f)| f["target"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(verified, ["php-fpm 8.3", "nginx"]);
}

#[test]
fn extensions_stay_behind_when_migration_is_off() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &["extension=redis"]);
    let (api, _) = engine(root, &fake);

    let mut opts = PhpVersionChangeOptions::new("8.2");
    opts.migrate_extensions = false;
    assert!(api.change_php_version(&s, &opts).success);
    let ini = read(&layout(root, &s).php_ini("8.2")).unwrap();
    assert!(!ini.contains("extension=redis"));
}

#[test]
fn web_server_is_left_alone_without_restart_services() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &[]);
    let (api, _) = engine(root, &fake);

    let mut opts = PhpVersionChangeOptions::new("8.2");
    opts.restart_services = false;
    assert!(api.change_php_version(&s, &opts).success);
    assert!(!fake.calls().iter().any(|c| c.ends_with("nginx")));
}

#[test]
fn unsupported_or_current_versions_are_rejected() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &[]);
    let (api, facts) = engine(root, &fake);

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("9.9"));
    assert!(!res.success);
    assert!(res.errors[0].contains("not a supported version"), "{:?}", res.errors);
    assert_eq!(res.php_version.as_deref(), Some("8.1"));

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("8.1"));
    assert!(res.errors[0].contains("already the current version"), "{:?}", res.errors);

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("eight"));
    assert!(res.errors[0].starts_with("validation failed:"));

    assert!(fake.calls().is_empty());
    let (_, result) = facts.named("swap.result").pop().unwrap();
    assert_eq!(result["error_id"], json!("E_VALIDATION"));
}

#[test]
fn unhealthy_runtime_rolls_back_and_restarts_the_web_server_again() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &["extension=redis"]);
    fake.mark_unhealthy("php-fpm 8.3");
    let (api, facts) = engine(root, &fake);
    let l = layout(root, &s);
    let ini_before = read(&l.php_ini("8.1")).unwrap();

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("8.3"));

    assert!(!res.success);
    assert!(!res.fatal, "errors: {:?}", res.errors);
    assert_eq!(res.errors[0], "php-fpm 8.3 failed health check after 3 attempts");
    assert_eq!(res.php_version.as_deref(), Some("8.1"));
    assert_eq!(fake.running(&s, TargetKind::PhpRuntime).as_deref(), Some("php-fpm 8.1"));
    assert_eq!(fake.running(&s, TargetKind::WebServer).as_deref(), Some("nginx"));
    assert_eq!(read(&l.php_ini("8.1")).unwrap(), ini_before);
    assert!(!l.php_ini("8.3").exists());
    assert!(!l.php_pool("8.3").exists());
    assert_eq!(api.history()[0].state, TxState::RolledBack);

    let steps: Vec<String> = facts
        .named("swap.rollback")
        .into_iter()
        .map(|(_, f)| format!("{} {}", f["step"].as_str().unwrap_or_default(), f["target"].as_str().unwrap_or_default()))
        .collect();
    assert_eq!(steps, ["stop php-fpm 8.3", "restore ", "start php-fpm 8.1", "start nginx"]);
}

#[test]
fn runtime_start_failure_does_not_touch_the_web_server() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let s = site("blog", false);
    let fake = FakeController::default();
    provision(root, &s, &fake, &[]);
    fake.fail_start("php-fpm 8.2", "socket in use");
    let (api, _) = engine(root, &fake);

    let res = api.change_php_version(&s, &PhpVersionChangeOptions::new("8.2"));
    assert!(!res.success);
    assert_eq!(res.errors[0], "php-fpm 8.2 failed to start: socket in use");
    assert!(!fake.calls().iter().any(|c| c.ends_with("nginx")));
    assert_eq!(fake.running(&s, TargetKind::PhpRuntime).as_deref(), Some("php-fpm 8.1"));
}
