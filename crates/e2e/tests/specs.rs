//! Checks the shipped YAML specs and the built-in scenarios without a browser.

use std::collections::HashSet;
use std::path::PathBuf;

use custody_e2e::config::E2eConfig;
use custody_e2e::fixtures::Fixtures;
use custody_e2e::runner::{collect_specs, default_projects, order_projects, RunFilter, TestRunner};
use custody_e2e::scenarios;
use custody_e2e::spec::{App, TestSpec, TestStep};
use test_case::test_case;

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

fn config() -> E2eConfig {
    E2eConfig { specs_dir: specs_dir(), ..Default::default() }
}

#[test]
fn shipped_specs_parse() -> anyhow::Result<()> {
    let specs = TestSpec::load_all(&specs_dir())?;
    let suites: HashSet<&str> = specs.iter().map(|s| s.suite.as_str()).collect();

    for suite in ["admin/login_validation.yaml", "user/login_validation.yaml"] {
        assert!(suites.contains(suite), "missing {}", suite);
    }
    Ok(())
}

#[test_case("admin-login-validation")]
#[test_case("user-login-validation")]
fn login_validation_starts_logged_out(name: &str) -> anyhow::Result<()> {
    let specs = TestSpec::load_all(&specs_dir())?;
    let spec = specs.iter().find(|s| s.name == name).expect("spec present");
    assert!(spec.fresh_session);
    assert!(matches!(spec.steps.first(), Some(TestStep::Navigate { url, .. }) if url == "login"));
    Ok(())
}

#[test]
fn built_in_scenarios_validate() -> anyhow::Result<()> {
    for spec in scenarios::all(&E2eConfig::default()) {
        spec.validate()?;
    }
    Ok(())
}

#[test]
fn every_spec_lands_in_exactly_one_project() -> anyhow::Result<()> {
    let config = config();
    let specs = collect_specs(&config)?;
    let projects = default_projects(&config);

    for spec in &specs {
        let mut owners = Vec::new();
        for project in &projects {
            if project.matches(spec)? {
                owners.push(project.name.as_str());
            }
        }
        assert_eq!(owners.len(), 1, "{} ({}) matched {:?}", spec.name, spec.suite, owners);
    }
    Ok(())
}

#[test]
fn yaml_specs_run_on_their_app() -> anyhow::Result<()> {
    let config = config();
    let runner = TestRunner::for_config(&config, Fixtures::docker(&config.database));
    let specs = collect_specs(&config)?;

    for planned in runner.plan(&specs)? {
        for spec in planned.specs {
            if spec.suite.starts_with("admin/") {
                assert_eq!(planned.project.app, App::Admin, "{}", spec.name);
            }
        }
    }
    Ok(())
}

#[test]
fn tag_filter_keeps_setup_projects() -> anyhow::Result<()> {
    let config = config();
    let specs = collect_specs(&config)?;
    let runner = TestRunner::for_config(&config, Fixtures::docker(&config.database)).with_filter(RunFilter {
        projects: vec!["admin-chromium".to_string()],
        tag: Some("smoke".to_string()),
        name: None,
    });

    let plan = runner.plan(&specs)?;
    let names: Vec<&str> = plan.iter().map(|p| p.project.name.as_str()).collect();
    assert_eq!(names, vec!["setup", "admin-chromium"]);
    assert_eq!(plan[0].specs.len(), 1);
    assert!(plan[1].specs.iter().all(|s| s.tags.iter().any(|t| t == "smoke")));
    assert!(!plan[1].specs.is_empty());
    Ok(())
}

#[test]
fn smoke_checks_run_on_saved_sessions() -> anyhow::Result<()> {
    let config = config();
    let runner = TestRunner::for_config(&config, Fixtures::docker(&config.database));
    let specs = collect_specs(&config)?;

    let mut smoke = 0;
    for planned in runner.plan(&specs)? {
        for spec in planned.specs.iter().filter(|s| s.suite.ends_with("/smoke")) {
            assert!(planned.project.storage_state.is_some(), "{}", spec.name);
            assert!(!spec.fresh_session, "{}", spec.name);
            smoke += 1;
        }
    }
    assert_eq!(smoke, 8 + 1 + 6);
    Ok(())
}

#[test]
fn setup_projects_come_first() -> anyhow::Result<()> {
    let projects = default_projects(&config());
    let ordered = order_projects(&projects)?;
    let position = |name: &str| ordered.iter().position(|p| p.name == name).expect("project");

    assert!(position("setup") < position("admin-chromium"));
    assert!(position("user-setup") < position("user-chromium"));
    Ok(())
}

#[test]
fn example_config_loads() -> anyhow::Result<()> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("e2e.example.toml");
    let config = E2eConfig::load(&path)?;
    config.validate()?;
    assert_eq!(config.specs_dir, PathBuf::from("specs"));
    assert!(config.credentials.admin_otp_secret.is_none());
    Ok(())
}
