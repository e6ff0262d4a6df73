//! Test runner: projects, dependency order, retries and results

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::Fixtures;
use crate::playwright::StepResult;
use crate::scenarios;
use crate::session::Session;
use crate::spec::{App, TestSpec};

/// A named group of specs sharing an app, a login session and dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub app: App,

    /// Regex matched against a spec's suite (its path under the specs directory)
    pub test_match: String,

    #[serde(default)]
    pub test_ignore: Option<String>,

    /// Saved session every spec starts from, unless it asks for a fresh one
    #[serde(default)]
    pub storage_state: Option<PathBuf>,

    /// Session file this project must produce for its dependents
    #[serde(default)]
    pub saves_storage_state: Option<PathBuf>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub retries: u32,
}

impl Project {
    pub fn new(name: &str, app: App, test_match: &str) -> Self {
        Self {
            name: name.to_string(),
            app,
            test_match: test_match.to_string(),
            test_ignore: None,
            storage_state: None,
            saves_storage_state: None,
            dependencies: Vec::new(),
            retries: 1,
        }
    }

    pub fn matches(&self, spec: &TestSpec) -> E2eResult<bool> {
        if !Regex::new(&self.test_match)?.is_match(&spec.suite) {
            return Ok(false);
        }
        match &self.test_ignore {
            Some(ignore) => Ok(!Regex::new(ignore)?.is_match(&spec.suite)),
            None => Ok(true),
        }
    }
}

/// Setup logins first, then each app against its saved session; the happy
/// path logs in by itself and is never retried.
pub fn default_projects(config: &E2eConfig) -> Vec<Project> {
    let admin_auth = config.auth_file(App::Admin);
    let user_auth = config.auth_file(App::User);

    vec![
        Project {
            saves_storage_state: Some(admin_auth.clone()),
            ..Project::new("setup", App::Admin, r"^setup/admin")
        },
        Project {
            saves_storage_state: Some(user_auth.clone()),
            ..Project::new("user-setup", App::User, r"^setup/user")
        },
        Project {
            storage_state: Some(admin_auth),
            dependencies: vec!["setup".to_string()],
            ..Project::new("admin-chromium", App::Admin, r"^admin/")
        },
        Project {
            test_ignore: Some(r"happy_path".to_string()),
            storage_state: Some(user_auth),
            dependencies: vec!["user-setup".to_string()],
            ..Project::new("user-chromium", App::User, r"^user/")
        },
        Project { retries: 0, ..Project::new("happy-path", App::User, r"^user/happy_path") },
    ]
}

/// Projects in an order where every project comes after its dependencies.
///
/// Declaration order is kept wherever dependencies allow it.
pub fn order_projects(projects: &[Project]) -> E2eResult<Vec<&Project>> {
    let by_name: HashMap<&str, &Project> = projects.iter().map(|p| (p.name.as_str(), p)).collect();

    fn visit<'a>(
        project: &'a Project,
        by_name: &HashMap<&str, &'a Project>,
        visiting: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a Project>,
    ) -> E2eResult<()> {
        if done.contains(project.name.as_str()) {
            return Ok(());
        }
        if visiting.contains(&project.name.as_str()) {
            return Err(E2eError::Config(format!(
                "project dependency cycle: {} -> {}",
                visiting.join(" -> "),
                project.name
            )));
        }

        visiting.push(&project.name);
        for dep in &project.dependencies {
            let dep_project = by_name.get(dep.as_str()).ok_or_else(|| {
                E2eError::Config(format!("project '{}' depends on unknown project '{}'", project.name, dep))
            })?;
            visit(dep_project, by_name, visiting, done, ordered)?;
        }
        visiting.pop();

        done.insert(&project.name);
        ordered.push(project);
        Ok(())
    }

    let mut ordered = Vec::with_capacity(projects.len());
    let mut done = HashSet::new();
    for project in projects {
        visit(project, &by_name, &mut Vec::new(), &mut done, &mut ordered)?;
    }
    Ok(ordered)
}

/// Built-in scenarios plus every YAML spec under `specs_dir`
pub fn collect_specs(config: &E2eConfig) -> E2eResult<Vec<TestSpec>> {
    let mut specs = scenarios::all(config);
    if config.specs_dir.is_dir() {
        specs.extend(TestSpec::load_all(&config.specs_dir)?);
    } else {
        warn!("Specs directory {} not found, using built-in scenarios only", config.specs_dir.display());
    }

    let mut seen = HashSet::new();
    for spec in &specs {
        if !seen.insert((spec.suite.as_str(), spec.name.as_str())) {
            return Err(E2eError::SpecParse(format!(
                "duplicate test '{}' in {}",
                spec.name, spec.suite
            )));
        }
    }
    Ok(specs)
}

/// Runs one attempt of a spec
#[async_trait]
pub trait SpecExecutor: Send + Sync {
    async fn execute(&self, spec: &TestSpec, project: &Project) -> E2eResult<Vec<StepResult>>;
}

/// Runs specs in a real browser, one driver per attempt
pub struct BrowserExecutor {
    config: E2eConfig,
    fixtures: Fixtures,
}

impl BrowserExecutor {
    pub fn new(config: E2eConfig, fixtures: Fixtures) -> Self {
        Self { config, fixtures }
    }
}

#[async_trait]
impl SpecExecutor for BrowserExecutor {
    async fn execute(&self, spec: &TestSpec, project: &Project) -> E2eResult<Vec<StepResult>> {
        let app = spec.app.unwrap_or(project.app);
        let storage_state = if spec.fresh_session { None } else { project.storage_state.as_deref() };

        let mut session =
            Session::start(&self.config, self.fixtures.clone(), &spec.name, app, storage_state).await?;

        let results = match session.vars_mut().extend(&spec.vars) {
            Ok(()) => session.run_steps(&spec.steps).await,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("Failed to close browser for {}: {}", spec.name, close_err);
                }
                return Err(e);
            }
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close browser for {}: {}", spec.name, e);
        }
        Ok(results)
    }
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub project: String,
    pub suite: String,
    pub success: bool,
    pub skipped: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Which tests to run.
///
/// Tag and name filters only narrow the requested projects; projects that
/// are pulled in as dependencies always run in full.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub projects: Vec<String>,
    pub tag: Option<String>,
    pub name: Option<String>,
}

impl RunFilter {
    fn accepts(&self, spec: &TestSpec) -> bool {
        let tag_ok = self.tag.as_ref().map(|t| spec.tags.contains(t)).unwrap_or(true);
        let name_ok = self.name.as_ref().map(|n| spec.name.contains(n.as_str())).unwrap_or(true);
        tag_ok && name_ok
    }
}

/// A project and the specs it will run
pub struct PlannedProject<'a> {
    pub project: &'a Project,
    pub specs: Vec<&'a TestSpec>,
}

pub struct TestRunner {
    projects: Vec<Project>,
    executor: Arc<dyn SpecExecutor>,
    filter: RunFilter,
    output_dir: PathBuf,
}

impl TestRunner {
    pub fn new(projects: Vec<Project>, executor: Arc<dyn SpecExecutor>, output_dir: &Path) -> Self {
        Self { projects, executor, filter: RunFilter::default(), output_dir: output_dir.to_path_buf() }
    }

    /// Runner with the default projects and a real browser
    pub fn for_config(config: &E2eConfig, fixtures: Fixtures) -> Self {
        let executor = Arc::new(BrowserExecutor::new(config.clone(), fixtures));
        Self::new(default_projects(config), executor, &config.output_dir)
    }

    pub fn with_filter(mut self, filter: RunFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Projects to run, in order, with the specs each one takes
    pub fn plan<'a>(&'a self, specs: &'a [TestSpec]) -> E2eResult<Vec<PlannedProject<'a>>> {
        let ordered = order_projects(&self.projects)?;

        for name in &self.filter.projects {
            if !self.projects.iter().any(|p| &p.name == name) {
                return Err(E2eError::Config(format!("unknown project '{}'", name)));
            }
        }

        // requested projects and everything they depend on
        let requested: HashSet<&str> = if self.filter.projects.is_empty() {
            self.projects.iter().map(|p| p.name.as_str()).collect()
        } else {
            self.filter.projects.iter().map(String::as_str).collect()
        };
        let mut selected: HashSet<&str> = HashSet::new();
        for project in ordered.iter().copied().rev() {
            if requested.contains(project.name.as_str()) || selected.contains(project.name.as_str()) {
                selected.insert(&project.name);
                selected.extend(project.dependencies.iter().map(String::as_str));
            }
        }

        let depended_on: HashSet<&str> = ordered
            .iter()
            .copied()
            .filter(|p| selected.contains(p.name.as_str()))
            .flat_map(|p| p.dependencies.iter().map(String::as_str))
            .collect();

        let mut plan = Vec::new();
        for project in ordered {
            if !selected.contains(project.name.as_str()) {
                continue;
            }
            let filtered = !depended_on.contains(project.name.as_str());

            let mut project_specs = Vec::new();
            for spec in specs {
                if project.matches(spec)? && (!filtered || self.filter.accepts(spec)) {
                    project_specs.push(spec);
                }
            }
            plan.push(PlannedProject { project, specs: project_specs });
        }
        Ok(plan)
    }

    /// Run the given specs through all selected projects
    pub async fn run(&self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let plan = self.plan(specs)?;
        let total: usize = plan.iter().map(|p| p.specs.len()).sum();
        let mut failed_projects: HashSet<&str> = HashSet::new();
        let mut results = Vec::with_capacity(total);

        info!("Running {} test(s) in {} project(s)...", total, plan.len());

        for planned in &plan {
            let project = planned.project;

            if let Some(dep) = project.dependencies.iter().find(|d| failed_projects.contains(d.as_str())) {
                warn!("Skipping project {}: dependency {} failed", project.name, dep);
                failed_projects.insert(&project.name);
                results.extend(planned.specs.iter().map(|spec| {
                    skipped(spec, project, format!("dependency '{}' failed", dep))
                }));
                continue;
            }

            info!("Project {} ({} test(s))", project.name, planned.specs.len());
            if let Some(path) = &project.saves_storage_state {
                remove_stale_session(path);
            }

            let mut project_ok = true;
            for spec in &planned.specs {
                let result = self.run_spec(spec, project).await;
                if result.success {
                    info!("✓ {} [{}] ({} ms)", result.name, project.name, result.duration_ms);
                } else {
                    project_ok = false;
                    error!(
                        "✗ {} [{}] - {}",
                        result.name,
                        project.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                results.push(result);
            }

            if let Some(path) = project.saves_storage_state.as_ref().filter(|_| project_ok) {
                if !path.exists() {
                    error!("Project {} did not save a session to {}", project.name, path.display());
                    project_ok = false;
                }
            }
            if !project_ok {
                failed_projects.insert(&project.name);
            }
        }

        let passed = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.len() - passed - skipped;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult { total, passed, failed, skipped, duration_ms, results })
    }

    /// Run one spec, retrying failed attempts
    async fn run_spec(&self, spec: &TestSpec, project: &Project) -> TestResult {
        let start = Instant::now();
        let max_attempts = spec.retries.unwrap_or(project.retries) + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Running test: {} (attempt {}/{})", spec.name, attempt, max_attempts);

            let (steps, error) = match self.executor.execute(spec, project).await {
                Ok(steps) => {
                    let error = steps.iter().find(|s| !s.success).map(|s| {
                        format!("{}: {}", s.step_name, s.error.as_deref().unwrap_or("failed"))
                    });
                    (steps, error)
                }
                Err(e) => (Vec::new(), Some(e.to_string())),
            };

            if error.is_none() || attempt >= max_attempts {
                return TestResult {
                    name: spec.name.clone(),
                    project: project.name.clone(),
                    suite: spec.suite.clone(),
                    success: error.is_none(),
                    skipped: false,
                    attempts: attempt,
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps,
                    error,
                };
            }

            warn!(
                "{} failed on attempt {}/{}: {}",
                spec.name,
                attempt,
                max_attempts,
                error.as_deref().unwrap_or_default()
            );
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Remove a saved session before its project rewrites it. A missing file is fine.
fn remove_stale_session(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale session {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove stale session {}: {}", path.display(), e),
    }
}

fn skipped(spec: &TestSpec, project: &Project, reason: String) -> TestResult {
    TestResult {
        name: spec.name.clone(),
        project: project.name.clone(),
        suite: spec.suite.clone(),
        success: false,
        skipped: true,
        attempts: 0,
        duration_ms: 0,
        steps: Vec::new(),
        error: Some(reason),
    }
}
