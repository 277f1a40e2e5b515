//! Ingress rule commands

use anyhow::{Context, Result};
use colored::Colorize;
use console_lib::ingress::{
    default_prefix, next_rule_name, FormMode, FormSession, IngressDraft, ReferenceSource,
    RuleSubmitter, SubmitAction, ValidationErrorMap,
};
use console_lib::{Capabilities, ConsoleError, ConsoleLogger, DebouncedValidator};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::Tabled;
use tokio::sync::mpsc;
use tracing::debug;

use crate::output::{
    format_timestamp, print_console_error, print_info, print_json, print_success,
    print_table, print_validation_errors, print_warning, OutputFormat,
};

/// Engine dependencies shared by the rule commands
pub struct Backend<'a> {
    pub source: &'a dyn ReferenceSource,
    pub submitter: &'a dyn RuleSubmitter,
    pub capabilities: &'a dyn Capabilities,
    pub logger: ConsoleLogger,
}

/// Row for the rules table
#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Class")]
    class_name: String,
    #[tabled(rename = "Hosts")]
    hosts: String,
    #[tabled(rename = "Paths")]
    paths: usize,
    #[tabled(rename = "TLS")]
    tls: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Ingress class")]
    label: String,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Type")]
    service_type: String,
    #[tabled(rename = "Ports")]
    ports: String,
}

#[derive(Serialize)]
struct ValidationReport<'a> {
    namespace: &'a str,
    name: &'a str,
    valid: bool,
    errors: &'a ValidationErrorMap,
}

#[derive(Serialize)]
struct SubmissionReport<'a> {
    action: SubmitAction,
    namespace: &'a str,
    name: &'a str,
}

/// List persisted rules, optionally in one namespace
pub async fn list_rules(
    source: &dyn ReferenceSource,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let rules: Vec<_> = source
        .existing_rules()
        .await
        .context("Failed to load existing ingresses")?
        .into_iter()
        .filter(|r| namespace.as_ref().map(|ns| &r.namespace == ns).unwrap_or(true))
        .collect();

    match format {
        OutputFormat::Json => print_json(&rules)?,
        OutputFormat::Table => {
            let rows: Vec<RuleRow> = rules
                .iter()
                .map(|r| RuleRow {
                    name: r.name.clone(),
                    namespace: r.namespace.clone(),
                    class_name: r.class_name.clone(),
                    hosts: r.hosts.join(", "),
                    paths: r.paths.len(),
                    tls: r
                        .tls
                        .iter()
                        .map(|t| t.secret_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    created: r
                        .creation_date
                        .as_deref()
                        .map(format_timestamp)
                        .unwrap_or_default(),
                })
                .collect();
            print_table(&rows);
            if !rows.is_empty() {
                println!("\nTotal: {} ingresses", rows.len());
            }
        }
    }

    Ok(())
}

/// Print the next free auto-generated rule name in a namespace
pub async fn next_name(
    source: &dyn ReferenceSource,
    namespace: &str,
    prefix: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let rules = source
        .existing_rules()
        .await
        .context("Failed to load existing ingresses")?;
    let prefix = prefix.unwrap_or_else(|| default_prefix(namespace));
    let name = next_rule_name(&rules, namespace, &prefix);

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "namespace": namespace, "name": name }))?,
        OutputFormat::Table => println!("{}", name),
    }
    Ok(())
}

/// Show the classes, TLS secrets and services a rule in `namespace` may use
pub async fn show_options(
    source: &dyn ReferenceSource,
    capabilities: &dyn Capabilities,
    namespace: &str,
    logger: ConsoleLogger,
    format: OutputFormat,
) -> Result<()> {
    let session = open_session(source, capabilities, FormMode::Create, namespace, logger).await?;
    let options = session.options();

    match format {
        OutputFormat::Json => print_json(options)?,
        OutputFormat::Table => {
            println!("{} {}", "Ingress options for namespace".bold(), namespace.cyan());
            println!();

            let classes: Vec<ClassRow> = options
                .classes
                .iter()
                .map(|c| ClassRow { label: c.label() })
                .collect();
            print_table(&classes);

            println!();
            let secrets: Vec<ClassRow> = options
                .tls
                .iter()
                .map(|t| ClassRow {
                    label: t.label.clone(),
                })
                .collect();
            println!("{}", "TLS secrets".bold());
            print_table(&secrets);

            println!();
            let services: Vec<ServiceRow> = options
                .service_groups
                .iter()
                .flat_map(|group| {
                    group.options.iter().map(|o| ServiceRow {
                        name: o.value.clone(),
                        service_type: group.service_type.clone(),
                        ports: options
                            .ports_for(&o.value)
                            .unwrap_or_default()
                            .iter()
                            .map(u16::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                })
                .collect();
            print_table(&services);
        }
    }
    Ok(())
}

/// Validate a draft file and create the rule
pub async fn create_rule(
    backend: &Backend<'_>,
    file: &Path,
    namespace: Option<String>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let draft = read_draft(file)?;
    let namespace = draft_namespace(&draft, namespace)?;
    let mut session = open_session(
        backend.source,
        backend.capabilities,
        FormMode::Create,
        &namespace,
        backend.logger.clone(),
    )
    .await?;

    apply_draft(&mut session, draft);
    submit(&mut session, backend.submitter, dry_run, format).await
}

/// Validate a draft file and replace an existing rule with it
pub async fn update_rule(
    backend: &Backend<'_>,
    namespace: &str,
    name: &str,
    file: &Path,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let draft = read_draft(file)?;
    let mode = FormMode::Edit {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    let mut session = open_session(
        backend.source,
        backend.capabilities,
        mode,
        namespace,
        backend.logger.clone(),
    )
    .await?;

    apply_draft(&mut session, draft);
    submit(&mut session, backend.submitter, dry_run, format).await
}

/// Validate a draft file, optionally revalidating every time it changes.
///
/// With `rule` the draft is checked as an edit of that persisted rule, so it
/// does not collide with its own name and routes.
pub async fn check_draft(
    backend: &Backend<'_>,
    file: &Path,
    namespace: Option<String>,
    rule: Option<String>,
    watch: bool,
    debounce: Duration,
    format: OutputFormat,
) -> Result<()> {
    let draft = read_draft(file)?;
    let namespace = draft_namespace(&draft, namespace)?;
    let mode = match rule {
        Some(name) => FormMode::Edit {
            namespace: namespace.clone(),
            name,
        },
        None => FormMode::Create,
    };
    let mut session = open_session(
        backend.source,
        backend.capabilities,
        mode,
        &namespace,
        backend.logger.clone(),
    )
    .await?;

    apply_draft(&mut session, draft);
    session.validate();
    report_validation(&session, format)?;

    if !watch {
        if !session.errors().is_empty() {
            return Err(ConsoleError::Invalid(session.errors().len()).into());
        }
        return Ok(());
    }

    watch_draft(&mut session, file, debounce, format).await
}

async fn open_session(
    source: &dyn ReferenceSource,
    capabilities: &dyn Capabilities,
    mode: FormMode,
    namespace: &str,
    logger: ConsoleLogger,
) -> Result<FormSession> {
    let mut session = FormSession::new(mode, capabilities)?.with_logger(logger);
    if !session.mode().is_edit() {
        session.change_namespace(namespace);
    }

    let failures = session.load_references(source).await?;
    for failure in &failures {
        print_console_error(failure);
    }
    Ok(session)
}

/// Replace the session draft with one read from a file.
///
/// The session keeps its namespace; an edit keeps the rule name and a new
/// rule without a name gets the next free one.
fn apply_draft(session: &mut FormSession, file: IngressDraft) {
    let namespace = session.namespace().to_string();
    let name = match session.mode() {
        FormMode::Edit { name, .. } => name.clone(),
        FormMode::Create if file.name.is_empty() => {
            let rules = session.references().rules.as_deref().unwrap_or_default();
            next_rule_name(rules, &namespace, &default_prefix(&namespace))
        }
        FormMode::Create => file.name.clone(),
    };

    session.edit(move |current| {
        let class_type = if file.class_name == current.class_name {
            current.class_type.clone()
        } else {
            String::new()
        };
        IngressDraft {
            key: current.key.clone(),
            namespace,
            name,
            class_type,
            ..file
        }
    });
}

async fn submit(
    session: &mut FormSession,
    submitter: &dyn RuleSubmitter,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    session.validate();
    if !session.errors().is_empty() {
        report_validation(session, format)?;
        return Err(ConsoleError::Invalid(session.errors().len()).into());
    }

    if dry_run {
        let record = session.payload()?;
        print_json(&record)?;
        if let OutputFormat::Table = format {
            print_info("Dry run: ingress not submitted");
        }
        return Ok(());
    }

    let action = session.submit(submitter).await?;
    let draft = session.draft();
    match format {
        OutputFormat::Json => print_json(&SubmissionReport {
            action,
            namespace: session.namespace(),
            name: &draft.name,
        })?,
        OutputFormat::Table => print_success(&format!(
            "{} ({}/{})",
            action.success_message(),
            session.namespace(),
            draft.name
        )),
    }
    Ok(())
}

fn report_validation(session: &FormSession, format: OutputFormat) -> Result<()> {
    let errors = session.errors();
    let name = &session.draft().name;

    match format {
        OutputFormat::Json => print_json(&ValidationReport {
            namespace: session.namespace(),
            name,
            valid: errors.is_empty(),
            errors,
        })?,
        OutputFormat::Table if errors.is_empty() => {
            print_success(&format!("Ingress {} is valid", name));
        }
        OutputFormat::Table => {
            print_warning(&format!("Ingress {} has {} validation error(s)", name, errors.len()));
            print_validation_errors(errors);
        }
    }
    Ok(())
}

/// Revalidate after each burst of changes to `file` until interrupted
async fn watch_draft(
    session: &mut FormSession,
    file: &Path,
    debounce: Duration,
    format: OutputFormat,
) -> Result<()> {
    let file = std::fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = file.file_name().map(|n| n.to_os_string());

    let (tx, mut changes) = mpsc::unbounded_channel();
    // Editors often replace the file, so watch its directory
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    && event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                if relevant {
                    let _ = tx.send(());
                }
            }
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    let validator = DebouncedValidator::new(debounce);
    let mut passes = validator.subscribe();
    print_info(&format!("Watching {} for changes (Ctrl+C to stop)", file.display()));

    loop {
        tokio::select! {
            Some(()) = changes.recv() => {
                match read_draft(&file) {
                    Ok(draft) => {
                        apply_draft(session, draft);
                        session.schedule_validation(&validator).await;
                    }
                    // Mid-write files often fail to parse; the next event retries
                    Err(e) => debug!(error = %format!("{:#}", e), "Draft not readable yet"),
                }
            }
            Ok(()) = passes.changed() => {
                let pass = passes.borrow_and_update().clone();
                if let Some(pass) = pass {
                    if session.apply_validation(pass) {
                        report_validation(session, format)?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if validator.flush().await {
        debug!("Pending validation flushed on shutdown");
    }
    Ok(())
}

fn read_draft(path: &Path) -> Result<IngressDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse draft {}", path.display()))
}

/// Namespace from the command line, then from the draft itself
fn draft_namespace(draft: &IngressDraft, explicit: Option<String>) -> Result<String> {
    explicit
        .filter(|ns| !ns.is_empty())
        .or_else(|| Some(draft.namespace.clone()).filter(|ns| !ns.is_empty()))
        .context("No namespace given; set one in the draft or pass --namespace")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use console_lib::{
        permissions, IngressController, IngressRecord, NamespaceInfo, ServiceInfo, ServicePort,
        StaticCapabilities, TlsSecret,
    };
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBackend {
        submitted: Mutex<Vec<(SubmitAction, IngressRecord)>>,
    }

    #[async_trait]
    impl ReferenceSource for MockBackend {
        async fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
            Ok(vec![NamespaceInfo {
                name: "web".into(),
                is_system: false,
            }])
        }

        async fn ingress_controllers(&self, _namespace: &str) -> Result<Vec<IngressController>> {
            Ok(vec![IngressController {
                name: "nginx".into(),
                class_name: "nginx".into(),
                controller_type: "nginx".into(),
                available: true,
            }])
        }

        async fn services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
            Ok(vec![ServiceInfo {
                name: "frontend".into(),
                namespace: namespace.into(),
                service_type: "ClusterIP".into(),
                ports: vec![ServicePort {
                    name: "http".into(),
                    port: 80,
                    protocol: "TCP".into(),
                }],
            }])
        }

        async fn tls_secrets(&self, namespace: &str) -> Result<Vec<TlsSecret>> {
            Ok(vec![TlsSecret {
                name: "example-tls".into(),
                namespace: namespace.into(),
            }])
        }

        async fn existing_rules(&self) -> Result<Vec<IngressRecord>> {
            Ok(vec![IngressRecord {
                name: "web-ingress-2".into(),
                namespace: "web".into(),
                class_name: "nginx".into(),
                ..Default::default()
            }])
        }
    }

    #[async_trait]
    impl RuleSubmitter for MockBackend {
        async fn submit(&self, action: SubmitAction, rule: &IngressRecord) -> Result<()> {
            self.submitted.lock().unwrap().push((action, rule.clone()));
            Ok(())
        }
    }

    const DRAFT: &str = r#"{
        "namespace": "web",
        "className": "nginx",
        "hosts": [{
            "host": "example.com",
            "secretName": "example-tls",
            "paths": [{"serviceName": "frontend", "servicePort": 80, "route": "/"}]
        }]
    }"#;

    fn draft_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_create_names_and_submits_draft() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(DRAFT);

        create_rule(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            file.path(),
            None,
            false,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let submitted = backend.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let (action, record) = &submitted[0];
        assert_eq!(*action, SubmitAction::Create);
        assert_eq!(record.name, "web-ingress-3");
        assert_eq!(record.namespace, "web");
        assert_eq!(record.tls[0].secret_name, "example-tls");
        assert_eq!(record.paths[0].port, 80);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_submit() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(DRAFT);

        create_rule(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            file.path(),
            None,
            true,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        assert!(backend.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_draft_is_refused() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(r#"{"namespace": "web", "className": "nginx", "hosts": [{"host": "", "paths": []}]}"#);

        let err = create_rule(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            file.path(),
            None,
            false,
            OutputFormat::Json,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConsoleError>(),
            Some(ConsoleError::Invalid(_))
        ));
        assert!(backend.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_rule_name() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(&DRAFT.replace(r#""namespace": "web","#, r#""name": "renamed","#));

        update_rule(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            "web",
            "web-ingress-2",
            file.path(),
            false,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let submitted = backend.submitted.lock().unwrap();
        assert_eq!(submitted[0].0, SubmitAction::Update);
        assert_eq!(submitted[0].1.name, "web-ingress-2");
    }

    #[tokio::test]
    async fn test_create_requires_write_permission() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::with_permissions(false, [permissions::CLUSTER_NODE_READ]);
        let file = draft_file(DRAFT);

        let err = create_rule(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            file.path(),
            None,
            false,
            OutputFormat::Json,
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Not authorized to add ingresses");
    }

    #[tokio::test]
    async fn test_check_reports_missing_host() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(r#"{"name": "web-ingress-9", "className": "nginx", "hosts": [{"paths": [{"serviceName": "frontend", "servicePort": 80, "route": "/"}]}]}"#);

        let err = check_draft(
            &Backend {
                source: &backend,
                submitter: &backend,
                capabilities: &caps,
                logger: ConsoleLogger::default(),
            },
            file.path(),
            Some("web".into()),
            None,
            false,
            Duration::from_millis(10),
            OutputFormat::Json,
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Draft has 1 validation error(s)");
    }

    #[tokio::test]
    async fn test_check_against_existing_rule() {
        let backend = MockBackend::default();
        let caps = StaticCapabilities::admin(false);
        let file = draft_file(&DRAFT.replace(r#""namespace": "web","#, r#""namespace": "web", "name": "web-ingress-2","#));
        let backend_ref = Backend {
            source: &backend,
            submitter: &backend,
            capabilities: &caps,
            logger: ConsoleLogger::default(),
        };

        let err = check_draft(
            &backend_ref,
            file.path(),
            None,
            None,
            false,
            Duration::from_millis(10),
            OutputFormat::Json,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Draft has 1 validation error(s)");

        check_draft(
            &backend_ref,
            file.path(),
            None,
            Some("web-ingress-2".into()),
            false,
            Duration::from_millis(10),
            OutputFormat::Json,
        )
        .await
        .unwrap();
        assert!(backend.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_namespace_resolution() {
        let draft = IngressDraft::new("web", "");
        assert_eq!(draft_namespace(&draft, None).unwrap(), "web");
        assert_eq!(draft_namespace(&draft, Some("api".into())).unwrap(), "api");
        assert!(draft_namespace(&IngressDraft::new("", ""), None).is_err());
    }
}
