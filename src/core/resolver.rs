//! Resolution of a configuration document tree into runnable entities

use crate::core::config::{BackupDocument, DatabaseConfig, IncludeConfig, OptionsConfig, ScriptConfig, SourceConfig};
use crate::core::error::ConfigError;
use crate::core::pipeline::{Pipeline, StepKind};
use crate::entity::source::DEFAULT_RSYNC_OPTIONS;
use crate::entity::{Credential, DatabaseTarget, Engine, Script, Source};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Defaults inherited down the include tree. Unset fields fall through to
/// the built-in defaults when an entity is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub target: Option<PathBuf>,
    pub rsync_options: Option<String>,
    pub root: Option<bool>,
}

impl Defaults {
    /// Override field by field with a document's `options`
    pub fn merge(&self, options: Option<&OptionsConfig>) -> Defaults {
        let mut merged = self.clone();
        if let Some(options) = options {
            if let Some(target) = &options.target {
                merged.target = Some(target.clone());
            }
            if let Some(rsync) = &options.rsync {
                if let Some(rsync_options) = rsync.options() {
                    merged.rsync_options = Some(rsync_options.to_string());
                }
                if let Some(root) = rsync.root() {
                    merged.root = Some(root);
                }
            }
        }
        merged
    }

    pub fn rsync_options(&self) -> &str {
        self.rsync_options.as_deref().unwrap_or(DEFAULT_RSYNC_OPTIONS)
    }

    pub fn privileged(&self) -> bool {
        self.root.unwrap_or(false)
    }
}

/// Everything the executor needs, built once and read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfiguration {
    pub pipeline: Pipeline,
    pub sources: Vec<Source>,
    pub databases: Vec<DatabaseTarget>,
    pub scripts: BTreeMap<u32, Script>,
    /// Merged target root of the top-level document
    pub target: Option<PathBuf>,
}

impl ResolvedConfiguration {
    /// Database targets of one engine, in resolution order
    pub fn databases_for(&self, engine: Engine) -> impl Iterator<Item = &DatabaseTarget> {
        self.databases.iter().filter(move |db| db.engine == engine)
    }

    pub fn script(&self, id: u32) -> Option<&Script> {
        self.scripts.get(&id)
    }
}

#[derive(Default)]
struct Collected {
    sources: Vec<Source>,
    databases: Vec<DatabaseTarget>,
    scripts: BTreeMap<u32, Script>,
    /// Included documents already resolved, with the defaults they inherited
    resolved: Vec<(PathBuf, Defaults)>,
}

/// Walks a document and its includes
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    target_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the merged target of the top-level document. Included
    /// documents that set their own target keep it.
    pub fn with_target_override(mut self, target: Option<PathBuf>) -> Self {
        self.target_override = target;
        self
    }

    /// Resolve with no inherited defaults
    pub fn load(&self, path: &Path) -> Result<ResolvedConfiguration, ConfigError> {
        self.resolve(path, &Defaults::default())
    }

    pub fn resolve(
        &self,
        path: &Path,
        inherited: &Defaults,
    ) -> Result<ResolvedConfiguration, ConfigError> {
        let path = canonical(path)?;
        info!("Loading configuration from {}", path.display());
        let document = BackupDocument::from_file(&path)?;

        let mut defaults = inherited.merge(document.options.as_ref());
        if let Some(target) = &self.target_override {
            debug!("Target overridden with {}", target.display());
            defaults.target = Some(target.clone());
        }

        let mut collected = Collected::default();
        let mut stack = vec![path.clone()];
        collect(&document, &path, &defaults, &mut stack, &mut collected)?;

        let mut pipeline = document.pipeline();
        if pipeline.is_empty() {
            if defaults.target.is_none() {
                return Err(ConfigError::MissingTarget(path));
            }
            debug!("No pipeline declared, using implicit backup step");
            pipeline = Pipeline::implicit_backup();
        }

        for (no, kind) in pipeline.iter() {
            if let StepKind::Script(id) = kind {
                if !collected.scripts.contains_key(&id) {
                    return Err(ConfigError::UnknownScript { no, id });
                }
            }
        }

        info!(
            "Resolved {} steps, {} sources, {} databases, {} scripts",
            pipeline.len(),
            collected.sources.len(),
            collected.databases.len(),
            collected.scripts.len()
        );

        Ok(ResolvedConfiguration {
            pipeline,
            sources: collected.sources,
            databases: collected.databases,
            scripts: collected.scripts,
            target: defaults.target,
        })
    }
}

/// Build the entities of one document, then recurse into its includes.
/// `stack` holds the canonical paths of the documents currently open.
fn collect(
    document: &BackupDocument,
    path: &Path,
    defaults: &Defaults,
    stack: &mut Vec<PathBuf>,
    out: &mut Collected,
) -> Result<(), ConfigError> {
    for config in &document.scripts {
        if out.scripts.contains_key(&config.id) {
            return Err(ConfigError::DuplicateScript {
                id: config.id,
                path: path.to_path_buf(),
            });
        }
        out.scripts.insert(config.id, build_script(config));
    }

    for config in &document.sources.source {
        out.sources.push(build_source(config, defaults)?);
    }
    for config in &document.databases.postgresql {
        out.databases.push(build_database(Engine::PostgreSql, config, defaults)?);
    }
    for config in &document.databases.mysql {
        out.databases.push(build_database(Engine::MySql, config, defaults)?);
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for include in document.includes() {
        let include_path = canonical(&base.join(include.path()))?;
        if stack.contains(&include_path) {
            let mut chain = stack.clone();
            chain.push(include_path);
            return Err(ConfigError::IncludeCycle { chain });
        }

        let inherited = include_defaults(defaults, include);
        if out
            .resolved
            .iter()
            .any(|(seen, seen_defaults)| *seen == include_path && *seen_defaults == inherited)
        {
            debug!("Already included {}, skipping", include_path.display());
            continue;
        }

        debug!("Including {}", include_path.display());
        let child = BackupDocument::from_file(&include_path)?;
        if !child.pipeline.is_empty() {
            warn!(
                "Ignoring pipeline declared in included document {}",
                include_path.display()
            );
        }

        let child_defaults = inherited.merge(child.options.as_ref());
        stack.push(include_path.clone());
        collect(&child, &include_path, &child_defaults, stack, out)?;
        stack.pop();
        out.resolved.push((include_path, inherited));
    }

    Ok(())
}

fn include_defaults(defaults: &Defaults, include: &IncludeConfig) -> Defaults {
    let mut defaults = defaults.clone();
    if let Some(root) = include.root() {
        defaults.root = Some(root);
    }
    defaults
}

fn build_script(config: &ScriptConfig) -> Script {
    let script = Script::new(config.command.clone()).with_id(config.id);
    match &config.cwd {
        Some(cwd) => script.with_cwd(cwd),
        None => script,
    }
}

fn build_source(config: &SourceConfig, defaults: &Defaults) -> Result<Source, ConfigError> {
    let target = config.target.clone().or_else(|| defaults.target.clone());
    let rsync_options = config
        .rsync
        .as_ref()
        .and_then(|r| r.options())
        .unwrap_or_else(|| defaults.rsync_options());
    let privileged = config
        .rsync
        .as_ref()
        .and_then(|r| r.root())
        .unwrap_or_else(|| defaults.privileged());

    let mut source = Source::new(config.path.clone(), target)?
        .with_excludes(config.exclude.iter().cloned())
        .with_rsync_options(rsync_options)
        .privileged(privileged);
    if let Some(command) = &config.pre_script {
        source = source.with_pre_script(Script::new(command.clone()));
    }
    if let Some(command) = &config.post_script {
        source = source.with_post_script(Script::new(command.clone()));
    }
    Ok(source)
}

fn build_database(
    engine: Engine,
    config: &DatabaseConfig,
    defaults: &Defaults,
) -> Result<DatabaseTarget, ConfigError> {
    let target = config.target.clone().or_else(|| defaults.target.clone());
    let credential = match (&config.password, &config.pass) {
        (Some(password), _) => Credential::Literal(password.clone()),
        (None, Some(reference)) => Credential::SecretStore(reference.clone()),
        (None, None) => Credential::None,
    };

    let mut database = DatabaseTarget::new(engine, config.name.clone(), config.user.clone(), target)?
        .with_credential(credential);
    if let Some(options) = &config.options {
        database = database.with_options(options.clone());
    }
    if let Some(host) = &config.ssh {
        database = database.with_ssh_host(host.clone());
    }
    Ok(database)
}

fn canonical(path: &Path) -> Result<PathBuf, ConfigError> {
    path.canonicalize().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
