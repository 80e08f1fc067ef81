use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "clap")]
use clap::{ArgMatches, Command};
use tracing::debug;

use crate::error::LayerfigError;
use crate::file;
use crate::mapper::ConfigMapper;
use crate::middleware::{HandlerFunc, Middleware, execute, identity};
use crate::profiles::{
    self, PROFILE_SETTINGS_SLUG, ProfileSelection, ProfileSettings, profile_settings_section,
};
use crate::schema::Schema;
use crate::section::Section;
use crate::sources::{self, FileOptions};
use crate::types::{ConfigMap, SearchMode, SearchPath};
use crate::values::{SectionValues, Values, source};

type Binder<C> = Box<dyn Fn(&mut C, &SectionValues) -> Result<(), LayerfigError>>;

/// Entry point for building an application parser.
pub struct Layerfig;

impl Layerfig {
    pub fn builder<C: Default>() -> LayerfigBuilder<C> {
        LayerfigBuilder::new()
    }
}

/// Assembles a schema and the standard source chain for an application.
///
/// Sources, highest precedence first:
///
/// ```text
/// command line       .cli_matches()
/// extra middlewares  .middleware()
/// environment        {APP}_{SECTION_PREFIX}{FIELD}
/// config files       discovered, then .config_file() in order
/// profiles           .profiles(true)
/// provided values    .values()
/// defaults
/// ```
///
/// Each registered section comes with a binder that copies its resolved
/// values into the application's settings type `C`.
pub struct LayerfigBuilder<C> {
    app_name: Option<String>,
    file_name: Option<String>,
    search_paths: Option<Vec<SearchPath>>,
    search_mode: SearchMode,
    config_files: Vec<PathBuf>,
    app_config: Option<Option<PathBuf>>,
    env_prefix: Option<String>,
    env_enabled: bool,
    env_vars: Option<Vec<(String, String)>>,
    mapper: Option<Arc<dyn ConfigMapper>>,
    provided: Option<ConfigMap>,
    extra: Vec<Middleware>,
    profiles: bool,
    default_profile_file: Option<PathBuf>,
    require_fields: bool,
    #[cfg(feature = "clap")]
    cli_matches: Option<ArgMatches>,
    schema: Schema,
    binders: Vec<(String, Binder<C>)>,
}

impl<C: Default> LayerfigBuilder<C> {
    fn new() -> Self {
        Self {
            app_name: None,
            file_name: None,
            search_paths: None,
            search_mode: SearchMode::default(),
            config_files: Vec::new(),
            app_config: None,
            env_prefix: None,
            env_enabled: true,
            env_vars: None,
            mapper: None,
            provided: None,
            extra: Vec::new(),
            profiles: false,
            default_profile_file: None,
            require_fields: true,
            #[cfg(feature = "clap")]
            cli_matches: None,
            schema: Schema::new(),
            binders: Vec::new(),
        }
    }

    /// Set the application name. This derives sensible defaults:
    /// - `env_prefix` → `"{APP_NAME}"` (uppercased, `-` → `_`)
    /// - `search_paths` → `[SearchPath::Platform]`
    /// - the default profile file → `<config dir>/{app_name}/profiles.yaml`
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Add a section and the binder that copies its values into `C`.
    ///
    /// Fails when a section with the same slug is already registered.
    pub fn register<S, F>(mut self, section: S, bind: F) -> Result<Self, LayerfigError>
    where
        S: Section + 'static,
        F: Fn(&mut C, &SectionValues) -> Result<(), LayerfigError> + 'static,
    {
        if self.schema.contains(section.slug()) {
            return Err(LayerfigError::Schema(format!(
                "section '{}' is registered twice",
                section.slug()
            )));
        }
        self.binders.push((section.slug().to_string(), Box::new(bind)));
        self.schema.append_section(section);
        Ok(self)
    }

    /// Override the config file name searched for in each search path
    /// (default: `"config.yaml"`).
    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Replace the default search paths entirely.
    ///
    /// Paths are listed in **priority-ascending** order: the last entry has the
    /// highest priority.
    pub fn search_paths(mut self, paths: Vec<SearchPath>) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// Append a search path without replacing the defaults.
    /// If no paths have been set yet, starts from the default `[Platform]`.
    pub fn add_search_path(mut self, path: SearchPath) -> Self {
        self.search_paths
            .get_or_insert_with(|| vec![SearchPath::Platform])
            .push(path);
        self
    }

    /// Set the search mode (default: [`SearchMode::Merge`]).
    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    /// Apply an explicit config file after the discovered ones.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    pub fn config_files(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.config_files.extend(paths);
        self
    }

    /// Also apply the application's own `config.yaml`, located with
    /// [`file::resolve_app_config_path`]. An `explicit` path must exist.
    pub fn app_config(mut self, explicit: Option<PathBuf>) -> Self {
        self.app_config = Some(explicit);
        self
    }

    /// Reshape every config file through `mapper`.
    pub fn config_mapper(mut self, mapper: impl ConfigMapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// Override the environment variable prefix (default: derived from `app_name`).
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Read variables from `vars` instead of the process environment.
    pub fn env_vars(mut self, vars: Vec<(String, String)>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Values supplied by the embedding program, just above the defaults
    /// (source `provided-values`).
    pub fn values(mut self, values: ConfigMap) -> Self {
        self.provided = Some(values);
        self
    }

    /// Add a middleware between the command line and the environment.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.extra.push(middleware);
        self
    }

    /// Enable profile loading. The active profile is read from the
    /// `profile-settings` section, itself resolved from the command line,
    /// environment, config files and defaults.
    pub fn profiles(mut self, enabled: bool) -> Self {
        self.profiles = enabled;
        self
    }

    /// Override the default profile file.
    pub fn default_profile_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_profile_file = Some(path.into());
        self
    }

    /// Fail when a required field is left without a value (default: `true`).
    pub fn require_fields(mut self, enabled: bool) -> Self {
        self.require_fields = enabled;
        self
    }

    /// Use values parsed by clap. Build the command with
    /// [`command`](Self::command) so every field has a flag.
    #[cfg(feature = "clap")]
    pub fn cli_matches(mut self, matches: ArgMatches) -> Self {
        self.cli_matches = Some(matches);
        self
    }

    /// Register every section (and the profile selection flags, when
    /// profiles are enabled) on `command`.
    #[cfg(feature = "clap")]
    pub fn command(&self, command: Command) -> Result<Command, LayerfigError> {
        crate::cli::register_schema(command, &self.effective_schema()?)
    }

    fn effective_app_name(&self) -> Result<&str, LayerfigError> {
        self.app_name
            .as_deref()
            .ok_or(LayerfigError::AppNameRequired)
    }

    fn effective_file_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| "config.yaml".to_string())
    }

    fn effective_search_paths(&self) -> Vec<SearchPath> {
        if let Some(paths) = &self.search_paths {
            return paths.clone();
        }
        vec![SearchPath::Platform]
    }

    /// Resolve the effective env prefix (None if env disabled).
    fn effective_env_prefix(&self) -> Result<Option<String>, LayerfigError> {
        if !self.env_enabled {
            return Ok(None);
        }
        if let Some(prefix) = &self.env_prefix {
            return Ok(Some(prefix.clone()));
        }
        let app = self.effective_app_name()?;
        Ok(Some(app.to_uppercase().replace('-', "_")))
    }

    /// The registered sections, plus `profile-settings` when profiles are on.
    pub fn effective_schema(&self) -> Result<Schema, LayerfigError> {
        let mut schema = self.schema.clone();
        if self.profiles && !schema.contains(PROFILE_SETTINGS_SLUG) {
            let app = self.effective_app_name()?;
            schema.append_section(profile_settings_section(app));
        }
        Ok(schema)
    }

    fn effective_config_files(&self) -> Result<Vec<PathBuf>, LayerfigError> {
        let app = self.effective_app_name()?;
        let mut files = file::find_config_files(
            &self.effective_search_paths(),
            &self.effective_file_name(),
            app,
            self.search_mode,
        )?;
        if let Some(explicit) = &self.app_config
            && let Some(path) = file::resolve_app_config_path(app, explicit.as_deref())?
            && !files.contains(&path)
        {
            files.push(path);
        }
        files.extend(self.config_files.iter().cloned());
        Ok(files)
    }

    fn env_source(&self, prefix: &str) -> Middleware {
        match &self.env_vars {
            Some(vars) => sources::from_env_vars(prefix, vars.clone()),
            None => sources::from_env_vars(prefix, std::env::vars()),
        }
    }

    fn file_options(&self) -> FileOptions {
        FileOptions {
            mapper: self.mapper.clone(),
        }
    }

    /// The source chain, highest precedence first.
    pub fn build_middlewares(&mut self) -> Result<Vec<Middleware>, LayerfigError> {
        let env_prefix = self.effective_env_prefix()?;
        let config_files = self.effective_config_files()?;
        debug!(files = ?config_files, env_prefix = ?env_prefix, "building source chain");

        let mut chain: Vec<Middleware> = Vec::new();
        if self.require_fields {
            chain.push(sources::require_fields());
        }
        #[cfg(feature = "clap")]
        if let Some(matches) = &self.cli_matches {
            chain.push(crate::cli::from_clap(matches.clone()));
        }
        chain.append(&mut self.extra);
        if let Some(prefix) = &env_prefix {
            chain.push(self.env_source(prefix));
        }
        if !config_files.is_empty() {
            chain.push(sources::from_files(config_files.clone(), self.file_options()));
        }
        if self.profiles {
            chain.push(self.profile_middleware(env_prefix, config_files)?);
        }
        if let Some(provided) = &self.provided {
            chain.push(sources::from_map_with_source(
                provided.clone(),
                source::PROVIDED_VALUES,
            ));
        }
        chain.push(sources::from_defaults());
        Ok(chain)
    }

    /// Resolve the active profile in a separate pass over the
    /// `profile-settings` section, then apply it after `next`.
    fn profile_middleware(
        &self,
        env_prefix: Option<String>,
        config_files: Vec<PathBuf>,
    ) -> Result<Middleware, LayerfigError> {
        let app = self.effective_app_name()?.to_string();
        let default_file = match &self.default_profile_file {
            Some(path) => path.clone(),
            None => profiles::default_profile_file(&app).ok_or_else(|| {
                LayerfigError::Schema("no config directory for the default profile file".into())
            })?,
        };
        let bootstrap_schema = Schema::new().with_section(profile_settings_section(&app));
        let env_vars = match (&env_prefix, &self.env_vars) {
            (None, _) => None,
            (Some(_), Some(vars)) => Some(vars.clone()),
            (Some(_), None) => Some(std::env::vars().collect::<Vec<_>>()),
        };
        let file_options = self.file_options();
        #[cfg(feature = "clap")]
        let matches = self.cli_matches.clone();

        Ok(Box::new(move |next: HandlerFunc| -> HandlerFunc {
            Box::new(move |schema, values| {
                let mut bootstrap: Vec<Middleware> = Vec::new();
                #[cfg(feature = "clap")]
                if let Some(matches) = &matches {
                    bootstrap.push(crate::cli::from_clap(matches.clone()));
                }
                if let (Some(prefix), Some(vars)) = (&env_prefix, &env_vars) {
                    bootstrap.push(sources::from_env_vars(prefix, vars.clone()));
                }
                if !config_files.is_empty() {
                    bootstrap.push(sources::from_files(config_files.clone(), file_options.clone()));
                }
                bootstrap.push(sources::from_defaults());

                let mut selection_values = Values::new();
                execute(&bootstrap_schema, &mut selection_values, bootstrap)?;
                let selection: ProfileSelection =
                    selection_values.decode_section(PROFILE_SETTINGS_SLUG)?;

                let mut settings = ProfileSettings::new(
                    &default_file,
                    selection.profile.unwrap_or_else(|| profiles::DEFAULT_PROFILE.into()),
                );
                // The section default names the platform file; only an
                // explicit choice replaces the configured default.
                let explicit_file = selection_values
                    .field(PROFILE_SETTINGS_SLUG, "profile-file")
                    .is_some_and(|f| !f.is_default_only());
                if let Some(file) = selection.profile_file.filter(|f| explicit_file && !f.is_empty()) {
                    settings = settings.with_profile_file(file);
                }
                debug!(profile = %settings.profile, file = %settings.profile_file.display(), "selected profile");

                next(schema, values)?;
                profiles::from_profiles(settings)(identity())(schema, values)
            })
        }))
    }

    /// Execute the source chain against the registered schema.
    pub fn parse_values(mut self) -> Result<Values, LayerfigError> {
        let schema = self.effective_schema()?;
        let middlewares = self.build_middlewares()?;
        let mut values = Values::new();
        execute(&schema, &mut values, middlewares)?;
        Ok(values)
    }

    /// Resolve all values and bind them into a fresh `C`.
    pub fn parse(self) -> Result<C, LayerfigError> {
        self.parse_with_values().map(|(config, _)| config)
    }

    /// Like [`parse`](Self::parse), also returning the resolved values for
    /// provenance display.
    pub fn parse_with_values(mut self) -> Result<(C, Values), LayerfigError> {
        let binders = std::mem::take(&mut self.binders);
        let schema = self.schema.clone();
        let values = self.parse_values()?;
        let mut config = C::default();
        for (slug, bind) in &binders {
            match values.get(slug) {
                Some(section_values) => bind(&mut config, section_values)?,
                None => {
                    if let Some(section) = schema.get(slug) {
                        bind(&mut config, &SectionValues::new(Arc::clone(section)))?;
                    }
                }
            }
        }
        Ok((config, values))
    }
}
